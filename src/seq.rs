//! Lazy-sequence primitives shared by every combinator.
//!
//! A "lazy sequence" here is a [`futures::Stream`], boxed and pinned so
//! combinators can be generic over their producer's concrete type. None of
//! these functions do any work until the returned stream is polled.

use std::pin::Pin;

use futures::future::try_join_all;
use futures::stream::{self, FusedStream, StreamExt};
use futures::Stream;

use crate::error::{PipelineError, Result};

/// A boxed, pinned, `Send` stream of fallible items — the shape every
/// combinator produces and consumes.
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = Result<T>> + Send + 'a>>;

/// Lift a fixed list of values into a lazy sequence, in order.
pub fn from_values<T: Send + 'static>(values: Vec<T>) -> BoxStream<'static, T> {
    Box::pin(stream::iter(values.into_iter().map(Ok)))
}

/// Drive `seq` to completion, returning every item in production order.
///
/// Fails fast: the first `Err` encountered aborts the drain and is returned
/// without any partial result.
pub async fn collect<T>(mut seq: BoxStream<'_, T>) -> Result<Vec<T>> {
    let mut out = Vec::new();
    while let Some(item) = seq.next().await {
        out.push(item?);
    }
    Ok(out)
}

/// `collect` then concatenate with `sep`.
pub async fn join(seq: BoxStream<'_, String>, sep: &str) -> Result<String> {
    Ok(collect(seq).await?.join(sep))
}

/// Pull exactly one item, failing if the sequence is already exhausted.
pub async fn next_item<T>(mut seq: BoxStream<'_, T>) -> Result<T> {
    match seq.next().await {
        Some(item) => item,
        None => Err(PipelineError::InvariantViolation(
            "next_item called on an exhausted sequence".into(),
        )),
    }
}

/// Drive every sequence concurrently, preserving input order in the output.
///
/// The first failure cancels the rest: `try_join_all` drops the remaining
/// futures as soon as one resolves to `Err`, which in turn drops their
/// underlying streams and releases whatever they held.
pub async fn gather<T: Send>(
    seqs: Vec<BoxStream<'_, T>>,
) -> Result<Vec<Vec<T>>> {
    try_join_all(seqs.into_iter().map(collect)).await
}

/// Interleave two sequences in real-time arrival order.
///
/// Whichever side is ready first is yielded first; there is no fixed
/// tie-break between them. Completes once both inputs are drained. If
/// either side fails, the failure is yielded and the other side's
/// in-flight production is dropped (cancelled) rather than drained further.
pub fn merge<'a, T: Send + 'a>(
    a: BoxStream<'a, T>,
    b: BoxStream<'a, T>,
) -> BoxStream<'a, T> {
    Box::pin(async_stream::try_stream! {
        let mut a = a.fuse();
        let mut b = b.fuse();
        loop {
            tokio::select! {
                next_a = a.next(), if !a.is_terminated() => {
                    if let Some(item) = next_a {
                        yield item?;
                    }
                }
                next_b = b.next(), if !b.is_terminated() => {
                    if let Some(item) = next_b {
                        yield item?;
                    }
                }
            }
            if a.is_terminated() && b.is_terminated() {
                break;
            }
        }
    })
}

/// Split one sequence into `n` independent consumers, each seeing every
/// item the source produces.
///
/// A single background task drains the source once and fans each item out
/// to `n` unbounded `mpsc` channels. A lagging consumer simply buffers more
/// in its own channel rather than stalling the others — deliberately
/// unbounded, since `pipe` depends on both branches making progress
/// independently; bounding them could deadlock a branch waiting on the
/// other. When every receiver has been dropped the broadcaster's sends
/// fail, the task stops polling the source, and the source is dropped.
pub fn tee<T: Clone + Send + 'static>(
    mut seq: BoxStream<'static, T>,
    n: usize,
) -> Vec<BoxStream<'static, T>> {
    let mut senders = Vec::with_capacity(n);
    let mut outputs: Vec<BoxStream<'static, T>> = Vec::with_capacity(n);
    for _ in 0..n {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<Result<T>>();
        senders.push(tx);
        outputs.push(Box::pin(
            tokio_stream_from_unbounded(rx),
        ) as BoxStream<'static, T>);
    }

    tokio::spawn(async move {
        while let Some(item) = seq.next().await {
            let is_err = item.is_err();
            let any_alive = match item {
                Ok(v) => {
                    let mut alive = false;
                    for tx in &senders {
                        if tx.send(Ok(v.clone())).is_ok() {
                            alive = true;
                        }
                    }
                    alive
                }
                Err(e) => {
                    // PipelineError wraps non-`Clone` transport errors, so a
                    // single failure is rendered once and re-wrapped per
                    // branch rather than cloned.
                    let msg = e.to_string();
                    let mut alive = false;
                    for tx in &senders {
                        if tx
                            .send(Err(PipelineError::Other(msg.clone())))
                            .is_ok()
                        {
                            alive = true;
                        }
                    }
                    alive
                }
            };
            if !any_alive || is_err {
                break;
            }
        }
    });

    outputs
}

fn tokio_stream_from_unbounded<T>(
    rx: tokio::sync::mpsc::UnboundedReceiver<Result<T>>,
) -> impl Stream<Item = Result<T>> {
    futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    })
}
