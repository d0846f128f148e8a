//! The contract an external token source implements to join a composition.
//!
//! There is no `Adapter` trait: an adapter is an ordinary [`Stage`], built
//! the ordinary way, whose `run` closure happens to reach outside the
//! process — an HTTP call to a model server, a subprocess, anything with
//! its own latency and failure modes. What adapters share isn't a trait,
//! it's the handle they take instead of ad hoc arguments: [`AdapterCtx`]
//! bundles the HTTP client, a cancellation flag, and an optional event
//! handler so every adapter observes cancellation and reports lifecycle
//! events the same way.
//!
//! [`Stage`]: crate::stage::Stage

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use reqwest::Client;

use crate::error::{PipelineError, Result};
use crate::events::EventHandler;
use crate::seq::BoxStream;

/// Shared context adapters take instead of individual arguments.
///
/// Cheap to clone: the HTTP client and event handler are both already
/// reference-counted internally or wrapped in `Arc`.
#[derive(Clone)]
pub struct AdapterCtx {
    /// HTTP client used for outbound requests. Reused across calls so
    /// connection pooling actually applies.
    pub client: Client,
    cancellation: Option<Arc<AtomicBool>>,
    /// Optional sink for [`Event::AdapterToken`](crate::events::Event::AdapterToken)
    /// and [`Event::AdapterRetry`](crate::events::Event::AdapterRetry).
    pub event_handler: Option<Arc<dyn EventHandler>>,
}

impl AdapterCtx {
    /// Build a context around an existing client, with no cancellation or
    /// event handler set.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            cancellation: None,
            event_handler: None,
        }
    }

    pub fn with_cancellation(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancellation = Some(cancel);
        self
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|c| c.load(Ordering::Relaxed))
    }

    /// Adapters call this between network round-trips so a cancellation
    /// request takes effect before the next one is made, rather than only
    /// being noticed once the whole call completes.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(PipelineError::UpstreamCancelled);
        }
        Ok(())
    }
}

impl Default for AdapterCtx {
    fn default() -> Self {
        Self::new(Client::new())
    }
}

/// Bridge a blocking, synchronous producer onto a worker thread so the
/// calling task is never blocked by it.
///
/// `produce` runs once on [`tokio::task::spawn_blocking`] and returns an
/// `Iterator`; each item is forwarded one at a time over a bounded
/// `tokio::sync::mpsc` channel as it's produced, rather than collected up
/// front, so a consumer sees the first items before the producer finishes.
/// Dropping the returned stream drops the receiver, so the next
/// `blocking_send` in the worker thread fails and it exits at the next
/// item boundary — it cannot be pre-empted mid-item, since it's ordinary
/// blocking code.
pub fn blocking_bridge<T, I, F>(capacity: usize, produce: F) -> BoxStream<'static, T>
where
    T: Send + 'static,
    I: Iterator<Item = Result<T>> + Send + 'static,
    F: FnOnce() -> I + Send + 'static,
{
    let (tx, mut rx) = tokio::sync::mpsc::channel::<Result<T>>(capacity.max(1));
    tokio::task::spawn_blocking(move || {
        for item in produce() {
            if tx.blocking_send(item).is_err() {
                break;
            }
        }
    });
    Box::pin(async_stream::try_stream! {
        while let Some(item) = rx.recv().await {
            yield item?;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seq::collect;

    #[test]
    fn cancellation_flag_is_observed() {
        let flag = Arc::new(AtomicBool::new(false));
        let ctx = AdapterCtx::default().with_cancellation(flag.clone());
        assert!(ctx.check_cancelled().is_ok());
        flag.store(true, Ordering::Relaxed);
        assert!(matches!(
            ctx.check_cancelled(),
            Err(PipelineError::UpstreamCancelled)
        ));
    }

    #[tokio::test]
    async fn blocking_bridge_forwards_every_item_in_order() {
        let seq = blocking_bridge(2, || (0..5).map(Ok));
        let out = collect(seq).await.unwrap();
        assert_eq!(out, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn blocking_bridge_surfaces_a_producer_error() {
        let seq: BoxStream<'static, i32> = blocking_bridge(2, || {
            vec![Ok(1), Err(PipelineError::Other("boom".into()))].into_iter()
        });
        let err = collect(seq).await.unwrap_err();
        assert!(matches!(err, PipelineError::Other(_)));
    }
}
