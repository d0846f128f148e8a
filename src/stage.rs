//! The composable unit: a named, lazy, asynchronous value-to-sequence
//! transformer, plus its combinator algebra.
//!
//! A [`Stage<T, U>`] is constructed once and invoked many times; each call
//! to [`Stage::call`] returns a fresh lazy sequence, so stages hold no
//! per-invocation state themselves — whatever state a combinator needs
//! lives in the `async-stream`-generated generator spawned for that call.

use std::future::Future;
use std::sync::Arc;

use futures::stream::StreamExt;

use crate::emission::{Emission, Render, StageName};
use crate::error::Result;
use crate::seq::{self, BoxStream};
use crate::single::SingleOutputStage;

type RunFn<T, U> = Arc<dyn Fn(T) -> BoxStream<'static, Emission<U>> + Send + Sync>;

/// A named, reusable, lazy transform from one input value to a sequence of
/// [`Emission`]s.
pub struct Stage<T, U> {
    name: StageName,
    run: RunFn<T, U>,
}

impl<T, U> Clone for Stage<T, U> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            run: self.run.clone(),
        }
    }
}

impl<T, U> Stage<T, U> {
    /// Build a stage from its name and behavior directly. Most callers
    /// reach for [`Stage::from_fn`] or a combinator instead; this is the
    /// escape hatch adapters use (see [`crate::adapter`]).
    pub fn new(
        name: impl Into<StageName>,
        f: impl Fn(T) -> BoxStream<'static, Emission<U>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            run: Arc::new(f),
        }
    }

    pub fn name(&self) -> &StageName {
        &self.name
    }

    /// Invoke the stage, producing a fresh lazy sequence of emissions.
    pub fn call(&self, input: T) -> BoxStream<'static, Emission<U>> {
        (self.run)(input)
    }
}

impl<T: Send + 'static, U: Send + 'static> Stage<T, U> {
    /// Build a stage whose behavior is "compute a finite list of outputs
    /// from the input, each a final emission" — the common shape for a
    /// base stage (e.g. `Stage::from_fn("Words", |s| s.split(' ')...)`).
    pub fn from_fn(
        name: impl Into<StageName>,
        f: impl Fn(T) -> Vec<U> + Send + Sync + 'static,
    ) -> Self {
        let name = name.into();
        Self::new(name.clone(), move |input: T| {
            let values = f(input);
            let name = name.clone();
            Box::pin(async_stream::try_stream! {
                for v in values {
                    yield Emission::final_value(name.clone(), v);
                }
            })
        })
    }
}

impl<T: Send + 'static, U: Render + Clone + Send + Sync + 'static> Stage<T, U> {
    /// Apply `f` to every final value. Non-final emissions pass through
    /// unchanged; every incoming final is first demoted to a trace emission
    /// (preserving its producer's name) and then followed by `f`'s image
    /// under this stage's own name.
    pub fn map<V: Send + 'static>(
        &self,
        f: impl Fn(U) -> V + Send + Sync + 'static,
    ) -> Stage<T, V> {
        let name = self.name.suffixed("map");
        let prev = self.clone();
        let f = Arc::new(f);
        Stage::new(name.clone(), move |input: T| {
            let mut src = prev.call(input);
            let f = f.clone();
            let name = name.clone();
            Box::pin(async_stream::try_stream! {
                while let Some(item) = src.next().await {
                    let emission = item?;
                    if emission.is_final() {
                        let producer = emission.stage.clone();
                        let v = emission.into_final().unwrap();
                        yield Emission::trace(producer, v.clone());
                        yield Emission::final_value(name.clone(), f(v));
                    } else {
                        yield emission.retag::<V>();
                    }
                }
            })
        })
    }

    /// Keep only finals for which `p` holds. Every incoming emission is
    /// re-emitted (finals demoted to traces); a passing final is followed
    /// by a fresh final carrying the same value under this stage's name.
    pub fn filter(&self, p: impl Fn(&U) -> bool + Send + Sync + 'static) -> Stage<T, U> {
        let name = self.name.suffixed("filter");
        let prev = self.clone();
        let p = Arc::new(p);
        Stage::new(name.clone(), move |input: T| {
            let mut src = prev.call(input);
            let p = p.clone();
            let name = name.clone();
            Box::pin(async_stream::try_stream! {
                while let Some(item) = src.next().await {
                    let emission = item?;
                    if emission.is_final() {
                        let producer = emission.stage.clone();
                        let v = emission.into_final().unwrap();
                        yield Emission::trace(producer, v.clone());
                        if p(&v) {
                            yield Emission::final_value(name.clone(), v);
                        }
                    } else {
                        yield emission.retag::<U>();
                    }
                }
            })
        })
    }

    /// Drain every final into a `Vec<U>`, then hand that collected list to
    /// `g` and yield its output as the sole final, under
    /// `<self.name>@and_then`.
    ///
    /// Use [`Stage::and_then_stage`] instead when the successor is itself a
    /// named [`Stage`] — the composed name then adopts the successor's name
    /// rather than appending `@and_then`.
    pub fn and_then<V, F, Fut>(&self, g: F) -> Stage<T, V>
    where
        V: Send + 'static,
        F: Fn(Vec<U>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let name = self.name.suffixed("and_then");
        let prev = self.clone();
        let g = Arc::new(g);
        Stage::new(name.clone(), move |input: T| {
            let mut src = prev.call(input);
            let g = g.clone();
            let name = name.clone();
            Box::pin(async_stream::try_stream! {
                let mut finals = Vec::new();
                while let Some(item) = src.next().await {
                    let emission = item?;
                    if emission.is_final() {
                        let producer = emission.stage.clone();
                        let v = emission.into_final().unwrap();
                        yield Emission::trace(producer, v.clone());
                        finals.push(v);
                    } else {
                        yield emission.retag::<V>();
                    }
                }
                let out = g(finals).await?;
                yield Emission::final_value(name.clone(), out);
            })
        })
    }

    /// Drain every final into a `Vec<U>`, then feed it to the named stage
    /// `g` and forward `g`'s entire emission stream (traces and final
    /// alike) unchanged. The composed stage adopts `g`'s name verbatim.
    pub fn and_then_stage<V: Send + 'static>(&self, g: Stage<Vec<U>, V>) -> Stage<T, V> {
        let name = g.name().clone();
        let prev = self.clone();
        Stage::new(name, move |input: T| {
            let mut src = prev.call(input);
            let g = g.clone();
            Box::pin(async_stream::try_stream! {
                let mut finals = Vec::new();
                while let Some(item) = src.next().await {
                    let emission = item?;
                    if emission.is_final() {
                        let producer = emission.stage.clone();
                        let v = emission.into_final().unwrap();
                        yield Emission::trace(producer, v.clone());
                        finals.push(v);
                    } else {
                        yield emission.retag::<V>();
                    }
                }
                let mut tail = g.call(finals);
                while let Some(item) = tail.next().await {
                    yield item?;
                }
            })
        })
    }

    /// Duplicate this stage's output (via [`seq::tee`]): one branch is
    /// re-emitted for observability (finals demoted to traces), the other
    /// is projected to its finals and fed to `phi`. `phi`'s output becomes
    /// this stage's finals, merged with the trace branch in real-time
    /// arrival order.
    pub fn pipe<V: Send + 'static>(
        &self,
        phi: impl Fn(BoxStream<'static, U>) -> BoxStream<'static, V> + Send + Sync + 'static,
    ) -> Stage<T, V> {
        let name = self.name.suffixed("pipe");
        let prev = self.clone();
        let phi = Arc::new(phi);
        Stage::new(name.clone(), move |input: T| {
            let source = prev.call(input);
            let phi = phi.clone();
            let name = name.clone();

            let mut branches = seq::tee(source, 2).into_iter();
            let branch_a = branches.next().expect("tee(_, 2) yields two branches");
            let branch_b = branches.next().expect("tee(_, 2) yields two branches");

            let trace_branch: BoxStream<'static, Emission<V>> = Box::pin(async_stream::try_stream! {
                let mut a = branch_a;
                while let Some(item) = a.next().await {
                    let emission = item?;
                    if emission.is_final() {
                        let producer = emission.stage.clone();
                        let v = emission.into_final().unwrap();
                        yield Emission::trace(producer, v);
                    } else {
                        yield emission.retag::<V>();
                    }
                }
            });

            let finals_only: BoxStream<'static, U> = Box::pin(async_stream::try_stream! {
                let mut b = branch_b;
                while let Some(item) = b.next().await {
                    let emission = item?;
                    if let Some(v) = emission.into_final() {
                        yield v;
                    }
                }
            });

            let phi_out = phi(finals_only);
            let final_branch: BoxStream<'static, Emission<V>> = Box::pin(async_stream::try_stream! {
                let mut out = phi_out;
                while let Some(item) = out.next().await {
                    yield Emission::final_value(name.clone(), item?);
                }
            });

            seq::merge(trace_branch, final_branch)
        })
    }

    /// Collect every final into a `Vec<U>`; returns a
    /// [`SingleOutputStage`] whose sole final is that list.
    pub fn collect(&self) -> SingleOutputStage<T, Vec<U>> {
        let name = self.name.suffixed("collect");
        let prev = self.clone();
        SingleOutputStage::new(name.clone(), move |input: T| {
            let mut src = prev.call(input);
            let name = name.clone();
            Box::pin(async_stream::try_stream! {
                let mut acc = Vec::new();
                while let Some(item) = src.next().await {
                    let emission = item?;
                    if emission.is_final() {
                        let producer = emission.stage.clone();
                        let v = emission.into_final().unwrap();
                        yield Emission::trace(producer, v.clone());
                        acc.push(v);
                    } else {
                        yield emission.retag::<Vec<U>>();
                    }
                }
                yield Emission::final_value(name.clone(), acc);
            })
        })
    }

    /// Install a local error handler. If draining this stage fails, the
    /// failure is emitted once as a non-final trace emission (rendered to
    /// a string, since the error type itself is not generally `Clone`),
    /// then `h`'s output becomes the sole final under `@on_error`. Failures
    /// raised by `h` itself, or occurring downstream of this combinator,
    /// are not handled here.
    pub fn on_error<F, Fut>(&self, h: F) -> Stage<T, U>
    where
        F: Fn(crate::error::PipelineError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<U>> + Send + 'static,
    {
        let name = self.name.suffixed("on_error");
        let protected_name = self.name.clone();
        let prev = self.clone();
        let h = Arc::new(h);
        Stage::new(name.clone(), move |input: T| {
            let mut src = prev.call(input);
            let h = h.clone();
            let name = name.clone();
            let protected_name = protected_name.clone();
            Box::pin(async_stream::try_stream! {
                loop {
                    match src.next().await {
                        Some(Ok(emission)) => yield emission,
                        Some(Err(err)) => {
                            let rendered = err.to_string();
                            yield Emission::trace(protected_name.clone(), rendered);
                            let recovered = h(err).await?;
                            yield Emission::final_value(name.clone(), recovered);
                            break;
                        }
                        None => break,
                    }
                }
            })
        })
    }
}

impl<T: Send + 'static> Stage<T, String> {
    /// Collect every final `String` and concatenate with `sep`. Requires
    /// `U = String`.
    pub fn join(&self, sep: impl Into<String>) -> SingleOutputStage<T, String> {
        let name = self.name.suffixed("join");
        let prev = self.clone();
        let sep = sep.into();
        SingleOutputStage::new(name.clone(), move |input: T| {
            let mut src = prev.call(input);
            let name = name.clone();
            let sep = sep.clone();
            Box::pin(async_stream::try_stream! {
                let mut acc = Vec::new();
                while let Some(item) = src.next().await {
                    let emission = item?;
                    if emission.is_final() {
                        let producer = emission.stage.clone();
                        let v = emission.into_final().unwrap();
                        yield Emission::trace(producer, v.clone());
                        acc.push(v);
                    } else {
                        yield emission.retag::<String>();
                    }
                }
                yield Emission::final_value(name.clone(), acc.join(&sep));
            })
        })
    }
}

impl<T: Send + 'static, V: Send + 'static> Stage<T, BoxStream<'static, V>> {
    /// Equivalent to `self.collect().gather()`: wait for every inner lazy
    /// sequence to be produced, then drive all of them concurrently,
    /// returning `Vec<Vec<V>>` preserving both outer and inner order.
    ///
    /// An in-flight sequence has no meaningful snapshot to render, so its
    /// trace copy is a fixed placeholder rather than the real payload.
    pub fn gather(&self) -> SingleOutputStage<T, Vec<Vec<V>>> {
        let name = self.name.suffixed("gather");
        let prev = self.clone();
        SingleOutputStage::new(name.clone(), move |input: T| {
            let mut src = prev.call(input);
            let name = name.clone();
            Box::pin(async_stream::try_stream! {
                let mut seqs = Vec::new();
                while let Some(item) = src.next().await {
                    let emission = item?;
                    if emission.is_final() {
                        let producer = emission.stage.clone();
                        let v = emission.into_final().unwrap();
                        yield Emission::trace(producer, "<lazy sequence>".to_string());
                        seqs.push(v);
                    } else {
                        yield emission.retag::<Vec<Vec<V>>>();
                    }
                }
                let result = seq::gather(seqs).await?;
                yield Emission::final_value(name.clone(), result);
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debug_util::{collect_final, join_final};

    #[tokio::test]
    async fn acronym_scenario() {
        let words = Stage::from_fn("Words", |s: String| {
            s.split(' ').map(|w| w.to_string()).collect::<Vec<_>>()
        });
        let stage = words
            .map(|w: String| w.chars().next().unwrap().to_ascii_uppercase().to_string())
            .join("");
        let out = stage.call("as soon as possible".to_string());
        let result = collect_final(out).await.unwrap();
        assert_eq!(result, vec!["ASAP".to_string()]);
    }

    #[tokio::test]
    async fn filter_evens_scenario() {
        let stage =
            Stage::from_fn("N", |n: i32| (0..n).collect::<Vec<_>>()).filter(|x: &i32| x % 2 == 0);
        let out = collect_final(stage.call(9)).await.unwrap();
        assert_eq!(out, vec![0, 2, 4, 6, 8]);
    }

    #[tokio::test]
    async fn non_blocking_map_interleaves() {
        let stage = Stage::from_fn("X", |s: String| vec![s, "!".to_string()])
            .map(|w: String| w.replace("world", "planet"))
            .map(|w: String| format!("{w}~"));
        let out = collect_final(stage.call("hello world".to_string()))
            .await
            .unwrap();
        assert_eq!(out, vec!["hello planet~".to_string(), "!~".to_string()]);
    }

    #[tokio::test]
    async fn error_recovery_scenario() {
        let stage: Stage<String, String> = Stage::new("G", |_: String| {
            Box::pin(async_stream::try_stream! {
                Err(crate::error::PipelineError::AdapterError("teapot".into()))?;
                #[allow(unreachable_code)]
                {
                    yield Emission::final_value(StageName::new("G"), String::new());
                }
            })
        });
        let handled = stage
            .on_error(|err: crate::error::PipelineError| async move { Ok(format!("sorry: {err}")) });
        let mut out = handled.call("418".to_string());
        let first = out.next().await.unwrap().unwrap();
        assert!(!first.is_final());
        let second = out.next().await.unwrap().unwrap();
        assert_eq!(second.into_final(), Some("sorry: teapot".to_string()));
        assert!(out.next().await.is_none());
    }

    #[tokio::test]
    async fn mario_pipe_scenario() {
        // Buffers on "Mario": if the next item is "Mushroom", the pair
        // becomes a single combined output instead of two; any other
        // follower is emitted immediately with a "?" suffix, even though
        // "Mario" itself is still waiting to see what follows it.
        fn mario_phi(mut input: BoxStream<'static, String>) -> BoxStream<'static, String> {
            Box::pin(async_stream::try_stream! {
                let mut buffered: Option<String> = None;
                while let Some(item) = input.next().await {
                    let item = item?;
                    if item == "Mario" {
                        buffered = Some(item);
                        continue;
                    }
                    if buffered.as_deref() == Some("Mario") && item == "Mushroom" {
                        yield "Super Mario!".to_string();
                        buffered = None;
                        continue;
                    }
                    yield format!("{item}?");
                }
            })
        }

        let stage = Stage::from_fn("Chars", |_: String| {
            vec!["Mario".to_string(), "Luigi".to_string(), "Mushroom".to_string()]
        })
        .pipe(mario_phi);
        let out = collect_final(stage.call(String::new())).await.unwrap();
        assert_eq!(out, vec!["Luigi?".to_string(), "Super Mario!".to_string()]);
    }

    #[tokio::test]
    async fn join_final_matches_collect_then_join() {
        let words = Stage::from_fn("W", |s: String| {
            s.split(' ').map(|w| w.to_string()).collect::<Vec<_>>()
        });
        let joined = join_final(words.call("a b c".to_string()), "-")
            .await
            .unwrap();
        assert_eq!(joined, "a-b-c");
    }
}
