//! [`SingleOutputStage`]: the specialization of [`Stage`](crate::stage::Stage)
//! that promises at most one logical final value per invocation, so its
//! combinators pass a single unwrapped value to a successor instead of a
//! list.

use std::future::Future;
use std::sync::Arc;

use futures::stream::StreamExt;

use crate::emission::{Emission, Render, StageName};
use crate::error::{PipelineError, Result};
use crate::seq::{self, BoxStream};

type RunFn<T, U> = Arc<dyn Fn(T) -> BoxStream<'static, Emission<U>> + Send + Sync>;

/// A [`Stage`](crate::stage::Stage) specialization guaranteeing at most one
/// final emission per call.
///
/// A second final value is a programmer error, not a recoverable condition:
/// [`SingleOutputStage::call`] raises [`PipelineError::InvariantViolation`]
/// the moment it sees one, rather than silently keeping the latest value
/// (the behavior the single-threaded Python original defaults to).
pub struct SingleOutputStage<T, U> {
    name: StageName,
    run: RunFn<T, U>,
}

impl<T, U> Clone for SingleOutputStage<T, U> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            run: self.run.clone(),
        }
    }
}

impl<T, U> SingleOutputStage<T, U> {
    /// Build from a name and a behavior trusted to emit at most one final.
    /// [`SingleOutputStage::call`] still enforces this at runtime as a
    /// backstop.
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
}

impl<T: Send + 'static, U: Send + 'static> SingleOutputStage<T, U> {
    /// Invoke the stage. Every non-final emission passes through unchanged;
    /// a second final emission fails the stream with
    /// [`PipelineError::InvariantViolation`] instead of being yielded.
    pub fn call(&self, input: T) -> BoxStream<'static, Emission<U>> {
        let mut src = (self.run)(input);
        Box::pin(async_stream::try_stream! {
            let mut seen_final = false;
            while let Some(item) = src.next().await {
                let emission = item?;
                if emission.is_final() {
                    if seen_final {
                        Err(PipelineError::InvariantViolation(
                            "SingleOutputStage produced more than one final value".into(),
                        ))?;
                    }
                    seen_final = true;
                }
                yield emission;
            }
        })
    }
}

impl<T: Send + 'static, U: Render + Clone + Send + Sync + 'static> SingleOutputStage<T, U> {
    /// Apply `f` to the single final value.
    pub fn map<V: Send + 'static>(
        &self,
        f: impl Fn(U) -> V + Send + Sync + 'static,
    ) -> SingleOutputStage<T, V> {
        let name = self.name.suffixed("map");
        let prev = self.clone();
        let f = Arc::new(f);
        SingleOutputStage::new(name.clone(), move |input: T| {
            let mut src = prev.call(input);
            let f = f.clone();
            let name = name.clone();
            Box::pin(async_stream::try_stream! {
                let mut value = None;
                while let Some(item) = src.next().await {
                    let emission = item?;
                    if emission.is_final() {
                        let producer = emission.stage.clone();
                        let v = emission.into_final().unwrap();
                        yield Emission::trace(producer, v.clone());
                        value = Some(v);
                    } else {
                        yield emission.retag::<V>();
                    }
                }
                match value {
                    Some(v) => yield Emission::final_value(name.clone(), f(v)),
                    None => Err(PipelineError::InvariantViolation(
                        "map on SingleOutputStage requires a value but none was produced".into(),
                    ))?,
                }
            })
        })
    }

    /// Test the single final value against `p`. Unlike
    /// [`Stage::filter`](crate::stage::Stage::filter), this never produces
    /// zero finals: the result is `Some(value)` when `p` holds and `None`
    /// otherwise, so "filtered out" is explicit in the type rather than a
    /// silently dropped final.
    pub fn filter(
        &self,
        p: impl Fn(&U) -> bool + Send + Sync + 'static,
    ) -> SingleOutputStage<T, Option<U>> {
        let name = self.name.suffixed("filter");
        let prev = self.clone();
        let p = Arc::new(p);
        SingleOutputStage::new(name.clone(), move |input: T| {
            let mut src = prev.call(input);
            let p = p.clone();
            let name = name.clone();
            Box::pin(async_stream::try_stream! {
                let mut value = None;
                while let Some(item) = src.next().await {
                    let emission = item?;
                    if emission.is_final() {
                        let producer = emission.stage.clone();
                        let v = emission.into_final().unwrap();
                        yield Emission::trace(producer, v.clone());
                        value = Some(v);
                    } else {
                        yield emission.retag::<Option<U>>();
                    }
                }
                let result = value.filter(|v| p(v));
                yield Emission::final_value(name.clone(), result);
            })
        })
    }

    /// Pass the unwrapped single value (not a list) to `g`.
    pub fn and_then<V, F, Fut>(&self, g: F) -> SingleOutputStage<T, V>
    where
        V: Send + 'static,
        F: Fn(U) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let name = self.name.suffixed("and_then");
        let prev = self.clone();
        let g = Arc::new(g);
        SingleOutputStage::new(name.clone(), move |input: T| {
            let mut src = prev.call(input);
            let g = g.clone();
            let name = name.clone();
            Box::pin(async_stream::try_stream! {
                let mut value = None;
                while let Some(item) = src.next().await {
                    let emission = item?;
                    if emission.is_final() {
                        let producer = emission.stage.clone();
                        let v = emission.into_final().unwrap();
                        yield Emission::trace(producer, v.clone());
                        value = Some(v);
                    } else {
                        yield emission.retag::<V>();
                    }
                }
                match value {
                    Some(v) => {
                        let out = g(v).await?;
                        yield Emission::final_value(name.clone(), out);
                    }
                    None => Err(PipelineError::InvariantViolation(
                        "and_then on SingleOutputStage requires a value but none was produced".into(),
                    ))?,
                }
            })
        })
    }

    /// Wrap the single value as a one-element lazy sequence, hand it to
    /// `phi`, and forward `phi`'s output as this stage's final(s) —
    /// otherwise identical to [`SingleOutputStage::and_then`]. If `phi`
    /// yields more than one item, [`SingleOutputStage::call`]'s own
    /// double-final enforcement catches it.
    pub fn pipe<V: Send + 'static>(
        &self,
        phi: impl Fn(BoxStream<'static, U>) -> BoxStream<'static, V> + Send + Sync + 'static,
    ) -> SingleOutputStage<T, V> {
        let name = self.name.suffixed("pipe");
        let prev = self.clone();
        let phi = Arc::new(phi);
        SingleOutputStage::new(name.clone(), move |input: T| {
            let mut src = prev.call(input);
            let phi = phi.clone();
            let name = name.clone();
            Box::pin(async_stream::try_stream! {
                let mut value = None;
                while let Some(item) = src.next().await {
                    let emission = item?;
                    if emission.is_final() {
                        let producer = emission.stage.clone();
                        let v = emission.into_final().unwrap();
                        yield Emission::trace(producer, v.clone());
                        value = Some(v);
                    } else {
                        yield emission.retag::<V>();
                    }
                }
                match value {
                    Some(v) => {
                        let mut out = phi(seq::from_values(vec![v]));
                        while let Some(item) = out.next().await {
                            yield Emission::final_value(name.clone(), item?);
                        }
                    }
                    None => Err(PipelineError::InvariantViolation(
                        "pipe on SingleOutputStage requires a value but none was produced".into(),
                    ))?,
                }
            })
        })
    }

    /// Install a local error handler, identical in contract to
    /// [`Stage::on_error`](crate::stage::Stage::on_error) but preserving
    /// single-output-ness.
    pub fn on_error<F, Fut>(&self, h: F) -> SingleOutputStage<T, U>
    where
        F: Fn(PipelineError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<U>> + Send + 'static,
    {
        let name = self.name.suffixed("on_error");
        let protected_name = self.name.clone();
        let prev = self.clone();
        let h = Arc::new(h);
        SingleOutputStage::new(name.clone(), move |input: T| {
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

impl<T: Send + 'static, V: Send + 'static> SingleOutputStage<T, Vec<BoxStream<'static, V>>> {
    /// Drive every inner lazy sequence concurrently, returning
    /// `Vec<Vec<V>>` preserving both outer and inner order. An empty list
    /// of sequences (or no value produced at all) yields `[]` rather than
    /// failing.
    pub fn gather(&self) -> SingleOutputStage<T, Vec<Vec<V>>> {
        let name = self.name.suffixed("gather");
        let prev = self.clone();
        SingleOutputStage::new(name.clone(), move |input: T| {
            let mut src = prev.call(input);
            let name = name.clone();
            Box::pin(async_stream::try_stream! {
                let mut value = None;
                while let Some(item) = src.next().await {
                    let emission = item?;
                    if emission.is_final() {
                        let producer = emission.stage.clone();
                        let v = emission.into_final().unwrap();
                        yield Emission::trace(producer, "<lazy sequence list>".to_string());
                        value = Some(v);
                    } else {
                        yield emission.retag::<Vec<Vec<V>>>();
                    }
                }
                let result = match value {
                    Some(seqs) if !seqs.is_empty() => seq::gather(seqs).await?,
                    _ => Vec::new(),
                };
                yield Emission::final_value(name.clone(), result);
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debug_util::collect_final;
    use crate::stage::Stage;

    #[tokio::test]
    async fn collect_then_map_produces_one_final() {
        let stage = Stage::from_fn("N", |n: i32| (0..n).collect::<Vec<_>>())
            .collect()
            .map(|v: Vec<i32>| v.len());
        let out = collect_final(stage.call(5)).await.unwrap();
        assert_eq!(out, vec![5]);
    }

    #[tokio::test]
    async fn double_final_raises_invariant_violation() {
        let stage: SingleOutputStage<i32, i32> = SingleOutputStage::new("Bad", |_: i32| {
            Box::pin(async_stream::try_stream! {
                yield Emission::final_value(StageName::new("Bad"), 1i32);
                yield Emission::final_value(StageName::new("Bad"), 2i32);
            })
        });
        let mut out = stage.call(0);
        assert!(out.next().await.unwrap().is_ok());
        let err = out.next().await.unwrap().unwrap_err();
        assert!(matches!(err, PipelineError::InvariantViolation(_)));
    }

    #[tokio::test]
    async fn filter_on_single_output_never_drops_the_final() {
        let stage = Stage::from_fn("N", |n: i32| vec![n]).collect().map(|v| v[0]);
        let odd = stage.filter(|v: &i32| v % 2 == 1);
        let out = collect_final(odd.call(4)).await.unwrap();
        assert_eq!(out, vec![None]);

        let odd2 = stage.filter(|v: &i32| v % 2 == 1);
        let out2 = collect_final(odd2.call(5)).await.unwrap();
        assert_eq!(out2, vec![Some(5)]);
    }

    #[tokio::test]
    async fn gather_parallelism_scenario() {
        // Each of 100 integers becomes its own randomly-delayed 1-item
        // sequence; gather() must drive all 100 concurrently rather than
        // one at a time, so the wall-clock stays close to the slowest
        // single delay rather than their sum.
        let base = Stage::from_fn("Ns", |ns: Vec<i32>| ns);
        let delayed = base.map(|n: i32| {
            let delay_ms = fastrand::u64(0..20);
            let seq: BoxStream<'static, i32> = Box::pin(async_stream::try_stream! {
                tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
                yield n + 1;
            });
            seq
        });
        let summed = delayed
            .gather()
            .and_then(|lists: Vec<Vec<i32>>| async move {
                Ok(lists.into_iter().flatten().sum::<i32>())
            });

        let input: Vec<i32> = (0..100).collect();
        let start = std::time::Instant::now();
        let out = collect_final(summed.call(input)).await.unwrap();
        let elapsed = start.elapsed();

        assert_eq!(out, vec![5050]);
        assert!(
            elapsed < std::time::Duration::from_millis(500),
            "gather took {elapsed:?}, looks serial rather than concurrent"
        );
    }

    #[tokio::test]
    async fn gather_on_empty_sequence_list_yields_empty() {
        let stage: SingleOutputStage<i32, Vec<BoxStream<'static, i32>>> =
            SingleOutputStage::new("Seqs", |_: i32| {
                Box::pin(async_stream::try_stream! {
                    yield Emission::final_value(StageName::new("Seqs"), Vec::new());
                })
            });
        let gathered = stage.gather();
        let out = collect_final(gathered.call(0)).await.unwrap();
        assert_eq!(out, vec![Vec::<Vec<i32>>::new()]);
    }
}
