//! Final-filtering helpers and the `debug()` tracing tap.
//!
//! These mirror the four free functions the original exposes for consuming
//! a composed stage's output: project down to just the logical result
//! (`filter_final`, `collect_final`, `join_final`), or observe every
//! emission as it passes through (`debug`).

use futures::stream::StreamExt;

use crate::emission::{Emission, Render, StageName};
use crate::error::Result;
use crate::seq::BoxStream;
use crate::stage::Stage;

/// Project a stream of emissions down to just the final payloads, in
/// production order.
pub fn filter_final<'a, V: Send + 'a>(
    mut seq: BoxStream<'a, Emission<V>>,
) -> BoxStream<'a, V> {
    Box::pin(async_stream::try_stream! {
        while let Some(item) = seq.next().await {
            let emission = item?;
            if let Some(v) = emission.into_final() {
                yield v;
            }
        }
    })
}

/// `collect` over just the finals.
pub async fn collect_final<V: Send>(seq: BoxStream<'_, Emission<V>>) -> Result<Vec<V>> {
    let mut finals = filter_final(seq);
    let mut out = Vec::new();
    while let Some(item) = finals.next().await {
        out.push(item?);
    }
    Ok(out)
}

/// `join` over just the finals. Requires `V = String`.
pub async fn join_final(seq: BoxStream<'_, Emission<String>>, sep: &str) -> Result<String> {
    Ok(collect_final(seq).await?.join(sep))
}

/// Wrap a stage so every emission it produces is also printed to stdout:
/// a header line whenever the producing stage's name changes, then the
/// payload rendered via [`Render`].
///
/// This is a pure pass-through combinator — it changes neither ordering nor
/// finality. It is distinct from the ambient lifecycle logging emitted at
/// stage-invocation boundaries (see [`crate::events`]): `debug` is an
/// explicit tap a caller opts into over one composition's emissions.
pub fn debug<T: Send + 'static, U: Render + Send + Sync + Clone + 'static>(
    stage: Stage<T, U>,
) -> Stage<T, U> {
    let name = stage.name().clone();
    Stage::new(name, move |input: T| {
        let mut src = stage.call(input);
        Box::pin(async_stream::try_stream! {
            let mut last_stage: Option<StageName> = None;
            while let Some(item) = src.next().await {
                let emission = item?;
                if last_stage.as_ref() != Some(&emission.stage) {
                    println!("=== {} ===", emission.stage);
                    last_stage = Some(emission.stage.clone());
                }
                println!("{}", emission.render());
                yield emission;
            }
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::Stage;

    #[tokio::test]
    async fn filter_final_keeps_only_finals() {
        let stage = Stage::from_fn("N", |n: i32| (0..n).collect::<Vec<_>>())
            .map(|x: i32| x * 2);
        let out: Vec<i32> = collect_final(stage.call(3)).await.unwrap();
        assert_eq!(out, vec![0, 2, 4]);
    }

    #[tokio::test]
    async fn join_final_matches_string_join() {
        let stage = Stage::from_fn("S", |s: String| {
            s.split(',').map(|p| p.to_string()).collect::<Vec<_>>()
        });
        let out = join_final(stage.call("a,b,c".to_string()), "+")
            .await
            .unwrap();
        assert_eq!(out, "a+b+c");
    }

    #[tokio::test]
    async fn debug_preserves_ordering_and_finality() {
        let stage = Stage::from_fn("N", |n: i32| (0..n).collect::<Vec<_>>());
        let traced = debug(stage);
        let out = collect_final(traced.call(3)).await.unwrap();
        assert_eq!(out, vec![0, 1, 2]);
    }
}
