//! A deterministic, canned-response adapter for tests and examples.
//!
//! Grounded on the same idea as a test double for any real transport:
//! cycle through a fixed list of responses so downstream code can be
//! tested without a live model server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::emission::{Emission, StageName};
use crate::stage::Stage;

/// Returns pre-configured responses in order, cycling once exhausted.
///
/// Each response streams out word by word as trace emissions before the
/// full text is yielded as the final — mirroring how a real token source
/// like [`OllamaAdapter`](crate::adapters::OllamaAdapter) behaves, so code
/// written against the mock exercises the same incremental-consumption
/// paths it would see in production.
#[derive(Clone)]
pub struct MockAdapter {
    name: StageName,
    responses: Arc<Vec<String>>,
    index: Arc<AtomicUsize>,
}

impl MockAdapter {
    /// Build an adapter with the given canned responses. Panics if
    /// `responses` is empty — there is no sensible default to cycle to.
    pub fn new(name: impl Into<StageName>, responses: Vec<String>) -> Self {
        assert!(
            !responses.is_empty(),
            "MockAdapter requires at least one response"
        );
        Self {
            name: name.into(),
            responses: Arc::new(responses),
            index: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// An adapter that always returns the same response.
    pub fn fixed(name: impl Into<StageName>, response: impl Into<String>) -> Self {
        Self::new(name, vec![response.into()])
    }

    fn next_response(&self) -> String {
        let idx = self.index.fetch_add(1, Ordering::Relaxed) % self.responses.len();
        self.responses[idx].clone()
    }

    /// Present this adapter as the [`Stage`] a composition consumes.
    pub fn into_stage(self) -> Stage<String, String> {
        let name = self.name.clone();
        Stage::new(name.clone(), move |_prompt: String| {
            let text = self.next_response();
            let name = name.clone();
            Box::pin(async_stream::try_stream! {
                for word in text.split_inclusive(' ') {
                    yield Emission::trace(name.clone(), word.to_string());
                }
                yield Emission::final_value(name.clone(), text);
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debug_util::collect_final;
    use futures::stream::StreamExt;

    #[tokio::test]
    async fn fixed_response_is_returned_every_call() {
        let adapter = MockAdapter::fixed("M", "hello there").into_stage();
        let out = collect_final(adapter.call("ignored".into())).await.unwrap();
        assert_eq!(out, vec!["hello there".to_string()]);
    }

    #[tokio::test]
    async fn responses_cycle_in_order() {
        let adapter = MockAdapter::new("M", vec!["first".into(), "second".into()]);
        let r1 = collect_final(adapter.clone().into_stage().call("x".into()))
            .await
            .unwrap();
        let r2 = collect_final(adapter.clone().into_stage().call("x".into()))
            .await
            .unwrap();
        let r3 = collect_final(adapter.into_stage().call("x".into()))
            .await
            .unwrap();
        assert_eq!(r1, vec!["first".to_string()]);
        assert_eq!(r2, vec!["second".to_string()]);
        assert_eq!(r3, vec!["first".to_string()]);
    }

    #[tokio::test]
    async fn tokens_stream_before_the_final() {
        let mut out = MockAdapter::fixed("M", "a b").into_stage().call("x".into());
        let first = out.next().await.unwrap().unwrap();
        assert!(!first.is_final());
        let second = out.next().await.unwrap().unwrap();
        assert!(!second.is_final());
        let third = out.next().await.unwrap().unwrap();
        assert_eq!(third.into_final(), Some("a b".to_string()));
    }

    #[tokio::test]
    async fn adapter_composes_like_any_other_stage() {
        let upper = MockAdapter::fixed("M", "hello world")
            .into_stage()
            .map(|s: String| s.to_uppercase());
        let out = collect_final(upper.call("prompt".into())).await.unwrap();
        assert_eq!(out, vec!["HELLO WORLD".to_string()]);
    }
}
