//! Adapter for Ollama's native streaming API.
//!
//! Posts to `/api/generate`, decodes the NDJSON response body with
//! [`StreamingDecoder`], and streams each `"response"` token out as a trace
//! emission before yielding the accumulated text as the final. Retries
//! transient HTTP failures (429, 5xx) with capped exponential backoff.

use futures::stream::StreamExt;

use crate::adapter::AdapterCtx;
use crate::emission::{Emission, StageName};
use crate::error::PipelineError;
use crate::events::{emit, Event};
use crate::stage::Stage;
use crate::streaming::StreamingDecoder;

/// Reaches a running Ollama server over HTTP.
#[derive(Clone)]
pub struct OllamaAdapter {
    name: StageName,
    base_url: String,
    model: String,
    ctx: AdapterCtx,
    max_retries: u32,
}

impl OllamaAdapter {
    pub fn new(
        name: impl Into<StageName>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            model: model.into(),
            ctx: AdapterCtx::default(),
            max_retries: 3,
        }
    }

    pub fn with_ctx(mut self, ctx: AdapterCtx) -> Self {
        self.ctx = ctx;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Present this adapter as the [`Stage`] a composition consumes. Input
    /// is the prompt text; the stream's final is the complete response.
    pub fn into_stage(self) -> Stage<String, String> {
        let name = self.name.clone();
        Stage::new(name.clone(), move |prompt: String| {
            let name = name.clone();
            let base_url = self.base_url.clone();
            let model = self.model.clone();
            let ctx = self.ctx.clone();
            let max_retries = self.max_retries;
            Box::pin(async_stream::try_stream! {
                ctx.check_cancelled()?;
                emit(&ctx.event_handler, Event::StageStart { name: name.to_string() });

                let url = format!("{}/api/generate", base_url.trim_end_matches('/'));
                let body = serde_json::json!({
                    "model": model,
                    "prompt": prompt,
                    "stream": true,
                });

                let mut attempt = 0u32;
                let resp = loop {
                    let sent = ctx.client.post(&url).json(&body).send().await;
                    match sent {
                        Ok(resp) if resp.status().is_success() => break resp,
                        Ok(resp) => {
                            let status = resp.status().as_u16();
                            let text = resp.text().await.unwrap_or_default();
                            let retryable = status == 429 || status >= 500;
                            if !retryable || attempt >= max_retries {
                                Err(PipelineError::HttpError { status, body: text, retry_after: None })?;
                            }
                            attempt += 1;
                            let delay_ms = 100u64.saturating_mul(1u64 << attempt) + fastrand::u64(0..50);
                            emit(&ctx.event_handler, Event::AdapterRetry {
                                name: name.to_string(),
                                attempt,
                                delay_ms,
                                reason: format!("HTTP {status}: {text}"),
                            });
                            tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
                        }
                        Err(e) => {
                            Err(PipelineError::AdapterError(e.to_string()))?;
                        }
                    }
                };

                let mut bytes = resp.bytes_stream();
                let mut decoder = StreamingDecoder::new();
                let mut accumulated = String::new();

                while let Some(chunk) = bytes.next().await {
                    ctx.check_cancelled()?;
                    let chunk = chunk.map_err(|e| PipelineError::AdapterError(e.to_string()))?;
                    for value in decoder.decode(&chunk) {
                        if let Some(token) = value.get("response").and_then(|v| v.as_str()) {
                            if !token.is_empty() {
                                accumulated.push_str(token);
                                emit(&ctx.event_handler, Event::AdapterToken {
                                    name: name.to_string(),
                                    chunk: token.to_string(),
                                });
                                yield Emission::trace(name.clone(), token.to_string());
                            }
                        }
                    }
                }
                if let Some(value) = decoder.flush() {
                    if let Some(token) = value.get("response").and_then(|v| v.as_str()) {
                        if !token.is_empty() {
                            accumulated.push_str(token);
                            yield Emission::trace(name.clone(), token.to_string());
                        }
                    }
                }

                emit(&ctx.event_handler, Event::StageEnd { name: name.to_string(), ok: true });
                yield Emission::final_value(name.clone(), accumulated);
            })
        })
    }
}
