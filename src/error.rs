use std::time::Duration;
use thiserror::Error;

/// Errors produced by the pipeline and its components.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Low-level HTTP transport failure (connection refused, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// JSON parsing failed at the serde level.
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP error with status code, response body, and optional Retry-After hint.
    ///
    /// Returned by adapters (see [`crate::adapter`]) when the provider
    /// returns a non-success status code. The `retry_after` field is
    /// populated from the `Retry-After` response header when present.
    #[error("HTTP {status}: {body}")]
    HttpError {
        /// HTTP status code (e.g. 429, 500, 503).
        status: u16,
        /// Response body text.
        body: String,
        /// Parsed `Retry-After` header value, if present.
        retry_after: Option<Duration>,
    },

    /// An external adapter (the boundary to a real token source) failed.
    ///
    /// Renders as the bare message with no added prefix, matching the
    /// original's `str(exception) == message` ground truth — an
    /// `on_error` handler formatting `{err}` sees exactly the adapter's
    /// own wording.
    #[error("{0}")]
    AdapterError(String),

    /// A combinator's own structural guarantee was violated by the stage it
    /// wraps — e.g. a [`SingleOutputStage`](crate::single::SingleOutputStage)
    /// whose wrapped stage produced more than one final value, or
    /// [`next_item`](crate::seq::next_item) called on an exhausted sequence.
    /// Always a bug in the wrapped stage, never a transport or data issue.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An adapter observed its cancellation signal and stopped mid-stream.
    #[error("cancelled by upstream")]
    UpstreamCancelled,

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        PipelineError::Other(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
