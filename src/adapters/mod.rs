//! Concrete adapters built on the [`AdapterCtx`](crate::adapter::AdapterCtx)
//! contract.
//!
//! [`mock`] is a deterministic, canned-response source for tests and
//! examples. [`ollama`] reaches an actual running Ollama server over
//! NDJSON streaming.

pub mod mock;
pub mod ollama;

pub use mock::MockAdapter;
pub use ollama::OllamaAdapter;
