//! # stagepipe
//!
//! Composable, typed async stream pipelines: a small combinator algebra
//! ([`Stage`] and [`SingleOutputStage`]) for building LLM token-streaming
//! workflows out of named, reusable, lazily-evaluated transforms.
//!
//! ## Core Concepts
//!
//! - **[`Stage<T, U>`]** — a named, reusable transform from one input value
//!   to a lazy sequence of [`Emission<U>`]s. Composable via `map`, `filter`,
//!   `and_then`, `and_then_stage`, `pipe`, `collect`, `join`, `gather`,
//!   `on_error`.
//! - **[`Emission<V>`]** — the envelope a stage yields: either a `Trace`
//!   value (an intermediate token, for observability) or exactly the
//!   sequence's terminal `Final` value.
//! - **[`SingleOutputStage<T, U>`]** — a stage specialized to produce at
//!   most one final value per call, enforced at runtime.
//! - **[`adapter`] / [`adapters`]** — the boundary to a real token source
//!   (an HTTP model server, a blocking iterator): [`AdapterCtx`] carries the
//!   shared client/cancellation/event-handler state an adapter needs, and
//!   [`MockAdapter`] / [`OllamaAdapter`] are reference implementations.
//!
//! ## Quick Start
//!
//! ```no_run
//! use stagepipe::{Stage, debug_util::collect_final};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let shout = Stage::from_fn("Shout", |line: String| {
//!         vec![line.to_uppercase()]
//!     });
//!     let exclaim = shout.map(|s: String| format!("{s}!"));
//!
//!     let out = collect_final(exclaim.call("hello".to_string())).await?;
//!     println!("{out:?}");
//!     Ok(())
//! }
//! ```
//!
//! Streaming a real token source through the same combinators:
//!
//! ```no_run
//! use stagepipe::adapters::MockAdapter;
//! use stagepipe::debug_util::collect_final;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let reply = MockAdapter::fixed("Model", "hello there")
//!         .into_stage()
//!         .map(|s: String| s.to_uppercase());
//!
//!     let out = collect_final(reply.call("prompt".into())).await?;
//!     println!("{out:?}");
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod adapters;
pub mod debug_util;
pub mod emission;
pub mod error;
pub mod events;
pub mod seq;
pub mod single;
pub mod stage;
pub mod streaming;

pub use adapter::{blocking_bridge, AdapterCtx};
pub use adapters::{MockAdapter, OllamaAdapter};
pub use debug_util::{collect_final, debug, filter_final, join_final};
pub use emission::{Emission, EmissionData, Render, StageName, TraceValue};
pub use error::{PipelineError, Result};
pub use events::{Event, EventHandler, FnEventHandler};
pub use seq::{collect, from_values, gather, join, merge, next_item, tee, BoxStream};
pub use single::SingleOutputStage;
pub use stage::Stage;
pub use streaming::StreamingDecoder;
