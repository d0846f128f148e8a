//! Event system for stage and adapter lifecycle hooks.
//!
//! Provides an optional, non-intrusive way to observe a composition while it
//! runs. Stages emit events as they start and finish; adapters emit events as
//! tokens arrive and as they retry. Users can implement [`EventHandler`] to
//! receive these events for logging, progress tracking, or streaming UIs.
//!
//! This is deliberately a separate channel from [`debug`](crate::debug_util::debug):
//! `debug` taps one composition's [`Emission`](crate::emission::Emission)
//! values; events report on invocation boundaries across the whole run,
//! whether or not anyone is tapping emissions.

use std::sync::Arc;

/// Events emitted during a run.
#[derive(Debug, Clone)]
pub enum Event {
    /// A stage has started executing.
    StageStart {
        /// The stage's composed name at the time it started.
        name: String,
    },
    /// A stage has finished executing.
    StageEnd {
        /// The stage's composed name.
        name: String,
        /// Whether it finished without error.
        ok: bool,
    },
    /// An adapter received one token from its external source.
    AdapterToken {
        /// Instance name of the adapter.
        name: String,
        /// The token text.
        chunk: String,
    },
    /// An adapter is retrying a failed request to its external source.
    AdapterRetry {
        /// Instance name of the adapter.
        name: String,
        /// The retry attempt number (1-indexed).
        attempt: u32,
        /// Delay before this retry attempt in milliseconds.
        delay_ms: u64,
        /// Reason for the retry (error description).
        reason: String,
    },
}

/// Handler for stage and adapter lifecycle events.
///
/// Implement this trait to receive streaming tokens, progress updates, and
/// other lifecycle signals while a composition runs.
///
/// This is entirely optional — stages and adapters work without an event
/// handler.
///
/// # Example
///
/// ```
/// use stagepipe::events::{Event, EventHandler};
///
/// struct PrintHandler;
///
/// impl EventHandler for PrintHandler {
///     fn on_event(&self, event: Event) {
///         match event {
///             Event::AdapterToken { chunk, .. } => print!("{}", chunk),
///             Event::StageStart { name } => println!("[start] {}", name),
///             Event::StageEnd { name, ok } => println!("[end] {} ok={}", name, ok),
///             Event::AdapterRetry { .. } => {}
///         }
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync {
    /// Called when a stage or adapter emits an event.
    fn on_event(&self, event: Event);
}

/// Emit an event if a handler is present. No-op otherwise.
pub(crate) fn emit(handler: &Option<Arc<dyn EventHandler>>, event: Event) {
    if let Some(ref h) = handler {
        h.on_event(event);
    }
}

/// An [`EventHandler`] backed by a closure.
///
/// # Example
///
/// ```
/// use stagepipe::events::{Event, FnEventHandler};
/// use std::sync::Arc;
///
/// let handler = Arc::new(FnEventHandler(|event: Event| {
///     if let Event::AdapterToken { chunk, .. } = event {
///         print!("{}", chunk);
///     }
/// }));
/// ```
pub struct FnEventHandler<F: Fn(Event) + Send + Sync>(pub F);

impl<F: Fn(Event) + Send + Sync> EventHandler for FnEventHandler<F> {
    fn on_event(&self, event: Event) {
        (self.0)(event);
    }
}
