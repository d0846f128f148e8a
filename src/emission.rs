//! The envelope that crosses every stage boundary.
//!
//! A composed [`Stage`](crate::stage::Stage) fans many nested stages'
//! outputs through a single lazy sequence. [`Emission`] is how a consumer
//! tells those outputs apart: which stage produced a value, and whether it
//! belongs to the outermost logical result.
//!
//! The payload itself is only statically typed on the final path. Python's
//! original `data: Union[T, Any]` has no honest Rust translation, so
//! intermediate payloads are type-erased into a [`TraceValue`] that only the
//! [`debug`](crate::debug_util::debug) tap inspects; combinator logic never
//! looks inside one.

use std::fmt;
use std::sync::Arc;

/// A stage's identity, built compositionally as combinators are applied.
///
/// Names are never parsed, only displayed and appended to. `Words`,
/// `Words@map`, `Words@map@join` are all valid values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StageName(Arc<str>);

impl StageName {
    /// Start a fresh, unsuffixed name.
    pub fn new(base: impl Into<String>) -> Self {
        Self(Arc::from(base.into()))
    }

    /// Derive `self@op`.
    pub fn suffixed(&self, op: &str) -> Self {
        Self(Arc::from(format!("{self}@{op}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StageName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for StageName {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Dispatches to a type's own rendering when it has one, else falls back to
/// `Debug`. Mirrors the original's `__stream_debug__()`-if-present fallback
/// chain used by `debug()`.
///
/// Most types never need to implement this explicitly: a blanket default
/// based on `Debug` covers them (see [`render_debug`]). Implement it
/// directly only to give `debug()` a nicer rendering (e.g. truncating long
/// token text) than `{:?}` would produce.
pub trait Render {
    fn render(&self) -> String;
}

/// Helper for `impl Render for T` bodies that just want `Debug`'s output.
pub fn render_debug(value: &impl fmt::Debug) -> String {
    format!("{value:?}")
}

macro_rules! impl_render_via_debug {
    ($($t:ty),* $(,)?) => {
        $(impl Render for $t {
            fn render(&self) -> String {
                render_debug(self)
            }
        })*
    };
}

impl_render_via_debug!(
    String, bool, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64
);

impl<T: Render> Render for Vec<T> {
    fn render(&self) -> String {
        let parts: Vec<String> = self.iter().map(Render::render).collect();
        format!("[{}]", parts.join(", "))
    }
}

impl<T: Render> Render for Option<T> {
    fn render(&self) -> String {
        match self {
            Some(v) => v.render(),
            None => "None".to_string(),
        }
    }
}

/// Object-safe handle to an erased, render-capable intermediate payload.
///
/// Combinators never downcast or inspect a `TraceValue`'s contents; it
/// exists solely so [`debug`](crate::debug_util::debug) can print something
/// meaningful for non-final emissions without the engine needing to carry
/// their real type all the way through a composition.
pub trait RenderErased: Send + Sync {
    fn render_erased(&self) -> String;
}

impl<T: Render + Send + Sync> RenderErased for T {
    fn render_erased(&self) -> String {
        self.render()
    }
}

/// Type-erased, render-capable payload carried by non-final emissions.
#[derive(Clone)]
pub struct TraceValue(Arc<dyn RenderErased>);

impl TraceValue {
    pub fn new(value: impl RenderErased + 'static) -> Self {
        Self(Arc::new(value))
    }
}

impl fmt::Debug for TraceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.render_erased())
    }
}

impl Render for TraceValue {
    fn render(&self) -> String {
        self.0.render_erased()
    }
}

/// The payload half of an [`Emission`].
///
/// Exactly two constructors exist (`Emission::final_value`,
/// `Emission::trace`), so `is_final()` and the variant always agree; nothing
/// downstream can construct a mismatched pair.
#[derive(Debug, Clone)]
pub enum EmissionData<V> {
    /// Belongs to the outermost logical output.
    Final(V),
    /// An intermediate value from some nested stage, erased for tracing.
    Trace(TraceValue),
}

/// A single value crossing a stage boundary, tagged with its producer and
/// whether it is part of the outermost logical result.
#[derive(Debug, Clone)]
pub struct Emission<V> {
    /// The stage that actually produced `data` — never rewritten by an
    /// enclosing combinator.
    pub stage: StageName,
    pub data: EmissionData<V>,
}

impl<V> Emission<V> {
    /// Wrap a value this stage itself produced, as a final emission.
    pub fn final_value(stage: StageName, value: V) -> Self {
        Self {
            stage,
            data: EmissionData::Final(value),
        }
    }

    /// Wrap a nested stage's payload for tracing; always non-final.
    pub fn trace(stage: StageName, value: impl RenderErased + 'static) -> Self {
        Self {
            stage,
            data: EmissionData::Trace(TraceValue::new(value)),
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self.data, EmissionData::Final(_))
    }

    /// The final payload, if this emission is one.
    pub fn as_final(&self) -> Option<&V> {
        match &self.data {
            EmissionData::Final(v) => Some(v),
            EmissionData::Trace(_) => None,
        }
    }

    /// Consume into the final payload, if this emission is one.
    pub fn into_final(self) -> Option<V> {
        match self.data {
            EmissionData::Final(v) => Some(v),
            EmissionData::Trace(_) => None,
        }
    }

    /// Re-tag a non-final emission from a nested stage's output type `V` to
    /// the enclosing combinator's output type `W`. The payload is already
    /// erased, so this is a cheap re-wrap, never a conversion of real data.
    ///
    /// Panics if called on a final emission: combinators are structured to
    /// intercept finals explicitly before reaching this path, so that would
    /// be an internal logic error, not a reachable user-facing condition.
    pub fn retag<W>(self) -> Emission<W> {
        match self.data {
            EmissionData::Trace(t) => Emission {
                stage: self.stage,
                data: EmissionData::Trace(t),
            },
            EmissionData::Final(_) => {
                unreachable!("retag called on a final emission; combinators must intercept finals before re-tagging")
            }
        }
    }
}

impl<V: Render> Render for Emission<V> {
    fn render(&self) -> String {
        match &self.data {
            EmissionData::Final(v) => v.render(),
            EmissionData::Trace(t) => t.render(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_name_suffixing() {
        let base = StageName::new("Words");
        let mapped = base.suffixed("map");
        assert_eq!(mapped.as_str(), "Words@map");
        let joined = mapped.suffixed("join");
        assert_eq!(joined.as_str(), "Words@map@join");
        assert_eq!(base.as_str(), "Words");
    }

    #[test]
    fn final_and_trace_round_trip() {
        let stage = StageName::new("N");
        let fin = Emission::final_value(stage.clone(), 42i32);
        assert!(fin.is_final());
        assert_eq!(fin.as_final(), Some(&42));

        let tr = Emission::<i32>::trace(stage.clone(), 7i32);
        assert!(!tr.is_final());
        assert_eq!(tr.as_final(), None);
    }

    #[test]
    fn retag_preserves_stage_and_render() {
        let stage = StageName::new("N");
        let tr: Emission<i32> = Emission::trace(stage.clone(), 7i32);
        let retagged: Emission<String> = tr.retag();
        assert_eq!(retagged.stage, stage);
        assert!(!retagged.is_final());
        assert_eq!(retagged.render(), "7");
    }

    #[test]
    #[should_panic(expected = "retag called on a final emission")]
    fn retag_on_final_panics() {
        let fin: Emission<i32> = Emission::final_value(StageName::new("N"), 1);
        let _: Emission<String> = fin.retag();
    }

    #[test]
    fn render_dispatches_by_variant() {
        let stage = StageName::new("N");
        let fin = Emission::final_value(stage.clone(), 1i32);
        assert_eq!(fin.render(), "1");
        let tr: Emission<i32> = Emission::trace(stage, 2i32);
        assert_eq!(tr.render(), "2");
    }
}
