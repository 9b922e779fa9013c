//! Error types for the reactive engine.
//!
//! The engine makes its own control-flow decisions silently (suppressed
//! self-triggers, exhaustive re-tracking past the marker depth). Errors only
//! surface from explicit `try_*` entry points and configuration.

use thiserror::Error;

/// Errors reported by fallible reactive operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// A write to a computed cell that has no setter.
    #[error("write operation failed: computed value is readonly")]
    ReadonlyComputed,

    /// A computed cell was read by its own getter before it produced a value.
    #[error("computed value was read by its own getter before it produced a value")]
    CyclicComputed,

    /// The requested recursion marker width is wider than the masks allow.
    #[error("max_marker_bits {requested} exceeds the supported maximum of {max}")]
    MarkerBitsOutOfRange { requested: u32, max: u32 },
}

/// Result type alias for reactive operations.
pub type Result<T> = std::result::Result<T, ReactiveError>;
