//! Reactive Engine
//!
//! This module implements fine-grained dependency tracking: effects record
//! which keys of which targets they read, and mutations re-run exactly the
//! effects whose inputs changed.
//!
//! # Concepts
//!
//! ## Targets and Deps
//!
//! A target is any `Rc`-shared value an interception layer watches. Each
//! `(target, key)` pair that has been read inside an effect gets a [`Dep`],
//! the set of effects subscribed to it. The association is weak, so tracked
//! targets are dropped normally.
//!
//! ## Effects
//!
//! A [`ReactiveEffect`] runs a function while recording its reads through
//! [`track`]. A later [`trigger`] on one of those keys re-runs the effect, or
//! calls its [`Scheduler`] instead. Dependencies are re-diffed on every run,
//! so keys that stop being read stop notifying.
//!
//! ## Computed Cells
//!
//! A [`Computed`] cell caches a derived value. Upstream changes only mark it
//! dirty; it recomputes on the next read.
//!
//! # Implementation Notes
//!
//! The run context lives in thread-local storage. Each nested effect run gets
//! its own bit in the per-dep tracking masks, which lets a run find stale
//! dependencies without clearing and re-subscribing everything. Past the
//! configured marker depth the engine falls back to exhaustive re-tracking.

mod computed;
mod config;
mod context;
mod debug;
mod dep;
mod effect;
mod error;
mod runtime;
mod subscriber;
mod target;

pub use computed::{computed, computed_with, Computed, ComputedOptions};
pub use config::{configure, current_config, RuntimeConfig, TrackingStrategy, MAX_MARKER_BITS};
pub use context::{depth, enable_tracking, is_tracking, pause_tracking, reset_tracking, untracked};
pub use debug::{DebugHook, DebugOp, DebugOptions, DebuggerEvent, Value};
pub use dep::Dep;
pub use effect::{
    effect, effect_with, stop, EffectOptions, EffectRunner, EffectScope, ReactiveEffect, Scheduler,
};
pub use error::{ReactiveError, Result};
pub use runtime::{
    dep_of, sweep_dead_targets, track, track_effects, tracked_target_count, trigger,
    trigger_effects, trigger_with, TriggerPayload,
};
pub use subscriber::{EffectHandle, EffectId};
pub use target::{Key, Target, TargetKind, TrackOpType, TriggerOpType};
