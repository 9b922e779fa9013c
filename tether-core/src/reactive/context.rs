//! Run Context
//!
//! The run context tracks which effect is currently running, whether reads
//! are being recorded, and how deeply effect runs are nested.
//!
//! # Implementation
//!
//! Each thread owns one context in thread-local storage. Entering an effect
//! run goes through [`RunScope`], a guard that installs the effect, assigns
//! the next recursion bit and restores the enclosing level when dropped. The
//! guard also restores the context when user code panics, so a failed run
//! never leaves a dangling current effect behind.
//!
//! Tracking can be paused independently of effect runs with
//! [`pause_tracking`], [`enable_tracking`] and [`reset_tracking`], which keep
//! a stack of previous states. Calls must be balanced.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::config::RuntimeConfig;
use super::subscriber::{EffectCore, EffectId, Subscriber};

struct RunContext {
    active_effect: RefCell<Option<Rc<dyn Subscriber>>>,
    should_track: Cell<bool>,
    track_stack: RefCell<Vec<bool>>,
    depth: Cell<u32>,
    track_op_bit: Cell<u32>,
    /// Whether the run at the current depth diffs with marker bits.
    markers: Cell<bool>,
    config: Cell<RuntimeConfig>,
}

impl RunContext {
    fn new() -> Self {
        Self {
            active_effect: RefCell::new(None),
            should_track: Cell::new(true),
            track_stack: RefCell::new(Vec::new()),
            depth: Cell::new(0),
            track_op_bit: Cell::new(1),
            markers: Cell::new(false),
            config: Cell::new(RuntimeConfig::default()),
        }
    }
}

thread_local! {
    static RUN_CONTEXT: RunContext = RunContext::new();
}

/// The effect currently running, if any.
pub(crate) fn active_effect() -> Option<Rc<dyn Subscriber>> {
    RUN_CONTEXT.with(|ctx| ctx.active_effect.borrow().clone())
}

/// ID of the effect currently running, if any.
pub(crate) fn active_effect_id() -> Option<EffectId> {
    RUN_CONTEXT.with(|ctx| ctx.active_effect.borrow().as_ref().map(|e| e.core().id))
}

/// Whether the effect is the current one or any of its running ancestors.
pub(crate) fn is_running(id: EffectId) -> bool {
    let mut running = active_effect();
    while let Some(effect) = running {
        if effect.core().id == id {
            return true;
        }
        running = effect.core().parent.borrow().clone();
    }
    false
}

pub(crate) fn should_track() -> bool {
    RUN_CONTEXT.with(|ctx| ctx.should_track.get())
}

/// Whether a read right now would be recorded as a dependency.
pub fn is_tracking() -> bool {
    RUN_CONTEXT.with(|ctx| ctx.should_track.get() && ctx.active_effect.borrow().is_some())
}

/// Current effect nesting depth. Zero outside of any run.
pub fn depth() -> u32 {
    RUN_CONTEXT.with(|ctx| ctx.depth.get())
}

pub(crate) fn track_op_bit() -> u32 {
    RUN_CONTEXT.with(|ctx| ctx.track_op_bit.get())
}

pub(crate) fn uses_markers() -> bool {
    RUN_CONTEXT.with(|ctx| ctx.markers.get())
}

pub(crate) fn config() -> RuntimeConfig {
    RUN_CONTEXT.with(|ctx| ctx.config.get())
}

pub(crate) fn set_config(config: RuntimeConfig) {
    RUN_CONTEXT.with(|ctx| ctx.config.set(config));
}

/// Stop recording reads until the matching [`reset_tracking`].
pub fn pause_tracking() {
    RUN_CONTEXT.with(|ctx| {
        ctx.track_stack.borrow_mut().push(ctx.should_track.get());
        ctx.should_track.set(false);
    });
}

/// Record reads until the matching [`reset_tracking`], even inside a pause.
pub fn enable_tracking() {
    RUN_CONTEXT.with(|ctx| {
        ctx.track_stack.borrow_mut().push(ctx.should_track.get());
        ctx.should_track.set(true);
    });
}

/// Undo the most recent [`pause_tracking`] or [`enable_tracking`].
pub fn reset_tracking() {
    RUN_CONTEXT.with(|ctx| {
        let last = ctx.track_stack.borrow_mut().pop();
        ctx.should_track.set(last.unwrap_or(true));
    });
}

/// Run `f` without recording any reads it performs.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    struct Reset;
    impl Drop for Reset {
        fn drop(&mut self) {
            reset_tracking();
        }
    }

    pause_tracking();
    let _reset = Reset;
    f()
}

/// Guard for one effect run.
///
/// Entering installs the effect as current with tracking enabled, assigns
/// the next recursion bit and pre-marks the effect's existing deps. Dropping
/// finalizes stale-dep removal and restores the enclosing level.
pub(crate) struct RunScope {
    effect: Rc<dyn Subscriber>,
    last_should_track: bool,
    last_markers: bool,
    markers: bool,
}

impl RunScope {
    pub(crate) fn enter(effect: Rc<dyn Subscriber>) -> Self {
        let (last_should_track, last_markers, markers) = RUN_CONTEXT.with(|ctx| {
            let previous = ctx.active_effect.replace(Some(Rc::clone(&effect)));
            *effect.core().parent.borrow_mut() = previous;
            let last_should_track = ctx.should_track.replace(true);

            let depth = ctx.depth.get() + 1;
            ctx.depth.set(depth);
            ctx.track_op_bit.set(1u32.checked_shl(depth).unwrap_or(0));

            let markers = ctx.config.get().uses_markers_at(depth);
            let last_markers = ctx.markers.replace(markers);
            (last_should_track, last_markers, markers)
        });

        let core = effect.core();
        if markers {
            init_dep_markers(core, track_op_bit());
        } else {
            tracing::trace!(effect = %core.id, depth = depth(), "exhaustive re-tracking");
            core.cleanup();
        }

        Self {
            effect,
            last_should_track,
            last_markers,
            markers,
        }
    }
}

impl Drop for RunScope {
    fn drop(&mut self) {
        let core = self.effect.core();
        if self.markers {
            finalize_dep_markers(core, track_op_bit());
        }

        RUN_CONTEXT.with(|ctx| {
            let depth = ctx.depth.get().saturating_sub(1);
            ctx.depth.set(depth);
            ctx.track_op_bit.set(1u32.checked_shl(depth).unwrap_or(0));
            ctx.markers.set(self.last_markers);

            let parent = core.parent.borrow_mut().take();
            let popped = ctx.active_effect.replace(parent);
            debug_assert!(
                popped.as_ref().is_some_and(|e| e.core().id == core.id),
                "RunScope mismatch: expected {}",
                core.id
            );
            ctx.should_track.set(self.last_should_track);
        });

        if core.defer_stop.replace(false) {
            core.stop();
        }
    }
}

/// Mark every current dep as already tracked at this level.
fn init_dep_markers(core: &EffectCore, bit: u32) {
    for dep in core.deps.borrow().iter() {
        dep.mark_was_tracked(bit);
    }
}

/// Drop deps that were tracked before this run but not during it.
fn finalize_dep_markers(core: &EffectCore, bit: u32) {
    let id = core.id;
    let mut removed = 0usize;
    core.deps.borrow_mut().retain(|dep| {
        let stale = dep.was_tracked(bit) && !dep.newly_tracked(bit);
        if stale {
            dep.remove(id);
            removed += 1;
        }
        dep.clear_bit(bit);
        !stale
    });
    if removed > 0 {
        tracing::trace!(effect = %id, removed, "dropped stale subscriptions");
    }
}
