//! Subscriber types for the reactive system.
//!
//! A subscriber is any computation that can be notified through a [`Dep`]:
//! plain effects and the effects backing computed cells. Effects are generic
//! over the value their function returns, so the dependency graph talks to
//! them through the type-erased [`Subscriber`] trait and its shared
//! [`EffectCore`] state.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;

use super::context;
use super::debug::DebugHook;
use super::dep::Dep;
use super::effect::Scheduler;

/// Unique identifier for an effect.
///
/// Each effect gets a unique ID when created. Deps key their subscriber sets
/// by this ID, which is what keeps a subscriber from being added twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EffectId(u64);

impl EffectId {
    /// Generate a new unique effect ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for EffectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EffectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "effect#{}", self.0)
    }
}

/// The non-generic face of a reactive effect.
pub(crate) trait Subscriber {
    /// Shared bookkeeping state.
    fn core(&self) -> &EffectCore;

    /// Run the effect, discarding whatever its function returns.
    fn rerun(self: Rc<Self>);
}

/// State every effect carries regardless of its return type.
pub(crate) struct EffectCore {
    pub(crate) id: EffectId,
    /// Deps this effect is currently subscribed to, in subscription order.
    pub(crate) deps: RefCell<SmallVec<[Rc<Dep>; 4]>>,
    pub(crate) active: Cell<bool>,
    /// The effect that was running when this one started. Only set during a run.
    pub(crate) parent: RefCell<Option<Rc<dyn Subscriber>>>,
    pub(crate) allow_recurse: Cell<bool>,
    pub(crate) defer_stop: Cell<bool>,
    /// Set when the effect backs a computed cell.
    pub(crate) backs_computed: Cell<bool>,
    pub(crate) scheduler: RefCell<Scheduler>,
    pub(crate) on_stop: RefCell<Option<Rc<dyn Fn()>>>,
    pub(crate) on_track: RefCell<Option<DebugHook>>,
    pub(crate) on_trigger: RefCell<Option<DebugHook>>,
}

impl EffectCore {
    pub(crate) fn new() -> Self {
        Self {
            id: EffectId::new(),
            deps: RefCell::new(SmallVec::new()),
            active: Cell::new(true),
            parent: RefCell::new(None),
            allow_recurse: Cell::new(false),
            defer_stop: Cell::new(false),
            backs_computed: Cell::new(false),
            scheduler: RefCell::new(Scheduler::Default),
            on_stop: RefCell::new(None),
            on_track: RefCell::new(None),
            on_trigger: RefCell::new(None),
        }
    }

    /// Unsubscribe from every dep and forget them.
    pub(crate) fn cleanup(&self) {
        let deps = std::mem::take(&mut *self.deps.borrow_mut());
        for dep in &deps {
            dep.remove(self.id);
        }
        if !deps.is_empty() {
            tracing::trace!(effect = %self.id, count = deps.len(), "cleared subscriptions");
        }
    }

    /// Dispose of the effect.
    ///
    /// Stopping an effect that is running, either as the current effect or
    /// as an ancestor of it, is deferred until its run finishes.
    pub(crate) fn stop(&self) {
        if context::is_running(self.id) {
            self.defer_stop.set(true);
            tracing::debug!(effect = %self.id, "stop deferred until run completes");
            return;
        }

        if self.active.get() {
            self.cleanup();
            let on_stop = self.on_stop.borrow().clone();
            if let Some(on_stop) = on_stop {
                on_stop();
            }
            self.active.set(false);
            tracing::debug!(effect = %self.id, "effect stopped");
        }
    }
}

impl Drop for EffectCore {
    fn drop(&mut self) {
        for dep in self.deps.get_mut().drain(..) {
            dep.remove(self.id);
        }
    }
}

/// Type-erased handle to an effect of any return type.
///
/// Handed to custom schedulers and effect scopes. Holding a handle keeps the
/// effect alive.
#[derive(Clone)]
pub struct EffectHandle(pub(crate) Rc<dyn Subscriber>);

impl EffectHandle {
    /// The effect's unique ID.
    pub fn id(&self) -> EffectId {
        self.0.core().id
    }

    /// Run the effect now, discarding its result.
    pub fn run(&self) {
        Rc::clone(&self.0).rerun();
    }

    /// Stop the effect. See [`ReactiveEffect::stop`](super::ReactiveEffect::stop).
    pub fn stop(&self) {
        self.0.core().stop();
    }

    /// Whether the effect still tracks dependencies.
    pub fn is_active(&self) -> bool {
        self.0.core().active.get()
    }

    /// Whether this effect backs a computed cell.
    pub fn backs_computed(&self) -> bool {
        self.0.core().backs_computed.get()
    }

    /// Number of deps the effect is subscribed to.
    pub fn dep_count(&self) -> usize {
        self.0.core().deps.borrow().len()
    }
}

impl fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectHandle")
            .field("id", &self.id())
            .field("active", &self.is_active())
            .finish()
    }
}
