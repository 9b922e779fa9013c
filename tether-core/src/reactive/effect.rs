//! Effect Implementation
//!
//! A reactive effect wraps a function and re-runs it whenever state it read
//! during its last run changes.
//!
//! # How Effects Work
//!
//! 1. [`effect`] creates the effect and, unless it is lazy, runs it once to
//!    establish its dependencies.
//!
//! 2. Every read the function performs through [`track`](super::track)
//!    subscribes the effect to the matching dep.
//!
//! 3. When one of those deps is triggered, the effect re-runs immediately, or
//!    its scheduler is called instead if it has one.
//!
//! 4. Each run diffs the deps it read against the ones it read last time.
//!    Deps that were not read again are unsubscribed, so a branch that is no
//!    longer taken stops notifying the effect.
//!
//! # Recursion
//!
//! An effect never runs inside itself. If a run would start while the same
//! effect is already on the chain of running ancestors, it returns `None`
//! without calling the function. Separately, a trigger caused by an effect's
//! own writes is ignored unless the effect opted in with `allow_recurse`,
//! which is only useful together with a scheduler.
//!
//! # Ownership
//!
//! Deps hold their subscribers weakly. An effect lives as long as an
//! [`EffectRunner`], [`ReactiveEffect`], [`EffectHandle`] or effect scope
//! holds it; dropping the last one unsubscribes it everywhere.

use std::fmt;
use std::rc::Rc;

use super::context::RunScope;
use super::debug::{DebugHook, DebugOptions, DebuggerEvent};
use super::dep::Dep;
use super::subscriber::{EffectCore, EffectHandle, EffectId, Subscriber};

/// What happens when an effect is triggered.
#[derive(Clone, Default)]
pub enum Scheduler {
    /// Re-run the effect immediately.
    #[default]
    Default,
    /// Call this function instead. It receives the effect so it can run it
    /// later.
    Custom(Rc<dyn Fn(&EffectHandle)>),
}

impl Scheduler {
    /// Wrap a scheduling function.
    pub fn custom(schedule: impl Fn(&EffectHandle) + 'static) -> Self {
        Scheduler::Custom(Rc::new(schedule))
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheduler::Default => f.write_str("Default"),
            Scheduler::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// External grouping of effects for bulk disposal.
///
/// The scope is told about each effect created with it. Keeping the handle
/// keeps the effect alive; stopping every recorded handle disposes the group.
pub trait EffectScope {
    fn record(&self, effect: &EffectHandle);
}

/// Options for [`effect_with`].
#[derive(Clone, Default)]
pub struct EffectOptions {
    /// Skip the initial run.
    pub lazy: bool,
    pub scheduler: Scheduler,
    pub scope: Option<Rc<dyn EffectScope>>,
    /// Let the effect be triggered by its own writes.
    pub allow_recurse: bool,
    pub on_stop: Option<Rc<dyn Fn()>>,
    pub debug: DebugOptions,
}

impl EffectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    pub fn scheduler(mut self, schedule: impl Fn(&EffectHandle) + 'static) -> Self {
        self.scheduler = Scheduler::custom(schedule);
        self
    }

    pub fn scope(mut self, scope: Rc<dyn EffectScope>) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn allow_recurse(mut self) -> Self {
        self.allow_recurse = true;
        self
    }

    pub fn on_stop(mut self, on_stop: impl Fn() + 'static) -> Self {
        self.on_stop = Some(Rc::new(on_stop));
        self
    }

    pub fn on_track(mut self, hook: impl Fn(&DebuggerEvent) + 'static) -> Self {
        self.debug = self.debug.on_track(hook);
        self
    }

    pub fn on_trigger(mut self, hook: impl Fn(&DebuggerEvent) + 'static) -> Self {
        self.debug = self.debug.on_trigger(hook);
        self
    }
}

impl fmt::Debug for EffectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectOptions")
            .field("lazy", &self.lazy)
            .field("scheduler", &self.scheduler)
            .field("scope", &self.scope.is_some())
            .field("allow_recurse", &self.allow_recurse)
            .field("on_stop", &self.on_stop.is_some())
            .field("debug", &self.debug)
            .finish()
    }
}

pub(crate) struct EffectInner<T> {
    core: EffectCore,
    run: Box<dyn Fn() -> T>,
}

impl<T: 'static> Subscriber for EffectInner<T> {
    fn core(&self) -> &EffectCore {
        &self.core
    }

    fn rerun(self: Rc<Self>) {
        let _ = ReactiveEffect { inner: self }.run();
    }
}

/// The unit of reactive computation.
///
/// Clones share the same effect.
pub struct ReactiveEffect<T: 'static> {
    inner: Rc<EffectInner<T>>,
}

impl<T: 'static> ReactiveEffect<T> {
    /// Create an active effect without running it.
    pub fn new<F>(run: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self {
            inner: Rc::new(EffectInner {
                core: EffectCore::new(),
                run: Box::new(run),
            }),
        }
    }

    /// Create an effect whose triggers go to `scheduler`.
    pub fn with_scheduler<F>(run: F, scheduler: Scheduler) -> Self
    where
        F: Fn() -> T + 'static,
    {
        let effect = Self::new(run);
        *effect.inner.core.scheduler.borrow_mut() = scheduler;
        effect
    }

    /// Run the function with dependency tracking and return its result.
    ///
    /// A stopped effect just calls the function. Returns `None` without
    /// calling it when the effect is already running further up the stack.
    pub fn run(&self) -> Option<T> {
        let core = &self.inner.core;
        if !core.active.get() {
            return Some((self.inner.run)());
        }

        if super::context::is_running(core.id) {
            tracing::trace!(effect = %core.id, "run skipped: already running");
            return None;
        }

        let _scope = RunScope::enter(Rc::clone(&self.inner) as Rc<dyn Subscriber>);
        Some((self.inner.run)())
    }

    /// Unsubscribe from every dep and mark the effect inactive.
    ///
    /// Stopping the effect from inside its own run, or from an effect nested
    /// in it, takes effect once its run returns. Stopping an inactive effect does nothing.
    pub fn stop(&self) {
        self.inner.core.stop();
    }

    pub fn id(&self) -> EffectId {
        self.inner.core.id
    }

    /// Whether the effect still tracks dependencies.
    pub fn is_active(&self) -> bool {
        self.inner.core.active.get()
    }

    pub(crate) fn set_active(&self, active: bool) {
        self.inner.core.active.set(active);
    }

    pub fn allow_recurse(&self) -> bool {
        self.inner.core.allow_recurse.get()
    }

    pub fn set_allow_recurse(&self, allow: bool) {
        self.inner.core.allow_recurse.set(allow);
    }

    pub fn set_scheduler(&self, scheduler: Scheduler) {
        *self.inner.core.scheduler.borrow_mut() = scheduler;
    }

    pub fn set_on_stop(&self, on_stop: Option<Rc<dyn Fn()>>) {
        *self.inner.core.on_stop.borrow_mut() = on_stop;
    }

    pub fn set_on_track(&self, hook: Option<DebugHook>) {
        *self.inner.core.on_track.borrow_mut() = hook;
    }

    pub fn set_on_trigger(&self, hook: Option<DebugHook>) {
        *self.inner.core.on_trigger.borrow_mut() = hook;
    }

    /// Whether this effect backs a computed cell.
    pub fn backs_computed(&self) -> bool {
        self.inner.core.backs_computed.get()
    }

    pub(crate) fn mark_computed(&self) {
        self.inner.core.backs_computed.set(true);
    }

    /// Deps the effect currently subscribes to, in subscription order.
    pub fn deps(&self) -> Vec<Rc<Dep>> {
        self.inner.core.deps.borrow().iter().cloned().collect()
    }

    /// Number of deps the effect currently subscribes to.
    pub fn dep_count(&self) -> usize {
        self.inner.core.deps.borrow().len()
    }

    /// Type-erased handle to this effect.
    pub fn handle(&self) -> EffectHandle {
        EffectHandle(Rc::clone(&self.inner) as Rc<dyn Subscriber>)
    }

    /// Copy options onto the effect. `lazy` and `scope` are handled by
    /// [`effect_with`].
    fn apply(&self, options: &EffectOptions) {
        self.set_scheduler(options.scheduler.clone());
        self.set_allow_recurse(options.allow_recurse);
        self.set_on_stop(options.on_stop.clone());
        self.set_on_track(options.debug.on_track.clone());
        self.set_on_trigger(options.debug.on_trigger.clone());
    }
}

impl<T: 'static> Clone for ReactiveEffect<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> fmt::Debug for ReactiveEffect<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveEffect")
            .field("id", &self.id())
            .field("active", &self.is_active())
            .field("dep_count", &self.dep_count())
            .field("allow_recurse", &self.allow_recurse())
            .field("backs_computed", &self.backs_computed())
            .finish()
    }
}

/// Callable handle returned by [`effect`].
///
/// The effect is disposed when the last runner (and every other owner) is
/// dropped, so keep it for as long as the effect should stay live.
#[must_use = "dropping the runner disposes the effect"]
pub struct EffectRunner<T: 'static> {
    effect: ReactiveEffect<T>,
}

impl<T: 'static> EffectRunner<T> {
    /// Re-run the effect. See [`ReactiveEffect::run`].
    pub fn run(&self) -> Option<T> {
        self.effect.run()
    }

    /// The underlying effect.
    pub fn effect(&self) -> &ReactiveEffect<T> {
        &self.effect
    }

    pub fn stop(&self) {
        self.effect.stop();
    }
}

impl<T: 'static> Clone for EffectRunner<T> {
    fn clone(&self) -> Self {
        Self {
            effect: self.effect.clone(),
        }
    }
}

impl<T: 'static> fmt::Debug for EffectRunner<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EffectRunner").field(&self.effect).finish()
    }
}

/// Create an effect and run it once.
pub fn effect<T, F>(run: F) -> EffectRunner<T>
where
    T: 'static,
    F: Fn() -> T + 'static,
{
    effect_with(run, EffectOptions::default())
}

/// Create an effect with options.
pub fn effect_with<T, F>(run: F, options: EffectOptions) -> EffectRunner<T>
where
    T: 'static,
    F: Fn() -> T + 'static,
{
    let effect = ReactiveEffect::new(run);
    effect.apply(&options);
    if let Some(scope) = &options.scope {
        scope.record(&effect.handle());
    }
    if !options.lazy {
        let _ = effect.run();
    }
    EffectRunner { effect }
}

/// Stop the effect behind `runner`.
pub fn stop<T: 'static>(runner: &EffectRunner<T>) {
    runner.stop();
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
