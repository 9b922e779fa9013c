//! Computed Implementation
//!
//! A computed cell is a cached derived value that recomputes lazily.
//!
//! # How Computed Cells Work
//!
//! 1. The cell starts dirty. The first read runs the getter inside the cell's
//!    own effect, caching the result and subscribing to everything the getter
//!    read.
//!
//! 2. Later reads return the cached value while the cell is clean.
//!
//! 3. When a dependency changes, the effect's scheduler does not recompute.
//!    It marks the cell dirty and notifies whatever reads the cell.
//!
//! 4. The next read recomputes once, however many dependencies changed.
//!
//! # Why This Matters
//!
//! Chains of cells stay lazy: a change several levels upstream only flips
//! dirty flags down the chain, and nothing recomputes until a value is read.
//!
//! A cell created with `cacheable: false` recomputes on every read and never
//! subscribes to its getter's inputs.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use super::context;
use super::debug::{DebugOp, DebugOptions, EventInfo, Value};
use super::dep::Dep;
use super::effect::{ReactiveEffect, Scheduler};
use super::error::{ReactiveError, Result};
use super::runtime::{track_effects_with, trigger_effects_with};
use super::target::{Key, TrackOpType, TriggerOpType};

/// Options for [`Computed::with_options`].
#[derive(Debug, Clone)]
pub struct ComputedOptions {
    /// Cache the value between reads. When false, every read recomputes.
    pub cacheable: bool,
    /// Hooks for the backing effect. Ignored when `cacheable` is false.
    pub debug: DebugOptions,
}

impl Default for ComputedOptions {
    fn default() -> Self {
        Self {
            cacheable: true,
            debug: DebugOptions::default(),
        }
    }
}

struct ComputedInner<T: 'static> {
    value: RefCell<Option<T>>,
    dirty: Cell<bool>,
    cacheable: bool,
    effect: ReactiveEffect<T>,
    /// Subscribers of the cell's own value.
    dep: Rc<Dep>,
    setter: Option<Box<dyn Fn(T)>>,
}

impl<T: 'static> ComputedInner<T> {
    /// Scheduler body: mark dirty and tell readers, without recomputing.
    fn invalidate(self: &Rc<Self>) {
        if self.dirty.get() {
            return;
        }
        self.dirty.set(true);

        let target = Rc::clone(self) as Value;
        let key = Key::Value;
        trigger_effects_with(
            &self.dep,
            EventInfo::new(DebugOp::Trigger(TriggerOpType::Set))
                .target(&target)
                .key(Some(&key)),
        );
    }
}

/// A lazily recomputed, cached derived value.
///
/// Clones share the same cell.
pub struct Computed<T: 'static> {
    inner: Rc<ComputedInner<T>>,
}

impl<T: Clone + 'static> Computed<T> {
    /// Create a read-only cell.
    pub fn new<G>(getter: G) -> Self
    where
        G: Fn() -> T + 'static,
    {
        Self::with_options(getter, None, ComputedOptions::default())
    }

    /// Create a cell whose writes go to `setter`.
    pub fn writable<G, S>(getter: G, setter: S) -> Self
    where
        G: Fn() -> T + 'static,
        S: Fn(T) + 'static,
    {
        Self::with_options(getter, Some(Box::new(setter)), ComputedOptions::default())
    }

    /// Create a cell with an optional setter and explicit options.
    pub fn with_options<G>(
        getter: G,
        setter: Option<Box<dyn Fn(T)>>,
        options: ComputedOptions,
    ) -> Self
    where
        G: Fn() -> T + 'static,
    {
        let inner = Rc::new_cyclic(|weak: &Weak<ComputedInner<T>>| {
            let weak = weak.clone();
            let effect = ReactiveEffect::with_scheduler(
                getter,
                Scheduler::custom(move |_| {
                    if let Some(inner) = weak.upgrade() {
                        inner.invalidate();
                    }
                }),
            );
            effect.mark_computed();
            effect.set_active(options.cacheable);
            if options.cacheable {
                effect.set_on_track(options.debug.on_track.clone());
                effect.set_on_trigger(options.debug.on_trigger.clone());
            }

            ComputedInner {
                value: RefCell::new(None),
                dirty: Cell::new(true),
                cacheable: options.cacheable,
                effect,
                dep: Dep::new(),
                setter,
            }
        });

        Self { inner }
    }

    /// Read the value, recomputing it if dirty.
    ///
    /// Registers the cell as a dependency of the running effect.
    ///
    /// # Panics
    ///
    /// Panics if the getter reads the cell before it ever produced a value.
    /// Use [`try_get`](Self::try_get) to handle that case.
    pub fn get(&self) -> T {
        match self.try_get() {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }

    /// Read the value, recomputing it if dirty.
    pub fn try_get(&self) -> Result<T> {
        let inner = &self.inner;

        if context::is_tracking() {
            let target = Rc::clone(inner) as Value;
            let key = Key::Value;
            track_effects_with(
                &inner.dep,
                EventInfo::new(DebugOp::Track(TrackOpType::Get))
                    .target(&target)
                    .key(Some(&key)),
            );
        }

        if inner.dirty.get() || !inner.cacheable {
            inner.dirty.set(false);
            if let Some(value) = inner.effect.run() {
                *inner.value.borrow_mut() = Some(value);
            }
        }

        inner.value.borrow().clone().ok_or(ReactiveError::CyclicComputed)
    }

    /// Write through the setter.
    ///
    /// On a read-only cell the write is dropped; debug builds log a warning.
    pub fn set(&self, value: T) {
        match &self.inner.setter {
            Some(setter) => setter(value),
            None => {
                #[cfg(debug_assertions)]
                tracing::warn!("write operation failed: computed value is readonly");
            }
        }
    }

    /// Write through the setter, reporting writes to read-only cells.
    pub fn try_set(&self, value: T) -> Result<()> {
        match &self.inner.setter {
            Some(setter) => {
                setter(value);
                Ok(())
            }
            None => Err(ReactiveError::ReadonlyComputed),
        }
    }
}

impl<T: 'static> Computed<T> {
    /// Whether the next read recomputes.
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.get()
    }

    /// Whether the cell has no setter.
    pub fn is_readonly(&self) -> bool {
        self.inner.setter.is_none()
    }

    pub fn is_cacheable(&self) -> bool {
        self.inner.cacheable
    }

    /// Whether a value has been computed yet.
    pub fn has_value(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    /// The effect that runs the getter.
    pub fn effect(&self) -> &ReactiveEffect<T> {
        &self.inner.effect
    }

    /// The dep readers of this cell subscribe to.
    pub fn dep(&self) -> &Rc<Dep> {
        &self.inner.dep
    }

    /// Whether two handles refer to the same cell.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: 'static> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("value", &self.inner.value.borrow())
            .field("dirty", &self.is_dirty())
            .field("cacheable", &self.is_cacheable())
            .field("readonly", &self.is_readonly())
            .finish()
    }
}

/// Create a read-only computed cell.
pub fn computed<T, G>(getter: G) -> Computed<T>
where
    T: Clone + 'static,
    G: Fn() -> T + 'static,
{
    Computed::new(getter)
}

/// Create a writable computed cell.
pub fn computed_with<T, G, S>(getter: G, setter: S) -> Computed<T>
where
    T: Clone + 'static,
    G: Fn() -> T + 'static,
    S: Fn(T) + 'static,
{
    Computed::writable(getter, setter)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
