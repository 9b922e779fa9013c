//! Dependency records.
//!
//! A [`Dep`] is the subscriber set for one (target, key) pair. Subscribers
//! are kept in add order and held weakly: a dep never keeps an effect alive.
//!
//! The two masks carry one bit per nesting level of effect runs. Bit `n` of
//! `was_tracked` means "the effect running at level `n` already depended on
//! this dep before its run started"; bit `n` of `newly_tracked` means "that
//! effect read this dep during the current run". They are only meaningful
//! while the corresponding run is in progress.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use super::subscriber::{EffectId, Subscriber};

/// The subscriber set for one (target, key) pair.
pub struct Dep {
    subscribers: RefCell<IndexMap<EffectId, Weak<dyn Subscriber>>>,
    was_tracked: Cell<u32>,
    newly_tracked: Cell<u32>,
}

impl Dep {
    /// Create an empty dep.
    ///
    /// Containers that own their reactive state directly (rather than going
    /// through [`track`](super::track) and the target map) create their own
    /// deps and drive them with [`track_effects`](super::track_effects) and
    /// [`trigger_effects`](super::trigger_effects).
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            subscribers: RefCell::new(IndexMap::new()),
            was_tracked: Cell::new(0),
            newly_tracked: Cell::new(0),
        })
    }

    /// Whether the given effect subscribes to this dep.
    pub fn contains(&self, effect: EffectId) -> bool {
        self.subscribers.borrow().contains_key(&effect)
    }

    /// Number of subscribers.
    pub fn len(&self) -> usize {
        self.subscribers.borrow().len()
    }

    /// Whether no effect subscribes to this dep.
    pub fn is_empty(&self) -> bool {
        self.subscribers.borrow().is_empty()
    }

    /// Subscriber IDs in add order.
    pub fn subscriber_ids(&self) -> Vec<EffectId> {
        self.subscribers.borrow().keys().copied().collect()
    }

    pub(crate) fn add(&self, effect: &Rc<dyn Subscriber>) {
        self.subscribers
            .borrow_mut()
            .entry(effect.core().id)
            .or_insert_with(|| Rc::downgrade(effect));
    }

    pub(crate) fn remove(&self, effect: EffectId) {
        // shift_remove keeps the remaining subscribers in add order
        self.subscribers.borrow_mut().shift_remove(&effect);
    }

    /// Live subscribers, in add order, as an owned snapshot.
    pub(crate) fn snapshot(&self) -> Vec<Rc<dyn Subscriber>> {
        self.subscribers
            .borrow()
            .values()
            .filter_map(Weak::upgrade)
            .collect()
    }

    pub(crate) fn was_tracked(&self, bit: u32) -> bool {
        self.was_tracked.get() & bit != 0
    }

    pub(crate) fn newly_tracked(&self, bit: u32) -> bool {
        self.newly_tracked.get() & bit != 0
    }

    pub(crate) fn mark_was_tracked(&self, bit: u32) {
        self.was_tracked.set(self.was_tracked.get() | bit);
    }

    pub(crate) fn mark_newly_tracked(&self, bit: u32) {
        self.newly_tracked.set(self.newly_tracked.get() | bit);
    }

    pub(crate) fn clear_bit(&self, bit: u32) {
        self.was_tracked.set(self.was_tracked.get() & !bit);
        self.newly_tracked.set(self.newly_tracked.get() & !bit);
    }
}

impl fmt::Debug for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dep")
            .field("subscribers", &self.subscriber_ids())
            .field("was_tracked", &format_args!("{:#b}", self.was_tracked.get()))
            .field("newly_tracked", &format_args!("{:#b}", self.newly_tracked.get()))
            .finish()
    }
}
