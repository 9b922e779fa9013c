//! Reactive Runtime
//!
//! The runtime connects reads and writes reported by an interception layer
//! to the effects that depend on them.
//!
//! # How It Works
//!
//! 1. A read inside a running effect calls [`track`], which finds or creates
//!    the dep for `(target, key)` and subscribes the current effect.
//!
//! 2. A write calls [`trigger`], which resolves every dep the mutation
//!    affects, including structural deps such as a sequence's length or a
//!    map's iteration key.
//!
//! 3. The subscribers of those deps are snapshotted and notified in two
//!    phases: effects backing computed cells first, then everything else.
//!    Each subscriber either re-runs immediately or hands off to its
//!    scheduler.
//!
//! # Thread Safety
//!
//! The dependency map and run context are thread-local. Effects and targets
//! are `Rc`-based, so everything that touches one engine stays on one thread.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::context;
use super::debug::{DebugOp, EventInfo, Value};
use super::dep::Dep;
use super::effect::Scheduler;
use super::subscriber::{EffectHandle, Subscriber};
use super::target::{
    with_target_map, Key, KeyToDeps, Target, TargetKind, TrackOpType, TriggerOpType,
};

/// Values attached to a mutation.
///
/// Only debug hooks look at these, with one exception: a length change on a
/// sequence reads the new length from `new_value` as a `usize`.
#[derive(Clone, Default)]
pub struct TriggerPayload {
    pub new_value: Option<Value>,
    pub old_value: Option<Value>,
    /// Snapshot of a collection before it was cleared.
    pub old_target: Option<Value>,
}

impl TriggerPayload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Payload for a sequence length change.
    pub fn length(new_length: usize) -> Self {
        Self::new().with_new_value(new_length)
    }

    pub fn with_new_value(mut self, value: impl Any) -> Self {
        self.new_value = Some(Rc::new(value));
        self
    }

    pub fn with_old_value(mut self, value: impl Any) -> Self {
        self.old_value = Some(Rc::new(value));
        self
    }

    pub fn with_old_target(mut self, snapshot: Value) -> Self {
        self.old_target = Some(snapshot);
        self
    }

    fn new_length(&self) -> Option<usize> {
        self.new_value.as_ref()?.downcast_ref::<usize>().copied()
    }
}

impl fmt::Debug for TriggerPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TriggerPayload")
            .field("new_value", &self.new_value.is_some())
            .field("old_value", &self.old_value.is_some())
            .field("old_target", &self.old_target.is_some())
            .finish()
    }
}

/// Record that the running effect read `key` of `target`.
///
/// No-op unless an effect is running and tracking is enabled.
pub fn track<T: Target>(target: &Rc<T>, op: TrackOpType, key: Key) {
    if !context::is_tracking() {
        return;
    }
    let dep = with_target_map(|map| map.get_or_create(target, &key));
    let erased: Value = Rc::clone(target) as Value;
    track_effects_with(
        &dep,
        EventInfo::new(DebugOp::Track(op)).target(&erased).key(Some(&key)),
    );
}

/// Notify everything that depends on `key` of `target`.
pub fn trigger<T: Target>(target: &Rc<T>, op: TriggerOpType, key: Option<Key>) {
    trigger_with(target, op, key, TriggerPayload::default());
}

/// [`trigger`] with values attached.
///
/// Does nothing if `target` was never read inside an effect.
pub fn trigger_with<T: Target>(
    target: &Rc<T>,
    op: TriggerOpType,
    key: Option<Key>,
    payload: TriggerPayload,
) {
    let deps = with_target_map(|map| {
        map.deps_of(target)
            .map(|deps| resolve_deps(deps, T::KIND, op, key.as_ref(), payload.new_length()))
    });
    let Some(deps) = deps else {
        return;
    };

    let effects = match deps.as_slice() {
        [] => return,
        [dep] => dep.snapshot(),
        _ => {
            let mut unique: IndexMap<_, Rc<dyn Subscriber>> = IndexMap::new();
            for dep in &deps {
                for effect in dep.snapshot() {
                    unique.entry(effect.core().id).or_insert(effect);
                }
            }
            unique.into_values().collect()
        }
    };

    tracing::trace!(?op, key = ?key, deps = deps.len(), effects = effects.len(), "trigger");

    let erased: Value = Rc::clone(target) as Value;
    let info = EventInfo::new(DebugOp::Trigger(op))
        .target(&erased)
        .key(key.as_ref())
        .payload(&payload);
    notify(&effects, info);
}

/// Subscribe the running effect to `dep`.
///
/// For containers that own their deps instead of going through the target
/// map.
pub fn track_effects(dep: &Rc<Dep>) {
    if context::is_tracking() {
        track_effects_with(dep, EventInfo::new(DebugOp::Track(TrackOpType::Get)));
    }
}

/// Notify every subscriber of `dep`.
pub fn trigger_effects(dep: &Rc<Dep>) {
    trigger_effects_with(dep, EventInfo::new(DebugOp::Trigger(TriggerOpType::Set)));
}

/// The dep for `(target, key)`, if it was ever read.
pub fn dep_of<T: Target>(target: &Rc<T>, key: &Key) -> Option<Rc<Dep>> {
    with_target_map(|map| map.deps_of(target).and_then(|deps| deps.get(key).cloned()))
}

/// Number of live targets that have been read inside an effect.
pub fn tracked_target_count() -> usize {
    with_target_map(|map| map.live_len())
}

/// Drop dependency tables of targets that no longer exist.
pub fn sweep_dead_targets() {
    with_target_map(|map| map.sweep());
}

pub(crate) fn track_effects_with(dep: &Rc<Dep>, info: EventInfo<'_>) {
    let Some(effect) = context::active_effect() else {
        return;
    };
    let core = effect.core();

    let should_track = if context::uses_markers() {
        let bit = context::track_op_bit();
        if dep.newly_tracked(bit) {
            false
        } else {
            dep.mark_newly_tracked(bit);
            !dep.was_tracked(bit)
        }
    } else {
        !dep.contains(core.id)
    };

    if !should_track {
        return;
    }

    dep.add(&effect);
    core.deps.borrow_mut().push(Rc::clone(dep));
    tracing::trace!(effect = %core.id, key = ?info.key, "subscribed");

    let on_track = core.on_track.borrow().clone();
    if let Some(on_track) = on_track {
        on_track(&info.to_event(core.id));
    }
}

pub(crate) fn trigger_effects_with(dep: &Rc<Dep>, info: EventInfo<'_>) {
    notify(&dep.snapshot(), info);
}

/// Resolve the deps a mutation affects, in notification order.
fn resolve_deps(
    deps: &KeyToDeps,
    kind: TargetKind,
    op: TriggerOpType,
    key: Option<&Key>,
    new_length: Option<usize>,
) -> SmallVec<[Rc<Dep>; 4]> {
    if op == TriggerOpType::Clear {
        return deps.values().cloned().collect();
    }

    if kind == TargetKind::Sequence && key == Some(&Key::Length) {
        // Without a known new length every index counts as out of range.
        return deps
            .iter()
            .filter(|(k, _)| match k {
                Key::Length => true,
                Key::Index(index) => new_length.map_or(true, |len| *index >= len),
                _ => false,
            })
            .map(|(_, dep)| Rc::clone(dep))
            .collect();
    }

    let mut resolved: SmallVec<[Rc<Dep>; 4]> = SmallVec::new();
    let mut push = |k: &Key| {
        if let Some(dep) = deps.get(k) {
            resolved.push(Rc::clone(dep));
        }
    };

    if let Some(key) = key {
        push(key);
    }

    match op {
        TriggerOpType::Add | TriggerOpType::Delete if kind != TargetKind::Sequence => {
            push(&Key::Iterate);
            if kind == TargetKind::Map {
                push(&Key::MapKeyIterate);
            }
        }
        TriggerOpType::Add if matches!(key, Some(Key::Index(_))) => push(&Key::Length),
        TriggerOpType::Set if kind == TargetKind::Map => push(&Key::Iterate),
        _ => {}
    }

    resolved
}

/// Two-phase notification over a fixed snapshot.
fn notify(effects: &[Rc<dyn Subscriber>], info: EventInfo<'_>) {
    for effect in effects.iter().filter(|e| e.core().backs_computed.get()) {
        trigger_effect(effect, info);
    }
    for effect in effects.iter().filter(|e| !e.core().backs_computed.get()) {
        trigger_effect(effect, info);
    }
}

fn trigger_effect(effect: &Rc<dyn Subscriber>, info: EventInfo<'_>) {
    let core = effect.core();
    if context::active_effect_id() == Some(core.id) && !core.allow_recurse.get() {
        tracing::trace!(effect = %core.id, "self-trigger suppressed");
        return;
    }

    let on_trigger = core.on_trigger.borrow().clone();
    if let Some(on_trigger) = on_trigger {
        on_trigger(&info.to_event(core.id));
    }

    let scheduler = core.scheduler.borrow().clone();
    match scheduler {
        Scheduler::Custom(schedule) => {
            tracing::trace!(effect = %core.id, "scheduled");
            schedule(&EffectHandle(Rc::clone(effect)));
        }
        Scheduler::Default => {
            tracing::trace!(effect = %core.id, "re-run");
            Rc::clone(effect).rerun();
        }
    }
}
