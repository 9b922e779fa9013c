//! Development hooks.
//!
//! `on_track` and `on_trigger` observe subscriptions and notifications as
//! they happen. They are advisory only: nothing in the engine depends on
//! them, and events are only built when a hook is installed.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use super::runtime::TriggerPayload;
use super::subscriber::EffectId;
use super::target::{Key, TrackOpType, TriggerOpType};

/// An opaque value carried by a debugger event or trigger payload.
pub type Value = Rc<dyn Any>;

/// Callback receiving debugger events.
pub type DebugHook = Rc<dyn Fn(&DebuggerEvent)>;

/// The operation a debugger event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugOp {
    Track(TrackOpType),
    Trigger(TriggerOpType),
}

/// A subscription or notification, as seen by a debug hook.
#[derive(Clone)]
pub struct DebuggerEvent {
    pub effect: EffectId,
    pub target: Option<Value>,
    pub op: DebugOp,
    pub key: Option<Key>,
    pub new_value: Option<Value>,
    pub old_value: Option<Value>,
    pub old_target: Option<Value>,
}

impl fmt::Debug for DebuggerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebuggerEvent")
            .field("effect", &self.effect)
            .field("op", &self.op)
            .field("key", &self.key)
            .field("has_target", &self.target.is_some())
            .field("has_new_value", &self.new_value.is_some())
            .field("has_old_value", &self.old_value.is_some())
            .finish()
    }
}

/// Hooks attached to an effect or computed cell.
#[derive(Clone, Default)]
pub struct DebugOptions {
    pub on_track: Option<DebugHook>,
    pub on_trigger: Option<DebugHook>,
}

impl DebugOptions {
    pub fn on_track(mut self, hook: impl Fn(&DebuggerEvent) + 'static) -> Self {
        self.on_track = Some(Rc::new(hook));
        self
    }

    pub fn on_trigger(mut self, hook: impl Fn(&DebuggerEvent) + 'static) -> Self {
        self.on_trigger = Some(Rc::new(hook));
        self
    }
}

impl fmt::Debug for DebugOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebugOptions")
            .field("on_track", &self.on_track.is_some())
            .field("on_trigger", &self.on_trigger.is_some())
            .finish()
    }
}

/// Borrowed description of a track or trigger, turned into a
/// [`DebuggerEvent`] only when a hook wants one.
#[derive(Clone, Copy)]
pub(crate) struct EventInfo<'a> {
    pub(crate) target: Option<&'a Value>,
    pub(crate) op: DebugOp,
    pub(crate) key: Option<&'a Key>,
    pub(crate) payload: Option<&'a TriggerPayload>,
}

impl<'a> EventInfo<'a> {
    pub(crate) fn new(op: DebugOp) -> Self {
        Self {
            target: None,
            op,
            key: None,
            payload: None,
        }
    }

    pub(crate) fn target(mut self, target: &'a Value) -> Self {
        self.target = Some(target);
        self
    }

    pub(crate) fn key(mut self, key: Option<&'a Key>) -> Self {
        self.key = key;
        self
    }

    pub(crate) fn payload(mut self, payload: &'a TriggerPayload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub(crate) fn to_event(self, effect: EffectId) -> DebuggerEvent {
        DebuggerEvent {
            effect,
            target: self.target.cloned(),
            op: self.op,
            key: self.key.cloned(),
            new_value: self.payload.and_then(|p| p.new_value.clone()),
            old_value: self.payload.and_then(|p| p.old_value.clone()),
            old_target: self.payload.and_then(|p| p.old_target.clone()),
        }
    }
}
