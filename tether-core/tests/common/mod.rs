//! Shared helpers for integration tests.
//!
//! The engine only sees `track`/`trigger` calls, so these helpers play the
//! part of the interception layer: plain containers whose accessors report
//! reads and writes the way a wrapping proxy would.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use std::sync::Once;

use tether_core::reactive::{
    track, trigger, trigger_with, Key, Target, TrackOpType, TriggerOpType, TriggerPayload,
};

static INIT_LOGGING: Once = Once::new();

/// Initialize test logging with trace-level output.
///
/// Safe to call multiple times; only initializes once.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .with_target(true)
            .with_ansi(false)
            .try_init();
    });
}

/// Shared run counter.
#[derive(Clone, Default)]
pub struct Counter(Rc<Cell<usize>>);

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bump(&self) {
        self.0.set(self.0.get() + 1);
    }

    pub fn get(&self) -> usize {
        self.0.get()
    }
}

/// A record with named integer fields.
pub struct Record {
    fields: RefCell<BTreeMap<String, i64>>,
}

impl Target for Record {}

impl Record {
    pub fn new(fields: &[(&str, i64)]) -> Rc<Self> {
        Rc::new(Self {
            fields: RefCell::new(fields.iter().map(|(k, v)| (k.to_string(), *v)).collect()),
        })
    }

    pub fn get(self: &Rc<Self>, key: &str) -> i64 {
        track(self, TrackOpType::Get, Key::field(key));
        self.fields.borrow().get(key).copied().unwrap_or_default()
    }

    pub fn has(self: &Rc<Self>, key: &str) -> bool {
        track(self, TrackOpType::Has, Key::field(key));
        self.fields.borrow().contains_key(key)
    }

    pub fn keys(self: &Rc<Self>) -> Vec<String> {
        track(self, TrackOpType::Iterate, Key::Iterate);
        self.fields.borrow().keys().cloned().collect()
    }

    pub fn set(self: &Rc<Self>, key: &str, value: i64) {
        let old = self.fields.borrow_mut().insert(key.to_string(), value);
        match old {
            None => trigger_with(
                self,
                TriggerOpType::Add,
                Some(Key::field(key)),
                TriggerPayload::new().with_new_value(value),
            ),
            Some(old) if old != value => trigger_with(
                self,
                TriggerOpType::Set,
                Some(Key::field(key)),
                TriggerPayload::new().with_new_value(value).with_old_value(old),
            ),
            Some(_) => {}
        }
    }

    pub fn delete(self: &Rc<Self>, key: &str) {
        let old = self.fields.borrow_mut().remove(key);
        if let Some(old) = old {
            trigger_with(
                self,
                TriggerOpType::Delete,
                Some(Key::field(key)),
                TriggerPayload::new().with_old_value(old),
            );
        }
    }
}

/// An integer sequence.
pub type List = RefCell<Vec<i64>>;

pub fn list(items: &[i64]) -> Rc<List> {
    Rc::new(RefCell::new(items.to_vec()))
}

pub fn list_get(list: &Rc<List>, index: usize) -> Option<i64> {
    track(list, TrackOpType::Get, Key::Index(index));
    list.borrow().get(index).copied()
}

pub fn list_len(list: &Rc<List>) -> usize {
    track(list, TrackOpType::Get, Key::Length);
    list.borrow().len()
}

pub fn list_push(list: &Rc<List>, value: i64) {
    let index = {
        let mut items = list.borrow_mut();
        items.push(value);
        items.len() - 1
    };
    trigger_with(
        list,
        TriggerOpType::Add,
        Some(Key::Index(index)),
        TriggerPayload::new().with_new_value(value),
    );
}

pub fn list_set(list: &Rc<List>, index: usize, value: i64) {
    let old = std::mem::replace(&mut list.borrow_mut()[index], value);
    if old != value {
        trigger(list, TriggerOpType::Set, Some(Key::Index(index)));
    }
}

pub fn list_truncate(list: &Rc<List>, len: usize) {
    list.borrow_mut().truncate(len);
    trigger_with(list, TriggerOpType::Set, Some(Key::Length), TriggerPayload::length(len));
}

/// A string-keyed map.
pub type Map = RefCell<HashMap<String, i64>>;

pub fn map(entries: &[(&str, i64)]) -> Rc<Map> {
    Rc::new(RefCell::new(
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
    ))
}

pub fn map_get(map: &Rc<Map>, key: &str) -> Option<i64> {
    track(map, TrackOpType::Get, Key::field(key));
    map.borrow().get(key).copied()
}

pub fn map_size(map: &Rc<Map>) -> usize {
    track(map, TrackOpType::Iterate, Key::Iterate);
    map.borrow().len()
}

pub fn map_keys(map: &Rc<Map>) -> Vec<String> {
    track(map, TrackOpType::Iterate, Key::MapKeyIterate);
    let mut keys: Vec<_> = map.borrow().keys().cloned().collect();
    keys.sort();
    keys
}

pub fn map_insert(map: &Rc<Map>, key: &str, value: i64) {
    let old = map.borrow_mut().insert(key.to_string(), value);
    match old {
        None => trigger(map, TriggerOpType::Add, Some(Key::field(key))),
        Some(old) if old != value => trigger(map, TriggerOpType::Set, Some(Key::field(key))),
        Some(_) => {}
    }
}

pub fn map_remove(map: &Rc<Map>, key: &str) {
    let old = map.borrow_mut().remove(key);
    if old.is_some() {
        trigger(map, TriggerOpType::Delete, Some(Key::field(key)));
    }
}

pub fn map_clear(map: &Rc<Map>) {
    let had_entries = {
        let mut entries = map.borrow_mut();
        let had = !entries.is_empty();
        entries.clear();
        had
    };
    if had_entries {
        trigger(map, TriggerOpType::Clear, None);
    }
}
