//! Tracked targets and the dependency map.
//!
//! A target is any `Rc`-shared value whose reads and writes are reported to
//! the engine by an interception layer. The [`TargetMap`] associates each
//! target with a key → [`Dep`] table. The association is weak: reading a
//! target never keeps it alive.

use std::any::Any;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use super::dep::Dep;

/// The shape of a target, which decides which structural deps a mutation
/// notifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TargetKind {
    /// A plain record with named fields.
    #[default]
    Record,
    /// An indexable sequence with a length.
    Sequence,
    /// A keyed map.
    Map,
    /// A set. Dispatches exactly like a record.
    Set,
}

/// A value that can be tracked.
///
/// The kind is a property of the type, so the dispatcher can read it while
/// the interception layer still holds a mutable borrow of the contents.
pub trait Target: Any {
    const KIND: TargetKind = TargetKind::Record;
}

impl<T: Target> Target for RefCell<T> {
    const KIND: TargetKind = T::KIND;
}

macro_rules! impl_target {
    ($kind:expr => $($ty:ident<$($param:ident),+>),+ $(,)?) => {
        $(
            impl<$($param: 'static),+> Target for $ty<$($param),+> {
                const KIND: TargetKind = $kind;
            }
        )+
    };
}

impl_target!(TargetKind::Sequence => Vec<T>, VecDeque<T>);
impl_target!(TargetKind::Map => HashMap<K, V, S>, BTreeMap<K, V>, IndexMap<K, V, S>);
impl_target!(TargetKind::Set => HashSet<T, S>, BTreeSet<T>, IndexSet<T, S>);

/// A dependency key within a target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    /// A named field or string map key.
    Field(String),
    /// A sequence index or integer map key.
    Index(usize),
    /// The length of a sequence.
    Length,
    /// "Enumerated all entries".
    Iterate,
    /// "Enumerated all keys" of a map.
    MapKeyIterate,
    /// The value of a computed cell.
    Value,
}

impl Key {
    /// A named field key.
    pub fn field(name: impl Into<String>) -> Self {
        Key::Field(name.into())
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Field(name.to_owned())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::Field(name)
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Field(name) => f.write_str(name),
            Key::Index(index) => write!(f, "[{index}]"),
            Key::Length => f.write_str("length"),
            Key::Iterate => f.write_str("<iterate>"),
            Key::MapKeyIterate => f.write_str("<map-key-iterate>"),
            Key::Value => f.write_str("value"),
        }
    }
}

/// Kind of read being tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackOpType {
    Get,
    Has,
    Iterate,
}

/// Kind of mutation being triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerOpType {
    Set,
    Add,
    Delete,
    Clear,
}

/// Key → dep table of one target, in registration order.
pub(crate) type KeyToDeps = IndexMap<Key, Rc<Dep>>;

struct TargetEntry {
    target: Weak<dyn Any>,
    deps: KeyToDeps,
}

impl TargetEntry {
    fn is_alive(&self) -> bool {
        self.target.strong_count() > 0
    }
}

const MIN_SWEEP_THRESHOLD: usize = 64;

/// Weak-keyed association from target to its key → dep table.
///
/// Entries are keyed by allocation address. The stored `Weak` pins the
/// allocation, so an address cannot be reused by another target while its
/// entry exists. Entries whose target has been dropped are swept once the
/// table grows past a high-water mark.
pub(crate) struct TargetMap {
    entries: HashMap<usize, TargetEntry>,
    sweep_threshold: usize,
}

impl TargetMap {
    pub(crate) fn new() -> Self {
        Self {
            entries: HashMap::new(),
            sweep_threshold: MIN_SWEEP_THRESHOLD,
        }
    }

    fn address<T>(target: &Rc<T>) -> usize {
        Rc::as_ptr(target) as *const () as usize
    }

    /// Return the dep for `(target, key)`, creating it if needed.
    pub(crate) fn get_or_create<T: Target>(&mut self, target: &Rc<T>, key: &Key) -> Rc<Dep> {
        let address = Self::address(target);
        if !self.entries.contains_key(&address) && self.entries.len() >= self.sweep_threshold {
            self.sweep();
        }

        let entry = self.entries.entry(address).or_insert_with(|| {
            let weak: Weak<T> = Rc::downgrade(target);
            TargetEntry {
                target: weak,
                deps: IndexMap::new(),
            }
        });
        if let Some(dep) = entry.deps.get(key) {
            return Rc::clone(dep);
        }
        let dep = Dep::new();
        entry.deps.insert(key.clone(), Rc::clone(&dep));
        dep
    }

    /// The dep table of a live target, if anything ever read it.
    pub(crate) fn deps_of<T: Target>(&self, target: &Rc<T>) -> Option<&KeyToDeps> {
        self.entries
            .get(&Self::address(target))
            .filter(|entry| entry.is_alive())
            .map(|entry| &entry.deps)
    }

    /// Drop entries whose target no longer exists.
    pub(crate) fn sweep(&mut self) {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_alive());
        self.sweep_threshold = (self.entries.len() * 2).max(MIN_SWEEP_THRESHOLD);
        tracing::trace!(
            removed = before - self.entries.len(),
            remaining = self.entries.len(),
            "swept dead targets"
        );
    }

    /// Number of live targets with a dep table.
    pub(crate) fn live_len(&self) -> usize {
        self.entries.values().filter(|entry| entry.is_alive()).count()
    }
}

impl Default for TargetMap {
    fn default() -> Self {
        Self::new()
    }
}

thread_local! {
    static TARGET_MAP: RefCell<TargetMap> = RefCell::new(TargetMap::new());
}

/// Run `f` with the thread's dependency map.
///
/// `f` must not call back into user code: the map stays borrowed throughout.
pub(crate) fn with_target_map<R>(f: impl FnOnce(&mut TargetMap) -> R) -> R {
    TARGET_MAP.with(|map| f(&mut map.borrow_mut()))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Plain;
    impl Target for Plain {}

    #[test]
    fn target_kinds() {
        assert_eq!(Plain::KIND, TargetKind::Record);
        assert_eq!(Vec::<u8>::KIND, TargetKind::Sequence);
        assert_eq!(RefCell::<Vec<u8>>::KIND, TargetKind::Sequence);
        assert_eq!(HashMap::<u8, u8>::KIND, TargetKind::Map);
        assert_eq!(BTreeSet::<u8>::KIND, TargetKind::Set);
    }

    #[test]
    fn get_or_create_reuses_deps() {
        let mut map = TargetMap::new();
        let target = Rc::new(Plain);

        let a1 = map.get_or_create(&target, &Key::from("a"));
        let a2 = map.get_or_create(&target, &Key::from("a"));
        let b = map.get_or_create(&target, &Key::from("b"));

        assert!(Rc::ptr_eq(&a1, &a2));
        assert!(!Rc::ptr_eq(&a1, &b));
        assert_eq!(map.deps_of(&target).map(|deps| deps.len()), Some(2));
    }

    #[test]
    fn map_does_not_keep_targets_alive() {
        let mut map = TargetMap::new();
        let target = Rc::new(Plain);
        map.get_or_create(&target, &Key::from("a"));

        assert_eq!(Rc::strong_count(&target), 1);
        assert_eq!(map.live_len(), 1);

        drop(target);
        assert_eq!(map.live_len(), 0);

        map.sweep();
        assert!(map.entries.is_empty());
    }

    #[test]
    fn deps_keep_registration_order() {
        let mut map = TargetMap::new();
        let target = Rc::new(Plain);
        for key in ["z", "a", "m"] {
            map.get_or_create(&target, &Key::from(key));
        }

        let keys: Vec<_> = map
            .deps_of(&target)
            .map(|deps| deps.keys().map(ToString::to_string).collect())
            .unwrap_or_default();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn growth_sweeps_dead_entries() {
        let mut map = TargetMap::new();
        for _ in 0..MIN_SWEEP_THRESHOLD {
            let target = Rc::new(Plain);
            map.get_or_create(&target, &Key::Length);
        }
        let survivor = Rc::new(Plain);
        map.get_or_create(&survivor, &Key::Length);

        assert_eq!(map.entries.len(), 1);
        assert_eq!(map.live_len(), 1);
    }
}
