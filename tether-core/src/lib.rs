//! Tether Core
//!
//! This crate provides a fine-grained reactive dependency-tracking engine.
//! It implements:
//!
//! - Per-key dependency tracking for effects
//! - Mutation dispatch with structural keys (length, iteration)
//! - Incremental dependency diffing across nested effect runs
//! - Lazily recomputed computed cells
//!
//! The engine does not intercept reads and writes itself. An interception
//! layer wraps the state it exposes and reports each read with
//! [`reactive::track`] and each write with [`reactive::trigger`].
//!
//! # Example
//!
//! ```rust
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! use tether_core::reactive::{
//!     computed, effect, track, trigger, Key, Target, TrackOpType, TriggerOpType,
//! };
//!
//! struct Counter {
//!     count: Cell<i32>,
//! }
//!
//! impl Target for Counter {}
//!
//! fn get(counter: &Rc<Counter>) -> i32 {
//!     track(counter, TrackOpType::Get, Key::from("count"));
//!     counter.count.get()
//! }
//!
//! fn set(counter: &Rc<Counter>, value: i32) {
//!     counter.count.set(value);
//!     trigger(counter, TriggerOpType::Set, Some(Key::from("count")));
//! }
//!
//! let counter = Rc::new(Counter { count: Cell::new(0) });
//!
//! // A derived value
//! let c = counter.clone();
//! let doubled = computed(move || get(&c) * 2);
//!
//! // An effect
//! let seen = Rc::new(Cell::new(0));
//! let (c, d, s) = (counter.clone(), doubled.clone(), seen.clone());
//! let _runner = effect(move || s.set(get(&c) + d.get()));
//!
//! // Update the state
//! set(&counter, 5);
//! // Effect re-ran automatically
//! assert_eq!(seen.get(), 15);
//! ```

pub mod reactive;
