//! Deeply nested effect runs.
//!
//! Runs the same chain of nested effects under each tracking strategy and
//! checks that marker-based diffing, including its fallback past the marker
//! limit, ends up with exactly the subscriptions a full rebuild produces.

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::{init_test_logging, Record};
use tether_core::reactive::{
    configure, current_config, dep_of, effect_with, EffectOptions, EffectRunner, Key,
    RuntimeConfig, TrackingStrategy, MAX_MARKER_BITS,
};

/// Observable state of a chain after a sequence of writes.
#[derive(Debug, PartialEq, Eq)]
struct Outcome {
    runs: Vec<usize>,
    dep_counts: Vec<usize>,
    /// Subscriber count of `a{i}` and `b{i}` for each link.
    branch_subscribers: Vec<(usize, usize)>,
}

struct Chain {
    state: Rc<Record>,
    runs: Rc<RefCell<Vec<usize>>>,
    links: Rc<RefCell<Vec<EffectRunner<()>>>>,
}

impl Chain {
    /// `len` lazy effects where link `i` reads `toggle`, then `a{i}` or
    /// `b{i}` depending on its parity, then runs link `i + 1`.
    fn new(len: usize) -> Self {
        let mut fields = vec![("toggle".to_string(), 0)];
        for i in 0..len {
            fields.push((format!("a{i}"), 0));
            fields.push((format!("b{i}"), 0));
        }
        let borrowed: Vec<(&str, i64)> = fields.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        let state = Record::new(&borrowed);

        let runs = Rc::new(RefCell::new(vec![0; len]));
        let links: Rc<RefCell<Vec<EffectRunner<()>>>> = Rc::new(RefCell::new(Vec::new()));

        for i in 0..len {
            let (s, r, l) = (state.clone(), runs.clone(), links.clone());
            let runner = effect_with(
                move || {
                    r.borrow_mut()[i] += 1;
                    if s.get("toggle") % 2 == 0 {
                        s.get(&format!("a{i}"));
                    } else {
                        s.get(&format!("b{i}"));
                    }
                    let next = l.borrow().get(i + 1).cloned();
                    if let Some(next) = next {
                        next.run();
                    }
                },
                EffectOptions::new().lazy(),
            );
            links.borrow_mut().push(runner);
        }

        Self { state, runs, links }
    }

    fn start(&self) {
        let first = self.links.borrow().first().cloned();
        if let Some(first) = first {
            first.run();
        }
    }

    fn outcome(&self) -> Outcome {
        let links = self.links.borrow();
        let subscribers = |key: String| {
            dep_of(&self.state, &Key::Field(key)).map_or(0, |dep| dep.len())
        };
        Outcome {
            runs: self.runs.borrow().clone(),
            dep_counts: links.iter().map(|l| l.effect().dep_count()).collect(),
            branch_subscribers: (0..links.len())
                .map(|i| (subscribers(format!("a{i}")), subscribers(format!("b{i}"))))
                .collect(),
        }
    }
}

impl Drop for Chain {
    fn drop(&mut self) {
        // Links hold each other through the shared list
        self.links.borrow_mut().clear();
    }
}

/// Flip the branch, then poke both branches of a few links.
fn exercise(config: RuntimeConfig, len: usize) -> Vec<Outcome> {
    configure(config).expect("valid config");
    let chain = Chain::new(len);
    let mut outcomes = Vec::new();

    chain.start();
    outcomes.push(chain.outcome());

    chain.state.set("toggle", 1);
    outcomes.push(chain.outcome());

    // Stale branches must not notify
    for i in [0, len / 2, len - 1] {
        chain.state.set(&format!("a{i}"), 1);
    }
    outcomes.push(chain.outcome());

    chain.state.set(&format!("b{}", len - 1), 1);
    outcomes.push(chain.outcome());

    chain.state.set("toggle", 2);
    outcomes.push(chain.outcome());

    configure(RuntimeConfig::default()).expect("valid config");
    outcomes
}

#[test]
fn deep_chain_matches_exhaustive_baseline() {
    init_test_logging();
    let len = 40;

    let with_markers = exercise(RuntimeConfig::default(), len);
    let baseline = exercise(RuntimeConfig::exhaustive(), len);
    assert_eq!(with_markers, baseline);
    assert_eq!(current_config().strategy, TrackingStrategy::Bitmask);
}

#[test]
fn shallow_chain_matches_exhaustive_baseline() {
    let len = MAX_MARKER_BITS as usize;

    let with_markers = exercise(RuntimeConfig::default(), len);
    let baseline = exercise(RuntimeConfig::exhaustive(), len);
    assert_eq!(with_markers, baseline);
}

#[test]
fn low_marker_limit_matches_exhaustive_baseline() {
    let len = 12;
    let limited = RuntimeConfig {
        max_marker_bits: 4,
        ..RuntimeConfig::default()
    };

    let with_markers = exercise(limited, len);
    let baseline = exercise(RuntimeConfig::exhaustive(), len);
    assert_eq!(with_markers, baseline);
}

#[test]
fn deep_chain_keeps_only_live_branch() {
    let len = 40;
    let outcomes = exercise(RuntimeConfig::default(), len);

    let initial = &outcomes[0];
    assert_eq!(initial.runs, vec![1; len]);
    assert_eq!(initial.dep_counts, vec![2; len]);
    assert!(initial.branch_subscribers.iter().all(|&(a, _)| a == 1));

    // Link i re-runs once per triggered ancestor and once for itself
    let flipped = &outcomes[1];
    let expected: Vec<usize> = (0..len).map(|i| i + 2).collect();
    assert_eq!(flipped.runs, expected);
    assert_eq!(flipped.dep_counts, vec![2; len]);
    assert!(flipped
        .branch_subscribers
        .iter()
        .all(|&(a, b)| a == 0 && b == 1));

    // Writes to stale branches changed nothing
    assert_eq!(outcomes[2], outcomes[1]);

    // Only the last link reads b{len-1}
    let mut expected = outcomes[2].runs.clone();
    expected[len - 1] += 1;
    assert_eq!(outcomes[3].runs, expected);

    let back = &outcomes[4];
    assert!(back.branch_subscribers.iter().all(|&(a, b)| a == 1 && b == 0));
}
