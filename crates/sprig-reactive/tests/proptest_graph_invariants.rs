//! Property-based invariant tests for the reactive graph.
//!
//! 1. Every write changes the version, including writes of an equal value
//! 2. A computed value always equals its function applied to current sources
//! 3. A computed value recomputes at most once per batch of source writes
//! 4. Dynamic dependency sets never leave registrations behind
//! 5. Effects run exactly when a tracked source moved since the last run

use proptest::prelude::*;
use sprig_reactive::{
    Computed, Dependent, DependentRef, DynamicDependencies, Effect, EffectUnit, Signal,
};
use std::cell::Cell;
use std::rc::{Rc, Weak};

// ── Helpers ──────────────────────────────────────────────────────────

struct Counter(Cell<u32>);

impl Dependent for Counter {
    fn notify(&self) {
        self.0.set(self.0.get() + 1);
    }
}

fn counter() -> (Rc<Counter>, DependentRef) {
    let counter = Rc::new(Counter(Cell::new(0)));
    let weak: Weak<Counter> = Rc::downgrade(&counter);
    (counter, weak)
}

// ═════════════════════════════════════════════════════════════════════════
// 1. Writes always move the version
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn every_write_moves_version(writes in proptest::collection::vec(0_i32..3, 1..50)) {
        let signal = Signal::new(0);
        for value in writes {
            let before = signal.version();
            signal.set(value);
            prop_assert_ne!(before, signal.version());
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 2-3. Computed values stay consistent and lazy
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn computed_tracks_sources(
        batches in proptest::collection::vec(
            proptest::collection::vec((any::<bool>(), -100_i64..100), 1..5),
            1..20,
        )
    ) {
        let a = Signal::new(0_i64);
        let b = Signal::new(0_i64);
        let sum = Computed::map2(&a, &b, |x: &i64, y: &i64| x + y);

        for batch in batches {
            let before = sum.recompute_count();
            for (left, value) in batch {
                if left { a.set(value) } else { b.set(value) }
            }
            prop_assert_eq!(sum.get(), a.get() + b.get());
            prop_assert_eq!(sum.get(), a.get() + b.get());
            prop_assert!(sum.recompute_count() - before <= 1);
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 4. Dynamic dependency bookkeeping
// ═════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
enum DepOp {
    Add(usize),
    Remove(usize),
    Truncate(usize),
    Clear,
}

fn arb_dep_op() -> impl Strategy<Value = DepOp> {
    prop_oneof![
        (0_usize..6).prop_map(DepOp::Add),
        (0_usize..8).prop_map(DepOp::Remove),
        (0_usize..8).prop_map(DepOp::Truncate),
        Just(DepOp::Clear),
    ]
}

proptest! {
    #[test]
    fn dynamic_dependencies_balance_registrations(
        ops in proptest::collection::vec(arb_dep_op(), 0..60)
    ) {
        let pool: Vec<Signal<u8>> = (0..6).map(|_| Signal::new(0)).collect();
        let (_owner, weak) = counter();
        let mut model: Vec<usize> = Vec::new();
        {
            let mut deps = DynamicDependencies::<u8>::new();
            deps.bind(weak);
            for op in ops {
                match op {
                    DepOp::Add(i) => {
                        deps.add(&pool[i]);
                        model.push(i);
                    }
                    DepOp::Remove(i) => {
                        if i < model.len() {
                            deps.remove(i);
                            model.remove(i);
                        }
                    }
                    DepOp::Truncate(n) => {
                        deps.truncate(n);
                        model.truncate(n);
                    }
                    DepOp::Clear => {
                        deps.clear();
                        model.clear();
                    }
                }
                for (i, signal) in pool.iter().enumerate() {
                    let expected = model.iter().filter(|&&m| m == i).count();
                    prop_assert_eq!(signal.dependent_count(), expected);
                }
            }
        }
        for signal in &pool {
            prop_assert_eq!(signal.dependent_count(), 0);
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 5. Effects run exactly on change
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn effect_runs_once_per_dirty_pass(
        passes in proptest::collection::vec(0_u8..4, 1..30)
    ) {
        let signal = Signal::new(0_u32);
        let runs = Rc::new(Cell::new(0_u32));
        let seen = runs.clone();
        let (_owner, weak) = counter();
        let mut effect = Effect::on(&signal, move |_: &u32| seen.set(seen.get() + 1));
        effect.attach(weak);
        prop_assert!(effect.run_if_dirty());

        for writes in passes {
            let before = runs.get();
            for _ in 0..writes {
                signal.update(|v| *v += 1);
            }
            let ran = effect.run_if_dirty();
            prop_assert_eq!(ran, writes > 0);
            prop_assert_eq!(runs.get() - before, u32::from(writes > 0));
        }
    }
}
