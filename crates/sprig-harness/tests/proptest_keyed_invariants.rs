//! Property-based invariant tests for keyed reconciliation.
//!
//! 1. After every drain the native children match the list, in order
//! 2. Surviving keys keep their native node across updates
//! 3. Each update adds exactly the new keys and destroys exactly the gone ones
//! 4. Effect runs and cleanups balance once the tree is unmounted

use std::cell::Cell;
use std::collections::BTreeSet;
use std::rc::Rc;

use proptest::prelude::*;
use sprig_harness::{Harness, NativeCall, element};
use sprig_reactive::{Effect, SignalList};
use sprig_runtime::VirtualNode;

// ── Helpers ──────────────────────────────────────────────────────────

fn label(key: u32) -> String {
    format!("k{key}")
}

fn keyed(list: &SignalList<u32>) -> VirtualNode {
    VirtualNode::for_each(list.clone(), |key: &u32| *key, |key: &u32| element(&label(*key), []))
}

/// Unique keys in arbitrary order.
fn key_list() -> impl Strategy<Value = Vec<u32>> {
    proptest::sample::subsequence((0..12).collect::<Vec<u32>>(), 0..=12).prop_shuffle()
}

// ═════════════════════════════════════════════════════════════════════════
// 1-3. Order, identity and minimal structural churn
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn natives_follow_every_list_update(
        initial in key_list(),
        updates in proptest::collection::vec(key_list(), 1..8),
    ) {
        let list = SignalList::new(initial.clone());
        let mut harness = Harness::new();
        harness.mount(keyed(&list));
        let expected: Vec<String> = initial.iter().copied().map(label).collect();
        prop_assert_eq!(harness.root_labels(), expected);

        let mut current = initial;
        for next in updates {
            let before: Vec<(u32, Option<usize>)> = current
                .iter()
                .map(|&key| (key, harness.natives().find(&label(key))))
                .collect();
            harness.take_journal();

            list.replace_all(next.clone());
            harness.flush();

            let expected: Vec<String> = next.iter().copied().map(label).collect();
            prop_assert_eq!(harness.root_labels(), expected);

            let next_keys: BTreeSet<u32> = next.iter().copied().collect();
            let old_keys: BTreeSet<u32> = current.iter().copied().collect();
            for (key, node) in &before {
                if next_keys.contains(key) {
                    prop_assert_eq!(harness.natives().find(&label(*key)), *node);
                }
            }

            let journal = harness.take_journal();
            let added = journal
                .iter()
                .filter(|call| matches!(call, NativeCall::Add { .. }))
                .count();
            let destroyed = journal
                .iter()
                .filter(|call| matches!(call, NativeCall::Remove { destroy: true, .. }))
                .count();
            let moved = journal
                .iter()
                .filter(|call| matches!(call, NativeCall::Move { .. }))
                .count();
            prop_assert_eq!(added, next_keys.difference(&old_keys).count());
            prop_assert_eq!(destroyed, old_keys.difference(&next_keys).count());
            prop_assert!(moved <= next_keys.intersection(&old_keys).count());

            current = next;
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 4. Effect symmetry
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn effect_runs_balance_cleanups(
        initial in key_list(),
        updates in proptest::collection::vec(key_list(), 0..6),
    ) {
        let runs = Rc::new(Cell::new(0_u32));
        let cleanups = Rc::new(Cell::new(0_u32));
        let list = SignalList::new(initial);
        let mut harness = Harness::new();

        let (r, c) = (Rc::clone(&runs), Rc::clone(&cleanups));
        harness.mount(VirtualNode::for_each(list.clone(), |key: &u32| *key, move |key: &u32| {
            let (r, c) = (Rc::clone(&r), Rc::clone(&c));
            let name = label(*key);
            VirtualNode::component(move |cx| {
                let (r, c) = (Rc::clone(&r), Rc::clone(&c));
                cx.effect(Effect::new(move || {
                    r.set(r.get() + 1);
                    let c = Rc::clone(&c);
                    sprig_reactive::Cleanup::new(move || c.set(c.get() + 1))
                }));
                element(&name, [])
            })
        }));

        for next in updates {
            list.replace_all(next);
            harness.flush();
            let live = harness.root_labels().len() as u32;
            prop_assert_eq!(runs.get() - cleanups.get(), live);
        }

        harness.unmount();
        prop_assert_eq!(runs.get(), cleanups.get());
        prop_assert_eq!(harness.natives().labels(harness.root_node()).len(), 0);
    }
}
