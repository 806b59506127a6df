#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sprig_harness::{Harness, element};
use sprig_reactive::{Signal, SignalList};
use sprig_runtime::VirtualNode;

const DESTINATIONS: [&str; 2] = ["left", "right"];

#[derive(Arbitrary, Debug)]
enum Step {
    Target(Option<bool>),
    ToggleLeft,
    ToggleRight,
    Rotate,
    Push(u8),
    Flush,
}

fuzz_target!(|steps: Vec<Step>| {
    let target: Signal<Option<String>> = Signal::new(None);
    let left_open = Signal::new(true);
    let right_open = Signal::new(true);
    let items = SignalList::new(vec![0_u8, 1, 2]);

    let mut harness = Harness::new();
    harness.mount(VirtualNode::fragment([
        element(
            "home",
            [VirtualNode::portal(
                &target,
                [VirtualNode::for_each(items.clone(), |n: &u8| u32::from(*n), |n: &u8| {
                    element(&format!("g{n}"), [])
                })],
            )],
        ),
        element(
            "left",
            [VirtualNode::mount(
                &left_open,
                [VirtualNode::portal_destination(DESTINATIONS[0], [element("l", [])])],
            )],
        ),
        element(
            "right",
            [VirtualNode::mount(
                &right_open,
                [VirtualNode::portal_destination(DESTINATIONS[1], [element("r", [])])],
            )],
        ),
    ]));

    for step in steps.into_iter().take(128) {
        match step {
            Step::Target(choice) => {
                target.set(choice.map(|right| DESTINATIONS[usize::from(right)].to_string()));
            }
            Step::ToggleLeft => left_open.update(|open| *open = !*open),
            Step::ToggleRight => right_open.update(|open| *open = !*open),
            Step::Rotate => {
                if items.len() > 1 {
                    items.move_item(0, items.len() - 1);
                }
            }
            Step::Push(n) => {
                if !items.to_vec().contains(&n) {
                    items.push(n);
                }
            }
            Step::Flush => {
                harness.flush();
            }
        }
    }
    harness.flush();

    // Every guest lives in exactly one host, in list order.
    let guests: Vec<String> = items.to_vec().iter().map(|n| format!("g{n}")).collect();
    let placed: Vec<String> = ["home", "left", "right"]
        .iter()
        .flat_map(|host| harness.labels_of(host))
        .filter(|label| label.starts_with('g'))
        .collect();
    assert_eq!(placed, guests);

    harness.unmount();
    assert!(harness.root_labels().is_empty());
});
