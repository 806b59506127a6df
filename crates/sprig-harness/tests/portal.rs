#![forbid(unsafe_code)]

//! Portals: moving natives into a destination elsewhere in the tree and back.

use sprig_harness::{Harness, NativeCall, TraceCapture, element};
use sprig_reactive::Signal;
use sprig_runtime::{Operation, VirtualNode};

fn app(target: &Signal<Option<String>>, layer_open: &Signal<bool>) -> VirtualNode {
    VirtualNode::fragment([
        element(
            "main",
            [
                element("title", []),
                VirtualNode::portal(target, [element("popup", [element("popup.body", [])])]),
            ],
        ),
        element(
            "overlay",
            [VirtualNode::mount(
                layer_open,
                [VirtualNode::portal_destination("layer", [element("backdrop", [])])],
            )],
        ),
    ])
}

fn setup() -> (Harness, Signal<Option<String>>, Signal<bool>) {
    let target = Signal::new(None);
    let layer_open = Signal::new(true);
    let mut harness = Harness::new();
    harness.mount(app(&target, &layer_open));
    harness.take_operations();
    harness.take_journal();
    (harness, target, layer_open)
}

#[test]
fn unset_destination_keeps_natural_parent() {
    let (harness, _target, _open) = setup();
    assert_eq!(
        harness.snapshot(),
        "root[main[title,popup[popup.body]],overlay[backdrop]]"
    );
}

#[test]
fn round_trip_through_destination() {
    let (mut harness, target, _open) = setup();

    target.set(Some("layer".into()));
    harness.flush();
    assert_eq!(
        harness.snapshot(),
        "root[main[title],overlay[backdrop,popup[popup.body]]]"
    );
    let ops = harness.take_operations();
    assert_eq!(ops.len(), 1);
    assert!(matches!(
        ops[0],
        Operation::SetPortalDestination {
            destination: Some(_),
            ..
        }
    ));
    assert_eq!(
        harness.take_structural(),
        vec![
            NativeCall::Remove {
                parent: "main".into(),
                child: "popup".into(),
                destroy: false
            },
            NativeCall::Add {
                parent: "overlay".into(),
                child: "popup".into(),
                index: 1
            },
        ]
    );

    target.set(None);
    harness.flush();
    assert_eq!(
        harness.snapshot(),
        "root[main[title,popup[popup.body]],overlay[backdrop]]"
    );
    let popup = harness.natives().find("popup");
    assert!(popup.is_some_and(|node| !harness.natives().is_cleaned(node)));
}

#[test]
fn unknown_destination_warns_and_stays_home() {
    let (mut harness, target, _open) = setup();
    let capture = TraceCapture::new();
    let _guard = capture.install();

    target.set(Some("nowhere".into()));
    harness.flush();

    assert_eq!(
        harness.snapshot(),
        "root[main[title,popup[popup.body]],overlay[backdrop]]"
    );
    let warnings = capture.warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].message, "unknown portal destination");
    assert_eq!(warnings[0].field("destination"), Some("nowhere"));
    assert!(harness.take_operations().is_empty());
}

#[test]
fn destination_teardown_returns_guests_home() {
    let (mut harness, target, layer_open) = setup();
    target.set(Some("layer".into()));
    harness.flush();
    harness.take_journal();

    layer_open.set(false);
    harness.flush();
    assert_eq!(
        harness.snapshot(),
        "root[main[title,popup[popup.body]],overlay]"
    );
    let backdrop_cleaned = harness
        .take_journal()
        .contains(&NativeCall::Cleanup("backdrop".into()));
    assert!(backdrop_cleaned);
    let popup = harness.natives().find("popup");
    assert!(popup.is_some_and(|node| !harness.natives().is_destroyed(node)));

    // A destination registered again under the same id is picked up the
    // next time the portal's target changes.
    layer_open.set(true);
    harness.flush();
    assert_eq!(
        harness.snapshot(),
        "root[main[title,popup[popup.body]],overlay[backdrop]]"
    );

    target.set(None);
    harness.flush();
    target.set(Some("layer".into()));
    harness.flush();
    assert_eq!(
        harness.snapshot(),
        "root[main[title],overlay[backdrop,popup[popup.body]]]"
    );
}

#[test]
fn portal_owner_unmount_removes_guest_from_destination() {
    let target = Signal::new(Some("layer".to_string()));
    let show_popup = Signal::new(true);
    let mut harness = Harness::new();
    harness.mount(VirtualNode::fragment([
        element(
            "main",
            [VirtualNode::mount(
                &show_popup,
                [VirtualNode::portal(&target, [element("popup", [])])],
            )],
        ),
        element("overlay", [VirtualNode::portal_destination("layer", [])]),
    ]));
    assert_eq!(harness.snapshot(), "root[main,overlay[popup]]");

    harness.take_journal();
    show_popup.set(false);
    harness.flush();
    assert_eq!(harness.snapshot(), "root[main,overlay]");
    assert_eq!(
        harness.take_journal(),
        vec![
            NativeCall::Remove {
                parent: "overlay".into(),
                child: "popup".into(),
                destroy: true
            },
            NativeCall::Cleanup("popup".into()),
        ]
    );
}

#[test]
fn guests_follow_natural_children_in_tree_order() {
    let target = Signal::new(Some("layer".to_string()));
    let mut harness = Harness::new();
    harness.mount(VirtualNode::fragment([
        VirtualNode::portal(&target, [element("first", [])]),
        element(
            "overlay",
            [
                VirtualNode::portal_destination("layer", [element("own", [])]),
                element("tail", []),
            ],
        ),
        VirtualNode::portal(&target, [element("second", [])]),
    ]));
    assert_eq!(harness.snapshot(), "root[overlay[own,tail,first,second]]");
}

#[test]
fn duplicate_destination_ids_warn() {
    let capture = TraceCapture::new();
    let _guard = capture.install();
    let mut harness = Harness::new();
    harness.mount(element(
        "host",
        [
            VirtualNode::portal_destination("dup", []),
            VirtualNode::portal_destination("dup", []),
        ],
    ));
    assert_eq!(
        capture
            .warnings()
            .iter()
            .filter(|event| event.message.starts_with("duplicate portal destination"))
            .count(),
        1
    );
    assert!(harness.renderer.portal_destination("dup").is_some());
}
