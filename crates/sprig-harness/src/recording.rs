#![forbid(unsafe_code)]

//! In-memory native backend that records every call it receives.
//!
//! [`NativeTree`] owns the state of every node created through it. Each
//! [`RecordingNative`] is a thin handle into that shared state, so the tree
//! can be inspected at any point while the renderer still holds the handles.
//!
//! # Invariants
//!
//! 1. A node has at most one parent. Adding a child that is still attached
//!    elsewhere panics.
//! 2. `add_child` and `move_child` indices are bounds-checked against the
//!    host's current child count; violations panic.
//! 3. Every call lands in the journal in the order it was received.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use sprig_runtime::{FiberView, NativeElement, NativeHandle, NativeNode, RendererExtension, VirtualNode};

/// Index of a node inside its [`NativeTree`].
pub type NodeId = usize;

/// Element type name claimed by [`RecordingExtension`].
pub const ELEMENT: &str = "element";

/// Props of a recording element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub label: String,
}

/// A native element the recording backend will create.
pub fn element(label: &str, children: impl IntoIterator<Item = VirtualNode>) -> VirtualNode {
    VirtualNode::native(
        ELEMENT,
        Element {
            label: label.to_string(),
        },
        children,
    )
}

/// One backend call, by node label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeCall {
    Add {
        parent: String,
        child: String,
        index: usize,
    },
    Remove {
        parent: String,
        child: String,
        destroy: bool,
    },
    Move {
        parent: String,
        child: String,
        index: usize,
    },
    Update(String),
    Cleanup(String),
    SetVisible(String, bool),
}

impl NativeCall {
    /// Whether this call changed some host's child list.
    #[must_use]
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::Add { .. } | Self::Remove { .. } | Self::Move { .. })
    }
}

#[derive(Debug, Clone)]
struct NodeState {
    label: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    visible: bool,
    updates: u32,
    cleaned: bool,
    destroyed: bool,
}

#[derive(Debug, Default)]
struct TreeState {
    nodes: Vec<NodeState>,
    journal: Vec<NativeCall>,
}

impl TreeState {
    fn label(&self, node: NodeId) -> String {
        self.nodes[node].label.clone()
    }

    fn record(&mut self, call: NativeCall) {
        self.journal.push(call);
    }
}

/// Shared state behind every [`RecordingNative`] it created.
#[derive(Clone, Default)]
pub struct NativeTree {
    state: Rc<RefCell<TreeState>>,
}

impl fmt::Debug for NativeTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("NativeTree")
            .field("nodes", &state.nodes.len())
            .field("journal", &state.journal.len())
            .finish()
    }
}

impl NativeTree {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a detached node.
    pub fn create(&self, label: &str) -> Rc<RecordingNative> {
        let mut state = self.state.borrow_mut();
        state.nodes.push(NodeState {
            label: label.to_string(),
            parent: None,
            children: Vec::new(),
            visible: true,
            updates: 0,
            cleaned: false,
            destroyed: false,
        });
        Rc::new(RecordingNative {
            id: state.nodes.len() - 1,
            tree: self.clone(),
        })
    }

    /// The recording node behind `handle`, if it is one.
    #[must_use]
    pub fn id_of(handle: &NativeHandle) -> Option<NodeId> {
        handle
            .as_any()
            .downcast_ref::<RecordingNative>()
            .map(RecordingNative::id)
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.state.borrow().nodes.len()
    }

    #[must_use]
    pub fn label(&self, node: NodeId) -> String {
        self.state.borrow().label(node)
    }

    /// First node with `label` that has not been cleaned up.
    #[must_use]
    pub fn find(&self, label: &str) -> Option<NodeId> {
        self.state
            .borrow()
            .nodes
            .iter()
            .position(|node| node.label == label && !node.cleaned)
    }

    #[must_use]
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.state.borrow().nodes[node].parent
    }

    #[must_use]
    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.state.borrow().nodes[node].children.clone()
    }

    /// Labels of `node`'s children, in order.
    #[must_use]
    pub fn labels(&self, node: NodeId) -> Vec<String> {
        let state = self.state.borrow();
        state.nodes[node]
            .children
            .iter()
            .map(|&child| state.label(child))
            .collect()
    }

    #[must_use]
    pub fn is_visible(&self, node: NodeId) -> bool {
        self.state.borrow().nodes[node].visible
    }

    #[must_use]
    pub fn update_count(&self, node: NodeId) -> u32 {
        self.state.borrow().nodes[node].updates
    }

    #[must_use]
    pub fn is_cleaned(&self, node: NodeId) -> bool {
        self.state.borrow().nodes[node].cleaned
    }

    /// Whether the node was removed from its host with `destroy = true`.
    #[must_use]
    pub fn is_destroyed(&self, node: NodeId) -> bool {
        self.state.borrow().nodes[node].destroyed
    }

    #[must_use]
    pub fn journal(&self) -> Vec<NativeCall> {
        self.state.borrow().journal.clone()
    }

    /// Drain the journal.
    pub fn take_journal(&self) -> Vec<NativeCall> {
        std::mem::take(&mut self.state.borrow_mut().journal)
    }

    /// Compact rendering of the subtree at `node`, e.g. `root[a,~b[c]]`.
    /// Hidden nodes carry a `~` prefix.
    #[must_use]
    pub fn snapshot(&self, node: NodeId) -> String {
        let state = self.state.borrow();
        let mut out = String::new();
        write_node(&state, node, &mut out);
        out
    }
}

fn write_node(state: &TreeState, node: NodeId, out: &mut String) {
    let current = &state.nodes[node];
    if !current.visible {
        out.push('~');
    }
    out.push_str(&current.label);
    if current.children.is_empty() {
        return;
    }
    out.push('[');
    for (i, &child) in current.children.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_node(state, child, out);
    }
    out.push(']');
}

/// A node of a [`NativeTree`].
pub struct RecordingNative {
    id: NodeId,
    tree: NativeTree,
}

impl fmt::Debug for RecordingNative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingNative")
            .field("id", &self.id)
            .field("label", &self.tree.label(self.id))
            .finish()
    }
}

impl RecordingNative {
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    fn child_id(child: &NativeHandle) -> NodeId {
        NativeTree::id_of(child)
            .unwrap_or_else(|| panic!("child handle was not created by the recording backend"))
    }
}

impl NativeNode for RecordingNative {
    fn add_child(&self, child: &NativeHandle, index: usize) {
        let child = Self::child_id(child);
        let mut state = self.tree.state.borrow_mut();
        if let Some(parent) = state.nodes[child].parent {
            panic!(
                "{} is already attached to {}",
                state.label(child),
                state.label(parent)
            );
        }
        let len = state.nodes[self.id].children.len();
        assert!(index <= len, "add_child index {index} out of range ({len})");
        state.nodes[self.id].children.insert(index, child);
        state.nodes[child].parent = Some(self.id);
        let call = NativeCall::Add {
            parent: state.label(self.id),
            child: state.label(child),
            index,
        };
        state.record(call);
    }

    fn remove_child(&self, child: &NativeHandle, destroy: bool) {
        let child = Self::child_id(child);
        let mut state = self.tree.state.borrow_mut();
        let Some(position) = state.nodes[self.id].children.iter().position(|&c| c == child)
        else {
            panic!(
                "{} is not a child of {}",
                state.label(child),
                state.label(self.id)
            );
        };
        state.nodes[self.id].children.remove(position);
        state.nodes[child].parent = None;
        state.nodes[child].destroyed |= destroy;
        let call = NativeCall::Remove {
            parent: state.label(self.id),
            child: state.label(child),
            destroy,
        };
        state.record(call);
    }

    fn move_child(&self, child: &NativeHandle, index: usize) {
        let child = Self::child_id(child);
        let mut state = self.tree.state.borrow_mut();
        let Some(position) = state.nodes[self.id].children.iter().position(|&c| c == child)
        else {
            panic!(
                "{} is not a child of {}",
                state.label(child),
                state.label(self.id)
            );
        };
        let len = state.nodes[self.id].children.len();
        assert!(index < len, "move_child index {index} out of range ({len})");
        let children = &mut state.nodes[self.id].children;
        children.remove(position);
        children.insert(index, child);
        let call = NativeCall::Move {
            parent: state.label(self.id),
            child: state.label(child),
            index,
        };
        state.record(call);
    }

    fn update(&self) {
        let mut state = self.tree.state.borrow_mut();
        state.nodes[self.id].updates += 1;
        let call = NativeCall::Update(state.label(self.id));
        state.record(call);
    }

    fn cleanup(&self) {
        let mut state = self.tree.state.borrow_mut();
        state.nodes[self.id].cleaned = true;
        let call = NativeCall::Cleanup(state.label(self.id));
        state.record(call);
    }

    fn set_visible(&self, visible: bool) {
        let mut state = self.tree.state.borrow_mut();
        state.nodes[self.id].visible = visible;
        let call = NativeCall::SetVisible(state.label(self.id), visible);
        state.record(call);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Creates a [`RecordingNative`] for every [`ELEMENT`] it is asked about.
#[derive(Debug, Clone)]
pub struct RecordingExtension {
    tree: NativeTree,
}

impl RecordingExtension {
    #[must_use]
    pub fn new(tree: NativeTree) -> Self {
        Self { tree }
    }
}

impl RendererExtension for RecordingExtension {
    fn owns_component_type(&self, element: &NativeElement) -> bool {
        element.type_name == ELEMENT
    }

    fn create_native_node(&self, fiber: &FiberView<'_>) -> Option<NativeHandle> {
        let props = fiber.element()?.props::<Element>()?;
        let node: NativeHandle = self.tree.create(&props.label);
        Some(node)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(node: &Rc<RecordingNative>) -> NativeHandle {
        let handle: NativeHandle = node.clone();
        handle
    }

    #[test]
    fn records_structure_and_journal() {
        let tree = NativeTree::new();
        let root = tree.create("root");
        let a = tree.create("a");
        let b = tree.create("b");
        root.add_child(&handle(&a), 0);
        root.add_child(&handle(&b), 0);
        root.move_child(&handle(&a), 0);
        b.set_visible(false);
        assert_eq!(tree.snapshot(root.id()), "root[a,~b]");
        assert_eq!(
            tree.take_journal(),
            vec![
                NativeCall::Add {
                    parent: "root".into(),
                    child: "a".into(),
                    index: 0
                },
                NativeCall::Add {
                    parent: "root".into(),
                    child: "b".into(),
                    index: 0
                },
                NativeCall::Move {
                    parent: "root".into(),
                    child: "a".into(),
                    index: 0
                },
                NativeCall::SetVisible("b".into(), false),
            ]
        );
        assert!(tree.journal().is_empty());
    }

    #[test]
    fn remove_tracks_destroy_flag() {
        let tree = NativeTree::new();
        let root = tree.create("root");
        let a = tree.create("a");
        root.add_child(&handle(&a), 0);
        root.remove_child(&handle(&a), false);
        assert!(!tree.is_destroyed(a.id()));
        assert_eq!(tree.parent(a.id()), None);
        root.add_child(&handle(&a), 0);
        root.remove_child(&handle(&a), true);
        assert!(tree.is_destroyed(a.id()));
    }

    #[test]
    #[should_panic(expected = "already attached")]
    fn double_attach_panics() {
        let tree = NativeTree::new();
        let root = tree.create("root");
        let other = tree.create("other");
        let a = tree.create("a");
        root.add_child(&handle(&a), 0);
        other.add_child(&handle(&a), 0);
    }

    #[test]
    fn find_skips_cleaned_nodes() {
        let tree = NativeTree::new();
        let first = tree.create("x");
        let second = tree.create("x");
        assert_eq!(tree.find("x"), Some(first.id()));
        first.cleanup();
        assert_eq!(tree.find("x"), Some(second.id()));
    }
}
