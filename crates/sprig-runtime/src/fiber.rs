#![forbid(unsafe_code)]

//! Fiber arena.
//!
//! Fibers live in a [`SlotMap`] and link to each other by [`FiberId`]:
//! `parent`, `first_child`, `next_sibling`. A fiber id appears in at most one
//! other fiber's child or sibling slot at a time; the mutation helpers here
//! are the only code that rewrites those slots.
//!
//! # Invariants
//!
//! 1. Detaching a fiber unlinks it from its parent's child chain but keeps
//!    its `parent` index, so removal of any ancestor stays observable.
//! 2. A freed slot is never reused under the same id (generational keys),
//!    so stale queue entries resolve to "missing".
//! 3. `attached` on a native-bearing fiber mirrors the order of its native's
//!    children: natural children first, portal guests after them.

use std::any::Any;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

use slotmap::{SlotMap, new_key_type};
use smallvec::SmallVec;
use sprig_reactive::{Dependent, DependentRef, EffectUnit};

use crate::control::ControlState;
use crate::native::{NativeElement, NativeHandle};
use crate::vnode::{Key, VirtualNode};

new_key_type! {
    /// Stable, generational handle to a fiber.
    pub struct FiberId;
}

/// Lifecycle of a fiber.
///
/// `AddedToVirtualTree → Rendered → Mounted → RemovedFromVirtualTree →
/// Unmounted`. A fiber can be removed from any earlier phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    AddedToVirtualTree,
    Rendered,
    Mounted,
    RemovedFromVirtualTree,
    Unmounted,
}

/// Shared update queue. Fiber hooks push onto it from signal notifications.
pub(crate) type UpdateQueue = Rc<RefCell<VecDeque<FiberId>>>;

/// Dependent registered on behalf of a fiber: a notification enqueues the
/// fiber for the update pass. Duplicate entries are harmless.
pub(crate) struct FiberHook {
    id: FiberId,
    updates: Weak<RefCell<VecDeque<FiberId>>>,
}

impl Dependent for FiberHook {
    fn notify(&self) {
        if let Some(updates) = self.updates.upgrade() {
            updates.borrow_mut().push_back(self.id);
        }
    }
}

pub(crate) struct FiberNode {
    pub(crate) parent: Option<FiberId>,
    pub(crate) first_child: Option<FiberId>,
    pub(crate) next_sibling: Option<FiberId>,
    pub(crate) vnode: Option<VirtualNode>,
    pub(crate) key: Option<Key>,
    pub(crate) native: Option<NativeHandle>,
    /// Fiber whose native currently holds ours.
    pub(crate) native_host: Option<FiberId>,
    /// Set while our native is a guest of that portal destination.
    pub(crate) portal_destination: Option<FiberId>,
    /// Mirror of the native's child list (native-bearing fibers only).
    pub(crate) attached: Vec<FiberId>,
    pub(crate) phase: Phase,
    pub(crate) enabled: bool,
    pub(crate) visible: bool,
    pub(crate) effects: Vec<Box<dyn EffectUnit>>,
    pub(crate) control: Option<ControlState>,
    pub(crate) context: Option<Rc<dyn Any>>,
    hook: Rc<FiberHook>,
}

impl FiberNode {
    /// The hook as a dependent reference for subscriptions.
    pub(crate) fn dependent(&self) -> DependentRef {
        let weak: Weak<FiberHook> = Rc::downgrade(&self.hook);
        weak
    }
}

/// Arena plus the update queue its hooks feed.
pub(crate) struct FiberTree {
    nodes: SlotMap<FiberId, FiberNode>,
    updates: UpdateQueue,
}

impl FiberTree {
    pub(crate) fn new() -> Self {
        Self {
            nodes: SlotMap::with_key(),
            updates: Rc::new(RefCell::new(VecDeque::new())),
        }
    }

    pub(crate) fn updates(&self) -> &UpdateQueue {
        &self.updates
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Allocate an unlinked fiber.
    pub(crate) fn insert(
        &mut self,
        parent: Option<FiberId>,
        vnode: Option<VirtualNode>,
        key: Option<Key>,
    ) -> FiberId {
        let updates = Rc::downgrade(&self.updates);
        self.nodes.insert_with_key(|id| FiberNode {
            parent,
            first_child: None,
            next_sibling: None,
            vnode,
            key,
            native: None,
            native_host: None,
            portal_destination: None,
            attached: Vec::new(),
            phase: Phase::AddedToVirtualTree,
            enabled: true,
            visible: true,
            effects: Vec::new(),
            control: None,
            context: None,
            hook: Rc::new(FiberHook { id, updates }),
        })
    }

    pub(crate) fn remove(&mut self, id: FiberId) -> Option<FiberNode> {
        self.nodes.remove(id)
    }

    pub(crate) fn contains(&self, id: FiberId) -> bool {
        self.nodes.contains_key(id)
    }

    pub(crate) fn get(&self, id: FiberId) -> Option<&FiberNode> {
        self.nodes.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: FiberId) -> Option<&mut FiberNode> {
        self.nodes.get_mut(id)
    }

    /// Children in chain order.
    pub(crate) fn children(&self, id: FiberId) -> SmallVec<[FiberId; 8]> {
        let mut out = SmallVec::new();
        let mut cursor = self.nodes.get(id).and_then(|n| n.first_child);
        while let Some(child) = cursor {
            out.push(child);
            cursor = self.nodes.get(child).and_then(|n| n.next_sibling);
        }
        out
    }

    /// Link `child` as the last child of `parent`.
    pub(crate) fn append_child(&mut self, parent: FiberId, child: FiberId) {
        let last = self.children(parent).last().copied();
        match last {
            Some(last) => self.nodes[last].next_sibling = Some(child),
            None => self.nodes[parent].first_child = Some(child),
        }
        let node = &mut self.nodes[child];
        node.parent = Some(parent);
        node.next_sibling = None;
    }

    /// Rewrite `parent`'s child chain to exactly `order`.
    pub(crate) fn relink_children(&mut self, parent: FiberId, order: &[FiberId]) {
        self.nodes[parent].first_child = order.first().copied();
        for (i, &child) in order.iter().enumerate() {
            let node = &mut self.nodes[child];
            node.parent = Some(parent);
            node.next_sibling = order.get(i + 1).copied();
        }
    }

    /// Unlink `id` from its parent's chain and mark it removed.
    pub(crate) fn detach(&mut self, id: FiberId) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        let (parent, next) = (node.parent, node.next_sibling);
        if let Some(parent) = parent {
            let siblings = self.children(parent);
            if let Some(pos) = siblings.iter().position(|&c| c == id) {
                if pos == 0 {
                    self.nodes[parent].first_child = next;
                } else {
                    self.nodes[siblings[pos - 1]].next_sibling = next;
                }
            }
        }
        let node = &mut self.nodes[id];
        node.next_sibling = None;
        node.phase = Phase::RemovedFromVirtualTree;
    }

    /// Whether `id` or any ancestor is gone or removed.
    pub(crate) fn is_removed(&self, id: FiberId) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let Some(node) = self.nodes.get(current) else {
                return true;
            };
            if matches!(
                node.phase,
                Phase::RemovedFromVirtualTree | Phase::Unmounted
            ) {
                return true;
            }
            cursor = node.parent;
        }
        false
    }

    /// `id` and its descendants, depth-first pre-order.
    pub(crate) fn subtree_preorder(&self, id: FiberId) -> Vec<FiberId> {
        let mut out = Vec::new();
        if !self.nodes.contains_key(id) {
            return out;
        }
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            let children = self.children(current);
            stack.extend(children.iter().rev().copied());
        }
        out
    }

    /// Native-bearing fibers at or below `id` with no native-bearing fiber
    /// between them and `id`, in tree order.
    pub(crate) fn top_level_natives(&self, id: FiberId) -> Vec<FiberId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get(current) else {
                continue;
            };
            if node.native.is_some() {
                out.push(current);
                continue;
            }
            let children = self.children(current);
            stack.extend(children.iter().rev().copied());
        }
        out
    }

    /// Conjunction of `enabled` over `id` and its ancestors.
    pub(crate) fn effective_enabled(&self, id: FiberId) -> bool {
        self.ancestors_inclusive(id).all(|node| node.enabled)
    }

    /// Conjunction of `visible` over `id` and its ancestors.
    pub(crate) fn effective_visible(&self, id: FiberId) -> bool {
        self.ancestors_inclusive(id).all(|node| node.visible)
    }

    pub(crate) fn ancestors_inclusive(&self, id: FiberId) -> impl Iterator<Item = &FiberNode> {
        let mut cursor = Some(id);
        std::iter::from_fn(move || {
            let node = self.nodes.get(cursor?)?;
            cursor = node.parent;
            Some(node)
        })
    }

    /// Nearest ancestor (exclusive) that owns a native.
    pub(crate) fn native_ancestor(&self, id: FiberId) -> Option<FiberId> {
        let mut cursor = self.nodes.get(id)?.parent;
        while let Some(current) = cursor {
            let node = self.nodes.get(current)?;
            if node.native.is_some() {
                return Some(current);
            }
            cursor = node.parent;
        }
        None
    }
}

/// Read-only view of one fiber.
#[derive(Clone, Copy)]
pub struct FiberView<'a> {
    id: FiberId,
    node: &'a FiberNode,
}

impl<'a> FiberView<'a> {
    pub(crate) fn new(id: FiberId, node: &'a FiberNode) -> Self {
        Self { id, node }
    }

    #[must_use]
    pub fn id(&self) -> FiberId {
        self.id
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.node.phase
    }

    #[must_use]
    pub fn parent(&self) -> Option<FiberId> {
        self.node.parent
    }

    #[must_use]
    pub fn key(&self) -> Option<&'a Key> {
        self.node.key.as_ref()
    }

    #[must_use]
    pub fn vnode(&self) -> Option<&'a VirtualNode> {
        self.node.vnode.as_ref()
    }

    /// The element, for fibers built from a native node.
    #[must_use]
    pub fn element(&self) -> Option<&'a NativeElement> {
        match self.node.vnode.as_ref()? {
            VirtualNode::Native(element) => Some(element),
            _ => None,
        }
    }

    #[must_use]
    pub fn native(&self) -> Option<&'a NativeHandle> {
        self.node.native.as_ref()
    }

    /// Fiber whose native currently holds this fiber's native.
    #[must_use]
    pub fn native_host(&self) -> Option<FiberId> {
        self.node.native_host
    }

    /// Destination holding this fiber's native as a portal guest.
    #[must_use]
    pub fn portal_destination(&self) -> Option<FiberId> {
        self.node.portal_destination
    }

    /// Own flag, not the ancestor conjunction.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.node.enabled
    }

    /// Own flag, not the ancestor conjunction.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.node.visible
    }

    #[must_use]
    pub fn effect_count(&self) -> usize {
        self.node.effects.len()
    }
}

impl fmt::Debug for FiberView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FiberView")
            .field("id", &self.id)
            .field("phase", &self.node.phase)
            .field("kind", &self.node.vnode.as_ref().map(VirtualNode::kind))
            .field("key", &self.node.key)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_with_children(n: usize) -> (FiberTree, FiberId, Vec<FiberId>) {
        let mut tree = FiberTree::new();
        let root = tree.insert(None, None, None);
        let kids: Vec<_> = (0..n)
            .map(|i| {
                let id = tree.insert(Some(root), None, Some(Key::from(i)));
                tree.append_child(root, id);
                id
            })
            .collect();
        (tree, root, kids)
    }

    #[test]
    fn append_and_relink() {
        let (mut tree, root, kids) = tree_with_children(3);
        assert_eq!(tree.children(root).as_slice(), kids.as_slice());

        let reversed: Vec<_> = kids.iter().rev().copied().collect();
        tree.relink_children(root, &reversed);
        assert_eq!(tree.children(root).as_slice(), reversed.as_slice());
    }

    #[test]
    fn detach_keeps_parent_and_marks_removed() {
        let (mut tree, root, kids) = tree_with_children(3);
        let grandchild = tree.insert(Some(kids[1]), None, None);
        tree.append_child(kids[1], grandchild);

        tree.detach(kids[1]);
        assert_eq!(tree.children(root).as_slice(), &[kids[0], kids[2]]);
        assert_eq!(tree.get(kids[1]).and_then(|n| n.parent), Some(root));
        assert!(tree.is_removed(kids[1]));
        assert!(tree.is_removed(grandchild));
        assert!(!tree.is_removed(kids[0]));

        tree.detach(kids[0]);
        assert_eq!(tree.children(root).as_slice(), &[kids[2]]);
    }

    #[test]
    fn preorder_walks_depth_first() {
        let (mut tree, root, kids) = tree_with_children(2);
        let deep = tree.insert(Some(kids[0]), None, None);
        tree.append_child(kids[0], deep);
        assert_eq!(tree.subtree_preorder(root), vec![root, kids[0], deep, kids[1]]);
    }

    #[test]
    fn freed_ids_stay_missing() {
        let (mut tree, _root, kids) = tree_with_children(1);
        tree.remove(kids[0]);
        assert!(!tree.contains(kids[0]));
        assert!(tree.is_removed(kids[0]));
        let fresh = tree.insert(None, None, None);
        assert_ne!(fresh, kids[0]);
    }

    #[test]
    fn effective_flags_are_conjunctions() {
        let (mut tree, root, kids) = tree_with_children(1);
        assert!(tree.effective_visible(kids[0]));
        if let Some(node) = tree.get_mut(root) {
            node.visible = false;
        }
        assert!(!tree.effective_visible(kids[0]));
        assert!(tree.effective_enabled(kids[0]));
    }

    #[test]
    fn hook_enqueues_its_fiber() {
        let (tree, _root, kids) = tree_with_children(1);
        let dependent = tree.get(kids[0]).map(FiberNode::dependent);
        if let Some(dep) = dependent.and_then(|d| d.upgrade()) {
            dep.notify();
            dep.notify();
        }
        let queued: Vec<_> = tree.updates().borrow().iter().copied().collect();
        assert_eq!(queued, vec![kids[0], kids[0]]);
    }
}
