#![forbid(unsafe_code)]

//! Commit pass: applying operations to the native tree.
//!
//! # Placement
//!
//! A native lives under its *natural host* (the nearest native-bearing
//! ancestor) unless a portal between them resolves to a live destination, in
//! which case it is a *guest* of that destination's natural host. Each host
//! keeps natural children first and guests after them.
//!
//! Insertion indices come from tree order: a native goes directly after its
//! predecessor, the closest preceding native in tree order that is already
//! attached to the same host in the same role. With no natural predecessor
//! the index is 0; with no guest predecessor it is the natural-child count.
//!
//! # Failure Modes
//!
//! | Condition | Behavior |
//! |-----------|----------|
//! | Computed index past the host's child count | `Error::IndexOutOfRange`, fatal |
//! | Fiber not reachable from its host | `Error::InvalidTree`, fatal |
//! | No native-bearing ancestor | `Error::InvalidTree`, fatal |

use ahash::AHashSet;
use tracing::trace;

use crate::control::ControlState;
use crate::error::{Error, fatal};
use crate::fiber::{FiberId, Phase};
use crate::operation::Operation;
use crate::renderer::Renderer;

/// Where a native belongs right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Placement {
    Natural { host: FiberId },
    Guest { host: FiberId, destination: FiberId },
}

impl Placement {
    fn host(self) -> FiberId {
        match self {
            Self::Natural { host } | Self::Guest { host, .. } => host,
        }
    }

    fn destination(self) -> Option<FiberId> {
        match self {
            Self::Natural { .. } => None,
            Self::Guest { destination, .. } => Some(destination),
        }
    }
}

impl Renderer {
    pub(crate) fn commit(&mut self, op: Operation) {
        trace!(op = %op, "sprig.commit");
        match op {
            Operation::Mount(id) => self.commit_mount(id),
            Operation::Unmount(id) => self.commit_unmount(id),
            Operation::Move { fiber, .. } => self.commit_move(fiber),
            Operation::SetPortalDestination { fiber, .. } => self.commit_portal(fiber),
        }
    }

    fn commit_mount(&mut self, id: FiberId) {
        let Some(node) = self.tree.get(id) else {
            return;
        };
        if node.phase != Phase::Rendered || self.tree.is_removed(id) {
            return;
        }
        if let Some(native) = node.native.clone() {
            let placement = self.placement_of(id);
            let index = self.insertion_index(id, placement);
            self.insert_native(id, placement, index);
            // Natives nested under a hidden native inherit its visibility.
            let host_visible = self
                .tree
                .native_ancestor(id)
                .is_none_or(|host| self.tree.effective_visible(host));
            if host_visible && !self.tree.effective_visible(id) {
                native.set_visible(false);
            }
        }
        self.reconcile_if_stale(id);
        self.run_effects(id);
        if let Some(node) = self.tree.get_mut(id) {
            node.phase = Phase::Mounted;
        }
    }

    fn commit_unmount(&mut self, id: FiberId) {
        if !self.tree.contains(id) {
            return;
        }
        let subtree = self.tree.subtree_preorder(id);
        let members: AHashSet<FiberId> = subtree.iter().copied().collect();
        trace!(?id, fibers = subtree.len(), "sprig.unmount_subtree");

        // Effects first, while every native still exists.
        for &fiber in &subtree {
            let effects = self
                .tree
                .get_mut(fiber)
                .map(|node| std::mem::take(&mut node.effects))
                .unwrap_or_default();
            for mut effect in effects {
                effect.dispose();
                effect.recycle(&mut self.pools);
            }
        }

        // Destinations go away: unregister them and send surviving guests
        // back to their natural hosts.
        let mut homeless = Vec::new();
        for &fiber in &subtree {
            let Some(ControlState::Destination { id: name, guests }) =
                self.tree.get(fiber).and_then(|node| node.control.as_ref())
            else {
                continue;
            };
            if self.destinations.get(name) == Some(&fiber) {
                self.destinations.remove(name);
            }
            homeless.extend(guests.iter().copied().filter(|g| !members.contains(g)));
        }
        for guest in homeless {
            let attached = self
                .tree
                .get(guest)
                .is_some_and(|node| node.native_host.is_some());
            // A guest already detached from the tree keeps its slot until its
            // own unmount removes it.
            if attached && !self.tree.is_removed(guest) {
                self.detach_native(guest, false);
                let placement = self.placement_of(guest);
                let index = self.insertion_index(guest, placement);
                self.insert_native(guest, placement, index);
            }
        }

        for &fiber in &subtree {
            if let Some(control) = self.tree.get_mut(fiber).and_then(|node| node.control.take()) {
                control.release(&mut self.pools);
            }
        }

        // Natives bottom-up: unhook the ones held by hosts outside the
        // subtree, then clean every one up.
        for &fiber in subtree.iter().rev() {
            let outside_host = self
                .tree
                .get(fiber)
                .and_then(|node| node.native_host)
                .is_some_and(|host| !members.contains(&host));
            if outside_host {
                self.detach_native(fiber, true);
            }
        }
        for &fiber in subtree.iter().rev() {
            if let Some(native) = self.tree.get(fiber).and_then(|node| node.native.clone()) {
                native.cleanup();
            }
        }

        for &fiber in &subtree {
            if let Some(node) = self.tree.get_mut(fiber) {
                node.phase = Phase::Unmounted;
            }
            self.tree.remove(fiber);
        }
    }

    fn commit_move(&mut self, fiber: FiberId) {
        if !self.tree.contains(fiber) || self.tree.is_removed(fiber) {
            return;
        }
        // Each native is placed right after its tree-order predecessor, so
        // walking the run front to back keeps it contiguous.
        for native_fiber in self.tree.top_level_natives(fiber) {
            let Some(node) = self.tree.get(native_fiber) else {
                continue;
            };
            let Some(host) = node.native_host else {
                continue;
            };
            let placement = match node.portal_destination {
                Some(destination) => Placement::Guest { host, destination },
                None => Placement::Natural { host },
            };
            let target = self.insertion_index(native_fiber, placement);
            let current = self.attached_position(host, native_fiber);

            // Leaving a slot before the predecessor shifts it down by one.
            let moving_forward = current < target;
            let index = if moving_forward { target - 1 } else { target };
            if index == current {
                continue;
            }
            let (Some(host_native), Some(native)) = (
                self.tree.get(host).and_then(|n| n.native.clone()),
                self.tree.get(native_fiber).and_then(|n| n.native.clone()),
            ) else {
                continue;
            };
            host_native.move_child(&native, index);
            if let Some(host_node) = self.tree.get_mut(host) {
                host_node.attached.remove(current);
                host_node.attached.insert(index, native_fiber);
            }
            trace!(fiber = ?native_fiber, current, index, moving_forward, "sprig.move_native");
        }
    }

    fn commit_portal(&mut self, fiber: FiberId) {
        if self.tree.is_removed(fiber) {
            return;
        }
        let Some(node) = self.tree.get(fiber) else {
            return;
        };
        let Some(host) = node.native_host else {
            // Not inserted yet; its mount will pick the current placement.
            return;
        };
        let current = match node.portal_destination {
            Some(destination) => Placement::Guest { host, destination },
            None => Placement::Natural { host },
        };
        let placement = self.placement_of(fiber);
        if placement == current {
            return;
        }
        self.detach_native(fiber, false);
        let index = self.insertion_index(fiber, placement);
        self.insert_native(fiber, placement, index);
    }

    // ------------------------------------------------------------------
    // Placement helpers
    // ------------------------------------------------------------------

    /// Host for `id`'s native given the current tree and portal targets.
    pub(crate) fn placement_of(&self, id: FiberId) -> Placement {
        let mut cursor = self.tree.get(id).and_then(|node| node.parent);
        while let Some(current) = cursor {
            let Some(node) = self.tree.get(current) else {
                break;
            };
            if node.native.is_some() {
                return Placement::Natural { host: current };
            }
            if let Some(destination) = node.control.as_ref().and_then(ControlState::portal_target)
                && self.is_live_destination(destination)
            {
                let host = self.tree.native_ancestor(destination).unwrap_or_else(|| {
                    fatal(Error::invalid_tree("portal destination has no native ancestor"))
                });
                return Placement::Guest { host, destination };
            }
            cursor = node.parent;
        }
        fatal(Error::invalid_tree("fiber has no native-bearing ancestor"))
    }

    /// Index at which `id`'s native belongs under `placement`'s host.
    pub(crate) fn insertion_index(&self, id: FiberId, placement: Placement) -> usize {
        let host = placement.host();
        let predecessor = match placement {
            Placement::Natural { .. } => self.natural_predecessor(id, host),
            Placement::Guest { .. } => self.guest_predecessor(id, host),
        };
        match predecessor {
            Some(previous) => self.attached_position(host, previous) + 1,
            None => match placement {
                Placement::Natural { .. } => 0,
                Placement::Guest { .. } => self.natural_child_count(host),
            },
        }
    }

    /// Last native attached naturally to `host` before `id`, searching
    /// `host`'s subtree without descending into other natives.
    fn natural_predecessor(&self, id: FiberId, host: FiberId) -> Option<FiberId> {
        let mut predecessor = None;
        let mut stack: Vec<FiberId> = self.tree.children(host).into_iter().rev().collect();
        while let Some(current) = stack.pop() {
            if current == id {
                return predecessor;
            }
            let Some(node) = self.tree.get(current) else {
                continue;
            };
            if node.native.is_some() {
                if node.native_host == Some(host) && node.portal_destination.is_none() {
                    predecessor = Some(current);
                }
                continue;
            }
            stack.extend(self.tree.children(current).into_iter().rev());
        }
        fatal(Error::invalid_tree("fiber is not reachable from its natural host"))
    }

    /// Last guest attached to `host` before `id` in whole-tree order.
    fn guest_predecessor(&self, id: FiberId, host: FiberId) -> Option<FiberId> {
        let root = self
            .root
            .unwrap_or_else(|| fatal(Error::invalid_tree("portal guest outside a mounted tree")));
        let mut predecessor = None;
        let mut stack = vec![root];
        while let Some(current) = stack.pop() {
            if current == id {
                return predecessor;
            }
            let Some(node) = self.tree.get(current) else {
                continue;
            };
            if node.native.is_some()
                && node.native_host == Some(host)
                && node.portal_destination.is_some()
            {
                predecessor = Some(current);
            }
            stack.extend(self.tree.children(current).into_iter().rev());
        }
        fatal(Error::invalid_tree("portal guest is not reachable from the root"))
    }

    fn natural_child_count(&self, host: FiberId) -> usize {
        self.tree.get(host).map_or(0, |node| {
            node.attached
                .iter()
                .filter(|&&child| {
                    self.tree
                        .get(child)
                        .is_some_and(|c| c.portal_destination.is_none())
                })
                .count()
        })
    }

    fn attached_position(&self, host: FiberId, child: FiberId) -> usize {
        self.tree
            .get(host)
            .and_then(|node| node.attached.iter().position(|&c| c == child))
            .unwrap_or_else(|| fatal(Error::invalid_tree("native missing from its host's child list")))
    }

    /// Insert `id`'s native at `index` under `placement`'s host.
    fn insert_native(&mut self, id: FiberId, placement: Placement, index: usize) {
        let host = placement.host();
        let Some(host_node) = self.tree.get(host) else {
            fatal(Error::invalid_tree("native host vanished"));
        };
        let len = host_node.attached.len();
        if index > len {
            fatal(Error::IndexOutOfRange { index, len });
        }
        let (Some(host_native), Some(native)) = (
            host_node.native.clone(),
            self.tree.get(id).and_then(|node| node.native.clone()),
        ) else {
            fatal(Error::invalid_tree("insert without a native on both ends"));
        };
        host_native.add_child(&native, index);

        if let Some(host_node) = self.tree.get_mut(host) {
            host_node.attached.insert(index, id);
        }
        if let Some(node) = self.tree.get_mut(id) {
            node.native_host = Some(host);
            node.portal_destination = placement.destination();
        }
        if let Some(destination) = placement.destination()
            && let Some(ControlState::Destination { guests, .. }) = self
                .tree
                .get_mut(destination)
                .and_then(|node| node.control.as_mut())
        {
            guests.push(id);
        }
    }

    /// Take `id`'s native out of its host. `destroy` is passed through to
    /// the backend.
    fn detach_native(&mut self, id: FiberId, destroy: bool) {
        let Some(node) = self.tree.get_mut(id) else {
            return;
        };
        let Some(host) = node.native_host.take() else {
            return;
        };
        let destination = node.portal_destination.take();
        let native = node.native.clone();

        if let Some(host_node) = self.tree.get_mut(host) {
            host_node.attached.retain(|&child| child != id);
            if let (Some(host_native), Some(native)) = (host_node.native.clone(), native) {
                host_native.remove_child(&native, destroy);
            }
        }
        if let Some(destination) = destination
            && let Some(ControlState::Destination { guests, .. }) = self
                .tree
                .get_mut(destination)
                .and_then(|node| node.control.as_mut())
        {
            guests.retain(|&guest| guest != id);
        }
    }
}
