#![forbid(unsafe_code)]

//! Update pass: control-construct reconciliation and effect re-runs.
//!
//! A fiber lands in the update queue when one of its subscriptions is
//! notified. Updating it reconciles its control construct (if stale), runs
//! its dirty effects in registration order, then calls `update()` on its
//! native while the fiber is effectively enabled.
//!
//! Reconciliation only rewrites fiber links and queues work; the native tree
//! changes later, in the commit pass.

use ahash::{AHashMap, AHashSet};
use sprig_reactive::{DynamicDependencies, ReadSignal, Subscriptions};
use tracing::{trace, warn};

use crate::control::{Branch, ControlState, FlagKind};
use crate::fiber::{FiberId, Phase};
use crate::operation::Operation;
use crate::renderer::{Renderer, branch_body, ensure_unique_keys, select_branch};
use crate::vnode::{Key, ListSource, VirtualNode};

impl Renderer {
    pub(crate) fn update_fiber(&mut self, id: FiberId) {
        let Some(node) = self.tree.get(id) else {
            return;
        };
        if node.phase != Phase::Mounted || self.tree.is_removed(id) {
            return;
        }
        self.reconcile_if_stale(id);
        self.run_effects(id);

        if self.tree.effective_enabled(id)
            && let Some(native) = self.tree.get(id).and_then(|node| node.native.clone())
        {
            native.update();
        }
    }

    /// Reconcile `id`'s control construct when one of its inputs moved.
    pub(crate) fn reconcile_if_stale(&mut self, id: FiberId) {
        let Some(mut control) = self.tree.get_mut(id).and_then(|node| node.control.take()) else {
            return;
        };
        if control.is_stale() {
            self.reconcile(id, &mut control);
        }
        match self.tree.get_mut(id) {
            Some(node) => node.control = Some(control),
            None => control.release(&mut self.pools),
        }
    }

    /// Run dirty effects of `id` in registration order.
    pub(crate) fn run_effects(&mut self, id: FiberId) {
        let Some(mut effects) = self
            .tree
            .get_mut(id)
            .map(|node| std::mem::take(&mut node.effects))
        else {
            return;
        };
        let mut ran = 0_usize;
        for effect in &mut effects {
            if effect.run_if_dirty() {
                ran += 1;
            }
        }
        if ran > 0 {
            trace!(?id, ran, "sprig.effects");
        }
        match self.tree.get_mut(id) {
            Some(node) => node.effects = effects,
            None => {
                for mut effect in effects {
                    effect.dispose();
                    effect.recycle(&mut self.pools);
                }
            }
        }
    }

    fn reconcile(&mut self, id: FiberId, control: &mut ControlState) {
        match control {
            ControlState::Flag { kind, deps } => self.reconcile_flag(id, *kind, deps),
            ControlState::Mount { mounted, deps } => self.reconcile_mount(id, mounted, deps),
            ControlState::For {
                source,
                children,
                deps,
            } => self.reconcile_list(id, source.as_ref(), children, deps),
            ControlState::Switch { selected, guards } => {
                self.reconcile_switch(id, selected, guards);
            }
            ControlState::Portal {
                requested,
                target,
                deps,
            } => self.reconcile_portal(id, requested, target, deps),
            ControlState::Destination { .. } => {}
        }
    }

    fn reconcile_flag(&mut self, id: FiberId, kind: FlagKind, deps: &mut DynamicDependencies<bool>) {
        deps.mark_observed();
        let value = deps.signal(0).is_none_or(ReadSignal::get);
        let was_visible = self.tree.effective_visible(id);
        let was_enabled = self.tree.effective_enabled(id);
        if let Some(node) = self.tree.get_mut(id) {
            if kind.drives_enabled() {
                node.enabled = value;
            }
            if kind.drives_visible() {
                node.visible = value;
            }
        }
        let visible = self.tree.effective_visible(id);
        let enabled = self.tree.effective_enabled(id);
        trace!(?id, ?kind, value, "sprig.flag");

        if visible == was_visible && (enabled == was_enabled || !enabled) {
            return;
        }
        for native_fiber in self.tree.top_level_natives(id) {
            let Some(node) = self.tree.get(native_fiber) else {
                continue;
            };
            let Some(native) = node.native.clone() else {
                continue;
            };
            if node.native_host.is_none() {
                continue;
            }
            if visible != was_visible {
                native.set_visible(self.tree.effective_visible(native_fiber));
            }
            if enabled && !was_enabled {
                self.tree.updates().borrow_mut().push_back(native_fiber);
            }
        }
    }

    fn reconcile_mount(&mut self, id: FiberId, mounted: &mut bool, deps: &mut DynamicDependencies<bool>) {
        deps.mark_observed();
        let value = deps.signal(0).is_some_and(ReadSignal::get);
        if value == *mounted {
            return;
        }
        *mounted = value;
        if value {
            let body: Vec<VirtualNode> = self
                .tree
                .get(id)
                .and_then(|node| node.vnode.as_ref())
                .map(|vnode| vnode.children().to_vec())
                .unwrap_or_default();
            self.spawn_children(id, &body);
        } else {
            self.remove_children(id);
        }
    }

    /// Detach every child of `id` and queue its unmount.
    fn remove_children(&mut self, id: FiberId) {
        for child in self.tree.children(id) {
            self.tree.detach(child);
            self.push_operation(Operation::Unmount(child));
        }
    }

    fn reconcile_list(
        &mut self,
        id: FiberId,
        source: &dyn ListSource,
        children: &mut AHashMap<Key, FiberId>,
        deps: &mut Subscriptions,
    ) {
        deps.mark_observed();
        let keys = source.keys();
        ensure_unique_keys(&keys);
        let wanted: AHashSet<&Key> = keys.iter().collect();

        // Remove items whose key is gone; remember where survivors were.
        let mut old_position = AHashMap::new();
        let mut old_rank = AHashMap::new();
        for (position, child) in self.tree.children(id).into_iter().enumerate() {
            let key = self.tree.get(child).and_then(|node| node.key.clone());
            match key {
                Some(key) if wanted.contains(&key) => {
                    old_rank.insert(child, old_rank.len());
                    old_position.insert(child, position);
                }
                other => {
                    if let Some(key) = other {
                        children.remove(&key);
                    }
                    self.tree.detach(child);
                    self.push_operation(Operation::Unmount(child));
                }
            }
        }

        // Walk the new order: relink survivors, move the ones whose rank
        // among survivors changed, create the rest.
        let mut order = Vec::with_capacity(keys.len());
        let mut rank = 0_usize;
        let mut created = Vec::new();
        for (index, key) in keys.iter().enumerate() {
            match children.get(key).copied() {
                Some(child) => {
                    if old_rank.get(&child) != Some(&rank) {
                        let from = old_position.get(&child).copied().unwrap_or(index);
                        self.push_operation(Operation::Move {
                            fiber: child,
                            from,
                            to: index,
                        });
                    }
                    rank += 1;
                    order.push(child);
                }
                None => {
                    let body = source.render_item(index).unwrap_or_else(VirtualNode::empty);
                    let child = self.tree.insert(Some(id), Some(body), Some(key.clone()));
                    children.insert(key.clone(), child);
                    order.push(child);
                    created.push(child);
                }
            }
        }
        self.tree.relink_children(id, &order);
        self.renders.extend(created);
        trace!(?id, items = keys.len(), "sprig.list");
    }

    fn reconcile_switch(
        &mut self,
        id: FiberId,
        selected: &mut Branch,
        guards: &mut DynamicDependencies<bool>,
    ) {
        let Some(VirtualNode::Switch { arms, fallback }) =
            self.tree.get(id).and_then(|node| node.vnode.clone())
        else {
            return;
        };
        let branch = select_branch(&arms, guards);
        if branch == *selected {
            return;
        }
        trace!(?id, from = ?*selected, to = ?branch, "sprig.switch");
        *selected = branch;
        self.remove_children(id);
        self.spawn_child(id, branch_body(&arms, &fallback, branch), None);
    }

    fn reconcile_portal(
        &mut self,
        id: FiberId,
        requested: &mut Option<String>,
        target: &mut Option<FiberId>,
        deps: &mut DynamicDependencies<Option<String>>,
    ) {
        deps.mark_observed();
        let next = deps.signal(0).and_then(ReadSignal::get);
        let resolved = next.as_deref().and_then(|name| self.resolve_destination(name));
        *requested = next;
        if resolved == *target {
            return;
        }
        *target = resolved;
        for native_fiber in self.tree.top_level_natives(id) {
            let attached = self
                .tree
                .get(native_fiber)
                .is_some_and(|node| node.native_host.is_some());
            if attached {
                self.push_operation(Operation::SetPortalDestination {
                    fiber: native_fiber,
                    destination: resolved,
                });
            }
        }
    }

    fn resolve_destination(&self, name: &str) -> Option<FiberId> {
        let found = self
            .destinations
            .get(name)
            .copied()
            .filter(|&fiber| self.is_live_destination(fiber));
        if found.is_none() {
            warn!(destination = name, "unknown portal destination");
        }
        found
    }

    pub(crate) fn is_live_destination(&self, fiber: FiberId) -> bool {
        self.tree.get(fiber).is_some_and(|node| {
            matches!(node.control, Some(ControlState::Destination { .. }))
        }) && !self.tree.is_removed(fiber)
    }
}
