#![forbid(unsafe_code)]

//! Renderer entry points, the work loop and the render pass.
//!
//! # Design
//!
//! Three FIFO queues feed one loop:
//!
//! - **render**: fibers waiting to expand their virtual node;
//! - **operations**: commit operations against the native tree;
//! - **update**: fibers whose subscriptions were notified.
//!
//! Each iteration pops from the first non-empty queue in that order, so all
//! pending renders finish before any operation commits, and all operations
//! commit before any update runs. Work queued by a step is picked up by a
//! later iteration, never inside the same step.
//!
//! # Invariants
//!
//! 1. A render step never mutates the native tree.
//! 2. Queued work is never pruned. A render entry for a fiber that is gone,
//!    removed, or has no payload is skipped when popped.
//! 3. The budget is checked between steps only; a step always runs to
//!    completion.
//!
//! # Failure Modes
//!
//! | Condition | Behavior |
//! |-----------|----------|
//! | `render` while mounted or unmounting | warn, no-op |
//! | `unmount` with nothing mounted, or twice | warn, no-op |
//! | No extension claims a native element | `Error::NoExtension`, fatal |
//! | Extension returns no native | `Error::MissingNativeNode`, fatal |
//! | Duplicate keys in one list snapshot | `Error::DuplicateKey`, fatal |

use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use ahash::{AHashMap, AHashSet};
use sprig_reactive::{DynamicDependencies, PoolRegistry, ReadSignal, StaticSignals, Subscriptions};
use tracing::{debug, debug_span, trace, warn};
use web_time::Duration;

use crate::config::RendererConfig;
use crate::context::{Globals, RenderCx};
use crate::control::{Branch, ControlState, FlagKind};
use crate::error::{Error, fatal};
use crate::fiber::{FiberId, FiberTree, FiberView, Phase};
use crate::native::{NativeElement, NativeHandle, RendererExtension};
use crate::operation::Operation;
use crate::vnode::{Children, Key, ListSource, VirtualNode};

/// What one work-loop tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkLoopStats {
    pub renders: usize,
    pub commits: usize,
    pub updates: usize,
    /// All three queues were empty when the tick ended.
    pub drained: bool,
    pub elapsed: Duration,
}

impl WorkLoopStats {
    #[must_use]
    pub fn steps(&self) -> usize {
        self.renders + self.commits + self.updates
    }
}

/// Queue lengths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pending {
    pub renders: usize,
    pub operations: usize,
    pub updates: usize,
}

impl Pending {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.renders == 0 && self.operations == 0 && self.updates == 0
    }
}

/// Registers extensions and globals, then builds a [`Renderer`].
#[derive(Default)]
pub struct RendererBuilder {
    config: RendererConfig,
    extensions: Vec<Box<dyn RendererExtension>>,
    globals: Globals,
}

impl fmt::Debug for RendererBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RendererBuilder")
            .field("config", &self.config)
            .field("extensions", &self.extensions.len())
            .field("globals", &self.globals.len())
            .finish()
    }
}

impl RendererBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn config(mut self, config: RendererConfig) -> Self {
        self.config = config;
        self
    }

    /// Add an extension. Extensions are asked in registration order.
    #[must_use]
    pub fn extension(mut self, extension: impl RendererExtension + 'static) -> Self {
        self.extensions.push(Box::new(extension));
        self
    }

    /// Register a global, replacing any earlier value of the same type.
    #[must_use]
    pub fn global<T: 'static>(mut self, value: T) -> Self {
        self.globals.insert(value);
        self
    }

    #[must_use]
    pub fn build(self) -> Renderer {
        Renderer {
            tree: FiberTree::new(),
            renders: VecDeque::new(),
            operations: VecDeque::new(),
            extensions: self.extensions,
            globals: self.globals,
            statics: StaticSignals::new(),
            pools: PoolRegistry::new(),
            destinations: AHashMap::new(),
            config: self.config,
            root: None,
            unmounting: false,
            log: Vec::new(),
        }
    }
}

/// Owner of one fiber tree and its queues.
pub struct Renderer {
    pub(crate) tree: FiberTree,
    pub(crate) renders: VecDeque<FiberId>,
    pub(crate) operations: VecDeque<Operation>,
    pub(crate) extensions: Vec<Box<dyn RendererExtension>>,
    pub(crate) globals: Globals,
    pub(crate) statics: StaticSignals,
    pub(crate) pools: PoolRegistry,
    pub(crate) destinations: AHashMap<Rc<str>, FiberId>,
    pub(crate) config: RendererConfig,
    pub(crate) root: Option<FiberId>,
    pub(crate) unmounting: bool,
    log: Vec<Operation>,
}

impl fmt::Debug for Renderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer")
            .field("root", &self.root)
            .field("fibers", &self.tree.len())
            .field("pending", &self.pending())
            .field("unmounting", &self.unmounting)
            .finish()
    }
}

impl Renderer {
    #[must_use]
    pub fn builder() -> RendererBuilder {
        RendererBuilder::new()
    }

    /// Mount `vnode` under `native_root`. The tree is built by later
    /// work-loop ticks. Returns the root fiber, or `None` (with a warning)
    /// when a tree is already mounted or unmounting.
    pub fn render(&mut self, vnode: VirtualNode, native_root: NativeHandle) -> Option<FiberId> {
        if self.unmounting {
            warn!("sprig.render ignored: renderer is unmounting");
            return None;
        }
        if self.root.is_some() {
            warn!("sprig.render ignored: a tree is already mounted");
            return None;
        }
        let root = self.tree.insert(None, None, None);
        if let Some(node) = self.tree.get_mut(root) {
            node.native = Some(native_root);
            node.phase = Phase::Mounted;
        }
        self.spawn_child(root, vnode, None);
        self.root = Some(root);
        debug!(?root, "sprig.render");
        Some(root)
    }

    /// Tear the mounted tree down. With `immediate`, drains every queue
    /// before returning; otherwise later ticks finish the job.
    pub fn unmount(&mut self, immediate: bool) {
        let Some(root) = self.root else {
            warn!("sprig.unmount ignored: nothing is mounted");
            return;
        };
        if self.unmounting {
            warn!("sprig.unmount ignored: already unmounting");
            return;
        }
        self.unmounting = true;
        debug!(?root, immediate, "sprig.unmount");
        for child in self.tree.children(root) {
            self.tree.detach(child);
            self.push_operation(Operation::Unmount(child));
        }
        if immediate {
            self.work_loop(true);
        }
    }

    /// Run one tick. Without `immediate`, stops once the frame budget (or
    /// the optional step cap) is used up; with it, drains all queues.
    pub fn work_loop(&mut self, immediate: bool) -> WorkLoopStats {
        let span = debug_span!(
            "sprig.work_loop",
            immediate,
            renders = tracing::field::Empty,
            commits = tracing::field::Empty,
            updates = tracing::field::Empty,
        );
        let _guard = span.enter();

        let clock = self.config.clock.clone();
        let budget = self.config.frame_budget;
        let max_steps = self.config.max_steps_per_tick;
        let start = clock.now();
        let mut stats = WorkLoopStats::default();

        loop {
            if let Some(id) = self.renders.pop_front() {
                self.render_fiber(id);
                stats.renders += 1;
            } else if let Some(op) = self.operations.pop_front() {
                self.commit(op);
                stats.commits += 1;
            } else if let Some(id) = self.pop_update() {
                self.update_fiber(id);
                stats.updates += 1;
            } else {
                break;
            }
            if immediate {
                continue;
            }
            if clock.elapsed_since(start) >= budget {
                break;
            }
            if max_steps.is_some_and(|max| stats.steps() >= max) {
                break;
            }
        }

        stats.drained = self.is_idle();
        stats.elapsed = clock.elapsed_since(start);
        if stats.drained && self.unmounting {
            self.finish_unmount();
        }
        span.record("renders", stats.renders as u64);
        span.record("commits", stats.commits as u64);
        span.record("updates", stats.updates as u64);
        stats
    }

    /// Root fiber of the mounted tree.
    #[must_use]
    pub fn root(&self) -> Option<FiberId> {
        self.root
    }

    #[must_use]
    pub fn is_unmounting(&self) -> bool {
        self.unmounting
    }

    /// Whether every queue is empty.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.pending().is_empty()
    }

    #[must_use]
    pub fn pending(&self) -> Pending {
        Pending {
            renders: self.renders.len(),
            operations: self.operations.len(),
            updates: self.tree.updates().borrow().len(),
        }
    }

    /// Read-only view of a live fiber.
    #[must_use]
    pub fn fiber(&self, id: FiberId) -> Option<FiberView<'_>> {
        self.tree.get(id).map(|node| FiberView::new(id, node))
    }

    /// Children of a live fiber, in order.
    #[must_use]
    pub fn children(&self, id: FiberId) -> Vec<FiberId> {
        self.tree.children(id).into_vec()
    }

    /// Number of live fibers, root included.
    #[must_use]
    pub fn fiber_count(&self) -> usize {
        self.tree.len()
    }

    /// Fiber registered under a portal destination id.
    #[must_use]
    pub fn portal_destination(&self, id: &str) -> Option<FiberId> {
        self.destinations.get(id).copied()
    }

    /// Every operation queued since the log was last cleared. Empty unless
    /// [`RendererConfig::record_operations`] is set.
    #[must_use]
    pub fn operation_log(&self) -> &[Operation] {
        &self.log
    }

    pub fn clear_operation_log(&mut self) {
        self.log.clear();
    }

    /// Pools backing control constructs and dynamic effects.
    #[must_use]
    pub fn pools(&self) -> &PoolRegistry {
        &self.pools
    }

    #[must_use]
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub(crate) fn push_operation(&mut self, op: Operation) {
        trace!(op = %op, "sprig.queue");
        if self.config.record_operations {
            self.log.push(op);
        }
        self.operations.push_back(op);
    }

    fn pop_update(&mut self) -> Option<FiberId> {
        self.tree.updates().borrow_mut().pop_front()
    }

    fn finish_unmount(&mut self) {
        if let Some(root) = self.root.take() {
            self.tree.remove(root);
        }
        self.unmounting = false;
        self.statics.clear();
        self.destinations.clear();
        debug!("sprig.unmount complete");
    }

    // ------------------------------------------------------------------
    // Render pass
    // ------------------------------------------------------------------

    /// Allocate a child fiber, link it last under `parent`, queue its render.
    pub(crate) fn spawn_child(
        &mut self,
        parent: FiberId,
        vnode: VirtualNode,
        key: Option<Key>,
    ) -> FiberId {
        let child = self.tree.insert(Some(parent), Some(vnode), key);
        self.tree.append_child(parent, child);
        self.renders.push_back(child);
        child
    }

    pub(crate) fn spawn_children(&mut self, parent: FiberId, children: &[VirtualNode]) {
        for child in children {
            self.spawn_child(parent, child.clone(), None);
        }
    }

    /// A pooled dependency set bound to `id`'s hook.
    pub(crate) fn bound_dependencies<T: 'static>(&mut self, id: FiberId) -> DynamicDependencies<T> {
        let mut deps = self.pools.acquire::<DynamicDependencies<T>>();
        if let Some(node) = self.tree.get(id) {
            deps.bind(node.dependent());
        }
        deps
    }

    fn render_fiber(&mut self, id: FiberId) {
        let Some(node) = self.tree.get(id) else {
            return;
        };
        if node.phase != Phase::AddedToVirtualTree || self.tree.is_removed(id) {
            return;
        }
        let Some(vnode) = node.vnode.clone() else {
            return;
        };
        trace!(?id, kind = vnode.kind(), "sprig.render_fiber");

        match vnode {
            VirtualNode::Component(component) => {
                let mut cx = RenderCx::new(
                    id,
                    &self.tree,
                    &self.globals,
                    &mut self.statics,
                    &mut self.pools,
                );
                let body = component.render(&mut cx);
                let effects = cx.into_effects();
                if let Some(node) = self.tree.get_mut(id) {
                    node.effects.extend(effects);
                }
                self.spawn_child(id, body, None);
            }
            VirtualNode::Provider { value, children } => {
                if let Some(node) = self.tree.get_mut(id) {
                    node.context = Some(value);
                }
                self.spawn_children(id, &children);
            }
            VirtualNode::Fragment(children) => self.spawn_children(id, &children),
            VirtualNode::Match(arm) => self.spawn_children(id, &arm.children),
            VirtualNode::Enable { when, children } => {
                self.render_flag(id, FlagKind::Enable, when, &children);
            }
            VirtualNode::Visible { when, children } => {
                self.render_flag(id, FlagKind::Visible, when, &children);
            }
            VirtualNode::Active { when, children } => {
                self.render_flag(id, FlagKind::Active, when, &children);
            }
            VirtualNode::Mount { when, children } => self.render_mount(id, when, &children),
            VirtualNode::For(source) => self.render_list(id, source),
            VirtualNode::Switch { arms, fallback } => self.render_switch(id, &arms, &fallback),
            VirtualNode::Portal {
                destination,
                children,
            } => {
                let mut deps = self.bound_dependencies::<Option<String>>(id);
                deps.add(destination);
                self.set_control(
                    id,
                    ControlState::Portal {
                        requested: None,
                        target: None,
                        deps,
                    },
                );
                self.spawn_children(id, &children);
            }
            VirtualNode::PortalDestination { id: name, children } => {
                self.register_destination(id, name.clone());
                self.set_control(
                    id,
                    ControlState::Destination {
                        id: name,
                        guests: Vec::new(),
                    },
                );
                self.spawn_children(id, &children);
            }
            VirtualNode::Native(element) => self.render_native(id, &element),
        }

        if let Some(node) = self.tree.get_mut(id) {
            node.phase = Phase::Rendered;
        }
        self.push_operation(Operation::Mount(id));
    }

    fn set_control(&mut self, id: FiberId, control: ControlState) {
        match self.tree.get_mut(id) {
            Some(node) => node.control = Some(control),
            None => control.release(&mut self.pools),
        }
    }

    fn render_flag(&mut self, id: FiberId, kind: FlagKind, when: ReadSignal<bool>, children: &Children) {
        let mut deps = self.bound_dependencies::<bool>(id);
        deps.add(when.clone());
        deps.mark_observed();
        let value = when.get();
        if let Some(node) = self.tree.get_mut(id) {
            if kind.drives_enabled() {
                node.enabled = value;
            }
            if kind.drives_visible() {
                node.visible = value;
            }
        }
        self.set_control(id, ControlState::Flag { kind, deps });
        self.spawn_children(id, children);
    }

    fn render_mount(&mut self, id: FiberId, when: ReadSignal<bool>, children: &Children) {
        let mut deps = self.bound_dependencies::<bool>(id);
        deps.add(when.clone());
        deps.mark_observed();
        let mounted = when.get();
        self.set_control(id, ControlState::Mount { mounted, deps });
        if mounted {
            self.spawn_children(id, children);
        }
    }

    fn render_list(&mut self, id: FiberId, source: Rc<dyn ListSource>) {
        let mut deps = self.pools.acquire::<Subscriptions>();
        if let Some(node) = self.tree.get(id) {
            deps.bind(node.dependent());
        }
        deps.add(source.tracked());
        deps.mark_observed();

        let keys = source.keys();
        ensure_unique_keys(&keys);
        let mut children = AHashMap::with_capacity(keys.len());
        for (index, key) in keys.into_iter().enumerate() {
            let body = source.render_item(index).unwrap_or_else(VirtualNode::empty);
            let child = self.spawn_child(id, body, Some(key.clone()));
            children.insert(key, child);
        }
        self.set_control(
            id,
            ControlState::For {
                source,
                children,
                deps,
            },
        );
    }

    fn render_switch(&mut self, id: FiberId, arms: &[VirtualNode], fallback: &Children) {
        let mut guards = self.bound_dependencies::<bool>(id);
        let selected = select_branch(arms, &mut guards);
        self.set_control(id, ControlState::Switch { selected, guards });
        self.spawn_child(id, branch_body(arms, fallback, selected), None);
    }

    fn register_destination(&mut self, id: FiberId, name: Rc<str>) {
        if let Some(previous) = self.destinations.insert(name.clone(), id)
            && previous != id
            && !self.tree.is_removed(previous)
        {
            warn!(destination = %name, "duplicate portal destination id; the latest one wins");
        }
    }

    fn render_native(&mut self, id: FiberId, element: &NativeElement) {
        let Some(extension) = self
            .extensions
            .iter()
            .find(|ext| ext.owns_component_type(element))
        else {
            fatal(Error::NoExtension {
                type_name: element.type_name,
            });
        };
        let native = self
            .tree
            .get(id)
            .and_then(|node| extension.create_native_node(&FiberView::new(id, node)))
            .unwrap_or_else(|| {
                fatal(Error::MissingNativeNode {
                    type_name: element.type_name,
                })
            });
        if let Some(node) = self.tree.get_mut(id) {
            node.native = Some(native);
        }
        self.spawn_children(id, &element.children);
    }
}

/// Abort on the first repeated key.
pub(crate) fn ensure_unique_keys(keys: &[Key]) {
    let mut seen = AHashSet::with_capacity(keys.len());
    for key in keys {
        if !seen.insert(key) {
            fatal(Error::DuplicateKey {
                key: key.to_string(),
            });
        }
    }
}

/// Evaluate `Switch` guards in order. `guards` ends up tracking exactly the
/// evaluated prefix: every guard up to and including the first true one, or
/// all of them when the fallback wins.
pub(crate) fn select_branch(arms: &[VirtualNode], guards: &mut DynamicDependencies<bool>) -> Branch {
    for (index, arm) in arms.iter().enumerate() {
        let VirtualNode::Match(arm) = arm else {
            fatal(Error::invalid_tree(format!(
                "switch arm {index} is a {} node, expected Match",
                arm.kind()
            )));
        };
        if index >= guards.len() {
            guards.add(arm.when.clone());
        }
        if arm.when.get() {
            guards.truncate(index + 1);
            guards.mark_observed();
            return Branch::Arm(index);
        }
    }
    guards.mark_observed();
    Branch::Fallback
}

/// Body rendered for the selected branch.
pub(crate) fn branch_body(arms: &[VirtualNode], fallback: &Children, branch: Branch) -> VirtualNode {
    match branch {
        Branch::Arm(index) => arms[index].clone(),
        Branch::Fallback => VirtualNode::Fragment(fallback.clone()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
