#![forbid(unsafe_code)]

//! A renderer wired to a recording root on a deterministic clock.

use sprig_runtime::{
    FiberId, LabClock, NativeHandle, Operation, Renderer, RendererBuilder, RendererConfig,
    VirtualNode, WorkLoopStats,
};

use crate::recording::{NativeCall, NativeTree, NodeId, RecordingExtension};

/// Renderer plus the recording tree it mounts into.
///
/// The renderer runs on a [`LabClock`] with the operation log enabled, so
/// timing only moves when a test advances it.
pub struct Harness {
    pub renderer: Renderer,
    natives: NativeTree,
    root: NativeHandle,
    root_node: NodeId,
    clock: LabClock,
}

impl std::fmt::Debug for Harness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Harness")
            .field("root", &self.renderer.root())
            .field("natives", &self.natives)
            .finish()
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    #[must_use]
    pub fn new() -> Self {
        Self::with(|builder| builder)
    }

    /// Build with extra builder steps (globals, extensions, step caps).
    pub fn with(customize: impl FnOnce(RendererBuilder) -> RendererBuilder) -> Self {
        Self::with_config(RendererConfig::default(), customize)
    }

    /// Build from `config`. The clock is always replaced by the harness's
    /// lab clock and the operation log is always on.
    pub fn with_config(
        config: RendererConfig,
        customize: impl FnOnce(RendererBuilder) -> RendererBuilder,
    ) -> Self {
        let clock = LabClock::new();
        let natives = NativeTree::new();
        let root_native = natives.create("root");
        let root_node = root_native.id();
        let root: NativeHandle = root_native;
        let builder = Renderer::builder()
            .config(config.with_lab_clock(&clock).with_operation_log(true))
            .extension(RecordingExtension::new(natives.clone()));
        Self {
            renderer: customize(builder).build(),
            natives,
            root,
            root_node,
            clock,
        }
    }

    /// Render `vnode` into the root and drain every queue.
    pub fn mount(&mut self, vnode: VirtualNode) -> Option<FiberId> {
        let fiber = self.renderer.render(vnode, self.root.clone());
        self.flush();
        fiber
    }

    /// Render without draining.
    pub fn render(&mut self, vnode: VirtualNode) -> Option<FiberId> {
        self.renderer.render(vnode, self.root.clone())
    }

    /// Drain every queue.
    pub fn flush(&mut self) -> WorkLoopStats {
        self.renderer.work_loop(true)
    }

    /// One budgeted tick.
    pub fn tick(&mut self) -> WorkLoopStats {
        self.renderer.work_loop(false)
    }

    pub fn unmount(&mut self) {
        self.renderer.unmount(true);
    }

    #[must_use]
    pub fn natives(&self) -> &NativeTree {
        &self.natives
    }

    #[must_use]
    pub fn root_node(&self) -> NodeId {
        self.root_node
    }

    #[must_use]
    pub fn clock(&self) -> &LabClock {
        &self.clock
    }

    /// Labels of the root's children.
    #[must_use]
    pub fn root_labels(&self) -> Vec<String> {
        self.natives.labels(self.root_node)
    }

    /// Labels of the children of the first live node labelled `label`.
    #[must_use]
    pub fn labels_of(&self, label: &str) -> Vec<String> {
        self.natives
            .find(label)
            .map(|node| self.natives.labels(node))
            .unwrap_or_default()
    }

    /// Compact rendering of the whole native tree.
    #[must_use]
    pub fn snapshot(&self) -> String {
        self.natives.snapshot(self.root_node)
    }

    /// Drain the operation log.
    pub fn take_operations(&mut self) -> Vec<Operation> {
        let operations = self.renderer.operation_log().to_vec();
        self.renderer.clear_operation_log();
        operations
    }

    /// Drain the backend journal.
    pub fn take_journal(&self) -> Vec<NativeCall> {
        self.natives.take_journal()
    }

    /// Structural backend calls only.
    pub fn take_structural(&self) -> Vec<NativeCall> {
        self.natives
            .take_journal()
            .into_iter()
            .filter(NativeCall::is_structural)
            .collect()
    }
}
