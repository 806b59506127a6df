#![forbid(unsafe_code)]

//! Per-fiber state of the built-in control constructs.
//!
//! Each construct subscribes its fiber's hook to the signals it reads, so a
//! write enqueues the fiber and the update pass reconciles it. Dependency
//! sets come from the renderer's pools and go back there at unmount.

use std::rc::Rc;

use ahash::AHashMap;
use sprig_reactive::{DynamicDependencies, PoolRegistry, Subscriptions};

use crate::fiber::FiberId;
use crate::vnode::{Key, ListSource};

/// Which flags an `Enable` / `Visible` / `Active` fiber drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FlagKind {
    Enable,
    Visible,
    Active,
}

impl FlagKind {
    pub(crate) fn drives_enabled(self) -> bool {
        matches!(self, Self::Enable | Self::Active)
    }

    pub(crate) fn drives_visible(self) -> bool {
        matches!(self, Self::Visible | Self::Active)
    }
}

/// Selected `Switch` branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Branch {
    Arm(usize),
    Fallback,
}

pub(crate) enum ControlState {
    Flag {
        kind: FlagKind,
        deps: DynamicDependencies<bool>,
    },
    Mount {
        mounted: bool,
        deps: DynamicDependencies<bool>,
    },
    For {
        source: Rc<dyn ListSource>,
        children: AHashMap<Key, FiberId>,
        deps: Subscriptions,
    },
    Switch {
        selected: Branch,
        /// Guards of the evaluated prefix of arms.
        guards: DynamicDependencies<bool>,
    },
    Portal {
        requested: Option<String>,
        target: Option<FiberId>,
        deps: DynamicDependencies<Option<String>>,
    },
    Destination {
        id: Rc<str>,
        guests: Vec<FiberId>,
    },
}

impl ControlState {
    pub(crate) fn is_stale(&self) -> bool {
        match self {
            Self::Flag { deps, .. } | Self::Mount { deps, .. } => deps.is_stale(),
            Self::For { deps, .. } => deps.is_stale(),
            Self::Switch { guards, .. } => guards.is_stale(),
            Self::Portal { deps, .. } => deps.is_stale(),
            Self::Destination { .. } => false,
        }
    }

    /// Portal target, if this is a portal that resolved one.
    pub(crate) fn portal_target(&self) -> Option<FiberId> {
        match self {
            Self::Portal { target, .. } => *target,
            _ => None,
        }
    }

    /// Return pooled dependency sets. Their subscriptions are dropped.
    pub(crate) fn release(self, pools: &mut PoolRegistry) {
        match self {
            Self::Flag { deps, .. } | Self::Mount { deps, .. } => pools.release(deps),
            Self::For { deps, .. } => pools.release(deps),
            Self::Switch { guards, .. } => pools.release(guards),
            Self::Portal { deps, .. } => pools.release(deps),
            Self::Destination { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprig_reactive::Signal;

    #[test]
    fn flag_kinds() {
        assert!(FlagKind::Active.drives_enabled() && FlagKind::Active.drives_visible());
        assert!(!FlagKind::Enable.drives_visible());
        assert!(!FlagKind::Visible.drives_enabled());
    }

    #[test]
    fn release_returns_dependencies_to_pool() {
        let mut pools = PoolRegistry::new();
        let guard = Signal::new(true);
        let mut deps = pools.acquire::<DynamicDependencies<bool>>();
        deps.add(&guard);
        let state = ControlState::Mount { mounted: true, deps };
        assert!(state.is_stale());
        state.release(&mut pools);
        assert_eq!(
            pools.stats::<DynamicDependencies<bool>>().map(|s| s.idle),
            Some(1)
        );
    }
}
