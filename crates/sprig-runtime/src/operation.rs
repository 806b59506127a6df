#![forbid(unsafe_code)]

//! Commit operations.
//!
//! The render and update passes never touch the native tree. They queue
//! operations, and the commit pass applies them one at a time, in order.
//! Operations name fibers by id; a fiber freed before its operation commits
//! turns the operation into a no-op.

use std::fmt;

use crate::fiber::FiberId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Insert a rendered fiber's native, run its first effects.
    Mount(FiberId),
    /// Tear down a detached subtree.
    Unmount(FiberId),
    /// Re-place a keyed list item's natives after a reorder. `from` and `to`
    /// are the item's old and new positions in the list.
    Move { fiber: FiberId, from: usize, to: usize },
    /// Re-host a native under a portal destination, or back under its
    /// natural parent when `destination` is `None`.
    SetPortalDestination {
        fiber: FiberId,
        destination: Option<FiberId>,
    },
}

impl Operation {
    /// The fiber the operation applies to.
    #[must_use]
    pub fn fiber(&self) -> FiberId {
        match *self {
            Self::Mount(fiber)
            | Self::Unmount(fiber)
            | Self::Move { fiber, .. }
            | Self::SetPortalDestination { fiber, .. } => fiber,
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Mount(_) => "mount",
            Self::Unmount(_) => "unmount",
            Self::Move { .. } => "move",
            Self::SetPortalDestination { .. } => "set_portal_destination",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Move { fiber, from, to } => write!(f, "move {fiber:?} {from}->{to}"),
            Self::SetPortalDestination { fiber, destination } => {
                write!(f, "set_portal_destination {fiber:?} -> {destination:?}")
            }
            other => write!(f, "{} {:?}", other.name(), other.fiber()),
        }
    }
}
