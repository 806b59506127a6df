#![forbid(unsafe_code)]

//! Time source for the work-loop budget.
//!
//! Production renderers read `web_time::Instant::now()`. Tests hand the
//! renderer a [`LabClock`] and advance it explicitly, which makes budget
//! exhaustion deterministic.

use std::cell::Cell;
use std::rc::Rc;

use web_time::{Duration, Instant};

/// Where the renderer reads time from.
#[derive(Debug, Clone, Default)]
pub enum Clock {
    /// Real wall-clock time.
    #[default]
    Real,
    /// Deterministic lab clock for testing.
    Lab(LabClock),
}

impl Clock {
    /// Current time.
    #[must_use]
    pub fn now(&self) -> Instant {
        match self {
            Self::Real => Instant::now(),
            Self::Lab(clock) => clock.now(),
        }
    }

    /// Time since `start`, saturating at zero.
    #[must_use]
    pub fn elapsed_since(&self, start: Instant) -> Duration {
        self.now().saturating_duration_since(start)
    }
}

/// A manually advanced clock.
///
/// Clones share the same offset, so a test can keep one handle and give
/// another to the renderer.
#[derive(Debug, Clone)]
pub struct LabClock {
    epoch: Instant,
    offset_us: Rc<Cell<u64>>,
}

impl LabClock {
    /// Create a lab clock starting at `Instant::now()`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            offset_us: Rc::new(Cell::new(0)),
        }
    }

    /// Advance the clock by `delta`.
    pub fn advance(&self, delta: Duration) {
        let us = delta.as_micros().min(u128::from(u64::MAX)) as u64;
        self.offset_us.set(self.offset_us.get().saturating_add(us));
    }

    /// Current lab time.
    #[must_use]
    pub fn now(&self) -> Instant {
        self.epoch + Duration::from_micros(self.offset_us.get())
    }

    /// Total time advanced so far.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        Duration::from_micros(self.offset_us.get())
    }
}

impl Default for LabClock {
    fn default() -> Self {
        Self::new()
    }
}
