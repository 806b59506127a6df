#![forbid(unsafe_code)]

//! Renderer configuration.

use web_time::Duration;

use crate::clock::{Clock, LabClock};

/// Default time budget for one non-immediate work-loop tick.
pub const DEFAULT_FRAME_BUDGET: Duration = Duration::from_millis(8);

/// Configuration for a [`Renderer`](crate::Renderer).
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Wall-clock budget for one tick. The loop checks it between steps, so
    /// a single step may overrun it.
    /// Default: 8ms.
    pub frame_budget: Duration,

    /// Hard cap on steps per non-immediate tick, on top of the time budget.
    /// Default: None.
    pub max_steps_per_tick: Option<usize>,

    /// Time source for the budget.
    /// Default: [`Clock::Real`].
    pub clock: Clock,

    /// Keep a log of every queued operation, readable through
    /// [`Renderer::operation_log`](crate::Renderer::operation_log).
    /// Default: false.
    pub record_operations: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            frame_budget: DEFAULT_FRAME_BUDGET,
            max_steps_per_tick: None,
            clock: Clock::Real,
            record_operations: false,
        }
    }
}

impl RendererConfig {
    #[must_use]
    pub fn with_frame_budget(mut self, budget: Duration) -> Self {
        self.frame_budget = budget;
        self
    }

    #[must_use]
    pub fn with_max_steps_per_tick(mut self, steps: usize) -> Self {
        self.max_steps_per_tick = Some(steps);
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Shorthand for `with_clock(Clock::Lab(clock.clone()))`.
    #[must_use]
    pub fn with_lab_clock(self, clock: &LabClock) -> Self {
        self.with_clock(Clock::Lab(clock.clone()))
    }

    #[must_use]
    pub fn with_operation_log(mut self, enabled: bool) -> Self {
        self.record_operations = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RendererConfig::default();
        assert_eq!(config.frame_budget, Duration::from_millis(8));
        assert!(config.max_steps_per_tick.is_none());
        assert!(matches!(config.clock, Clock::Real));
        assert!(!config.record_operations);
    }

    #[test]
    fn builders_compose() {
        let lab = LabClock::new();
        let config = RendererConfig::default()
            .with_frame_budget(Duration::from_millis(2))
            .with_max_steps_per_tick(10)
            .with_lab_clock(&lab)
            .with_operation_log(true);
        assert_eq!(config.frame_budget, Duration::from_millis(2));
        assert_eq!(config.max_steps_per_tick, Some(10));
        assert!(matches!(config.clock, Clock::Lab(_)));
        assert!(config.record_operations);
    }
}
