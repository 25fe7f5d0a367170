use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Loading,
    Idle,
    Busy,
    /// Died while serving a task.
    Crashed,
    /// Never managed to load its model.
    Failed,
    /// Exited cleanly during shutdown.
    Stopped,
}

impl WorkerState {
    /// Whether the slot still has a thread that can serve tasks.
    pub fn is_live(self) -> bool {
        matches!(self, WorkerState::Loading | WorkerState::Idle | WorkerState::Busy)
    }
}

/// Coarse pool condition the orchestrator checks before submitting work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolHealth {
    Healthy,
    /// Serving, but with fewer workers than the configured minimum.
    Degraded,
    /// No live workers, or the pool is shutting down.
    Unavailable,
}

impl PoolHealth {
    pub fn assess(effective_workers: usize, min_healthy_workers: usize, closed: bool) -> Self {
        if closed || effective_workers == 0 {
            PoolHealth::Unavailable
        } else if effective_workers < min_healthy_workers {
            PoolHealth::Degraded
        } else {
            PoolHealth::Healthy
        }
    }
}

impl fmt::Display for PoolHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolHealth::Healthy => write!(f, "healthy"),
            PoolHealth::Degraded => write!(f, "degraded"),
            PoolHealth::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// Point-in-time snapshot of the pool.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolStats {
    pub configured_workers: usize,
    pub effective_workers: usize,
    pub busy_workers: usize,
    /// Highest number of simultaneously busy workers since start.
    pub peak_busy_workers: usize,
    pub queued_tasks: usize,
    pub health: PoolHealth,
    pub worker_states: Vec<WorkerState>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::full(4, 4, false, PoolHealth::Healthy)]
    #[case::lost_one(3, 4, false, PoolHealth::Degraded)]
    #[case::above_lower_minimum(3, 2, false, PoolHealth::Healthy)]
    #[case::none_left(0, 4, false, PoolHealth::Unavailable)]
    #[case::closed(4, 4, true, PoolHealth::Unavailable)]
    fn test_assess(
        #[case] effective: usize,
        #[case] minimum: usize,
        #[case] closed: bool,
        #[case] expected: PoolHealth,
    ) {
        assert_eq!(PoolHealth::assess(effective, minimum, closed), expected);
    }

    #[test]
    fn test_live_states() {
        assert!(WorkerState::Idle.is_live());
        assert!(WorkerState::Busy.is_live());
        assert!(!WorkerState::Crashed.is_live());
        assert!(!WorkerState::Failed.is_live());
        assert!(!WorkerState::Stopped.is_live());
    }
}
