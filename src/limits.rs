//! Run limits and safety controls for workflow execution

use std::time::Duration;

/// Bounds applied to one workflow run
#[derive(Debug, Clone)]
pub struct RunLimits {
    /// Per backend call timeout
    pub call_timeout: Duration,

    /// Overall deadline for the entire run
    pub workflow_deadline: Duration,

    /// Invocation cap per step target when the policy says Retry and
    /// the descriptor does not set its own `maxAttempts`
    pub max_attempts: u32,

    /// How many times a step may substitute a fallback agent
    pub max_fallback_hops: u32,

    /// Maximum steps dispatched concurrently
    pub max_concurrent: usize,

    /// Base delay for exponential retry backoff
    pub retry_backoff: Duration,
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(60),
            workflow_deadline: Duration::from_secs(3600), // 1 hour
            max_attempts: 3,
            max_fallback_hops: 1,
            max_concurrent: 8,
            retry_backoff: Duration::from_secs(1),
        }
    }
}

impl RunLimits {
    /// Limits suitable for tests (tight timeouts, no real backoff)
    pub fn testing() -> Self {
        Self {
            call_timeout: Duration::from_secs(5),
            workflow_deadline: Duration::from_secs(60),
            max_attempts: 2,
            max_fallback_hops: 1,
            max_concurrent: 2,
            retry_backoff: Duration::from_millis(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_bounded() {
        let limits = RunLimits::default();
        assert!(limits.call_timeout < limits.workflow_deadline);
        assert!(limits.max_attempts >= 1);
        assert_eq!(limits.max_fallback_hops, 1);
    }

    #[test]
    fn testing_limits_are_tighter() {
        let testing = RunLimits::testing();
        let default = RunLimits::default();
        assert!(testing.call_timeout < default.call_timeout);
        assert!(testing.retry_backoff < default.retry_backoff);
    }
}
