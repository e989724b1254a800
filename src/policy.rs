//! Error & fallback policy
//!
//! Maps a classified backend failure to what the engine does next:
//! retry the same target with exponential backoff, substitute the
//! fallback agent, or abort. Each failure gets an independent table
//! lookup - a fallback agent's own failure is disposed on its own
//! merits, bounded by the fallback hop cap.

use std::time::Duration;

use crate::descriptor::{Action, ErrorPolicy};
use crate::limits::RunLimits;

/// What the engine does about one failed invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Re-invoke the same agent/backend after the delay
    RetryAfter(Duration),
    /// Substitute the fallback agent for this step
    FallBack,
    /// Unrecoverable for this step
    Abort,
}

/// Exponential backoff: `base * 2^(attempt - 1)`, attempt is 1-based
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(1u32 << (attempt.saturating_sub(1)).min(16))
}

/// Decide the disposition for a failure classification.
///
/// * `attempts` - invocations already made against the current target
/// * `fallback_open` - a fallback agent exists and the hop cap allows
///   another substitution for this step
///
/// Retry converts to Fallback (when open) or Abort once the attempt cap
/// for the current target is exhausted; an exact-match miss in the
/// error table aborts.
pub fn dispose(
    policy: &ErrorPolicy,
    limits: &RunLimits,
    code: &str,
    attempts: u32,
    fallback_open: bool,
) -> Disposition {
    let max_attempts = policy.max_attempts.unwrap_or(limits.max_attempts).max(1);

    match policy.action_for(code) {
        Action::Retry if attempts < max_attempts => {
            Disposition::RetryAfter(backoff_delay(limits.retry_backoff, attempts))
        }
        Action::Retry | Action::Fallback if fallback_open => Disposition::FallBack,
        _ => Disposition::Abort,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ErrorRule;

    fn policy(rules: &[(&str, Action)], max_attempts: Option<u32>) -> ErrorPolicy {
        ErrorPolicy {
            on_error: rules
                .iter()
                .map(|(code, action)| ErrorRule {
                    code: code.to_string(),
                    action: *action,
                })
                .collect(),
            fallback_agent_id: None,
            max_attempts,
        }
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(100));
        assert_eq!(backoff_delay(base, 2), Duration::from_millis(200));
        assert_eq!(backoff_delay(base, 3), Duration::from_millis(400));
    }

    #[test]
    fn retry_until_attempts_exhausted() {
        let policy = policy(&[("LLM_TIMEOUT", Action::Retry)], Some(3));
        let limits = RunLimits::testing();

        assert!(matches!(
            dispose(&policy, &limits, "LLM_TIMEOUT", 1, false),
            Disposition::RetryAfter(_)
        ));
        assert!(matches!(
            dispose(&policy, &limits, "LLM_TIMEOUT", 2, false),
            Disposition::RetryAfter(_)
        ));
        assert_eq!(
            dispose(&policy, &limits, "LLM_TIMEOUT", 3, false),
            Disposition::Abort
        );
    }

    #[test]
    fn retry_exhaustion_falls_back_when_open() {
        let policy = policy(&[("LLM_TIMEOUT", Action::Retry)], Some(2));
        let limits = RunLimits::testing();

        assert_eq!(
            dispose(&policy, &limits, "LLM_TIMEOUT", 2, true),
            Disposition::FallBack
        );
    }

    #[test]
    fn fallback_action_needs_an_open_hop() {
        let policy = policy(&[("LLM_ERROR", Action::Fallback)], None);
        let limits = RunLimits::testing();

        assert_eq!(
            dispose(&policy, &limits, "LLM_ERROR", 1, true),
            Disposition::FallBack
        );
        assert_eq!(
            dispose(&policy, &limits, "LLM_ERROR", 1, false),
            Disposition::Abort
        );
    }

    #[test]
    fn unmatched_code_aborts() {
        let policy = policy(&[("LLM_TIMEOUT", Action::Retry)], None);
        let limits = RunLimits::testing();

        assert_eq!(
            dispose(&policy, &limits, "LLM_RATE_LIMITED", 1, true),
            Disposition::Abort
        );
    }

    #[test]
    fn descriptor_attempt_cap_overrides_limits() {
        let policy = policy(&[("LLM_TIMEOUT", Action::Retry)], Some(5));
        let limits = RunLimits::testing(); // max_attempts = 2

        assert!(matches!(
            dispose(&policy, &limits, "LLM_TIMEOUT", 4, false),
            Disposition::RetryAfter(_)
        ));
        assert_eq!(
            dispose(&policy, &limits, "LLM_TIMEOUT", 5, false),
            Disposition::Abort
        );
    }
}
