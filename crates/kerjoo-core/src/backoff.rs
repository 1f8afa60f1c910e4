use serde::{Deserialize, Serialize};

use crate::LocationErrorReason;

/// Retry policy for one-shot position acquisition.
///
/// Defaults:
/// Attempt 1: immediate
/// Attempt 2..=3: 500ms after the previous failure
/// Permission denied: never retried
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, delay_ms: 500 }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfterMs(u64),
    GiveUp,
}

/// Decide what to do after `attempt_number` (1-based) failed with `reason`.
pub fn decide_retry(policy: &RetryPolicy, reason: LocationErrorReason, attempt_number: u32) -> RetryDecision {
    match reason {
        LocationErrorReason::PermissionDenied => RetryDecision::GiveUp,
        LocationErrorReason::PositionUnavailable | LocationErrorReason::Timeout => {
            if attempt_number >= policy.max_attempts {
                RetryDecision::GiveUp
            } else {
                RetryDecision::RetryAfterMs(policy.delay_ms)
            }
        }
    }
}

/// Whether a failed high-accuracy request may fall back to low accuracy.
pub fn falls_back_to_low_accuracy(reason: LocationErrorReason) -> bool {
    matches!(reason, LocationErrorReason::Timeout | LocationErrorReason::PositionUnavailable)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_retries_twice() {
        let p = RetryPolicy::default();
        assert_eq!(decide_retry(&p, LocationErrorReason::Timeout, 1), RetryDecision::RetryAfterMs(500));
        assert_eq!(decide_retry(&p, LocationErrorReason::PositionUnavailable, 2), RetryDecision::RetryAfterMs(500));
        assert_eq!(decide_retry(&p, LocationErrorReason::Timeout, 3), RetryDecision::GiveUp);
    }

    #[test]
    fn permission_denied_is_terminal() {
        let p = RetryPolicy::default();
        assert_eq!(decide_retry(&p, LocationErrorReason::PermissionDenied, 1), RetryDecision::GiveUp);
        assert!(!falls_back_to_low_accuracy(LocationErrorReason::PermissionDenied));
        assert!(falls_back_to_low_accuracy(LocationErrorReason::Timeout));
    }
}
