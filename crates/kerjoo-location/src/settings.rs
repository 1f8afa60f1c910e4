use std::time::Duration;

use kerjoo_core::RetryPolicy;
use serde::{Deserialize, Serialize};

/// Options for a single request to a [`crate::PositionSource`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PositionOptions {
    pub high_accuracy: bool,
    /// Upper bound on waiting for the source to answer.
    pub timeout: Duration,
    /// Oldest cached fix that may be returned instead of asking the source.
    pub maximum_age: Duration,
}

/// The `[location]` section of the site config.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LocationSettings {
    pub high_accuracy_timeout_ms: u64,
    pub high_accuracy_max_age_ms: u64,
    pub low_accuracy_timeout_ms: u64,
    pub low_accuracy_max_age_ms: u64,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for LocationSettings {
    fn default() -> Self {
        Self {
            high_accuracy_timeout_ms: 15_000,
            high_accuracy_max_age_ms: 30_000,
            low_accuracy_timeout_ms: 10_000,
            low_accuracy_max_age_ms: 60_000,
            max_attempts: 3,
            retry_delay_ms: 500,
        }
    }
}

impl LocationSettings {
    pub fn high(&self) -> PositionOptions {
        PositionOptions {
            high_accuracy: true,
            timeout: Duration::from_millis(self.high_accuracy_timeout_ms),
            maximum_age: Duration::from_millis(self.high_accuracy_max_age_ms),
        }
    }

    pub fn low(&self) -> PositionOptions {
        PositionOptions {
            high_accuracy: false,
            timeout: Duration::from_millis(self.low_accuracy_timeout_ms),
            maximum_age: Duration::from_millis(self.low_accuracy_max_age_ms),
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy { max_attempts: self.max_attempts.max(1), delay_ms: self.retry_delay_ms }
    }
}
