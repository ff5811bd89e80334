use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Bounded exponential backoff settings for retried operations.
///
/// The delay before retry attempt `n` (1-based) is
/// `base_delay_ms * backoff_factor ^ n`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the initial call.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay, in milliseconds, fed into the backoff formula.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Multiplier applied per attempt.
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: u32,
}

impl RetryConfig {
    /// Default maximum retry attempts.
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

    /// Default base delay in milliseconds.
    pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;

    /// Default backoff factor.
    pub const DEFAULT_BACKOFF_FACTOR: u32 = 2;

    /// Returns the backoff delay preceding retry attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = u64::from(self.backoff_factor).saturating_pow(attempt);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }

    /// Validates retry settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.backoff_factor == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "retry.backoff_factor",
                constraint: "must be greater than 0",
            });
        }

        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            backoff_factor: default_backoff_factor(),
        }
    }
}

fn default_max_attempts() -> u32 {
    RetryConfig::DEFAULT_MAX_ATTEMPTS
}

fn default_base_delay_ms() -> u64 {
    RetryConfig::DEFAULT_BASE_DELAY_MS
}

fn default_backoff_factor() -> u32 {
    RetryConfig::DEFAULT_BACKOFF_FACTOR
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_exponentially() {
        let config = RetryConfig {
            max_attempts: 5,
            base_delay_ms: 100,
            backoff_factor: 2,
        };

        assert_eq!(config.delay_for(1), Duration::from_millis(200));
        assert_eq!(config.delay_for(2), Duration::from_millis(400));
        assert_eq!(config.delay_for(3), Duration::from_millis(800));
    }
}
