use serde::{Deserialize, Serialize};

use crate::shared::RetryConfig;

/// Settings for the sequential write-action executor.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MutationConfig {
    /// Retry behavior for individual write actions.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Pause, in milliseconds, inserted between consecutive actions to space
    /// out writes against the upstream quota.
    #[serde(default = "default_inter_item_delay_ms")]
    pub inter_item_delay_ms: u64,
}

impl MutationConfig {
    /// Default pause between consecutive actions.
    pub const DEFAULT_INTER_ITEM_DELAY_MS: u64 = 500;
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            inter_item_delay_ms: default_inter_item_delay_ms(),
        }
    }
}

fn default_inter_item_delay_ms() -> u64 {
    MutationConfig::DEFAULT_INTER_ITEM_DELAY_MS
}
