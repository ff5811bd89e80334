use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Ingestion tuning for the multi-scope search pipeline.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct IngestConfig {
    /// Width, in milliseconds, of the first probe window of a fresh scope.
    #[serde(default = "default_initial_interval_ms")]
    pub initial_interval_ms: i64,
    /// How far a single run reaches into the past, in days, from its end date.
    #[serde(default = "default_lookback_step_days")]
    pub lookback_step_days: i64,
    /// Absolute lower bound for backward window traversal.
    ///
    /// Windows never extend past this instant, no matter how many load-more
    /// rounds are requested. Defaults to 2015-01-01T00:00:00Z, before the
    /// first automated dependency-update bots appeared on public hosting.
    #[serde(default = "default_history_floor")]
    pub history_floor: DateTime<Utc>,
    /// Capacity of the batch/progress event channel between fetchers and the
    /// record store feeder.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl IngestConfig {
    /// Default first-window width: one day.
    pub const DEFAULT_INITIAL_INTERVAL_MS: i64 = 24 * 60 * 60 * 1000;

    /// Default per-run lookback: 90 days.
    pub const DEFAULT_LOOKBACK_STEP_DAYS: i64 = 90;

    /// Default event channel capacity.
    pub const DEFAULT_EVENT_BUFFER: usize = 64;

    /// Validates ingestion settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.initial_interval_ms <= 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "ingest.initial_interval_ms",
                constraint: "must be greater than 0",
            });
        }

        if self.lookback_step_days <= 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "ingest.lookback_step_days",
                constraint: "must be greater than 0",
            });
        }

        if self.event_buffer == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "ingest.event_buffer",
                constraint: "must be greater than 0",
            });
        }

        Ok(())
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: default_initial_interval_ms(),
            lookback_step_days: default_lookback_step_days(),
            history_floor: default_history_floor(),
            event_buffer: default_event_buffer(),
        }
    }
}

fn default_initial_interval_ms() -> i64 {
    IngestConfig::DEFAULT_INITIAL_INTERVAL_MS
}

fn default_lookback_step_days() -> i64 {
    IngestConfig::DEFAULT_LOOKBACK_STEP_DAYS
}

fn default_history_floor() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2015, 1, 1, 0, 0, 0).unwrap()
}

fn default_event_buffer() -> usize {
    IngestConfig::DEFAULT_EVENT_BUFFER
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = IngestConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.initial_interval_ms, 24 * 60 * 60 * 1000);
    }

    #[test]
    fn rejects_zero_interval() {
        let config = IngestConfig {
            initial_interval_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: IngestConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.lookback_step_days, 90);
        assert_eq!(config.history_floor.timestamp(), 1420070400);
    }
}
