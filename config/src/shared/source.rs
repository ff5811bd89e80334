use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Connection settings for the hosted search endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SourceConfig {
    /// GraphQL endpoint URL.
    #[serde(default = "default_graphql_url")]
    pub graphql_url: String,
    /// User agent sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Records requested per page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Environment variable holding the bearer credential, if any.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    /// Transport-level retry behavior for transient failures and quota hits.
    #[serde(default)]
    pub transport_retry: TransportRetryConfig,
}

impl SourceConfig {
    /// Default search page size.
    pub const DEFAULT_PAGE_SIZE: u32 = 100;

    /// Validates source settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.page_size == 0 || self.page_size > 100 {
            return Err(ValidationError::InvalidFieldValue {
                field: "source.page_size",
                constraint: "must be between 1 and 100",
            });
        }

        Ok(())
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            graphql_url: default_graphql_url(),
            user_agent: default_user_agent(),
            page_size: default_page_size(),
            token_env: default_token_env(),
            transport_retry: TransportRetryConfig::default(),
        }
    }
}

/// Retry behavior applied inside the transport, before a page-fetch outcome
/// is ever reported to the ingestion core.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TransportRetryConfig {
    /// Maximum retry attempts for a single request.
    #[serde(default = "default_transport_max_attempts")]
    pub max_attempts: u32,
    /// Initial backoff delay in milliseconds.
    #[serde(default = "default_transport_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Upper bound on the backoff delay in milliseconds.
    #[serde(default = "default_transport_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Jitter applied to each delay, as a percentage of the delay.
    #[serde(default = "default_transport_jitter_percent")]
    pub jitter_percent: u8,
}

impl Default for TransportRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_transport_max_attempts(),
            base_delay_ms: default_transport_base_delay_ms(),
            max_delay_ms: default_transport_max_delay_ms(),
            jitter_percent: default_transport_jitter_percent(),
        }
    }
}

fn default_graphql_url() -> String {
    "https://api.github.com/graphql".to_owned()
}

fn default_user_agent() -> String {
    concat!("dependency-dash/", env!("CARGO_PKG_VERSION")).to_owned()
}

fn default_page_size() -> u32 {
    SourceConfig::DEFAULT_PAGE_SIZE
}

fn default_token_env() -> String {
    "GITHUB_TOKEN".to_owned()
}

fn default_transport_max_attempts() -> u32 {
    3
}

fn default_transport_base_delay_ms() -> u64 {
    1000
}

fn default_transport_max_delay_ms() -> u64 {
    30_000
}

fn default_transport_jitter_percent() -> u8 {
    25
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_public_endpoint() {
        let config = SourceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.graphql_url, "https://api.github.com/graphql");
        assert_eq!(config.page_size, 100);
    }

    #[test]
    fn rejects_oversized_page() {
        let config = SourceConfig {
            page_size: 250,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
