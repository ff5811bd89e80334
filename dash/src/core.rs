use serde::Deserialize;
use tracing::warn;

use config::shared::{IngestConfig, SourceConfig, ValidationError};
use ingest::grouping::Group;
use ingest::stats::SearchStats;
use ingest::types::ScopeProgress;

/// Layered application configuration.
///
/// Both sections fall back to their defaults, so the binary runs without
/// any configuration file present.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AppConfig {
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub source: SourceConfig,
}

impl AppConfig {
    /// Validates both sections.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.ingest.validate()?;
        self.source.validate()?;
        Ok(())
    }
}

/// Logs per-scope outcomes, surfacing partial failures.
pub fn render_outcomes(outcomes: &[ScopeProgress]) {
    for outcome in outcomes {
        match &outcome.error {
            Some(error) => warn!(
                scope = %outcome.scope,
                fetched = outcome.fetched,
                error = %error,
                "scope finished with an error, results are partial"
            ),
            None => tracing::info!(
                scope = %outcome.scope,
                fetched = outcome.fetched,
                "scope finished"
            ),
        }
    }
}

/// Prints the grouped view as a plain table.
pub fn render_groups(groups: &[Group], stats: &SearchStats) {
    println!(
        "{} pull requests in {} repositories ({} open, {} merged, {} closed)",
        stats.total, stats.repositories, stats.open, stats.merged, stats.closed
    );
    println!();

    for group in groups {
        println!("{:>5}  {}  [{}]", group.count, group.label, group.base_ref);

        for record in &group.records {
            println!(
                "       #{:<6} {:<7} {}  {}",
                record.number,
                record.state.to_string(),
                record.repository.full_name,
                record.url
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }
}
