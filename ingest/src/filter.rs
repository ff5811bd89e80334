//! Additive record filtering for presentation.
//!
//! A record must match every provided non-empty criterion to be included.
//! String comparisons are case-insensitive substring matches.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{PullRequest, PullRequestState};

/// Lifecycle-state filter, with `All` disabling the criterion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StateFilter {
    #[default]
    All,
    Open,
    Merged,
    Closed,
}

impl StateFilter {
    fn matches(&self, state: PullRequestState) -> bool {
        match self {
            StateFilter::All => true,
            StateFilter::Open => state == PullRequestState::Open,
            StateFilter::Merged => state == PullRequestState::Merged,
            StateFilter::Closed => state == PullRequestState::Closed,
        }
    }
}

impl fmt::Display for StateFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateFilter::All => f.write_str("ALL"),
            StateFilter::Open => f.write_str("OPEN"),
            StateFilter::Merged => f.write_str("MERGED"),
            StateFilter::Closed => f.write_str("CLOSED"),
        }
    }
}

/// Active filter criteria.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilter {
    /// Substring match on the repository full name.
    pub repository: Option<String>,
    /// Lifecycle state.
    pub state: StateFilter,
    /// Substring match on the author login.
    pub author: Option<String>,
    /// Substring match on the repository owner login.
    pub owner: Option<String>,
}

impl RecordFilter {
    /// Returns true when `record` satisfies every active criterion.
    pub fn matches(&self, record: &PullRequest) -> bool {
        if !self.state.matches(record.state) {
            return false;
        }

        if let Some(repository) = &self.repository {
            if !contains_ignore_case(&record.repository.full_name, repository) {
                return false;
            }
        }

        if let Some(author) = &self.author {
            let matched = record
                .author_login()
                .is_some_and(|login| contains_ignore_case(login, author));
            if !matched {
                return false;
            }
        }

        if let Some(owner) = &self.owner {
            if !contains_ignore_case(&record.repository.owner_login, owner) {
                return false;
            }
        }

        true
    }
}

/// Filters records, preserving input order.
pub fn filter_records(records: &[PullRequest], filter: &RecordFilter) -> Vec<PullRequest> {
    records
        .iter()
        .filter(|record| filter.matches(record))
        .cloned()
        .collect()
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::records::{sample_pr, utc};

    fn records() -> Vec<PullRequest> {
        let mut open = sample_pr("PR_1", "Update dependency serde to v1", "app/renovate", "Acme/api", utc(2024, 3, 1));
        open.state = PullRequestState::Open;
        let mut merged = sample_pr("PR_2", "Update dependency tokio to v1", "app/dependabot", "acme/web", utc(2024, 3, 2));
        merged.state = PullRequestState::Merged;
        vec![open, merged]
    }

    #[test]
    fn state_filter_restricts_results() {
        let filter = RecordFilter {
            state: StateFilter::Merged,
            ..Default::default()
        };

        let filtered = filter_records(&records(), &filter);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, "PR_2");
    }

    #[test]
    fn repository_match_is_case_insensitive_substring() {
        let filter = RecordFilter {
            repository: Some("acme/API".to_owned()),
            ..Default::default()
        };

        let filtered = filter_records(&records(), &filter);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, "PR_1");
    }

    #[test]
    fn filters_combine_with_and_logic() {
        let filter = RecordFilter {
            author: Some("renovate".to_owned()),
            state: StateFilter::Merged,
            ..Default::default()
        };

        assert!(filter_records(&records(), &filter).is_empty());
    }

    #[test]
    fn missing_author_never_matches_author_filter() {
        let mut record = records().remove(0);
        record.author = None;

        let filter = RecordFilter {
            author: Some("renovate".to_owned()),
            ..Default::default()
        };

        assert!(!filter.matches(&record));
    }
}
