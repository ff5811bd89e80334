//! Aggregate statistics over a record set.

use std::collections::HashSet;

use serde::Serialize;

use crate::types::{PullRequest, PullRequestState};

/// Counts by lifecycle state plus the number of distinct repositories.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchStats {
    pub total: usize,
    pub open: usize,
    pub merged: usize,
    pub closed: usize,
    pub repositories: usize,
}

/// Computes statistics in a single pass over `records`.
pub fn collect_stats(records: &[PullRequest]) -> SearchStats {
    let mut stats = SearchStats::default();
    let mut repositories = HashSet::new();

    for record in records {
        stats.total += 1;
        match record.state {
            PullRequestState::Open => stats.open += 1,
            PullRequestState::Merged => stats.merged += 1,
            PullRequestState::Closed => stats.closed += 1,
        }
        repositories.insert(record.repository.full_name.as_str());
    }

    stats.repositories = repositories.len();
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::records::{sample_pr, utc};

    #[test]
    fn counts_states_and_unique_repositories() {
        let mut a = sample_pr("PR_1", "t", "app/renovate", "acme/api", utc(2024, 3, 1));
        a.state = PullRequestState::Open;
        let mut b = sample_pr("PR_2", "t", "app/renovate", "acme/api", utc(2024, 3, 2));
        b.state = PullRequestState::Merged;
        let mut c = sample_pr("PR_3", "t", "app/renovate", "acme/web", utc(2024, 3, 3));
        c.state = PullRequestState::Closed;

        let stats = collect_stats(&[a, b, c]);

        assert_eq!(
            stats,
            SearchStats {
                total: 3,
                open: 1,
                merged: 1,
                closed: 1,
                repositories: 2,
            }
        );
    }

    #[test]
    fn empty_input_yields_zeroes() {
        assert_eq!(collect_stats(&[]), SearchStats::default());
    }
}
