//! Search query construction.
//!
//! The ingestion core treats a scope as opaque; this module combines it
//! with the pull-request restriction and the window's creation-date range
//! in the upstream's search grammar.

use chrono::{DateTime, Utc};

use ingest::client::WindowQuery;

/// GraphQL document for the paginated search query.
pub const SEARCH_DOCUMENT: &str = r#"
query SearchPullRequests($searchQuery: String!, $first: Int!, $after: String) {
  search(query: $searchQuery, type: ISSUE, first: $first, after: $after) {
    issueCount
    pageInfo {
      hasNextPage
      endCursor
    }
    edges {
      node {
        ... on PullRequest {
          id
          number
          title
          body
          state
          additions
          deletions
          commits(last: 1) {
            nodes {
              commit {
                statusCheckRollup {
                  state
                }
              }
            }
          }
          createdAt
          updatedAt
          mergedAt
          closedAt
          url
          baseRefName
          headRefName
          author {
            login
            avatarUrl(size: 40)
          }
          labels(first: 10) {
            nodes {
              id
              name
              color
              description
            }
          }
          repository {
            id
            name
            nameWithOwner
            owner {
              login
            }
          }
        }
      }
    }
  }
}
"#;

/// GraphQL document merging a pull request by node id.
pub const MERGE_DOCUMENT: &str = r#"
mutation MergePullRequest($input: MergePullRequestInput!) {
  mergePullRequest(input: $input) {
    pullRequest {
      id
      state
    }
  }
}
"#;

/// GraphQL document closing a pull request by node id.
pub const CLOSE_DOCUMENT: &str = r#"
mutation ClosePullRequest($input: ClosePullRequestInput!) {
  closePullRequest(input: $input) {
    pullRequest {
      id
      state
    }
  }
}
"#;

/// Renders the search string for one windowed scope query.
///
/// The window is expressed at day granularity, matching the grammar's
/// `created:from..to` range filter.
pub fn build_search_query(query: &WindowQuery) -> String {
    format!(
        "is:pr {} created:{}..{}",
        query.scope,
        format_date(query.window.start),
        format_date(query.window.end)
    )
}

fn format_date(date: DateTime<Utc>) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ingest::types::TimeWindow;

    #[test]
    fn renders_scope_and_date_range() {
        let query = WindowQuery {
            scope: "org:acme author:app/renovate".to_owned(),
            window: TimeWindow {
                start: Utc.with_ymd_and_hms(2024, 2, 28, 0, 0, 0).unwrap(),
                end: Utc.with_ymd_and_hms(2024, 3, 5, 12, 30, 0).unwrap(),
            },
        };

        assert_eq!(
            build_search_query(&query),
            "is:pr org:acme author:app/renovate created:2024-02-28..2024-03-05"
        );
    }
}
