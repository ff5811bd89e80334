use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PullRequestState {
    Open,
    Merged,
    Closed,
}

impl fmt::Display for PullRequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PullRequestState::Open => f.write_str("OPEN"),
            PullRequestState::Merged => f.write_str("MERGED"),
            PullRequestState::Closed => f.write_str("CLOSED"),
        }
    }
}

/// Rolled-up CI status of a pull request's head commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CiStatus {
    Success,
    Failure,
    Pending,
}

/// Author of a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub login: String,
    pub avatar_url: String,
}

/// A label attached to a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub id: String,
    pub name: String,
    pub color: String,
    pub description: Option<String>,
}

/// Identity of the repository owning a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRef {
    pub id: String,
    pub name: String,
    /// `owner/name` form.
    pub full_name: String,
    pub owner_login: String,
}

/// A dependency-update pull request as held by the record store.
///
/// `id` is the upstream's globally unique node identifier and is the store
/// key; `url` is the canonical web address used for cross-scope
/// deduplication during grouping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
    pub id: String,
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub state: PullRequestState,
    pub additions: u64,
    pub deletions: u64,
    pub ci_status: Option<CiStatus>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub merged_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub url: String,
    pub base_ref: String,
    pub head_ref: String,
    pub author: Option<Author>,
    pub labels: Vec<Label>,
    pub repository: RepositoryRef,
}

impl PullRequest {
    /// Returns the author login, or `None` for ghost authors.
    pub fn author_login(&self) -> Option<&str> {
        self.author.as_ref().map(|author| author.login.as_str())
    }
}

/// A partial update applied optimistically to a stored record.
///
/// Absent fields leave the record untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPatch {
    pub state: Option<PullRequestState>,
    pub merged_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl RecordPatch {
    /// Patch describing a successful merge at `at`.
    pub fn merged(at: DateTime<Utc>) -> Self {
        Self {
            state: Some(PullRequestState::Merged),
            merged_at: Some(at),
            closed_at: None,
        }
    }

    /// Patch describing a close at `at`.
    pub fn closed(at: DateTime<Utc>) -> Self {
        Self {
            state: Some(PullRequestState::Closed),
            merged_at: None,
            closed_at: Some(at),
        }
    }

    /// Applies this patch to a record in place.
    pub fn apply(&self, record: &mut PullRequest) {
        if let Some(state) = self.state {
            record.state = state;
        }
        if let Some(merged_at) = self.merged_at {
            record.merged_at = Some(merged_at);
        }
        if let Some(closed_at) = self.closed_at {
            record.closed_at = Some(closed_at);
        }
    }
}
