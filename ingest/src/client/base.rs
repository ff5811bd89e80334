use std::fmt;
use std::future::Future;

use crate::error::IngestResult;
use crate::types::{PullRequest, TimeWindow};

/// One windowed search request against a single scope.
///
/// The scope stays opaque to the core; implementors combine it with the
/// window's date-range predicate in whatever query grammar the upstream
/// speaks.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowQuery {
    pub scope: String,
    pub window: TimeWindow,
}

/// One page of search results.
#[derive(Debug, Clone)]
pub struct SearchPage {
    /// Records on this page, already transformed into the internal model.
    pub records: Vec<PullRequest>,
    /// Total matches for the whole query, reported on every page including
    /// the probe. Used for cap detection before committing to pagination.
    pub total_matches: u64,
    /// Whether another page follows.
    pub has_next_page: bool,
    /// Cursor for the next page, when `has_next_page` is true.
    pub end_cursor: Option<String>,
}

impl Default for SearchPage {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            total_matches: 0,
            has_next_page: false,
            end_cursor: None,
        }
    }
}

/// Trait for paginated search backends consumed by scope fetchers.
///
/// Implementations own transport concerns entirely: transient failures and
/// quota hits are retried inside `fetch_page`, and the fetcher only ever
/// sees a single success or failure outcome per call. An authentication
/// failure must be reported with
/// [`crate::error::ErrorKind::AuthenticationFailed`] so the orchestrator can
/// halt the whole run.
pub trait SearchClient {
    /// Fetches one page of the windowed query.
    ///
    /// `cursor` is `None` for the probe page. `total_matches` must be
    /// populated even on the probe.
    fn fetch_page(
        &self,
        query: &WindowQuery,
        cursor: Option<&str>,
    ) -> impl Future<Output = IngestResult<SearchPage>> + Send;
}

/// Write actions the mutation executor can apply to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationAction {
    Merge,
    Close,
}

impl fmt::Display for MutationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationAction::Merge => f.write_str("merge"),
            MutationAction::Close => f.write_str("close"),
        }
    }
}

/// Trait for backends that can apply write actions to individual records.
pub trait MutationClient {
    /// Performs `action` against the record with the given id.
    fn perform(
        &self,
        action: MutationAction,
        record_id: &str,
    ) -> impl Future<Output = IngestResult<()>> + Send;
}
