//! In-memory search backend over a fixed record set.
//!
//! Useful for demos and integration tests: records are filtered by the
//! window's creation-date range and paginated with numeric cursors, the same
//! contract a real backend honors. Also implements [`MutationClient`] by
//! mutating the held records directly.

use std::sync::{Arc, Mutex};

use chrono::Utc;

use crate::client::base::{MutationAction, MutationClient, SearchClient, SearchPage, WindowQuery};
use crate::error::{ErrorKind, IngestResult};
use crate::ingest_error;
use crate::types::{PullRequest, PullRequestState};

/// Default page size of the in-memory backend.
const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Debug)]
struct Inner {
    records: Vec<PullRequest>,
}

/// Search and mutation backend serving from process memory.
#[derive(Debug, Clone)]
pub struct MemoryClient {
    inner: Arc<Mutex<Inner>>,
    page_size: usize,
}

impl MemoryClient {
    /// Creates a backend over the given records.
    pub fn new(records: Vec<PullRequest>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner { records })),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Overrides the page size, mainly to exercise pagination in tests.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Returns a copy of the held records.
    pub fn records(&self) -> Vec<PullRequest> {
        self.inner.lock().expect("memory client lock poisoned").records.clone()
    }

    fn matching(&self, query: &WindowQuery) -> Vec<PullRequest> {
        let inner = self.inner.lock().expect("memory client lock poisoned");
        inner
            .records
            .iter()
            .filter(|record| {
                record.created_at >= query.window.start && record.created_at < query.window.end
            })
            .filter(|record| {
                // The scope is opaque upstream; here it restricts by
                // repository full name, with an empty scope matching all.
                query.scope.is_empty() || record.repository.full_name.contains(&query.scope)
            })
            .cloned()
            .collect()
    }
}

impl SearchClient for MemoryClient {
    async fn fetch_page(
        &self,
        query: &WindowQuery,
        cursor: Option<&str>,
    ) -> IngestResult<SearchPage> {
        let matching = self.matching(query);
        let total_matches = matching.len() as u64;

        let offset = match cursor {
            None => 0,
            Some(cursor) => cursor.parse::<usize>().map_err(|err| {
                ingest_error!(
                    ErrorKind::MalformedResponse,
                    "Invalid pagination cursor",
                    cursor,
                    source: err
                )
            })?,
        };

        let records: Vec<_> = matching.into_iter().skip(offset).take(self.page_size).collect();
        let next_offset = offset + records.len();
        let has_next_page = (next_offset as u64) < total_matches;

        Ok(SearchPage {
            records,
            total_matches,
            has_next_page,
            end_cursor: has_next_page.then(|| next_offset.to_string()),
        })
    }
}

impl MutationClient for MemoryClient {
    async fn perform(&self, action: MutationAction, record_id: &str) -> IngestResult<()> {
        let mut inner = self.inner.lock().expect("memory client lock poisoned");
        let record = inner
            .records
            .iter_mut()
            .find(|record| record.id == record_id)
            .ok_or_else(|| {
                ingest_error!(ErrorKind::MutationFailed, "Record not found", record_id)
            })?;

        let now = Utc::now();
        match action {
            MutationAction::Merge => {
                record.state = PullRequestState::Merged;
                record.merged_at = Some(now);
            }
            MutationAction::Close => {
                record.state = PullRequestState::Closed;
                record.closed_at = Some(now);
            }
        }

        Ok(())
    }
}
