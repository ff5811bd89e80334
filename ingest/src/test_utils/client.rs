//! Scripted search and mutation backends for tests.
//!
//! Responses are queued per scope and consumed in call order, and every call
//! is recorded so tests can assert on the exact window sequence a fetcher
//! issued. Running out of script is a test bug and panics loudly.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::client::{MutationAction, MutationClient, SearchClient, SearchPage, WindowQuery};
use crate::error::{ErrorKind, IngestResult};
use crate::ingest_error;
use crate::types::PullRequest;

/// One recorded `fetch_page` call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub scope: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub cursor: Option<String>,
}

enum ScriptedResponse {
    Page(SearchPage),
    Fail(ErrorKind, &'static str),
}

#[derive(Default)]
struct ScriptedInner {
    scripts: HashMap<String, VecDeque<ScriptedResponse>>,
    calls: Vec<RecordedCall>,
}

/// Search backend answering from a per-scope response queue.
#[derive(Clone, Default)]
pub struct ScriptedSearchClient {
    inner: Arc<Mutex<ScriptedInner>>,
}

impl ScriptedSearchClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a successful page for `scope`.
    pub fn push_page(&self, scope: &str, page: SearchPage) {
        self.inner
            .lock()
            .unwrap()
            .scripts
            .entry(scope.to_owned())
            .or_default()
            .push_back(ScriptedResponse::Page(page));
    }

    /// Queues a failure for `scope`.
    pub fn push_error(&self, scope: &str, kind: ErrorKind, description: &'static str) {
        self.inner
            .lock()
            .unwrap()
            .scripts
            .entry(scope.to_owned())
            .or_default()
            .push_back(ScriptedResponse::Fail(kind, description));
    }

    /// Returns every call made so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// Returns the calls made for one scope, in order.
    pub fn calls_for(&self, scope: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.scope == scope)
            .collect()
    }
}

/// Builds a page with the given records and total match count.
pub fn page(records: Vec<PullRequest>, total_matches: u64) -> SearchPage {
    SearchPage {
        records,
        total_matches,
        has_next_page: false,
        end_cursor: None,
    }
}

/// Builds a page that advertises a following page under `cursor`.
pub fn page_with_next(
    records: Vec<PullRequest>,
    total_matches: u64,
    cursor: &str,
) -> SearchPage {
    SearchPage {
        records,
        total_matches,
        has_next_page: true,
        end_cursor: Some(cursor.to_owned()),
    }
}

impl SearchClient for ScriptedSearchClient {
    async fn fetch_page(
        &self,
        query: &WindowQuery,
        cursor: Option<&str>,
    ) -> IngestResult<SearchPage> {
        let mut inner = self.inner.lock().unwrap();

        inner.calls.push(RecordedCall {
            scope: query.scope.clone(),
            window_start: query.window.start,
            window_end: query.window.end,
            cursor: cursor.map(str::to_owned),
        });

        let response = inner
            .scripts
            .get_mut(&query.scope)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| {
                panic!(
                    "no scripted response left for scope `{}` (window {} .. {}, cursor {:?})",
                    query.scope, query.window.start, query.window.end, cursor
                )
            });

        match response {
            ScriptedResponse::Page(page) => Ok(page),
            ScriptedResponse::Fail(kind, description) => {
                Err(crate::error::IngestError::from((kind, description)))
            }
        }
    }
}

#[derive(Default)]
struct MutationInner {
    // Failures remaining before an id starts succeeding.
    failures: HashMap<String, (u32, ErrorKind, &'static str)>,
    calls: Vec<(MutationAction, String)>,
}

/// Mutation backend that fails a configurable number of times per record.
#[derive(Clone, Default)]
pub struct ScriptedMutationClient {
    inner: Arc<Mutex<MutationInner>>,
}

impl ScriptedMutationClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `failures` calls for `record_id` fail with the given
    /// kind before succeeding.
    pub fn fail_times(
        &self,
        record_id: &str,
        failures: u32,
        kind: ErrorKind,
        description: &'static str,
    ) {
        self.inner
            .lock()
            .unwrap()
            .failures
            .insert(record_id.to_owned(), (failures, kind, description));
    }

    /// Returns every `(action, record_id)` call in order.
    pub fn calls(&self) -> Vec<(MutationAction, String)> {
        self.inner.lock().unwrap().calls.clone()
    }
}

impl MutationClient for ScriptedMutationClient {
    async fn perform(&self, action: MutationAction, record_id: &str) -> IngestResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push((action, record_id.to_owned()));

        if let Some((remaining, kind, description)) = inner.failures.get_mut(record_id) {
            if *remaining > 0 {
                *remaining -= 1;
                let (kind, description) = (*kind, *description);
                return Err(ingest_error!(kind, description));
            }
        }

        Ok(())
    }
}
