//! Adaptive windowed fetch loop for a single scope.
//!
//! A scope is walked backwards in time through bounded windows so that no
//! single query exceeds the upstream's hard result cap. Each window starts
//! with a probe page that reports the total match count; a window over the
//! cap is retried with a halved interval before any data is emitted, and the
//! interval keeps adapting to the observed density for subsequent windows.
//!
//! # Known limitation
//!
//! The interval is never reduced below [`MIN_INTERVAL_MS`]. A window that
//! still exceeds the cap at the minimum width is fetched anyway and its tail
//! beyond the cap is unreachable; this trades a bounded loss against looping
//! forever, and is logged as a warning when it happens.

use chrono::{DateTime, Utc};
use metrics::counter;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::client::{SearchClient, SearchPage, WindowQuery};
use crate::concurrency::shutdown::ShutdownRx;
use crate::error::{ErrorKind, IngestError, IngestResult};
use crate::metrics::{
    INGEST_RECORDS_FETCHED_TOTAL, INGEST_SCOPE_FAILURES_TOTAL, INGEST_WINDOW_SPLITS_TOTAL,
    INGEST_WINDOWS_PROBED_TOTAL, SCOPE_LABEL,
};
use crate::types::{
    AdaptiveFetchState, IngestEvent, MIN_INTERVAL_MS, PullRequest, SEARCH_CAP, ScopeProgress,
    TimeWindow, adapt_interval, clamp_interval, halve_interval,
};

/// Outcome of one scope's fetch loop.
///
/// The progress carries the terminal error for failed scopes; the adaptive
/// state lets a later run resume from the oldest fully processed window.
#[derive(Debug, Clone)]
pub struct ScopeReport {
    pub progress: ScopeProgress,
    pub state: AdaptiveFetchState,
}

/// Fetches one scope through adaptively sized time windows.
///
/// Batches and progress updates are emitted as [`IngestEvent`]s on the
/// pipeline's shared channel. Cancellation is checked before every window
/// and before every page.
pub struct ScopeFetcher<C> {
    scope: String,
    client: C,
    events: mpsc::Sender<IngestEvent>,
    shutdown_rx: ShutdownRx,
}

impl<C> ScopeFetcher<C>
where
    C: SearchClient,
{
    /// Creates a fetcher for `scope`.
    pub fn new(
        scope: impl Into<String>,
        client: C,
        events: mpsc::Sender<IngestEvent>,
        shutdown_rx: ShutdownRx,
    ) -> Self {
        Self {
            scope: scope.into(),
            client,
            events,
            shutdown_rx,
        }
    }

    /// Runs the fetch loop from `end_date` backwards until `start_date`.
    ///
    /// Any terminal error except an authentication failure is recorded into
    /// the returned progress; an authentication failure propagates as `Err`
    /// because it must halt the whole ingestion run, not just this scope.
    pub async fn run(
        self,
        end_date: DateTime<Utc>,
        start_date: DateTime<Utc>,
        initial_interval_ms: i64,
    ) -> IngestResult<ScopeReport> {
        let mut interval_ms = clamp_interval(initial_interval_ms);
        let mut window_end = end_date;
        let mut progress = ScopeProgress::new(self.scope.clone());

        info!(
            scope = %self.scope,
            %end_date,
            %start_date,
            interval_ms,
            "starting scope fetch"
        );

        while window_end > start_date && !self.shutdown_rx.is_shutdown() {
            let window = TimeWindow::preceding(window_end, interval_ms, start_date);
            let query = WindowQuery {
                scope: self.scope.clone(),
                window,
            };

            counter!(INGEST_WINDOWS_PROBED_TOTAL, SCOPE_LABEL => self.scope.clone()).increment(1);

            // Probe: read the total match count before committing to full
            // pagination of this window.
            let probe = match self.client.fetch_page(&query, None).await {
                Ok(page) => page,
                Err(err) => return self.terminal(err, progress, window_end, interval_ms).await,
            };

            if self.shutdown_rx.is_shutdown() {
                break;
            }

            let total_matches = probe.total_matches;

            if total_matches > SEARCH_CAP {
                if interval_ms > MIN_INTERVAL_MS {
                    // Too dense: shrink and retry the same window without
                    // emitting anything for this attempt.
                    interval_ms = halve_interval(interval_ms);

                    counter!(INGEST_WINDOW_SPLITS_TOTAL, SCOPE_LABEL => self.scope.clone())
                        .increment(1);
                    debug!(
                        scope = %self.scope,
                        total_matches,
                        interval_ms,
                        "window over cap, retrying with halved interval"
                    );

                    continue;
                }

                warn!(
                    scope = %self.scope,
                    total_matches,
                    window_start = %window.start,
                    window_end = %window.end,
                    "window exceeds the result cap at minimum interval, tail beyond the cap is unreachable"
                );
            }

            if let Err(err) = self.paginate_window(&query, probe, &mut progress).await {
                return self.terminal(err, progress, window_end, interval_ms).await;
            }

            self.emit(IngestEvent::Progress(progress.clone())).await;

            // Tune the next window from this window's density.
            interval_ms = adapt_interval(interval_ms, total_matches);

            // The window is fully processed, only now does the end move into
            // the past.
            window_end = window.start;
        }

        progress.done = true;
        self.emit(IngestEvent::Progress(progress.clone())).await;

        info!(scope = %self.scope, fetched = progress.fetched, "scope fetch finished");

        Ok(ScopeReport {
            progress,
            state: AdaptiveFetchState {
                oldest_fetched: window_end,
                interval_ms,
            },
        })
    }

    /// Emits the probe's records and paginates the remaining pages of one
    /// window via cursor.
    async fn paginate_window(
        &self,
        query: &WindowQuery,
        probe: SearchPage,
        progress: &mut ScopeProgress,
    ) -> IngestResult<()> {
        let mut has_next = probe.has_next_page;
        let mut cursor = probe.end_cursor;

        self.deliver(probe.records, progress).await;

        while has_next && !self.shutdown_rx.is_shutdown() {
            let page = self.client.fetch_page(query, cursor.as_deref()).await?;

            self.deliver(page.records, progress).await;

            has_next = page.has_next_page;
            cursor = page.end_cursor;
        }

        Ok(())
    }

    /// Sends a non-empty batch to the store feeder and accounts for it.
    async fn deliver(&self, records: Vec<PullRequest>, progress: &mut ScopeProgress) {
        if records.is_empty() {
            return;
        }

        progress.fetched += records.len() as u64;
        counter!(INGEST_RECORDS_FETCHED_TOTAL, SCOPE_LABEL => self.scope.clone())
            .increment(records.len() as u64);

        self.emit(IngestEvent::Batch(records)).await;
    }

    async fn emit(&self, event: IngestEvent) {
        // A closed channel means the pipeline consumer is gone; the shutdown
        // signal will stop the loop at its next check.
        let _ = self.events.send(event).await;
    }

    /// Finishes the scope with a terminal error.
    ///
    /// Authentication failures are escalated to the orchestrator instead of
    /// being absorbed into the per-scope outcome.
    async fn terminal(
        &self,
        err: IngestError,
        mut progress: ScopeProgress,
        window_end: DateTime<Utc>,
        interval_ms: i64,
    ) -> IngestResult<ScopeReport> {
        if err.kind() == ErrorKind::AuthenticationFailed {
            return Err(err);
        }

        warn!(scope = %self.scope, error = %err, "scope fetch ended in terminal error");
        counter!(INGEST_SCOPE_FAILURES_TOTAL, SCOPE_LABEL => self.scope.clone()).increment(1);

        progress.error = Some(err);
        progress.done = true;
        self.emit(IngestEvent::Progress(progress.clone())).await;

        Ok(ScopeReport {
            progress,
            state: AdaptiveFetchState {
                oldest_fetched: window_end,
                interval_ms,
            },
        })
    }
}
