//! Orchestration of one multi-scope ingestion run.
//!
//! An [`IngestionPipeline`] fans out one [`ScopeFetcher`] per requested
//! scope, multiplexes their batches and progress over a single event channel
//! into the record store, and settles all scopes regardless of individual
//! failures. Only an authentication failure aborts the whole run.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use config::shared::IngestConfig;

use crate::client::SearchClient;
use crate::concurrency::shutdown::{ShutdownTx, create_shutdown_channel};
use crate::error::{ErrorKind, IngestError, IngestResult};
use crate::fetcher::ScopeFetcher;
use crate::ingest_error;
use crate::store::RecordStore;
use crate::types::{
    AdaptiveFetchState, IngestEvent, PipelineId, ScopeProgress,
};
use crate::workers::pool::ScopeWorkerPool;

/// Date bounds of one ingestion run.
///
/// Scopes resumed from a saved [`AdaptiveFetchState`] start from their own
/// checkpoint instead of `end_date`.
#[derive(Debug, Clone, Copy)]
pub struct RunBounds {
    pub end_date: DateTime<Utc>,
    pub start_date: DateTime<Utc>,
}

/// Final outcome of a pipeline run.
#[derive(Debug)]
pub struct IngestionReport {
    /// Per-scope outcomes, including partial successes.
    pub outcomes: Vec<ScopeProgress>,
    /// Updated per-scope checkpoints for future resumption.
    pub resume_states: HashMap<String, AdaptiveFetchState>,
}

impl IngestionReport {
    /// Returns true when at least one scope ended in a terminal error.
    pub fn has_failures(&self) -> bool {
        self.outcomes.iter().any(ScopeProgress::is_failed)
    }
}

#[derive(Debug)]
enum PipelineState {
    NotStarted,
    Started {
        pool: ScopeWorkerPool,
        feeder: JoinHandle<()>,
    },
}

/// One ingestion run over a fixed scope set.
#[derive(Debug)]
pub struct IngestionPipeline<C> {
    id: PipelineId,
    config: Arc<IngestConfig>,
    client: C,
    store: RecordStore,
    scopes: Vec<String>,
    bounds: RunBounds,
    resume_from: HashMap<String, AdaptiveFetchState>,
    generation: u64,
    state: PipelineState,
    shutdown_tx: ShutdownTx,
}

impl<C> IngestionPipeline<C>
where
    C: SearchClient + Clone + Send + Sync + 'static,
{
    /// Creates a pipeline for `scopes`.
    ///
    /// `resume_from` carries saved per-scope checkpoints; scopes without an
    /// entry start fresh from `bounds.end_date`. Batches are merged into
    /// `store` tagged with its current generation, so a store refreshed
    /// mid-run silently discards everything this pipeline still delivers.
    pub async fn new(
        id: PipelineId,
        config: Arc<IngestConfig>,
        client: C,
        store: RecordStore,
        scopes: Vec<String>,
        bounds: RunBounds,
        resume_from: Option<HashMap<String, AdaptiveFetchState>>,
    ) -> Self {
        let (shutdown_tx, _) = create_shutdown_channel();
        let generation = store.current_generation().await;

        Self {
            id,
            config,
            client,
            store,
            scopes,
            bounds,
            resume_from: resume_from.unwrap_or_default(),
            generation,
            state: PipelineState::NotStarted,
            shutdown_tx,
        }
    }

    /// Returns the pipeline id.
    pub fn id(&self) -> PipelineId {
        self.id
    }

    /// Returns a handle to the shutdown channel shared by all workers.
    pub fn shutdown_tx(&self) -> ShutdownTx {
        self.shutdown_tx.clone()
    }

    /// Spawns the store feeder and one fetch worker per scope.
    pub fn start(&mut self) -> IngestResult<()> {
        if matches!(self.state, PipelineState::Started { .. }) {
            return Err(ingest_error!(
                ErrorKind::InvalidState,
                "Pipeline already started"
            ));
        }

        info!(
            pipeline_id = self.id,
            scopes = self.scopes.len(),
            generation = self.generation,
            "starting ingestion pipeline"
        );

        let (events_tx, events_rx) = mpsc::channel::<IngestEvent>(self.config.event_buffer);

        let feeder = tokio::spawn(feed_store(
            events_rx,
            self.store.clone(),
            self.generation,
        ));

        let mut pool = ScopeWorkerPool::new();
        for scope in &self.scopes {
            let fetcher = ScopeFetcher::new(
                scope.clone(),
                self.client.clone(),
                events_tx.clone(),
                self.shutdown_tx.subscribe(),
            );

            let (end_date, interval_ms) = match self.resume_from.get(scope) {
                Some(saved) => (saved.oldest_fetched, saved.interval_ms),
                None => (self.bounds.end_date, self.config.initial_interval_ms),
            };

            pool.spawn(
                scope.clone(),
                fetcher.run(end_date, self.bounds.start_date, interval_ms),
            );
        }

        // The feeder finishes once every fetcher has dropped its sender.
        drop(events_tx);

        self.state = PipelineState::Started { pool, feeder };

        Ok(())
    }

    /// Waits for every scope to settle and returns the aggregate report.
    ///
    /// Scope failures are isolated into their [`ScopeProgress`]; an
    /// authentication failure instead shuts down the remaining workers and
    /// propagates, since it invalidates the whole run.
    pub async fn wait(self) -> IngestResult<IngestionReport> {
        let PipelineState::Started { mut pool, feeder } = self.state else {
            info!(pipeline_id = self.id, "pipeline was not started, nothing to wait for");

            return Ok(IngestionReport {
                outcomes: Vec::new(),
                resume_states: HashMap::new(),
            });
        };

        let mut outcomes = Vec::new();
        let mut resume_states = HashMap::new();
        let mut auth_error: Option<IngestError> = None;

        while let Some((scope, result)) = pool.join_next().await {
            match result {
                Ok(report) => {
                    resume_states.insert(scope, report.state);
                    outcomes.push(report.progress);
                }
                Err(err) if err.kind() == ErrorKind::AuthenticationFailed => {
                    error!(
                        pipeline_id = self.id,
                        scope = %scope,
                        "authentication failed, halting the whole ingestion run"
                    );

                    self.shutdown_tx.shutdown();

                    if auth_error.is_none() {
                        auth_error = Some(err);
                    }
                }
                Err(err) => {
                    // Worker panics settle here; the scope keeps an outcome.
                    let mut progress = ScopeProgress::new(scope);
                    progress.done = true;
                    progress.error = Some(err);
                    outcomes.push(progress);
                }
            }
        }

        // All senders are gone once the workers settled, so the feeder is
        // draining its tail and finishing.
        if feeder.await.is_err() {
            return Err(ingest_error!(
                ErrorKind::ScopeWorkerPanic,
                "Record store feeder panicked"
            ));
        }

        self.store.mark_generation_done(self.generation).await;

        if let Some(err) = auth_error {
            return Err(err);
        }

        debug!(pipeline_id = self.id, outcomes = outcomes.len(), "pipeline settled");

        Ok(IngestionReport {
            outcomes,
            resume_states,
        })
    }

    /// Signals every worker to stop at its next cancellation check.
    pub fn shutdown(&self) {
        info!(pipeline_id = self.id, "shutting down ingestion pipeline");

        self.shutdown_tx.shutdown();
    }

    /// Convenience for `shutdown()` followed by `wait()`.
    pub async fn shutdown_and_wait(self) -> IngestResult<IngestionReport> {
        self.shutdown();
        self.wait().await
    }
}

/// Applies fetcher events to the record store until the channel closes.
async fn feed_store(
    mut events_rx: mpsc::Receiver<IngestEvent>,
    store: RecordStore,
    generation: u64,
) {
    while let Some(event) = events_rx.recv().await {
        match event {
            IngestEvent::Batch(records) => {
                store.merge_batch(generation, records).await;
            }
            IngestEvent::Progress(progress) => {
                debug!(
                    scope = %progress.scope,
                    fetched = progress.fetched,
                    done = progress.done,
                    "scope progress"
                );
            }
        }
    }
}
