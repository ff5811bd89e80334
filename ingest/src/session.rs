//! One user-facing ingestion session.
//!
//! The session is the explicit context object owning the record store, the
//! scope set, and the currently running pipeline: constructed at start,
//! dropped at the end, passed by reference to whoever needs it. It carries
//! the saved per-scope adaptive states between runs so that load-more
//! resumes where the previous run stopped, and owns the generation handling
//! that makes refresh safe against late batches.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use config::shared::{IngestConfig, MutationConfig};

use crate::client::{MutationAction, MutationClient, SearchClient};
use crate::concurrency::shutdown::ShutdownTx;
use crate::error::{ErrorKind, IngestResult};
use crate::ingest_error;
use crate::mutation::{MutationExecutor, MutationProgress, MutationStatus, success_patch};
use crate::pipeline::{IngestionPipeline, IngestionReport, RunBounds};
use crate::store::RecordStore;
use crate::types::{AdaptiveFetchState, PipelineId, PullRequest};

struct ActiveRun {
    shutdown_tx: ShutdownTx,
    handle: JoinHandle<IngestResult<IngestionReport>>,
}

/// Session over a fixed scope set.
pub struct IngestionSession<C> {
    config: Arc<IngestConfig>,
    client: C,
    store: RecordStore,
    scopes: Vec<String>,
    resume_states: HashMap<String, AdaptiveFetchState>,
    active: Option<ActiveRun>,
    next_pipeline_id: PipelineId,
}

impl<C> IngestionSession<C>
where
    C: SearchClient + Clone + Send + Sync + 'static,
{
    /// Creates a session for `scopes` with an empty store.
    pub fn new(config: IngestConfig, client: C, scopes: Vec<String>) -> Self {
        Self {
            config: Arc::new(config),
            client,
            store: RecordStore::new(),
            scopes,
            resume_states: HashMap::new(),
            active: None,
            next_pipeline_id: 1,
        }
    }

    /// Returns the session's record store.
    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Starts the first ingestion run of this session.
    pub async fn start(&mut self) -> IngestResult<()> {
        self.store.begin_generation().await;
        self.resume_states.clear();
        self.launch(None).await
    }

    /// Resumes ingestion further into the past, keeping everything already
    /// in the store.
    ///
    /// Scopes continue from their saved adaptive state with their tuned
    /// interval. No-op while a run is still in flight.
    pub async fn load_more(&mut self) -> IngestResult<()> {
        if self.is_running() {
            info!("ignoring load-more, a run is still in flight");
            return Ok(());
        }

        let resume = (!self.resume_states.is_empty()).then(|| self.resume_states.clone());
        self.launch(resume).await
    }

    /// Cancels any in-flight run, clears the store, and restarts ingestion
    /// for the same scope set from scratch.
    ///
    /// The generation bump guarantees that a late batch from the cancelled
    /// run is discarded instead of repopulating the cleared store.
    pub async fn refresh(&mut self) -> IngestResult<()> {
        self.cancel_active().await;

        self.store.begin_generation().await;
        self.resume_states.clear();

        self.launch(None).await
    }

    /// Waits for the in-flight run and returns its report.
    ///
    /// Saved adaptive states are updated for the next load-more. Fails with
    /// [`ErrorKind::InvalidState`] when no run is in flight. Cancel-safe:
    /// dropping the returned future keeps the run active, so a caller
    /// racing this against a signal can still cancel afterwards.
    pub async fn wait(&mut self) -> IngestResult<IngestionReport> {
        let Some(active) = self.active.as_mut() else {
            return Err(ingest_error!(
                ErrorKind::InvalidState,
                "No ingestion run in flight"
            ));
        };

        let joined = (&mut active.handle).await;

        // Only a settled run releases the slot.
        self.active = None;

        let report = match joined {
            Ok(result) => result?,
            Err(_join_err) => {
                return Err(ingest_error!(
                    ErrorKind::ScopeWorkerPanic,
                    "Ingestion run panicked"
                ));
            }
        };

        // Keep each scope's checkpoint for resumption.
        for (scope, state) in &report.resume_states {
            self.resume_states.insert(scope.clone(), *state);
        }

        Ok(report)
    }

    /// Cancels the in-flight run, if any, and waits for it to settle.
    pub async fn shutdown(&mut self) {
        self.cancel_active().await;
    }

    /// Returns true while a run is in flight.
    pub fn is_running(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| !active.handle.is_finished())
    }

    /// Applies `action` to `targets` sequentially and patches the store
    /// optimistically for every successful item.
    pub async fn run_bulk_action<M>(
        &self,
        client: M,
        mutation_config: MutationConfig,
        action: MutationAction,
        targets: Vec<PullRequest>,
        progress_tx: Option<&mpsc::UnboundedSender<Vec<MutationProgress>>>,
    ) -> Vec<MutationProgress>
    where
        M: MutationClient,
    {
        let executor = MutationExecutor::new(client, mutation_config);
        let progress = executor.execute(action, &targets, progress_tx).await;

        let patch = success_patch(action, Utc::now());
        for item in &progress {
            if item.status == MutationStatus::Success {
                self.store.apply_update(&item.record_id, &patch).await;
            }
        }

        progress
    }

    async fn launch(&mut self, resume: Option<HashMap<String, AdaptiveFetchState>>) -> IngestResult<()> {
        if self.is_running() {
            return Err(ingest_error!(
                ErrorKind::InvalidState,
                "An ingestion run is already in flight"
            ));
        }

        let end_date = Utc::now();
        let bounds = RunBounds {
            end_date,
            start_date: self.run_start_date(end_date, resume.as_ref()),
        };

        let id = self.next_pipeline_id;
        self.next_pipeline_id += 1;

        let mut pipeline = IngestionPipeline::new(
            id,
            self.config.clone(),
            self.client.clone(),
            self.store.clone(),
            self.scopes.clone(),
            bounds,
            resume,
        )
        .await;

        pipeline.start()?;

        let shutdown_tx = pipeline.shutdown_tx();
        let handle = tokio::spawn(pipeline.wait());

        self.active = Some(ActiveRun {
            shutdown_tx,
            handle,
        });

        Ok(())
    }

    /// Lower bound for the next run's backward traversal.
    ///
    /// A fresh run reaches one lookback step behind its end date; a resumed
    /// run reaches one step behind the oldest checkpoint. Both are clamped
    /// to the configured history floor so traversal always has a finite end.
    fn run_start_date(
        &self,
        end_date: DateTime<Utc>,
        resume: Option<&HashMap<String, AdaptiveFetchState>>,
    ) -> DateTime<Utc> {
        let step = Duration::days(self.config.lookback_step_days);

        let reference = resume
            .and_then(|states| states.values().map(|state| state.oldest_fetched).min())
            .unwrap_or(end_date);

        (reference - step).max(self.config.history_floor)
    }

    async fn cancel_active(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };

        active.shutdown_tx.shutdown();

        match active.handle.await {
            Ok(Ok(report)) => {
                // States from a cancelled run still move the checkpoints.
                for (scope, state) in report.resume_states {
                    self.resume_states.insert(scope, state);
                }
            }
            Ok(Err(err)) => {
                warn!(error = %err, "cancelled run settled with error");
            }
            Err(_join_err) => {
                warn!("cancelled run panicked while settling");
            }
        }
    }
}
