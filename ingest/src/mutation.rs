//! Sequential executor for write actions against individual records.
//!
//! Actions run strictly one at a time: the upstream throttles concurrent
//! writes, so the executor never parallelizes and its progress stream is
//! totally ordered. Each action is wrapped in bounded exponential-backoff
//! retry gated on rate-limit signals; failures are item-scoped and never
//! halt the rest of the batch.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{info, warn};

use config::shared::MutationConfig;

use crate::client::{MutationAction, MutationClient};
use crate::metrics::{
    ACTION_LABEL, INGEST_MUTATION_FAILURES_TOTAL, INGEST_MUTATION_RETRIES_TOTAL,
};
use crate::retry::{execute_with_retry, is_rate_limited};
use crate::types::{PullRequest, RecordPatch};

/// Status of one item in a mutation batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationStatus {
    Pending,
    Processing,
    Success,
    Error,
}

impl fmt::Display for MutationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationStatus::Pending => f.write_str("pending"),
            MutationStatus::Processing => f.write_str("processing"),
            MutationStatus::Success => f.write_str("success"),
            MutationStatus::Error => f.write_str("error"),
        }
    }
}

/// Progress of one item in a mutation batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MutationProgress {
    pub record_id: String,
    pub number: u64,
    pub title: String,
    pub status: MutationStatus,
    pub error: Option<String>,
}

/// Sequential, retrying executor for a batch of write actions.
pub struct MutationExecutor<M> {
    client: M,
    config: MutationConfig,
}

impl<M> MutationExecutor<M>
where
    M: MutationClient,
{
    /// Creates an executor over `client`.
    pub fn new(client: M, config: MutationConfig) -> Self {
        Self { client, config }
    }

    /// Applies `action` to `targets` in order, strictly sequentially.
    ///
    /// After every status transition the full snapshot of all items is sent
    /// on `progress_tx`, when provided. The final snapshot is also returned.
    /// Individual failures mark their item and execution continues with the
    /// next one.
    pub async fn execute(
        &self,
        action: MutationAction,
        targets: &[PullRequest],
        progress_tx: Option<&mpsc::UnboundedSender<Vec<MutationProgress>>>,
    ) -> Vec<MutationProgress> {
        let mut progress: Vec<MutationProgress> = targets
            .iter()
            .map(|target| MutationProgress {
                record_id: target.id.clone(),
                number: target.number,
                title: target.title.clone(),
                status: MutationStatus::Pending,
                error: None,
            })
            .collect();

        emit(progress_tx, &progress);

        info!(%action, items = targets.len(), "starting mutation batch");

        for index in 0..targets.len() {
            progress[index].status = MutationStatus::Processing;
            emit(progress_tx, &progress);

            let record_id = progress[index].record_id.clone();
            let result = execute_with_retry(
                || self.client.perform(action, &record_id),
                &self.config.retry,
                is_rate_limited,
                |attempt, delay, err| {
                    counter!(INGEST_MUTATION_RETRIES_TOTAL, ACTION_LABEL => action.to_string())
                        .increment(1);
                    warn!(
                        record_id = %record_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "mutation hit rate limit, backing off"
                    );
                },
            )
            .await;

            match result {
                Ok(()) => {
                    progress[index].status = MutationStatus::Success;
                }
                Err(err) => {
                    counter!(INGEST_MUTATION_FAILURES_TOTAL, ACTION_LABEL => action.to_string())
                        .increment(1);
                    warn!(record_id = %progress[index].record_id, error = %err, "mutation failed");

                    progress[index].status = MutationStatus::Error;
                    progress[index].error = Some(match err.detail() {
                        Some(detail) => format!("{}: {detail}", err.description()),
                        None => err.description().to_owned(),
                    });
                }
            }

            emit(progress_tx, &progress);

            // Space out writes against the upstream quota.
            let delay = Duration::from_millis(self.config.inter_item_delay_ms);
            if index + 1 < targets.len() && !delay.is_zero() {
                sleep(delay).await;
            }
        }

        progress
    }
}

/// Store patch reflecting a successful `action` applied at `at`.
pub fn success_patch(action: MutationAction, at: DateTime<Utc>) -> RecordPatch {
    match action {
        MutationAction::Merge => RecordPatch::merged(at),
        MutationAction::Close => RecordPatch::closed(at),
    }
}

fn emit(
    progress_tx: Option<&mpsc::UnboundedSender<Vec<MutationProgress>>>,
    progress: &[MutationProgress],
) {
    if let Some(tx) = progress_tx {
        // A dropped receiver only means nobody is watching anymore.
        let _ = tx.send(progress.to_vec());
    }
}
