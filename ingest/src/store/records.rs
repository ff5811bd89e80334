//! Deduplicated, mutable cache of fetched records.
//!
//! The store is the authoritative map of records by id for one session.
//! Merges are last-write-wins and idempotent, so redelivery across
//! overlapping windows or scopes is harmless and merge order across scopes
//! does not matter. Every merge is tagged with the generation of the run
//! that produced it; batches tagged with a stale generation are dropped,
//! which closes the race where a just-cancelled run's last in-flight batch
//! would repopulate a freshly cleared store.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use tracing::debug;

use crate::types::{PullRequest, RecordPatch};

/// User-facing loading flags derived from ingestion progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreFlags {
    /// True until the first batch of the current generation arrives.
    pub initial_loading: bool,
    /// True from the first batch until the run is marked done.
    pub fetching_more: bool,
}

#[derive(Debug)]
struct Inner {
    records: HashMap<String, PullRequest>,
    generation: u64,
    first_batch_seen: bool,
    ingest_done: bool,
}

/// Thread-safe record cache shared between the pipeline feeder and readers.
#[derive(Debug, Clone)]
pub struct RecordStore {
    inner: Arc<Mutex<Inner>>,
    version_tx: watch::Sender<u64>,
}

impl RecordStore {
    /// Creates an empty store at generation zero.
    pub fn new() -> Self {
        let inner = Inner {
            records: HashMap::new(),
            generation: 0,
            first_batch_seen: false,
            ingest_done: false,
        };

        let (version_tx, _) = watch::channel(0);

        Self {
            inner: Arc::new(Mutex::new(inner)),
            version_tx,
        }
    }

    /// Returns the current generation.
    pub async fn current_generation(&self) -> u64 {
        self.inner.lock().await.generation
    }

    /// Starts a new generation: clears all records, resets the loading
    /// flags, and returns the new generation number.
    ///
    /// Any batch still in flight from an earlier run carries the previous
    /// generation and will be discarded on merge.
    pub async fn begin_generation(&self) -> u64 {
        let mut inner = self.inner.lock().await;
        inner.generation += 1;
        inner.records.clear();
        inner.first_batch_seen = false;
        inner.ingest_done = false;

        let generation = inner.generation;
        drop(inner);

        self.bump_version();

        debug!(generation, "record store generation started");

        generation
    }

    /// Upserts a batch of records, last write wins per id.
    ///
    /// Returns false and merges nothing when `generation` is stale.
    pub async fn merge_batch(&self, generation: u64, records: Vec<PullRequest>) -> bool {
        let mut inner = self.inner.lock().await;

        if inner.generation != generation {
            debug!(
                batch_generation = generation,
                store_generation = inner.generation,
                dropped = records.len(),
                "dropping batch from stale generation"
            );
            return false;
        }

        if records.is_empty() {
            return true;
        }

        inner.first_batch_seen = true;
        for record in records {
            inner.records.insert(record.id.clone(), record);
        }
        drop(inner);

        self.bump_version();

        true
    }

    /// Marks the run of `generation` as done, ending the fetching-more phase.
    ///
    /// No-op for stale generations.
    pub async fn mark_generation_done(&self, generation: u64) {
        let mut inner = self.inner.lock().await;
        if inner.generation != generation {
            return;
        }

        inner.ingest_done = true;
        drop(inner);

        self.bump_version();
    }

    /// Applies a partial update to a stored record, no-op when absent.
    pub async fn apply_update(&self, id: &str, patch: &RecordPatch) -> bool {
        let mut inner = self.inner.lock().await;
        let Some(record) = inner.records.get_mut(id) else {
            return false;
        };

        patch.apply(record);
        drop(inner);

        self.bump_version();

        true
    }

    /// Removes a record by id, no-op when absent.
    pub async fn remove(&self, id: &str) -> bool {
        let mut inner = self.inner.lock().await;
        let removed = inner.records.remove(id).is_some();
        drop(inner);

        if removed {
            self.bump_version();
        }

        removed
    }

    /// Returns a copy of all records, in unspecified order.
    pub async fn snapshot(&self) -> Vec<PullRequest> {
        self.inner.lock().await.records.values().cloned().collect()
    }

    /// Returns a record by id.
    pub async fn get(&self, id: &str) -> Option<PullRequest> {
        self.inner.lock().await.records.get(id).cloned()
    }

    /// Returns the number of stored records.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.records.len()
    }

    /// Returns true when no record is stored.
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.records.is_empty()
    }

    /// Returns the current loading flags.
    pub async fn flags(&self) -> StoreFlags {
        let inner = self.inner.lock().await;
        StoreFlags {
            initial_loading: !inner.first_batch_seen,
            fetching_more: inner.first_batch_seen && !inner.ingest_done,
        }
    }

    /// Subscribes to change notifications.
    ///
    /// The watched value is a version counter bumped on every mutation;
    /// consumers regroup and reconcile ordering when it changes.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version_tx.subscribe()
    }

    fn bump_version(&self) {
        self.version_tx.send_modify(|version| *version += 1);
    }
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::records::{sample_pr, utc};
    use crate::types::PullRequestState;

    #[tokio::test]
    async fn merge_is_idempotent_and_last_write_wins() {
        let store = RecordStore::new();
        let generation = store.current_generation().await;

        let pr = sample_pr("PR_1", "Update dependency serde to v1.0.200", "app/renovate", "acme/api", utc(2024, 3, 1));
        store.merge_batch(generation, vec![pr.clone()]).await;

        let mut updated = pr.clone();
        updated.state = PullRequestState::Merged;
        store.merge_batch(generation, vec![updated]).await;

        assert_eq!(store.len().await, 1);
        let stored = store.get("PR_1").await.unwrap();
        assert_eq!(stored.state, PullRequestState::Merged);
    }

    #[tokio::test]
    async fn stale_generation_batch_is_dropped() {
        let store = RecordStore::new();
        let stale = store.current_generation().await;

        store.merge_batch(stale, vec![sample_pr("PR_1", "t", "a", "acme/api", utc(2024, 3, 1))]).await;
        assert_eq!(store.len().await, 1);

        store.begin_generation().await;
        assert!(store.is_empty().await);

        // A batch from the cancelled run arrives late.
        let merged = store
            .merge_batch(stale, vec![sample_pr("PR_2", "t", "a", "acme/api", utc(2024, 3, 2))])
            .await;

        assert!(!merged);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn apply_update_is_noop_for_missing_id() {
        let store = RecordStore::new();
        let patch = RecordPatch::merged(utc(2024, 3, 5));

        assert!(!store.apply_update("PR_MISSING", &patch).await);

        let generation = store.current_generation().await;
        store.merge_batch(generation, vec![sample_pr("PR_1", "t", "a", "acme/api", utc(2024, 3, 1))]).await;

        assert!(store.apply_update("PR_1", &patch).await);
        let stored = store.get("PR_1").await.unwrap();
        assert_eq!(stored.state, PullRequestState::Merged);
        assert_eq!(stored.merged_at, Some(utc(2024, 3, 5)));
    }

    #[tokio::test]
    async fn flags_follow_ingestion_phases() {
        let store = RecordStore::new();
        let generation = store.current_generation().await;

        assert_eq!(
            store.flags().await,
            StoreFlags {
                initial_loading: true,
                fetching_more: false
            }
        );

        store.merge_batch(generation, vec![sample_pr("PR_1", "t", "a", "acme/api", utc(2024, 3, 1))]).await;
        assert_eq!(
            store.flags().await,
            StoreFlags {
                initial_loading: false,
                fetching_more: true
            }
        );

        store.mark_generation_done(generation).await;
        assert_eq!(
            store.flags().await,
            StoreFlags {
                initial_loading: false,
                fetching_more: false
            }
        );
    }
}
