//! Pool of per-scope fetch workers.
//!
//! Wraps a [`JoinSet`] so that every spawned fetch loop settles with its
//! scope attached, including on panic. The pool never fails fast: callers
//! drain it with [`ScopeWorkerPool::join_next`] and decide per outcome.

use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::error::{ErrorKind, IngestResult};
use crate::fetcher::ScopeReport;
use crate::ingest_error;

/// Pool owning the concurrent fetch tasks of one pipeline run.
#[derive(Debug, Default)]
pub struct ScopeWorkerPool {
    join_set: JoinSet<(String, IngestResult<ScopeReport>)>,
}

impl ScopeWorkerPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self {
            join_set: JoinSet::new(),
        }
    }

    /// Spawns a fetch future for `scope`.
    ///
    /// Panics inside the future are caught and settled as a
    /// [`ErrorKind::ScopeWorkerPanic`] outcome so the scope identity is
    /// never lost.
    pub fn spawn<F>(&mut self, scope: String, future: F)
    where
        F: Future<Output = IngestResult<ScopeReport>> + Send + 'static,
    {
        let guarded = AssertUnwindSafe(future).catch_unwind();

        self.join_set.spawn(async move {
            let result = match guarded.await {
                Ok(result) => result,
                Err(_panic) => {
                    error!(scope = %scope, "scope worker panicked");
                    Err(ingest_error!(
                        ErrorKind::ScopeWorkerPanic,
                        "Scope worker panicked"
                    ))
                }
            };

            (scope, result)
        });

        debug!("spawned scope worker in pool");
    }

    /// Returns the number of workers not yet settled.
    pub fn len(&self) -> usize {
        self.join_set.len()
    }

    /// Returns true when no worker is pending.
    pub fn is_empty(&self) -> bool {
        self.join_set.is_empty()
    }

    /// Waits for the next worker to settle.
    ///
    /// Returns `None` once every worker has settled. Tasks cancelled at the
    /// runtime level are skipped; their scopes were already asked to stop
    /// cooperatively.
    pub async fn join_next(&mut self) -> Option<(String, IngestResult<ScopeReport>)> {
        loop {
            match self.join_set.join_next().await? {
                Ok(settled) => return Some(settled),
                Err(join_err) if join_err.is_cancelled() => {
                    debug!("scope worker task was cancelled");
                }
                Err(join_err) => {
                    // catch_unwind already intercepts panics, so this is
                    // unreachable in practice; settle it as a panic anyway.
                    error!(error = %join_err, "scope worker failed to join");
                    return Some((
                        String::new(),
                        Err(ingest_error!(
                            ErrorKind::ScopeWorkerPanic,
                            "Scope worker failed to join"
                        )),
                    ));
                }
            }
        }
    }
}
