use crate::types::{PullRequest, ScopeProgress};

/// Event emitted by scope fetchers towards the record store feeder.
///
/// All fetchers of one pipeline multiplex their events over a single
/// channel; ordering is guaranteed per scope but unspecified across scopes,
/// which is safe because record merges are commutative.
#[derive(Debug, Clone)]
pub enum IngestEvent {
    /// A page worth of records ready to be merged.
    Batch(Vec<PullRequest>),
    /// A scope's progress changed.
    Progress(ScopeProgress),
}
