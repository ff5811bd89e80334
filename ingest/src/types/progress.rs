use crate::error::IngestError;

/// Progress of one scope's fetch loop.
///
/// `done` transitions from false to true exactly once and is terminal; a
/// scope that failed carries its terminal error alongside `done = true`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeProgress {
    /// The opaque scope being fetched.
    pub scope: String,
    /// Records delivered so far for this scope.
    pub fetched: u64,
    /// Whether the scope finished, successfully or not.
    pub done: bool,
    /// Terminal error, when the scope failed.
    pub error: Option<IngestError>,
}

impl ScopeProgress {
    /// Creates the initial progress for a scope.
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            fetched: 0,
            done: false,
            error: None,
        }
    }

    /// Returns true when the scope ended in a terminal error.
    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}
