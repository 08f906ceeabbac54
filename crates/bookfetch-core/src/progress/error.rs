//! Progress store errors.

use std::path::PathBuf;

/// Failure of a `ProgressStore` mutation.
///
/// `ItemNotFound` and `CandidateNotFound` are benign races (a late watcher
/// after a fresh search cleared the item); callers log and continue.
/// `Persist` means the in-memory change was applied but the flush to disk failed.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("item not found: {0}")]
    ItemNotFound(String),

    #[error("candidate {candidate} not found in item {item}")]
    CandidateNotFound { item: String, candidate: String },

    #[error("failed to persist progress document to {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    /// True for the lookup races that must never abort a run.
    pub fn is_benign(&self) -> bool {
        matches!(self, StoreError::ItemNotFound(_) | StoreError::CandidateNotFound { .. })
    }
}
