//! Store error taxonomy.

use gw_core::{AgentId, MemoryId, SnapshotId, WorldId};
use thiserror::Error;

/// Errors surfaced by every [`Store`][crate::Store] backend.
///
/// The taxonomy matters more than the variants: callers branch on
/// [`is_retryable`][StoreError::is_retryable], not on specific entities.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("world {0} not found")]
    WorldNotFound(WorldId),

    #[error("agent {0} not found")]
    AgentNotFound(AgentId),

    #[error("memory {0} not found")]
    MemoryNotFound(MemoryId),

    #[error("snapshot {0} not found")]
    SnapshotNotFound(SnapshotId),

    #[error("blob {0:?} not found")]
    BlobNotFound(String),

    /// Optimistic-concurrency mismatch: refetch and retry.
    #[error("version conflict on {entity} {id}: submitted {submitted}, stored {stored}")]
    Conflict {
        entity: &'static str,
        id: String,
        submitted: u64,
        stored: u64,
    },

    /// Malformed input (importance out of range, empty evidence, …).
    #[error("validation error: {0}")]
    Validation(String),

    /// I/O-level failure worth retrying as-is.
    #[error("transient store failure: {0}")]
    Transient(String),

    /// Unrecoverable corruption.  Halts the affected agent; never retried.
    #[error("store corruption: {0}")]
    Fatal(String),
}

impl StoreError {
    /// `true` if the caller may retry (after a refetch for `Conflict`).
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict { .. } | StoreError::Transient(_))
    }

    /// `true` for any of the not-found variants.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::WorldNotFound(_)
                | StoreError::AgentNotFound(_)
                | StoreError::MemoryNotFound(_)
                | StoreError::SnapshotNotFound(_)
                | StoreError::BlobNotFound(_)
        )
    }
}

/// Shorthand result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
