//! Memory-stream error type.

use gw_core::MemoryId;
use gw_store::StoreError;
use thiserror::Error;

/// Errors surfaced by [`MemoryStream`][crate::MemoryStream] operations.
///
/// LM failures never appear here: the stream degrades (fallback importance,
/// missing embedding, relevance 0) instead of failing the operation.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A stored embedding does not match the configured dimension.  This is
    /// corruption: the owning agent is halted rather than scored nonsense.
    #[error("memory {id} embedding has dimension {got}, expected {want}")]
    CorruptEmbedding { id: MemoryId, got: usize, want: usize },
}

impl MemoryError {
    /// `true` for errors that should halt the owning agent.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MemoryError::CorruptEmbedding { .. } | MemoryError::Store(StoreError::Fatal(_))
        )
    }
}

/// Shorthand result type for memory-stream operations.
pub type MemoryResult<T> = Result<T, MemoryError>;
