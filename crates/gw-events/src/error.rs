//! Event-layer error type.

use gw_store::StoreError;
use thiserror::Error;

/// Errors surfaced by event processing and the CSV sink.
#[derive(Debug, Error)]
pub enum EventError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("event log I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("event log encode error: {0}")]
    Csv(#[from] csv::Error),
}

/// Shorthand result type for event operations.
pub type EventResult<T> = Result<T, EventError>;
