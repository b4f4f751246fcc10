//! World-runtime error type.

use gw_agent::AgentError;
use gw_core::{WorldId, WorldStatus};
use gw_events::EventError;
use gw_store::StoreError;
use thiserror::Error;

/// Errors surfaced by world lifecycle and scheduling operations.
#[derive(Debug, Error)]
pub enum WorldError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error(transparent)]
    Event(#[from] EventError),

    /// The requested lifecycle transition is not part of
    /// `Stopped → Running ⇄ Paused → Stopped`.
    #[error("world {world} cannot go from {from:?} via {op}")]
    InvalidTransition {
        world: WorldId,
        from: WorldStatus,
        op: &'static str,
    },

    /// Malformed request (speed ≤ 0, agent cap exceeded, …).
    #[error("validation error: {0}")]
    Validation(String),

    /// Snapshot payload could not be encoded or decoded.
    #[error("snapshot codec error: {0}")]
    SnapshotCodec(String),
}

impl WorldError {
    /// `true` when the error maps to HTTP 404.
    pub fn is_not_found(&self) -> bool {
        match self {
            WorldError::Store(e) => e.is_not_found(),
            WorldError::Agent(AgentError::Store(e)) => e.is_not_found(),
            _ => false,
        }
    }
}

/// Shorthand result type for world operations.
pub type WorldResult<T> = Result<T, WorldError>;
