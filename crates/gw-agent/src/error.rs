//! Cognition-cycle error type.

use gw_events::EventError;
use gw_memory::MemoryError;
use gw_plan::PlanError;
use gw_store::StoreError;
use thiserror::Error;

/// Errors surfaced by one agent's cognition cycle.
///
/// The tick driver logs these and moves on; a fatal error additionally
/// deactivates the agent.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Event(#[from] EventError),
}

impl AgentError {
    /// `true` when the owning agent should be halted (corruption).
    pub fn is_fatal(&self) -> bool {
        match self {
            AgentError::Store(e) => matches!(e, StoreError::Fatal(_)),
            AgentError::Memory(e) => e.is_fatal(),
            AgentError::Plan(PlanError::Memory(e)) => e.is_fatal(),
            AgentError::Event(EventError::Store(e)) => matches!(e, StoreError::Fatal(_)),
            AgentError::Event(_) => false,
        }
    }
}

/// Shorthand result type for cognition operations.
pub type AgentResult<T> = Result<T, AgentError>;
