//! Planner error type.

use gw_memory::MemoryError;
use thiserror::Error;

/// Errors surfaced by the planning engine.
///
/// LM unavailability is not an error here — generators fall back to default
/// plans.  What remains is persistence failure underneath memory grounding.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error(transparent)]
    Memory(#[from] MemoryError),
}

/// Shorthand result type for planner operations.
pub type PlanResult<T> = Result<T, PlanError>;
