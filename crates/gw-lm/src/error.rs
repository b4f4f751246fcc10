//! Gateway error type.
//!
//! `LmError` is `Clone` because one in-flight call may fan its result out to
//! many single-flight waiters.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by [`LanguageModel`][crate::LanguageModel] operations.
#[derive(Debug, Clone, Error)]
pub enum LmError {
    /// One attempt failed at the transport level; retried internally.
    /// Surfaces only when wrapped into [`LmError::Unavailable`].
    #[error("lm transport failure: {0}")]
    Transport(String),

    /// The per-call deadline elapsed.
    #[error("lm call timed out after {0:?}")]
    Timeout(Duration),

    /// The service answered, but not in the shape the caller demanded.
    #[error("lm response shape invalid: {0}")]
    BadShape(String),

    /// All attempts exhausted.  Callers degrade to their fallback.
    #[error("lm service unavailable: {0}")]
    Unavailable(String),

    /// The in-flight call was abandoned before producing a result.
    #[error("lm call cancelled")]
    Cancelled,
}

impl LmError {
    /// `true` when the caller should switch to its degraded fallback
    /// (default plan, skipped reflection, …) rather than propagate.
    pub fn is_degraded(&self) -> bool {
        matches!(
            self,
            LmError::Unavailable(_) | LmError::Timeout(_) | LmError::Cancelled
        )
    }
}

/// Shorthand result type for gateway operations.
pub type LmResult<T> = Result<T, LmError>;
