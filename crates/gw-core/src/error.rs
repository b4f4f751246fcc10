//! Shared error base.
//!
//! Sub-crates define their own error enums (store, LM, planner, …) and wrap
//! or convert `GwError` as needed.  Keeping the base small forces the
//! interesting taxonomy — transient vs permanent, retryable vs not — down
//! into the crates that actually know.

use thiserror::Error;

/// Errors native to `gw-core`: configuration and entity validation.
#[derive(Debug, Error)]
pub enum GwError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Shorthand result type for `gw-core`.
pub type GwResult<T> = Result<T, GwError>;
