//! `gw-lm` — the language-model gateway client.
//!
//! Cognition components (memory, reflection, planning, dialogue) speak to
//! the external LM service only through the [`LanguageModel`] trait:
//!
//! | Operation          | Contract                                            |
//! |--------------------|-----------------------------------------------------|
//! | `embed`            | text → fixed-dimension vector; deterministic, cached |
//! | `score_importance` | text → integer in [1, 10]; infallible (fallback 5)  |
//! | `complete`         | task + variables → shape-validated JSON             |
//!
//! [`HttpGateway`] is the production implementation: bounded retries with
//! exponential backoff and jitter, a per-call deadline, a single-flight
//! cache that coalesces concurrent identical requests, and global plus
//! per-world concurrency caps so one busy world cannot starve the rest.
//!
//! [`ScriptedLm`] and [`FailingLm`] are the in-tree test doubles.

pub mod error;
pub mod gateway;
pub mod model;
pub mod scripted;
pub mod singleflight;

#[cfg(test)]
mod tests;

pub use error::{LmError, LmResult};
pub use gateway::HttpGateway;
pub use model::{CompletionRequest, CompletionTask, JsonKind, LanguageModel, FALLBACK_IMPORTANCE};
pub use scripted::{FailingLm, ScriptedLm};
