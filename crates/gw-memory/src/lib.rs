//! `gw-memory` — the memory stream.
//!
//! Every agent owns an append-only stream of memories.  This crate provides:
//!
//! | Module      | Contents                                               |
//! |-------------|--------------------------------------------------------|
//! | [`scoring`] | Pure scoring math: cosine relevance, recency decay, weighted combination |
//! | [`stream`]  | `MemoryStream`: append, scored retrieval, chain traversal |
//! | [`error`]   | `MemoryError`, `MemoryResult`                          |
//!
//! Retrieval ranks by a weighted mean of relevance × recency × importance
//! (default weights 1/1/1) and touches the winners' `last_accessed`.  All
//! decay arithmetic runs on *simulated* time — callers pass the world's
//! current instant.
//!
//! With the `parallel` feature the candidate-scoring pass runs on Rayon;
//! scoring is pure CPU work, so this changes throughput, never results.

pub mod error;
pub mod scoring;
pub mod stream;


pub use error::{MemoryError, MemoryResult};
pub use scoring::{cosine_similarity, recency_score, RetrievalScore, RetrievalWeights};
pub use stream::MemoryStream;
