//! Pure retrieval-scoring math.
//!
//! All functions here are pure: given the same memory, query vector, and
//! clock instant they always produce the same score.  I/O (loading
//! candidates, touching winners) stays in [`stream`][crate::stream].

use chrono::{DateTime, Utc};
use gw_core::{hours_between, Memory};

// ── Weights ──────────────────────────────────────────────────────────────────

/// Per-call weighting of the three score components.
#[derive(Copy, Clone, Debug)]
pub struct RetrievalWeights {
    pub relevance: f64,
    pub recency: f64,
    pub importance: f64,
}

impl Default for RetrievalWeights {
    /// Equal weighting — the standard retrieval profile.
    fn default() -> Self {
        Self { relevance: 1.0, recency: 1.0, importance: 1.0 }
    }
}

// ── Score ────────────────────────────────────────────────────────────────────

/// The component and combined scores for one candidate memory.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RetrievalScore {
    /// Cosine similarity to the query, 0 when either side has no usable
    /// embedding.
    pub relevance: f64,
    /// Exponential decay on hours since last access (half-life configured
    /// in simulated hours).
    pub recency: f64,
    /// Stored importance scaled into [0.1, 1.0].
    pub importance: f64,
    /// Weighted mean of the three.
    pub combined: f64,
}

/// Score one memory against an optional query embedding at instant `now`.
pub fn score_memory(
    memory: &Memory,
    query: Option<&[f32]>,
    now: DateTime<Utc>,
    half_life_hours: f64,
    weights: RetrievalWeights,
) -> RetrievalScore {
    let relevance = match (query, memory.embedding.as_deref()) {
        (Some(q), Some(m)) => cosine_similarity(q, m),
        _ => 0.0,
    };
    let recency = recency_score(memory.last_accessed, now, half_life_hours);
    let importance = memory.importance as f64 / 10.0;

    let weight_sum = weights.relevance + weights.recency + weights.importance;
    let combined = if weight_sum > 0.0 {
        (weights.relevance * relevance + weights.recency * recency + weights.importance * importance)
            / weight_sum
    } else {
        0.0
    };
    RetrievalScore { relevance, recency, importance, combined }
}

/// Cosine similarity of two vectors.  Returns 0 (never NaN) when either
/// vector has zero magnitude or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        dot += *x as f64 * *y as f64;
        norm_a += *x as f64 * *x as f64;
        norm_b += *y as f64 * *y as f64;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Exponential recency decay: `exp(−ln 2 · hours / half_life)`.
///
/// Clamped so accesses "in the future" relative to `now` (clock rewound by a
/// restore) score exactly 1.0 rather than > 1.
pub fn recency_score(last_accessed: DateTime<Utc>, now: DateTime<Utc>, half_life_hours: f64) -> f64 {
    let hours = hours_between(last_accessed, now).max(0.0);
    if half_life_hours <= 0.0 {
        return if hours == 0.0 { 1.0 } else { 0.0 };
    }
    (-(std::f64::consts::LN_2) * hours / half_life_hours).exp()
}
