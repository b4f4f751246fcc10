//! The `Memory` record — one entry in an agent's memory stream.

use chrono::{DateTime, Utc};

use crate::{AgentId, MemoryId, WorldId};

// ── MemoryKind ───────────────────────────────────────────────────────────────

/// Discriminator for the memory variants.
///
/// Serialized as the lowercase `kind` field.  Every consumer matches
/// exhaustively — adding a variant is a compile-visible change across the
/// workspace.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    /// Something the agent perceived directly.
    Observation,
    /// An insight synthesized from other memories; `related` is its evidence.
    Reflection,
    /// A planning artifact recorded for later recall.
    Plan,
}

// ── Memory ───────────────────────────────────────────────────────────────────

/// One memory.
///
/// Invariants (enforced at construction and by the store):
/// - `last_accessed >= timestamp`,
/// - `importance ∈ [1, 10]` and is immutable after creation,
/// - a `Reflection` carries a non-empty `related` evidence set,
/// - `embedding`, when present, has exactly the configured dimension.
///
/// Both `timestamp` and `last_accessed` are *simulated* time: recency decay
/// follows the world's clock, not the host's.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Memory {
    pub id: MemoryId,
    pub agent_id: AgentId,
    pub world_id: WorldId,
    pub kind: MemoryKind,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub importance: u8,
    /// Related memories — for reflections, the evidence chain.
    #[serde(default)]
    pub related: Vec<MemoryId>,
    /// Embedding vector of the configured dimension, absent when the LM
    /// gateway could not produce one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Optimistic-concurrency version; bumped by the store on every write.
    pub version: u64,
}

// ── MemoryDraft ──────────────────────────────────────────────────────────────

/// Caller-supplied fields for a memory append.
///
/// `importance` and the embedding are filled by the memory stream (via the
/// LM gateway) when omitted.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct MemoryDraft {
    pub kind: MemoryKind,
    pub content: String,
    pub world_id: WorldId,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<u8>,
    #[serde(default)]
    pub related: Vec<MemoryId>,
}

impl MemoryDraft {
    /// An observation draft — the common case on the perceive path.
    pub fn observation(world_id: WorldId, content: impl Into<String>) -> Self {
        Self {
            kind: MemoryKind::Observation,
            content: content.into(),
            world_id,
            tags: Vec::new(),
            importance: None,
            related: Vec::new(),
        }
    }
}
