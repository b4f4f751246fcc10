//! `MemoryStream` — append, scored retrieval, and chain traversal.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use gw_core::{Agent, AgentId, Memory, MemoryDraft, MemoryId, MemoryKind, RuntimeConfig};
use gw_lm::LanguageModel;
use gw_store::Store;
use tracing::debug;

use crate::scoring::{score_memory, RetrievalScore, RetrievalWeights};
use crate::{MemoryError, MemoryResult};

/// A memory paired with the scores that ranked it.
#[derive(Clone, Debug)]
pub struct ScoredMemory {
    pub memory: Memory,
    pub score: RetrievalScore,
}

/// Typed access to one world's agents' memory streams.
///
/// Cheap to clone; all clones share the store, gateway, and configuration.
#[derive(Clone)]
pub struct MemoryStream {
    store: Arc<dyn Store>,
    lm: Arc<dyn LanguageModel>,
    cfg: Arc<RuntimeConfig>,
}

impl MemoryStream {
    pub fn new(store: Arc<dyn Store>, lm: Arc<dyn LanguageModel>, cfg: Arc<RuntimeConfig>) -> Self {
        Self { store, lm, cfg }
    }

    // ── Append ────────────────────────────────────────────────────────────

    /// Append a memory for `agent` at simulated instant `now`.
    ///
    /// Fills what the draft omits: importance comes from the gateway
    /// (fallback 5), the embedding is requested and simply absent when the
    /// gateway cannot produce one — an un-embedded memory still participates
    /// in retrieval through recency and importance.
    ///
    /// The reflection trigger is *not* evaluated here; the agent loop kicks
    /// it asynchronously so appends never wait on reflection.
    pub async fn add_memory(
        &self,
        agent: &Agent,
        draft: MemoryDraft,
        now: DateTime<Utc>,
    ) -> MemoryResult<Memory> {
        let importance = match draft.importance {
            // 0 is "unset" by contract, same as omitting the field.
            None | Some(0) => {
                self.lm
                    .score_importance(draft.world_id, &draft.content, &agent.context_line())
                    .await
            }
            Some(given) => given.clamp(1, 10),
        };

        let embedding = match self.lm.embed(draft.world_id, &draft.content).await {
            Ok(vector) => Some(vector),
            Err(e) => {
                debug!(agent = %agent.id, error = %e, "embedding unavailable, storing without");
                None
            }
        };

        let memory = Memory {
            id: MemoryId::new(),
            agent_id: agent.id,
            world_id: draft.world_id,
            kind: draft.kind,
            content: draft.content,
            timestamp: now,
            last_accessed: now,
            importance,
            related: draft.related,
            embedding,
            tags: draft.tags,
            version: 0,
        };
        Ok(self.store.put_memory(&memory).await?)
    }

    // ── Retrieval ─────────────────────────────────────────────────────────

    /// Top-`limit` memories for `agent_id` ranked against `query`.
    ///
    /// Winners' `last_accessed` is set to `now` both in the store and in the
    /// returned records.  See [`retrieve_scored`][Self::retrieve_scored]
    /// when the caller wants the scores too.
    pub async fn retrieve_relevant(
        &self,
        agent_id: AgentId,
        query: &str,
        limit: usize,
        weights: Option<RetrievalWeights>,
        now: DateTime<Utc>,
    ) -> MemoryResult<Vec<Memory>> {
        let scored = self.retrieve_scored(agent_id, query, limit, weights, now).await?;
        Ok(scored.into_iter().map(|s| s.memory).collect())
    }

    /// As [`retrieve_relevant`][Self::retrieve_relevant], returning scores.
    pub async fn retrieve_scored(
        &self,
        agent_id: AgentId,
        query: &str,
        limit: usize,
        weights: Option<RetrievalWeights>,
        now: DateTime<Utc>,
    ) -> MemoryResult<Vec<ScoredMemory>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let weights = weights.unwrap_or_default();

        let candidates = self
            .store
            .list_memories_by_agent(agent_id, Some(self.cfg.retrieval_window))
            .await?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let world = candidates[0].world_id;

        // A failed query embedding degrades relevance to 0 across the board;
        // recency and importance still produce a useful ranking.
        let query_embedding = match self.lm.embed(world, query).await {
            Ok(vector) => Some(vector),
            Err(e) => {
                debug!(agent = %agent_id, error = %e, "query embedding failed, relevance = 0");
                None
            }
        };

        // Corrupt embeddings halt the agent rather than rank garbage.
        let want = self.cfg.embed_dim;
        for memory in &candidates {
            if let Some(ref embedding) = memory.embedding {
                if embedding.len() != want {
                    return Err(MemoryError::CorruptEmbedding {
                        id: memory.id,
                        got: embedding.len(),
                        want,
                    });
                }
            }
        }

        let mut scored = self.score_candidates(candidates, query_embedding.as_deref(), now, weights);

        // Descending by combined; ties to the newer memory, then the
        // lexicographically smaller id.
        scored.sort_by(|a, b| {
            b.score
                .combined
                .total_cmp(&a.score.combined)
                .then_with(|| b.memory.timestamp.cmp(&a.memory.timestamp))
                .then_with(|| a.memory.id.cmp(&b.memory.id))
        });
        scored.truncate(limit);

        for entry in &mut scored {
            self.store.touch_memory(entry.memory.id, now).await?;
            entry.memory.last_accessed = now;
        }
        Ok(scored)
    }

    /// Score all candidates; on the `parallel` feature this fans out over
    /// Rayon.  Pure CPU work either way.
    fn score_candidates(
        &self,
        candidates: Vec<Memory>,
        query: Option<&[f32]>,
        now: DateTime<Utc>,
        weights: RetrievalWeights,
    ) -> Vec<ScoredMemory> {
        let half_life = self.cfg.recency_half_life_hours;

        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            candidates
                .into_par_iter()
                .map(|memory| {
                    let score = score_memory(&memory, query, now, half_life, weights);
                    ScoredMemory { memory, score }
                })
                .collect()
        }

        #[cfg(not(feature = "parallel"))]
        {
            candidates
                .into_iter()
                .map(|memory| {
                    let score = score_memory(&memory, query, now, half_life, weights);
                    ScoredMemory { memory, score }
                })
                .collect()
        }
    }

    // ── Chain traversal ───────────────────────────────────────────────────

    /// Depth-bounded DFS over `related`, cycle-safe, in discovery order.
    ///
    /// `max_hops` counts edges from `start`: 0 returns just the start
    /// memory.  Evidence that has since been deleted is skipped silently.
    pub async fn chain(&self, start: MemoryId, max_hops: usize) -> MemoryResult<Vec<Memory>> {
        let mut visited: HashSet<MemoryId> = HashSet::new();
        let mut discovered = Vec::new();
        // Stack of (id, hops-from-start); children pushed in reverse so the
        // first-listed evidence is explored first.
        let mut stack = vec![(start, 0usize)];

        while let Some((id, hops)) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let memory = match self.store.get_memory(id).await {
                Ok(memory) => memory,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e.into()),
            };
            if hops < max_hops {
                for &related in memory.related.iter().rev() {
                    if !visited.contains(&related) {
                        stack.push((related, hops + 1));
                    }
                }
            }
            discovered.push(memory);
        }
        Ok(discovered)
    }

    // ── Reflection support ────────────────────────────────────────────────

    /// Sum of observation importances within the trailing window — the
    /// reflection trigger input.
    ///
    /// `since` raises the window floor further (the reflection engine passes
    /// the last reflection instant so already-reflected observations stop
    /// re-arming the trigger).
    pub async fn observation_importance_sum(
        &self,
        agent_id: AgentId,
        now: DateTime<Utc>,
        since: Option<DateTime<Utc>>,
    ) -> MemoryResult<u32> {
        let mut floor = now
            - chrono::Duration::milliseconds((self.cfg.reflection_window_hours * 3_600_000.0) as i64);
        if let Some(since) = since {
            floor = floor.max(since);
        }
        let memories = self.store.list_memories_by_agent(agent_id, None).await?;
        Ok(memories
            .iter()
            .filter(|m| m.kind == MemoryKind::Observation && m.timestamp > floor)
            .map(|m| m.importance as u32)
            .sum())
    }

    /// Newest `limit` observations — the reflection corpus.
    pub async fn recent_observations(
        &self,
        agent_id: AgentId,
        limit: usize,
    ) -> MemoryResult<Vec<Memory>> {
        let memories = self.store.list_memories_by_agent(agent_id, None).await?;
        Ok(memories
            .into_iter()
            .filter(|m| m.kind == MemoryKind::Observation)
            .take(limit)
            .collect())
    }
}
