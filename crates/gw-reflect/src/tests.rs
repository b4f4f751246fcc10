//! Tests for gw-reflect.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use gw_core::*;
use gw_lm::{CompletionTask, ScriptedLm};
use gw_memory::MemoryStream;
use gw_store::{MemStore, Store};
use serde_json::json;

use crate::ReflectionEngine;

// ── Helpers ───────────────────────────────────────────────────────────────────

const DIM: usize = 4;

fn sim_t(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap() + Duration::seconds(secs)
}

struct Env {
    engine: ReflectionEngine,
    stream: MemoryStream,
    store: Arc<MemStore>,
    lm: Arc<ScriptedLm>,
    agent: Agent,
}

fn env() -> Env {
    let store = Arc::new(MemStore::new());
    let lm = Arc::new(ScriptedLm::new(DIM));
    let cfg = Arc::new(RuntimeConfig { embed_dim: DIM, ..RuntimeConfig::default() });
    let agent = Agent::new(WorldId::new(), "Ada", Position::new(0.0, 0.0, "park"));
    let stream = MemoryStream::new(store.clone(), lm.clone(), cfg.clone());
    let engine = ReflectionEngine::new(stream.clone(), lm.clone(), cfg);
    Env { engine, stream, store, lm, agent }
}

impl Env {
    /// Add `count` observations of `importance`, newest at offset 0, with
    /// identical embeddings so retrieval ranks them purely by recency.
    async fn seed_observations(&self, count: usize, importance: u8) -> Vec<MemoryId> {
        let mut ids = Vec::new();
        for i in 0..count {
            let content = format!("obs {i}");
            self.lm.set_embedding(content.clone(), vec![0.0, 1.0, 0.0, 0.0]);
            let mut draft = MemoryDraft::observation(self.agent.world_id, content);
            draft.importance = Some(importance);
            let memory = self
                .stream
                .add_memory(&self.agent, draft, sim_t(-(i as i64) * 60))
                .await
                .unwrap();
            ids.push(memory.id);
        }
        ids
    }

    fn script_questions(&self, questions: &[&str]) {
        for q in questions {
            self.lm.set_embedding(*q, vec![1.0, 0.0, 0.0, 0.0]);
        }
        self.lm.push_completion(
            CompletionTask::Reflection,
            Ok(json!({ "questions": questions })),
        );
    }

    fn script_insight(&self, insight: &str, evidence: &[MemoryId], importance: i64) {
        self.lm.push_completion(
            CompletionTask::Reflection,
            Ok(json!({
                "insight": insight,
                "evidence": evidence.iter().map(|id| id.to_string()).collect::<Vec<_>>(),
                "importance": importance,
            })),
        );
    }
}

// ── Trigger ───────────────────────────────────────────────────────────────────

mod trigger_tests {
    use super::*;

    #[tokio::test]
    async fn sum_at_threshold_does_not_fire() {
        let env = env();
        // 15 × 10 = 150: the trigger demands strictly more.
        env.seed_observations(15, 10).await;
        let created = env.engine.maybe_reflect(&env.agent, sim_t(0)).await.unwrap();
        assert!(created.is_empty());
        assert!(env.lm.completion_calls().is_empty());
    }

    #[tokio::test]
    async fn fires_and_mints_a_reflection_with_evidence() {
        let env = env();
        // 20 × 8 = 160 > 150.
        let ids = env.seed_observations(20, 8).await;
        env.script_questions(&["who do I trust?"]);
        env.script_insight("I rely on my neighbours", &ids[0..3], 7);

        let created = env.engine.maybe_reflect(&env.agent, sim_t(0)).await.unwrap();
        assert_eq!(created.len(), 1);
        let reflection = &created[0];
        assert_eq!(reflection.kind, MemoryKind::Reflection);
        assert_eq!(reflection.importance, 7);
        assert!(!reflection.related.is_empty());
        assert!(reflection.related.iter().all(|id| ids.contains(id)));
        // Durable, not just returned.
        assert!(env.store.get_memory(reflection.id).await.is_ok());
    }

    #[tokio::test]
    async fn reflected_observations_stop_rearming_the_trigger() {
        let env = env();
        let ids = env.seed_observations(20, 8).await;
        env.script_questions(&["what changed?"]);
        env.script_insight("everything is new", &ids[0..2], 6);
        let first = env.engine.maybe_reflect(&env.agent, sim_t(0)).await.unwrap();
        assert_eq!(first.len(), 1);

        // Same memory set, later instant: the floor moved, nothing fires.
        let again = env.engine.maybe_reflect(&env.agent, sim_t(60)).await.unwrap();
        assert!(again.is_empty());
    }
}

// ── Synthesis details ─────────────────────────────────────────────────────────

mod synthesis_tests {
    use super::*;

    #[tokio::test]
    async fn self_reported_importance_is_clamped() {
        let env = env();
        let ids = env.seed_observations(20, 8).await;
        env.script_questions(&["why so intense?"]);
        env.script_insight("everything is overwhelming", &ids[0..1], 42);

        let created = env.engine.maybe_reflect(&env.agent, sim_t(0)).await.unwrap();
        assert_eq!(created[0].importance, 10);
    }

    #[tokio::test]
    async fn evidence_outside_the_pool_is_discarded() {
        let env = env();
        let ids = env.seed_observations(20, 8).await;
        let bogus = MemoryId::new();
        env.script_questions(&["who was there?"]);
        env.script_insight("saw a familiar face", &[bogus, ids[0]], 5);

        let created = env.engine.maybe_reflect(&env.agent, sim_t(0)).await.unwrap();
        assert_eq!(created[0].related, vec![ids[0]]);
    }

    #[tokio::test]
    async fn entirely_fabricated_evidence_skips_the_question() {
        let env = env();
        env.seed_observations(20, 8).await;
        env.script_questions(&["what is real?"]);
        env.script_insight("nothing is real", &[MemoryId::new()], 5);

        let created = env.engine.maybe_reflect(&env.agent, sim_t(0)).await.unwrap();
        assert!(created.is_empty());
    }

    #[tokio::test]
    async fn second_round_runs_over_fresh_reflections() {
        let env = env();
        let ids = env.seed_observations(20, 8).await;
        // Round 1.
        env.script_questions(&["what did I learn?"]);
        env.script_insight("people help each other here", &ids[0..2], 6);
        // Round 2 questions over the minted reflection, then its insight.
        env.script_questions(&["what does that imply?"]);
        env.script_insight("this is a good place to live", &ids[2..4], 8);

        let created = env.engine.maybe_reflect(&env.agent, sim_t(0)).await.unwrap();
        assert_eq!(created.len(), 2);
        // questions + insight, twice.
        assert_eq!(env.lm.completion_calls().len(), 4);
        assert_eq!(created[1].content, "this is a good place to live");
    }
}

// ── Degradation ───────────────────────────────────────────────────────────────

mod outage_tests {
    use super::*;

    #[tokio::test]
    async fn lm_outage_aborts_silently() {
        let env = env();
        env.seed_observations(20, 8).await;
        env.lm.fail_everything();

        let created = env.engine.maybe_reflect(&env.agent, sim_t(0)).await.unwrap();
        assert!(created.is_empty());
        let memories = env.store.list_memories_by_agent(env.agent.id, None).await.unwrap();
        assert!(memories.iter().all(|m| m.kind == MemoryKind::Observation));
    }

    #[tokio::test]
    async fn unscripted_completion_reads_as_outage() {
        let env = env();
        env.seed_observations(20, 8).await;
        // No completions queued at all: question generation degrades.
        let created = env.engine.maybe_reflect(&env.agent, sim_t(0)).await.unwrap();
        assert!(created.is_empty());
    }
}
