//! The reflection trigger and synthesis pass.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use gw_core::{Agent, AgentId, Memory, MemoryDraft, MemoryId, MemoryKind, RuntimeConfig};
use gw_lm::{CompletionRequest, CompletionTask, JsonKind, LanguageModel};
use gw_memory::{MemoryResult, MemoryStream};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::{json, Value};
use tracing::debug;

/// Observations pulled as the question-generation corpus.
const CORPUS_LIMIT: usize = 100;
/// Questions kept per pass.
const MAX_QUESTIONS: usize = 5;
/// Supporting memories retrieved per question.
const EVIDENCE_LIMIT: usize = 15;
/// Synthesis rounds: the first over observations, one recursion over the
/// freshly minted reflections.
const MAX_DEPTH: usize = 2;

const QUESTIONS_SHAPE: &[(&str, JsonKind)] = &[("questions", JsonKind::Array)];
const INSIGHT_SHAPE: &[(&str, JsonKind)] = &[
    ("insight", JsonKind::String),
    ("evidence", JsonKind::Array),
    ("importance", JsonKind::Number),
];

// ── ReflectionEngine ─────────────────────────────────────────────────────────

/// Per-process reflection coordinator.
///
/// Cheap to clone; clones share the in-flight guard, so at most one
/// reflection runs per agent at any time regardless of which clone fired.
#[derive(Clone)]
pub struct ReflectionEngine {
    stream: MemoryStream,
    lm: Arc<dyn LanguageModel>,
    cfg: Arc<RuntimeConfig>,
    state: Arc<Mutex<ReflectState>>,
}

#[derive(Default)]
struct ReflectState {
    in_flight: FxHashSet<AgentId>,
    /// Last successful reflection per agent — observations older than this
    /// no longer re-arm the trigger.
    last_reflected: FxHashMap<AgentId, DateTime<Utc>>,
}

/// Removes the agent from the in-flight set even when the pass is cancelled
/// mid-await.
struct FlightGuard {
    state: Arc<Mutex<ReflectState>>,
    agent: AgentId,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.state.lock().in_flight.remove(&self.agent);
    }
}

impl ReflectionEngine {
    pub fn new(
        stream: MemoryStream,
        lm: Arc<dyn LanguageModel>,
        cfg: Arc<RuntimeConfig>,
    ) -> Self {
        Self { stream, lm, cfg, state: Arc::new(Mutex::new(ReflectState::default())) }
    }

    /// Evaluate the trigger for `agent` and run a reflection pass if it
    /// fires.  Returns the reflections created (empty when the trigger did
    /// not fire or the LM was unavailable).
    ///
    /// Trigger: windowed observation-importance sum strictly above the
    /// configured threshold, and no pass already in flight for this agent.
    pub async fn maybe_reflect(
        &self,
        agent: &Agent,
        now: DateTime<Utc>,
    ) -> MemoryResult<Vec<Memory>> {
        let since = self.state.lock().last_reflected.get(&agent.id).copied();
        let sum = self.stream.observation_importance_sum(agent.id, now, since).await?;
        if sum <= self.cfg.reflection_threshold {
            return Ok(Vec::new());
        }

        let _guard = {
            let mut state = self.state.lock();
            if !state.in_flight.insert(agent.id) {
                return Ok(Vec::new());
            }
            FlightGuard { state: Arc::clone(&self.state), agent: agent.id }
        };

        debug!(agent = %agent.id, sum, "reflection trigger fired");
        let mut created = Vec::new();

        // Round 1 over recent observations; round 2 over round 1's output.
        let corpus = self.stream.recent_observations(agent.id, CORPUS_LIMIT).await?;
        let mut round_input = corpus;
        for _depth in 0..MAX_DEPTH {
            if round_input.is_empty() {
                break;
            }
            let minted = self.reflect_round(agent, &round_input, now).await?;
            if minted.is_empty() {
                break;
            }
            created.extend(minted.iter().cloned());
            round_input = minted;
        }

        if !created.is_empty() {
            self.state.lock().last_reflected.insert(agent.id, now);
        }
        Ok(created)
    }

    /// One question → evidence → insight round over `corpus`.
    ///
    /// LM failures abort the round silently and return what was minted so
    /// far; store failures propagate.
    async fn reflect_round(
        &self,
        agent: &Agent,
        corpus: &[Memory],
        now: DateTime<Utc>,
    ) -> MemoryResult<Vec<Memory>> {
        let questions = match self.salient_questions(agent, corpus).await {
            Some(questions) => questions,
            None => return Ok(Vec::new()),
        };

        let mut minted = Vec::new();
        for question in questions {
            let evidence_pool = self
                .stream
                .retrieve_relevant(agent.id, &question, EVIDENCE_LIMIT, None, now)
                .await?;
            if evidence_pool.is_empty() {
                continue;
            }
            match self.synthesize(agent, &question, &evidence_pool).await {
                None => {
                    // LM gave up mid-pass; stop asking further questions.
                    debug!(agent = %agent.id, "reflection aborted mid-synthesis");
                    break;
                }
                Some((insight, evidence, importance)) => {
                    if evidence.is_empty() {
                        continue;
                    }
                    let draft = MemoryDraft {
                        kind: MemoryKind::Reflection,
                        content: insight,
                        world_id: agent.world_id,
                        tags: vec!["reflection".into()],
                        importance: Some(importance),
                        related: evidence,
                    };
                    minted.push(self.stream.add_memory(agent, draft, now).await?);
                }
            }
        }
        Ok(minted)
    }

    /// Ask for the 3–5 salient questions `corpus` raises.  `None` = LM down.
    async fn salient_questions(&self, agent: &Agent, corpus: &[Memory]) -> Option<Vec<String>> {
        let vars = json!({
            "mode": "questions",
            "agent": agent.context_line(),
            "persona": agent.persona,
            "statements": corpus.iter().map(|m| m.content.as_str()).collect::<Vec<_>>(),
        });
        let request = CompletionRequest::new(CompletionTask::Reflection, agent.world_id, vars)
            .expecting(QUESTIONS_SHAPE);
        let value = match self.lm.complete(request).await {
            Ok(value) => value,
            Err(e) => {
                debug!(agent = %agent.id, error = %e, "salient-question generation failed");
                return None;
            }
        };
        let questions: Vec<String> = value["questions"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .filter(|q| !q.trim().is_empty())
            .take(MAX_QUESTIONS)
            .map(str::to_owned)
            .collect();
        if questions.is_empty() { None } else { Some(questions) }
    }

    /// Synthesize one insight for `question` grounded in `evidence_pool`.
    ///
    /// The model reports which evidence ids it actually used; anything
    /// outside the supplied pool is discarded.  `None` = LM down.
    async fn synthesize(
        &self,
        agent: &Agent,
        question: &str,
        evidence_pool: &[Memory],
    ) -> Option<(String, Vec<MemoryId>, u8)> {
        let vars = json!({
            "mode": "insight",
            "agent": agent.context_line(),
            "question": question,
            "evidence": evidence_pool
                .iter()
                .map(|m| json!({ "id": m.id.to_string(), "content": m.content }))
                .collect::<Vec<_>>(),
        });
        let request = CompletionRequest::new(CompletionTask::Reflection, agent.world_id, vars)
            .expecting(INSIGHT_SHAPE);
        let value = match self.lm.complete(request).await {
            Ok(value) => value,
            Err(e) => {
                debug!(agent = %agent.id, error = %e, "insight synthesis failed");
                return None;
            }
        };

        let pool: FxHashSet<MemoryId> = evidence_pool.iter().map(|m| m.id).collect();
        let evidence: Vec<MemoryId> = value["evidence"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .filter_map(|raw| MemoryId::from_str(raw).ok())
            .filter(|id| pool.contains(id))
            .collect();
        let insight = value["insight"].as_str().unwrap_or_default().trim().to_owned();
        if insight.is_empty() {
            return None;
        }
        let importance = value["importance"]
            .as_f64()
            .map_or(gw_lm::FALLBACK_IMPORTANCE, |raw| (raw.round() as i64).clamp(1, 10) as u8);
        Some((insight, evidence, importance))
    }
}
