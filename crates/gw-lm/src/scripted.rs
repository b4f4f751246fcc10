//! Test doubles for the `LanguageModel` seam.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use gw_core::WorldId;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::model::FALLBACK_IMPORTANCE;
use crate::{CompletionRequest, CompletionTask, LanguageModel, LmError, LmResult};

// ── ScriptedLm ───────────────────────────────────────────────────────────────

/// A scriptable in-process model.
///
/// - Embeddings default to a deterministic hash-derived unit vector, so
///   distinct texts get stable, mostly-dissimilar vectors; tests that need
///   controlled similarity register exact vectors with
///   [`set_embedding`][Self::set_embedding].
/// - Importance defaults to the fallback 5 unless scripted per content.
/// - Completions must be scripted per task (a drained queue reads as an
///   outage), and are shape-validated exactly like the real gateway.
pub struct ScriptedLm {
    dim: usize,
    embeddings: Mutex<FxHashMap<String, Vec<f32>>>,
    importance: Mutex<FxHashMap<String, u8>>,
    completions: Mutex<FxHashMap<CompletionTask, VecDeque<LmResult<Value>>>>,
    calls: Mutex<Vec<CompletionTask>>,
    fail: AtomicBool,
}

impl ScriptedLm {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            embeddings: Mutex::new(FxHashMap::default()),
            importance: Mutex::new(FxHashMap::default()),
            completions: Mutex::new(FxHashMap::default()),
            calls: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    /// Register an exact embedding for `text`.
    pub fn set_embedding(&self, text: impl Into<String>, vector: Vec<f32>) {
        self.embeddings.lock().insert(text.into(), vector);
    }

    /// Register an importance score for exactly-matching `content`.
    pub fn set_importance(&self, content: impl Into<String>, score: u8) {
        self.importance.lock().insert(content.into(), score);
    }

    /// Queue the next response for `task`.
    pub fn push_completion(&self, task: CompletionTask, result: LmResult<Value>) {
        self.completions.lock().entry(task).or_default().push_back(result);
    }

    /// Every subsequent operation behaves as a hard outage.
    pub fn fail_everything(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    /// End a scripted outage.
    pub fn recover(&self) {
        self.fail.store(false, Ordering::SeqCst);
    }

    /// Completion tasks invoked so far, in call order.
    pub fn completion_calls(&self) -> Vec<CompletionTask> {
        self.calls.lock().clone()
    }

    fn failing(&self) -> bool {
        self.fail.load(Ordering::SeqCst)
    }

    /// Deterministic pseudo-embedding: unit vector derived from the text.
    fn hashed_embedding(&self, text: &str) -> Vec<f32> {
        let mut state: u64 = 0xcbf2_9ce4_8422_2325;
        for b in text.bytes() {
            state ^= b as u64;
            state = state.wrapping_mul(0x1000_0000_01b3);
        }
        let mut vector: Vec<f32> = (0..self.dim)
            .map(|i| {
                let mixed = state.wrapping_mul(0x9e37_79b9_7f4a_7c15).rotate_left(i as u32 % 63);
                ((mixed >> 11) as f64 / (1u64 << 53) as f64 * 2.0 - 1.0) as f32
            })
            .collect();
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl LanguageModel for ScriptedLm {
    async fn embed(&self, _world: WorldId, text: &str) -> LmResult<Vec<f32>> {
        if self.failing() {
            return Err(LmError::Unavailable("scripted outage".into()));
        }
        if let Some(vector) = self.embeddings.lock().get(text).cloned() {
            return Ok(vector);
        }
        Ok(self.hashed_embedding(text))
    }

    async fn score_importance(&self, _world: WorldId, content: &str, _agent_context: &str) -> u8 {
        if self.failing() {
            return FALLBACK_IMPORTANCE;
        }
        self.importance
            .lock()
            .get(content)
            .copied()
            .unwrap_or(FALLBACK_IMPORTANCE)
    }

    async fn complete(&self, request: CompletionRequest) -> LmResult<Value> {
        self.calls.lock().push(request.task);
        if self.failing() {
            return Err(LmError::Unavailable("scripted outage".into()));
        }
        let next = self
            .completions
            .lock()
            .get_mut(&request.task)
            .and_then(VecDeque::pop_front);
        match next {
            None => Err(LmError::Unavailable(format!(
                "no scripted completion for {:?}",
                request.task
            ))),
            Some(Err(e)) => Err(e),
            Some(Ok(value)) => {
                request.validate(&value).map_err(LmError::BadShape)?;
                Ok(value)
            }
        }
    }
}

// ── FailingLm ────────────────────────────────────────────────────────────────

/// A model that is permanently down.  Used for outage scenarios.
pub struct FailingLm;

#[async_trait]
impl LanguageModel for FailingLm {
    async fn embed(&self, _world: WorldId, _text: &str) -> LmResult<Vec<f32>> {
        Err(LmError::Unavailable("lm permanently down".into()))
    }

    async fn score_importance(&self, _world: WorldId, _content: &str, _agent_context: &str) -> u8 {
        FALLBACK_IMPORTANCE
    }

    async fn complete(&self, _request: CompletionRequest) -> LmResult<Value> {
        Err(LmError::Unavailable("lm permanently down".into()))
    }
}
