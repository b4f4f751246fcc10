//! `HttpGateway` — the production `LanguageModel` implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use gw_core::{RuntimeConfig, WorldId};
use rand::Rng;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;
use tracing::debug;

use crate::model::FALLBACK_IMPORTANCE;
use crate::singleflight::{FlightKey, SingleFlight};
use crate::{CompletionRequest, LanguageModel, LmError, LmResult};

/// First retry delay; doubles per attempt, plus up to 100 ms of jitter.
const BASE_BACKOFF: Duration = Duration::from_millis(200);

// ── Gateway ──────────────────────────────────────────────────────────────────

struct GatewayInner {
    client: reqwest::Client,
    base_url: String,
    attempts: u32,
    deadline: Duration,
    embed_dim: usize,
    /// Concurrency budget across all worlds.
    global: Arc<Semaphore>,
    /// Per-world budgets, created lazily on first use.
    per_world: DashMap<WorldId, Arc<Semaphore>>,
    world_cap: usize,
}

impl GatewayInner {
    fn world_semaphore(&self, world: WorldId) -> Arc<Semaphore> {
        self.per_world
            .entry(world)
            .or_insert_with(|| Arc::new(Semaphore::new(self.world_cap)))
            .clone()
    }
}

/// HTTP client for the external LM service.
///
/// Cheap to clone; all clones share the caches and concurrency budgets.
#[derive(Clone)]
pub struct HttpGateway {
    inner: Arc<GatewayInner>,
    embeds: Arc<SingleFlight<Vec<f32>>>,
    scores: Arc<SingleFlight<u8>>,
    completions: Arc<SingleFlight<Value>>,
}

impl HttpGateway {
    pub fn new(cfg: &RuntimeConfig) -> Self {
        Self {
            inner: Arc::new(GatewayInner {
                client: reqwest::Client::new(),
                base_url: cfg.lm_service_url.trim_end_matches('/').to_owned(),
                attempts: cfg.lm_attempts.max(1),
                deadline: cfg.lm_deadline,
                embed_dim: cfg.embed_dim,
                global: Arc::new(Semaphore::new(cfg.lm_global_cap)),
                per_world: DashMap::new(),
                world_cap: cfg.lm_world_cap,
            }),
            embeds: Arc::new(SingleFlight::new(cfg.lm_cache_cap)),
            // Scores and completions are coalesced but never cached.
            scores: Arc::new(SingleFlight::new(0)),
            completions: Arc::new(SingleFlight::new(0)),
        }
    }
}

// ── The shared call path ─────────────────────────────────────────────────────

/// POST `body` to `path` with retries, under the caller's world budget.
///
/// Runs as the body of a single-flight task, so it owns everything it
/// touches.  The per-call deadline is applied by the caller around this
/// whole function — semaphore waits and backoff sleeps count against it.
async fn call(
    inner: Arc<GatewayInner>,
    world: WorldId,
    path: String,
    body: Value,
) -> LmResult<Value> {
    let world_sem = inner.world_semaphore(world);
    let _world_permit = world_sem
        .acquire_owned()
        .await
        .map_err(|_| LmError::Cancelled)?;
    let _global_permit = Arc::clone(&inner.global)
        .acquire_owned()
        .await
        .map_err(|_| LmError::Cancelled)?;

    let url = format!("{}/{path}", inner.base_url);
    let mut last = String::new();
    for attempt in 0..inner.attempts {
        if attempt > 0 {
            let jitter = rand::thread_rng().gen_range(0..100);
            let backoff = BASE_BACKOFF * 2u32.pow(attempt - 1) + Duration::from_millis(jitter);
            tokio::time::sleep(backoff).await;
        }
        match inner.client.post(&url).json(&body).send().await {
            Err(e) => last = e.to_string(),
            Ok(resp) if resp.status().is_server_error() => {
                last = format!("server error {}", resp.status());
            }
            Ok(resp) if !resp.status().is_success() => {
                // 4xx is our bug or a contract change — retrying won't help.
                return Err(LmError::Unavailable(format!(
                    "lm service rejected {path}: {}",
                    resp.status()
                )));
            }
            Ok(resp) => {
                return resp
                    .json::<Value>()
                    .await
                    .map_err(|e| LmError::BadShape(format!("non-JSON response: {e}")));
            }
        }
    }
    Err(LmError::Unavailable(format!(
        "{} attempts to {path} failed: {last}",
        inner.attempts
    )))
}

/// Apply the per-call deadline to a flight body.
async fn with_deadline<T>(
    deadline: Duration,
    fut: impl std::future::Future<Output = LmResult<T>>,
) -> LmResult<T> {
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(LmError::Timeout(deadline)),
    }
}

fn content_key(op: &'static str, parts: &[&str]) -> FlightKey {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    FlightKey { op, hash: hasher.finalize().into() }
}

// ── LanguageModel impl ───────────────────────────────────────────────────────

#[async_trait]
impl LanguageModel for HttpGateway {
    async fn embed(&self, world: WorldId, text: &str) -> LmResult<Vec<f32>> {
        let key = content_key("embed", &[text]);
        let inner = Arc::clone(&self.inner);
        let body = json!({ "text": text });
        let dim = inner.embed_dim;
        let deadline = inner.deadline;
        self.embeds
            .run(key, true, async move {
                let value = with_deadline(deadline, call(inner, world, "embeddings".into(), body))
                    .await?;
                let raw = value
                    .get("embedding")
                    .and_then(Value::as_array)
                    .ok_or_else(|| LmError::BadShape("missing embedding array".into()))?;
                let vector: Vec<f32> = raw
                    .iter()
                    .map(|v| v.as_f64().map(|f| f as f32))
                    .collect::<Option<_>>()
                    .ok_or_else(|| LmError::BadShape("non-numeric embedding entry".into()))?;
                if vector.len() != dim {
                    return Err(LmError::BadShape(format!(
                        "embedding dimension {} != {dim}",
                        vector.len()
                    )));
                }
                Ok(vector)
            })
            .await
    }

    async fn score_importance(&self, world: WorldId, content: &str, agent_context: &str) -> u8 {
        let key = content_key("importance", &[content, agent_context]);
        let inner = Arc::clone(&self.inner);
        let body = json!({ "content": content, "agentContext": agent_context });
        let deadline = inner.deadline;
        let scored = self
            .scores
            .run(key, false, async move {
                let value =
                    with_deadline(deadline, call(inner, world, "importance/score".into(), body))
                        .await?;
                let raw = value
                    .get("importance")
                    .and_then(Value::as_f64)
                    .ok_or_else(|| LmError::BadShape("missing importance number".into()))?;
                Ok((raw.round() as i64).clamp(1, 10) as u8)
            })
            .await;
        match scored {
            Ok(score) => score,
            Err(e) => {
                debug!(error = %e, "importance scoring failed, using fallback");
                FALLBACK_IMPORTANCE
            }
        }
    }

    async fn complete(&self, request: CompletionRequest) -> LmResult<Value> {
        let vars_text = request.vars.to_string();
        let key = content_key("complete", &[request.task.path(), &vars_text]);
        let inner = Arc::clone(&self.inner);
        let path = format!("{}/generate", request.task.path());
        let body = request.vars.clone();
        let world = request.world_id;
        let deadline = inner.deadline;
        let shaped = request.clone();
        self.completions
            .run(key, false, async move {
                let value = with_deadline(deadline, call(inner, world, path, body)).await?;
                shaped.validate(&value).map_err(LmError::BadShape)?;
                Ok(value)
            })
            .await
    }
}
