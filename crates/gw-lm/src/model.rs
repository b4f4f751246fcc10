//! The `LanguageModel` trait and completion request types.

use async_trait::async_trait;
use gw_core::WorldId;
use serde_json::Value;

use crate::LmResult;

// ── CompletionTask ───────────────────────────────────────────────────────────

/// Which generation endpoint a completion targets.  Each task has its own
/// prompt template on the service side; the client only names it.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum CompletionTask {
    Reflection,
    Planning,
    Dialogue,
    Action,
    Observation,
}

impl CompletionTask {
    /// URL path segment on the LM service.
    pub fn path(self) -> &'static str {
        match self {
            CompletionTask::Reflection => "reflection",
            CompletionTask::Planning => "planning",
            CompletionTask::Dialogue => "dialogue",
            CompletionTask::Action => "action",
            CompletionTask::Observation => "observation",
        }
    }
}

// ── Expected shape ───────────────────────────────────────────────────────────

/// JSON kinds a caller can demand of a top-level response field.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum JsonKind {
    String,
    Number,
    Array,
    Object,
    Bool,
}

impl JsonKind {
    pub fn matches(self, value: &Value) -> bool {
        match self {
            JsonKind::String => value.is_string(),
            JsonKind::Number => value.is_number(),
            JsonKind::Array => value.is_array(),
            JsonKind::Object => value.is_object(),
            JsonKind::Bool => value.is_boolean(),
        }
    }
}

// ── CompletionRequest ────────────────────────────────────────────────────────

/// One structured completion call.
///
/// `expect` lists required top-level fields and their kinds; the gateway
/// rejects responses that miss any of them with
/// [`LmError::BadShape`][crate::LmError::BadShape].
#[derive(Clone, Debug)]
pub struct CompletionRequest {
    pub task: CompletionTask,
    /// World whose concurrency budget this call spends.
    pub world_id: WorldId,
    /// Template variables forwarded verbatim to the service.
    pub vars: Value,
    /// Required top-level fields of the response.
    pub expect: &'static [(&'static str, JsonKind)],
}

impl CompletionRequest {
    pub fn new(task: CompletionTask, world_id: WorldId, vars: Value) -> Self {
        Self { task, world_id, vars, expect: &[] }
    }

    pub fn expecting(mut self, expect: &'static [(&'static str, JsonKind)]) -> Self {
        self.expect = expect;
        self
    }

    /// Check `value` against `expect`; `Err` carries the first miss.
    pub fn validate(&self, value: &Value) -> Result<(), String> {
        for (field, kind) in self.expect {
            match value.get(field) {
                None => return Err(format!("missing field {field:?}")),
                Some(v) if !kind.matches(v) => {
                    return Err(format!("field {field:?} is not a {kind:?}"));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

// ── LanguageModel ────────────────────────────────────────────────────────────

/// The narrow seam between cognition and the external model service.
///
/// All methods take the owning world so the implementation can charge the
/// right concurrency budget.  Implementations must be cheap to share
/// (`Arc<dyn LanguageModel>`).
#[async_trait]
pub trait LanguageModel: Send + Sync + 'static {
    /// Embed `text` into the configured fixed dimension.
    async fn embed(&self, world: WorldId, text: &str) -> LmResult<Vec<f32>>;

    /// Score how memorable `content` is for an agent described by
    /// `agent_context`.  Infallible by contract: parse failures and
    /// timeouts collapse to the fallback score 5.
    async fn score_importance(&self, world: WorldId, content: &str, agent_context: &str) -> u8;

    /// Run a structured completion.  The returned value has passed
    /// [`CompletionRequest::validate`].
    async fn complete(&self, request: CompletionRequest) -> LmResult<Value>;
}

/// Fallback importance used whenever the service cannot produce a score.
pub const FALLBACK_IMPORTANCE: u8 = 5;
