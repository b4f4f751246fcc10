//! The `Agent` record.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::{AgentId, PlanBundle, Position, WorldId};

// ── AgentStatus ──────────────────────────────────────────────────────────────

/// Lifecycle state of an agent.
///
/// `Deleted` is terminal: a deleted agent is skipped by the tick driver and
/// produces no further events, even if a tick was already in flight when the
/// deletion landed (the event path re-checks status before emitting).
#[derive(Copy, Clone, PartialEq, Eq, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Active,
    Inactive,
    Deleted,
}

// ── Agent ────────────────────────────────────────────────────────────────────

/// One generative agent.
///
/// Descriptive attributes (`traits`, `goals`, `persona`) ground every LM
/// prompt issued on the agent's behalf.  `plans` is the persisted plan
/// bundle; `relationships` maps other agents to a free-form relation label
/// ("friend", "rival") maintained by dialogue.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub world_id: WorldId,
    pub name: String,
    #[serde(default)]
    pub traits: Vec<String>,
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default)]
    pub persona: String,
    pub position: Position,
    /// What the agent is currently doing, as shown to observers.
    #[serde(default)]
    pub current_action: String,
    #[serde(default)]
    pub plans: PlanBundle,
    /// Other-agent id → relation label.  BTreeMap keeps serialization stable.
    #[serde(default)]
    pub relationships: BTreeMap<AgentId, String>,
    pub status: AgentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic-concurrency version; bumped by the store on every write.
    pub version: u64,
}

impl Agent {
    /// Construct a new active agent at `position` with a fresh id.
    pub fn new(world_id: WorldId, name: impl Into<String>, position: Position) -> Self {
        let now = Utc::now();
        Self {
            id: AgentId::new(),
            world_id,
            name: name.into(),
            traits: Vec::new(),
            goals: Vec::new(),
            persona: String::new(),
            position,
            current_action: String::new(),
            plans: PlanBundle::default(),
            relationships: BTreeMap::new(),
            status: AgentStatus::Active,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// `true` if the agent should be scheduled and may emit events.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.status == AgentStatus::Active
    }

    /// One-line self description used as LM context.
    pub fn context_line(&self) -> String {
        format!(
            "{} — traits: [{}]; goals: [{}]",
            self.name,
            self.traits.join(", "),
            self.goals.join(", "),
        )
    }
}
