//! The `Event` record — one world-visible occurrence.

use chrono::{DateTime, Utc};

use crate::{AgentId, EventId, WorldId};

// ── EventKind ────────────────────────────────────────────────────────────────

/// What produced the event.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// An agent's act step (move, dialogue line, interaction, …).
    AgentAction,
    /// Something the world itself did (lifecycle change, replan notice, …).
    WorldEvent,
    /// An operator-injected occurrence from the HTTP surface.
    UserIntervention,
}

// ── Event ────────────────────────────────────────────────────────────────────

/// One durable event.
///
/// Events for a given world are totally ordered by `(sim_time, seq)`; `seq`
/// is assigned by the event processor and strictly increases within the
/// world, so events inside one tick (equal `sim_time`) remain ordered.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Event {
    pub id: EventId,
    pub world_id: WorldId,
    /// Simulated instant of the tick that produced the event.
    pub sim_time: DateTime<Utc>,
    /// Per-world monotonic sequence number.
    pub seq: u64,
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    pub description: String,
    /// Free-form structured payload.
    #[serde(default)]
    pub data: serde_json::Value,
    /// Derived follow-on effects, filled by the event processor's rule table.
    #[serde(default)]
    pub consequences: Vec<String>,
}

// ── EventDraft ───────────────────────────────────────────────────────────────

/// Caller-supplied fields for an event; id, timestamp, sequence, and
/// consequences are assigned by the event processor.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct EventDraft {
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    pub description: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl EventDraft {
    pub fn agent_action(agent_id: AgentId, description: impl Into<String>) -> Self {
        Self {
            kind: EventKind::AgentAction,
            agent_id: Some(agent_id),
            description: description.into(),
            data: serde_json::Value::Null,
        }
    }

    pub fn world_event(description: impl Into<String>) -> Self {
        Self {
            kind: EventKind::WorldEvent,
            agent_id: None,
            description: description.into(),
            data: serde_json::Value::Null,
        }
    }

    /// Attach a structured payload.
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}
