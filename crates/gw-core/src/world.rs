//! The `World` record and its lifecycle status.

use chrono::{DateTime, Utc};

use crate::{Position, WorldClock, WorldId};

// ── WorldStatus ──────────────────────────────────────────────────────────────

/// Lifecycle state of a world.
///
/// Transitions: `Stopped → Running ⇄ Paused → Stopped`.  Only a `Running`
/// world has an active tick driver; pausing preserves the simulated clock,
/// stopping finalizes it.
#[derive(Copy, Clone, PartialEq, Eq, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorldStatus {
    Running,
    Paused,
    Stopped,
}

impl WorldStatus {
    /// `true` if a tick driver should be live for this status.
    #[inline]
    pub fn is_running(self) -> bool {
        self == WorldStatus::Running
    }
}

// ── WorldSettings ────────────────────────────────────────────────────────────

/// Per-world limits and dimensions.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct WorldSettings {
    /// Maximum agents that may be spawned into the world.
    pub max_agents: usize,
    /// World width — positions are clamped to `[0, width]`.
    pub width: f64,
    /// World height — positions are clamped to `[0, height]`.
    pub height: f64,
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self { max_agents: 25, width: 100.0, height: 100.0 }
    }
}

// ── WorldObject ──────────────────────────────────────────────────────────────

/// A named, stateful object in the world ("stove": "off").
///
/// Objects are perception targets and the subject of `interact` actions,
/// which rewrite `state`.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct WorldObject {
    pub name: String,
    pub position: Position,
    pub state: String,
}

// ── World ────────────────────────────────────────────────────────────────────

/// A simulated world: clock, settings, objects, and lifecycle status.
///
/// The world owns its agents, their memory streams, and its event log;
/// deleting a world cascades over all of them after a final snapshot.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct World {
    pub id: WorldId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub status: WorldStatus,
    pub clock: WorldClock,
    pub settings: WorldSettings,
    #[serde(default)]
    pub objects: Vec<WorldObject>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic-concurrency version; bumped by the store on every write.
    pub version: u64,
}

impl World {
    /// Construct a new stopped world with a fresh id and default settings.
    pub fn new(name: impl Into<String>, tick_len_secs: u32) -> Self {
        let now = Utc::now();
        Self {
            id: WorldId::new(),
            name: name.into(),
            description: String::new(),
            status: WorldStatus::Stopped,
            clock: WorldClock::new(now, tick_len_secs),
            settings: WorldSettings::default(),
            objects: Vec::new(),
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Look up an object by name (case-insensitive).
    pub fn object(&self, name: &str) -> Option<&WorldObject> {
        self.objects.iter().find(|o| o.name.eq_ignore_ascii_case(name))
    }

    /// Mutable object lookup — used by `interact` action handling.
    pub fn object_mut(&mut self, name: &str) -> Option<&mut WorldObject> {
        self.objects.iter_mut().find(|o| o.name.eq_ignore_ascii_case(name))
    }
}
