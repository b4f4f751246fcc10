//! Spatial perception.
//!
//! # Why an R-tree
//!
//! Perception is a range query: "who and what is within `perception_range`
//! of me?"  A naive scan is O(N) per agent, O(N²) per tick.  The driver
//! builds one [`PerceptionIndex`] per world per tick — O(N log N) — and
//! every agent's query is then O(log N + hits).  The index is immutable for
//! the duration of the tick, so concurrent agent cycles share it freely.

use gw_core::{Agent, AgentId, Event, Position, World};
use rstar::{primitives::GeomWithData, RTree};

type AgentPoint = GeomWithData<[f64; 2], AgentId>;

// ── PerceptionIndex ──────────────────────────────────────────────────────────

/// Per-tick spatial index over the active agents of one world.
pub struct PerceptionIndex {
    tree: RTree<AgentPoint>,
}

impl PerceptionIndex {
    /// Index every *active* agent in `agents`.
    pub fn build(agents: &[Agent]) -> Self {
        let points: Vec<AgentPoint> = agents
            .iter()
            .filter(|a| a.is_active())
            .map(|a| AgentPoint::new([a.position.x, a.position.y], a.id))
            .collect();
        Self { tree: RTree::bulk_load(points) }
    }

    /// Agents within `range` of `position`, excluding `me`.
    pub fn nearby(&self, me: AgentId, position: &Position, range: f64) -> Vec<AgentId> {
        self.tree
            .locate_within_distance([position.x, position.y], range * range)
            .map(|p| p.data)
            .filter(|&id| id != me)
            .collect()
    }
}

// ── Observation composition ──────────────────────────────────────────────────

/// Compose the tick's observation string for `agent`.
///
/// Deterministic: neighbours and objects are listed in name order, events
/// in log order.  Determinism keeps replan decisions and importance scores
/// stable for identical surroundings.
pub fn compose_observation(
    agent: &Agent,
    world: &World,
    neighbours: &[&Agent],
    recent_events: &[Event],
    range: f64,
) -> String {
    let mut parts: Vec<String> = Vec::new();
    parts.push(format!("At {}.", agent.position));

    let mut people: Vec<String> = neighbours
        .iter()
        .map(|n| {
            if n.current_action.is_empty() {
                n.name.clone()
            } else {
                format!("{} ({})", n.name, n.current_action)
            }
        })
        .collect();
    if !people.is_empty() {
        people.sort();
        parts.push(format!("Nearby: {}.", people.join(", ")));
    }

    let mut objects: Vec<String> = world
        .objects
        .iter()
        .filter(|o| o.position.distance(&agent.position) <= range)
        .map(|o| format!("{} ({})", o.name, o.state))
        .collect();
    if !objects.is_empty() {
        objects.sort();
        parts.push(format!("In sight: {}.", objects.join(", ")));
    }

    let happenings: Vec<&str> = recent_events
        .iter()
        .filter(|e| e.agent_id != Some(agent.id))
        .map(|e| e.description.as_str())
        .collect();
    if !happenings.is_empty() {
        parts.push(format!("Recently: {}.", happenings.join("; ")));
    }

    if parts.len() == 1 {
        parts.push("Nothing notable nearby.".to_owned());
    }
    parts.join(" ")
}
