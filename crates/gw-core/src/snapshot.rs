//! Immutable world snapshots.

use chrono::{DateTime, Utc};

use crate::{Agent, Memory, SnapshotId, World, WorldId};

/// Snapshot metadata.  The entity state itself is serialized separately as a
/// [`SnapshotPayload`] blob stored under `location`; the metadata row stays
/// small enough to list cheaply.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Snapshot {
    pub id: SnapshotId,
    pub world_id: WorldId,
    pub name: String,
    /// Real (not simulated) time the snapshot was taken.
    pub taken_at: DateTime<Utc>,
    /// Opaque storage key for the payload blob.
    pub location: String,
    pub agent_count: usize,
    #[serde(default)]
    pub description: String,
}

/// The full serialized state of a world at snapshot time.
///
/// Events are deliberately excluded: a restore resumes the world's event log
/// rather than rewriting history (sequence numbers keep increasing).
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SnapshotPayload {
    pub world: World,
    pub agents: Vec<Agent>,
    pub memories: Vec<Memory>,
}
