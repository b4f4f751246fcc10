//! The `Store` trait — the single persistence seam for every component.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gw_core::{
    Agent, AgentId, Event, Memory, MemoryId, Snapshot, SnapshotId, World, WorldId, WorldStatus,
};

use crate::StoreResult;

/// Typed access to worlds, agents, memories, events, and snapshots.
///
/// All operations are idempotent on identifier.  Writes follow the versioned
/// create/update protocol described in the crate docs.  List operations have
/// fixed orders so callers never re-sort:
///
/// - agents: by name, then id,
/// - memories: newest `timestamp` first, then id (the retrieval window
///   depends on this),
/// - events: ascending `(sim_time, seq)`,
/// - snapshots: newest `taken_at` first.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    // ── Worlds ────────────────────────────────────────────────────────────

    async fn put_world(&self, world: &World) -> StoreResult<World>;
    async fn get_world(&self, id: WorldId) -> StoreResult<World>;
    async fn list_worlds(&self, status: Option<WorldStatus>) -> StoreResult<Vec<World>>;

    /// Remove the world row and cascade over its agents, memories, events,
    /// and snapshot metadata.  The final pre-delete snapshot is the caller's
    /// responsibility — the store only deletes.
    async fn delete_world(&self, id: WorldId) -> StoreResult<()>;

    // ── Agents ────────────────────────────────────────────────────────────

    async fn put_agent(&self, agent: &Agent) -> StoreResult<Agent>;
    async fn get_agent(&self, id: AgentId) -> StoreResult<Agent>;
    async fn list_agents_by_world(&self, world: WorldId) -> StoreResult<Vec<Agent>>;

    /// Remove the agent row and its entire memory stream.
    async fn delete_agent(&self, id: AgentId) -> StoreResult<()>;

    // ── Memories ──────────────────────────────────────────────────────────

    async fn put_memory(&self, memory: &Memory) -> StoreResult<Memory>;
    async fn get_memory(&self, id: MemoryId) -> StoreResult<Memory>;

    /// The agent's memories, newest first, truncated to `limit` if given.
    async fn list_memories_by_agent(
        &self,
        agent: AgentId,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Memory>>;

    /// Update only `last_accessed`.  Never touches importance or content.
    async fn touch_memory(&self, id: MemoryId, at: DateTime<Utc>) -> StoreResult<()>;

    // ── Events ────────────────────────────────────────────────────────────

    /// Append one event.  Events are immutable; there is no update path.
    async fn put_event(&self, event: &Event) -> StoreResult<()>;

    /// Events with `sim_time > since` (all if `None`), ascending
    /// `(sim_time, seq)`, truncated to `limit`.
    async fn list_events_by_world(
        &self,
        world: WorldId,
        since: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Event>>;

    /// Highest `seq` ever assigned in the world, 0 if none.  Used to seed
    /// the event processor's counter after a restart.
    async fn max_event_seq(&self, world: WorldId) -> StoreResult<u64>;

    // ── Snapshots ─────────────────────────────────────────────────────────

    async fn put_snapshot(&self, snapshot: &Snapshot) -> StoreResult<()>;
    async fn get_snapshot(&self, id: SnapshotId) -> StoreResult<Snapshot>;
    async fn list_snapshots_by_world(&self, world: WorldId) -> StoreResult<Vec<Snapshot>>;
    async fn delete_snapshot(&self, id: SnapshotId) -> StoreResult<()>;

    // ── Blobs ─────────────────────────────────────────────────────────────
    //
    // Opaque storage for snapshot payloads; `Snapshot::location` is the key.

    async fn put_blob(&self, key: &str, bytes: Vec<u8>) -> StoreResult<()>;
    async fn get_blob(&self, key: &str) -> StoreResult<Vec<u8>>;
}

// ── Shared write protocol ─────────────────────────────────────────────────────

/// Resolve the versioned create/update protocol: returns the version the
/// stored copy should carry, or `Conflict`.
///
/// `stored` is the version currently in the table (`None` when the id is
/// absent); `submitted` is what the caller sent.  Version 0 means "create".
pub(crate) fn next_version(
    entity: &'static str,
    id: String,
    stored: Option<u64>,
    submitted: u64,
) -> StoreResult<u64> {
    use crate::StoreError;
    match (stored, submitted) {
        (None, 0) => Ok(1),
        (None, v) => Err(StoreError::Conflict { entity, id, submitted: v, stored: 0 }),
        (Some(s), v) if v == s => Ok(s + 1),
        (Some(s), v) => Err(StoreError::Conflict { entity, id, submitted: v, stored: s }),
    }
}

// ── Shared validation ─────────────────────────────────────────────────────────

/// Invariant checks applied by every backend before a memory write.
pub(crate) fn validate_memory(memory: &Memory) -> StoreResult<()> {
    use crate::StoreError;
    use gw_core::MemoryKind;

    if !(1..=10).contains(&memory.importance) {
        return Err(StoreError::Validation(format!(
            "memory importance {} outside [1, 10]",
            memory.importance
        )));
    }
    if memory.last_accessed < memory.timestamp {
        return Err(StoreError::Validation(
            "memory last_accessed precedes timestamp".into(),
        ));
    }
    match memory.kind {
        MemoryKind::Reflection if memory.related.is_empty() => Err(StoreError::Validation(
            "reflection carries no evidence memories".into(),
        )),
        MemoryKind::Reflection | MemoryKind::Observation | MemoryKind::Plan => Ok(()),
    }
}
