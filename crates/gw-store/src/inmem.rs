//! Process-local in-memory backend.
//!
//! The default backend for tests and single-process deployments.  All tables
//! live behind one `parking_lot::RwLock`; every operation takes the lock for
//! a short, await-free critical section, so the async methods never hold it
//! across a suspension point.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use gw_core::{
    Agent, AgentId, Event, Memory, MemoryId, Snapshot, SnapshotId, World, WorldId, WorldStatus,
};

use crate::store::{next_version, validate_memory, Store};
use crate::{StoreError, StoreResult};

// ── Tables ───────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Tables {
    worlds: FxHashMap<WorldId, World>,
    agents: FxHashMap<AgentId, Agent>,
    memories: FxHashMap<MemoryId, Memory>,
    /// Secondary index: agent → memory ids in append order.
    memories_by_agent: FxHashMap<AgentId, Vec<MemoryId>>,
    /// Per-world event log, maintained in `(sim_time, seq)` order.
    events: FxHashMap<WorldId, Vec<Event>>,
    snapshots: FxHashMap<SnapshotId, Snapshot>,
    blobs: FxHashMap<String, Vec<u8>>,
}

/// In-memory [`Store`] backend.
#[derive(Default)]
pub struct MemStore {
    inner: RwLock<Tables>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

// ── Store impl ───────────────────────────────────────────────────────────────

#[async_trait]
impl Store for MemStore {
    // ── Worlds ────────────────────────────────────────────────────────────

    async fn put_world(&self, world: &World) -> StoreResult<World> {
        let mut t = self.inner.write();
        let stored = t.worlds.get(&world.id).map(|w| w.version);
        let version = next_version("world", world.id.to_string(), stored, world.version)?;
        let mut copy = world.clone();
        copy.version = version;
        copy.updated_at = Utc::now();
        t.worlds.insert(world.id, copy.clone());
        Ok(copy)
    }

    async fn get_world(&self, id: WorldId) -> StoreResult<World> {
        self.inner
            .read()
            .worlds
            .get(&id)
            .cloned()
            .ok_or(StoreError::WorldNotFound(id))
    }

    async fn list_worlds(&self, status: Option<WorldStatus>) -> StoreResult<Vec<World>> {
        let t = self.inner.read();
        let mut worlds: Vec<World> = t
            .worlds
            .values()
            .filter(|w| status.is_none_or(|s| w.status == s))
            .cloned()
            .collect();
        worlds.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(worlds)
    }

    async fn delete_world(&self, id: WorldId) -> StoreResult<()> {
        let mut t = self.inner.write();
        if t.worlds.remove(&id).is_none() {
            return Err(StoreError::WorldNotFound(id));
        }
        let doomed: Vec<AgentId> = t
            .agents
            .values()
            .filter(|a| a.world_id == id)
            .map(|a| a.id)
            .collect();
        for agent in doomed {
            t.agents.remove(&agent);
            for mid in t.memories_by_agent.remove(&agent).unwrap_or_default() {
                t.memories.remove(&mid);
            }
        }
        t.events.remove(&id);
        // Snapshots survive the cascade: the final pre-delete snapshot is
        // the archival record of the world.
        Ok(())
    }

    // ── Agents ────────────────────────────────────────────────────────────

    async fn put_agent(&self, agent: &Agent) -> StoreResult<Agent> {
        let mut t = self.inner.write();
        if let Some(stored) = t.agents.get(&agent.id) {
            // An agent never migrates between worlds.
            if stored.world_id != agent.world_id {
                return Err(StoreError::Validation(format!(
                    "agent {} cannot move from world {} to {}",
                    agent.id, stored.world_id, agent.world_id
                )));
            }
        }
        let stored = t.agents.get(&agent.id).map(|a| a.version);
        let version = next_version("agent", agent.id.to_string(), stored, agent.version)?;
        let mut copy = agent.clone();
        copy.version = version;
        copy.updated_at = Utc::now();
        t.agents.insert(agent.id, copy.clone());
        Ok(copy)
    }

    async fn get_agent(&self, id: AgentId) -> StoreResult<Agent> {
        self.inner
            .read()
            .agents
            .get(&id)
            .cloned()
            .ok_or(StoreError::AgentNotFound(id))
    }

    async fn list_agents_by_world(&self, world: WorldId) -> StoreResult<Vec<Agent>> {
        let t = self.inner.read();
        let mut agents: Vec<Agent> = t
            .agents
            .values()
            .filter(|a| a.world_id == world)
            .cloned()
            .collect();
        agents.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(agents)
    }

    async fn delete_agent(&self, id: AgentId) -> StoreResult<()> {
        let mut t = self.inner.write();
        if t.agents.remove(&id).is_none() {
            return Err(StoreError::AgentNotFound(id));
        }
        for mid in t.memories_by_agent.remove(&id).unwrap_or_default() {
            t.memories.remove(&mid);
        }
        Ok(())
    }

    // ── Memories ──────────────────────────────────────────────────────────

    async fn put_memory(&self, memory: &Memory) -> StoreResult<Memory> {
        validate_memory(memory)?;
        let mut t = self.inner.write();
        if let Some(stored) = t.memories.get(&memory.id) {
            if stored.importance != memory.importance {
                return Err(StoreError::Validation(format!(
                    "memory {} importance is immutable ({} -> {})",
                    memory.id, stored.importance, memory.importance
                )));
            }
        }
        let stored = t.memories.get(&memory.id).map(|m| m.version);
        let created = stored.is_none();
        let version = next_version("memory", memory.id.to_string(), stored, memory.version)?;
        let mut copy = memory.clone();
        copy.version = version;
        t.memories.insert(memory.id, copy.clone());
        if created {
            t.memories_by_agent.entry(memory.agent_id).or_default().push(memory.id);
        }
        Ok(copy)
    }

    async fn get_memory(&self, id: MemoryId) -> StoreResult<Memory> {
        self.inner
            .read()
            .memories
            .get(&id)
            .cloned()
            .ok_or(StoreError::MemoryNotFound(id))
    }

    async fn list_memories_by_agent(
        &self,
        agent: AgentId,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Memory>> {
        let t = self.inner.read();
        let ids = match t.memories_by_agent.get(&agent) {
            None => return Ok(Vec::new()),
            Some(ids) => ids,
        };
        let mut memories: Vec<Memory> =
            ids.iter().filter_map(|id| t.memories.get(id).cloned()).collect();
        memories.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(a.id.cmp(&b.id)));
        if let Some(limit) = limit {
            memories.truncate(limit);
        }
        Ok(memories)
    }

    async fn touch_memory(&self, id: MemoryId, at: DateTime<Utc>) -> StoreResult<()> {
        let mut t = self.inner.write();
        let memory = t.memories.get_mut(&id).ok_or(StoreError::MemoryNotFound(id))?;
        if at < memory.timestamp {
            return Err(StoreError::Validation(
                "touch would move last_accessed before timestamp".into(),
            ));
        }
        memory.last_accessed = at;
        memory.version += 1;
        Ok(())
    }

    // ── Events ────────────────────────────────────────────────────────────

    async fn put_event(&self, event: &Event) -> StoreResult<()> {
        let mut t = self.inner.write();
        let log = t.events.entry(event.world_id).or_default();
        // At-least-once upstream: a replayed id is a silent no-op.
        if log.iter().any(|e| e.id == event.id) {
            return Ok(());
        }
        // Sequence numbers strictly increase per world.  The simulated
        // timestamp is allowed to rewind (snapshot restore); within one run
        // the event processor keeps the (sim_time, seq) pair increasing.
        if let Some(last) = log.last() {
            if event.seq <= last.seq {
                return Err(StoreError::Validation(format!(
                    "event seq {} not above {}",
                    event.seq, last.seq
                )));
            }
        }
        log.push(event.clone());
        Ok(())
    }

    async fn list_events_by_world(
        &self,
        world: WorldId,
        since: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Event>> {
        let t = self.inner.read();
        let log = match t.events.get(&world) {
            None => return Ok(Vec::new()),
            Some(log) => log,
        };
        let mut out: Vec<Event> = log
            .iter()
            .filter(|e| since.is_none_or(|s| e.sim_time > s))
            .cloned()
            .collect();
        if let Some(limit) = limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    async fn max_event_seq(&self, world: WorldId) -> StoreResult<u64> {
        let t = self.inner.read();
        Ok(t.events
            .get(&world)
            .and_then(|log| log.last())
            .map_or(0, |e| e.seq))
    }

    // ── Snapshots ─────────────────────────────────────────────────────────

    async fn put_snapshot(&self, snapshot: &Snapshot) -> StoreResult<()> {
        // Snapshots are immutable: first write wins, replays are no-ops.
        self.inner.write().snapshots.entry(snapshot.id).or_insert_with(|| snapshot.clone());
        Ok(())
    }

    async fn get_snapshot(&self, id: SnapshotId) -> StoreResult<Snapshot> {
        self.inner
            .read()
            .snapshots
            .get(&id)
            .cloned()
            .ok_or(StoreError::SnapshotNotFound(id))
    }

    async fn list_snapshots_by_world(&self, world: WorldId) -> StoreResult<Vec<Snapshot>> {
        let t = self.inner.read();
        let mut snaps: Vec<Snapshot> = t
            .snapshots
            .values()
            .filter(|s| s.world_id == world)
            .cloned()
            .collect();
        snaps.sort_by(|a, b| b.taken_at.cmp(&a.taken_at).then(a.id.cmp(&b.id)));
        Ok(snaps)
    }

    async fn delete_snapshot(&self, id: SnapshotId) -> StoreResult<()> {
        let mut t = self.inner.write();
        match t.snapshots.remove(&id) {
            None => Err(StoreError::SnapshotNotFound(id)),
            Some(snap) => {
                t.blobs.remove(&snap.location);
                Ok(())
            }
        }
    }

    // ── Blobs ─────────────────────────────────────────────────────────────

    async fn put_blob(&self, key: &str, bytes: Vec<u8>) -> StoreResult<()> {
        self.inner.write().blobs.insert(key.to_owned(), bytes);
        Ok(())
    }

    async fn get_blob(&self, key: &str) -> StoreResult<Vec<u8>> {
        self.inner
            .read()
            .blobs
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::BlobNotFound(key.to_owned()))
    }
}
