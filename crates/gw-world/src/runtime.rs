//! `WorldRuntime` — wiring, lifecycle operations, and snapshot/restore.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use gw_agent::AgentLoop;
use gw_core::{
    Agent, AgentId, AgentStatus, EventDraft, Position, RuntimeConfig, Snapshot, SnapshotId,
    SnapshotPayload, World, WorldId, WorldStatus,
};
use gw_events::{EventBus, EventProcessor};
use gw_lm::LanguageModel;
use gw_memory::MemoryStream;
use gw_plan::PlanningEngine;
use gw_reflect::ReflectionEngine;
use gw_store::Store;
use tracing::info;

use crate::driver::{drive, Command, DriverHandle, TickDeps, TickReport};
use crate::{WorldError, WorldResult};

/// The process-level simulation runtime.
///
/// Cheap to clone; all clones share the component graph and the driver
/// registry.  The HTTP surface holds one of these as its application state.
#[derive(Clone)]
pub struct WorldRuntime {
    store: Arc<dyn Store>,
    events: EventProcessor,
    stream: MemoryStream,
    cfg: Arc<RuntimeConfig>,
    deps: TickDeps,
    drivers: Arc<DashMap<WorldId, DriverHandle>>,
}

impl WorldRuntime {
    /// Wire every component over the given store and gateway.
    pub fn new(store: Arc<dyn Store>, lm: Arc<dyn LanguageModel>, cfg: Arc<RuntimeConfig>) -> Self {
        let stream = MemoryStream::new(store.clone(), lm.clone(), cfg.clone());
        let planner = PlanningEngine::new(lm.clone(), stream.clone());
        let reflector = ReflectionEngine::new(stream.clone(), lm.clone(), cfg.clone());
        let events = EventProcessor::new(store.clone(), EventBus::new());
        let agent_loop = AgentLoop::new(
            store.clone(),
            lm,
            stream.clone(),
            planner,
            reflector,
            events.clone(),
            cfg.clone(),
        );
        let deps = TickDeps {
            store: store.clone(),
            agent_loop,
            events: events.clone(),
            cfg: cfg.clone(),
        };
        Self { store, events, stream, cfg, deps, drivers: Arc::new(DashMap::new()) }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn events(&self) -> &EventProcessor {
        &self.events
    }

    pub fn memory_stream(&self) -> &MemoryStream {
        &self.stream
    }

    pub fn config(&self) -> &Arc<RuntimeConfig> {
        &self.cfg
    }

    // ── World CRUD ────────────────────────────────────────────────────────

    /// Create a stopped world.
    pub async fn create_world(&self, name: &str, description: &str) -> WorldResult<World> {
        let mut world = World::new(name, self.cfg.tick_len_secs);
        world.description = description.to_owned();
        Ok(self.store.put_world(&world).await?)
    }

    pub async fn get_world(&self, id: WorldId) -> WorldResult<World> {
        Ok(self.store.get_world(id).await?)
    }

    pub async fn list_worlds(&self, status: Option<WorldStatus>) -> WorldResult<Vec<World>> {
        Ok(self.store.list_worlds(status).await?)
    }

    /// Update mutable world fields (name, description, settings, objects).
    pub async fn update_world(&self, world: &World) -> WorldResult<World> {
        Ok(self.store.put_world(world).await?)
    }

    /// Take the final snapshot, stop the driver, and cascade-delete.
    pub async fn delete_world(&self, id: WorldId) -> WorldResult<Snapshot> {
        let world = self.store.get_world(id).await?;
        if world.status != WorldStatus::Stopped {
            self.halt_driver(id).await;
        }
        let snapshot = self.take_snapshot(id, "final", "taken before world deletion").await?;
        self.store.delete_world(id).await?;
        info!(world = %id, snapshot = %snapshot.id, "world deleted");
        Ok(snapshot)
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────

    /// `Stopped → Running`: persist the status and launch the driver task.
    pub async fn start(&self, id: WorldId) -> WorldResult<World> {
        let world = self.store.get_world(id).await?;
        if world.status != WorldStatus::Stopped {
            return Err(WorldError::InvalidTransition { world: id, from: world.status, op: "start" });
        }
        let world = self.set_status(id, WorldStatus::Running).await?;
        self.spawn_driver(id);
        self.notice(&world, format!("world {} started", world.name)).await?;
        Ok(world)
    }

    /// `Running → Paused`: the in-flight tick finishes, the clock freezes.
    pub async fn pause(&self, id: WorldId) -> WorldResult<World> {
        let world = self.store.get_world(id).await?;
        if world.status != WorldStatus::Running {
            return Err(WorldError::InvalidTransition { world: id, from: world.status, op: "pause" });
        }
        self.send(id, Command::Pause);
        let world = self.set_status(id, WorldStatus::Paused).await?;
        self.notice(&world, format!("world {} paused", world.name)).await?;
        Ok(world)
    }

    /// `Paused → Running`.
    pub async fn resume(&self, id: WorldId) -> WorldResult<World> {
        let world = self.store.get_world(id).await?;
        if world.status != WorldStatus::Paused {
            return Err(WorldError::InvalidTransition { world: id, from: world.status, op: "resume" });
        }
        let world = self.set_status(id, WorldStatus::Running).await?;
        if self.drivers.get(&id).is_none() {
            // Driver died with an error-pause; relaunch.
            self.spawn_driver(id);
        }
        self.send(id, Command::Resume);
        self.notice(&world, format!("world {} resumed", world.name)).await?;
        Ok(world)
    }

    /// `Running | Paused → Stopped`: drain the driver and finalize time.
    pub async fn stop(&self, id: WorldId) -> WorldResult<World> {
        let world = self.store.get_world(id).await?;
        if world.status == WorldStatus::Stopped {
            return Err(WorldError::InvalidTransition { world: id, from: world.status, op: "stop" });
        }
        self.halt_driver(id).await;
        let world = self.set_status(id, WorldStatus::Stopped).await?;
        self.notice(&world, format!("world {} stopped", world.name)).await?;
        Ok(world)
    }

    // ── Time control ──────────────────────────────────────────────────────

    /// Step `ticks` ticks synchronously.  Only valid while the real-time
    /// driver is not running — manual stepping and the cadence must not
    /// interleave.
    pub async fn advance(&self, id: WorldId, ticks: u64) -> WorldResult<TickReport> {
        let world = self.store.get_world(id).await?;
        if world.status == WorldStatus::Running {
            return Err(WorldError::InvalidTransition { world: id, from: world.status, op: "advance" });
        }
        let mut total = TickReport::default();
        for _ in 0..ticks {
            let report = crate::driver::run_tick(&self.deps, id).await?;
            total.completed += report.completed;
            total.timed_out += report.timed_out;
            total.halted += report.halted;
        }
        Ok(total)
    }

    /// Set the time-speed multiplier (must be positive).
    pub async fn set_speed(&self, id: WorldId, multiplier: f64) -> WorldResult<World> {
        if !(multiplier.is_finite() && multiplier > 0.0) {
            return Err(WorldError::Validation(format!("invalid time speed {multiplier}")));
        }
        for _ in 0..3 {
            let mut world = self.store.get_world(id).await?;
            world.clock.time_speed = multiplier;
            match self.store.put_world(&world).await {
                Ok(world) => return Ok(world),
                Err(e) if e.is_retryable() => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(WorldError::Validation("could not persist time speed".into()))
    }

    // ── Agents ────────────────────────────────────────────────────────────

    /// Spawn an agent into a world, enforcing the agent cap.
    pub async fn spawn_agent(
        &self,
        world_id: WorldId,
        name: &str,
        position: Position,
        traits: Vec<String>,
        goals: Vec<String>,
        persona: String,
    ) -> WorldResult<Agent> {
        let world = self.store.get_world(world_id).await?;
        let roster = self.store.list_agents_by_world(world_id).await?;
        let live = roster.iter().filter(|a| a.status != AgentStatus::Deleted).count();
        if live >= world.settings.max_agents {
            return Err(WorldError::Validation(format!(
                "world {} is full ({} agents)",
                world.name, live
            )));
        }

        let mut agent = Agent::new(world_id, name, position);
        agent.position.clamp_to(world.settings.width, world.settings.height);
        agent.traits = traits;
        agent.goals = goals;
        agent.persona = persona;
        let agent = self.store.put_agent(&agent).await?;

        self.notice(&world, format!("{} entered the world", agent.name)).await?;
        Ok(agent)
    }

    pub async fn get_agent(&self, id: AgentId) -> WorldResult<Agent> {
        Ok(self.store.get_agent(id).await?)
    }

    pub async fn list_agents(&self, world_id: WorldId) -> WorldResult<Vec<Agent>> {
        Ok(self.store.list_agents_by_world(world_id).await?)
    }

    /// Soft-delete: the agent stops being scheduled and can emit no further
    /// events; its record and memories remain until the world goes away.
    pub async fn remove_agent(&self, id: AgentId) -> WorldResult<Agent> {
        let mut agent = self.store.get_agent(id).await?;
        let world = self.store.get_world(agent.world_id).await?;
        agent.status = AgentStatus::Deleted;
        let agent = self.store.put_agent(&agent).await?;
        self.notice(&world, format!("{} left the world", agent.name)).await?;
        Ok(agent)
    }

    // ── Snapshots ─────────────────────────────────────────────────────────

    /// Serialize the world, its agents, and their memories into a blob and
    /// record the snapshot metadata.
    pub async fn take_snapshot(
        &self,
        world_id: WorldId,
        name: &str,
        description: &str,
    ) -> WorldResult<Snapshot> {
        let world = self.store.get_world(world_id).await?;
        let agents = self.store.list_agents_by_world(world_id).await?;
        let mut memories = Vec::new();
        for agent in &agents {
            memories.extend(self.store.list_memories_by_agent(agent.id, None).await?);
        }

        let payload = SnapshotPayload { world: world.clone(), agents, memories };
        let bytes = serde_json::to_vec(&payload)
            .map_err(|e| WorldError::SnapshotCodec(e.to_string()))?;

        let id = SnapshotId::new();
        let snapshot = Snapshot {
            id,
            world_id,
            name: name.to_owned(),
            taken_at: Utc::now(),
            location: format!("snapshots/{world_id}/{id}"),
            agent_count: payload.agents.len(),
            description: description.to_owned(),
        };
        self.store.put_blob(&snapshot.location, bytes).await?;
        self.store.put_snapshot(&snapshot).await?;
        Ok(snapshot)
    }

    pub async fn list_snapshots(&self, world_id: WorldId) -> WorldResult<Vec<Snapshot>> {
        Ok(self.store.list_snapshots_by_world(world_id).await?)
    }

    /// Restore a non-running world to a snapshot's state.
    ///
    /// Agents and memories created after the snapshot disappear; the event
    /// log is kept — sequence numbers keep increasing across the rewind.
    pub async fn restore_snapshot(&self, world_id: WorldId, snapshot_id: SnapshotId) -> WorldResult<World> {
        let current = self.store.get_world(world_id).await?;
        if current.status == WorldStatus::Running {
            return Err(WorldError::InvalidTransition {
                world: world_id,
                from: current.status,
                op: "restore",
            });
        }
        let snapshot = self.store.get_snapshot(snapshot_id).await?;
        if snapshot.world_id != world_id {
            return Err(WorldError::Validation("snapshot belongs to another world".into()));
        }
        let bytes = self.store.get_blob(&snapshot.location).await?;
        let payload: SnapshotPayload = serde_json::from_slice(&bytes)
            .map_err(|e| WorldError::SnapshotCodec(e.to_string()))?;

        // Clear the live roster (and with it all memories), then replay the
        // snapshot's entities as fresh version lineages.
        for agent in self.store.list_agents_by_world(world_id).await? {
            self.store.delete_agent(agent.id).await?;
        }
        let mut world = payload.world;
        world.status = current.status;
        world.version = current.version;
        let world = self.store.put_world(&world).await?;
        for mut agent in payload.agents {
            agent.version = 0;
            self.store.put_agent(&agent).await?;
        }
        for mut memory in payload.memories {
            memory.version = 0;
            self.store.put_memory(&memory).await?;
        }
        self.notice(&world, format!("world restored from snapshot {}", snapshot.name)).await?;
        Ok(world)
    }

    // ── Internals ─────────────────────────────────────────────────────────

    fn spawn_driver(&self, id: WorldId) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let task = tokio::spawn(drive(self.deps.clone(), id, rx));
        self.drivers.insert(id, DriverHandle { tx, task });
    }

    fn send(&self, id: WorldId, command: Command) {
        if let Some(handle) = self.drivers.get(&id) {
            let _ = handle.tx.send(command);
        }
    }

    /// Stop and reap the driver task, letting any in-flight tick finish.
    async fn halt_driver(&self, id: WorldId) {
        if let Some((_, handle)) = self.drivers.remove(&id) {
            let _ = handle.tx.send(Command::Stop);
            let _ = handle.task.await;
        }
    }

    /// Persist a status change, retrying conflicts against the tick driver.
    async fn set_status(&self, id: WorldId, status: WorldStatus) -> WorldResult<World> {
        for _ in 0..3 {
            let mut world = self.store.get_world(id).await?;
            world.status = status;
            match self.store.put_world(&world).await {
                Ok(world) => return Ok(world),
                Err(e) if e.is_retryable() => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(WorldError::Validation("could not persist world status".into()))
    }

    /// Record a lifecycle notice in the world's event log.
    async fn notice(&self, world: &World, text: String) -> WorldResult<()> {
        self.events
            .process(world.id, world.clock.sim_time, EventDraft::world_event(text))
            .await?;
        Ok(())
    }
}
