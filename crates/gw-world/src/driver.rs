//! The per-world tick driver.
//!
//! One detached task per running world.  The driver alternates between
//! waiting for control commands and firing ticks on the real-time cadence;
//! because commands are only examined *between* ticks, an in-flight tick
//! always completes before a pause or stop takes effect.

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use gw_agent::{AgentLoop, PerceptionIndex, TickContext};
use gw_core::{
    Agent, AgentId, AgentStatus, EventDraft, RuntimeConfig, World, WorldId, WorldStatus,
};
use gw_events::EventProcessor;
use gw_store::Store;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::{WorldError, WorldResult};

// ── Control plane ────────────────────────────────────────────────────────────

/// Commands the runtime sends its driver task.
#[derive(Copy, Clone, Debug)]
pub(crate) enum Command {
    Pause,
    Resume,
    Stop,
}

/// Handle kept in the runtime's registry while a driver task is alive.
pub(crate) struct DriverHandle {
    pub tx: mpsc::UnboundedSender<Command>,
    pub task: tokio::task::JoinHandle<()>,
}

// ── TickReport ───────────────────────────────────────────────────────────────

/// What one tick accomplished.
#[derive(Clone, Debug, Default)]
pub struct TickReport {
    /// Agents whose cycle completed.
    pub completed: usize,
    /// Agents cut off by the per-tick deadline (still scheduled next tick).
    pub timed_out: usize,
    /// Agents halted by a fatal error this tick.
    pub halted: usize,
}

// ── Shared dependencies ──────────────────────────────────────────────────────

/// Everything a tick needs; shared by the driver task and manual advance.
#[derive(Clone)]
pub(crate) struct TickDeps {
    pub store: Arc<dyn Store>,
    pub agent_loop: AgentLoop,
    pub events: EventProcessor,
    pub cfg: Arc<RuntimeConfig>,
}

// ── Driver task ──────────────────────────────────────────────────────────────

/// Body of the per-world driver task.
pub(crate) async fn drive(deps: TickDeps, world_id: WorldId, mut rx: mpsc::UnboundedReceiver<Command>) {
    let mut interval = tokio::time::interval(std::time::Duration::from_millis(deps.cfg.base_tick_ms));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut paused = false;

    info!(world = %world_id, "tick driver started");
    loop {
        if paused {
            // Parked: only a command wakes us.
            match rx.recv().await {
                Some(Command::Resume) => {
                    paused = false;
                    interval.reset();
                }
                Some(Command::Pause) => {}
                Some(Command::Stop) | None => break,
            }
            continue;
        }

        tokio::select! {
            command = rx.recv() => match command {
                Some(Command::Pause) => paused = true,
                Some(Command::Resume) => {}
                Some(Command::Stop) | None => break,
            },
            _ = interval.tick() => {
                match run_tick(&deps, world_id).await {
                    Ok(report) => {
                        debug!(world = %world_id, completed = report.completed,
                               timed_out = report.timed_out, "tick done");
                    }
                    Err(e) => {
                        // Scheduler errors pause the world; they never
                        // propagate past it.
                        warn!(world = %world_id, error = %e, "tick failed, pausing world");
                        pause_after_error(&deps, world_id, &e).await;
                        paused = true;
                    }
                }
            }
        }
    }
    info!(world = %world_id, "tick driver stopped");
}

/// Best-effort status flip and notice after a failed tick.
async fn pause_after_error(deps: &TickDeps, world_id: WorldId, error: &WorldError) {
    if let Ok(mut world) = deps.store.get_world(world_id).await {
        world.status = WorldStatus::Paused;
        if let Err(e) = deps.store.put_world(&world).await {
            warn!(world = %world_id, error = %e, "could not persist error-pause");
        }
        let draft = EventDraft::world_event(format!("scheduler paused the world: {error}"));
        if let Err(e) = deps.events.process(world_id, world.clock.sim_time, draft).await {
            warn!(world = %world_id, error = %e, "could not record error-pause event");
        }
    }
}

// ── One tick ─────────────────────────────────────────────────────────────────

/// Advance the clock and run one full tick for `world_id`.
///
/// Also the body of manual `advance` stepping, which is why it lives apart
/// from the driver loop.
pub(crate) async fn run_tick(deps: &TickDeps, world_id: WorldId) -> WorldResult<TickReport> {
    let mut world = deps.store.get_world(world_id).await?;
    let previous_sim_time = world.clock.sim_time;
    world.clock.advance();

    // Roster snapshot: whoever is active right now is scheduled this tick.
    let roster: Vec<Agent> = deps.store.list_agents_by_world(world_id).await?;
    let active: Vec<AgentId> = roster.iter().filter(|a| a.is_active()).map(|a| a.id).collect();
    let index = PerceptionIndex::build(&roster);
    let recent = recent_events(deps, &world, previous_sim_time).await?;

    // Shared immutable tick state for the concurrent cycles.
    let shared = Arc::new((world.clone(), roster, index, recent));

    let mut set: JoinSet<(AgentId, Option<WorldResult<()>>)> = JoinSet::new();
    for agent_id in active {
        let deps = deps.clone();
        let shared = Arc::clone(&shared);
        set.spawn(async move {
            let (world, roster, index, recent) = &*shared;
            let ctx = TickContext::new(world, roster, index, recent);
            let cycle = deps.agent_loop.run_cycle(agent_id, &ctx);
            match tokio::time::timeout(deps.cfg.tick_deadline, cycle).await {
                // Deadline: cooperative cancellation at the next suspension
                // point.  The agent stays scheduled for the next tick.
                Err(_) => (agent_id, None),
                Ok(Ok(_)) => (agent_id, Some(Ok(()))),
                Ok(Err(e)) => (agent_id, Some(Err(e.into()))),
            }
        });
    }

    let mut report = TickReport::default();
    while let Some(joined) = set.join_next().await {
        let (agent_id, outcome) = match joined {
            Ok(pair) => pair,
            Err(e) => {
                warn!(world = %world_id, error = %e, "agent cycle task died");
                continue;
            }
        };
        match outcome {
            None => {
                warn!(world = %world_id, agent = %agent_id, "agent cycle hit the tick deadline");
                report.timed_out += 1;
            }
            Some(Ok(())) => report.completed += 1,
            Some(Err(e)) => {
                // Per-agent isolation: log, and halt the agent on corruption.
                warn!(world = %world_id, agent = %agent_id, error = %e, "agent cycle failed");
                let fatal = matches!(&e, WorldError::Agent(ae) if ae.is_fatal());
                if fatal {
                    halt_agent(deps, agent_id).await;
                    report.halted += 1;
                }
            }
        }
    }

    persist_clock(deps, &world).await?;
    Ok(report)
}

/// Events the agents may perceive this tick: everything since the previous
/// tick began.
async fn recent_events(
    deps: &TickDeps,
    world: &World,
    previous_sim_time: DateTime<Utc>,
) -> WorldResult<Vec<gw_core::Event>> {
    let span_ms = (world.clock.tick_span_secs() * 1_000.0) as i64;
    let since = previous_sim_time - ChronoDuration::milliseconds(span_ms.max(1));
    Ok(deps.store.list_events_by_world(world.id, Some(since), None).await?)
}

/// Mark a fatally-errored agent inactive so the next roster skips it.
async fn halt_agent(deps: &TickDeps, agent_id: AgentId) {
    match deps.store.get_agent(agent_id).await {
        Err(e) => debug!(agent = %agent_id, error = %e, "halt: agent gone"),
        Ok(mut agent) => {
            agent.status = AgentStatus::Inactive;
            if let Err(e) = deps.store.put_agent(&agent).await {
                warn!(agent = %agent_id, error = %e, "could not halt agent");
            }
        }
    }
}

/// Persist the advanced clock, merging over concurrent world updates
/// (status changes, object mutations from interactions).
async fn persist_clock(deps: &TickDeps, advanced: &World) -> WorldResult<()> {
    for _ in 0..3 {
        let mut current = deps.store.get_world(advanced.id).await?;
        current.clock = advanced.clock.clone();
        match deps.store.put_world(&current).await {
            Ok(_) => return Ok(()),
            Err(e) if e.is_retryable() => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(WorldError::Validation("could not persist world clock".into()))
}
