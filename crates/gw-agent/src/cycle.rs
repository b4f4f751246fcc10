//! `AgentLoop` — one agent's perceive → replan → act → record cycle.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use gw_core::{
    Agent, AgentId, Event, EventDraft, MemoryDraft, MinuteStep, RuntimeConfig, World, WorldId,
};
use gw_events::EventProcessor;
use gw_lm::{CompletionRequest, CompletionTask, JsonKind, LanguageModel};
use gw_memory::MemoryStream;
use gw_plan::{classify_action, ActionKind, PlanningEngine, ReplanScope};
use gw_reflect::ReflectionEngine;
use gw_store::{Store, StoreError};
use serde_json::json;
use tracing::{debug, warn};

use crate::perceive::{compose_observation, PerceptionIndex};
use crate::AgentResult;

const UTTERANCE_SHAPE: &[(&str, JsonKind)] = &[("utterance", JsonKind::String)];

// ── TickContext ──────────────────────────────────────────────────────────────

/// Read-only per-tick state shared by every agent cycle of one world.
///
/// Built once per tick by the world driver and borrowed immutably across
/// all concurrent cycles: the world record, the agent roster snapshot, the
/// perception index over that roster, and the tail of the event log.
pub struct TickContext<'a> {
    pub world: &'a World,
    /// Roster snapshot taken at tick start.  Cycles read neighbours from
    /// here; the authoritative per-agent record is refetched per cycle.
    pub agents: &'a [Agent],
    pub index: &'a PerceptionIndex,
    /// Recent events agents may perceive this tick.
    pub recent_events: &'a [Event],
}

impl<'a> TickContext<'a> {
    pub fn new(
        world: &'a World,
        agents: &'a [Agent],
        index: &'a PerceptionIndex,
        recent_events: &'a [Event],
    ) -> Self {
        Self { world, agents, index, recent_events }
    }

    fn agent_by_id(&self, id: AgentId) -> Option<&Agent> {
        self.agents.iter().find(|a| a.id == id)
    }
}

// ── CycleOutcome ─────────────────────────────────────────────────────────────

/// What one cycle did, reported back to the tick driver.
#[derive(Clone, Debug)]
pub struct CycleOutcome {
    pub agent_id: AgentId,
    pub action: String,
    pub kind: ActionKind,
    pub replanned: bool,
    /// The recorded `agent_action` event, absent when the agent was deleted
    /// mid-cycle.
    pub event: Option<Event>,
}

// ── AgentLoop ────────────────────────────────────────────────────────────────

/// Executes cognition cycles.  One instance serves every agent of the
/// process; all per-cycle state is local to [`run_cycle`][Self::run_cycle].
#[derive(Clone)]
pub struct AgentLoop {
    store: Arc<dyn Store>,
    lm: Arc<dyn LanguageModel>,
    stream: MemoryStream,
    planner: PlanningEngine,
    reflector: ReflectionEngine,
    events: EventProcessor,
    cfg: Arc<RuntimeConfig>,
}

impl AgentLoop {
    pub fn new(
        store: Arc<dyn Store>,
        lm: Arc<dyn LanguageModel>,
        stream: MemoryStream,
        planner: PlanningEngine,
        reflector: ReflectionEngine,
        events: EventProcessor,
        cfg: Arc<RuntimeConfig>,
    ) -> Self {
        Self { store, lm, stream, planner, reflector, events, cfg }
    }

    /// Run one cognition cycle for `agent_id`.
    ///
    /// Returns `None` when the agent is inactive or was deleted mid-cycle.
    /// The steps are strictly sequential; any consumer of the agent's event
    /// stream observes observation → replan → act in that order.
    pub async fn run_cycle(
        &self,
        agent_id: AgentId,
        ctx: &TickContext<'_>,
    ) -> AgentResult<Option<CycleOutcome>> {
        // The roster snapshot may be a tick stale; the store is the
        // authority on liveness.
        let mut agent = match self.store.get_agent(agent_id).await {
            Ok(agent) => agent,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if !agent.is_active() {
            return Ok(None);
        }
        let now = ctx.world.clock.sim_time;

        // ── Perceive ──────────────────────────────────────────────────────
        let neighbour_ids = ctx.index.nearby(agent.id, &agent.position, self.cfg.perception_range);
        let neighbours: Vec<&Agent> =
            neighbour_ids.iter().filter_map(|&id| ctx.agent_by_id(id)).collect();
        let observation = compose_observation(
            &agent,
            ctx.world,
            &neighbours,
            ctx.recent_events,
            self.cfg.perception_range,
        );
        self.stream
            .add_memory(&agent, MemoryDraft::observation(agent.world_id, observation.clone()), now)
            .await?;

        // ── Reactive replan ───────────────────────────────────────────────
        let scope = self.planner.assess_replan(&observation, &agent);
        if scope.is_replan() {
            self.planner.replan(&mut agent, scope, now).await?;
            // Deliberately neutral wording: the triggering observation goes
            // into the payload, not the description, so other agents don't
            // re-perceive its disruption markers next tick.
            let mut draft = EventDraft::world_event(format!("{} changed plans", agent.name))
                .with_data(json!({
                    "scope": format!("{scope:?}").to_lowercase(),
                    "observation": observation,
                }));
            draft.agent_id = Some(agent.id);
            self.events.process(agent.world_id, now, draft).await?;
        }

        // ── Act ───────────────────────────────────────────────────────────
        let step = self.planner.take_minute_step(&mut agent, now).await?;
        let kind = classify_action(&step.action);
        let data = self.dispatch(&mut agent, kind, &step, ctx, &neighbours, now).await?;
        agent.current_action = step.action.clone();

        let agent = match self.persist_agent(agent).await? {
            Some(agent) => agent,
            // Deleted while we were thinking: no event, no reflection.
            None => return Ok(None),
        };

        // ── Record ────────────────────────────────────────────────────────
        let draft = EventDraft::agent_action(
            agent.id,
            format!("{} {}", agent.name, step.action),
        )
        .with_data(data);
        let event = self.events.process(agent.world_id, now, draft).await?;

        // ── Reflection (asynchronous, detached) ───────────────────────────
        let reflector = self.reflector.clone();
        let snapshot = agent.clone();
        tokio::spawn(async move {
            if let Err(e) = reflector.maybe_reflect(&snapshot, now).await {
                debug!(agent = %snapshot.id, error = %e, "reflection pass failed");
            }
        });

        Ok(Some(CycleOutcome {
            agent_id: agent.id,
            action: step.action,
            kind,
            replanned: scope.is_replan(),
            event: Some(event),
        }))
    }

    // ── Action dispatch ───────────────────────────────────────────────────

    /// Execute the classified minute step.  Returns the structured payload
    /// for the `agent_action` event.
    async fn dispatch(
        &self,
        agent: &mut Agent,
        kind: ActionKind,
        step: &MinuteStep,
        ctx: &TickContext<'_>,
        neighbours: &[&Agent],
        now: DateTime<Utc>,
    ) -> AgentResult<serde_json::Value> {
        match kind {
            ActionKind::Move => {
                let destination = find_destination(&step.action, ctx.world, ctx.agents);
                if let Some((position, label)) = destination {
                    agent.position = position;
                    agent
                        .position
                        .clamp_to(ctx.world.settings.width, ctx.world.settings.height);
                    Ok(json!({ "kind": "move", "to": label, "x": agent.position.x, "y": agent.position.y }))
                } else {
                    Ok(json!({ "kind": "move", "to": serde_json::Value::Null }))
                }
            }

            ActionKind::Communicate => {
                let target = pick_interlocutor(&step.action, neighbours);
                match target {
                    None => Ok(json!({ "kind": "communicate", "target": serde_json::Value::Null })),
                    Some(target) => {
                        let utterance = self.produce_utterance(agent, target, step).await;
                        agent
                            .relationships
                            .entry(target.id)
                            .or_insert_with(|| "acquaintance".to_owned());
                        Ok(json!({
                            "kind": "communicate",
                            "target": target.id.to_string(),
                            "target_name": target.name,
                            "utterance": utterance,
                        }))
                    }
                }
            }

            ActionKind::Interact => {
                let changed = self.apply_interaction(agent.world_id, &agent.name, &step.action).await?;
                Ok(json!({ "kind": "interact", "object": changed }))
            }

            ActionKind::Observe => {
                let extra = format!("Deliberately looked around: {}", step.action);
                self.stream
                    .add_memory(agent, MemoryDraft::observation(agent.world_id, extra), now)
                    .await?;
                Ok(json!({ "kind": "observe" }))
            }

            ActionKind::General => Ok(json!({ "kind": "general" })),
        }
    }

    /// Ask the gateway for a dialogue line; degrade to a canned greeting.
    async fn produce_utterance(&self, speaker: &Agent, target: &Agent, step: &MinuteStep) -> String {
        let relation = speaker
            .relationships
            .get(&target.id)
            .cloned()
            .unwrap_or_else(|| "stranger".to_owned());
        let vars = json!({
            "speaker": speaker.context_line(),
            "persona": speaker.persona,
            "listener": target.name,
            "relationship": relation,
            "intent": step.action,
        });
        let request = CompletionRequest::new(CompletionTask::Dialogue, speaker.world_id, vars)
            .expecting(UTTERANCE_SHAPE);
        match self.lm.complete(request).await {
            Ok(value) => value["utterance"].as_str().unwrap_or_default().to_owned(),
            Err(e) => {
                debug!(agent = %speaker.id, error = %e, "dialogue degraded to greeting");
                format!("Hello {}.", target.name)
            }
        }
    }

    /// Mutate the named world object's state through the store, retrying
    /// one version conflict.  Returns the object name when something
    /// changed.
    async fn apply_interaction(
        &self,
        world_id: WorldId,
        agent_name: &str,
        action: &str,
    ) -> AgentResult<Option<String>> {
        for attempt in 0..2 {
            let mut world = self.store.get_world(world_id).await?;
            let lowered = action.to_lowercase();
            let name = match world
                .objects
                .iter()
                .find(|o| lowered.contains(&o.name.to_lowercase()))
                .map(|o| o.name.clone())
            {
                None => return Ok(None),
                Some(name) => name,
            };
            let state = infer_object_state(&lowered, agent_name);
            if let Some(object) = world.object_mut(&name) {
                object.state = state;
            }
            match self.store.put_world(&world).await {
                Ok(_) => return Ok(Some(name)),
                Err(StoreError::Conflict { .. }) if attempt == 0 => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(None)
    }

    /// Persist the cycle's mutations.  On a version conflict the cycle's
    /// fields are re-applied over the fresh record once; a mid-cycle
    /// deletion aborts with `None`.
    async fn persist_agent(&self, agent: Agent) -> AgentResult<Option<Agent>> {
        match self.store.put_agent(&agent).await {
            Ok(stored) => Ok(Some(stored)),
            Err(StoreError::Conflict { .. }) => {
                let fresh = match self.store.get_agent(agent.id).await {
                    Ok(fresh) => fresh,
                    Err(e) if e.is_not_found() => return Ok(None),
                    Err(e) => return Err(e.into()),
                };
                if !fresh.is_active() {
                    return Ok(None);
                }
                warn!(agent = %agent.id, "agent record conflicted mid-cycle, merging");
                let mut merged = fresh;
                merged.position = agent.position;
                merged.current_action = agent.current_action;
                merged.plans = agent.plans;
                merged.relationships = agent.relationships;
                Ok(Some(self.store.put_agent(&merged).await?))
            }
            Err(e) => Err(e.into()),
        }
    }
}

// ── Target resolution helpers ────────────────────────────────────────────────

/// Resolve a movement destination named in `action`: a world object first,
/// then another agent to approach.
fn find_destination(
    action: &str,
    world: &World,
    agents: &[Agent],
) -> Option<(gw_core::Position, String)> {
    let lowered = action.to_lowercase();
    if let Some(object) = world
        .objects
        .iter()
        .find(|o| lowered.contains(&o.name.to_lowercase()))
    {
        return Some((object.position.clone(), object.name.clone()));
    }
    agents
        .iter()
        .find(|a| a.is_active() && lowered.contains(&a.name.to_lowercase()))
        .map(|a| (a.position.clone(), a.name.clone()))
}

/// Pick who to talk to: the neighbour named in the step, else the first
/// neighbour present.
fn pick_interlocutor<'a>(action: &str, neighbours: &[&'a Agent]) -> Option<&'a Agent> {
    let lowered = action.to_lowercase();
    neighbours
        .iter()
        .find(|n| lowered.contains(&n.name.to_lowercase()))
        .copied()
        .or_else(|| neighbours.first().copied())
}

/// Derive the object's new state from the action phrasing.
fn infer_object_state(lowered_action: &str, agent_name: &str) -> String {
    if lowered_action.contains("turn on") || lowered_action.contains("switch on") {
        "on".to_owned()
    } else if lowered_action.contains("turn off") || lowered_action.contains("switch off") {
        "off".to_owned()
    } else if lowered_action.contains("open") {
        "open".to_owned()
    } else if lowered_action.contains("close") {
        "closed".to_owned()
    } else {
        format!("in use by {agent_name}")
    }
}
