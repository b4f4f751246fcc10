//! The `PlanningEngine` — layer generation, fallbacks, and replanning.

use std::sync::Arc;

use chrono::{DateTime, Timelike, Utc};
use gw_core::{Agent, DailyPlan, HourlyPlan, MemoryDraft, MemoryKind, MinuteStep};
use gw_lm::{CompletionRequest, CompletionTask, JsonKind, LanguageModel};
use gw_memory::MemoryStream;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::replan::{ReplanPolicy, ReplanScope};
use crate::PlanResult;

/// Memories retrieved to ground each generation prompt.
const GROUNDING_LIMIT: usize = 5;
/// Upper bound on daily activities kept from the model.
const MAX_ACTIVITIES: usize = 8;

const DAILY_SHAPE: &[(&str, JsonKind)] =
    &[("activities", JsonKind::Array), ("goals", JsonKind::Array)];
const HOURLY_SHAPE: &[(&str, JsonKind)] = &[("actions", JsonKind::Array)];
const MINUTE_SHAPE: &[(&str, JsonKind)] = &[("action", JsonKind::String)];

// ── PlanningEngine ───────────────────────────────────────────────────────────

/// Generates and maintains the three plan layers on an agent record.
///
/// The engine mutates `agent.plans` in place; persisting the agent is the
/// caller's job (the agent loop writes the record once per tick).
#[derive(Clone)]
pub struct PlanningEngine {
    lm: Arc<dyn LanguageModel>,
    stream: MemoryStream,
    policy: ReplanPolicy,
}

impl PlanningEngine {
    pub fn new(lm: Arc<dyn LanguageModel>, stream: MemoryStream) -> Self {
        Self { lm, stream, policy: ReplanPolicy::default() }
    }

    pub fn with_policy(mut self, policy: ReplanPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The reactive-replan policy in force.
    pub fn policy(&self) -> &ReplanPolicy {
        &self.policy
    }

    // ── Layer maintenance ─────────────────────────────────────────────────

    /// Make sure the agent has a daily plan for the current simulated day.
    ///
    /// A date rollover regenerates the plan and invalidates the finer
    /// layers.  A freshly generated plan is also recorded as a `Plan`
    /// memory so future retrieval can recall what the agent set out to do.
    pub async fn ensure_daily(&self, agent: &mut Agent, now: DateTime<Utc>) -> PlanResult<()> {
        let today = now.date_naive();
        if agent.plans.daily.as_ref().is_some_and(|d| d.date == today) {
            return Ok(());
        }

        let daily = match self.generate_daily(agent, now).await {
            Some(plan) => plan,
            None => {
                warn!(agent = %agent.id, "daily planning degraded to default");
                default_daily(agent, now)
            }
        };

        let summary = format!("Planned the day: {}", daily.activities.join("; "));
        let mut draft = MemoryDraft::observation(agent.world_id, summary);
        draft.kind = MemoryKind::Plan;
        draft.tags = vec!["plan".into()];
        self.stream.add_memory(agent, draft, now).await?;

        agent.plans.daily = Some(daily);
        agent.plans.clear_hourly();
        Ok(())
    }

    /// Make sure the hourly plan expands the activity the daily plan puts
    /// in the current hour.
    pub async fn ensure_hourly(&self, agent: &mut Agent, now: DateTime<Utc>) -> PlanResult<()> {
        self.ensure_daily(agent, now).await?;
        let activity = agent
            .plans
            .daily
            .as_ref()
            .and_then(|d| d.activity_for_hour(now.hour()))
            .unwrap_or("go about the day")
            .to_owned();
        if agent.plans.hourly.as_ref().is_some_and(|h| h.activity == activity) {
            return Ok(());
        }

        let hourly = match self.generate_hourly(agent, &activity, now).await {
            Some(plan) => plan,
            None => {
                debug!(agent = %agent.id, "hourly planning degraded to default");
                default_hourly(&activity, now)
            }
        };
        agent.plans.hourly = Some(hourly);
        agent.plans.clear_minute();
        Ok(())
    }

    /// Take the pending minute step, generating one when absent.
    ///
    /// Consuming semantics: the returned step is removed from the bundle,
    /// so the next tick plans afresh unless a replan installed a new one.
    pub async fn take_minute_step(
        &self,
        agent: &mut Agent,
        now: DateTime<Utc>,
    ) -> PlanResult<MinuteStep> {
        self.ensure_hourly(agent, now).await?;
        if let Some(step) = agent.plans.minute.take() {
            return Ok(step);
        }
        Ok(self.fresh_minute_step(agent, now).await)
    }

    // ── Reactive replanning ───────────────────────────────────────────────

    /// Does `observation` invalidate the current plans, and how far up?
    pub fn assess_replan(&self, observation: &str, agent: &Agent) -> ReplanScope {
        self.policy.assess(observation, agent.plans.minute.as_ref())
    }

    /// Apply a replan decision: regenerate the invalidated layers and
    /// install a fresh minute step for the next act.
    pub async fn replan(
        &self,
        agent: &mut Agent,
        scope: ReplanScope,
        now: DateTime<Utc>,
    ) -> PlanResult<()> {
        match scope {
            ReplanScope::None => return Ok(()),
            ReplanScope::Minute => agent.plans.clear_minute(),
            ReplanScope::Hourly => {
                agent.plans.clear_hourly();
                self.ensure_hourly(agent, now).await?;
            }
        }
        let step = self.fresh_minute_step(agent, now).await;
        agent.plans.minute = Some(step);
        Ok(())
    }

    // ── Generation ────────────────────────────────────────────────────────

    async fn grounding(&self, agent: &Agent, query: &str, now: DateTime<Utc>) -> Vec<String> {
        match self.stream.retrieve_relevant(agent.id, query, GROUNDING_LIMIT, None, now).await {
            Ok(memories) => memories.into_iter().map(|m| m.content).collect(),
            Err(e) => {
                debug!(agent = %agent.id, error = %e, "grounding retrieval failed");
                Vec::new()
            }
        }
    }

    /// `None` = gateway unavailable or unusable output; caller falls back.
    async fn generate_daily(&self, agent: &Agent, now: DateTime<Utc>) -> Option<DailyPlan> {
        let query = if agent.goals.is_empty() {
            format!("what should {} do today", agent.name)
        } else {
            agent.goals.join(", ")
        };
        let recent = self.grounding(agent, &query, now).await;
        let vars = json!({
            "layer": "daily",
            "agent": agent.context_line(),
            "persona": agent.persona,
            "date": now.date_naive().to_string(),
            "recent": recent,
        });
        let request = CompletionRequest::new(CompletionTask::Planning, agent.world_id, vars)
            .expecting(DAILY_SHAPE);
        let value = self.lm.complete(request).await.ok()?;

        let activities: Vec<String> = string_array(&value["activities"], MAX_ACTIVITIES);
        if activities.is_empty() {
            return None;
        }
        let mut goals = string_array(&value["goals"], MAX_ACTIVITIES);
        if goals.is_empty() {
            goals = agent.goals.clone();
        }
        Some(DailyPlan { date: now.date_naive(), goals, activities })
    }

    async fn generate_hourly(
        &self,
        agent: &Agent,
        activity: &str,
        now: DateTime<Utc>,
    ) -> Option<HourlyPlan> {
        let recent = self.grounding(agent, activity, now).await;
        let vars = json!({
            "layer": "hourly",
            "agent": agent.context_line(),
            "activity": activity,
            "recent": recent,
        });
        let request = CompletionRequest::new(CompletionTask::Planning, agent.world_id, vars)
            .expecting(HOURLY_SHAPE);
        let value = self.lm.complete(request).await.ok()?;

        let actions = string_array(&value["actions"], 12);
        if actions.is_empty() {
            return None;
        }
        Some(HourlyPlan { activity: activity.to_owned(), actions, generated_at: now })
    }

    async fn fresh_minute_step(&self, agent: &Agent, now: DateTime<Utc>) -> MinuteStep {
        match self.generate_minute(agent, now).await {
            Some(step) => step,
            None => {
                debug!(agent = %agent.id, "minute planning degraded to default");
                default_minute(now)
            }
        }
    }

    async fn generate_minute(&self, agent: &Agent, now: DateTime<Utc>) -> Option<MinuteStep> {
        let hourly = agent.plans.hourly.as_ref();
        let context = hourly.map_or("the current situation", |h| h.activity.as_str());
        let recent = self.grounding(agent, context, now).await;
        let vars = json!({
            "layer": "minute",
            "agent": agent.context_line(),
            "activity": context,
            "actions": hourly.map(|h| h.actions.clone()).unwrap_or_default(),
            "current_action": agent.current_action,
            "recent": recent,
        });
        let request = CompletionRequest::new(CompletionTask::Planning, agent.world_id, vars)
            .expecting(MINUTE_SHAPE);
        let value = self.lm.complete(request).await.ok()?;

        let action = value["action"].as_str()?.trim().to_owned();
        if action.is_empty() {
            return None;
        }
        let reasoning = value["reasoning"].as_str().unwrap_or_default().to_owned();
        Some(MinuteStep { action, reasoning, generated_at: now })
    }
}

// ── Fallback plans ───────────────────────────────────────────────────────────

fn default_daily(agent: &Agent, now: DateTime<Utc>) -> DailyPlan {
    let goals = if agent.goals.is_empty() {
        vec!["get through the day".to_owned()]
    } else {
        agent.goals.clone()
    };
    DailyPlan {
        date: now.date_naive(),
        goals,
        activities: [
            "wake up and get ready",
            "have breakfast",
            "work toward current goals",
            "have lunch",
            "continue the day's main activity",
            "spend time with people nearby",
            "have dinner",
            "wind down and rest",
        ]
        .map(str::to_owned)
        .to_vec(),
    }
}

fn default_hourly(activity: &str, now: DateTime<Utc>) -> HourlyPlan {
    HourlyPlan {
        activity: activity.to_owned(),
        actions: vec![format!("continue {activity}"), format!("wrap up {activity}")],
        generated_at: now,
    }
}

fn default_minute(now: DateTime<Utc>) -> MinuteStep {
    MinuteStep {
        action: "observe the surroundings and choose the next action".to_owned(),
        reasoning: "planner unavailable".to_owned(),
        generated_at: now,
    }
}

/// Non-empty strings of `value`, truncated to `cap`.
fn string_array(value: &Value, cap: usize) -> Vec<String> {
    value
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .take(cap)
        .map(str::to_owned)
        .collect()
}
