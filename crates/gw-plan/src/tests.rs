//! Tests for gw-plan.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use gw_core::*;
use gw_lm::{CompletionTask, ScriptedLm};
use gw_memory::MemoryStream;
use gw_store::{MemStore, Store};
use serde_json::json;

use crate::{classify_action, ActionKind, PlanningEngine, ReplanPolicy, ReplanScope};

// ── Helpers ───────────────────────────────────────────────────────────────────

const DIM: usize = 4;

fn sim_t(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap() + Duration::seconds(secs)
}

struct Env {
    engine: PlanningEngine,
    store: Arc<MemStore>,
    lm: Arc<ScriptedLm>,
    agent: Agent,
}

fn env() -> Env {
    let store = Arc::new(MemStore::new());
    let lm = Arc::new(ScriptedLm::new(DIM));
    let cfg = Arc::new(RuntimeConfig { embed_dim: DIM, ..RuntimeConfig::default() });
    let stream = MemoryStream::new(store.clone(), lm.clone(), cfg);
    let engine = PlanningEngine::new(lm.clone(), stream);
    let mut agent = Agent::new(WorldId::new(), "Ada", Position::new(0.0, 0.0, "park"));
    agent.goals = vec!["make friends".into()];
    Env { engine, store, lm, agent }
}

impl Env {
    fn script_daily(&self, activities: &[&str]) {
        self.lm.push_completion(
            CompletionTask::Planning,
            Ok(json!({ "activities": activities, "goals": ["make friends"] })),
        );
    }

    fn script_hourly(&self, actions: &[&str]) {
        self.lm
            .push_completion(CompletionTask::Planning, Ok(json!({ "actions": actions })));
    }

    fn script_minute(&self, action: &str) {
        self.lm.push_completion(
            CompletionTask::Planning,
            Ok(json!({ "action": action, "reasoning": "it seemed right" })),
        );
    }
}

// ── Action classification ─────────────────────────────────────────────────────

mod action_tests {
    use super::*;

    #[test]
    fn keyword_groups_map_to_kinds() {
        assert_eq!(classify_action("walk to the cafe"), ActionKind::Move);
        assert_eq!(classify_action("tell Bob about the storm"), ActionKind::Communicate);
        assert_eq!(classify_action("turn on the stove"), ActionKind::Interact);
        assert_eq!(classify_action("examine the noticeboard"), ActionKind::Observe);
        assert_eq!(classify_action("ponder the meaning of it all"), ActionKind::General);
    }

    #[test]
    fn dialogue_and_interaction_win_over_movement() {
        assert_eq!(classify_action("go talk to Bob"), ActionKind::Communicate);
        assert_eq!(classify_action("go use the stove"), ActionKind::Interact);
    }

    #[test]
    fn classification_is_case_insensitive() {
        assert_eq!(classify_action("WALK NORTH"), ActionKind::Move);
    }
}

// ── Replan policy ─────────────────────────────────────────────────────────────

mod replan_tests {
    use super::*;

    fn minute(action: &str) -> MinuteStep {
        MinuteStep { action: action.into(), reasoning: String::new(), generated_at: sim_t(0) }
    }

    #[test]
    fn disruption_marker_invalidates_the_minute() {
        let policy = ReplanPolicy::default();
        let step = minute("walk to cafe");
        assert_eq!(
            policy.assess("the road is blocked by a fallen tree", Some(&step)),
            ReplanScope::Minute
        );
    }

    #[test]
    fn significant_marker_escalates_to_hourly() {
        let policy = ReplanPolicy::default();
        assert_eq!(
            policy.assess("there is an emergency at the market", None),
            ReplanScope::Hourly
        );
        assert_eq!(policy.assess("urgent: everyone is leaving", None), ReplanScope::Hourly);
    }

    #[test]
    fn contradiction_of_the_minute_step_invalidates_it() {
        let policy = ReplanPolicy::default();
        let step = minute("walk to cafe");
        assert_eq!(policy.assess("the cafe is closed today", Some(&step)), ReplanScope::Minute);
    }

    #[test]
    fn unrelated_negation_is_ignored() {
        let policy = ReplanPolicy::default();
        let step = minute("walk to cafe");
        assert_eq!(policy.assess("the library is closed today", Some(&step)), ReplanScope::None);
        assert_eq!(policy.assess("birds sing in the park", Some(&step)), ReplanScope::None);
    }

    #[test]
    fn calm_observation_without_a_minute_step_keeps_plans() {
        let policy = ReplanPolicy::default();
        assert_eq!(policy.assess("a quiet morning in the square", None), ReplanScope::None);
    }
}

// ── Plan generation ───────────────────────────────────────────────────────────

mod engine_tests {
    use super::*;

    #[tokio::test]
    async fn daily_plan_is_generated_and_remembered() {
        let mut env = env();
        env.script_daily(&["open the shop", "greet customers", "close up"]);

        env.engine.ensure_daily(&mut env.agent, sim_t(0)).await.unwrap();
        let daily = env.agent.plans.daily.as_ref().unwrap();
        assert_eq!(daily.activities.len(), 3);
        assert_eq!(daily.date, sim_t(0).date_naive());

        // The plan is also a memory of kind `plan`.
        let memories = env.store.list_memories_by_agent(env.agent.id, None).await.unwrap();
        assert_eq!(memories.len(), 1);
        assert_eq!(memories[0].kind, MemoryKind::Plan);
        assert!(memories[0].content.contains("open the shop"));

        // Same day: no regeneration, no extra LM call.
        let calls_before = env.lm.completion_calls().len();
        env.engine.ensure_daily(&mut env.agent, sim_t(60)).await.unwrap();
        assert_eq!(env.lm.completion_calls().len(), calls_before);
    }

    #[tokio::test]
    async fn date_rollover_regenerates_and_clears_finer_layers() {
        let mut env = env();
        env.script_daily(&["day one"]);
        env.engine.ensure_daily(&mut env.agent, sim_t(0)).await.unwrap();
        env.agent.plans.minute = Some(MinuteStep {
            action: "linger".into(),
            reasoning: String::new(),
            generated_at: sim_t(0),
        });

        env.script_daily(&["day two"]);
        let tomorrow = sim_t(24 * 3_600);
        env.engine.ensure_daily(&mut env.agent, tomorrow).await.unwrap();
        let daily = env.agent.plans.daily.as_ref().unwrap();
        assert_eq!(daily.activities, vec!["day two"]);
        assert!(env.agent.plans.minute.is_none());
    }

    #[tokio::test]
    async fn outage_produces_the_default_plan_stack() {
        let mut env = env();
        env.lm.fail_everything();

        let step = env.engine.take_minute_step(&mut env.agent, sim_t(0)).await.unwrap();
        assert_eq!(step.action, "observe the surroundings and choose the next action");

        let daily = env.agent.plans.daily.as_ref().unwrap();
        assert_eq!(daily.activities.len(), 8);
        assert_eq!(daily.goals, vec!["make friends"]);
        let hourly = env.agent.plans.hourly.as_ref().unwrap();
        assert!(hourly.actions.iter().all(|a| a.contains(&hourly.activity)));
    }

    #[tokio::test]
    async fn minute_step_is_consumed_on_take() {
        let mut env = env();
        env.script_daily(&["wander"]);
        env.script_hourly(&["stroll the park"]);
        env.script_minute("walk to the fountain");

        let step = env.engine.take_minute_step(&mut env.agent, sim_t(0)).await.unwrap();
        assert_eq!(step.action, "walk to the fountain");
        assert!(env.agent.plans.minute.is_none());

        // Next take generates a fresh one (scripted queue now empty → default).
        let next = env.engine.take_minute_step(&mut env.agent, sim_t(60)).await.unwrap();
        assert_eq!(next.action, "observe the surroundings and choose the next action");
    }

    #[tokio::test]
    async fn minute_replan_installs_a_new_step() {
        let mut env = env();
        env.script_daily(&["errands"]);
        env.script_hourly(&["walk to cafe", "order coffee"]);
        env.script_minute("walk to cafe");
        let step = env.engine.take_minute_step(&mut env.agent, sim_t(0)).await.unwrap();
        env.agent.plans.minute = Some(step);

        let scope = env.engine.assess_replan("the cafe is cancelled today", &env.agent);
        assert_eq!(scope, ReplanScope::Minute);

        env.script_minute("head home instead");
        env.engine.replan(&mut env.agent, scope, sim_t(60)).await.unwrap();
        let replanned = env.agent.plans.minute.as_ref().unwrap();
        assert_eq!(replanned.action, "head home instead");
    }

    #[tokio::test]
    async fn hourly_replan_regenerates_the_hour() {
        let mut env = env();
        env.script_daily(&["errands"]);
        env.script_hourly(&["walk to market"]);
        env.script_minute("walk to market");
        let step = env.engine.take_minute_step(&mut env.agent, sim_t(0)).await.unwrap();
        env.agent.plans.minute = Some(step);
        let old_hourly = env.agent.plans.hourly.clone().unwrap();

        let scope = env.engine.assess_replan("emergency at the market", &env.agent);
        assert_eq!(scope, ReplanScope::Hourly);

        env.script_hourly(&["help at the market", "check on neighbours"]);
        env.script_minute("run to the market square");
        env.engine.replan(&mut env.agent, scope, sim_t(60)).await.unwrap();
        let new_hourly = env.agent.plans.hourly.as_ref().unwrap();
        assert_ne!(new_hourly.actions, old_hourly.actions);
        assert_eq!(env.agent.plans.minute.as_ref().unwrap().action, "run to the market square");
    }
}
