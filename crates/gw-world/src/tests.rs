//! Integration tests for gw-world.

use std::sync::Arc;
use std::time::Duration;

use gw_core::*;
use gw_lm::{FailingLm, LanguageModel, ScriptedLm};
use gw_store::MemStore;

use crate::{WorldError, WorldRuntime};

// ── Helpers ───────────────────────────────────────────────────────────────────

fn runtime_with(lm: Arc<dyn LanguageModel>) -> WorldRuntime {
    let cfg = Arc::new(RuntimeConfig {
        embed_dim: 4,
        base_tick_ms: 25,
        tick_len_secs: 60,
        ..RuntimeConfig::default()
    });
    WorldRuntime::new(Arc::new(MemStore::new()), lm, cfg)
}

fn runtime() -> WorldRuntime {
    runtime_with(Arc::new(ScriptedLm::new(4)))
}

async fn spawn_ada(rt: &WorldRuntime, world: WorldId) -> Agent {
    rt.spawn_agent(
        world,
        "Ada",
        Position::new(0.0, 0.0, "park"),
        vec!["curious".into()],
        vec!["make friends".into()],
        "a friendly newcomer".into(),
    )
    .await
    .unwrap()
}

// ── Lifecycle ─────────────────────────────────────────────────────────────────

mod lifecycle_tests {
    use super::*;

    #[tokio::test]
    async fn create_then_start_shows_running() {
        let rt = runtime();
        let world = rt.create_world("W1", "").await.unwrap();
        assert_eq!(world.status, WorldStatus::Stopped);

        let started = rt.start(world.id).await.unwrap();
        assert_eq!(started.status, WorldStatus::Running);
        assert_eq!(rt.get_world(world.id).await.unwrap().status, WorldStatus::Running);

        rt.stop(world.id).await.unwrap();
        assert_eq!(rt.get_world(world.id).await.unwrap().status, WorldStatus::Stopped);
    }

    #[tokio::test]
    async fn driver_ticks_and_pause_freezes_the_clock() {
        let rt = runtime();
        let world = rt.create_world("W1", "").await.unwrap();
        rt.start(world.id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        let paused = rt.pause(world.id).await.unwrap();
        assert_eq!(paused.status, WorldStatus::Paused);
        // Let any in-flight tick drain before sampling the frozen clock.
        tokio::time::sleep(Duration::from_millis(100)).await;
        let frozen = rt.get_world(world.id).await.unwrap().clock;
        assert!(frozen.tick.0 >= 1, "expected at least one tick, got {}", frozen.tick);

        // Paused: the clock must not move.
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(rt.get_world(world.id).await.unwrap().clock.tick, frozen.tick);

        // Resumed: it must move again.
        rt.resume(world.id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        rt.stop(world.id).await.unwrap();
        assert!(rt.get_world(world.id).await.unwrap().clock.tick > frozen.tick);
    }

    #[tokio::test]
    async fn invalid_transitions_are_rejected() {
        let rt = runtime();
        let world = rt.create_world("W1", "").await.unwrap();

        assert!(matches!(
            rt.pause(world.id).await.unwrap_err(),
            WorldError::InvalidTransition { op: "pause", .. }
        ));
        assert!(matches!(
            rt.resume(world.id).await.unwrap_err(),
            WorldError::InvalidTransition { op: "resume", .. }
        ));
        assert!(matches!(
            rt.stop(world.id).await.unwrap_err(),
            WorldError::InvalidTransition { op: "stop", .. }
        ));

        rt.start(world.id).await.unwrap();
        assert!(matches!(
            rt.start(world.id).await.unwrap_err(),
            WorldError::InvalidTransition { op: "start", .. }
        ));
        assert!(matches!(
            rt.advance(world.id, 1).await.unwrap_err(),
            WorldError::InvalidTransition { op: "advance", .. }
        ));
        rt.stop(world.id).await.unwrap();
    }

    #[tokio::test]
    async fn missing_world_is_not_found() {
        let rt = runtime();
        let err = rt.start(WorldId::new()).await.unwrap_err();
        assert!(err.is_not_found());
    }
}

// ── Time control ──────────────────────────────────────────────────────────────

mod time_tests {
    use super::*;

    #[tokio::test]
    async fn manual_advance_steps_the_clock() {
        let rt = runtime();
        let world = rt.create_world("W1", "").await.unwrap();
        let start = world.clock.sim_time;

        rt.advance(world.id, 3).await.unwrap();
        let clock = rt.get_world(world.id).await.unwrap().clock;
        assert_eq!(clock.tick, Tick(3));
        assert_eq!((clock.sim_time - start).num_seconds(), 3 * 60);
    }

    #[tokio::test]
    async fn speed_multiplier_scales_simulated_time() {
        let rt = runtime();
        let world = rt.create_world("W1", "").await.unwrap();
        let start = world.clock.sim_time;

        rt.set_speed(world.id, 2.0).await.unwrap();
        rt.advance(world.id, 1).await.unwrap();
        let clock = rt.get_world(world.id).await.unwrap().clock;
        assert_eq!((clock.sim_time - start).num_seconds(), 120);
    }

    #[tokio::test]
    async fn nonpositive_speed_is_rejected() {
        let rt = runtime();
        let world = rt.create_world("W1", "").await.unwrap();
        assert!(matches!(
            rt.set_speed(world.id, 0.0).await.unwrap_err(),
            WorldError::Validation(_)
        ));
        assert!(rt.set_speed(world.id, -1.5).await.is_err());
    }
}

// ── Agents and ticks ──────────────────────────────────────────────────────────

mod tick_tests {
    use super::*;

    #[tokio::test]
    async fn one_tick_yields_one_agent_action_for_ada() {
        let rt = runtime();
        let world = rt.create_world("W1", "").await.unwrap();
        let ada = spawn_ada(&rt, world.id).await;

        let report = rt.advance(world.id, 1).await.unwrap();
        assert_eq!(report.completed, 1);

        let events = rt.store().list_events_by_world(world.id, None, None).await.unwrap();
        let actions: Vec<_> =
            events.iter().filter(|e| e.kind == EventKind::AgentAction).collect();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].agent_id, Some(ada.id));
    }

    #[tokio::test]
    async fn event_order_is_strictly_increasing_per_world() {
        let rt = runtime();
        let world = rt.create_world("W1", "").await.unwrap();
        spawn_ada(&rt, world.id).await;
        rt.advance(world.id, 3).await.unwrap();

        let events = rt.store().list_events_by_world(world.id, None, None).await.unwrap();
        assert!(events.len() >= 4);
        for pair in events.windows(2) {
            assert!((pair[0].sim_time, pair[0].seq) < (pair[1].sim_time, pair[1].seq));
        }
    }

    #[tokio::test]
    async fn agent_cap_is_enforced() {
        let rt = runtime();
        let mut world = rt.create_world("W1", "").await.unwrap();
        world.settings.max_agents = 1;
        let world = rt.update_world(&world).await.unwrap();

        spawn_ada(&rt, world.id).await;
        let err = rt
            .spawn_agent(world.id, "Bob", Position::default(), vec![], vec![], String::new())
            .await
            .unwrap_err();
        assert!(matches!(err, WorldError::Validation(_)));
    }

    #[tokio::test]
    async fn removed_agent_stops_producing_events() {
        let rt = runtime();
        let world = rt.create_world("W1", "").await.unwrap();
        let ada = spawn_ada(&rt, world.id).await;
        rt.remove_agent(ada.id).await.unwrap();

        let report = rt.advance(world.id, 2).await.unwrap();
        assert_eq!(report.completed, 0);
        let events = rt.store().list_events_by_world(world.id, None, None).await.unwrap();
        assert!(events.iter().all(|e| e.kind != EventKind::AgentAction));
    }
}

// ── Snapshots ─────────────────────────────────────────────────────────────────

mod snapshot_tests {
    use super::*;

    #[tokio::test]
    async fn snapshot_then_restore_rewinds_state() {
        let rt = runtime();
        let world = rt.create_world("W1", "").await.unwrap();
        let ada = spawn_ada(&rt, world.id).await;
        rt.advance(world.id, 1).await.unwrap();

        let memories_before =
            rt.store().list_memories_by_agent(ada.id, None).await.unwrap();
        assert!(!memories_before.is_empty());
        let snapshot = rt.take_snapshot(world.id, "checkpoint", "").await.unwrap();
        assert_eq!(snapshot.agent_count, 1);

        // Diverge: move Ada, add Bob, advance further.
        let mut moved = rt.store().get_agent(ada.id).await.unwrap();
        moved.position = Position::new(9.0, 9.0, "harbour");
        rt.store().put_agent(&moved).await.unwrap();
        rt.spawn_agent(world.id, "Bob", Position::default(), vec![], vec![], String::new())
            .await
            .unwrap();
        rt.advance(world.id, 2).await.unwrap();

        let restored = rt.restore_snapshot(world.id, snapshot.id).await.unwrap();
        assert_eq!(restored.clock.tick, Tick(1));

        let roster = rt.list_agents(world.id).await.unwrap();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].id, ada.id);
        assert_eq!((roster[0].position.x, roster[0].position.y), (0.0, 0.0));

        let memories_after = rt.store().list_memories_by_agent(ada.id, None).await.unwrap();
        let ids = |ms: &[Memory]| {
            let mut v: Vec<MemoryId> = ms.iter().map(|m| m.id).collect();
            v.sort();
            v
        };
        assert_eq!(ids(&memories_after), ids(&memories_before));
    }

    #[tokio::test]
    async fn restore_refuses_a_running_world() {
        let rt = runtime();
        let world = rt.create_world("W1", "").await.unwrap();
        let snapshot = rt.take_snapshot(world.id, "s", "").await.unwrap();
        rt.start(world.id).await.unwrap();
        assert!(matches!(
            rt.restore_snapshot(world.id, snapshot.id).await.unwrap_err(),
            WorldError::InvalidTransition { op: "restore", .. }
        ));
        rt.stop(world.id).await.unwrap();
    }

    #[tokio::test]
    async fn delete_world_archives_a_final_snapshot_then_cascades() {
        let rt = runtime();
        let world = rt.create_world("W1", "").await.unwrap();
        let ada = spawn_ada(&rt, world.id).await;
        rt.advance(world.id, 1).await.unwrap();

        let snapshot = rt.delete_world(world.id).await.unwrap();
        assert_eq!(snapshot.name, "final");

        assert!(rt.get_world(world.id).await.unwrap_err().is_not_found());
        assert!(rt.get_agent(ada.id).await.unwrap_err().is_not_found());
        assert!(rt
            .store()
            .list_events_by_world(world.id, None, None)
            .await
            .unwrap()
            .is_empty());

        // The archive outlives the world.
        let archived = rt.list_snapshots(world.id).await.unwrap();
        assert_eq!(archived.len(), 1);
        assert!(rt.store().get_blob(&archived[0].location).await.is_ok());
    }
}

// ── Degradation ───────────────────────────────────────────────────────────────

mod outage_tests {
    use super::*;

    #[tokio::test]
    async fn worlds_survive_a_total_lm_outage() {
        let rt = runtime_with(Arc::new(FailingLm));
        let world = rt.create_world("dark-times", "").await.unwrap();
        spawn_ada(&rt, world.id).await;
        let bob = rt
            .spawn_agent(world.id, "Bob", Position::new(1.0, 0.0, "park"), vec![], vec![], String::new())
            .await
            .unwrap();

        let report = rt.advance(world.id, 2).await.unwrap();
        assert_eq!(report.completed, 4);
        assert_eq!(report.halted, 0);

        // Events keep flowing, plans fall back, reflection is skipped.
        let events = rt.store().list_events_by_world(world.id, None, None).await.unwrap();
        assert!(events.iter().any(|e| e.kind == EventKind::AgentAction));
        let memories = rt.store().list_memories_by_agent(bob.id, None).await.unwrap();
        assert!(memories.iter().all(|m| m.kind != MemoryKind::Reflection));
        assert_eq!(rt.get_world(world.id).await.unwrap().status, WorldStatus::Stopped);
    }
}
