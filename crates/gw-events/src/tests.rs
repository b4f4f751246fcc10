//! Tests for gw-events.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use gw_core::*;
use gw_store::{MemStore, Store};

use crate::{CsvEventLog, EventBus, EventProcessor, KindFilter};

// ── Helpers ───────────────────────────────────────────────────────────────────

fn sim_t(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap() + Duration::seconds(secs)
}

fn processor() -> (EventProcessor, Arc<MemStore>) {
    let store = Arc::new(MemStore::new());
    (EventProcessor::new(store.clone(), EventBus::new()), store)
}

// ── Processing ────────────────────────────────────────────────────────────────

mod process_tests {
    use super::*;

    #[tokio::test]
    async fn fills_identity_sequence_and_consequences() {
        let (processor, store) = processor();
        let world = WorldId::new();
        let agent = AgentId::new();

        let event = processor
            .process(world, sim_t(0), EventDraft::agent_action(agent, "waved at Bob"))
            .await
            .unwrap();
        assert_eq!(event.world_id, world);
        assert_eq!(event.agent_id, Some(agent));
        assert_eq!(event.sim_time, sim_t(0));
        assert_eq!(event.seq, 1);
        assert!(!event.consequences.is_empty());

        // Durable, identical to the returned copy.
        let listed = store.list_events_by_world(world, None, None).await.unwrap();
        assert_eq!(listed, vec![event]);
    }

    #[tokio::test]
    async fn sequence_increases_within_a_world() {
        let (processor, _store) = processor();
        let world = WorldId::new();
        for expected in 1..=4u64 {
            let event = processor
                .process(world, sim_t(expected as i64), EventDraft::world_event("tick"))
                .await
                .unwrap();
            assert_eq!(event.seq, expected);
        }
    }

    #[tokio::test]
    async fn sequence_resumes_from_the_store_after_restart() {
        let store = Arc::new(MemStore::new());
        let world = WorldId::new();
        // A previous run left events behind.
        let old = EventProcessor::new(store.clone(), EventBus::new());
        for _ in 0..3 {
            old.process(world, sim_t(0), EventDraft::world_event("old")).await.unwrap();
        }

        let fresh = EventProcessor::new(store.clone(), EventBus::new());
        let event = fresh
            .process(world, sim_t(10), EventDraft::world_event("new"))
            .await
            .unwrap();
        assert_eq!(event.seq, 4);
    }

    #[tokio::test]
    async fn worlds_sequence_independently() {
        let (processor, _store) = processor();
        let w1 = WorldId::new();
        let w2 = WorldId::new();
        processor.process(w1, sim_t(0), EventDraft::world_event("a")).await.unwrap();
        let first_w2 = processor.process(w2, sim_t(0), EventDraft::world_event("b")).await.unwrap();
        assert_eq!(first_w2.seq, 1);
    }

    #[tokio::test]
    async fn concurrent_processing_yields_strictly_increasing_pairs() {
        let (processor, store) = processor();
        let world = WorldId::new();

        let mut handles = Vec::new();
        for i in 0..16 {
            let processor = processor.clone();
            handles.push(tokio::spawn(async move {
                processor
                    .process(world, sim_t(100), EventDraft::world_event(format!("e{i}")))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let events = store.list_events_by_world(world, None, None).await.unwrap();
        assert_eq!(events.len(), 16);
        for pair in events.windows(2) {
            assert!((pair[0].sim_time, pair[0].seq) < (pair[1].sim_time, pair[1].seq));
        }
    }
}

// ── Fan-out ───────────────────────────────────────────────────────────────────

mod fanout_tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_matching_kinds_only() {
        let (processor, _store) = processor();
        let world = WorldId::new();
        let mut any = processor.subscribe(world, KindFilter::Any);
        let mut actions_only =
            processor.subscribe(world, KindFilter::Only(EventKind::AgentAction));

        processor.process(world, sim_t(0), EventDraft::world_event("weather")).await.unwrap();
        processor
            .process(world, sim_t(1), EventDraft::agent_action(AgentId::new(), "waved"))
            .await
            .unwrap();

        assert_eq!(any.recv().await.unwrap().description, "weather");
        assert_eq!(any.recv().await.unwrap().description, "waved");
        assert_eq!(actions_only.recv().await.unwrap().description, "waved");
        assert!(actions_only.try_recv().is_none());
    }

    #[tokio::test]
    async fn other_worlds_events_are_not_delivered() {
        let (processor, _store) = processor();
        let mine = WorldId::new();
        let theirs = WorldId::new();
        let mut sub = processor.subscribe(mine, KindFilter::Any);

        processor.process(theirs, sim_t(0), EventDraft::world_event("far away")).await.unwrap();
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn dropping_the_subscription_unsubscribes() {
        let (processor, _store) = processor();
        let world = WorldId::new();
        let sub = processor.subscribe(world, KindFilter::Any);
        assert_eq!(processor.bus().subscriber_count(world), 1);

        drop(sub);
        assert_eq!(processor.bus().subscriber_count(world), 0);
        // Publishing into the empty registry is harmless.
        processor.process(world, sim_t(0), EventDraft::world_event("noop")).await.unwrap();
    }
}

// ── CSV sink ──────────────────────────────────────────────────────────────────

mod csv_tests {
    use super::*;

    #[tokio::test]
    async fn rows_land_in_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let (processor, _store) = processor();
        let world = WorldId::new();

        let mut log = CsvEventLog::new(dir.path()).unwrap();
        let event = processor
            .process(world, sim_t(0), EventDraft::agent_action(AgentId::new(), "made tea"))
            .await
            .unwrap();
        log.append(&event).unwrap();
        log.finish().unwrap();

        let contents = std::fs::read_to_string(dir.path().join("events.csv")).unwrap();
        assert!(contents.starts_with("event_id,world_id,sim_time,seq,kind"));
        assert!(contents.contains("made tea"));
        assert!(contents.contains("agent_action"));
    }

    #[tokio::test]
    async fn pump_drains_a_subscription() {
        let dir = tempfile::tempdir().unwrap();
        let (processor, _store) = processor();
        let world = WorldId::new();

        let sub = processor.subscribe(world, KindFilter::Any);
        let log = CsvEventLog::new(dir.path()).unwrap();
        let pump = tokio::spawn(crate::pump(sub, log));

        processor.process(world, sim_t(0), EventDraft::world_event("storm rolls in")).await.unwrap();
        // The pump flushes per event; give it a beat, then stop it.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        pump.abort();

        let contents = std::fs::read_to_string(dir.path().join("events.csv")).unwrap();
        assert!(contents.contains("storm rolls in"));
    }
}
