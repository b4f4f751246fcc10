//! Tests for gw-lm.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gw_core::WorldId;
use serde_json::json;

use crate::singleflight::{FlightKey, SingleFlight};
use crate::{
    CompletionRequest, CompletionTask, FailingLm, JsonKind, LanguageModel, LmError, ScriptedLm,
};

fn key(op: &'static str, n: u8) -> FlightKey {
    FlightKey { op, hash: [n; 32] }
}

// ── Single-flight ─────────────────────────────────────────────────────────────

mod singleflight_tests {
    use super::*;

    #[tokio::test]
    async fn concurrent_identical_calls_share_one_flight() {
        let flights = Arc::new(SingleFlight::<u32>::new(16));
        let executions = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let flights = Arc::clone(&flights);
            let executions = Arc::clone(&executions);
            handles.push(tokio::spawn(async move {
                flights
                    .run(key("op", 1), false, async move {
                        executions.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(42)
                    })
                    .await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 42);
        }
        assert_eq!(executions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_keys_do_not_coalesce() {
        let flights = SingleFlight::<u32>::new(16);
        let a = flights.run(key("op", 1), false, async { Ok(1) }).await.unwrap();
        let b = flights.run(key("op", 2), false, async { Ok(2) }).await.unwrap();
        assert_eq!((a, b), (1, 2));
    }

    #[tokio::test]
    async fn cacheable_success_skips_the_second_flight() {
        let flights = Arc::new(SingleFlight::<u32>::new(16));
        let executions = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let executions = Arc::clone(&executions);
            let got = flights
                .run(key("embed", 7), true, async move {
                    executions.fetch_add(1, Ordering::SeqCst);
                    Ok(7)
                })
                .await
                .unwrap();
            assert_eq!(got, 7);
        }
        assert_eq!(executions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn errors_are_never_cached() {
        let flights = Arc::new(SingleFlight::<u32>::new(16));
        let executions = Arc::new(AtomicUsize::new(0));

        let exec = Arc::clone(&executions);
        let err = flights
            .run(key("embed", 9), true, async move {
                exec.fetch_add(1, Ordering::SeqCst);
                Err(LmError::Unavailable("down".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LmError::Unavailable(_)));

        let exec = Arc::clone(&executions);
        let got = flights
            .run(key("embed", 9), true, async move {
                exec.fetch_add(1, Ordering::SeqCst);
                Ok(11)
            })
            .await
            .unwrap();
        assert_eq!(got, 11);
        assert_eq!(executions.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn waiters_survive_leader_cancellation() {
        let flights = Arc::new(SingleFlight::<u32>::new(16));

        // Leader starts a slow flight, then is aborted mid-wait.
        let leader = {
            let flights = Arc::clone(&flights);
            tokio::spawn(async move {
                flights
                    .run(key("op", 3), false, async {
                        tokio::time::sleep(Duration::from_millis(80)).await;
                        Ok(5)
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let waiter = {
            let flights = Arc::clone(&flights);
            tokio::spawn(async move {
                flights
                    .run(key("op", 3), false, async {
                        panic!("second flight must not start");
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        leader.abort();

        assert_eq!(waiter.await.unwrap().unwrap(), 5);
    }
}

// ── Shape validation ──────────────────────────────────────────────────────────

mod shape_tests {
    use super::*;

    const SHAPE: &[(&str, JsonKind)] =
        &[("questions", JsonKind::Array), ("summary", JsonKind::String)];

    fn request() -> CompletionRequest {
        CompletionRequest::new(CompletionTask::Reflection, WorldId::new(), json!({}))
            .expecting(SHAPE)
    }

    #[test]
    fn accepts_matching_shape() {
        let value = json!({ "questions": ["q1"], "summary": "s", "extra": 1 });
        assert!(request().validate(&value).is_ok());
    }

    #[test]
    fn rejects_missing_field_and_wrong_kind() {
        assert!(request().validate(&json!({ "questions": ["q1"] })).is_err());
        assert!(request()
            .validate(&json!({ "questions": "not-an-array", "summary": "s" }))
            .is_err());
    }
}

// ── Doubles ───────────────────────────────────────────────────────────────────

mod double_tests {
    use super::*;

    #[tokio::test]
    async fn scripted_embeddings_are_deterministic_and_overridable() {
        let lm = ScriptedLm::new(8);
        let world = WorldId::new();
        let a = lm.embed(world, "the rain").await.unwrap();
        let b = lm.embed(world, "the rain").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);

        lm.set_embedding("the rain", vec![1.0; 8]);
        assert_eq!(lm.embed(world, "the rain").await.unwrap(), vec![1.0; 8]);
    }

    #[tokio::test]
    async fn scripted_completions_drain_in_order_and_validate() {
        let lm = ScriptedLm::new(8);
        lm.push_completion(CompletionTask::Planning, Ok(json!({ "actions": ["a"] })));
        lm.push_completion(CompletionTask::Planning, Ok(json!({ "wrong": 1 })));

        let request = || {
            CompletionRequest::new(CompletionTask::Planning, WorldId::new(), json!({}))
                .expecting(&[("actions", JsonKind::Array)])
        };
        assert!(lm.complete(request()).await.is_ok());
        assert!(matches!(
            lm.complete(request()).await.unwrap_err(),
            LmError::BadShape(_)
        ));
        // Drained queue reads as an outage.
        assert!(matches!(
            lm.complete(request()).await.unwrap_err(),
            LmError::Unavailable(_)
        ));
        assert_eq!(lm.completion_calls().len(), 3);
    }

    #[tokio::test]
    async fn outage_mode_degrades_importance_to_fallback() {
        let lm = ScriptedLm::new(8);
        lm.set_importance("big news", 9);
        let world = WorldId::new();
        assert_eq!(lm.score_importance(world, "big news", "").await, 9);

        lm.fail_everything();
        assert_eq!(lm.score_importance(world, "big news", "").await, 5);
        assert!(lm.embed(world, "x").await.is_err());

        lm.recover();
        assert_eq!(lm.score_importance(world, "big news", "").await, 9);
    }

    #[tokio::test]
    async fn failing_lm_is_down_but_scores_fallback() {
        let world = WorldId::new();
        assert!(FailingLm.embed(world, "x").await.is_err());
        assert_eq!(FailingLm.score_importance(world, "x", "").await, 5);
        let err = FailingLm
            .complete(CompletionRequest::new(CompletionTask::Dialogue, world, json!({})))
            .await
            .unwrap_err();
        assert!(err.is_degraded());
    }
}
