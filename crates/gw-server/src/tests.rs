//! HTTP surface tests (in-process, via tower oneshot).

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use gw_core::RuntimeConfig;
use gw_lm::ScriptedLm;
use gw_store::MemStore;
use gw_world::WorldRuntime;
use serde_json::{json, Value};
use tower::ServiceExt;

// ── Helpers ───────────────────────────────────────────────────────────────────

fn app() -> Router {
    let cfg = Arc::new(RuntimeConfig { embed_dim: 4, ..RuntimeConfig::default() });
    let runtime = WorldRuntime::new(Arc::new(MemStore::new()), Arc::new(ScriptedLm::new(4)), cfg);
    crate::router(runtime)
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = match body {
        Some(value) => Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(value.to_string()))
            .unwrap(),
        None => Request::builder().method(method).uri(uri).body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn create_world(app: &Router, name: &str) -> String {
    let (status, world) =
        call(app, Method::POST, "/worlds", Some(json!({ "name": name }))).await;
    assert_eq!(status, StatusCode::CREATED);
    world["id"].as_str().unwrap().to_owned()
}

async fn spawn_ada(app: &Router, world: &str) -> String {
    let body = json!({
        "name": "Ada", "x": 0.0, "y": 0.0, "area": "park",
        "goals": ["make friends"],
    });
    let (status, agent) =
        call(app, Method::POST, &format!("/worlds/{world}/agents"), Some(body)).await;
    assert_eq!(status, StatusCode::CREATED);
    agent["id"].as_str().unwrap().to_owned()
}

// ── Worlds ────────────────────────────────────────────────────────────────────

mod world_routes {
    use super::*;

    #[tokio::test]
    async fn create_start_and_fetch_shows_running() {
        let app = app();
        let id = create_world(&app, "W1").await;

        let (status, started) =
            call(&app, Method::POST, &format!("/worlds/{id}/start"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(started["status"], "running");

        let (status, fetched) = call(&app, Method::GET, &format!("/worlds/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["status"], "running");

        let (status, _) = call(&app, Method::POST, &format!("/worlds/{id}/stop"), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn listing_filters_by_status() {
        let app = app();
        create_world(&app, "stopped-one").await;
        let running = create_world(&app, "running-one").await;
        call(&app, Method::POST, &format!("/worlds/{running}/start"), None).await;

        let (_, all) = call(&app, Method::GET, "/worlds", None).await;
        assert_eq!(all.as_array().unwrap().len(), 2);
        let (_, only) = call(&app, Method::GET, "/worlds?status=running", None).await;
        assert_eq!(only.as_array().unwrap().len(), 1);
        assert_eq!(only[0]["name"], "running-one");

        call(&app, Method::POST, &format!("/worlds/{running}/stop"), None).await;
    }

    #[tokio::test]
    async fn client_errors_are_400_and_missing_is_404() {
        let app = app();
        let (status, body) =
            call(&app, Method::POST, "/worlds", Some(json!({ "name": "  " }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let (status, _) = call(&app, Method::GET, "/worlds/not-a-uuid", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let missing = gw_core::WorldId::new();
        let (status, _) = call(&app, Method::GET, &format!("/worlds/{missing}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invalid_transition_is_400() {
        let app = app();
        let id = create_world(&app, "W1").await;
        let (status, body) =
            call(&app, Method::POST, &format!("/worlds/{id}/pause"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("pause"));
    }

    #[tokio::test]
    async fn update_merges_partial_fields() {
        let app = app();
        let id = create_world(&app, "old-name").await;
        let (status, updated) = call(
            &app,
            Method::PUT,
            &format!("/worlds/{id}"),
            Some(json!({ "description": "a quiet town" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["name"], "old-name");
        assert_eq!(updated["description"], "a quiet town");
    }
}

// ── Time and ticks ────────────────────────────────────────────────────────────

mod time_routes {
    use super::*;

    #[tokio::test]
    async fn advance_then_time_shows_the_new_tick() {
        let app = app();
        let id = create_world(&app, "W1").await;
        spawn_ada(&app, &id).await;

        let (status, report) = call(
            &app,
            Method::POST,
            &format!("/worlds/{id}/time/advance"),
            Some(json!({ "ticks": 2 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["completed"], 2);

        let (_, time) = call(&app, Method::GET, &format!("/worlds/{id}/time"), None).await;
        assert_eq!(time["tick"], 2);
        assert_eq!(time["status"], "stopped");
    }

    #[tokio::test]
    async fn speed_endpoint_updates_the_multiplier() {
        let app = app();
        let id = create_world(&app, "W1").await;
        let (status, world) = call(
            &app,
            Method::POST,
            &format!("/worlds/{id}/time/speed"),
            Some(json!({ "multiplier": 2.5 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(world["clock"]["time_speed"], 2.5);

        let (status, _) = call(
            &app,
            Method::POST,
            &format!("/worlds/{id}/time/speed"),
            Some(json!({ "multiplier": 0.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn process_runs_one_manual_tick() {
        let app = app();
        let id = create_world(&app, "W1").await;
        spawn_ada(&app, &id).await;
        let (status, report) =
            call(&app, Method::POST, &format!("/worlds/{id}/process"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["completed"], 1);
    }
}

// ── Agents, memories, events ──────────────────────────────────────────────────

mod agent_routes {
    use super::*;

    #[tokio::test]
    async fn spawn_tick_then_events_show_one_agent_action() {
        let app = app();
        let id = create_world(&app, "W1").await;
        let ada = spawn_ada(&app, &id).await;

        call(&app, Method::POST, &format!("/worlds/{id}/time/advance"), Some(json!({})))
            .await;

        let (status, events) =
            call(&app, Method::GET, &format!("/worlds/{id}/events"), None).await;
        assert_eq!(status, StatusCode::OK);
        let actions: Vec<&Value> = events
            .as_array()
            .unwrap()
            .iter()
            .filter(|e| e["kind"] == "agent_action")
            .collect();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0]["agent_id"], ada.as_str());
    }

    #[tokio::test]
    async fn memories_are_listable_and_queryable() {
        let app = app();
        let id = create_world(&app, "W1").await;
        let ada = spawn_ada(&app, &id).await;
        call(&app, Method::POST, &format!("/worlds/{id}/time/advance"), Some(json!({})))
            .await;

        let (status, listed) = call(
            &app,
            Method::GET,
            &format!("/worlds/{id}/agents/{ada}/memories"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(!listed.as_array().unwrap().is_empty());

        let (status, found) = call(
            &app,
            Method::POST,
            &format!("/worlds/{id}/agents/{ada}/memories/query"),
            Some(json!({ "query": "the park", "limit": 3 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(!found.as_array().unwrap().is_empty());
        assert!(found.as_array().unwrap().len() <= 3);
    }

    #[tokio::test]
    async fn agent_of_another_world_is_404() {
        let app = app();
        let w1 = create_world(&app, "W1").await;
        let w2 = create_world(&app, "W2").await;
        let ada = spawn_ada(&app, &w1).await;

        let (status, _) =
            call(&app, Method::GET, &format!("/worlds/{w2}/agents/{ada}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_agent_marks_it_deleted() {
        let app = app();
        let id = create_world(&app, "W1").await;
        let ada = spawn_ada(&app, &id).await;

        let (status, deleted) =
            call(&app, Method::DELETE, &format!("/worlds/{id}/agents/{ada}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(deleted["status"], "deleted");
    }

    #[tokio::test]
    async fn injected_events_are_user_interventions() {
        let app = app();
        let id = create_world(&app, "W1").await;
        let (status, event) = call(
            &app,
            Method::POST,
            &format!("/worlds/{id}/events"),
            Some(json!({ "description": "a storm rolls in" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(event["kind"], "user_intervention");
        assert_eq!(event["seq"], 1);
    }
}

// ── Snapshots ─────────────────────────────────────────────────────────────────

mod snapshot_routes {
    use super::*;

    #[tokio::test]
    async fn snapshot_and_restore_round_trip() {
        let app = app();
        let id = create_world(&app, "W1").await;
        spawn_ada(&app, &id).await;

        let (status, snapshot) = call(
            &app,
            Method::POST,
            &format!("/worlds/{id}/snapshots"),
            Some(json!({ "name": "checkpoint" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let sid = snapshot["id"].as_str().unwrap().to_owned();

        call(&app, Method::POST, &format!("/worlds/{id}/time/advance"), Some(json!({ "ticks": 3 })))
            .await;

        let (status, restored) = call(
            &app,
            Method::POST,
            &format!("/worlds/{id}/snapshots/{sid}/restore"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(restored["clock"]["tick"], 0);

        let (_, snapshots) =
            call(&app, Method::GET, &format!("/worlds/{id}/snapshots"), None).await;
        assert_eq!(snapshots.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_world_reports_the_final_snapshot() {
        let app = app();
        let id = create_world(&app, "W1").await;
        let (status, body) = call(&app, Method::DELETE, &format!("/worlds/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["deleted"], true);
        assert_eq!(body["final_snapshot"]["name"], "final");

        let (status, _) = call(&app, Method::GET, &format!("/worlds/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
