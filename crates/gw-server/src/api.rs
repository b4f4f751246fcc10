//! Route table and handlers.

use std::str::FromStr;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use gw_core::{
    Agent, AgentId, EventDraft, EventKind, Memory, Position, SnapshotId, World, WorldId,
    WorldObject, WorldSettings, WorldStatus,
};
use gw_world::{WorldError, WorldRuntime};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::sse::stream_world;

// ── Router ───────────────────────────────────────────────────────────────────

/// Build the full route table over a runtime.
pub fn router(runtime: WorldRuntime) -> Router {
    Router::new()
        .route("/worlds", post(create_world).get(list_worlds))
        .route(
            "/worlds/:id",
            get(get_world).put(update_world).delete(delete_world),
        )
        .route("/worlds/:id/start", post(start_world))
        .route("/worlds/:id/pause", post(pause_world))
        .route("/worlds/:id/resume", post(resume_world))
        .route("/worlds/:id/stop", post(stop_world))
        .route("/worlds/:id/time", get(get_time))
        .route("/worlds/:id/time/advance", post(advance_time))
        .route("/worlds/:id/time/speed", post(set_speed))
        .route("/worlds/:id/agents", post(spawn_agent).get(list_agents))
        .route("/worlds/:id/agents/:aid", get(get_agent).delete(delete_agent))
        .route("/worlds/:id/agents/:aid/memories", get(list_memories))
        .route("/worlds/:id/agents/:aid/memories/query", post(query_memories))
        .route("/worlds/:id/events", post(inject_event).get(list_events))
        .route("/worlds/:id/process", post(process_tick))
        .route("/worlds/:id/snapshots", post(take_snapshot).get(list_snapshots))
        .route("/worlds/:id/snapshots/:sid/restore", post(restore_snapshot))
        .route("/worlds/:id/stream", get(stream_world))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(runtime)
}

// ── Error mapping ────────────────────────────────────────────────────────────

/// Handler error: carries the status and a JSON body `{"error": ...}`.
pub struct ApiError(pub StatusCode, pub String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "error": self.1 }))).into_response()
    }
}

impl From<WorldError> for ApiError {
    fn from(e: WorldError) -> Self {
        let status = if e.is_not_found() {
            StatusCode::NOT_FOUND
        } else {
            match &e {
                WorldError::Validation(_)
                | WorldError::InvalidTransition { .. } => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            }
        };
        ApiError(status, e.to_string())
    }
}

fn bad_request(msg: impl Into<String>) -> ApiError {
    ApiError(StatusCode::BAD_REQUEST, msg.into())
}

type ApiResult<T> = Result<T, ApiError>;

pub(crate) fn parse_world_id(raw: &str) -> ApiResult<WorldId> {
    WorldId::from_str(raw).map_err(|_| bad_request(format!("invalid world id {raw:?}")))
}

fn agent_id(raw: &str) -> ApiResult<AgentId> {
    AgentId::from_str(raw).map_err(|_| bad_request(format!("invalid agent id {raw:?}")))
}

/// Fetch the agent and confirm it belongs to the world in the path.
async fn agent_in_world(
    runtime: &WorldRuntime,
    world: WorldId,
    agent: AgentId,
) -> ApiResult<Agent> {
    let agent = runtime.get_agent(agent).await?;
    if agent.world_id != world {
        return Err(ApiError(StatusCode::NOT_FOUND, format!("agent {} not in world", agent.id)));
    }
    Ok(agent)
}

// ── World CRUD ───────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct CreateWorldBody {
    name: String,
    #[serde(default)]
    description: String,
}

async fn create_world(
    State(runtime): State<WorldRuntime>,
    Json(body): Json<CreateWorldBody>,
) -> ApiResult<(StatusCode, Json<World>)> {
    if body.name.trim().is_empty() {
        return Err(bad_request("world name must not be empty"));
    }
    let world = runtime.create_world(body.name.trim(), &body.description).await?;
    Ok((StatusCode::CREATED, Json(world)))
}

#[derive(Deserialize)]
struct ListWorldsQuery {
    status: Option<WorldStatus>,
}

async fn list_worlds(
    State(runtime): State<WorldRuntime>,
    Query(query): Query<ListWorldsQuery>,
) -> ApiResult<Json<Vec<World>>> {
    Ok(Json(runtime.list_worlds(query.status).await?))
}

async fn get_world(
    State(runtime): State<WorldRuntime>,
    Path(id): Path<String>,
) -> ApiResult<Json<World>> {
    Ok(Json(runtime.get_world(parse_world_id(&id)?).await?))
}

#[derive(Deserialize)]
struct UpdateWorldBody {
    name: Option<String>,
    description: Option<String>,
    settings: Option<WorldSettings>,
    objects: Option<Vec<WorldObject>>,
}

async fn update_world(
    State(runtime): State<WorldRuntime>,
    Path(id): Path<String>,
    Json(body): Json<UpdateWorldBody>,
) -> ApiResult<Json<World>> {
    let mut world = runtime.get_world(parse_world_id(&id)?).await?;
    if let Some(name) = body.name {
        world.name = name;
    }
    if let Some(description) = body.description {
        world.description = description;
    }
    if let Some(settings) = body.settings {
        world.settings = settings;
    }
    if let Some(objects) = body.objects {
        world.objects = objects;
    }
    Ok(Json(runtime.update_world(&world).await?))
}

async fn delete_world(
    State(runtime): State<WorldRuntime>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let snapshot = runtime.delete_world(parse_world_id(&id)?).await?;
    Ok(Json(json!({ "deleted": true, "final_snapshot": snapshot })))
}

// ── Lifecycle ────────────────────────────────────────────────────────────────

async fn start_world(
    State(runtime): State<WorldRuntime>,
    Path(id): Path<String>,
) -> ApiResult<Json<World>> {
    Ok(Json(runtime.start(parse_world_id(&id)?).await?))
}

async fn pause_world(
    State(runtime): State<WorldRuntime>,
    Path(id): Path<String>,
) -> ApiResult<Json<World>> {
    Ok(Json(runtime.pause(parse_world_id(&id)?).await?))
}

async fn resume_world(
    State(runtime): State<WorldRuntime>,
    Path(id): Path<String>,
) -> ApiResult<Json<World>> {
    Ok(Json(runtime.resume(parse_world_id(&id)?).await?))
}

async fn stop_world(
    State(runtime): State<WorldRuntime>,
    Path(id): Path<String>,
) -> ApiResult<Json<World>> {
    Ok(Json(runtime.stop(parse_world_id(&id)?).await?))
}

// ── Time ─────────────────────────────────────────────────────────────────────

async fn get_time(
    State(runtime): State<WorldRuntime>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let world = runtime.get_world(parse_world_id(&id)?).await?;
    Ok(Json(json!({
        "sim_time": world.clock.sim_time.to_rfc3339(),
        "tick": world.clock.tick.0,
        "tick_len_secs": world.clock.tick_len_secs,
        "time_speed": world.clock.time_speed,
        "status": world.status,
    })))
}

#[derive(Deserialize)]
struct AdvanceBody {
    #[serde(default = "one")]
    ticks: u64,
}

fn one() -> u64 {
    1
}

async fn advance_time(
    State(runtime): State<WorldRuntime>,
    Path(id): Path<String>,
    Json(body): Json<AdvanceBody>,
) -> ApiResult<Json<Value>> {
    if body.ticks == 0 || body.ticks > 1_000 {
        return Err(bad_request("ticks must be in [1, 1000]"));
    }
    let report = runtime.advance(parse_world_id(&id)?, body.ticks).await?;
    Ok(Json(json!({
        "ticks": body.ticks,
        "completed": report.completed,
        "timed_out": report.timed_out,
        "halted": report.halted,
    })))
}

#[derive(Deserialize)]
struct SpeedBody {
    multiplier: f64,
}

async fn set_speed(
    State(runtime): State<WorldRuntime>,
    Path(id): Path<String>,
    Json(body): Json<SpeedBody>,
) -> ApiResult<Json<World>> {
    Ok(Json(runtime.set_speed(parse_world_id(&id)?, body.multiplier).await?))
}

async fn process_tick(
    State(runtime): State<WorldRuntime>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let report = runtime.advance(parse_world_id(&id)?, 1).await?;
    Ok(Json(json!({
        "completed": report.completed,
        "timed_out": report.timed_out,
        "halted": report.halted,
    })))
}

// ── Agents ───────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct SpawnAgentBody {
    name: String,
    #[serde(default)]
    x: f64,
    #[serde(default)]
    y: f64,
    #[serde(default)]
    area: String,
    #[serde(default)]
    traits: Vec<String>,
    #[serde(default)]
    goals: Vec<String>,
    #[serde(default)]
    persona: String,
}

async fn spawn_agent(
    State(runtime): State<WorldRuntime>,
    Path(id): Path<String>,
    Json(body): Json<SpawnAgentBody>,
) -> ApiResult<(StatusCode, Json<Agent>)> {
    if body.name.trim().is_empty() {
        return Err(bad_request("agent name must not be empty"));
    }
    let agent = runtime
        .spawn_agent(
            parse_world_id(&id)?,
            body.name.trim(),
            Position::new(body.x, body.y, body.area),
            body.traits,
            body.goals,
            body.persona,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(agent)))
}

async fn list_agents(
    State(runtime): State<WorldRuntime>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Agent>>> {
    Ok(Json(runtime.list_agents(parse_world_id(&id)?).await?))
}

async fn get_agent(
    State(runtime): State<WorldRuntime>,
    Path((id, aid)): Path<(String, String)>,
) -> ApiResult<Json<Agent>> {
    Ok(Json(agent_in_world(&runtime, parse_world_id(&id)?, agent_id(&aid)?).await?))
}

async fn delete_agent(
    State(runtime): State<WorldRuntime>,
    Path((id, aid)): Path<(String, String)>,
) -> ApiResult<Json<Agent>> {
    let agent = agent_in_world(&runtime, parse_world_id(&id)?, agent_id(&aid)?).await?;
    Ok(Json(runtime.remove_agent(agent.id).await?))
}

// ── Memories ─────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct MemoriesQuery {
    limit: Option<usize>,
}

async fn list_memories(
    State(runtime): State<WorldRuntime>,
    Path((id, aid)): Path<(String, String)>,
    Query(query): Query<MemoriesQuery>,
) -> ApiResult<Json<Vec<Memory>>> {
    let agent = agent_in_world(&runtime, parse_world_id(&id)?, agent_id(&aid)?).await?;
    let memories = runtime
        .store()
        .list_memories_by_agent(agent.id, query.limit)
        .await
        .map_err(WorldError::from)?;
    Ok(Json(memories))
}

#[derive(Deserialize)]
struct QueryMemoriesBody {
    query: String,
    limit: Option<usize>,
}

async fn query_memories(
    State(runtime): State<WorldRuntime>,
    Path((id, aid)): Path<(String, String)>,
    Json(body): Json<QueryMemoriesBody>,
) -> ApiResult<Json<Vec<Memory>>> {
    let world = runtime.get_world(parse_world_id(&id)?).await?;
    let agent = agent_in_world(&runtime, world.id, agent_id(&aid)?).await?;
    let limit = body.limit.unwrap_or(runtime.config().retrieval_limit);
    let memories = runtime
        .memory_stream()
        .retrieve_relevant(agent.id, &body.query, limit, None, world.clock.sim_time)
        .await
        .map_err(|e| WorldError::Agent(e.into()))?;
    Ok(Json(memories))
}

// ── Events ───────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct InjectEventBody {
    description: String,
    #[serde(default)]
    data: Value,
}

async fn inject_event(
    State(runtime): State<WorldRuntime>,
    Path(id): Path<String>,
    Json(body): Json<InjectEventBody>,
) -> ApiResult<(StatusCode, Json<gw_core::Event>)> {
    if body.description.trim().is_empty() {
        return Err(bad_request("event description must not be empty"));
    }
    let world = runtime.get_world(parse_world_id(&id)?).await?;
    let draft = EventDraft {
        kind: EventKind::UserIntervention,
        agent_id: None,
        description: body.description,
        data: body.data,
    };
    let event = runtime
        .events()
        .process(world.id, world.clock.sim_time, draft)
        .await
        .map_err(WorldError::from)?;
    Ok((StatusCode::CREATED, Json(event)))
}

#[derive(Deserialize)]
struct ListEventsQuery {
    since: Option<DateTime<Utc>>,
    limit: Option<usize>,
}

async fn list_events(
    State(runtime): State<WorldRuntime>,
    Path(id): Path<String>,
    Query(query): Query<ListEventsQuery>,
) -> ApiResult<Json<Vec<gw_core::Event>>> {
    let events = runtime
        .store()
        .list_events_by_world(parse_world_id(&id)?, query.since, query.limit)
        .await
        .map_err(WorldError::from)?;
    Ok(Json(events))
}

// ── Snapshots ────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct TakeSnapshotBody {
    name: String,
    #[serde(default)]
    description: String,
}

async fn take_snapshot(
    State(runtime): State<WorldRuntime>,
    Path(id): Path<String>,
    Json(body): Json<TakeSnapshotBody>,
) -> ApiResult<(StatusCode, Json<gw_core::Snapshot>)> {
    let snapshot = runtime
        .take_snapshot(parse_world_id(&id)?, body.name.trim(), &body.description)
        .await?;
    Ok((StatusCode::CREATED, Json(snapshot)))
}

async fn list_snapshots(
    State(runtime): State<WorldRuntime>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<gw_core::Snapshot>>> {
    Ok(Json(runtime.list_snapshots(parse_world_id(&id)?).await?))
}

async fn restore_snapshot(
    State(runtime): State<WorldRuntime>,
    Path((id, sid)): Path<(String, String)>,
) -> ApiResult<Json<World>> {
    let snapshot = SnapshotId::from_str(&sid)
        .map_err(|_| bad_request(format!("invalid snapshot id {sid:?}")))?;
    Ok(Json(runtime.restore_snapshot(parse_world_id(&id)?, snapshot).await?))
}
