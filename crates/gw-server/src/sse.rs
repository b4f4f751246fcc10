//! The real-time channel: `GET /worlds/{id}/stream`.
//!
//! Server-sent events with envelope `{type, data}` where `type` is one of
//! `agent_update`, `world_state`, `memory_update`, `conversation`.  Every
//! payload carries `world_id` (and `agent_id` where applicable) so clients
//! filter locally.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::{Path, State};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use futures::Stream;
use gw_core::{Event, EventKind};
use gw_events::{KindFilter, Subscription};
use gw_world::WorldRuntime;
use serde_json::json;

use crate::api::ApiError;

/// Adapt a bus subscription into a `Stream` of SSE frames.
pub struct WorldStream {
    subscription: Subscription,
}

impl Stream for WorldStream {
    type Item = Result<SseEvent, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.subscription.poll_recv(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Ready(Some(event)) => Poll::Ready(Some(Ok(envelope(&event)))),
        }
    }
}

/// Map a world event onto the channel envelope.
fn envelope(event: &Arc<Event>) -> SseEvent {
    let kind = match event.kind {
        EventKind::WorldEvent | EventKind::UserIntervention => "world_state",
        EventKind::AgentAction => match event.data.get("kind").and_then(|v| v.as_str()) {
            Some("communicate") => "conversation",
            Some("observe") => "memory_update",
            _ => "agent_update",
        },
    };
    let data = json!({
        "world_id": event.world_id.to_string(),
        "agent_id": event.agent_id.map(|a| a.to_string()),
        "event": event.as_ref(),
    });
    SseEvent::default()
        .json_data(json!({ "type": kind, "data": data }))
        .unwrap_or_default()
}

/// Handler: subscribe to the world's bus and stream until the client goes
/// away (the subscription's drop unsubscribes).
pub async fn stream_world(
    State(runtime): State<WorldRuntime>,
    Path(id): Path<String>,
) -> Result<Sse<WorldStream>, ApiError> {
    let world = crate::api::parse_world_id(&id)?;
    // 404 for unknown worlds instead of a silent empty stream.
    runtime.get_world(world).await?;
    let subscription = runtime.events().subscribe(world, KindFilter::Any);
    Ok(Sse::new(WorldStream { subscription }).keep_alive(KeepAlive::default()))
}
