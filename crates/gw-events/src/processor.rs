//! `EventProcessor` — identifier/sequence assignment, consequences,
//! persistence, and publish.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use gw_core::{Event, EventDraft, EventId, EventKind, WorldId};
use gw_store::Store;
use tokio::sync::Mutex;
use tracing::trace;

use crate::subscribe::{EventBus, KindFilter, Subscription};
use crate::EventResult;

/// Turns drafts into durable, ordered, broadcast events.
///
/// The per-world sequence counter is lazily seeded from the store
/// ([`max_event_seq`][Store::max_event_seq]) so restarts continue the
/// world's order instead of reusing sequence numbers.
#[derive(Clone)]
pub struct EventProcessor {
    store: Arc<dyn Store>,
    bus: EventBus,
    /// Last assigned seq per world; `None` inside the mutex = not yet
    /// seeded.  The mutex also serializes the persist-and-publish section,
    /// which is what makes `(sim_time, seq)` strictly increasing per world
    /// while different worlds proceed in parallel.
    seqs: Arc<DashMap<WorldId, Arc<Mutex<Option<u64>>>>>,
}

impl EventProcessor {
    pub fn new(store: Arc<dyn Store>, bus: EventBus) -> Self {
        Self { store, bus, seqs: Arc::new(DashMap::new()) }
    }

    /// The bus this processor publishes on.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Shorthand for subscribing on the processor's bus.
    pub fn subscribe(&self, world: WorldId, filter: KindFilter) -> Subscription {
        self.bus.subscribe(world, filter)
    }

    /// Process one draft for `world` at simulated instant `sim_time`.
    ///
    /// Assigns id, timestamp, and sequence; derives consequences; persists;
    /// publishes.  Returns the completed event.
    pub async fn process(
        &self,
        world: WorldId,
        sim_time: DateTime<Utc>,
        draft: EventDraft,
    ) -> EventResult<Event> {
        let cell = self
            .seqs
            .entry(world)
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone();
        let mut last = cell.lock().await;

        let seq = match *last {
            Some(seq) => seq + 1,
            None => self.store.max_event_seq(world).await? + 1,
        };
        let event = Event {
            id: EventId::new(),
            world_id: world,
            sim_time,
            seq,
            consequences: consequences_for(&draft),
            kind: draft.kind,
            agent_id: draft.agent_id,
            description: draft.description,
            data: draft.data,
        };
        self.store.put_event(&event).await?;
        *last = Some(seq);
        drop(last);

        trace!(world = %world, seq, kind = ?event.kind, "event processed");
        self.bus.publish(&Arc::new(event.clone()));
        Ok(event)
    }
}

// ── Consequence rules ────────────────────────────────────────────────────────

/// Small per-kind rule table for derived follow-on effects.
fn consequences_for(draft: &EventDraft) -> Vec<String> {
    match draft.kind {
        EventKind::AgentAction => vec!["observable by nearby agents".to_owned()],
        EventKind::WorldEvent => vec!["world state updated".to_owned()],
        EventKind::UserIntervention => {
            vec!["agents will perceive this on their next tick".to_owned()]
        }
    }
}
