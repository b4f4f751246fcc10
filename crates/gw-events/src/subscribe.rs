//! Subscriber registry and fan-out.
//!
//! Expressed as a mapping from `(world, kind-filter)` to channel senders.
//! Registration hands back a [`Subscription`] whose `Drop` removes the
//! entry, so subscriber lifecycle is explicit and there are no process-wide
//! mutable globals: each bus instance scopes its own subscribers.

use std::sync::Arc;

use gw_core::{Event, EventKind, WorldId};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::mpsc;

// ── KindFilter ───────────────────────────────────────────────────────────────

/// Which event kinds a subscriber wants.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum KindFilter {
    /// Every event of the world.
    Any,
    /// Only one kind.
    Only(EventKind),
}

impl KindFilter {
    #[inline]
    fn matches(self, kind: EventKind) -> bool {
        match self {
            KindFilter::Any => true,
            KindFilter::Only(only) => only == kind,
        }
    }
}

// ── EventBus ─────────────────────────────────────────────────────────────────

struct SubEntry {
    id: u64,
    filter: KindFilter,
    tx: mpsc::UnboundedSender<Arc<Event>>,
}

#[derive(Default)]
struct SubTables {
    next_id: u64,
    by_world: FxHashMap<WorldId, Vec<SubEntry>>,
}

/// Fan-out hub for published events.
///
/// Cheap to clone; clones share one registry.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<SubTables>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber.  Dropping the returned [`Subscription`]
    /// unsubscribes.
    pub fn subscribe(&self, world: WorldId, filter: KindFilter) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut tables = self.inner.lock();
            tables.next_id += 1;
            let id = tables.next_id;
            tables.by_world.entry(world).or_default().push(SubEntry { id, filter, tx });
            id
        };
        Subscription { id, world, inner: Arc::clone(&self.inner), rx }
    }

    /// Deliver `event` to every matching live subscriber.
    ///
    /// Sends are non-blocking (unbounded channels); dead receivers are
    /// pruned on the spot.
    pub fn publish(&self, event: &Arc<Event>) {
        let mut tables = self.inner.lock();
        if let Some(entries) = tables.by_world.get_mut(&event.world_id) {
            entries.retain(|entry| {
                !entry.filter.matches(event.kind) || entry.tx.send(Arc::clone(event)).is_ok()
            });
        }
    }

    /// Live subscriber count for `world` — used by tests and diagnostics.
    pub fn subscriber_count(&self, world: WorldId) -> usize {
        self.inner.lock().by_world.get(&world).map_or(0, Vec::len)
    }
}

// ── Subscription ─────────────────────────────────────────────────────────────

/// A live subscription; receive with [`recv`][Self::recv], dispose by drop.
pub struct Subscription {
    id: u64,
    world: WorldId,
    inner: Arc<Mutex<SubTables>>,
    rx: mpsc::UnboundedReceiver<Arc<Event>>,
}

impl Subscription {
    /// Next event, or `None` once the bus dropped the sender side.
    pub async fn recv(&mut self) -> Option<Arc<Event>> {
        self.rx.recv().await
    }

    /// Non-blocking receive for drain loops.
    pub fn try_recv(&mut self) -> Option<Arc<Event>> {
        self.rx.try_recv().ok()
    }

    /// Poll-level receive so callers can adapt a subscription into a
    /// `Stream` (the SSE surface does).
    pub fn poll_recv(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Arc<Event>>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut tables = self.inner.lock();
        if let Some(entries) = tables.by_world.get_mut(&self.world) {
            entries.retain(|entry| entry.id != self.id);
            if entries.is_empty() {
                tables.by_world.remove(&self.world);
            }
        }
    }
}
