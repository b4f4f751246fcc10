//! Single-flight request coalescing with a bounded success cache.
//!
//! # Why this exists
//!
//! Many agents in one world routinely ask the LM service identical questions
//! within the same tick (the same observation embedded twice, the same scene
//! described to two neighbours).  Without coalescing, N identical concurrent
//! requests cost N calls; with it they cost one.
//!
//! # Mechanics
//!
//! The first caller for a key becomes the *leader* and spawns the flight as
//! its own task; everyone (leader included) waits on a broadcast channel.
//! Because the flight is a detached task, cancellation of any waiter — the
//! leader included — never cancels the call for the others.  If the flight
//! dies without publishing (abort, panic), waiters observe a closed channel
//! and get [`LmError::Cancelled`]; the slot is already released, so the next
//! caller starts a fresh flight and the cache is never poisoned.
//!
//! Only successes are cached, FIFO-bounded.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::broadcast;

use crate::{LmError, LmResult};

// ── FlightKey ────────────────────────────────────────────────────────────────

/// Cache key: operation name plus a content hash.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct FlightKey {
    pub op: &'static str,
    pub hash: [u8; 32],
}

// ── SingleFlight ─────────────────────────────────────────────────────────────

struct BoundedCache<T> {
    cap: usize,
    map: FxHashMap<FlightKey, T>,
    order: VecDeque<FlightKey>,
}

impl<T> BoundedCache<T> {
    fn insert(&mut self, key: FlightKey, value: T) {
        if self.cap == 0 {
            return;
        }
        if self.map.insert(key.clone(), value).is_none() {
            self.order.push_back(key);
            while self.order.len() > self.cap {
                if let Some(evicted) = self.order.pop_front() {
                    self.map.remove(&evicted);
                }
            }
        }
    }
}

struct Inner<T> {
    inflight: Mutex<FxHashMap<FlightKey, broadcast::Sender<LmResult<T>>>>,
    cache: Mutex<BoundedCache<T>>,
}

/// Coalesces concurrent identical calls and caches their successes.
pub struct SingleFlight<T: Clone + Send + 'static> {
    inner: Arc<Inner<T>>,
}

impl<T: Clone + Send + 'static> SingleFlight<T> {
    pub fn new(cache_cap: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                inflight: Mutex::new(FxHashMap::default()),
                cache: Mutex::new(BoundedCache {
                    cap: cache_cap,
                    map: FxHashMap::default(),
                    order: VecDeque::new(),
                }),
            }),
        }
    }

    /// Run `flight` for `key`, joining an in-flight call when one exists.
    ///
    /// `cacheable` controls whether a success is retained for future calls
    /// (embeddings are deterministic; completions are not).
    pub async fn run<F>(&self, key: FlightKey, cacheable: bool, flight: F) -> LmResult<T>
    where
        F: std::future::Future<Output = LmResult<T>> + Send + 'static,
    {
        if let Some(hit) = self.inner.cache.lock().map.get(&key).cloned() {
            return Ok(hit);
        }

        let mut rx = {
            let mut inflight = self.inner.inflight.lock();
            match inflight.get(&key) {
                Some(tx) => tx.subscribe(),
                None => {
                    let (tx, rx) = broadcast::channel(1);
                    inflight.insert(key.clone(), tx);

                    let inner = Arc::clone(&self.inner);
                    tokio::spawn(async move {
                        let result = flight.await;
                        if cacheable {
                            if let Ok(ref value) = result {
                                inner.cache.lock().insert(key.clone(), value.clone());
                            }
                        }
                        // Release the slot before publishing so late arrivals
                        // either hit the cache or start a clean flight.
                        let tx = inner.inflight.lock().remove(&key);
                        if let Some(tx) = tx {
                            let _ = tx.send(result);
                        }
                    });
                    rx
                }
            }
        };

        match rx.recv().await {
            Ok(result) => result,
            Err(_) => Err(LmError::Cancelled),
        }
    }
}
