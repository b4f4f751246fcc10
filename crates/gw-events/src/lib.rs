//! `gw-events` — the event processor and broadcast layer.
//!
//! Agent actions, world notices, and operator interventions all pass through
//! [`EventProcessor::process`]: it assigns the identifier, simulated
//! timestamp, and per-world monotonic sequence, derives consequences from a
//! small per-kind rule table, persists the event, and fans it out to
//! subscribers.
//!
//! Subscriptions are registered per `(world, kind-filter)` and return a
//! disposer — dropping the [`Subscription`] unsubscribes.  Delivery is
//! at-least-once over unbounded channels; consumers deduplicate on event id.
//! A slow subscriber never stalls the tick loop.
//!
//! [`CsvEventLog`] is a file sink for durable offline inspection.

pub mod csvlog;
pub mod error;
pub mod processor;
pub mod subscribe;

#[cfg(test)]
mod tests;

pub use csvlog::{pump, CsvEventLog};
pub use error::{EventError, EventResult};
pub use processor::EventProcessor;
pub use subscribe::{EventBus, KindFilter, Subscription};
