//! `gw-world` — world lifecycle and the tick scheduler.
//!
//! [`WorldRuntime`] is the process-level entry point: it wires the store,
//! gateway, memory stream, planner, reflection engine, event processor, and
//! agent loop together, and owns one driver task per running world.
//!
//! # Tick model
//!
//! Every `base_tick_ms` real milliseconds a running world's driver advances
//! the simulated clock by `tick_len_secs × time_speed`, snapshots the agent
//! roster, dispatches every active agent's cognition cycle concurrently
//! under the per-tick deadline, and persists the new clock.  Ticks of one
//! world never overlap; worlds are fully independent.
//!
//! Lifecycle: `Stopped → Running ⇄ Paused → Stopped`.  `pause` lets the
//! in-flight tick finish; `stop` drains and finalizes.  A scheduler error
//! pauses the world and records a `world_event` — nothing crosses worlds.

pub mod driver;
pub mod error;
pub mod runtime;

#[cfg(test)]
mod tests;

pub use driver::TickReport;
pub use error::{WorldError, WorldResult};
pub use runtime::WorldRuntime;
