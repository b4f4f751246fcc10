//! `gw-core` — foundational types for the `genworld` agent runtime.
//!
//! This crate is a dependency of every other `gw-*` crate.  It intentionally
//! has no `gw-*` dependencies and minimal external ones (`uuid`, `chrono`,
//! `serde`, `thiserror`).
//!
//! # What lives here
//!
//! | Module       | Contents                                                |
//! |--------------|---------------------------------------------------------|
//! | [`ids`]      | `WorldId`, `AgentId`, `MemoryId`, `EventId`, `SnapshotId` |
//! | [`time`]     | `Tick`, `WorldClock`, `hours_between`                   |
//! | [`space`]    | `Position`, planar distance                             |
//! | [`world`]    | `World`, `WorldStatus`, `WorldSettings`, `WorldObject`  |
//! | [`agent`]    | `Agent`, `AgentStatus`                                  |
//! | [`plan`]     | `PlanBundle`, `DailyPlan`, `HourlyPlan`, `MinuteStep`   |
//! | [`memory`]   | `Memory`, `MemoryKind`, `MemoryDraft`                   |
//! | [`event`]    | `Event`, `EventKind`, `EventDraft`                      |
//! | [`snapshot`] | `Snapshot`, `SnapshotPayload`                           |
//! | [`config`]   | `RuntimeConfig` (env-driven)                            |
//! | [`error`]    | `GwError`, `GwResult`                                   |

pub mod agent;
pub mod config;
pub mod error;
pub mod event;
pub mod ids;
pub mod memory;
pub mod plan;
pub mod snapshot;
pub mod space;
pub mod time;
pub mod world;


// ── Re-exports ────────────────────────────────────────────────────────────────

pub use agent::{Agent, AgentStatus};
pub use config::RuntimeConfig;
pub use error::{GwError, GwResult};
pub use event::{Event, EventDraft, EventKind};
pub use ids::{AgentId, EventId, MemoryId, SnapshotId, WorldId};
pub use memory::{Memory, MemoryDraft, MemoryKind};
pub use plan::{DailyPlan, HourlyPlan, MinuteStep, PlanBundle};
pub use snapshot::{Snapshot, SnapshotPayload};
pub use space::Position;
pub use time::{hours_between, Tick, WorldClock};
pub use world::{World, WorldObject, WorldSettings, WorldStatus};
