//! `gw-agent` — the per-agent cognition cycle.
//!
//! Each tick the world driver hands every active agent to
//! [`AgentLoop::run_cycle`], which executes the four cognition steps
//! strictly in order:
//!
//! 1. **Perceive** — compose one observation from nearby agents (R-tree
//!    range query), world objects in sight, and recent events; append it to
//!    the memory stream.
//! 2. **Replan** — ask the planner whether the observation invalidates the
//!    current plans; if so, regenerate and record a replan event.
//! 3. **Act** — take the minute step, classify it, and dispatch to the
//!    matching handler (move / communicate / interact / observe / general).
//! 4. **Record** — emit an `agent_action` event, then kick the reflection
//!    trigger asynchronously.
//!
//! Cycles for different agents run concurrently; a single agent's cycle is
//! never re-entered.  Errors are isolated per agent — one failed cycle
//! never takes the tick down.

pub mod cycle;
pub mod error;
pub mod perceive;


pub use cycle::{AgentLoop, CycleOutcome, TickContext};
pub use error::{AgentError, AgentResult};
pub use perceive::{compose_observation, PerceptionIndex};
