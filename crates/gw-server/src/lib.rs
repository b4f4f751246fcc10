//! `gw-server` — the world-management HTTP surface.
//!
//! | Module    | Contents                                        |
//! |-----------|-------------------------------------------------|
//! | [`api`]   | Route table, handlers, error → status mapping   |
//! | [`sse`]   | The `/worlds/{id}/stream` real-time channel     |
//!
//! All bodies and responses are JSON.  Successful creates answer 201,
//! everything else 200; validation problems 400, missing entities 404,
//! the rest 500.  The binary (`genworld`) wires a store backend, the LM
//! gateway, and a [`WorldRuntime`][gw_world::WorldRuntime] behind the
//! router.

pub mod api;
pub mod sse;

#[cfg(test)]
mod tests;

pub use api::router;
