//! Runtime configuration.
//!
//! Every knob has a default suitable for local development; deployments
//! override via environment variables.  Parsing is forgiving: an unset
//! variable takes the default, a malformed one is a hard [`GwError::Config`]
//! (silent fallback on a typo hides real misconfiguration).

use std::env;
use std::time::Duration;

use crate::{GwError, GwResult};

/// Top-level runtime configuration, shared (via `Arc`) by every component.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct RuntimeConfig {
    /// Base URL of the external LM gateway service.
    pub lm_service_url: String,
    /// HTTP listen port for the world-management surface.
    pub listen_port: u16,

    // ── Simulation cadence ────────────────────────────────────────────────
    /// Real milliseconds between ticks of a running world.
    pub base_tick_ms: u64,
    /// Simulated seconds one tick represents at speed 1.0.
    pub tick_len_secs: u32,
    /// Per-tick deadline for all agent cognition in a world.
    pub tick_deadline: Duration,

    // ── LM gateway ────────────────────────────────────────────────────────
    /// Attempts per LM call (first try + retries).
    pub lm_attempts: u32,
    /// Per-call deadline for one LM request.
    pub lm_deadline: Duration,
    /// Entries kept in the LM result cache.
    pub lm_cache_cap: usize,
    /// Concurrent LM calls across all worlds.
    pub lm_global_cap: usize,
    /// Concurrent LM calls per world.
    pub lm_world_cap: usize,
    /// Expected embedding dimension D.
    pub embed_dim: usize,

    // ── Cognition ─────────────────────────────────────────────────────────
    /// Reflection fires when the windowed observation-importance sum exceeds
    /// this.
    pub reflection_threshold: u32,
    /// Simulated hours of the reflection trigger window.
    pub reflection_window_hours: f64,
    /// Recency half-life in simulated hours.
    pub recency_half_life_hours: f64,
    /// Default `limit` for scored retrieval.
    pub retrieval_limit: usize,
    /// Most-recent memories loaded per retrieval when an agent exceeds it.
    pub retrieval_window: usize,
    /// Perception radius in world units.
    pub perception_range: f64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            lm_service_url: "http://localhost:8001".into(),
            listen_port: 8080,
            base_tick_ms: 1_000,
            tick_len_secs: 60,
            tick_deadline: Duration::from_secs(30),
            lm_attempts: 3,
            lm_deadline: Duration::from_millis(10_000),
            lm_cache_cap: 2_048,
            lm_global_cap: 32,
            lm_world_cap: 8,
            embed_dim: 768,
            reflection_threshold: 150,
            reflection_window_hours: 24.0,
            recency_half_life_hours: 24.0,
            retrieval_limit: 20,
            retrieval_window: 2_000,
            perception_range: 10.0,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from the environment on top of the defaults.
    pub fn from_env() -> GwResult<Self> {
        let mut cfg = Self::default();
        if let Ok(v) = env::var("LM_SERVICE_URL") {
            cfg.lm_service_url = v;
        }
        cfg.listen_port = parse_var("WORLD_SERVICE_PORT", cfg.listen_port)?;
        cfg.base_tick_ms = parse_var("GW_BASE_TICK_MS", cfg.base_tick_ms)?;
        cfg.tick_len_secs = parse_var("GW_TICK_LEN_SECS", cfg.tick_len_secs)?;
        cfg.tick_deadline =
            Duration::from_secs(parse_var("GW_TICK_DEADLINE_SECS", cfg.tick_deadline.as_secs())?);
        cfg.lm_attempts = parse_var("GW_LM_ATTEMPTS", cfg.lm_attempts)?;
        cfg.lm_deadline =
            Duration::from_millis(parse_var("GW_LM_DEADLINE_MS", cfg.lm_deadline.as_millis() as u64)?);
        cfg.lm_cache_cap = parse_var("GW_LM_CACHE_CAP", cfg.lm_cache_cap)?;
        cfg.lm_global_cap = parse_var("GW_LM_GLOBAL_CAP", cfg.lm_global_cap)?;
        cfg.lm_world_cap = parse_var("GW_LM_WORLD_CAP", cfg.lm_world_cap)?;
        cfg.embed_dim = parse_var("GW_EMBED_DIM", cfg.embed_dim)?;
        cfg.reflection_threshold = parse_var("GW_REFLECTION_THRESHOLD", cfg.reflection_threshold)?;
        cfg.reflection_window_hours =
            parse_var("GW_REFLECTION_WINDOW_HOURS", cfg.reflection_window_hours)?;
        cfg.recency_half_life_hours =
            parse_var("GW_RECENCY_HALF_LIFE_HOURS", cfg.recency_half_life_hours)?;
        cfg.retrieval_limit = parse_var("GW_RETRIEVAL_LIMIT", cfg.retrieval_limit)?;
        cfg.retrieval_window = parse_var("GW_RETRIEVAL_WINDOW", cfg.retrieval_window)?;
        cfg.perception_range = parse_var("GW_PERCEPTION_RANGE", cfg.perception_range)?;
        Ok(cfg)
    }
}

/// Parse `$name` if set, falling back to `default` when unset.
fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> GwResult<T> {
    match env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => raw
            .parse()
            .map_err(|_| GwError::Config(format!("invalid value for {name}: {raw:?}"))),
    }
}
