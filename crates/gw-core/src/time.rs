//! Simulated time model.
//!
//! # Design
//!
//! Each world carries its own clock: a monotonically increasing `Tick`
//! counter plus the simulated wall-clock instant it corresponds to.  One
//! tick advances simulated time by
//!
//!   tick_len_secs × time_speed
//!
//! seconds, where `time_speed` is a runtime-adjustable multiplier (2.0 means
//! the simulated day passes twice as fast per real interval).  All simulated
//! timestamps are UTC; anything that crosses the wire is RFC 3339.
//!
//! The tick counter, not the timestamp, is the canonical ordering unit:
//! comparisons are O(1) and immune to speed changes mid-run.

use std::fmt;

use chrono::{DateTime, Duration, Utc};

// ── Tick ─────────────────────────────────────────────────────────────────────

/// An absolute tick counter for one world.
///
/// Stored as `u64`: at one tick per real second a u64 lasts ~585 billion
/// years, so overflow is not a practical concern.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct Tick(pub u64);

impl Tick {
    pub const ZERO: Tick = Tick(0);

    /// Return the tick `n` steps after `self`.
    #[inline]
    pub fn offset(self, n: u64) -> Tick {
        Tick(self.0 + n)
    }
}

impl std::ops::Add<u64> for Tick {
    type Output = Tick;
    #[inline]
    fn add(self, rhs: u64) -> Tick {
        Tick(self.0 + rhs)
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

// ── WorldClock ───────────────────────────────────────────────────────────────

/// A world's simulated clock.
///
/// Cheap to copy; owned by the world record and advanced only by the world's
/// tick driver.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct WorldClock {
    /// Current simulated instant (UTC).
    pub sim_time: DateTime<Utc>,
    /// Current tick — advanced by [`WorldClock::advance`] each tick.
    pub tick: Tick,
    /// Simulated seconds one tick represents at `time_speed == 1.0`.
    pub tick_len_secs: u32,
    /// Speed multiplier applied to `tick_len_secs` on every advance.
    pub time_speed: f64,
}

impl WorldClock {
    /// Create a clock at `start` with the given tick length and speed 1.0.
    pub fn new(start: DateTime<Utc>, tick_len_secs: u32) -> Self {
        Self {
            sim_time: start,
            tick: Tick::ZERO,
            tick_len_secs,
            time_speed: 1.0,
        }
    }

    /// Advance by one tick: `sim_time += tick_len_secs × time_speed`.
    pub fn advance(&mut self) {
        let millis = (self.tick_len_secs as f64 * self.time_speed * 1_000.0).round() as i64;
        self.sim_time += Duration::milliseconds(millis);
        self.tick = self.tick.offset(1);
    }

    /// Simulated seconds covered by one tick at the current speed.
    #[inline]
    pub fn tick_span_secs(&self) -> f64 {
        self.tick_len_secs as f64 * self.time_speed
    }
}

impl fmt::Display for WorldClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.tick, self.sim_time.to_rfc3339())
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Fractional hours from `earlier` to `later`.  Negative if `later` precedes
/// `earlier` — callers that need a floor clamp at zero themselves.
#[inline]
pub fn hours_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    (later - earlier).num_milliseconds() as f64 / 3_600_000.0
}
