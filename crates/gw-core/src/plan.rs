//! Plan data carried on the agent record.
//!
//! # Layering
//!
//! Plans form a hierarchy, coarse to fine:
//!
//! - [`DailyPlan`]  — 5–8 coarse activities plus the day's goals,
//! - [`HourlyPlan`] — ordered actions expanding the current daily activity,
//! - [`MinuteStep`] — the single next action, consumed by the agent loop.
//!
//! These are pure data; generation, replanning, and classification live in
//! `gw-plan`.  The bundle is persisted with the agent so a restarted world
//! resumes mid-plan instead of replanning from scratch.

use chrono::{DateTime, NaiveDate, Utc};

// ── DailyPlan ────────────────────────────────────────────────────────────────

/// The day's coarse activities and goals.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DailyPlan {
    /// Simulated date the plan covers.  A new simulated day invalidates it.
    pub date: NaiveDate,
    pub goals: Vec<String>,
    /// 5–8 coarse activities in intended order.
    pub activities: Vec<String>,
}

impl DailyPlan {
    /// Activity currently in progress: index proportional to the hour of day.
    ///
    /// With 6 activities, hours 0–3 map to activity 0, 4–7 to 1, and so on.
    /// Coarse on purpose — the hourly layer refines it.
    pub fn activity_for_hour(&self, hour: u32) -> Option<&str> {
        if self.activities.is_empty() {
            return None;
        }
        let per = (24.0 / self.activities.len() as f64).ceil() as u32;
        let idx = (hour / per.max(1)) as usize;
        self.activities.get(idx.min(self.activities.len() - 1)).map(String::as_str)
    }
}

// ── HourlyPlan ───────────────────────────────────────────────────────────────

/// Ordered actions expanding one daily activity over the next several hours.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct HourlyPlan {
    /// The daily activity this plan expands.
    pub activity: String,
    pub actions: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

// ── MinuteStep ───────────────────────────────────────────────────────────────

/// The single next action, with the model's stated reasoning.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MinuteStep {
    pub action: String,
    #[serde(default)]
    pub reasoning: String,
    pub generated_at: DateTime<Utc>,
}

// ── PlanBundle ───────────────────────────────────────────────────────────────

/// The three plan layers persisted on an agent.  Any layer may be absent —
/// the planner regenerates missing layers on demand.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PlanBundle {
    pub daily: Option<DailyPlan>,
    pub hourly: Option<HourlyPlan>,
    pub minute: Option<MinuteStep>,
}

impl PlanBundle {
    /// Drop the minute layer (after consumption or on reactive replan).
    pub fn clear_minute(&mut self) {
        self.minute = None;
    }

    /// Drop the hourly and minute layers (significant-change replan).
    pub fn clear_hourly(&mut self) {
        self.hourly = None;
        self.minute = None;
    }
}
