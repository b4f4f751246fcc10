//! Reactive replanning policy.
//!
//! Given a fresh observation, decide whether the current plans survive it.
//! Two signals:
//!
//! 1. **Marker match** — the observation contains a disruption marker
//!    ("blocked", "cancelled", …).  Significant-change markers
//!    ("emergency", "urgent", "changed location") escalate to the hourly
//!    layer.
//! 2. **Contradiction** — the observation negates the current minute step:
//!    a negation marker co-occurring with one of the step's content words
//!    ("walk to cafe" vs "the cafe is closed").
//!
//! Purely lexical on purpose: this check runs on every observation of every
//! agent every tick, so it must never cost an LM call.

use gw_core::MinuteStep;

// ── ReplanScope ──────────────────────────────────────────────────────────────

/// How much of the plan bundle an observation invalidates.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ReplanScope {
    /// Plans survive; carry on.
    None,
    /// Regenerate the minute step.
    Minute,
    /// Regenerate the hourly plan (and with it the minute step).
    Hourly,
}

impl ReplanScope {
    #[inline]
    pub fn is_replan(self) -> bool {
        self != ReplanScope::None
    }
}

// ── ReplanPolicy ─────────────────────────────────────────────────────────────

/// Configurable marker sets driving [`assess`][ReplanPolicy::assess].
#[derive(Clone, Debug)]
pub struct ReplanPolicy {
    /// Markers that invalidate the minute step.
    pub disruption: Vec<String>,
    /// Markers that additionally invalidate the hourly plan.
    pub significant: Vec<String>,
    /// Negation words that, next to a minute-step content word, read as a
    /// contradiction.
    pub negation: Vec<String>,
}

impl Default for ReplanPolicy {
    fn default() -> Self {
        let list = |words: &[&str]| words.iter().map(|w| w.to_string()).collect();
        Self {
            disruption: list(&[
                "unexpected",
                "blocked",
                "interrupted",
                "emergency",
                "cancelled",
                "canceled",
                "conflict",
            ]),
            significant: list(&["emergency", "urgent", "changed location"]),
            negation: list(&[
                "not ",
                "no longer",
                "cannot",
                "can't",
                "won't",
                "closed",
                "cancelled",
                "canceled",
                "refused",
                "gone",
            ]),
        }
    }
}

impl ReplanPolicy {
    /// Decide what `observation` invalidates, given the current minute step.
    pub fn assess(&self, observation: &str, minute: Option<&MinuteStep>) -> ReplanScope {
        let lowered = observation.to_lowercase();

        if self.significant.iter().any(|m| lowered.contains(m.as_str())) {
            return ReplanScope::Hourly;
        }
        if self.disruption.iter().any(|m| lowered.contains(m.as_str())) {
            return ReplanScope::Minute;
        }
        if let Some(step) = minute {
            if self.contradicts(&lowered, &step.action) {
                return ReplanScope::Minute;
            }
        }
        ReplanScope::None
    }

    /// `observation` (lowercased) negates `action` when a negation marker
    /// appears alongside one of the action's content words.
    fn contradicts(&self, observation: &str, action: &str) -> bool {
        if !self.negation.iter().any(|m| observation.contains(m.as_str())) {
            return false;
        }
        action
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|word| word.len() > 3 && !is_stopword(word))
            .any(|word| observation.contains(word))
    }
}

/// Words too common to signal a contradiction on their own.
fn is_stopword(word: &str) -> bool {
    matches!(
        word,
        "with" | "then" | "that" | "this" | "from" | "into" | "over" | "some" | "about" | "their"
    )
}
