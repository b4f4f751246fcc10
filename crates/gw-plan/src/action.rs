//! Minute-step classification.
//!
//! The minute step is free text; the agent loop needs to know which handler
//! consumes it.  Classification is keyword-based and deliberately dumb —
//! the text itself travels along unchanged as the action description, so a
//! misclassification costs a generic event, never lost intent.

/// What kind of act a minute step describes.
#[derive(Copy, Clone, PartialEq, Eq, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Move,
    Communicate,
    Interact,
    Observe,
    General,
}

/// Keyword groups, matched in priority order.  Dialogue wins over movement
/// ("go talk to Bob" is a conversation), interaction over movement ("go use
/// the stove" is an interaction).
const COMMUNICATE: &[&str] = &[
    "talk", "say ", "tell", "ask", "chat", "speak", "greet", "discuss", "reply", "converse",
];
const INTERACT: &[&str] = &[
    "use ", "open", "close", "pick up", "put down", "turn on", "turn off", "grab", "cook",
    "repair", "interact",
];
const MOVE: &[&str] = &[
    "walk", "go to", "move", "head to", "head toward", "travel", "run to", "return to", "leave",
];
const OBSERVE: &[&str] = &["look", "watch", "observe", "examine", "inspect", "scan"];

/// Classify a minute step's text into an [`ActionKind`].
pub fn classify_action(text: &str) -> ActionKind {
    let lowered = text.to_lowercase();
    let contains_any = |keywords: &[&str]| keywords.iter().any(|k| lowered.contains(k));

    if contains_any(COMMUNICATE) {
        ActionKind::Communicate
    } else if contains_any(INTERACT) {
        ActionKind::Interact
    } else if contains_any(MOVE) {
        ActionKind::Move
    } else if contains_any(OBSERVE) {
        ActionKind::Observe
    } else {
        ActionKind::General
    }
}
