//! `gw-reflect` — the reflection engine.
//!
//! After an agent's observations accumulate enough importance inside the
//! trigger window, the engine asks the LM for the salient questions those
//! observations raise, gathers supporting memories per question, and
//! synthesizes insights that are appended back into the stream as
//! `Reflection` memories whose `related` set is the evidence chain.
//!
//! Reflection is best-effort by design: any LM failure aborts the pass
//! silently.  A world never stalls because its agents cannot introspect.

pub mod engine;

#[cfg(test)]
mod tests;

pub use engine::ReflectionEngine;
