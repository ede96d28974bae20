pub mod trigger;

pub use trigger::{MatchOutcome, MatchResult, TriggerKind, TriggerMatcher};
