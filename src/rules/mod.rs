//! ルールストア
//!
//! `skill-rules.json` を読み込み、スキルごとのトリガーと強制ポリシーを保持する。

pub mod model;
pub mod pattern;
pub mod store;

pub use model::{Enforcement, FileTriggers, Priority, PromptTriggers, Rule, RuleDefinition, RuleKind};
pub use pattern::PatternOptions;
pub use store::RuleStore;
