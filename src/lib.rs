//! skill-activator: スキル自動起動フック
//!
//! プロンプト送信ごとに `skill-rules.json` のトリガーを評価し、
//! マッチしたスキルの本文をプロンプトへ注入する。ガードレールに
//! マッチした場合はプロンプトをブロックする。

pub mod augment;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod hook;
pub mod matcher;
pub mod pipeline;
pub mod policy;
pub mod rules;

// 主要な型の再エクスポート
pub use augment::{InMemorySkills, PromptAugmenter, SkillContentLookup, SkillDirectory};
pub use config::Config;
pub use context::{Context, ContextGatherer, VisibleFile};
pub use error::{ContentLookupError, PatternCompileError, RuleError};
pub use hook::{HookInput, HookResponse};
pub use matcher::{MatchOutcome, MatchResult, TriggerKind, TriggerMatcher};
pub use pipeline::{Activation, ActivationOutcome, ActivationPipeline};
pub use policy::{Action, Resolution};
pub use rules::{Enforcement, Priority, Rule, RuleKind, RuleStore};

/// バージョン情報
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// ブロック時の終了コード
pub const BLOCK_EXIT_CODE: u8 = 2;
