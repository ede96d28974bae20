//! スキル起動パイプライン
//!
//! gather → match → resolve → augment を1回のプロンプト送信ごとに実行する。
//! ルールストア以外の状態は持たず、リクエスト間で何も保持しない。

use serde::Serialize;
use std::sync::Arc;

use crate::augment::{PromptAugmenter, SkillContentLookup};
use crate::context::Context;
use crate::matcher::trigger::DEFAULT_MAX_CONTENT_BYTES;
use crate::matcher::{TriggerKind, TriggerMatcher};
use crate::policy::{self, Action};
use crate::rules::{Enforcement, Priority, RuleStore};

/// パイプラインの最終出力
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum ActivationOutcome {
    /// マッチなし。プロンプトは変更しない
    #[serde(rename = "none")]
    PassThrough { prompt: String },
    Suggest {
        prompt: String,
        additional_context: String,
        skills: Vec<String>,
    },
    Warn {
        prompt: String,
        additional_context: String,
        skills: Vec<String>,
        warning: String,
    },
    /// ブロック。プロンプトの続きは返さない
    Block { message: String, rules: Vec<String> },
}

impl ActivationOutcome {
    pub fn action(&self) -> Action {
        match self {
            ActivationOutcome::PassThrough { .. } => Action::None,
            ActivationOutcome::Suggest { .. } => Action::Suggest,
            ActivationOutcome::Warn { .. } => Action::Warn,
            ActivationOutcome::Block { .. } => Action::Block,
        }
    }

    /// 後段に渡すプロンプト（ブロック時は `None`）
    pub fn prompt(&self) -> Option<&str> {
        match self {
            ActivationOutcome::PassThrough { prompt }
            | ActivationOutcome::Suggest { prompt, .. }
            | ActivationOutcome::Warn { prompt, .. } => Some(prompt),
            ActivationOutcome::Block { .. } => None,
        }
    }
}

/// マッチしたルールの要約
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSummary {
    pub skill: String,
    pub matched_via: Vec<TriggerKind>,
    pub enforcement: Enforcement,
    pub priority: Priority,
}

/// 1回分の実行結果
#[derive(Debug, Clone, Serialize)]
pub struct Activation {
    pub outcome: ActivationOutcome,
    /// ルールストアの宣言順
    pub matches: Vec<MatchSummary>,
    /// スキップしたパターンやスキル本文の警告
    pub warnings: Vec<String>,
}

impl Activation {
    pub fn action(&self) -> Action {
        self.outcome.action()
    }
}

/// スキル起動パイプライン
pub struct ActivationPipeline {
    store: Arc<RuleStore>,
    augmenter: PromptAugmenter,
    max_content_bytes: usize,
}

impl ActivationPipeline {
    pub fn new(store: Arc<RuleStore>, lookup: Arc<dyn SkillContentLookup>) -> Self {
        Self {
            store,
            augmenter: PromptAugmenter::new(lookup),
            max_content_bytes: DEFAULT_MAX_CONTENT_BYTES,
        }
    }

    pub fn with_max_content_bytes(mut self, max: usize) -> Self {
        self.max_content_bytes = max;
        self
    }

    /// コンテキストに対してマッチング・ポリシー解決・拡張を実行
    pub async fn run(&self, context: &Context) -> Activation {
        let matcher = TriggerMatcher::new(&self.store).with_max_content_bytes(self.max_content_bytes);
        let outcome = matcher.detect(context);

        let mut warnings: Vec<String> = outcome.warnings.iter().map(|w| w.to_string()).collect();
        let matches: Vec<MatchSummary> = outcome
            .matches
            .iter()
            .map(|m| MatchSummary {
                skill: m.rule.name.clone(),
                matched_via: m.matched_via.iter().copied().collect(),
                enforcement: m.rule.enforcement,
                priority: m.rule.priority,
            })
            .collect();

        let resolution = policy::resolve(&outcome.matches);
        tracing::info!(
            "Resolved action '{}' for {} matched skills",
            resolution.action,
            resolution.ordered_skills.len()
        );

        let outcome = match resolution.action {
            Action::None => ActivationOutcome::PassThrough {
                prompt: context.prompt_text.clone(),
            },
            Action::Block => ActivationOutcome::Block {
                message: PromptAugmenter::build_block_message(&resolution.blocking_rules),
                rules: resolution
                    .blocking_rules
                    .iter()
                    .map(|r| r.name.clone())
                    .collect(),
            },
            Action::Suggest | Action::Warn => {
                let augmented = self
                    .augmenter
                    .augment(&context.prompt_text, &resolution.ordered_skills)
                    .await;
                warnings.extend(augmented.skipped.iter().map(|e| e.to_string()));

                if resolution.action == Action::Warn {
                    ActivationOutcome::Warn {
                        prompt: augmented.prompt,
                        additional_context: augmented.appended,
                        skills: augmented.included,
                        warning: PromptAugmenter::build_warning(&resolution.warning_rules),
                    }
                } else {
                    ActivationOutcome::Suggest {
                        prompt: augmented.prompt,
                        additional_context: augmented.appended,
                        skills: augmented.included,
                    }
                }
            }
        };

        Activation {
            outcome,
            matches,
            warnings,
        }
    }
}
