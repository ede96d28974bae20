use glob::Pattern;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::pattern::{self, PatternOptions};
use crate::error::{PatternCompileError, PatternField};

/// ルール種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    /// 安全・ポリシー系（制限的）
    Guardrail,
    /// 機能ヒント系
    #[default]
    Domain,
}

/// マッチ時の強制アクション（Suggest < Warn < Block の順で強い）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Enforcement {
    Suggest,
    Warn,
    Block,
}

/// 優先度（Low < Medium < High < Critical）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    /// ソート用の重み
    pub fn weight(self) -> u32 {
        match self {
            Priority::Critical => 1000,
            Priority::High => 100,
            Priority::Medium => 10,
            Priority::Low => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl RuleKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RuleKind::Guardrail => "guardrail",
            RuleKind::Domain => "domain",
        }
    }
}

impl Enforcement {
    pub fn as_str(self) -> &'static str {
        match self {
            Enforcement::Block => "block",
            Enforcement::Warn => "warn",
            Enforcement::Suggest => "suggest",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Display for Enforcement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// プロンプトトリガー
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptTriggers {
    /// 大文字小文字を無視した部分一致キーワード
    #[serde(default)]
    pub keywords: Vec<String>,
    /// プロンプト全体を検索する正規表現
    #[serde(default)]
    pub intent_patterns: Vec<String>,
}

/// ファイルトリガー
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileTriggers {
    #[serde(default)]
    pub path_patterns: Vec<String>,
    #[serde(default)]
    pub content_patterns: Vec<String>,
    #[serde(default)]
    pub path_exclusions: Vec<String>,
}

/// ルールファイル上の1エントリ（スキル名はマップのキー）
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDefinition {
    #[serde(rename = "type", default)]
    pub kind: RuleKind,
    pub enforcement: Enforcement,
    pub priority: Priority,
    #[serde(default)]
    pub description: Option<String>,
    /// ブロック時に表示する独自メッセージ
    #[serde(default)]
    pub block_message: Option<String>,
    #[serde(default)]
    pub prompt_triggers: Option<PromptTriggers>,
    #[serde(default)]
    pub file_triggers: Option<FileTriggers>,
}

/// コンパイル済みトリガー
#[derive(Debug, Default)]
pub(crate) struct CompiledTriggers {
    /// 小文字化済み
    pub keywords: Vec<String>,
    pub intent_patterns: Vec<Regex>,
    pub path_patterns: Vec<Pattern>,
    pub content_patterns: Vec<Regex>,
    pub path_exclusions: Vec<Pattern>,
}

impl CompiledTriggers {
    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
            && self.intent_patterns.is_empty()
            && self.path_patterns.is_empty()
            && self.content_patterns.is_empty()
    }
}

/// 読み込み済みルール（ストア内で不変）
#[derive(Debug)]
pub struct Rule {
    pub name: String,
    pub kind: RuleKind,
    pub enforcement: Enforcement,
    pub priority: Priority,
    pub description: Option<String>,
    pub block_message: Option<String>,
    pub(crate) compiled: CompiledTriggers,
    pattern_errors: Vec<PatternCompileError>,
}

impl Rule {
    /// 定義からルールを構築し、パターンをコンパイルする
    ///
    /// 不正なパターンはエラーとして記録し、そのパターンだけを除外する。
    pub fn compile(name: &str, def: RuleDefinition, options: &PatternOptions) -> Self {
        let mut errors = Vec::new();
        let mut compiled = CompiledTriggers::default();

        if let Some(triggers) = &def.prompt_triggers {
            compiled.keywords = triggers
                .keywords
                .iter()
                .filter(|k| !k.is_empty())
                .map(|k| k.to_lowercase())
                .collect();
            compiled.intent_patterns = compile_all(
                name,
                PatternField::IntentPattern,
                &triggers.intent_patterns,
                &mut errors,
                |p| pattern::compile_intent(p, options),
            );
        }

        if let Some(triggers) = &def.file_triggers {
            compiled.path_patterns = compile_all(
                name,
                PatternField::PathPattern,
                &triggers.path_patterns,
                &mut errors,
                pattern::compile_glob,
            );
            compiled.content_patterns = compile_all(
                name,
                PatternField::ContentPattern,
                &triggers.content_patterns,
                &mut errors,
                |p| pattern::compile_content(p, options),
            );
            compiled.path_exclusions = compile_all(
                name,
                PatternField::PathExclusion,
                &triggers.path_exclusions,
                &mut errors,
                pattern::compile_glob,
            );
        }

        for err in &errors {
            tracing::warn!("Skipping pattern: {}", err);
        }

        Self {
            name: name.to_string(),
            kind: def.kind,
            enforcement: def.enforcement,
            priority: def.priority,
            description: def.description,
            block_message: def.block_message,
            compiled,
            pattern_errors: errors,
        }
    }

    /// コンパイルに失敗したパターン
    pub fn pattern_errors(&self) -> &[PatternCompileError] {
        &self.pattern_errors
    }

    /// 有効なトリガーが1つもない（決してマッチしない）
    pub fn is_inert(&self) -> bool {
        self.compiled.is_empty()
    }

    pub fn keyword_count(&self) -> usize {
        self.compiled.keywords.len()
    }

    pub fn intent_pattern_count(&self) -> usize {
        self.compiled.intent_patterns.len()
    }

    pub fn path_pattern_count(&self) -> usize {
        self.compiled.path_patterns.len()
    }

    pub fn content_pattern_count(&self) -> usize {
        self.compiled.content_patterns.len()
    }
}

fn compile_all<T, E: fmt::Display>(
    rule: &str,
    field: PatternField,
    sources: &[String],
    errors: &mut Vec<PatternCompileError>,
    compile: impl Fn(&str) -> Result<T, E>,
) -> Vec<T> {
    let mut out = Vec::with_capacity(sources.len());
    for source in sources {
        match compile(source) {
            Ok(p) => out.push(p),
            Err(e) => errors.push(PatternCompileError {
                rule: rule.to_string(),
                field,
                pattern: source.clone(),
                message: e.to_string(),
            }),
        }
    }
    out
}
