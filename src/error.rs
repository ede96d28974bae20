//! エラー型定義
//!
//! ルール読み込み時の致命的エラーと、マッチング・注入時の
//! 非致命的エラー（ログに記録してスキップ）を区別する。

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// ルールストア読み込み時のエラー（起動を中断する）
#[derive(Debug, Error)]
pub enum RuleError {
    /// ルールソース全体が不正（JSONでない、オブジェクトでない等）
    #[error("malformed rule source: {reason}")]
    Malformed { reason: String },

    /// 個別ルールの定義が不正（列挙値の範囲外、トリガー未定義等）
    #[error("malformed rule '{name}': {reason}")]
    MalformedRule { name: String, reason: String },

    /// 同名ルールの重複
    #[error("duplicate rule '{name}'")]
    Duplicate { name: String },

    /// ルールファイルの読み込み失敗
    #[error("failed to read rule file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RuleError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        RuleError::Malformed { reason: reason.into() }
    }

    pub(crate) fn malformed_rule(name: &str, reason: impl Into<String>) -> Self {
        RuleError::MalformedRule {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// 重複エラーかどうか
    pub fn is_duplicate(&self) -> bool {
        matches!(self, RuleError::Duplicate { .. })
    }
}

/// パターンの種別（コンパイルエラーの報告用）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternField {
    IntentPattern,
    PathPattern,
    ContentPattern,
    PathExclusion,
}

impl fmt::Display for PatternField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PatternField::IntentPattern => "intentPatterns",
            PatternField::PathPattern => "pathPatterns",
            PatternField::ContentPattern => "contentPatterns",
            PatternField::PathExclusion => "pathExclusions",
        };
        write!(f, "{}", s)
    }
}

/// 不正なパターン（そのパターンのみスキップされる）
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("rule '{rule}': invalid {field} entry `{pattern}`: {message}")]
pub struct PatternCompileError {
    pub rule: String,
    pub field: PatternField,
    pub pattern: String,
    pub message: String,
}

/// スキル本文の取得失敗（そのスキルのセクションのみスキップされる）
#[derive(Debug, Error)]
pub enum ContentLookupError {
    #[error("no content found for skill '{0}'")]
    NotFound(String),

    #[error("failed to read skill '{name}' from {}: {source}", path.display())]
    Io {
        name: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid frontmatter in {}: {message}", path.display())]
    InvalidFrontmatter { path: PathBuf, message: String },
}

impl ContentLookupError {
    /// 対象スキル名（frontmatterエラーの場合はファイル名から推測しない）
    pub fn skill_name(&self) -> Option<&str> {
        match self {
            ContentLookupError::NotFound(name) => Some(name),
            ContentLookupError::Io { name, .. } => Some(name),
            ContentLookupError::InvalidFrontmatter { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = RuleError::Duplicate { name: "fastapi".to_string() };
        assert_eq!(err.to_string(), "duplicate rule 'fastapi'");
        assert!(err.is_duplicate());

        let err = RuleError::malformed_rule("dbguard", "unknown variant `deny`");
        assert!(err.to_string().contains("dbguard"));
        assert!(!err.is_duplicate());
    }

    #[test]
    fn test_pattern_error_display() {
        let err = PatternCompileError {
            rule: "backend".to_string(),
            field: PatternField::IntentPattern,
            pattern: "(unclosed".to_string(),
            message: "unclosed group".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("backend"));
        assert!(msg.contains("intentPatterns"));
        assert!(msg.contains("(unclosed"));
    }
}
