use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

use crate::context::{Context, VisibleFile};
use crate::error::PatternCompileError;
use crate::rules::pattern::{glob_options, normalize_path, truncate_at_char_boundary};
use crate::rules::{Rule, RuleStore};

/// コンテンツ検索のデフォルト上限（バイト）。収集するファイルサイズの既定上限と同じ
pub const DEFAULT_MAX_CONTENT_BYTES: usize = 1024 * 1024;

/// マッチしたトリガーの種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TriggerKind {
    Keyword,
    IntentPattern,
    PathPattern,
    ContentPattern,
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TriggerKind::Keyword => "keyword",
            TriggerKind::IntentPattern => "intentPattern",
            TriggerKind::PathPattern => "pathPattern",
            TriggerKind::ContentPattern => "contentPattern",
        };
        write!(f, "{}", s)
    }
}

/// 1ルールのマッチ結果
#[derive(Debug, Clone)]
pub struct MatchResult<'a> {
    /// 元のルール（読み取り専用）
    pub rule: &'a Rule,
    /// 発火したトリガー種別
    pub matched_via: BTreeSet<TriggerKind>,
}

impl<'a> MatchResult<'a> {
    pub fn skill_name(&self) -> &'a str {
        &self.rule.name
    }
}

/// マッチング1回分の結果
#[derive(Debug, Clone, Default)]
pub struct MatchOutcome<'a> {
    /// ルールストアの宣言順
    pub matches: Vec<MatchResult<'a>>,
    /// スキップされた不正パターン
    pub warnings: Vec<PatternCompileError>,
}

/// トリガーマッチャー
///
/// `(ルール, コンテキスト)` の純粋関数。同じ入力には常に同じ結果を返す。
pub struct TriggerMatcher<'a> {
    store: &'a RuleStore,
    max_content_bytes: usize,
}

impl<'a> TriggerMatcher<'a> {
    pub fn new(store: &'a RuleStore) -> Self {
        Self {
            store,
            max_content_bytes: DEFAULT_MAX_CONTENT_BYTES,
        }
    }

    /// コンテンツパターンで検索する先頭バイト数を設定
    pub fn with_max_content_bytes(mut self, max: usize) -> Self {
        self.max_content_bytes = max;
        self
    }

    /// コンテキストにマッチするルールを検出
    pub fn detect(&self, context: &Context) -> MatchOutcome<'a> {
        let prompt_lower = context.prompt_text.to_lowercase();
        let mut outcome = MatchOutcome::default();

        for rule in self.store.iter() {
            for err in rule.pattern_errors() {
                tracing::warn!("Skipped pattern during matching: {}", err);
                outcome.warnings.push(err.clone());
            }

            if let Some(result) = self.evaluate(rule, context, &prompt_lower) {
                tracing::debug!(
                    "Rule '{}' matched via {:?}",
                    rule.name,
                    result.matched_via
                );
                outcome.matches.push(result);
            }
        }

        outcome
    }

    /// 1ルールを評価（カテゴリ間・パターン間はOR）
    pub fn evaluate(
        &self,
        rule: &'a Rule,
        context: &Context,
        prompt_lower: &str,
    ) -> Option<MatchResult<'a>> {
        let triggers = &rule.compiled;
        let mut matched_via = BTreeSet::new();

        if triggers.keywords.iter().any(|k| prompt_lower.contains(k.as_str())) {
            matched_via.insert(TriggerKind::Keyword);
        }

        if triggers
            .intent_patterns
            .iter()
            .any(|re| re.is_match(&context.prompt_text))
        {
            matched_via.insert(TriggerKind::IntentPattern);
        }

        let (path_hit, content_hit) = self.evaluate_files(rule, context.visible_files());
        if path_hit {
            matched_via.insert(TriggerKind::PathPattern);
        }
        if content_hit {
            matched_via.insert(TriggerKind::ContentPattern);
        }

        if matched_via.is_empty() {
            None
        } else {
            Some(MatchResult { rule, matched_via })
        }
    }

    /// ファイルトリガーの評価。除外パスに該当するファイルはパス・内容とも寄与しない
    fn evaluate_files(&self, rule: &Rule, files: &[VisibleFile]) -> (bool, bool) {
        let triggers = &rule.compiled;
        if triggers.path_patterns.is_empty() && triggers.content_patterns.is_empty() {
            return (false, false);
        }

        let opts = glob_options();
        let mut path_hit = false;
        let mut content_hit = false;

        for file in files {
            let path = normalize_path(&file.path);
            if triggers
                .path_exclusions
                .iter()
                .any(|ex| ex.matches_with(&path, opts))
            {
                continue;
            }

            if !path_hit {
                path_hit = triggers
                    .path_patterns
                    .iter()
                    .any(|p| p.matches_with(&path, opts));
            }

            if !content_hit && !triggers.content_patterns.is_empty() {
                if file.content.len() > self.max_content_bytes {
                    tracing::debug!(
                        "Content of {} truncated to {} bytes for rule '{}'",
                        path,
                        self.max_content_bytes,
                        rule.name
                    );
                }
                let content = truncate_at_char_boundary(&file.content, self.max_content_bytes);
                content_hit = triggers
                    .content_patterns
                    .iter()
                    .any(|re| re.is_match(content));
            }

            if path_hit && content_hit {
                break;
            }
        }

        (path_hit, content_hit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::VisibleFile;
    use serde_json::json;

    fn store(value: serde_json::Value) -> RuleStore {
        RuleStore::parse(&value.to_string()).unwrap()
    }

    fn names<'a>(outcome: &MatchOutcome<'a>) -> Vec<&'a str> {
        outcome.matches.iter().map(|m| m.skill_name()).collect()
    }

    #[test]
    fn test_keyword_is_case_insensitive() {
        let rules = store(json!({
            "api": {"enforcement": "suggest", "priority": "medium",
                    "promptTriggers": {"keywords": ["endpoint"]}}
        }));
        let outcome = TriggerMatcher::new(&rules).detect(&Context::new("Create an ENDPOINT now"));

        assert_eq!(names(&outcome), vec!["api"]);
        assert!(outcome.matches[0].matched_via.contains(&TriggerKind::Keyword));
    }

    #[test]
    fn test_keyword_and_intent_both_recorded() {
        let rules = store(json!({
            "fastapi": {"enforcement": "suggest", "priority": "high",
                        "promptTriggers": {"keywords": ["endpoint"],
                                           "intentPatterns": ["(create).*endpoint"]}}
        }));
        let outcome = TriggerMatcher::new(&rules).detect(&Context::new("Create a POST endpoint"));

        let via: Vec<_> = outcome.matches[0].matched_via.iter().copied().collect();
        assert_eq!(via, vec![TriggerKind::Keyword, TriggerKind::IntentPattern]);
    }

    #[test]
    fn test_path_and_content_patterns() {
        let rules = store(json!({
            "frontend": {"enforcement": "suggest", "priority": "medium",
                         "fileTriggers": {"pathPatterns": ["frontend/src/**/*.tsx"]}},
            "prisma": {"enforcement": "suggest", "priority": "medium",
                       "fileTriggers": {"contentPatterns": ["import .*@prisma/client"]}}
        }));
        let context = Context::with_files(
            "refactor this",
            vec![
                VisibleFile::new("frontend/src/components/App.tsx", "export const App = () => null;"),
                VisibleFile::new("backend/db.ts", "import { PrismaClient } from '@prisma/client';"),
            ],
        );
        let outcome = TriggerMatcher::new(&rules).detect(&context);

        assert_eq!(names(&outcome), vec!["frontend", "prisma"]);
        assert!(outcome.matches[0].matched_via.contains(&TriggerKind::PathPattern));
        assert!(outcome.matches[1].matched_via.contains(&TriggerKind::ContentPattern));
    }

    #[test]
    fn test_exclusion_suppresses_file_but_not_keyword() {
        let rules = store(json!({
            "backend": {"enforcement": "suggest", "priority": "high",
                        "promptTriggers": {"keywords": ["service"]},
                        "fileTriggers": {"pathPatterns": ["src/**/*.ts"],
                                         "contentPatterns": ["describe\\("],
                                         "pathExclusions": ["**/*.test.ts"]}}
        }));
        let files = vec![VisibleFile::new("src/user/user.test.ts", "describe('user', () => {})")];

        let excluded_only = TriggerMatcher::new(&rules).detect(&Context::with_files("fix it", files.clone()));
        assert!(excluded_only.matches.is_empty());

        let with_keyword = TriggerMatcher::new(&rules).detect(&Context::with_files("fix the user service", files));
        let via: Vec<_> = with_keyword.matches[0].matched_via.iter().copied().collect();
        assert_eq!(via, vec![TriggerKind::Keyword]);
    }

    #[test]
    fn test_exclusion_is_per_file() {
        let rules = store(json!({
            "backend": {"enforcement": "suggest", "priority": "high",
                        "fileTriggers": {"pathPatterns": ["src/**/*.ts"],
                                         "pathExclusions": ["**/*.test.ts"]}}
        }));
        let context = Context::with_files(
            "",
            vec![
                VisibleFile::new("src/user/user.test.ts", ""),
                VisibleFile::new("src/user/user.service.ts", ""),
            ],
        );
        let outcome = TriggerMatcher::new(&rules).detect(&context);
        assert_eq!(names(&outcome), vec!["backend"]);
    }

    #[test]
    fn test_bad_pattern_is_skipped_with_warning() {
        let rules = store(json!({
            "broken": {"enforcement": "block", "priority": "critical",
                       "promptTriggers": {"intentPatterns": ["(unclosed"]}},
            "working": {"enforcement": "suggest", "priority": "low",
                        "promptTriggers": {"intentPatterns": ["deploy"]}}
        }));
        let outcome = TriggerMatcher::new(&rules).detect(&Context::new("deploy (unclosed"));

        assert_eq!(names(&outcome), vec!["working"]);
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.warnings[0].rule, "broken");
    }

    #[test]
    fn test_inert_rule_never_matches() {
        let rules = store(json!({
            "empty": {"enforcement": "suggest", "priority": "low",
                      "promptTriggers": {"keywords": []},
                      "fileTriggers": {"pathExclusions": ["**"]}}
        }));
        let context = Context::with_files("anything", vec![VisibleFile::new("a.rs", "x")]);
        assert!(TriggerMatcher::new(&rules).detect(&context).matches.is_empty());
    }

    #[test]
    fn test_content_search_is_bounded() {
        let rules = store(json!({
            "marker": {"enforcement": "suggest", "priority": "low",
                       "fileTriggers": {"contentPatterns": ["MARKER"]}}
        }));
        let content = format!("{}MARKER", "x".repeat(100));
        let context = Context::with_files("", vec![VisibleFile::new("big.txt", content)]);

        let bounded = TriggerMatcher::new(&rules).with_max_content_bytes(50).detect(&context);
        assert!(bounded.matches.is_empty());

        let full = TriggerMatcher::new(&rules).detect(&context);
        assert_eq!(full.matches.len(), 1);
    }

    #[test]
    fn test_default_limit_covers_late_content() {
        let rules = store(json!({
            "marker": {"enforcement": "suggest", "priority": "low",
                       "fileTriggers": {"contentPatterns": ["MARKER"]}}
        }));
        let content = format!("{}MARKER", "x".repeat(512 * 1024));
        let context = Context::with_files("", vec![VisibleFile::new("big.txt", content)]);

        let outcome = TriggerMatcher::new(&rules).detect(&context);
        assert_eq!(names(&outcome), vec!["marker"]);
    }

    #[test]
    fn test_detection_is_deterministic() {
        let rules = store(json!({
            "a": {"enforcement": "suggest", "priority": "low", "promptTriggers": {"keywords": ["x"]}},
            "b": {"enforcement": "warn", "priority": "high", "promptTriggers": {"intentPatterns": ["x+"]}},
            "c": {"enforcement": "suggest", "priority": "medium",
                  "fileTriggers": {"pathPatterns": ["**/*.rs"]}}
        }));
        let context = Context::with_files("xx", vec![VisibleFile::new("src/lib.rs", "")]);
        let matcher = TriggerMatcher::new(&rules);

        let first: Vec<_> = matcher.detect(&context).matches.iter()
            .map(|m| (m.skill_name(), m.matched_via.clone())).collect();
        for _ in 0..10 {
            let again: Vec<_> = matcher.detect(&context).matches.iter()
                .map(|m| (m.skill_name(), m.matched_via.clone())).collect();
            assert_eq!(first, again);
        }
        assert_eq!(first.len(), 3);
    }
}
