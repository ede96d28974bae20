use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use super::model::{Rule, RuleDefinition};
use super::pattern::PatternOptions;
use crate::error::{PatternCompileError, RuleError};

/// エンベロープ形式で `skills` と並んで許可されるキー
const ENVELOPE_KEYS: &[&str] = &["version", "description", "$schema"];

/// ルールストア - 宣言順を保持する不変のルール集合
///
/// 起動時に一度だけ読み込み、以後は `Arc` で共有して読み取りのみ行う。
#[derive(Debug, Default)]
pub struct RuleStore {
    /// 宣言順
    rules: Vec<Rule>,
    /// 名前 -> `rules` のインデックス
    index: HashMap<String, usize>,
}

impl RuleStore {
    /// JSON文字列からルールを読み込み
    pub fn parse(source: &str) -> Result<Self, RuleError> {
        Self::parse_with_options(source, &PatternOptions::default())
    }

    /// パターン設定を指定してJSON文字列から読み込み
    ///
    /// スキル名をキーとするオブジェクト、または
    /// `{"version": ..., "skills": {...}}` 形式のどちらも受け付ける。
    pub fn parse_with_options(source: &str, options: &PatternOptions) -> Result<Self, RuleError> {
        let top: OrderedEntries = serde_json::from_str(source)
            .map_err(|e| RuleError::malformed(e.to_string()))?;

        let entries = if is_envelope(&top) {
            let envelope: Envelope = serde_json::from_str(source)
                .map_err(|e| RuleError::malformed(e.to_string()))?;
            envelope.skills
        } else {
            top
        };

        let mut store = Self::default();
        for (name, value) in entries.0 {
            store.insert_entry(&name, value, options)?;
        }

        tracing::debug!("Parsed {} rules", store.len());
        Ok(store)
    }

    /// ルールファイルを読み込み
    pub fn load_from_file(path: &Path, options: &PatternOptions) -> Result<Self, RuleError> {
        let content = std::fs::read_to_string(path).map_err(|source| RuleError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let store = Self::parse_with_options(&content, options)?;
        tracing::info!("Loaded {} rules from {}", store.len(), path.display());
        Ok(store)
    }

    /// 別のストアを後ろに連結（同名ルールは重複エラー）
    pub fn merge(mut self, other: RuleStore) -> Result<Self, RuleError> {
        for rule in other.rules {
            self.push(rule)?;
        }
        Ok(self)
    }

    fn insert_entry(
        &mut self,
        name: &str,
        value: Value,
        options: &PatternOptions,
    ) -> Result<(), RuleError> {
        if name.trim().is_empty() {
            return Err(RuleError::malformed("rule name must not be empty"));
        }
        if !is_valid_rule_name(name) {
            return Err(RuleError::malformed_rule(
                name,
                "rule name must not contain quotes, angle brackets, '&' or control characters",
            ));
        }
        if self.index.contains_key(name) {
            return Err(RuleError::Duplicate { name: name.to_string() });
        }
        if !value.is_object() {
            return Err(RuleError::malformed_rule(name, "rule definition must be an object"));
        }

        let def: RuleDefinition = serde_json::from_value(value)
            .map_err(|e| RuleError::malformed_rule(name, e.to_string()))?;

        if def.prompt_triggers.is_none() && def.file_triggers.is_none() {
            return Err(RuleError::malformed_rule(
                name,
                "rule defines neither promptTriggers nor fileTriggers",
            ));
        }

        let rule = Rule::compile(name, def, options);
        if rule.is_inert() {
            tracing::warn!("Rule '{}' has no usable triggers and will never match", name);
        }
        self.push(rule)
    }

    fn push(&mut self, rule: Rule) -> Result<(), RuleError> {
        if self.index.contains_key(&rule.name) {
            return Err(RuleError::Duplicate { name: rule.name });
        }
        self.index.insert(rule.name.clone(), self.rules.len());
        self.rules.push(rule);
        Ok(())
    }

    /// 名前でルールを取得
    pub fn get(&self, name: &str) -> Option<&Rule> {
        self.index.get(name).map(|&i| &self.rules[i])
    }

    /// 宣言順にルールを列挙
    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    /// ルール名一覧（宣言順）
    pub fn names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name.as_str()).collect()
    }

    /// 全ルールのパターンコンパイルエラー
    pub fn pattern_errors(&self) -> Vec<PatternCompileError> {
        self.rules
            .iter()
            .flat_map(|r| r.pattern_errors().iter().cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// エンベロープ形式の判定
///
/// `skills` という名前のルールも正当なので、`skills` の値がルール定義
/// （`enforcement` を持つ）ではなく、中身がすべてオブジェクトの場合のみ
/// エンベロープとみなす。他のキーはメタデータ（オブジェクト以外）に限る。
fn is_envelope(top: &OrderedEntries) -> bool {
    let skills_is_map = top.0.iter().any(|(key, value)| {
        key == "skills"
            && value.as_object().is_some_and(|inner| {
                !inner.contains_key("enforcement") && inner.values().all(Value::is_object)
            })
    });
    skills_is_map
        && top.0.iter().all(|(key, value)| {
            key == "skills" || (ENVELOPE_KEYS.contains(&key.as_str()) && !value.is_object())
        })
}

/// `<skill name="...">` 区切りを壊す文字を含まないこと
fn is_valid_rule_name(name: &str) -> bool {
    !name.trim().is_empty()
        && !name
            .chars()
            .any(|c| matches!(c, '"' | '<' | '>' | '&') || c.is_control())
}

#[derive(Deserialize)]
struct Envelope {
    skills: OrderedEntries,
}

/// 宣言順と重複キーを保持したままJSONオブジェクトを読む
///
/// `serde_json::Map` は重複キーを後勝ちで潰してしまうため使わない。
struct OrderedEntries(Vec<(String, Value)>);

impl<'de> Deserialize<'de> for OrderedEntries {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = OrderedEntries;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object keyed by skill name")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((key, value)) = map.next_entry::<String, Value>()? {
                    entries.push((key, value));
                }
                Ok(OrderedEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{Enforcement, Priority, RuleKind};
    use serde_json::json;

    fn sample() -> String {
        json!({
            "backend-dev": {
                "type": "domain",
                "enforcement": "suggest",
                "priority": "high",
                "description": "Backend guidelines",
                "promptTriggers": {
                    "keywords": ["controller", "endpoint"],
                    "intentPatterns": ["(create|add).*route"]
                },
                "fileTriggers": {
                    "pathPatterns": ["backend/src/**/*.ts"],
                    "pathExclusions": ["**/*.test.ts"]
                }
            },
            "db-guard": {
                "type": "guardrail",
                "enforcement": "block",
                "priority": "critical",
                "promptTriggers": { "keywords": ["DROP TABLE"] }
            }
        })
        .to_string()
    }

    #[test]
    fn test_parse_flat_rules() {
        let store = RuleStore::parse(&sample()).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.names(), vec!["backend-dev", "db-guard"]);

        let guard = store.get("db-guard").unwrap();
        assert_eq!(guard.kind, RuleKind::Guardrail);
        assert_eq!(guard.enforcement, Enforcement::Block);
        assert_eq!(guard.priority, Priority::Critical);

        let backend = store.get("backend-dev").unwrap();
        assert_eq!(backend.description.as_deref(), Some("Backend guidelines"));
        assert_eq!(backend.keyword_count(), 2);
        assert_eq!(backend.path_pattern_count(), 1);
    }

    #[test]
    fn test_declaration_order_is_preserved() {
        let source = r#"{
            "zeta": {"enforcement": "suggest", "priority": "low", "promptTriggers": {"keywords": ["z"]}},
            "alpha": {"enforcement": "suggest", "priority": "low", "promptTriggers": {"keywords": ["a"]}},
            "mid": {"enforcement": "suggest", "priority": "low", "promptTriggers": {"keywords": ["m"]}}
        }"#;
        let store = RuleStore::parse(source).unwrap();
        assert_eq!(store.names(), vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_parse_envelope() {
        let source = format!(r#"{{"version": "1.0", "description": "rules", "skills": {}}}"#, sample());
        let store = RuleStore::parse(&source).unwrap();
        assert_eq!(store.names(), vec!["backend-dev", "db-guard"]);
    }

    #[test]
    fn test_rule_named_skills_is_not_an_envelope() {
        let source = r#"{"skills": {"type": "domain", "enforcement": "suggest", "priority": "low",
            "promptTriggers": {"keywords": ["x"]}}}"#;
        let store = RuleStore::parse(source).unwrap();
        assert_eq!(store.names(), vec!["skills"]);
        assert_eq!(store.get("skills").unwrap().priority, Priority::Low);
    }

    #[test]
    fn test_flat_rules_named_like_envelope_keys() {
        let source = r#"{
            "version": {"enforcement": "warn", "priority": "high", "promptTriggers": {"keywords": ["bump"]}},
            "skills": {"enforcement": "suggest", "priority": "low", "promptTriggers": {"keywords": ["x"]}}
        }"#;
        let store = RuleStore::parse(source).unwrap();
        assert_eq!(store.names(), vec!["version", "skills"]);
    }

    #[test]
    fn test_empty_envelope() {
        let store = RuleStore::parse(r#"{"version": "1.0", "skills": {}}"#).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_rule_name_breaking_section_delimiter_is_rejected() {
        for name in ["bad\"name", "a>b", "<x", "a&b"] {
            let source = json!({
                name: {"enforcement": "suggest", "priority": "low", "promptTriggers": {"keywords": ["x"]}}
            })
            .to_string();
            match RuleStore::parse(&source) {
                Err(RuleError::MalformedRule { name: rejected, .. }) => assert_eq!(rejected, name),
                other => panic!("unexpected result for {:?}: {:?}", name, other),
            }
        }
    }

    #[test]
    fn test_duplicate_key_is_rejected() {
        let source = r#"{
            "dup": {"enforcement": "suggest", "priority": "low", "promptTriggers": {"keywords": ["a"]}},
            "dup": {"enforcement": "warn", "priority": "high", "promptTriggers": {"keywords": ["b"]}}
        }"#;
        let err = RuleStore::parse(source).unwrap_err();
        assert!(err.is_duplicate());
    }

    #[test]
    fn test_malformed_sources() {
        assert!(matches!(RuleStore::parse("not json"), Err(RuleError::Malformed { .. })));
        assert!(matches!(RuleStore::parse("[1, 2]"), Err(RuleError::Malformed { .. })));
        assert!(matches!(
            RuleStore::parse(r#"{"x": 42}"#),
            Err(RuleError::MalformedRule { .. })
        ));
    }

    #[test]
    fn test_unknown_priority_is_rejected() {
        let source = r#"{"x": {"enforcement": "suggest", "priority": "urgent", "promptTriggers": {"keywords": ["a"]}}}"#;
        match RuleStore::parse(source) {
            Err(RuleError::MalformedRule { name, .. }) => assert_eq!(name, "x"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_rule_without_triggers_is_rejected() {
        let source = r#"{"x": {"type": "domain", "enforcement": "suggest", "priority": "low"}}"#;
        let err = RuleStore::parse(source).unwrap_err();
        assert!(err.to_string().contains("neither promptTriggers nor fileTriggers"));
    }

    #[test]
    fn test_bad_pattern_does_not_fail_load() {
        let source = r#"{"x": {"enforcement": "suggest", "priority": "low",
            "promptTriggers": {"keywords": ["a"], "intentPatterns": ["(oops"]}}}"#;
        let store = RuleStore::parse(source).unwrap();
        assert_eq!(store.pattern_errors().len(), 1);
    }

    #[test]
    fn test_merge_detects_duplicates() {
        let user = RuleStore::parse(&sample()).unwrap();
        let project = RuleStore::parse(
            r#"{"frontend": {"enforcement": "suggest", "priority": "medium", "promptTriggers": {"keywords": ["react"]}}}"#,
        )
        .unwrap();
        let merged = user.merge(project).unwrap();
        assert_eq!(merged.names(), vec!["backend-dev", "db-guard", "frontend"]);

        let again = RuleStore::parse(&sample()).unwrap();
        let err = merged.merge(again).unwrap_err();
        assert!(err.is_duplicate());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skill-rules.json");
        std::fs::write(&path, sample()).unwrap();

        let store = RuleStore::load_from_file(&path, &PatternOptions::default()).unwrap();
        assert_eq!(store.len(), 2);

        let missing = RuleStore::load_from_file(&dir.path().join("nope.json"), &PatternOptions::default());
        assert!(matches!(missing, Err(RuleError::Io { .. })));
    }
}
