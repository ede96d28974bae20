use std::sync::Arc;

use super::lookup::SkillContentLookup;
use crate::error::ContentLookupError;
use crate::rules::Rule;

/// プロンプト拡張結果
#[derive(Debug)]
pub struct Augmented {
    /// 元のプロンプト + スキルセクション
    pub prompt: String,
    /// 追加したセクション部分のみ（フック出力用）
    pub appended: String,
    /// 注入できたスキル（注入順）
    pub included: Vec<String>,
    /// 本文を取得できずスキップしたスキル
    pub skipped: Vec<ContentLookupError>,
}

/// プロンプト拡張器
pub struct PromptAugmenter {
    lookup: Arc<dyn SkillContentLookup>,
}

impl PromptAugmenter {
    pub fn new(lookup: Arc<dyn SkillContentLookup>) -> Self {
        Self { lookup }
    }

    /// 優先順のスキル本文をプロンプトの後ろに連結
    ///
    /// 連結順は `ordered_skills` と完全に一致する。本文の取得に失敗した
    /// スキルはスキップし、全体は失敗させない。
    pub async fn augment(&self, prompt: &str, ordered_skills: &[String]) -> Augmented {
        let mut sections = Vec::with_capacity(ordered_skills.len());
        let mut included = Vec::new();
        let mut skipped = Vec::new();

        for name in ordered_skills {
            match self.lookup.lookup(name).await {
                Ok(content) => {
                    sections.push(Self::skill_section(name, &content));
                    included.push(name.clone());
                }
                Err(e) => {
                    tracing::warn!("Skipping skill '{}': {}", name, e);
                    skipped.push(e);
                }
            }
        }

        let appended = sections.join("\n\n");
        let prompt = if appended.is_empty() {
            prompt.to_string()
        } else if prompt.is_empty() {
            appended.clone()
        } else {
            format!("{}\n\n{}", prompt, appended)
        };

        Augmented {
            prompt,
            appended,
            included,
            skipped,
        }
    }

    /// スキルを区切り付きセクションに変換
    pub fn skill_section(name: &str, content: &str) -> String {
        format!("<skill name=\"{}\">\n{}\n</skill>", name, content.trim())
    }

    /// ブロック時のメッセージ（元のプロンプトは含めない）
    pub fn build_block_message(blocking_rules: &[&Rule]) -> String {
        let mut message = String::from("Prompt blocked by guardrail policy.\n");
        for rule in blocking_rules {
            message.push_str(&format!(
                "\n- {} ({}, priority: {})",
                rule.name, rule.kind, rule.priority
            ));
            if let Some(custom) = rule.block_message.as_deref().or(rule.description.as_deref()) {
                message.push_str(&format!("\n  {}", custom.trim()));
            }
        }
        message.push_str("\n\nRevise the request and submit it again.");
        message
    }

    /// warn ルールの警告文
    pub fn build_warning(warning_rules: &[&Rule]) -> String {
        let names: Vec<String> = warning_rules
            .iter()
            .map(|rule| format!("{} ({})", rule.name, rule.priority))
            .collect();
        format!(
            "Warning: this request matched rules that require care: {}",
            names.join(", ")
        )
    }
}
