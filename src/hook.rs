//! プロンプト送信フックのプロトコル
//!
//! 標準入力のJSONペイロードを読み、パイプラインの結果を
//! フック応答JSONとして返す。

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::pipeline::ActivationOutcome;

/// フックのイベント名
pub const USER_PROMPT_SUBMIT: &str = "UserPromptSubmit";

/// フック入力（未知のフィールドは無視）
#[derive(Debug, Clone, Deserialize)]
pub struct HookInput {
    pub prompt: String,
    /// プロジェクトルートとして扱う作業ディレクトリ
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub hook_event_name: Option<String>,
    /// エディタで開いているファイル等
    #[serde(default)]
    pub files: Vec<PathBuf>,
}

impl HookInput {
    pub fn parse(raw: &str) -> Result<Self> {
        let input: HookInput =
            serde_json::from_str(raw).context("Failed to parse hook input JSON")?;
        if let Some(event) = &input.hook_event_name {
            if event != USER_PROMPT_SUBMIT {
                tracing::warn!("Unexpected hook event '{}', handling as {}", event, USER_PROMPT_SUBMIT);
            }
        }
        Ok(input)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookSpecificOutput {
    pub hook_event_name: String,
    pub additional_context: String,
}

/// フック応答
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hook_specific_output: Option<HookSpecificOutput>,
    /// ユーザーに表示するメッセージ
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_message: Option<String>,
}

impl HookResponse {
    pub fn from_outcome(outcome: &ActivationOutcome) -> Self {
        match outcome {
            ActivationOutcome::PassThrough { .. } => Self::default(),
            ActivationOutcome::Suggest { additional_context, .. } => Self {
                hook_specific_output: Self::context_output(additional_context),
                ..Self::default()
            },
            ActivationOutcome::Warn {
                additional_context,
                warning,
                ..
            } => Self {
                hook_specific_output: Self::context_output(additional_context),
                system_message: Some(warning.clone()),
                ..Self::default()
            },
            ActivationOutcome::Block { message, .. } => Self {
                decision: Some("block".to_string()),
                reason: Some(message.clone()),
                ..Self::default()
            },
        }
    }

    fn context_output(additional_context: &str) -> Option<HookSpecificOutput> {
        if additional_context.is_empty() {
            return None;
        }
        Some(HookSpecificOutput {
            hook_event_name: USER_PROMPT_SUBMIT.to_string(),
            additional_context: additional_context.to_string(),
        })
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to serialize hook response")
    }
}
