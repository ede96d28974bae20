//! 色付き出力モジュール
//!
//! 標準出力はプロンプト・フック応答専用のため、表示用の出力はすべて
//! 標準エラーに色分けして書き出す。

use crossterm::{
    execute,
    style::{Attribute, Color, Print, ResetColor, SetAttribute, SetForegroundColor},
};
use std::io::{self, Write};

use crate::rules::Rule;

/// Unicodeアイコンとフォールバック文字
pub struct Icons;

impl Icons {
    /// ブロックアイコン
    pub fn block() -> &'static str {
        if Self::supports_unicode() { "⛔ " } else { "[X]" }
    }

    /// 警告アイコン
    pub fn warn() -> &'static str {
        if Self::supports_unicode() { "⚠️ " } else { "[!]" }
    }

    /// スキルアイコン
    pub fn skill() -> &'static str {
        if Self::supports_unicode() { "󰒓 " } else { "[S]" }
    }

    /// エラーアイコン
    pub fn error() -> &'static str {
        if Self::supports_unicode() { "󰅚 " } else { "[E]" }
    }

    /// Unicode対応チェック（環境変数でオーバーライド可能）
    fn supports_unicode() -> bool {
        if std::env::var("SKILL_ACTIVATOR_NO_UNICODE").is_ok() {
            return false;
        }
        std::env::var("TERM").map_or(false, |term| {
            !term.contains("dumb") && !term.contains("linux")
        })
    }
}

/// タイトル付きブロックを標準エラーに表示
pub fn print_formatted_block(title: &str, content: &str) {
    let mut stderr = io::stderr();

    let (color, icon) = match title.to_uppercase().as_str() {
        "BLOCK" => (Color::Red, Icons::block()),
        "WARN" => (Color::Yellow, Icons::warn()),
        "SKILL" => (Color::Magenta, Icons::skill()),
        _ => (Color::White, ""),
    };

    let _ = execute!(
        stderr,
        SetForegroundColor(color),
        SetAttribute(Attribute::Bold),
        Print(format!("{}{}", icon, title)),
        SetAttribute(Attribute::Reset),
        ResetColor,
        Print(":\n"),
        Print(format!("{}\n", content))
    );
    let _ = stderr.flush();
}

/// エラーメッセージを赤色で出力
pub fn print_error(msg: &str) {
    let mut stderr = io::stderr();
    let _ = execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print(format!("{}Error: {}\n", Icons::error(), msg)),
        ResetColor
    );
    let _ = stderr.flush();
}

/// 成功メッセージを緑色で出力
pub fn print_success(msg: &str) {
    let mut stderr = io::stderr();
    let _ = execute!(
        stderr,
        SetForegroundColor(Color::Green),
        Print(format!("{}\n", msg)),
        ResetColor
    );
    let _ = stderr.flush();
}

/// ルールの1行要約（`check` 用）
pub fn describe_rule(rule: &Rule) -> String {
    format!(
        "{:<28} {:<9} {:<7} {:<8} keywords={} intents={} paths={} contents={}",
        rule.name,
        rule.kind.as_str(),
        rule.enforcement.as_str(),
        rule.priority.as_str(),
        rule.keyword_count(),
        rule.intent_pattern_count(),
        rule.path_pattern_count(),
        rule.content_pattern_count(),
    )
}
