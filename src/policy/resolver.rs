use serde::Serialize;
use std::cmp::Reverse;
use std::fmt;

use crate::matcher::MatchResult;
use crate::rules::{Enforcement, Rule};

/// 全体としてのアクション（None < Suggest < Warn < Block）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// マッチなし。プロンプトはそのまま通す
    None,
    Suggest,
    /// 続行するが警告を付ける
    Warn,
    /// 停止してブロックメッセージのみを返す
    Block,
}

impl From<Enforcement> for Action {
    fn from(enforcement: Enforcement) -> Self {
        match enforcement {
            Enforcement::Suggest => Action::Suggest,
            Enforcement::Warn => Action::Warn,
            Enforcement::Block => Action::Block,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::None => "none",
            Action::Suggest => "suggest",
            Action::Warn => "warn",
            Action::Block => "block",
        };
        write!(f, "{}", s)
    }
}

/// ポリシー解決結果
#[derive(Debug, Clone)]
pub struct Resolution<'a> {
    pub action: Action,
    /// 優先度の降順（同順位は宣言順）
    pub ordered_skills: Vec<String>,
    /// `enforcement=block` のマッチ（ブロックメッセージ用）
    pub blocking_rules: Vec<&'a Rule>,
    /// `enforcement=warn` のマッチ（警告メッセージ用）
    pub warning_rules: Vec<&'a Rule>,
}

/// マッチ結果から全体アクションとスキルの順序を決定する
///
/// `matches` はルールストアの宣言順で渡すこと。ソートは安定なので
/// 同じ優先度のスキルは宣言順のまま並ぶ。
pub fn resolve<'a>(matches: &[MatchResult<'a>]) -> Resolution<'a> {
    let mut ordered: Vec<&'a Rule> = matches.iter().map(|m| m.rule).collect();
    ordered.sort_by_key(|rule| Reverse(rule.priority.weight()));

    let action = ordered
        .iter()
        .map(|rule| Action::from(rule.enforcement))
        .max()
        .unwrap_or(Action::None);

    let blocking_rules: Vec<&'a Rule> = ordered
        .iter()
        .copied()
        .filter(|rule| rule.enforcement == Enforcement::Block)
        .collect();
    let warning_rules: Vec<&'a Rule> = ordered
        .iter()
        .copied()
        .filter(|rule| rule.enforcement == Enforcement::Warn)
        .collect();

    if action == Action::Block {
        tracing::info!(
            "Prompt blocked by {}",
            blocking_rules
                .iter()
                .map(|r| r.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    Resolution {
        action,
        ordered_skills: ordered.iter().map(|rule| rule.name.clone()).collect(),
        blocking_rules,
        warning_rules,
    }
}
