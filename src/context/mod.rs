//! コンテキスト収集
//!
//! プロンプト送信時点のプロンプト本文と、参照中のファイル（パスと内容）を集める。

pub mod gatherer;

pub use gatherer::ContextGatherer;

use serde::Serialize;

use crate::rules::pattern::normalize_path;

/// 参照中のファイル
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VisibleFile {
    /// `/` 区切りに正規化されたパス
    pub path: String,
    pub content: String,
}

impl VisibleFile {
    pub fn new(path: impl AsRef<str>, content: impl Into<String>) -> Self {
        Self {
            path: normalize_path(path.as_ref()),
            content: content.into(),
        }
    }
}

/// 1回のプロンプト送信に対応するコンテキスト
#[derive(Debug, Clone, Default)]
pub struct Context {
    /// ユーザー入力
    pub prompt_text: String,
    /// パスの重複なし、追加順
    visible_files: Vec<VisibleFile>,
}

impl Context {
    /// プロンプトのみのコンテキストを作成
    pub fn new(prompt_text: impl Into<String>) -> Self {
        Self {
            prompt_text: prompt_text.into(),
            visible_files: Vec::new(),
        }
    }

    /// ファイル付きで作成（同一パスは最初のものを採用）
    pub fn with_files(
        prompt_text: impl Into<String>,
        files: impl IntoIterator<Item = VisibleFile>,
    ) -> Self {
        let mut context = Self::new(prompt_text);
        for file in files {
            context.add_file(file);
        }
        context
    }

    /// ファイルを追加。既に同じパスがあれば追加せず `false` を返す
    pub fn add_file(&mut self, file: VisibleFile) -> bool {
        if self.visible_files.iter().any(|f| f.path == file.path) {
            tracing::debug!("Ignoring duplicate visible file: {}", file.path);
            return false;
        }
        self.visible_files.push(file);
        true
    }

    pub fn visible_files(&self) -> &[VisibleFile] {
        &self.visible_files
    }
}

/// 末尾の改行を1つだけ取り除く
pub fn strip_trailing_newline(text: &str) -> &str {
    text.strip_suffix("\r\n")
        .or_else(|| text.strip_suffix('\n'))
        .unwrap_or(text)
}
