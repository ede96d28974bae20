//! パターンのコンパイルとパス正規化

use glob::{MatchOptions, Pattern, PatternError};
use regex::{Regex, RegexBuilder};

/// デフォルトの正規表現サイズ上限（コンパイル後）
pub const DEFAULT_REGEX_SIZE_LIMIT: usize = 1024 * 1024;

/// パターンコンパイル設定
#[derive(Debug, Clone, Copy)]
pub struct PatternOptions {
    /// コンパイル後の正規表現プログラムのサイズ上限（バイト）
    pub regex_size_limit: usize,
}

impl Default for PatternOptions {
    fn default() -> Self {
        Self {
            regex_size_limit: DEFAULT_REGEX_SIZE_LIMIT,
        }
    }
}

/// インテントパターン: 大文字小文字無視、複数行モード
pub fn compile_intent(source: &str, options: &PatternOptions) -> Result<Regex, regex::Error> {
    RegexBuilder::new(source)
        .case_insensitive(true)
        .multi_line(true)
        .size_limit(options.regex_size_limit)
        .build()
}

/// コンテンツパターン: コードを対象とするため大文字小文字を区別
pub fn compile_content(source: &str, options: &PatternOptions) -> Result<Regex, regex::Error> {
    RegexBuilder::new(source)
        .multi_line(true)
        .size_limit(options.regex_size_limit)
        .build()
}

pub fn compile_glob(source: &str) -> Result<Pattern, PatternError> {
    Pattern::new(&normalize_path(source))
}

/// `*` と `?` はパス区切りをまたがない。`**` のみがディレクトリをまたぐ
pub fn glob_options() -> MatchOptions {
    MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    }
}

/// パスを `/` 区切りに揃え、先頭の `./` を除去
pub fn normalize_path(path: &str) -> String {
    let mut normalized = path.replace('\\', "/");
    while let Some(stripped) = normalized.strip_prefix("./") {
        normalized = stripped.to_string();
    }
    normalized
}

/// UTF-8境界を保ったまま先頭 `max` バイトに切り詰める
pub fn truncate_at_char_boundary(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
