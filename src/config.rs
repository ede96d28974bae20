//! 設定ファイル管理モジュール
//!
//! TOMLから設定を読み込み、ルールファイル・スキルディレクトリの場所や
//! コンテキスト収集・マッチングの上限値を型安全に提供します。

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::RuleError;
use crate::rules::{PatternOptions, RuleStore};

/// プロジェクト内の設定ファイルの既定位置
pub const PROJECT_CONFIG_FILE: &str = ".claude/skill-activator.toml";

/// アプリケーション全体の設定
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// ルールファイル設定
    #[serde(default)]
    pub rules: RulesConfig,
    /// スキル本文の設定
    #[serde(default)]
    pub skills: SkillsConfig,
    /// コンテキスト収集設定
    #[serde(default)]
    pub context: ContextConfig,
    /// マッチング設定
    #[serde(default)]
    pub matcher: MatcherConfig,
}

/// ルールファイル設定
#[derive(Debug, Clone, Deserialize)]
pub struct RulesConfig {
    /// プロジェクトのルールファイル（プロジェクトルートからの相対パス可）
    #[serde(default = "default_rules_path")]
    pub path: PathBuf,
    /// ユーザー共通のルールファイル（オプション、`~/` 展開あり）
    pub user_path: Option<PathBuf>,
}

/// スキル設定
#[derive(Debug, Clone, Deserialize)]
pub struct SkillsConfig {
    /// スキル本文のディレクトリ（`<dir>/<name>/SKILL.md` または `<dir>/<name>.md`）
    #[serde(default = "default_skills_dir")]
    pub dir: PathBuf,
}

/// コンテキスト収集設定
#[derive(Debug, Clone, Deserialize)]
pub struct ContextConfig {
    /// 対象とするファイル数の上限
    #[serde(default = "default_max_files")]
    pub max_files: usize,
    /// 1ファイルあたりのサイズ上限（バイト）
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    /// プロンプト中で言及されたファイルを読み込むか
    #[serde(default = "default_scan_prompt_paths")]
    pub scan_prompt_paths: bool,
}

/// マッチング設定
#[derive(Debug, Clone, Deserialize)]
pub struct MatcherConfig {
    /// 正規表現のコンパイル後サイズ上限（バイト）
    #[serde(default = "default_regex_size_limit")]
    pub regex_size_limit: usize,
    /// コンテンツパターンで検索する先頭バイト数
    #[serde(default = "default_max_content_bytes")]
    pub max_content_bytes: usize,
}

// デフォルト値を返す関数群
fn default_rules_path() -> PathBuf {
    PathBuf::from(".claude/skills/skill-rules.json")
}

fn default_skills_dir() -> PathBuf {
    PathBuf::from(".claude/skills")
}

fn default_max_files() -> usize {
    64
}

fn default_max_file_bytes() -> u64 {
    1024 * 1024 // 1MiB
}

fn default_scan_prompt_paths() -> bool {
    true
}

fn default_regex_size_limit() -> usize {
    crate::rules::pattern::DEFAULT_REGEX_SIZE_LIMIT
}

fn default_max_content_bytes() -> usize {
    crate::matcher::trigger::DEFAULT_MAX_CONTENT_BYTES
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            path: default_rules_path(),
            user_path: None,
        }
    }
}

impl Default for SkillsConfig {
    fn default() -> Self {
        Self {
            dir: default_skills_dir(),
        }
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_files: default_max_files(),
            max_file_bytes: default_max_file_bytes(),
            scan_prompt_paths: default_scan_prompt_paths(),
        }
    }
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            regex_size_limit: default_regex_size_limit(),
            max_content_bytes: default_max_content_bytes(),
        }
    }
}

const DEFAULT_CONFIG_CONTENT: &str = r#"# skill-activator default configuration

[rules]
path = ".claude/skills/skill-rules.json"
# user_path = "~/.claude/skills/skill-rules.json"

[skills]
dir = ".claude/skills"

[context]
max_files = 64
max_file_bytes = 1048576   # bytes
scan_prompt_paths = true

[matcher]
regex_size_limit = 1048576 # bytes
max_content_bytes = 1048576 # bytes
"#;

impl Config {
    /// TOMLファイルから設定を読み込む
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// TOML文字列から設定をパース
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML config")
    }

    /// 設定ファイルパスを探索
    ///
    /// 優先順位: 環境変数 > プロジェクト内 > ホームディレクトリ
    pub fn find_config_path(project_root: &Path) -> Option<PathBuf> {
        if let Ok(config_path) = std::env::var("SKILL_ACTIVATOR_CONFIG") {
            return Some(PathBuf::from(config_path));
        }

        let project_config = project_root.join(PROJECT_CONFIG_FILE);
        if project_config.exists() {
            return Some(project_config);
        }

        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".skill-activator").join("config.toml");
            if home_config.exists() {
                return Some(home_config);
            }
        }

        None
    }

    /// 探索した設定ファイルから読み込み（見つからなければデフォルト）
    pub fn load_default(project_root: &Path) -> Result<Self> {
        match Self::find_config_path(project_root) {
            Some(path) => {
                tracing::info!("Using config file: {}", path.display());
                Self::load_from_file(&path)
            }
            None => {
                tracing::debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// デフォルト設定ファイルを書き出す
    pub fn write_default(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create config directory: {}", parent.display())
                })?;
            }
        }

        std::fs::write(path, DEFAULT_CONFIG_CONTENT)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// プロジェクトのルールファイルの絶対パス
    pub fn rules_path(&self, project_root: &Path) -> PathBuf {
        resolve_path(&self.rules.path, project_root)
    }

    /// ユーザー共通ルールファイルの絶対パス
    pub fn user_rules_path(&self, project_root: &Path) -> Option<PathBuf> {
        self.rules
            .user_path
            .as_ref()
            .map(|p| resolve_path(p, project_root))
    }

    /// スキルディレクトリの絶対パス
    pub fn skills_dir(&self, project_root: &Path) -> PathBuf {
        resolve_path(&self.skills.dir, project_root)
    }

    pub fn pattern_options(&self) -> PatternOptions {
        PatternOptions {
            regex_size_limit: self.matcher.regex_size_limit,
        }
    }

    /// ユーザー共通ルールとプロジェクトルールを読み込んで連結
    ///
    /// ユーザー共通ルールが先、プロジェクトルールが後。両方にある名前は重複エラー。
    /// 既定位置のプロジェクトルールがなければ空として扱うが、`explicit_rules`
    /// で明示されたファイルがない場合はエラー。
    pub fn load_rules(
        &self,
        project_root: &Path,
        explicit_rules: Option<&Path>,
    ) -> std::result::Result<RuleStore, RuleError> {
        let options = self.pattern_options();
        let mut store = RuleStore::default();

        if let Some(user_path) = self.user_rules_path(project_root) {
            if user_path.exists() {
                store = RuleStore::load_from_file(&user_path, &options)?;
            } else {
                tracing::debug!("User rule file not found: {}", user_path.display());
            }
        }

        let project_rules = match explicit_rules {
            Some(path) => Some(RuleStore::load_from_file(path, &options)?),
            None => {
                let path = self.rules_path(project_root);
                match RuleStore::load_from_file(&path, &options) {
                    Ok(rules) => Some(rules),
                    Err(RuleError::Io { source, .. })
                        if source.kind() == std::io::ErrorKind::NotFound =>
                    {
                        tracing::warn!("No rule file at {}, no skills will activate", path.display());
                        None
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        match project_rules {
            Some(rules) => store.merge(rules),
            None => Ok(store),
        }
    }
}

/// `~/` をホームディレクトリに展開し、相対パスはプロジェクトルート基準にする
fn resolve_path(path: &Path, project_root: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_root.join(path)
    }
}
