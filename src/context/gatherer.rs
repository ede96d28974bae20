use futures::future::join_all;
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;

use super::{strip_trailing_newline, Context, VisibleFile};
use crate::config::ContextConfig;
use crate::rules::pattern::normalize_path;

/// 拡張子付きのパスらしきトークン
const PATH_TOKEN: &str = r"[\w./-]*\w\.[A-Za-z0-9]+";

/// コンテキスト収集器
///
/// ファイルは読み取りのみ。読めないファイルは警告を出してスキップし、
/// 収集自体は失敗しない。
pub struct ContextGatherer {
    /// 相対パスの基準ディレクトリ
    project_root: PathBuf,
    max_files: usize,
    max_file_bytes: u64,
    /// プロンプト中で言及されたファイルも対象にするか
    scan_prompt_paths: bool,
}

impl ContextGatherer {
    /// デフォルト設定で作成
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self::from_config(project_root, &ContextConfig::default())
    }

    pub fn from_config(project_root: impl Into<PathBuf>, config: &ContextConfig) -> Self {
        Self {
            project_root: project_root.into(),
            max_files: config.max_files,
            max_file_bytes: config.max_file_bytes,
            scan_prompt_paths: config.scan_prompt_paths,
        }
    }

    pub fn with_prompt_scan(mut self, enabled: bool) -> Self {
        self.scan_prompt_paths = enabled;
        self
    }

    /// プロンプトと参照ファイルからコンテキストを構築
    ///
    /// `explicit_files` はエディタやセッションから渡されたパス。
    /// ファイルの読み込みは並行に行い、渡された順で集約する。
    pub async fn gather(&self, prompt: &str, explicit_files: &[PathBuf]) -> Context {
        let prompt_text = strip_trailing_newline(prompt);

        let mut candidates: Vec<PathBuf> = explicit_files.iter().map(|p| self.resolve(p)).collect();
        if self.scan_prompt_paths {
            candidates.extend(self.referenced_paths(prompt_text).await);
        }

        let mut seen = HashSet::new();
        let mut targets: Vec<(String, PathBuf)> = Vec::new();
        for path in candidates {
            let display = self.display_path(&path);
            if !seen.insert(display.clone()) {
                continue;
            }
            if targets.len() >= self.max_files {
                tracing::warn!(
                    "Visible file limit ({}) reached, ignoring remaining files",
                    self.max_files
                );
                break;
            }
            targets.push((display, path));
        }

        let reads = targets
            .iter()
            .map(|(_, path)| read_visible_file(path, self.max_file_bytes));
        let contents = join_all(reads).await;

        let files = targets
            .into_iter()
            .zip(contents)
            .filter_map(|((display, _), content)| content.map(|c| VisibleFile::new(display, c)));

        let context = Context::with_files(prompt_text, files);
        tracing::debug!("Gathered context with {} visible files", context.visible_files().len());
        context
    }

    /// プロンプト中で言及され、プロジェクト内に実在するファイル
    pub async fn referenced_paths(&self, prompt: &str) -> Vec<PathBuf> {
        let re = match Regex::new(PATH_TOKEN) {
            Ok(r) => r,
            Err(_) => return Vec::new(),
        };

        let mut found: Vec<PathBuf> = Vec::new();
        for m in re.find_iter(prompt) {
            let token = m.as_str();
            if token.contains("..") {
                continue;
            }
            let candidate = self.resolve(Path::new(token));
            if !candidate.starts_with(&self.project_root) || found.contains(&candidate) {
                continue;
            }
            if let Ok(meta) = fs::metadata(&candidate).await {
                if meta.is_file() {
                    tracing::debug!("Prompt references file: {}", candidate.display());
                    found.push(candidate);
                }
            }
        }
        found
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }

    /// プロジェクトルートからの相対パス（ルート外ならそのまま）
    fn display_path(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.project_root).unwrap_or(path);
        normalize_path(&relative.to_string_lossy())
    }
}

async fn read_visible_file(path: &Path, max_bytes: u64) -> Option<String> {
    let meta = match fs::metadata(path).await {
        Ok(meta) => meta,
        Err(e) => {
            tracing::warn!("Skipping visible file {}: {}", path.display(), e);
            return None;
        }
    };

    if !meta.is_file() {
        tracing::warn!("Skipping visible file {}: not a regular file", path.display());
        return None;
    }
    if meta.len() > max_bytes {
        tracing::warn!(
            "Skipping visible file {}: {} bytes exceeds limit of {}",
            path.display(),
            meta.len(),
            max_bytes
        );
        return None;
    }

    match fs::read_to_string(path).await {
        Ok(content) => Some(content),
        Err(e) => {
            tracing::warn!("Skipping visible file {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs as std_fs;

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std_fs::create_dir_all(dir.path().join("src/api")).unwrap();
        std_fs::write(dir.path().join("src/api/routes.py"), "from fastapi import APIRouter\n").unwrap();
        std_fs::write(dir.path().join("src/main.rs"), "fn main() {}\n").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_gather_explicit_files() {
        let dir = project();
        let gatherer = ContextGatherer::new(dir.path()).with_prompt_scan(false);

        let context = gatherer
            .gather(
                "Add a route\n",
                &[PathBuf::from("src/api/routes.py"), dir.path().join("src/main.rs")],
            )
            .await;

        assert_eq!(context.prompt_text, "Add a route");
        let paths: Vec<_> = context.visible_files().iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["src/api/routes.py", "src/main.rs"]);
        assert!(context.visible_files()[0].content.contains("fastapi"));
    }

    #[tokio::test]
    async fn test_gather_without_files() {
        let dir = project();
        let gatherer = ContextGatherer::new(dir.path()).with_prompt_scan(false);

        let context = gatherer.gather("", &[]).await;
        assert_eq!(context.prompt_text, "");
        assert!(context.visible_files().is_empty());
    }

    #[tokio::test]
    async fn test_gather_skips_unreadable_files() {
        let dir = project();
        std_fs::write(dir.path().join("blob.bin"), [0xff, 0xfe, 0x00, 0x80]).unwrap();
        let gatherer = ContextGatherer::new(dir.path()).with_prompt_scan(false);

        let context = gatherer
            .gather(
                "prompt",
                &[
                    PathBuf::from("missing.rs"),
                    PathBuf::from("blob.bin"),
                    PathBuf::from("src"),
                    PathBuf::from("src/main.rs"),
                ],
            )
            .await;

        assert_eq!(context.visible_files().len(), 1);
        assert_eq!(context.visible_files()[0].path, "src/main.rs");
    }

    #[tokio::test]
    async fn test_gather_respects_limits() {
        let dir = project();
        std_fs::write(dir.path().join("big.txt"), "x".repeat(2048)).unwrap();
        let config = ContextConfig {
            max_files: 1,
            max_file_bytes: 1024,
            scan_prompt_paths: false,
        };
        let gatherer = ContextGatherer::from_config(dir.path(), &config);

        let context = gatherer
            .gather("p", &[PathBuf::from("big.txt"), PathBuf::from("src/main.rs")])
            .await;
        // big.txt が上限枠を使い、サイズ超過でスキップされる
        assert!(context.visible_files().is_empty());
    }

    #[tokio::test]
    async fn test_referenced_paths_in_prompt() {
        let dir = project();
        let gatherer = ContextGatherer::new(dir.path());

        let context = gatherer
            .gather("Refactor src/api/routes.py and see ../etc/passwd.txt or notes.md", &[])
            .await;

        let paths: Vec<_> = context.visible_files().iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["src/api/routes.py"]);
    }

    #[tokio::test]
    async fn test_explicit_and_referenced_are_deduplicated() {
        let dir = project();
        let gatherer = ContextGatherer::new(dir.path());

        let context = gatherer
            .gather("look at src/main.rs", &[PathBuf::from("./src/main.rs")])
            .await;
        assert_eq!(context.visible_files().len(), 1);
    }
}
