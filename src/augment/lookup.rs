use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::fs;

use super::document::SkillDocument;
use crate::error::ContentLookupError;

/// スキル本文の取得元（外部コラボレーター）
#[async_trait]
pub trait SkillContentLookup: Send + Sync {
    /// スキル名から注入する本文を取得
    async fn lookup(&self, name: &str) -> Result<String, ContentLookupError>;
}

/// ディレクトリ上のスキルファイル
///
/// `<dir>/<name>/SKILL.md` を優先し、なければ `<dir>/<name>.md` を読む。
pub struct SkillDirectory {
    root: PathBuf,
}

impl SkillDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// 探索候補のパス
    fn candidates(&self, name: &str) -> Vec<PathBuf> {
        vec![
            self.root.join(name).join("SKILL.md"),
            self.root.join(format!("{}.md", name)),
        ]
    }

    /// スキルファイルを読み込んでパース
    pub async fn read_document(&self, name: &str) -> Result<SkillDocument, ContentLookupError> {
        if !is_safe_name(name) {
            return Err(ContentLookupError::NotFound(name.to_string()));
        }

        for path in self.candidates(name) {
            let content = match fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(source) => {
                    return Err(ContentLookupError::Io {
                        name: name.to_string(),
                        path,
                        source,
                    })
                }
            };

            let document = SkillDocument::parse(&content, &path)?;
            tracing::debug!("Loaded skill content: {} from {}", name, path.display());
            return Ok(document);
        }

        Err(ContentLookupError::NotFound(name.to_string()))
    }

    /// frontmatterの説明文（なければ `None`）
    pub async fn description(&self, name: &str) -> Option<String> {
        let document = self.read_document(name).await.ok()?;
        let description = document.metadata.description.trim();
        (!description.is_empty()).then(|| description.to_string())
    }
}

/// ディレクトリ外を指す名前は受け付けない
fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && !name.contains("..")
        && !name.contains('/')
        && !name.contains('\\')
}

#[async_trait]
impl SkillContentLookup for SkillDirectory {
    async fn lookup(&self, name: &str) -> Result<String, ContentLookupError> {
        let document = self.read_document(name).await?;
        if let Some(declared) = document.metadata.name.as_deref() {
            if declared != name {
                tracing::warn!(
                    "Skill file {} declares name '{}' but was loaded for '{}'",
                    document.path.display(),
                    declared,
                    name
                );
            }
        }
        Ok(document.body)
    }
}

/// メモリ上のスキル本文
#[derive(Debug, Clone, Default)]
pub struct InMemorySkills {
    skills: HashMap<String, String>,
}

impl InMemorySkills {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_skill(mut self, name: impl Into<String>, content: impl Into<String>) -> Self {
        self.insert(name, content);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, content: impl Into<String>) {
        self.skills.insert(name.into(), content.into());
    }
}

#[async_trait]
impl SkillContentLookup for InMemorySkills {
    async fn lookup(&self, name: &str) -> Result<String, ContentLookupError> {
        self.skills
            .get(name)
            .cloned()
            .ok_or_else(|| ContentLookupError::NotFound(name.to_string()))
    }
}
