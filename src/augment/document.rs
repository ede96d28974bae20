use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::ContentLookupError;

/// スキルのメタデータ（YAML frontmatter）
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SkillMetadata {
    /// スキル名
    #[serde(default)]
    pub name: Option<String>,
    /// 説明
    #[serde(default)]
    pub description: String,
}

/// スキル本文ファイル
#[derive(Debug, Clone)]
pub struct SkillDocument {
    pub metadata: SkillMetadata,
    /// frontmatterを除いた本文（Markdown）
    pub body: String,
    pub path: PathBuf,
}

impl SkillDocument {
    /// ファイル内容をパース
    pub fn parse(content: &str, path: &Path) -> Result<Self, ContentLookupError> {
        let (metadata, body) = Self::extract_frontmatter(content, path)?;
        Ok(Self {
            metadata,
            body,
            path: path.to_path_buf(),
        })
    }

    /// frontmatter（---で囲まれた部分）を抽出
    fn extract_frontmatter(
        content: &str,
        path: &Path,
    ) -> Result<(SkillMetadata, String), ContentLookupError> {
        let content = content.trim();

        if !content.starts_with("---") {
            // frontmatterがない場合は全体が本文
            return Ok((SkillMetadata::default(), content.to_string()));
        }

        // 2つ目の---を探す
        let rest = &content[3..];
        if let Some(end_pos) = rest.find("\n---") {
            let yaml_content = rest[..end_pos].trim();
            let body = rest[end_pos + 4..].trim();

            let metadata = if yaml_content.is_empty() {
                SkillMetadata::default()
            } else {
                serde_yaml::from_str(yaml_content).map_err(|e| {
                    ContentLookupError::InvalidFrontmatter {
                        path: path.to_path_buf(),
                        message: e.to_string(),
                    }
                })?
            };
            Ok((metadata, body.to_string()))
        } else {
            Err(ContentLookupError::InvalidFrontmatter {
                path: path.to_path_buf(),
                message: "missing closing ---".to_string(),
            })
        }
    }
}
