use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::infrastructure::error::{Result, ReviewError};

/// 工件来源：按路径读取待审查的文本
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    async fn read(&self, path: &str) -> Result<String>;
}

/// 从本地文件系统读取工件
///
/// 相对路径基于 `base_dir` 解析；未设置时基于进程的当前目录。
#[derive(Debug, Clone, Default)]
pub struct FsArtifactSource {
    base_dir: Option<PathBuf>,
}

impl FsArtifactSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
        }
    }

    pub fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

#[async_trait]
impl ArtifactSource for FsArtifactSource {
    async fn read(&self, path: &str) -> Result<String> {
        if path.trim().is_empty() {
            return Err(ReviewError::validation("Artifact path is empty", Some("artifact_path".to_string())));
        }

        let resolved = self.resolve(path);
        let content = tokio::fs::read_to_string(&resolved).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => ReviewError::artifact_not_found(resolved.display().to_string()),
            ErrorKind::InvalidData => {
                ReviewError::artifact_unreadable(resolved.display().to_string(), "not valid UTF-8 text")
            }
            _ => ReviewError::artifact_unreadable(resolved.display().to_string(), e.to_string()),
        })?;

        if content.trim().is_empty() {
            return Err(ReviewError::artifact_unreadable(
                resolved.display().to_string(),
                "Artifact is empty",
            ));
        }

        tracing::debug!(path = %resolved.display(), bytes = content.len(), "Read artifact");
        Ok(content)
    }
}
