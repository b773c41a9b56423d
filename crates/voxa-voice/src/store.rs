//! Local directory of playable audio, exposed over HTTP under a URL prefix.

use crate::error::AdapterError;
use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

/// Maps files in `dir` to public URLs under `url_prefix`.
#[derive(Debug, Clone)]
pub struct AudioStore {
    dir: PathBuf,
    url_prefix: String,
}

impl AudioStore {
    pub fn new(dir: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Self {
        let prefix = url_prefix.into();
        Self {
            dir: dir.into(),
            url_prefix: prefix.trim_end_matches('/').to_string(),
        }
    }

    /// Public URL for a file name inside the store.
    pub fn url_for(&self, file_name: &str) -> String {
        format!("{}/{}", self.url_prefix, file_name)
    }

    /// Resolves a public URL back to a path inside the store.
    ///
    /// Returns `None` for foreign URLs and for names that would escape the
    /// store directory.
    pub fn path_for(&self, url: &str) -> Option<PathBuf> {
        let name = url
            .strip_prefix(&self.url_prefix)?
            .strip_prefix('/')?;
        let relative = Path::new(name);
        let mut components = relative.components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Some(self.dir.join(relative)),
            _ => None,
        }
    }

    /// Writes `bytes` under `file_name`, replacing any existing file.
    ///
    /// The bytes land in a hidden temporary file first and are renamed into
    /// place, so readers never see a partial file under `file_name`.
    pub async fn write(&self, file_name: &str, bytes: &[u8]) -> Result<String, AdapterError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let staging = self
            .dir
            .join(format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple()));
        tokio::fs::write(&staging, bytes).await?;
        if let Err(e) = tokio::fs::rename(&staging, self.dir.join(file_name)).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(e.into());
        }
        Ok(self.url_for(file_name))
    }

    /// Writes `bytes` under a fresh unique name with the given extension.
    pub async fn save(&self, bytes: &[u8], extension: &str) -> Result<String, AdapterError> {
        let file_name = format!("{}.{}", Uuid::new_v4(), extension);
        self.write(&file_name, bytes).await
    }

    /// Returns the first existing file whose stem is `stem`, if any.
    pub async fn find_by_stem(&self, stem: &str) -> Option<String> {
        let mut entries = tokio::fs::read_dir(&self.dir).await.ok()?;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.file_stem().and_then(|s| s.to_str()) == Some(stem) {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    return Some(self.url_for(name));
                }
            }
        }
        None
    }
}
