//! # Local media store
//!
//! Content-addressed files on the local filesystem. A file's name is the
//! SHA-256 of its bytes, sharded into two directory levels, so identical
//! uploads collapse onto one file.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use mime::Mime;
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, info};

use domains::{DomainError, MediaStore, Result};

pub struct LocalMediaStore {
    /// Root directory for all uploads (e.g., "./data/media")
    root_path: PathBuf,
    /// Public URL prefix the HTTP layer serves `root_path` under (e.g., "/media")
    url_prefix: String,
}

impl LocalMediaStore {
    pub fn new(root: impl Into<PathBuf>, url_prefix: &str) -> Self {
        Self {
            root_path: root.into(),
            url_prefix: url_prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root_path
    }

    /// Generates a sharded relative path: "ab/cd/abcd...ef.png"
    fn sharded_name(hash: &str, ext: &str) -> String {
        format!("{}/{}/{hash}.{ext}", &hash[0..2], &hash[2..4])
    }

    /// Maps a public URL back to the file it names. `None` for URLs this
    /// store did not issue or that try to escape the root.
    pub fn local_path(&self, url: &str) -> Option<PathBuf> {
        let relative = url.strip_prefix(&self.url_prefix)?.strip_prefix('/')?;
        let relative = Path::new(relative);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return None;
        }
        Some(self.root_path.join(relative))
    }
}

fn extension_for(content_type: &Mime) -> &'static str {
    match content_type.essence_str() {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        _ => "bin",
    }
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    /// Content-addressed: identical bytes always map to the same URL.
    async fn upload(&self, data: Bytes, content_type: &Mime) -> Result<String> {
        let hash = hex::encode(Sha256::digest(&data));
        let name = Self::sharded_name(&hash, extension_for(content_type));
        let target = self.root_path.join(&name);

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| DomainError::data("failed to create media directory", e))?;
        }

        if fs::try_exists(&target).await.unwrap_or(false) {
            debug!(%name, "media already stored");
        } else {
            fs::write(&target, &data)
                .await
                .map_err(|e| DomainError::data("failed to write media file", e))?;
            info!(%name, bytes = data.len(), "media written");
        }

        Ok(format!("{}/{name}", self.url_prefix))
    }

    /// Removes a stored file. External URLs are left alone and a file that
    /// is already gone counts as deleted.
    async fn delete(&self, url: &str) -> Result<()> {
        let Some(path) = self.local_path(url) else {
            debug!(url, "not a locally stored file; nothing to delete");
            return Ok(());
        };
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!(url, "media deleted");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DomainError::data("failed to delete media file", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &tempfile::TempDir) -> LocalMediaStore {
        LocalMediaStore::new(dir.path(), "/media/")
    }

    #[tokio::test]
    async fn identical_uploads_share_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        let a = store.upload(Bytes::from_static(b"same bytes"), &mime::IMAGE_PNG).await.unwrap();
        let b = store.upload(Bytes::from_static(b"same bytes"), &mime::IMAGE_PNG).await.unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with("/media/"));
        assert!(a.ends_with(".png"));

        let path = store.local_path(&a).unwrap();
        assert_eq!(fs::read(&path).await.unwrap(), b"same bytes");
        assert!(path.starts_with(dir.path()));
    }

    #[tokio::test]
    async fn delete_removes_file_and_tolerates_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let url = store.upload(Bytes::from_static(b"gif"), &mime::IMAGE_GIF).await.unwrap();

        store.delete(&url).await.unwrap();
        assert!(!store.local_path(&url).unwrap().exists());
        store.delete(&url).await.unwrap();
    }

    #[tokio::test]
    async fn foreign_and_escaping_urls_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        assert!(store.local_path("https://cdn.example.com/a.png").is_none());
        assert!(store.local_path("/media/../etc/passwd").is_none());
        store.delete("https://cdn.example.com/a.png").await.unwrap();
    }
}
