//! Filesystem storage for post images.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use slug::slugify;
use thiserror::Error;
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

use crate::application::posts::{ImageStore, ImageStoreError};

const POST_IMAGE_DIR: &str = "posts";

#[derive(Debug, Error)]
pub enum UploadStorageError {
    #[error("invalid stored path")]
    InvalidPath,
    #[error("uploaded file is empty")]
    EmptyPayload,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Media root on the local filesystem. Stored paths are relative to it and
/// are what templates put behind `/media/`.
#[derive(Debug)]
pub struct UploadStorage {
    root: PathBuf,
}

impl UploadStorage {
    /// Initialise storage rooted at the provided directory, creating it if necessary.
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Write `data` under `posts/` and return the stored relative path.
    pub async fn store(&self, original_name: &str, data: Bytes) -> Result<String, UploadStorageError> {
        if data.is_empty() {
            return Err(UploadStorageError::EmptyPayload);
        }

        let stored_path = build_stored_path(original_name);
        let absolute = self.resolve(&stored_path)?;
        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&absolute, &data).await?;

        debug!(stored_path = %stored_path, size_bytes = data.len(), "Stored upload");
        Ok(stored_path)
    }

    fn resolve(&self, stored_path: &str) -> Result<PathBuf, UploadStorageError> {
        let relative = Path::new(stored_path);
        if relative.is_absolute()
            || relative
                .components()
                .any(|component| matches!(component, Component::ParentDir | Component::Prefix(_)))
        {
            return Err(UploadStorageError::InvalidPath);
        }

        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ImageStore for UploadStorage {
    async fn store_image(&self, file_name: &str, data: Bytes) -> Result<String, ImageStoreError> {
        self.store(file_name, data).await.map_err(|err| match err {
            UploadStorageError::EmptyPayload => ImageStoreError::Empty,
            other => ImageStoreError::Storage(other.to_string()),
        })
    }
}

fn build_stored_path(original_name: &str) -> String {
    format!(
        "{POST_IMAGE_DIR}/{}-{}",
        Uuid::new_v4(),
        sanitize_filename(original_name)
    )
}

fn sanitize_filename(original: &str) -> String {
    // Browsers may send a full client path; only the last segment matters.
    let last_segment = original.rsplit(|c| c == '/' || c == '\\').next().unwrap_or(original);
    let path = Path::new(last_segment);
    let stem = path
        .file_stem()
        .and_then(|value| value.to_str())
        .unwrap_or("image");
    let mut base = slugify(stem);
    if base.is_empty() {
        base = "image".to_string();
    }

    let extension = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.trim_matches('.').to_ascii_lowercase())
        .filter(|value| !value.is_empty() && value.chars().all(|c| c.is_ascii_alphanumeric()));

    match extension {
        Some(ext) => format!("{base}.{ext}"),
        None => base,
    }
}
