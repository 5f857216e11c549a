//! The Artifact Store used by the worker pool and the HTTP layer.
//!
//! Save path: size cap -> magic-byte detection -> byte-for-byte primary
//! write -> best-effort thumbnail -> best-effort remote mirror. Only the
//! first three steps can fail a save.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use imagegen_core::image_format::{ImageFormat, KNOWN_EXTENSIONS, MAX_IMAGE_BYTES};

use crate::error::StorageError;
use crate::local::{sanitize_file_name, LocalTarget};
use crate::remote::RemoteTarget;
use crate::thumbnail::{self, THUMBNAIL_PREFIX};

/// Where a saved asset and its thumbnail ended up.
///
/// Path and URL fields are empty / `None` for targets that did not accept
/// the file. `width` and `height` are zero when decoding failed.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedArtifact {
    /// Final file name, `{stem}.{detected extension}`.
    pub file_name: String,
    pub format: ImageFormat,
    pub local_path: String,
    pub remote_url: Option<String>,
    pub thumbnail_path: String,
    pub thumbnail_remote_url: Option<String>,
    pub width: u32,
    pub height: u32,
    pub file_size: u64,
}

/// Primary local target plus an optional remote mirror.
#[derive(Clone)]
pub struct ArtifactStore {
    local: LocalTarget,
    remote: Option<Arc<dyn RemoteTarget>>,
}

impl ArtifactStore {
    pub fn new(local: LocalTarget, remote: Option<Arc<dyn RemoteTarget>>) -> Self {
        Self { local, remote }
    }

    /// Store with only a local target rooted at `root`.
    pub fn local_only(root: impl Into<PathBuf>) -> Self {
        Self::new(LocalTarget::new(root), None)
    }

    pub fn root(&self) -> &Path {
        self.local.root()
    }

    /// Local path of a stored file, after sanitizing `name`.
    pub fn local_path(&self, name: &str) -> Result<PathBuf, StorageError> {
        self.local.path_for(name)
    }

    /// Save `bytes` as a primary asset named after `name` plus a thumbnail.
    ///
    /// The extension of `name` is ignored; the stored extension comes from
    /// the detected format. Nothing is written when the size or format
    /// checks fail.
    pub async fn save_with_thumbnail(
        &self,
        name: &str,
        bytes: Vec<u8>,
    ) -> Result<SavedArtifact, StorageError> {
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(StorageError::TooLarge {
                limit: MAX_IMAGE_BYTES,
            });
        }
        let format = ImageFormat::detect(&bytes)?;
        let stem = file_stem(&sanitize_file_name(name)?).to_string();
        let file_name = format!("{stem}.{}", format.extension());
        let file_size = bytes.len() as u64;

        let local_path = match self.local.write(&file_name, &bytes).await {
            Ok(path) => path.to_string_lossy().into_owned(),
            Err(e) if self.remote.is_some() => {
                tracing::warn!(file = %file_name, error = %e, "Local write failed, relying on remote copy");
                String::new()
            }
            Err(e) => return Err(e),
        };

        let remote_url = self.mirror(&file_name, bytes.clone(), format).await;
        if local_path.is_empty() && remote_url.is_none() {
            return Err(StorageError::Remote(format!(
                "no storage target accepted {file_name}"
            )));
        }

        let rendered = tokio::task::spawn_blocking(move || thumbnail::render(&bytes, format))
            .await
            .map_err(|e| StorageError::InvalidImage(format!("thumbnail task failed: {e}")))
            .and_then(|result| result);

        let mut saved = SavedArtifact {
            file_name,
            format,
            local_path,
            remote_url,
            thumbnail_path: String::new(),
            thumbnail_remote_url: None,
            width: 0,
            height: 0,
            file_size,
        };

        let rendered = match rendered {
            Ok(rendered) => rendered,
            Err(e) => {
                tracing::warn!(file = %saved.file_name, error = %e, "Image could not be decoded");
                return Ok(saved);
            }
        };
        saved.width = rendered.width;
        saved.height = rendered.height;

        let thumb = match rendered.thumbnail {
            Ok(thumb) => thumb,
            Err(e) => {
                tracing::warn!(file = %saved.file_name, error = %e, "Thumbnail generation failed");
                return Ok(saved);
            }
        };

        let thumb_name = thumbnail::thumbnail_name(&stem, format);
        match self.local.write(&thumb_name, &thumb.bytes).await {
            Ok(path) => saved.thumbnail_path = path.to_string_lossy().into_owned(),
            Err(e) => {
                tracing::warn!(file = %thumb_name, error = %e, "Failed to write thumbnail");
            }
        }
        saved.thumbnail_remote_url = self
            .mirror(&thumb_name, thumb.bytes, thumb.format)
            .await;

        Ok(saved)
    }

    /// Upload to the remote target, if any. Failures are logged only.
    async fn mirror(&self, key: &str, bytes: Vec<u8>, format: ImageFormat) -> Option<String> {
        let remote = self.remote.as_ref()?;
        match remote.put(key, bytes, format.mime_type()).await {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!(file = %key, error = %e, "Remote mirror upload failed");
                None
            }
        }
    }

    /// Remove the asset `name` and its thumbnails from every target.
    ///
    /// Thumbnails are tried under every known extension. All attempts are
    /// made; failures are collected into [`StorageError::Delete`].
    pub async fn delete(&self, name: &str) -> Result<(), StorageError> {
        let file_name = sanitize_file_name(name)?;
        let stem = file_stem(&file_name).to_string();

        let mut errors = Vec::new();

        if let Err(e) = self.local.delete(&file_name).await {
            errors.push(format!("local {file_name}: {e}"));
        }
        if let Some(remote) = &self.remote {
            if let Err(e) = remote.delete(&file_name).await {
                errors.push(e.to_string());
            }
        }

        for ext in KNOWN_EXTENSIONS {
            let thumb = format!("{THUMBNAIL_PREFIX}{stem}.{ext}");
            if let Err(e) = self.local.delete(&thumb).await {
                errors.push(format!("local {thumb}: {e}"));
            }
            if let Some(remote) = &self.remote {
                if let Err(e) = remote.delete(&thumb).await {
                    errors.push(e.to_string());
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            tracing::warn!(file = %file_name, failures = errors.len(), "Partial delete failure");
            Err(StorageError::Delete(errors))
        }
    }
}

/// `name` without its final extension.
fn file_stem(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}
