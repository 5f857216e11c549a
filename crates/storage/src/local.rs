//! Local filesystem target rooted at a single directory.

use std::path::{Path, PathBuf};

use crate::error::StorageError;

/// Reduce `name` to a bare file name that cannot escape the storage root.
///
/// Directory components (either separator) are stripped; empty names and
/// `.` / `..` are rejected.
pub fn sanitize_file_name(name: &str) -> Result<String, StorageError> {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if base.is_empty() || base == "." || base == ".." || base.contains('\0') {
        return Err(StorageError::InvalidName(name.to_string()));
    }
    Ok(base.to_string())
}

/// Files under one root directory. Every name is sanitized before use.
#[derive(Debug, Clone)]
pub struct LocalTarget {
    root: PathBuf,
}

impl LocalTarget {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute-or-relative path of `name` inside the root.
    pub fn path_for(&self, name: &str) -> Result<PathBuf, StorageError> {
        Ok(self.root.join(sanitize_file_name(name)?))
    }

    /// Write `bytes` as `name`, creating the root if needed.
    pub async fn write(&self, name: &str, bytes: &[u8]) -> Result<PathBuf, StorageError> {
        let path = self.path_for(name)?;
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }

    /// Remove `name`. A file that is already gone is not an error.
    pub async fn delete(&self, name: &str) -> Result<(), StorageError> {
        let path = self.path_for(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
