use imagegen_core::image_format::FormatError;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Image exceeds the {limit} byte limit")]
    TooLarge { limit: usize },

    #[error(transparent)]
    Format(#[from] FormatError),

    /// Decoding or re-encoding failed. Only thumbnails surface this.
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Invalid file name '{0}'")]
    InvalidName(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Remote storage error: {0}")]
    Remote(String),

    /// Every failure collected while deleting from all targets.
    #[error("Delete failed: {}", .0.join("; "))]
    Delete(Vec<String>),
}
