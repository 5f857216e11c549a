//! Image format detection by magic bytes.
//!
//! The stored file extension always comes from the detected format,
//! never from a caller-supplied name. Unrecognized input is an error;
//! there is no fallback format.

use serde::Serialize;

const MAGIC_PNG: &[u8] = b"\x89PNG\r\n\x1a\n";
const MAGIC_JPEG: &[u8] = b"\xff\xd8\xff";
const MAGIC_GIF: &[u8] = b"GIF8";
const MAGIC_RIFF: &[u8] = b"RIFF";
const MAGIC_WEBP: &[u8] = b"WEBP";

/// Fewer bytes than this cannot be classified.
const MIN_HEADER_LEN: usize = 8;

/// Largest accepted asset (100 MB), whether uploaded or downloaded.
pub const MAX_IMAGE_BYTES: usize = 100 * 1024 * 1024;

/// Extensions a stored asset (or its thumbnail) may carry.
pub const KNOWN_EXTENSIONS: [&str; 4] = ["png", "jpg", "gif", "webp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Webp,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("Invalid image data: {0} bytes is too short to identify")]
    TooShort(usize),

    #[error("Unrecognized image format")]
    Unknown,
}

impl ImageFormat {
    /// Classify `data` by its leading bytes.
    pub fn detect(data: &[u8]) -> Result<Self, FormatError> {
        if data.len() < MIN_HEADER_LEN {
            return Err(FormatError::TooShort(data.len()));
        }
        if data.starts_with(MAGIC_PNG) {
            return Ok(Self::Png);
        }
        if data.starts_with(MAGIC_JPEG) {
            return Ok(Self::Jpeg);
        }
        if data.starts_with(MAGIC_GIF) {
            return Ok(Self::Gif);
        }
        if data.starts_with(MAGIC_RIFF) && data.len() >= 12 && &data[8..12] == MAGIC_WEBP {
            return Ok(Self::Webp);
        }
        Err(FormatError::Unknown)
    }

    /// File extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Gif => "gif",
            Self::Webp => "webp",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
        }
    }

    /// Reverse lookup from a stored file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "gif" => Some(Self::Gif),
            "webp" => Some(Self::Webp),
            _ => None,
        }
    }
}
