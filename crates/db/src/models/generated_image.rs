//! Generated image rows. Each belongs to exactly one task.

use serde::Serialize;
use sqlx::FromRow;
use imagegen_core::types::{EntityId, Timestamp};

/// A row from the `generated_images` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct GeneratedImage {
    pub id: EntityId,
    pub task_id: EntityId,
    /// Primary local asset; empty when only the remote target accepted it.
    pub file_path: String,
    /// Empty when thumbnail generation failed.
    pub thumbnail_path: String,
    pub remote_url: Option<String>,
    pub thumbnail_remote_url: Option<String>,
    /// Zero when the image could not be decoded.
    pub width: i64,
    pub height: i64,
    pub file_size: i64,
    pub mime_type: String,
    pub created_at: Timestamp,
}

/// DTO for inserting an image row right after a successful save.
#[derive(Debug, Clone)]
pub struct CreateGeneratedImage {
    pub task_id: EntityId,
    pub file_path: String,
    pub thumbnail_path: String,
    pub remote_url: Option<String>,
    pub thumbnail_remote_url: Option<String>,
    pub width: i64,
    pub height: i64,
    pub file_size: i64,
    pub mime_type: String,
}
