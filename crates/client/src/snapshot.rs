use serde::Deserialize;

use imagegen_core::task_status::TaskStatus;

/// Client view of a task record, as sent on the stream and by
/// `GET /tasks/{id}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TaskSnapshot {
    pub task_id: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub provider_name: String,
    #[serde(default)]
    pub model_id: String,
    #[serde(default)]
    pub total_count: i64,
    #[serde(default)]
    pub completed_count: i64,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub images: Vec<ImageSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ImageSnapshot {
    pub id: String,
    #[serde(default)]
    pub file_path: String,
    #[serde(default)]
    pub thumbnail_path: String,
    #[serde(default)]
    pub remote_url: Option<String>,
    #[serde(default)]
    pub width: i64,
    #[serde(default)]
    pub height: i64,
    #[serde(default)]
    pub mime_type: String,
}

impl TaskSnapshot {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether this snapshot should replace `previous` on screen.
    ///
    /// Nothing replaces a terminal snapshot, and a snapshot never moves the
    /// status or the completed count backwards. Identical repeats are
    /// dropped.
    pub fn supersedes(&self, previous: &TaskSnapshot) -> bool {
        if previous.is_terminal() {
            return false;
        }
        if self.status.rank() < previous.status.rank()
            || self.completed_count < previous.completed_count
        {
            return false;
        }
        self.status != previous.status
            || self.completed_count != previous.completed_count
            || self.error_message != previous.error_message
            || self.images.len() != previous.images.len()
    }
}
