//! Task entity models and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use imagegen_core::task_status::TaskStatus;
use imagegen_core::types::{EntityId, Timestamp};

use super::generated_image::GeneratedImage;

/// A row from the `tasks` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Task {
    pub task_id: EntityId,
    pub prompt: String,
    pub provider_name: String,
    pub model_id: String,
    pub total_count: i64,
    /// Monotonically non-decreasing, never above `total_count`.
    pub completed_count: i64,
    #[sqlx(try_from = "String")]
    pub status: TaskStatus,
    /// Set only on `failed` / `partial`. Last error wins.
    pub error_message: Option<String>,
    pub config_snapshot: Json<serde_json::Value>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A task together with the images it owns. This is the record pushed to
/// progress subscribers and returned by `GET /tasks/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskWithImages {
    #[serde(flatten)]
    pub task: Task,
    pub images: Vec<GeneratedImage>,
}

impl TaskWithImages {
    pub fn task_id(&self) -> &str {
        &self.task.task_id
    }

    pub fn is_terminal(&self) -> bool {
        self.task.status.is_terminal()
    }

    /// Whether this record should replace `previous` for a subscriber.
    ///
    /// Rejects anything that would regress the displayed state (lower
    /// status rank or completed count, or any change after a terminal
    /// record) and exact repeats.
    pub fn supersedes(&self, previous: &TaskWithImages) -> bool {
        let (next, prev) = (&self.task, &previous.task);
        if prev.status.is_terminal() {
            return false;
        }
        if next.status.rank() < prev.status.rank() || next.completed_count < prev.completed_count {
            return false;
        }
        next.status != prev.status
            || next.completed_count != prev.completed_count
            || next.error_message != prev.error_message
            || self.images.len() != previous.images.len()
    }
}

/// DTO for inserting a new `pending` task.
#[derive(Debug, Clone)]
pub struct CreateTask {
    pub task_id: EntityId,
    pub prompt: String,
    pub provider_name: String,
    pub model_id: String,
    pub total_count: i64,
    pub config_snapshot: serde_json::Value,
}

/// Partial update applied by the single worker that owns a task.
///
/// Fields left `None` keep their stored value.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub status: Option<TaskStatus>,
    pub completed_count: Option<i64>,
    pub error_message: Option<String>,
    /// Clear `error_message` (takes precedence over `error_message`).
    pub clear_error: bool,
}

impl TaskUpdate {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn completed(count: i64) -> Self {
        Self {
            completed_count: Some(count),
            ..Default::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error_message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn clearing_error(mut self) -> Self {
        self.clear_error = true;
        self
    }
}

/// Query parameters for `GET /images`.
#[derive(Debug, Default, Deserialize)]
pub struct TaskListQuery {
    /// 1-based page number. Defaults to 1.
    pub page: Option<i64>,
    /// Page size. Defaults to 20, capped at 100.
    #[serde(alias = "pageSize")]
    pub page_size: Option<i64>,
    /// Substring filter on the prompt.
    pub keyword: Option<String>,
}

/// One page of tasks plus the unpaged total.
#[derive(Debug, Serialize)]
pub struct TaskPage {
    pub total: i64,
    pub list: Vec<TaskWithImages>,
}
