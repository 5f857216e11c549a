//! The task repository interface the worker pool and progress streamer
//! depend on.
//!
//! Keeping the pool behind [`TaskStore`] means it never touches SQL
//! directly; tests and alternative engines supply their own impl.

use async_trait::async_trait;
use imagegen_core::task_status::TaskStatus;

use crate::models::generated_image::{CreateGeneratedImage, GeneratedImage};
use crate::models::task::{CreateTask, TaskUpdate, TaskWithImages};
use crate::repositories::{GeneratedImageRepo, TaskRepo};
use crate::DbPool;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Task '{0}' not found")]
    NotFound(String),

    /// The task reached a terminal status and can no longer change.
    #[error("Task '{task_id}' is already {status}")]
    Terminal { task_id: String, status: TaskStatus },

    /// The requested status is not reachable from the current one.
    #[error("Task '{task_id}' cannot move from {from} to {to}")]
    InvalidTransition {
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
    },
}

/// Get / create / update / delete over task records and their images.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create_task(&self, input: &CreateTask) -> Result<TaskWithImages, StoreError>;

    async fn get_task(&self, task_id: &str) -> Result<Option<TaskWithImages>, StoreError>;

    /// Apply `update` and return the full updated record.
    ///
    /// Fails with [`StoreError::Terminal`] once the task is finished and
    /// with [`StoreError::InvalidTransition`] when the status change skips
    /// or reverses a lifecycle step.
    async fn update_task(
        &self,
        task_id: &str,
        update: &TaskUpdate,
    ) -> Result<TaskWithImages, StoreError>;

    /// Returns `false` if there was nothing to delete.
    async fn delete_task(&self, task_id: &str) -> Result<bool, StoreError>;

    async fn add_image(&self, input: &CreateGeneratedImage) -> Result<GeneratedImage, StoreError>;
}

/// [`TaskStore`] backed by the SQLite repositories.
#[derive(Clone)]
pub struct SqliteTaskStore {
    pool: DbPool,
}

impl SqliteTaskStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn create_task(&self, input: &CreateTask) -> Result<TaskWithImages, StoreError> {
        let task = TaskRepo::create(&self.pool, input).await?;
        Ok(TaskWithImages {
            task,
            images: Vec::new(),
        })
    }

    async fn get_task(&self, task_id: &str) -> Result<Option<TaskWithImages>, StoreError> {
        let Some(task) = TaskRepo::find_by_id(&self.pool, task_id).await? else {
            return Ok(None);
        };
        let images = GeneratedImageRepo::list_by_task(&self.pool, task_id).await?;
        Ok(Some(TaskWithImages { task, images }))
    }

    async fn update_task(
        &self,
        task_id: &str,
        update: &TaskUpdate,
    ) -> Result<TaskWithImages, StoreError> {
        match TaskRepo::update(&self.pool, task_id, update).await? {
            Some(task) => {
                let images = GeneratedImageRepo::list_by_task(&self.pool, task_id).await?;
                Ok(TaskWithImages { task, images })
            }
            None => match TaskRepo::find_by_id(&self.pool, task_id).await? {
                Some(existing) if existing.status.is_terminal() => Err(StoreError::Terminal {
                    task_id: task_id.to_string(),
                    status: existing.status,
                }),
                Some(existing) => Err(StoreError::InvalidTransition {
                    task_id: task_id.to_string(),
                    from: existing.status,
                    to: update.status.unwrap_or(existing.status),
                }),
                None => Err(StoreError::NotFound(task_id.to_string())),
            },
        }
    }

    async fn delete_task(&self, task_id: &str) -> Result<bool, StoreError> {
        Ok(TaskRepo::delete(&self.pool, task_id).await?)
    }

    async fn add_image(&self, input: &CreateGeneratedImage) -> Result<GeneratedImage, StoreError> {
        Ok(GeneratedImageRepo::create(&self.pool, input).await?)
    }
}
