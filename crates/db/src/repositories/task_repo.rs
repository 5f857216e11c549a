//! Repository for the `tasks` table.
//!
//! Every mutation of a task carries the terminal-state guard
//! `status NOT IN ('completed', 'failed', 'partial')`, so a finished task
//! can never be rewritten no matter which caller issues the update.
//! Status changes are further restricted to the lifecycle edges allowed
//! by [`TaskStatus::can_transition_to`].

use std::collections::HashMap;

use chrono::Utc;
use imagegen_core::task_status::{TaskStatus, ALL_STATUSES};

use crate::models::task::{CreateTask, Task, TaskListQuery, TaskPage, TaskUpdate, TaskWithImages};
use crate::repositories::GeneratedImageRepo;
use crate::DbPool;

/// Column list for `tasks` queries.
const COLUMNS: &str = "\
    task_id, prompt, provider_name, model_id, total_count, completed_count, \
    status, error_message, config_snapshot, created_at, updated_at";

/// SQL fragment matching rows that may still be mutated.
const NOT_TERMINAL: &str = "status NOT IN ('completed', 'failed', 'partial')";

/// Default page size for listings.
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// Maximum page size for listings.
pub const MAX_PAGE_SIZE: i64 = 100;

/// Error message written by [`TaskRepo::reconcile_interrupted`].
pub const INTERRUPTED_MESSAGE: &str = "interrupted by service restart";

/// SQL fragment matching rows that may take `next` as their new status.
fn status_guard(next: Option<TaskStatus>) -> String {
    let Some(next) = next else {
        return NOT_TERMINAL.to_string();
    };
    let sources: Vec<String> = ALL_STATUSES
        .into_iter()
        .filter(|from| from.can_transition_to(next))
        .map(|from| format!("'{}'", from.as_str()))
        .collect();
    format!("status IN ({})", sources.join(", "))
}

/// Provides CRUD operations for generation tasks.
pub struct TaskRepo;

impl TaskRepo {
    /// Insert a new `pending` task.
    pub async fn create(pool: &DbPool, input: &CreateTask) -> Result<Task, sqlx::Error> {
        let now = Utc::now();
        let query = format!(
            "INSERT INTO tasks \
                (task_id, prompt, provider_name, model_id, total_count, completed_count, \
                 status, config_snapshot, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7, ?8, ?8) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(&input.task_id)
            .bind(&input.prompt)
            .bind(&input.provider_name)
            .bind(&input.model_id)
            .bind(input.total_count)
            .bind(TaskStatus::Pending.as_str())
            .bind(sqlx::types::Json(&input.config_snapshot))
            .bind(now)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &DbPool, task_id: &str) -> Result<Option<Task>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM tasks WHERE task_id = ?1");
        sqlx::query_as::<_, Task>(&query)
            .bind(task_id)
            .fetch_optional(pool)
            .await
    }

    /// Apply `update` to a non-terminal task.
    ///
    /// `completed_count` is clamped to `[stored value, total_count]` so it
    /// never decreases nor overshoots. Returns `None` when the task does
    /// not exist, is already terminal, or cannot move to the requested
    /// status from its current one.
    pub async fn update(
        pool: &DbPool,
        task_id: &str,
        update: &TaskUpdate,
    ) -> Result<Option<Task>, sqlx::Error> {
        let query = format!(
            "UPDATE tasks SET \
                status = COALESCE(?1, status), \
                completed_count = MIN(total_count, MAX(completed_count, COALESCE(?2, completed_count))), \
                error_message = CASE WHEN ?3 THEN NULL ELSE COALESCE(?4, error_message) END, \
                updated_at = ?5 \
             WHERE task_id = ?6 AND {guard} \
             RETURNING {COLUMNS}",
            guard = status_guard(update.status),
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(update.status.map(TaskStatus::as_str))
            .bind(update.completed_count)
            .bind(update.clear_error)
            .bind(update.error_message.as_deref())
            .bind(Utc::now())
            .bind(task_id)
            .fetch_optional(pool)
            .await
    }

    /// Delete a task. Its image rows go with it (`ON DELETE CASCADE`).
    pub async fn delete(pool: &DbPool, task_id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM tasks WHERE task_id = ?1")
            .bind(task_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// One page of tasks with their images.
    ///
    /// Ordered `processing` first, then `pending`, then newest first.
    pub async fn list(pool: &DbPool, params: &TaskListQuery) -> Result<TaskPage, sqlx::Error> {
        let page = params.page.filter(|p| *p > 0).unwrap_or(1);
        let page_size = params
            .page_size
            .filter(|s| *s > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .min(MAX_PAGE_SIZE);
        let offset = (page - 1) * page_size;
        let keyword = params
            .keyword
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty());

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tasks WHERE ?1 IS NULL OR instr(prompt, ?1) > 0",
        )
        .bind(keyword)
        .fetch_one(pool)
        .await?;

        let query = format!(
            "SELECT {COLUMNS} FROM tasks \
             WHERE ?1 IS NULL OR instr(prompt, ?1) > 0 \
             ORDER BY CASE status WHEN 'processing' THEN 0 WHEN 'pending' THEN 1 ELSE 2 END, \
                      created_at DESC, rowid DESC \
             LIMIT ?2 OFFSET ?3"
        );
        let tasks = sqlx::query_as::<_, Task>(&query)
            .bind(keyword)
            .bind(page_size)
            .bind(offset)
            .fetch_all(pool)
            .await?;

        let ids: Vec<&str> = tasks.iter().map(|t| t.task_id.as_str()).collect();
        let mut images_by_task: HashMap<String, Vec<_>> = HashMap::new();
        for image in GeneratedImageRepo::list_by_tasks(pool, &ids).await? {
            images_by_task
                .entry(image.task_id.clone())
                .or_default()
                .push(image);
        }

        let list = tasks
            .into_iter()
            .map(|task| {
                let images = images_by_task.remove(&task.task_id).unwrap_or_default();
                TaskWithImages { task, images }
            })
            .collect();

        Ok(TaskPage { total, list })
    }

    /// Finalize every task a previous process left `pending` or
    /// `processing`.
    ///
    /// Tasks with all images are `completed`, with some are `partial`,
    /// with none are `failed`. Returns the ids that were touched.
    pub async fn reconcile_interrupted(pool: &DbPool) -> Result<Vec<String>, sqlx::Error> {
        let query = format!(
            "UPDATE tasks SET \
                status = CASE \
                    WHEN completed_count = 0 THEN 'failed' \
                    WHEN completed_count >= total_count THEN 'completed' \
                    ELSE 'partial' END, \
                error_message = CASE \
                    WHEN completed_count >= total_count THEN NULL \
                    ELSE ?1 END, \
                updated_at = ?2 \
             WHERE {NOT_TERMINAL} \
             RETURNING task_id"
        );
        sqlx::query_scalar(&query)
            .bind(INTERRUPTED_MESSAGE)
            .bind(Utc::now())
            .fetch_all(pool)
            .await
    }
}
