//! Repository for the `generated_images` table.

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite};

use crate::models::generated_image::{CreateGeneratedImage, GeneratedImage};
use crate::DbPool;

/// Column list for `generated_images` queries.
const COLUMNS: &str = "\
    id, task_id, file_path, thumbnail_path, remote_url, thumbnail_remote_url, \
    width, height, file_size, mime_type, created_at";

/// Provides CRUD operations for generated images.
pub struct GeneratedImageRepo;

impl GeneratedImageRepo {
    /// Insert an image row with a fresh id.
    pub async fn create(
        pool: &DbPool,
        input: &CreateGeneratedImage,
    ) -> Result<GeneratedImage, sqlx::Error> {
        let query = format!(
            "INSERT INTO generated_images \
                (id, task_id, file_path, thumbnail_path, remote_url, thumbnail_remote_url, \
                 width, height, file_size, mime_type, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, GeneratedImage>(&query)
            .bind(uuid::Uuid::new_v4().to_string())
            .bind(&input.task_id)
            .bind(&input.file_path)
            .bind(&input.thumbnail_path)
            .bind(input.remote_url.as_deref())
            .bind(input.thumbnail_remote_url.as_deref())
            .bind(input.width)
            .bind(input.height)
            .bind(input.file_size)
            .bind(&input.mime_type)
            .bind(Utc::now())
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(
        pool: &DbPool,
        id: &str,
    ) -> Result<Option<GeneratedImage>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM generated_images WHERE id = ?1");
        sqlx::query_as::<_, GeneratedImage>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Images of one task in creation order.
    pub async fn list_by_task(
        pool: &DbPool,
        task_id: &str,
    ) -> Result<Vec<GeneratedImage>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM generated_images \
             WHERE task_id = ?1 \
             ORDER BY created_at ASC, rowid ASC"
        );
        sqlx::query_as::<_, GeneratedImage>(&query)
            .bind(task_id)
            .fetch_all(pool)
            .await
    }

    /// Images of several tasks, grouped by task and in creation order.
    pub async fn list_by_tasks(
        pool: &DbPool,
        task_ids: &[&str],
    ) -> Result<Vec<GeneratedImage>, sqlx::Error> {
        if task_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {COLUMNS} FROM generated_images WHERE task_id IN ("
        ));
        let mut separated = builder.separated(", ");
        for id in task_ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(") ORDER BY task_id, created_at ASC, rowid ASC");
        builder
            .build_query_as::<GeneratedImage>()
            .fetch_all(pool)
            .await
    }
}
