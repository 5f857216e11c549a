//! Handlers for the image library: listing, deletion, and download.

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use serde::Serialize;
use tokio_util::io::ReaderStream;

use imagegen_core::error::CoreError;
use imagegen_core::image_format::ImageFormat;
use imagegen_db::models::{GeneratedImage, TaskListQuery, TaskPage};
use imagegen_db::repositories::{GeneratedImageRepo, TaskRepo};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Result of deleting a task and its assets.
#[derive(Debug, Serialize)]
pub struct DeleteResult {
    pub task_id: String,
    pub images_deleted: usize,
    /// Per-target failures; the task row is gone regardless.
    pub asset_errors: Vec<String>,
}

/// File name an image was stored under, from its local path or remote URL.
fn asset_name(image: &GeneratedImage) -> Option<&str> {
    [image.file_path.as_str(), image.remote_url.as_deref().unwrap_or("")]
        .into_iter()
        .filter_map(|p| p.rsplit(['/', '\\']).next())
        .find(|name| !name.is_empty())
}

// ---------------------------------------------------------------------------
// GET /images
// ---------------------------------------------------------------------------

/// Paged task list with images, active tasks first.
pub async fn list_images(
    State(state): State<AppState>,
    Query(params): Query<TaskListQuery>,
) -> AppResult<Json<DataResponse<TaskPage>>> {
    let page = TaskRepo::list(&state.pool, &params).await?;
    Ok(Json(DataResponse { data: page }))
}

// ---------------------------------------------------------------------------
// DELETE /images/{id}
// ---------------------------------------------------------------------------

/// Delete a finished task, its image rows, and their stored assets.
pub async fn delete_task_images(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> AppResult<Json<DataResponse<DeleteResult>>> {
    let Some(record) = state.store.get_task(&task_id).await? else {
        return Err(CoreError::NotFound {
            entity: "Task",
            id: task_id,
        }
        .into());
    };
    if !record.is_terminal() {
        return Err(CoreError::Conflict(format!(
            "Task {task_id} is still {}",
            record.task.status
        ))
        .into());
    }

    state.store.delete_task(&task_id).await?;

    let mut asset_errors = Vec::new();
    for image in &record.images {
        let Some(name) = asset_name(image) else {
            continue;
        };
        if let Err(e) = state.artifacts.delete(name).await {
            asset_errors.push(e.to_string());
        }
    }

    if !asset_errors.is_empty() {
        tracing::warn!(task_id = %task_id, failures = asset_errors.len(), "Some task assets could not be deleted");
    }
    tracing::info!(task_id = %task_id, images = record.images.len(), "Task deleted");

    Ok(Json(DataResponse {
        data: DeleteResult {
            task_id,
            images_deleted: record.images.len(),
            asset_errors,
        },
    }))
}

// ---------------------------------------------------------------------------
// GET /images/{id}/download
// ---------------------------------------------------------------------------

/// Stream the primary asset of one image.
///
/// Images whose only copy is remote are answered with a redirect.
pub async fn download_image(
    State(state): State<AppState>,
    Path(image_id): Path<String>,
) -> AppResult<Response> {
    let image = GeneratedImageRepo::find_by_id(&state.pool, &image_id)
        .await?
        .ok_or_else(|| CoreError::NotFound {
            entity: "GeneratedImage",
            id: image_id.clone(),
        })?;

    let remote_fallback = || {
        image
            .remote_url
            .as_deref()
            .map(|url| Redirect::temporary(url).into_response())
    };

    let Some(name) = image.file_path.rsplit(['/', '\\']).next().filter(|n| !n.is_empty()) else {
        return remote_fallback().ok_or_else(|| missing_asset(&image_id));
    };
    let path = state.artifacts.local_path(name)?;

    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(image_id = %image_id, path = %path.display(), "Image file missing on disk");
            return remote_fallback().ok_or_else(|| missing_asset(&image_id));
        }
        Err(e) => return Err(AppError::InternalError(format!("Failed to open image: {e}"))),
    };
    let file_size = file
        .metadata()
        .await
        .map_err(|e| AppError::InternalError(e.to_string()))?
        .len();

    let content_type = name
        .rsplit_once('.')
        .and_then(|(_, ext)| ImageFormat::from_extension(ext))
        .map(ImageFormat::mime_type)
        .unwrap_or("application/octet-stream");

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, file_size.to_string())
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{name}\""),
        )
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| AppError::InternalError(e.to_string()))
}

fn missing_asset(image_id: &str) -> AppError {
    AppError::Core(CoreError::NotFound {
        entity: "Image file",
        id: image_id.to_string(),
    })
}
