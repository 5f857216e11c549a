//! Handlers for creating and observing generation tasks.
//!
//! Creating a task is a two-step admission: the provider validates the
//! parameters, then the task row is written as `pending` and handed to the
//! worker pool. A full queue turns the new row `failed` and answers 503.

use std::convert::Infallible;
use std::path::Path as FsPath;

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::Json;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use validator::Validate;

use imagegen_core::error::CoreError;
use imagegen_core::generation::{GenerationParams, MAX_REFERENCE_IMAGES, MAX_REFERENCE_IMAGE_BYTES};
use imagegen_core::image_format::ImageFormat;
use imagegen_core::snapshot::build_config_snapshot;
use imagegen_core::task_status::TaskStatus;
use imagegen_db::models::{CreateTask, TaskUpdate, TaskWithImages};
use imagegen_events::{task_progress_stream, ProgressFrame};
use imagegen_worker::{PoolError, TaskJob};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Stored on a task the queue had no room for.
pub const QUEUE_FULL_MESSAGE: &str = "Server is busy, too many tasks are queued. Please try again later.";

/// Stored on a task submitted while the server is shutting down.
pub const SHUTTING_DOWN_MESSAGE: &str = "Server is shutting down. Please try again later.";

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

/// Body of `POST /tasks/generate`.
#[derive(Debug, Deserialize, Validate)]
pub struct GenerateRequest {
    #[validate(length(min = 1, message = "provider is required"))]
    pub provider: String,
    #[serde(default)]
    pub model_id: Option<String>,
    /// Loosely typed generation parameters; see [`GenerationParams::from_json_map`].
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Admission
// ---------------------------------------------------------------------------

/// Validate, persist, and enqueue a task.
async fn admit(
    state: &AppState,
    provider_name: &str,
    requested_model: Option<String>,
    mut params: GenerationParams,
) -> AppResult<TaskWithImages> {
    let resolved = state.providers.resolve(provider_name)?;
    params.model_id = resolved.model_for(requested_model.as_deref());
    resolved.provider.validate(&params)?;

    let task_id = uuid::Uuid::new_v4().to_string();
    let record = state
        .store
        .create_task(&CreateTask {
            task_id: task_id.clone(),
            prompt: params.prompt.trim().to_string(),
            provider_name: provider_name.to_string(),
            model_id: params.model_id.clone(),
            total_count: i64::from(params.count),
            config_snapshot: build_config_snapshot(provider_name, &params),
        })
        .await?;

    let job = TaskJob {
        task_id: task_id.clone(),
        provider_name: provider_name.to_string(),
        params,
    };

    let rejection = match state.workers.submit(job) {
        Ok(()) => {
            tracing::info!(task_id = %task_id, provider = %provider_name, "Task queued");
            return Ok(record);
        }
        Err(PoolError::QueueFull { .. }) => QUEUE_FULL_MESSAGE,
        Err(PoolError::Closed) => SHUTTING_DOWN_MESSAGE,
    };

    if let Err(e) = state
        .store
        .update_task(
            &task_id,
            &TaskUpdate::status(TaskStatus::Failed).with_error(rejection),
        )
        .await
    {
        tracing::error!(task_id = %task_id, error = %e, "Failed to mark rejected task");
    }
    Err(CoreError::Capacity(rejection.to_string()).into())
}

// ---------------------------------------------------------------------------
// POST /tasks/generate
// ---------------------------------------------------------------------------

/// Create a text-to-image task.
pub async fn generate(
    State(state): State<AppState>,
    Json(input): Json<GenerateRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<TaskWithImages>>)> {
    input
        .validate()
        .map_err(|e| AppError::Core(CoreError::Validation(e.to_string())))?;

    let mut params = GenerationParams::from_json_map(&input.params)?;
    let requested_model = input
        .model_id
        .filter(|m| !m.trim().is_empty())
        .or_else(|| Some(std::mem::take(&mut params.model_id)).filter(|m| !m.is_empty()));

    let record = admit(&state, input.provider.trim(), requested_model, params).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: record })))
}

// ---------------------------------------------------------------------------
// POST /tasks/generate-with-images
// ---------------------------------------------------------------------------

/// Create an image-to-image task from a multipart form.
///
/// Reference images arrive either as `ref_images` file parts or as
/// `ref_paths` naming files on the local machine.
pub async fn generate_with_images(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<DataResponse<TaskWithImages>>)> {
    let mut provider = String::new();
    let mut model_id = None;
    let mut params = GenerationParams {
        count: 1,
        ..Default::default()
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "ref_images" => {
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                push_reference(&mut params, data.to_vec())?;
            }
            _ => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                let text = text.trim().to_string();
                match name.as_str() {
                    "prompt" => params.prompt = text,
                    "provider" => provider = text,
                    "model_id" => model_id = Some(text).filter(|m| !m.is_empty()),
                    "aspect_ratio" | "aspectRatio" => {
                        params.aspect_ratio = Some(text).filter(|s| !s.is_empty())
                    }
                    "image_size" | "imageSize" => {
                        params.image_size = Some(text).filter(|s| !s.is_empty())
                    }
                    "count" => {
                        params.count = text.parse().map_err(|_| {
                            CoreError::Validation(format!("count must be a number, got '{text}'"))
                        })?
                    }
                    "ref_paths" if !text.is_empty() => {
                        let data = read_reference_path(&text).await?;
                        push_reference(&mut params, data)?;
                    }
                    _ => {}
                }
            }
        }
    }

    if provider.is_empty() {
        return Err(CoreError::Validation("provider is required".into()).into());
    }

    let record = admit(&state, &provider, model_id, params).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: record })))
}

fn push_reference(params: &mut GenerationParams, data: Vec<u8>) -> AppResult<()> {
    let index = params.reference_images.len();
    if index >= MAX_REFERENCE_IMAGES {
        return Err(CoreError::Validation(format!(
            "At most {MAX_REFERENCE_IMAGES} reference images are allowed"
        ))
        .into());
    }
    ImageFormat::detect(&data)
        .map_err(|e| CoreError::Validation(format!("Reference image {index}: {e}")))?;
    params.reference_images.push(data);
    Ok(())
}

/// Read a reference image from a local path sent by the desktop shell.
async fn read_reference_path(raw: &str) -> AppResult<Vec<u8>> {
    if raw.contains("..") {
        return Err(CoreError::Validation(format!("Invalid reference path '{raw}'")).into());
    }
    let path = FsPath::new(raw);
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| CoreError::Validation(format!("Cannot read reference image '{raw}': {e}")))?;
    if !metadata.is_file() {
        return Err(CoreError::Validation(format!("Reference path '{raw}' is not a file")).into());
    }
    if metadata.len() > MAX_REFERENCE_IMAGE_BYTES as u64 {
        return Err(CoreError::Validation(format!(
            "Reference image '{raw}' exceeds the 20 MB limit"
        ))
        .into());
    }
    tokio::fs::read(path)
        .await
        .map_err(|e| AppError::InternalError(format!("Failed to read '{raw}': {e}")))
}

// ---------------------------------------------------------------------------
// GET /tasks/{id}
// ---------------------------------------------------------------------------

/// Current task record including its images.
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> AppResult<Json<DataResponse<TaskWithImages>>> {
    let record = state.store.get_task(&task_id).await?;
    let record = record.ok_or(CoreError::NotFound {
        entity: "Task",
        id: task_id,
    })?;
    Ok(Json(DataResponse { data: record }))
}

// ---------------------------------------------------------------------------
// GET /tasks/{id}/stream
// ---------------------------------------------------------------------------

/// Server-sent progress events for one task.
///
/// Task records are sent as unnamed `data:` events, heartbeats as
/// `event: ping`. The stream ends after the terminal record.
pub async fn stream_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    if state.store.get_task(&task_id).await?.is_none() {
        return Err(CoreError::NotFound {
            entity: "Task",
            id: task_id,
        }
        .into());
    }

    tracing::debug!(task_id = %task_id, "Progress stream opened");
    let frames = task_progress_stream(
        state.events.clone(),
        state.store.clone(),
        task_id,
        state.config.stream_heartbeat(),
    );
    Ok(Sse::new(frames.filter_map(|frame| futures::future::ready(sse_event(frame)))))
}

fn sse_event(frame: ProgressFrame) -> Option<Result<Event, Infallible>> {
    match frame {
        ProgressFrame::Update(record) => match serde_json::to_string(&record) {
            Ok(payload) => Some(Ok(Event::default().data(payload))),
            Err(e) => {
                tracing::warn!(task_id = %record.task_id(), error = %e, "Failed to serialize task record");
                None
            }
        },
        ProgressFrame::Ping => Some(Ok(Event::default().event("ping").data("ping"))),
        ProgressFrame::NotFound => None,
    }
}
