//! The per-task batch loop.
//!
//! Only the worker running a task writes to it, so the record is updated
//! in place without further coordination. Every update is pushed to
//! progress subscribers in the order it was written.

use imagegen_core::task_status::{terminal_status, TaskStatus};
use imagegen_db::models::{CreateGeneratedImage, TaskUpdate};
use imagegen_db::StoreError;
use imagegen_providers::ProviderError;
use imagegen_storage::SavedArtifact;

use crate::pool::{TaskJob, WorkerContext};

/// Run `job` to a terminal status and return that status.
///
/// Provider and storage failures are absorbed into the task record;
/// only task-store failures are returned.
pub async fn execute_task(ctx: &WorkerContext, job: TaskJob) -> Result<TaskStatus, StoreError> {
    let TaskJob {
        task_id,
        provider_name,
        params,
    } = job;

    let resolved = match ctx.providers.resolve(&provider_name) {
        Ok(resolved) => resolved,
        Err(e) => {
            tracing::warn!(task_id = %task_id, provider = %provider_name, error = %e, "Provider resolution failed");
            return fail(ctx, &task_id, e.to_string()).await;
        }
    };

    let record = ctx
        .store
        .update_task(&task_id, &TaskUpdate::status(TaskStatus::Processing))
        .await?;
    let total = u32::try_from(record.task.total_count).unwrap_or(1).max(1);
    ctx.events.publish(record).await;

    if let Err(e) = resolved.provider.validate(&params) {
        tracing::warn!(task_id = %task_id, error = %e, "Parameters rejected by provider");
        return fail(ctx, &task_id, e.to_string()).await;
    }

    let mut completed: u32 = 0;
    let mut last_error: Option<String> = None;

    for attempt in 1..=total {
        if completed >= total {
            break;
        }

        let outcome = tokio::time::timeout(resolved.timeout, resolved.provider.generate(&params))
            .await
            .unwrap_or(Err(ProviderError::Timeout(resolved.timeout)));

        let images = match outcome {
            Ok(images) => images,
            Err(e) => {
                tracing::warn!(task_id = %task_id, attempt, error = %e, "Image attempt failed");
                let message = format!("Image {attempt}: {e}");
                record_error(ctx, &task_id, &message).await?;
                last_error = Some(message);
                continue;
            }
        };

        for bytes in images {
            if completed >= total {
                break;
            }
            let name = format!("{task_id}_{}", completed + 1);
            let saved = match ctx.artifacts.save_with_thumbnail(&name, bytes).await {
                Ok(saved) => saved,
                Err(e) => {
                    tracing::warn!(task_id = %task_id, attempt, error = %e, "Failed to store image");
                    let message = format!("Image {attempt}: failed to store result: {e}");
                    record_error(ctx, &task_id, &message).await?;
                    last_error = Some(message);
                    continue;
                }
            };

            ctx.store.add_image(&image_row(&task_id, &saved)).await?;
            completed += 1;
            let record = ctx
                .store
                .update_task(&task_id, &TaskUpdate::completed(i64::from(completed)))
                .await?;
            ctx.events.publish(record).await;
        }
    }

    let status = terminal_status(completed, total);
    let update = match status {
        TaskStatus::Completed => TaskUpdate::status(status).clearing_error(),
        _ => TaskUpdate::status(status).with_error(
            last_error.unwrap_or_else(|| "Provider returned no images".to_string()),
        ),
    };
    let record = ctx.store.update_task(&task_id, &update).await?;
    ctx.events.publish(record).await;
    Ok(status)
}

/// Store a per-image error without changing the status. Last error wins.
async fn record_error(ctx: &WorkerContext, task_id: &str, message: &str) -> Result<(), StoreError> {
    let record = ctx
        .store
        .update_task(task_id, &TaskUpdate::error(message))
        .await?;
    ctx.events.publish(record).await;
    Ok(())
}

async fn fail(ctx: &WorkerContext, task_id: &str, message: String) -> Result<TaskStatus, StoreError> {
    let record = ctx
        .store
        .update_task(
            task_id,
            &TaskUpdate::status(TaskStatus::Failed).with_error(message),
        )
        .await?;
    ctx.events.publish(record).await;
    Ok(TaskStatus::Failed)
}

/// Apply a terminal `update` and publish it, logging instead of failing.
///
/// Used after the batch loop itself could not finish the task.
pub(crate) async fn finish(ctx: &WorkerContext, task_id: &str, update: TaskUpdate) {
    match ctx.store.update_task(task_id, &update).await {
        Ok(record) => {
            ctx.events.publish(record).await;
        }
        Err(StoreError::Terminal { .. }) => {}
        Err(e) => {
            tracing::error!(task_id = %task_id, error = %e, "Failed to finalize task");
        }
    }
}

fn image_row(task_id: &str, saved: &SavedArtifact) -> CreateGeneratedImage {
    CreateGeneratedImage {
        task_id: task_id.to_string(),
        file_path: saved.local_path.clone(),
        thumbnail_path: saved.thumbnail_path.clone(),
        remote_url: saved.remote_url.clone(),
        thumbnail_remote_url: saved.thumbnail_remote_url.clone(),
        width: i64::from(saved.width),
        height: i64::from(saved.height),
        file_size: saved.file_size as i64,
        mime_type: saved.format.mime_type().to_string(),
    }
}
