//! Route definitions for the `/images` resource.

use axum::routing::{delete, get};
use axum::Router;

use crate::handlers::images;
use crate::state::AppState;

/// Routes mounted at `/images`.
///
/// ```text
/// GET    /                  -> list_images  (?page=&page_size=&keyword=)
/// DELETE /{id}              -> delete_task_images  (id is a task id)
/// GET    /{id}/download     -> download_image      (id is an image id)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(images::list_images))
        .route("/{id}", delete(images::delete_task_images))
        .route("/{id}/download", get(images::download_image))
}
