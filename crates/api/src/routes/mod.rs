pub mod health;
pub mod images;
pub mod providers;
pub mod tasks;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /tasks/generate                  create text-to-image task (POST)
/// /tasks/generate-with-images      create image-to-image task (POST, multipart)
/// /tasks/{id}                      task record with images (GET)
/// /tasks/{id}/stream               progress events (GET, SSE)
///
/// /images                          paged task list with images (GET)
/// /images/{id}                     delete task and assets (DELETE)
/// /images/{id}/download            primary asset bytes (GET)
///
/// /providers                       provider configs, keys masked (GET)
/// /providers/config                create or replace a config (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/tasks", tasks::router())
        .nest("/images", images::router())
        .nest("/providers", providers::router())
}
