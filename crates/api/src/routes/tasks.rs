//! Route definitions for the `/tasks` resource.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

use imagegen_core::generation::{MAX_REFERENCE_IMAGES, MAX_REFERENCE_IMAGE_BYTES};

use crate::handlers::tasks;
use crate::state::AppState;

/// Room for every reference image plus the text fields.
const MULTIPART_BODY_LIMIT: usize = MAX_REFERENCE_IMAGES * MAX_REFERENCE_IMAGE_BYTES + 1024 * 1024;

/// Routes mounted at `/tasks`.
///
/// ```text
/// POST   /generate               -> generate
/// POST   /generate-with-images   -> generate_with_images (multipart)
/// GET    /{id}                   -> get_task
/// GET    /{id}/stream            -> stream_task (SSE)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/generate", post(tasks::generate))
        .route(
            "/generate-with-images",
            post(tasks::generate_with_images).layer(DefaultBodyLimit::max(MULTIPART_BODY_LIMIT)),
        )
        .route("/{id}", get(tasks::get_task))
        .route("/{id}/stream", get(tasks::stream_task))
}
