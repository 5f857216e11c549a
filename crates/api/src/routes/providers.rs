//! Route definitions for the `/providers` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::providers;
use crate::state::AppState;

/// Routes mounted at `/providers`.
///
/// ```text
/// GET    /          -> list_providers
/// POST   /config    -> save_provider_config
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(providers::list_providers))
        .route("/config", post(providers::save_provider_config))
}
