//! Handlers for provider credentials and policy.
//!
//! Saving a config rebuilds the provider registry; tasks already running
//! keep the registry snapshot they resolved at dispatch.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use validator::Validate;

use imagegen_core::error::CoreError;
use imagegen_core::provider_policy::default_timeout_secs;
use imagegen_db::models::{ProviderConfig, ProviderModel, UpsertProviderConfig};
use imagegen_db::repositories::ProviderConfigRepo;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// Provider config as listed to clients. The API key is masked.
#[derive(Debug, Serialize)]
pub struct ProviderSummary {
    pub provider_name: String,
    pub display_name: String,
    pub api_base: String,
    pub api_key: String,
    pub enabled: bool,
    pub timeout_seconds: i64,
    pub models: Vec<ProviderModel>,
    /// Whether the provider is currently dispatchable.
    pub active: bool,
}

impl ProviderSummary {
    fn new(config: ProviderConfig, active: bool) -> Self {
        Self {
            api_key: config.masked_api_key(),
            provider_name: config.provider_name,
            display_name: config.display_name,
            api_base: config.api_base,
            enabled: config.enabled,
            timeout_seconds: config.timeout_seconds,
            models: config.models.0,
            active,
        }
    }
}

/// Body of `POST /providers/config`.
#[derive(Debug, Deserialize, Validate)]
pub struct SaveProviderConfig {
    #[validate(length(min = 1, max = 64, message = "provider_name is required"))]
    pub provider_name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub api_base: String,
    /// Empty keeps the stored key.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Becomes the single default model when given.
    #[serde(default)]
    pub model_id: Option<String>,
    /// Missing or non-positive means the provider default.
    #[serde(default)]
    pub timeout_seconds: Option<i64>,
}

fn default_enabled() -> bool {
    true
}

// ---------------------------------------------------------------------------
// GET /providers
// ---------------------------------------------------------------------------

pub async fn list_providers(
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Vec<ProviderSummary>>>> {
    let registry = state.providers.snapshot();
    let configs = ProviderConfigRepo::list_all(&state.pool).await?;
    let data = configs
        .into_iter()
        .map(|config| {
            let active = registry.contains(&config.provider_name);
            ProviderSummary::new(config, active)
        })
        .collect();
    Ok(Json(DataResponse { data }))
}

// ---------------------------------------------------------------------------
// POST /providers/config
// ---------------------------------------------------------------------------

/// Create or replace a provider config, then reload the registry.
pub async fn save_provider_config(
    State(state): State<AppState>,
    Json(input): Json<SaveProviderConfig>,
) -> AppResult<Json<DataResponse<ProviderSummary>>> {
    input
        .validate()
        .map_err(|e| CoreError::Validation(e.to_string()))?;

    let provider_name = input.provider_name.trim().to_string();
    let existing = ProviderConfigRepo::find_by_name(&state.pool, &provider_name).await?;

    let api_key = match input.api_key.trim() {
        "" => existing
            .as_ref()
            .map(|c| c.api_key.clone())
            .unwrap_or_default(),
        key => key.to_string(),
    };

    let timeout_seconds = input
        .timeout_seconds
        .filter(|t| *t > 0)
        .unwrap_or_else(|| default_timeout_secs(&provider_name) as i64);

    let models = input
        .model_id
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .map(|id| {
            vec![ProviderModel {
                name: id.clone(),
                id,
                default: true,
            }]
        });

    let display_name = input
        .display_name
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| provider_name.clone());

    let saved = ProviderConfigRepo::upsert(
        &state.pool,
        &UpsertProviderConfig {
            provider_name: provider_name.clone(),
            display_name,
            api_base: input.api_base.trim().to_string(),
            api_key,
            enabled: input.enabled,
            timeout_seconds,
            models,
        },
    )
    .await?;

    let count = state.providers.reload(&state.pool).await?;
    tracing::info!(provider = %provider_name, enabled = saved.enabled, providers = count, "Provider config saved");

    let active = state.providers.snapshot().contains(&provider_name);
    Ok(Json(DataResponse {
        data: ProviderSummary::new(saved, active),
    }))
}
