//! Repository for the `provider_configs` table.

use chrono::Utc;
use sqlx::types::Json;

use crate::models::provider_config::{ProviderConfig, UpsertProviderConfig};
use crate::DbPool;

/// Column list for `provider_configs` queries.
const COLUMNS: &str = "\
    provider_name, display_name, api_base, api_key, enabled, timeout_seconds, \
    models, created_at, updated_at";

/// Provides CRUD operations for provider configs.
pub struct ProviderConfigRepo;

impl ProviderConfigRepo {
    pub async fn list_all(pool: &DbPool) -> Result<Vec<ProviderConfig>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM provider_configs ORDER BY provider_name");
        sqlx::query_as::<_, ProviderConfig>(&query)
            .fetch_all(pool)
            .await
    }

    /// Configs that are enabled. Credentials are not checked here.
    pub async fn list_enabled(pool: &DbPool) -> Result<Vec<ProviderConfig>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM provider_configs WHERE enabled = 1 ORDER BY provider_name"
        );
        sqlx::query_as::<_, ProviderConfig>(&query)
            .fetch_all(pool)
            .await
    }

    pub async fn find_by_name(
        pool: &DbPool,
        provider_name: &str,
    ) -> Result<Option<ProviderConfig>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM provider_configs WHERE provider_name = ?1");
        sqlx::query_as::<_, ProviderConfig>(&query)
            .bind(provider_name)
            .fetch_optional(pool)
            .await
    }

    /// Insert or replace a config keyed by `provider_name`.
    ///
    /// When `input.models` is `None` an existing model list is kept.
    pub async fn upsert(
        pool: &DbPool,
        input: &UpsertProviderConfig,
    ) -> Result<ProviderConfig, sqlx::Error> {
        let query = format!(
            "INSERT INTO provider_configs \
                (provider_name, display_name, api_base, api_key, enabled, timeout_seconds, \
                 models, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, COALESCE(?7, '[]'), ?8, ?8) \
             ON CONFLICT (provider_name) DO UPDATE SET \
                display_name = excluded.display_name, \
                api_base = excluded.api_base, \
                api_key = excluded.api_key, \
                enabled = excluded.enabled, \
                timeout_seconds = excluded.timeout_seconds, \
                models = COALESCE(?7, provider_configs.models), \
                updated_at = excluded.updated_at \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ProviderConfig>(&query)
            .bind(&input.provider_name)
            .bind(&input.display_name)
            .bind(&input.api_base)
            .bind(&input.api_key)
            .bind(input.enabled)
            .bind(input.timeout_seconds)
            .bind(input.models.as_ref().map(Json))
            .bind(Utc::now())
            .fetch_one(pool)
            .await
    }
}
