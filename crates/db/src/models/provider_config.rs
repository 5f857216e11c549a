//! Provider credentials and call policy.

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use imagegen_core::types::Timestamp;

/// One model offered by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderModel {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub default: bool,
}

/// A row from the `provider_configs` table.
///
/// Read at dispatch time; changes apply to tasks dispatched afterwards.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ProviderConfig {
    pub provider_name: String,
    pub display_name: String,
    pub api_base: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub enabled: bool,
    pub timeout_seconds: i64,
    pub models: Json<Vec<ProviderModel>>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl ProviderConfig {
    /// The model marked default, falling back to the first listed model.
    pub fn default_model(&self) -> Option<&ProviderModel> {
        self.models
            .iter()
            .find(|m| m.default)
            .or_else(|| self.models.first())
    }

    /// `true` when an API key is present.
    pub fn has_credentials(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// API key with all but the last four characters hidden, for listings.
    pub fn masked_api_key(&self) -> String {
        let key = self.api_key.trim();
        let visible: String = key
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        if key.chars().count() <= 4 {
            "*".repeat(key.chars().count())
        } else {
            format!("****{visible}")
        }
    }
}

/// DTO for creating or replacing a provider config.
#[derive(Debug, Clone)]
pub struct UpsertProviderConfig {
    pub provider_name: String,
    pub display_name: String,
    pub api_base: String,
    pub api_key: String,
    pub enabled: bool,
    pub timeout_seconds: i64,
    /// `None` keeps the stored model list on update.
    pub models: Option<Vec<ProviderModel>>,
}
