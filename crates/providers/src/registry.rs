//! Name -> provider mapping and the hub that swaps it on reload.
//!
//! A [`ProviderRegistry`] never changes after construction. Reloading
//! builds a new one and swaps the `Arc` inside [`ProviderHub`]; work that
//! already resolved a provider keeps using the snapshot it got.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use imagegen_core::provider_policy::effective_timeout_secs;
use imagegen_db::models::ProviderConfig;
use imagegen_db::repositories::ProviderConfigRepo;
use imagegen_db::DbPool;

use crate::capability::ImageProvider;
use crate::error::ProviderError;
use crate::gemini::GeminiImageProvider;
use crate::openai::OpenAiImageProvider;

/// A provider ready for dispatch, with its call policy.
#[derive(Clone)]
pub struct ResolvedProvider {
    pub provider: Arc<dyn ImageProvider>,
    /// Deadline for a single `generate` call.
    pub timeout: Duration,
    /// Config the provider was built from; `None` for hand-registered ones.
    pub config: Option<ProviderConfig>,
}

impl std::fmt::Debug for ResolvedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedProvider")
            .field("provider", &self.provider.name())
            .field("timeout", &self.timeout)
            .field("config", &self.config)
            .finish()
    }
}

impl ResolvedProvider {
    /// Model to use for a request that asked for `requested`.
    pub fn model_for(&self, requested: Option<&str>) -> String {
        resolve_model_id(requested, self.config.as_ref(), self.provider.as_ref())
    }
}

/// Model resolution order: explicit request, the config's default model,
/// the config's first model, the provider's built-in default.
pub fn resolve_model_id(
    requested: Option<&str>,
    config: Option<&ProviderConfig>,
    provider: &dyn ImageProvider,
) -> String {
    requested
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .or_else(|| {
            config
                .and_then(|c| c.default_model())
                .map(|m| m.id.clone())
                .filter(|id| !id.is_empty())
        })
        .unwrap_or_else(|| provider.default_model().to_string())
}

/// Immutable snapshot of the available providers.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, ResolvedProvider>,
}

impl ProviderRegistry {
    pub fn builder() -> ProviderRegistryBuilder {
        ProviderRegistryBuilder::default()
    }

    /// Build a registry from stored configs.
    ///
    /// Disabled configs and configs without an API key are skipped.
    /// `gemini` maps to the Gemini API; every other name is treated as an
    /// OpenAI-compatible endpoint.
    pub fn from_configs(client: &reqwest::Client, configs: Vec<ProviderConfig>) -> Self {
        let mut builder = Self::builder();
        for config in configs {
            if !config.enabled {
                tracing::debug!(provider = %config.provider_name, "Skipping disabled provider");
                continue;
            }
            if !config.has_credentials() {
                tracing::warn!(provider = %config.provider_name, "Skipping provider without API key");
                continue;
            }
            let provider: Arc<dyn ImageProvider> = match config.provider_name.as_str() {
                "gemini" => Arc::new(GeminiImageProvider::new(
                    client.clone(),
                    config.provider_name.clone(),
                    &config.api_base,
                    config.api_key.clone(),
                )),
                _ => Arc::new(OpenAiImageProvider::new(
                    client.clone(),
                    config.provider_name.clone(),
                    &config.api_base,
                    config.api_key.clone(),
                )),
            };
            let timeout = Duration::from_secs(effective_timeout_secs(
                &config.provider_name,
                Some(config.timeout_seconds),
            ));
            builder = builder.insert(ResolvedProvider {
                provider,
                timeout,
                config: Some(config),
            });
        }
        builder.build()
    }

    /// Look up `name`, failing with [`ProviderError::NotConfigured`].
    pub fn resolve(&self, name: &str) -> Result<ResolvedProvider, ProviderError> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| ProviderError::NotConfigured(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// Builder for hand-assembled registries (tests, embedding).
#[derive(Default)]
pub struct ProviderRegistryBuilder {
    providers: HashMap<String, ResolvedProvider>,
}

impl ProviderRegistryBuilder {
    pub fn insert(mut self, resolved: ResolvedProvider) -> Self {
        self.providers
            .insert(resolved.provider.name().to_string(), resolved);
        self
    }

    /// Register `provider` with the given call timeout and no config.
    pub fn with_provider(self, provider: Arc<dyn ImageProvider>, timeout: Duration) -> Self {
        self.insert(ResolvedProvider {
            provider,
            timeout,
            config: None,
        })
    }

    pub fn build(self) -> ProviderRegistry {
        ProviderRegistry {
            providers: self.providers,
        }
    }
}

/// Shared handle to the current registry snapshot.
pub struct ProviderHub {
    current: RwLock<Arc<ProviderRegistry>>,
    client: reqwest::Client,
}

impl ProviderHub {
    pub fn new(registry: ProviderRegistry) -> Self {
        Self {
            current: RwLock::new(Arc::new(registry)),
            client: reqwest::Client::new(),
        }
    }

    /// Build the initial registry from the database.
    pub async fn load(pool: &DbPool) -> Result<Self, sqlx::Error> {
        let hub = Self::new(ProviderRegistry::default());
        hub.reload(pool).await?;
        Ok(hub)
    }

    /// The registry as of now.
    pub fn snapshot(&self) -> Arc<ProviderRegistry> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Install `registry` for all subsequent resolutions.
    pub fn replace(&self, registry: ProviderRegistry) {
        let next = Arc::new(registry);
        match self.current.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    /// Rebuild from the `provider_configs` table and swap it in.
    pub async fn reload(&self, pool: &DbPool) -> Result<usize, sqlx::Error> {
        let configs = ProviderConfigRepo::list_enabled(pool).await?;
        let registry = ProviderRegistry::from_configs(&self.client, configs);
        let count = registry.len();
        self.replace(registry);
        tracing::info!(providers = count, "Provider registry reloaded");
        Ok(count)
    }

    pub fn resolve(&self, name: &str) -> Result<ResolvedProvider, ProviderError> {
        self.snapshot().resolve(name)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
