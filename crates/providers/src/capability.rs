//! The capability every image backend exposes.

use async_trait::async_trait;
use imagegen_core::generation::{validate_params, GenerationParams};

use crate::error::ProviderError;

/// One image generation backend.
///
/// `generate` makes a single provider call. The worker pool owns retries,
/// batching, and deadlines.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Registry name, e.g. `"openai"`.
    fn name(&self) -> &str;

    /// Model used when neither the request nor the config names one.
    fn default_model(&self) -> &str;

    /// Reject requests this provider cannot serve.
    ///
    /// The default applies the provider-independent checks only.
    fn validate(&self, params: &GenerationParams) -> Result<(), ProviderError> {
        validate_params(params)?;
        Ok(())
    }

    /// Produce images for `params`. An empty result is an error.
    async fn generate(&self, params: &GenerationParams) -> Result<Vec<Vec<u8>>, ProviderError>;
}
