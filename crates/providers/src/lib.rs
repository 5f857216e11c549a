//! Image generation providers.
//!
//! Every backend implements the [`ImageProvider`] capability. The worker
//! pool resolves providers by name through a [`ProviderHub`], which hands
//! out immutable [`ProviderRegistry`] snapshots built from the
//! `provider_configs` table.

pub mod capability;
pub mod error;
pub mod gemini;
pub mod openai;
pub mod registry;

pub use capability::ImageProvider;
pub use error::ProviderError;
pub use gemini::GeminiImageProvider;
pub use openai::OpenAiImageProvider;
pub use registry::{resolve_model_id, ProviderHub, ProviderRegistry, ResolvedProvider};
