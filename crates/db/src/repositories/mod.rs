//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async CRUD methods
//! that accept `&DbPool` as the first argument.

pub mod generated_image_repo;
pub mod provider_config_repo;
pub mod task_repo;

pub use generated_image_repo::GeneratedImageRepo;
pub use provider_config_repo::ProviderConfigRepo;
pub use task_repo::TaskRepo;
