//! Domain model structs and DTOs.
//!
//! Each submodule contains a `FromRow` + `Serialize` entity struct
//! matching the table row, plus the create/update DTOs repositories take.

pub mod generated_image;
pub mod provider_config;
pub mod task;

pub use generated_image::{CreateGeneratedImage, GeneratedImage};
pub use provider_config::{ProviderConfig, ProviderModel, UpsertProviderConfig};
pub use task::{CreateTask, Task, TaskListQuery, TaskPage, TaskUpdate, TaskWithImages};
