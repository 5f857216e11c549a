//! Shared domain types, validation, and pure helpers for the image
//! generation service.
//!
//! Nothing in this crate performs I/O. The storage, worker, and API
//! crates all build on the definitions here.

pub mod error;
pub mod generation;
pub mod image_format;
pub mod provider_policy;
pub mod snapshot;
pub mod task_status;
pub mod types;
