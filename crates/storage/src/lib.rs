//! Artifact Store: persists generated images with a derived thumbnail on
//! the local filesystem and, optionally, an S3-compatible mirror.
//!
//! - [`ArtifactStore`] is the entry point used by the worker pool and the
//!   HTTP layer.
//! - [`LocalTarget`] is the authoritative copy.
//! - [`RemoteTarget`] / [`S3Target`] is a best-effort mirror.

pub mod artifact;
pub mod error;
pub mod local;
pub mod remote;
pub mod thumbnail;

pub use artifact::{ArtifactStore, SavedArtifact};
pub use imagegen_core::image_format::MAX_IMAGE_BYTES;
pub use error::StorageError;
pub use local::{sanitize_file_name, LocalTarget};
pub use remote::{RemoteTarget, S3Config, S3Target};
