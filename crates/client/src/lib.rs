//! Client side of the task progress protocol.
//!
//! [`TaskWatcher`] follows one task over the server-sent event stream and
//! degrades to polling `GET /tasks/{id}` when the stream keeps failing.
//! The transitions live in [`tracker::ProgressTracker`], a pure state
//! machine the watcher drives with I/O and timers.

pub mod error;
pub mod feed;
pub mod recovery;
pub mod snapshot;
pub mod sse;
pub mod tracker;
pub mod watcher;

pub use error::ClientError;
pub use feed::{HttpTaskFeed, PushEvent, PushStream, TaskFeed};
pub use recovery::{recover, ColdStartOutcome, RecoveryPolicy};
pub use snapshot::{ImageSnapshot, TaskSnapshot};
pub use tracker::{ProgressTracker, TrackerConfig, TrackerState, UpdateSource};
pub use watcher::TaskWatcher;
