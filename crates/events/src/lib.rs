//! Live task progress delivery.
//!
//! - [`TaskEventHub`] fans out task-record updates per task id over
//!   `tokio::sync::broadcast` channels.
//! - [`task_progress_stream`] turns one subscription into an ordered,
//!   de-duplicated stream of frames with periodic heartbeats, ending after
//!   the terminal record.

pub mod hub;
pub mod stream;

pub use hub::TaskEventHub;
pub use stream::{task_progress_stream, ProgressFrame};
