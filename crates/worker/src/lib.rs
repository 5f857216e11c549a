//! Task execution: a bounded queue feeding a fixed set of workers that
//! drive each task from `pending` to a terminal status.
//!
//! - [`WorkerPool`] owns the queue, the workers, and shutdown.
//! - [`execute::execute_task`] is the per-task batch loop.
//! - [`recovery`] finalizes tasks a previous process left running.

pub mod error;
pub mod execute;
pub mod pool;
pub mod recovery;

pub use error::PoolError;
pub use pool::{PoolConfig, TaskJob, WorkerContext, WorkerPool};
