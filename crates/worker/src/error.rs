/// Why [`WorkerPool::submit`](crate::WorkerPool::submit) refused a job.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// The bounded queue has no spare capacity.
    #[error("Task queue is full ({capacity} pending)")]
    QueueFull { capacity: usize },

    /// The pool is shutting down and accepts no new work.
    #[error("Worker pool is shut down")]
    Closed,
}
