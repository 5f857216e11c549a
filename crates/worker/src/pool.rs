//! Bounded-queue worker pool.
//!
//! `submit` never blocks: a job either enters the queue or is refused.
//! `N` long-lived workers share the receiving end and run one task at a
//! time each. A panic inside a task is caught and turned into that task's
//! `failed` status; the worker carries on.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use imagegen_core::generation::GenerationParams;
use imagegen_core::task_status::TaskStatus;
use imagegen_db::models::TaskUpdate;
use imagegen_db::TaskStore;
use imagegen_events::TaskEventHub;
use imagegen_providers::ProviderHub;
use imagegen_storage::ArtifactStore;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::PoolError;
use crate::execute::{execute_task, finish};

/// Message stored on a task whose execution panicked.
pub const PANIC_MESSAGE: &str = "Internal error while generating images";

/// Sizing and shutdown policy.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of concurrent workers.
    pub workers: usize,
    /// Jobs that may wait in the queue.
    pub queue_capacity: usize,
    /// How long `shutdown` waits for in-flight tasks before abandoning them.
    pub shutdown_grace: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            queue_capacity: 100,
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

/// Shared collaborators every worker needs.
#[derive(Clone)]
pub struct WorkerContext {
    pub store: Arc<dyn TaskStore>,
    pub providers: Arc<ProviderHub>,
    pub artifacts: Arc<ArtifactStore>,
    pub events: Arc<TaskEventHub>,
}

/// One unit of queued work. The task row already exists as `pending`.
#[derive(Debug, Clone)]
pub struct TaskJob {
    pub task_id: String,
    pub provider_name: String,
    /// Parameters with the model already resolved.
    pub params: GenerationParams,
}

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::Receiver<TaskJob>>>;

pub struct WorkerPool {
    sender: Mutex<Option<mpsc::Sender<TaskJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    cancel: CancellationToken,
    config: PoolConfig,
}

impl WorkerPool {
    /// Spawn the workers and return the running pool.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn start(config: PoolConfig, ctx: WorkerContext) -> Self {
        let config = PoolConfig {
            workers: config.workers.max(1),
            queue_capacity: config.queue_capacity.max(1),
            ..config
        };
        let (sender, receiver) = mpsc::channel(config.queue_capacity);
        let receiver: SharedReceiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let cancel = CancellationToken::new();

        let workers = (0..config.workers)
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    ctx.clone(),
                    receiver.clone(),
                    cancel.clone(),
                ))
            })
            .collect();

        tracing::info!(
            workers = config.workers,
            queue_capacity = config.queue_capacity,
            "Worker pool started",
        );

        Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            cancel,
            config,
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Enqueue `job` without waiting.
    ///
    /// On [`PoolError::QueueFull`] nothing about the task has been touched;
    /// the caller decides how to record the rejection.
    pub fn submit(&self, job: TaskJob) -> Result<(), PoolError> {
        let guard = match self.sender.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let Some(sender) = guard.as_ref() else {
            return Err(PoolError::Closed);
        };
        match sender.try_send(job) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(job)) => {
                tracing::warn!(task_id = %job.task_id, "Task queue full, rejecting");
                Err(PoolError::QueueFull {
                    capacity: self.config.queue_capacity,
                })
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(PoolError::Closed),
        }
    }

    /// Jobs currently waiting in the queue.
    pub fn queued(&self) -> usize {
        let guard = match self.sender.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard
            .as_ref()
            .map(|s| s.max_capacity() - s.capacity())
            .unwrap_or(0)
    }

    /// Stop accepting work and wait for in-flight tasks.
    ///
    /// Workers stop taking jobs off the queue immediately. Tasks already
    /// running get up to `shutdown_grace` to finish; after that they are
    /// aborted and left for startup reconciliation, as are jobs still
    /// queued.
    pub async fn shutdown(&self) {
        match self.sender.lock() {
            Ok(mut guard) => drop(guard.take()),
            Err(poisoned) => drop(poisoned.into_inner().take()),
        }
        self.cancel.cancel();

        let handles = match self.workers.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();

        match tokio::time::timeout(
            self.config.shutdown_grace,
            futures::future::join_all(handles),
        )
        .await
        {
            Ok(_) => tracing::info!("Worker pool stopped"),
            Err(_) => {
                tracing::warn!(
                    grace_secs = self.config.shutdown_grace.as_secs(),
                    "Worker pool grace period elapsed, abandoning in-flight tasks",
                );
                for abort in aborts {
                    abort.abort();
                }
            }
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    ctx: WorkerContext,
    receiver: SharedReceiver,
    cancel: CancellationToken,
) {
    tracing::debug!(worker_id, "Worker started");
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            job = async { receiver.lock().await.recv().await } => job,
        };
        let Some(job) = next else {
            break;
        };

        let task_id = job.task_id.clone();
        tracing::info!(worker_id, task_id = %task_id, provider = %job.provider_name, "Task dequeued");

        match AssertUnwindSafe(execute_task(&ctx, job)).catch_unwind().await {
            Ok(Ok(status)) => {
                tracing::info!(worker_id, task_id = %task_id, status = %status, "Task finished");
            }
            Ok(Err(e)) => {
                tracing::error!(worker_id, task_id = %task_id, error = %e, "Task execution failed");
                finish(
                    &ctx,
                    &task_id,
                    TaskUpdate::status(TaskStatus::Failed).with_error(e.to_string()),
                )
                .await;
            }
            Err(_) => {
                tracing::error!(worker_id, task_id = %task_id, "Task execution panicked");
                finish(
                    &ctx,
                    &task_id,
                    TaskUpdate::status(TaskStatus::Failed).with_error(PANIC_MESSAGE),
                )
                .await;
            }
        }
    }
    tracing::debug!(worker_id, "Worker stopped");
}
