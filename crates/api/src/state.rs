use std::sync::Arc;

use imagegen_db::{DbPool, SqliteTaskStore, TaskStore};
use imagegen_events::TaskEventHub;
use imagegen_providers::ProviderHub;
use imagegen_storage::ArtifactStore;
use imagegen_worker::{WorkerContext, WorkerPool};

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheap to clone; everything is behind an `Arc` or already `Clone`.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: DbPool,
    pub config: Arc<ServerConfig>,
    /// Task records as seen by the worker pool and progress streams.
    pub store: Arc<dyn TaskStore>,
    /// Current provider registry; swapped on config changes.
    pub providers: Arc<ProviderHub>,
    pub artifacts: Arc<ArtifactStore>,
    /// Per-task progress channels.
    pub events: Arc<TaskEventHub>,
    pub workers: Arc<WorkerPool>,
}

impl AppState {
    /// Wire the task store and event hub to a freshly started worker pool.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn start(
        pool: DbPool,
        config: ServerConfig,
        providers: Arc<ProviderHub>,
        artifacts: Arc<ArtifactStore>,
    ) -> Self {
        let store: Arc<dyn TaskStore> = Arc::new(SqliteTaskStore::new(pool.clone()));
        let events = Arc::new(TaskEventHub::default());
        let workers = Arc::new(WorkerPool::start(
            config.pool_config(),
            WorkerContext {
                store: Arc::clone(&store),
                providers: Arc::clone(&providers),
                artifacts: Arc::clone(&artifacts),
                events: Arc::clone(&events),
            },
        ));

        Self {
            pool,
            config: Arc::new(config),
            store,
            providers,
            artifacts,
            events,
            workers,
        }
    }

    /// Stop the worker pool and close every open progress channel.
    pub async fn shutdown(&self) {
        self.workers.shutdown().await;
        self.events.close_all().await;
    }
}
