//! Integration tests for the worker pool: batch semantics, admission
//! control, fault isolation, and progress publishing.

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use image::{DynamicImage, Rgba, RgbaImage};
use imagegen_core::generation::GenerationParams;
use imagegen_core::task_status::TaskStatus;
use imagegen_db::models::{CreateTask, TaskWithImages};
use imagegen_db::{create_memory_pool, SqliteTaskStore, TaskStore};
use imagegen_events::TaskEventHub;
use imagegen_providers::{ImageProvider, ProviderError, ProviderHub, ProviderRegistry};
use imagegen_storage::ArtifactStore;
use imagegen_worker::pool::PANIC_MESSAGE;
use imagegen_worker::recovery::reconcile_interrupted;
use imagegen_worker::{PoolConfig, PoolError, TaskJob, WorkerContext, WorkerPool};
use tokio::sync::{mpsc, Notify};

// ---------------------------------------------------------------------------
// Fake provider
// ---------------------------------------------------------------------------

enum Step {
    Image,
    Fail(&'static str),
    Panic,
    Sleep(Duration),
    /// Report the call on `started`, then wait for `release`.
    Block {
        started: mpsc::UnboundedSender<()>,
        release: Arc<Notify>,
    },
}

struct ScriptedProvider {
    name: &'static str,
    steps: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    fn new(name: &'static str, steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            name,
            steps: Mutex::new(steps.into()),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn png() -> Vec<u8> {
    let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(12, 8, Rgba([0, 128, 255, 255])));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

#[async_trait]
impl ImageProvider for ScriptedProvider {
    fn name(&self) -> &str {
        self.name
    }

    fn default_model(&self) -> &str {
        "scripted-1"
    }

    async fn generate(&self, _params: &GenerationParams) -> Result<Vec<Vec<u8>>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.steps.lock().unwrap().pop_front().unwrap_or(Step::Image);
        match step {
            Step::Image => Ok(vec![png()]),
            Step::Fail(msg) => Err(ProviderError::Api {
                status: 500,
                body: msg.to_string(),
            }),
            Step::Panic => panic!("provider exploded"),
            Step::Sleep(d) => {
                tokio::time::sleep(d).await;
                Ok(vec![png()])
            }
            Step::Block { started, release } => {
                let _ = started.send(());
                release.notified().await;
                Ok(vec![png()])
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    store: Arc<SqliteTaskStore>,
    events: Arc<TaskEventHub>,
    pool: WorkerPool,
    _dir: tempfile::TempDir,
}

async fn harness(provider: Arc<ScriptedProvider>, timeout: Duration, config: PoolConfig) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteTaskStore::new(create_memory_pool().await.unwrap()));
    let events = Arc::new(TaskEventHub::default());
    let registry = ProviderRegistry::builder()
        .with_provider(provider, timeout)
        .build();
    let ctx = WorkerContext {
        store: store.clone(),
        providers: Arc::new(ProviderHub::new(registry)),
        artifacts: Arc::new(ArtifactStore::local_only(dir.path())),
        events: events.clone(),
    };
    Harness {
        store,
        events,
        pool: WorkerPool::start(config, ctx),
        _dir: dir,
    }
}

fn small_pool() -> PoolConfig {
    PoolConfig {
        workers: 2,
        queue_capacity: 8,
        shutdown_grace: Duration::from_secs(5),
    }
}

impl Harness {
    async fn submit(&self, task_id: &str, provider: &str, count: u32) -> Result<(), PoolError> {
        self.store
            .create_task(&CreateTask {
                task_id: task_id.to_string(),
                prompt: "a red bicycle".to_string(),
                provider_name: provider.to_string(),
                model_id: "scripted-1".to_string(),
                total_count: i64::from(count),
                config_snapshot: serde_json::json!({ "provider": provider, "count": count }),
            })
            .await
            .unwrap();
        self.pool.submit(TaskJob {
            task_id: task_id.to_string(),
            provider_name: provider.to_string(),
            params: GenerationParams {
                prompt: "a red bicycle".to_string(),
                model_id: "scripted-1".to_string(),
                count,
                ..Default::default()
            },
        })
    }

    async fn wait_terminal(&self, task_id: &str) -> TaskWithImages {
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let record = self.store.get_task(task_id).await.unwrap().unwrap();
                if record.is_terminal() {
                    return record;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("task did not reach a terminal status")
    }
}

// ---------------------------------------------------------------------------
// Batch semantics
// ---------------------------------------------------------------------------

#[tokio::test]
async fn all_images_succeed_is_completed() {
    let provider = ScriptedProvider::new("fake", vec![]);
    let h = harness(provider.clone(), Duration::from_secs(5), small_pool()).await;

    h.submit("t1", "fake", 3).await.unwrap();
    let record = h.wait_terminal("t1").await;

    assert_eq!(record.task.status, TaskStatus::Completed);
    assert_eq!(record.task.completed_count, 3);
    assert!(record.task.error_message.is_none());
    assert_eq!(record.images.len(), 3);
    assert_eq!(provider.calls(), 3);
    for image in &record.images {
        assert_eq!((image.width, image.height), (12, 8));
        assert_eq!(image.mime_type, "image/png");
        assert!(!image.thumbnail_path.is_empty());
    }
}

#[tokio::test]
async fn middle_failure_is_partial_and_batch_continues() {
    let provider = ScriptedProvider::new("fake", vec![Step::Image, Step::Fail("upstream 500"), Step::Image]);
    let h = harness(provider.clone(), Duration::from_secs(5), small_pool()).await;

    h.submit("t1", "fake", 3).await.unwrap();
    let record = h.wait_terminal("t1").await;

    assert_eq!(record.task.status, TaskStatus::Partial);
    assert_eq!(record.task.completed_count, 2);
    assert_eq!(record.images.len(), 2);
    assert_eq!(provider.calls(), 3);
    let message = record.task.error_message.unwrap();
    assert!(message.contains("upstream 500"), "{message}");
}

#[tokio::test]
async fn last_error_wins() {
    let provider = ScriptedProvider::new("fake", vec![Step::Fail("first"), Step::Image, Step::Fail("second")]);
    let h = harness(provider, Duration::from_secs(5), small_pool()).await;

    h.submit("t1", "fake", 3).await.unwrap();
    let record = h.wait_terminal("t1").await;

    assert_eq!(record.task.status, TaskStatus::Partial);
    let message = record.task.error_message.unwrap();
    assert!(message.contains("second"), "{message}");
}

#[tokio::test]
async fn every_attempt_failing_is_failed() {
    let provider = ScriptedProvider::new("fake", vec![Step::Fail("a"), Step::Fail("b")]);
    let h = harness(provider.clone(), Duration::from_secs(5), small_pool()).await;

    h.submit("t1", "fake", 2).await.unwrap();
    let record = h.wait_terminal("t1").await;

    assert_eq!(record.task.status, TaskStatus::Failed);
    assert_eq!(record.task.completed_count, 0);
    assert!(record.images.is_empty());
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn timeout_counts_as_one_failed_image() {
    let provider = ScriptedProvider::new("fake", vec![Step::Sleep(Duration::from_secs(5)), Step::Image]);
    let h = harness(provider, Duration::from_millis(100), small_pool()).await;

    h.submit("t1", "fake", 2).await.unwrap();
    let record = h.wait_terminal("t1").await;

    assert_eq!(record.task.status, TaskStatus::Partial);
    assert_eq!(record.task.completed_count, 1);
    assert!(record.task.error_message.unwrap().contains("timed out"));
}

#[tokio::test]
async fn unknown_provider_fails_without_attempts() {
    let provider = ScriptedProvider::new("fake", vec![]);
    let h = harness(provider.clone(), Duration::from_secs(5), small_pool()).await;

    h.submit("t1", "missing", 2).await.unwrap();
    let record = h.wait_terminal("t1").await;

    assert_eq!(record.task.status, TaskStatus::Failed);
    assert!(record.task.error_message.unwrap().contains("missing"));
    assert_eq!(provider.calls(), 0);
}

// ---------------------------------------------------------------------------
// Fault isolation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn panic_fails_only_that_task() {
    let provider = ScriptedProvider::new("fake", vec![Step::Panic]);
    let h = harness(
        provider,
        Duration::from_secs(5),
        PoolConfig {
            workers: 1,
            ..small_pool()
        },
    )
    .await;

    h.submit("boom", "fake", 1).await.unwrap();
    let crashed = h.wait_terminal("boom").await;
    assert_eq!(crashed.task.status, TaskStatus::Failed);
    assert_eq!(crashed.task.error_message.as_deref(), Some(PANIC_MESSAGE));

    // The single worker survived and keeps serving.
    h.submit("after", "fake", 1).await.unwrap();
    let next = h.wait_terminal("after").await;
    assert_eq!(next.task.status, TaskStatus::Completed);
}

// ---------------------------------------------------------------------------
// Admission control
// ---------------------------------------------------------------------------

#[tokio::test]
async fn full_queue_rejects_without_blocking() {
    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    let release = Arc::new(Notify::new());
    let provider = ScriptedProvider::new(
        "fake",
        vec![Step::Block {
            started: started_tx,
            release: release.clone(),
        }],
    );
    let h = harness(
        provider,
        Duration::from_secs(30),
        PoolConfig {
            workers: 1,
            queue_capacity: 1,
            shutdown_grace: Duration::from_secs(5),
        },
    )
    .await;

    h.submit("running", "fake", 1).await.unwrap();
    started_rx.recv().await.unwrap();

    h.submit("queued", "fake", 1).await.unwrap();
    assert_eq!(h.pool.queued(), 1);
    assert_matches!(
        h.submit("rejected", "fake", 1).await,
        Err(PoolError::QueueFull { capacity: 1 })
    );

    // Rejection leaves the record untouched; the caller owns marking it.
    let rejected = h.store.get_task("rejected").await.unwrap().unwrap();
    assert_eq!(rejected.task.status, TaskStatus::Pending);

    release.notify_one();
    assert_eq!(h.wait_terminal("running").await.task.status, TaskStatus::Completed);
    assert_eq!(h.wait_terminal("queued").await.task.status, TaskStatus::Completed);
}

#[tokio::test]
async fn submit_after_shutdown_is_closed() {
    let provider = ScriptedProvider::new("fake", vec![]);
    let h = harness(provider, Duration::from_secs(5), small_pool()).await;

    h.pool.shutdown().await;
    assert_matches!(h.submit("late", "fake", 1).await, Err(PoolError::Closed));
}

#[tokio::test]
async fn shutdown_abandons_tasks_past_grace() {
    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    let provider = ScriptedProvider::new(
        "fake",
        vec![Step::Block {
            started: started_tx,
            release: Arc::new(Notify::new()),
        }],
    );
    let h = harness(
        provider,
        Duration::from_secs(30),
        PoolConfig {
            workers: 1,
            queue_capacity: 4,
            shutdown_grace: Duration::from_millis(100),
        },
    )
    .await;

    h.submit("stuck", "fake", 1).await.unwrap();
    started_rx.recv().await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), h.pool.shutdown())
        .await
        .expect("shutdown must respect the grace period");

    let stuck = h.store.get_task("stuck").await.unwrap().unwrap();
    assert_eq!(stuck.task.status, TaskStatus::Processing);

    // The next process finalizes what was left behind.
    let touched = reconcile_interrupted(h.store.pool()).await.unwrap();
    assert_eq!(touched, vec!["stuck".to_string()]);
    let stuck = h.store.get_task("stuck").await.unwrap().unwrap();
    assert_eq!(stuck.task.status, TaskStatus::Failed);
    assert!(stuck.task.error_message.is_some());
}

// ---------------------------------------------------------------------------
// Progress publishing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn subscribers_see_monotonic_progress_ending_terminal() {
    let provider = ScriptedProvider::new("fake", vec![Step::Image, Step::Fail("x"), Step::Image]);
    let h = harness(provider, Duration::from_secs(5), small_pool()).await;

    let mut rx = h.events.subscribe("t1").await;
    h.submit("t1", "fake", 3).await.unwrap();

    let mut seen = Vec::new();
    while let Ok(record) = rx.recv().await {
        seen.push((record.task.status, record.task.completed_count));
    }

    assert_eq!(seen.first().map(|s| s.0), Some(TaskStatus::Processing));
    assert_eq!(seen.last(), Some(&(TaskStatus::Partial, 2)));
    assert!(seen.windows(2).all(|w| w[0].1 <= w[1].1));
    assert_eq!(seen.iter().filter(|s| s.0.is_terminal()).count(), 1);
}
