//! Integration tests for task persistence against an in-memory database.
//!
//! Exercises:
//! - Terminal-state guard on updates
//! - Monotonic, clamped `completed_count`
//! - Cascade delete of image rows
//! - Listing order, keyword filter, and page-size cap
//! - Startup reconciliation of interrupted tasks
//! - Provider config upsert

use assert_matches::assert_matches;
use imagegen_core::task_status::TaskStatus;
use imagegen_db::models::{
    CreateGeneratedImage, CreateTask, ProviderModel, TaskListQuery, TaskUpdate,
    UpsertProviderConfig,
};
use imagegen_db::repositories::{GeneratedImageRepo, ProviderConfigRepo, TaskRepo};
use imagegen_db::{create_memory_pool, SqliteTaskStore, StoreError, TaskStore};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn new_task(id: &str, prompt: &str, total: i64) -> CreateTask {
    CreateTask {
        task_id: id.to_string(),
        prompt: prompt.to_string(),
        provider_name: "openai".to_string(),
        model_id: "gpt-image-1".to_string(),
        total_count: total,
        config_snapshot: serde_json::json!({ "provider": "openai", "count": total }),
    }
}

fn new_image(task_id: &str, n: u32) -> CreateGeneratedImage {
    CreateGeneratedImage {
        task_id: task_id.to_string(),
        file_path: format!("storage/{task_id}_{n}.png"),
        thumbnail_path: format!("storage/thumb_{task_id}_{n}.png"),
        remote_url: None,
        thumbnail_remote_url: None,
        width: 64,
        height: 64,
        file_size: 1024,
        mime_type: "image/png".to_string(),
    }
}

async fn store() -> SqliteTaskStore {
    SqliteTaskStore::new(create_memory_pool().await.unwrap())
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn created_task_is_pending_with_no_images() {
    let store = store().await;
    let created = store.create_task(&new_task("t1", "a cat", 2)).await.unwrap();

    assert_eq!(created.task.status, TaskStatus::Pending);
    assert_eq!(created.task.completed_count, 0);
    assert!(created.images.is_empty());

    let fetched = store.get_task("t1").await.unwrap().unwrap();
    assert_eq!(fetched.task.config_snapshot.0["provider"], "openai");
}

#[tokio::test]
async fn missing_task_is_none() {
    let store = store().await;
    assert!(store.get_task("nope").await.unwrap().is_none());
    assert_matches!(
        store.update_task("nope", &TaskUpdate::status(TaskStatus::Processing)).await,
        Err(StoreError::NotFound(_))
    );
}

#[tokio::test]
async fn terminal_task_rejects_further_updates() {
    let store = store().await;
    store.create_task(&new_task("t1", "a cat", 1)).await.unwrap();
    store
        .update_task("t1", &TaskUpdate::status(TaskStatus::Failed).with_error("boom"))
        .await
        .unwrap();

    let result = store
        .update_task("t1", &TaskUpdate::status(TaskStatus::Processing))
        .await;
    assert_matches!(
        result,
        Err(StoreError::Terminal { status: TaskStatus::Failed, .. })
    );

    let task = store.get_task("t1").await.unwrap().unwrap().task;
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error_message.as_deref(), Some("boom"));
}

#[tokio::test]
async fn status_changes_follow_the_lifecycle() {
    let store = store().await;
    store.create_task(&new_task("t1", "a cat", 1)).await.unwrap();

    assert_matches!(
        store.update_task("t1", &TaskUpdate::status(TaskStatus::Completed)).await,
        Err(StoreError::InvalidTransition { from: TaskStatus::Pending, to: TaskStatus::Completed, .. })
    );
    assert_matches!(
        store.update_task("t1", &TaskUpdate::status(TaskStatus::Partial)).await,
        Err(StoreError::InvalidTransition { from: TaskStatus::Pending, .. })
    );

    store
        .update_task("t1", &TaskUpdate::status(TaskStatus::Processing))
        .await
        .unwrap();
    assert_matches!(
        store.update_task("t1", &TaskUpdate::status(TaskStatus::Pending)).await,
        Err(StoreError::InvalidTransition { from: TaskStatus::Processing, to: TaskStatus::Pending, .. })
    );

    // Rejected updates leave the record untouched.
    let task = store.get_task("t1").await.unwrap().unwrap().task;
    assert_eq!(task.status, TaskStatus::Processing);

    let done = store
        .update_task("t1", &TaskUpdate::status(TaskStatus::Completed))
        .await
        .unwrap();
    assert_eq!(done.task.status, TaskStatus::Completed);
}

#[tokio::test]
async fn completed_count_never_decreases_or_overshoots() {
    let store = store().await;
    store.create_task(&new_task("t1", "a cat", 3)).await.unwrap();

    let after = store.update_task("t1", &TaskUpdate::completed(2)).await.unwrap();
    assert_eq!(after.task.completed_count, 2);

    let after = store.update_task("t1", &TaskUpdate::completed(1)).await.unwrap();
    assert_eq!(after.task.completed_count, 2);

    let after = store.update_task("t1", &TaskUpdate::completed(7)).await.unwrap();
    assert_eq!(after.task.completed_count, 3);
}

#[tokio::test]
async fn clearing_error_overrides_new_message() {
    let store = store().await;
    store.create_task(&new_task("t1", "a cat", 2)).await.unwrap();
    store.update_task("t1", &TaskUpdate::error("first")).await.unwrap();
    let after = store
        .update_task("t1", &TaskUpdate::error("second"))
        .await
        .unwrap();
    assert_eq!(after.task.error_message.as_deref(), Some("second"));

    store
        .update_task("t1", &TaskUpdate::status(TaskStatus::Processing))
        .await
        .unwrap();
    let after = store
        .update_task("t1", &TaskUpdate::status(TaskStatus::Completed).clearing_error())
        .await
        .unwrap();
    assert!(after.task.error_message.is_none());
}

#[tokio::test]
async fn update_returns_images_in_creation_order() {
    let store = store().await;
    store.create_task(&new_task("t1", "a cat", 2)).await.unwrap();
    store.add_image(&new_image("t1", 1)).await.unwrap();
    store.add_image(&new_image("t1", 2)).await.unwrap();

    let after = store.update_task("t1", &TaskUpdate::completed(2)).await.unwrap();
    let paths: Vec<_> = after.images.iter().map(|i| i.file_path.as_str()).collect();
    assert_eq!(paths, ["storage/t1_1.png", "storage/t1_2.png"]);
}

#[tokio::test]
async fn delete_cascades_to_images() {
    let store = store().await;
    store.create_task(&new_task("t1", "a cat", 1)).await.unwrap();
    let image = store.add_image(&new_image("t1", 1)).await.unwrap();

    assert!(store.delete_task("t1").await.unwrap());
    assert!(!store.delete_task("t1").await.unwrap());

    let orphan = GeneratedImageRepo::find_by_id(store.pool(), &image.id)
        .await
        .unwrap();
    assert!(orphan.is_none());
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_orders_active_first_then_newest() {
    let store = store().await;
    store.create_task(&new_task("old", "old done", 1)).await.unwrap();
    store.create_task(&new_task("pend", "waiting", 1)).await.unwrap();
    store.create_task(&new_task("proc", "running", 1)).await.unwrap();
    store.create_task(&new_task("new", "new done", 1)).await.unwrap();

    store
        .update_task("old", &TaskUpdate::status(TaskStatus::Failed))
        .await
        .unwrap();
    store
        .update_task("new", &TaskUpdate::status(TaskStatus::Failed))
        .await
        .unwrap();
    store
        .update_task("proc", &TaskUpdate::status(TaskStatus::Processing))
        .await
        .unwrap();

    let page = TaskRepo::list(store.pool(), &TaskListQuery::default())
        .await
        .unwrap();
    let ids: Vec<_> = page.list.iter().map(|t| t.task_id()).collect();
    assert_eq!(page.total, 4);
    assert_eq!(ids, ["proc", "pend", "new", "old"]);
}

#[tokio::test]
async fn list_filters_by_keyword_and_pages() {
    let store = store().await;
    for i in 0..5 {
        store
            .create_task(&new_task(&format!("cat{i}"), &format!("a cat {i}"), 1))
            .await
            .unwrap();
    }
    store.create_task(&new_task("dog", "a dog", 1)).await.unwrap();

    let query = TaskListQuery {
        page: Some(2),
        page_size: Some(2),
        keyword: Some("cat".into()),
    };
    let page = TaskRepo::list(store.pool(), &query).await.unwrap();
    assert_eq!(page.total, 5);
    assert_eq!(page.list.len(), 2);
    assert!(page.list.iter().all(|t| t.task.prompt.contains("cat")));
}

#[tokio::test]
async fn list_attaches_images() {
    let store = store().await;
    store.create_task(&new_task("t1", "a cat", 2)).await.unwrap();
    store.create_task(&new_task("t2", "a dog", 1)).await.unwrap();
    store.add_image(&new_image("t1", 1)).await.unwrap();
    store.add_image(&new_image("t1", 2)).await.unwrap();

    let page = TaskRepo::list(store.pool(), &TaskListQuery::default())
        .await
        .unwrap();
    let t1 = page.list.iter().find(|t| t.task_id() == "t1").unwrap();
    let t2 = page.list.iter().find(|t| t.task_id() == "t2").unwrap();
    assert_eq!(t1.images.len(), 2);
    assert!(t2.images.is_empty());
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reconcile_finalizes_interrupted_tasks() {
    let store = store().await;
    store.create_task(&new_task("none", "p", 2)).await.unwrap();
    store.create_task(&new_task("some", "p", 2)).await.unwrap();
    store.create_task(&new_task("done", "p", 1)).await.unwrap();

    store
        .update_task("some", &TaskUpdate::status(TaskStatus::Processing))
        .await
        .unwrap();
    store.update_task("some", &TaskUpdate::completed(1)).await.unwrap();
    store
        .update_task("done", &TaskUpdate::status(TaskStatus::Processing))
        .await
        .unwrap();
    store
        .update_task("done", &TaskUpdate::status(TaskStatus::Completed))
        .await
        .unwrap();

    let mut touched = TaskRepo::reconcile_interrupted(store.pool()).await.unwrap();
    touched.sort();
    assert_eq!(touched, ["none", "some"]);

    let none = store.get_task("none").await.unwrap().unwrap().task;
    assert_eq!(none.status, TaskStatus::Failed);
    assert_eq!(
        none.error_message.as_deref(),
        Some("interrupted by service restart")
    );
    let some = store.get_task("some").await.unwrap().unwrap().task;
    assert_eq!(some.status, TaskStatus::Partial);

    assert!(TaskRepo::reconcile_interrupted(store.pool())
        .await
        .unwrap()
        .is_empty());
}

// ---------------------------------------------------------------------------
// Provider configs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn provider_config_upsert_keeps_models_when_omitted() {
    let pool = create_memory_pool().await.unwrap();
    let mut input = UpsertProviderConfig {
        provider_name: "gemini".into(),
        display_name: "Gemini".into(),
        api_base: String::new(),
        api_key: "secret-key-1234".into(),
        enabled: true,
        timeout_seconds: 500,
        models: Some(vec![ProviderModel {
            id: "gemini-2.5-flash-image".into(),
            name: "Flash Image".into(),
            default: true,
        }]),
    };
    let first = ProviderConfigRepo::upsert(&pool, &input).await.unwrap();
    assert_eq!(first.models.len(), 1);

    input.models = None;
    input.enabled = false;
    let second = ProviderConfigRepo::upsert(&pool, &input).await.unwrap();
    assert!(!second.enabled);
    assert_eq!(second.models.len(), 1);
    assert_eq!(second.masked_api_key(), "****1234");

    assert!(ProviderConfigRepo::list_enabled(&pool).await.unwrap().is_empty());
    assert_eq!(ProviderConfigRepo::list_all(&pool).await.unwrap().len(), 1);
}
