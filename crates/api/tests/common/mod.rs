#![allow(dead_code)]

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use image::{DynamicImage, Rgba, RgbaImage};
use tokio::sync::{mpsc, Mutex, Notify};
use tower::ServiceExt;

use imagegen_api::config::ServerConfig;
use imagegen_api::router::build_app_router;
use imagegen_api::state::AppState;
use imagegen_core::generation::GenerationParams;
use imagegen_providers::{ImageProvider, ProviderError, ProviderHub, ProviderRegistry};
use imagegen_storage::ArtifactStore;

// ---------------------------------------------------------------------------
// Fake providers
// ---------------------------------------------------------------------------

/// A small solid PNG.
pub fn png_bytes() -> Vec<u8> {
    let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(20, 10, Rgba([200, 30, 30, 255])));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

/// Always answers with the same PNG.
pub struct StaticProvider;

#[async_trait]
impl ImageProvider for StaticProvider {
    fn name(&self) -> &str {
        "fake"
    }

    fn default_model(&self) -> &str {
        "fake-model"
    }

    async fn generate(&self, _params: &GenerationParams) -> Result<Vec<Vec<u8>>, ProviderError> {
        Ok(vec![png_bytes()])
    }
}

/// Reports each call on `started`, then waits until released.
pub struct GatedProvider {
    started: mpsc::UnboundedSender<()>,
    release: Arc<Notify>,
}

#[async_trait]
impl ImageProvider for GatedProvider {
    fn name(&self) -> &str {
        "gated"
    }

    fn default_model(&self) -> &str {
        "gated-model"
    }

    async fn generate(&self, _params: &GenerationParams) -> Result<Vec<Vec<u8>>, ProviderError> {
        let _ = self.started.send(());
        self.release.notified().await;
        Ok(vec![png_bytes()])
    }
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    /// Calls entering the gated provider.
    pub gate_started: Mutex<mpsc::UnboundedReceiver<()>>,
    /// Lets one gated call finish per `notify_one`.
    pub gate_release: Arc<Notify>,
    pub storage: tempfile::TempDir,
}

/// Test configuration: one worker and a queue of one, so capacity is easy
/// to exhaust.
pub fn test_config(storage: &std::path::Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:1420".to_string()],
        request_timeout_secs: 30,
        database_url: "sqlite::memory:".to_string(),
        storage_dir: storage.to_path_buf(),
        worker_count: 1,
        queue_capacity: 1,
        shutdown_timeout_secs: 1,
        stream_heartbeat_secs: 1,
        s3: None,
    }
}

/// Build the full application over an in-memory database with the
/// `fake` and `gated` providers registered.
pub async fn build_test_app() -> TestApp {
    let storage = tempfile::tempdir().unwrap();
    let pool = imagegen_db::create_memory_pool().await.unwrap();

    let (started_tx, started_rx) = mpsc::unbounded_channel();
    let release = Arc::new(Notify::new());
    let registry = ProviderRegistry::builder()
        .with_provider(Arc::new(StaticProvider), Duration::from_secs(10))
        .with_provider(
            Arc::new(GatedProvider {
                started: started_tx,
                release: Arc::clone(&release),
            }),
            Duration::from_secs(30),
        )
        .build();

    let state = AppState::start(
        pool,
        test_config(storage.path()),
        Arc::new(ProviderHub::new(registry)),
        Arc::new(ArtifactStore::local_only(storage.path())),
    );

    TestApp {
        router: build_app_router(state.clone()),
        state,
        gate_started: Mutex::new(started_rx),
        gate_release: release,
        storage,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn delete(&self, uri: &str) -> Response<Body> {
        self.send(
            Request::builder()
                .method(Method::DELETE)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn post_json(&self, uri: &str, body: serde_json::Value) -> Response<Body> {
        self.send(
            Request::builder()
                .method(Method::POST)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    /// Submit a task and return its id.
    pub async fn generate(&self, provider: &str, prompt: &str, count: u32) -> String {
        let response = self
            .post_json(
                "/api/v1/tasks/generate",
                serde_json::json!({
                    "provider": provider,
                    "params": { "prompt": prompt, "count": count }
                }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let json = body_json(response).await;
        json["data"]["task_id"].as_str().unwrap().to_string()
    }

    /// Wait for the gated provider to be entered once.
    pub async fn gate_entered(&self) {
        tokio::time::timeout(Duration::from_secs(5), self.gate_started.lock().await.recv())
            .await
            .expect("gated provider was never called");
    }

    /// Poll `GET /tasks/{id}` until the task is terminal.
    pub async fn wait_terminal(&self, task_id: &str) -> serde_json::Value {
        let uri = format!("/api/v1/tasks/{task_id}");
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let json = body_json(self.get(&uri).await).await;
                let status = json["data"]["status"].as_str().unwrap_or_default().to_string();
                if matches!(status.as_str(), "completed" | "failed" | "partial") {
                    return json["data"].clone();
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("task did not finish")
    }
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
