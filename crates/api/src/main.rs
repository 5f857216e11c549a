use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use imagegen_api::config::ServerConfig;
use imagegen_api::router::build_app_router;
use imagegen_api::state::AppState;
use imagegen_providers::ProviderHub;
use imagegen_storage::{ArtifactStore, LocalTarget, RemoteTarget, S3Target};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "imagegen_api=debug,imagegen_worker=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env().expect("Invalid configuration");
    tracing::info!(
        host = %config.host,
        port = config.port,
        workers = config.worker_count,
        queue_capacity = config.queue_capacity,
        "Loaded server configuration",
    );

    // --- Database ---
    let pool = imagegen_db::create_pool(&config.database_url)
        .await
        .expect("Failed to open database");
    tracing::info!("Database connection pool created");

    imagegen_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // Nothing is queued yet, so every unfinished task belongs to a
    // previous process.
    imagegen_worker::recovery::reconcile_interrupted(&pool)
        .await
        .expect("Failed to reconcile interrupted tasks");

    // --- Providers ---
    let providers = Arc::new(
        ProviderHub::load(&pool)
            .await
            .expect("Failed to load provider configs"),
    );

    // --- Artifact storage ---
    let remote: Option<Arc<dyn RemoteTarget>> = config.s3.clone().map(|s3| {
        tracing::info!(bucket = %s3.bucket, region = %s3.region, "Remote mirror enabled");
        Arc::new(S3Target::new(s3)) as Arc<dyn RemoteTarget>
    });
    let artifacts = Arc::new(ArtifactStore::new(
        LocalTarget::new(config.storage_dir.clone()),
        remote,
    ));
    tracing::info!(root = %config.storage_dir.display(), "Artifact store ready");

    // --- App state (starts the worker pool) ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    let state = AppState::start(pool, config, providers, artifacts);

    // --- Start server ---
    let app = build_app_router(state.clone());
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    // Progress streams only end on a terminal record or a closed channel,
    // so channels are closed as soon as the signal arrives.
    let events = Arc::clone(&state.events);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            events.close_all().await;
        })
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, draining workers");
    state.shutdown().await;
    state.pool.close().await;
    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
