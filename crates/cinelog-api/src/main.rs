//! cinelog-api - HTTP API server and worker host for the cinelog catalog.

mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cinelog_core::defaults::JOB_MAX_RETRIES;
use cinelog_core::{AppConfig, BlobStore, StorageProvider};
use cinelog_db::Database;
use cinelog_inference::{MetadataBackend, OpenAiMetadataBackend, TranscriptionBackend, WhisperBackend};
use cinelog_jobs::{
    DuplicateDetector, FolderSynchronizer, JobWorker, PipelineHandler, ScanHandler, WorkerConfig,
};
use cinelog_provider::{BucketClient, DropboxClient};

use handlers::{
    create_job, create_source, delete_source, get_job, get_source, health_check, job_stats,
    list_sources, scan, scan_start, scan_stream,
};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub synchronizer: Arc<FolderSynchronizer>,
    /// Retry budget stamped onto jobs queued through the API.
    pub job_max_retries: i32,
}

fn init_tracing() {
    // LOG_FORMAT: "json" or "text" (default). RUST_LOG: standard filter.
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "cinelog_api=debug,cinelog_jobs=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(env_filter);
    if log_format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;

    info!("Connecting to database...");
    let db = Database::connect(&config.database_url).await?;
    info!("Running database migrations...");
    db.migrate().await?;
    cinelog_db::log_pool_metrics(&db.pool);
    info!("Database ready");

    let job_max_retries: i32 = std::env::var("JOB_MAX_RETRIES")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(JOB_MAX_RETRIES);

    let provider: Arc<dyn StorageProvider> = Arc::new(DropboxClient::from_config(&config.provider));
    let synchronizer = Arc::new(
        FolderSynchronizer::from_database(&db, provider.clone()).with_max_retries(job_max_retries),
    );

    // Optional stages: each backend that is not configured makes the
    // corresponding pipeline stage a soft skip.
    let blob: Option<Arc<dyn BlobStore>> = config
        .blob
        .as_ref()
        .map(|cfg| Arc::new(BucketClient::from_config(cfg)) as Arc<dyn BlobStore>);
    let transcription: Option<Arc<dyn TranscriptionBackend>> = config
        .whisper
        .as_ref()
        .map(|cfg| Arc::new(WhisperBackend::from_config(cfg)) as Arc<dyn TranscriptionBackend>);
    let metadata: Option<Arc<dyn MetadataBackend>> = config
        .llm
        .as_ref()
        .map(|cfg| Arc::new(OpenAiMetadataBackend::from_config(cfg)) as Arc<dyn MetadataBackend>);
    info!(
        keyframes = blob.is_some(),
        transcription = transcription.is_some(),
        metadata = metadata.is_some(),
        "Pipeline stages configured"
    );

    let worker_config = WorkerConfig::from_env();
    let worker_handle = if worker_config.enabled {
        let detector = Arc::new(DuplicateDetector::from_database(&db));
        let videos = Arc::new(db.videos.clone());

        let worker = JobWorker::new(Arc::new(db.jobs.clone()), worker_config);
        for job_type in [cinelog_core::JobType::Ingest, cinelog_core::JobType::Process] {
            let mut handler = PipelineHandler::new(
                job_type,
                videos.clone(),
                provider.clone(),
                detector.clone(),
            );
            if let Some(blob) = &blob {
                handler = handler.with_blob_store(blob.clone());
            }
            if let Some(backend) = &transcription {
                handler = handler.with_transcription(backend.clone());
            }
            if let Some(backend) = &metadata {
                handler = handler.with_metadata(backend.clone());
            }
            worker.register_handler(Arc::new(handler)).await;
        }
        worker
            .register_handler(Arc::new(ScanHandler::new(synchronizer.clone())))
            .await;

        let handle = worker.start();
        info!("Job worker started");
        Some(handle)
    } else {
        info!("Job worker disabled");
        None
    };

    let state = AppState {
        db,
        synchronizer,
        job_max_retries,
    };

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/api/scan", post(scan))
        .route("/api/scan/stream", post(scan_stream))
        .route("/api/scan/start", post(scan_start))
        .route("/api/jobs", post(create_job))
        .route("/api/jobs/stats", get(job_stats))
        .route("/api/jobs/:id", get(get_job))
        .route("/api/sources", get(list_sources).post(create_source))
        .route("/api/sources/:id", get(get_source).delete(delete_source))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = worker_handle {
        info!("Stopping job worker...");
        handle.shutdown().await;
    }

    Ok(())
}

async fn shutdown_signal() {
    // Proceeding without the handler would make shutdown silent SIGKILL-only.
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install shutdown signal handler");
    }
    info!("Shutdown signal received");
}
