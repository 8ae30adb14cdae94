//! HTTP handlers for the cinelog API.

use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tracing::info;
use uuid::Uuid;

use cinelog_core::{
    normalize_path, JobRepository, JobType, Source, SourceRepository, VideoRepository,
};
use cinelog_jobs::ScanEvent;

use crate::AppState;

// =============================================================================
// ERROR HANDLING
// =============================================================================

#[derive(Debug)]
pub enum ApiError {
    Internal(cinelog_core::Error),
    NotFound(String),
    BadRequest(String),
    Conflict(String),
}

impl From<cinelog_core::Error> for ApiError {
    fn from(err: cinelog_core::Error) -> Self {
        match &err {
            cinelog_core::Error::NotFound(msg) => ApiError::NotFound(msg.clone()),
            cinelog_core::Error::VideoNotFound(_) | cinelog_core::Error::JobNotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            cinelog_core::Error::InvalidInput(msg) => ApiError::BadRequest(msg.clone()),
            cinelog_core::Error::Database(sqlx_err) => {
                let msg = sqlx_err.to_string();
                if msg.contains("duplicate key") || msg.contains("unique constraint") {
                    return ApiError::Conflict(msg);
                }
                ApiError::Internal(err)
            }
            _ => ApiError::Internal(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::Internal(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
        };

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}

// =============================================================================
// HEALTH
// =============================================================================

pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "cinelog-api",
    }))
}

// =============================================================================
// SCANNING
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct ScanRequest {
    /// Folder paths to scan; empty means every registered source.
    #[serde(default)]
    pub paths: Vec<String>,
}

/// Resolve a scan request body to concrete sources.
async fn resolve_scan_sources(state: &AppState, paths: &[String]) -> Result<Vec<Source>, ApiError> {
    if paths.is_empty() {
        let sources = state.db.sources.list().await?;
        if sources.is_empty() {
            return Err(ApiError::NotFound("no folders registered to scan".into()));
        }
        return Ok(sources);
    }

    let (matched, unmatched) = state.synchronizer.resolve_paths(paths).await?;
    if matched.is_empty() {
        return Err(ApiError::NotFound(format!(
            "no matching folders: {}",
            unmatched.join(", ")
        )));
    }
    Ok(matched)
}

/// Synchronous scan: list the folders, catalog discoveries, respond when done.
pub async fn scan(
    State(state): State<AppState>,
    body: Option<Json<ScanRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let sources = resolve_scan_sources(&state, &request.paths).await?;

    let summary = state.synchronizer.scan_sources(&sources, |_| {}).await;

    Ok(Json(serde_json::json!({
        "message": format!("scanned {} folder(s)", summary.folders),
        "folders": summary.folders,
        "added": summary.added,
        "failed": summary.failed,
    })))
}

/// Streaming scan: same logic as [`scan`], progress delivered as SSE events.
pub async fn scan_stream(
    State(state): State<AppState>,
    body: Option<Json<ScanRequest>>,
) -> Result<Sse<impl futures::Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let sources = resolve_scan_sources(&state, &request.paths).await?;

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<ScanEvent>();
    let synchronizer = state.synchronizer.clone();
    tokio::spawn(async move {
        synchronizer
            .scan_sources(&sources, |event| {
                let _ = tx.send(event);
            })
            .await;
    });

    let stream = UnboundedReceiverStream::new(rx).filter_map(|event| {
        serde_json::to_string(&event)
            .ok()
            .map(|json| Ok(Event::default().data(json)))
    });

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(std::time::Duration::from_secs(15))
            .text("keepalive"),
    ))
}

#[derive(Debug, Deserialize)]
pub struct ScanStartRequest {
    pub paths: Vec<String>,
}

/// Queue a scan as a background job and return immediately.
pub async fn scan_start(
    State(state): State<AppState>,
    Json(request): Json<ScanStartRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if request.paths.is_empty() || request.paths.iter().any(|p| p.trim().is_empty()) {
        return Err(ApiError::BadRequest(
            "paths must be a non-empty list of folder paths".into(),
        ));
    }

    let job_id = state
        .db
        .jobs
        .enqueue(
            None,
            JobType::Scan,
            Some(serde_json::json!({ "paths": request.paths })),
            state.job_max_retries,
        )
        .await?;

    info!(
        subsystem = "api",
        op = "scan_start",
        job_id = %job_id,
        "Queued scan job"
    );
    Ok((StatusCode::ACCEPTED, Json(serde_json::json!({ "job_id": job_id }))))
}

// =============================================================================
// JOBS
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub video_id: Option<Uuid>,
    pub payload: Option<JsonValue>,
}

/// Queue a job. Publishing types live in the schema for external tooling
/// and are rejected here; the worker has no handler for them.
pub async fn create_job(
    State(state): State<AppState>,
    Json(request): Json<CreateJobRequest>,
) -> Result<impl IntoResponse, ApiError> {
    match request.job_type {
        JobType::PublishYoutube | JobType::PublishVimeo => {
            return Err(ApiError::BadRequest(format!(
                "job type {} cannot be queued through this endpoint",
                request.job_type
            )));
        }
        JobType::Ingest | JobType::Process => {
            let Some(video_id) = request.video_id else {
                return Err(ApiError::BadRequest(format!(
                    "job type {} requires a video_id",
                    request.job_type
                )));
            };
            if state.db.videos.get(video_id).await?.is_none() {
                return Err(ApiError::NotFound(format!("video not found: {video_id}")));
            }
        }
        JobType::Scan => {
            let has_paths = request
                .payload
                .as_ref()
                .and_then(|p| p.get("paths"))
                .and_then(|p| p.as_array())
                .map(|paths| !paths.is_empty())
                .unwrap_or(false);
            if !has_paths {
                return Err(ApiError::BadRequest(
                    "scan jobs require a payload with a non-empty paths list".into(),
                ));
            }
        }
    }

    let job_id = state
        .db
        .jobs
        .enqueue(
            request.video_id,
            request.job_type,
            request.payload,
            state.job_max_retries,
        )
        .await?;

    info!(
        subsystem = "api",
        op = "create_job",
        job_id = %job_id,
        job_type = %request.job_type,
        "Queued job"
    );
    Ok((StatusCode::ACCEPTED, Json(serde_json::json!({ "job_id": job_id }))))
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state
        .db
        .jobs
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("job not found: {id}")))?;
    Ok(Json(job))
}

pub async fn job_stats(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let stats = state.db.jobs.queue_stats().await?;
    Ok(Json(stats))
}

// =============================================================================
// SOURCES
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateSourceRequest {
    pub path: String,
    /// Provider-side folder id; defaults to the normalized path.
    pub provider_folder_id: Option<String>,
}

pub async fn list_sources(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let sources = state.db.sources.list().await?;
    Ok(Json(sources))
}

pub async fn create_source(
    State(state): State<AppState>,
    Json(request): Json<CreateSourceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if request.path.trim().is_empty() {
        return Err(ApiError::BadRequest("path must not be empty".into()));
    }

    let path = normalize_path(&request.path);
    if state.db.sources.find_by_path(&path).await?.is_some() {
        return Err(ApiError::Conflict(format!(
            "folder already registered: {path}"
        )));
    }

    let provider_folder_id = request.provider_folder_id.unwrap_or_else(|| path.clone());
    let source = state.db.sources.create(&provider_folder_id, &path).await?;

    info!(
        subsystem = "api",
        op = "create_source",
        source_id = %source.id,
        folder = %source.path,
        "Registered watched folder"
    );
    Ok((StatusCode::CREATED, Json(source)))
}

pub async fn get_source(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let source = state
        .db
        .sources
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("source not found: {id}")))?;
    Ok(Json(source))
}

pub async fn delete_source(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.db.sources.delete(id).await? {
        return Err(ApiError::NotFound(format!("source not found: {id}")));
    }
    Ok(Json(serde_json::json!({ "deleted": true })))
}
