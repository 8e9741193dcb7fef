//! HTTP surface.
//!
//! | Method | Path                               | Operation            |
//! |--------|------------------------------------|----------------------|
//! | POST   | `/create-archive`                  | snapshot a URL       |
//! | GET    | `/archive-metadata/:archive_id`    | metadata lookup      |
//! | POST   | `/batch-archive`                   | queue many URLs      |
//! | GET    | `/health`                          | liveness + settings  |
//!
//! Every route but `/health` counts against the caller's rate-limit window
//! before its body is read.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, Path, Query, Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use agentic_archive::{ArchiveError, ArchiveService, ExtractedRecord};

use crate::error::ApiError;

/// Largest batch accepted by `/batch-archive`.
pub const MAX_BATCH_SIZE: usize = 100;

/// Shared state handed to every handler.
pub struct AppState {
    pub service: ArchiveService,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(service: ArchiveService) -> Self {
        Self {
            service,
            started_at: Instant::now(),
        }
    }
}

/// Build the axum Router with all endpoints.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/create-archive", post(create_archive))
        .route("/archive-metadata/:archive_id", get(archive_metadata))
        .route("/batch-archive", post(batch_archive))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve until the listener fails.
pub async fn serve(addr: &str, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("HTTP server listening on http://{}", listener.local_addr()?);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

/// A record as served, with display fields alongside the raw ones.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordView<'a> {
    #[serde(flatten)]
    pub record: &'a ExtractedRecord,
    pub archive_date: Option<String>,
    pub content_date: Option<String>,
    pub is_source_url: bool,
}

impl<'a> From<&'a ExtractedRecord> for RecordView<'a> {
    fn from(record: &'a ExtractedRecord) -> Self {
        Self {
            record,
            archive_date: record.archive_date(),
            content_date: record.content_date(),
            is_source_url: record.is_source_url(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateArchiveBody {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct BatchArchiveBody {
    pub urls: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MetadataQuery {
    #[serde(default)]
    pub refresh: bool,
}

fn client_id(info: Option<ConnectInfo<SocketAddr>>) -> String {
    info.map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Admission check. /health is routed outside this layer.
async fn rate_limit(
    State(state): State<Arc<AppState>>,
    info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    state.service.admit(&client_id(info))?;
    Ok(next.run(request).await)
}

fn body_error(rejection: JsonRejection) -> ApiError {
    ApiError(ArchiveError::Validation(rejection.body_text()))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let config = state.service.config();
    let status = state.service.status();
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptimeSecs": state.started_at.elapsed().as_secs(),
        "cache": {
            "ttlSecs": config.cache.ttl_secs,
            "maxEntries": config.cache.max_entries,
            "entries": status.cached_records,
        },
        "rateLimit": {
            "windowSecs": config.rate_limit.window_secs,
            "maxRequests": config.rate_limit.max_requests,
            "trackedClients": status.tracked_clients,
        },
        "worker": {
            "concurrency": status.concurrency,
            "inFlight": status.in_flight,
        },
    }))
}

async fn create_archive(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CreateArchiveBody>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = body.map_err(body_error)?;
    let created = state.service.create_archive(&body.url).await?;

    Ok(Json(serde_json::json!({
        "status": "success",
        "archiveId": created.archive_id,
        "archiveUrl": created.archive_url,
        "originalUrl": created.record.original_url,
        "submittedUrl": created.submitted_url,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "metadata": RecordView::from(&created.record),
    })))
}

async fn archive_metadata(
    State(state): State<Arc<AppState>>,
    Path(archive_id): Path<String>,
    Query(query): Query<MetadataQuery>,
) -> Result<Json<Value>, ApiError> {
    let record = state
        .service
        .archive_metadata(&archive_id, query.refresh)
        .await?;
    Ok(Json(serde_json::json!(RecordView::from(&record))))
}

async fn batch_archive(
    State(state): State<Arc<AppState>>,
    body: Result<Json<BatchArchiveBody>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = body.map_err(body_error)?;
    if body.urls.is_empty() {
        return Err(ApiError(ArchiveError::Validation("urls must not be empty".into())));
    }
    if body.urls.len() > MAX_BATCH_SIZE {
        return Err(ApiError(ArchiveError::Validation(format!(
            "at most {MAX_BATCH_SIZE} urls per batch, got {}",
            body.urls.len()
        ))));
    }

    let items = state.service.submit_batch(&body.urls);
    Ok(Json(serde_json::json!({
        "status": "accepted",
        "items": items,
    })))
}
