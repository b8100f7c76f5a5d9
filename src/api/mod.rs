//! REST API for submitting crawl jobs and reading their results
//!
//! | Method | Path | Purpose |
//! |---|---|---|
//! | POST | `/start_crawl` | submit a job |
//! | GET | `/task_status/{task_id}` | job snapshot |
//! | GET | `/is_running` | whether the slot is taken |
//! | GET | `/platforms` | supported platform codes |
//! | GET | `/data/{platform}` | stored results, paginated |
//! | GET | `/data/{platform}/{post_id}` | one stored result |
//! | GET | `/stats/{platform}` | post and comment totals |
//! | GET | `/health`, `/`, `/metrics` | service info |

pub mod server;

use axum::{
    extract::{MatchedPath, Path, Query, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorCategory, OrchestratorErrorTrait};
use crate::metrics;
use crate::models::{CrawlResult, Platform};
use crate::orchestrator::{CrawlRequest, Job, JobStatus, OrchestratorError};
use crate::storage::StorageError;

pub use server::{ApiServer, AppState, ServerError};

/// Default page size for `/data/{platform}`
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Largest page `/data/{platform}` returns
pub const MAX_PAGE_SIZE: usize = 1000;

// ============================================================================
// API Response Types
// ============================================================================

/// Error body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_task: Option<TaskStatusView>,
}

/// Error returned by handlers
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    current_task: Option<TaskStatusView>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            current_task: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// Slot taken; the body carries the running job when known
    pub fn conflict(message: impl Into<String>, current_task: Option<TaskStatusView>) -> Self {
        Self {
            status: StatusCode::LOCKED,
            message: message.into(),
            current_task,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        let status = match (&err, err.category()) {
            (OrchestratorError::Interrupted, _) => StatusCode::SERVICE_UNAVAILABLE,
            (_, ErrorCategory::Conflict) => StatusCode::LOCKED,
            (_, ErrorCategory::Validation) => StatusCode::BAD_REQUEST,
            (_, ErrorCategory::NotFound) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        tracing::error!(error = %err, "Result store request failed");
        let status = if err.is_recoverable() {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self::new(status, format!("Failed to read results: {err}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            success: false,
            error: self.message,
            current_task: self.current_task,
        };
        (self.status, Json(body)).into_response()
    }
}

/// External view of a job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskStatusView {
    pub task_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_name: Option<String>,
    pub status: JobStatus,
    pub platforms: Vec<Platform>,
    pub current_round: Option<usize>,
    pub current_platform: Option<Platform>,
    pub total_rounds: usize,
    pub progress: f64,
    pub error_message: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl From<&Job> for TaskStatusView {
    fn from(job: &Job) -> Self {
        Self {
            task_id: job.id.clone(),
            task_name: job.name.clone(),
            status: job.status,
            platforms: job.platforms.clone(),
            current_round: job.current_round,
            current_platform: job.current_platform,
            total_rounds: job.total_rounds(),
            progress: job.progress,
            error_message: job.error_message.clone(),
            start_time: job.started_at,
            end_time: job.finished_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StartCrawlResponse {
    pub task_id: String,
    pub status: String,
    pub message: String,
    pub platforms: Vec<Platform>,
    pub total_rounds: usize,
}

#[derive(Debug, Serialize)]
pub struct IsRunningResponse {
    pub is_running: bool,
    pub current_task: Option<TaskStatusView>,
}

#[derive(Debug, Serialize)]
pub struct PlatformInfo {
    pub code: &'static str,
    pub name: &'static str,
}

#[derive(Debug, Serialize)]
pub struct PlatformsResponse {
    pub platforms: Vec<PlatformInfo>,
}

#[derive(Debug, Serialize)]
pub struct DataResponse {
    pub platform: Platform,
    pub count: usize,
    pub data: Vec<CrawlResult>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub platform: Platform,
    pub total_posts: u64,
    pub total_comments: u64,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub is_running: bool,
}

#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub service: String,
    pub version: String,
    pub endpoints: Vec<&'static str>,
}

/// Pagination for `/data/{platform}`
#[derive(Debug, Deserialize)]
pub struct DataQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub skip: usize,
}

fn default_limit() -> usize {
    DEFAULT_PAGE_SIZE
}

const ENDPOINTS: &[&str] = &[
    "POST /start_crawl",
    "GET /task_status/{task_id}",
    "GET /is_running",
    "GET /platforms",
    "GET /data/{platform}",
    "GET /data/{platform}/{post_id}",
    "GET /stats/{platform}",
    "GET /health",
    "GET /metrics",
];

// ============================================================================
// API Routes
// ============================================================================

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(service_info))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_text))
        // Jobs
        .route("/start_crawl", post(start_crawl))
        .route("/task_status/{task_id}", get(task_status))
        .route("/is_running", get(is_running))
        // Results
        .route("/platforms", get(list_platforms))
        .route("/data/{platform}", get(get_data))
        .route("/data/{platform}/{post_id}", get(get_post))
        .route("/stats/{platform}", get(get_stats))
        .route_layer(middleware::from_fn(track_requests))
        .with_state(state)
}

async fn track_requests(request: Request, next: Next) -> Response {
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;
    metrics::record_api_request(&endpoint, response.status().as_u16());
    response
}

fn parse_platform(code: &str) -> Result<Platform, ApiError> {
    code.parse::<Platform>().map_err(ApiError::bad_request)
}

// ============================================================================
// Service Handlers
// ============================================================================

async fn service_info() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        service: "crawl-orchestrator".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        endpoints: ENDPOINTS.to_vec(),
    })
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        is_running: state.orchestrator.is_running(),
    })
}

async fn metrics_text() -> Result<Response, ApiError> {
    let body = metrics::encode_metrics().map_err(|e| {
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {e}"),
        )
    })?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response())
}

// ============================================================================
// Job Handlers
// ============================================================================

async fn start_crawl(
    State(state): State<AppState>,
    Json(request): Json<CrawlRequest>,
) -> Result<Json<StartCrawlResponse>, ApiError> {
    match state.orchestrator.submit(request).await {
        Ok(receipt) => Ok(Json(StartCrawlResponse {
            message: format!(
                "Crawl task started for {} platform(s) over {} round(s)",
                receipt.platforms.len(),
                receipt.total_rounds
            ),
            task_id: receipt.task_id,
            status: "started".to_string(),
            platforms: receipt.platforms,
            total_rounds: receipt.total_rounds,
        })),
        Err(err @ OrchestratorError::AdmissionConflict { .. }) => {
            let current = state.orchestrator.current_task().await;
            Err(ApiError::conflict(
                err.to_string(),
                current.as_ref().map(TaskStatusView::from),
            ))
        }
        Err(err) => Err(err.into()),
    }
}

async fn task_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskStatusView>, ApiError> {
    let job = state.orchestrator.status(&task_id).await?;
    Ok(Json(TaskStatusView::from(&job)))
}

async fn is_running(State(state): State<AppState>) -> Json<IsRunningResponse> {
    // Both fields come from one read so they never disagree.
    let current_task = state.orchestrator.current_task().await;
    Json(IsRunningResponse {
        is_running: current_task.is_some(),
        current_task: current_task.as_ref().map(TaskStatusView::from),
    })
}

// ============================================================================
// Result Handlers
// ============================================================================

async fn list_platforms() -> Json<PlatformsResponse> {
    Json(PlatformsResponse {
        platforms: Platform::all()
            .into_iter()
            .map(|p| PlatformInfo {
                code: p.code(),
                name: p.display_name(),
            })
            .collect(),
    })
}

async fn get_data(
    State(state): State<AppState>,
    Path(platform): Path<String>,
    Query(query): Query<DataQuery>,
) -> Result<Json<DataResponse>, ApiError> {
    let platform = parse_platform(&platform)?;
    let limit = query.limit.min(MAX_PAGE_SIZE);
    let data = state.store.query(platform, limit, query.skip).await?;

    Ok(Json(DataResponse {
        platform,
        count: data.len(),
        data,
    }))
}

async fn get_post(
    State(state): State<AppState>,
    Path((platform, post_id)): Path<(String, String)>,
) -> Result<Json<CrawlResult>, ApiError> {
    let platform = parse_platform(&platform)?;
    state
        .store
        .get(platform, &post_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Post {post_id} not found on {platform}")))
}

async fn get_stats(
    State(state): State<AppState>,
    Path(platform): Path<String>,
) -> Result<Json<StatsResponse>, ApiError> {
    let platform = parse_platform(&platform)?;
    let stats = state.store.count_stats(platform).await?;

    Ok(Json(StatsResponse {
        platform,
        total_posts: stats.total_posts,
        total_comments: stats.total_comments,
    }))
}

// ============================================================================
// Tests
// ============================================================================
