//! Golf Coach HTTP REST API
//!
//! Each endpoint has a thin axum handler that delegates to an inner function
//! returning `(StatusCode, serde_json::Value)`. The inner functions are
//! directly testable without going through axum dispatch.
//!
//! Endpoints:
//! - GET    /                               — service banner
//! - GET    /health                         — health check with SQLite status
//! - GET    /api/health/claude-test         — vision API connectivity check
//! - POST   /api/swings/analyze             — multipart upload + analysis
//! - GET    /api/swings/history             — paged history, newest first
//! - GET    /api/swings/:id                 — full swing record
//! - DELETE /api/swings/:id                 — delete a swing
//! - GET    /api/debug/sessions             — recent analyze traces
//! - GET    /api/debug/sessions/:request_id — one trace
//! - GET    /api/debug/health               — trace log status

use std::sync::Arc;

use anyhow::Result;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use golf_coach_core::models::{AnnotationContext, SwingPosition};
use golf_coach_core::vision::VisionBackend;
use golf_coach_core::GolfCoachConfig;
use serde::Deserialize;
use sqlx::SqlitePool;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::subsystems::analyze::{analyze_swing, AnalyzeError, AnalyzeForm, ImageUpload};
use crate::subsystems::swings;
use crate::subsystems::trace::{RequestTrace, TraceLog};

const DEBUG_SESSIONS_DEFAULT: usize = 10;
const DEBUG_SESSIONS_MAX: usize = 50;

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct HttpState {
    pub pool: SqlitePool,
    pub config: GolfCoachConfig,
    /// `None` when no API key is configured; analysis requests then fail.
    pub vision: Option<Arc<dyn VisionBackend>>,
    pub traces: TraceLog,
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    let body_limit = request_body_limit(&state.config);
    let cors = cors_layer(&state.config);

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/api/health/claude-test", get(claude_test_handler))
        .route("/api/swings/analyze", post(analyze_handler))
        .route("/api/swings/history", get(history_handler))
        .route(
            "/api/swings/:id",
            get(get_swing_handler).delete(delete_swing_handler),
        )
        .route("/api/debug/sessions", get(debug_sessions_handler))
        .route("/api/debug/sessions/:request_id", get(debug_session_handler))
        .route("/api/debug/health", get(debug_health_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    pool: SqlitePool,
    config: GolfCoachConfig,
    vision: Option<Arc<dyn VisionBackend>>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", config.http.host, config.http.port);
    let state = Arc::new(HttpState {
        pool,
        config,
        vision,
        traces: TraceLog::default(),
    });

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Golf Coach API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

/// Room for four maximal images plus form overhead.
pub fn request_body_limit(config: &GolfCoachConfig) -> usize {
    (config.images.max_size_bytes() * 4 + 1024 * 1024) as usize
}

fn cors_layer(config: &GolfCoachConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .http
        .cors_origin_list()
        .into_iter()
        .filter_map(|origin| match HeaderValue::from_str(&origin) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
}

// ============================================================================
// Request DTOs and errors
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct DebugQuery {
    pub limit: Option<usize>,
}

/// Error surfaced to HTTP clients as `{"error", "detail", "status": "error"}`.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    PayloadTooLarge(String),
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(m)
            | ApiError::NotFound(m)
            | ApiError::PayloadTooLarge(m)
            | ApiError::Internal(m) => m,
        }
    }

    pub fn into_parts(self) -> (StatusCode, serde_json::Value) {
        (
            self.status_code(),
            serde_json::json!({
                "error": self.message(),
                "detail": self.message(),
                "status": "error",
            }),
        )
    }
}

impl From<AnalyzeError> for ApiError {
    fn from(err: AnalyzeError) -> Self {
        if err.is_client_error() {
            ApiError::BadRequest(err.to_string())
        } else {
            ApiError::Internal(err.to_string())
        }
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {}", err);
        ApiError::Internal(format!("Database error: {}", err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = self.into_parts();
        (status, Json(body)).into_response()
    }
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

/// Service banner (pure, no IO).
pub fn root_inner() -> serde_json::Value {
    serde_json::json!({
        "message": "Golf Coach API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "analyze": "POST /api/swings/analyze",
            "history": "GET /api/swings/history",
            "swing": "GET /api/swings/{id}",
            "delete": "DELETE /api/swings/{id}",
            "health": "GET /health",
            "claude_test": "GET /api/health/claude-test",
            "debug": "GET /api/debug/sessions",
        },
    })
}

/// Inner health check — queries SQLite and returns (status_code, json_body).
pub async fn health_inner(pool: &SqlitePool) -> (StatusCode, serde_json::Value) {
    match golf_coach_core::db::health_check(pool).await {
        Ok(version) => (
            StatusCode::OK,
            serde_json::json!({
                "status": "healthy",
                "version": env!("CARGO_PKG_VERSION"),
                "database": "sqlite",
                "sqlite_version": version,
            }),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({
                "status": "unhealthy",
                "error": e.to_string(),
            }),
        ),
    }
}

/// Round-trip a tiny prompt through the vision backend.
pub async fn claude_test_inner(vision: Option<&dyn VisionBackend>) -> (StatusCode, serde_json::Value) {
    let vision = match vision {
        Some(v) => v,
        None => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({
                    "status": "error",
                    "error": "Vision backend not configured",
                    "detail": format!("Set {} to enable analysis", golf_coach_core::config::API_KEY_ENV),
                }),
            );
        }
    };

    match vision.ping().await {
        Ok(ping) => (
            StatusCode::OK,
            serde_json::json!({
                "status": "success",
                "backend": vision.name(),
                "model": ping.model,
                "latency_ms": ping.latency_ms,
                "reply": ping.reply,
            }),
        ),
        Err(e) => {
            tracing::error!("Vision connectivity test failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({
                    "status": "error",
                    "backend": vision.name(),
                    "error": e.to_string(),
                    "transient": e.is_transient(),
                }),
            )
        }
    }
}

/// Run the analyze pipeline and file its trace in the debug log.
pub async fn analyze_inner(state: &HttpState, form: AnalyzeForm) -> (StatusCode, serde_json::Value) {
    let mut trace = RequestTrace::new();
    let request_id = trace.request_id().to_string();

    let result = analyze_swing(
        &state.pool,
        &state.config,
        state.vision.as_deref(),
        form,
        &mut trace,
    )
    .await;

    state.traces.record(trace.finish(result.is_ok()));

    match result {
        Ok(outcome) => match serde_json::to_value(&outcome) {
            Ok(body) => (StatusCode::OK, body),
            Err(e) => ApiError::Internal(e.to_string()).into_parts(),
        },
        Err(e) => {
            if e.is_client_error() {
                tracing::warn!(request_id = %request_id, "Rejected analyze request: {}", e);
            } else {
                tracing::error!(request_id = %request_id, "Analyze request failed: {}", e);
            }
            ApiError::from(e).into_parts()
        }
    }
}

/// Inner history — paged list of lightweight items plus total row count.
pub async fn history_inner(
    pool: &SqlitePool,
    config: &GolfCoachConfig,
    query: HistoryQuery,
) -> (StatusCode, serde_json::Value) {
    let max_limit = config.history.max_limit.max(1) as i64;
    let limit = query
        .limit
        .unwrap_or(config.history.default_limit as i64)
        .clamp(1, max_limit);
    let offset = query.offset.unwrap_or(0).max(0);

    let rows = match swings::list_swings(pool, limit, offset).await {
        Ok(r) => r,
        Err(e) => return ApiError::from(e).into_parts(),
    };
    let total = match swings::count_swings(pool).await {
        Ok(t) => t,
        Err(e) => return ApiError::from(e).into_parts(),
    };

    let items: Vec<_> = rows
        .iter()
        .map(|s| swings::to_history_item(s, config.images.thumbnail_size))
        .collect();

    (
        StatusCode::OK,
        serde_json::json!({
            "total": total,
            "swings": items,
        }),
    )
}

pub async fn get_swing_inner(pool: &SqlitePool, id: i64) -> (StatusCode, serde_json::Value) {
    match swings::get_swing(pool, id).await {
        Ok(Some(swing)) => match serde_json::to_value(&swing) {
            Ok(body) => (StatusCode::OK, body),
            Err(e) => ApiError::Internal(e.to_string()).into_parts(),
        },
        Ok(None) => swing_not_found(id),
        Err(e) => ApiError::from(e).into_parts(),
    }
}

pub async fn delete_swing_inner(pool: &SqlitePool, id: i64) -> (StatusCode, serde_json::Value) {
    match swings::delete_swing(pool, id).await {
        Ok(true) => {
            tracing::info!(swing_id = id, "Deleted swing");
            (
                StatusCode::OK,
                serde_json::json!({
                    "message": "Swing deleted successfully",
                    "id": id,
                }),
            )
        }
        Ok(false) => swing_not_found(id),
        Err(e) => ApiError::from(e).into_parts(),
    }
}

/// Most recent traces first; `limit` defaults to 10 and is capped at 50.
pub fn debug_sessions_inner(traces: &TraceLog, query: DebugQuery) -> (StatusCode, serde_json::Value) {
    let limit = query
        .limit
        .unwrap_or(DEBUG_SESSIONS_DEFAULT)
        .clamp(1, DEBUG_SESSIONS_MAX);
    let sessions = traces.recent(limit);

    (
        StatusCode::OK,
        serde_json::json!({
            "total": traces.len(),
            "count": sessions.len(),
            "sessions": sessions,
        }),
    )
}

pub fn debug_session_inner(traces: &TraceLog, request_id: &str) -> (StatusCode, serde_json::Value) {
    match traces.get(request_id) {
        Some(session) => (StatusCode::OK, serde_json::json!(session)),
        None => ApiError::NotFound(format!("Debug session {} not found", request_id)).into_parts(),
    }
}

pub fn debug_health_inner(traces: &TraceLog) -> serde_json::Value {
    let last = traces.recent(1).into_iter().next();
    serde_json::json!({
        "status": "healthy",
        "sessions_recorded": traces.len(),
        "capacity": traces.capacity(),
        "last_request_id": last.as_ref().map(|s| s.metadata.request_id.clone()),
        "last_status": last.as_ref().map(|s| s.metadata.status),
    })
}

// ============================================================================
// Multipart parsing
// ============================================================================

/// Read the analyze form: image parts keyed by position name, optional
/// annotation text parts. Empty file parts are treated as absent.
pub async fn parse_analyze_form(mut multipart: Multipart) -> Result<AnalyzeForm, ApiError> {
    let mut form = AnalyzeForm::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();

        if let Ok(position) = name.parse::<SwingPosition>() {
            let content_type = field.content_type().map(str::to_string);
            let bytes = field.bytes().await.map_err(multipart_error)?;
            if bytes.is_empty() {
                continue;
            }
            if form.uploads.iter().any(|u| u.position == position) {
                return Err(ApiError::BadRequest(format!(
                    "Duplicate image for position {}",
                    position
                )));
            }
            form.uploads.push(ImageUpload {
                position,
                content_type,
                bytes,
            });
            continue;
        }

        let slot = match annotation_slot(&mut form.annotations, &name) {
            Some(slot) => slot,
            None => {
                tracing::warn!(field = %name, "Ignoring unknown form field");
                continue;
            }
        };
        let text = field.text().await.map_err(multipart_error)?;
        let text = text.trim();
        *slot = (!text.is_empty()).then(|| text.to_string());
    }

    Ok(form)
}

fn annotation_slot<'a>(annotations: &'a mut AnnotationContext, name: &str) -> Option<&'a mut Option<String>> {
    match name {
        "club" => Some(&mut annotations.club),
        "shot_outcome" => Some(&mut annotations.shot_outcome),
        "focus_area" => Some(&mut annotations.focus_area),
        "notes" => Some(&mut annotations.notes),
        _ => None,
    }
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> ApiError {
    let status = err.status();
    let message = err.body_text();
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(message)
    } else {
        ApiError::BadRequest(message)
    }
}

fn swing_not_found(id: i64) -> (StatusCode, serde_json::Value) {
    ApiError::NotFound(format!("Swing analysis with id {} not found", id)).into_parts()
}

// ============================================================================
// Axum handler wrappers (thin — delegate to inner functions)
// ============================================================================

pub async fn root_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(root_inner()))
}

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state.pool).await;
    (status, Json(body))
}

pub async fn claude_test_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = claude_test_inner(state.vision.as_deref()).await;
    (status, Json(body))
}

pub async fn analyze_handler(
    State(state): State<Arc<HttpState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let multipart = match multipart {
        Ok(m) => m,
        Err(rejection) => return ApiError::BadRequest(rejection.body_text()).into_response(),
    };
    let form = match parse_analyze_form(multipart).await {
        Ok(f) => f,
        Err(e) => return e.into_response(),
    };
    let (status, body) = analyze_inner(&state, form).await;
    (status, Json(body)).into_response()
}

pub async fn history_handler(
    State(state): State<Arc<HttpState>>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(q) => q,
        Err(rejection) => return ApiError::from(rejection).into_response(),
    };
    let (status, body) = history_inner(&state.pool, &state.config, query).await;
    (status, Json(body)).into_response()
}

pub async fn get_swing_handler(
    State(state): State<Arc<HttpState>>,
    id: Result<Path<i64>, PathRejection>,
) -> Response {
    let Path(id) = match id {
        Ok(p) => p,
        Err(rejection) => return ApiError::from(rejection).into_response(),
    };
    let (status, body) = get_swing_inner(&state.pool, id).await;
    (status, Json(body)).into_response()
}

pub async fn delete_swing_handler(
    State(state): State<Arc<HttpState>>,
    id: Result<Path<i64>, PathRejection>,
) -> Response {
    let Path(id) = match id {
        Ok(p) => p,
        Err(rejection) => return ApiError::from(rejection).into_response(),
    };
    let (status, body) = delete_swing_inner(&state.pool, id).await;
    (status, Json(body)).into_response()
}

pub async fn debug_sessions_handler(
    State(state): State<Arc<HttpState>>,
    query: Result<Query<DebugQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(q) => q,
        Err(rejection) => return ApiError::from(rejection).into_response(),
    };
    let (status, body) = debug_sessions_inner(&state.traces, query);
    (status, Json(body)).into_response()
}

pub async fn debug_session_handler(
    State(state): State<Arc<HttpState>>,
    Path(request_id): Path<String>,
) -> impl IntoResponse {
    let (status, body) = debug_session_inner(&state.traces, &request_id);
    (status, Json(body))
}

pub async fn debug_health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    (StatusCode::OK, Json(debug_health_inner(&state.traces)))
}

// ============================================================================
// Unit Tests — call inner functions directly
// ============================================================================
