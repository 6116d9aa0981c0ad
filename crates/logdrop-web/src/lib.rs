//! logdrop HTTP endpoints
//!
//! `POST /api/v1/messages` turns one form-encoded message into one cache
//! entry. The read side counts or returns aggregated log lines.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use logdrop_core::{
    decode_form, Error, IngestPolicy, PipelinePaths, ReceivedAt, COUNTS_ROUTE, FORM_CONTENT_TYPE,
    LINES_ROUTE, MESSAGES_ROUTE,
};
use logdrop_store::{CacheDirectory, LogQuery};
use serde::Serialize;
use std::fmt::Display;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

/// Body of every 404
pub const NOT_FOUND_MESSAGE: &str = "URI Not Allowed (Use /api/v1/messages)";

/// API response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    cache: CacheDirectory,
    policy: Arc<IngestPolicy>,
    log_dir: PathBuf,
}

impl AppState {
    pub fn new(paths: &PipelinePaths, policy: IngestPolicy) -> Self {
        Self {
            cache: CacheDirectory::new(&paths.cache_dir),
            policy: Arc::new(policy),
            log_dir: paths.log_dir.clone(),
        }
    }
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(MESSAGES_ROUTE, post(ingest_message))
        .route(&format!("{}/*query", COUNTS_ROUTE), get(count_lines))
        .route(&format!("{}/*query", LINES_ROUTE), get(fetch_lines))
        .route("/api/health", get(health_check))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` resolves, then drain in-flight requests
pub async fn start_server<F>(bind_addr: &str, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);

    info!("Starting logdrop ingestion on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Ingestion server stopped");
    Ok(())
}

fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|mime| mime.trim().eq_ignore_ascii_case(FORM_CONTENT_TYPE))
        .unwrap_or(false)
}

fn error_response(err: Error) -> Response {
    if err.is_client_error() {
        debug!("Rejected request: {}", err);
        (StatusCode::BAD_REQUEST, Json(ApiResponse::<()>::err(err.to_string()))).into_response()
    } else {
        server_error(err)
    }
}

fn server_error(err: impl Display) -> Response {
    error!("Request failed: {}", err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::<()>::err(format!("Server error: {}", err))),
    )
        .into_response()
}

// === API Handlers ===

async fn ingest_message(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    if !is_form(&headers) {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::<()>::err(format!(
                "Bad Request (Requires {})",
                FORM_CONTENT_TYPE
            ))),
        )
            .into_response();
    }

    let record = match decode_form(&body).and_then(|pairs| state.policy.apply(pairs, ReceivedAt::now())) {
        Ok(record) => record,
        Err(e) => return error_response(e),
    };

    let cache = state.cache.clone();
    match tokio::task::spawn_blocking(move || cache.store(&record)).await {
        Ok(Ok(name)) => {
            debug!("Cached {}", name);
            (
                StatusCode::CREATED,
                Json(ApiResponse::ok(serde_json::json!({ "entry": name.to_string() }))),
            )
                .into_response()
        }
        Ok(Err(e)) => error_response(e),
        Err(e) => server_error(e),
    }
}

async fn run_query<T, F>(state: &AppState, query: &str, op: F) -> std::result::Result<T, Response>
where
    T: Send + 'static,
    F: FnOnce(&LogQuery, &std::path::Path) -> logdrop_core::Result<T> + Send + 'static,
{
    let query = LogQuery::from_path(query).map_err(error_response)?;
    let log_dir = state.log_dir.clone();
    match tokio::task::spawn_blocking(move || op(&query, log_dir.as_path())).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(error_response(e)),
        Err(e) => Err(server_error(e)),
    }
}

async fn count_lines(State(state): State<AppState>, Path(query): Path<String>) -> Response {
    match run_query(&state, &query, |q, dir| q.count(dir)).await {
        Ok(count) => Json(ApiResponse::ok(serde_json::json!({ "count": count }))).into_response(),
        Err(response) => response,
    }
}

async fn fetch_lines(State(state): State<AppState>, Path(query): Path<String>) -> Response {
    match run_query(&state, &query, |q, dir| q.lines(dir)).await {
        Ok(lines) => {
            let mut body = lines.join("\n");
            if !body.is_empty() {
                body.push('\n');
            }
            ([(CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response()
        }
        Err(response) => response,
    }
}

async fn health_check(State(state): State<AppState>) -> Response {
    let cache = state.cache.clone();
    match tokio::task::spawn_blocking(move || cache.pending()).await {
        Ok(Ok(pending)) => Json(ApiResponse::ok(serde_json::json!({
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION"),
            "pending": pending,
        })))
        .into_response(),
        Ok(Err(e)) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse::<()>::err(e.to_string())),
        )
            .into_response(),
        Err(e) => server_error(e),
    }
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, NOT_FOUND_MESSAGE)
}
