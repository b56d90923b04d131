use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use sift_core::{Engine, EngineError, SearchResult};
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::{Stream, StreamExt};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// How often `/progress` polls the engine.
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Deserialize)]
pub struct SearchParams {
    pub query: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchResult>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub count: usize,
    pub generation: u64,
    pub indexing_in_progress: bool,
    pub current_file: Option<PathBuf>,
}

#[derive(Deserialize)]
pub struct PathParams {
    pub path: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

/// Maps engine failures onto HTTP status codes.
pub struct ApiError(StatusCode, serde_json::Value);

impl ApiError {
    fn bad_request(message: &str) -> Self {
        ApiError(StatusCode::BAD_REQUEST, serde_json::json!({ "error": message }))
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let status = match &err {
            EngineError::Query(_) | EngineError::InvalidPath { .. } => StatusCode::BAD_REQUEST,
            EngineError::AlreadyIndexing { .. } | EngineError::Cleared { .. } => StatusCode::CONFLICT,
            EngineError::NotIndexed(_) => StatusCode::NOT_FOUND,
            EngineError::Io(_) | EngineError::Corrupt(_) | EngineError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = match &err {
            EngineError::Query(q) => serde_json::json!({ "error": q.reason, "position": q.position }),
            other => serde_json::json!({ "error": other.to_string() }),
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "request failed");
        }
        ApiError(status, body)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(self.1)).into_response()
    }
}

pub fn build_app(engine: Arc<Engine>) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/status", get(status_handler))
        .route("/search", get(search_handler))
        .route("/index", axum::routing::post(index_handler).delete(delete_handler))
        .route("/progress", get(progress_handler))
        .route("/file", get(file_handler))
        .route("/folders", get(folders_handler))
        .route("/skippablefolders", get(skippable_folders_handler))
        .route("/indexableextensions", get(indexable_extensions_handler))
        .with_state(AppState { engine })
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

pub async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    let status = state.engine.status();
    Json(StatusResponse {
        count: status.document_count,
        generation: status.generation,
        indexing_in_progress: status.indexing.is_some(),
        current_file: state.engine.currently_indexing(),
    })
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let query = match params.query {
        Some(q) if !q.is_empty() => q,
        _ => return Err(ApiError::bad_request("query parameter must be supplied")),
    };
    let start = std::time::Instant::now();
    let page = state.engine.search_limit(&query, params.limit.unwrap_or(usize::MAX))?;
    Ok(Json(SearchResponse {
        query: page.query,
        took_s: start.elapsed().as_secs_f64(),
        total_hits: page.total_hits,
        results: page.results,
    }))
}

pub async fn index_handler(
    State(state): State<AppState>,
    Query(params): Query<PathParams>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let path = match params.path {
        Some(p) if !p.is_empty() => p,
        _ => return Err(ApiError::bad_request("path parameter must be supplied")),
    };
    // Progress is observed through /status and /progress; the job runs detached.
    let job = state.engine.start_indexing(&path)?;
    tracing::info!(root = %job.root.display(), "indexing requested");
    Ok((StatusCode::ACCEPTED, Json(serde_json::json!({ "message": "Indexing is in progress." }))))
}

pub async fn delete_handler(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    state.engine.clear_all()?;
    Ok(Json(serde_json::json!({ "message": "Index deleted successfully." })))
}

/// Relays `currently_indexing` as server-sent events until indexing stops.
pub async fn progress_handler(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let engine = state.engine.clone();
    let stream = IntervalStream::new(tokio::time::interval(PROGRESS_INTERVAL))
        .map_while(move |_| engine.currently_indexing())
        .map(|path| Ok::<_, Infallible>(Event::default().event("message").data(path.display().to_string())));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

pub async fn file_handler(
    State(state): State<AppState>,
    Query(params): Query<PathParams>,
) -> Result<String, ApiError> {
    let path = match params.path {
        Some(p) if !p.is_empty() => p,
        _ => return Err(ApiError::bad_request("path parameter must be supplied")),
    };
    Ok(state.engine.read_indexed_file(&path)?)
}

pub async fn folders_handler(State(state): State<AppState>) -> Json<Vec<PathBuf>> {
    Json(state.engine.config().folder_suggestions.clone())
}

pub async fn skippable_folders_handler(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.engine.config().indexer.skip_dirs.clone())
}

pub async fn indexable_extensions_handler(State(state): State<AppState>) -> Json<Option<Vec<String>>> {
    Json(state.engine.config().indexer.extensions.clone())
}
