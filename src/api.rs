use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    response::Json,
    routing::{get, post},
    Router,
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::answer::{AnswerService, SourceRef};
use crate::config::ServerConfig;

const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Serialize, Deserialize)]
pub struct AskRequest {
    pub q: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AskResponse {
    pub answer: String,
    pub sources: Vec<SourceRef>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

pub struct AppState {
    pub answer: Arc<AnswerService>,
    pub api_key: Option<String>,
}

type HandlerError = (StatusCode, Json<ErrorResponse>);

pub fn create_router(state: AppState, server: &ServerConfig) -> Router {
    Router::new()
        .route("/", get(root_info))
        .route("/healthz", get(healthz))
        .route("/ask", post(ask))
        .route("/ask-stream", post(ask_stream))
        .layer(cors_layer(&server.allowed_origins))
        .layer(middleware::from_fn(logging_middleware))
        .with_state(Arc::new(state))
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring unparseable CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::HeaderName::from_static(API_KEY_HEADER)])
        .allow_credentials(true)
}

async fn root_info() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "ok": true,
        "message": "Regulatory document RAG API",
        "endpoints": {
            "health": "/healthz",
            "ask": { "path": "/ask", "method": "POST" },
            "ask_stream": { "path": "/ask-stream", "method": "POST" },
        },
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

/// Shared pre-flight for both answer routes: auth first, then input
/// validation, both before any external call.
fn authorize_and_validate(
    state: &AppState,
    headers: &HeaderMap,
    request: &AskRequest,
) -> std::result::Result<String, HandlerError> {
    if let Some(expected) = &state.api_key {
        let provided = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok());
        if provided != Some(expected.as_str()) {
            return Err(create_error_response(
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Missing or invalid API key",
            ));
        }
    }

    let query = request.q.trim();
    if query.is_empty() {
        return Err(create_error_response(
            StatusCode::BAD_REQUEST,
            "invalid_query",
            "Query must be a non-empty string",
        ));
    }

    Ok(query.to_string())
}

async fn ask(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<AskRequest>,
) -> std::result::Result<Json<AskResponse>, HandlerError> {
    let query = authorize_and_validate(&state, &headers, &request)?;
    let start = std::time::Instant::now();

    let result = state.answer.ask(&query).await.map_err(|e| {
        error!(error = %e, "ask failed");
        create_error_response(StatusCode::INTERNAL_SERVER_ERROR, "ask_failed", &e.to_string())
    })?;

    info!(
        msg_size = query.len(),
        latency_ms = start.elapsed().as_millis() as u64,
        sources = result.sources.len(),
        "ask request processed"
    );

    Ok(Json(AskResponse {
        answer: result.answer,
        sources: result.sources,
    }))
}

async fn ask_stream(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<AskRequest>,
) -> std::result::Result<Sse<impl Stream<Item = std::result::Result<SseEvent, Infallible>>>, HandlerError>
{
    let query = authorize_and_validate(&state, &headers, &request)?;

    let events = state.answer.ask_stream(query);
    let sse = events
        .map(|event| {
            let encoded = SseEvent::default().json_data(&event).unwrap_or_else(|e| {
                error!(error = %e, "failed to encode stream event");
                SseEvent::default().data(r#"{"type":"error","message":"event encoding failed"}"#)
            });
            Ok(encoded)
        })
        // Sentinel line after the terminal event, mirroring the upstream
        // completion protocol so clients can close on a fixed marker.
        .chain(futures::stream::once(async {
            Ok(SseEvent::default().data("[DONE]"))
        }));

    Ok(Sse::new(sse).keep_alive(KeepAlive::default()))
}

fn create_error_response(status: StatusCode, code: &str, message: &str) -> HandlerError {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
            code: code.to_string(),
            timestamp: chrono::Utc::now(),
        }),
    )
}

/// Request logging with latency, in the shape the rest of the service logs.
pub async fn logging_middleware(
    request: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let request_id = Uuid::new_v4();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = std::time::Instant::now();

    let response = next.run(request).await;

    info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        status = %response.status(),
        latency_ms = start.elapsed().as_millis() as u64,
        "request processed"
    );

    response
}
