//! Garage door HTTP API
//!
//! JSON endpoints for status, toggling and close mode, plus a rendered
//! status page. Every handler goes through [`DoorController`], the same
//! path the bus bridge uses.

pub mod auth;
pub mod error;
pub mod page;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use page::StatusPage;

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::Html,
    routing::{get, post},
    Json, Router,
};
use garage_core::{DoorController, DoorSnapshot, ToggleOutcome, ToggleSource};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<DoorController>,
    /// Bearer token for mutating endpoints; `None` disables auth
    pub token: Option<Arc<str>>,
    pub page: Arc<StatusPage>,
}

impl AppState {
    pub fn new(
        controller: Arc<DoorController>,
        token: Option<&str>,
    ) -> Result<Self, minijinja::Error> {
        Ok(Self {
            controller,
            token: token.map(Arc::from),
            page: Arc::new(StatusPage::new()?),
        })
    }

    fn authorize(&self, headers: &HeaderMap) -> ApiResult<()> {
        auth::require_token(self.token.as_deref(), headers)
    }
}

/// Response for POST /toggle
#[derive(Debug, Serialize)]
struct ToggleResponse {
    status: &'static str,
}

/// Response for POST /set_close_mode
#[derive(Debug, Serialize)]
struct CloseModeResponse {
    close_mode: bool,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/status", get(get_status))
        .route("/toggle", post(toggle))
        .route("/set_close_mode", post(set_close_mode))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the API server, returning once `shutdown` resolves and in-flight
/// requests have drained
pub async fn start_server<F>(state: AppState, addr: &str, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("API server listening on {}", addr);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

// ==================== Handlers ====================

/// GET / - Rendered status page
async fn index(State(state): State<AppState>) -> ApiResult<Html<String>> {
    let snapshot = state.controller.snapshot().await;
    state
        .page
        .render(&snapshot, state.token.is_some())
        .map(Html)
        .map_err(|e| ApiError::Internal(format!("failed to render status page: {}", e)))
}

/// GET /status - Current door state and close mode
async fn get_status(State(state): State<AppState>) -> Json<DoorSnapshot> {
    Json(state.controller.snapshot().await)
}

/// POST /toggle - One trigger pulse
///
/// A request inside the minimum toggle gap still reports `Toggled`.
async fn toggle(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<ToggleResponse>> {
    state.authorize(&headers)?;

    match state.controller.request_toggle(ToggleSource::Http).await? {
        ToggleOutcome::Pulsed => {}
        ToggleOutcome::Suppressed => debug!("HTTP toggle absorbed by rate limiter"),
    }
    Ok(Json(ToggleResponse { status: "Toggled" }))
}

/// POST /set_close_mode - Enable or disable close mode
///
/// The body is parsed regardless of content type. `enabled` is read with
/// JSON truthiness, so a missing field disables close mode.
async fn set_close_mode(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<CloseModeResponse>> {
    state.authorize(&headers)?;

    let data: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid JSON: {}", e)))?;
    let Some(object) = data.as_object() else {
        return Err(ApiError::BadRequest("Expected a JSON object".to_string()));
    };
    let enabled = object.get("enabled").map(is_truthy).unwrap_or(false);

    let close_mode = state.controller.set_close_mode(enabled).await;
    Ok(Json(CloseModeResponse { close_mode }))
}

fn is_truthy(value: &serde_json::Value) -> bool {
    use serde_json::Value;
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
