//! REST handlers for the ajax endpoint and health endpoints.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use funnel_core::config::ApiConfig;
use funnel_core::error::FunnelError;
use funnel_core::Catalog;
use funnel_journey::InMemoryFunnelStore;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

use crate::ajax::AjaxOrchestrator;
use crate::sessions::SessionStore;
use crate::wire::{AjaxRequest, AjaxResponse};

/// Maximum session id length.
const MAX_FIELD_LEN: usize = 256;

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<AjaxOrchestrator>,
    /// Carts by session id. Stands in for the external cart engine.
    pub sessions: Arc<SessionStore>,
    pub funnels: Arc<InMemoryFunnelStore>,
    pub node_id: String,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<AjaxOrchestrator>,
        catalog: Arc<dyn Catalog>,
        funnels: Arc<InMemoryFunnelStore>,
        node_id: impl Into<String>,
    ) -> Self {
        Self::with_limits(orchestrator, catalog, funnels, node_id, &ApiConfig::default())
    }

    /// Same as `new`, with session cart limits taken from `api`.
    pub fn with_limits(
        orchestrator: Arc<AjaxOrchestrator>,
        catalog: Arc<dyn Catalog>,
        funnels: Arc<InMemoryFunnelStore>,
        node_id: impl Into<String>,
        api: &ApiConfig,
    ) -> Self {
        let sessions = SessionStore::new(
            catalog,
            api.max_sessions,
            Duration::from_secs(api.session_ttl_secs),
        );
        Self {
            orchestrator,
            sessions: Arc::new(sessions),
            funnels,
            node_id: node_id.into(),
            start_time: Instant::now(),
        }
    }
}

fn validate_session(session_id: &str) -> Result<(), &'static str> {
    if session_id.trim().is_empty() {
        return Err("'session_id' must not be empty");
    }
    if session_id.len() > MAX_FIELD_LEN {
        return Err("'session_id' exceeds maximum length");
    }
    Ok(())
}

/// POST /v1/ajax: visitor actions.
pub async fn handle_ajax(
    State(state): State<AppState>,
    payload: Result<Json<AjaxRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!(error = %rejection, "Malformed ajax request");
            metrics::counter!("api.validation_errors").increment(1);
            return failure(
                StatusCode::BAD_REQUEST,
                "malformed_request",
                rejection.body_text(),
            );
        }
    };

    if let Err(msg) = validate_session(&request.session_id) {
        metrics::counter!("api.validation_errors").increment(1);
        return failure(StatusCode::BAD_REQUEST, "malformed_request", msg.to_string());
    }

    // No cart is allocated for a session that fails the token check.
    if let Err(e) = state.orchestrator.authorize(&request) {
        metrics::counter!("api.unauthorized").increment(1);
        return (StatusCode::FORBIDDEN, Json(AjaxResponse::failure(&e))).into_response();
    }

    let result = state
        .sessions
        .with_cart(&request.session_id, |cart| state.orchestrator.dispatch(&request, cart));

    match result {
        Ok(data) => (StatusCode::OK, Json(AjaxResponse::ok(data))).into_response(),
        Err(e @ FunnelError::Unauthorized) => {
            (StatusCode::FORBIDDEN, Json(AjaxResponse::failure(&e))).into_response()
        }
        Err(e) => (StatusCode::OK, Json(AjaxResponse::failure(&e))).into_response(),
    }
}

fn failure(status: StatusCode, error: &str, message: String) -> Response {
    let body = AjaxResponse {
        success: false,
        data: serde_json::json!({ "error": error, "message": message }),
    };
    (status, Json(body)).into_response()
}

/// GET /health: Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        funnels: state.funnels.list_funnels().len(),
        active_sessions: state.sessions.len(),
    })
}

/// GET /ready: Readiness check. Ready once at least one funnel is loaded.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    if !state.funnels.list_funnels().is_empty() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /live: Liveness check.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub uptime_secs: u64,
    pub funnels: usize,
    pub active_sessions: usize,
}
