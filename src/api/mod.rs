//! API layer for the gateway.
//!
//! This module contains all HTTP handlers, request/response models,
//! streaming support and the router that ties them together.

pub mod auth;
pub mod calendar;
pub mod disconnect;
pub mod documents;
pub mod handlers;
pub mod models;
pub mod openapi;
pub mod streaming;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::core::{request_id_middleware, MetricsMiddleware};

// Re-export commonly used types
pub use calendar::{
    calendar_availability, calendar_conflicts, calendar_suggestions, list_calendars,
    toggle_calendar, unified_calendar,
};
pub use documents::{delete_session_file, list_session_files, upload_document};
pub use handlers::{chat_completions, health, list_models, metrics_handler, AppState};
pub use models::{
    ChatCompletionRequest, ChatCompletionResponse, HealthResponse, ModelList, UploadResponse,
};
pub use openapi::ApiDoc;
pub use streaming::{create_sse_response, StreamContext};

/// Multipart framing allowance on top of the configured file size limit.
const UPLOAD_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Build the router with all gateway endpoints.
pub fn create_router(state: Arc<AppState>) -> Router {
    let upload_limit = state
        .config
        .documents
        .max_upload_mb
        .saturating_mul(1024 * 1024)
        .saturating_add(UPLOAD_OVERHEAD_BYTES);

    let swagger_ui = SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi());

    let api_routes = Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .route("/models", get(list_models))
        .route(
            "/api/upload",
            post(upload_document).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/sessions/:session_id/files", get(list_session_files))
        .route(
            "/sessions/:session_id/files/:file_id",
            delete(delete_session_file),
        )
        .route("/v1/productivity/calendars", get(list_calendars))
        .route(
            "/v1/productivity/calendars/:calendar_id/toggle",
            post(toggle_calendar),
        )
        .route("/v1/productivity/calendar/unified", get(unified_calendar))
        .route("/v1/productivity/calendar/conflicts", get(calendar_conflicts))
        .route(
            "/v1/productivity/calendar/availability",
            post(calendar_availability),
        )
        .route(
            "/v1/productivity/calendar/suggestions",
            post(calendar_suggestions),
        )
        .route("/health", get(health))
        .route_layer(axum::middleware::from_fn(MetricsMiddleware::track_metrics))
        .with_state(state);

    Router::new()
        .merge(swagger_ui)
        .merge(api_routes)
        .route("/metrics", get(metrics_handler))
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
