//! HTTP request handlers for the gateway API.
//!
//! This module contains the chat completion, model listing, health and
//! metrics endpoints. Document upload endpoints live in
//! [`crate::api::documents`], scheduling in [`crate::api::calendar`].

use crate::api::auth::verify_auth;
use crate::api::models::*;
use crate::api::streaming::{create_sse_response, StreamContext};
use crate::core::config::AppConfig;
use crate::core::error::UpstreamError;
use crate::core::logging::get_request_id;
use crate::core::metrics::get_metrics;
use crate::core::{AppError, Result};
use crate::services::{CalendarStore, DocumentStore, UpstreamClient};
use crate::transformer::{estimate_tokens, UnifiedRequest, UnifiedResponse};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;

/// Lead-in of the system message carrying uploaded document context.
pub const DOCUMENT_CONTEXT_PREAMBLE: &str = "Use the following uploaded document context when answering. If the answer is not in the context, say so clearly.";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub upstream: Arc<UpstreamClient>,
    pub documents: Arc<dyn DocumentStore>,
    pub calendars: Arc<dyn CalendarStore>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        upstream: Arc<UpstreamClient>,
        documents: Arc<dyn DocumentStore>,
        calendars: Arc<dyn CalendarStore>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            upstream,
            documents,
            calendars,
        }
    }

    pub(crate) fn verify_auth(&self, headers: &HeaderMap) -> Result<()> {
        verify_auth(headers, self.config.api_token.as_deref())
    }
}

/// Generate an OpenAI-style completion id.
pub fn completion_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("chatcmpl-{}", &hex[..10])
}

/// Prepend a system message with document context for the session.
///
/// The relevance query is the last user message. Messages are returned
/// unchanged when there is no session or the store has nothing to offer.
pub fn inject_document_context(
    documents: &dyn DocumentStore,
    messages: Vec<Message>,
    session_id: Option<&str>,
    file_ids: Option<&[String]>,
) -> Vec<Message> {
    let Some(session_id) = session_id else {
        return messages;
    };

    let query = messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .unwrap_or("");
    let context = documents.build_context(session_id, file_ids, query);
    if context.is_empty() {
        return messages;
    }

    tracing::debug!(
        session_id = %session_id,
        context_chars = context.chars().count(),
        "Injecting document context"
    );
    let mut injected = Vec::with_capacity(messages.len() + 1);
    injected.push(Message::new(
        Role::System,
        format!("{}\n\n{}", DOCUMENT_CONTEXT_PREAMBLE, context),
    ));
    injected.extend(messages);
    injected
}

/// Handle chat completion requests.
///
/// Supports both streaming and non-streaming responses.
#[utoipa::path(
    post,
    path = "/v1/chat/completions",
    tag = "completions",
    request_body = ChatCompletionRequest,
    responses(
        (status = 200, description = "Completion, or a text/event-stream of chat.completion.chunk events when stream=true", body = ChatCompletionResponse),
        (status = 400, description = "Unknown model", body = ErrorBody),
        (status = 401, description = "Unauthorized", body = ErrorBody),
        (status = 422, description = "Invalid request", body = ErrorBody),
        (status = 502, description = "Upstream error", body = ErrorBody),
        (status = 503, description = "Upstream temporarily unavailable", body = ErrorBody),
        (status = 504, description = "Upstream timeout", body = ErrorBody)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(skip_all, fields(request_id = %get_request_id()))]
pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: std::result::Result<Json<ChatCompletionRequest>, JsonRejection>,
) -> Result<Response> {
    state.verify_auth(&headers)?;

    let Json(payload) = payload.map_err(|e| AppError::Validation(e.body_text()))?;
    payload.validate().map_err(AppError::Validation)?;

    tracing::info!(
        model = %payload.model,
        stream = payload.stream,
        messages = payload.messages.len(),
        session_id = ?payload.session_id,
        "Chat completion requested"
    );

    // Usage estimates are based on what the client sent, before injection
    let prompt_text = payload
        .messages
        .iter()
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    let messages = inject_document_context(
        state.documents.as_ref(),
        payload.messages,
        payload.session_id.as_deref(),
        payload.file_ids.as_deref(),
    );

    let request = UnifiedRequest {
        model: payload.model,
        messages,
        temperature: payload.temperature,
        max_tokens: payload.max_tokens,
        stream: payload.stream,
    };

    if request.stream {
        let ctx = StreamContext {
            id: completion_id(),
            created: chrono::Utc::now().timestamp(),
            model: request.model.clone(),
            prompt_tokens: estimate_tokens(&prompt_text),
        };
        let events = state.upstream.clone().stream_chat_completion(request);
        return Ok(create_sse_response(events, ctx));
    }

    let response = state.upstream.chat_completion(&request).await?;
    let body = build_completion_response(response, &request.model, &prompt_text);
    record_token_usage(&body.usage, &body.model);

    Ok(Json(body).into_response())
}

/// Wrap a unified reply in the OpenAI response envelope.
///
/// Upstream-reported identity and usage win; anything missing is
/// generated or estimated.
pub fn build_completion_response(
    response: UnifiedResponse,
    requested_model: &str,
    prompt_text: &str,
) -> ChatCompletionResponse {
    let usage = response
        .usage
        .unwrap_or_else(|| Usage::estimate(prompt_text, &response.content));

    ChatCompletionResponse {
        id: response.id.unwrap_or_else(completion_id),
        object: "chat.completion".to_string(),
        created: response
            .created
            .unwrap_or_else(|| chrono::Utc::now().timestamp()),
        model: response
            .model
            .unwrap_or_else(|| requested_model.to_string()),
        choices: vec![Choice {
            index: 0,
            message: Message::new(Role::Assistant, response.content),
            finish_reason: response.finish_reason,
        }],
        usage,
    }
}

/// List available models.
///
/// An open circuit yields an empty list rather than an error.
#[utoipa::path(
    get,
    path = "/models",
    tag = "models",
    responses(
        (status = 200, description = "Available models", body = ModelList),
        (status = 401, description = "Unauthorized", body = ErrorBody),
        (status = 502, description = "Upstream error", body = ErrorBody),
        (status = 504, description = "Upstream timeout", body = ErrorBody)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(skip_all, fields(request_id = %get_request_id()))]
pub async fn list_models(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ModelList>> {
    state.verify_auth(&headers)?;

    match state.upstream.list_models().await {
        Ok(ids) => {
            tracing::debug!(count = ids.len(), "Listed upstream models");
            Ok(Json(ModelList::from_ids(ids)))
        }
        Err(UpstreamError::CircuitOpen) => {
            tracing::warn!("Circuit open, returning empty model list");
            Ok(Json(ModelList::from_ids(Vec::new())))
        }
        Err(e) => Err(e.into()),
    }
}

/// Basic health check endpoint. Never fails.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Gateway is up", body = HealthResponse)
    )
)]
#[tracing::instrument(skip_all)]
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let upstream_reachable = state.upstream.health().await;
    tracing::debug!(upstream_reachable, "Health check requested");

    Json(HealthResponse {
        status: "ok".to_string(),
        upstream_reachable,
    })
}

/// Prometheus metrics endpoint.
#[tracing::instrument]
pub async fn metrics_handler() -> Result<Response> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response())
}

/// Record token usage metrics.
fn record_token_usage(usage: &Usage, model: &str) {
    let metrics = get_metrics();

    metrics
        .token_usage
        .with_label_values(&[model, "prompt"])
        .inc_by(usage.prompt_tokens as u64);
    metrics
        .token_usage
        .with_label_values(&[model, "completion"])
        .inc_by(usage.completion_tokens as u64);
    metrics
        .token_usage
        .with_label_values(&[model, "total"])
        .inc_by(usage.total_tokens as u64);
}
