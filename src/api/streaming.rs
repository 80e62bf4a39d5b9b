//! Server-Sent Events (SSE) relay for chat completions.
//!
//! Internal [`StreamEvent`]s are re-framed as OpenAI `chat.completion.chunk`
//! events whatever dialect the upstream spoke, so clients never see the
//! difference.

use std::convert::Infallible;

use axum::body::{Body, Bytes};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::stream::{Stream, StreamExt};

use crate::api::disconnect::DisconnectStream;
use crate::api::models::{ChatCompletionChunk, Delta, StreamChoice};
use crate::core::metrics::get_metrics;
use crate::core::StreamCancelHandle;
use crate::transformer::{estimate_tokens, format_sse_data, format_sse_done, StreamEvent};

/// Identity shared by every chunk of one outbound stream.
#[derive(Debug, Clone)]
pub struct StreamContext {
    pub id: String,
    pub created: i64,
    pub model: String,
    /// Estimated prompt tokens, reported to metrics when the stream ends
    pub prompt_tokens: u32,
}

impl StreamContext {
    fn chunk(&self, delta: Delta, finish_reason: Option<String>) -> String {
        let chunk = ChatCompletionChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.created,
            model: self.model.clone(),
            choices: vec![StreamChoice {
                index: 0,
                delta,
                finish_reason,
            }],
        };
        // Plain structs of strings and integers always serialize
        format_sse_data(&serde_json::to_string(&chunk).unwrap_or_default())
    }
}

/// Render one event as SSE frames.
///
/// `Done` with a reason emits a final chunk carrying it before `[DONE]`;
/// `Done` without one emits only `[DONE]`. An error emits the error body
/// and nothing after it.
pub fn render_event(event: &StreamEvent, ctx: &StreamContext) -> Vec<String> {
    match event {
        StreamEvent::Token { text } => vec![ctx.chunk(
            Delta {
                content: Some(text.clone()),
            },
            None,
        )],
        StreamEvent::Done {
            finish_reason: Some(reason),
        } => vec![
            ctx.chunk(Delta::default(), Some(reason.clone())),
            format_sse_done(),
        ],
        StreamEvent::Done {
            finish_reason: None,
        } => vec![format_sse_done()],
        StreamEvent::Error(error) => {
            let (_, body) = error.to_error_body();
            vec![format_sse_data(
                &serde_json::to_string(&body).unwrap_or_default(),
            )]
        }
    }
}

/// Build the SSE response for a relay event stream.
pub fn create_sse_response<S>(events: S, ctx: StreamContext) -> Response
where
    S: Stream<Item = StreamEvent> + Send + 'static,
{
    let cancel_handle = StreamCancelHandle::new();
    let completion = cancel_handle.clone();

    let frames = async_stream::stream! {
        futures::pin_mut!(events);
        let mut completion_chars = String::new();

        while let Some(event) = events.next().await {
            if let StreamEvent::Token { text } = &event {
                completion_chars.push_str(text);
            }

            let terminal = event.is_terminal();
            match &event {
                StreamEvent::Done { finish_reason } => {
                    record_stream_usage(&ctx, &completion_chars);
                    tracing::info!(
                        model = %ctx.model,
                        finish_reason = ?finish_reason,
                        "Stream completed"
                    );
                }
                StreamEvent::Error(error) => {
                    tracing::warn!(
                        model = %ctx.model,
                        kind = %error.kind(),
                        error = %error,
                        "Stream ended with error"
                    );
                }
                StreamEvent::Token { .. } => {}
            }
            if terminal {
                completion.mark_completed();
            }

            for frame in render_event(&event, &ctx) {
                yield Ok::<Bytes, Infallible>(Bytes::from(frame));
            }
            if terminal {
                break;
            }
        }
    };

    let body = Body::from_stream(DisconnectStream::new(Box::pin(frames), cancel_handle));

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        body,
    )
        .into_response()
}

fn record_stream_usage(ctx: &StreamContext, completion: &str) {
    let completion_tokens = estimate_tokens(completion) as u64;
    let prompt_tokens = ctx.prompt_tokens as u64;
    let metrics = get_metrics();
    for (token_type, count) in [
        ("prompt", prompt_tokens),
        ("completion", completion_tokens),
        ("total", prompt_tokens + completion_tokens),
    ] {
        metrics
            .token_usage
            .with_label_values(&[&ctx.model, token_type])
            .inc_by(count);
    }
}
