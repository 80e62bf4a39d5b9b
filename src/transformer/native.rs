//! Native chat dialect.
//!
//! Requests go to `/api/chat` with sampling options nested under
//! `options`; streaming replies are newline-delimited JSON objects of the
//! form `{"message": {"content": ...}, "done": bool}`.

use serde_json::{json, Value};

use super::{Dialect, DialectCodec, StreamEvent, UnifiedRequest, UnifiedResponse};
use crate::core::error::UpstreamError;

/// Finish reason reported for every native completion.
const NATIVE_FINISH_REASON: &str = "stop";

pub struct NativeCodec;

impl DialectCodec for NativeCodec {
    fn dialect(&self) -> Dialect {
        Dialect::Native
    }

    fn chat_path(&self) -> &'static str {
        "/api/chat"
    }

    fn build_request(&self, request: &UnifiedRequest) -> Value {
        let mut options = json!({ "temperature": request.temperature });
        if let Some(max_tokens) = request.max_tokens {
            options["num_predict"] = json!(max_tokens);
        }

        json!({
            "model": request.model,
            "messages": request.messages,
            "stream": request.stream,
            "options": options,
        })
    }

    fn parse_response(&self, raw: Value) -> Result<UnifiedResponse, UpstreamError> {
        // Usage is never reported; the caller estimates it.
        Ok(UnifiedResponse {
            id: None,
            created: None,
            model: None,
            content: message_content(&raw).trim().to_string(),
            finish_reason: NATIVE_FINISH_REASON.to_string(),
            usage: None,
        })
    }

    fn decode_stream_line(&self, line: &str) -> Vec<StreamEvent> {
        let line = line.trim();
        if line.is_empty() {
            return Vec::new();
        }
        let Ok(value) = serde_json::from_str::<Value>(line) else {
            tracing::debug!(line = %line, "Skipping non-JSON stream line");
            return Vec::new();
        };

        let mut events = Vec::new();
        let content = message_content(&value);
        if !content.is_empty() {
            events.push(StreamEvent::token(content));
        }
        if value.get("done").and_then(Value::as_bool).unwrap_or(false) {
            events.push(StreamEvent::done(Some(NATIVE_FINISH_REASON)));
        }
        events
    }
}

fn message_content(value: &Value) -> &str {
    value
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .unwrap_or("")
}
