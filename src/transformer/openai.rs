//! OpenAI-compatible dialect.
//!
//! Requests go to `/v1/chat/completions` with the unified fields passed
//! through; streaming replies are SSE lines framed as `data: {...}` and
//! terminated by `data: [DONE]`.

use serde_json::{json, Value};

use super::{Dialect, DialectCodec, StreamEvent, UnifiedRequest, UnifiedResponse, Usage};
use crate::core::error::UpstreamError;

/// Content substituted when the upstream returns an empty message.
pub const EMPTY_CONTENT_PLACEHOLDER: &str = "(No response text returned by model.)";

const DEFAULT_FINISH_REASON: &str = "stop";
const DONE_MARKER: &str = "[DONE]";

pub struct OpenAiCodec;

impl DialectCodec for OpenAiCodec {
    fn dialect(&self) -> Dialect {
        Dialect::OpenAi
    }

    fn chat_path(&self) -> &'static str {
        "/v1/chat/completions"
    }

    fn models_fallback_path(&self) -> Option<&'static str> {
        Some("/v1/models")
    }

    fn build_request(&self, request: &UnifiedRequest) -> Value {
        let mut body = json!({
            "model": request.model,
            "messages": request.messages,
            "temperature": request.temperature,
            "stream": request.stream,
        });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        body
    }

    fn parse_response(&self, raw: Value) -> Result<UnifiedResponse, UpstreamError> {
        if !raw.is_object() {
            return Err(UpstreamError::Decode(
                "expected a JSON object from the chat endpoint".to_string(),
            ));
        }

        let choice = first_choice(&raw);
        let content = choice
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(EMPTY_CONTENT_PLACEHOLDER)
            .to_string();
        let finish_reason = choice
            .and_then(|c| c.get("finish_reason"))
            .and_then(Value::as_str)
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_FINISH_REASON)
            .to_string();

        // Malformed usage is treated as absent and estimated downstream
        let usage = raw
            .get("usage")
            .and_then(|u| serde_json::from_value::<Usage>(u.clone()).ok());

        Ok(UnifiedResponse {
            id: raw.get("id").and_then(Value::as_str).map(str::to_string),
            created: raw.get("created").and_then(Value::as_i64),
            model: raw.get("model").and_then(Value::as_str).map(str::to_string),
            content,
            finish_reason,
            usage,
        })
    }

    fn parse_fallback_models(&self, raw: &Value) -> Vec<String> {
        raw.get("data")
            .and_then(Value::as_array)
            .map(|data| {
                data.iter()
                    .filter_map(|m| m.get("id").and_then(Value::as_str))
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn decode_stream_line(&self, line: &str) -> Vec<StreamEvent> {
        let Some(payload) = line.trim().strip_prefix("data:") else {
            return Vec::new();
        };
        let payload = payload.trim();
        if payload == DONE_MARKER {
            return vec![StreamEvent::done(None)];
        }
        let Ok(value) = serde_json::from_str::<Value>(payload) else {
            tracing::debug!(payload = %payload, "Skipping unparseable SSE data");
            return Vec::new();
        };

        let mut events = Vec::new();
        let choice = first_choice(&value);
        let content = choice
            .and_then(|c| c.get("delta"))
            .and_then(|d| d.get("content"))
            .and_then(Value::as_str)
            .unwrap_or("");
        if !content.is_empty() {
            events.push(StreamEvent::token(content));
        }
        let finish_reason = choice
            .and_then(|c| c.get("finish_reason"))
            .and_then(Value::as_str)
            .filter(|r| !r.is_empty());
        if let Some(reason) = finish_reason {
            events.push(StreamEvent::done(Some(reason)));
        }
        events
    }
}

fn first_choice(value: &Value) -> Option<&Value> {
    value
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transformer::{Role, UnifiedMessage};
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    fn request(max_tokens: Option<u32>) -> UnifiedRequest {
        UnifiedRequest {
            model: "gpt-oss:20b".to_string(),
            messages: vec![UnifiedMessage::new(Role::User, "Hello")],
            temperature: 0.5,
            max_tokens,
            stream: false,
        }
    }

    #[test]
    fn test_build_request_passthrough() {
        let body = OpenAiCodec.build_request(&request(Some(128)));
        assert_eq!(
            body,
            json!({
                "model": "gpt-oss:20b",
                "messages": [{"role": "user", "content": "Hello"}],
                "temperature": 0.5,
                "stream": false,
                "max_tokens": 128
            })
        );
    }

    #[test]
    fn test_temperature_is_sent_as_given() {
        let mut req = request(None);
        req.temperature = 0.7;
        let body = OpenAiCodec.build_request(&req);
        assert_eq!(body["temperature"].as_f64(), Some(0.7));
        assert!(body.to_string().contains("\"temperature\":0.7"));
    }

    #[test]
    fn test_build_request_omits_max_tokens() {
        let body = OpenAiCodec.build_request(&request(None));
        assert!(body.get("max_tokens").is_none());
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn test_parse_response_full() {
        let parsed = OpenAiCodec
            .parse_response(json!({
                "id": "chatcmpl-upstream",
                "created": 1700000000,
                "model": "gpt-oss:20b",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": " Hi! "},
                    "finish_reason": "length"
                }],
                "usage": {"prompt_tokens": 3, "completion_tokens": 2, "total_tokens": 5}
            }))
            .unwrap();

        assert_eq!(parsed.id.as_deref(), Some("chatcmpl-upstream"));
        assert_eq!(parsed.created, Some(1700000000));
        assert_eq!(parsed.model.as_deref(), Some("gpt-oss:20b"));
        assert_eq!(parsed.content, "Hi!");
        assert_eq!(parsed.finish_reason, "length");
        assert_eq!(
            parsed.usage,
            Some(Usage {
                prompt_tokens: 3,
                completion_tokens: 2,
                total_tokens: 5
            })
        );
    }

    #[test]
    fn test_parse_response_defaults() {
        let parsed = OpenAiCodec
            .parse_response(json!({"choices": [{"message": {"content": "   "}}]}))
            .unwrap();
        assert_eq!(parsed.content, EMPTY_CONTENT_PLACEHOLDER);
        assert_eq!(parsed.finish_reason, "stop");
        assert_eq!(parsed.usage, None);

        let parsed = OpenAiCodec.parse_response(json!({})).unwrap();
        assert_eq!(parsed.content, EMPTY_CONTENT_PLACEHOLDER);
    }

    #[test]
    fn test_parse_response_rejects_non_object() {
        assert_matches!(
            OpenAiCodec.parse_response(json!([1, 2])),
            Err(UpstreamError::Decode(_))
        );
    }

    #[test]
    fn test_parse_fallback_models() {
        let raw = json!({"object": "list", "data": [{"id": "a"}, {"id": ""}, {"id": "b"}]});
        assert_eq!(OpenAiCodec.parse_fallback_models(&raw), vec!["a", "b"]);
    }

    #[test]
    fn test_decode_stream_lines() {
        assert!(OpenAiCodec.decode_stream_line("").is_empty());
        assert!(OpenAiCodec.decode_stream_line(": keep-alive").is_empty());
        assert!(OpenAiCodec.decode_stream_line("data: {broken").is_empty());
        assert!(OpenAiCodec
            .decode_stream_line("data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}")
            .is_empty());

        assert_eq!(
            OpenAiCodec.decode_stream_line("data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"},\"finish_reason\":null}]}"),
            vec![StreamEvent::token("Hi")]
        );
        assert_eq!(
            OpenAiCodec.decode_stream_line("data:[DONE]"),
            vec![StreamEvent::done(None)]
        );
    }

    #[test]
    fn test_decode_content_and_finish_on_same_line() {
        let events = OpenAiCodec.decode_stream_line(
            "data: {\"choices\":[{\"delta\":{\"content\":\".\"},\"finish_reason\":\"stop\"}]}",
        );
        assert_eq!(
            events,
            vec![StreamEvent::token("."), StreamEvent::done(Some("stop"))]
        );
    }
}
