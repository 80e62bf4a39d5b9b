//! Dialect translation between the gateway's unified format and the
//! upstream wire formats.
//!
//! Two dialects are supported, selected once per client from configuration:
//!
//! ```text
//! UnifiedRequest ──[build_request]──► wire body ──► upstream
//!                                                     │
//! UnifiedResponse ◄──[parse_response]── JSON body ◄───┤
//!                                                     │
//! StreamEvent* ◄──[decode_stream_line]── line ◄───────┘ (NDJSON or SSE)
//! ```
//!
//! Each dialect implements [`DialectCodec`]; callers obtain the codec with
//! [`codec_for`] and never branch on the dialect themselves.

pub mod native;
pub mod openai;
pub mod stream;
pub mod unified;

pub use native::NativeCodec;
pub use openai::OpenAiCodec;
pub use stream::{format_sse_data, format_sse_done, LineBuffer};
pub use unified::*;

use crate::core::error::UpstreamError;

/// Tags endpoint queried first by both dialects when listing models.
pub const TAGS_PATH: &str = "/api/tags";

// ============================================================================
// Codec Trait
// ============================================================================

/// Translation rules for one upstream wire dialect.
pub trait DialectCodec: Send + Sync {
    /// The dialect this codec speaks.
    fn dialect(&self) -> Dialect;

    /// Path of the chat endpoint, relative to the upstream base URL.
    fn chat_path(&self) -> &'static str;

    /// Models endpoint to try when the tags lookup returns 404.
    /// `None` means a 404 from the tags endpoint is final.
    fn models_fallback_path(&self) -> Option<&'static str> {
        None
    }

    /// Build the upstream request body.
    fn build_request(&self, request: &UnifiedRequest) -> serde_json::Value;

    /// Parse a non-streaming upstream reply.
    fn parse_response(&self, raw: serde_json::Value) -> Result<UnifiedResponse, UpstreamError>;

    /// Extract model ids from the fallback models listing.
    fn parse_fallback_models(&self, _raw: &serde_json::Value) -> Vec<String> {
        Vec::new()
    }

    /// Decode one complete upstream stream line.
    ///
    /// Lines that are blank, unframed or not valid JSON decode to no
    /// events. A terminal event, when present, is always last.
    fn decode_stream_line(&self, line: &str) -> Vec<StreamEvent>;
}

/// Codec for a configured dialect.
pub fn codec_for(dialect: Dialect) -> &'static dyn DialectCodec {
    match dialect {
        Dialect::Native => &NativeCodec,
        Dialect::OpenAi => &OpenAiCodec,
    }
}

/// Extract model names from a tags response (`models[].name`).
///
/// A missing `models` array yields an empty list; entries without a
/// non-empty name are skipped.
pub fn parse_tag_models(raw: &serde_json::Value) -> Vec<String> {
    raw.get("models")
        .and_then(|m| m.as_array())
        .map(|models| {
            models
                .iter()
                .filter_map(|m| m.get("name").and_then(|n| n.as_str()))
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
