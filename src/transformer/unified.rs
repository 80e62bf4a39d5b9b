//! Unified (dialect-neutral) request, response and stream event types.
//!
//! Handlers build a [`UnifiedRequest`]; dialect codecs translate it to the
//! upstream wire format and translate upstream replies back into a
//! [`UnifiedResponse`] or a sequence of [`StreamEvent`]s.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::core::error::UpstreamError;

// ============================================================================
// Dialect
// ============================================================================

/// Upstream wire dialect, fixed per client from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Native chat API: `/api/chat`, NDJSON streaming
    Native,
    /// OpenAI-compatible API: `/v1/chat/completions`, SSE streaming
    #[default]
    #[serde(rename = "openai")]
    OpenAi,
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dialect::Native => write!(f, "native"),
            Dialect::OpenAi => write!(f, "openai"),
        }
    }
}

impl std::str::FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "native" => Ok(Dialect::Native),
            "openai" => Ok(Dialect::OpenAi),
            _ => Err(format!("Unknown dialect: {} (expected native or openai)", s)),
        }
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// Chat message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({"role": "user", "content": "Hello!"}))]
pub struct UnifiedMessage {
    pub role: Role,
    pub content: String,
}

impl UnifiedMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

// ============================================================================
// Request / Response
// ============================================================================

/// Dialect-neutral chat request. Built once by the endpoint layer and
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct UnifiedRequest {
    pub model: String,
    pub messages: Vec<UnifiedMessage>,
    pub temperature: f64,
    pub max_tokens: Option<u32>,
    pub stream: bool,
}

/// Token usage statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({"prompt_tokens": 10, "completion_tokens": 20, "total_tokens": 30}))]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    /// Estimate usage at roughly four characters per token.
    pub fn estimate(prompt: &str, completion: &str) -> Self {
        let prompt_tokens = estimate_tokens(prompt);
        let completion_tokens = estimate_tokens(completion);
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// `max(1, characters / 4)`, counting Unicode scalar values.
pub fn estimate_tokens(text: &str) -> u32 {
    let chars = text.chars().count() / 4;
    u32::try_from(chars).unwrap_or(u32::MAX).max(1)
}

/// Dialect-neutral non-streaming reply.
///
/// `id`, `created` and `model` are only set when the upstream reported
/// them; `usage` is `None` when the upstream gave no usable counts.
#[derive(Debug, Clone, PartialEq)]
pub struct UnifiedResponse {
    pub id: Option<String>,
    pub created: Option<i64>,
    pub model: Option<String>,
    pub content: String,
    pub finish_reason: String,
    pub usage: Option<Usage>,
}

// ============================================================================
// Stream Events
// ============================================================================

/// Event produced by the streaming relay.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A piece of generated text, in upstream arrival order
    Token { text: String },
    /// Clean end of stream. `None` means the upstream ended without an
    /// explicit reason (the OpenAI `[DONE]` sentinel).
    Done { finish_reason: Option<String> },
    /// Terminal failure
    Error(UpstreamError),
}

impl StreamEvent {
    pub fn token(text: impl Into<String>) -> Self {
        StreamEvent::Token { text: text.into() }
    }

    pub fn done(finish_reason: Option<&str>) -> Self {
        StreamEvent::Done {
            finish_reason: finish_reason.map(str::to_string),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Token { .. })
    }
}
