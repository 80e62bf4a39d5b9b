//! LLM Gateway - An OpenAI-compatible gateway in front of a single model server
//!
//! This library provides an HTTP gateway that exposes the OpenAI chat
//! completion API while talking to one upstream model server, with
//! features including:
//!
//! - **Dialect Translation**: Speak either the native (`/api/chat`) or the
//!   OpenAI-compatible upstream dialect, chosen by configuration
//! - **Resilience**: Bounded retries with exponential backoff behind a
//!   circuit breaker shared by all requests
//! - **Streaming Support**: Server-Sent Events relay with client disconnect
//!   detection
//! - **Document Context**: Session-scoped uploads injected into prompts
//! - **Metrics & Monitoring**: Prometheus metrics and structured logging
//!
//! # Architecture
//!
//! The codebase is organized into four layers:
//!
//! - [`core`]: Core functionality (config, errors, logging, metrics, middleware)
//! - [`transformer`]: Dialect codecs between the unified model and upstream wire formats
//! - [`services`]: Circuit breaker, retry executor, upstream client and document store
//! - [`api`]: HTTP handlers, SSE relay and request/response models
//!
//! # Configuration
//!
//! All settings come from environment variables, optionally loaded from a
//! `.env` file:
//! - `HOST` / `PORT`: Bind address (default: 0.0.0.0:5001)
//! - `UPSTREAM_BASE_URL`: Model server URL (default: http://localhost:11434)
//! - `UPSTREAM_DIALECT`: `openai` (default) or `native`
//! - `UPSTREAM_API_KEY`: Bearer token sent upstream
//! - `UPSTREAM_TIMEOUT_SECS`: Per-attempt timeout (default: 90)
//! - `RETRY_ATTEMPTS`, `RETRY_BASE_DELAY_SECS`, `RETRY_MAX_DELAY_SECS`
//! - `BREAKER_THRESHOLD`, `BREAKER_COOLDOWN_SECS`
//! - `GATEWAY_API_TOKEN`: Shared token required from clients (unset: open)

pub mod api;
pub mod core;
pub mod services;
pub mod transformer;

// Re-export commonly used types for convenience
pub use api::{create_router, ApiDoc, AppState, ChatCompletionRequest, ChatCompletionResponse};
pub use core::{AppConfig, AppError, Result, UpstreamError};
pub use services::{
    CircuitBreaker, InMemoryCalendarStore, InMemoryDocumentStore, RetryExecutor, UpstreamClient,
};
pub use transformer::{Dialect, StreamEvent, UnifiedRequest, UnifiedResponse};
