//! Resilient client for the upstream model server.
//!
//! Every network call goes through the [`RetryExecutor`], which consults the
//! shared [`CircuitBreaker`] first. Each attempt gets its own timeout
//! budget. The HTTP connection pool is created once and reused for the
//! lifetime of the client.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::{Method, StatusCode};
use serde_json::Value;

use crate::core::config::{ResilienceConfig, UpstreamConfig};
use crate::core::error::UpstreamError;
use crate::services::circuit_breaker::CircuitBreaker;
use crate::services::retry::{RetryExecutor, RetryPolicy};
use crate::transformer::stream::StreamDecoder;
use crate::transformer::{
    codec_for, parse_tag_models, Dialect, DialectCodec, StreamEvent, UnifiedRequest,
    UnifiedResponse, TAGS_PATH,
};

/// Longest upstream error body kept for logs.
const MAX_ERROR_BODY_LEN: usize = 500;

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

/// An upstream stream whose first body chunk has already been read.
struct OpenedStream {
    first: Bytes,
    rest: ByteStream,
}

/// Build the pooled HTTP client shared by all upstream calls.
///
/// No client-wide timeout is set; each attempt is bounded individually.
pub fn create_http_client(config: &UpstreamConfig) -> anyhow::Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .danger_accept_invalid_certs(!config.verify_tls)
        .pool_max_idle_per_host(32)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .build()?;
    Ok(client)
}

pub struct UpstreamClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    codec: &'static dyn DialectCodec,
    timeout: Duration,
    executor: RetryExecutor,
}

impl UpstreamClient {
    pub fn new(
        config: &UpstreamConfig,
        resilience: &ResilienceConfig,
    ) -> anyhow::Result<Self> {
        let http = create_http_client(config)?;
        Ok(Self::with_http_client(http, config, resilience))
    }

    /// Construct around an existing connection pool.
    pub fn with_http_client(
        http: reqwest::Client,
        config: &UpstreamConfig,
        resilience: &ResilienceConfig,
    ) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(
            resilience.breaker_threshold,
            resilience.breaker_cooldown,
        ));
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            codec: codec_for(config.dialect),
            timeout: config.timeout,
            executor: RetryExecutor::new(RetryPolicy::from_config(resilience), breaker),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.codec.dialect()
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        self.executor.breaker()
    }

    // ========================================================================
    // Public operations
    // ========================================================================

    /// List model ids available upstream.
    ///
    /// Both dialects query the tags endpoint first. For the OpenAI dialect
    /// a 404 there falls back to the standard models listing.
    pub async fn list_models(&self) -> Result<Vec<String>, UpstreamError> {
        let fallback = self.codec.models_fallback_path();
        let this = self;
        let tags = self
            .executor
            .execute(move |_| this.attempt_lookup(TAGS_PATH, fallback.is_some()))
            .await?;

        match (tags, fallback) {
            (Some(raw), _) => Ok(parse_tag_models(&raw)),
            (None, Some(path)) => {
                tracing::debug!(path = %path, "Tags endpoint not found, using models listing");
                let raw = self
                    .executor
                    .execute(move |_| this.attempt_json(Method::GET, path, None))
                    .await?;
                Ok(self.codec.parse_fallback_models(&raw))
            }
            (None, None) => Ok(Vec::new()),
        }
    }

    /// Whether the upstream answered a model listing. Never fails.
    pub async fn health(&self) -> bool {
        match self.list_models().await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(error = %e, "Upstream health check failed");
                false
            }
        }
    }

    /// Non-streaming chat completion.
    ///
    /// Fails with `StreamMisuse` before any network call when the request
    /// asks for streaming. A body that cannot be decoded counts as a
    /// terminal failure of the call.
    pub async fn chat_completion(
        &self,
        request: &UnifiedRequest,
    ) -> Result<UnifiedResponse, UpstreamError> {
        if request.stream {
            return Err(UpstreamError::StreamMisuse);
        }

        let body = &self.codec.build_request(request);
        let path = self.codec.chat_path();
        let this = self;
        self.executor
            .execute(move |_| async move {
                let raw = this.attempt_json(Method::POST, path, Some(body)).await?;
                this.codec.parse_response(raw)
            })
            .await
    }

    /// Streaming chat completion.
    ///
    /// Opening the stream (connect, status, first body chunk) is retried
    /// like any other call. Afterwards each read is bounded by the
    /// per-attempt timeout. The stream always ends with exactly one `Done`
    /// or `Error` event unless the consumer drops it first.
    ///
    /// The breaker sees one outcome per stream: success with `Done`,
    /// failure with `Error`. A stream dropped by its consumer releases the
    /// upstream connection and reports nothing.
    pub fn stream_chat_completion(
        self: Arc<Self>,
        request: UnifiedRequest,
    ) -> impl Stream<Item = StreamEvent> + Send + 'static {
        async_stream::stream! {
            let mut body = self.codec.build_request(&request);
            body["stream"] = Value::Bool(true);

            let opened = {
                let this = &*self;
                let body = &body;
                self.executor
                    .execute_deferred(move |_| this.attempt_open_stream(body))
                    .await
            };
            let OpenedStream { first, mut rest } = match opened {
                Ok(opened) => opened,
                Err(error) => {
                    yield StreamEvent::Error(error);
                    return;
                }
            };

            let breaker = Arc::clone(self.breaker());
            let mut decoder = StreamDecoder::new(self.codec);
            for event in decoder.feed(&first) {
                report_outcome(&breaker, &event);
                yield event;
            }

            while !decoder.is_finished() {
                match tokio::time::timeout(self.timeout, rest.next()).await {
                    Ok(Some(Ok(chunk))) => {
                        for event in decoder.feed(&chunk) {
                            report_outcome(&breaker, &event);
                            yield event;
                        }
                    }
                    Ok(Some(Err(e))) => {
                        let error = UpstreamError::from(e);
                        tracing::error!(error = %error, "Upstream stream failed mid-response");
                        breaker.record_failure();
                        yield StreamEvent::Error(error);
                        return;
                    }
                    Ok(None) => {
                        for event in decoder.finish() {
                            report_outcome(&breaker, &event);
                            yield event;
                        }
                    }
                    Err(_) => {
                        let error = self.timeout_error("stream read");
                        tracing::error!(error = %error, "Upstream stream stalled");
                        breaker.record_failure();
                        yield StreamEvent::Error(error);
                        return;
                    }
                }
            }
            tracing::debug!("Upstream stream completed");
        }
    }

    // ========================================================================
    // Single attempts
    // ========================================================================

    fn request(&self, method: Method, path: &str, body: Option<&Value>) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self.http.request(method, url);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }
        builder
    }

    fn timeout_error(&self, stage: &str) -> UpstreamError {
        UpstreamError::Timeout(format!(
            "{} exceeded {:.1}s",
            stage,
            self.timeout.as_secs_f64()
        ))
    }

    async fn with_timeout<T>(
        &self,
        stage: &str,
        attempt: impl Future<Output = Result<T, UpstreamError>>,
    ) -> Result<T, UpstreamError> {
        tokio::time::timeout(self.timeout, attempt)
            .await
            .map_err(|_| self.timeout_error(stage))?
    }

    /// One JSON request/response exchange. Any non-2xx status fails.
    async fn attempt_json(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, UpstreamError> {
        self.with_timeout("request", async {
            let response = self.request(method, path, body).send().await?;
            let response = error_for_status(response).await?;
            read_json(response).await
        })
        .await
    }

    /// Like [`attempt_json`](Self::attempt_json), but a 404 yields `None`
    /// when `allow_not_found` is set.
    async fn attempt_lookup(
        &self,
        path: &str,
        allow_not_found: bool,
    ) -> Result<Option<Value>, UpstreamError> {
        self.with_timeout("request", async {
            let response = self.request(Method::GET, path, None).send().await?;
            if allow_not_found && response.status() == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            let response = error_for_status(response).await?;
            read_json(response).await.map(Some)
        })
        .await
    }

    async fn attempt_open_stream(&self, body: &Value) -> Result<OpenedStream, UpstreamError> {
        self.with_timeout("stream open", async {
            let response = self
                .request(Method::POST, self.codec.chat_path(), Some(body))
                .send()
                .await?;
            let response = error_for_status(response).await?;

            let mut rest: ByteStream = Box::pin(response.bytes_stream());
            let first = match rest.next().await {
                Some(chunk) => chunk?,
                None => Bytes::new(),
            };
            Ok(OpenedStream { first, rest })
        })
        .await
    }
}

async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response, UpstreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY_LEN {
        let mut cut = MAX_ERROR_BODY_LEN;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    tracing::debug!(status = status.as_u16(), body = %body, "Upstream returned error status");
    Err(UpstreamError::Http {
        status: status.as_u16(),
        body,
    })
}

/// Report a terminal stream event to the breaker.
fn report_outcome(breaker: &CircuitBreaker, event: &StreamEvent) {
    match event {
        StreamEvent::Done { .. } => breaker.record_success(),
        StreamEvent::Error(_) => breaker.record_failure(),
        StreamEvent::Token { .. } => {}
    }
}

async fn read_json(response: reqwest::Response) -> Result<Value, UpstreamError> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| UpstreamError::Decode(e.to_string()))
}
