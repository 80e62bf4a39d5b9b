//! Bounded exponential-backoff retry around one logical upstream call.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::core::config::ResilienceConfig;
use crate::core::error::UpstreamError;
use crate::core::error_types::AttemptOutcome;
use crate::core::metrics::get_metrics;
use crate::services::circuit_breaker::CircuitBreaker;

/// Retry bounds and backoff schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first one
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Option<Duration>,
}

impl RetryPolicy {
    pub fn from_config(config: &ResilienceConfig) -> Self {
        Self {
            max_retries: config.retry_attempts,
            base_delay: config.retry_base_delay,
            max_delay: config.retry_max_delay,
        }
    }

    /// Delay slept before retry `k` (0-indexed): `base_delay * 2^k`,
    /// clamped to `max_delay` when one is set.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        let delay = self.base_delay.saturating_mul(factor);
        match self.max_delay {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ResilienceConfig::default())
    }
}

/// Runs upstream attempts under a [`RetryPolicy`] and reports the final
/// outcome of each logical call to the shared [`CircuitBreaker`].
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    breaker: Arc<CircuitBreaker>,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy, breaker: Arc<CircuitBreaker>) -> Self {
        Self { policy, breaker }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Execute `operation` until it succeeds, fails terminally, or the
    /// retry budget is spent.
    ///
    /// The operation receives the 0-indexed attempt number. If the breaker
    /// rejects the call, `CircuitOpen` is returned without invoking it.
    /// Individual attempt failures never reach the breaker; only the final
    /// result does.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T, UpstreamError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        let value = self.run(operation).await?;
        self.breaker.record_success();
        Ok(value)
    }

    /// Like [`execute`](Self::execute), but a successful attempt is not
    /// reported to the breaker.
    ///
    /// Used when the logical call outlives the attempt, as with a stream
    /// whose body is still being read. The caller must then report exactly
    /// one outcome: `record_success` or `record_failure` once the call
    /// ends, or nothing if it is abandoned. Exhausted or terminal attempt
    /// failures are still recorded here.
    pub async fn execute_deferred<T, F, Fut>(&self, operation: F) -> Result<T, UpstreamError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        self.run(operation).await
    }

    async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, UpstreamError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        if !self.breaker.allow_request() {
            tracing::warn!("Circuit breaker open, rejecting upstream call");
            return Err(UpstreamError::CircuitOpen);
        }

        let metrics = get_metrics();
        let mut attempt = 0u32;
        loop {
            match operation(attempt).await {
                Ok(value) => {
                    metrics
                        .upstream_attempts
                        .with_label_values(&[AttemptOutcome::Success.as_str()])
                        .inc();
                    return Ok(value);
                }
                Err(error) if error.is_retryable() && attempt < self.policy.max_retries => {
                    metrics
                        .upstream_attempts
                        .with_label_values(&[AttemptOutcome::Retryable.as_str()])
                        .inc();
                    metrics.upstream_retries.inc();

                    let delay = self.policy.delay_for(attempt);
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_attempts = self.policy.max_retries + 1,
                        kind = %error.kind(),
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Upstream attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    let outcome = if error.is_retryable() {
                        AttemptOutcome::Retryable
                    } else {
                        AttemptOutcome::Terminal
                    };
                    metrics
                        .upstream_attempts
                        .with_label_values(&[outcome.as_str()])
                        .inc();
                    self.breaker.record_failure();

                    tracing::error!(
                        attempts = attempt + 1,
                        kind = %error.kind(),
                        upstream_status = ?error.upstream_status(),
                        error = %error,
                        "Upstream call failed"
                    );
                    return Err(error);
                }
            }
        }
    }
}
