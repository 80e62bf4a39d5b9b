//! Circuit breaker guarding the upstream model server.
//!
//! One breaker exists per upstream client. It only ever observes the final
//! outcome of a logical call; the retry executor reports to it after
//! retries are exhausted.
//!
//! ```text
//! Closed ──(threshold failures)──► Open ──(cooldown elapsed)──► HalfOpen
//!   ▲                               ▲                              │
//!   │                               └────────(trial fails)─────────┤
//!   └─────────────────────────(any success)────────────────────────┘
//! ```

use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use crate::core::metrics::get_metrics;

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub const fn as_label(self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }

    const fn gauge_value(self) -> i64 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_label())
    }
}

// Failure count only exists while closed and the open timestamp only
// while open, so neither can be read in the wrong state.
#[derive(Debug, Clone, Copy)]
enum Phase {
    Closed { failures: u32 },
    Open { opened_at: Instant },
    HalfOpen,
}

impl Phase {
    fn state(&self) -> CircuitState {
        match self {
            Phase::Closed { .. } => CircuitState::Closed,
            Phase::Open { .. } => CircuitState::Open,
            Phase::HalfOpen => CircuitState::HalfOpen,
        }
    }
}

/// Thread-safe circuit breaker.
///
/// Transitions are serialized by a mutex held only for the duration of a
/// state update, never across I/O.
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    phase: Mutex<Phase>,
}

impl CircuitBreaker {
    /// Create a closed breaker. A zero threshold is treated as one.
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown,
            phase: Mutex::new(Phase::Closed { failures: 0 }),
        }
    }

    /// Whether an attempt may be made now.
    ///
    /// In `Open`, once the cooldown has elapsed this moves to `HalfOpen`
    /// and admits the caller as a trial request.
    pub fn allow_request(&self) -> bool {
        let mut phase = self.lock();
        match *phase {
            Phase::Closed { .. } | Phase::HalfOpen => true,
            Phase::Open { opened_at } => {
                if opened_at.elapsed() >= self.cooldown {
                    *phase = Phase::HalfOpen;
                    drop(phase);
                    self.publish(CircuitState::HalfOpen);
                    tracing::info!(state = "half_open", "Circuit breaker cooldown elapsed, probing upstream");
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Reset to `Closed` with no recorded failures.
    pub fn record_success(&self) {
        let mut phase = self.lock();
        let previous = phase.state();
        *phase = Phase::Closed { failures: 0 };
        drop(phase);

        if previous != CircuitState::Closed {
            self.publish(CircuitState::Closed);
            tracing::info!(from = %previous, "Circuit breaker closed");
        }
    }

    /// Record the failure of a logical call.
    pub fn record_failure(&self) {
        let mut phase = self.lock();
        let next = match *phase {
            Phase::HalfOpen => Phase::Open {
                opened_at: Instant::now(),
            },
            Phase::Closed { failures } => {
                let failures = failures.saturating_add(1);
                if failures >= self.threshold {
                    Phase::Open {
                        opened_at: Instant::now(),
                    }
                } else {
                    Phase::Closed { failures }
                }
            }
            // Late failure from a call admitted before the trip
            Phase::Open { opened_at } => Phase::Open { opened_at },
        };
        let tripped = !matches!(*phase, Phase::Open { .. }) && matches!(next, Phase::Open { .. });
        *phase = next;
        drop(phase);

        if tripped {
            get_metrics().circuit_trips.inc();
            self.publish(CircuitState::Open);
            tracing::warn!(
                threshold = self.threshold,
                cooldown_secs = self.cooldown.as_secs_f64(),
                "Circuit breaker opened"
            );
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state()
    }

    /// Consecutive failures recorded while closed.
    pub fn failure_count(&self) -> u32 {
        match *self.lock() {
            Phase::Closed { failures } => failures,
            _ => 0,
        }
    }

    fn publish(&self, state: CircuitState) {
        get_metrics().circuit_state.set(state.gauge_value());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Phase> {
        // Every critical section leaves a valid phase behind
        self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }
}
