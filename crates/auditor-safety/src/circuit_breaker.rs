//! Circuit breaker guarding the executor against cascading remote failures.
//!
//! State machine (spec.md §4.5, §8):
//!
//! ```text
//! CLOSED --[failureThreshold consecutive failures]--> OPEN
//! OPEN   --[recoveryTimeout elapsed]----------------> HALF_OPEN
//! HALF_OPEN --[halfOpenMaxCalls consecutive successes]--> CLOSED
//! HALF_OPEN --[any failure]--------------------------> OPEN
//! ```
//!
//! OPEN never transitions directly to CLOSED; it must pass through
//! HALF_OPEN. All counters are guarded by a single `parking_lot::Mutex`
//! so that state transitions are serialized (spec.md §5 "Shared mutable
//! resources").

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Externally observable state of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    /// Calls are allowed; failures are being counted.
    Closed,
    /// Calls are rejected until `recovery_timeout` elapses.
    Open,
    /// A limited number of trial calls are allowed.
    HalfOpen,
}

/// Tunable parameters for the circuit breaker.
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures in CLOSED before tripping to OPEN.
    pub failure_threshold: u32,
    /// How long OPEN is held before allowing a HALF_OPEN trial.
    pub recovery_timeout: Duration,
    /// Consecutive successes in HALF_OPEN required to close the circuit.
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            half_open_max_calls: 3,
        }
    }
}

struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
}

/// Process-wide circuit breaker. One instance is shared (via `Arc`) across
/// all workers executing actions in a session.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Construct a breaker starting CLOSED with a zeroed failure count.
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                opened_at: None,
            }),
        }
    }

    /// Current state, resolving an elapsed OPEN recovery timeout into
    /// HALF_OPEN as a side effect (mirrors the spec's "OPEN -> HALF_OPEN
    /// after recoveryTimeout elapsed" transition, which is observed lazily
    /// rather than on a timer thread).
    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock();
        self.maybe_recover(&mut inner);
        inner.state
    }

    fn maybe_recover(&self, inner: &mut Inner) {
        if inner.state == CircuitState::Open {
            if let Some(opened_at) = inner.opened_at {
                if opened_at.elapsed() >= self.config.recovery_timeout {
                    inner.state = CircuitState::HalfOpen;
                    inner.consecutive_successes = 0;
                }
            }
        }
    }

    /// Whether a new call may proceed right now.
    pub fn allow_call(&self) -> bool {
        let mut inner = self.inner.lock();
        self.maybe_recover(&mut inner);
        !matches!(inner.state, CircuitState::Open)
    }

    /// Record a successful executor call.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        self.maybe_recover(&mut inner);
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = inner.consecutive_failures.saturating_sub(1);
            }
            CircuitState::HalfOpen => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.half_open_max_calls {
                    inner.state = CircuitState::Closed;
                    inner.consecutive_failures = 0;
                    inner.consecutive_successes = 0;
                    inner.opened_at = None;
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Record a failed executor call.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        self.maybe_recover(&mut inner);
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.consecutive_successes = 0;
            }
            CircuitState::Open => {}
        }
    }
}
