//! Executor harness: runs an `ExecutionPlan` against an injected
//! `ActionExecutor`, with retry/backoff, per-action timeout, cooperative
//! cancellation and rollback bookkeeping (spec.md §4.4).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use auditor_safety::{CircuitBreaker, RateLimiter};
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::model::{
    ActionOutcome, ActionRecord, ActionResults, ExecutionAction, ExecutionPlan, ExecutionResult,
};

/// Errors an `ActionExecutor` implementation may return. Transient errors
/// are retried with backoff; permanent errors are not.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("transient executor error: {0}")]
    Transient(String),
    #[error("permanent executor error: {0}")]
    Permanent(String),
}

impl ExecutorError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Side-effect engine contract; the core never implements this itself.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Apply one action against the external system.
    async fn execute_action(&self, action: &ExecutionAction) -> Result<ActionOutcome, ExecutorError>;
}

/// Cooperative cancellation handle, shared between the orchestrator and
/// whatever signal handler observes Ctrl-C / a session deadline.
#[derive(Clone)]
pub struct CancellationSignal {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancellationSignal {
    #[must_use]
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel()` has been called; a no-op future if it
    /// already has. Used to race cancellation-aware waits (rate-limiter
    /// token acquisition, backoff sleeps) per spec.md §5 "Cancellation &
    /// timeouts".
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for CancellationSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Backoff parameters for retried executor calls.
#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    pub max_attempts: u32,
    pub base: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base: Duration::from_millis(200),
            multiplier: 2.0,
            max_delay: Duration::from_secs(10),
        }
    }
}

impl BackoffConfig {
    /// Delay before attempt number `attempt` (1-based), capped at
    /// `max_delay`. Deterministic: no jitter, so tests can assert on the
    /// exact schedule.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let scaled = self.base.as_secs_f64() * self.multiplier.powi(attempt as i32 - 1);
        Duration::from_secs_f64(scaled).min(self.max_delay)
    }
}

/// Options controlling `execute_plan`.
#[derive(Debug, Clone, Copy)]
pub struct ExecuteOptions {
    pub dry_run: bool,
    pub stop_on_failure: bool,
    pub per_action_timeout: Duration,
    pub backoff: BackoffConfig,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            stop_on_failure: true,
            per_action_timeout: Duration::from_secs(30),
            backoff: BackoffConfig::default(),
        }
    }
}

/// Safety collaborators consulted per action (spec.md §4.4 step 1: "Consult
/// `Safety.canProceed()` (circuit breaker + rate limiter token)"). Optional
/// so unit tests and dry-run-only callers can exercise the executor without
/// a full `auditor-safety` setup.
#[derive(Clone)]
pub struct SafetyGate<'a> {
    pub circuit_breaker: &'a CircuitBreaker,
    pub rate_limiter: &'a RateLimiter,
}

/// Run every action in `plan` against `executor`, honoring `options` and
/// `cancellation`. `on_outcome` is invoked after each attempted action so
/// the caller (orchestrator) can notify the safety controller's circuit
/// breaker and write an audit entry; it receives `true` on success.
///
/// When `safety` is supplied, each non-dry-run dispatch first blocks on a
/// rate-limiter token and checks `circuit_breaker.allow_call()`; an open
/// breaker fails the action immediately (without consulting the executor)
/// and is itself recorded as a failure, matching spec.md §4.4/§4.5.
pub async fn execute_plan<F>(
    plan: &ExecutionPlan,
    executor: &dyn ActionExecutor,
    options: ExecuteOptions,
    cancellation: &CancellationSignal,
    safety: Option<SafetyGate<'_>>,
    mut on_outcome: F,
) -> ExecutionResult
where
    F: FnMut(&ExecutionAction, bool),
{
    let start = Instant::now();
    let mut results = ActionResults::default();
    let mut stop = false;

    for action in &plan.actions {
        if stop || cancellation.is_cancelled() {
            results.skipped.push(ActionRecord {
                action_id: action.id.clone(),
                error: Some("skipped: prior failure or cancellation".to_string()),
                retry_attempt: 0,
                duration_ms: 0,
            });
            continue;
        }

        if options.dry_run {
            debug!(action_id = %action.id, "dry-run: skipping executor dispatch");
            results.executed.push(ActionRecord {
                action_id: action.id.clone(),
                error: None,
                retry_attempt: 0,
                duration_ms: 0,
            });
            on_outcome(action, true);
            continue;
        }

        let attempt_start = Instant::now();
        let mut last_error = None;
        let mut succeeded = false;
        let mut attempt = 0;

        while attempt < options.backoff.max_attempts {
            attempt += 1;

            if let Some(gate) = &safety {
                if !gate.circuit_breaker.allow_call() {
                    last_error = Some("circuit breaker is open".to_string());
                    break;
                }
                tokio::select! {
                    () = gate.rate_limiter.acquire() => {}
                    () = cancellation.cancelled() => {
                        last_error = Some("cancelled waiting for rate-limiter token".to_string());
                        break;
                    }
                }
            }

            let call = tokio::time::timeout(
                options.per_action_timeout,
                executor.execute_action(action),
            )
            .await;

            match call {
                Ok(Ok(_outcome)) => {
                    succeeded = true;
                    if let Some(gate) = &safety {
                        gate.circuit_breaker.record_success();
                    }
                    break;
                }
                Ok(Err(err)) => {
                    let transient = err.is_transient();
                    last_error = Some(err.to_string());
                    if let Some(gate) = &safety {
                        gate.circuit_breaker.record_failure();
                    }
                    if !transient {
                        break;
                    }
                    if attempt < options.backoff.max_attempts {
                        let delay = options.backoff.delay_for(attempt);
                        warn!(action_id = %action.id, attempt, ?delay, "retrying after transient executor error");
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(_elapsed) => {
                    last_error = Some("executor call timed out".to_string());
                    if let Some(gate) = &safety {
                        gate.circuit_breaker.record_failure();
                    }
                }
            }

            if cancellation.is_cancelled() {
                break;
            }
        }

        let duration_ms = attempt_start.elapsed().as_millis() as u64;
        on_outcome(action, succeeded);

        if succeeded {
            results.executed.push(ActionRecord {
                action_id: action.id.clone(),
                error: None,
                retry_attempt: attempt,
                duration_ms,
            });
        } else {
            results.failed.push(ActionRecord {
                action_id: action.id.clone(),
                error: last_error,
                retry_attempt: attempt,
                duration_ms,
            });
            if options.stop_on_failure || plan.safety.abort_on_first_failure {
                stop = true;
            }
        }
    }

    let status = ExecutionResult::derive_status(&results);
    let rollback = if status != crate::model::ExecutionStatus::Success {
        Some(plan.safety.rollback_plan.clone())
    } else {
        None
    };

    ExecutionResult {
        plan_id: plan.plan_id.clone(),
        integration_id: plan.integration_id.clone(),
        status,
        actions: results,
        duration_ms: start.elapsed().as_millis() as u64,
        rollback,
    }
}
