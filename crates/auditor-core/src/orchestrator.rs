//! Orchestrator/session glue: wires ingestor → detector → remediation →
//! planner → executor for a batch of integrations, bounding concurrency
//! and assembling the run's `SessionSummary` (spec.md §5, §7 "user-visible
//! behavior").

use std::collections::HashMap;
use std::sync::Arc;

use auditor_safety::{CircuitBreaker, RateLimiter};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::executor::{execute_plan, ActionExecutor, CancellationSignal, ExecuteOptions, SafetyGate};
use crate::model::{AuditResult, ExecutionPlan, ExecutionResult, IntegrationSnapshot, SessionSummary};
use crate::planner::{create_execution_plan, PlanOptions};
use crate::remediation::{generate_actions, RemediationContext, RemediationNote};
use crate::rules::{BusinessRules, RemediationLogic};
use crate::{detector, error::Result};

/// Session-wide safety collaborators. The circuit breaker and rate limiter
/// track process-wide state (spec.md §5), so a single pair is constructed
/// once per session and shared — via `Arc` — across every concurrently
/// processed integration, rather than one breaker/limiter per integration.
#[derive(Clone)]
pub struct SafetyHandles {
    pub circuit_breaker: Arc<CircuitBreaker>,
    pub rate_limiter: Arc<RateLimiter>,
}

/// Per-session options that don't vary per integration.
#[derive(Clone)]
pub struct SessionOptions {
    pub operator_id: String,
    pub session_id: String,
    pub session_dir: String,
    pub dry_run: bool,
    pub max_ops_per_integration: u32,
    pub max_concurrent_integrations: usize,
    pub execute: ExecuteOptions,
    pub safety: Option<SafetyHandles>,
}

/// Per-integration outcome recorded for the session summary and (by the
/// caller) written to the audit log / restore bundle.
pub struct IntegrationOutcome {
    pub integration_id: String,
    pub audit: AuditResult,
    pub notes: Vec<RemediationNote>,
    pub plan: ExecutionPlan,
    pub result: ExecutionResult,
}

/// Process one snapshot end-to-end: detect, remediate, plan, execute.
/// Detector/remediation failures never propagate past this function; an
/// internal panic-free error downgrades to a `detector-internal` audit
/// event and an empty plan (callers should prefer catching panics with
/// `std::panic::catch_unwind` only at a higher boundary if pure-Rust code
/// from trusted config can still misbehave; this function itself cannot
/// fail).
pub async fn process_integration(
    snapshot: &IntegrationSnapshot,
    rules: &BusinessRules,
    logic: &RemediationLogic,
    executor: &dyn ActionExecutor,
    cancellation: &CancellationSignal,
    opts: &SessionOptions,
) -> IntegrationOutcome {
    let audit = detector::detect(snapshot, rules);

    let ctx = RemediationContext {
        integration_id: snapshot.id.clone(),
        email: snapshot.email.clone(),
        store_count: snapshot.store_count,
        edition: snapshot.license_edition.clone(),
        operator_id: opts.operator_id.clone(),
        dry_run: opts.dry_run,
        max_ops_per_integration: opts.max_ops_per_integration,
    };

    let snapshot_value = serde_json::to_value(snapshot).unwrap_or_default();
    let outcome = generate_actions(&audit.corruption_events, &snapshot_value, logic, &ctx);

    let plan = create_execution_plan(
        &snapshot.id,
        outcome.actions,
        PlanOptions {
            max_ops_per_integration: opts.max_ops_per_integration,
            abort_on_first_failure: false,
        },
    );

    let mut execute_options = opts.execute;
    execute_options.dry_run = opts.dry_run;

    let safety_gate = opts.safety.as_ref().map(|s| SafetyGate {
        circuit_breaker: s.circuit_breaker.as_ref(),
        rate_limiter: s.rate_limiter.as_ref(),
    });

    let result = execute_plan(
        &plan,
        executor,
        execute_options,
        cancellation,
        safety_gate,
        |action, success| {
            if success {
                tracing::debug!(action_id = %action.id, integration_id = %snapshot.id, "action succeeded");
            } else {
                warn!(action_id = %action.id, integration_id = %snapshot.id, "action failed");
            }
        },
    )
    .await;

    IntegrationOutcome {
        integration_id: snapshot.id.clone(),
        audit,
        notes: outcome.notes,
        plan,
        result,
    }
}

/// Run the full pipeline over a batch of snapshots, bounding concurrency
/// at `opts.max_concurrent_integrations` (spec.md §5).
pub async fn run_session(
    snapshots: Vec<IntegrationSnapshot>,
    rules: Arc<BusinessRules>,
    logic: Arc<RemediationLogic>,
    executor: Arc<dyn ActionExecutor>,
    cancellation: CancellationSignal,
    opts: SessionOptions,
) -> Result<(SessionSummary, Vec<IntegrationOutcome>)> {
    let semaphore = Arc::new(Semaphore::new(opts.max_concurrent_integrations.max(1)));
    let mut handles = Vec::with_capacity(snapshots.len());

    for snapshot in snapshots {
        let permit_semaphore = semaphore.clone();
        let rules = rules.clone();
        let logic = logic.clone();
        let executor = executor.clone();
        let cancellation = cancellation.clone();
        let opts = opts.clone();

        handles.push(tokio::spawn(async move {
            let _permit = permit_semaphore.acquire_owned().await.expect("semaphore not closed");
            if cancellation.is_cancelled() {
                return None;
            }
            Some(process_integration(&snapshot, &rules, &logic, executor.as_ref(), &cancellation, &opts).await)
        }));
    }

    let mut outcomes = Vec::new();
    for handle in handles {
        match handle.await {
            Ok(Some(outcome)) => outcomes.push(outcome),
            Ok(None) => {}
            Err(join_err) => error!(?join_err, "integration task panicked"),
        }
    }

    let mut events_by_severity: HashMap<String, u32> = HashMap::new();
    let mut actions_planned = 0u32;
    let mut actions_executed = 0u32;
    let mut actions_failed = 0u32;
    let mut actions_skipped = 0u32;

    for outcome in &outcomes {
        for (severity, count) in outcome.audit.events_by_severity() {
            *events_by_severity.entry(format!("{severity:?}").to_lowercase()).or_insert(0) += count;
        }
        actions_planned += outcome.plan.actions.len() as u32;
        actions_executed += outcome.result.actions.executed.len() as u32;
        actions_failed += outcome.result.actions.failed.len() as u32;
        actions_skipped += outcome.result.actions.skipped.len() as u32;
    }

    info!(
        integrations = outcomes.len(),
        actions_planned, actions_executed, actions_failed, actions_skipped,
        "session complete"
    );

    let summary = SessionSummary {
        session_id: opts.session_id.clone(),
        integrations_processed: outcomes.len() as u32,
        events_by_severity,
        actions_planned,
        actions_executed,
        actions_failed,
        actions_skipped,
        restore_bundle_id: None,
        session_dir: opts.session_dir.clone(),
    };

    Ok((summary, outcomes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecutorError;
    use crate::model::ActionOutcome;
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;

    struct AlwaysSucceeds;

    #[async_trait]
    impl ActionExecutor for AlwaysSucceeds {
        async fn execute_action(
            &self,
            action: &crate::model::ExecutionAction,
        ) -> std::result::Result<ActionOutcome, ExecutorError> {
            Ok(ActionOutcome {
                action_id: action.id.clone(),
                after: None,
            })
        }
    }

    fn rules() -> BusinessRules {
        BusinessRules::parse(
            r#"{
                "editionRequirements": {"starter": {"importsPerStore": 0, "exportsPerStore": 0, "flowsPerStore": 0}},
                "licenseValidation": {"validEditions": ["starter"], "maxSettingsSize": 100000}
            }"#,
        )
        .unwrap()
    }

    fn snapshot(id: &str) -> IntegrationSnapshot {
        IntegrationSnapshot {
            id: id.to_string(),
            email: "a@b.com".into(),
            user_id: "u1".into(),
            version: "1.0".into(),
            store_count: 1,
            license_edition: "starter".into(),
            update_in_progress: true,
            settings: json!({ "connectorEdition": "starter" }),
            imports: vec![],
            exports: vec![],
            flows: vec![],
            connections: vec![],
            source_row: None,
        }
    }

    fn opts() -> SessionOptions {
        SessionOptions {
            operator_id: "op".into(),
            session_id: "session-1".into(),
            session_dir: "/tmp/session-1".into(),
            dry_run: true,
            max_ops_per_integration: 50,
            max_concurrent_integrations: 4,
            execute: ExecuteOptions {
                dry_run: true,
                stop_on_failure: true,
                per_action_timeout: Duration::from_secs(5),
                backoff: Default::default(),
            },
            safety: None,
        }
    }

    #[tokio::test]
    async fn process_integration_detects_stuck_update_and_dry_runs_the_fix() {
        let logic = RemediationLogic {
            rules: HashMap::new(),
        };
        let outcome = process_integration(
            &snapshot("test-002"),
            &rules(),
            &logic,
            &AlwaysSucceeds,
            &CancellationSignal::new(),
            &opts(),
        )
        .await;
        assert!(outcome
            .audit
            .corruption_events
            .iter()
            .any(|e| e.corruption_type == "stuck-in-update-process"));
    }

    #[tokio::test]
    async fn run_session_aggregates_across_integrations() {
        let logic = Arc::new(RemediationLogic {
            rules: HashMap::new(),
        });
        let snapshots = vec![snapshot("test-a"), snapshot("test-b")];
        let (summary, outcomes) = run_session(
            snapshots,
            Arc::new(rules()),
            logic,
            Arc::new(AlwaysSucceeds) as Arc<dyn ActionExecutor>,
            CancellationSignal::new(),
            opts(),
        )
        .await
        .unwrap();
        assert_eq!(summary.integrations_processed, 2);
        assert_eq!(outcomes.len(), 2);
    }

    struct AlwaysFails;

    #[async_trait]
    impl ActionExecutor for AlwaysFails {
        async fn execute_action(
            &self,
            _action: &crate::model::ExecutionAction,
        ) -> std::result::Result<ActionOutcome, ExecutorError> {
            Err(ExecutorError::Permanent("boom".to_string()))
        }
    }

    fn remediation_logic_for_stuck_update() -> RemediationLogic {
        RemediationLogic::parse(
            r#"{
                "stuck-in-update-process": [{
                    "id": "clear-update-flag",
                    "actionType": "update",
                    "targetType": "integration",
                    "resourceType": "integration",
                    "payloadTemplate": {"updateInProgress": "false"},
                    "priority": 1,
                    "rollbackable": true
                }]
            }"#,
        )
        .unwrap()
    }

    /// The circuit breaker and rate limiter are session-wide (spec.md §5):
    /// a single shared `SafetyHandles` pair is threaded through every
    /// concurrently processed integration, so failures anywhere in the
    /// session count toward the same breaker, which ends the session open.
    #[tokio::test]
    async fn session_wide_circuit_breaker_trips_across_integrations() {
        use auditor_safety::CircuitBreakerConfig;

        let handles = SafetyHandles {
            circuit_breaker: Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
                failure_threshold: 1,
                ..Default::default()
            })),
            rate_limiter: Arc::new(RateLimiter::new(Default::default())),
        };

        let mut session_opts = opts();
        session_opts.dry_run = false;
        session_opts.execute.dry_run = false;
        session_opts.safety = Some(handles.clone());

        let snapshots = vec![snapshot("test-a"), snapshot("test-b")];
        let (_summary, outcomes) = run_session(
            snapshots,
            Arc::new(rules()),
            Arc::new(remediation_logic_for_stuck_update()),
            Arc::new(AlwaysFails) as Arc<dyn ActionExecutor>,
            CancellationSignal::new(),
            session_opts,
        )
        .await
        .unwrap();

        assert_eq!(outcomes.len(), 2);
        assert_eq!(
            handles.circuit_breaker.state(),
            auditor_safety::CircuitState::Open
        );
        for outcome in &outcomes {
            assert!(!outcome.plan.actions.is_empty());
            assert!(!outcome.result.actions.failed.is_empty());
        }
    }
}
