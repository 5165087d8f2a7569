// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! `fix` — the full detect → remediate → plan → safety-gate → execute
//! pipeline (spec.md §4, §6 "fix" flags).
//!
//! The remote side-effect engine is out of scope (spec.md §1); this
//! command dispatches every action against `auditor_testing::MockExecutor`,
//! the same test double the crate's own suite uses, standing in for a real
//! `ActionExecutor` until one is wired in by an embedder.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use auditor_audit::{
    create_restore_bundle, save, ActionLog, AuditLogEntry, AuditLogger, ContextInfo, ExecutionLog,
    ExecutionResultLog, ProcessingStateRecord, ProcessingStatus, RestoreBundleIntegration, RollbackInfo,
    SqliteStateStore, StateStore,
};
use auditor_core::detector;
use auditor_core::executor::{CancellationSignal, ExecuteOptions};
use auditor_core::model::{ExecutionStatus, IntegrationSnapshot, Severity};
use auditor_core::orchestrator::{run_session, SafetyHandles, SessionOptions};
use auditor_core::planner::{create_execution_plan, PlanOptions};
use auditor_core::remediation::{generate_actions, RemediationContext};
use auditor_safety::{
    perform_preflight_check, Allowlist, CircuitBreaker, MaintenanceWindow, PlanSummary, RateLimiter, SafetyConfig,
};
use chrono::Utc;
use clap::Args;
use sha2::{Digest, Sha256};

use crate::helpers;
use crate::outcome::CliOutcome;
use crate::output::{create_table, print_error, print_info, print_success, print_warning};

/// Run the full remediation pipeline against a fleet of ingested
/// integrations.
#[derive(Args)]
pub struct FixArgs {
    #[arg(long, default_value = "input")]
    pub input_dir: PathBuf,

    #[arg(long, default_value = "config")]
    pub config_dir: PathBuf,

    #[arg(long, default_value = "output")]
    pub output_dir: PathBuf,

    /// Path to the sqlite processing-state database. Defaults to
    /// `<output_dir>/state.db`.
    #[arg(long)]
    pub state_db: Option<PathBuf>,

    /// `tier1`, `tier2`, `tier3` or `all`.
    #[arg(long, default_value = "all")]
    pub tier: String,

    /// Business-rules edition overlay (see `--product`/`--version`).
    #[arg(long)]
    pub edition: Option<String>,

    /// Product version, paired with `--product`.
    #[arg(long)]
    pub version: Option<String>,

    /// Product name, for a per-product business-rules override.
    #[arg(long)]
    pub product: Option<String>,

    /// Plan and report only; never dispatch actions. This is the default.
    #[arg(long, conflicts_with = "apply")]
    pub dry_run: bool,

    /// Dispatch actions against the injected executor.
    #[arg(long)]
    pub apply: bool,

    /// Restrict the run to these integration ids (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub allowlist: Vec<String>,

    /// Restrict the run to these account/user ids (comma-separated).
    #[arg(long = "allowlist-accounts", value_delimiter = ',')]
    pub allowlist_accounts: Vec<String>,

    #[arg(long)]
    pub max_ops_per_integration: Option<u32>,

    #[arg(long)]
    pub max_concurrent: Option<usize>,

    /// Requests per second the rate limiter admits.
    #[arg(long)]
    pub rate_limit: Option<f64>,

    /// Process at most this many integrations (after allowlist filtering).
    #[arg(long)]
    pub batch_size: Option<usize>,

    #[arg(long, default_value = "cli-operator")]
    pub operator_id: String,

    /// Override soft blockers (maintenance window, confirmation
    /// thresholds); never overrides a hard cap or an open circuit breaker.
    #[arg(long)]
    pub force_confirmation: bool,

    /// Write a restore bundle for this run (ignored in `--dry-run`).
    #[arg(long)]
    pub create_restore_bundle: bool,

    /// e.g. `"Sat 00:00-23:59"`; overrides `AUDITOR_MAINTENANCE_WINDOW`.
    #[arg(long)]
    pub maintenance_window: Option<String>,

    /// Reprocess integrations regardless of the state store's
    /// last-processed record.
    #[arg(long)]
    pub force_reprocess: bool,

    /// Skip integrations processed more recently than this many seconds
    /// ago (ignored with `--force-reprocess`).
    #[arg(long)]
    pub max_age: Option<u64>,
}

fn result_hash(snapshot_id: &str, status: ExecutionStatus) -> String {
    let mut hasher = Sha256::new();
    hasher.update(snapshot_id.as_bytes());
    hasher.update(format!("{status:?}").as_bytes());
    hex::encode(hasher.finalize())
}

pub async fn run(args: FixArgs) -> Result<CliOutcome> {
    let dry_run = !args.apply;
    let tiers = helpers::parse_tiers(&args.tier)?;

    let rules = match helpers::load_business_rules(&args.config_dir, args.product.as_deref(), args.version.as_deref())
    {
        Ok(rules) => rules,
        Err(err) => {
            print_error(&format!("{err:#}"));
            return Ok(CliOutcome::ConfigOrIngestError);
        }
    };
    let logic = match helpers::load_remediation_logic(&args.config_dir) {
        Ok(logic) => logic,
        Err(err) => {
            print_error(&format!("{err:#}"));
            return Ok(CliOutcome::ConfigOrIngestError);
        }
    };

    let (mut snapshots, warnings) = match helpers::ingest_tiers(&args.input_dir, &tiers) {
        Ok(outcome) => outcome,
        Err(err) => {
            print_error(&format!("{err:#}"));
            return Ok(CliOutcome::ConfigOrIngestError);
        }
    };
    for warning in &warnings {
        print_warning(&format!("{}: {}", warning.integration_id, warning.message));
    }

    let mut safety = SafetyConfig::from_env().context("loading safety config from environment")?;
    if !args.allowlist.is_empty() || !args.allowlist_accounts.is_empty() {
        safety.allowlist = Allowlist::new(args.allowlist.clone(), args.allowlist_accounts.clone());
    }
    if let Some(v) = args.max_ops_per_integration {
        safety.caps.max_ops_per_integration = v;
    }
    if let Some(v) = args.max_concurrent {
        safety.caps.max_concurrent_integrations = v as u32;
    }
    if let Some(v) = args.rate_limit {
        safety.rate_limit.requests_per_second = v;
    }
    if let Some(raw) = &args.maintenance_window {
        safety.maintenance_window = MaintenanceWindow::parse(raw);
    }
    if args.force_confirmation {
        safety.force_confirmation = true;
    }

    snapshots.retain(|s| safety.allowlist.allows_integration(&s.id) && safety.allowlist.allows_account(&s.user_id));
    if let Some(batch_size) = args.batch_size {
        snapshots.truncate(batch_size);
    }

    let state_db = args.state_db.clone().unwrap_or_else(|| args.output_dir.join("state.db"));
    if let Some(parent) = state_db.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let state_store = SqliteStateStore::open(&state_db).context("opening processing-state store")?;

    let max_age = args.max_age.map(Duration::from_secs);
    let mut to_process = Vec::with_capacity(snapshots.len());
    let mut skipped_already_processed = 0u32;
    for snapshot in snapshots {
        let should = state_store
            .should_reprocess(&snapshot.id, &args.operator_id, max_age, args.force_reprocess)
            .await
            .context("querying processing-state store")?;
        if should {
            to_process.push(snapshot);
        } else {
            skipped_already_processed += 1;
        }
    }
    if skipped_already_processed > 0 {
        print_info(&format!(
            "skipping {skipped_already_processed} integration(s) already processed within the reprocess window"
        ));
    }

    // Kept aside so a restore bundle can carry each integration's
    // pre-remediation state; `run_session` consumes `to_process`.
    let before_snapshots: HashMap<String, IntegrationSnapshot> =
        to_process.iter().map(|s| (s.id.clone(), s.clone())).collect();

    let circuit_breaker = Arc::new(CircuitBreaker::new(safety.circuit_breaker));
    let rate_limiter = Arc::new(RateLimiter::new(safety.rate_limit));

    let mut plan_summaries = Vec::with_capacity(to_process.len());
    for snapshot in &to_process {
        let audit = detector::detect(snapshot, &rules);
        let ctx = RemediationContext {
            integration_id: snapshot.id.clone(),
            email: snapshot.email.clone(),
            store_count: snapshot.store_count,
            edition: snapshot.license_edition.clone(),
            operator_id: args.operator_id.clone(),
            dry_run,
            max_ops_per_integration: safety.caps.max_ops_per_integration,
        };
        let snapshot_value = serde_json::to_value(snapshot).unwrap_or_default();
        let outcome = generate_actions(&audit.corruption_events, &snapshot_value, &logic, &ctx);
        let plan = create_execution_plan(
            &snapshot.id,
            outcome.actions,
            PlanOptions {
                max_ops_per_integration: safety.caps.max_ops_per_integration,
                abort_on_first_failure: false,
            },
        );
        let high_risk = matches!(audit.overall_severity, Severity::High | Severity::Critical);
        plan_summaries.push(PlanSummary {
            integration_id: snapshot.id.clone(),
            total_actions: plan.actions.len() as u32,
            destructive_actions: plan.summary.actions_by_type.delete,
            high_risk_actions: if high_risk { plan.actions.len() as u32 } else { 0 },
        });
    }

    let preflight = perform_preflight_check(
        &plan_summaries,
        &safety.allowlist,
        safety.caps,
        safety.confirmation,
        safety.maintenance_window.as_ref(),
        &circuit_breaker,
        Utc::now(),
        safety.force_confirmation,
    );
    for warning in &preflight.warnings {
        print_warning(&warning.message);
    }
    for blocker in &preflight.blockers {
        print_error(&format!("blocked: {blocker:?}"));
    }
    if !preflight.allowed && !dry_run {
        print_error("preflight check failed; rerun with --dry-run or resolve the blockers above");
        return Ok(CliOutcome::FailedOrBlocked);
    }

    let session_id = helpers::new_session_id();
    let session_dir = helpers::prepare_session_dir(&args.output_dir, &session_id)?;
    let audit_dir = session_dir.join("audit");
    let logger = AuditLogger::new(audit_dir.clone(), false);

    let executor: Arc<dyn auditor_core::executor::ActionExecutor> = Arc::new(auditor_testing::MockExecutor::new());
    let opts = SessionOptions {
        operator_id: args.operator_id.clone(),
        session_id: session_id.clone(),
        session_dir: session_dir.display().to_string(),
        dry_run,
        max_ops_per_integration: safety.caps.max_ops_per_integration,
        max_concurrent_integrations: safety.caps.max_concurrent_integrations as usize,
        execute: ExecuteOptions::default(),
        safety: Some(SafetyHandles {
            circuit_breaker: circuit_breaker.clone(),
            rate_limiter: rate_limiter.clone(),
        }),
    };

    let (mut summary, outcomes) = run_session(
        to_process,
        Arc::new(rules),
        Arc::new(logic),
        executor,
        CancellationSignal::new(),
        opts,
    )
    .await?;

    for outcome in &outcomes {
        for record in outcome
            .result
            .actions
            .executed
            .iter()
            .chain(&outcome.result.actions.failed)
            .chain(&outcome.result.actions.skipped)
        {
            let Some(action) = outcome.plan.actions.iter().find(|a| a.id == record.action_id) else {
                continue;
            };
            let entry = AuditLogEntry {
                id: format!("{}-{}", outcome.plan.plan_id, record.action_id),
                timestamp: Utc::now(),
                operator_id: args.operator_id.clone(),
                session_id: session_id.clone(),
                integration_id: outcome.integration_id.clone(),
                action: ActionLog::from_action(action),
                execution: ExecutionLog {
                    plan_id: outcome.plan.plan_id.clone(),
                    action_id: record.action_id.clone(),
                    status: outcome.result.status,
                    duration_ms: record.duration_ms,
                    error: record.error.clone(),
                    retry_attempt: record.retry_attempt,
                },
                context: ContextInfo {
                    dry_run,
                    environment: "cli".to_string(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                },
                rollback: RollbackInfo {
                    available: action.metadata.rollbackable,
                    action_id: None,
                },
            };
            logger.log_action_best_effort(&entry);
        }

        logger.log_execution_result(&ExecutionResultLog {
            timestamp: Utc::now(),
            session_id: session_id.clone(),
            operator_id: args.operator_id.clone(),
            plan_id: outcome.plan.plan_id.clone(),
            integration_id: outcome.integration_id.clone(),
            status: outcome.result.status,
            executed: outcome.result.actions.executed.len() as u32,
            failed: outcome.result.actions.failed.len() as u32,
            skipped: outcome.result.actions.skipped.len() as u32,
            duration_ms: outcome.result.duration_ms,
        })?;

        if !dry_run {
            state_store
                .record(ProcessingStateRecord {
                    integration_id: outcome.integration_id.clone(),
                    operator_id: args.operator_id.clone(),
                    last_processed_at: Utc::now(),
                    last_result_hash: result_hash(&outcome.integration_id, outcome.result.status),
                    status: ProcessingStatus::from(outcome.result.status),
                })
                .await
                .context("recording processing state")?;
        }
    }

    if args.create_restore_bundle && !dry_run {
        let mut restore_integrations = HashMap::new();
        for outcome in &outcomes {
            let Some(before) = before_snapshots.get(&outcome.integration_id) else {
                continue;
            };
            restore_integrations.insert(
                outcome.integration_id.clone(),
                RestoreBundleIntegration {
                    before: before.clone(),
                    after: None,
                    actions: outcome.plan.actions.clone(),
                },
            );
        }
        let bundle = create_restore_bundle(&session_id, &args.operator_id, "fix run", restore_integrations);
        let path = save(&audit_dir, &bundle).context("writing restore bundle")?;
        summary.restore_bundle_id = Some(bundle.id.clone());
        print_info(&format!("restore bundle written to {}", path.display()));
    }

    print_summary_table(&summary);
    print_success(&format!("session {session_id} written to {}", session_dir.display()));

    let outcome = if !preflight.allowed || summary.actions_failed > 0 {
        CliOutcome::FailedOrBlocked
    } else {
        CliOutcome::Success
    };
    Ok(outcome)
}

fn print_summary_table(summary: &auditor_core::model::SessionSummary) {
    let mut table = create_table();
    table.set_header(vec!["metric", "value"]);
    table.add_row(vec!["integrations processed", &summary.integrations_processed.to_string()]);
    table.add_row(vec!["actions planned", &summary.actions_planned.to_string()]);
    table.add_row(vec!["actions executed", &summary.actions_executed.to_string()]);
    table.add_row(vec!["actions failed", &summary.actions_failed.to_string()]);
    table.add_row(vec!["actions skipped", &summary.actions_skipped.to_string()]);
    table.add_row(vec!["restore bundle", summary.restore_bundle_id.as_deref().unwrap_or("none")]);
    println!("{table}");
}
