// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! `audit` — ingest and detect only, no remediation or execution.
//!
//! Writes `reports/corruption-report.json` under a fresh session directory
//! and prints a per-severity summary table.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use auditor_core::detector;
use auditor_core::model::{AuditResult, Severity};
use clap::Args;
use serde::Serialize;

use crate::helpers::{self, tier_label};
use crate::output::{create_table, print_info, print_success};
use crate::outcome::CliOutcome;

/// Ingest and detect corruption without planning or executing remediation.
#[derive(Args)]
pub struct AuditArgs {
    /// Root directory containing `tier1/`, `tier2/`, `tier3/` CSV sets.
    #[arg(long, default_value = "input")]
    pub input_dir: PathBuf,

    /// Root directory containing `business-rules.json` and
    /// `remediation-logic.json`.
    #[arg(long, default_value = "config")]
    pub config_dir: PathBuf,

    /// Root directory session output is written under.
    #[arg(long, default_value = "output")]
    pub output_dir: PathBuf,

    /// `tier1`, `tier2`, `tier3` or `all`.
    #[arg(long, default_value = "all")]
    pub tier: String,

    /// Product name, for a per-product business-rules override.
    #[arg(long)]
    pub product: Option<String>,

    /// Product version, paired with `--product`.
    #[arg(long)]
    pub version: Option<String>,
}

#[derive(Serialize)]
struct IntegrationAuditEntry {
    integration_id: String,
    result: AuditResult,
}

#[derive(Serialize)]
struct CorruptionReport {
    session_id: String,
    integrations_scanned: usize,
    results: Vec<IntegrationAuditEntry>,
}

pub async fn run(args: AuditArgs) -> Result<CliOutcome> {
    let tiers = helpers::parse_tiers(&args.tier)?;
    let rules = match helpers::load_business_rules(&args.config_dir, args.product.as_deref(), args.version.as_deref())
    {
        Ok(rules) => rules,
        Err(err) => {
            crate::output::print_error(&format!("{err:#}"));
            return Ok(CliOutcome::ConfigOrIngestError);
        }
    };

    let (snapshots, warnings) = match helpers::ingest_tiers(&args.input_dir, &tiers) {
        Ok(outcome) => outcome,
        Err(err) => {
            crate::output::print_error(&format!("{err:#}"));
            return Ok(CliOutcome::ConfigOrIngestError);
        }
    };

    for warning in &warnings {
        crate::output::print_warning(&format!("{}: {}", warning.integration_id, warning.message));
    }

    print_info(&format!(
        "scanning {} integrations across {} tier(s)",
        snapshots.len(),
        tiers.iter().map(|t| tier_label(*t)).collect::<Vec<_>>().join(", ")
    ));

    let session_id = helpers::new_session_id();
    let session_dir = helpers::prepare_session_dir(&args.output_dir, &session_id)?;

    let mut results = Vec::with_capacity(snapshots.len());
    let mut by_severity: std::collections::HashMap<Severity, u32> = std::collections::HashMap::new();
    for snapshot in &snapshots {
        let result = detector::detect(snapshot, &rules);
        for (severity, count) in result.events_by_severity() {
            *by_severity.entry(severity).or_insert(0) += count;
        }
        results.push(IntegrationAuditEntry {
            integration_id: snapshot.id.clone(),
            result,
        });
    }

    let report = CorruptionReport {
        session_id: session_id.clone(),
        integrations_scanned: snapshots.len(),
        results,
    };
    let report_path = session_dir.join("reports").join("corruption-report.json");
    fs::write(&report_path, serde_json::to_string_pretty(&report)?)
        .with_context(|| format!("writing {}", report_path.display()))?;

    let mut table = create_table();
    table.set_header(vec!["severity", "events"]);
    for severity in [Severity::Critical, Severity::High, Severity::Medium, Severity::Low] {
        table.add_row(vec![format!("{severity:?}").to_lowercase(), by_severity.get(&severity).copied().unwrap_or(0).to_string()]);
    }
    println!("{table}");

    print_success(&format!("session {session_id} written to {}", session_dir.display()));
    Ok(CliOutcome::Success)
}
