// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! `state` — inspect and maintain the processing-state store that backs
//! cross-run de-duplication (spec.md §4.7).

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use auditor_audit::{ProcessingStateRecord, SqliteStateStore, StateStore, RESET_CONFIRMATION_TOKEN};
use chrono::{Duration as ChronoDuration, Utc};
use clap::{Args, Subcommand};

use crate::outcome::CliOutcome;
use crate::output::{create_table, print_error, print_info, print_success};

/// Inspect or maintain the processing-state store.
#[derive(Args)]
pub struct StateArgs {
    #[command(subcommand)]
    pub command: StateCommand,
}

#[derive(Subcommand)]
pub enum StateCommand {
    /// Show aggregate stats and, optionally, individual records.
    Show(ShowArgs),
    /// Remove records older than `--older-than-days`.
    Cleanup(CleanupArgs),
    /// Dump every record to a JSON file.
    Export(ExportArgs),
    /// Load records from a JSON file previously produced by `export`.
    Import(ImportArgs),
    /// Clear every record. Requires `--confirm` to match the reset token.
    Reset(ResetArgs),
}

fn state_db_path(output_dir: &PathBuf, state_db: &Option<PathBuf>) -> PathBuf {
    state_db.clone().unwrap_or_else(|| output_dir.join("state.db"))
}

/// Show aggregate stats and, optionally, individual records.
#[derive(Args)]
pub struct ShowArgs {
    #[arg(long, default_value = "output")]
    pub output_dir: PathBuf,

    #[arg(long)]
    pub state_db: Option<PathBuf>,

    /// Restrict to one operator.
    #[arg(long)]
    pub operator_id: Option<String>,
}

/// Remove stale records.
#[derive(Args)]
pub struct CleanupArgs {
    #[arg(long, default_value = "output")]
    pub output_dir: PathBuf,

    #[arg(long)]
    pub state_db: Option<PathBuf>,

    /// Remove records whose `last_processed_at` is older than this many days.
    #[arg(long, default_value_t = 30)]
    pub older_than_days: i64,
}

/// Dump every record to a JSON file.
#[derive(Args)]
pub struct ExportArgs {
    #[arg(long, default_value = "output")]
    pub output_dir: PathBuf,

    #[arg(long)]
    pub state_db: Option<PathBuf>,

    /// Destination JSON file.
    #[arg(long)]
    pub path: PathBuf,
}

/// Load records from a previously exported JSON file.
#[derive(Args)]
pub struct ImportArgs {
    #[arg(long, default_value = "output")]
    pub output_dir: PathBuf,

    #[arg(long)]
    pub state_db: Option<PathBuf>,

    /// Source JSON file, as written by `state export`.
    #[arg(long)]
    pub path: PathBuf,
}

/// Clear every record.
#[derive(Args)]
pub struct ResetArgs {
    #[arg(long, default_value = "output")]
    pub output_dir: PathBuf,

    #[arg(long)]
    pub state_db: Option<PathBuf>,

    /// Must equal the store's reset confirmation token, or the reset is
    /// refused and the store is left untouched.
    #[arg(long)]
    pub confirm: String,
}

pub async fn run(args: StateArgs) -> Result<CliOutcome> {
    match args.command {
        StateCommand::Show(args) => run_show(args).await,
        StateCommand::Cleanup(args) => run_cleanup(args).await,
        StateCommand::Export(args) => run_export(args).await,
        StateCommand::Import(args) => run_import(args).await,
        StateCommand::Reset(args) => run_reset(args).await,
    }
}

async fn run_show(args: ShowArgs) -> Result<CliOutcome> {
    let db_path = state_db_path(&args.output_dir, &args.state_db);
    if !db_path.exists() {
        print_info(&format!("no processing-state database at {}", db_path.display()));
        return Ok(CliOutcome::Success);
    }
    let store = SqliteStateStore::open(&db_path).context("opening processing-state store")?;
    let stats = store
        .get_processing_stats(args.operator_id.as_deref())
        .await
        .context("reading processing stats")?;

    let mut table = create_table();
    table.set_header(vec!["metric", "value"]);
    table.add_row(vec!["total records", &stats.total_records.to_string()]);
    table.add_row(vec!["success", &stats.success_count.to_string()]);
    table.add_row(vec!["partial", &stats.partial_count.to_string()]);
    table.add_row(vec!["failed", &stats.failed_count.to_string()]);
    println!("{table}");

    Ok(CliOutcome::Success)
}

async fn run_cleanup(args: CleanupArgs) -> Result<CliOutcome> {
    let db_path = state_db_path(&args.output_dir, &args.state_db);
    if !db_path.exists() {
        print_info(&format!("no processing-state database at {}", db_path.display()));
        return Ok(CliOutcome::Success);
    }
    let store = SqliteStateStore::open(&db_path).context("opening processing-state store")?;
    let older_than = Utc::now() - ChronoDuration::days(args.older_than_days);
    let removed = store.cleanup(older_than).await.context("cleaning up processing state")?;
    print_success(&format!(
        "removed {removed} record(s) older than {} day(s)",
        args.older_than_days
    ));
    Ok(CliOutcome::Success)
}

async fn run_export(args: ExportArgs) -> Result<CliOutcome> {
    let db_path = state_db_path(&args.output_dir, &args.state_db);
    if !db_path.exists() {
        print_error(&format!("no processing-state database at {}", db_path.display()));
        return Ok(CliOutcome::ConfigOrIngestError);
    }
    let store = SqliteStateStore::open(&db_path).context("opening processing-state store")?;
    let records = store.export_state().await.context("exporting processing state")?;
    let json = serde_json::to_string_pretty(&records)?;
    fs::write(&args.path, json).with_context(|| format!("writing {}", args.path.display()))?;
    print_success(&format!("exported {} record(s) to {}", records.len(), args.path.display()));
    Ok(CliOutcome::Success)
}

async fn run_import(args: ImportArgs) -> Result<CliOutcome> {
    let raw = match fs::read_to_string(&args.path) {
        Ok(raw) => raw,
        Err(err) => {
            print_error(&format!("reading {}: {err}", args.path.display()));
            return Ok(CliOutcome::ConfigOrIngestError);
        }
    };
    let records: Vec<ProcessingStateRecord> = match serde_json::from_str(&raw) {
        Ok(records) => records,
        Err(err) => {
            print_error(&format!("parsing {}: {err}", args.path.display()));
            return Ok(CliOutcome::ConfigOrIngestError);
        }
    };

    let db_path = state_db_path(&args.output_dir, &args.state_db);
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let store = SqliteStateStore::open(&db_path).context("opening processing-state store")?;
    let count = store.import_state(records).await.context("importing processing state")?;
    print_success(&format!("imported {count} record(s) into {}", db_path.display()));
    Ok(CliOutcome::Success)
}

async fn run_reset(args: ResetArgs) -> Result<CliOutcome> {
    let db_path = state_db_path(&args.output_dir, &args.state_db);
    if !db_path.exists() {
        print_info(&format!("no processing-state database at {}", db_path.display()));
        return Ok(CliOutcome::Success);
    }
    let store = SqliteStateStore::open(&db_path).context("opening processing-state store")?;
    match store.reset(&args.confirm).await {
        Ok(()) => {
            print_success("processing state reset");
            Ok(CliOutcome::Success)
        }
        Err(_) => {
            print_error(&format!(
                "reset refused: --confirm must equal `{RESET_CONFIRMATION_TOKEN}`"
            ));
            Ok(CliOutcome::FailedOrBlocked)
        }
    }
}
