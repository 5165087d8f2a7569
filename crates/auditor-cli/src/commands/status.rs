// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! `status` — processing-state aggregate stats for one or all operators.

use std::path::PathBuf;

use anyhow::{Context, Result};
use auditor_audit::{SqliteStateStore, StateStore};
use clap::Args;

use crate::outcome::CliOutcome;
use crate::output::create_table;

#[derive(Args)]
pub struct StatusArgs {
    /// Root directory session output (and `state.db`) is written under.
    #[arg(long, default_value = "output")]
    pub output_dir: PathBuf,

    /// Path to the sqlite processing-state database. Defaults to
    /// `<output_dir>/state.db`.
    #[arg(long)]
    pub state_db: Option<PathBuf>,

    /// Restrict the stats to one operator.
    #[arg(long)]
    pub operator_id: Option<String>,
}

pub async fn run(args: StatusArgs) -> Result<CliOutcome> {
    let state_db = args.state_db.unwrap_or_else(|| args.output_dir.join("state.db"));
    if !state_db.exists() {
        crate::output::print_info(&format!("no processing-state database at {}", state_db.display()));
        return Ok(CliOutcome::Success);
    }

    let store = SqliteStateStore::open(&state_db).context("opening processing-state store")?;
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
