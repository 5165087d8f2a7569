// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod helpers;
mod outcome;
mod output;

use commands::{audit, business_rules, config, fix, products, state, status};
use outcome::CliOutcome;

/// Integration auditor - audits and remediates corrupted connector
/// integrations against per-edition business rules.
///
/// Commands are organized into two groups:
///
/// **Pipeline**: `audit` (ingest and detect only), `fix` (detect, plan,
/// and optionally execute remediation)
///
/// **Operations and configuration**: `status`, `state`, `config`,
/// `products`, `business-rules`
#[derive(Parser)]
#[command(name = "auditor")]
#[command(author = "Andrew Yates")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Integration auditor - corruption detection and remediation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest and detect corruption without planning or executing remediation
    Audit(audit::AuditArgs),

    /// Detect, plan, preflight-check, and (with `--apply`) execute remediation
    Fix(fix::FixArgs),

    /// Show processing-state aggregate stats
    Status(status::StatusArgs),

    /// Inspect or maintain the processing-state store
    State(state::StateArgs),

    /// Show or validate the loaded configuration documents
    Config(config::ConfigArgs),

    /// Discover per-product business-rules overrides
    Products(products::ProductsArgs),

    /// Show the effective business rules for one license edition
    BusinessRules(business_rules::BusinessRulesArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Audit(args) => audit::run(args).await?,
        Commands::Fix(args) => fix::run(args).await?,
        Commands::Status(args) => status::run(args).await?,
        Commands::State(args) => state::run(args).await?,
        Commands::Config(args) => config::run(args).await?,
        Commands::Products(args) => products::run(args).await?,
        Commands::BusinessRules(args) => business_rules::run(args).await?,
    };

    std::process::exit(outcome.code());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clap_parses_known_subcommands() {
        let cli = Cli::try_parse_from(["auditor", "status"]).expect("parse status");
        assert!(matches!(cli.command, Commands::Status(_)));

        let cli = Cli::try_parse_from(["auditor", "fix", "--apply"]).expect("parse fix");
        assert!(matches!(cli.command, Commands::Fix(_)));

        let cli = Cli::try_parse_from(["auditor", "state", "show"]).expect("parse state show");
        assert!(matches!(cli.command, Commands::State(_)));
    }

    #[test]
    fn clap_rejects_conflicting_fix_flags() {
        assert!(Cli::try_parse_from(["auditor", "fix", "--dry-run", "--apply"]).is_err());
    }

    #[test]
    fn outcome_codes_match_exit_code_contract() {
        assert_eq!(CliOutcome::Success.code(), 0);
        assert_eq!(CliOutcome::FailedOrBlocked.code(), 1);
        assert_eq!(CliOutcome::ConfigOrIngestError.code(), 2);
    }
}
