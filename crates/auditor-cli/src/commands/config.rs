// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! `config` — show or validate the loaded `business-rules.json` and
//! `remediation-logic.json` (spec.md §9 "Configs").

use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::helpers;
use crate::outcome::CliOutcome;
use crate::output::{create_table, print_error, print_info, print_success};

/// Show or validate the session's configuration documents.
#[derive(Args)]
pub struct ConfigArgs {
    /// Root directory containing `business-rules.json` and
    /// `remediation-logic.json`.
    #[arg(long, default_value = "config")]
    pub config_dir: PathBuf,

    /// Print the loaded documents. Default when neither flag is given.
    #[arg(long)]
    pub show: bool,

    /// Parse both documents and report whether they're well-formed,
    /// without printing their contents.
    #[arg(long)]
    pub validate: bool,
}

pub async fn run(args: ConfigArgs) -> Result<CliOutcome> {
    let business_rules_path = args.config_dir.join("business-rules.json");
    let remediation_logic_path = args.config_dir.join("remediation-logic.json");

    let business_rules = match helpers::load_business_rules(&args.config_dir, None, None) {
        Ok(rules) => rules,
        Err(err) => {
            print_error(&format!("{business_rules_path:?}: {err:#}"));
            return Ok(CliOutcome::ConfigOrIngestError);
        }
    };
    let remediation_logic = match helpers::load_remediation_logic(&args.config_dir) {
        Ok(logic) => logic,
        Err(err) => {
            print_error(&format!("{remediation_logic_path:?}: {err:#}"));
            return Ok(CliOutcome::ConfigOrIngestError);
        }
    };

    if args.validate {
        print_success(&format!(
            "{} is valid ({} edition(s) configured)",
            business_rules_path.display(),
            business_rules.edition_requirements.len()
        ));
        print_success(&format!(
            "{} is valid ({} corruption type(s) configured)",
            remediation_logic_path.display(),
            remediation_logic.rules.len()
        ));
    }

    if args.show || !args.validate {
        let mut table = create_table();
        table.set_header(vec!["edition", "imports/store", "exports/store", "flows/store"]);
        for (edition, reqs) in &business_rules.edition_requirements {
            table.add_row(vec![
                edition.clone(),
                reqs.imports_per_store.to_string(),
                reqs.exports_per_store.to_string(),
                reqs.flows_per_store.to_string(),
            ]);
        }
        println!("{table}");

        print_info(&format!(
            "valid editions: {}",
            business_rules.license_validation.valid_editions.join(", ")
        ));
        print_info(&format!(
            "max settings size: {} byte(s)",
            business_rules.license_validation.max_settings_size
        ));
        print_info(&format!(
            "remediation logic covers: {}",
            remediation_logic.rules.keys().cloned().collect::<Vec<_>>().join(", ")
        ));
    }

    // Confirm both files parse as plain JSON too, catching any structural
    // issue the typed loaders might paper over with field defaults.
    for path in [&business_rules_path, &remediation_logic_path] {
        let raw = fs::read_to_string(path)?;
        if serde_json::from_str::<serde_json::Value>(&raw).is_err() {
            print_error(&format!("{} is not well-formed JSON", path.display()));
            return Ok(CliOutcome::ConfigOrIngestError);
        }
    }

    Ok(CliOutcome::Success)
}
