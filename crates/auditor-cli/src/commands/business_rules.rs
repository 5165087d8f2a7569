// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! `business-rules` — show the effective business rules for one license
//! edition, after any per-product overlay is applied (spec.md §3
//! `BusinessRules`).

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::helpers;
use crate::outcome::CliOutcome;
use crate::output::{create_table, print_error};

/// Show the effective rules for a single license edition.
#[derive(Args)]
pub struct BusinessRulesArgs {
    /// Root directory containing `business-rules.json`.
    #[arg(long, default_value = "config")]
    pub config_dir: PathBuf,

    /// License edition to show, e.g. `starter` or `premium`.
    #[arg(long)]
    pub edition: String,

    /// Product name, for a per-product business-rules override.
    #[arg(long)]
    pub product: Option<String>,

    /// Product version, paired with `--product`.
    #[arg(long)]
    pub version: Option<String>,
}

pub async fn run(args: BusinessRulesArgs) -> Result<CliOutcome> {
    let rules = match helpers::load_business_rules(&args.config_dir, args.product.as_deref(), args.version.as_deref())
    {
        Ok(rules) => rules,
        Err(err) => {
            print_error(&format!("{err:#}"));
            return Ok(CliOutcome::ConfigOrIngestError);
        }
    };

    let edition_key = rules
        .edition_requirements
        .keys()
        .find(|key| key.eq_ignore_ascii_case(&args.edition));

    let Some(edition_key) = edition_key else {
        print_error(&format!(
            "edition `{}` is not configured (known editions: {})",
            args.edition,
            rules.edition_requirements.keys().cloned().collect::<Vec<_>>().join(", ")
        ));
        return Ok(CliOutcome::ConfigOrIngestError);
    };
    let reqs = &rules.edition_requirements[edition_key];

    let mut table = create_table();
    table.set_header(vec!["field", "value"]);
    table.add_row(vec!["edition".to_string(), edition_key.clone()]);
    table.add_row(vec!["imports per store".to_string(), reqs.imports_per_store.to_string()]);
    table.add_row(vec!["exports per store".to_string(), reqs.exports_per_store.to_string()]);
    table.add_row(vec!["flows per store".to_string(), reqs.flows_per_store.to_string()]);
    table.add_row(vec![
        "valid license editions".to_string(),
        rules.license_validation.valid_editions.join(", "),
    ]);
    table.add_row(vec![
        "max settings size".to_string(),
        rules.license_validation.max_settings_size.to_string(),
    ]);
    table.add_row(vec![
        "resource count tolerance".to_string(),
        rules.tolerances.resource_count_tolerance.to_string(),
    ]);

    if let Some(required) = rules.required_resources.get(edition_key) {
        table.add_row(vec![
            "required imports".to_string(),
            required.required_imports.join(", "),
        ]);
        table.add_row(vec![
            "required exports".to_string(),
            required.required_exports.join(", "),
        ]);
        table.add_row(vec!["required flows".to_string(), required.required_flows.join(", ")]);
    }

    println!("{table}");
    Ok(CliOutcome::Success)
}
