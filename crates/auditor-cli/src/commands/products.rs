// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! `products` — discover per-product business-rules overrides under
//! `config/products/<product>/<version>-business-rules.json` (spec.md §9
//! "Configs").

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::helpers;
use crate::outcome::CliOutcome;
use crate::output::{create_table, print_error, print_info};

/// List configured products, or show one product's effective rules.
#[derive(Args)]
pub struct ProductsArgs {
    /// Root directory containing `products/<product>/`.
    #[arg(long, default_value = "config")]
    pub config_dir: PathBuf,

    /// List every product with a configured override directory.
    #[arg(long)]
    pub list: bool,

    /// Show the effective (base-rules-plus-overlay) business rules for one
    /// product, merged at `--version`.
    #[arg(long)]
    pub product: Option<String>,

    /// Product version, required together with `--product`.
    #[arg(long)]
    pub version: Option<String>,
}

pub async fn run(args: ProductsArgs) -> Result<CliOutcome> {
    let products_dir = args.config_dir.join("products");

    if let Some(product) = &args.product {
        let Some(version) = &args.version else {
            print_error("--product requires --version");
            return Ok(CliOutcome::ConfigOrIngestError);
        };

        let rules = match helpers::load_business_rules(&args.config_dir, Some(product), Some(version)) {
            Ok(rules) => rules,
            Err(err) => {
                print_error(&format!("{err:#}"));
                return Ok(CliOutcome::ConfigOrIngestError);
            }
        };

        let overlay_path = products_dir.join(product).join(format!("{version}-business-rules.json"));
        if overlay_path.exists() {
            print_info(&format!("overlay applied from {}", overlay_path.display()));
        } else {
            print_info(&format!(
                "no overlay at {}; showing base rules",
                overlay_path.display()
            ));
        }

        let mut table = create_table();
        table.set_header(vec!["edition", "imports/store", "exports/store", "flows/store"]);
        for (edition, reqs) in &rules.edition_requirements {
            table.add_row(vec![
                edition.clone(),
                reqs.imports_per_store.to_string(),
                reqs.exports_per_store.to_string(),
                reqs.flows_per_store.to_string(),
            ]);
        }
        println!("{table}");
        return Ok(CliOutcome::Success);
    }

    // Default and `--list`: enumerate configured product directories.
    if !products_dir.exists() {
        print_info(&format!("no products configured under {}", products_dir.display()));
        return Ok(CliOutcome::Success);
    }

    let mut table = create_table();
    table.set_header(vec!["product", "overrides"]);
    let mut entries: Vec<_> = std::fs::read_dir(&products_dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .collect();
    entries.sort_by_key(std::fs::DirEntry::file_name);

    for entry in entries {
        let product_name = entry.file_name().to_string_lossy().to_string();
        let overrides = std::fs::read_dir(entry.path())?
            .filter_map(|f| f.ok())
            .filter(|f| {
                f.file_name()
                    .to_string_lossy()
                    .ends_with("-business-rules.json")
            })
            .count();
        table.add_row(vec![product_name, overrides.to_string()]);
    }
    println!("{table}");

    Ok(CliOutcome::Success)
}
