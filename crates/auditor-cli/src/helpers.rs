// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Session bootstrapping: config loading, tier parsing, and the
//! `output/session-<timestamp>/` directory layout (spec.md §6 "Output
//! layout per session").

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use auditor_core::ingestor::{ingest_tier, IngestWarning};
use auditor_core::model::{IntegrationSnapshot, Tier};
use auditor_core::rules::{BusinessRules, BusinessRulesOverlay, RemediationLogic};
use chrono::Utc;
use uuid::Uuid;

/// Parse a `--tier` value (`tier1`, `tier2`, `tier3`, case-insensitive) or
/// `all`, meaning every tier.
pub fn parse_tiers(raw: &str) -> Result<Vec<Tier>> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "all" => Ok(vec![Tier::Tier1, Tier::Tier2, Tier::Tier3]),
        "tier1" => Ok(vec![Tier::Tier1]),
        "tier2" => Ok(vec![Tier::Tier2]),
        "tier3" => Ok(vec![Tier::Tier3]),
        other => anyhow::bail!("unrecognized tier `{other}` (expected tier1, tier2, tier3 or all)"),
    }
}

/// The directory name a tier's five CSVs live under, relative to the input
/// root (spec.md §6 "Input files").
pub fn tier_dir_name(tier: Tier) -> &'static str {
    match tier {
        Tier::Tier1 => "tier1",
        Tier::Tier2 => "tier2",
        Tier::Tier3 => "tier3",
    }
}

pub fn tier_label(tier: Tier) -> &'static str {
    tier_dir_name(tier)
}

/// A fresh session id: `session-<unix-timestamp>-<short-uuid>`.
#[must_use]
pub fn new_session_id() -> String {
    format!(
        "session-{}-{}",
        Utc::now().timestamp(),
        Uuid::new_v4().simple().to_string().chars().take(8).collect::<String>()
    )
}

/// The output directory for one session, creating the standard
/// subdirectories up front so later writers never need to.
pub fn prepare_session_dir(output_root: &Path, session_id: &str) -> Result<PathBuf> {
    let dir = output_root.join(session_id);
    for sub in ["reports", "remediation-plan", "remediation-scripts", "logs", "audit"] {
        fs::create_dir_all(dir.join(sub)).with_context(|| format!("creating {sub} under {}", dir.display()))?;
    }
    Ok(dir)
}

/// Load `config/business-rules.json`, optionally merged with a per-product
/// override at `config/products/<product>/<version>-business-rules.json`.
pub fn load_business_rules(config_dir: &Path, product: Option<&str>, version: Option<&str>) -> Result<BusinessRules> {
    let base_path = config_dir.join("business-rules.json");
    let raw = fs::read_to_string(&base_path).with_context(|| format!("reading {}", base_path.display()))?;
    let rules = BusinessRules::parse(&raw).with_context(|| format!("parsing {}", base_path.display()))?;

    let (Some(product), Some(version)) = (product, version) else {
        return Ok(rules);
    };

    let overlay_path = config_dir
        .join("products")
        .join(product)
        .join(format!("{version}-business-rules.json"));
    if !overlay_path.exists() {
        return Ok(rules);
    }
    let overlay_raw =
        fs::read_to_string(&overlay_path).with_context(|| format!("reading {}", overlay_path.display()))?;
    let overlay = BusinessRulesOverlay::parse(&overlay_raw)
        .with_context(|| format!("parsing {}", overlay_path.display()))?;
    Ok(rules.merged_with(overlay))
}

/// Load `config/remediation-logic.json`.
pub fn load_remediation_logic(config_dir: &Path) -> Result<RemediationLogic> {
    let path = config_dir.join("remediation-logic.json");
    let raw = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    RemediationLogic::parse(&raw).with_context(|| format!("parsing {}", path.display()))
}

/// Ingest every requested tier under `input_dir`, collecting snapshots and
/// warnings across all of them. A missing tier directory is a hard error
/// (unlike a missing *child* CSV within a present tier, which the ingestor
/// already tolerates).
pub fn ingest_tiers(input_dir: &Path, tiers: &[Tier]) -> Result<(Vec<IntegrationSnapshot>, Vec<IngestWarning>)> {
    let mut snapshots = Vec::new();
    let mut warnings = Vec::new();

    for &tier in tiers {
        let dir = input_dir.join(tier_dir_name(tier));
        if !dir.exists() {
            anyhow::bail!("input directory {} does not exist", dir.display());
        }
        ingest_tier(
            &dir,
            tier,
            |snapshot| snapshots.push(snapshot),
            |warning| warnings.push(warning),
        )
        .with_context(|| format!("ingesting {}", dir.display()))?;
    }

    Ok((snapshots, warnings))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_tiers_accepts_all_and_single() {
        assert_eq!(parse_tiers("all").unwrap().len(), 3);
        assert_eq!(parse_tiers("Tier2").unwrap(), vec![Tier::Tier2]);
        assert!(parse_tiers("tier9").is_err());
    }

    #[test]
    fn session_id_has_expected_prefix() {
        let id = new_session_id();
        assert!(id.starts_with("session-"));
    }
}
