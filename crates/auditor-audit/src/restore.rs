//! Restore bundles: a complete, retrievable record of one session's
//! mutations, sufficient to reverse it (spec.md §4.7, §9 design note).
//!
//! One bundle is written per session as a single JSON file under
//! `<base_dir>/restore/<bundle_id>.json`, keyed internally by integration
//! id rather than split across one file per integration.

use std::fs;
use std::path::{Path, PathBuf};

use auditor_core::model::ExecutionAction;
use auditor_core::planner::compute_rollback_plan;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::{Error, Result};
use crate::model::{RestoreBundle, RestoreBundleIntegration};

fn bundle_path(base_dir: &Path, bundle_id: &str) -> PathBuf {
    base_dir.join("restore").join(format!("{bundle_id}.json"))
}

/// Assemble a new bundle from the integrations processed in a session.
/// Does not write it to disk; call `save` for that.
#[must_use]
pub fn create_restore_bundle(
    session_id: &str,
    operator_id: &str,
    description: &str,
    integrations: std::collections::HashMap<String, RestoreBundleIntegration>,
) -> RestoreBundle {
    RestoreBundle {
        id: Uuid::new_v4().to_string(),
        created_at: Utc::now(),
        operator_id: operator_id.to_string(),
        session_id: session_id.to_string(),
        description: description.to_string(),
        integrations,
    }
}

/// Write a bundle to `<base_dir>/restore/<id>.json`, returning the path.
pub fn save(base_dir: &Path, bundle: &RestoreBundle) -> Result<PathBuf> {
    let path = bundle_path(base_dir, &bundle.id);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let contents = serde_json::to_string_pretty(bundle)?;
    fs::write(&path, contents)?;
    Ok(path)
}

/// Load a bundle by id.
pub fn load(base_dir: &Path, bundle_id: &str) -> Result<RestoreBundle> {
    let path = bundle_path(base_dir, bundle_id);
    let contents = fs::read_to_string(&path).map_err(|_| Error::NotFound(bundle_id.to_string()))?;
    Ok(serde_json::from_str(&contents)?)
}

/// A lightweight listing entry, cheap to build without loading every
/// bundle's full integration map.
#[derive(Debug, Clone)]
pub struct RestoreBundleSummary {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub session_id: String,
    pub operator_id: String,
    pub integration_count: usize,
}

/// List every bundle under `<base_dir>/restore/`, most recent first.
pub fn list(base_dir: &Path) -> Result<Vec<RestoreBundleSummary>> {
    let dir = base_dir.join("restore");
    let Ok(read_dir) = fs::read_dir(&dir) else {
        return Ok(Vec::new());
    };
    let mut summaries = Vec::new();
    for entry in read_dir.filter_map(std::result::Result::ok) {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Ok(contents) = fs::read_to_string(&path) else {
            continue;
        };
        let Ok(bundle) = serde_json::from_str::<RestoreBundle>(&contents) else {
            continue;
        };
        summaries.push(RestoreBundleSummary {
            id: bundle.id,
            created_at: bundle.created_at,
            session_id: bundle.session_id,
            operator_id: bundle.operator_id,
            integration_count: bundle.integrations.len(),
        });
    }
    summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(summaries)
}

/// Build the reverse-ordered action list needed to undo one integration's
/// mutations within a bundle, following the same forward→inverse table the
/// planner uses to build a plan's own rollback plan.
pub fn generate_rollback_actions(bundle: &RestoreBundle, integration_id: &str) -> Result<Vec<ExecutionAction>> {
    let integration = bundle
        .integrations
        .get(integration_id)
        .ok_or_else(|| Error::NotFound(integration_id.to_string()))?;
    Ok(compute_rollback_plan(&integration.actions).actions)
}

/// Build the reverse-ordered action list to undo every integration in a
/// bundle, grouped by integration id in the bundle's own iteration order.
pub fn generate_full_rollback(bundle: &RestoreBundle) -> Vec<(String, Vec<ExecutionAction>)> {
    bundle
        .integrations
        .iter()
        .map(|(id, integration)| (id.clone(), compute_rollback_plan(&integration.actions).actions))
        .collect()
}
