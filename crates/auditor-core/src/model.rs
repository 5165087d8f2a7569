//! Core data model: the entities flowing between ingestor, detector,
//! remediation engine, planner and orchestrator.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// License edition a tenant integration is provisioned under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseEdition {
    Starter,
    Standard,
    Premium,
    Shopifymarkets,
    Markets,
}

impl LicenseEdition {
    /// Parse an edition string case-insensitively, trimmed of whitespace.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "starter" => Some(Self::Starter),
            "standard" => Some(Self::Standard),
            "premium" => Some(Self::Premium),
            "shopifymarkets" => Some(Self::Shopifymarkets),
            "markets" => Some(Self::Markets),
            _ => None,
        }
    }

    /// Canonical lowercase name, as used in config keys and rendered output.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starter => "starter",
            Self::Standard => "standard",
            Self::Premium => "premium",
            Self::Shopifymarkets => "shopifymarkets",
            Self::Markets => "markets",
        }
    }
}

/// Tier an integration's row was sourced from (a workload-grouping
/// partition only; it has no bearing on business logic).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Tier1,
    Tier2,
    Tier3,
}

/// The originating CSV rows a snapshot was assembled from, kept only for
/// ingest-warning messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowSpan {
    pub tier: Tier,
    /// 1-based line number in `integrations.csv` (header excluded).
    pub integration_line: u64,
}

/// A single named resource (import/export/flow) attached to an integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedResource {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub extra: HashMap<String, Value>,
}

/// A connection between the integration and an external system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub offline: bool,
    #[serde(default)]
    pub extra: HashMap<String, Value>,
}

/// A fully joined, immutable tenant integration record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationSnapshot {
    pub id: String,
    pub email: String,
    pub user_id: String,
    pub version: String,
    pub store_count: u32,
    pub license_edition: String,
    pub update_in_progress: bool,
    pub settings: Value,
    #[serde(default)]
    pub imports: Vec<NamedResource>,
    #[serde(default)]
    pub exports: Vec<NamedResource>,
    #[serde(default)]
    pub flows: Vec<NamedResource>,
    #[serde(default)]
    pub connections: Vec<Connection>,
    /// Source rows, absent when a snapshot is constructed synthetically
    /// (e.g. in tests).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub source_row: Option<RowSpan>,
}

impl IntegrationSnapshot {
    /// `settings.connectorEdition`, if present and a string.
    #[must_use]
    pub fn connector_edition(&self) -> Option<&str> {
        self.settings.get("connectorEdition").and_then(Value::as_str)
    }

    /// `settings.sections`, defaulting to an empty slice.
    #[must_use]
    pub fn sections(&self) -> &[Value] {
        self.settings
            .get("sections")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Severity of a detected corruption event, ordered `low < medium < high <
/// critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Default for Severity {
    fn default() -> Self {
        Self::Low
    }
}

/// One detected violation of business rules for a single integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorruptionEvent {
    pub integration_id: String,
    /// The JSON rule (by declared id) that produced this event, so audit
    /// queries can trace an action back to its rule.
    pub rule_id: String,
    pub corruption_type: String,
    pub severity: Severity,
    pub evidence: Value,
    #[serde(default)]
    pub suggested_actions: Vec<String>,
}

/// Outcome of running the detector over one snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditResult {
    pub corruption_events: Vec<CorruptionEvent>,
    pub overall_severity: Severity,
}

impl AuditResult {
    /// Count of events grouped by severity, for the orchestrator's summary
    /// table.
    #[must_use]
    pub fn events_by_severity(&self) -> HashMap<Severity, u32> {
        let mut counts = HashMap::new();
        for event in &self.corruption_events {
            *counts.entry(event.severity).or_insert(0) += 1;
        }
        counts
    }
}

/// Kind of mutation an `ExecutionAction` performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Create,
    Update,
    Delete,
    Patch,
    Reconnect,
    Adjust,
}

impl ActionType {
    /// Stage in the emission order `reconnect < patch < create < update <
    /// delete` (spec.md §4.3 "Ordering within an integration").
    #[must_use]
    pub fn emission_rank(self) -> u8 {
        match self {
            Self::Reconnect => 0,
            Self::Patch => 1,
            Self::Create => 2,
            Self::Update => 3,
            Self::Delete => 4,
            Self::Adjust => 5,
        }
    }
}

/// What an action targets in the external system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionTarget {
    pub target_type: String,
    pub resource_type: String,
    pub resource_id: String,
}

/// Before/after state captured for an action, plus a precomputed diff.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionPayload {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub before: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub after: Option<Value>,
    /// RFC 6902 JSON Patch from `before` to `after`.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub diff: Option<json_patch::Patch>,
}

/// Action-specific metadata carried alongside the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionMetadata {
    pub reason: String,
    /// 1 (highest) .. 10 (lowest).
    pub priority: u8,
    pub rollbackable: bool,
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Stable position of this action within its plan; used by the
    /// rollback generator and by audit queries (`actionId`).
    pub action_index: u32,
}

/// A single mutation the executor can perform against the external system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionAction {
    pub id: String,
    pub action_type: ActionType,
    pub target: ActionTarget,
    pub payload: ActionPayload,
    pub metadata: ActionMetadata,
}

/// Coarse risk classification for a plan, used by preflight's
/// high-risk-action confirmation threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Per-type action counts for a plan summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionsByType {
    pub create: u32,
    pub update: u32,
    pub delete: u32,
    pub patch: u32,
    pub reconnect: u32,
    pub adjust: u32,
}

impl ActionsByType {
    fn record(&mut self, action_type: ActionType) {
        match action_type {
            ActionType::Create => self.create += 1,
            ActionType::Update => self.update += 1,
            ActionType::Delete => self.delete += 1,
            ActionType::Patch => self.patch += 1,
            ActionType::Reconnect => self.reconnect += 1,
            ActionType::Adjust => self.adjust += 1,
        }
    }
}

/// Summary attached to an `ExecutionPlan`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanSummaryInfo {
    pub actions_by_type: ActionsByType,
    pub risk_level: RiskLevel,
    /// Rough wall-clock estimate, one second per action.
    pub estimated_duration_secs: u64,
}

impl Default for RiskLevel {
    fn default() -> Self {
        Self::Low
    }
}

/// The reverse-ordered sequence of inverse actions for a plan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RollbackPlan {
    pub actions: Vec<ExecutionAction>,
    /// True when at least one forward action was non-rollbackable and so
    /// contributes no inverse.
    pub partial: bool,
}

/// Safety envelope attached to a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanSafety {
    pub max_ops_per_integration: u32,
    pub rollback_plan: RollbackPlan,
    /// When set, the first executor failure aborts the remaining actions
    /// in this plan regardless of the caller's `stop_on_failure` option.
    #[serde(default)]
    pub abort_on_first_failure: bool,
}

/// An ordered, bounded set of actions plus a rollback plan, scoped to one
/// integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub plan_id: String,
    pub integration_id: String,
    pub actions: Vec<ExecutionAction>,
    pub summary: PlanSummaryInfo,
    pub safety: PlanSafety,
}

impl ExecutionPlan {
    /// Build the plan summary from its own action list.
    #[must_use]
    pub fn summarize(actions: &[ExecutionAction]) -> PlanSummaryInfo {
        let mut by_type = ActionsByType::default();
        for action in actions {
            by_type.record(action.action_type);
        }
        let destructive = by_type.delete;
        let risk_level = if destructive > 0 {
            RiskLevel::High
        } else if actions.len() > 5 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        };
        PlanSummaryInfo {
            actions_by_type: by_type,
            risk_level,
            estimated_duration_secs: actions.len() as u64,
        }
    }
}

/// Outcome of executing (or attempting) a single action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub action_id: String,
    pub after: Option<Value>,
}

/// Overall status of an `ExecutionResult`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Partial,
    Failed,
}

/// A single executed/failed/skipped action record, as recorded in an
/// `ExecutionResult`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub action_id: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
    pub retry_attempt: u32,
    pub duration_ms: u64,
}

/// Per-plan executed/failed/skipped buckets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionResults {
    pub executed: Vec<ActionRecord>,
    pub failed: Vec<ActionRecord>,
    pub skipped: Vec<ActionRecord>,
}

/// Result of executing (or dry-running) an `ExecutionPlan`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub plan_id: String,
    pub integration_id: String,
    pub status: ExecutionStatus,
    pub actions: ActionResults,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub rollback: Option<RollbackPlan>,
}

impl ExecutionResult {
    /// Derive `status` from the executed/failed/skipped buckets per
    /// spec.md §4.4: success iff nothing failed or was skipped; failed iff
    /// every attempted action failed; otherwise partial.
    #[must_use]
    pub fn derive_status(results: &ActionResults) -> ExecutionStatus {
        if results.failed.is_empty() && results.skipped.is_empty() {
            ExecutionStatus::Success
        } else if results.executed.is_empty() && !results.failed.is_empty() {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Partial
        }
    }
}

/// The orchestrator's return value: what a caller (CLI or embedder) needs
/// to render a run summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub integrations_processed: u32,
    pub events_by_severity: HashMap<String, u32>,
    pub actions_planned: u32,
    pub actions_executed: u32,
    pub actions_failed: u32,
    pub actions_skipped: u32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub restore_bundle_id: Option<String>,
    pub session_dir: String,
}
