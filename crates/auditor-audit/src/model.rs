//! Entities written by the audit logger and restore-bundle writer, and read
//! back by the processing-state store (spec.md §3 `AuditLogEntry`,
//! `RestoreBundle`, `ProcessingStateRecord`).

use std::collections::HashMap;

use auditor_core::model::{ActionTarget, ActionType, ExecutionAction, ExecutionStatus, IntegrationSnapshot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The mutation half of an `AuditLogEntry`: what was attempted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionLog {
    pub action_type: ActionType,
    pub target: ActionTarget,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub before: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub after: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub diff: Option<json_patch::Patch>,
}

impl ActionLog {
    /// Build an `ActionLog` from the `ExecutionAction` the planner emitted.
    #[must_use]
    pub fn from_action(action: &ExecutionAction) -> Self {
        Self {
            action_type: action.action_type,
            target: action.target.clone(),
            before: action.payload.before.clone(),
            after: action.payload.after.clone(),
            diff: action.payload.diff.clone(),
        }
    }
}

/// The outcome half of an `AuditLogEntry`: what happened when it ran.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLog {
    pub plan_id: String,
    pub action_id: String,
    pub status: ExecutionStatus,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
    pub retry_attempt: u32,
}

/// Run-level context every entry carries, independent of the action it
/// describes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextInfo {
    pub dry_run: bool,
    pub environment: String,
    pub version: String,
}

/// Whether this entry's forward action has a captured inverse, and if so
/// which log entry (by `action_id`) carries it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RollbackInfo {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub action_id: Option<String>,
}

/// One append-only audit record. Entries are never mutated after being
/// written; `logAction` is called once per attempted action (including
/// dry-run attempts).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub operator_id: String,
    pub session_id: String,
    pub integration_id: String,
    pub action: ActionLog,
    pub execution: ExecutionLog,
    pub context: ContextInfo,
    pub rollback: RollbackInfo,
}

/// A per-plan summary line written once per executed/dry-run plan, to a
/// rolling summary file (`logExecutionResult`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResultLog {
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub operator_id: String,
    pub plan_id: String,
    pub integration_id: String,
    pub status: ExecutionStatus,
    pub executed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub duration_ms: u64,
}

/// Before/after snapshot pair plus the actions emitted for one
/// integration, as carried inside a `RestoreBundle`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreBundleIntegration {
    pub before: IntegrationSnapshot,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub after: Option<IntegrationSnapshot>,
    pub actions: Vec<ExecutionAction>,
}

/// A complete, retrievable record of one session's mutations, sufficient
/// to reverse it. Spec.md §9 design note: a single compact file per
/// session with a keyed per-integration section, rather than one file per
/// integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreBundle {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub operator_id: String,
    pub session_id: String,
    #[serde(default)]
    pub description: String,
    pub integrations: HashMap<String, RestoreBundleIntegration>,
}

/// Processing status recorded for one integration after a run completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Success,
    Partial,
    Failed,
}

impl From<ExecutionStatus> for ProcessingStatus {
    fn from(status: ExecutionStatus) -> Self {
        match status {
            ExecutionStatus::Success => Self::Success,
            ExecutionStatus::Partial => Self::Partial,
            ExecutionStatus::Failed => Self::Failed,
        }
    }
}

/// De-duplication record for one `(operatorId, integrationId)` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingStateRecord {
    pub integration_id: String,
    pub operator_id: String,
    pub last_processed_at: DateTime<Utc>,
    pub last_result_hash: String,
    pub status: ProcessingStatus,
}

/// Aggregate counters returned by `getProcessingStats`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessingStats {
    pub total_records: u64,
    pub success_count: u64,
    pub partial_count: u64,
    pub failed_count: u64,
}

/// A filter predicate for `queryLogs`; every field is optional and
/// conjunctive (all present fields must match).
#[derive(Debug, Clone, Default)]
pub struct LogQuery {
    pub integration_id: Option<String>,
    pub operator_id: Option<String>,
    pub session_id: Option<String>,
    pub plan_id: Option<String>,
    pub action_type: Option<ActionType>,
    pub status: Option<ExecutionStatus>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl LogQuery {
    fn matches(&self, entry: &AuditLogEntry) -> bool {
        if let Some(id) = &self.integration_id {
            if &entry.integration_id != id {
                return false;
            }
        }
        if let Some(id) = &self.operator_id {
            if &entry.operator_id != id {
                return false;
            }
        }
        if let Some(id) = &self.session_id {
            if &entry.session_id != id {
                return false;
            }
        }
        if let Some(id) = &self.plan_id {
            if &entry.execution.plan_id != id {
                return false;
            }
        }
        if let Some(action_type) = self.action_type {
            if entry.action.action_type != action_type {
                return false;
            }
        }
        if let Some(status) = self.status {
            if entry.execution.status != status {
                return false;
            }
        }
        if let Some(start) = self.start_time {
            if entry.timestamp < start {
                return false;
            }
        }
        if let Some(end) = self.end_time {
            if entry.timestamp > end {
                return false;
            }
        }
        true
    }

    /// Filter and paginate a slice of already-loaded entries.
    #[must_use]
    pub fn apply<'a>(&self, entries: impl IntoIterator<Item = &'a AuditLogEntry>) -> Vec<&'a AuditLogEntry> {
        let matched: Vec<&AuditLogEntry> = entries.into_iter().filter(|e| self.matches(e)).collect();
        let start = self.offset.min(matched.len());
        let end = self
            .limit
            .map(|limit| (start + limit).min(matched.len()))
            .unwrap_or(matched.len());
        matched[start..end].to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use auditor_core::model::{ActionMetadata, ActionPayload};

    fn entry(integration_id: &str, timestamp: DateTime<Utc>) -> AuditLogEntry {
        AuditLogEntry {
            id: "e1".into(),
            timestamp,
            operator_id: "op".into(),
            session_id: "s1".into(),
            integration_id: integration_id.to_string(),
            action: ActionLog::from_action(&ExecutionAction {
                id: "a1".into(),
                action_type: ActionType::Patch,
                target: ActionTarget {
                    target_type: "integration".into(),
                    resource_type: "settings".into(),
                    resource_id: "r1".into(),
                },
                payload: ActionPayload::default(),
                metadata: ActionMetadata {
                    reason: "test".into(),
                    priority: 1,
                    rollbackable: true,
                    dependencies: vec![],
                    action_index: 0,
                },
            }),
            execution: ExecutionLog {
                plan_id: "p1".into(),
                action_id: "a1".into(),
                status: ExecutionStatus::Success,
                duration_ms: 5,
                error: None,
                retry_attempt: 0,
            },
            context: ContextInfo {
                dry_run: false,
                environment: "test".into(),
                version: "1.0".into(),
            },
            rollback: RollbackInfo {
                available: true,
                action_id: Some("a1-inverse".into()),
            },
        }
    }

    #[test]
    fn query_filters_by_integration_id() {
        let e1 = entry("test-001", Utc::now());
        let e2 = entry("test-002", Utc::now());
        let query = LogQuery {
            integration_id: Some("test-001".into()),
            ..Default::default()
        };
        let result = query.apply([&e1, &e2]);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].integration_id, "test-001");
    }

    #[test]
    fn query_applies_offset_and_limit() {
        let entries: Vec<AuditLogEntry> = (0..5).map(|_| entry("test-001", Utc::now())).collect();
        let query = LogQuery {
            offset: 1,
            limit: Some(2),
            ..Default::default()
        };
        let result = query.apply(&entries);
        assert_eq!(result.len(), 2);
    }
}
