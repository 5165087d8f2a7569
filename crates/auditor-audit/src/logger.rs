//! Append-only audit logger (spec.md §4.6).
//!
//! Entries are written as daily files (`YYYY-MM-DD.log`) under
//! `<base_dir>/daily/`, one self-contained JSON line per entry, plus an
//! optional per-integration shard under `<base_dir>/by-integration/`.
//! `log_execution_result` appends to a single rolling `summary.log`.
//! Each file is guarded by its own lock so concurrent writers serialize
//! per-file rather than globally (spec.md §5 "Audit log files").

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::warn;

use crate::errors::Result;
use crate::model::{AuditLogEntry, ExecutionResultLog, LogQuery};

fn daily_file_name(date: NaiveDate) -> String {
    format!("{}.log", date.format("%Y-%m-%d"))
}

struct FileHandles {
    files: DashMap<PathBuf, std::sync::Arc<Mutex<File>>>,
}

impl FileHandles {
    fn new() -> Self {
        Self {
            files: DashMap::new(),
        }
    }

    fn handle(&self, path: &Path) -> Result<std::sync::Arc<Mutex<File>>> {
        if let Some(existing) = self.files.get(path) {
            return Ok(existing.clone());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let handle = std::sync::Arc::new(Mutex::new(file));
        self.files.insert(path.to_path_buf(), handle.clone());
        Ok(handle)
    }

    fn append_line(&self, path: &Path, line: &str) -> Result<()> {
        let handle = self.handle(path)?;
        let mut file = handle.lock();
        writeln!(file, "{line}")?;
        file.flush()?;
        Ok(())
    }
}

/// Append-only writer for one session's audit trail.
pub struct AuditLogger {
    base_dir: PathBuf,
    shard_by_integration: bool,
    handles: FileHandles,
}

impl AuditLogger {
    /// Open a logger rooted at `base_dir` (typically
    /// `<session_dir>/audit`). Directories are created lazily, on first
    /// write, not here.
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>, shard_by_integration: bool) -> Self {
        Self {
            base_dir: base_dir.into(),
            shard_by_integration,
            handles: FileHandles::new(),
        }
    }

    fn daily_path(&self, timestamp: chrono::DateTime<Utc>) -> PathBuf {
        self.base_dir
            .join("daily")
            .join(daily_file_name(timestamp.date_naive()))
    }

    fn shard_path(&self, integration_id: &str) -> PathBuf {
        self.base_dir
            .join("by-integration")
            .join(format!("{integration_id}.log"))
    }

    fn summary_path(&self) -> PathBuf {
        self.base_dir.join("summary.log")
    }

    /// Append one entry, called once per attempted action (including
    /// dry-run attempts). Writes the daily file and, if enabled, the
    /// per-integration shard.
    pub fn log_action(&self, entry: &AuditLogEntry) -> Result<()> {
        let line = serde_json::to_string(entry)?;
        self.handles.append_line(&self.daily_path(entry.timestamp), &line)?;
        if self.shard_by_integration {
            self.handles
                .append_line(&self.shard_path(&entry.integration_id), &line)?;
        }
        Ok(())
    }

    /// Append one per-plan summary line to the rolling summary file.
    pub fn log_execution_result(&self, summary: &ExecutionResultLog) -> Result<()> {
        let line = serde_json::to_string(summary)?;
        self.handles.append_line(&self.summary_path(), &line)
    }

    /// Like `log_action`, but retried once on failure (spec.md §7 "Audit
    /// write error — retried once; failure only logged to stderr, never
    /// aborts execution").
    pub fn log_action_best_effort(&self, entry: &AuditLogEntry) {
        if self.log_action(entry).is_err() {
            if let Err(err) = self.log_action(entry) {
                warn!(?err, action_id = %entry.execution.action_id, "audit write failed after retry");
            }
        }
    }

    /// The set of daily file paths a `[start, end]` time range could touch,
    /// without opening them — `queryLogs` uses this to scan only the
    /// minimum relevant set of files.
    #[must_use]
    pub fn daily_paths_in_range(
        &self,
        start: Option<chrono::DateTime<Utc>>,
        end: Option<chrono::DateTime<Utc>>,
    ) -> Vec<PathBuf> {
        let daily_dir = self.base_dir.join("daily");
        let Ok(read_dir) = std::fs::read_dir(&daily_dir) else {
            return Vec::new();
        };
        let mut paths: Vec<(NaiveDate, PathBuf)> = read_dir
            .filter_map(std::result::Result::ok)
            .filter_map(|entry| {
                let path = entry.path();
                let date = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())?;
                Some((date, path))
            })
            .filter(|(date, _)| {
                let after_start = start.map_or(true, |s| *date >= s.date_naive());
                let before_end = end.map_or(true, |e| *date <= e.date_naive());
                after_start && before_end
            })
            .collect();
        paths.sort_by_key(|(date, _)| *date);
        paths.into_iter().map(|(_, path)| path).collect()
    }

    /// Run a query against the minimum relevant set of daily files.
    /// Malformed lines are skipped rather than aborting the query.
    pub fn query_logs(&self, query: &LogQuery) -> Result<Vec<AuditLogEntry>> {
        let paths = if query.session_id.is_some() && query.start_time.is_none() && query.end_time.is_none() {
            // A session id alone gives no time hint; fall back to scanning
            // every daily file.
            let daily_dir = self.base_dir.join("daily");
            std::fs::read_dir(&daily_dir)
                .map(|rd| rd.filter_map(std::result::Result::ok).map(|e| e.path()).collect())
                .unwrap_or_default()
        } else {
            self.daily_paths_in_range(query.start_time, query.end_time)
        };

        let mut entries = Vec::new();
        for path in paths {
            let contents = match std::fs::read_to_string(&path) {
                Ok(c) => c,
                Err(_) => continue,
            };
            for line in contents.lines() {
                if let Ok(entry) = serde_json::from_str::<AuditLogEntry>(line) {
                    entries.push(entry);
                }
            }
        }
        entries.sort_by_key(|e| e.timestamp);
        let matched = query.apply(&entries).into_iter().cloned().collect();
        Ok(matched)
    }
}

/// Group a batch of entries by integration id, for callers assembling a
/// restore bundle from freshly logged entries without re-reading disk.
#[must_use]
pub fn group_by_integration(entries: &[AuditLogEntry]) -> HashMap<String, Vec<AuditLogEntry>> {
    let mut grouped: HashMap<String, Vec<AuditLogEntry>> = HashMap::new();
    for entry in entries {
        grouped.entry(entry.integration_id.clone()).or_default().push(entry.clone());
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use auditor_core::model::{
        ActionMetadata, ActionPayload, ActionTarget, ActionType, ExecutionAction, ExecutionStatus,
    };
    use crate::model::{ActionLog, ContextInfo, ExecutionLog, RollbackInfo};
    use tempfile::TempDir;

    fn sample_entry(integration_id: &str, timestamp: chrono::DateTime<Utc>) -> AuditLogEntry {
        AuditLogEntry {
            id: uuid::Uuid::new_v4().to_string(),
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
                duration_ms: 1,
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
                action_id: Some("inv-1".into()),
            },
        }
    }

    #[test]
    fn log_action_writes_daily_file_and_shard() {
        let dir = TempDir::new().unwrap();
        let logger = AuditLogger::new(dir.path(), true);
        let entry = sample_entry("test-001", Utc::now());
        logger.log_action(&entry).unwrap();

        let daily = logger.daily_path(entry.timestamp);
        assert!(daily.exists());
        let shard = logger.shard_path("test-001");
        assert!(shard.exists());
    }

    #[test]
    fn query_logs_filters_by_integration_id() {
        let dir = TempDir::new().unwrap();
        let logger = AuditLogger::new(dir.path(), false);
        logger.log_action(&sample_entry("test-001", Utc::now())).unwrap();
        logger.log_action(&sample_entry("test-002", Utc::now())).unwrap();

        let result = logger
            .query_logs(&LogQuery {
                integration_id: Some("test-001".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].integration_id, "test-001");
    }

    #[test]
    fn query_logs_skips_malformed_lines() {
        let dir = TempDir::new().unwrap();
        let logger = AuditLogger::new(dir.path(), false);
        let entry = sample_entry("test-001", Utc::now());
        logger.log_action(&entry).unwrap();
        logger
            .handles
            .append_line(&logger.daily_path(entry.timestamp), "not json")
            .unwrap();

        let result = logger.query_logs(&LogQuery::default()).unwrap();
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn timestamps_within_a_session_are_returned_in_monotonic_order() {
        let dir = TempDir::new().unwrap();
        let logger = AuditLogger::new(dir.path(), false);
        let t0 = Utc::now();
        logger.log_action(&sample_entry("a", t0 + chrono::Duration::seconds(2))).unwrap();
        logger.log_action(&sample_entry("a", t0)).unwrap();
        logger.log_action(&sample_entry("a", t0 + chrono::Duration::seconds(1))).unwrap();

        let result = logger.query_logs(&LogQuery::default()).unwrap();
        assert!(result.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn log_execution_result_appends_to_summary_file() {
        let dir = TempDir::new().unwrap();
        let logger = AuditLogger::new(dir.path(), false);
        logger
            .log_execution_result(&ExecutionResultLog {
                timestamp: Utc::now(),
                session_id: "s1".into(),
                operator_id: "op".into(),
                plan_id: "p1".into(),
                integration_id: "test-001".into(),
                status: ExecutionStatus::Success,
                executed: 1,
                failed: 0,
                skipped: 0,
                duration_ms: 5,
            })
            .unwrap();
        assert!(logger.summary_path().exists());
    }
}
