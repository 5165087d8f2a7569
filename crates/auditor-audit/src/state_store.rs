//! Processing-state store: a persistent per-integration record keyed by
//! `(operatorId, integrationId)` that de-duplicates work across runs
//! (spec.md §4.7).
//!
//! Two backends are provided behind the same `StateStore` trait, matching
//! the teacher's `backends::{sqlite, memory}` split: `MemoryStateStore`
//! for tests and short-lived sessions, `SqliteStateStore` for the
//! persistent default. The sqlite backend is a single `rusqlite::Connection`
//! behind a `parking_lot::Mutex`, with each call dispatched to
//! `tokio::task::spawn_blocking` — simpler than the teacher's dedicated
//! worker-thread-plus-channel design (see DESIGN.md), appropriate here
//! because the store only ever takes one call at a time per session.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use rusqlite::{params, Connection};

use crate::errors::{Error, Result};
use crate::model::{ProcessingStateRecord, ProcessingStats, ProcessingStatus};

/// The confirmation token `reset()` compares against; a mismatch never
/// touches the store.
pub const RESET_CONFIRMATION_TOKEN: &str = "CONFIRM-RESET-PROCESSING-STATE";

/// Persistent de-duplication record, backed by memory or sqlite.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Whether an integration should be (re)processed, given the caller's
    /// max-age and force-reprocess overrides. `true` when no record
    /// exists yet, `forceReprocess` is set, or the existing record is
    /// older than `max_age`.
    async fn should_reprocess(
        &self,
        integration_id: &str,
        operator_id: &str,
        max_age: Option<std::time::Duration>,
        force_reprocess: bool,
    ) -> Result<bool>;

    /// Upsert the processing record for `(operator_id, integration_id)`.
    async fn record(&self, record: ProcessingStateRecord) -> Result<()>;

    /// Aggregate counters across every stored record, optionally scoped
    /// to one operator.
    async fn get_processing_stats(&self, operator_id: Option<&str>) -> Result<ProcessingStats>;

    /// Delete records whose `last_processed_at` is older than `older_than`.
    /// Returns the number of records removed.
    async fn cleanup(&self, older_than: DateTime<Utc>) -> Result<u64>;

    /// Dump every stored record, for `state --export`.
    async fn export_state(&self) -> Result<Vec<ProcessingStateRecord>>;

    /// Load records into the store (upserting by key), for `state --import`.
    /// Returns the number of records written.
    async fn import_state(&self, records: Vec<ProcessingStateRecord>) -> Result<u64>;

    /// Clear every record. Requires `confirmation == RESET_CONFIRMATION_TOKEN`;
    /// any other value returns `Error::ConfirmationRequired` and leaves the
    /// store untouched.
    async fn reset(&self, confirmation: &str) -> Result<()>;
}

fn key(operator_id: &str, integration_id: &str) -> (String, String) {
    (operator_id.to_string(), integration_id.to_string())
}

/// In-memory backend, used by tests and single-shot sessions that don't
/// need cross-run de-duplication persisted to disk.
#[derive(Default)]
pub struct MemoryStateStore {
    records: DashMap<(String, String), ProcessingStateRecord>,
}

impl MemoryStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn should_reprocess(
        &self,
        integration_id: &str,
        operator_id: &str,
        max_age: Option<std::time::Duration>,
        force_reprocess: bool,
    ) -> Result<bool> {
        if force_reprocess {
            return Ok(true);
        }
        let Some(existing) = self.records.get(&key(operator_id, integration_id)) else {
            return Ok(true);
        };
        Ok(is_stale(existing.last_processed_at, max_age))
    }

    async fn record(&self, record: ProcessingStateRecord) -> Result<()> {
        self.records
            .insert(key(&record.operator_id, &record.integration_id), record);
        Ok(())
    }

    async fn get_processing_stats(&self, operator_id: Option<&str>) -> Result<ProcessingStats> {
        Ok(aggregate_stats(
            self.records.iter().map(|entry| entry.value().clone()),
            operator_id,
        ))
    }

    async fn cleanup(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let stale_keys: Vec<_> = self
            .records
            .iter()
            .filter(|entry| entry.value().last_processed_at < older_than)
            .map(|entry| entry.key().clone())
            .collect();
        let removed = stale_keys.len() as u64;
        for k in stale_keys {
            self.records.remove(&k);
        }
        Ok(removed)
    }

    async fn export_state(&self) -> Result<Vec<ProcessingStateRecord>> {
        Ok(self.records.iter().map(|entry| entry.value().clone()).collect())
    }

    async fn import_state(&self, records: Vec<ProcessingStateRecord>) -> Result<u64> {
        let count = records.len() as u64;
        for record in records {
            self.records
                .insert(key(&record.operator_id, &record.integration_id), record);
        }
        Ok(count)
    }

    async fn reset(&self, confirmation: &str) -> Result<()> {
        if confirmation != RESET_CONFIRMATION_TOKEN {
            return Err(Error::ConfirmationRequired);
        }
        self.records.clear();
        Ok(())
    }
}

fn is_stale(last_processed_at: DateTime<Utc>, max_age: Option<std::time::Duration>) -> bool {
    match max_age {
        None => false,
        Some(max_age) => match ChronoDuration::from_std(max_age) {
            Ok(threshold) => Utc::now() - last_processed_at > threshold,
            Err(_) => true,
        },
    }
}

fn aggregate_stats(records: impl Iterator<Item = ProcessingStateRecord>, operator_id: Option<&str>) -> ProcessingStats {
    let mut stats = ProcessingStats::default();
    for record in records {
        if let Some(op) = operator_id {
            if record.operator_id != op {
                continue;
            }
        }
        stats.total_records += 1;
        match record.status {
            ProcessingStatus::Success => stats.success_count += 1,
            ProcessingStatus::Partial => stats.partial_count += 1,
            ProcessingStatus::Failed => stats.failed_count += 1,
        }
    }
    stats
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS processing_state (
    operator_id TEXT NOT NULL,
    integration_id TEXT NOT NULL,
    last_processed_at TEXT NOT NULL,
    last_result_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    PRIMARY KEY (operator_id, integration_id)
);
";

/// Sqlite-backed persistent implementation, the default for real sessions.
pub struct SqliteStateStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStateStore {
    /// Open (creating if absent) the sqlite file at `path`, in WAL mode.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// An in-memory sqlite connection, for tests that want real SQL
    /// semantics without a file on disk.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock();
            f(&guard)
        })
        .await
        .expect("state store worker task panicked")
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProcessingStateRecord> {
    let last_processed_at: String = row.get(2)?;
    let status: String = row.get(4)?;
    Ok(ProcessingStateRecord {
        operator_id: row.get(0)?,
        integration_id: row.get(1)?,
        last_processed_at: last_processed_at
            .parse()
            .unwrap_or_else(|_| Utc::now()),
        last_result_hash: row.get(3)?,
        status: match status.as_str() {
            "success" => ProcessingStatus::Success,
            "partial" => ProcessingStatus::Partial,
            _ => ProcessingStatus::Failed,
        },
    })
}

fn status_str(status: ProcessingStatus) -> &'static str {
    match status {
        ProcessingStatus::Success => "success",
        ProcessingStatus::Partial => "partial",
        ProcessingStatus::Failed => "failed",
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn should_reprocess(
        &self,
        integration_id: &str,
        operator_id: &str,
        max_age: Option<std::time::Duration>,
        force_reprocess: bool,
    ) -> Result<bool> {
        if force_reprocess {
            return Ok(true);
        }
        let operator_id = operator_id.to_string();
        let integration_id = integration_id.to_string();
        let existing = self
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT operator_id, integration_id, last_processed_at, last_result_hash, status
                     FROM processing_state WHERE operator_id = ?1 AND integration_id = ?2",
                    params![operator_id, integration_id],
                    |row| row_to_record(row).map_err(rusqlite::Error::from),
                )
                .map(Some)
                .or_else(|err| match err {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(Error::Sqlite(other)),
                })
            })
            .await?;
        match existing {
            None => Ok(true),
            Some(record) => Ok(is_stale(record.last_processed_at, max_age)),
        }
    }

    async fn record(&self, record: ProcessingStateRecord) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO processing_state (operator_id, integration_id, last_processed_at, last_result_hash, status)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(operator_id, integration_id) DO UPDATE SET
                    last_processed_at = excluded.last_processed_at,
                    last_result_hash = excluded.last_result_hash,
                    status = excluded.status",
                params![
                    record.operator_id,
                    record.integration_id,
                    record.last_processed_at.to_rfc3339(),
                    record.last_result_hash,
                    status_str(record.status),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_processing_stats(&self, operator_id: Option<&str>) -> Result<ProcessingStats> {
        let operator_id = operator_id.map(str::to_string);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT operator_id, integration_id, last_processed_at, last_result_hash, status
                 FROM processing_state",
            )?;
            let records = stmt
                .query_map([], row_to_record)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(aggregate_stats(records.into_iter(), operator_id.as_deref()))
        })
        .await
    }

    async fn cleanup(&self, older_than: DateTime<Utc>) -> Result<u64> {
        self.with_conn(move |conn| {
            let removed = conn.execute(
                "DELETE FROM processing_state WHERE last_processed_at < ?1",
                params![older_than.to_rfc3339()],
            )?;
            Ok(removed as u64)
        })
        .await
    }

    async fn export_state(&self) -> Result<Vec<ProcessingStateRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT operator_id, integration_id, last_processed_at, last_result_hash, status
                 FROM processing_state",
            )?;
            let records = stmt
                .query_map([], row_to_record)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(records)
        })
        .await
    }

    async fn import_state(&self, records: Vec<ProcessingStateRecord>) -> Result<u64> {
        self.with_conn(move |conn| {
            let count = records.len() as u64;
            for record in records {
                conn.execute(
                    "INSERT INTO processing_state (operator_id, integration_id, last_processed_at, last_result_hash, status)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(operator_id, integration_id) DO UPDATE SET
                        last_processed_at = excluded.last_processed_at,
                        last_result_hash = excluded.last_result_hash,
                        status = excluded.status",
                    params![
                        record.operator_id,
                        record.integration_id,
                        record.last_processed_at.to_rfc3339(),
                        record.last_result_hash,
                        status_str(record.status),
                    ],
                )?;
            }
            Ok(count)
        })
        .await
    }

    async fn reset(&self, confirmation: &str) -> Result<()> {
        if confirmation != RESET_CONFIRMATION_TOKEN {
            return Err(Error::ConfirmationRequired);
        }
        self.with_conn(|conn| {
            conn.execute("DELETE FROM processing_state", [])?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(integration_id: &str, status: ProcessingStatus, age: ChronoDuration) -> ProcessingStateRecord {
        ProcessingStateRecord {
            integration_id: integration_id.to_string(),
            operator_id: "op-1".into(),
            last_processed_at: Utc::now() - age,
            last_result_hash: "hash-1".into(),
            status,
        }
    }

    #[tokio::test]
    async fn memory_store_reprocesses_when_no_record_exists() {
        let store = MemoryStateStore::new();
        let should = store
            .should_reprocess("test-001", "op-1", None, false)
            .await
            .unwrap();
        assert!(should);
    }

    #[tokio::test]
    async fn memory_store_skips_fresh_record_without_force() {
        let store = MemoryStateStore::new();
        store
            .record(record("test-001", ProcessingStatus::Success, ChronoDuration::zero()))
            .await
            .unwrap();
        let should = store
            .should_reprocess("test-001", "op-1", Some(std::time::Duration::from_secs(3600)), false)
            .await
            .unwrap();
        assert!(!should);
    }

    #[tokio::test]
    async fn memory_store_reprocesses_stale_record() {
        let store = MemoryStateStore::new();
        store
            .record(record("test-001", ProcessingStatus::Success, ChronoDuration::hours(48)))
            .await
            .unwrap();
        let should = store
            .should_reprocess("test-001", "op-1", Some(std::time::Duration::from_secs(3600)), false)
            .await
            .unwrap();
        assert!(should);
    }

    #[tokio::test]
    async fn memory_store_force_reprocess_ignores_freshness() {
        let store = MemoryStateStore::new();
        store
            .record(record("test-001", ProcessingStatus::Success, ChronoDuration::zero()))
            .await
            .unwrap();
        let should = store.should_reprocess("test-001", "op-1", None, true).await.unwrap();
        assert!(should);
    }

    #[tokio::test]
    async fn reset_requires_exact_confirmation_token() {
        let store = MemoryStateStore::new();
        store
            .record(record("test-001", ProcessingStatus::Success, ChronoDuration::zero()))
            .await
            .unwrap();
        let err = store.reset("wrong-token").await.unwrap_err();
        assert!(matches!(err, Error::ConfirmationRequired));

        store.reset(RESET_CONFIRMATION_TOKEN).await.unwrap();
        let stats = store.get_processing_stats(None).await.unwrap();
        assert_eq!(stats.total_records, 0);
    }

    #[tokio::test]
    async fn export_then_import_round_trips_into_a_fresh_store() {
        let source = MemoryStateStore::new();
        source
            .record(record("test-001", ProcessingStatus::Success, ChronoDuration::zero()))
            .await
            .unwrap();
        source
            .record(record("test-002", ProcessingStatus::Failed, ChronoDuration::zero()))
            .await
            .unwrap();

        let exported = source.export_state().await.unwrap();
        let dest = MemoryStateStore::new();
        dest.import_state(exported).await.unwrap();

        assert_eq!(
            dest.get_processing_stats(None).await.unwrap(),
            source.get_processing_stats(None).await.unwrap()
        );
    }

    #[tokio::test]
    async fn sqlite_store_round_trips_a_record() {
        let store = SqliteStateStore::open_in_memory().unwrap();
        store
            .record(record("test-001", ProcessingStatus::Partial, ChronoDuration::zero()))
            .await
            .unwrap();

        let should = store
            .should_reprocess("test-001", "op-1", Some(std::time::Duration::from_secs(3600)), false)
            .await
            .unwrap();
        assert!(!should);

        let stats = store.get_processing_stats(Some("op-1")).await.unwrap();
        assert_eq!(stats.partial_count, 1);
    }

    #[tokio::test]
    async fn sqlite_store_cleanup_removes_stale_rows() {
        let store = SqliteStateStore::open_in_memory().unwrap();
        store
            .record(record("test-001", ProcessingStatus::Success, ChronoDuration::hours(72)))
            .await
            .unwrap();
        store
            .record(record("test-002", ProcessingStatus::Success, ChronoDuration::zero()))
            .await
            .unwrap();

        let removed = store.cleanup(Utc::now() - ChronoDuration::hours(24)).await.unwrap();
        assert_eq!(removed, 1);
        let stats = store.get_processing_stats(None).await.unwrap();
        assert_eq!(stats.total_records, 1);
    }

    #[tokio::test]
    async fn sqlite_store_reset_requires_confirmation() {
        let store = SqliteStateStore::open_in_memory().unwrap();
        store
            .record(record("test-001", ProcessingStatus::Success, ChronoDuration::zero()))
            .await
            .unwrap();
        assert!(matches!(store.reset("nope").await, Err(Error::ConfirmationRequired)));
        store.reset(RESET_CONFIRMATION_TOKEN).await.unwrap();
        assert_eq!(store.get_processing_stats(None).await.unwrap().total_records, 0);
    }
}
