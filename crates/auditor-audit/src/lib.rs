//! Append-only audit logger, restore bundles, and the processing-state
//! store that de-duplicates work across runs (spec.md §4.6, §4.7).

pub mod diff;
pub mod errors;
pub mod logger;
pub mod model;
pub mod restore;
pub mod state_store;

pub use diff::{apply_patch, diff_states, verify_patch_hash, verify_state_hash, DiffResult};
pub use errors::{Error, Result};
pub use logger::AuditLogger;
pub use model::{
    ActionLog, AuditLogEntry, ContextInfo, ExecutionLog, ExecutionResultLog, LogQuery,
    ProcessingStateRecord, ProcessingStats, ProcessingStatus, RestoreBundle,
    RestoreBundleIntegration, RollbackInfo,
};
pub use restore::{
    create_restore_bundle, generate_full_rollback, generate_rollback_actions, load, save,
    RestoreBundleSummary,
};
pub use state_store::{MemoryStateStore, SqliteStateStore, StateStore, RESET_CONFIRMATION_TOKEN};
