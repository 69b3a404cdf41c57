//! Replay of remote change records into the SQLite store.
//!
//! A [`ChangeFeed`] delivers [`Change`] records in no particular order. The
//! [`ChangeApplier`] upserts them idempotently and parks workout metrics whose
//! workout has not arrived yet in a pending table until it does.

mod applier;
mod change;
mod feed;

pub use applier::{Applied, ChangeApplier};
pub use change::{
    Change, DeletePayload, MetricPayload, Operation, SyncEntity, WorkoutMetricPayload,
    WorkoutPayload,
};
pub use feed::{run_sync_pass, ChangeFeed, MemoryFeed};

use crate::persistence::PersistenceError;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The change could not be decoded. Batches drop these and continue.
    #[error("malformed {entity} payload: {reason}")]
    MalformedPayload { entity: String, reason: String },
    /// The store failed. Batches stop at the first one.
    #[error("storage error: {0}")]
    Storage(#[from] PersistenceError),
    #[error("change feed error: {0}")]
    Feed(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<sqlx::Error> for SyncError {
    fn from(e: sqlx::Error) -> Self {
        SyncError::Storage(PersistenceError::Database(e))
    }
}

impl SyncError {
    pub(crate) fn malformed(entity: &str, reason: impl std::fmt::Display) -> Self {
        SyncError::MalformedPayload {
            entity: entity.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Outcome counts of one batch or sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub pushed: usize,
    pub applied: usize,
    pub deferred: usize,
    pub ignored: usize,
    pub dropped: usize,
}
