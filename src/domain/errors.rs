//! Error taxonomy of the reconciliation engine
//!
//! Only `Network`, `Store` and `Cancelled` are fatal to a run. Everything
//! else degrades to "skip and count" so a single bad record never blocks a
//! batch.

use thiserror::Error;

use crate::domain::identity::EntityKind;

pub type SyncResult<T> = Result<T, SyncError>;

/// Diagnostic captured for one conflicting entity when a batch commit hits an
/// optimistic-concurrency mismatch.
#[derive(Debug, Clone)]
pub struct ConflictDiagnostic {
    pub kind: EntityKind,
    pub entity_id: String,
    /// Short human-readable summary of the in-memory state.
    pub summary: String,
    /// Concurrency token the engine read before mutating.
    pub in_memory_version: i64,
    /// Token currently persisted; `None` when the row no longer exists.
    pub persisted_version: Option<i64>,
}

#[derive(Error, Debug)]
pub enum SyncError {
    /// A record references another external entity with no existing mapping.
    /// The dependent record is skipped and counted, not fatal.
    #[error("record references unmapped {kind} '{external_id}'")]
    UnmappedReference { kind: EntityKind, external_id: String },

    /// Required field missing or unusable on a source record. The record is
    /// skipped and counted; the stage continues.
    #[error("malformed source record: {reason}")]
    MalformedRecord { reason: String },

    /// Optimistic concurrency token mismatch at commit time. Aborts the
    /// current batch; recoverable by re-running the pipeline.
    #[error("optimistic concurrency conflict on {} entities", conflicts.len())]
    ConcurrencyConflict { conflicts: Vec<ConflictDiagnostic> },

    /// Transient or persistent fetch failure. Fails the stage; safe to retry
    /// the whole stage thanks to stage idempotency.
    #[error("network failure: {message}")]
    Network { message: String },

    /// Unrecoverable internal store error.
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    /// Cooperative cancellation observed between records or batches.
    #[error("sync cancelled")]
    Cancelled,
}

impl SyncError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        SyncError::MalformedRecord { reason: reason.into() }
    }

    pub fn network(err: impl std::fmt::Display) -> Self {
        SyncError::Network { message: err.to_string() }
    }

    /// Whether the error is scoped to a single record and should be absorbed
    /// as a skip instead of failing the stage.
    pub fn is_record_scoped(&self) -> bool {
        matches!(
            self,
            SyncError::UnmappedReference { .. } | SyncError::MalformedRecord { .. }
        )
    }
}
