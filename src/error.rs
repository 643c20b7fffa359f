//! Error types for Cohort
//!
//! Every failure a caller can observe maps to one variant here; the HTTP
//! layer turns them into status codes.

use thiserror::Error;

use crate::experiment::ExperimentId;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Cohort error types
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed caller input (e.g. non-positive or non-numeric group count)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Experiment id does not resolve to a stored record
    #[error("Experiment not found: {0}")]
    NotFound(ExperimentId),

    /// Another transaction committed against the same record first.
    ///
    /// Retried transparently by `ExperimentStore::update`; only surfaces
    /// from raw store calls.
    #[error("Transaction conflict on key {key}")]
    TransactionConflict {
        /// Store key that was contended
        key: String,
    },

    /// Backing store unreachable or commit failed irrecoverably
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Audit record write failed after the counter already committed.
    ///
    /// Logged and counted by the service, never returned from an assignment.
    #[error("Audit write failed for experiment {experiment_id}: {reason} (group still handed out)")]
    AuditWriteFailure {
        /// Experiment whose assignment went unrecorded
        experiment_id: ExperimentId,
        /// Underlying store failure
        reason: String,
    },

    /// Stored document violates a record invariant
    #[error("Corrupted record: {0}")]
    Corrupted(String),

    /// JSON encoding/decoding error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether retrying the same transaction may succeed.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::TransactionConflict { .. })
    }
}
