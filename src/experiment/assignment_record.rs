//! Assignment Record - append-only audit entry for one assignment

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ExperimentId, GroupIndex};

/// Audit entry written once per successful assignment.
///
/// Captures who asked (best-effort caller metadata) and which group they
/// were given. Never mutated after it is written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssignmentRecord {
    experiment_id: ExperimentId,
    created: DateTime<Utc>,
    remote_addr: String,
    user_agent: String,
    return_value: GroupIndex,
}

impl AssignmentRecord {
    /// Create a record timestamped now, with empty caller metadata.
    #[must_use]
    pub fn new(experiment_id: ExperimentId, return_value: GroupIndex) -> Self {
        Self::builder(experiment_id, return_value).build()
    }

    /// Create a builder for constructing a record with caller metadata.
    #[must_use]
    pub fn builder(
        experiment_id: ExperimentId,
        return_value: GroupIndex,
    ) -> AssignmentRecordBuilder {
        AssignmentRecordBuilder::new(experiment_id, return_value)
    }

    /// Get the owning experiment ID.
    #[must_use]
    pub const fn experiment_id(&self) -> ExperimentId {
        self.experiment_id
    }

    /// Get the request timestamp.
    #[must_use]
    pub const fn created(&self) -> DateTime<Utc> {
        self.created
    }

    /// Get the caller's address (may be empty).
    #[must_use]
    pub fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    /// Get the caller's user agent (may be empty).
    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Get the group index returned to the caller.
    #[must_use]
    pub const fn return_value(&self) -> GroupIndex {
        self.return_value
    }
}

/// Builder for `AssignmentRecord`.
#[derive(Debug)]
pub struct AssignmentRecordBuilder {
    experiment_id: ExperimentId,
    created: DateTime<Utc>,
    remote_addr: String,
    user_agent: String,
    return_value: GroupIndex,
}

impl AssignmentRecordBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(experiment_id: ExperimentId, return_value: GroupIndex) -> Self {
        Self {
            experiment_id,
            created: Utc::now(),
            remote_addr: String::new(),
            user_agent: String::new(),
            return_value,
        }
    }

    /// Set the caller's address.
    #[must_use]
    pub fn remote_addr(mut self, remote_addr: impl Into<String>) -> Self {
        self.remote_addr = remote_addr.into();
        self
    }

    /// Set the caller's user agent.
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set a custom timestamp.
    #[must_use]
    pub const fn created(mut self, created: DateTime<Utc>) -> Self {
        self.created = created;
        self
    }

    /// Build the `AssignmentRecord`.
    #[must_use]
    pub fn build(self) -> AssignmentRecord {
        AssignmentRecord {
            experiment_id: self.experiment_id,
            created: self.created,
            remote_addr: self.remote_addr,
            user_agent: self.user_agent,
            return_value: self.return_value,
        }
    }
}
