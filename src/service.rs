//! Assignment Service
//!
//! Creates experiments and hands out their groups in round-robin order.
//! Every handed-out group gets an audit record written after the counter
//! commits; a failed audit write is logged and counted but never undoes the
//! assignment.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tracing::{info, warn};

use crate::experiment::{
    AssignmentRecord, Experiment, ExperimentId, ExperimentStore, GroupCount, GroupIndex, Owner,
};
use crate::kv::KvStore;
use crate::retry::RetryPolicy;
use crate::{Error, Result};

/// Round-robin group assignment over a transactional store.
///
/// Shares no state between calls except the store, so wrap it in an `Arc`
/// and call it from as many tasks as needed.
///
/// # Example
///
/// ```rust
/// use cohort::kv::MemoryKvStore;
/// use cohort::AssignmentService;
///
/// # async fn example() -> cohort::Result<()> {
/// let service = AssignmentService::new(MemoryKvStore::new());
/// let id = service.create_experiment(None, "Pricing page", 2).await?;
///
/// assert_eq!(service.assign_next_group(id, "", "").await?, 0);
/// assert_eq!(service.assign_next_group(id, "", "").await?, 1);
/// assert_eq!(service.assign_next_group(id, "", "").await?, 0);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct AssignmentService<S> {
    store: ExperimentStore<S>,
    audit_failures: AtomicU64,
}

impl<S: KvStore> AssignmentService<S> {
    /// Create a service with the default retry policy.
    #[must_use]
    pub fn new(kv: S) -> Self {
        Self::builder(kv).build()
    }

    /// Create a service builder.
    #[must_use]
    pub fn builder(kv: S) -> AssignmentServiceBuilder<S> {
        AssignmentServiceBuilder::new(kv)
    }

    /// Get the experiment store.
    #[must_use]
    pub const fn store(&self) -> &ExperimentStore<S> {
        &self.store
    }

    /// Number of assignments whose audit record could not be written.
    #[must_use]
    pub fn audit_failures(&self) -> u64 {
        self.audit_failures.load(Ordering::Relaxed)
    }

    /// Create an experiment with `counter = 0`.
    ///
    /// # Errors
    ///
    /// `Error::InvalidArgument` if `group_count` is not positive (nothing is
    /// written), or a store error.
    #[tracing::instrument(skip(self, owner, title))]
    pub async fn create_experiment(
        &self,
        owner: Option<Owner>,
        title: &str,
        group_count: i64,
    ) -> Result<ExperimentId> {
        let group_count = GroupCount::new(group_count)?;
        let experiment = Experiment::builder(title, group_count).owner(owner).build();

        self.store.insert(&experiment).await?;

        info!(
            experiment_id = %experiment.id(),
            group_count = group_count.get(),
            "experiment created"
        );
        Ok(experiment.id())
    }

    /// Hand out the next group of an experiment.
    ///
    /// The counter moves exactly once per successful call, serialized with
    /// every other call on the same experiment. The audit record is written
    /// afterwards; if it fails the group is still returned.
    ///
    /// # Errors
    ///
    /// `Error::NotFound` for an unknown id (no mutation, no audit record),
    /// `Error::StoreUnavailable` once outage retries are exhausted.
    #[tracing::instrument(skip(self, remote_addr, user_agent), fields(experiment_id = %id))]
    pub async fn assign_next_group(
        &self,
        id: ExperimentId,
        remote_addr: &str,
        user_agent: &str,
    ) -> Result<GroupIndex> {
        let requested_at = Utc::now();
        let assigned = self.store.update(id, Experiment::advance).await?;

        let record = AssignmentRecord::builder(id, assigned)
            .created(requested_at)
            .remote_addr(remote_addr)
            .user_agent(user_agent)
            .build();

        if let Err(err) = self.store.append_assignment(&record).await {
            self.audit_failures.fetch_add(1, Ordering::Relaxed);
            let failure = Error::AuditWriteFailure {
                experiment_id: id,
                reason: err.to_string(),
            };
            warn!(group = assigned, error = %failure, "assignment not recorded");
        }

        Ok(assigned)
    }

    /// Look up an experiment.
    ///
    /// # Errors
    ///
    /// `Error::NotFound` for an unknown id, or a store error.
    pub async fn experiment(&self, id: ExperimentId) -> Result<Experiment> {
        self.store.get(id).await?.ok_or(Error::NotFound(id))
    }

    /// Audit records of an experiment, in the order they were written.
    ///
    /// # Errors
    ///
    /// `Error::NotFound` for an unknown id, or a store error.
    pub async fn assignments(&self, id: ExperimentId) -> Result<Vec<AssignmentRecord>> {
        if !self.store.contains(id).await? {
            return Err(Error::NotFound(id));
        }
        self.store.assignments(id).await
    }
}

/// Builder for `AssignmentService`.
#[derive(Debug)]
pub struct AssignmentServiceBuilder<S> {
    kv: S,
    retry: RetryPolicy,
}

impl<S: KvStore> AssignmentServiceBuilder<S> {
    /// Create a new builder over `kv` with the default retry policy.
    #[must_use]
    pub fn new(kv: S) -> Self {
        Self {
            kv,
            retry: RetryPolicy::default(),
        }
    }

    /// Set the transaction retry policy.
    #[must_use]
    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Build the service.
    #[must_use]
    pub fn build(self) -> AssignmentService<S> {
        AssignmentService {
            store: ExperimentStore::with_retry_policy(self.kv, self.retry),
            audit_failures: AtomicU64::new(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKvStore;

    fn service() -> AssignmentService<MemoryKvStore> {
        AssignmentService::builder(MemoryKvStore::new())
            .retry_policy(RetryPolicy::immediate())
            .build()
    }

    #[tokio::test]
    async fn test_create_experiment_starts_at_zero() {
        let service = service();

        let id = service
            .create_experiment(Some(Owner::new("alice")), "Banner", 4)
            .await
            .unwrap();
        let experiment = service.experiment(id).await.unwrap();

        assert_eq!(experiment.counter(), 0);
        assert_eq!(experiment.group_count().get(), 4);
        assert_eq!(experiment.title(), "Banner");
        assert_eq!(experiment.owner().map(Owner::as_str), Some("alice"));
    }

    #[tokio::test]
    async fn test_create_experiment_rejects_zero_groups() {
        let service = service();

        let err = service.create_experiment(None, "t", 0).await.unwrap_err();

        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(service.store().kv().is_empty());
    }

    #[tokio::test]
    async fn test_assign_records_caller_metadata() {
        let service = service();
        let id = service.create_experiment(None, "t", 2).await.unwrap();

        service
            .assign_next_group(id, "198.51.100.4", "Mozilla/5.0")
            .await
            .unwrap();

        let records = service.assignments(id).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].remote_addr(), "198.51.100.4");
        assert_eq!(records[0].user_agent(), "Mozilla/5.0");
        assert_eq!(records[0].return_value(), 0);
        assert_eq!(service.audit_failures(), 0);
    }

    #[tokio::test]
    async fn test_unknown_experiment_lookups() {
        let service = service();
        let id = ExperimentId::new();

        assert!(matches!(service.experiment(id).await, Err(Error::NotFound(_))));
        assert!(matches!(service.assignments(id).await, Err(Error::NotFound(_))));
        assert!(matches!(
            service.assign_next_group(id, "", "").await,
            Err(Error::NotFound(_))
        ));
    }
}
