//! Experiment Store - typed experiments and audit streams over a `KvStore`
//!
//! Experiments are JSON documents under `experiment/<id>`; assignment records
//! are appended to the stream `assignments/<id>`.

use tracing::{debug, warn};

use super::{AssignmentRecord, Experiment, ExperimentId};
use crate::kv::KvStore;
use crate::retry::RetryPolicy;
use crate::{Error, Result};

fn experiment_key(id: ExperimentId) -> String {
    format!("experiment/{id}")
}

fn assignments_stream(id: ExperimentId) -> String {
    format!("assignments/{id}")
}

/// How far a transaction attempt got before it failed.
enum Attempt {
    /// Nothing was written.
    BeforeCommit(Error),
    /// The compare-and-swap failed. Only a conflict guarantees nothing was written.
    Commit(Error),
}

fn decode(bytes: &[u8]) -> Result<Experiment> {
    let experiment: Experiment = serde_json::from_slice(bytes)?;
    experiment.validate()?;
    Ok(experiment)
}

/// Typed storage for experiments and their audit trail.
///
/// ## Transactions
///
/// [`ExperimentStore::update`] is the read-modify-write wrapper: each attempt
/// reads the current version, applies the mutation to a fresh copy, and
/// commits with compare-and-swap against the version it read. A lost race
/// re-runs the whole attempt, so the mutation never sees stale state.
#[derive(Debug)]
pub struct ExperimentStore<S> {
    kv: S,
    retry: RetryPolicy,
}

impl<S: KvStore> ExperimentStore<S> {
    /// Create a store with the default retry policy.
    #[must_use]
    pub fn new(kv: S) -> Self {
        Self::with_retry_policy(kv, RetryPolicy::default())
    }

    /// Create a store with a custom retry policy.
    #[must_use]
    pub const fn with_retry_policy(kv: S, retry: RetryPolicy) -> Self {
        Self { kv, retry }
    }

    /// Get the underlying key-value store.
    #[must_use]
    pub const fn kv(&self) -> &S {
        &self.kv
    }

    /// Persist a new experiment.
    ///
    /// # Errors
    ///
    /// `Error::TransactionConflict` if an experiment with the same id exists,
    /// or any store error.
    pub async fn insert(&self, experiment: &Experiment) -> Result<()> {
        experiment.validate()?;
        let document = serde_json::to_vec(experiment)?;
        self.kv
            .compare_and_swap(&experiment_key(experiment.id()), None, document)
            .await?;
        Ok(())
    }

    /// Get an experiment by ID.
    ///
    /// # Errors
    ///
    /// Store errors, or `Error::Corrupted`/`Error::Serialization` for a bad
    /// document.
    pub async fn get(&self, id: ExperimentId) -> Result<Option<Experiment>> {
        match self.kv.get(&experiment_key(id)).await? {
            Some(current) => decode(&current.value).map(Some),
            None => Ok(None),
        }
    }

    /// Check whether an experiment exists.
    ///
    /// # Errors
    ///
    /// Store errors.
    pub async fn contains(&self, id: ExperimentId) -> Result<bool> {
        self.kv.exists(&experiment_key(id)).await
    }

    /// Atomically apply `mutate` to the stored experiment and return its output.
    ///
    /// `mutate` may run more than once (once per attempt); only the run whose
    /// commit succeeds has its output returned.
    ///
    /// Outages while reading are retried up to the policy's budget. An outage
    /// reported by the compare-and-swap is returned as is: the write may have
    /// landed, and re-running the mutation would apply it twice.
    ///
    /// # Errors
    ///
    /// - `Error::NotFound` if `id` is unknown (no write happens)
    /// - `Error::StoreUnavailable` once outage retries are exhausted, or when the
    ///   commit itself reports an outage
    /// - `Error::Corrupted` if the mutation breaks the counter invariant
    #[tracing::instrument(level = "debug", skip(self, mutate), fields(experiment_id = %id))]
    pub async fn update<T, F>(&self, id: ExperimentId, mut mutate: F) -> Result<T>
    where
        F: FnMut(&mut Experiment) -> T + Send,
        T: Send,
    {
        let key = experiment_key(id);
        let mut conflicts = 0u32;
        let mut outages = 0u32;

        loop {
            match self.try_update(id, &key, &mut mutate).await {
                Ok(output) => return Ok(output),
                Err(Attempt::BeforeCommit(err) | Attempt::Commit(err)) if err.is_conflict() => {
                    conflicts = conflicts.saturating_add(1);
                    debug!(attempt = conflicts, "transaction conflict, retrying");
                    self.retry.wait(conflicts).await;
                }
                Err(Attempt::BeforeCommit(Error::StoreUnavailable(reason)))
                    if outages < self.retry.max_unavailable_retries =>
                {
                    outages += 1;
                    warn!(
                        attempt = outages,
                        max = self.retry.max_unavailable_retries,
                        %reason,
                        "store unavailable, retrying"
                    );
                    self.retry.wait(outages).await;
                }
                Err(Attempt::Commit(err @ Error::StoreUnavailable(_))) => {
                    warn!(error = %err, "commit outcome unknown, not retrying");
                    return Err(err);
                }
                Err(Attempt::BeforeCommit(err) | Attempt::Commit(err)) => return Err(err),
            }
        }
    }

    async fn try_update<T, F>(
        &self,
        id: ExperimentId,
        key: &str,
        mutate: &mut F,
    ) -> std::result::Result<T, Attempt>
    where
        F: FnMut(&mut Experiment) -> T + Send,
        T: Send,
    {
        let (output, version, document) = self
            .prepare(id, key, mutate)
            .await
            .map_err(Attempt::BeforeCommit)?;
        self.kv
            .compare_and_swap(key, Some(version), document)
            .await
            .map_err(Attempt::Commit)?;
        Ok(output)
    }

    async fn prepare<T, F>(
        &self,
        id: ExperimentId,
        key: &str,
        mutate: &mut F,
    ) -> Result<(T, u64, Vec<u8>)>
    where
        F: FnMut(&mut Experiment) -> T + Send,
        T: Send,
    {
        let current = self.kv.get(key).await?.ok_or(Error::NotFound(id))?;
        let mut experiment = decode(&current.value)?;

        let output = mutate(&mut experiment);
        experiment.validate()?;

        let document = serde_json::to_vec(&experiment)?;
        Ok((output, current.version, document))
    }

    /// Append an assignment record to its experiment's audit stream.
    ///
    /// Independent of any experiment transaction.
    ///
    /// # Errors
    ///
    /// Store or serialization errors.
    pub async fn append_assignment(&self, record: &AssignmentRecord) -> Result<u64> {
        let entry = serde_json::to_vec(record)?;
        self.kv
            .append(&assignments_stream(record.experiment_id()), entry)
            .await
    }

    /// Get all assignment records of an experiment, in append order.
    ///
    /// # Errors
    ///
    /// Store or serialization errors.
    pub async fn assignments(&self, id: ExperimentId) -> Result<Vec<AssignmentRecord>> {
        self.kv
            .read_stream(&assignments_stream(id))
            .await?
            .iter()
            .map(|entry| serde_json::from_slice(entry).map_err(Error::from))
            .collect()
    }
}
