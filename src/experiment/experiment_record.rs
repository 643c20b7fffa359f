//! Experiment - root entity holding the round-robin counter

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Index of a group handed out by an assignment.
pub type GroupIndex = u32;

/// Opaque unique identifier of an experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExperimentId(Uuid);

impl ExperimentId {
    /// Generate a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ExperimentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExperimentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.hyphenated(), f)
    }
}

impl FromStr for ExperimentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Identity of the caller that created an experiment.
///
/// Opaque to this crate: it is stored and echoed back, never interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Owner(String);

impl Owner {
    /// Wrap an identity string.
    #[must_use]
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    /// The identity string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Number of groups in an experiment's rotation. Always at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct GroupCount(u32);

impl GroupCount {
    /// Validate a caller-supplied group count.
    ///
    /// # Errors
    ///
    /// `Error::InvalidArgument` if `count` is not in `1..=u32::MAX`.
    pub fn new(count: i64) -> Result<Self> {
        u32::try_from(count)
            .ok()
            .filter(|&n| n > 0)
            .map(Self)
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "group_count must be a positive integer, got {count}"
                ))
            })
    }

    /// The count as a plain integer.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for GroupCount {
    type Error = Error;

    fn try_from(count: u32) -> Result<Self> {
        Self::new(i64::from(count))
    }
}

impl From<GroupCount> for u32 {
    fn from(count: GroupCount) -> Self {
        count.0
    }
}

impl FromStr for GroupCount {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let count = s.trim().parse::<i64>().map_err(|_| {
            Error::InvalidArgument(format!("group_count must be a positive integer, got {s:?}"))
        })?;
        Self::new(count)
    }
}

/// Experiment with a fixed number of groups handed out in round-robin order.
///
/// `counter` is the next index to hand out and always stays in
/// `[0, group_count)`. [`Experiment::advance`] is its only mutator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Experiment {
    id: ExperimentId,
    owner: Option<Owner>,
    title: String,
    group_count: GroupCount,
    counter: GroupIndex,
    created: DateTime<Utc>,
}

impl Experiment {
    /// Create a fresh experiment with `counter = 0` and a new id.
    #[must_use]
    pub fn new(title: impl Into<String>, group_count: GroupCount) -> Self {
        Self::builder(title, group_count).build()
    }

    /// Create a builder for constructing an experiment with optional fields.
    #[must_use]
    pub fn builder(title: impl Into<String>, group_count: GroupCount) -> ExperimentBuilder {
        ExperimentBuilder::new(title, group_count)
    }

    /// Get the experiment ID.
    #[must_use]
    pub const fn id(&self) -> ExperimentId {
        self.id
    }

    /// Get the creator, if one was known.
    #[must_use]
    pub const fn owner(&self) -> Option<&Owner> {
        self.owner.as_ref()
    }

    /// Get the display title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Get the number of groups.
    #[must_use]
    pub const fn group_count(&self) -> GroupCount {
        self.group_count
    }

    /// Get the next index to be handed out.
    #[must_use]
    pub const fn counter(&self) -> GroupIndex {
        self.counter
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn created(&self) -> DateTime<Utc> {
        self.created
    }

    /// Consume the current index and move the counter to the next group.
    ///
    /// Returns the consumed index.
    pub fn advance(&mut self) -> GroupIndex {
        let assigned = self.counter;
        self.counter = (self.counter + 1) % self.group_count.get();
        assigned
    }

    /// Check the counter range invariant.
    ///
    /// # Errors
    ///
    /// `Error::Corrupted` if `counter >= group_count`.
    pub fn validate(&self) -> Result<()> {
        if self.counter < self.group_count.get() {
            Ok(())
        } else {
            Err(Error::Corrupted(format!(
                "experiment {} has counter {} outside [0, {})",
                self.id,
                self.counter,
                self.group_count.get()
            )))
        }
    }
}

/// Builder for `Experiment`.
#[derive(Debug)]
pub struct ExperimentBuilder {
    id: ExperimentId,
    owner: Option<Owner>,
    title: String,
    group_count: GroupCount,
    created: DateTime<Utc>,
}

impl ExperimentBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(title: impl Into<String>, group_count: GroupCount) -> Self {
        Self {
            id: ExperimentId::new(),
            owner: None,
            title: title.into(),
            group_count,
            created: Utc::now(),
        }
    }

    /// Set the creator.
    #[must_use]
    pub fn owner(mut self, owner: Option<Owner>) -> Self {
        self.owner = owner;
        self
    }

    /// Set a specific id (useful for testing).
    #[must_use]
    pub const fn id(mut self, id: ExperimentId) -> Self {
        self.id = id;
        self
    }

    /// Set a custom creation timestamp (useful for deserialization/testing).
    #[must_use]
    pub const fn created(mut self, created: DateTime<Utc>) -> Self {
        self.created = created;
        self
    }

    /// Build the `Experiment` with `counter = 0`.
    #[must_use]
    pub fn build(self) -> Experiment {
        Experiment {
            id: self.id,
            owner: self.owner,
            title: self.title,
            group_count: self.group_count,
            counter: 0,
            created: self.created,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn groups(n: i64) -> GroupCount {
        GroupCount::new(n).unwrap()
    }

    #[test]
    fn test_experiment_new() {
        let experiment = Experiment::new("Button colour", groups(3));
        assert_eq!(experiment.title(), "Button colour");
        assert_eq!(experiment.group_count().get(), 3);
        assert_eq!(experiment.counter(), 0);
        assert!(experiment.owner().is_none());
    }

    #[test]
    fn test_advance_wraps() {
        let mut experiment = Experiment::new("t", groups(3));
        let seen: Vec<_> = (0..7).map(|_| experiment.advance()).collect();
        assert_eq!(seen, vec![0, 1, 2, 0, 1, 2, 0]);
        assert_eq!(experiment.counter(), 1);
    }

    #[test]
    fn test_advance_single_group() {
        let mut experiment = Experiment::new("t", groups(1));
        for _ in 0..5 {
            assert_eq!(experiment.advance(), 0);
            assert_eq!(experiment.counter(), 0);
        }
    }

    #[test]
    fn test_advance_max_group_count_no_overflow() {
        let mut experiment = Experiment::new("t", groups(i64::from(u32::MAX)));
        experiment.counter = u32::MAX - 1;
        assert_eq!(experiment.advance(), u32::MAX - 1);
        assert_eq!(experiment.counter(), 0);
    }

    #[test]
    fn test_group_count_rejects_non_positive() {
        assert!(matches!(GroupCount::new(0), Err(Error::InvalidArgument(_))));
        assert!(matches!(GroupCount::new(-4), Err(Error::InvalidArgument(_))));
        assert!(matches!(
            GroupCount::new(i64::from(u32::MAX) + 1),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_group_count_from_str() {
        assert_eq!(" 4 ".parse::<GroupCount>().unwrap().get(), 4);
        assert!(matches!("abc".parse::<GroupCount>(), Err(Error::InvalidArgument(_))));
        assert!(matches!("".parse::<GroupCount>(), Err(Error::InvalidArgument(_))));
        assert!(matches!("-1".parse::<GroupCount>(), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_validate_detects_out_of_range_counter() {
        let mut experiment = Experiment::new("t", groups(2));
        assert!(experiment.validate().is_ok());
        experiment.counter = 2;
        assert!(matches!(experiment.validate(), Err(Error::Corrupted(_))));
    }

    #[test]
    fn test_experiment_id_roundtrip_display() {
        let id = ExperimentId::new();
        let parsed: ExperimentId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<ExperimentId>().is_err());
    }

    #[test]
    fn test_zero_group_count_document_rejected() {
        let experiment = Experiment::builder("t", groups(2))
            .owner(Some(Owner::new("alice@example.com")))
            .build();
        let mut doc = serde_json::to_value(&experiment).unwrap();
        doc["group_count"] = serde_json::json!(0);
        assert!(serde_json::from_value::<Experiment>(doc).is_err());
    }
}
