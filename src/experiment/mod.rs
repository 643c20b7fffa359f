//! Experiment Schema
//!
//! Data structures for round-robin experiments and their audit trail.
//!
//! ## Schema Overview
//!
//! ```text
//! Experiment (1) ──< AssignmentRecord (N) [append-only]
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use cohort::experiment::{AssignmentRecord, Experiment, GroupCount};
//!
//! // Three-way split
//! let mut experiment = Experiment::new("Checkout button", GroupCount::new(3)?);
//!
//! // Hand out the next group and record it
//! let group = experiment.advance();
//! let record = AssignmentRecord::builder(experiment.id(), group)
//!     .remote_addr("203.0.113.9")
//!     .build();
//!
//! assert_eq!(record.return_value(), 0);
//! assert_eq!(experiment.counter(), 1);
//! # Ok::<(), cohort::Error>(())
//! ```

mod assignment_record;
mod experiment_record;
mod store;

pub use assignment_record::{AssignmentRecord, AssignmentRecordBuilder};
pub use experiment_record::{
    Experiment, ExperimentBuilder, ExperimentId, GroupCount, GroupIndex, Owner,
};
pub use store::ExperimentStore;
