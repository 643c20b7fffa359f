//! # Cohort: Transactional Round-Robin Group Assignment
//!
//! Cohort splits incoming requests across the groups of an experiment in a
//! strict repeating cycle `0, 1, ..., N-1, 0, ...`. Concurrent callers never
//! receive a duplicated or skipped index: every increment is a
//! compare-and-swap transaction on the experiment's record, retried on
//! conflict. Each assignment is then appended to an audit trail together
//! with the caller's address and user agent.
//!
//! ## Layers
//!
//! - [`kv`]: versioned key-value store with compare-and-swap and append-only streams
//! - [`experiment`]: records and the retrying transaction wrapper
//! - [`service`]: `create_experiment` / `assign_next_group`
//! - `http` (feature `http`): axum router exposing the service
//!
//! ## Example Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use cohort::kv::MemoryKvStore;
//! use cohort::AssignmentService;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> cohort::Result<()> {
//! let service = Arc::new(AssignmentService::new(MemoryKvStore::new()));
//! let id = service.create_experiment(None, "Onboarding flow", 3).await?;
//!
//! let mut groups = Vec::new();
//! for _ in 0..4 {
//!     groups.push(service.assign_next_group(id, "127.0.0.1", "doc-test").await?);
//! }
//! assert_eq!(groups, vec![0, 1, 2, 0]);
//! assert_eq!(service.assignments(id).await?.len(), 4);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod config;
pub mod error;
pub mod experiment;
#[cfg(feature = "http")]
pub mod http;
pub mod kv;
pub mod retry;
pub mod service;

pub use crate::config::Config;
pub use error::{Error, Result};
pub use experiment::{ExperimentId, GroupIndex};
pub use retry::RetryPolicy;
pub use service::{AssignmentService, AssignmentServiceBuilder};
