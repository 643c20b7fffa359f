//! Key-Value Store Module
//!
//! The durable store behind experiments and their audit trail. A backend has
//! to provide:
//! - Versioned reads and unconditional writes
//! - Compare-and-swap on a single key (the transaction primitive)
//! - Independent append-only streams
//!
//! Any backend with single-record transactions can implement [`KvStore`].
//!
//! # Example
//!
//! ```rust,no_run
//! use cohort::kv::{KvStore, MemoryKvStore};
//!
//! # async fn example() -> cohort::Result<()> {
//! let store = MemoryKvStore::new();
//!
//! let v1 = store.compare_and_swap("key", None, b"a".to_vec()).await?;
//! let v2 = store.compare_and_swap("key", Some(v1), b"b".to_vec()).await?;
//! assert!(v2 > v1);
//!
//! // Stale version loses
//! assert!(store.compare_and_swap("key", Some(v1), b"c".to_vec()).await.is_err());
//!
//! store.append("log", b"entry".to_vec()).await?;
//! assert_eq!(store.read_stream("log").await?.len(), 1);
//! # Ok(())
//! # }
//! ```

mod memory;

pub use memory::MemoryKvStore;

use crate::Result;
use std::future::Future;

/// A stored value together with its version.
///
/// Versions start at 1 and grow by one on every successful write to the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned {
    /// Version of this value
    pub version: u64,
    /// Raw value bytes
    pub value: Vec<u8>,
}

/// Key-value store trait backing the experiment store.
pub trait KvStore: Send + Sync {
    /// Get a value and its version by key.
    ///
    /// Returns `None` if the key doesn't exist.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Versioned>>> + Send;

    /// Set a value for a key, returning the new version.
    ///
    /// Overwrites any existing value.
    fn put(&self, key: &str, value: Vec<u8>) -> impl Future<Output = Result<u64>> + Send;

    /// Write `value` only if the key is still at `expected`.
    ///
    /// `expected = None` requires the key to be absent. Returns the new
    /// version on success.
    ///
    /// # Errors
    ///
    /// `Error::TransactionConflict` if the current version differs.
    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<u64>,
        value: Vec<u8>,
    ) -> impl Future<Output = Result<u64>> + Send;

    /// Check if a key exists.
    fn exists(&self, key: &str) -> impl Future<Output = Result<bool>> + Send {
        async move { Ok(self.get(key).await?.is_some()) }
    }

    /// Append a value to a stream, returning its 0-based sequence number.
    fn append(&self, stream: &str, value: Vec<u8>) -> impl Future<Output = Result<u64>> + Send;

    /// Read every value of a stream in append order.
    ///
    /// A stream that was never appended to reads as empty.
    fn read_stream(&self, stream: &str) -> impl Future<Output = Result<Vec<Vec<u8>>>> + Send;
}
