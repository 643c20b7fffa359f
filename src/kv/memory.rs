//! In-memory KV store implementation using `DashMap`.
//!
//! This is the default backend - data is lost on process restart.

use super::{KvStore, Versioned};
use crate::{Error, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rustc_hash::FxBuildHasher;

/// In-memory key-value store using a sharded concurrent hashmap.
///
/// Compare-and-swap holds the shard's entry lock for the whole
/// check-then-write, so it is atomic per key and keys in other shards never
/// wait on it.
///
/// # Example
///
/// ```rust
/// use cohort::kv::{KvStore, MemoryKvStore};
///
/// # async fn example() -> cohort::Result<()> {
/// let store = MemoryKvStore::new();
/// store.put("hello", b"world".to_vec()).await?;
/// assert_eq!(store.get("hello").await?.map(|v| v.value), Some(b"world".to_vec()));
/// # Ok(())
/// # }
/// ```
pub struct MemoryKvStore {
    records: DashMap<String, Versioned, FxBuildHasher>,
    streams: DashMap<String, Vec<Vec<u8>>, FxBuildHasher>,
}

impl MemoryKvStore {
    /// Create a new in-memory KV store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: DashMap::with_hasher(FxBuildHasher),
            streams: DashMap::with_hasher(FxBuildHasher),
        }
    }

    /// Get the number of keys held: records plus non-empty streams.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len() + self.streams.len()
    }

    /// Check if the store holds no records and no streams.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.streams.is_empty()
    }

    /// Number of entries appended to `stream`.
    #[must_use]
    pub fn stream_len(&self, stream: &str) -> usize {
        self.streams.get(stream).map_or(0, |s| s.len())
    }

    /// Clear all records and streams.
    pub fn clear(&self) {
        self.records.clear();
        self.streams.clear();
    }
}

impl Default for MemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Versioned>> {
        Ok(self.records.get(key).map(|v| v.value().clone()))
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<u64> {
        let mut entry = self.records.entry(key.to_string()).or_insert(Versioned {
            version: 0,
            value: Vec::new(),
        });
        entry.version += 1;
        entry.value = value;
        Ok(entry.version)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<u64>,
        value: Vec<u8>,
    ) -> Result<u64> {
        match (self.records.entry(key.to_string()), expected) {
            (Entry::Occupied(mut current), Some(version)) if current.get().version == version => {
                let next = version + 1;
                current.insert(Versioned {
                    version: next,
                    value,
                });
                Ok(next)
            }
            (Entry::Vacant(slot), None) => {
                slot.insert(Versioned { version: 1, value });
                Ok(1)
            }
            _ => Err(Error::TransactionConflict {
                key: key.to_string(),
            }),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.records.contains_key(key))
    }

    async fn append(&self, stream: &str, value: Vec<u8>) -> Result<u64> {
        let mut entries = self.streams.entry(stream.to_string()).or_default();
        entries.push(value);
        Ok(entries.len() as u64 - 1)
    }

    async fn read_stream(&self, stream: &str) -> Result<Vec<Vec<u8>>> {
        Ok(self
            .streams
            .get(stream)
            .map(|s| s.value().clone())
            .unwrap_or_default())
    }
}
