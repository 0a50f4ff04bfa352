// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

//! The backing store contract.
//!
//! A trie only needs two things from its store: point lookups by key, and
//! write batches that apply a group of puts and deletes together. Anything
//! that can do both can back a trie, whether it is an embedded key/value
//! database or a map in memory. Durability and atomicity are whatever the
//! store's batch gives you; the trie layer does not retry writes.

use parking_lot::RwLock;
use std::collections::HashMap;
use thiserror::Error;

/// Errors surfaced by a [KeyValueStore] implementation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// An I/O error from the underlying medium
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A backend-specific failure
    #[error("store backend error: {0}")]
    Backend(String),
}

/// A byte-addressed key/value store a trie can persist into.
pub trait KeyValueStore {
    /// The write-batch type for this store
    type Batch<'a>: Batch
    where
        Self: 'a;

    /// Point lookup. `Ok(None)` means the key is absent.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Open a new, empty write batch against this store.
    fn batch(&self) -> Self::Batch<'_>;
}

/// A group of writes applied together by [Batch::write].
///
/// `put` and `delete` only queue operations; nothing is visible to readers
/// until `write` consumes the batch.
pub trait Batch {
    /// Queue an upsert of `key` to `value`.
    fn put(&mut self, key: &[u8], value: &[u8]);

    /// Queue a removal of `key`.
    fn delete(&mut self, key: &[u8]);

    /// Apply every queued operation.
    fn write(self) -> Result<(), StoreError>;
}

/// A single queued batch operation.
#[derive(Debug)]
enum BatchOp {
    /// Upsert a key/value pair
    Put { key: Vec<u8>, value: Vec<u8> },

    /// Delete a key
    Delete { key: Vec<u8> },
}

/// An in-memory [KeyValueStore].
///
/// Handy for tests and for fully volatile tries, but a real implementation
/// of the store contract: batches are buffered and applied atomically under
/// the write lock.
#[derive(Debug, Default)]
pub struct MemStore {
    inner: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl MemStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl KeyValueStore for MemStore {
    type Batch<'a> = MemBatch<'a>;

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.inner.read().get(key).cloned())
    }

    fn batch(&self) -> MemBatch<'_> {
        MemBatch {
            store: self,
            ops: Vec::new(),
        }
    }
}

/// Buffered writes against a [MemStore].
#[derive(Debug)]
pub struct MemBatch<'a> {
    store: &'a MemStore,
    ops: Vec<BatchOp>,
}

impl Batch for MemBatch<'_> {
    fn put(&mut self, key: &[u8], value: &[u8]) {
        self.ops.push(BatchOp::Put {
            key: key.to_vec(),
            value: value.to_vec(),
        });
    }

    fn delete(&mut self, key: &[u8]) {
        self.ops.push(BatchOp::Delete { key: key.to_vec() });
    }

    fn write(self) -> Result<(), StoreError> {
        let mut inner = self.store.inner.write();
        for op in self.ops {
            match op {
                BatchOp::Put { key, value } => {
                    inner.insert(key, value);
                }
                BatchOp::Delete { key } => {
                    inner.remove(&key);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_is_invisible_until_written() {
        let store = MemStore::new();
        let mut batch = store.batch();
        batch.put(b"k", b"v");
        assert_eq!(store.get(b"k").unwrap(), None);
        batch.write().unwrap();
        assert_eq!(store.get(b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn batch_applies_in_order() {
        let store = MemStore::new();
        let mut batch = store.batch();
        batch.put(b"k", b"v1");
        batch.put(b"k", b"v2");
        batch.delete(b"gone");
        batch.write().unwrap();
        assert_eq!(store.get(b"k").unwrap(), Some(b"v2".to_vec()));
        assert_eq!(store.get(b"gone").unwrap(), None);
    }

    #[test]
    fn delete_removes_previous_write() {
        let store = MemStore::new();
        let mut batch = store.batch();
        batch.put(b"k", b"v");
        batch.write().unwrap();
        assert_eq!(store.len(), 1);

        let mut batch = store.batch();
        batch.delete(b"k");
        batch.write().unwrap();
        assert!(store.is_empty());
    }
}
