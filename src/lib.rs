// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

//! # Heartwood: an immutable, journaled Merkle Patricia Trie
//!
//! Heartwood stores a key/value mapping in a hexary Merkle Patricia Trie
//! whose root hash is a 32-byte digest summarizing the entire mapping. A
//! [merkle::Trie] handle is immutable: `insert` and `delete` return a new
//! handle rooted at a new digest while sharing every unchanged subtree with
//! the ancestor version. Many speculative versions can therefore coexist
//! cheaply over one backing store, and switching between versions is just
//! switching root hashes.
//!
//! Every version carries an update log describing what it owes the backing
//! store: node bytes to write, node digests to remove, and a cache of bytes
//! already read. The log survives from one version to the next, so a chain
//! of unpersisted versions stays fully readable; persisting a version turns
//! its log into a single write batch.
//!
//! Nodes are stored content-addressed: `key = keccak256(node bytes)`,
//! `value = node bytes`. A node whose encoding is shorter than the digest
//! width never gets its own store entry; it is embedded inline in its
//! parent, so small tries cost a handful of store writes. The root is the
//! exception: it is always addressed by hash, however small it encodes.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use heartwood::{merkle::{Trie, EMPTY_TRIE_HASH}, storage::MemStore};
//!
//! let store = Arc::new(MemStore::new());
//! let empty = Trie::new(EMPTY_TRIE_HASH, store.clone());
//!
//! let trie = empty.insert(b"dog", b"bark")?;
//! assert_eq!(trie.get(b"dog"), Some(b"bark".to_vec()));
//! assert_eq!(empty.get(b"dog"), None);
//!
//! trie.persist()?;
//! let reloaded = Trie::new(trie.root(), store);
//! assert_eq!(reloaded.get(b"dog"), Some(b"bark".to_vec()));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod logger;
pub mod merkle;
pub mod nibbles;
pub mod storage;

pub use merkle::{MerkleError, Trie, TrieHash, EMPTY_TRIE_HASH, TRIE_HASH_LEN};
pub use storage::{Batch, KeyValueStore, MemStore, StoreError};
