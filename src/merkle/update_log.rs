// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

use super::node::Node;
use super::{TrieHash, EMPTY_TRIE_HASH, TRIE_HASH_LEN};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// The journal a trie version carries: everything it owes the backing
/// store, keyed by node digest.
///
/// - `cached` holds bytes fetched from the store while traversing this
///   version. It is a pure read cache, which is why it sits behind a
///   `RefCell`: lookups through `&self` may populate it.
/// - `inserted` holds node bytes that must be written on persist.
/// - `deleted` holds digests that must be removed on persist.
///
/// A hash is never in `inserted` and `deleted` at once: recording one evicts
/// the other, so an insert after a delete of the same node cleanly restores
/// the pre-delete state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateLog {
    cached: RefCell<HashMap<TrieHash, Vec<u8>>>,
    inserted: HashMap<TrieHash, Vec<u8>>,
    deleted: HashSet<TrieHash>,
}

impl UpdateLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember bytes read from the store.
    pub(super) fn cache(&self, hash: TrieHash, encoded: Vec<u8>) {
        self.cached.borrow_mut().insert(hash, encoded);
    }

    /// Record bytes owed to the store, undoing any pending delete of the
    /// same node.
    pub(super) fn insert(&mut self, hash: TrieHash, encoded: Vec<u8>) {
        self.deleted.remove(&hash);
        self.cached.borrow_mut().remove(&hash);
        self.inserted.insert(hash, encoded);
    }

    /// Record a removal owed to the store, undoing any pending insert of
    /// the same node.
    pub(super) fn delete(&mut self, hash: TrieHash) {
        self.inserted.remove(&hash);
        self.cached.borrow_mut().remove(&hash);
        self.deleted.insert(hash);
    }

    pub(super) fn is_deleted(&self, hash: &TrieHash) -> bool {
        self.deleted.contains(hash)
    }

    pub(super) fn inserted_bytes(&self, hash: &TrieHash) -> Option<Vec<u8>> {
        self.inserted.get(hash).cloned()
    }

    pub(super) fn cached_bytes(&self, hash: &TrieHash) -> Option<Vec<u8>> {
        self.cached.borrow().get(hash).cloned()
    }

    /// Pending writes, in no particular order.
    pub fn inserted(&self) -> impl Iterator<Item = (&TrieHash, &Vec<u8>)> {
        self.inserted.iter()
    }

    /// Pending removals, in no particular order.
    pub fn deleted(&self) -> impl Iterator<Item = &TrieHash> {
        self.deleted.iter()
    }

    /// A successor log for the version produced by one insert. The receiver
    /// is left untouched.
    pub(super) fn merge_from_insert(&self, old_root: TrieHash, result: &InsertResult) -> UpdateLog {
        let mut log = self.clone();
        log.merge(
            old_root,
            Some(&result.new_node),
            &result.deleted,
            &result.inserted,
        );
        log
    }

    /// A successor log for the version produced by one delete. The receiver
    /// is left untouched.
    pub(super) fn merge_from_delete(&self, old_root: TrieHash, result: &DeleteResult) -> UpdateLog {
        let mut log = self.clone();
        log.merge(
            old_root,
            result.new_node.as_ref(),
            &result.deleted,
            &result.inserted,
        );
        log
    }

    /// The journal only tracks nodes that occupy their own slot in the
    /// store. A node whose capped form is its hash has such a slot; a node
    /// embedded inline inside its parent does not. The root is the one
    /// exception, always addressed by hash no matter how small it encodes.
    fn merge(
        &mut self,
        old_root: TrieHash,
        new_root: Option<&Arc<Node>>,
        deleted: &[Arc<Node>],
        inserted: &[Arc<Node>],
    ) {
        for node in deleted {
            if node.capped().len() == TRIE_HASH_LEN || node.hash() == old_root {
                self.delete(node.hash());
            }
        }

        let new_root_capped =
            new_root.map_or_else(|| EMPTY_TRIE_HASH.to_vec(), |node| node.capped());
        for node in inserted {
            let capped = node.capped();
            if capped.len() == TRIE_HASH_LEN || capped == new_root_capped {
                self.insert(node.hash(), node.encoded().to_vec());
            }
        }
    }
}

/// What one recursive insert hands back up the call chain: the replacement
/// subtree root plus every node the operation created or superseded.
#[derive(Debug)]
pub(super) struct InsertResult {
    pub(super) new_node: Arc<Node>,
    pub(super) inserted: Vec<Arc<Node>>,
    pub(super) deleted: Vec<Arc<Node>>,
}

impl InsertResult {
    pub(super) fn new(new_node: Arc<Node>) -> Self {
        Self {
            new_node,
            inserted: Vec::new(),
            deleted: Vec::new(),
        }
    }
}

/// The delete-side counterpart of [InsertResult]. `new_node` is `None` when
/// the whole subtree vanished; `changed` is false when the key was not
/// present and nothing moved.
#[derive(Debug)]
pub(super) struct DeleteResult {
    pub(super) new_node: Option<Arc<Node>>,
    pub(super) inserted: Vec<Arc<Node>>,
    pub(super) deleted: Vec<Arc<Node>>,
    pub(super) changed: bool,
}

impl DeleteResult {
    pub(super) fn unchanged() -> Self {
        Self {
            new_node: None,
            inserted: Vec::new(),
            deleted: Vec::new(),
            changed: false,
        }
    }

    pub(super) fn changed(new_node: Option<Arc<Node>>) -> Self {
        Self {
            new_node,
            inserted: Vec::new(),
            deleted: Vec::new(),
            changed: true,
        }
    }
}
