// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

//! The immutable trie handle and its functional operations.
//!
//! A [Trie] is a value: `(root_hash, journal, store)`. Reads walk from the
//! root, resolving hash references through the journal first and the store
//! second. Writes never touch the receiver: `insert` and `delete` build
//! replacement nodes along one path, share every untouched subtree with the
//! old version, and hand back a new handle whose journal records exactly
//! what the new version owes the store.

use crate::logger::{debug, trace};
use crate::storage::{Batch, KeyValueStore, StoreError};
use std::fmt::{self, Debug};
use std::sync::Arc;
use thiserror::Error;

mod node;
mod trie_hash;
mod update_log;

pub use node::{BranchNode, ExtNode, LeafNode, Node, NodeType, Path};
pub use trie_hash::{TrieHash, EMPTY_TRIE_HASH, TRIE_HASH_LEN};
pub use update_log::UpdateLog;

use node::common_prefix_len;
use update_log::{DeleteResult, InsertResult};

/// A value stored in the trie.
pub type Value = Vec<u8>;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MerkleError {
    /// A live hash cannot be resolved: it is marked deleted in this
    /// version's journal, or the store has no node for it. The trie
    /// promised data it cannot deliver; there is no recovery.
    #[error("inconsistent trie: node {0:?} cannot be resolved")]
    InconsistentTrie(TrieHash),

    /// An encoded node failed structural validation
    #[error("malformed node: {0}")]
    MalformedNode(&'static str),

    /// The flag byte carries a variant tag this version does not know
    #[error("unknown node type {0:#04x}")]
    UnknownNodeType(u8),

    /// The serialization substrate rejected a node body
    #[error("node serde error: {0}")]
    BinarySerde(#[from] bincode::Error),

    /// A structural invariant did not hold while normalizing after a delete
    #[error("invalid trie shape: {0}")]
    InvalidShape(&'static str),

    /// The backing store failed
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// An immutable Merkle Patricia Trie version over a shared backing store.
///
/// Every mutation returns a new `Trie`; the receiver keeps describing the
/// version it always did. Distinct handles may be used from distinct
/// threads, but a single handle is not `Sync`: lookups write through the
/// journal's read cache.
pub struct Trie<S> {
    store: Arc<S>,
    root_hash: TrieHash,
    log: UpdateLog,
}

impl<S> Clone for Trie<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            root_hash: self.root_hash,
            log: self.log.clone(),
        }
    }
}

impl<S> Debug for Trie<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trie")
            .field("root_hash", &self.root_hash)
            .finish_non_exhaustive()
    }
}

impl<S: KeyValueStore> Trie<S> {
    /// A handle for the version identified by `root_hash`, with an empty
    /// journal. Use [EMPTY_TRIE_HASH] for a trie with no keys.
    pub fn new(root_hash: TrieHash, store: Arc<S>) -> Self {
        Self {
            store,
            root_hash,
            log: UpdateLog::new(),
        }
    }

    /// The root digest identifying this version.
    pub const fn root(&self) -> TrieHash {
        self.root_hash
    }

    /// The value stored under `key`, if any.
    ///
    /// Lookups are best-effort: a trie that cannot resolve one of its own
    /// nodes reads as if the key were absent.
    pub fn get<K: AsRef<[u8]>>(&self, key: K) -> Option<Value> {
        if self.root_hash == EMPTY_TRIE_HASH {
            return None;
        }
        let root = self.resolve_hash(self.root_hash).ok()?;
        let search_key = Path::from_key(key.as_ref());
        self.get_at(&root, &search_key)
    }

    fn get_at(&self, node: &Arc<Node>, search_key: &[u8]) -> Option<Value> {
        match node.inner() {
            NodeType::Leaf(leaf) => {
                if *leaf.partial_path == *search_key {
                    Some(leaf.value.clone())
                } else {
                    None
                }
            }
            NodeType::Extension(ext) => {
                let path = &*ext.partial_path;
                if search_key.len() < path.len() || &search_key[..path.len()] != path {
                    return None;
                }
                self.get_at(&ext.child, &search_key[path.len()..])
            }
            NodeType::Branch(branch) => {
                if search_key.is_empty() {
                    return branch.value.clone();
                }
                let child = branch.children[search_key[0] as usize].as_ref()?;
                self.get_at(child, &search_key[1..])
            }
            NodeType::Hash(hash) => {
                let resolved = self.resolve_hash(*hash).ok()?;
                self.get_at(&resolved, search_key)
            }
        }
    }

    /// A new version with `key` mapped to `value`. The receiver is
    /// unchanged.
    pub fn insert<K: AsRef<[u8]>, V: AsRef<[u8]>>(
        &self,
        key: K,
        value: V,
    ) -> Result<Self, MerkleError> {
        let search_key = Path::from_key(key.as_ref());
        let value = value.as_ref().to_vec();

        let result = if self.root_hash == EMPTY_TRIE_HASH {
            let leaf = Arc::new(Node::leaf(search_key, value));
            let mut result = InsertResult::new(leaf.clone());
            result.inserted.push(leaf);
            result
        } else {
            let root = self.resolve_hash(self.root_hash)?;
            self.insert_at(&root, &search_key, value)?
        };

        let log = self.log.merge_from_insert(self.root_hash, &result);
        Ok(Self {
            store: self.store.clone(),
            root_hash: result.new_node.hash(),
            log,
        })
    }

    fn insert_at(
        &self,
        node: &Arc<Node>,
        search_key: &[u8],
        value: Value,
    ) -> Result<InsertResult, MerkleError> {
        match node.inner() {
            NodeType::Leaf(leaf) => self.insert_into_leaf(node, leaf, search_key, value),
            NodeType::Extension(ext) => self.insert_into_ext(node, ext, search_key, value),
            NodeType::Branch(branch) => self.insert_into_branch(node, branch, search_key, value),
            NodeType::Hash(hash) => {
                let resolved = self.resolve_hash(*hash)?;
                self.insert_at(&resolved, search_key, value)
            }
        }
    }

    fn insert_into_leaf(
        &self,
        node: &Arc<Node>,
        leaf: &LeafNode,
        search_key: &[u8],
        value: Value,
    ) -> Result<InsertResult, MerkleError> {
        let ml = common_prefix_len(search_key, &leaf.partial_path);

        // exact key match: replace the leaf outright
        if ml == search_key.len() && ml == leaf.partial_path.len() {
            let new_leaf = Arc::new(Node::leaf(Path(search_key.to_vec()), value));
            let mut result = InsertResult::new(new_leaf.clone());
            result.deleted.push(node.clone());
            result.inserted.push(new_leaf);
            return Ok(result);
        }

        // no common prefix: fork through a temporary branch
        if ml == 0 {
            let (temp_branch, moved_leaf) = if leaf.partial_path.is_empty() {
                (BranchNode::with_value(leaf.value.clone()), None)
            } else {
                let moved = Arc::new(Node::leaf(
                    Path(leaf.partial_path[1..].to_vec()),
                    leaf.value.clone(),
                ));
                (
                    BranchNode::with_child(leaf.partial_path[0] as usize, moved.clone(), None),
                    Some(moved),
                )
            };
            let temp = Arc::new(Node::branch(temp_branch));
            let mut result = self.insert_at(&temp, search_key, value)?;
            result.deleted.push(node.clone());
            if let Some(moved) = moved_leaf {
                result.inserted.push(moved);
            }
            return Ok(result);
        }

        // shared prefix: split below, then wrap the result in an extension
        let inner = if ml == leaf.partial_path.len() {
            Arc::new(Node::branch(BranchNode::with_value(leaf.value.clone())))
        } else {
            Arc::new(Node::leaf(
                Path(leaf.partial_path[ml..].to_vec()),
                leaf.value.clone(),
            ))
        };
        let mut result = self.insert_at(&inner, &search_key[ml..], value)?;
        let ext = Arc::new(Node::extension(
            Path(leaf.partial_path[..ml].to_vec()),
            result.new_node.clone(),
        ));
        result.new_node = ext.clone();
        result.deleted.push(node.clone());
        result.inserted.push(ext);
        Ok(result)
    }

    fn insert_into_ext(
        &self,
        node: &Arc<Node>,
        ext: &ExtNode,
        search_key: &[u8],
        value: Value,
    ) -> Result<InsertResult, MerkleError> {
        let ml = common_prefix_len(search_key, &ext.partial_path);

        // no common prefix: the extension folds into a branch
        if ml == 0 {
            let (temp_branch, shortened) = if ext.partial_path.len() == 1 {
                (
                    BranchNode::with_child(ext.partial_path[0] as usize, ext.child.clone(), None),
                    None,
                )
            } else {
                let shortened = Arc::new(Node::extension(
                    Path(ext.partial_path[1..].to_vec()),
                    ext.child.clone(),
                ));
                (
                    BranchNode::with_child(ext.partial_path[0] as usize, shortened.clone(), None),
                    Some(shortened),
                )
            };
            let temp = Arc::new(Node::branch(temp_branch));
            let mut result = self.insert_at(&temp, search_key, value)?;
            if let Some(shortened) = shortened {
                result.inserted.push(shortened);
            }
            result.deleted.push(node.clone());
            return Ok(result);
        }

        // full prefix match: descend into the child and rewrap
        if ml == ext.partial_path.len() {
            let mut result = self.insert_at(&ext.child, &search_key[ml..], value)?;
            let new_ext = Arc::new(Node::extension(
                Path(ext.partial_path.to_vec()),
                result.new_node.clone(),
            ));
            result.new_node = new_ext.clone();
            result.inserted.push(new_ext);
            result.deleted.push(node.clone());
            return Ok(result);
        }

        // partial match: split the extension at the fork
        let tail = Arc::new(Node::extension(
            Path(ext.partial_path[ml..].to_vec()),
            ext.child.clone(),
        ));
        let mut result = self.insert_at(&tail, &search_key[ml..], value)?;
        let head = Arc::new(Node::extension(
            Path(ext.partial_path[..ml].to_vec()),
            result.new_node.clone(),
        ));
        result.new_node = head.clone();
        result.inserted.push(head);
        result.deleted.push(node.clone());
        Ok(result)
    }

    fn insert_into_branch(
        &self,
        node: &Arc<Node>,
        branch: &BranchNode,
        search_key: &[u8],
        value: Value,
    ) -> Result<InsertResult, MerkleError> {
        // an exhausted search key stores the value at the branch itself
        if search_key.is_empty() {
            let new_branch = Arc::new(Node::branch(branch.update_value(value)));
            let mut result = InsertResult::new(new_branch.clone());
            result.inserted.push(new_branch);
            result.deleted.push(node.clone());
            return Ok(result);
        }

        let pos = search_key[0] as usize;
        if let Some(child) = &branch.children[pos] {
            let mut result = self.insert_at(child, &search_key[1..], value)?;
            let new_branch =
                Arc::new(Node::branch(branch.update_child(pos, Some(result.new_node.clone()))));
            result.new_node = new_branch.clone();
            result.inserted.push(new_branch);
            result.deleted.push(node.clone());
            return Ok(result);
        }

        let new_leaf = Arc::new(Node::leaf(Path(search_key[1..].to_vec()), value));
        let new_branch = Arc::new(Node::branch(branch.update_child(pos, Some(new_leaf.clone()))));
        let mut result = InsertResult::new(new_branch.clone());
        result.inserted.push(new_branch);
        result.inserted.push(new_leaf);
        result.deleted.push(node.clone());
        Ok(result)
    }

    /// A new version without `key`. The receiver is unchanged; deleting a
    /// key that is not present returns an equivalent handle.
    pub fn delete<K: AsRef<[u8]>>(&self, key: K) -> Result<Self, MerkleError> {
        if self.root_hash == EMPTY_TRIE_HASH {
            return Ok(self.clone());
        }
        let search_key = Path::from_key(key.as_ref());
        let root = self.resolve_hash(self.root_hash)?;
        let result = self.delete_at(&root, &search_key)?;
        if !result.changed {
            return Ok(self.clone());
        }

        let root_hash = result
            .new_node
            .as_ref()
            .map_or(EMPTY_TRIE_HASH, |node| node.hash());
        let log = self.log.merge_from_delete(self.root_hash, &result);
        Ok(Self {
            store: self.store.clone(),
            root_hash,
            log,
        })
    }

    fn delete_at(
        &self,
        node: &Arc<Node>,
        search_key: &[u8],
    ) -> Result<DeleteResult, MerkleError> {
        match node.inner() {
            NodeType::Leaf(leaf) => {
                if *leaf.partial_path == *search_key {
                    let mut result = DeleteResult::changed(None);
                    result.deleted.push(node.clone());
                    Ok(result)
                } else {
                    Ok(DeleteResult::unchanged())
                }
            }
            NodeType::Extension(ext) => self.delete_from_ext(node, ext, search_key),
            NodeType::Branch(branch) => self.delete_from_branch(node, branch, search_key),
            NodeType::Hash(hash) => {
                let resolved = self.resolve_hash(*hash)?;
                self.delete_at(&resolved, search_key)
            }
        }
    }

    fn delete_from_ext(
        &self,
        node: &Arc<Node>,
        ext: &ExtNode,
        search_key: &[u8],
    ) -> Result<DeleteResult, MerkleError> {
        let ml = common_prefix_len(&ext.partial_path, search_key);
        if ml != ext.partial_path.len() {
            return Ok(DeleteResult::unchanged());
        }

        let mut result = self.delete_at(&ext.child, &search_key[ml..])?;
        if !result.changed {
            return Ok(result);
        }

        let new_child = result
            .new_node
            .take()
            .ok_or(MerkleError::InvalidShape("extension lost its child"))?;
        let rebuilt = Arc::new(Node::extension(Path(ext.partial_path.to_vec()), new_child));
        let fixed = self.try_fix(rebuilt, &result.inserted)?;
        result.new_node = Some(fixed.clone());
        result.inserted.push(fixed);
        result.deleted.push(node.clone());
        Ok(result)
    }

    fn delete_from_branch(
        &self,
        node: &Arc<Node>,
        branch: &BranchNode,
        search_key: &[u8],
    ) -> Result<DeleteResult, MerkleError> {
        // an exhausted search key deletes the value at the branch itself
        if search_key.is_empty() {
            if !branch.has_value() {
                return Ok(DeleteResult::unchanged());
            }
            let stripped = Arc::new(Node::branch(BranchNode::with_children(
                branch.children.clone(),
            )));
            let fixed = self.try_fix(stripped, &[])?;
            let mut result = DeleteResult::changed(Some(fixed.clone()));
            result.inserted.push(fixed);
            result.deleted.push(node.clone());
            return Ok(result);
        }

        let pos = search_key[0] as usize;
        let Some(child) = &branch.children[pos] else {
            return Ok(DeleteResult::unchanged());
        };

        let mut result = self.delete_at(child, &search_key[1..])?;
        if !result.changed {
            return Ok(result);
        }

        let rebuilt = Arc::new(Node::branch(
            branch.update_child(pos, result.new_node.clone()),
        ));
        let fixed = self.try_fix(rebuilt, &result.inserted)?;
        result.new_node = Some(fixed.clone());
        result.inserted.push(fixed);
        result.deleted.push(node.clone());
        Ok(result)
    }

    /// Restores the shape invariants a delete can break: a branch must keep
    /// at least two entries, and an extension's child must be a branch.
    ///
    /// `fresh` is the inserted set of the same delete. A replacement child
    /// embedded by capped reference may not be in the store yet, so hash
    /// references are looked up there before falling back to the store.
    fn try_fix(
        &self,
        node: Arc<Node>,
        fresh: &[Arc<Node>],
    ) -> Result<Arc<Node>, MerkleError> {
        match node.inner() {
            NodeType::Branch(_) => self.fix_branch(node, fresh),
            NodeType::Extension(_) => self.fix_ext(node, fresh),
            _ => Ok(node),
        }
    }

    fn fix_branch(
        &self,
        node: Arc<Node>,
        fresh: &[Arc<Node>],
    ) -> Result<Arc<Node>, MerkleError> {
        let Some(branch) = node.inner().as_branch() else {
            return Ok(node);
        };

        let occupied = branch.child_indices();

        if occupied.is_empty() {
            // only the value can be left; collapse to a leaf terminating here
            return match &branch.value {
                Some(value) => Ok(Arc::new(Node::leaf(Path(Vec::new()), value.clone()))),
                None => Err(MerkleError::InvalidShape(
                    "branch with no children and no value",
                )),
            };
        }

        if let [pos] = occupied.as_slice() {
            if !branch.has_value() {
                // a single child left: collapse to an extension and re-fix,
                // since the child may itself want compaction
                let child = branch.children[*pos]
                    .clone()
                    .ok_or(MerkleError::InvalidShape("occupied child slot is empty"))?;
                let ext = Arc::new(Node::extension(Path(vec![*pos as u8]), child));
                return self.try_fix(ext, fresh);
            }
        }

        Ok(node)
    }

    fn fix_ext(
        &self,
        node: Arc<Node>,
        fresh: &[Arc<Node>],
    ) -> Result<Arc<Node>, MerkleError> {
        let Some(ext) = node.inner().as_extension() else {
            return Ok(node);
        };

        let child = match ext.child.inner() {
            NodeType::Hash(hash) => match node_with_hash(fresh, *hash) {
                Some(found) => found,
                None => self.resolve_hash(*hash)?,
            },
            _ => ext.child.clone(),
        };

        let compacted = match child.inner() {
            NodeType::Extension(grandchild) => Some(Arc::new(Node::extension(
                Path([&ext.partial_path[..], &grandchild.partial_path[..]].concat()),
                grandchild.child.clone(),
            ))),
            NodeType::Leaf(grandchild) => Some(Arc::new(Node::leaf(
                Path([&ext.partial_path[..], &grandchild.partial_path[..]].concat()),
                grandchild.value.clone(),
            ))),
            _ => None,
        };

        Ok(compacted.unwrap_or(node))
    }

    /// Resolves a hash to a node: the journal's pending writes first, then
    /// its read cache, then the store. A hash this version has deleted, or
    /// one the store does not know, is an inconsistency.
    fn resolve_hash(&self, hash: TrieHash) -> Result<Arc<Node>, MerkleError> {
        if self.log.is_deleted(&hash) {
            return Err(MerkleError::InconsistentTrie(hash));
        }
        if let Some(bytes) = self.log.inserted_bytes(&hash) {
            return decode_resolved(hash, bytes);
        }
        if let Some(bytes) = self.log.cached_bytes(&hash) {
            return decode_resolved(hash, bytes);
        }

        trace!("fetching node {hash:?} from the backing store");
        let bytes = self
            .store
            .get(hash.as_ref())?
            .filter(|bytes| !bytes.is_empty())
            .ok_or(MerkleError::InconsistentTrie(hash))?;
        let node = decode_resolved(hash, bytes.clone())?;
        self.log.cache(hash, bytes);
        Ok(node)
    }

    /// Queues this version's journal into `batch`: puts for pending writes,
    /// deletes for pending removals.
    pub fn commit_to_batch<B: Batch>(&self, batch: &mut B) {
        for (hash, bytes) in self.log.inserted() {
            batch.put(hash.as_ref(), bytes);
        }
        for hash in self.log.deleted() {
            batch.delete(hash.as_ref());
        }
    }

    /// Flushes the journal to the store in one batch. The journal is kept
    /// as-is afterwards, so persisting the same version again is a no-op
    /// upsert of the same entries.
    pub fn persist(&self) -> Result<(), StoreError> {
        debug!(
            "persisting {} writes and {} removals",
            self.log.inserted().count(),
            self.log.deleted().count()
        );
        let mut batch = self.store.batch();
        self.commit_to_batch(&mut batch);
        batch.write()
    }
}

fn decode_resolved(hash: TrieHash, bytes: Vec<u8>) -> Result<Arc<Node>, MerkleError> {
    let node = Node::decode(&bytes)?;
    node.cache_encoded(bytes);
    node.set_hash(hash);
    Ok(Arc::new(node))
}

fn node_with_hash(nodes: &[Arc<Node>], hash: TrieHash) -> Option<Arc<Node>> {
    nodes.iter().find(|node| node.hash() == hash).cloned()
}
