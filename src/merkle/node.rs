// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

use crate::merkle::{MerkleError, TrieHash, TRIE_HASH_LEN};
use bitflags::bitflags;
use enum_as_inner::EnumAsInner;
use std::{
    fmt::{Debug, Error as FmtError, Formatter},
    sync::{Arc, OnceLock},
};

mod branch;
mod extension;
mod leaf;
mod path;

pub use branch::BranchNode;
pub use extension::ExtNode;
pub use leaf::LeafNode;
pub use path::Path;

pub(crate) use path::common_prefix_len;

/// Node type tags carried in the low nibble of the trailing flag byte.
pub(crate) const LEAF_TYPE: u8 = 0x00;
pub(crate) const EXT_TYPE: u8 = 0x01;
pub(crate) const BRANCH_TYPE: u8 = 0x02;

bitflags! {
    // the low nibble of the flag byte is the type tag, not a bitfield;
    // only the high nibble carries flags
    struct Flags: u8 {
        const ODD_PAD = 0x10;
    }
}

/// The four kinds of trie node.
///
/// `Hash` stands in for a node that lives elsewhere (in the backing store
/// or in a version's journal) and is resolved on demand.
#[derive(PartialEq, Eq, Clone, Debug, EnumAsInner)]
pub enum NodeType {
    Branch(Box<BranchNode>),
    Leaf(LeafNode),
    Extension(ExtNode),
    Hash(TrieHash),
}

impl NodeType {
    fn encode(&self) -> Vec<u8> {
        match self {
            NodeType::Branch(n) => n.encode(),
            NodeType::Leaf(n) => n.encode(),
            NodeType::Extension(n) => n.encode(),
            NodeType::Hash(hash) => hash.to_vec(),
        }
    }
}

/// A trie node plus its write-once `encoded`/`hash` memoization slots.
///
/// Nodes are immutable: the only interior writes are the single
/// initialization of each memo slot, so sharing one node between many trie
/// versions is safe.
pub struct Node {
    inner: NodeType,
    encoded: OnceLock<Vec<u8>>,
    hash: OnceLock<TrieHash>,
}

impl Debug for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        write!(f, "{:?}", self.inner)
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        // memo slots are derived data and never part of node identity
        self.inner == other.inner
    }
}

impl Eq for Node {}

impl Node {
    pub(crate) const fn new(inner: NodeType) -> Self {
        Node {
            inner,
            encoded: OnceLock::new(),
            hash: OnceLock::new(),
        }
    }

    pub fn leaf<P: Into<Path>, V: Into<Vec<u8>>>(partial_path: P, value: V) -> Self {
        Self::new(NodeType::Leaf(LeafNode::new(partial_path, value)))
    }

    pub fn extension<P: Into<Path>>(partial_path: P, child: Arc<Node>) -> Self {
        Self::new(NodeType::Extension(ExtNode::new(partial_path, child)))
    }

    pub fn branch(branch: BranchNode) -> Self {
        Self::new(NodeType::Branch(Box::new(branch)))
    }

    pub fn from_hash(hash: TrieHash) -> Self {
        Self::new(NodeType::Hash(hash))
    }

    pub const fn inner(&self) -> &NodeType {
        &self.inner
    }

    /// The canonical encoding: the bincode body followed by the flag byte.
    /// Computed once and memoized.
    pub fn encoded(&self) -> &[u8] {
        self.encoded.get_or_init(|| self.inner.encode())
    }

    /// The Keccak-256 digest of [Node::encoded], memoized. A hash reference
    /// is its own digest.
    pub fn hash(&self) -> TrieHash {
        *self.hash.get_or_init(|| match &self.inner {
            NodeType::Hash(hash) => *hash,
            _ => TrieHash::of(self.encoded()),
        })
    }

    /// The form a parent embeds as a child reference: the encoding itself
    /// when strictly shorter than the digest width, the digest otherwise.
    pub fn capped(&self) -> Vec<u8> {
        match &self.inner {
            NodeType::Hash(hash) => hash.to_vec(),
            _ => {
                let encoded = self.encoded();
                if encoded.len() < TRIE_HASH_LEN {
                    encoded.to_vec()
                } else {
                    self.hash().to_vec()
                }
            }
        }
    }

    /// Seeds the encoding memo with bytes already obtained from the store,
    /// so a decoded node is never re-encoded.
    pub(crate) fn cache_encoded(&self, encoded: Vec<u8>) {
        let _ = self.encoded.set(encoded);
    }

    /// Seeds the digest memo when the node was looked up by hash.
    pub(crate) fn set_hash(&self, hash: TrieHash) {
        let _ = self.hash.set(hash);
    }

    /// Decodes a node from its canonical encoding.
    pub fn decode(buf: &[u8]) -> Result<Node, MerkleError> {
        if buf.len() < 2 {
            return Err(MerkleError::MalformedNode("encoded node is too short"));
        }
        let flag = buf[buf.len() - 1];
        let raw = &buf[..buf.len() - 1];

        match flag & 0x0f {
            LEAF_TYPE => Ok(Node::new(NodeType::Leaf(LeafNode::decode(raw, flag)?))),
            EXT_TYPE => Ok(Node::new(NodeType::Extension(ExtNode::decode(raw, flag)?))),
            BRANCH_TYPE => Ok(Node::new(NodeType::Branch(Box::new(BranchNode::decode(
                raw,
            )?)))),
            tag => Err(MerkleError::UnknownNodeType(tag)),
        }
    }
}

/// Reads one child slot of an encoded branch or extension. Empty means no
/// child, exactly the digest width means a hash reference, anything shorter
/// is a whole child node embedded inline.
fn decode_child(slot: &[u8]) -> Result<Option<Arc<Node>>, MerkleError> {
    if slot.is_empty() {
        return Ok(None);
    }
    if slot.len() == TRIE_HASH_LEN {
        let hash = TrieHash::from_slice(slot)
            .ok_or(MerkleError::MalformedNode("bad child hash length"))?;
        return Ok(Some(Arc::new(Node::from_hash(hash))));
    }
    Node::decode(slot).map(|node| Some(Arc::new(node)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use std::collections::HashMap;

    const MAX_DEPTH: usize = 3;

    struct NodeGen {
        rng: StdRng,
        // resolves hash references produced by encoding large subtrees
        by_hash: HashMap<TrieHash, Arc<Node>>,
    }

    impl NodeGen {
        fn new(seed: u64) -> Self {
            Self {
                rng: StdRng::seed_from_u64(seed),
                by_hash: HashMap::new(),
            }
        }

        fn bytes(&mut self) -> Vec<u8> {
            let len = self.rng.gen_range(1..32);
            (0..len).map(|_| self.rng.gen()).collect()
        }

        fn nibbles(&mut self) -> Vec<u8> {
            let len = self.rng.gen_range(0..12);
            (0..len).map(|_| self.rng.gen_range(0..16)).collect()
        }

        fn node(&mut self, depth: usize) -> Arc<Node> {
            let choice = if depth >= MAX_DEPTH {
                0
            } else {
                self.rng.gen_range(0..3)
            };
            let node = match choice {
                0 => Node::leaf(self.nibbles(), self.bytes()),
                1 => {
                    let mut path = self.nibbles();
                    if path.is_empty() {
                        path.push(7);
                    }
                    Node::extension(path, self.node(depth + 1))
                }
                _ => {
                    let mut children: [Option<Arc<Node>>; 16] = Default::default();
                    for _ in 0..self.rng.gen_range(1..4) {
                        let pos = self.rng.gen_range(0..16);
                        children[pos] = Some(self.node(depth + 1));
                    }
                    let mut branch = BranchNode::with_children(children);
                    branch.value = Some(self.bytes());
                    Node::branch(branch)
                }
            };
            let node = Arc::new(node);
            self.by_hash.insert(node.hash(), node.clone());
            node
        }

        /// Structural equality where a hash reference on either side stands
        /// for the node it resolves to.
        fn equivalent(&self, a: &Arc<Node>, b: &Arc<Node>) -> bool {
            match (a.inner(), b.inner()) {
                (NodeType::Hash(hash), _) => match self.by_hash.get(hash) {
                    Some(resolved) => self.equivalent(resolved, b),
                    None => false,
                },
                (_, NodeType::Hash(hash)) => match self.by_hash.get(hash) {
                    Some(resolved) => self.equivalent(a, resolved),
                    None => false,
                },
                (NodeType::Leaf(x), NodeType::Leaf(y)) => x == y,
                (NodeType::Extension(x), NodeType::Extension(y)) => {
                    x.partial_path == y.partial_path && self.equivalent(&x.child, &y.child)
                }
                (NodeType::Branch(x), NodeType::Branch(y)) => {
                    x.value == y.value
                        && x.children.iter().zip(y.children.iter()).all(|pair| {
                            match pair {
                                (None, None) => true,
                                (Some(cx), Some(cy)) => self.equivalent(cx, cy),
                                _ => false,
                            }
                        })
                }
                _ => false,
            }
        }
    }

    #[test]
    fn roundtrip_random_nodes() {
        let mut gen = NodeGen::new(42);
        for _ in 0..200 {
            let node = gen.node(0);
            let decoded = Arc::new(Node::decode(node.encoded()).unwrap());
            assert!(gen.equivalent(&node, &decoded), "{node:?} != {decoded:?}");
            assert_eq!(node.hash(), decoded.hash());
        }
    }

    #[test]
    fn flag_byte_carries_the_type_tag() {
        let mut gen = NodeGen::new(7);
        let leaf = Node::leaf(gen.nibbles(), gen.bytes());
        assert_eq!(leaf.encoded().last().unwrap() & 0x0f, LEAF_TYPE);

        let ext = Node::extension(vec![1], Arc::new(leaf));
        assert_eq!(ext.encoded().last().unwrap() & 0x0f, EXT_TYPE);

        let branch = Node::branch(BranchNode::with_value(b"v".to_vec()));
        assert_eq!(*branch.encoded().last().unwrap(), BRANCH_TYPE);
    }

    #[test]
    fn capped_is_encoding_below_digest_width() {
        let small = Node::leaf(vec![1, 2], b"tiny".to_vec());
        assert!(small.encoded().len() < TRIE_HASH_LEN);
        assert_eq!(small.capped(), small.encoded());
    }

    #[test]
    fn capped_is_hash_at_digest_width_and_above() {
        // 2 key bytes + 26 value bytes + framing = exactly 32 encoded bytes
        let boundary = Node::leaf(vec![1, 2, 3, 4], vec![0xab; 26]);
        assert_eq!(boundary.encoded().len(), TRIE_HASH_LEN);
        assert_eq!(boundary.capped(), boundary.hash().to_vec());

        let large = Node::leaf(vec![1, 2, 3, 4], vec![0xcd; 64]);
        assert!(large.encoded().len() > TRIE_HASH_LEN);
        assert_eq!(large.capped(), large.hash().to_vec());
    }

    #[test]
    fn hash_reference_is_its_own_digest() {
        let hash = TrieHash::of(b"somewhere else");
        let node = Node::from_hash(hash);
        assert_eq!(node.hash(), hash);
        assert_eq!(node.capped(), hash.to_vec());
    }

    #[test]
    fn large_children_decode_as_hash_references() {
        let child = Arc::new(Node::leaf(vec![1, 2], vec![0xee; 64]));
        let parent = Node::branch(BranchNode::with_child(4, child.clone(), None));

        let decoded = Node::decode(parent.encoded()).unwrap();
        let branch = decoded.inner().as_branch().unwrap();
        let slot = branch.children()[4].as_ref().unwrap();
        assert_eq!(slot.inner(), &NodeType::Hash(child.hash()));
    }

    #[test]
    fn small_children_decode_inline() {
        let child = Arc::new(Node::leaf(vec![1, 2], b"small".to_vec()));
        let parent = Node::branch(BranchNode::with_child(4, child.clone(), None));

        let decoded = Node::decode(parent.encoded()).unwrap();
        let branch = decoded.inner().as_branch().unwrap();
        let slot = branch.children()[4].as_ref().unwrap();
        assert_eq!(slot.inner(), child.inner());
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(
            Node::decode(&[]),
            Err(MerkleError::MalformedNode(_))
        ));
        assert!(matches!(
            Node::decode(&[0x00]),
            Err(MerkleError::MalformedNode(_))
        ));
        assert!(matches!(
            Node::decode(&[0x00, 0x0f]),
            Err(MerkleError::UnknownNodeType(0x0f))
        ));
    }

    #[test]
    fn cache_encoded_skips_reencoding() {
        let node = Node::leaf(vec![1], b"v".to_vec());
        let bytes = node.encoded().to_vec();

        let decoded = Node::decode(&bytes).unwrap();
        decoded.cache_encoded(bytes.clone());
        assert_eq!(decoded.encoded(), &*bytes);
        assert_eq!(decoded.hash(), node.hash());
    }
}
