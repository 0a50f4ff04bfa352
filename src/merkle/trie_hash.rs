// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

use sha3::{Digest, Keccak256};
use std::fmt::{self, Debug};

/// The number of bytes in a [TrieHash]
pub const TRIE_HASH_LEN: usize = 32;

/// The root hash of a trie with no keys: the Keccak-256 digest of the empty
/// byte string.
// "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
pub const EMPTY_TRIE_HASH: TrieHash = TrieHash([
    0xc5, 0xd2, 0x46, 0x01, 0x86, 0xf7, 0x23, 0x3c, 0x92, 0x7e, 0x7d, 0xb2, 0xdc, 0xc7, 0x03,
    0xc0, 0xe5, 0x00, 0xb6, 0x53, 0xca, 0x82, 0x27, 0x3b, 0x7b, 0xfa, 0xd8, 0x04, 0x5d, 0x85,
    0xa4, 0x70,
]);

/// The Keccak-256 digest of a node's canonical encoding.
///
/// A `TrieHash` is both the identity of a trie version (the root hash) and
/// the store key under which a node's encoding is persisted.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub struct TrieHash(pub [u8; TRIE_HASH_LEN]);

impl TrieHash {
    /// Digest of `bytes`.
    #[must_use]
    pub fn of(bytes: &[u8]) -> Self {
        TrieHash(Keccak256::digest(bytes).into())
    }

    /// Reads a hash from a slice of exactly [TRIE_HASH_LEN] bytes.
    #[must_use]
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(TrieHash)
    }
}

impl std::ops::Deref for TrieHash {
    type Target = [u8; TRIE_HASH_LEN];
    fn deref(&self) -> &[u8; TRIE_HASH_LEN] {
        &self.0
    }
}

impl AsRef<[u8]> for TrieHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; TRIE_HASH_LEN]> for TrieHash {
    fn from(value: [u8; TRIE_HASH_LEN]) -> Self {
        TrieHash(value)
    }
}

impl Debug for TrieHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}", hex::encode(self.0))
    }
}
