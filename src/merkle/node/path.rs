// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

use super::Flags;
use crate::nibbles::{nibbles_to_bytes_iter, Nibbles};
use std::{
    fmt::{self, Debug},
    iter::once,
};

/// Path keeps a list of nibbles to represent a (partial) key on the trie.
///
/// A path with an odd number of nibbles gains a zero padding nibble when
/// packed into bytes; the flag byte records that so decoding can drop it.
#[derive(PartialEq, Eq, Clone, Default)]
pub struct Path(pub Vec<u8>);

impl Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        for nib in self.0.iter() {
            write!(f, "{:x}", *nib & 0xf)?;
        }
        Ok(())
    }
}

impl std::ops::Deref for Path {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Path {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl Path {
    /// The nibbles of a full byte key, as searched through the trie.
    #[must_use]
    pub fn from_key(key: &[u8]) -> Self {
        Path(Nibbles::new(key).into_iter().collect())
    }

    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }

    /// Packs the nibbles into bytes and builds the trailing flag byte:
    /// `node_type` in the low nibble, [Flags::ODD_PAD] set when a padding
    /// nibble had to be appended.
    pub(crate) fn encode(&self, node_type: u8) -> (Vec<u8>, u8) {
        let mut flag = node_type;

        let bytes = if self.0.len() % 2 == 1 {
            flag |= Flags::ODD_PAD.bits();
            let padded: Vec<u8> = self.0.iter().copied().chain(once(0)).collect();
            nibbles_to_bytes_iter(&padded).collect()
        } else {
            nibbles_to_bytes_iter(&self.0).collect()
        };

        (bytes, flag)
    }

    /// Recovers the nibbles packed by [Path::encode]. Assumes `bytes` came
    /// out of a well-formed node body.
    pub(crate) fn decode(flag: u8, bytes: &[u8]) -> Self {
        let mut nibbles: Vec<u8> = Nibbles::new(bytes).into_iter().collect();
        if Flags::from_bits_retain(flag).contains(Flags::ODD_PAD) {
            nibbles.pop();
        }
        Path(nibbles)
    }
}

/// Length of the longest common prefix of two nibble strings.
pub(crate) fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}
