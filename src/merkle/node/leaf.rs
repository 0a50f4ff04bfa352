// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

use super::{Path, LEAF_TYPE};
use crate::merkle::MerkleError;
use bincode::{Error, Options};
use serde::de::Error as DeError;
use std::fmt::{Debug, Error as FmtError, Formatter};

#[derive(PartialEq, Eq, Clone)]
pub struct LeafNode {
    pub(crate) partial_path: Path,
    pub(crate) value: Vec<u8>,
}

impl Debug for LeafNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        write!(
            f,
            "[Leaf {:?} {}]",
            self.partial_path,
            hex::encode(&*self.value)
        )
    }
}

impl LeafNode {
    pub fn new<P: Into<Path>, V: Into<Vec<u8>>>(partial_path: P, value: V) -> Self {
        Self {
            partial_path: partial_path.into(),
            value: value.into(),
        }
    }

    pub const fn path(&self) -> &Path {
        &self.partial_path
    }

    pub const fn value(&self) -> &Vec<u8> {
        &self.value
    }

    pub(super) fn encode(&self) -> Vec<u8> {
        let (key, flag) = self.partial_path.encode(LEAF_TYPE);

        let mut encoded = bincode::DefaultOptions::new()
            .serialize([key, self.value.clone()].as_slice())
            .expect("serializing a leaf never fails");
        encoded.push(flag);
        encoded
    }

    pub(super) fn decode(raw: &[u8], flag: u8) -> Result<Self, MerkleError> {
        let mut items: Vec<Vec<u8>> = bincode::DefaultOptions::new().deserialize(raw)?;

        if items.len() != 2 {
            return Err(Error::custom("invalid leaf node").into());
        }
        let value = items.pop().ok_or(MerkleError::MalformedNode("empty leaf body"))?;
        let key = items.pop().ok_or(MerkleError::MalformedNode("empty leaf body"))?;

        Ok(LeafNode {
            partial_path: Path::decode(flag, &key),
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    // these tests will fail if the encoding mechanism changes and should be
    // updated accordingly
    //
    // Even nibble count, so the pad bit is clear and the flag byte is 0x00
    #[test_case(0x00, vec![0x12, 0x34], vec![1, 2, 3, 4]; "even length")]
    // Odd nibble count, so a zero nibble is appended and the flag is 0x10
    #[test_case(0x10, vec![0x23, 0x40], vec![2, 3, 4]; "odd length")]
    fn encode_regression_test(flag: u8, key_bytes: Vec<u8>, nibbles: Vec<u8>) {
        let value = vec![5, 6, 7, 8];

        let mut expected = vec![2]; // two body fields
        expected.push(key_bytes.len() as u8);
        expected.extend(&key_bytes);
        expected.push(value.len() as u8);
        expected.extend(&value);
        expected.push(flag);

        let node = LeafNode::new(nibbles, value);

        assert_eq!(node.encode(), expected);
    }

    #[test]
    fn decode_rejects_extra_fields() {
        let body = bincode::DefaultOptions::new()
            .serialize([vec![0x12u8], vec![1], vec![2]].as_slice())
            .unwrap();
        assert!(LeafNode::decode(&body, LEAF_TYPE).is_err());
    }
}
