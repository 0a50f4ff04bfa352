// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

use super::{decode_child, Node, Path, EXT_TYPE};
use crate::merkle::MerkleError;
use bincode::{Error, Options};
use serde::de::Error as DeError;
use std::{
    fmt::{Debug, Error as FmtError, Formatter},
    sync::Arc,
};

/// Path compression: an extension prepends its (non-empty) path to whatever
/// its child covers. After deletion fixups the child is always a branch, or
/// a hash reference that resolves to one.
#[derive(PartialEq, Eq, Clone)]
pub struct ExtNode {
    pub(crate) partial_path: Path,
    pub(crate) child: Arc<Node>,
}

impl Debug for ExtNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        write!(f, "[Extension {:?} {:?}]", self.partial_path, self.child)
    }
}

impl ExtNode {
    pub fn new<P: Into<Path>>(partial_path: P, child: Arc<Node>) -> Self {
        Self {
            partial_path: partial_path.into(),
            child,
        }
    }

    pub const fn path(&self) -> &Path {
        &self.partial_path
    }

    pub const fn child(&self) -> &Arc<Node> {
        &self.child
    }

    pub(super) fn encode(&self) -> Vec<u8> {
        let (key, flag) = self.partial_path.encode(EXT_TYPE);

        let mut encoded = bincode::DefaultOptions::new()
            .serialize([key, self.child.capped()].as_slice())
            .expect("serializing an extension never fails");
        encoded.push(flag);
        encoded
    }

    pub(super) fn decode(raw: &[u8], flag: u8) -> Result<Self, MerkleError> {
        let mut items: Vec<Vec<u8>> = bincode::DefaultOptions::new().deserialize(raw)?;

        if items.len() != 2 {
            return Err(Error::custom("invalid extension node").into());
        }
        let child_slot = items
            .pop()
            .ok_or(MerkleError::MalformedNode("empty extension body"))?;
        let key = items
            .pop()
            .ok_or(MerkleError::MalformedNode("empty extension body"))?;

        let child = decode_child(&child_slot)?
            .ok_or(MerkleError::MalformedNode("extension child is missing"))?;

        Ok(ExtNode {
            partial_path: Path::decode(flag, &key),
            child,
        })
    }
}
