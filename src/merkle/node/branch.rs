// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

use super::{decode_child, Node};
use crate::merkle::MerkleError;
use bincode::{Error, Options};
use serde::de::Error as DeError;
use std::{
    fmt::{Debug, Error as FmtError, Formatter},
    sync::Arc,
};

const MAX_CHILDREN: usize = 16;

/// A 16-way fan-out by the next nibble of the search key, plus the value
/// stored for the key that ends exactly here.
///
/// Every mutating helper returns a fresh node; branches are never edited in
/// place.
#[derive(PartialEq, Eq, Clone)]
pub struct BranchNode {
    pub(crate) children: [Option<Arc<Node>>; MAX_CHILDREN],
    pub(crate) value: Option<Vec<u8>>,
}

impl Debug for BranchNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        write!(f, "[Branch")?;

        for (i, child) in self.children.iter().enumerate() {
            if let Some(child) = child {
                write!(f, " ({i:x} {child:?})")?;
            }
        }

        write!(
            f,
            " v={}]",
            match &self.value {
                Some(v) => hex::encode(&**v),
                None => "nil".to_string(),
            }
        )
    }
}

impl BranchNode {
    pub const MAX_CHILDREN: usize = MAX_CHILDREN;

    /// children + value
    pub const MSIZE: usize = Self::MAX_CHILDREN + 1;

    /// A branch holding only a value.
    pub fn with_value<V: Into<Vec<u8>>>(value: V) -> Self {
        BranchNode {
            children: Default::default(),
            value: Some(value.into()),
        }
    }

    /// A branch holding a single child at `pos`, and optionally a value.
    pub fn with_child(pos: usize, child: Arc<Node>, value: Option<Vec<u8>>) -> Self {
        let mut children: [Option<Arc<Node>>; Self::MAX_CHILDREN] = Default::default();
        children[pos] = Some(child);
        BranchNode { children, value }
    }

    /// A branch holding the given children and no value.
    pub fn with_children(children: [Option<Arc<Node>>; Self::MAX_CHILDREN]) -> Self {
        BranchNode {
            children,
            value: None,
        }
    }

    /// A copy of this branch with its value replaced.
    #[must_use]
    pub fn update_value<V: Into<Vec<u8>>>(&self, value: V) -> Self {
        BranchNode {
            children: self.children.clone(),
            value: Some(value.into()),
        }
    }

    /// A copy of this branch with the child slot at `pos` replaced.
    #[must_use]
    pub fn update_child(&self, pos: usize, child: Option<Arc<Node>>) -> Self {
        let mut children = self.children.clone();
        children[pos] = child;
        BranchNode {
            children,
            value: self.value.clone(),
        }
    }

    /// The occupied child slots, in slot order.
    #[must_use]
    pub fn child_indices(&self) -> Vec<usize> {
        self.children
            .iter()
            .enumerate()
            .filter_map(|(i, child)| child.as_ref().map(|_| i))
            .collect()
    }

    pub const fn children(&self) -> &[Option<Arc<Node>>; Self::MAX_CHILDREN] {
        &self.children
    }

    pub const fn value(&self) -> &Option<Vec<u8>> {
        &self.value
    }

    #[must_use]
    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    pub(super) fn encode(&self) -> Vec<u8> {
        // 16 child slots + the value, absent entries as empty byte strings
        let mut list = <[Vec<u8>; Self::MSIZE]>::default();

        for (i, child) in self.children.iter().enumerate() {
            if let Some(child) = child {
                list[i] = child.capped();
            }
        }

        if let Some(value) = &self.value {
            list[Self::MAX_CHILDREN] = value.clone();
        }

        let mut encoded = bincode::DefaultOptions::new()
            .serialize(list.as_slice())
            .expect("serializing a branch never fails");
        encoded.push(super::BRANCH_TYPE);
        encoded
    }

    pub(super) fn decode(raw: &[u8]) -> Result<Self, MerkleError> {
        let mut items: Vec<Vec<u8>> = bincode::DefaultOptions::new().deserialize(raw)?;

        if items.len() != Self::MSIZE {
            return Err(Error::custom("invalid branch node").into());
        }

        // an empty value slot means no value is stored at this branch
        let value = items.pop().filter(|value| !value.is_empty());

        let mut children: [Option<Arc<Node>>; Self::MAX_CHILDREN] = Default::default();
        for (i, slot) in items.into_iter().enumerate() {
            children[i] = decode_child(&slot)?;
        }

        Ok(BranchNode { children, value })
    }
}
