// Copyright (c) The projgraph Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Support for petgraph.
//!
//! The code in here is generic over petgraph's traits and is not specific to module dependency
//! graphs; it backs the cycle detection and topological ordering used by the dependencies
//! resolver and the property merger.

use fixedbitset::FixedBitSet;
use petgraph::graph::IndexType;
use petgraph::prelude::*;
use std::iter::FromIterator;

pub(crate) mod dfs;
pub(crate) mod reversed;
pub(crate) mod scc;
pub(crate) mod topo;
pub(crate) mod walk;

pub(crate) fn edge_triple<ER: EdgeRef>(edge_ref: ER) -> (ER::NodeId, ER::NodeId, ER::EdgeId) {
    (edge_ref.source(), edge_ref.target(), edge_ref.id())
}

pub(crate) struct IxBitSet(pub FixedBitSet);

impl From<IxBitSet> for FixedBitSet {
    fn from(ix_set: IxBitSet) -> Self {
        ix_set.0
    }
}

impl<Ix: IndexType> FromIterator<NodeIndex<Ix>> for IxBitSet {
    fn from_iter<T: IntoIterator<Item = NodeIndex<Ix>>>(iter: T) -> Self {
        IxBitSet(iter.into_iter().map(|node_ix| node_ix.index()).collect())
    }
}

impl<Ix: IndexType> FromIterator<EdgeIndex<Ix>> for IxBitSet {
    fn from_iter<T: IntoIterator<Item = EdgeIndex<Ix>>>(iter: T) -> Self {
        IxBitSet(iter.into_iter().map(|edge_ix| edge_ix.index()).collect())
    }
}
