// Copyright (c) The projgraph Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::edge_triple;
use petgraph::visit::{IntoEdges, VisitMap, Visitable, Walker};
use std::iter;

/// An edge-oriented DFS walker, used to invalidate cached merge results that depend on a changed
/// module property: starting from the set of modules whose final-merge output changed, walk every
/// edge reachable from them and mark the far endpoint for evaluator-cache invalidation.
#[derive(Clone, Debug)]
pub(crate) struct EdgeDfs<E, N, VM> {
    pub stack: Vec<(N, N, E)>,
    pub discovered: VM,
}

impl<E, N, VM> EdgeDfs<E, N, VM>
where
    E: Copy + PartialEq,
    N: Copy + PartialEq,
    VM: VisitMap<N>,
{
    pub(crate) fn new<G>(graph: G, initials: impl IntoIterator<Item = N>) -> Self
    where
        G: Visitable<Map = VM> + IntoEdges<NodeId = N, EdgeId = E>,
    {
        let mut discovered = graph.visit_map();
        let stack = initials
            .into_iter()
            .flat_map(|node_idx| {
                discovered.visit(node_idx);
                graph.edges(node_idx).map(edge_triple)
            })
            .collect();
        Self { stack, discovered }
    }

    #[allow(dead_code)]
    pub(crate) fn new_single<G>(graph: G, start: N) -> Self
    where
        G: Visitable<Map = VM> + IntoEdges<NodeId = N, EdgeId = E>,
    {
        Self::new(graph, iter::once(start))
    }

    pub fn next<G>(&mut self, graph: G) -> Option<(N, N, E)>
    where
        G: IntoEdges<NodeId = N, EdgeId = E>,
    {
        self.stack.pop().map(|(source, target, edge)| {
            if self.discovered.visit(target) {
                self.stack.extend(graph.edges(target).map(edge_triple));
            }
            (source, target, edge)
        })
    }
}

impl<G> Walker<G> for EdgeDfs<G::EdgeId, G::NodeId, G::Map>
where
    G: IntoEdges + Visitable,
{
    type Item = (G::NodeId, G::NodeId, G::EdgeId);

    fn walk_next(&mut self, context: G) -> Option<Self::Item> {
        self.next(context)
    }
}
