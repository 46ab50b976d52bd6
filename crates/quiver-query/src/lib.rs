//! # Quiver Query
//!
//! The analytic query engine over quiver graph artifacts: k-hop
//! counts, common neighbors, weakly connected components, directed
//! reachability and subgraph-isomorphism counts.
//!
//! Traversals are written against the [`quiver_core::Graph`] trait, so
//! they run unchanged over the memory-mapped CSR store and the
//! block-cached store. Determinism: BFS frontiers are FIFO and the
//! subgraph matcher enumerates pattern vertices by ascending index and
//! host candidates by ascending internal id.

pub mod common;
pub mod components;
pub mod engine;
pub mod khop;
pub mod reachability;
pub mod subgraph;

// Re-exports
pub use common::{common_neighbor_count, union_neighborhood};
pub use components::connected_components;
pub use engine::{PatternSpec, QueryEngine};
pub use khop::khop_count;
pub use reachability::reachable;
pub use subgraph::{count_matches, Pattern, PatternEdge, PatternError};

#[cfg(test)]
pub(crate) mod test_graph {
    use quiver_core::{Graph, LabelId, Neighbors, NodeId};

    /// A small in-memory adjacency for unit tests.
    pub struct TestGraph {
        out: Vec<Vec<(u32, u8)>>,
        in_: Vec<Vec<(u32, u8)>>,
        node_labels: Vec<u8>,
        num_edges: usize,
    }

    impl TestGraph {
        pub fn new(num_nodes: usize, edges: &[(u32, u32, u8)]) -> Self {
            Self::with_node_labels(num_nodes, edges, &vec![0; num_nodes])
        }

        pub fn with_node_labels(
            num_nodes: usize,
            edges: &[(u32, u32, u8)],
            node_labels: &[u8],
        ) -> Self {
            assert_eq!(node_labels.len(), num_nodes);
            let mut out = vec![Vec::new(); num_nodes];
            let mut in_ = vec![Vec::new(); num_nodes];
            for &(src, dst, label) in edges {
                out[src as usize].push((dst, label));
                in_[dst as usize].push((src, label));
            }
            Self {
                out,
                in_,
                node_labels: node_labels.to_vec(),
                num_edges: edges.len(),
            }
        }

        pub fn node_label(&self, node: NodeId) -> LabelId {
            LabelId(self.node_labels[node.as_usize()])
        }
    }

    impl Graph for TestGraph {
        fn num_nodes(&self) -> usize {
            self.out.len()
        }

        fn num_edges(&self) -> usize {
            self.num_edges
        }

        fn out_edges(&self, node: NodeId) -> Neighbors<'_> {
            match self.out.get(node.as_usize()) {
                Some(list) => Neighbors::Owned(list.clone()),
                None => Neighbors::Owned(Vec::new()),
            }
        }

        fn in_edges(&self, node: NodeId) -> Neighbors<'_> {
            match self.in_.get(node.as_usize()) {
                Some(list) => Neighbors::Owned(list.clone()),
                None => Neighbors::Owned(Vec::new()),
            }
        }
    }
}
