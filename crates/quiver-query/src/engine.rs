//! The query surface over one opened artifact.
//!
//! All queries take external ids and label strings; resolution happens
//! here, against the artifact's registry and label tables. Unknown
//! external ids and unknown labels are input errors in the taxonomy and
//! recover locally to a zero result, never an error.

use quiver_core::{Graph, NodeId};
use quiver_storage::GraphStore;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::common::common_neighbor_count;
use crate::components::connected_components;
use crate::khop::khop_count;
use crate::reachability;
use crate::subgraph::{count_matches, Pattern, PatternEdge, PatternError};

/// A pattern as it arrives over the wire: label strings, not ids.
///
/// Edges are `[from_vertex, to_vertex, edge_label]` triples indexing
/// into `node_labels`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternSpec {
    pub node_labels: Vec<String>,
    pub edges: Vec<(usize, usize, String)>,
}

/// Executes queries against an adjacency backend, resolving external
/// ids through the artifact's registry.
///
/// The backend is usually the store itself; for graphs served from the
/// block cache, [`QueryEngine::with_backend`] swaps the adjacency
/// source while registry and label tables stay with the artifact.
pub struct QueryEngine<'a, G: Graph = GraphStore> {
    graph: &'a G,
    store: &'a GraphStore,
}

impl<'a> QueryEngine<'a, GraphStore> {
    pub fn new(store: &'a GraphStore) -> Self {
        Self {
            graph: store,
            store,
        }
    }
}

impl<'a, G: Graph> QueryEngine<'a, G> {
    /// An engine whose traversals run over `graph` (e.g. a
    /// [`quiver_storage::BlockedGraph`]) while id and label resolution
    /// stay with the artifact.
    pub fn with_backend(store: &'a GraphStore, graph: &'a G) -> Self {
        Self { graph, store }
    }

    pub fn store(&self) -> &GraphStore {
        self.store
    }

    fn resolve(&self, external: &str) -> Option<NodeId> {
        self.store.resolve(external)
    }

    /// Distinct nodes within `k` undirected hops of `node`; 0 for an
    /// unknown id, 1 for `k = 0` on a known id.
    pub fn khop(&self, node: &str, k: u32) -> u64 {
        let Some(start) = self.resolve(node) else {
            return 0;
        };
        let count = khop_count(self.graph, start, k);
        debug!(node, k, count, "khop");
        count
    }

    /// Size of the intersection of the union neighborhoods of `nodes`;
    /// 0 if the list is empty or any id is unknown.
    pub fn common_neighbors<S: AsRef<str>>(&self, nodes: &[S]) -> u64 {
        let mut resolved = Vec::with_capacity(nodes.len());
        for node in nodes {
            let Some(id) = self.resolve(node.as_ref()) else {
                return 0;
            };
            resolved.push(id);
        }
        let count = common_neighbor_count(self.graph, &resolved);
        debug!(nodes = nodes.len(), count, "common_neighbors");
        count
    }

    /// Number of weakly connected components in the full graph.
    pub fn connected_components(&self) -> u64 {
        let count = connected_components(self.graph);
        debug!(count, "connected_components");
        count
    }

    /// 1 if a directed path `src -> dst` exists, else 0. Unknown ids
    /// yield 0.
    pub fn reachable(&self, src: &str, dst: &str) -> u64 {
        let (Some(src_id), Some(dst_id)) = (self.resolve(src), self.resolve(dst)) else {
            return 0;
        };
        u64::from(reachability::reachable(self.graph, src_id, dst_id))
    }

    /// Number of injective label-respecting embeddings of the pattern.
    ///
    /// A label string absent from the artifact's tables cannot match
    /// anything, so it short-circuits to 0. A structurally invalid
    /// pattern (no vertices, edge endpoint out of range) is an error.
    pub fn subgraph(&self, spec: &PatternSpec) -> Result<u64, PatternError> {
        if spec.node_labels.is_empty() {
            return Err(PatternError::Empty);
        }
        // Structural validation first, so a malformed pattern is
        // reported as such even when its labels are unknown.
        for &(from, to, _) in &spec.edges {
            if from >= spec.node_labels.len() || to >= spec.node_labels.len() {
                return Err(PatternError::EdgeOutOfRange {
                    from,
                    to,
                    vertices: spec.node_labels.len(),
                });
            }
        }

        let mut node_labels = Vec::with_capacity(spec.node_labels.len());
        for name in &spec.node_labels {
            match self.store.node_label_names().get(name) {
                Some(id) => node_labels.push(id),
                None => return Ok(0),
            }
        }

        let mut edges = Vec::with_capacity(spec.edges.len());
        for (from, to, label) in &spec.edges {
            match self.store.edge_label_names().get(label) {
                Some(id) => edges.push(PatternEdge {
                    from: *from,
                    to: *to,
                    label: id,
                }),
                None => return Ok(0),
            }
        }

        let pattern = Pattern::new(node_labels, edges)?;
        let store = self.store;
        let count = count_matches(self.graph, &pattern, |n| store.node_label(n));
        debug!(
            vertices = pattern.node_count(),
            edges = pattern.edges().len(),
            count,
            "subgraph"
        );
        Ok(count)
    }
}
