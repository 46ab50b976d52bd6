//! Subgraph-isomorphism counting.
//!
//! A VF2-style backtracking search over a partial pattern-to-host
//! mapping. Pattern vertices are assigned in ascending index order and
//! host candidates are tried in ascending internal id, so counts are
//! deterministic. Candidates are restricted to host neighbors of an
//! already-mapped partner whenever the pattern connects the next vertex
//! to the mapped prefix.

use quiver_core::{Graph, LabelId, NodeId};
use roaring::RoaringBitmap;
use thiserror::Error;

/// Errors raised while building a pattern.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PatternError {
    #[error("pattern has no vertices")]
    Empty,

    #[error("pattern edge ({from}, {to}) references a vertex outside 0..{vertices}")]
    EdgeOutOfRange {
        from: usize,
        to: usize,
        vertices: usize,
    },
}

/// A directed, labeled pattern edge between pattern-vertex indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternEdge {
    pub from: usize,
    pub to: usize,
    pub label: LabelId,
}

/// A small pattern graph to count in the host.
#[derive(Debug, Clone)]
pub struct Pattern {
    node_labels: Vec<LabelId>,
    edges: Vec<PatternEdge>,
}

impl Pattern {
    /// Builds a pattern, validating that every edge endpoint names an
    /// existing pattern vertex and that the pattern is non-empty.
    pub fn new(node_labels: Vec<LabelId>, edges: Vec<PatternEdge>) -> Result<Self, PatternError> {
        if node_labels.is_empty() {
            return Err(PatternError::Empty);
        }
        let vertices = node_labels.len();
        for edge in &edges {
            if edge.from >= vertices || edge.to >= vertices {
                return Err(PatternError::EdgeOutOfRange {
                    from: edge.from,
                    to: edge.to,
                    vertices,
                });
            }
        }
        Ok(Self { node_labels, edges })
    }

    pub fn node_count(&self) -> usize {
        self.node_labels.len()
    }

    pub fn node_label(&self, vertex: usize) -> LabelId {
        self.node_labels[vertex]
    }

    pub fn edges(&self) -> &[PatternEdge] {
        &self.edges
    }
}

struct Vf2State {
    /// Pattern vertex -> host node, for the mapped prefix.
    mapping: Vec<Option<NodeId>>,
    /// Image of the mapping, for injectivity.
    used: RoaringBitmap,
}

/// Counts distinct injective mappings of `pattern` into the host.
///
/// A mapping is valid when every pattern vertex lands on a host node
/// with the same node label and every pattern edge `(a, b, l)` has a
/// host edge `(phi(a), phi(b))` carrying label `l`. `host_label`
/// supplies the host node labels (they live beside the CSR, not in it).
///
/// Worst-case exponential in the pattern size, as subgraph isomorphism
/// is; patterns are expected to stay small.
pub fn count_matches<G, F>(graph: &G, pattern: &Pattern, host_label: F) -> u64
where
    G: Graph,
    F: Fn(NodeId) -> LabelId,
{
    let mut state = Vf2State {
        mapping: vec![None; pattern.node_count()],
        used: RoaringBitmap::new(),
    };
    search(graph, pattern, &host_label, &mut state, 0)
}

fn search<G, F>(graph: &G, pattern: &Pattern, host_label: &F, state: &mut Vf2State, depth: usize) -> u64
where
    G: Graph,
    F: Fn(NodeId) -> LabelId,
{
    if depth == pattern.node_count() {
        return 1;
    }

    let mut total = 0;
    for host in candidates(graph, pattern, state, depth) {
        let host = NodeId(host);
        if !feasible(graph, pattern, host_label, state, depth, host) {
            continue;
        }
        state.mapping[depth] = Some(host);
        state.used.insert(host.as_u32());

        total += search(graph, pattern, host_label, state, depth + 1);

        state.mapping[depth] = None;
        state.used.remove(host.as_u32());
    }
    total
}

/// Host candidates for pattern vertex `depth`, ascending and deduplicated.
///
/// When some pattern edge connects `depth` to an already-mapped vertex,
/// only host neighbors of that vertex's image (in the matching
/// direction) can possibly satisfy it. Otherwise every host node is a
/// candidate.
fn candidates<G: Graph>(graph: &G, pattern: &Pattern, state: &Vf2State, depth: usize) -> Vec<u32> {
    for edge in pattern.edges() {
        if edge.from == depth && edge.to != depth {
            if let Some(mapped) = state.mapping[edge.to] {
                // phi(depth) -> mapped must exist: candidates are
                // in-neighbors of the image.
                let mut hosts: Vec<u32> = graph
                    .in_edges(mapped)
                    .iter()
                    .map(|(n, _)| n.as_u32())
                    .collect();
                hosts.sort_unstable();
                hosts.dedup();
                return hosts;
            }
        }
        if edge.to == depth && edge.from != depth {
            if let Some(mapped) = state.mapping[edge.from] {
                let mut hosts: Vec<u32> = graph
                    .out_edges(mapped)
                    .iter()
                    .map(|(n, _)| n.as_u32())
                    .collect();
                hosts.sort_unstable();
                hosts.dedup();
                return hosts;
            }
        }
    }
    (0..graph.num_nodes() as u32).collect()
}

fn feasible<G, F>(
    graph: &G,
    pattern: &Pattern,
    host_label: &F,
    state: &Vf2State,
    depth: usize,
    host: NodeId,
) -> bool
where
    G: Graph,
    F: Fn(NodeId) -> LabelId,
{
    // Injectivity.
    if state.used.contains(host.as_u32()) {
        return false;
    }
    // Node labels agree.
    if host_label(host) != pattern.node_label(depth) {
        return false;
    }
    // Every pattern edge between `depth` and the mapped prefix (or
    // itself) must exist in the host with the same edge label.
    for edge in pattern.edges() {
        if edge.from == depth && edge.to == depth {
            if !graph.has_edge(host, host, Some(edge.label)) {
                return false;
            }
        } else if edge.from == depth {
            if let Some(mapped) = state.mapping[edge.to] {
                if !graph.has_edge(host, mapped, Some(edge.label)) {
                    return false;
                }
            }
        } else if edge.to == depth {
            if let Some(mapped) = state.mapping[edge.from] {
                if !graph.has_edge(mapped, host, Some(edge.label)) {
                    return false;
                }
            }
        }
    }
    true
}
