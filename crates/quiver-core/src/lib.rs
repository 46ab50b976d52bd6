//! # Quiver Core
//!
//! Core types and traits for the quiver graph analytics engine.
//!
//! This crate provides the fundamental building blocks:
//! - [`NodeId`] and [`LabelId`] - Type-safe identifiers
//! - [`Neighbors`] - A view over one node's adjacency
//! - [`Graph`] - Core trait implemented by every adjacency backend

use std::fmt;

/// Maximum number of distinct labels per table (node labels and edge
/// labels each). Label ids are a single byte on disk.
pub const MAX_LABELS: usize = 255;

// =============================================================================
// Identifiers (Newtypes for type safety)
// =============================================================================

/// A dense internal node identifier in `[0, N)`.
///
/// Uses a newtype pattern to prevent mixing up node ids with other
/// integer types. External string ids are resolved to `NodeId`s by the
/// identifier registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Creates a new NodeId from a u32.
    #[inline]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw u32 value.
    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns the id as a usize for indexing.
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl From<u32> for NodeId {
    #[inline]
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl From<usize> for NodeId {
    #[inline]
    fn from(id: usize) -> Self {
        Self(id as u32)
    }
}

/// An interned label identifier. Label tables hold at most
/// [`MAX_LABELS`] entries, so a single byte suffices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct LabelId(pub u8);

impl LabelId {
    /// Creates a new LabelId from a u8.
    #[inline]
    pub const fn new(id: u8) -> Self {
        Self(id)
    }

    /// Returns the raw u8 value.
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self.0
    }

    /// Returns the id as a usize for indexing into a label table.
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "l{}", self.0)
    }
}

impl From<u8> for LabelId {
    #[inline]
    fn from(id: u8) -> Self {
        Self(id)
    }
}

// =============================================================================
// Adjacency views
// =============================================================================

/// One node's adjacency in a single direction.
///
/// The memory-mapped CSR store hands out zero-copy slices into its
/// mappings; the block-cached store copies the adjacency out from behind
/// its cache lock. Both shapes iterate uniformly as
/// `(NodeId, LabelId)` pairs.
pub enum Neighbors<'a> {
    /// Borrowed view into a CSR store. `targets` and `labels` are
    /// parallel and equal in length.
    Borrowed {
        /// Destination internal ids.
        targets: &'a [u32],
        /// Edge label per destination.
        labels: &'a [u8],
    },
    /// Owned adjacency, copied out of a block cache.
    Owned(Vec<(u32, u8)>),
}

impl Neighbors<'_> {
    /// Number of edges in this view.
    #[inline]
    pub fn len(&self) -> usize {
        match self {
            Neighbors::Borrowed { targets, .. } => targets.len(),
            Neighbors::Owned(pairs) => pairs.len(),
        }
    }

    /// True if the node has no edges in this direction.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates over `(target, edge_label)` pairs in storage order.
    pub fn iter(&self) -> NeighborsIter<'_> {
        match self {
            Neighbors::Borrowed { targets, labels } => NeighborsIter::Borrowed {
                targets: targets.iter(),
                labels: labels.iter(),
            },
            Neighbors::Owned(pairs) => NeighborsIter::Owned(pairs.iter()),
        }
    }
}

/// Iterator over a [`Neighbors`] view.
pub enum NeighborsIter<'a> {
    Borrowed {
        targets: std::slice::Iter<'a, u32>,
        labels: std::slice::Iter<'a, u8>,
    },
    Owned(std::slice::Iter<'a, (u32, u8)>),
}

impl Iterator for NeighborsIter<'_> {
    type Item = (NodeId, LabelId);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        match self {
            NeighborsIter::Borrowed { targets, labels } => {
                let t = targets.next()?;
                let l = labels.next()?;
                Some((NodeId(*t), LabelId(*l)))
            }
            NeighborsIter::Owned(pairs) => {
                let (t, l) = pairs.next()?;
                Some((NodeId(*t), LabelId(*l)))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            NeighborsIter::Borrowed { targets, .. } => targets.size_hint(),
            NeighborsIter::Owned(pairs) => pairs.size_hint(),
        }
    }
}

// =============================================================================
// Graph Trait
// =============================================================================

/// Core trait for adjacency backends.
///
/// Implemented by the memory-mapped CSR store and by the block-cached
/// store, so queries run unchanged over either. All edges are directed;
/// `out_edges` follows them forward, `in_edges` backward.
pub trait Graph {
    /// Returns the number of nodes in the graph.
    fn num_nodes(&self) -> usize;

    /// Returns the number of edges in the graph.
    fn num_edges(&self) -> usize;

    /// Returns the outgoing adjacency of `node`.
    fn out_edges(&self, node: NodeId) -> Neighbors<'_>;

    /// Returns the incoming adjacency of `node`.
    fn in_edges(&self, node: NodeId) -> Neighbors<'_>;

    /// Returns the out-degree of a node.
    fn out_degree(&self, node: NodeId) -> usize {
        self.out_edges(node).len()
    }

    /// Returns the in-degree of a node.
    fn in_degree(&self, node: NodeId) -> usize {
        self.in_edges(node).len()
    }

    /// Checks if the graph contains a node with the given id.
    fn contains_node(&self, node: NodeId) -> bool {
        node.as_usize() < self.num_nodes()
    }

    /// Checks for a directed edge `src -> dst`, optionally constrained
    /// to a specific edge label.
    fn has_edge(&self, src: NodeId, dst: NodeId, label: Option<LabelId>) -> bool {
        self.out_edges(src)
            .iter()
            .any(|(t, l)| t == dst && label.is_none_or(|want| l == want))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id() {
        let id = NodeId::new(42);
        assert_eq!(id.as_u32(), 42);
        assert_eq!(id.as_usize(), 42);
        assert_eq!(format!("{}", id), "n42");

        let id2: NodeId = 100u32.into();
        assert_eq!(id2.as_u32(), 100);

        let id3: NodeId = 50usize.into();
        assert_eq!(id3.as_u32(), 50);
    }

    #[test]
    fn test_label_id() {
        let label = LabelId::new(7);
        assert_eq!(label.as_u8(), 7);
        assert_eq!(label.as_usize(), 7);
        assert_eq!(format!("{}", label), "l7");
    }

    #[test]
    fn test_neighbors_borrowed() {
        let targets = [1u32, 2, 3];
        let labels = [0u8, 1, 0];
        let view = Neighbors::Borrowed {
            targets: &targets,
            labels: &labels,
        };

        assert_eq!(view.len(), 3);
        assert!(!view.is_empty());

        let collected: Vec<_> = view.iter().collect();
        assert_eq!(collected[0], (NodeId(1), LabelId(0)));
        assert_eq!(collected[2], (NodeId(3), LabelId(0)));
    }

    #[test]
    fn test_neighbors_owned() {
        let view = Neighbors::Owned(vec![(5, 2), (9, 0)]);
        assert_eq!(view.len(), 2);

        let collected: Vec<_> = view.iter().collect();
        assert_eq!(collected, vec![(NodeId(5), LabelId(2)), (NodeId(9), LabelId(0))]);
    }

    #[test]
    fn test_empty_neighbors() {
        let view = Neighbors::Borrowed {
            targets: &[],
            labels: &[],
        };
        assert!(view.is_empty());
        assert_eq!(view.iter().count(), 0);
    }

    struct TinyGraph;

    impl Graph for TinyGraph {
        fn num_nodes(&self) -> usize {
            2
        }
        fn num_edges(&self) -> usize {
            1
        }
        fn out_edges(&self, node: NodeId) -> Neighbors<'_> {
            if node == NodeId(0) {
                Neighbors::Owned(vec![(1, 3)])
            } else {
                Neighbors::Owned(Vec::new())
            }
        }
        fn in_edges(&self, node: NodeId) -> Neighbors<'_> {
            if node == NodeId(1) {
                Neighbors::Owned(vec![(0, 3)])
            } else {
                Neighbors::Owned(Vec::new())
            }
        }
    }

    #[test]
    fn test_graph_trait_defaults() {
        let g = TinyGraph;
        assert!(g.contains_node(NodeId(1)));
        assert!(!g.contains_node(NodeId(2)));
        assert_eq!(g.out_degree(NodeId(0)), 1);
        assert_eq!(g.in_degree(NodeId(1)), 1);
        assert!(g.has_edge(NodeId(0), NodeId(1), None));
        assert!(g.has_edge(NodeId(0), NodeId(1), Some(LabelId(3))));
        assert!(!g.has_edge(NodeId(0), NodeId(1), Some(LabelId(4))));
        assert!(!g.has_edge(NodeId(1), NodeId(0), None));
    }
}
