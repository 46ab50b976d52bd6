//! Memory-mapped compressed-sparse-row adjacency.
//!
//! One [`CsrHalf`] covers one direction: three parallel read-only
//! mappings holding offsets, neighbor ids and edge labels. Views into a
//! half are zero-copy slices that stay valid for the half's lifetime;
//! reads are safe under concurrent access because the artifact never
//! changes after load.

use std::path::Path;

use quiver_core::{LabelId, NodeId};
use thiserror::Error;

use crate::artifact::{ArtifactError, MappedFile, Meta};

/// Errors raised while loading or validating a CSR half.
#[derive(Debug, Error)]
pub enum CsrError {
    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error("{prefix}_offsets.bin: offsets[0] is {actual}, expected 0")]
    FirstOffsetNonZero { prefix: &'static str, actual: u32 },

    #[error("{prefix}_offsets.bin: offsets[{num_nodes}] is {actual}, expected edge count {num_edges}")]
    LastOffsetMismatch {
        prefix: &'static str,
        num_nodes: u64,
        num_edges: u64,
        actual: u32,
    },

    #[error("{prefix}_offsets.bin: offsets decrease at node {node}")]
    NonMonotoneOffsets { prefix: &'static str, node: usize },

    #[error("{prefix}_neighbors.bin: neighbor {neighbor} at position {position} is out of range (num_nodes {num_nodes})")]
    NeighborOutOfRange {
        prefix: &'static str,
        neighbor: u32,
        position: usize,
        num_nodes: u64,
    },
}

/// Zero-copy view over one node's adjacency in one direction.
///
/// `targets` and `labels` are parallel: `labels[i]` is the edge label
/// of the edge to `targets[i]`.
#[derive(Clone, Copy)]
pub struct EdgeView<'a> {
    pub targets: &'a [u32],
    pub labels: &'a [u8],
}

impl<'a> EdgeView<'a> {
    #[inline]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Iterates `(target, edge_label)` pairs in storage order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, LabelId)> + 'a {
        self.targets
            .iter()
            .zip(self.labels.iter())
            .map(|(&t, &l)| (NodeId(t), LabelId(l)))
    }
}

/// One direction of the CSR pair, backed by three mappings.
pub struct CsrHalf {
    offsets: MappedFile,
    neighbors: MappedFile,
    edge_labels: MappedFile,
    num_nodes: usize,
}

impl CsrHalf {
    /// Opens and validates `{prefix}_{offsets,neighbors,edge_labels}.bin`.
    ///
    /// Validation is fatal on any size mismatch against the meta
    /// record, a non-monotone offsets array, or an out-of-range
    /// neighbor: all of these mean a corrupt artifact.
    pub fn load(dir: &Path, prefix: &'static str, meta: &Meta) -> Result<Self, CsrError> {
        let n = meta.num_nodes;
        let m = meta.num_edges;

        let offsets = MappedFile::open(&dir.join(format!("{prefix}_offsets.bin")), (n + 1) * 4)?;
        let neighbors = MappedFile::open(&dir.join(format!("{prefix}_neighbors.bin")), m * 4)?;
        let edge_labels = MappedFile::open(&dir.join(format!("{prefix}_edge_labels.bin")), m)?;

        let offs = offsets.as_u32s();
        if offs[0] != 0 {
            return Err(CsrError::FirstOffsetNonZero {
                prefix,
                actual: offs[0],
            });
        }
        if u64::from(offs[n as usize]) != m {
            return Err(CsrError::LastOffsetMismatch {
                prefix,
                num_nodes: n,
                num_edges: m,
                actual: offs[n as usize],
            });
        }
        for node in 0..n as usize {
            if offs[node] > offs[node + 1] {
                return Err(CsrError::NonMonotoneOffsets { prefix, node });
            }
        }
        for (position, &neighbor) in neighbors.as_u32s().iter().enumerate() {
            if u64::from(neighbor) >= n {
                return Err(CsrError::NeighborOutOfRange {
                    prefix,
                    neighbor,
                    position,
                    num_nodes: n,
                });
            }
        }

        Ok(Self {
            offsets,
            neighbors,
            edge_labels,
            num_nodes: n as usize,
        })
    }

    /// The adjacency slice of `node`. O(1), zero-copy. Out-of-range
    /// nodes yield an empty view.
    #[inline]
    pub fn edges(&self, node: NodeId) -> EdgeView<'_> {
        let u = node.as_usize();
        if u >= self.num_nodes {
            return EdgeView {
                targets: &[],
                labels: &[],
            };
        }
        let offs = self.offsets.as_u32s();
        let start = offs[u] as usize;
        let end = offs[u + 1] as usize;
        EdgeView {
            targets: &self.neighbors.as_u32s()[start..end],
            labels: &self.edge_labels.bytes()[start..end],
        }
    }

    /// The full offsets array, length `num_nodes + 1`.
    pub fn offsets(&self) -> &[u32] {
        self.offsets.as_u32s()
    }

    /// The full neighbors array, length `num_edges`.
    pub fn neighbors(&self) -> &[u32] {
        self.neighbors.as_u32s()
    }

    /// The full edge-label array, length `num_edges`.
    pub fn edge_labels(&self) -> &[u8] {
        self.edge_labels.bytes()
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{write_u32s, write_u8s};
    use tempfile::tempdir;

    fn write_half(dir: &Path, prefix: &str, offsets: &[u32], neighbors: &[u32], labels: &[u8]) {
        write_u32s(&dir.join(format!("{prefix}_offsets.bin")), offsets).unwrap();
        write_u32s(&dir.join(format!("{prefix}_neighbors.bin")), neighbors).unwrap();
        write_u8s(&dir.join(format!("{prefix}_edge_labels.bin")), labels).unwrap();
    }

    #[test]
    fn test_load_and_view() {
        let dir = tempdir().unwrap();
        // 0 -> {1, 2}, 1 -> {2}, 2 -> {}
        write_half(dir.path(), "out", &[0, 2, 3, 3], &[1, 2, 2], &[0, 1, 0]);

        let meta = Meta {
            num_nodes: 3,
            num_edges: 3,
        };
        let half = CsrHalf::load(dir.path(), "out", &meta).unwrap();

        let view = half.edges(NodeId(0));
        assert_eq!(view.targets, &[1, 2]);
        assert_eq!(view.labels, &[0, 1]);

        let pairs: Vec<_> = half.edges(NodeId(1)).iter().collect();
        assert_eq!(pairs, vec![(NodeId(2), LabelId(0))]);

        assert!(half.edges(NodeId(2)).is_empty());
        assert!(half.edges(NodeId(99)).is_empty());
    }

    #[test]
    fn test_empty_graph() {
        let dir = tempdir().unwrap();
        write_half(dir.path(), "out", &[0], &[], &[]);

        let meta = Meta {
            num_nodes: 0,
            num_edges: 0,
        };
        let half = CsrHalf::load(dir.path(), "out", &meta).unwrap();
        assert_eq!(half.num_nodes(), 0);
        assert_eq!(half.offsets(), &[0]);
    }

    #[test]
    fn test_size_mismatch() {
        let dir = tempdir().unwrap();
        write_half(dir.path(), "out", &[0, 1, 1], &[1], &[0]);

        let meta = Meta {
            num_nodes: 3,
            num_edges: 1,
        };
        assert!(matches!(
            CsrHalf::load(dir.path(), "out", &meta),
            Err(CsrError::Artifact(ArtifactError::SizeMismatch { .. }))
        ));
    }

    #[test]
    fn test_non_monotone_offsets() {
        let dir = tempdir().unwrap();
        write_half(dir.path(), "out", &[0, 2, 1, 3], &[1, 2, 0], &[0, 0, 0]);

        let meta = Meta {
            num_nodes: 3,
            num_edges: 3,
        };
        assert!(matches!(
            CsrHalf::load(dir.path(), "out", &meta),
            Err(CsrError::NonMonotoneOffsets { node: 1, .. })
        ));
    }

    #[test]
    fn test_last_offset_mismatch() {
        let dir = tempdir().unwrap();
        write_half(dir.path(), "out", &[0, 1, 2, 2], &[1, 2, 0], &[0, 0, 0]);

        let meta = Meta {
            num_nodes: 3,
            num_edges: 3,
        };
        assert!(matches!(
            CsrHalf::load(dir.path(), "out", &meta),
            Err(CsrError::LastOffsetMismatch { .. })
        ));
    }

    #[test]
    fn test_neighbor_out_of_range() {
        let dir = tempdir().unwrap();
        write_half(dir.path(), "out", &[0, 1, 1, 1], &[7], &[0]);

        let meta = Meta {
            num_nodes: 3,
            num_edges: 1,
        };
        assert!(matches!(
            CsrHalf::load(dir.path(), "out", &meta),
            Err(CsrError::NeighborOutOfRange { neighbor: 7, .. })
        ));
    }

    #[test]
    fn test_self_loop() {
        let dir = tempdir().unwrap();
        write_half(dir.path(), "out", &[0, 1], &[0], &[3]);

        let meta = Meta {
            num_nodes: 1,
            num_edges: 1,
        };
        let half = CsrHalf::load(dir.path(), "out", &meta).unwrap();
        let pairs: Vec<_> = half.edges(NodeId(0)).iter().collect();
        assert_eq!(pairs, vec![(NodeId(0), LabelId(3))]);
    }
}
