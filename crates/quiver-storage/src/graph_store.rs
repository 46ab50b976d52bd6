//! The read-only graph store: one opened artifact.
//!
//! Owns the identifier registry, both CSR halves, the per-node label
//! bytes and the label string tables. All mappings live exactly as long
//! as the store; adjacency views borrow from it.

use std::path::Path;

use quiver_core::{Graph, LabelId, Neighbors, NodeId};
use thiserror::Error;
use tracing::info;

use crate::artifact::{self, ArtifactError, MappedFile, Meta};
use crate::csr::{CsrError, CsrHalf, EdgeView};
use crate::labels::{LabelError, LabelTable};
use crate::registry::{IdRegistry, RegistryError};

/// Errors raised while opening an artifact directory.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Csr(#[from] CsrError),

    #[error("label table: {0}")]
    Labels(#[from] LabelError),
}

/// A fully opened, immutable graph artifact.
pub struct GraphStore {
    meta: Meta,
    registry: IdRegistry,
    out_csr: CsrHalf,
    in_csr: CsrHalf,
    node_labels: MappedFile,
    node_label_names: LabelTable,
    edge_label_names: LabelTable,
}

impl GraphStore {
    /// Opens every artifact file in `dir`, validating sizes and CSR
    /// invariants against the meta record. Any failure is fatal: a
    /// store that fails to open must not serve queries.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        let meta = Meta::read(dir)?;
        let registry = IdRegistry::load(dir, meta.num_nodes)?;
        let out_csr = CsrHalf::load(dir, "out", &meta)?;
        let in_csr = CsrHalf::load(dir, "in", &meta)?;
        let node_labels = MappedFile::open(&dir.join(artifact::NODE_LABELS), meta.num_nodes)?;
        let node_label_names = LabelTable::load(&dir.join(artifact::NODE_LABEL_STRINGS))?;
        let edge_label_names = LabelTable::load(&dir.join(artifact::EDGE_LABEL_STRINGS))?;

        info!(
            nodes = meta.num_nodes,
            edges = meta.num_edges,
            path = %dir.display(),
            "opened graph artifact"
        );

        Ok(Self {
            meta,
            registry,
            out_csr,
            in_csr,
            node_labels,
            node_label_names,
            edge_label_names,
        })
    }

    /// Resolves an external id, or `None` if it was never imported.
    pub fn resolve(&self, external: &str) -> Option<NodeId> {
        self.registry.lookup(external)
    }

    pub fn registry(&self) -> &IdRegistry {
        &self.registry
    }

    /// The node label id of an internal node.
    #[inline]
    pub fn node_label(&self, node: NodeId) -> LabelId {
        LabelId(self.node_labels.bytes()[node.as_usize()])
    }

    pub fn node_label_names(&self) -> &LabelTable {
        &self.node_label_names
    }

    pub fn edge_label_names(&self) -> &LabelTable {
        &self.edge_label_names
    }

    /// Zero-copy outgoing adjacency view.
    #[inline]
    pub fn out_view(&self, node: NodeId) -> EdgeView<'_> {
        self.out_csr.edges(node)
    }

    /// Zero-copy incoming adjacency view.
    #[inline]
    pub fn in_view(&self, node: NodeId) -> EdgeView<'_> {
        self.in_csr.edges(node)
    }

    pub fn out_csr(&self) -> &CsrHalf {
        &self.out_csr
    }

    pub fn in_csr(&self) -> &CsrHalf {
        &self.in_csr
    }

    pub fn meta(&self) -> Meta {
        self.meta
    }
}

impl Graph for GraphStore {
    fn num_nodes(&self) -> usize {
        self.meta.num_nodes as usize
    }

    fn num_edges(&self) -> usize {
        self.meta.num_edges as usize
    }

    #[inline]
    fn out_edges(&self, node: NodeId) -> Neighbors<'_> {
        let view = self.out_csr.edges(node);
        Neighbors::Borrowed {
            targets: view.targets,
            labels: view.labels,
        }
    }

    #[inline]
    fn in_edges(&self, node: NodeId) -> Neighbors<'_> {
        let view = self.in_csr.edges(node);
        Neighbors::Borrowed {
            targets: view.targets,
            labels: view.labels,
        }
    }
}
