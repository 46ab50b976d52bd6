//! Two-pass CSV importer.
//!
//! Consumes an edge list with a header line and records of the form
//! `src_id,src_label,dst_id,dst_label,edge_label`, and produces one
//! artifact directory (see [`crate::artifact`]). Records with fewer
//! than five fields are skipped with a warning; everything else that
//! goes wrong aborts the import before any artifact becomes visible.
//!
//! Pass 1 assigns dense internal ids in order of first occurrence and
//! interns labels. Pass 2 builds the forward CSR; the reverse CSR is a
//! transpose over it. Within a source, neighbors are sorted ascending
//! by destination, which keeps set intersections over adjacency slices
//! cache-friendly; multi-edges are preserved.

use std::collections::HashMap;
use std::io;
use std::path::Path;

use csv::ReaderBuilder;
use thiserror::Error;
use tracing::{info, warn};

use crate::artifact::{self, ArtifactError, Meta, Staging};
use crate::block::{BlockError, BlockedGraphBuilder};
use crate::labels::{LabelError, LabelTable};
use crate::memory::MemoryTracker;
use crate::registry::{self, RegistryError};

/// Errors that abort an import.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Label(#[from] LabelError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Block(#[from] BlockError),

    #[error("node count {0} exceeds the 32-bit id space")]
    TooManyNodes(u64),

    #[error("edge count {0} exceeds the 32-bit offset space")]
    TooManyEdges(u64),
}

/// Importer options.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// Also produce block artifacts under `<artifact>/blocks` for the
    /// block-cached backend.
    pub build_blocks: bool,
    /// Memory ceiling for block builders in megabytes (0 = unlimited).
    /// When a buffered edge would cross it, builders flush to cold
    /// blocks and release their buffers.
    pub memory_limit_mb: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            build_blocks: false,
            memory_limit_mb: 0,
        }
    }
}

impl ImportConfig {
    /// Loads configuration from environment variables with defaults.
    ///
    /// - `QUIVER_IMPORT_BLOCKS`: set to `true`/`1` to build block artifacts
    /// - `QUIVER_IMPORT_MEMORY_MB`: block-builder memory ceiling
    pub fn from_env() -> Self {
        Self {
            build_blocks: std::env::var("QUIVER_IMPORT_BLOCKS")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            memory_limit_mb: std::env::var("QUIVER_IMPORT_MEMORY_MB")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
        }
    }
}

/// Counters reported by a successful import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportStats {
    pub num_nodes: u64,
    pub num_edges: u64,
    pub skipped_lines: u64,
    pub node_labels: usize,
    pub edge_labels: usize,
}

struct ParsedRecord<'a> {
    src_id: &'a str,
    src_label: &'a str,
    dst_id: &'a str,
    dst_label: &'a str,
    edge_label: &'a str,
}

fn parse_record(record: &csv::StringRecord) -> Option<ParsedRecord<'_>> {
    if record.len() < 5 {
        return None;
    }
    Some(ParsedRecord {
        src_id: &record[0],
        src_label: &record[1],
        dst_id: &record[2],
        dst_label: &record[3],
        edge_label: &record[4],
    })
}

fn open_reader(input: &Path) -> Result<csv::Reader<std::fs::File>, ImportError> {
    Ok(ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(input)?)
}

struct Pass1 {
    ids: HashMap<String, u32>,
    node_labels: Vec<u8>,
    node_table: LabelTable,
    edge_table: LabelTable,
    skipped: u64,
}

/// Pass 1: identifier and label collection.
fn collect_ids(input: &Path) -> Result<Pass1, ImportError> {
    let mut state = Pass1 {
        ids: HashMap::new(),
        node_labels: Vec::new(),
        node_table: LabelTable::new(),
        edge_table: LabelTable::new(),
        skipped: 0,
    };

    let mut reader = open_reader(input)?;
    for result in reader.records() {
        let record = result?;
        let Some(parsed) = parse_record(&record) else {
            state.skipped += 1;
            warn!(
                line = record.position().map(|p| p.line()).unwrap_or(0),
                "skipping record with fewer than 5 fields"
            );
            continue;
        };

        let src_label = state.node_table.intern(parsed.src_label)?;
        let dst_label = state.node_table.intern(parsed.dst_label)?;
        state.edge_table.intern(parsed.edge_label)?;

        // A node's label is fixed at first sight of its external id.
        if !state.ids.contains_key(parsed.src_id) {
            let id = state.ids.len() as u32;
            state.ids.insert(parsed.src_id.to_string(), id);
            state.node_labels.push(src_label.as_u8());
        }
        if !state.ids.contains_key(parsed.dst_id) {
            let id = state.ids.len() as u32;
            state.ids.insert(parsed.dst_id.to_string(), id);
            state.node_labels.push(dst_label.as_u8());
        }
    }

    if state.ids.len() as u64 > u64::from(u32::MAX) {
        return Err(ImportError::TooManyNodes(state.ids.len() as u64));
    }
    Ok(state)
}

/// Pass 2: forward CSR construction.
fn build_forward_csr(
    input: &Path,
    state: &Pass1,
) -> Result<(Vec<u32>, Vec<u32>, Vec<u8>), ImportError> {
    let num_nodes = state.ids.len();
    let mut adjacency: Vec<Vec<(u32, u8)>> = vec![Vec::new(); num_nodes];
    let mut num_edges: u64 = 0;

    let mut reader = open_reader(input)?;
    for result in reader.records() {
        let record = result?;
        let Some(parsed) = parse_record(&record) else {
            continue;
        };

        // Every well-formed record was registered in pass 1; a miss
        // means the input changed between passes.
        let (Some(&src), Some(&dst)) = (
            state.ids.get(parsed.src_id),
            state.ids.get(parsed.dst_id),
        ) else {
            warn!(
                line = record.position().map(|p| p.line()).unwrap_or(0),
                "record refers to an id unseen in pass 1; input changed mid-import"
            );
            continue;
        };
        let Some(label) = state.edge_table.get(parsed.edge_label) else {
            continue;
        };

        adjacency[src as usize].push((dst, label.as_u8()));
        num_edges += 1;
    }

    if num_edges > u64::from(u32::MAX) {
        return Err(ImportError::TooManyEdges(num_edges));
    }

    let mut out_offsets = Vec::with_capacity(num_nodes + 1);
    out_offsets.push(0u32);
    let mut total = 0u32;
    for list in &mut adjacency {
        // Ascending destinations; stable, so parallel edges keep their
        // arrival order.
        list.sort_by_key(|&(dst, _)| dst);
        total += list.len() as u32;
        out_offsets.push(total);
    }

    let mut out_neighbors = Vec::with_capacity(num_edges as usize);
    let mut out_edge_labels = Vec::with_capacity(num_edges as usize);
    for list in &adjacency {
        for &(dst, label) in list {
            out_neighbors.push(dst);
            out_edge_labels.push(label);
        }
    }

    Ok((out_offsets, out_neighbors, out_edge_labels))
}

/// Builds the reverse CSR from the forward one.
///
/// In-degree count, prefix sum, then a scatter that reuses the degree
/// array as per-node cursors. O(N + M) with one length-N allocation.
pub fn transpose(
    num_nodes: usize,
    out_offsets: &[u32],
    out_neighbors: &[u32],
    out_edge_labels: &[u8],
) -> (Vec<u32>, Vec<u32>, Vec<u8>) {
    let num_edges = out_neighbors.len();

    let mut in_degree = vec![0u32; num_nodes];
    for &v in out_neighbors {
        in_degree[v as usize] += 1;
    }

    let mut in_offsets = Vec::with_capacity(num_nodes + 1);
    in_offsets.push(0u32);
    for node in 0..num_nodes {
        in_offsets.push(in_offsets[node] + in_degree[node]);
    }

    let mut in_neighbors = vec![0u32; num_edges];
    let mut in_edge_labels = vec![0u8; num_edges];
    let cursor = &mut in_degree;
    cursor.fill(0);

    for u in 0..num_nodes {
        let start = out_offsets[u] as usize;
        let end = out_offsets[u + 1] as usize;
        for i in start..end {
            let v = out_neighbors[i] as usize;
            let pos = (in_offsets[v] + cursor[v]) as usize;
            in_neighbors[pos] = u as u32;
            in_edge_labels[pos] = out_edge_labels[i];
            cursor[v] += 1;
        }
    }

    (in_offsets, in_neighbors, in_edge_labels)
}

/// Runs a full import of `input` into the artifact directory `dest`.
///
/// The destination must not exist; artifacts are staged next to it and
/// renamed into place only after every file has been written.
pub fn import(input: &Path, dest: &Path, config: &ImportConfig) -> Result<ImportStats, ImportError> {
    info!(input = %input.display(), dest = %dest.display(), "starting import");
    let staging = Staging::create(dest)?;

    // Pass 1: ids and labels.
    let state = collect_ids(input)?;
    let num_nodes = state.ids.len();
    info!(nodes = num_nodes, skipped = state.skipped, "pass 1 complete");

    // Registry: hash, sort, reject collisions.
    let mut pairs: Vec<(u64, u32)> = state
        .ids
        .iter()
        .map(|(external, &id)| (registry::hash_external_id(external), id))
        .collect();
    registry::sort_and_check(&mut pairs)?;
    let hashes: Vec<u64> = pairs.iter().map(|&(h, _)| h).collect();
    let internal_ids: Vec<u32> = pairs.iter().map(|&(_, id)| id).collect();

    // Pass 2: forward CSR, then its transpose.
    let (out_offsets, out_neighbors, out_edge_labels) = build_forward_csr(input, &state)?;
    let num_edges = out_neighbors.len() as u64;
    info!(edges = num_edges, "pass 2 complete");

    let (in_offsets, in_neighbors, in_edge_labels) =
        transpose(num_nodes, &out_offsets, &out_neighbors, &out_edge_labels);

    // Write everything into the staging directory.
    let meta = Meta {
        num_nodes: num_nodes as u64,
        num_edges,
    };
    meta.write(staging.dir())?;

    artifact::write_u64s(&staging.path(artifact::ID_HASHES), &hashes)?;
    artifact::write_u32s(&staging.path(artifact::ID_INTERNAL_IDS), &internal_ids)?;

    artifact::write_u32s(&staging.path(artifact::OUT_OFFSETS), &out_offsets)?;
    artifact::write_u32s(&staging.path(artifact::OUT_NEIGHBORS), &out_neighbors)?;
    artifact::write_u8s(&staging.path(artifact::OUT_EDGE_LABELS), &out_edge_labels)?;

    artifact::write_u32s(&staging.path(artifact::IN_OFFSETS), &in_offsets)?;
    artifact::write_u32s(&staging.path(artifact::IN_NEIGHBORS), &in_neighbors)?;
    artifact::write_u8s(&staging.path(artifact::IN_EDGE_LABELS), &in_edge_labels)?;

    artifact::write_u8s(&staging.path(artifact::NODE_LABELS), &state.node_labels)?;
    state
        .node_table
        .write(&staging.path(artifact::NODE_LABEL_STRINGS))?;
    state
        .edge_table
        .write(&staging.path(artifact::EDGE_LABEL_STRINGS))?;

    if config.build_blocks {
        let blocks_dir = staging.path(artifact::BLOCKS_DIR);
        let tracker = MemoryTracker::new(config.memory_limit_mb, 90.0);
        let mut builder = BlockedGraphBuilder::create(&blocks_dir, tracker)?;
        for u in 0..num_nodes {
            let start = out_offsets[u] as usize;
            let end = out_offsets[u + 1] as usize;
            for i in start..end {
                builder.add_edge(u as u32, out_neighbors[i], out_edge_labels[i])?;
            }
        }
        builder.finish()?;
        info!("block artifacts written");
    }

    staging.publish(dest)?;
    info!(dest = %dest.display(), "import published");

    Ok(ImportStats {
        num_nodes: num_nodes as u64,
        num_edges,
        skipped_lines: state.skipped,
        node_labels: state.node_table.len(),
        edge_labels: state.edge_table.len(),
    })
}
