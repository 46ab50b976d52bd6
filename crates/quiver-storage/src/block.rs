//! Block-partitioned CSR for graphs beyond addressable memory.
//!
//! Nodes are partitioned into fixed blocks of [`BLOCK_SIZE`]. Each
//! block carries local out/in offset arrays plus its adjacency for both
//! directions, persisted one file per block. Headers and offset arrays
//! stay uncompressed for random access; adjacency bodies are
//! delta-varint coded and LZ4-compressed.
//!
//! The import path appends edges into per-block builders; when the
//! memory tracker's ceiling would be crossed, builders flush to cold
//! blocks (merging with anything already on disk) and release their
//! buffers.

use std::collections::HashMap;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use quiver_core::{Graph, Neighbors, NodeId};
use thiserror::Error;
use tracing::{debug, error};

use crate::block_cache::{BlockCache, CacheConfig};
use crate::memory::{MemoryError, MemoryTracker};
use crate::varint;

/// Nodes per block.
pub const BLOCK_SIZE: u32 = 65_536;

const BLOCK_MAGIC: &[u8; 4] = b"QBLK";
const OFFSETS_LEN: usize = BLOCK_SIZE as usize + 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 4 + OFFSETS_LEN * 4 * 2;

/// Errors raised by block persistence.
#[derive(Debug, Error)]
pub enum BlockError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("block {block_id}: corrupt file ({reason})")]
    Corrupt { block_id: u32, reason: &'static str },

    #[error("block {1}: {0}")]
    Decompress(lz4_flex::block::DecompressError, u32),

    #[error(transparent)]
    Memory(#[from] MemoryError),
}

// =============================================================================
// Decoded block
// =============================================================================

/// One decoded block: local offsets plus adjacency for both directions.
pub struct Block {
    pub block_id: u32,
    offsets_out: Vec<u32>,
    offsets_in: Vec<u32>,
    targets_out: Vec<u32>,
    labels_out: Vec<u8>,
    targets_in: Vec<u32>,
    labels_in: Vec<u8>,
}

impl Block {
    fn empty(block_id: u32) -> Self {
        Self {
            block_id,
            offsets_out: vec![0; OFFSETS_LEN],
            offsets_in: vec![0; OFFSETS_LEN],
            targets_out: Vec::new(),
            labels_out: Vec::new(),
            targets_in: Vec::new(),
            labels_in: Vec::new(),
        }
    }

    /// Builds a block from raw edge entries `(local_node, target, label)`.
    fn from_entries(
        block_id: u32,
        mut out: Vec<(u32, u32, u8)>,
        mut in_: Vec<(u32, u32, u8)>,
    ) -> Self {
        // Ascending (local, target); stable so parallel edges keep
        // their arrival order. Sorted targets keep the delta coder's
        // runs non-decreasing.
        out.sort_by_key(|&(local, target, _)| (local, target));
        in_.sort_by_key(|&(local, target, _)| (local, target));

        let mut block = Block::empty(block_id);

        for &(local, _, _) in &out {
            block.offsets_out[local as usize + 1] += 1;
        }
        for &(local, _, _) in &in_ {
            block.offsets_in[local as usize + 1] += 1;
        }
        for i in 1..OFFSETS_LEN {
            block.offsets_out[i] += block.offsets_out[i - 1];
            block.offsets_in[i] += block.offsets_in[i - 1];
        }

        block.targets_out = out.iter().map(|&(_, t, _)| t).collect();
        block.labels_out = out.iter().map(|&(_, _, l)| l).collect();
        block.targets_in = in_.iter().map(|&(_, t, _)| t).collect();
        block.labels_in = in_.iter().map(|&(_, _, l)| l).collect();
        block
    }

    /// Flattens the block back into raw edge entries (for merging a
    /// builder flush into an existing cold block).
    fn to_entries(&self) -> (Vec<(u32, u32, u8)>, Vec<(u32, u32, u8)>) {
        let mut out = Vec::with_capacity(self.targets_out.len());
        let mut in_ = Vec::with_capacity(self.targets_in.len());
        for local in 0..BLOCK_SIZE {
            let (targets, labels) = self.out_edges(local);
            for (t, l) in targets.iter().zip(labels) {
                out.push((local, *t, *l));
            }
            let (targets, labels) = self.in_edges(local);
            for (t, l) in targets.iter().zip(labels) {
                in_.push((local, *t, *l));
            }
        }
        (out, in_)
    }

    /// The outgoing adjacency of a block-local node id.
    #[inline]
    pub fn out_edges(&self, local: u32) -> (&[u32], &[u8]) {
        let start = self.offsets_out[local as usize] as usize;
        let end = self.offsets_out[local as usize + 1] as usize;
        (&self.targets_out[start..end], &self.labels_out[start..end])
    }

    /// The incoming adjacency of a block-local node id.
    #[inline]
    pub fn in_edges(&self, local: u32) -> (&[u32], &[u8]) {
        let start = self.offsets_in[local as usize] as usize;
        let end = self.offsets_in[local as usize + 1] as usize;
        (&self.targets_in[start..end], &self.labels_in[start..end])
    }

    pub fn out_edge_count(&self) -> usize {
        self.targets_out.len()
    }

    pub fn in_edge_count(&self) -> usize {
        self.targets_in.len()
    }

    /// Bytes this block occupies while decoded, for cache accounting.
    pub fn heap_bytes(&self) -> usize {
        (self.offsets_out.len() + self.offsets_in.len()) * 4
            + (self.targets_out.len() + self.targets_in.len()) * 4
            + self.labels_out.len()
            + self.labels_in.len()
    }
}

// =============================================================================
// Block persistence
// =============================================================================

/// One directory of cold block files.
pub struct BlockStore {
    dir: PathBuf,
}

impl BlockStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn block_path(&self, block_id: u32) -> PathBuf {
        self.dir.join(format!("block_{block_id}.qblk"))
    }

    /// Persists one block. Header and offset arrays are raw; the
    /// adjacency body is delta-varint coded and LZ4-compressed.
    pub fn save(&self, block: &Block) -> Result<(), BlockError> {
        let mut body = Vec::new();
        for local in 0..BLOCK_SIZE {
            let (targets, _) = block.out_edges(local);
            varint::encode_deltas(targets, &mut body);
        }
        body.extend_from_slice(&block.labels_out);
        for local in 0..BLOCK_SIZE {
            let (targets, _) = block.in_edges(local);
            varint::encode_deltas(targets, &mut body);
        }
        body.extend_from_slice(&block.labels_in);
        let compressed = lz4_flex::compress_prepend_size(&body);

        let mut w = BufWriter::new(fs::File::create(self.block_path(block.block_id))?);
        w.write_all(BLOCK_MAGIC)?;
        w.write_all(&block.block_id.to_le_bytes())?;
        w.write_all(&(block.out_edge_count() as u32).to_le_bytes())?;
        w.write_all(&(block.in_edge_count() as u32).to_le_bytes())?;
        for v in &block.offsets_out {
            w.write_all(&v.to_le_bytes())?;
        }
        for v in &block.offsets_in {
            w.write_all(&v.to_le_bytes())?;
        }
        w.write_all(&compressed)?;
        w.flush()?;

        debug!(
            block_id = block.block_id,
            out_edges = block.out_edge_count(),
            in_edges = block.in_edge_count(),
            "saved cold block"
        );
        Ok(())
    }

    /// Loads and decodes a cold block; `None` if no file exists for
    /// this block id (a block with no edges is never written).
    pub fn load(&self, block_id: u32) -> Result<Option<Block>, BlockError> {
        let path = self.block_path(block_id);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let corrupt = |reason| BlockError::Corrupt { block_id, reason };

        if data.len() < HEADER_LEN {
            return Err(corrupt("shorter than header"));
        }
        if &data[0..4] != BLOCK_MAGIC {
            return Err(corrupt("bad magic"));
        }
        let stored_id = u32::from_le_bytes(data[4..8].try_into().expect("4-byte slice"));
        if stored_id != block_id {
            return Err(corrupt("block id mismatch"));
        }
        let out_count = u32::from_le_bytes(data[8..12].try_into().expect("4-byte slice")) as usize;
        let in_count = u32::from_le_bytes(data[12..16].try_into().expect("4-byte slice")) as usize;

        let mut block = Block::empty(block_id);
        let mut pos = 16;
        for v in block.offsets_out.iter_mut() {
            *v = u32::from_le_bytes(data[pos..pos + 4].try_into().expect("4-byte slice"));
            pos += 4;
        }
        for v in block.offsets_in.iter_mut() {
            *v = u32::from_le_bytes(data[pos..pos + 4].try_into().expect("4-byte slice"));
            pos += 4;
        }
        if block.offsets_out[OFFSETS_LEN - 1] as usize != out_count
            || block.offsets_in[OFFSETS_LEN - 1] as usize != in_count
        {
            return Err(corrupt("offsets disagree with edge counts"));
        }

        let body = lz4_flex::decompress_size_prepended(&data[pos..])
            .map_err(|e| BlockError::Decompress(e, block_id))?;

        let mut body_pos = 0;
        block.targets_out.reserve(out_count);
        for local in 0..OFFSETS_LEN - 1 {
            let run = (block.offsets_out[local + 1] - block.offsets_out[local]) as usize;
            varint::decode_deltas(&body, &mut body_pos, run, &mut block.targets_out)
                .ok_or_else(|| corrupt("truncated out-neighbor deltas"))?;
        }
        if body.len() < body_pos + out_count {
            return Err(corrupt("truncated out labels"));
        }
        block
            .labels_out
            .extend_from_slice(&body[body_pos..body_pos + out_count]);
        body_pos += out_count;

        block.targets_in.reserve(in_count);
        for local in 0..OFFSETS_LEN - 1 {
            let run = (block.offsets_in[local + 1] - block.offsets_in[local]) as usize;
            varint::decode_deltas(&body, &mut body_pos, run, &mut block.targets_in)
                .ok_or_else(|| corrupt("truncated in-neighbor deltas"))?;
        }
        if body.len() < body_pos + in_count {
            return Err(corrupt("truncated in labels"));
        }
        block
            .labels_in
            .extend_from_slice(&body[body_pos..body_pos + in_count]);

        Ok(Some(block))
    }
}

// =============================================================================
// Import-side builder
// =============================================================================

#[derive(Default)]
struct PendingBlock {
    out: Vec<(u32, u32, u8)>,
    in_: Vec<(u32, u32, u8)>,
}

/// Accumulates edges into per-block buffers, spilling to cold blocks
/// whenever the memory tracker's ceiling would be crossed.
pub struct BlockedGraphBuilder {
    store: BlockStore,
    pending: HashMap<u32, PendingBlock>,
    tracker: MemoryTracker,
    tracked_bytes: usize,
}

const ENTRY_BYTES: usize = std::mem::size_of::<(u32, u32, u8)>();

impl BlockedGraphBuilder {
    /// Creates the block directory and an empty builder.
    pub fn create(dir: &Path, tracker: MemoryTracker) -> Result<Self, BlockError> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            store: BlockStore::new(dir),
            pending: HashMap::new(),
            tracker,
            tracked_bytes: 0,
        })
    }

    /// Buffers one edge: an out-entry in the source's block and an
    /// in-entry in the destination's block.
    pub fn add_edge(&mut self, src: u32, dst: u32, label: u8) -> Result<(), BlockError> {
        if self.tracker.try_allocate(2 * ENTRY_BYTES).is_err() {
            self.flush_cold()?;
            self.tracker.try_allocate(2 * ENTRY_BYTES)?;
        }
        self.tracked_bytes += 2 * ENTRY_BYTES;

        self.pending
            .entry(src / BLOCK_SIZE)
            .or_default()
            .out
            .push((src % BLOCK_SIZE, dst, label));
        self.pending
            .entry(dst / BLOCK_SIZE)
            .or_default()
            .in_
            .push((dst % BLOCK_SIZE, src, label));
        Ok(())
    }

    /// Flushes every pending buffer to its cold block, merging with
    /// anything previously flushed, and releases the buffers.
    pub fn flush_cold(&mut self) -> Result<(), BlockError> {
        let pending = std::mem::take(&mut self.pending);
        for (block_id, buffered) in pending {
            let (mut out, mut in_) = match self.store.load(block_id)? {
                Some(existing) => existing.to_entries(),
                None => (Vec::new(), Vec::new()),
            };
            out.extend_from_slice(&buffered.out);
            in_.extend_from_slice(&buffered.in_);
            self.store.save(&Block::from_entries(block_id, out, in_))?;
        }
        self.tracker.deallocate(self.tracked_bytes);
        self.tracked_bytes = 0;
        Ok(())
    }

    /// Flushes any remaining buffers and finishes the build.
    pub fn finish(mut self) -> Result<(), BlockError> {
        self.flush_cold()
    }
}

// =============================================================================
// Cache-backed graph
// =============================================================================

/// The block store behind a hot cache, exposed through the same
/// [`Graph`] trait as the memory-mapped CSR.
pub struct BlockedGraph {
    store: BlockStore,
    cache: BlockCache,
    num_nodes: usize,
    num_edges: usize,
}

impl BlockedGraph {
    pub fn open(dir: &Path, num_nodes: usize, num_edges: usize, config: CacheConfig) -> Self {
        Self {
            store: BlockStore::new(dir),
            cache: BlockCache::new(config),
            num_nodes,
            num_edges,
        }
    }

    pub fn cache(&self) -> &BlockCache {
        &self.cache
    }

    fn block(&self, block_id: u32) -> Option<Arc<Block>> {
        match self.cache.get_or_load(block_id, &self.store) {
            Ok(block) => block,
            Err(e) => {
                // A cold-block fault during a query degrades to an
                // empty adjacency rather than poisoning the traversal.
                error!(block_id, error = %e, "cold block load failed");
                None
            }
        }
    }

    fn edges(&self, node: NodeId, out: bool) -> Neighbors<'_> {
        if node.as_usize() >= self.num_nodes {
            return Neighbors::Owned(Vec::new());
        }
        let block_id = node.as_u32() / BLOCK_SIZE;
        let local = node.as_u32() % BLOCK_SIZE;
        match self.block(block_id) {
            Some(block) => {
                let (targets, labels) = if out {
                    block.out_edges(local)
                } else {
                    block.in_edges(local)
                };
                Neighbors::Owned(
                    targets
                        .iter()
                        .zip(labels)
                        .map(|(&t, &l)| (t, l))
                        .collect(),
                )
            }
            None => Neighbors::Owned(Vec::new()),
        }
    }
}

impl Graph for BlockedGraph {
    fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    fn num_edges(&self) -> usize {
        self.num_edges
    }

    fn out_edges(&self, node: NodeId) -> Neighbors<'_> {
        self.edges(node, true)
    }

    fn in_edges(&self, node: NodeId) -> Neighbors<'_> {
        self.edges(node, false)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_block_roundtrip() {
        let dir = tempdir().unwrap();
        let store = BlockStore::new(dir.path());

        let block = Block::from_entries(
            0,
            vec![(0, 1, 9), (0, 2, 8), (5, 1, 7)],
            vec![(1, 0, 9), (1, 5, 7), (2, 0, 8)],
        );
        store.save(&block).unwrap();

        let loaded = store.load(0).unwrap().unwrap();
        assert_eq!(loaded.out_edge_count(), 3);
        assert_eq!(loaded.in_edge_count(), 3);
        assert_eq!(loaded.out_edges(0), (&[1u32, 2][..], &[9u8, 8][..]));
        assert_eq!(loaded.out_edges(5), (&[1u32][..], &[7u8][..]));
        assert_eq!(loaded.in_edges(1), (&[0u32, 5][..], &[9u8, 7][..]));
        assert_eq!(loaded.out_edges(100), (&[][..], &[][..]));
    }

    #[test]
    fn test_missing_block_is_none() {
        let dir = tempdir().unwrap();
        let store = BlockStore::new(dir.path());
        assert!(store.load(42).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_block_is_fatal() {
        let dir = tempdir().unwrap();
        let store = BlockStore::new(dir.path());
        fs::write(dir.path().join("block_3.qblk"), b"not a block").unwrap();

        assert!(matches!(
            store.load(3),
            Err(BlockError::Corrupt { block_id: 3, .. })
        ));
    }

    #[test]
    fn test_builder_spans_blocks() {
        let dir = tempdir().unwrap();
        let mut builder =
            BlockedGraphBuilder::create(dir.path(), MemoryTracker::unlimited()).unwrap();

        // One edge inside block 0, one crossing into block 1.
        builder.add_edge(1, 2, 0).unwrap();
        builder.add_edge(1, BLOCK_SIZE + 5, 1).unwrap();
        builder.finish().unwrap();

        let store = BlockStore::new(dir.path());
        let b0 = store.load(0).unwrap().unwrap();
        assert_eq!(b0.out_edges(1), (&[2u32, BLOCK_SIZE + 5][..], &[0u8, 1][..]));
        assert_eq!(b0.in_edges(2), (&[1u32][..], &[0u8][..]));

        let b1 = store.load(1).unwrap().unwrap();
        assert_eq!(b1.out_edge_count(), 0);
        assert_eq!(b1.in_edges(5), (&[1u32][..], &[1u8][..]));
    }

    #[test]
    fn test_builder_merges_across_flushes() {
        let dir = tempdir().unwrap();
        let mut builder =
            BlockedGraphBuilder::create(dir.path(), MemoryTracker::unlimited()).unwrap();

        builder.add_edge(0, 1, 0).unwrap();
        builder.flush_cold().unwrap();
        builder.add_edge(0, 2, 0).unwrap();
        builder.finish().unwrap();

        let store = BlockStore::new(dir.path());
        let block = store.load(0).unwrap().unwrap();
        assert_eq!(block.out_edges(0).0, &[1, 2]);
    }

    #[test]
    fn test_blocked_graph_adjacency() {
        let dir = tempdir().unwrap();
        let mut builder =
            BlockedGraphBuilder::create(dir.path(), MemoryTracker::unlimited()).unwrap();
        builder.add_edge(0, 1, 4).unwrap();
        builder.add_edge(1, 0, 5).unwrap();
        builder.finish().unwrap();

        let graph = BlockedGraph::open(dir.path(), 2, 2, CacheConfig::default());
        let out: Vec<_> = graph.out_edges(NodeId(0)).iter().collect();
        assert_eq!(out, vec![(NodeId(1), quiver_core::LabelId(4))]);
        let in_: Vec<_> = graph.in_edges(NodeId(0)).iter().collect();
        assert_eq!(in_, vec![(NodeId(1), quiver_core::LabelId(5))]);

        // Second access hits the cache.
        let _ = graph.out_edges(NodeId(0));
        assert!(graph.cache().stats().hits >= 1);
    }
}
