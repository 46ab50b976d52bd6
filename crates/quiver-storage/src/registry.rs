//! External-to-internal identifier registry.
//!
//! External string ids map to dense u32 internal ids through two
//! parallel memory-mapped arrays sorted by the XXH3-64 hash of the
//! external id: `id_hashes.bin` and `id_internal_ids.bin`. Lookup is an
//! allocation-free binary search, O(log N).
//!
//! The hash function is fixed across build and lookup: the same bytes
//! always produce the same hash. The importer rejects hash collisions
//! between distinct external ids, so a valid artifact holds strictly
//! increasing hashes and every registered id resolves unambiguously.

use std::path::Path;

use quiver_core::NodeId;
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

use crate::artifact::{self, ArtifactError, MappedFile};

/// Errors raised while building or loading the registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error("hash collision between external ids (hash {hash:#018x}, internal ids {first} and {second})")]
    HashCollision { hash: u64, first: u32, second: u32 },
}

/// Hashes an external id the way the registry stores it.
#[inline]
pub fn hash_external_id(external: &str) -> u64 {
    xxh3_64(external.as_bytes())
}

/// Sorts `(hash, internal_id)` pairs ascending by hash and rejects
/// duplicate hashes between distinct external ids.
///
/// Called by the importer before writing the registry files.
pub fn sort_and_check(pairs: &mut [(u64, u32)]) -> Result<(), RegistryError> {
    pairs.sort_unstable();
    for window in pairs.windows(2) {
        if window[0].0 == window[1].0 {
            return Err(RegistryError::HashCollision {
                hash: window[0].0,
                first: window[0].1,
                second: window[1].1,
            });
        }
    }
    Ok(())
}

/// Read-only view over the registry files of one artifact.
pub struct IdRegistry {
    hashes: MappedFile,
    internal_ids: MappedFile,
    len: usize,
}

impl IdRegistry {
    /// Opens and maps the registry files, validating their sizes
    /// against the node count from the meta record.
    pub fn load(dir: &Path, num_nodes: u64) -> Result<Self, RegistryError> {
        let hashes = MappedFile::open(&dir.join(artifact::ID_HASHES), num_nodes * 8)?;
        let internal_ids = MappedFile::open(&dir.join(artifact::ID_INTERNAL_IDS), num_nodes * 4)?;
        Ok(Self {
            hashes,
            internal_ids,
            len: num_nodes as usize,
        })
    }

    /// Resolves an external id to its internal id.
    ///
    /// O(log N) and allocation-free. Returns `None` when the id was
    /// never registered.
    pub fn lookup(&self, external: &str) -> Option<NodeId> {
        let hash = hash_external_id(external);
        let hashes = self.hashes.as_u64s();
        let idx = hashes.binary_search(&hash).ok()?;
        Some(NodeId(self.internal_ids.as_u32s()[idx]))
    }

    /// Number of registered ids.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{write_u32s, write_u64s};
    use tempfile::tempdir;

    fn write_registry(dir: &Path, externals: &[&str]) {
        let mut pairs: Vec<(u64, u32)> = externals
            .iter()
            .enumerate()
            .map(|(i, ext)| (hash_external_id(ext), i as u32))
            .collect();
        sort_and_check(&mut pairs).unwrap();

        let hashes: Vec<u64> = pairs.iter().map(|&(h, _)| h).collect();
        let ids: Vec<u32> = pairs.iter().map(|&(_, id)| id).collect();
        write_u64s(&dir.join(artifact::ID_HASHES), &hashes).unwrap();
        write_u32s(&dir.join(artifact::ID_INTERNAL_IDS), &ids).unwrap();
    }

    #[test]
    fn test_lookup_roundtrip() {
        let dir = tempdir().unwrap();
        let externals = ["alice", "bob", "carol"];
        write_registry(dir.path(), &externals);

        let registry = IdRegistry::load(dir.path(), 3).unwrap();
        assert_eq!(registry.len(), 3);
        for (i, ext) in externals.iter().enumerate() {
            assert_eq!(registry.lookup(ext), Some(NodeId(i as u32)));
        }
        assert_eq!(registry.lookup("dave"), None);
    }

    #[test]
    fn test_lookup_many() {
        let dir = tempdir().unwrap();
        let externals: Vec<String> = (0..1000).map(|i| format!("n{i}")).collect();
        let refs: Vec<&str> = externals.iter().map(String::as_str).collect();
        write_registry(dir.path(), &refs);

        let registry = IdRegistry::load(dir.path(), 1000).unwrap();
        for (i, ext) in externals.iter().enumerate() {
            assert_eq!(registry.lookup(ext), Some(NodeId(i as u32)), "id {ext}");
        }
    }

    #[test]
    fn test_empty_registry() {
        let dir = tempdir().unwrap();
        write_registry(dir.path(), &[]);

        let registry = IdRegistry::load(dir.path(), 0).unwrap();
        assert!(registry.is_empty());
        assert_eq!(registry.lookup("anything"), None);
    }

    #[test]
    fn test_size_mismatch_is_fatal() {
        let dir = tempdir().unwrap();
        write_registry(dir.path(), &["a", "b"]);

        assert!(matches!(
            IdRegistry::load(dir.path(), 3),
            Err(RegistryError::Artifact(ArtifactError::SizeMismatch { .. }))
        ));
    }

    #[test]
    fn test_collision_detection() {
        let mut pairs = vec![(7u64, 0u32), (7u64, 1u32), (9u64, 2u32)];
        assert!(matches!(
            sort_and_check(&mut pairs),
            Err(RegistryError::HashCollision { hash: 7, .. })
        ));

        let mut ok = vec![(9u64, 2u32), (7u64, 0u32), (8u64, 1u32)];
        sort_and_check(&mut ok).unwrap();
        assert_eq!(ok, vec![(7, 0), (8, 1), (9, 2)]);
    }

    #[test]
    fn test_hash_is_stable() {
        assert_eq!(hash_external_id("n42"), hash_external_id("n42"));
        assert_ne!(hash_external_id("n42"), hash_external_id("n43"));
    }
}
