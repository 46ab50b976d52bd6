//! Artifact directory layout and low-level file codecs.
//!
//! One import produces one artifact directory. All files are
//! little-endian and written through a staging directory that is
//! renamed into place on success, so a failed import never leaves a
//! partially written artifact behind.
//!
//! # Layout
//!
//! ```text
//! meta.bin                 2 x u64: node count N, edge count M
//! id_hashes.bin            N x u64, sorted ascending
//! id_internal_ids.bin      N x u32, parallel to id_hashes.bin
//! out_offsets.bin          (N+1) x u32
//! out_neighbors.bin        M x u32
//! out_edge_labels.bin      M x u8
//! in_offsets.bin ...       as above for the reverse CSR
//! node_labels.bin          N x u8
//! node_label_strings.txt   one label per line, line index = label id
//! edge_label_strings.txt   one label per line, line index = label id
//! ```

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use thiserror::Error;

pub const META: &str = "meta.bin";
pub const ID_HASHES: &str = "id_hashes.bin";
pub const ID_INTERNAL_IDS: &str = "id_internal_ids.bin";
pub const OUT_OFFSETS: &str = "out_offsets.bin";
pub const OUT_NEIGHBORS: &str = "out_neighbors.bin";
pub const OUT_EDGE_LABELS: &str = "out_edge_labels.bin";
pub const IN_OFFSETS: &str = "in_offsets.bin";
pub const IN_NEIGHBORS: &str = "in_neighbors.bin";
pub const IN_EDGE_LABELS: &str = "in_edge_labels.bin";
pub const NODE_LABELS: &str = "node_labels.bin";
pub const NODE_LABEL_STRINGS: &str = "node_label_strings.txt";
pub const EDGE_LABEL_STRINGS: &str = "edge_label_strings.txt";
pub const BLOCKS_DIR: &str = "blocks";

/// Errors raised while reading or publishing artifact files.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("{file}: expected {expected} bytes, found {actual}")]
    SizeMismatch {
        file: String,
        expected: u64,
        actual: u64,
    },

    #[error("artifact directory already exists: {0}")]
    DirectoryExists(PathBuf),

    #[error("artifact directory has no parent: {0}")]
    NoParent(PathBuf),
}

// =============================================================================
// Meta record
// =============================================================================

/// Node and edge counts for one artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Meta {
    pub num_nodes: u64,
    pub num_edges: u64,
}

impl Meta {
    /// Reads `meta.bin` from an artifact directory.
    pub fn read(dir: &Path) -> Result<Self, ArtifactError> {
        let path = dir.join(META);
        let mut file = File::open(&path)?;
        let mut buf = [0u8; 16];
        if let Err(e) = file.read_exact(&mut buf) {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                return Err(ArtifactError::SizeMismatch {
                    file: META.to_string(),
                    expected: 16,
                    actual: file.metadata().map(|m| m.len()).unwrap_or(0),
                });
            }
            return Err(e.into());
        }
        Ok(Self {
            num_nodes: u64::from_le_bytes(buf[0..8].try_into().expect("8-byte slice")),
            num_edges: u64::from_le_bytes(buf[8..16].try_into().expect("8-byte slice")),
        })
    }

    /// Writes `meta.bin` into a directory (usually the staging dir).
    pub fn write(&self, dir: &Path) -> Result<(), ArtifactError> {
        let mut file = File::create(dir.join(META))?;
        file.write_all(&self.num_nodes.to_le_bytes())?;
        file.write_all(&self.num_edges.to_le_bytes())?;
        Ok(())
    }
}

// =============================================================================
// Binary array writers
// =============================================================================

/// Writes a u32 array as little-endian bytes.
pub fn write_u32s(path: &Path, values: &[u32]) -> io::Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    for v in values {
        w.write_all(&v.to_le_bytes())?;
    }
    w.flush()
}

/// Writes a u64 array as little-endian bytes.
pub fn write_u64s(path: &Path, values: &[u64]) -> io::Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    for v in values {
        w.write_all(&v.to_le_bytes())?;
    }
    w.flush()
}

/// Writes a byte array.
pub fn write_u8s(path: &Path, values: &[u8]) -> io::Result<()> {
    fs::write(path, values)
}

// =============================================================================
// Read-only mappings
// =============================================================================

/// A read-only memory-mapped artifact file.
///
/// Zero-length files are represented without a mapping because mapping
/// an empty file is an error on several platforms; an empty artifact
/// (header-only import) is valid.
pub struct MappedFile {
    mmap: Option<Mmap>,
}

impl MappedFile {
    /// Opens and maps a file read-only, validating its exact size.
    pub fn open(path: &Path, expected_bytes: u64) -> Result<Self, ArtifactError> {
        let file = File::open(path)?;
        let actual = file.metadata()?.len();
        if actual != expected_bytes {
            return Err(ArtifactError::SizeMismatch {
                file: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string()),
                expected: expected_bytes,
                actual,
            });
        }
        let mmap = if actual == 0 {
            None
        } else {
            // SAFETY: the mapping is read-only and the artifact is
            // write-once; no other process mutates it after publish.
            Some(unsafe { Mmap::map(&file)? })
        };
        Ok(Self { mmap })
    }

    /// The mapped bytes (empty slice for a zero-length file).
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or(&[])
    }

    /// Reinterprets the mapping as little-endian u32 values.
    #[inline]
    pub fn as_u32s(&self) -> &[u32] {
        let bytes = self.bytes();
        if bytes.is_empty() {
            return &[];
        }
        debug_assert_eq!(bytes.len() % 4, 0);
        debug_assert_eq!(bytes.as_ptr() as usize % std::mem::align_of::<u32>(), 0);
        // SAFETY: mmap regions are page-aligned, the length is validated
        // to be a multiple of 4 at open, and artifact files are
        // little-endian (quiver targets little-endian hosts).
        unsafe { std::slice::from_raw_parts(bytes.as_ptr() as *const u32, bytes.len() / 4) }
    }

    /// Reinterprets the mapping as little-endian u64 values.
    #[inline]
    pub fn as_u64s(&self) -> &[u64] {
        let bytes = self.bytes();
        if bytes.is_empty() {
            return &[];
        }
        debug_assert_eq!(bytes.len() % 8, 0);
        debug_assert_eq!(bytes.as_ptr() as usize % std::mem::align_of::<u64>(), 0);
        // SAFETY: same as `as_u32s`, with 8-byte stride.
        unsafe { std::slice::from_raw_parts(bytes.as_ptr() as *const u64, bytes.len() / 8) }
    }
}

// =============================================================================
// Staged publication
// =============================================================================

/// A staging directory for one import.
///
/// Artifacts are written next to the final destination and renamed into
/// place by [`Staging::publish`]. Dropping an unpublished staging
/// directory removes it together with everything written inside.
pub struct Staging {
    dir: PathBuf,
    published: bool,
}

impl Staging {
    /// Creates a staging directory as a sibling of `dest`.
    ///
    /// Fails up front if `dest` already exists: artifacts are
    /// write-once and never overwritten.
    pub fn create(dest: &Path) -> Result<Self, ArtifactError> {
        if dest.exists() {
            return Err(ArtifactError::DirectoryExists(dest.to_path_buf()));
        }
        // A bare relative destination stages in the working directory.
        let parent = match dest.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            Some(_) => PathBuf::from("."),
            None => return Err(ArtifactError::NoParent(dest.to_path_buf())),
        };
        fs::create_dir_all(&parent)?;

        let name = dest
            .file_name()
            .ok_or_else(|| ArtifactError::NoParent(dest.to_path_buf()))?;
        let dir = parent.join(format!(
            ".{}.staging-{}",
            name.to_string_lossy(),
            std::process::id()
        ));
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir(&dir)?;
        Ok(Self {
            dir,
            published: false,
        })
    }

    /// Path of a file inside the staging directory.
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// The staging directory itself.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Atomically renames the staging directory to `dest`.
    pub fn publish(mut self, dest: &Path) -> Result<(), ArtifactError> {
        if dest.exists() {
            return Err(ArtifactError::DirectoryExists(dest.to_path_buf()));
        }
        fs::rename(&self.dir, dest)?;
        self.published = true;
        Ok(())
    }
}

impl Drop for Staging {
    fn drop(&mut self) {
        if !self.published {
            let _ = fs::remove_dir_all(&self.dir);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
