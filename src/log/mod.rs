//! Commit Log Module
//!
//! Append-only, offset-addressed record storage. A log is a list of
//! segments; each segment pairs a store file of length-prefixed frames
//! with a memory-mapped index of fixed-width entries.

pub mod record;
mod store;
mod index;
mod segment;
mod manager;

pub use record::{BincodeCodec, Record, RecordCodec};
pub use store::Store;
pub use index::{Index, IndexRead};
pub use segment::{Segment, SegmentInfo};
pub use manager::Log;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Width of the big-endian length prefix in front of every store frame
pub const LEN_WIDTH: u64 = 8;

/// Width of the relative offset field of an index entry
pub const OFF_WIDTH: u64 = 4;

/// Width of the store position field of an index entry
pub const POS_WIDTH: u64 = 8;

/// Width of one index entry; entry `i` starts at `i * ENTRY_WIDTH`
pub const ENTRY_WIDTH: u64 = OFF_WIDTH + POS_WIDTH;

const STORE_EXTENSION: &str = "store";
const INDEX_EXTENSION: &str = "index";

/// Log directory structure
#[derive(Debug, Clone)]
pub struct LogPaths {
    pub base_dir: PathBuf,
}

impl LogPaths {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get path for the store file of a segment
    pub fn store_path(&self, base_offset: u64) -> PathBuf {
        self.base_dir.join(format!("{}.{}", base_offset, STORE_EXTENSION))
    }

    /// Get path for the index file of a segment
    pub fn index_path(&self, base_offset: u64) -> PathBuf {
        self.base_dir.join(format!("{}.{}", base_offset, INDEX_EXTENSION))
    }

    /// Ensure log directory exists
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.base_dir)
    }

    /// Base offsets of every segment with a store or index file, ascending
    pub fn list_base_offsets(&self) -> std::io::Result<Vec<u64>> {
        list_base_offsets(&self.base_dir)
    }
}

/// List the base offsets of all segment files in a directory
pub fn list_base_offsets(dir: &Path) -> std::io::Result<Vec<u64>> {
    let mut offsets = BTreeSet::new();

    if !dir.exists() {
        return Ok(Vec::new());
    }

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_segment_file = path
            .extension()
            .map_or(false, |ext| ext == STORE_EXTENSION || ext == INDEX_EXTENSION);
        if !is_segment_file {
            continue;
        }

        // Both files of a segment share the stem
        if let Some(base) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<u64>().ok())
        {
            offsets.insert(base);
        }
    }

    Ok(offsets.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_segment_paths() {
        let paths = LogPaths::new(PathBuf::from("/data"));
        assert_eq!(paths.store_path(16), PathBuf::from("/data/16.store"));
        assert_eq!(paths.index_path(16), PathBuf::from("/data/16.index"));
    }

    #[test]
    fn test_list_base_offsets() {
        let dir = tempdir().unwrap();
        for name in ["0.store", "0.index", "120.store", "120.index", "7.index", "notes.txt", "x.store"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }

        let offsets = list_base_offsets(dir.path()).unwrap();
        assert_eq!(offsets, vec![0, 7, 120]);
    }

    #[test]
    fn test_list_missing_dir() {
        let dir = tempdir().unwrap();
        let offsets = list_base_offsets(&dir.path().join("missing")).unwrap();
        assert!(offsets.is_empty());
    }
}
