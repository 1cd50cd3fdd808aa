//! Offset Index
//!
//! Memory-mapped array of 12-byte entries, `[u32 BE relative offset][u64 BE
//! store position]`, appended in order. Entry `i` lives at byte
//! `i * ENTRY_WIDTH`, so a lookup is a slice into the map.
//!
//! A mapping cannot grow, so the file is extended to the configured maximum
//! before it is mapped and cut back to the used size on close. Until then the
//! bytes past `size` are zero padding, never entries.
//!
//! Relative offsets are dense: entry `i` always holds offset `i`. A file
//! left at full size by a process that never closed it is trimmed back to
//! its last entry that follows this rule.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ByteOrder};
use memmap2::MmapMut;

use super::{ENTRY_WIDTH, OFF_WIDTH};
use crate::config::SegmentConfig;
use crate::error::{Error, Result};

/// Which entry to read from an index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexRead {
    /// The most recently written entry
    Latest,
    /// Entry number `n`, counting from zero
    At(u32),
}

/// Index for one segment
#[derive(Debug)]
pub struct Index {
    /// File path
    path: PathBuf,
    /// File handle, kept open for sync and truncate on close
    file: File,
    /// Read/write shared mapping of the whole preallocated file
    mmap: MmapMut,
    /// Used bytes; where the next entry goes
    size: u64,
    /// Set once the close sequence has run
    closed: bool,
}

impl Index {
    /// Open or create the index file at `path`
    pub fn open(path: &Path, config: &SegmentConfig) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Self::new(file, path, config)
    }

    /// Map an already open index file, resuming after its existing entries
    pub fn new(file: File, path: impl Into<PathBuf>, config: &SegmentConfig) -> Result<Self> {
        let path = path.into();
        let file_len = file.metadata()?.len();

        if file_len > config.max_index_bytes {
            return Err(Error::Config(format!(
                "index {} holds {} bytes, more than max_index_bytes {}",
                path.display(),
                file_len,
                config.max_index_bytes
            )));
        }

        let size = file_len - file_len % ENTRY_WIDTH;
        if size != file_len {
            tracing::warn!(
                "Index {} ends in a partial entry, ignoring {} trailing bytes",
                path.display(),
                file_len - size
            );
        }

        file.set_len(config.max_index_bytes)?;

        // SAFETY: the segment owns this file exclusively and its length stays
        // fixed until the mapping is dropped.
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        let mut index = Self {
            path,
            file,
            mmap,
            size,
            closed: false,
        };

        let entries = index.dense_entries();
        if entries < index.entries() {
            tracing::warn!(
                "Index {} was not closed cleanly, keeping {} of {} entries",
                index.path.display(),
                entries,
                index.entries()
            );
            index.truncate(entries);
        }

        Ok(index)
    }

    /// Number of leading entries left after dropping trailing ones whose
    /// offset does not match their position
    fn dense_entries(&self) -> u64 {
        let mut entries = self.entries();
        while entries > 0 {
            let start = ((entries - 1) * ENTRY_WIDTH) as usize;
            let offset = BigEndian::read_u32(&self.mmap[start..start + OFF_WIDTH as usize]);
            if u64::from(offset) == entries - 1 {
                break;
            }
            entries -= 1;
        }
        entries
    }

    /// Look up an entry, returning its stored relative offset and store position
    pub fn read(&self, request: IndexRead) -> Result<(u32, u64)> {
        let entries = self.entries();
        if entries == 0 {
            return Err(Error::EndOfIndex { entry: 0, entries });
        }

        let entry = match request {
            IndexRead::Latest => entries - 1,
            IndexRead::At(n) => u64::from(n),
        };
        if entry >= entries {
            return Err(Error::EndOfIndex { entry, entries });
        }

        let start = (entry * ENTRY_WIDTH) as usize;
        let pos_start = start + OFF_WIDTH as usize;
        let end = start + ENTRY_WIDTH as usize;

        let offset = BigEndian::read_u32(&self.mmap[start..pos_start]);
        let position = BigEndian::read_u64(&self.mmap[pos_start..end]);
        Ok((offset, position))
    }

    /// Append an entry
    pub fn write(&mut self, offset: u32, position: u64) -> Result<()> {
        if self.is_full() {
            return Err(Error::IndexFull {
                capacity: self.capacity(),
            });
        }

        let start = self.size as usize;
        let pos_start = start + OFF_WIDTH as usize;
        let end = start + ENTRY_WIDTH as usize;

        BigEndian::write_u32(&mut self.mmap[start..pos_start], offset);
        BigEndian::write_u64(&mut self.mmap[pos_start..end], position);
        self.size += ENTRY_WIDTH;
        Ok(())
    }

    /// Drop every entry from number `entries` on.
    ///
    /// The dropped bytes are zeroed so a later unclean reopen cannot mistake
    /// them for entries.
    pub fn truncate(&mut self, entries: u64) {
        let size = entries * ENTRY_WIDTH;
        if size >= self.size {
            return;
        }
        self.mmap[size as usize..self.size as usize].fill(0);
        self.size = size;
    }

    /// Used bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Mapped bytes, the preallocated maximum
    pub fn capacity(&self) -> u64 {
        self.mmap.len() as u64
    }

    /// Number of entries written
    pub fn entries(&self) -> u64 {
        self.size / ENTRY_WIDTH
    }

    /// Check if another entry would overflow the mapping
    pub fn is_full(&self) -> bool {
        self.size + ENTRY_WIDTH > self.capacity()
    }

    /// Path of the backing file
    pub fn name(&self) -> &Path {
        &self.path
    }

    /// Sync the mapping and file, cut the file back to the used size and close it
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        self.closed = true;
        self.mmap.flush()?;
        self.file.sync_all()?;
        self.file.set_len(self.size)?;
        Ok(())
    }
}

impl Drop for Index {
    fn drop(&mut self) {
        // An index left at full capacity would reopen with a wrong size
        if !self.closed {
            if let Err(e) = self.shutdown() {
                tracing::warn!("Failed to close index {}: {}", self.path.display(), e);
            }
        }
    }
}
