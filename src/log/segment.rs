//! Log Segment
//!
//! A segment binds one store and one index, named after the segment's base
//! offset. It assigns logical offsets to appended records and translates
//! them to index-relative offsets for lookup.

use std::marker::PhantomData;
use std::path::Path;

use byteorder::{BigEndian, ByteOrder};
use serde::Serialize;

use super::index::{Index, IndexRead};
use super::record::{BincodeCodec, Record, RecordCodec};
use super::store::Store;
use super::{LogPaths, LEN_WIDTH};
use crate::config::SegmentConfig;
use crate::error::{Error, Result};

/// Summary of a segment, for status reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentInfo {
    pub base_offset: u64,
    pub next_offset: u64,
    pub store_bytes: u64,
    pub index_bytes: u64,
}

/// A single log segment
#[derive(Debug)]
pub struct Segment<C: RecordCodec = BincodeCodec> {
    store: Store,
    index: Index,
    /// First offset this segment may hold
    base_offset: u64,
    /// Offset the next appended record gets
    next_offset: u64,
    config: SegmentConfig,
    codec: PhantomData<C>,
}

impl<C: RecordCodec> Segment<C> {
    /// Open the segment at `base_offset` in `dir`, creating its files if needed.
    ///
    /// An existing segment resumes one past its last indexed record whose
    /// frame is in the store.
    pub fn open(dir: &Path, base_offset: u64, config: SegmentConfig) -> Result<Self> {
        let paths = LogPaths::new(dir.to_path_buf());
        let store = Store::open(&paths.store_path(base_offset))?;
        let index = Index::open(&paths.index_path(base_offset), &config)?;

        let mut segment = Self {
            store,
            index,
            base_offset,
            next_offset: base_offset,
            config,
            codec: PhantomData,
        };
        segment.drop_dangling_entries()?;

        segment.next_offset = match segment.index.read(IndexRead::Latest) {
            Ok((offset, _)) => base_offset
                .checked_add(u64::from(offset) + 1)
                .ok_or_else(|| {
                    Error::Config(format!(
                        "segment {} holds offsets past u64::MAX",
                        base_offset
                    ))
                })?,
            Err(e) if e.is_not_found() => base_offset,
            Err(e) => return Err(e),
        };
        segment.index_unindexed_frames()?;

        Ok(segment)
    }

    /// Append a record, assigning it the next offset.
    ///
    /// Index room is checked before anything is written, so a full segment
    /// rejects the record without leaving an unindexed frame in the store.
    pub fn append(&mut self, record: &mut Record) -> Result<u64> {
        if self.index.is_full() {
            return Err(Error::IndexFull {
                capacity: self.index.capacity(),
            });
        }

        let offset = self.next_offset;
        let relative = self.relative_offset(offset)?;
        let next_offset = self.offset_after(offset)?;
        record.offset = offset;

        let bytes = C::encode(record)?;
        let (_, position) = self.store.append(&bytes)?;
        self.index.write(relative, position)?;

        self.next_offset = next_offset;
        Ok(offset)
    }

    /// Read the record at a logical offset
    pub fn read(&self, offset: u64) -> Result<Record> {
        if !self.contains(offset) {
            return Err(Error::OffsetOutOfRange {
                offset,
                base: self.base_offset,
                next: self.next_offset,
            });
        }

        let relative = self.relative_offset(offset)?;
        let (_, position) = self.index.read(IndexRead::At(relative))?;
        let bytes = self.store.read(position)?;
        let record = C::decode(&bytes)?;

        if record.offset != offset {
            return Err(Error::RecordMismatch {
                offset,
                found: record.offset,
            });
        }
        Ok(record)
    }

    /// Check if either file has reached its configured limit
    pub fn is_maxed(&self) -> bool {
        self.store.size() >= self.config.max_store_bytes
            || self.index.size() >= self.config.max_index_bytes
            || self.index.is_full()
    }

    /// Check if `offset` was appended to this segment
    pub fn contains(&self, offset: u64) -> bool {
        offset >= self.base_offset && offset < self.next_offset
    }

    pub fn base_offset(&self) -> u64 {
        self.base_offset
    }

    pub fn next_offset(&self) -> u64 {
        self.next_offset
    }

    /// Number of records in the segment
    pub fn len(&self) -> u64 {
        self.next_offset - self.base_offset
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn info(&self) -> SegmentInfo {
        SegmentInfo {
            base_offset: self.base_offset,
            next_offset: self.next_offset,
            store_bytes: self.store.size(),
            index_bytes: self.index.size(),
        }
    }

    /// Close the index, then the store.
    ///
    /// Both are closed even if the first fails; the first error wins.
    pub fn close(self) -> Result<()> {
        let index_result = self.index.close();
        let store_result = self.store.close();
        index_result.and(store_result)
    }

    /// Close the segment and delete both of its files
    pub fn remove(self) -> Result<()> {
        let index_path = self.index.name().to_path_buf();
        let store_path = self.store.name().to_path_buf();
        let base_offset = self.base_offset;

        self.close()?;
        std::fs::remove_file(&index_path)?;
        std::fs::remove_file(&store_path)?;

        tracing::debug!("Removed segment {}", base_offset);
        Ok(())
    }

    fn relative_offset(&self, offset: u64) -> Result<u32> {
        u32::try_from(offset - self.base_offset).map_err(|_| Error::IndexFull {
            capacity: self.index.capacity(),
        })
    }

    /// Offset following `offset`, if the offset space has room for it
    fn offset_after(&self, offset: u64) -> Result<u64> {
        offset.checked_add(1).ok_or(Error::IndexFull {
            capacity: self.index.capacity(),
        })
    }

    /// Drop trailing index entries whose frames are not in the store.
    ///
    /// Index entries reach the file through the mapping while store frames
    /// can still be sitting in the write buffer, so after a crash the index
    /// may point past the end of the store.
    fn drop_dangling_entries(&mut self) -> Result<()> {
        let store_size = self.store.size();
        let total = self.index.entries();
        let mut entries = total;

        while entries > 0 {
            let entry = u32::try_from(entries - 1).map_err(|_| Error::IndexFull {
                capacity: self.index.capacity(),
            })?;
            let (_, position) = self.index.read(IndexRead::At(entry))?;
            match self.frame_end(position) {
                Ok(end) if end <= store_size => break,
                Ok(_) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
            entries -= 1;
        }

        if entries < total {
            tracing::warn!(
                "Segment {} index points past the end of its store, dropping {} entries",
                self.base_offset,
                total - entries
            );
            self.index.truncate(entries);
        }

        Ok(())
    }

    /// Index store frames written after the last index entry.
    ///
    /// These are left behind when a process stops between a store append and
    /// its index write.
    fn index_unindexed_frames(&mut self) -> Result<()> {
        let store_size = self.store.size();
        let mut position = match self.index.read(IndexRead::Latest) {
            Ok((_, position)) => self.frame_end(position)?,
            Err(e) if e.is_not_found() => 0,
            Err(e) => return Err(e),
        };

        let mut recovered = 0u64;
        while position < store_size && !self.index.is_full() {
            let end = match self.frame_end(position) {
                Ok(end) if end <= store_size => end,
                _ => {
                    tracing::warn!(
                        "Segment {} store ends in a torn frame at position {}",
                        self.base_offset,
                        position
                    );
                    break;
                }
            };

            let relative = self.relative_offset(self.next_offset)?;
            let next_offset = self.offset_after(self.next_offset)?;
            self.index.write(relative, position)?;
            self.next_offset = next_offset;
            position = end;
            recovered += 1;
        }

        if recovered > 0 {
            tracing::warn!(
                "Segment {} re-indexed {} records missing from its index",
                self.base_offset,
                recovered
            );
        }

        Ok(())
    }

    fn frame_end(&self, position: u64) -> Result<u64> {
        let mut len_buf = [0u8; LEN_WIDTH as usize];
        self.store.read_at(&mut len_buf, position)?;
        let len = BigEndian::read_u64(&len_buf);

        position
            .checked_add(LEN_WIDTH)
            .and_then(|p| p.checked_add(len))
            .ok_or(Error::EndOfStore {
                position,
                size: self.store.size(),
            })
    }
}
