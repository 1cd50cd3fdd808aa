//! Segmented Log
//!
//! Keeps the segments of one log directory ordered by base offset, appends
//! to the newest one and rolls to a fresh segment when it fills up.

use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use super::record::{BincodeCodec, Record, RecordCodec};
use super::segment::{Segment, SegmentInfo};
use super::LogPaths;
use crate::config::SegmentConfig;
use crate::error::{Error, Result};

/// A commit log made of segments
#[derive(Debug)]
pub struct Log<C: RecordCodec = BincodeCodec> {
    /// Log paths
    paths: LogPaths,
    /// Limits applied to every segment
    config: SegmentConfig,
    /// Segments ordered by base offset; the last one is active
    segments: RwLock<Vec<Segment<C>>>,
}

impl<C: RecordCodec> Log<C> {
    /// Open the log in `dir`, restoring any segments already there
    pub fn open(dir: impl Into<PathBuf>, config: SegmentConfig) -> Result<Self> {
        config.validate()?;

        let paths = LogPaths::new(dir.into());
        paths.ensure_dirs()?;

        let mut segments = Vec::new();
        for base_offset in paths.list_base_offsets()? {
            segments.push(Segment::open(&paths.base_dir, base_offset, config)?);
        }

        if segments.is_empty() {
            segments.push(Segment::open(&paths.base_dir, config.initial_offset, config)?);
        }

        tracing::info!(
            "Opened log at {} with {} segment(s)",
            paths.base_dir.display(),
            segments.len()
        );

        Ok(Self {
            paths,
            config,
            segments: RwLock::new(segments),
        })
    }

    /// Append a record to the active segment, rolling first if it is full
    pub fn append(&self, record: &mut Record) -> Result<u64> {
        let mut segments = self.segments.write();

        let roll_at = match segments.last() {
            Some(active) if active.is_maxed() && !active.is_empty() => Some(active.next_offset()),
            Some(_) => None,
            None => Some(self.config.initial_offset),
        };

        if let Some(base_offset) = roll_at {
            let segment = Segment::open(&self.paths.base_dir, base_offset, self.config)?;
            tracing::info!("Rolled to new segment at offset {}", base_offset);
            segments.push(segment);
        }

        let active = segments
            .last_mut()
            .ok_or_else(|| Error::Internal("log has no active segment".into()))?;
        active.append(record)
    }

    /// Read the record at `offset` from whichever segment holds it
    pub fn read(&self, offset: u64) -> Result<Record> {
        let segments = self.segments.read();

        match segments.iter().find(|s| s.contains(offset)) {
            Some(segment) => segment.read(offset),
            None => Err(Error::OffsetOutOfRange {
                offset,
                base: segments.first().map_or(0, |s| s.base_offset()),
                next: segments.last().map_or(0, |s| s.next_offset()),
            }),
        }
    }

    /// First offset the log can hold
    pub fn lowest_offset(&self) -> u64 {
        self.segments
            .read()
            .first()
            .map_or(self.config.initial_offset, |s| s.base_offset())
    }

    /// Last offset appended, if any
    pub fn highest_offset(&self) -> Option<u64> {
        let segments = self.segments.read();
        let lowest = segments.first()?.base_offset();
        let next = segments.last()?.next_offset();
        (next > lowest).then(|| next - 1)
    }

    /// Offset the next append gets
    pub fn next_offset(&self) -> u64 {
        self.segments
            .read()
            .last()
            .map_or(self.config.initial_offset, |s| s.next_offset())
    }

    /// Remove every sealed segment whose records are all at or below `lowest`
    pub fn truncate(&self, lowest: u64) -> Result<()> {
        let mut segments = self.segments.write();
        let count = segments.len();

        let mut kept = Vec::with_capacity(count);
        let mut removed = 0;
        let mut first_error = None;

        for (i, segment) in std::mem::take(&mut *segments).into_iter().enumerate() {
            let active = i + 1 == count;
            if active || segment.next_offset() > lowest.saturating_add(1) {
                kept.push(segment);
                continue;
            }

            match segment.remove() {
                Ok(()) => removed += 1,
                Err(e) => {
                    tracing::error!("Failed to remove segment during truncate: {}", e);
                    first_error.get_or_insert(e);
                }
            }
        }
        *segments = kept;

        if removed > 0 {
            tracing::info!("Truncated {} segment(s) up to offset {}", removed, lowest);
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Per-segment summary, oldest first
    pub fn segments(&self) -> Vec<SegmentInfo> {
        self.segments.read().iter().map(|s| s.info()).collect()
    }

    pub fn segment_count(&self) -> usize {
        self.segments.read().len()
    }

    pub fn dir(&self) -> &Path {
        &self.paths.base_dir
    }

    pub fn config(&self) -> &SegmentConfig {
        &self.config
    }

    /// Close every segment; the first error is returned after all were tried
    pub fn close(self) -> Result<()> {
        let mut first_error = None;
        for segment in self.segments.into_inner() {
            if let Err(e) = segment.close() {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Close the log and delete its directory
    pub fn remove(self) -> Result<()> {
        let dir = self.paths.base_dir.clone();
        self.close()?;
        std::fs::remove_dir_all(&dir)?;
        tracing::warn!("Removed log at {}", dir.display());
        Ok(())
    }

    /// Remove the log and start over with a single empty segment
    pub fn reset(self) -> Result<Self> {
        let dir = self.paths.base_dir.clone();
        let config = self.config;
        self.remove()?;
        Self::open(dir, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::ENTRY_WIDTH;
    use tempfile::tempdir;

    fn config(max_store_bytes: u64, max_index_bytes: u64) -> SegmentConfig {
        SegmentConfig {
            max_store_bytes,
            max_index_bytes,
            initial_offset: 0,
        }
    }

    fn append_n(log: &Log, n: u64) -> Vec<u64> {
        (0..n)
            .map(|i| {
                let mut record = Record::new(format!("record-{}", i).into_bytes());
                log.append(&mut record).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_log_append_read() {
        let dir = tempdir().unwrap();
        let log: Log = Log::open(dir.path(), config(1024, 1024)).unwrap();

        assert_eq!(log.highest_offset(), None);
        assert_eq!(append_n(&log, 3), vec![0, 1, 2]);
        assert_eq!(log.read(1).unwrap().value, b"record-1");
        assert_eq!(log.highest_offset(), Some(2));
        assert!(log.read(3).unwrap_err().is_not_found());
    }

    #[test]
    fn test_log_initial_offset() {
        let dir = tempdir().unwrap();
        let config = SegmentConfig {
            initial_offset: 100,
            ..config(1024, 1024)
        };
        let log: Log = Log::open(dir.path(), config).unwrap();

        assert_eq!(log.lowest_offset(), 100);
        assert_eq!(append_n(&log, 1), vec![100]);
        assert!(dir.path().join("100.store").exists());
    }

    #[test]
    fn test_log_rolls_segments() {
        let dir = tempdir().unwrap();
        let log: Log = Log::open(dir.path(), config(1024, ENTRY_WIDTH * 3)).unwrap();

        let offsets = append_n(&log, 7);
        assert_eq!(offsets, (0..7).collect::<Vec<_>>());
        assert_eq!(log.segment_count(), 3);

        let bases: Vec<u64> = log.segments().iter().map(|s| s.base_offset).collect();
        assert_eq!(bases, vec![0, 3, 6]);

        for off in offsets {
            assert_eq!(log.read(off).unwrap().value, format!("record-{}", off).into_bytes());
        }
    }

    #[test]
    fn test_log_reopen() {
        let dir = tempdir().unwrap();
        let log: Log = Log::open(dir.path(), config(1024, ENTRY_WIDTH * 3)).unwrap();
        append_n(&log, 5);
        log.close().unwrap();

        let log: Log = Log::open(dir.path(), config(1024, ENTRY_WIDTH * 3)).unwrap();
        assert_eq!(log.segment_count(), 2);
        assert_eq!(log.lowest_offset(), 0);
        assert_eq!(log.highest_offset(), Some(4));
        assert_eq!(log.read(4).unwrap().value, b"record-4");

        let mut record = Record::new(b"after reopen".to_vec());
        assert_eq!(log.append(&mut record).unwrap(), 5);
    }

    #[test]
    fn test_log_truncate() {
        let dir = tempdir().unwrap();
        let log: Log = Log::open(dir.path(), config(1024, ENTRY_WIDTH * 3)).unwrap();
        append_n(&log, 7);

        log.truncate(4).unwrap();
        assert_eq!(log.segment_count(), 2);
        assert_eq!(log.lowest_offset(), 3);
        assert!(log.read(2).unwrap_err().is_not_found());
        assert_eq!(log.read(3).unwrap().value, b"record-3");
        assert!(!dir.path().join("0.store").exists());

        // The active segment survives even when fully below the mark
        log.truncate(100).unwrap();
        assert_eq!(log.segment_count(), 1);
        assert_eq!(log.read(6).unwrap().value, b"record-6");
    }

    #[test]
    fn test_log_reset() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log");
        let log: Log = Log::open(&path, config(1024, ENTRY_WIDTH * 3)).unwrap();
        append_n(&log, 4);

        let log = log.reset().unwrap();
        assert_eq!(log.segment_count(), 1);
        assert_eq!(log.highest_offset(), None);
        assert_eq!(append_n(&log, 1), vec![0]);

        log.remove().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_log_concurrent_append_read() {
        let dir = tempdir().unwrap();
        let log: std::sync::Arc<Log> =
            std::sync::Arc::new(Log::open(dir.path(), config(4096, ENTRY_WIDTH * 16)).unwrap());

        let writers: Vec<_> = (0..4)
            .map(|_| {
                let log = std::sync::Arc::clone(&log);
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        let mut record = Record::new(b"payload".to_vec());
                        let off = log.append(&mut record).unwrap();
                        assert_eq!(log.read(off).unwrap().offset, off);
                    }
                })
            })
            .collect();

        for writer in writers {
            writer.join().unwrap();
        }
        assert_eq!(log.next_offset(), 100);
    }

    #[test]
    fn test_log_rejects_bad_config() {
        let dir = tempdir().unwrap();
        let result: Result<Log> = Log::open(dir.path(), config(0, 1024));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
