//! Record Store
//!
//! Append-only file of `[u64 BE length][payload]` frames. Appends go
//! through a write buffer; every read flushes it first, so a reader always
//! sees its own process's writes.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use parking_lot::Mutex;

use super::LEN_WIDTH;
use crate::error::{Error, Result};

/// Store for one segment
#[derive(Debug)]
pub struct Store {
    /// File path
    path: PathBuf,
    /// Buffered writer and size, behind one lock
    inner: Mutex<StoreInner>,
}

#[derive(Debug)]
struct StoreInner {
    writer: BufWriter<File>,
    /// Bytes written so far, length prefixes included
    size: u64,
    /// Set when an append fails; `size` may no longer match the file
    failed: bool,
}

impl Store {
    /// Open or create the store file at `path`
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .create(true)
            .append(true)
            .open(path)?;
        Self::new(file, path)
    }

    /// Wrap an already open file, resuming after its current contents
    pub fn new(mut file: File, path: impl Into<PathBuf>) -> Result<Self> {
        // Appends land after existing frames even if the file was not opened in append mode
        let size = file.seek(SeekFrom::End(0))?;

        Ok(Self {
            path: path.into(),
            inner: Mutex::new(StoreInner {
                writer: BufWriter::new(file),
                size,
                failed: false,
            }),
        })
    }

    /// Append a frame holding `data`.
    ///
    /// Returns the number of bytes written (prefix included) and the
    /// position the frame starts at. The frame is buffered and only reaches
    /// the file on the next read or on close.
    pub fn append(&self, data: &[u8]) -> Result<(u64, u64)> {
        let mut inner = self.inner.lock();
        if inner.failed {
            return Err(Error::Internal(format!(
                "store {} is unusable after a failed append",
                self.path.display()
            )));
        }
        let position = inner.size;

        // Prefix and payload go out in one write so a failure never splits them
        let written = LEN_WIDTH + data.len() as u64;
        let mut frame = Vec::with_capacity(written as usize);
        frame.write_u64::<BigEndian>(data.len() as u64)?;
        frame.extend_from_slice(data);

        if let Err(e) = inner.writer.write_all(&frame) {
            inner.failed = true;
            return Err(e.into());
        }

        inner.size += written;
        Ok((written, position))
    }

    /// Read the payload of the frame starting at `position`
    pub fn read(&self, position: u64) -> Result<Vec<u8>> {
        let mut inner = self.inner.lock();
        inner.writer.flush()?;
        let size = inner.size;

        let payload_start = checked_end(position, LEN_WIDTH, size)?;
        let mut len_buf = [0u8; LEN_WIDTH as usize];
        read_exact_at(inner.writer.get_ref(), &mut len_buf, position, size)?;
        let len = BigEndian::read_u64(&len_buf);

        checked_end(payload_start, len, size)?;
        let mut payload = vec![0u8; len as usize];
        read_exact_at(inner.writer.get_ref(), &mut payload, payload_start, size)?;
        Ok(payload)
    }

    /// Raw positional read with no framing, after flushing pending writes.
    ///
    /// Fills `buf` completely or fails; returns the number of bytes read.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let mut inner = self.inner.lock();
        inner.writer.flush()?;
        let size = inner.size;

        checked_end(offset, buf.len() as u64, size)?;
        read_exact_at(inner.writer.get_ref(), buf, offset, size)?;
        Ok(buf.len())
    }

    /// Bytes in the store, buffered frames included
    pub fn size(&self) -> u64 {
        self.inner.lock().size
    }

    /// Path of the backing file
    pub fn name(&self) -> &Path {
        &self.path
    }

    /// Flush buffered frames, sync and close the file
    pub fn close(self) -> Result<()> {
        let inner = self.inner.into_inner();
        let file = inner.writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        Ok(())
    }
}

/// End of the range `[start, start + len)`, or an error if it passes `size`
fn checked_end(start: u64, len: u64, size: u64) -> Result<u64> {
    match start.checked_add(len) {
        Some(end) if end <= size => Ok(end),
        _ => Err(Error::EndOfStore {
            position: start,
            size,
        }),
    }
}

fn read_exact_at(file: &File, buf: &mut [u8], offset: u64, size: u64) -> Result<()> {
    positional_read(file, buf, offset).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => Error::EndOfStore {
            position: offset,
            size,
        },
        _ => Error::Io(e),
    })
}

#[cfg(unix)]
fn positional_read(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
fn positional_read(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(n) => {
                buf = &mut std::mem::take(&mut buf)[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const WRITE: &[u8] = b"hello world";
    const WIDTH: u64 = WRITE.len() as u64 + LEN_WIDTH;

    fn append_three(store: &Store) {
        for i in 1..4 {
            let (n, pos) = store.append(WRITE).unwrap();
            assert_eq!(n, WIDTH);
            assert_eq!(pos + n, WIDTH * i);
        }
    }

    fn read_three(store: &Store) {
        let mut pos = 0;
        for _ in 1..4 {
            assert_eq!(store.read(pos).unwrap(), WRITE);
            pos += WIDTH;
        }
    }

    #[test]
    fn test_store_append_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0.store");

        let store = Store::open(&path).unwrap();
        append_three(&store);
        read_three(&store);
        assert_eq!(store.size(), WIDTH * 3);
        store.close().unwrap();

        // Reopen resumes at the end of the existing frames
        let store = Store::open(&path).unwrap();
        assert_eq!(store.size(), WIDTH * 3);
        read_three(&store);

        let (_, pos) = store.append(WRITE).unwrap();
        assert_eq!(pos, WIDTH * 3);
        assert_eq!(store.read(pos).unwrap(), WRITE);
    }

    #[test]
    fn test_store_read_at() {
        let dir = tempdir().unwrap();
        let store = Store::open(&dir.path().join("0.store")).unwrap();
        append_three(&store);

        let mut off = 0;
        for _ in 1..4 {
            let mut len_buf = [0u8; LEN_WIDTH as usize];
            let n = store.read_at(&mut len_buf, off).unwrap();
            assert_eq!(n as u64, LEN_WIDTH);

            let size = BigEndian::read_u64(&len_buf);
            let mut payload = vec![0u8; size as usize];
            let n = store.read_at(&mut payload, off + LEN_WIDTH).unwrap();
            assert_eq!(payload, WRITE);
            assert_eq!(n as u64, size);

            off += WIDTH;
        }
    }

    #[test]
    fn test_store_close_flushes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0.store");

        let store = Store::open(&path).unwrap();
        store.append(WRITE).unwrap();

        // Still sitting in the write buffer
        let before = std::fs::metadata(&path).unwrap().len();
        store.close().unwrap();
        let after = std::fs::metadata(&path).unwrap().len();

        assert_eq!(after, before + WIDTH);
    }

    #[test]
    fn test_store_read_past_end() {
        let dir = tempdir().unwrap();
        let store = Store::open(&dir.path().join("0.store")).unwrap();
        store.append(WRITE).unwrap();

        let err = store.read(WIDTH).unwrap_err();
        assert!(matches!(err, Error::EndOfStore { .. }));

        let err = store.read(u64::MAX - 2).unwrap_err();
        assert!(err.is_not_found());

        let mut buf = [0u8; 4];
        let err = store.read_at(&mut buf, WIDTH - 2).unwrap_err();
        assert!(matches!(err, Error::EndOfStore { .. }));
    }

    #[test]
    fn test_store_truncated_frame() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0.store");

        // A length prefix promising more bytes than the file holds
        let mut frame = Vec::new();
        frame.write_u64::<BigEndian>(64).unwrap();
        frame.extend_from_slice(b"short");
        std::fs::write(&path, &frame).unwrap();

        let store = Store::open(&path).unwrap();
        let err = store.read(0).unwrap_err();
        assert!(matches!(err, Error::EndOfStore { .. }));
    }

    #[test]
    fn test_store_empty_payload() {
        let dir = tempdir().unwrap();
        let store = Store::open(&dir.path().join("0.store")).unwrap();

        let (n, pos) = store.append(b"").unwrap();
        assert_eq!((n, pos), (LEN_WIDTH, 0));
        assert!(store.read(0).unwrap().is_empty());
    }

    #[test]
    fn test_store_failed_append() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0.store");
        std::fs::write(&path, b"").unwrap();

        // Writes to a read-only handle fail
        let file = File::open(&path).unwrap();
        let store = Store::new(file, &path).unwrap();

        // Larger than the write buffer, so it goes straight to the file
        let big = vec![7u8; 64 * 1024];
        assert!(matches!(store.append(&big), Err(Error::Io(_))));
        assert_eq!(store.size(), 0);

        // No orphaned length prefix left waiting in the buffer
        assert_eq!(store.read_at(&mut [], 0).unwrap(), 0);

        let err = store.append(WRITE).unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
        assert_eq!(store.size(), 0);
    }

    #[test]
    fn test_store_concurrent_appends() {
        let dir = tempdir().unwrap();
        let store = std::sync::Arc::new(Store::open(&dir.path().join("0.store")).unwrap());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = std::sync::Arc::clone(&store);
                std::thread::spawn(move || {
                    (0..50)
                        .map(|_| store.append(WRITE).unwrap().1)
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        for handle in handles {
            for pos in handle.join().unwrap() {
                assert_eq!(store.read(pos).unwrap(), WRITE);
            }
        }
        assert_eq!(store.size(), WIDTH * 200);
    }
}
