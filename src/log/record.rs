//! Log Record Types
//!
//! A record is an opaque payload plus the logical offset the log assigned
//! to it. Segments hand records to a [`RecordCodec`] to get the bytes that
//! go into a store frame.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A single record in the commit log
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Record {
    /// Opaque payload
    pub value: Vec<u8>,
    /// Logical offset, assigned on append
    pub offset: u64,
}

impl Record {
    /// Create a record that has not been appended yet
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self {
            value: value.into(),
            offset: 0,
        }
    }
}

/// Binary encoding of records inside store frames
///
/// Any encoding works as long as `decode(encode(r)) == r`; the store adds
/// its own length prefix.
pub trait RecordCodec: Send + Sync + 'static {
    fn encode(record: &Record) -> Result<Vec<u8>>;
    fn decode(bytes: &[u8]) -> Result<Record>;
}

/// Default codec, bincode with its standard configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl RecordCodec for BincodeCodec {
    fn encode(record: &Record) -> Result<Vec<u8>> {
        Ok(bincode::serialize(record)?)
    }

    fn decode(bytes: &[u8]) -> Result<Record> {
        Ok(bincode::deserialize(bytes)?)
    }
}
