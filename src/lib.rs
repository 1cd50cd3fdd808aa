//! WolfLog - Segmented Commit Log
//!
//! An append-only, offset-addressed record log persisted to disk. Records
//! are framed into per-segment store files and located through
//! memory-mapped offset indexes, so reading any offset costs one index
//! slice and one positional read.
//!
//! # Architecture
//!
//! - **Store**: buffered writer/reader of `[u64 BE length][payload]` frames
//! - **Index**: preallocated, memory-mapped array of 12-byte
//!   `[u32 relative offset][u64 store position]` entries
//! - **Segment**: one store plus one index covering a contiguous offset range
//! - **Log**: ordered segments, rolling to a new one when the active fills up
//!
//! An HTTP API exposes produce and consume on top of the log.

pub mod config;
pub mod error;
pub mod log;
pub mod api;

pub use config::WolfLogConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{SegmentConfig, WolfLogConfig};
    pub use crate::error::{Error, Result};
    pub use crate::log::{Log, Record, Segment};
    pub use crate::api::HttpServer;
}
