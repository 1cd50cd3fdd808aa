//! WolfLog Error Types

use thiserror::Error;

/// Result type alias for WolfLog operations
pub type Result<T> = std::result::Result<T, Error>;

/// WolfLog error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Store errors
    #[error("Read past end of store: position {position}, size {size}")]
    EndOfStore { position: u64, size: u64 },

    // Index errors
    #[error("No index entry {entry} (index holds {entries} entries)")]
    EndOfIndex { entry: u64, entries: u64 },

    #[error("Index full: capacity is {capacity} bytes")]
    IndexFull { capacity: u64 },

    // Segment and log errors
    #[error("Offset {offset} out of range [{base}, {next})")]
    OffsetOutOfRange { offset: u64, base: u64, next: u64 },

    #[error("Index entry for offset {offset} points at the record for offset {found}")]
    RecordMismatch { offset: u64, found: u64 },

    #[error("Record serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if this error means the requested record or entry does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::EndOfStore { .. } | Error::EndOfIndex { .. } | Error::OffsetOutOfRange { .. }
        )
    }

    /// Check if this error means the segment has no room left
    pub fn is_capacity(&self) -> bool {
        matches!(self, Error::IndexFull { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert!(Error::EndOfIndex { entry: 0, entries: 0 }.is_not_found());
        assert!(Error::OffsetOutOfRange { offset: 3, base: 16, next: 16 }.is_not_found());
        assert!(!Error::IndexFull { capacity: 36 }.is_not_found());
        assert!(Error::IndexFull { capacity: 36 }.is_capacity());
        assert!(!Error::Internal("boom".into()).is_capacity());
        assert!(!Error::RecordMismatch { offset: 1, found: 3 }.is_not_found());
    }
}
