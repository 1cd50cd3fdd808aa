//! WolfLog Configuration
//!
//! Configuration structures for the commit log, its segments and the
//! HTTP front end.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::log::ENTRY_WIDTH;

/// Main WolfLog configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WolfLogConfig {
    /// Log storage configuration
    #[serde(default)]
    pub log: LogConfig,

    /// Segment size limits
    #[serde(default)]
    pub segment: SegmentConfig,

    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Log storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Directory holding the segment files
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Segment configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentConfig {
    /// Store size at which a segment counts as full
    #[serde(default = "default_max_store_bytes")]
    pub max_store_bytes: u64,

    /// Preallocated index size; also the index size at which a segment counts as full
    #[serde(default = "default_max_index_bytes")]
    pub max_index_bytes: u64,

    /// Base offset of the first segment in an empty log
    #[serde(default)]
    pub initial_offset: u64,
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Enable HTTP API
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// HTTP API bind address
    #[serde(default = "default_api_address")]
    pub bind_address: String,

    /// Enable CORS
    #[serde(default)]
    pub cors_enabled: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/wolflog")
}

fn default_max_store_bytes() -> u64 {
    1024 * 1024
}

fn default_max_index_bytes() -> u64 {
    1024 * 1024
}

fn default_true() -> bool {
    true
}

fn default_api_address() -> String {
    "0.0.0.0:8082".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            max_store_bytes: default_max_store_bytes(),
            max_index_bytes: default_max_index_bytes(),
            initial_offset: 0,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: default_api_address(),
            cors_enabled: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl SegmentConfig {
    /// Maximum number of records a single segment can index
    pub fn max_entries(&self) -> u64 {
        self.max_index_bytes / ENTRY_WIDTH
    }

    /// Validate the segment limits
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_store_bytes == 0 {
            return Err(crate::Error::Config("segment.max_store_bytes must be positive".into()));
        }

        if self.max_index_bytes < ENTRY_WIDTH {
            return Err(crate::Error::Config(format!(
                "segment.max_index_bytes must hold at least one {}-byte entry",
                ENTRY_WIDTH
            )));
        }

        // Relative offsets are stored as u32
        if self.max_entries() > u64::from(u32::MAX) + 1 {
            return Err(crate::Error::Config(format!(
                "segment.max_index_bytes allows {} entries, more than a u32 relative offset can address",
                self.max_entries()
            )));
        }

        Ok(())
    }
}

impl WolfLogConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: WolfLogConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.log.data_dir.as_os_str().is_empty() {
            return Err(crate::Error::Config("log.data_dir cannot be empty".into()));
        }

        self.segment.validate()?;

        if self.api.enabled && self.api.bind_address.is_empty() {
            return Err(crate::Error::Config("api.bind_address cannot be empty".into()));
        }

        Ok(())
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &PathBuf {
        &self.log.data_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let toml = r#"
[log]
data_dir = "/tmp/wolflog"

[segment]
max_store_bytes = 1024
max_index_bytes = 36
initial_offset = 16

[api]
bind_address = "127.0.0.1:9000"
"#;

        let config = WolfLogConfig::from_str(toml).unwrap();
        assert_eq!(config.data_dir(), &PathBuf::from("/tmp/wolflog"));
        assert_eq!(config.segment.max_store_bytes, 1024);
        assert_eq!(config.segment.max_entries(), 3);
        assert_eq!(config.segment.initial_offset, 16);
        assert!(config.api.enabled);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_defaults() {
        let config = WolfLogConfig::from_str("").unwrap();
        assert_eq!(config.segment, SegmentConfig::default());
        assert_eq!(config.api.bind_address, "0.0.0.0:8082");
        assert!(!config.api.cors_enabled);
    }

    #[test]
    fn test_rejects_tiny_index() {
        let toml = r#"
[segment]
max_index_bytes = 11
"#;
        let err = WolfLogConfig::from_str(toml).unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
    }

    #[test]
    fn test_rejects_zero_store() {
        let config = SegmentConfig {
            max_store_bytes: 0,
            ..SegmentConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_unaddressable_index() {
        let config = SegmentConfig {
            max_index_bytes: (u64::from(u32::MAX) + 2) * ENTRY_WIDTH,
            ..SegmentConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_toml() {
        let err = WolfLogConfig::from_str("[segment\nmax").unwrap_err();
        assert!(matches!(err, crate::Error::ConfigParse(_)));
    }
}
