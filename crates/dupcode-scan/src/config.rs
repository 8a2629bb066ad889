//! Scan configuration
//!
//! Values come from defaults, then `DUPCODE_*` environment variables, then
//! whatever the caller sets through [`ScanConfigBuilder`] or direct field access.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Result, ScanError};

/// Second field of each record, matching the `barcode,code` layout.
pub const DEFAULT_KEY_COLUMN: usize = 1;

pub const DEFAULT_HEADER_SENTINEL: &str = "barcode";

pub const DEFAULT_DRAIN_GRACE: Duration = Duration::from_millis(2000);

pub const DEFAULT_REGISTRY_SHARDS: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Zero-based index of the key field
    pub key_column: usize,

    /// Rows whose first field equals this value are skipped
    pub header_sentinel: Option<String>,

    /// Field delimiter byte
    pub delimiter: u8,

    /// Upper bound on concurrently running workers; `None` runs every unit at once
    pub max_workers: Option<usize>,

    /// How long to wait for cancelled workers before aborting them
    pub drain_grace: Duration,

    /// Number of independently locked registry shards, rounded up to a power of two
    pub registry_shards: usize,

    /// Strip surrounding whitespace from keys before comparing them
    pub trim_keys: bool,

    /// Only scan files with this extension (case-insensitive, without the dot)
    pub extension: Option<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            key_column: DEFAULT_KEY_COLUMN,
            header_sentinel: Some(DEFAULT_HEADER_SENTINEL.to_string()),
            delimiter: b',',
            max_workers: None,
            drain_grace: DEFAULT_DRAIN_GRACE,
            registry_shards: DEFAULT_REGISTRY_SHARDS,
            trim_keys: false,
            extension: None,
        }
    }
}

impl ScanConfig {
    /// Load configuration from environment variables
    ///
    /// - `DUPCODE_KEY_COLUMN`: zero-based key field index
    /// - `DUPCODE_HEADER_SENTINEL`: header marker; empty disables header skipping
    /// - `DUPCODE_DELIMITER`: single character, or `tab`
    /// - `DUPCODE_MAX_WORKERS`: worker limit; `0` means unbounded
    /// - `DUPCODE_DRAIN_GRACE_MS`: drain grace period in milliseconds
    /// - `DUPCODE_REGISTRY_SHARDS`: registry shard count
    /// - `DUPCODE_TRIM_KEYS`: `true` to ignore whitespace around keys
    /// - `DUPCODE_EXTENSION`: extension filter
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(column) = env_parse("DUPCODE_KEY_COLUMN")? {
            config.key_column = column;
        }

        if let Ok(sentinel) = std::env::var("DUPCODE_HEADER_SENTINEL") {
            config.header_sentinel = non_empty(sentinel);
        }

        if let Ok(delimiter) = std::env::var("DUPCODE_DELIMITER") {
            config.delimiter = parse_delimiter(&delimiter)?;
        }

        if let Some(workers) = env_parse::<usize>("DUPCODE_MAX_WORKERS")? {
            config.max_workers = (workers > 0).then_some(workers);
        }

        if let Some(millis) = env_parse("DUPCODE_DRAIN_GRACE_MS")? {
            config.drain_grace = Duration::from_millis(millis);
        }

        if let Some(shards) = env_parse("DUPCODE_REGISTRY_SHARDS")? {
            config.registry_shards = shards;
        }

        if let Some(trim) = env_parse("DUPCODE_TRIM_KEYS")? {
            config.trim_keys = trim;
        }

        if let Ok(extension) = std::env::var("DUPCODE_EXTENSION") {
            config.extension = non_empty(extension.trim_start_matches('.').to_string());
        }

        Ok(config)
    }

    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.registry_shards == 0 {
            return Err(ScanError::config("registry_shards must be at least 1"));
        }
        if self.max_workers == Some(0) {
            return Err(ScanError::config("max_workers must be at least 1 when set"));
        }
        if matches!(self.delimiter, b'\n' | b'\r' | b'"') {
            return Err(ScanError::config(format!(
                "delimiter {:?} cannot be used as a field separator",
                self.delimiter as char
            )));
        }
        Ok(())
    }
}

/// Parse a delimiter given as a single ASCII character or the word `tab`
pub fn parse_delimiter(value: &str) -> Result<u8> {
    match value {
        "tab" | "\\t" | "\t" => return Ok(b'\t'),
        _ => {},
    }
    match value.as_bytes() {
        [byte] if byte.is_ascii() => Ok(*byte),
        _ => Err(ScanError::config(format!(
            "delimiter must be a single ASCII character, got '{value}'"
        ))),
    }
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| ScanError::config(format!("{name}={raw}: {e}"))),
        Err(_) => Ok(None),
    }
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

#[derive(Default)]
pub struct ScanConfigBuilder {
    config: ScanConfig,
}

impl ScanConfigBuilder {
    pub fn key_column(mut self, column: usize) -> Self {
        self.config.key_column = column;
        self
    }

    pub fn header_sentinel(mut self, sentinel: Option<&str>) -> Self {
        self.config.header_sentinel = sentinel.map(str::to_string);
        self
    }

    pub fn delimiter(mut self, delimiter: u8) -> Self {
        self.config.delimiter = delimiter;
        self
    }

    pub fn max_workers(mut self, limit: usize) -> Self {
        self.config.max_workers = Some(limit);
        self
    }

    pub fn drain_grace(mut self, grace: Duration) -> Self {
        self.config.drain_grace = grace;
        self
    }

    pub fn registry_shards(mut self, shards: usize) -> Self {
        self.config.registry_shards = shards;
        self
    }

    pub fn trim_keys(mut self, trim: bool) -> Self {
        self.config.trim_keys = trim;
        self
    }

    pub fn extension(mut self, extension: impl Into<String>) -> Self {
        self.config.extension = Some(extension.into());
        self
    }

    pub fn build(self) -> ScanConfig {
        self.config
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_barcode_layout() {
        let config = ScanConfig::default();
        assert_eq!(config.key_column, 1);
        assert_eq!(config.header_sentinel.as_deref(), Some("barcode"));
        assert_eq!(config.delimiter, b',');
        assert_eq!(config.max_workers, None);
        assert!(!config.trim_keys);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_delimiter() {
        assert_eq!(parse_delimiter(",").unwrap(), b',');
        assert_eq!(parse_delimiter(";").unwrap(), b';');
        assert_eq!(parse_delimiter("tab").unwrap(), b'\t');
        assert_eq!(parse_delimiter("\\t").unwrap(), b'\t');
        assert!(parse_delimiter("").is_err());
        assert!(parse_delimiter(",,").is_err());
        assert!(parse_delimiter("é").is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(ScanConfig::builder().registry_shards(0).build().validate().is_err());
        assert!(ScanConfig::builder().max_workers(0).build().validate().is_err());
        assert!(ScanConfig::builder().delimiter(b'\n').build().validate().is_err());
    }

    #[test]
    fn test_builder() {
        let config = ScanConfig::builder()
            .key_column(0)
            .header_sentinel(None)
            .delimiter(b'|')
            .max_workers(4)
            .drain_grace(Duration::from_millis(50))
            .registry_shards(1)
            .trim_keys(true)
            .extension("csv")
            .build();

        assert_eq!(config.key_column, 0);
        assert_eq!(config.header_sentinel, None);
        assert_eq!(config.delimiter, b'|');
        assert_eq!(config.max_workers, Some(4));
        assert_eq!(config.drain_grace, Duration::from_millis(50));
        assert_eq!(config.registry_shards, 1);
        assert!(config.trim_keys);
        assert_eq!(config.extension.as_deref(), Some("csv"));
    }
}
