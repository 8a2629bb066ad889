//! Record layout: header detection and key extraction

use crate::config::ScanConfig;
use crate::types::Key;

/// Decides which records are headers and where the key lives
pub trait KeyExtractor: Send + Sync {
    fn is_header(&self, fields: &[String]) -> bool;

    /// `None` when the record carries no key
    fn extract_key(&self, fields: &[String]) -> Option<Key>;
}

/// Fixed-column layout with an optional header sentinel in the first field
///
/// Surrounding whitespace is ignored for the sentinel comparison. Keys are
/// taken verbatim unless [`RecordLayout::trim_keys`] is set, in which case
/// `x, 100` and `y,100` collide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLayout {
    key_column: usize,
    header_sentinel: Option<String>,
    trim_keys: bool,
}

impl RecordLayout {
    pub fn new(key_column: usize, header_sentinel: Option<String>) -> Self {
        Self {
            key_column,
            header_sentinel,
            trim_keys: false,
        }
    }

    pub fn from_config(config: &ScanConfig) -> Self {
        Self::new(config.key_column, config.header_sentinel.clone()).trim_keys(config.trim_keys)
    }

    pub fn trim_keys(mut self, trim: bool) -> Self {
        self.trim_keys = trim;
        self
    }

    pub fn key_column(&self) -> usize {
        self.key_column
    }
}

impl Default for RecordLayout {
    fn default() -> Self {
        Self::from_config(&ScanConfig::default())
    }
}

impl KeyExtractor for RecordLayout {
    fn is_header(&self, fields: &[String]) -> bool {
        match (&self.header_sentinel, fields.first()) {
            (Some(sentinel), Some(first)) => first.trim() == sentinel,
            _ => false,
        }
    }

    fn extract_key(&self, fields: &[String]) -> Option<Key> {
        let field = fields.get(self.key_column)?;
        Some(Key::new(if self.trim_keys { field.trim() } else { field.as_str() }))
    }
}
