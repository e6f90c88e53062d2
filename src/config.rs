//! Configuration for the indexer.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TaxisError};

/// Tunables shared by every component of a [`crate::indexer::TextIndexer`].
///
/// Every field has a default, so a partial JSON document is a valid
/// configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Number of background hydration workers.
    pub fetch_workers: usize,

    /// Capacity of the background hydration queue.
    pub fetch_queue_capacity: usize,

    /// Lower bound of the synchronous hydration window.
    pub fetch_floor: usize,

    /// Upper clamp for the number of labels requested per facet dimension.
    pub max_facet_values: usize,

    /// Field that unqualified query terms are matched against.
    pub default_text_field: String,

    /// Separator splitting hierarchical (taxonomy) facet values.
    pub path_separator: String,

    /// Number of segments tolerated before adjacent ones are merged.
    pub max_segments: usize,

    /// Whether every write is synced to the device.
    pub sync_writes: bool,

    /// Whether suggestion lookups are maintained at all.
    pub suggest_enabled: bool,

    /// Number of entries the default result cache holds.
    pub cache_capacity: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        IndexerConfig {
            fetch_workers: 4,
            fetch_queue_capacity: 1024,
            fetch_floor: 20,
            max_facet_values: 100,
            default_text_field: "text".to_string(),
            path_separator: "/".to_string(),
            max_segments: 8,
            sync_writes: false,
            suggest_enabled: true,
            cache_capacity: 1024,
        }
    }
}

impl IndexerConfig {
    /// Load a configuration from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            TaxisError::config(format!("cannot read {}: {e}", path.as_ref().display()))
        })?;
        Self::from_json_str(&content)
    }

    /// Parse a configuration from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: IndexerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the indexer cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.fetch_workers == 0 {
            return Err(TaxisError::config("fetch_workers must be at least 1"));
        }
        if self.fetch_queue_capacity == 0 {
            return Err(TaxisError::config("fetch_queue_capacity must be at least 1"));
        }
        if self.max_facet_values == 0 {
            return Err(TaxisError::config("max_facet_values must be at least 1"));
        }
        if self.cache_capacity == 0 {
            return Err(TaxisError::config("cache_capacity must be at least 1"));
        }
        if self.max_segments == 0 {
            return Err(TaxisError::config("max_segments must be at least 1"));
        }
        if self.path_separator.is_empty() {
            return Err(TaxisError::config("path_separator must not be empty"));
        }
        if self.default_text_field.is_empty() {
            return Err(TaxisError::config("default_text_field must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = IndexerConfig::from_json_str(r#"{"fetch_workers": 2}"#).unwrap();
        assert_eq!(config.fetch_workers, 2);
        assert_eq!(config.fetch_floor, 20);
        assert_eq!(config.default_text_field, "text");
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let err = IndexerConfig::from_json_str(r#"{"fetch_workers": 0}"#).unwrap_err();
        assert!(matches!(err, TaxisError::Config(_)));

        let config = IndexerConfig {
            fetch_queue_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("taxis.json");
        std::fs::write(&path, r#"{"max_segments": 3, "sync_writes": true}"#).unwrap();

        let config = IndexerConfig::from_file(&path).unwrap();
        assert_eq!(config.max_segments, 3);
        assert!(config.sync_writes);
        assert!(IndexerConfig::from_file(dir.path().join("missing.json")).is_err());
    }
}
