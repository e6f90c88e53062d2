//! Per-dimension facet configuration and its JSON sidecar.

use std::collections::BTreeMap;

use chrono::Utc;
use log::{info, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::document::DIM_CLASS;
use crate::error::Result;
use crate::storage::{Storage, read_json, write_json};

/// Name of the facet configuration sidecar.
pub const FACETS_CONFIG_FILE: &str = "facet_conf.json";

/// Field facet ordinals are indexed under unless configured otherwise.
pub const DEFAULT_INDEX_FIELD_NAME: &str = "$facets";

const WARNING: &str = "AUTOMATICALLY GENERATED FILE; DO NOT EDIT";

/// Configuration of one facet dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DimConfig {
    pub hierarchical: bool,
    pub multi_valued: bool,
    pub require_dim_count: bool,
    pub index_field_name: String,
}

impl Default for DimConfig {
    fn default() -> Self {
        DimConfig {
            hierarchical: false,
            multi_valued: false,
            require_dim_count: false,
            index_field_name: DEFAULT_INDEX_FIELD_NAME.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct DimEntry {
    dim: String,
    #[serde(flatten)]
    config: DimConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct FacetsConfigFile {
    created: i64,
    version: String,
    #[serde(default)]
    warning: String,
    size: usize,
    dims: Vec<DimEntry>,
}

/// Dimension configurations shared by the document builder, the index
/// writer and the facet engine.
#[derive(Debug)]
pub struct FacetsConfig {
    dims: RwLock<BTreeMap<String, DimConfig>>,
}

impl Default for FacetsConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl FacetsConfig {
    /// A configuration with only the kind dimension.
    pub fn new() -> Self {
        let mut dims = BTreeMap::new();
        dims.insert(
            DIM_CLASS.to_string(),
            DimConfig {
                multi_valued: true,
                require_dim_count: true,
                ..Default::default()
            },
        );
        FacetsConfig {
            dims: RwLock::new(dims),
        }
    }

    /// Configure a dimension discovered at index time.
    ///
    /// A new dimension becomes multi-valued with dimension counts. An existing
    /// one keeps its settings, except that it turns hierarchical on request.
    pub fn register_dim(&self, dim: &str, hierarchical: bool) {
        if let Some(config) = self.dims.read().get(dim) {
            if !hierarchical || config.hierarchical {
                return;
            }
        }
        let mut dims = self.dims.write();
        let config = dims.entry(dim.to_string()).or_insert_with(|| DimConfig {
            multi_valued: true,
            require_dim_count: true,
            ..Default::default()
        });
        if hierarchical {
            config.hierarchical = true;
        }
    }

    /// Replace the configuration of `dim`.
    pub fn set_dim_config(&self, dim: &str, config: DimConfig) {
        self.dims.write().insert(dim.to_string(), config);
    }

    pub fn set_multi_valued(&self, dim: &str, value: bool) {
        self.dims.write().entry(dim.to_string()).or_default().multi_valued = value;
    }

    pub fn set_hierarchical(&self, dim: &str, value: bool) {
        self.dims.write().entry(dim.to_string()).or_default().hierarchical = value;
    }

    pub fn set_require_dim_count(&self, dim: &str, value: bool) {
        self.dims.write().entry(dim.to_string()).or_default().require_dim_count = value;
    }

    /// Configuration of `dim`; unconfigured dimensions get the defaults.
    pub fn dim_config(&self, dim: &str) -> DimConfig {
        self.dims.read().get(dim).cloned().unwrap_or_default()
    }

    pub fn is_configured(&self, dim: &str) -> bool {
        self.dims.read().contains_key(dim)
    }

    /// All configured dimensions, sorted by name.
    pub fn dims(&self) -> Vec<(String, DimConfig)> {
        self.dims
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.dims.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.dims.read().is_empty()
    }

    /// A copy with the same dimensions.
    pub fn duplicate(&self) -> Self {
        FacetsConfig {
            dims: RwLock::new(self.dims.read().clone()),
        }
    }

    fn to_file(&self) -> FacetsConfigFile {
        let dims = self.dims.read();
        FacetsConfigFile {
            created: Utc::now().timestamp_millis(),
            version: crate::VERSION.to_string(),
            warning: WARNING.to_string(),
            size: dims.len(),
            dims: dims
                .iter()
                .map(|(dim, config)| DimEntry {
                    dim: dim.clone(),
                    config: config.clone(),
                })
                .collect(),
        }
    }

    /// The sidecar document as JSON.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self.to_file())?)
    }

    /// Write the sidecar atomically.
    pub fn save(&self, storage: &dyn Storage) -> Result<()> {
        write_json(storage, FACETS_CONFIG_FILE, &self.to_file())
    }

    /// Load the sidecar, returning `None` when there is none.
    ///
    /// A sidecar written by another version is still loaded; the mismatch is
    /// only reported.
    pub fn load(storage: &dyn Storage) -> Result<Option<Self>> {
        let Some(file) = read_json::<FacetsConfigFile>(storage, FACETS_CONFIG_FILE)? else {
            return Ok(None);
        };
        if file.version != crate::VERSION {
            warn!(
                "{FACETS_CONFIG_FILE} was written by version {} but this is {}",
                file.version,
                crate::VERSION
            );
        }
        let config = FacetsConfig::new();
        {
            let mut dims = config.dims.write();
            for entry in file.dims {
                dims.insert(entry.dim, entry.config);
            }
        }
        info!("facets config loaded with {} dimensions", config.len());
        Ok(Some(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[test]
    fn test_register_dim() {
        let config = FacetsConfig::new();
        assert!(config.dim_config(DIM_CLASS).multi_valued);

        config.register_dim("Color", false);
        let color = config.dim_config("Color");
        assert!(color.multi_valued && color.require_dim_count && !color.hierarchical);

        config.register_dim("Color", true);
        assert!(config.dim_config("Color").hierarchical);

        config.set_multi_valued("Status", false);
        config.register_dim("Status", false);
        assert!(!config.dim_config("Status").multi_valued);
        assert!(!config.dim_config("Unknown").multi_valued);
    }

    #[test]
    fn test_sidecar_round_trip() {
        let storage = MemoryStorage::new_default();
        assert!(FacetsConfig::load(&storage).unwrap().is_none());

        let config = FacetsConfig::new();
        config.register_dim("Category", true);
        config.save(&storage).unwrap();

        let json: serde_json::Value =
            serde_json::from_slice(&crate::storage::read_all(&storage, FACETS_CONFIG_FILE).unwrap())
                .unwrap();
        assert_eq!(json["size"], 2);
        assert_eq!(json["warning"], WARNING);
        assert_eq!(json["dims"][0]["dim"], "Category");
        assert_eq!(json["dims"][0]["indexFieldName"], "$facets");
        assert_eq!(json["dims"][0]["hierarchical"], true);

        let loaded = FacetsConfig::load(&storage).unwrap().unwrap();
        assert_eq!(loaded.dims(), config.dims());
    }

    #[test]
    fn test_version_mismatch_still_loads() {
        let storage = MemoryStorage::new_default();
        let json = r#"{"created": 0, "version": "LUCENE_4_9", "size": 1,
            "dims": [{"dim": "Color", "hierarchical": false, "indexFieldName": "$facets",
                      "multiValued": true, "requireDimCount": true}]}"#;
        storage.put(FACETS_CONFIG_FILE, json.as_bytes());

        let loaded = FacetsConfig::load(&storage).unwrap().unwrap();
        assert!(loaded.dim_config("Color").multi_valued);
        assert!(loaded.is_configured(DIM_CLASS));
    }
}
