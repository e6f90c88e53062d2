//! Registry of sortable fields and their value types.

use std::collections::BTreeMap;

use chrono::Utc;
use log::info;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::storage::{Storage, read_json, write_json};

/// Name of the sort field sidecar.
pub const SORTER_CONFIG_FILE: &str = "sorter_conf.json";

/// Value type of a sort field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortType {
    String,
    Int,
    Long,
    Float,
    Double,
}

#[derive(Debug, Serialize, Deserialize)]
struct SorterEntry {
    field: String,
    #[serde(rename = "type")]
    ty: SortType,
}

#[derive(Debug, Serialize, Deserialize)]
struct SorterFile {
    created: i64,
    sorters: Vec<SorterEntry>,
}

/// Sort fields discovered at index time.
#[derive(Debug, Default)]
pub struct SortRegistry {
    sorters: RwLock<BTreeMap<String, SortType>>,
}

impl SortRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, field: &str, ty: SortType) {
        self.sorters.write().insert(field.to_string(), ty);
    }

    pub fn contains(&self, field: &str) -> bool {
        self.sorters.read().contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<SortType> {
        self.sorters.read().get(field).copied()
    }

    pub fn fields(&self) -> Vec<(String, SortType)> {
        self.sorters
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sorters.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorters.read().is_empty()
    }

    /// A copy with the same fields.
    pub fn duplicate(&self) -> Self {
        SortRegistry {
            sorters: RwLock::new(self.sorters.read().clone()),
        }
    }

    pub fn save(&self, storage: &dyn Storage) -> Result<()> {
        let file = SorterFile {
            created: Utc::now().timestamp_millis(),
            sorters: self
                .fields()
                .into_iter()
                .map(|(field, ty)| SorterEntry { field, ty })
                .collect(),
        };
        write_json(storage, SORTER_CONFIG_FILE, &file)
    }

    /// Load the sidecar; a missing file yields an empty registry.
    pub fn load(storage: &dyn Storage) -> Result<Self> {
        let registry = SortRegistry::new();
        if let Some(file) = read_json::<SorterFile>(storage, SORTER_CONFIG_FILE)? {
            let mut sorters = registry.sorters.write();
            for entry in file.sorters {
                sorters.insert(entry.field, entry.ty);
            }
        }
        info!("{} sort fields defined", registry.len());
        Ok(registry)
    }
}
