//! The set of suggestion lookups of an index.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::RwLock;

use crate::error::Result;
use crate::storage::{PrefixedStorage, Storage};
use crate::suggest::lookup::{LOOKUP_FILE, SuggestLookup, stored_field};
use crate::suggest::{SuggestResult, TermSource, sanitize_name};

/// Directory of the lookups inside the root storage.
pub const SUGGEST_DIR: &str = "suggest";

/// Lookups by sanitized field name, created on first use.
#[derive(Debug)]
pub struct SuggestStore {
    root: Arc<dyn Storage>,
    lookups: RwLock<BTreeMap<String, Arc<SuggestLookup>>>,
}

impl SuggestStore {
    /// Open every lookup found under `suggest/` in `root`.
    pub fn open(root: Arc<dyn Storage>, source: &dyn TermSource) -> Result<Self> {
        let prefix = format!("{SUGGEST_DIR}/");
        let suffix = format!("/{LOOKUP_FILE}");
        let mut lookups = BTreeMap::new();
        for file in root.list_files()? {
            let Some(name) = file
                .strip_prefix(prefix.as_str())
                .and_then(|rest| rest.strip_suffix(suffix.as_str()))
            else {
                continue;
            };
            if name.is_empty() || name.contains('/') {
                continue;
            }
            let storage = Self::lookup_storage(&root, name);
            let field = stored_field(storage.as_ref()).unwrap_or_else(|| name.to_string());
            lookups.insert(
                name.to_string(),
                Arc::new(SuggestLookup::open(&field, storage, source)),
            );
        }
        info!("## {SUGGEST_DIR}: {} lookups loaded", lookups.len());
        Ok(SuggestStore {
            root,
            lookups: RwLock::new(lookups),
        })
    }

    /// Store without any lookups.
    pub fn empty(root: Arc<dyn Storage>) -> Self {
        SuggestStore {
            root,
            lookups: RwLock::new(BTreeMap::new()),
        }
    }

    fn lookup_storage(root: &Arc<dyn Storage>, name: &str) -> Arc<dyn Storage> {
        Arc::new(PrefixedStorage::new(
            format!("{SUGGEST_DIR}/{name}"),
            root.clone(),
        ))
    }

    /// Record `value` for `field`, creating its lookup from `source` when
    /// it does not exist yet.
    pub fn add_value(&self, field: &str, value: &str, source: &dyn TermSource) {
        let name = sanitize_name(field);
        if let Some(lookup) = self.lookups.read().get(&name) {
            lookup.add(value);
            return;
        }
        let mut lookups = self.lookups.write();
        let lookup = lookups.entry(name.clone()).or_insert_with(|| {
            let storage = Self::lookup_storage(&self.root, &name);
            Arc::new(SuggestLookup::open(field, storage, source))
        });
        lookup.add(value);
    }

    /// Suggestions for `key` from `field`, or from every lookup when no
    /// field is given.
    pub fn suggest(&self, field: Option<&str>, key: &str, max: usize) -> Vec<SuggestResult> {
        match field {
            Some(field) => match self.lookup(field) {
                Some(lookup) => lookup.suggest(key, max),
                None => {
                    debug!("Unknown suggest field {field:?}");
                    Vec::new()
                }
            },
            None => {
                let lookups: Vec<Arc<SuggestLookup>> =
                    self.lookups.read().values().cloned().collect();
                lookups
                    .iter()
                    .flat_map(|lookup| lookup.suggest(key, max))
                    .take(max)
                    .collect()
            }
        }
    }

    pub fn lookup(&self, field: &str) -> Option<Arc<SuggestLookup>> {
        self.lookups.read().get(&sanitize_name(field)).cloned()
    }

    /// Names of the known lookups.
    pub fn fields(&self) -> Vec<String> {
        self.lookups.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lookups.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lookups.read().is_empty()
    }

    /// Persist every lookup that changed. All lookups are attempted; the
    /// first failure is returned.
    pub fn save(&self) -> Result<()> {
        let mut first_error = None;
        for lookup in self.lookups.read().values() {
            if let Err(e) = lookup.save() {
                warn!("Can't persist lookup {}: {e}", lookup.name());
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
