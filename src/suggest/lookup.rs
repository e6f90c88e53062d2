//! Infix lookup over the values of one field.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use std::time::Instant;

use log::{debug, warn};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use crate::error::Result;
use crate::storage::{Storage, read_blob, read_json, write_blob, write_json};
use crate::suggest::{SuggestResult, TermSource, sanitize_name};

/// File holding the values of a lookup.
pub const LOOKUP_FILE: &str = "lookup.bin";

/// Sidecar naming the indexed field of a lookup. Kept apart from the
/// values so a broken `lookup.bin` can still be rebuilt from the index.
pub const FIELD_FILE: &str = "field.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct LookupData {
    field: String,
    weights: BTreeMap<String, u64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct FieldData {
    field: String,
}

/// The indexed field recorded in `storage`, if any.
pub fn stored_field(storage: &dyn Storage) -> Option<String> {
    match read_json::<FieldData>(storage, FIELD_FILE) {
        Ok(data) => data.map(|d| d.field),
        Err(e) => {
            warn!("Unreadable {FIELD_FILE}: {e}");
            None
        }
    }
}

/// A value as seen by queries.
#[derive(Debug, Clone)]
struct Entry {
    key: String,
    words: Vec<String>,
    weight: u64,
}

impl Entry {
    fn new(key: &str, weight: u64) -> Self {
        Entry {
            key: key.to_string(),
            words: key.unicode_words().map(str::to_lowercase).collect(),
            weight,
        }
    }

    /// Whether every query word starts some word of the value.
    fn matches(&self, query: &[String]) -> bool {
        query
            .iter()
            .all(|q| self.words.iter().any(|w| w.starts_with(q.as_str())))
    }

    fn highlight(&self, query: &[String]) -> String {
        let mut out = String::with_capacity(self.key.len() + 8);
        for (_, word) in self.key.split_word_bound_indices() {
            let lower = word.to_lowercase();
            let matched = query
                .iter()
                .filter(|q| lower.starts_with(q.as_str()))
                .map(|q| q.chars().count())
                .max();
            match matched {
                Some(n) if n > 0 => {
                    let split = word.char_indices().nth(n).map_or(word.len(), |(i, _)| i);
                    out.push_str("<b>");
                    out.push_str(&word[..split]);
                    out.push_str("</b>");
                    out.push_str(&word[split..]);
                }
                _ => out.push_str(word),
            }
        }
        out
    }
}

/// Heavier values first, then alphabetical.
fn by_weight(a: &Entry, b: &Entry) -> Ordering {
    b.weight.cmp(&a.weight).then_with(|| a.key.cmp(&b.key))
}

/// Suggestions for one field.
///
/// Added values are buffered and counted as dirty. A query first refreshes
/// the searchable view if anything was added since the last refresh;
/// concurrent refreshes are serialized.
///
/// The lookup is named after its field with [`sanitize_name`]; the field
/// itself is what the index is asked for when the values are rebuilt.
#[derive(Debug)]
pub struct SuggestLookup {
    field: String,
    name: String,
    storage: Arc<dyn Storage>,
    weights: Mutex<BTreeMap<String, u64>>,
    view: RwLock<Arc<Vec<Entry>>>,
    dirty: AtomicUsize,
    unsaved: AtomicBool,
    refresh_lock: Mutex<()>,
    refreshes: AtomicUsize,
}

impl SuggestLookup {
    fn empty(field: &str, storage: Arc<dyn Storage>) -> Self {
        SuggestLookup {
            field: field.to_string(),
            name: sanitize_name(field),
            storage,
            weights: Mutex::new(BTreeMap::new()),
            view: RwLock::new(Arc::new(Vec::new())),
            dirty: AtomicUsize::new(0),
            unsaved: AtomicBool::new(false),
            refresh_lock: Mutex::new(()),
            refreshes: AtomicUsize::new(0),
        }
    }

    /// Open the lookup of `field` kept in `storage`. A missing or
    /// unreadable lookup is rebuilt from the values `source` holds for
    /// `field`.
    pub fn open(field: &str, storage: Arc<dyn Storage>, source: &dyn TermSource) -> Self {
        let lookup = Self::empty(field, storage);
        let name = lookup.name.as_str();
        if !lookup.storage.file_exists(LOOKUP_FILE) {
            debug!("Initializing lookup {name}");
            lookup.build(source);
            return lookup;
        }
        match read_blob::<LookupData>(lookup.storage.as_ref(), LOOKUP_FILE) {
            Ok(data) => {
                debug!("{} entries loaded for {name}", data.weights.len());
                *lookup.weights.lock() = data.weights;
                lookup.rebuild_view();
            }
            Err(e) => {
                warn!("Error loading lookup {name} ({e}); will reinitialize");
                lookup.build(source);
            }
        }
        lookup
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The indexed field the values come from.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Replace the content with the values of `source`.
    pub fn build(&self, source: &dyn TermSource) -> usize {
        let started = Instant::now();
        let weights = source.term_weights(&self.field);
        let count = weights.len();
        *self.weights.lock() = weights;
        self.rebuild_view();
        self.unsaved.store(true, AtomicOrdering::SeqCst);
        debug!(
            "lookup {} builds {count} entries in {:.2}s",
            self.name,
            started.elapsed().as_secs_f64()
        );
        count
    }

    /// Record one more occurrence of `text`. Not visible until the next
    /// refresh.
    pub fn add(&self, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        *self.weights.lock().entry(text.to_string()).or_insert(0) += 1;
        self.unsaved.store(true, AtomicOrdering::SeqCst);
        self.dirty.fetch_add(1, AtomicOrdering::SeqCst);
    }

    /// Number of additions not yet visible to queries.
    pub fn dirty(&self) -> usize {
        self.dirty.load(AtomicOrdering::SeqCst)
    }

    /// Number of refreshes performed so far.
    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(AtomicOrdering::SeqCst)
    }

    /// Number of values visible to queries.
    pub fn count(&self) -> usize {
        self.view.read().len()
    }

    /// Make every added value visible.
    pub fn refresh(&self) {
        let _guard = self.refresh_lock.lock();
        let seen = self.dirty.load(AtomicOrdering::SeqCst);
        if seen == 0 {
            return;
        }
        let started = Instant::now();
        self.rebuild_view();
        self.dirty.fetch_sub(seen, AtomicOrdering::SeqCst);
        self.refreshes.fetch_add(1, AtomicOrdering::SeqCst);
        debug!(
            "lookup {} refreshes {} entries in {:.2}s",
            self.name,
            self.count(),
            started.elapsed().as_secs_f64()
        );
    }

    fn rebuild_view(&self) {
        let mut entries: Vec<Entry> = self
            .weights
            .lock()
            .iter()
            .map(|(key, &weight)| Entry::new(key, weight))
            .collect();
        entries.sort_by(by_weight);
        *self.view.write() = Arc::new(entries);
    }

    /// Up to `max` values with a word starting with each word of `key`.
    pub fn suggest(&self, key: &str, max: usize) -> Vec<SuggestResult> {
        if self.dirty() > 0 {
            self.refresh();
        }
        let query: Vec<String> = key.unicode_words().map(str::to_lowercase).collect();
        if query.is_empty() || max == 0 {
            return Vec::new();
        }
        let view = self.view.read().clone();
        view.iter()
            .filter(|entry| entry.matches(&query))
            .take(max)
            .map(|entry| SuggestResult {
                field: self.name.clone(),
                key: entry.key.clone(),
                highlight: entry.highlight(&query),
            })
            .collect()
    }

    /// Persist the values if they changed since the last save.
    pub fn save(&self) -> Result<()> {
        if !self.unsaved.swap(false, AtomicOrdering::SeqCst) {
            return Ok(());
        }
        let data = LookupData {
            field: self.field.clone(),
            weights: self.weights.lock().clone(),
        };
        let field = FieldData {
            field: self.field.clone(),
        };
        let saved = write_json(self.storage.as_ref(), FIELD_FILE, &field)
            .and_then(|_| write_blob(self.storage.as_ref(), LOOKUP_FILE, &data));
        if saved.is_err() {
            self.unsaved.store(true, AtomicOrdering::SeqCst);
        }
        saved
    }
}
