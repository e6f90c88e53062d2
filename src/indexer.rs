//! The indexer handle: one index directory with its search engine, fetch
//! workers, suggestion lookups and caches.
//!
//! A [`TextIndexer`] is created once per index through
//! [`TextIndexerBuilder`] and shared by reference; there is no global
//! registry of indexers.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use taxis::entity::MemoryResolver;
//! use taxis::prelude::*;
//!
//! # fn main() -> taxis::error::Result<()> {
//! let indexer = TextIndexer::builder()
//!     .dir("/tmp/taxis-index")
//!     .resolver(Arc::new(MemoryResolver::new()))
//!     .build()?;
//! let result = indexer.search(SearchOptions::new().kind("ix.Widget"), Some("gear"), None)?;
//! println!("{} hits", result.count());
//! indexer.shutdown()?;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, warn};

use crate::cache::{Cache, MemoryCache};
use crate::config::IndexerConfig;
use crate::document::{EntityRef, Indexable, id_term};
use crate::entity::{EntityResolver, NoSubtypes, SubtypeRegistry};
use crate::error::{Result, TaxisError};
use crate::facet::FacetCounts;
use crate::fetch::FetchPool;
use crate::index::{FacetsConfig, IndexStore, SortRegistry};
use crate::query::Query;
use crate::search::{SearchEngine, SearchOptions, SearchResult, subset_filter};
use crate::storage::{FileStorage, MemoryStorage, Storage, StorageConfig};
use crate::suggest::{SuggestLookup, SuggestResult, SuggestStore};
use crate::termvec::{TermVectorService, TermVectors};

/// Builder for [`TextIndexer`].
#[derive(Debug, Default)]
pub struct TextIndexerBuilder {
    dir: Option<PathBuf>,
    storage: Option<Arc<dyn Storage>>,
    config: IndexerConfig,
    resolver: Option<Arc<dyn EntityResolver>>,
    subtypes: Option<Arc<dyn SubtypeRegistry>>,
    cache: Option<Arc<dyn Cache>>,
}

impl TextIndexerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep the index in `dir`, creating it when needed.
    pub fn dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Keep the index in `storage`. Takes precedence over [`dir`](Self::dir).
    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn config(mut self, config: IndexerConfig) -> Self {
        self.config = config;
        self
    }

    /// Loads the entities of hits. Required.
    pub fn resolver(mut self, resolver: Arc<dyn EntityResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Subtypes included in kind filters. Defaults to none.
    pub fn subtypes(mut self, subtypes: Arc<dyn SubtypeRegistry>) -> Self {
        self.subtypes = Some(subtypes);
        self
    }

    /// Cache for search results and term vectors. Defaults to a private
    /// [`MemoryCache`].
    pub fn cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn build(self) -> Result<TextIndexer> {
        self.config.validate()?;
        let resolver = self
            .resolver
            .ok_or_else(|| TaxisError::config("an entity resolver is required"))?;
        let storage: Arc<dyn Storage> = match (self.storage, self.dir) {
            (Some(storage), _) => storage,
            (None, Some(dir)) => Arc::new(FileStorage::new(
                &dir,
                StorageConfig {
                    sync_writes: self.config.sync_writes,
                    ..StorageConfig::default()
                },
            )?),
            (None, None) => Arc::new(MemoryStorage::new_default()),
        };
        let store = IndexStore::open(storage.clone(), &self.config)?;
        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(MemoryCache::with_capacity(self.config.cache_capacity)));
        TextIndexer::assemble(
            storage,
            store,
            self.config,
            resolver,
            self.subtypes.unwrap_or_else(|| Arc::new(NoSubtypes)),
            cache,
        )
    }
}

/// Text index over entity objects.
#[derive(Debug)]
pub struct TextIndexer {
    config: IndexerConfig,
    store: Arc<IndexStore>,
    engine: SearchEngine,
    pool: Arc<FetchPool>,
    suggest: SuggestStore,
    termvec: TermVectorService,
    resolver: Arc<dyn EntityResolver>,
    subtypes: Arc<dyn SubtypeRegistry>,
    cache: Arc<dyn Cache>,
    closed: AtomicBool,
}

impl TextIndexer {
    pub fn builder() -> TextIndexerBuilder {
        TextIndexerBuilder::new()
    }

    /// Open or create the index in `dir` with the default configuration.
    pub fn open_dir<P: AsRef<Path>>(dir: P, resolver: Arc<dyn EntityResolver>) -> Result<Self> {
        Self::builder().dir(dir).resolver(resolver).build()
    }

    fn assemble(
        storage: Arc<dyn Storage>,
        store: IndexStore,
        config: IndexerConfig,
        resolver: Arc<dyn EntityResolver>,
        subtypes: Arc<dyn SubtypeRegistry>,
        cache: Arc<dyn Cache>,
    ) -> Result<Self> {
        let store = Arc::new(store);
        let pool = Arc::new(FetchPool::new(
            config.fetch_workers,
            config.fetch_queue_capacity,
            config.fetch_floor,
        )?);
        let engine = SearchEngine::new(store.clone(), subtypes.clone(), resolver.clone(), pool.clone())
            .with_cache(cache.clone())
            .with_max_facet_values(config.max_facet_values);
        let suggest = if config.suggest_enabled {
            SuggestStore::open(storage, store.snapshot().as_ref())?
        } else {
            SuggestStore::empty(storage)
        };
        let termvec = TermVectorService::new(store.clone(), cache.clone());
        info!(
            "indexer ready: {} documents, {} suggest fields",
            store.snapshot().num_docs(),
            suggest.len()
        );

        Ok(TextIndexer {
            config,
            store,
            engine,
            pool,
            suggest,
            termvec,
            resolver,
            subtypes,
            cache,
            closed: AtomicBool::new(false),
        })
    }

    /// A RAM-backed indexer with a copy of this indexer's facet and sort
    /// configuration and no documents.
    pub fn create_empty_instance(&self) -> Result<Self> {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let store = IndexStore::open_with(
            storage.clone(),
            &self.config,
            self.store.facets().duplicate(),
            self.store.sorters().duplicate(),
        )?;
        Self::assemble(
            storage,
            store,
            self.config.clone(),
            self.resolver.clone(),
            self.subtypes.clone(),
            Arc::new(MemoryCache::with_capacity(self.config.cache_capacity)),
        )
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<IndexStore> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<dyn Cache> {
        &self.cache
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TaxisError::invalid_operation("indexer is shut down"));
        }
        Ok(())
    }

    fn feed_suggestions(&self, suggestions: Vec<(String, String)>) {
        if !self.config.suggest_enabled || suggestions.is_empty() {
            return;
        }
        let snapshot = self.store.snapshot();
        for (field, value) in suggestions {
            self.suggest.add_value(&field, &value, snapshot.as_ref());
        }
    }

    /// Index `entity`. Entities whose type is not indexable are ignored.
    pub fn add(&self, entity: &dyn Indexable) -> Result<()> {
        self.check_open()?;
        if !entity.type_policy().indexed {
            debug!("{} is not indexable; ignored", entity.kind());
            return Ok(());
        }
        let suggestions = self.store.add(entity)?;
        self.feed_suggestions(suggestions);
        Ok(())
    }

    /// Replace the document of `entity`. Returns whether anything was
    /// indexed.
    pub fn update(&self, entity: &dyn Indexable) -> Result<bool> {
        self.check_open()?;
        match self.store.update(entity)? {
            Some(suggestions) => {
                self.feed_suggestions(suggestions);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Delete the document of `entity`; fails for non-indexable types.
    pub fn remove(&self, entity: &dyn Indexable) -> Result<usize> {
        self.check_open()?;
        self.store.remove(entity)
    }

    /// Delete the documents matching `text`. Text that does not parse is
    /// reported and nothing is deleted.
    pub fn remove_query(&self, text: &str) -> Result<usize> {
        self.check_open()?;
        self.store.remove_query(text)
    }

    /// Search for `text`, or for everything when it is `None`.
    pub fn search(
        &self,
        options: SearchOptions,
        text: Option<&str>,
        subset: Option<&[EntityRef]>,
    ) -> Result<Arc<SearchResult>> {
        self.engine.search(options, text, subset)
    }

    /// Every document of `subset`, with half as many facet labels as there
    /// are entities.
    pub fn filter(&self, mut options: SearchOptions, subset: &[EntityRef]) -> Result<Arc<SearchResult>> {
        options.top = subset.len();
        options.skip = 0;
        options.fdim = subset.len() / 2;
        self.engine
            .execute(options, None, &Query::MatchAll, Some(subset_filter(subset)))
    }

    /// Documents whose numeric `field` lies within `[min, max]`; an open
    /// bound is unbounded.
    pub fn range(
        &self,
        options: SearchOptions,
        field: &str,
        min: Option<f64>,
        max: Option<f64>,
    ) -> Result<Arc<SearchResult>> {
        let query = Query::range(field, min, max);
        let filter = self.engine.kind_filter(&options);
        self.engine
            .execute(options, Some(query.to_string()), &query, filter)
    }

    /// Label counts of `dim` over every document.
    pub fn facet_label_counts(&self, dim: &str) -> BTreeMap<String, usize> {
        let snapshot = self.store.snapshot();
        let counts = FacetCounts::count(&snapshot, snapshot.live_docs());
        match counts.top_children(snapshot.taxonomy(), dim, usize::MAX) {
            Some(facet) => facet
                .values()
                .iter()
                .map(|fv| (fv.label.clone(), fv.count))
                .collect(),
            None => BTreeMap::new(),
        }
    }

    /// Up to `max` suggestions for `key`, from `field` or from every field.
    pub fn suggest(&self, field: Option<&str>, key: &str, max: usize) -> Vec<SuggestResult> {
        self.suggest.suggest(field, key, max)
    }

    pub fn suggest_fields(&self) -> Vec<String> {
        self.suggest.fields()
    }

    /// The lookup of `field`, if any value of it was indexed.
    pub fn suggest_lookup(&self, field: &str) -> Option<Arc<SuggestLookup>> {
        self.suggest.lookup(field)
    }

    pub fn term_vectors(&self, kind: &str, field: &str) -> Result<Arc<TermVectors>> {
        self.termvec.term_vectors(kind, field)
    }

    pub fn term_vectors_filtered(
        &self,
        kind: &str,
        field: &str,
        filters: &BTreeMap<String, String>,
    ) -> Result<Arc<TermVectors>> {
        self.termvec.term_vectors_filtered(kind, field, filters)
    }

    pub fn conditional_term_vectors(
        &self,
        kind: &str,
        field: &str,
        conditional: &str,
    ) -> Result<Arc<BTreeMap<String, Arc<TermVectors>>>> {
        self.termvec.conditional_term_vectors(kind, field, conditional)
    }

    /// Drop the cached term vectors of `kind` involving `fields`.
    pub fn clear_caches(&self, kind: &str, fields: &[&str]) -> usize {
        self.termvec.clear_caches(kind, fields)
    }

    /// The indexed content of `entity` as JSON, or `None` when it is not in
    /// the index.
    pub fn doc_json(&self, entity: &dyn Indexable) -> Result<Option<serde_json::Value>> {
        let Some((field, term)) = id_term(entity) else {
            return Ok(None);
        };
        let snapshot = self.store.snapshot();
        let found = snapshot
            .postings(&field, &term)
            .first()
            .and_then(|(doc, _)| snapshot.doc(*doc));
        match found {
            Some(doc) => Ok(Some(serde_json::to_value(doc)?)),
            None => Ok(None),
        }
    }

    /// The facet dimension configuration, in sidecar format.
    pub fn facets_config(&self) -> Result<serde_json::Value> {
        self.store.facets().to_json()
    }

    /// Number of live documents.
    pub fn size(&self) -> usize {
        self.store.snapshot().num_docs()
    }

    /// Epoch millis of the last change to the index.
    pub fn last_modified(&self) -> i64 {
        self.store.last_modified()
    }

    /// Persist the index, both sidecars and the changed lookups.
    pub fn commit(&self) -> Result<()> {
        self.store.commit()?;
        self.suggest.save()
    }

    /// Stop the fetch workers and persist everything. Further writes fail.
    pub fn shutdown(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.pool.shutdown();
        let committed = self.commit();
        if let Err(e) = &committed {
            warn!("commit on shutdown failed: {e}");
        }
        info!("indexer shut down");
        committed
    }
}

impl Drop for TextIndexer {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::SeqCst) {
            debug!("indexer dropped without shutdown; uncommitted changes stay in the log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{FieldSet, IdValue, IndexPolicy};
    use crate::entity::MemoryResolver;

    #[derive(Debug)]
    struct Widget {
        id: i64,
        name: String,
        color: &'static str,
        weight: i64,
    }

    impl Indexable for Widget {
        fn kind(&self) -> &str {
            "ix.test.Widget"
        }

        fn describe<'a>(&'a self, fields: &mut FieldSet<'a>) {
            fields
                .id("id", self.id)
                .field_with("name", IndexPolicy::new().suggest(), &self.name)
                .field_with("color", IndexPolicy::new().facet().named("Color"), self.color)
                .field_with("weight", IndexPolicy::new().sortable(), self.weight);
        }
    }

    fn widget(id: i64, name: &str, color: &'static str) -> Arc<Widget> {
        Arc::new(Widget {
            id,
            name: name.to_string(),
            color,
            weight: id * 10,
        })
    }

    fn indexer() -> (TextIndexer, Arc<MemoryResolver>) {
        let resolver = Arc::new(MemoryResolver::new());
        let indexer = TextIndexer::builder()
            .resolver(resolver.clone())
            .build()
            .unwrap();
        for (id, name, color) in [
            (1, "Sprocket", "Red"),
            (2, "Gear", "Red"),
            (3, "Flange", "Blue"),
        ] {
            let w = widget(id, name, color);
            indexer.add(w.as_ref()).unwrap();
            resolver.insert(w);
        }
        (indexer, resolver)
    }

    #[test]
    fn test_builder_requires_resolver() {
        assert!(TextIndexer::builder().build().is_err());
        let config = IndexerConfig {
            fetch_workers: 0,
            ..IndexerConfig::default()
        };
        let built = TextIndexer::builder()
            .config(config)
            .resolver(Arc::new(MemoryResolver::new()))
            .build();
        assert!(built.is_err());
    }

    #[test]
    fn test_filter_and_range() {
        let (indexer, resolver) = indexer();
        let subset: Vec<EntityRef> = [1i64, 3]
            .iter()
            .filter_map(|&id| resolver.resolve("ix.test.Widget", &IdValue::Long(id), &[]).unwrap())
            .collect();
        let filtered = indexer.filter(SearchOptions::new().fetch(0), &subset).unwrap();
        assert_eq!(filtered.count(), 2);

        let ranged = indexer
            .range(SearchOptions::new().fetch(0), "weight", Some(20.0), Some(30.0))
            .unwrap();
        assert_eq!(ranged.count(), 2);
    }

    #[test]
    fn test_facet_label_counts_and_config() {
        let (indexer, _) = indexer();
        let counts = indexer.facet_label_counts("Color");
        assert_eq!(counts.get("Red"), Some(&2));
        assert_eq!(counts.get("Blue"), Some(&1));
        assert!(indexer.facet_label_counts("Missing").is_empty());

        let config = indexer.facets_config().unwrap();
        assert!(config.to_string().contains("Color"));
    }

    #[test]
    fn test_suggestions_follow_updates() {
        let (indexer, _) = indexer();
        assert_eq!(indexer.suggest(Some("name"), "spr", 5)[0].key, "Sprocket");
        indexer.update(widget(2, "Gearbox", "Red").as_ref()).unwrap();
        assert!(indexer
            .suggest(Some("name"), "gearb", 5)
            .iter()
            .any(|r| r.key == "Gearbox"));
        assert_eq!(indexer.size(), 3);
        assert_eq!(indexer.suggest_fields(), vec!["name"]);
    }

    #[test]
    fn test_doc_json_and_empty_instance() {
        let (indexer, _) = indexer();
        let json = indexer.doc_json(widget(1, "Sprocket", "Red").as_ref()).unwrap().unwrap();
        assert!(json.to_string().contains("Sprocket"));
        assert!(indexer.doc_json(widget(9, "None", "Red").as_ref()).unwrap().is_none());

        let empty = indexer.create_empty_instance().unwrap();
        assert_eq!(empty.size(), 0);
        assert!(empty.store().facets().is_configured("Color"));
        assert!(empty.store().sorters().contains("weight"));
    }

    #[test]
    fn test_shutdown_rejects_writes() {
        let (indexer, _) = indexer();
        indexer.shutdown().unwrap();
        indexer.shutdown().unwrap();
        assert!(indexer.add(widget(4, "Bolt", "Red").as_ref()).is_err());
    }
}
