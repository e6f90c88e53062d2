//! Entity-level index operations on top of the writer.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use log::{debug, info, warn};

use crate::analysis::{Analyzer, StandardAnalyzer};
use crate::config::IndexerConfig;
use crate::document::{BuiltDocument, DocumentBuilder, Indexable, id_term};
use crate::error::{Result, TaxisError};
use crate::index::facets_config::FacetsConfig;
use crate::index::snapshot::IndexSnapshot;
use crate::index::sorters::SortRegistry;
use crate::index::writer::{IndexWriter, WriterConfig};
use crate::query::QueryParser;
use crate::storage::{PrefixedStorage, Storage};

/// Directory of the segments inside the root storage.
pub const INDEX_DIR: &str = "index";

/// Directory of the facet taxonomy inside the root storage.
pub const FACET_DIR: &str = "facet";

/// Owns the index writer together with the facet and sort configuration.
#[derive(Debug)]
pub struct IndexStore {
    root: Arc<dyn Storage>,
    writer: IndexWriter,
    facets: Arc<FacetsConfig>,
    sorters: Arc<SortRegistry>,
    parser: QueryParser,
    path_separator: String,
    text_field: String,
    last_modified: AtomicI64,
}

impl IndexStore {
    /// Open or create the index in `root`, loading the facet and sort
    /// sidecars when present.
    pub fn open(root: Arc<dyn Storage>, config: &IndexerConfig) -> Result<Self> {
        let facets = match FacetsConfig::load(root.as_ref())? {
            Some(facets) => facets,
            None => FacetsConfig::new(),
        };
        let sorters = SortRegistry::load(root.as_ref())?;
        Self::open_with(root, config, facets, sorters)
    }

    /// Open the index in `root` with the given configuration objects.
    pub fn open_with(
        root: Arc<dyn Storage>,
        config: &IndexerConfig,
        facets: FacetsConfig,
        sorters: SortRegistry,
    ) -> Result<Self> {
        let facets = Arc::new(facets);
        let analyzer: Arc<dyn Analyzer> = Arc::new(StandardAnalyzer::new());
        let writer = IndexWriter::open(
            Arc::new(PrefixedStorage::new(INDEX_DIR, root.clone())),
            Arc::new(PrefixedStorage::new(FACET_DIR, root.clone())),
            analyzer,
            facets.clone(),
            WriterConfig {
                max_segments: config.max_segments,
            },
        )?;

        let snapshot = writer.snapshot();
        // Only the class dimension is configured up front.
        if facets.len() <= 1 && snapshot.taxonomy().dims().len() > 1 {
            warn!("facet configuration is missing but the taxonomy has dimensions; using defaults");
        }
        info!(
            "opened index with {} documents and {} facet dimensions",
            snapshot.num_docs(),
            facets.len()
        );

        Ok(IndexStore {
            root,
            writer,
            facets,
            sorters: Arc::new(sorters),
            parser: QueryParser::new(config.default_text_field.clone()),
            path_separator: config.path_separator.clone(),
            text_field: config.default_text_field.clone(),
            last_modified: AtomicI64::new(Utc::now().timestamp_millis()),
        })
    }

    pub fn facets(&self) -> &Arc<FacetsConfig> {
        &self.facets
    }

    pub fn sorters(&self) -> &Arc<SortRegistry> {
        &self.sorters
    }

    pub fn analyzer(&self) -> &Arc<dyn Analyzer> {
        self.writer.analyzer()
    }

    pub fn parser(&self) -> &QueryParser {
        &self.parser
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.root
    }

    /// Separator splitting taxonomy facet values.
    pub fn path_separator(&self) -> &str {
        &self.path_separator
    }

    /// Catch-all text field.
    pub fn text_field(&self) -> &str {
        &self.text_field
    }

    /// Flatten `entity` without indexing it.
    pub fn build(&self, entity: &dyn Indexable) -> BuiltDocument {
        DocumentBuilder::new(&self.facets, &self.sorters)
            .path_separator(&self.path_separator)
            .text_field(&self.text_field)
            .build(entity)
    }

    /// Index `entity`. Returns the `(field, value)` pairs to be added to
    /// the suggestion lookups.
    pub fn add(&self, entity: &dyn Indexable) -> Result<Vec<(String, String)>> {
        let built = self.build(entity);
        debug!("adding {} ({} fields)", entity.kind(), built.document.len());
        self.writer.add(built.document)?;
        self.touch();
        Ok(built.suggestions)
    }

    /// Replace the document of `entity`. Returns `None` when the entity
    /// is not an indexable top-level entity with an identifier.
    pub fn update(&self, entity: &dyn Indexable) -> Result<Option<Vec<(String, String)>>> {
        if !entity.type_policy().indexed || !entity.is_entity() {
            debug!("{} is not an indexable entity; update ignored", entity.kind());
            return Ok(None);
        }
        let Some((field, term)) = id_term(entity) else {
            debug!("{} has no identifier; update ignored", entity.kind());
            return Ok(None);
        };
        let built = self.build(entity);
        debug!("replacing {field}:{term} ({} fields)", built.document.len());
        self.writer.replace(&field, &term, built.document)?;
        self.touch();
        Ok(Some(built.suggestions))
    }

    /// Delete the document of `entity`.
    pub fn remove(&self, entity: &dyn Indexable) -> Result<usize> {
        if !entity.type_policy().indexed || !entity.is_entity() {
            return Err(TaxisError::invalid_operation(format!(
                "{} is not an indexable entity",
                entity.kind()
            )));
        }
        let Some((field, term)) = id_term(entity) else {
            warn!("{} has no identifier; nothing removed", entity.kind());
            return Ok(0);
        };
        let deleted = self.writer.delete_term(&field, &term)?;
        self.touch();
        Ok(deleted)
    }

    /// Delete every document matching the query text.
    pub fn remove_query(&self, text: &str) -> Result<usize> {
        let query = self.parser.parse(text)?;
        let deleted = self.writer.delete_query(&query)?;
        self.touch();
        Ok(deleted)
    }

    /// Delete every document containing the exact term.
    pub fn remove_term(&self, field: &str, term: &str) -> Result<usize> {
        let deleted = self.writer.delete_term(field, term)?;
        self.touch();
        Ok(deleted)
    }

    /// Point-in-time view of the index.
    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        self.writer.snapshot()
    }

    /// Epoch millis of the last change.
    pub fn last_modified(&self) -> i64 {
        self.last_modified.load(Ordering::SeqCst)
    }

    fn touch(&self) {
        self.last_modified
            .fetch_max(Utc::now().timestamp_millis(), Ordering::SeqCst);
    }

    /// Persist the index and both sidecars.
    pub fn commit(&self) -> Result<()> {
        self.writer.commit()?;
        self.save_config()
    }

    /// Write the facet and sort sidecars.
    pub fn save_config(&self) -> Result<()> {
        self.facets.save(self.root.as_ref())?;
        self.sorters.save(self.root.as_ref())
    }
}
