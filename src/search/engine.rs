//! Query execution, faceting and hand-off to hydration.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use log::{debug, warn};

use crate::cache::{Cache, CacheExt, cache_key};
use crate::document::{
    EntityRef, GIVEN_START_WORD, GIVEN_STOP_WORD, START_WORD, STOP_WORD, id_term,
};
use crate::entity::{EntityResolver, SubtypeRegistry};
use crate::error::Result;
use crate::facet::{DrillDown, FacetCounts};
use crate::fetch::{FetchPayload, FetchPool};
use crate::index::{DocId, IndexStore};
use crate::query::{Filter, Matcher, Query, SortField, TopDocsCollector};
use crate::search::options::SearchOptions;
use crate::search::result::SearchResult;

/// Runs searches against the current snapshot of an [`IndexStore`].
#[derive(Debug)]
pub struct SearchEngine {
    store: Arc<IndexStore>,
    subtypes: Arc<dyn SubtypeRegistry>,
    resolver: Arc<dyn EntityResolver>,
    pool: Arc<FetchPool>,
    cache: Option<Arc<dyn Cache>>,
    max_facet_values: usize,
    /// Index generation the cached results belong to.
    cached_generation: AtomicU64,
}

fn cache_prefix(generation: u64) -> String {
    format!("search/{generation}")
}

impl SearchEngine {
    pub fn new(
        store: Arc<IndexStore>,
        subtypes: Arc<dyn SubtypeRegistry>,
        resolver: Arc<dyn EntityResolver>,
        pool: Arc<FetchPool>,
    ) -> Self {
        SearchEngine {
            store,
            subtypes,
            resolver,
            pool,
            cache: None,
            max_facet_values: 100,
            cached_generation: AtomicU64::new(0),
        }
    }

    /// Cache that finished results are published to.
    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Upper bound for the labels returned per facet dimension.
    pub fn with_max_facet_values(mut self, max: usize) -> Self {
        self.max_facet_values = max;
        self
    }

    /// Search for `text`, or for everything when it is `None`. Hits are
    /// restricted to `subset` when given, otherwise to `options.kind` and
    /// its subtypes.
    pub fn search(
        &self,
        options: SearchOptions,
        text: Option<&str>,
        subset: Option<&[EntityRef]>,
    ) -> Result<Arc<SearchResult>> {
        let query = match text {
            Some(text) => self.parse_query(text),
            None => Query::MatchAll,
        };
        let filter = match subset {
            Some(subset) => Some(subset_filter(subset)),
            None => self.kind_filter(&options),
        };
        self.execute(options, text.map(str::to_string), &query, filter)
    }

    /// Parse user query text. `^` and `$` anchors become the start and stop
    /// sentinels; text that does not parse matches everything.
    pub fn parse_query(&self, text: &str) -> Query {
        let text = text
            .replace(GIVEN_START_WORD, START_WORD)
            .replace(GIVEN_STOP_WORD, STOP_WORD);
        match self.store.parser().parse(&text) {
            Ok(query) => query,
            Err(e) => {
                warn!("Can't parse query expression {text:?}: {e}; matching all documents");
                Query::MatchAll
            }
        }
    }

    /// Filter on `options.kind` and its subtypes.
    pub fn kind_filter(&self, options: &SearchOptions) -> Option<Filter> {
        options
            .kind
            .as_deref()
            .map(|kind| Filter::kinds(self.subtypes.subtypes_of(kind)))
    }

    /// Run `query` under `filter`. `label` is the query text reported by the
    /// result.
    pub fn execute(
        &self,
        options: SearchOptions,
        label: Option<String>,
        query: &Query,
        filter: Option<Filter>,
    ) -> Result<Arc<SearchResult>> {
        let started = Instant::now();
        let snapshot = self.store.snapshot();
        debug!("## Query: {query} Filter: {filter:?} Options: {options:?}");

        let generation = snapshot.generation();
        self.drop_stale_results(generation);
        let key = cache_key(
            &cache_prefix(generation),
            &[
                label.clone().unwrap_or_default(),
                serde_json::to_string(&options)?,
                query.to_string(),
                format!("{filter:?}"),
            ],
        );
        if let Some(cached) = self.cache.as_ref().and_then(|c| c.get_as::<SearchResult>(&key)) {
            debug!("## Cache hit: {key}");
            return Ok(cached);
        }

        let scores = Matcher::new(&snapshot, self.store.analyzer().as_ref()).execute(query)?;
        let allowed: Option<BTreeSet<DocId>> = filter.map(|f| f.matches(&snapshot));
        let fdim = options.fdim.min(self.max_facet_values);
        let collector = TopDocsCollector::new(options.max()).with_sort(self.sort_fields(&options));

        let drill = DrillDown::from_specs(
            &options.facets,
            self.store.facets(),
            self.store.path_separator(),
        );
        let (top, facets) = if drill.is_empty() {
            let top = collector.collect(&snapshot, scores, allowed.as_ref());
            let facets = FacetCounts::count(&snapshot, top.matched.iter().copied())
                .all_dims(snapshot.taxonomy(), fdim);
            (top, facets)
        } else {
            let matched: Vec<DocId> = scores
                .keys()
                .copied()
                .filter(|d| allowed.as_ref().is_none_or(|a| a.contains(d)))
                .collect();
            let drilled = drill.apply(&snapshot, &matched, options.drill_mode(), fdim);
            debug!(
                "## Drilled {:?} {} facets and {} hits",
                options.drill_mode(),
                drilled.facets.len(),
                drilled.hits.len()
            );
            let top = collector.collect(&snapshot, scores, Some(&drilled.hits));
            (top, drilled.facets)
        };
        debug!(
            "## Query executes in {:.3}s...{} hit(s) found!",
            started.elapsed().as_secs_f64(),
            top.total_hits
        );

        let budget = options.fetch;
        let docs: Vec<DocId> = top
            .score_docs
            .iter()
            .skip(options.skip)
            .map(|hit| hit.doc)
            .collect();
        let result = Arc::new(SearchResult::new(label, options, facets, self.cache.clone()));
        result.set_key(key.clone());
        result.set_count(top.total_hits);
        result.update_cache_when_complete([key]);

        let payload = FetchPayload::new(result.clone(), snapshot, self.resolver.clone(), docs);
        self.pool.submit(payload, budget);
        Ok(result)
    }

    /// Results cached for an older generation can never be hit again;
    /// drop them once a newer one is searched.
    fn drop_stale_results(&self, generation: u64) {
        let Some(cache) = &self.cache else {
            return;
        };
        let previous = self.cached_generation.swap(generation, Ordering::SeqCst);
        if previous != 0 && previous != generation {
            cache.invalidate_prefix(&format!("{}/", cache_prefix(previous)));
        }
    }

    /// Sort keys of `options` that name a known sortable field.
    fn sort_fields(&self, options: &SearchOptions) -> Vec<SortField> {
        options
            .sort_fields()
            .into_iter()
            .filter(|sort| {
                let known = self.store.sorters().contains(&sort.field);
                if !known {
                    warn!("Unknown sort field: {:?}", sort.field);
                }
                known
            })
            .collect()
    }
}

/// Filter matching exactly the identifiers of `subset`. An empty subset
/// matches nothing.
pub fn subset_filter(subset: &[EntityRef]) -> Filter {
    let terms: Vec<(String, String)> = subset
        .iter()
        .filter_map(|entity| {
            let term = id_term(entity.as_ref());
            if term.is_none() {
                warn!("Entity {entity:?} has no Id field!");
            }
            term
        })
        .collect();
    Filter::Terms(terms)
}
