//! Term statistics of one field over the documents of a kind.
//!
//! [`TermVectors`] are computed from a snapshot by scanning every document
//! of the kind that carries a term vector for the field. The scan is
//! linear in the number of documents, so [`TermVectorService`] memoizes the
//! result in a [`Cache`] until the index changes.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use log::{debug, error};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::cache::{Cache, CacheExt, cache_key};
use crate::document::{FIELD_KIND, IdValue, stored_id_field};
use crate::error::{Result, TaxisError};
use crate::index::{IndexSnapshot, IndexStore, StoredValue};
use crate::query::Filter;

/// Terms of one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocTerms {
    pub doc: IdValue,
    pub terms: Vec<String>,
    #[serde(rename = "nTerms")]
    pub n_terms: usize,
}

/// Documents containing one term.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TermDocs {
    pub docs: Vec<IdValue>,
    #[serde(rename = "nDocs")]
    pub n_docs: usize,
}

/// Term statistics of `field` for the documents of `kind` passing
/// `filters`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermVectors {
    kind: String,
    field: String,
    #[serde(rename = "numDocs")]
    num_docs: usize,
    docs: Vec<DocTerms>,
    terms: BTreeMap<String, TermDocs>,
    filters: BTreeMap<String, String>,
}

impl TermVectors {
    /// Scan `snapshot`. Every document of `kind` matching all `filters`
    /// counts towards [`num_docs`](TermVectors::num_docs); only those with
    /// terms in `field` are listed.
    pub fn compute(
        snapshot: &IndexSnapshot,
        kind: &str,
        field: &str,
        filters: &BTreeMap<String, String>,
    ) -> Self {
        let started = Instant::now();
        let mut clauses = vec![Filter::term(FIELD_KIND, kind)];
        clauses.extend(filters.iter().map(|(f, v)| Filter::term(f.as_str(), v.as_str())));
        let scanned = Filter::And(clauses).matches(snapshot);

        let id_field = stored_id_field(kind);
        let mut docs = Vec::new();
        let mut terms: BTreeMap<String, TermDocs> = BTreeMap::new();
        for &doc in &scanned {
            let Some(stored) = snapshot.doc(doc) else {
                continue;
            };
            let Some(values) = stored.terms(field) else {
                continue;
            };
            let id = match stored.get(&id_field) {
                Some(StoredValue::Long(id)) => IdValue::Long(*id),
                Some(value) => IdValue::Text(value.as_text()),
                None => {
                    error!("{kind} document {doc} has no identifier; skipped");
                    continue;
                }
            };
            for term in values {
                let entry = terms.entry(term.clone()).or_default();
                entry.docs.push(id.clone());
                entry.n_docs += 1;
            }
            docs.push(DocTerms {
                doc: id,
                terms: values.iter().cloned().collect(),
                n_terms: values.len(),
            });
        }
        // Stable, so equal counts keep document order.
        docs.sort_by(|a, b| b.n_terms.cmp(&a.n_terms));

        debug!(
            "term vectors {kind}/{field} {filters:?}: {} of {} documents, {} terms in {:.3}s",
            docs.len(),
            scanned.len(),
            terms.len(),
            started.elapsed().as_secs_f64()
        );
        TermVectors {
            kind: kind.to_string(),
            field: field.to_string(),
            num_docs: scanned.len(),
            docs,
            terms,
            filters: filters.clone(),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    /// Number of documents scanned.
    pub fn num_docs(&self) -> usize {
        self.num_docs
    }

    /// Number of scanned documents with at least one term.
    pub fn num_docs_with_terms(&self) -> usize {
        self.docs.len()
    }

    pub fn num_terms(&self) -> usize {
        self.terms.len()
    }

    /// Number of documents containing `term`.
    pub fn term_count(&self, term: &str) -> usize {
        self.terms.get(term).map_or(0, |t| t.n_docs)
    }

    /// Documents by descending number of terms.
    pub fn docs(&self) -> &[DocTerms] {
        &self.docs
    }

    pub fn terms(&self) -> &BTreeMap<String, TermDocs> {
        &self.terms
    }

    pub fn filters(&self) -> &BTreeMap<String, String> {
        &self.filters
    }
}

/// Which kind and fields a cached entry depends on.
#[derive(Debug, Clone)]
struct KeyScope {
    kind: String,
    fields: Vec<String>,
}

/// Memoized term vectors over an [`IndexStore`].
///
/// Cached entries are reused until the store is modified; every key issued
/// is remembered so that [`clear_caches`](TermVectorService::clear_caches)
/// can drop the entries of a kind and field.
#[derive(Debug)]
pub struct TermVectorService {
    store: Arc<IndexStore>,
    cache: Arc<dyn Cache>,
    keys: Mutex<BTreeMap<String, KeyScope>>,
}

impl TermVectorService {
    pub fn new(store: Arc<IndexStore>, cache: Arc<dyn Cache>) -> Self {
        TermVectorService {
            store,
            cache,
            keys: Mutex::new(BTreeMap::new()),
        }
    }

    fn remember(&self, key: &str, kind: &str, fields: &[&str]) {
        self.keys.lock().insert(
            key.to_string(),
            KeyScope {
                kind: kind.to_string(),
                fields: fields.iter().map(|f| f.to_string()).collect(),
            },
        );
    }

    /// Term vectors of `field` over every document of `kind`.
    pub fn term_vectors(&self, kind: &str, field: &str) -> Result<Arc<TermVectors>> {
        self.term_vectors_filtered(kind, field, &BTreeMap::new())
    }

    /// Term vectors of `field` over the documents of `kind` carrying every
    /// `field -> value` term of `filters`.
    pub fn term_vectors_filtered(
        &self,
        kind: &str,
        field: &str,
        filters: &BTreeMap<String, String>,
    ) -> Result<Arc<TermVectors>> {
        let mut parts = vec![kind.to_string(), field.to_string()];
        // BTreeMap iteration keeps the filter list sorted.
        parts.extend(filters.iter().map(|(f, v)| format!("{f}/{v}")));
        let key = cache_key("termvec", &parts);

        let mut scope: Vec<&str> = vec![field];
        scope.extend(filters.keys().map(String::as_str));
        self.remember(&key, kind, &scope);

        let snapshot = self.store.snapshot();
        self.cache
            .get_or_compute_at(snapshot.generation(), &key, || {
                Ok(TermVectors::compute(&snapshot, kind, field, filters))
            })
            .inspect_err(|e| error!("Can't generate term vectors for {kind}/{field}: {e}"))
    }

    /// Term vectors of `field` for each value of `conditional`: one entry
    /// per term of `conditional`, restricted to the documents carrying it.
    pub fn conditional_term_vectors(
        &self,
        kind: &str,
        field: &str,
        conditional: &str,
    ) -> Result<Arc<BTreeMap<String, Arc<TermVectors>>>> {
        if conditional.is_empty() {
            return Err(TaxisError::invalid_operation(
                "Can't get conditional term vectors with empty constraints",
            ));
        }
        let key = cache_key("termvec", &[kind, field, "|", conditional]);
        self.remember(&key, kind, &[field, conditional]);

        let generation = self.store.snapshot().generation();
        self.cache
            .get_or_compute_at(generation, &key, || {
                let values = self.term_vectors(kind, conditional)?;
                let mut result = BTreeMap::new();
                for term in values.terms().keys() {
                    let filters = BTreeMap::from([(conditional.to_string(), term.clone())]);
                    result.insert(
                        term.clone(),
                        self.term_vectors_filtered(kind, field, &filters)?,
                    );
                }
                Ok(result)
            })
            .inspect_err(|e| {
                error!("Can't generate conditional term vectors ({field}|{conditional}, {kind}): {e}")
            })
    }

    /// Drop the cached term vectors of `kind` involving any of `fields`.
    /// Returns the number of entries dropped.
    pub fn clear_caches(&self, kind: &str, fields: &[&str]) -> usize {
        let mut keys = self.keys.lock();
        let stale: Vec<String> = keys
            .iter()
            .filter(|(_, scope)| {
                scope.kind == kind && scope.fields.iter().any(|f| fields.contains(&f.as_str()))
            })
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            debug!("removing cache...{key}");
            self.cache.invalidate(key);
            keys.remove(key);
        }
        stale.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::config::IndexerConfig;
    use crate::document::{FieldSet, IndexPolicy, Indexable};
    use crate::storage::MemoryStorage;

    #[derive(Debug)]
    struct Drug {
        id: i64,
        moieties: Vec<&'static str>,
        route: &'static str,
    }

    impl Indexable for Drug {
        fn kind(&self) -> &str {
            "ix.test.Drug"
        }

        fn describe<'a>(&'a self, fields: &mut FieldSet<'a>) {
            fields.id("id", self.id);
            for moiety in &self.moieties {
                fields.field_with("moiety", IndexPolicy::new().facet().named("Moiety"), *moiety);
            }
            fields.field_with("route", IndexPolicy::new().facet().named("Route"), self.route);
        }
    }

    fn store() -> Arc<IndexStore> {
        let store = IndexStore::open(
            Arc::new(MemoryStorage::new_default()),
            &IndexerConfig::default(),
        )
        .unwrap();
        let drugs = [
            Drug { id: 1, moieties: vec!["Codeine", "Acetaminophen"], route: "Oral" },
            Drug { id: 2, moieties: vec!["Acetaminophen"], route: "Oral" },
            Drug { id: 3, moieties: vec![], route: "Topical" },
            Drug { id: 4, moieties: vec!["Lidocaine"], route: "Topical" },
        ];
        for drug in &drugs {
            store.add(drug).unwrap();
        }
        Arc::new(store)
    }

    #[test]
    fn test_compute() {
        let store = store();
        let tv = TermVectors::compute(&store.snapshot(), "ix.test.Drug", "Moiety", &BTreeMap::new());

        assert_eq!(tv.num_docs(), 4);
        assert_eq!(tv.num_docs_with_terms(), 3);
        assert_eq!(tv.num_terms(), 3);
        assert_eq!(tv.term_count("Acetaminophen"), 2);
        assert_eq!(tv.term_count("Morphine"), 0);
        assert_eq!(tv.docs()[0].doc, IdValue::Long(1));
        assert_eq!(tv.docs()[0].n_terms, 2);
        assert_eq!(
            tv.terms()["Acetaminophen"].docs,
            vec![IdValue::Long(1), IdValue::Long(2)]
        );
    }

    #[test]
    fn test_filtered_and_conditional() {
        let service = TermVectorService::new(store(), Arc::new(MemoryCache::new()));
        let filters = BTreeMap::from([("Route".to_string(), "Topical".to_string())]);
        let topical = service
            .term_vectors_filtered("ix.test.Drug", "Moiety", &filters)
            .unwrap();
        assert_eq!(topical.num_docs(), 2);
        assert_eq!(topical.terms().keys().collect::<Vec<_>>(), vec!["Lidocaine"]);

        let by_route = service
            .conditional_term_vectors("ix.test.Drug", "Moiety", "Route")
            .unwrap();
        assert_eq!(by_route.keys().collect::<Vec<_>>(), vec!["Oral", "Topical"]);
        assert_eq!(by_route["Oral"].term_count("Acetaminophen"), 2);
        assert_eq!(by_route["Oral"].filters()["Route"], "Oral");
        assert!(service.conditional_term_vectors("ix.test.Drug", "Moiety", "").is_err());
    }

    #[test]
    fn test_memoized_until_cleared() {
        let service = TermVectorService::new(store(), Arc::new(MemoryCache::new()));
        let first = service.term_vectors("ix.test.Drug", "Moiety").unwrap();
        let second = service.term_vectors("ix.test.Drug", "Moiety").unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        assert_eq!(service.clear_caches("ix.test.Other", &["Moiety"]), 0);
        assert_eq!(service.clear_caches("ix.test.Drug", &["Moiety"]), 1);
        let third = service.term_vectors("ix.test.Drug", "Moiety").unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(*first, *third);
    }

    #[test]
    fn test_write_invalidates_cached_vectors() {
        let store = store();
        let service = TermVectorService::new(store.clone(), Arc::new(MemoryCache::new()));
        let before = service.term_vectors("ix.test.Drug", "Moiety").unwrap();
        assert_eq!(before.term_count("Morphine"), 0);

        store
            .add(&Drug { id: 5, moieties: vec!["Morphine"], route: "Oral" })
            .unwrap();
        let after = service.term_vectors("ix.test.Drug", "Moiety").unwrap();
        assert_eq!(after.term_count("Morphine"), 1);
        assert_eq!(after.num_docs(), 5);
    }
}
