//! The hydration work of one search.

use std::fmt;
use std::sync::Arc;

use log::{debug, error, warn};

use crate::document::{EntityRef, FIELD_KIND, IdValue, stored_id_field};
use crate::entity::EntityResolver;
use crate::index::{DocId, IndexSnapshot, StoredValue};
use crate::search::SearchResult;

/// Hits appended to the result at a time by [`FetchPayload::fetch_all`].
const FETCH_CHUNK: usize = 32;

/// Ranked hits still to be turned into entities.
///
/// Hits are read from the snapshot the search ran against, so hydration
/// sees the same documents even if the index changes meanwhile.
pub struct FetchPayload {
    result: Arc<SearchResult>,
    snapshot: Arc<IndexSnapshot>,
    resolver: Arc<dyn EntityResolver>,
    docs: Vec<DocId>,
    cursor: usize,
}

impl fmt::Debug for FetchPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchPayload")
            .field("query", &self.result.query())
            .field("docs", &self.docs.len())
            .field("cursor", &self.cursor)
            .finish()
    }
}

impl FetchPayload {
    pub fn new(
        result: Arc<SearchResult>,
        snapshot: Arc<IndexSnapshot>,
        resolver: Arc<dyn EntityResolver>,
        docs: Vec<DocId>,
    ) -> Self {
        FetchPayload {
            result,
            snapshot,
            resolver,
            docs,
            cursor: 0,
        }
    }

    pub fn result(&self) -> &Arc<SearchResult> {
        &self.result
    }

    /// Number of hits not hydrated yet.
    pub fn remaining(&self) -> usize {
        self.docs.len() - self.cursor
    }

    /// Hydrate up to `size` of the remaining hits, in rank order. Hits that
    /// cannot be resolved are skipped. Returns the number of hits consumed.
    pub fn fetch(&mut self, size: usize) -> usize {
        let end = self.cursor.saturating_add(size).min(self.docs.len());
        let expand = &self.result.options().expand;
        let entities: Vec<EntityRef> = self.docs[self.cursor..end]
            .iter()
            .filter_map(|&doc| self.hydrate(doc, expand))
            .collect();
        let consumed = end - self.cursor;
        debug!(
            "fetched {} of {} hits for {:?}",
            entities.len(),
            consumed,
            self.result.query()
        );
        self.cursor = end;
        self.result.add_all(entities);
        consumed
    }

    /// Hydrate every remaining hit and mark the result finished. Readers
    /// see the matches grow one chunk at a time.
    pub fn fetch_all(mut self) {
        while self.remaining() > 0 {
            self.fetch(FETCH_CHUNK);
        }
        self.result.done();
    }

    /// Mark the result finished without hydrating the remaining hits.
    pub fn abandon(self) {
        debug!(
            "abandoning {} hits of {:?}",
            self.remaining(),
            self.result.query()
        );
        self.result.done();
    }

    fn hydrate(&self, doc: DocId, expand: &[String]) -> Option<EntityRef> {
        let Some(stored) = self.snapshot.doc(doc) else {
            warn!("document {doc} is not in the snapshot");
            return None;
        };
        let kind = match stored.get(FIELD_KIND) {
            Some(StoredValue::Text(kind)) => kind,
            _ => {
                error!("Index corrupted; document {doc} has no kind");
                return None;
            }
        };
        let id = match stored.get(&stored_id_field(kind)) {
            Some(StoredValue::Long(id)) => IdValue::Long(*id),
            Some(value) => IdValue::Text(value.as_text()),
            None => {
                error!("Index corrupted; {kind} document {doc} has no identifier");
                return None;
            }
        };
        match self.resolver.resolve(kind, &id, expand) {
            Ok(Some(entity)) => Some(entity),
            Ok(None) => {
                warn!("{kind}:{id} is indexed but no longer exists");
                None
            }
            Err(e) => {
                warn!("failed to fetch {kind}:{id}: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexerConfig;
    use crate::document::{FieldSet, Indexable};
    use crate::entity::MemoryResolver;
    use crate::index::IndexStore;
    use crate::search::SearchOptions;
    use crate::storage::MemoryStorage;

    #[derive(Debug)]
    struct Item(i64);

    impl Indexable for Item {
        fn kind(&self) -> &str {
            "ix.test.Item"
        }

        fn describe<'a>(&'a self, fields: &mut FieldSet<'a>) {
            fields.id("id", self.0);
        }
    }

    fn fixture(n: i64) -> (Arc<IndexSnapshot>, Arc<MemoryResolver>) {
        let store = IndexStore::open(
            Arc::new(MemoryStorage::new_default()),
            &IndexerConfig::default(),
        )
        .unwrap();
        let resolver = Arc::new(MemoryResolver::new());
        for i in 0..n {
            store.add(&Item(i)).unwrap();
            resolver.insert(Arc::new(Item(i)));
        }
        (store.snapshot(), resolver)
    }

    fn ids(result: &SearchResult) -> Vec<i64> {
        result
            .matches()
            .iter()
            .map(|e| e.downcast_ref::<Item>().unwrap().0)
            .collect()
    }

    #[test]
    fn test_fetch_in_windows() {
        let (snapshot, resolver) = fixture(5);
        let result = Arc::new(SearchResult::new(None, SearchOptions::new(), Vec::new(), None));
        let mut docs: Vec<DocId> = snapshot.live_docs().collect();
        docs.reverse();
        let mut payload = FetchPayload::new(result.clone(), snapshot, resolver, docs);

        assert_eq!(payload.fetch(2), 2);
        assert_eq!(ids(&result), vec![4, 3]);
        assert_eq!(payload.remaining(), 3);
        assert!(!result.finished());

        payload.fetch_all();
        assert_eq!(ids(&result), vec![4, 3, 2, 1, 0]);
        assert!(result.finished());
    }

    #[test]
    fn test_missing_entity_is_skipped() {
        let (snapshot, resolver) = fixture(3);
        resolver.remove("ix.test.Item", &IdValue::Long(1));
        let result = Arc::new(SearchResult::new(None, SearchOptions::new(), Vec::new(), None));
        result.set_count(3);
        let docs: Vec<DocId> = snapshot.live_docs().collect();
        FetchPayload::new(result.clone(), snapshot, resolver, docs).fetch_all();

        assert_eq!(ids(&result), vec![0, 2]);
        assert_eq!(result.count(), 3);
    }
}
