//! The shared, progressively filled result of one search.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use log::debug;
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;

use crate::cache::Cache;
use crate::document::EntityRef;
use crate::facet::Facet;
use crate::search::options::SearchOptions;

/// Matches are appended in rank order while hydration runs; readers get
/// an immutable prefix of the final list. Once finished, a result never
/// becomes unfinished again.
#[derive(Debug)]
pub struct SearchResult {
    query: Option<String>,
    options: SearchOptions,
    facets: Vec<Facet>,
    key: RwLock<Option<String>>,
    count: AtomicUsize,
    matches: RwLock<Arc<Vec<EntityRef>>>,
    timestamp: i64,
    stop: AtomicI64,
    finished: watch::Sender<bool>,
    keys: Mutex<BTreeSet<String>>,
    cache: Option<Arc<dyn Cache>>,
}

impl SearchResult {
    pub fn new(
        query: Option<String>,
        options: SearchOptions,
        facets: Vec<Facet>,
        cache: Option<Arc<dyn Cache>>,
    ) -> Self {
        let (finished, _) = watch::channel(false);
        SearchResult {
            query,
            options,
            facets,
            key: RwLock::new(None),
            count: AtomicUsize::new(0),
            matches: RwLock::new(Arc::new(Vec::new())),
            timestamp: Utc::now().timestamp_millis(),
            stop: AtomicI64::new(0),
            finished,
            keys: Mutex::new(BTreeSet::new()),
            cache,
        }
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn options(&self) -> &SearchOptions {
        &self.options
    }

    pub fn facets(&self) -> &[Facet] {
        &self.facets
    }

    /// Facet of the dimension `name`.
    pub fn facet(&self, name: &str) -> Option<&Facet> {
        self.facets.iter().find(|f| f.name() == name)
    }

    pub fn key(&self) -> Option<String> {
        self.key.read().clone()
    }

    pub fn set_key(&self, key: impl Into<String>) {
        *self.key.write() = Some(key.into());
    }

    /// Total number of hits, independent of how many were hydrated.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub(crate) fn set_count(&self, count: usize) {
        self.count.store(count, Ordering::SeqCst);
    }

    /// The matches hydrated so far.
    pub fn matches(&self) -> Arc<Vec<EntityRef>> {
        self.matches.read().clone()
    }

    /// Up to `count` matches starting at `start`.
    pub fn copy_to(&self, start: usize, count: usize) -> Vec<EntityRef> {
        let matches = self.matches();
        matches.iter().skip(start).take(count).cloned().collect()
    }

    /// Number of matches hydrated so far.
    pub fn size(&self) -> usize {
        self.matches.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Epoch millis at which the search started.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Epoch millis at which hydration completed, if it has.
    pub fn stop_time(&self) -> Option<i64> {
        let stop = self.stop.load(Ordering::SeqCst);
        (stop >= self.timestamp).then_some(stop)
    }

    pub fn finished(&self) -> bool {
        self.stop.load(Ordering::SeqCst) >= self.timestamp
    }

    /// Time from the start of the search to completion, or to now while
    /// hydration is still running.
    pub fn elapsed(&self) -> Duration {
        let end = self
            .stop_time()
            .unwrap_or_else(|| Utc::now().timestamp_millis());
        Duration::from_millis(end.saturating_sub(self.timestamp).max(0) as u64)
    }

    /// Publish this result under `keys` once hydration completes.
    pub fn update_cache_when_complete<I, S>(self: &Arc<Self>, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        if self.finished() {
            self.publish(&keys);
        }
        self.keys.lock().extend(keys);
    }

    /// Resolves once hydration has completed.
    pub fn finished_signal(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut receiver = self.finished.subscribe();
        async move {
            let _ = receiver.wait_for(|done| *done).await;
        }
    }

    /// Block the calling thread until hydration has completed.
    pub fn wait_until_finished(&self) {
        if !self.finished() {
            futures::executor::block_on(self.finished_signal());
        }
    }

    /// All matches, waiting for hydration to complete first.
    pub fn matches_when_finished(&self) -> Arc<Vec<EntityRef>> {
        self.wait_until_finished();
        self.matches()
    }

    pub(crate) fn add_all(&self, entities: Vec<EntityRef>) {
        if entities.is_empty() {
            return;
        }
        let mut matches = self.matches.write();
        Arc::make_mut(&mut matches).extend(entities);
    }

    /// Mark hydration complete, publish to the cache and wake waiters.
    pub(crate) fn done(self: &Arc<Self>) {
        if self.finished() {
            return;
        }
        let now = Utc::now().timestamp_millis().max(self.timestamp);
        self.stop.store(now, Ordering::SeqCst);
        let keys: Vec<String> = self.keys.lock().iter().cloned().collect();
        self.publish(&keys);
        self.finished.send_replace(true);
        debug!(
            "search {:?} finished with {} of {} hits in {:?}",
            self.query,
            self.size(),
            self.count(),
            self.elapsed()
        );
    }

    fn publish(self: &Arc<Self>, keys: &[String]) {
        if let Some(cache) = &self.cache {
            for key in keys {
                cache.put(key, self.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::cache::{CacheExt, MemoryCache};
    use crate::document::{FieldSet, Indexable};

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

    fn items(range: std::ops::Range<i64>) -> Vec<EntityRef> {
        range.map(|i| Arc::new(Item(i)) as EntityRef).collect()
    }

    #[test]
    fn test_prefix_grows_until_finished() {
        let result = Arc::new(SearchResult::new(None, SearchOptions::new(), Vec::new(), None));
        assert!(!result.finished());
        assert!(result.stop_time().is_none());

        result.add_all(items(0..3));
        let first = result.matches();
        result.add_all(items(3..5));
        let second = result.matches();
        assert_eq!(first.len(), 3);
        assert_eq!(second.len(), 5);
        assert!(first.iter().zip(second.iter()).all(|(a, b)| Arc::ptr_eq(a, b)));
        assert_eq!(result.copy_to(4, 10).len(), 1);
        assert!(result.copy_to(9, 1).is_empty());

        result.done();
        assert!(result.finished());
        result.done();
        assert!(result.finished());
    }

    #[test]
    fn test_wait_until_finished_and_publish() {
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
        let result = Arc::new(SearchResult::new(
            Some("gear".into()),
            SearchOptions::new(),
            Vec::new(),
            Some(cache.clone()),
        ));
        result.update_cache_when_complete(["search/gear", "alias/gear"]);
        assert!(cache.get("search/gear").is_none());

        let worker = {
            let result = result.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                result.add_all(items(0..2));
                result.done();
            })
        };
        assert_eq!(result.matches_when_finished().len(), 2);
        worker.join().unwrap();

        let cached = cache.get_as::<SearchResult>("alias/gear").unwrap();
        assert!(Arc::ptr_eq(&cached, &result));
    }

    #[tokio::test]
    async fn test_finished_signal_with_timeout() {
        let result = Arc::new(SearchResult::new(None, SearchOptions::new(), Vec::new(), None));
        let pending = tokio::time::timeout(Duration::from_millis(10), result.finished_signal()).await;
        assert!(pending.is_err());

        result.done();
        tokio::time::timeout(Duration::from_secs(1), result.finished_signal())
            .await
            .unwrap();
    }

    #[test]
    fn test_signal_after_completion_is_ready() {
        let result = Arc::new(SearchResult::new(None, SearchOptions::new(), Vec::new(), None));
        result.done();
        tokio_test::block_on(result.finished_signal());
        tokio_test::assert_ready!(tokio_test::task::spawn(result.finished_signal()).poll());
    }
}
