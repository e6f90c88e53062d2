//! Top-N collection of scored matches.

use std::cmp::Ordering;
use std::collections::{BTreeSet, BinaryHeap};

use crate::index::{DocId, IndexSnapshot};
use crate::query::matcher::Scores;

/// A ranked hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreDoc {
    pub doc: DocId,
    pub score: f32,
}

/// Min-heap entry: the worst hit is on top.
#[derive(Debug, Clone, Copy)]
struct HeapEntry(ScoreDoc);

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher score ranks better; ties go to the lower document id.
        other
            .0
            .score
            .total_cmp(&self.0.score)
            .then_with(|| self.0.doc.cmp(&other.0.doc))
    }
}

/// One sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortField {
    pub field: String,
    pub reverse: bool,
}

impl SortField {
    pub fn new(field: impl Into<String>, reverse: bool) -> Self {
        SortField {
            field: field.into(),
            reverse,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TopDocs {
    /// Number of matching documents.
    pub total_hits: usize,
    /// The best `max_docs` hits, best first.
    pub score_docs: Vec<ScoreDoc>,
    /// Every matching document, in id order.
    pub matched: Vec<DocId>,
}

#[derive(Debug, Clone)]
pub struct TopDocsCollector {
    max_docs: usize,
    sort: Vec<SortField>,
}

impl TopDocsCollector {
    pub fn new(max_docs: usize) -> Self {
        TopDocsCollector {
            max_docs,
            sort: Vec::new(),
        }
    }

    /// Order hits by these fields instead of by score.
    pub fn with_sort(mut self, sort: Vec<SortField>) -> Self {
        self.sort = sort;
        self
    }

    /// Rank `scores`, keeping only documents in `filter` when given.
    pub fn collect(
        &self,
        snapshot: &IndexSnapshot,
        scores: Scores,
        filter: Option<&BTreeSet<DocId>>,
    ) -> TopDocs {
        let hits: Vec<ScoreDoc> = scores
            .into_iter()
            .filter(|(doc, _)| filter.is_none_or(|f| f.contains(doc)))
            .map(|(doc, score)| ScoreDoc { doc, score })
            .collect();
        let matched = hits.iter().map(|h| h.doc).collect();
        let total_hits = hits.len();

        let score_docs = if self.sort.is_empty() {
            self.top_by_score(hits)
        } else {
            self.top_by_fields(snapshot, hits)
        };
        TopDocs {
            total_hits,
            score_docs,
            matched,
        }
    }

    fn top_by_score(&self, hits: Vec<ScoreDoc>) -> Vec<ScoreDoc> {
        if self.max_docs == 0 {
            return Vec::new();
        }
        let mut heap: BinaryHeap<HeapEntry> = BinaryHeap::with_capacity(self.max_docs + 1);
        for hit in hits {
            heap.push(HeapEntry(hit));
            if heap.len() > self.max_docs {
                heap.pop();
            }
        }
        // Ascending heap order is best first.
        heap.into_sorted_vec().into_iter().map(|e| e.0).collect()
    }

    fn top_by_fields(&self, snapshot: &IndexSnapshot, mut hits: Vec<ScoreDoc>) -> Vec<ScoreDoc> {
        hits.sort_by(|a, b| {
            for key in &self.sort {
                let left = snapshot.doc(a.doc).and_then(|d| d.sort_values.get(&key.field));
                let right = snapshot.doc(b.doc).and_then(|d| d.sort_values.get(&key.field));
                let ordering = match (left, right) {
                    (Some(l), Some(r)) => {
                        let o = l.compare(r);
                        if key.reverse { o.reverse() } else { o }
                    }
                    // Documents without a value sort last either way.
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            a.doc.cmp(&b.doc)
        });
        hits.truncate(self.max_docs);
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_by_score() {
        let snapshot = IndexSnapshot::empty();
        let scores: Scores = [(0, 0.5), (1, 2.0), (2, 1.0), (3, 2.0)].into_iter().collect();

        let top = TopDocsCollector::new(3).collect(&snapshot, scores.clone(), None);
        assert_eq!(top.total_hits, 4);
        let docs: Vec<DocId> = top.score_docs.iter().map(|h| h.doc).collect();
        assert_eq!(docs, vec![1, 3, 2]);
        assert_eq!(top.matched, vec![0, 1, 2, 3]);

        let filter: BTreeSet<DocId> = [0, 2].into_iter().collect();
        let top = TopDocsCollector::new(10).collect(&snapshot, scores, Some(&filter));
        assert_eq!(top.total_hits, 2);
        assert_eq!(top.score_docs[0].doc, 2);
    }

    #[test]
    fn test_zero_max_docs_still_counts() {
        let snapshot = IndexSnapshot::empty();
        let scores: Scores = [(4, 1.0)].into_iter().collect();
        let top = TopDocsCollector::new(0).collect(&snapshot, scores, None);
        assert_eq!(top.total_hits, 1);
        assert!(top.score_docs.is_empty());
    }
}
