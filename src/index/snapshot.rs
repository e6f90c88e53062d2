//! Point-in-time view over the segments of an index.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use bit_vec::BitVec;

use crate::index::segment::{FieldFlags, FieldStats, LocalDocId, Posting, Segment, SegmentDoc};
use crate::index::taxonomy::Taxonomy;
use crate::suggest::TermSource;

/// Document id, unique within one snapshot.
pub type DocId = u32;

#[derive(Debug, Clone)]
struct SnapshotSegment {
    base: DocId,
    segment: Arc<Segment>,
    live: Arc<BitVec>,
}

impl SnapshotSegment {
    fn is_live(&self, local: LocalDocId) -> bool {
        self.live.get(local as usize).unwrap_or(false)
    }
}

/// An immutable, consistent view used for the whole of one search.
///
/// Documents are numbered across segments: the documents of the n-th
/// segment follow those of the segments before it.
#[derive(Debug, Clone)]
pub struct IndexSnapshot {
    segments: Vec<SnapshotSegment>,
    taxonomy: Arc<Taxonomy>,
    fields: BTreeMap<String, FieldFlags>,
    generation: u64,
    num_docs: usize,
    max_doc: DocId,
}

impl IndexSnapshot {
    pub fn new(
        parts: Vec<(Arc<Segment>, Arc<BitVec>)>,
        taxonomy: Arc<Taxonomy>,
        generation: u64,
    ) -> Self {
        let mut segments = Vec::with_capacity(parts.len());
        let mut fields: BTreeMap<String, FieldFlags> = BTreeMap::new();
        let mut base: DocId = 0;
        let mut num_docs = 0;
        for (segment, live) in parts {
            num_docs += (0..segment.len()).filter(|&i| live.get(i).unwrap_or(false)).count();
            for (field, flags) in segment.fields() {
                fields.entry(field.clone()).or_default().merge(*flags);
            }
            let len = segment.len() as DocId;
            segments.push(SnapshotSegment {
                base,
                segment,
                live,
            });
            base += len;
        }
        IndexSnapshot {
            segments,
            taxonomy,
            fields,
            generation,
            num_docs,
            max_doc: base,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), Arc::new(Taxonomy::new()), 0)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of live documents.
    pub fn num_docs(&self) -> usize {
        self.num_docs
    }

    /// One past the largest document id, deleted documents included.
    pub fn max_doc(&self) -> DocId {
        self.max_doc
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    fn locate(&self, doc: DocId) -> Option<(&SnapshotSegment, LocalDocId)> {
        if doc >= self.max_doc {
            return None;
        }
        let idx = self.segments.partition_point(|s| s.base <= doc).checked_sub(1)?;
        let part = &self.segments[idx];
        Some((part, doc - part.base))
    }

    pub fn is_live(&self, doc: DocId) -> bool {
        self.locate(doc)
            .map(|(part, local)| part.is_live(local))
            .unwrap_or(false)
    }

    /// Per-document data of a live document.
    pub fn doc(&self, doc: DocId) -> Option<&SegmentDoc> {
        let (part, local) = self.locate(doc)?;
        if !part.is_live(local) {
            return None;
        }
        part.segment.doc(local)
    }

    /// All live documents in id order.
    pub fn live_docs(&self) -> impl Iterator<Item = DocId> + '_ {
        self.segments.iter().flat_map(|part| {
            (0..part.segment.len() as LocalDocId)
                .filter(move |&local| part.is_live(local))
                .map(move |local| part.base + local)
        })
    }

    /// Live postings of `field:term`, in document order.
    pub fn postings(&self, field: &str, term: &str) -> Vec<(DocId, &Posting)> {
        let mut result = Vec::new();
        for part in &self.segments {
            for posting in part.segment.postings(field, term) {
                if part.is_live(posting.doc) {
                    result.push((part.base + posting.doc, posting));
                }
            }
        }
        result
    }

    /// Number of live documents containing `field:term`.
    pub fn doc_freq(&self, field: &str, term: &str) -> u64 {
        self.segments
            .iter()
            .map(|part| {
                part.segment
                    .postings(field, term)
                    .iter()
                    .filter(|p| part.is_live(p.doc))
                    .count() as u64
            })
            .sum()
    }

    /// Distinct terms of `field` starting with `prefix`.
    pub fn terms_with_prefix(&self, field: &str, prefix: &str) -> BTreeSet<String> {
        self.segments
            .iter()
            .flat_map(|part| part.segment.terms_with_prefix(field, prefix))
            .map(str::to_string)
            .collect()
    }

    /// Live documents whose numeric `field` falls in the range.
    pub fn numeric_range(
        &self,
        field: &str,
        min: Option<f64>,
        max: Option<f64>,
        min_inclusive: bool,
        max_inclusive: bool,
    ) -> BTreeSet<DocId> {
        let mut result = BTreeSet::new();
        for part in &self.segments {
            for local in part
                .segment
                .numeric_range(field, min, max, min_inclusive, max_inclusive)
            {
                if part.is_live(local) {
                    result.insert(part.base + local);
                }
            }
        }
        result
    }

    pub fn field_flags(&self, field: &str) -> FieldFlags {
        self.fields.get(field).copied().unwrap_or_default()
    }

    /// Scoring statistics of `field` over all segments.
    pub fn field_stats(&self, field: &str) -> FieldStats {
        self.segments
            .iter()
            .map(|part| part.segment.field_stats(field))
            .fold(FieldStats::default(), |acc, s| FieldStats {
                doc_count: acc.doc_count + s.doc_count,
                total_length: acc.total_length + s.total_length,
            })
    }

    /// Number of documents scored; deleted documents are included like
    /// the other statistics.
    pub fn total_docs(&self) -> u64 {
        self.max_doc as u64
    }
}

impl TermSource for IndexSnapshot {
    fn term_weights(&self, field: &str) -> BTreeMap<String, u64> {
        let mut weights = BTreeMap::new();
        for doc in self.live_docs() {
            if let Some(terms) = self.doc(doc).and_then(|d| d.terms(field)) {
                for term in terms {
                    *weights.entry(term.clone()).or_insert(0) += 1;
                }
            }
        }
        weights
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::StandardAnalyzer;
    use crate::document::{IndexDocument, IndexField};
    use crate::index::facets_config::FacetsConfig;

    fn segment(names: &[&str], taxonomy: &mut Taxonomy) -> Arc<Segment> {
        let analyzer = StandardAnalyzer::new();
        let facets = FacetsConfig::new();
        let mut segment = Segment::new();
        for name in names {
            let doc = IndexDocument {
                fields: vec![
                    IndexField::Text {
                        name: "name".into(),
                        value: name.to_string(),
                        stored: true,
                    },
                    IndexField::TermVector {
                        name: "Name".into(),
                        value: name.to_string(),
                    },
                ],
            };
            segment
                .add_document(&doc, &analyzer, taxonomy, &facets)
                .unwrap();
        }
        segment.seal();
        Arc::new(segment)
    }

    #[test]
    fn test_global_ids_and_deletions() {
        let mut taxonomy = Taxonomy::new();
        let a = segment(&["aspirin", "ibuprofen"], &mut taxonomy);
        let b = segment(&["aspirin tablets"], &mut taxonomy);
        let mut live_a = BitVec::from_elem(2, true);
        live_a.set(0, false);
        let live_b = BitVec::from_elem(1, true);

        let snapshot = IndexSnapshot::new(
            vec![(a, Arc::new(live_a)), (b, Arc::new(live_b))],
            Arc::new(taxonomy),
            3,
        );
        assert_eq!(snapshot.max_doc(), 3);
        assert_eq!(snapshot.num_docs(), 2);
        assert_eq!(snapshot.live_docs().collect::<Vec<_>>(), vec![1, 2]);
        assert!(snapshot.doc(0).is_none());
        assert!(snapshot.doc(2).is_some());

        let aspirin: Vec<DocId> = snapshot
            .postings("name", "aspirin")
            .into_iter()
            .map(|(d, _)| d)
            .collect();
        assert_eq!(aspirin, vec![2]);
        assert_eq!(snapshot.doc_freq("name", "aspirin"), 1);
        assert!(snapshot.field_flags("name").text);
        assert!(snapshot.field_flags("Name").keyword);

        let weights = snapshot.term_weights("Name");
        assert_eq!(weights.get("ibuprofen"), Some(&1));
        assert!(!weights.contains_key("aspirin"));
    }
}
