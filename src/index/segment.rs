//! An immutable batch of documents with its own postings.
//!
//! Segments are built in memory by the writer, sealed when a snapshot is
//! taken and persisted as blobs on commit. Local document ids are dense and
//! assigned in insertion order, so postings lists are always sorted.

use std::collections::{BTreeMap, BTreeSet};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::analysis::Analyzer;
use crate::document::{IndexDocument, IndexField, Numeric, SortValue};
use crate::error::Result;
use crate::index::facets_config::FacetsConfig;
use crate::index::taxonomy::{Ordinal, Taxonomy};

pub type LocalDocId = u32;

/// Position gap between two values of the same text field, so phrases
/// never match across values.
const POSITION_GAP: u32 = 100;

/// A stored field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StoredValue {
    Text(String),
    Long(i64),
    Double(f64),
}

impl StoredValue {
    pub fn as_text(&self) -> String {
        match self {
            StoredValue::Text(s) => s.clone(),
            StoredValue::Long(v) => v.to_string(),
            StoredValue::Double(v) => v.to_string(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            StoredValue::Text(s) => serde_json::Value::from(s.as_str()),
            StoredValue::Long(v) => serde_json::Value::from(*v),
            StoredValue::Double(v) => serde_json::Value::from(*v),
        }
    }
}

impl From<Numeric> for StoredValue {
    fn from(value: Numeric) -> Self {
        match value.as_i64() {
            Some(v) => StoredValue::Long(v),
            None => StoredValue::Double(value.as_f64()),
        }
    }
}

/// Occurrences of a term in one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub doc: LocalDocId,
    pub positions: Vec<u32>,
}

impl Posting {
    pub fn freq(&self) -> u32 {
        self.positions.len() as u32
    }
}

/// How a field has been indexed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldFlags {
    pub text: bool,
    pub keyword: bool,
    pub numeric: bool,
}

impl FieldFlags {
    pub fn merge(&mut self, other: FieldFlags) {
        self.text |= other.text;
        self.keyword |= other.keyword;
        self.numeric |= other.numeric;
    }
}

/// Per-document data kept alongside the postings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentDoc {
    /// Stored fields in indexing order.
    pub stored: Vec<(String, StoredValue)>,
    /// Facet labels as indexed.
    pub facets: Vec<(String, Vec<String>)>,
    /// Facet ordinals with all their ancestors, sorted.
    pub ordinals: Vec<Ordinal>,
    /// Distinct terms of every term-vector field.
    pub term_vectors: BTreeMap<String, BTreeSet<String>>,
    /// First sort value of every sortable field.
    pub sort_values: BTreeMap<String, SortValue>,
    /// Number of analyzed tokens per text field.
    pub field_lengths: BTreeMap<String, u32>,
}

impl SegmentDoc {
    /// First stored value of `field`.
    pub fn get(&self, field: &str) -> Option<&StoredValue> {
        self.stored
            .iter()
            .find_map(|(name, value)| (name == field).then_some(value))
    }

    pub fn has_ordinal(&self, ord: Ordinal) -> bool {
        self.ordinals.binary_search(&ord).is_ok()
    }

    pub fn terms(&self, field: &str) -> Option<&BTreeSet<String>> {
        self.term_vectors.get(field)
    }
}

/// Statistics of one field used for scoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldStats {
    pub doc_count: u64,
    pub total_length: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Segment {
    docs: Vec<SegmentDoc>,
    postings: BTreeMap<String, BTreeMap<String, Vec<Posting>>>,
    /// `(value, doc)` pairs per numeric field, sorted once sealed.
    numerics: BTreeMap<String, Vec<(f64, LocalDocId)>>,
    fields: BTreeMap<String, FieldFlags>,
    stats: BTreeMap<String, FieldStats>,
    sealed: bool,
}

impl Segment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn doc(&self, doc: LocalDocId) -> Option<&SegmentDoc> {
        self.docs.get(doc as usize)
    }

    pub fn docs(&self) -> &[SegmentDoc] {
        &self.docs
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldFlags> {
        &self.fields
    }

    pub fn field_stats(&self, field: &str) -> FieldStats {
        self.stats.get(field).copied().unwrap_or_default()
    }

    /// Postings of `field:term`, sorted by document.
    pub fn postings(&self, field: &str, term: &str) -> &[Posting] {
        self.postings
            .get(field)
            .and_then(|terms| terms.get(term))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Terms of `field`, in order, starting with `prefix`.
    pub fn terms_with_prefix<'a>(
        &'a self,
        field: &str,
        prefix: &'a str,
    ) -> impl Iterator<Item = &'a str> + 'a {
        self.postings
            .get(field)
            .into_iter()
            .flat_map(move |terms| {
                terms
                    .range::<str, _>((std::ops::Bound::Included(prefix), std::ops::Bound::Unbounded))
                    .take_while(move |(term, _)| term.starts_with(prefix))
                    .map(|(term, _)| term.as_str())
            })
    }

    /// Documents whose `field` holds a value in the given range.
    pub fn numeric_range(
        &self,
        field: &str,
        min: Option<f64>,
        max: Option<f64>,
        min_inclusive: bool,
        max_inclusive: bool,
    ) -> BTreeSet<LocalDocId> {
        let Some(values) = self.numerics.get(field) else {
            return BTreeSet::new();
        };
        let start = match min {
            Some(min) if min_inclusive => values.partition_point(|(v, _)| *v < min),
            Some(min) => values.partition_point(|(v, _)| *v <= min),
            None => 0,
        };
        let end = match max {
            Some(max) if max_inclusive => values.partition_point(|(v, _)| *v <= max),
            Some(max) => values.partition_point(|(v, _)| *v < max),
            None => values.len(),
        };
        if start >= end {
            return BTreeSet::new();
        }
        values[start..end].iter().map(|(_, doc)| *doc).collect()
    }

    /// Index one document. Facet labels are added to `taxonomy`; a
    /// dimension that is not multi-valued keeps only its first value.
    pub fn add_document(
        &mut self,
        document: &IndexDocument,
        analyzer: &dyn Analyzer,
        taxonomy: &mut Taxonomy,
        facets: &FacetsConfig,
    ) -> Result<LocalDocId> {
        let doc_id = self.docs.len() as LocalDocId;
        let mut doc = SegmentDoc::default();
        let mut next_position: BTreeMap<String, u32> = BTreeMap::new();
        let mut ordinals = BTreeSet::new();

        for field in &document.fields {
            match field {
                IndexField::Keyword {
                    name,
                    value,
                    stored,
                } => {
                    let position = next_position.entry(name.clone()).or_insert(0);
                    self.push_posting(name, value, doc_id, *position);
                    *position += 1;
                    self.fields.entry(name.clone()).or_default().keyword = true;
                    if *stored {
                        doc.stored.push((name.clone(), StoredValue::Text(value.clone())));
                    }
                }
                IndexField::Text {
                    name,
                    value,
                    stored,
                } => {
                    let base = next_position.get(name).copied().unwrap_or(0);
                    let mut last = base;
                    let mut count = 0u32;
                    for token in analyzer.analyze(value)? {
                        let position = base + token.position as u32;
                        self.push_posting(name, &token.text, doc_id, position);
                        last = position;
                        count += 1;
                    }
                    next_position.insert(name.clone(), last + POSITION_GAP);
                    *doc.field_lengths.entry(name.clone()).or_insert(0) += count;
                    self.fields.entry(name.clone()).or_default().text = true;
                    if *stored {
                        doc.stored.push((name.clone(), StoredValue::Text(value.clone())));
                    }
                }
                IndexField::Numeric {
                    name,
                    value,
                    stored,
                } => {
                    self.numerics
                        .entry(name.clone())
                        .or_default()
                        .push((value.as_f64(), doc_id));
                    self.fields.entry(name.clone()).or_default().numeric = true;
                    if *stored {
                        doc.stored.push((name.clone(), StoredValue::from(*value)));
                    }
                }
                IndexField::Facet { dim, path } => {
                    if path.is_empty() {
                        continue;
                    }
                    if !facets.is_configured(dim) {
                        facets.register_dim(dim, path.len() > 1);
                    }
                    let config = facets.dim_config(dim);
                    if !config.multi_valued && doc.facets.iter().any(|(d, _)| d == dim) {
                        warn!("dimension {dim} is not multi-valued; dropping value {path:?}");
                        continue;
                    }
                    ordinals.extend(taxonomy.add_path(dim, path));
                    doc.facets.push((dim.clone(), path.clone()));
                }
                IndexField::TermVector { name, value } => {
                    let position = next_position.entry(name.clone()).or_insert(0);
                    self.push_posting(name, value, doc_id, *position);
                    *position += 1;
                    self.fields.entry(name.clone()).or_default().keyword = true;
                    doc.term_vectors
                        .entry(name.clone())
                        .or_default()
                        .insert(value.clone());
                }
                IndexField::Sort { name, value } => {
                    doc.sort_values
                        .entry(name.clone())
                        .or_insert_with(|| value.clone());
                }
            }
        }

        doc.ordinals = ordinals.into_iter().collect();
        for (field, length) in &doc.field_lengths {
            let stats = self.stats.entry(field.clone()).or_default();
            stats.doc_count += 1;
            stats.total_length += *length as u64;
        }
        self.docs.push(doc);
        self.sealed = false;
        Ok(doc_id)
    }

    fn push_posting(&mut self, field: &str, term: &str, doc: LocalDocId, position: u32) {
        let list = self
            .postings
            .entry(field.to_string())
            .or_default()
            .entry(term.to_string())
            .or_default();
        match list.last_mut() {
            Some(last) if last.doc == doc => last.positions.push(position),
            _ => list.push(Posting {
                doc,
                positions: vec![position],
            }),
        }
    }

    /// Sort the numeric indexes. Must run before the segment is searched.
    pub fn seal(&mut self) {
        if self.sealed {
            return;
        }
        for values in self.numerics.values_mut() {
            values.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        }
        self.sealed = true;
    }

    /// Combine segments into one, keeping only documents for which `live`
    /// returns true. Documents keep their relative order.
    pub fn merge<F>(parts: &[&Segment], mut live: F) -> Segment
    where
        F: FnMut(usize, LocalDocId) -> bool,
    {
        let mut merged = Segment::new();
        let mut remaps: Vec<Vec<Option<LocalDocId>>> = Vec::with_capacity(parts.len());

        for (i, part) in parts.iter().enumerate() {
            let mut remap = Vec::with_capacity(part.docs.len());
            for (local, doc) in part.docs.iter().enumerate() {
                if live(i, local as LocalDocId) {
                    remap.push(Some(merged.docs.len() as LocalDocId));
                    for (field, length) in &doc.field_lengths {
                        let stats = merged.stats.entry(field.clone()).or_default();
                        stats.doc_count += 1;
                        stats.total_length += *length as u64;
                    }
                    merged.docs.push(doc.clone());
                } else {
                    remap.push(None);
                }
            }
            remaps.push(remap);
            for (field, flags) in &part.fields {
                merged.fields.entry(field.clone()).or_default().merge(*flags);
            }
        }

        for (part, remap) in parts.iter().zip(&remaps) {
            for (field, terms) in &part.postings {
                let target = merged.postings.entry(field.clone()).or_default();
                for (term, postings) in terms {
                    let remapped: Vec<Posting> = postings
                        .iter()
                        .filter_map(|p| {
                            remap[p.doc as usize].map(|doc| Posting {
                                doc,
                                positions: p.positions.clone(),
                            })
                        })
                        .collect();
                    if !remapped.is_empty() {
                        target.entry(term.clone()).or_default().extend(remapped);
                    }
                }
            }
            for (field, values) in &part.numerics {
                let target = merged.numerics.entry(field.clone()).or_default();
                target.extend(
                    values
                        .iter()
                        .filter_map(|(v, doc)| remap[*doc as usize].map(|d| (*v, d))),
                );
            }
        }
        merged.postings.retain(|_, terms| !terms.is_empty());
        merged.seal();
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::StandardAnalyzer;

    fn document(kind: &str, id: i64, name: &str, color: &str) -> IndexDocument {
        IndexDocument {
            fields: vec![
                IndexField::Keyword {
                    name: "__kind".into(),
                    value: kind.into(),
                    stored: true,
                },
                IndexField::Numeric {
                    name: format!("{kind}._id"),
                    value: Numeric::Long(id),
                    stored: true,
                },
                IndexField::Text {
                    name: "name".into(),
                    value: format!("THE_START {name} THE_STOP"),
                    stored: false,
                },
                IndexField::Facet {
                    dim: "Color".into(),
                    path: vec![color.into()],
                },
                IndexField::TermVector {
                    name: "Color".into(),
                    value: color.into(),
                },
                IndexField::Numeric {
                    name: "weight".into(),
                    value: Numeric::Long(id * 10),
                    stored: false,
                },
            ],
        }
    }

    fn build(docs: &[IndexDocument]) -> (Segment, Taxonomy, FacetsConfig) {
        let analyzer = StandardAnalyzer::new();
        let mut taxonomy = Taxonomy::new();
        let facets = FacetsConfig::new();
        let mut segment = Segment::new();
        for doc in docs {
            segment
                .add_document(doc, &analyzer, &mut taxonomy, &facets)
                .unwrap();
        }
        segment.seal();
        (segment, taxonomy, facets)
    }

    #[test]
    fn test_add_document() {
        let (segment, taxonomy, facets) = build(&[
            document("W", 1, "Blue Sprocket", "Blue"),
            document("W", 2, "Red Sprocket", "Red"),
        ]);

        assert_eq!(segment.len(), 2);
        let sprocket = segment.postings("name", "sprocket");
        assert_eq!(sprocket.len(), 2);
        assert_eq!(sprocket[0].positions, vec![2]);
        assert_eq!(segment.postings("Color", "Red")[0].doc, 1);
        assert!(segment.fields()["name"].text);
        assert!(segment.fields()["Color"].keyword);
        assert!(facets.dim_config("Color").multi_valued);

        let doc = segment.doc(1).unwrap();
        assert_eq!(doc.get("W._id"), Some(&StoredValue::Long(2)));
        let red = taxonomy.ordinal("Color", &["Red"]).unwrap();
        assert!(doc.has_ordinal(red));
        assert!(doc.has_ordinal(taxonomy.ordinal("Color", &[]).unwrap()));
        assert_eq!(doc.field_lengths["name"], 4);
        assert_eq!(segment.field_stats("name").doc_count, 2);
    }

    #[test]
    fn test_numeric_range_and_prefix() {
        let (segment, _, _) = build(&[
            document("W", 3, "Gear", "Red"),
            document("W", 1, "Gasket", "Red"),
            document("W", 2, "Bolt", "Red"),
        ]);

        let hits = segment.numeric_range("weight", Some(10.0), Some(20.0), true, true);
        assert_eq!(hits.into_iter().collect::<Vec<_>>(), vec![1, 2]);
        let hits = segment.numeric_range("weight", Some(10.0), Some(20.0), false, false);
        assert!(hits.is_empty());
        let hits = segment.numeric_range("weight", None, None, true, true);
        assert_eq!(hits.len(), 3);

        let terms: Vec<&str> = segment.terms_with_prefix("name", "g").collect();
        assert_eq!(terms, vec!["gasket", "gear"]);
    }

    #[test]
    fn test_single_valued_dimension_keeps_first() {
        let analyzer = StandardAnalyzer::new();
        let mut taxonomy = Taxonomy::new();
        let facets = FacetsConfig::new();
        facets.set_multi_valued("Status", false);

        let doc = IndexDocument {
            fields: vec![
                IndexField::Facet {
                    dim: "Status".into(),
                    path: vec!["Active".into()],
                },
                IndexField::Facet {
                    dim: "Status".into(),
                    path: vec!["Retired".into()],
                },
            ],
        };
        let mut segment = Segment::new();
        segment
            .add_document(&doc, &analyzer, &mut taxonomy, &facets)
            .unwrap();
        assert_eq!(segment.doc(0).unwrap().facets.len(), 1);
        assert!(taxonomy.ordinal("Status", &["Retired"]).is_none());
    }

    #[test]
    fn test_merge_drops_deleted() {
        let (a, _, _) = build(&[
            document("W", 1, "Gear", "Red"),
            document("W", 2, "Bolt", "Blue"),
        ]);
        let (b, _, _) = build(&[document("W", 3, "Gear", "Red")]);

        let merged = Segment::merge(&[&a, &b], |part, doc| !(part == 0 && doc == 0));
        assert_eq!(merged.len(), 2);
        let gear = merged.postings("name", "gear");
        assert_eq!(gear.len(), 1);
        assert_eq!(gear[0].doc, 1);
        assert_eq!(
            merged.doc(1).unwrap().get("W._id"),
            Some(&StoredValue::Long(3))
        );
        let weights = merged.numeric_range("weight", Some(0.0), None, true, true);
        assert_eq!(weights.into_iter().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(merged.field_stats("name").doc_count, 2);
    }
}
