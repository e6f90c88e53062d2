//! Drill-down and drill-sideways over facet labels.
//!
//! A drill constraint is written `dim/value`, as in `Color/Red`. For a
//! hierarchical dimension the value is a path, split on the configured
//! separator (`Location/Europe/France`).
//!
//! Values of one dimension are OR-ed and dimensions are AND-ed:
//! `Color/Red`, `Color/Blue` and `Size/L` keep the hits that are red or
//! blue, and large.
//!
//! - [`DrillMode::Down`] counts every facet over the drilled hits, so a
//!   drilled dimension only shows the chosen labels.
//! - [`DrillMode::Sideways`] counts each drilled dimension as if its own
//!   constraint were absent. Sibling labels keep their counts, which is
//!   what a navigation panel offering "Blue instead of Red" needs.
//!
//! In both modes the drilled labels are pinned to the front of their
//! facet with their own counts, even when they would not make the top
//! labels.
//!
//! # Example
//!
//! ```no_run
//! use taxis::facet::{DrillDown, DrillMode};
//! use taxis::index::{FacetsConfig, IndexSnapshot};
//!
//! let snapshot = IndexSnapshot::empty();
//! let specs = vec!["Color/Red".to_string()];
//! let drill = DrillDown::from_specs(&specs, &FacetsConfig::new(), "/");
//! let matched: Vec<_> = snapshot.live_docs().collect();
//! let result = drill.apply(&snapshot, &matched, DrillMode::Sideways, 10);
//! println!("{} hits", result.hits.len());
//! ```

use std::collections::BTreeSet;

use log::warn;

use crate::facet::{Facet, FacetCounts};
use crate::index::{DocId, FacetsConfig, IndexSnapshot, Ordinal, SegmentDoc};

/// How drilled dimensions are counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DrillMode {
    /// Facets are counted over the drilled hits.
    #[default]
    Down,
    /// Each drilled dimension is counted without its own constraint.
    Sideways,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct DrillValue {
    label: String,
    path: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct DimConstraint {
    dim: String,
    values: Vec<DrillValue>,
}

/// Hits and facets after drilling.
#[derive(Debug, Clone, Default)]
pub struct DrillResult {
    pub hits: BTreeSet<DocId>,
    pub facets: Vec<Facet>,
}

/// Facet constraints grouped by dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrillDown {
    constraints: Vec<DimConstraint>,
}

impl DrillDown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `dim/value` strings. The value of a hierarchical dimension is
    /// split further on `separator`.
    pub fn from_specs<S: AsRef<str>>(specs: &[S], facets: &FacetsConfig, separator: &str) -> Self {
        let mut drill = DrillDown::new();
        for spec in specs {
            let spec = spec.as_ref();
            let Some((dim, value)) = spec.split_once('/') else {
                warn!("ignoring facet constraint without a value: {spec}");
                continue;
            };
            let path = if facets.dim_config(dim).hierarchical && !separator.is_empty() {
                value.split(separator).map(str::to_string).collect()
            } else {
                vec![value.to_string()]
            };
            drill.add(dim, value, path);
        }
        drill
    }

    /// Constrain `dim` to the label `path`; `label` is the text shown in the
    /// facet for it.
    pub fn add(&mut self, dim: &str, label: &str, path: Vec<String>) {
        let value = DrillValue {
            label: label.to_string(),
            path,
        };
        match self.constraints.iter_mut().find(|c| c.dim == dim) {
            Some(constraint) => constraint.values.push(value),
            None => self.constraints.push(DimConstraint {
                dim: dim.to_string(),
                values: vec![value],
            }),
        }
    }

    /// Whether no constraint was given.
    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Drilled dimensions in the order they were first given.
    pub fn dims(&self) -> Vec<&str> {
        self.constraints.iter().map(|c| c.dim.as_str()).collect()
    }

    /// Restrict `matched` to the constrained labels and count facets,
    /// keeping at most `top_n` labels per dimension. Drilled labels are
    /// always present at the front of their facet.
    pub fn apply(
        &self,
        snapshot: &IndexSnapshot,
        matched: &[DocId],
        mode: DrillMode,
        top_n: usize,
    ) -> DrillResult {
        let taxonomy = snapshot.taxonomy();
        let resolved: Vec<Vec<Ordinal>> = self
            .constraints
            .iter()
            .map(|c| {
                c.values
                    .iter()
                    .filter_map(|v| {
                        let path: Vec<&str> = v.path.iter().map(String::as_str).collect();
                        taxonomy.ordinal(&c.dim, &path)
                    })
                    .collect()
            })
            .collect();

        let accepts = |doc: &SegmentDoc, skip: Option<usize>| {
            resolved
                .iter()
                .enumerate()
                .filter(|(i, _)| Some(*i) != skip)
                .all(|(_, ords)| ords.iter().any(|&ord| doc.has_ordinal(ord)))
        };
        let filter = |skip: Option<usize>| -> Vec<DocId> {
            matched
                .iter()
                .copied()
                .filter(|&d| snapshot.doc(d).is_some_and(|doc| accepts(doc, skip)))
                .collect()
        };

        let hits = filter(None);
        let drilled = FacetCounts::count(snapshot, hits.iter().copied());

        let mut facets: Vec<Facet> = Vec::new();
        let mut sources: Vec<FacetCounts> = Vec::with_capacity(self.constraints.len());
        match mode {
            DrillMode::Down => {
                facets = drilled.all_dims(taxonomy, top_n);
                sources.extend(self.constraints.iter().map(|_| drilled.clone()));
            }
            DrillMode::Sideways => {
                for (i, constraint) in self.constraints.iter().enumerate() {
                    let counts = FacetCounts::count(snapshot, filter(Some(i)));
                    if let Some(facet) = counts.top_children(taxonomy, &constraint.dim, top_n) {
                        facets.push(facet);
                    }
                    sources.push(counts);
                }
                let drilled_dims = self.dims();
                facets.extend(
                    drilled
                        .all_dims(taxonomy, top_n)
                        .into_iter()
                        .filter(|f| !drilled_dims.contains(&f.name())),
                );
            }
        }

        for (constraint, counts) in self.constraints.iter().zip(&sources) {
            let index = match facets.iter().position(|f| f.name() == constraint.dim) {
                Some(index) => index,
                None => {
                    facets.push(Facet::new(&constraint.dim));
                    facets.len() - 1
                }
            };
            let facet = &mut facets[index];
            facet.sort();
            for value in constraint.values.iter().rev() {
                let path: Vec<&str> = value.path.iter().map(String::as_str).collect();
                let count = counts.specific_value(taxonomy, &constraint.dim, &path);
                facet.pin(&value.label, count);
            }
        }

        DrillResult {
            hits: hits.into_iter().collect(),
            facets,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::analysis::StandardAnalyzer;
    use crate::document::{IndexDocument, IndexField};
    use crate::facet::FV;
    use crate::index::{Segment, Taxonomy};

    /// Documents with a color and a size.
    fn snapshot(docs: &[(&str, &str)]) -> IndexSnapshot {
        let analyzer = StandardAnalyzer::new();
        let facets = FacetsConfig::new();
        let mut taxonomy = Taxonomy::new();
        let mut segment = Segment::new();
        for (color, size) in docs {
            let fields = vec![
                IndexField::Facet {
                    dim: "Color".into(),
                    path: vec![color.to_string()],
                },
                IndexField::Facet {
                    dim: "Size".into(),
                    path: vec![size.to_string()],
                },
            ];
            segment
                .add_document(&IndexDocument { fields }, &analyzer, &mut taxonomy, &facets)
                .unwrap();
        }
        segment.seal();
        let live = bit_vec::BitVec::from_elem(segment.len(), true);
        IndexSnapshot::new(vec![(Arc::new(segment), Arc::new(live))], Arc::new(taxonomy), 1)
    }

    fn facet<'a>(result: &'a DrillResult, name: &str) -> &'a Facet {
        result.facets.iter().find(|f| f.name() == name).unwrap()
    }

    fn data() -> IndexSnapshot {
        snapshot(&[
            ("Red", "S"),
            ("Red", "L"),
            ("Red", "L"),
            ("Blue", "L"),
            ("Green", "S"),
        ])
    }

    #[test]
    fn test_drill_down() {
        let snapshot = data();
        let matched: Vec<DocId> = snapshot.live_docs().collect();
        let drill = DrillDown::from_specs(&["Color/Red"], &FacetsConfig::new(), "/");

        let result = drill.apply(&snapshot, &matched, DrillMode::Down, 10);
        assert_eq!(result.hits.len(), 3);
        assert_eq!(facet(&result, "Color").values(), &[FV::new("Red", 3)]);
        assert_eq!(facet(&result, "Size").value(0), Some(&FV::new("L", 2)));
    }

    #[test]
    fn test_drill_sideways_keeps_siblings() {
        let snapshot = data();
        let matched: Vec<DocId> = snapshot.live_docs().collect();
        let drill = DrillDown::from_specs(&["Color/Green", "Size/S"], &FacetsConfig::new(), "/");

        let result = drill.apply(&snapshot, &matched, DrillMode::Sideways, 10);
        assert_eq!(result.hits.len(), 1);
        let color = facet(&result, "Color");
        assert_eq!(color.value(0), Some(&FV::new("Green", 1)));
        assert_eq!(color.count_of("Red"), Some(1));
        let size = facet(&result, "Size");
        assert_eq!(size.value(0), Some(&FV::new("S", 1)));
        assert_eq!(size.count_of("L"), None);
    }

    #[test]
    fn test_drilled_label_is_pinned() {
        let snapshot = data();
        let matched: Vec<DocId> = snapshot.live_docs().collect();

        let mut drill = DrillDown::new();
        drill.add("Color", "Green", vec!["Green".into()]);
        let result = drill.apply(&snapshot, &matched, DrillMode::Sideways, 1);
        let color = facet(&result, "Color");
        assert_eq!(color.labels(), vec!["Green", "Red"]);

        let drill = DrillDown::from_specs(&["Color/Purple"], &FacetsConfig::new(), "/");
        let result = drill.apply(&snapshot, &matched, DrillMode::Down, 10);
        assert!(result.hits.is_empty());
        assert_eq!(facet(&result, "Color").values(), &[FV::new("Purple", 0)]);
    }
}
