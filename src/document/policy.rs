//! Per-field indexing policy.

use serde::{Deserialize, Serialize};

/// How one field of an entity is indexed.
///
/// The default policy indexes the field as text under its leaf and full
/// path names and does nothing else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexPolicy {
    /// Skip the field entirely when false.
    pub indexed: bool,
    /// Also emit a facet value.
    pub facet: bool,
    /// The facet value is a path split on `path_sep`.
    pub taxonomy: bool,
    /// Register the value with the suggestion lookup of its dimension.
    pub suggest: bool,
    /// Register the field with the sort registry.
    pub sortable: bool,
    /// Dimension name overriding the path-derived one.
    pub name: Option<String>,
    /// Separator for taxonomy values; the indexer default applies when unset.
    pub path_sep: Option<String>,
    /// Bucket boundaries for integer range facets.
    pub ranges: Vec<i64>,
    /// Bucket boundaries for floating point range facets.
    pub dranges: Vec<f64>,
    /// Decimal places used in floating point range labels.
    pub precision: usize,
}

impl Default for IndexPolicy {
    fn default() -> Self {
        IndexPolicy {
            indexed: true,
            facet: false,
            taxonomy: false,
            suggest: false,
            sortable: false,
            name: None,
            path_sep: None,
            ranges: Vec::new(),
            dranges: Vec::new(),
            precision: 2,
        }
    }
}

impl IndexPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy that keeps the field out of the index.
    pub fn skipped() -> Self {
        IndexPolicy {
            indexed: false,
            ..Self::default()
        }
    }

    pub fn facet(mut self) -> Self {
        self.facet = true;
        self
    }

    pub fn taxonomy(mut self) -> Self {
        self.taxonomy = true;
        self
    }

    pub fn suggest(mut self) -> Self {
        self.suggest = true;
        self
    }

    pub fn sortable(mut self) -> Self {
        self.sortable = true;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn path_sep(mut self, sep: impl Into<String>) -> Self {
        self.path_sep = Some(sep.into());
        self
    }

    pub fn ranges(mut self, ranges: impl IntoIterator<Item = i64>) -> Self {
        self.ranges = ranges.into_iter().collect();
        self
    }

    pub fn dranges(mut self, ranges: impl IntoIterator<Item = f64>) -> Self {
        self.dranges = ranges.into_iter().collect();
        self
    }

    pub fn precision(mut self, precision: usize) -> Self {
        self.precision = precision;
        self
    }

    /// Whether the value becomes a facet (flat or hierarchical).
    pub fn is_facet(&self) -> bool {
        self.facet || self.taxonomy
    }
}
