//! Facet values, counting and drill-down.
//!
//! Labels are compared exactly everywhere, including [`Facet::count_of`].

pub mod counts;
pub mod drill;

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

pub use counts::FacetCounts;
pub use drill::{DrillDown, DrillMode, DrillResult};

/// One label of a facet with its hit count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FV {
    pub label: String,
    pub count: usize,
}

impl FV {
    pub fn new(label: impl Into<String>, count: usize) -> Self {
        FV {
            label: label.into(),
            count,
        }
    }
}

/// Counts of the labels of one dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facet {
    name: String,
    values: Vec<FV>,
}

impl Facet {
    pub fn new(name: impl Into<String>) -> Self {
        Facet {
            name: name.into(),
            values: Vec::new(),
        }
    }

    pub fn with_values(name: impl Into<String>, values: Vec<FV>) -> Self {
        Facet {
            name: name.into(),
            values,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &[FV] {
        &self.values
    }

    pub fn value(&self, index: usize) -> Option<&FV> {
        self.values.get(index)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Append a label. An existing label keeps its position and gets the new count.
    pub fn add(&mut self, label: impl Into<String>, count: usize) {
        let label = label.into();
        match self.values.iter_mut().find(|v| v.label == label) {
            Some(existing) => existing.count = count,
            None => self.values.push(FV { label, count }),
        }
    }

    /// Count of `label`, if present.
    pub fn count_of(&self, label: &str) -> Option<usize> {
        self.values
            .iter()
            .find(|v| v.label == label)
            .map(|v| v.count)
    }

    /// A copy holding only the values accepted by `pred`.
    pub fn filter<F>(&self, mut pred: F) -> Facet
    where
        F: FnMut(&FV) -> bool,
    {
        Facet {
            name: self.name.clone(),
            values: self.values.iter().filter(|v| pred(v)).cloned().collect(),
        }
    }

    /// Descending count, ties broken by label.
    pub fn sort(&mut self) {
        self.sort_counts(true);
    }

    pub fn sort_labels(&mut self, desc: bool) {
        if desc {
            self.values.sort_by(|a, b| b.label.cmp(&a.label));
        } else {
            self.values.sort_by(|a, b| a.label.cmp(&b.label));
        }
    }

    pub fn sort_counts(&mut self, desc: bool) {
        self.values.sort_by(|a, b| {
            let by_count = if desc {
                b.count.cmp(&a.count)
            } else {
                a.count.cmp(&b.count)
            };
            match by_count {
                Ordering::Equal => a.label.cmp(&b.label),
                other => other,
            }
        });
    }

    /// Move `label` to the front, inserting it with `count` when missing.
    pub fn pin(&mut self, label: &str, count: usize) {
        match self.values.iter().position(|v| v.label == label) {
            Some(0) => {}
            Some(index) => {
                let value = self.values.remove(index);
                self.values.insert(0, value);
            }
            None => self.values.insert(0, FV::new(label, count)),
        }
    }

    pub fn labels(&self) -> Vec<&str> {
        self.values.iter().map(|v| v.label.as_str()).collect()
    }

    pub fn counts(&self) -> Vec<usize> {
        self.values.iter().map(|v| v.count).collect()
    }

    /// Keep the first `n` values.
    pub fn truncate(&mut self, n: usize) {
        self.values.truncate(n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn colors() -> Facet {
        Facet::with_values(
            "Color",
            vec![FV::new("Blue", 3), FV::new("red", 7), FV::new("Red", 7), FV::new("Green", 1)],
        )
    }

    #[test]
    fn test_sorting() {
        let mut facet = colors();
        facet.sort();
        assert_eq!(facet.labels(), vec!["Red", "red", "Blue", "Green"]);
        facet.sort_counts(false);
        assert_eq!(facet.labels(), vec!["Green", "Blue", "Red", "red"]);
        facet.sort_labels(true);
        assert_eq!(facet.labels(), vec!["red", "Red", "Green", "Blue"]);
        assert_eq!(facet.counts(), vec![7, 7, 1, 3]);
    }

    #[test]
    fn test_count_of_is_exact() {
        let facet = colors();
        assert_eq!(facet.count_of("Blue"), Some(3));
        assert_eq!(facet.count_of("blue"), None);
        let filtered = facet.filter(|v| v.count > 2);
        assert_eq!(filtered.len(), 3);
        assert_eq!(filtered.name(), "Color");
    }

    #[test]
    fn test_pin() {
        let mut facet = colors();
        facet.pin("Green", 99);
        assert_eq!(facet.value(0), Some(&FV::new("Green", 1)));
        facet.pin("Purple", 0);
        assert_eq!(facet.value(0), Some(&FV::new("Purple", 0)));
        assert_eq!(facet.len(), 5);
    }
}
