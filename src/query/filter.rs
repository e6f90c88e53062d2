//! Exact-term filters restricting a search without affecting scores.

use std::collections::BTreeSet;

use crate::document::FIELD_KIND;
use crate::index::{DocId, IndexSnapshot};

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Documents containing any of the `(field, term)` pairs.
    Terms(Vec<(String, String)>),
    /// Documents passing every filter.
    And(Vec<Filter>),
}

impl Filter {
    pub fn term(field: impl Into<String>, term: impl Into<String>) -> Self {
        Filter::Terms(vec![(field.into(), term.into())])
    }

    /// Documents of any of the given kinds.
    pub fn kinds<I, S>(kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Filter::Terms(
            kinds
                .into_iter()
                .map(|k| (FIELD_KIND.to_string(), k.into()))
                .collect(),
        )
    }

    /// Live documents passing the filter.
    pub fn matches(&self, snapshot: &IndexSnapshot) -> BTreeSet<DocId> {
        match self {
            Filter::Terms(terms) => terms
                .iter()
                .flat_map(|(field, term)| snapshot.postings(field, term))
                .map(|(doc, _)| doc)
                .collect(),
            Filter::And(filters) => {
                let mut iter = filters.iter();
                let Some(first) = iter.next() else {
                    return snapshot.live_docs().collect();
                };
                let mut docs = first.matches(snapshot);
                for filter in iter {
                    if docs.is_empty() {
                        break;
                    }
                    let next = filter.matches(snapshot);
                    docs.retain(|d| next.contains(d));
                }
                docs
            }
        }
    }
}
