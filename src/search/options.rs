//! Per-request search options.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::facet::DrillMode;
use crate::query::SortField;

/// Options of one search, usually parsed from query-string pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Restrict hits to this kind and its subtypes.
    pub kind: Option<String>,
    /// Page size.
    pub top: usize,
    /// Hits skipped before the page.
    pub skip: usize,
    /// Labels returned per facet dimension.
    pub fdim: usize,
    /// Upper bound of the randomized synchronous hydration window; zero
    /// hydrates everything before returning.
    pub fetch: usize,
    /// Drill-down constraints as `dim/value`.
    pub facets: Vec<String>,
    /// Whether drilled dimensions are counted sideways.
    pub sideway: bool,
    /// Sort specs: `^field` ascending, `$field` descending, bare ascending.
    pub order: Vec<String>,
    /// Relation paths loaded eagerly when hydrating.
    pub expand: Vec<String>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        SearchOptions {
            kind: None,
            top: 10,
            skip: 0,
            fdim: 10,
            fetch: 100,
            facets: Vec::new(),
            sideway: false,
            order: Vec::new(),
            expand: Vec::new(),
        }
    }
}

impl SearchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `key=value` pairs. Repeatable keys accumulate; unknown keys
    /// are ignored and malformed numbers keep their default.
    pub fn parse<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut options = SearchOptions::default();
        for (key, value) in pairs {
            let (key, value) = (key.as_ref(), value.as_ref().trim());
            match key {
                "kind" if !value.is_empty() => options.kind = Some(value.to_string()),
                "top" => parse_number(key, value, &mut options.top),
                "skip" => parse_number(key, value, &mut options.skip),
                "fdim" => parse_number(key, value, &mut options.fdim),
                "fetch" => parse_number(key, value, &mut options.fetch),
                "facet" if !value.is_empty() => options.facets.push(value.to_string()),
                "drill" => options.sideway = value.eq_ignore_ascii_case("sideway"),
                "order" if !value.is_empty() => options.order.push(value.to_string()),
                "expand" if !value.is_empty() => options.expand.push(value.to_string()),
                _ => {}
            }
        }
        options
    }

    /// Parse a `key=value&key=value` string.
    pub fn parse_query_string(query: &str) -> Self {
        Self::parse(
            query
                .split('&')
                .filter(|p| !p.is_empty())
                .map(|p| p.split_once('=').unwrap_or((p, ""))),
        )
    }

    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn top(mut self, top: usize) -> Self {
        self.top = top;
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn fdim(mut self, fdim: usize) -> Self {
        self.fdim = fdim;
        self
    }

    pub fn fetch(mut self, fetch: usize) -> Self {
        self.fetch = fetch;
        self
    }

    /// Add a `dim/value` drill-down constraint.
    pub fn facet(mut self, facet: impl Into<String>) -> Self {
        self.facets.push(facet.into());
        self
    }

    pub fn sideway(mut self, sideway: bool) -> Self {
        self.sideway = sideway;
        self
    }

    pub fn order(mut self, order: impl Into<String>) -> Self {
        self.order.push(order.into());
        self
    }

    pub fn expand(mut self, path: impl Into<String>) -> Self {
        self.expand.push(path.into());
        self
    }

    /// Number of ranked hits needed for the requested page.
    pub fn max(&self) -> usize {
        self.skip.saturating_add(self.top)
    }

    pub fn drill_mode(&self) -> DrillMode {
        if self.sideway {
            DrillMode::Sideways
        } else {
            DrillMode::Down
        }
    }

    /// Sort keys named by [`order`](SearchOptions::order).
    pub fn sort_fields(&self) -> Vec<SortField> {
        self.order
            .iter()
            .filter_map(|spec| {
                let (field, reverse) = match spec.chars().next()? {
                    '^' => (&spec[1..], false),
                    '$' => (&spec[1..], true),
                    _ => (spec.as_str(), false),
                };
                (!field.is_empty()).then(|| SortField::new(field, reverse))
            })
            .collect()
    }
}

fn parse_number(key: &str, value: &str, target: &mut usize) {
    match value.parse::<usize>() {
        Ok(n) => *target = n,
        Err(_) => warn!("ignoring malformed {key}={value}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pairs() {
        let options = SearchOptions::parse([
            ("kind", "ix.test.Widget"),
            ("top", "25"),
            ("skip", "5"),
            ("fdim", "x"),
            ("facet", "Color/Red"),
            ("facet", "Size/L"),
            ("drill", "sideway"),
            ("order", "$name"),
            ("expand", "parts"),
            ("bogus", "1"),
        ]);
        assert_eq!(options.kind.as_deref(), Some("ix.test.Widget"));
        assert_eq!(options.top, 25);
        assert_eq!(options.max(), 30);
        assert_eq!(options.fdim, 10);
        assert_eq!(options.facets, vec!["Color/Red", "Size/L"]);
        assert_eq!(options.drill_mode(), DrillMode::Sideways);
        assert_eq!(options.expand, vec!["parts"]);
        assert_eq!(options.sort_fields(), vec![SortField::new("name", true)]);
    }

    #[test]
    fn test_parse_query_string_and_sort_specs() {
        let options = SearchOptions::parse_query_string("order=^weight&order=name&order=$&drill=down&fetch=0");
        assert_eq!(options.fetch, 0);
        assert!(!options.sideway);
        assert_eq!(
            options.sort_fields(),
            vec![SortField::new("weight", false), SortField::new("name", false)]
        );
    }
}
