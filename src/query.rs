//! Queries, filters and their evaluation against an index snapshot.
//!
//! Queries hold the raw text the user typed. Analysis happens when a query
//! runs, because only the snapshot knows whether a field was indexed as
//! analyzed text, as exact keywords or both.

pub mod collector;
pub mod filter;
pub mod matcher;
pub mod parser;
pub mod scorer;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use collector::{ScoreDoc, SortField, TopDocs, TopDocsCollector};
pub use filter::Filter;
pub use matcher::Matcher;
pub use parser::QueryParser;
pub use scorer::BM25Scorer;

/// How a clause participates in a boolean query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Occur {
    Must,
    Should,
    MustNot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clause {
    pub occur: Occur,
    pub query: Query,
}

impl Clause {
    pub fn new(occur: Occur, query: Query) -> Self {
        Clause { occur, query }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Query {
    MatchAll,
    MatchNone,
    /// A single word or keyword.
    Term { field: String, text: String },
    /// Terms starting with `prefix`.
    Prefix { field: String, prefix: String },
    /// A quoted phrase; its words must be adjacent.
    Phrase { field: String, text: String },
    /// Numeric range; open ends are `None`.
    Range {
        field: String,
        min: Option<f64>,
        max: Option<f64>,
        min_inclusive: bool,
        max_inclusive: bool,
    },
    Boolean(Vec<Clause>),
}

impl Query {
    pub fn term(field: impl Into<String>, text: impl Into<String>) -> Self {
        Query::Term {
            field: field.into(),
            text: text.into(),
        }
    }

    /// Inclusive numeric range.
    pub fn range(field: impl Into<String>, min: Option<f64>, max: Option<f64>) -> Self {
        Query::Range {
            field: field.into(),
            min,
            max,
            min_inclusive: true,
            max_inclusive: true,
        }
    }

    /// Boolean query whose clauses must all match.
    pub fn all_of(queries: impl IntoIterator<Item = Query>) -> Self {
        Query::Boolean(
            queries
                .into_iter()
                .map(|q| Clause::new(Occur::Must, q))
                .collect(),
        )
    }

    /// Boolean query of which at least one clause must match.
    pub fn any_of(queries: impl IntoIterator<Item = Query>) -> Self {
        Query::Boolean(
            queries
                .into_iter()
                .map(|q| Clause::new(Occur::Should, q))
                .collect(),
        )
    }
}

fn fmt_bound(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "*".to_string())
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::MatchAll => write!(f, "*:*"),
            Query::MatchNone => write!(f, "-*:*"),
            Query::Term { field, text } => write!(f, "{field}:{text}"),
            Query::Prefix { field, prefix } => write!(f, "{field}:{prefix}*"),
            Query::Phrase { field, text } => write!(f, "{field}:\"{text}\""),
            Query::Range {
                field,
                min,
                max,
                min_inclusive,
                max_inclusive,
            } => write!(
                f,
                "{field}:{}{} TO {}{}",
                if *min_inclusive { '[' } else { '{' },
                fmt_bound(*min),
                fmt_bound(*max),
                if *max_inclusive { ']' } else { '}' }
            ),
            Query::Boolean(clauses) => {
                write!(f, "(")?;
                for (i, clause) in clauses.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    match clause.occur {
                        Occur::Must => write!(f, "+")?,
                        Occur::MustNot => write!(f, "-")?,
                        Occur::Should => {}
                    }
                    write!(f, "{}", clause.query)?;
                }
                write!(f, ")")
            }
        }
    }
}
