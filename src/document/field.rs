//! Flattened index fields.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::document::FIELD_KIND;

/// Native identifier of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IdValue {
    Long(i64),
    Text(String),
}

impl IdValue {
    /// Parse a display identifier, preferring the numeric form.
    pub fn parse(text: &str) -> Self {
        text.parse::<i64>()
            .map(IdValue::Long)
            .unwrap_or_else(|_| IdValue::Text(text.to_string()))
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            IdValue::Long(v) => Some(*v),
            IdValue::Text(_) => None,
        }
    }
}

impl fmt::Display for IdValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdValue::Long(v) => write!(f, "{v}"),
            IdValue::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for IdValue {
    fn from(value: i64) -> Self {
        IdValue::Long(value)
    }
}

impl From<&str> for IdValue {
    fn from(value: &str) -> Self {
        IdValue::Text(value.to_string())
    }
}

impl From<String> for IdValue {
    fn from(value: String) -> Self {
        IdValue::Text(value)
    }
}

/// A numeric field value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Numeric {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
}

impl Numeric {
    pub fn as_f64(&self) -> f64 {
        match *self {
            Numeric::Int(v) => v as f64,
            Numeric::Long(v) => v as f64,
            Numeric::Float(v) => v as f64,
            Numeric::Double(v) => v,
        }
    }

    /// Integral value, if this is an integer type.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Numeric::Int(v) => Some(v as i64),
            Numeric::Long(v) => Some(v),
            _ => None,
        }
    }

    pub fn sort_value(&self) -> SortValue {
        match self.as_i64() {
            Some(v) => SortValue::Long(v),
            None => SortValue::Double(self.as_f64()),
        }
    }
}

impl fmt::Display for Numeric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Numeric::Int(v) => write!(f, "{v}"),
            Numeric::Long(v) => write!(f, "{v}"),
            Numeric::Float(v) => write!(f, "{v}"),
            Numeric::Double(v) => write!(f, "{v}"),
        }
    }
}

/// A per-document value used for sorting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SortValue {
    Text(String),
    Long(i64),
    Double(f64),
}

impl SortValue {
    /// Total order: numbers compare numerically, text lexically, and numbers
    /// sort before text when a field mixes both.
    pub fn compare(&self, other: &SortValue) -> Ordering {
        match (self, other) {
            (SortValue::Long(a), SortValue::Long(b)) => a.cmp(b),
            (SortValue::Text(a), SortValue::Text(b)) => a.cmp(b),
            (SortValue::Text(_), _) => Ordering::Greater,
            (_, SortValue::Text(_)) => Ordering::Less,
            (a, b) => a.as_f64().total_cmp(&b.as_f64()),
        }
    }

    fn as_f64(&self) -> f64 {
        match self {
            SortValue::Long(v) => *v as f64,
            SortValue::Double(v) => *v,
            SortValue::Text(_) => f64::NAN,
        }
    }
}

/// One field of a flattened document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IndexField {
    /// Exact, unanalyzed term.
    Keyword {
        name: String,
        value: String,
        stored: bool,
    },
    /// Analyzed text with positions.
    Text {
        name: String,
        value: String,
        stored: bool,
    },
    /// Numeric value, range-searchable.
    Numeric {
        name: String,
        value: Numeric,
        stored: bool,
    },
    /// Facet label under a dimension; more than one component for taxonomy paths.
    Facet { dim: String, path: Vec<String> },
    /// Exact term whose per-document set is kept for term-vector statistics.
    TermVector { name: String, value: String },
    /// Value used when sorting on `name`.
    Sort { name: String, value: SortValue },
}

impl IndexField {
    pub fn name(&self) -> &str {
        match self {
            IndexField::Keyword { name, .. }
            | IndexField::Text { name, .. }
            | IndexField::Numeric { name, .. }
            | IndexField::TermVector { name, .. }
            | IndexField::Sort { name, .. } => name,
            IndexField::Facet { dim, .. } => dim,
        }
    }

    /// String value of keyword, text and term-vector fields.
    pub fn string_value(&self) -> Option<&str> {
        match self {
            IndexField::Keyword { value, .. }
            | IndexField::Text { value, .. }
            | IndexField::TermVector { value, .. } => Some(value),
            _ => None,
        }
    }
}

/// A flattened document ready for the index writer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexDocument {
    pub fields: Vec<IndexField>,
}

impl IndexDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: IndexField) {
        self.fields.push(field);
    }

    /// Kind of the entity the document was built from.
    pub fn kind(&self) -> Option<&str> {
        self.fields.iter().find_map(|f| match f {
            IndexField::Keyword { name, value, .. } if name == FIELD_KIND => Some(value.as_str()),
            _ => None,
        })
    }

    /// All fields with the given name.
    pub fn get<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a IndexField> + 'a {
        self.fields.iter().filter(move |f| f.name() == name)
    }

    /// All facet labels recorded under `dim`.
    pub fn facet_paths<'a>(&'a self, dim: &'a str) -> impl Iterator<Item = &'a [String]> + 'a {
        self.fields.iter().filter_map(move |f| match f {
            IndexField::Facet { dim: d, path } if d == dim => Some(path.as_slice()),
            _ => None,
        })
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
