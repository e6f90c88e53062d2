//! Values produced by field accessors.

use std::borrow::Cow;
use std::fmt;

use chrono::{DateTime, Datelike, Utc};

use crate::document::indexable::Indexable;

/// The value of one described field.
///
/// Text may borrow from the entity, and nested objects are always borrowed,
/// so describing an entity does not copy its object graph.
#[derive(Clone)]
pub enum Value<'a> {
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Date(DateTime<Utc>),
    Text(Cow<'a, str>),
    List(Vec<Value<'a>>),
    Object(&'a dyn Indexable),
}

impl<'a> Value<'a> {
    /// Wrap a nested indexable object.
    pub fn object(object: &'a dyn Indexable) -> Self {
        Value::Object(object)
    }

    /// Wrap a sequence of nested indexable objects.
    pub fn objects<I>(objects: I) -> Self
    where
        I: IntoIterator<Item = &'a dyn Indexable>,
    {
        Value::List(objects.into_iter().map(Value::Object).collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether the value is numeric. Numbers never get a full-path text field.
    pub fn is_number(&self) -> bool {
        matches!(
            self,
            Value::Int(_) | Value::Long(_) | Value::Float(_) | Value::Double(_)
        )
    }

    /// Text rendering used for text fields, facet labels and identifiers.
    /// Lists and objects have no text form.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Null | Value::List(_) | Value::Object(_) => None,
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(v) => Some(v.to_string()),
            Value::Long(v) => Some(v.to_string()),
            Value::Float(v) => Some(v.to_string()),
            Value::Double(v) => Some(v.to_string()),
            Value::Date(d) => Some(d.timestamp_millis().to_string()),
            Value::Text(s) => Some(s.to_string()),
        }
    }

    /// Four-digit year of a date value.
    pub fn year(&self) -> Option<String> {
        match self {
            Value::Date(d) => Some(format!("{:04}", d.year())),
            _ => None,
        }
    }
}

impl fmt::Debug for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(v) => write!(f, "Bool({v})"),
            Value::Int(v) => write!(f, "Int({v})"),
            Value::Long(v) => write!(f, "Long({v})"),
            Value::Float(v) => write!(f, "Float({v})"),
            Value::Double(v) => write!(f, "Double({v})"),
            Value::Date(v) => write!(f, "Date({v})"),
            Value::Text(v) => write!(f, "Text({v:?})"),
            Value::List(items) => f.debug_tuple("List").field(items).finish(),
            Value::Object(o) => write!(f, "Object({})", o.kind()),
        }
    }
}

impl From<bool> for Value<'_> {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value<'_> {
    fn from(value: i32) -> Self {
        Value::Int(value)
    }
}

impl From<i64> for Value<'_> {
    fn from(value: i64) -> Self {
        Value::Long(value)
    }
}

impl From<f32> for Value<'_> {
    fn from(value: f32) -> Self {
        Value::Float(value)
    }
}

impl From<f64> for Value<'_> {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<DateTime<Utc>> for Value<'_> {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Date(value)
    }
}

impl<'a> From<&'a str> for Value<'a> {
    fn from(value: &'a str) -> Self {
        Value::Text(Cow::Borrowed(value))
    }
}

impl<'a> From<&'a String> for Value<'a> {
    fn from(value: &'a String) -> Self {
        Value::Text(Cow::Borrowed(value.as_str()))
    }
}

impl From<String> for Value<'_> {
    fn from(value: String) -> Self {
        Value::Text(Cow::Owned(value))
    }
}

impl<'a, T: Into<Value<'a>>> From<Option<T>> for Value<'a> {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

impl<'a, T: Into<Value<'a>>> From<Vec<T>> for Value<'a> {
    fn from(values: Vec<T>) -> Self {
        Value::List(values.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_text_rendering() {
        assert_eq!(Value::from(42i64).as_text().as_deref(), Some("42"));
        assert_eq!(Value::from(true).as_text().as_deref(), Some("true"));
        assert_eq!(Value::from("Red").as_text().as_deref(), Some("Red"));
        assert_eq!(Value::from(None::<String>).as_text(), None);
        assert!(Value::from(None::<i32>).is_null());
        assert!(Value::from(1.5f64).is_number());
        assert!(!Value::from("1.5").is_number());
    }

    #[test]
    fn test_date_year() {
        let date = Utc.with_ymd_and_hms(2014, 3, 1, 12, 0, 0).unwrap();
        let value = Value::from(date);
        assert_eq!(value.year().as_deref(), Some("2014"));
        assert_eq!(
            value.as_text(),
            Some(date.timestamp_millis().to_string())
        );
    }

    #[test]
    fn test_lists() {
        let value = Value::from(vec!["a", "b"]);
        match value {
            Value::List(items) => assert_eq!(items.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
    }
}
