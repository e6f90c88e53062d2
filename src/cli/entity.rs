//! Schema-less entities read from JSON-lines records.

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::document::{FieldSet, IdValue, IndexPolicy, Indexable, Value};
use crate::error::{Result, TaxisError};

/// Index policies of the record fields, by field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub facets: BTreeSet<String>,
    pub taxonomy: BTreeSet<String>,
    pub suggest: BTreeSet<String>,
    pub sortable: BTreeSet<String>,
}

impl FieldSchema {
    pub fn policy(&self, field: &str) -> IndexPolicy {
        let mut policy = IndexPolicy::new();
        if self.facets.contains(field) || self.taxonomy.contains(field) {
            policy = policy.facet();
        }
        if self.taxonomy.contains(field) {
            policy = policy.taxonomy();
        }
        if self.suggest.contains(field) {
            policy = policy.suggest();
        }
        if self.sortable.contains(field) {
            policy = policy.sortable();
        }
        policy
    }
}

/// One record: a `kind`, an `id` and arbitrary other fields.
#[derive(Debug, Clone)]
pub struct JsonEntity {
    kind: String,
    id: IdValue,
    record: serde_json::Map<String, serde_json::Value>,
    schema: Arc<FieldSchema>,
}

impl JsonEntity {
    pub fn from_json(value: serde_json::Value, schema: Arc<FieldSchema>) -> Result<Self> {
        let serde_json::Value::Object(record) = value else {
            return Err(TaxisError::field("record is not a JSON object"));
        };
        let kind = record
            .get("kind")
            .and_then(|k| k.as_str())
            .ok_or_else(|| TaxisError::field("record has no \"kind\""))?
            .to_string();
        let id = match record.get("id") {
            Some(serde_json::Value::Number(n)) if n.is_i64() => {
                IdValue::Long(n.as_i64().unwrap_or_default())
            }
            Some(serde_json::Value::String(s)) => IdValue::Text(s.clone()),
            _ => return Err(TaxisError::field("record has no usable \"id\"")),
        };
        Ok(JsonEntity {
            kind,
            id,
            record,
            schema,
        })
    }

    pub fn id(&self) -> &IdValue {
        &self.id
    }

    /// The record as read.
    pub fn record(&self) -> serde_json::Value {
        serde_json::Value::Object(self.record.clone())
    }
}

fn to_value(json: &serde_json::Value) -> Value<'_> {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(v) => Value::Long(v),
            None => n.as_f64().map_or(Value::Null, Value::Double),
        },
        serde_json::Value::String(s) => Value::Text(Cow::Borrowed(s.as_str())),
        serde_json::Value::Array(items) => Value::List(items.iter().map(to_value).collect()),
        serde_json::Value::Object(_) => Value::Text(Cow::Owned(json.to_string())),
    }
}

impl Indexable for JsonEntity {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn describe<'a>(&'a self, fields: &mut FieldSet<'a>) {
        match &self.id {
            IdValue::Long(id) => fields.id("id", *id),
            IdValue::Text(id) => fields.id("id", id),
        };
        for (name, value) in &self.record {
            if name == "kind" || name == "id" {
                continue;
            }
            fields.field_with(name.as_str(), self.schema.policy(name), to_value(value));
        }
    }
}

/// Read the records of a JSON-lines file. Blank lines are ignored and
/// malformed lines are reported and skipped.
pub fn load_records<P: AsRef<Path>>(path: P, schema: Arc<FieldSchema>) -> Result<Vec<JsonEntity>> {
    let file = File::open(path.as_ref())?;
    let mut records = Vec::new();
    for (line_num, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let parsed = serde_json::from_str::<serde_json::Value>(&line)
            .map_err(TaxisError::from)
            .and_then(|value| JsonEntity::from_json(value, schema.clone()));
        match parsed {
            Ok(entity) => records.push(entity),
            Err(e) => warn!(
                "{}:{}: skipping record: {e}",
                path.as_ref().display(),
                line_num + 1
            ),
        }
    }
    Ok(records)
}
