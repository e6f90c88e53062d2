//! Flattening of described entities into index documents.

use log::{debug, warn};

use crate::document::field::{IndexDocument, IndexField, Numeric, SortValue};
use crate::document::indexable::{FacetMode, FieldSource, Indexable};
use crate::document::policy::IndexPolicy;
use crate::document::value::Value;
use crate::document::{DIM_CLASS, FIELD_KIND, FIELD_TEXT, id_field, stored_id_field, wrap_sentinels};
use crate::index::facets_config::FacetsConfig;
use crate::index::sorters::{SortRegistry, SortType};

/// Nested objects deeper than this are not indexed.
const MAX_DEPTH: usize = 16;

/// Result of flattening one entity.
#[derive(Debug, Default)]
pub struct BuiltDocument {
    pub document: IndexDocument,
    /// `(dimension, value)` pairs for the suggestion lookups.
    pub suggestions: Vec<(String, String)>,
}

#[derive(Default)]
struct BuildState {
    fields: Vec<IndexField>,
    suggestions: Vec<(String, String)>,
}

/// Walks an entity description and produces its [`IndexDocument`].
///
/// Facet dimensions and sort fields discovered along the way are registered
/// with the shared [`FacetsConfig`] and [`SortRegistry`].
pub struct DocumentBuilder<'c> {
    facets: &'c FacetsConfig,
    sorters: &'c SortRegistry,
    path_separator: &'c str,
    text_field: &'c str,
}

impl<'c> DocumentBuilder<'c> {
    pub fn new(facets: &'c FacetsConfig, sorters: &'c SortRegistry) -> Self {
        DocumentBuilder {
            facets,
            sorters,
            path_separator: "/",
            text_field: FIELD_TEXT,
        }
    }

    /// Default separator for taxonomy values.
    pub fn path_separator(mut self, separator: &'c str) -> Self {
        self.path_separator = separator;
        self
    }

    /// Catch-all field receiving every string value.
    pub fn text_field(mut self, field: &'c str) -> Self {
        self.text_field = field;
        self
    }

    /// Flatten `entity` into a document.
    pub fn build(&self, entity: &dyn Indexable) -> BuiltDocument {
        let mut state = BuildState::default();
        state.fields.push(IndexField::Keyword {
            name: FIELD_KIND.to_string(),
            value: entity.kind().to_string(),
            stored: true,
        });

        let mut path = Vec::new();
        self.instrument(entity, &mut path, &mut state, 0);

        let texts: Vec<String> = state
            .fields
            .iter()
            .filter_map(|f| f.string_value().map(str::to_string))
            .collect();
        for text in texts {
            state.fields.push(IndexField::Text {
                name: self.text_field.to_string(),
                value: text,
                stored: false,
            });
        }

        BuiltDocument {
            document: IndexDocument {
                fields: state.fields,
            },
            suggestions: state.suggestions,
        }
    }

    fn instrument(
        &self,
        entity: &dyn Indexable,
        path: &mut Vec<String>,
        state: &mut BuildState,
        depth: usize,
    ) {
        if depth > MAX_DEPTH {
            warn!("{}: object graph deeper than {MAX_DEPTH}; truncated", entity.kind());
            return;
        }

        let kind = entity.kind();
        state.fields.push(IndexField::Facet {
            dim: DIM_CLASS.to_string(),
            path: vec![kind.to_string()],
        });

        let mut fields = crate::document::FieldSet::new();
        entity.describe(&mut fields);

        for entry in fields.into_entries() {
            if !entry.policy.indexed {
                continue;
            }
            let value = match entry.value {
                Ok(value) => value,
                Err(e) => {
                    warn!("{kind}: field {} is not indexable due to {e}", entry.name);
                    continue;
                }
            };

            match entry.source {
                FieldSource::Id => self.index_id(kind, &entry.name, &value, state),
                FieldSource::Method => {
                    let name = strip_getter(&entry.name);
                    let mut method_path = vec![name.to_string()];
                    self.walk(&entry.policy, &value, &mut method_path, state, depth);
                }
                FieldSource::Field => {
                    path.push(entry.name);
                    self.walk(&entry.policy, &value, path, state, depth);
                    path.pop();
                }
            }
        }

        if let FacetMode::Dynamic { label, value } = entity.facet_mode() {
            if !label.is_empty() && !value.is_empty() {
                self.facets.register_dim(&label, false);
                state.fields.push(IndexField::Facet {
                    dim: label.clone(),
                    path: vec![value.clone()],
                });
                state.fields.push(IndexField::TermVector {
                    name: label.clone(),
                    value: value.clone(),
                });
                state.suggestions.push((label, value));
            }
        }
    }

    fn index_id(&self, kind: &str, name: &str, value: &Value<'_>, state: &mut BuildState) {
        let stored = stored_id_field(kind);
        let display = match value {
            Value::Null => {
                debug!("{kind}: id field {name} is null");
                return;
            }
            Value::Long(v) => {
                state.fields.push(IndexField::Numeric {
                    name: stored,
                    value: Numeric::Long(*v),
                    stored: true,
                });
                v.to_string()
            }
            Value::Int(v) => {
                state.fields.push(IndexField::Numeric {
                    name: stored,
                    value: Numeric::Long(*v as i64),
                    stored: true,
                });
                v.to_string()
            }
            other => match other.as_text() {
                Some(text) => {
                    state.fields.push(IndexField::Keyword {
                        name: stored,
                        value: text.clone(),
                        stored: true,
                    });
                    text
                }
                None => {
                    warn!("{kind}: id field {name} has no scalar value");
                    return;
                }
            },
        };
        state.fields.push(IndexField::Keyword {
            name: id_field(kind),
            value: display,
            stored: false,
        });
    }

    fn walk(
        &self,
        policy: &IndexPolicy,
        value: &Value<'_>,
        path: &mut Vec<String>,
        state: &mut BuildState,
        depth: usize,
    ) {
        match value {
            Value::Null => {}
            Value::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    path.push(i.to_string());
                    self.walk(policy, item, path, state, depth);
                    path.pop();
                }
            }
            Value::Object(object) => {
                if object.type_policy().indexed {
                    self.instrument(*object, path, state, depth + 1);
                }
            }
            leaf => self.index_field(policy, path, leaf, state),
        }
    }

    fn index_field(
        &self,
        policy: &IndexPolicy,
        path: &[String],
        value: &Value<'_>,
        state: &mut BuildState,
    ) {
        let Some(name) = path.iter().rev().find(|s| !is_position(s)).cloned() else {
            return;
        };
        let full = to_path(path);
        let fname = policy.name.clone().unwrap_or_else(|| name.clone());
        let fields = &mut state.fields;

        let mut as_text = true;
        let mut text_value = None;

        match value {
            Value::Int(_) | Value::Long(_) => {
                let numeric = match value {
                    Value::Int(v) => Numeric::Int(*v),
                    Value::Long(v) => Numeric::Long(*v),
                    _ => unreachable!(),
                };
                fields.push(IndexField::Numeric {
                    name: full.clone(),
                    value: numeric,
                    stored: false,
                });
                as_text = policy.facet;
                if !as_text && name != full {
                    fields.push(IndexField::Numeric {
                        name: name.clone(),
                        value: numeric,
                        stored: false,
                    });
                }
                if policy.sortable {
                    let ty = match numeric {
                        Numeric::Int(_) => SortType::Int,
                        _ => SortType::Long,
                    };
                    self.sortable(&full, ty, numeric.sort_value(), fields);
                }
                if let Some(label) = numeric.as_i64().and_then(|v| range_label(&policy.ranges, v)) {
                    self.facets.register_dim(&fname, false);
                    fields.push(IndexField::Facet {
                        dim: fname.clone(),
                        path: vec![label],
                    });
                    as_text = false;
                }
            }
            Value::Float(_) | Value::Double(_) => {
                let numeric = match value {
                    Value::Float(v) => Numeric::Float(*v),
                    Value::Double(v) => Numeric::Double(*v),
                    _ => unreachable!(),
                };
                fields.push(IndexField::Numeric {
                    name: name.clone(),
                    value: numeric,
                    stored: false,
                });
                if full != name {
                    fields.push(IndexField::Numeric {
                        name: full.clone(),
                        value: numeric,
                        stored: false,
                    });
                }
                if policy.sortable {
                    let ty = match numeric {
                        Numeric::Float(_) => SortType::Float,
                        _ => SortType::Double,
                    };
                    self.sortable(&full, ty, numeric.sort_value(), fields);
                }
                if let Some(label) =
                    range_label_f64(&policy.dranges, numeric.as_f64(), policy.precision)
                {
                    self.facets.register_dim(&fname, false);
                    fields.push(IndexField::Facet {
                        dim: fname.clone(),
                        path: vec![label],
                    });
                }
                as_text = false;
            }
            Value::Date(date) => {
                let millis = Numeric::Long(date.timestamp_millis());
                fields.push(IndexField::Numeric {
                    name: name.clone(),
                    value: millis,
                    stored: false,
                });
                if full != name {
                    fields.push(IndexField::Numeric {
                        name: full.clone(),
                        value: millis,
                        stored: false,
                    });
                }
                if policy.sortable {
                    self.sortable(&full, SortType::Long, millis.sort_value(), fields);
                }
                as_text = policy.facet;
                text_value = value.year();
            }
            _ => {}
        }

        if !as_text {
            return;
        }
        let Some(text) = text_value.or_else(|| value.as_text()) else {
            return;
        };
        let dim = policy.name.clone().unwrap_or_else(|| full.clone());

        if policy.is_facet() {
            self.facets.register_dim(&dim, policy.taxonomy);
            let path = if policy.taxonomy {
                let sep = policy.path_sep.as_deref().unwrap_or(self.path_separator);
                text.split(sep)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            } else {
                vec![text.clone()]
            };
            if !path.is_empty() {
                fields.push(IndexField::Facet {
                    dim: dim.clone(),
                    path,
                });
            }
            fields.push(IndexField::TermVector {
                name: dim.clone(),
                value: text.clone(),
            });
        }

        if policy.suggest {
            if !policy.is_facet() {
                fields.push(IndexField::TermVector {
                    name: dim.clone(),
                    value: text.clone(),
                });
            }
            state.suggestions.push((dim.clone(), text.clone()));
        }

        let fields = &mut state.fields;
        if !value.is_number() && name != full {
            fields.push(IndexField::Text {
                name: full.clone(),
                value: wrap_sentinels(&text),
                stored: false,
            });
        }

        if policy.sortable && !self.sorters.contains(&name) {
            self.sorters.put(&name, SortType::String);
        }
        if policy.sortable && self.sorters.get(&name) == Some(SortType::String) {
            fields.push(IndexField::Sort {
                name: name.clone(),
                value: SortValue::Text(text.clone()),
            });
        }

        fields.push(IndexField::Text {
            name,
            value: wrap_sentinels(&text),
            stored: false,
        });
    }

    fn sortable(&self, field: &str, ty: SortType, value: SortValue, fields: &mut Vec<IndexField>) {
        self.sorters.put(field, ty);
        fields.push(IndexField::Sort {
            name: field.to_string(),
            value,
        });
    }
}

/// The `(field, term)` pair identifying `entity` in the index.
pub fn id_term(entity: &dyn Indexable) -> Option<(String, String)> {
    let id = entity.id_value()?;
    Some((id_field(entity.kind()), id.to_string()))
}

/// Label of the bucket `value` falls in: `<r0`, `ri:ri+1` or `>rn`.
pub fn range_label(ranges: &[i64], value: i64) -> Option<String> {
    let first = *ranges.first()?;
    if value < first {
        return Some(format!("<{first}"));
    }
    match ranges.windows(2).find(|w| value < w[1]) {
        Some(w) => Some(format!("{}:{}", w[0], w[1])),
        None => Some(format!(">{}", ranges[ranges.len() - 1])),
    }
}

/// Floating point variant of [`range_label`], rendering bounds with
/// `precision` decimals.
pub fn range_label_f64(ranges: &[f64], value: f64, precision: usize) -> Option<String> {
    let first = *ranges.first()?;
    if value < first {
        return Some(format!("<{first:.precision$}"));
    }
    match ranges.windows(2).find(|w| value < w[1]) {
        Some(w) => Some(format!("{:.precision$}:{:.precision$}", w[0], w[1])),
        None => Some(format!(">{:.precision$}", ranges[ranges.len() - 1])),
    }
}

/// Join a field path with `_`, leaving out positional segments.
pub fn to_path(path: &[String]) -> String {
    path.iter()
        .filter(|s| !is_position(s))
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("_")
}

fn is_position(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}

fn strip_getter(name: &str) -> &str {
    match name.strip_prefix("get") {
        Some(rest) if !rest.is_empty() => rest,
        _ => name,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::document::FieldSet;

    #[derive(Debug)]
    struct Part {
        color: String,
    }

    impl Indexable for Part {
        fn kind(&self) -> &str {
            "ix.test.Part"
        }

        fn is_entity(&self) -> bool {
            false
        }

        fn describe<'a>(&'a self, fields: &mut FieldSet<'a>) {
            fields.field_with("color", IndexPolicy::new().facet(), &self.color);
        }
    }

    #[derive(Debug)]
    struct Widget {
        id: i64,
        name: String,
        weight: i64,
        created: chrono::DateTime<Utc>,
        category: String,
        parts: Vec<Part>,
        secret: String,
    }

    impl Indexable for Widget {
        fn kind(&self) -> &str {
            "ix.test.Widget"
        }

        fn describe<'a>(&'a self, fields: &mut FieldSet<'a>) {
            fields
                .id("id", self.id)
                .field_with("name", IndexPolicy::new().suggest().sortable(), &self.name)
                .field_with("weight", IndexPolicy::new().ranges([10, 20]).sortable(), self.weight)
                .field_with("created", IndexPolicy::new().facet().named("Year"), self.created)
                .field_with(
                    "category",
                    IndexPolicy::new().taxonomy().named("Category"),
                    &self.category,
                )
                .field(
                    "parts",
                    Value::objects(self.parts.iter().map(|p| p as &dyn Indexable)),
                )
                .field_with("secret", IndexPolicy::skipped(), &self.secret)
                .try_field("broken", IndexPolicy::new(), Err(anyhow::anyhow!("boom")))
                .method("getSynonyms", IndexPolicy::new(), Ok(Value::from(vec!["Gizmo"])));
        }
    }

    fn widget() -> Widget {
        Widget {
            id: 7,
            name: "Sprocket".to_string(),
            weight: 15,
            created: Utc.with_ymd_and_hms(2014, 6, 1, 0, 0, 0).unwrap(),
            category: "Hardware/Gears".to_string(),
            parts: vec![Part {
                color: "Red".to_string(),
            }],
            secret: "hidden".to_string(),
        }
    }

    fn build(entity: &dyn Indexable) -> (BuiltDocument, FacetsConfig, SortRegistry) {
        let facets = FacetsConfig::new();
        let sorters = SortRegistry::new();
        let built = DocumentBuilder::new(&facets, &sorters).build(entity);
        (built, facets, sorters)
    }

    #[test]
    fn test_kind_and_identifier_fields() {
        let w = widget();
        let (built, _, _) = build(&w);
        let doc = &built.document;

        assert_eq!(doc.kind(), Some("ix.test.Widget"));
        assert!(doc.fields.contains(&IndexField::Numeric {
            name: "ix.test.Widget._id".into(),
            value: Numeric::Long(7),
            stored: true,
        }));
        assert!(doc.fields.contains(&IndexField::Keyword {
            name: "ix.test.Widget.id".into(),
            value: "7".into(),
            stored: false,
        }));
        let classes: Vec<&[String]> = doc.facet_paths(DIM_CLASS).collect();
        assert_eq!(classes.len(), 2);
    }

    #[test]
    fn test_text_fields_carry_sentinels_and_catch_all() {
        let w = widget();
        let (built, _, _) = build(&w);
        let doc = &built.document;

        assert!(doc.fields.contains(&IndexField::Text {
            name: "name".into(),
            value: "THE_START Sprocket THE_STOP".into(),
            stored: false,
        }));
        assert!(doc.get(FIELD_TEXT).any(|f| f.string_value() == Some("ix.test.Widget")));
        assert!(
            doc.get(FIELD_TEXT)
                .any(|f| f.string_value() == Some("THE_START Sprocket THE_STOP"))
        );
        assert_eq!(doc.get("secret").count(), 0);
        assert_eq!(doc.get("broken").count(), 0);
        assert_eq!(
            built.suggestions,
            vec![("name".to_string(), "Sprocket".to_string())]
        );
    }

    #[test]
    fn test_nested_paths_and_facets() {
        let w = widget();
        let (built, facets, _) = build(&w);
        let doc = &built.document;

        let colors: Vec<&[String]> = doc.facet_paths("parts_color").collect();
        assert_eq!(colors, vec![&["Red".to_string()][..]]);
        assert!(doc.get("parts_color").any(|f| matches!(f, IndexField::Text { .. })));
        assert!(doc.get("color").any(|f| matches!(f, IndexField::Text { .. })));
        assert!(facets.dim_config("parts_color").multi_valued);

        let category: Vec<&[String]> = doc.facet_paths("Category").collect();
        assert_eq!(category, vec![&["Hardware".to_string(), "Gears".to_string()][..]]);
        assert!(facets.dim_config("Category").hierarchical);

        let years: Vec<&[String]> = doc.facet_paths("Year").collect();
        assert_eq!(years, vec![&["2014".to_string()][..]]);

        // Method-sourced list values are indexed under the stripped name.
        assert!(doc.get("Synonyms").any(|f| f.string_value() == Some("THE_START Gizmo THE_STOP")));
    }

    #[test]
    fn test_numeric_ranges_and_sorters() {
        let w = widget();
        let (built, _, sorters) = build(&w);
        let doc = &built.document;

        let weights: Vec<&[String]> = doc.facet_paths("weight").collect();
        assert_eq!(weights, vec![&["10:20".to_string()][..]]);
        assert!(doc.fields.contains(&IndexField::Numeric {
            name: "weight".into(),
            value: Numeric::Long(15),
            stored: false,
        }));
        assert_eq!(sorters.get("weight"), Some(SortType::Long));
        assert_eq!(sorters.get("name"), Some(SortType::String));
        assert!(doc.fields.contains(&IndexField::Sort {
            name: "name".into(),
            value: SortValue::Text("Sprocket".into()),
        }));
    }

    #[test]
    fn test_range_labels() {
        assert_eq!(range_label(&[10, 20], 5).as_deref(), Some("<10"));
        assert_eq!(range_label(&[10, 20], 10).as_deref(), Some("10:20"));
        assert_eq!(range_label(&[10, 20], 20).as_deref(), Some(">20"));
        assert_eq!(range_label(&[], 20), None);
        assert_eq!(range_label_f64(&[0.5, 1.0], 0.75, 2).as_deref(), Some("0.50:1.00"));
        assert_eq!(range_label_f64(&[0.5], 3.0, 1).as_deref(), Some(">0.5"));
    }

    #[test]
    fn test_to_path_and_getters() {
        let path: Vec<String> = ["parts", "0", "color"].iter().map(|s| s.to_string()).collect();
        assert_eq!(to_path(&path), "parts_color");
        assert_eq!(strip_getter("getName"), "Name");
        assert_eq!(strip_getter("get"), "get");
        assert_eq!(strip_getter("synonyms"), "synonyms");
    }

    #[derive(Debug)]
    struct Tagged;

    impl Indexable for Tagged {
        fn kind(&self) -> &str {
            "ix.test.Tagged"
        }

        fn describe<'a>(&'a self, fields: &mut FieldSet<'a>) {
            fields.id("id", "T-1");
        }

        fn facet_mode(&self) -> FacetMode {
            FacetMode::Dynamic {
                label: "Assay".to_string(),
                value: "Kinase".to_string(),
            }
        }
    }

    #[test]
    fn test_dynamic_facets() {
        let (built, facets, _) = build(&Tagged);
        let doc = &built.document;

        let assay: Vec<&[String]> = doc.facet_paths("Assay").collect();
        assert_eq!(assay, vec![&["Kinase".to_string()][..]]);
        assert!(facets.dim_config("Assay").require_dim_count);
        assert_eq!(
            built.suggestions,
            vec![("Assay".to_string(), "Kinase".to_string())]
        );
        assert!(doc.fields.contains(&IndexField::Keyword {
            name: "ix.test.Tagged._id".into(),
            value: "T-1".into(),
            stored: true,
        }));
        assert_eq!(id_term(&Tagged), Some(("ix.test.Tagged.id".into(), "T-1".into())));
    }
}
