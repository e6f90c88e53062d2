//! The [`Indexable`] trait and the field descriptor entities fill in.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::document::field::IdValue;
use crate::document::policy::IndexPolicy;
use crate::document::value::Value;

/// Upcast helper so hydrated entities can be downcast to their concrete type.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Shared handle to a hydrated entity.
pub type EntityRef = Arc<dyn Indexable>;

/// Facet capability of an entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FacetMode {
    /// Facets come only from field policies.
    Static,
    /// The instance names its own facet dimension and value.
    Dynamic { label: String, value: String },
}

/// Where a described field came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSource {
    /// A plain field, indexed under its path.
    Field,
    /// The natural identifier.
    Id,
    /// A computed accessor; named after the accessor with any `get` prefix removed.
    Method,
}

/// A type whose instances can be indexed.
///
/// Implementations list their fields in [`describe`](Indexable::describe):
///
/// ```
/// use taxis::document::{FieldSet, IndexPolicy, Indexable};
///
/// #[derive(Debug)]
/// struct Widget {
///     id: i64,
///     name: String,
///     color: Option<String>,
/// }
///
/// impl Indexable for Widget {
///     fn kind(&self) -> &str {
///         "ix.test.Widget"
///     }
///
///     fn describe<'a>(&'a self, fields: &mut FieldSet<'a>) {
///         fields
///             .id("id", self.id)
///             .field_with("name", IndexPolicy::new().suggest(), &self.name)
///             .field_with("color", IndexPolicy::new().facet().named("Color"), self.color.as_ref());
///     }
/// }
/// ```
pub trait Indexable: AsAny + Send + Sync + fmt::Debug {
    /// Fully qualified kind of the entity.
    fn kind(&self) -> &str;

    /// Type-level policy; only `indexed` is consulted.
    fn type_policy(&self) -> IndexPolicy {
        IndexPolicy::default()
    }

    /// Whether the type is a top-level entity that can be added, updated
    /// and removed on its own. Nested value objects return false.
    fn is_entity(&self) -> bool {
        true
    }

    /// List the indexable fields of this instance.
    fn describe<'a>(&'a self, fields: &mut FieldSet<'a>);

    /// Facet capability of this instance.
    fn facet_mode(&self) -> FacetMode {
        FacetMode::Static
    }
}

impl<'x> dyn Indexable + 'x {
    /// Downcast to the concrete entity type.
    pub fn downcast_ref<T: Indexable>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Identifier of this instance, if it declares one.
    pub fn id_value(&self) -> Option<IdValue> {
        let mut fields = FieldSet::new();
        self.describe(&mut fields);
        fields.id_value()
    }
}

/// One described field.
#[derive(Debug)]
pub struct FieldEntry<'a> {
    pub name: String,
    pub policy: IndexPolicy,
    pub source: FieldSource,
    pub value: anyhow::Result<Value<'a>>,
}

/// Descriptor table filled in by [`Indexable::describe`].
#[derive(Debug, Default)]
pub struct FieldSet<'a> {
    entries: Vec<FieldEntry<'a>>,
}

impl<'a> FieldSet<'a> {
    pub fn new() -> Self {
        FieldSet {
            entries: Vec::new(),
        }
    }

    /// Declare the natural identifier.
    pub fn id(&mut self, name: impl Into<String>, value: impl Into<Value<'a>>) -> &mut Self {
        self.push(name, IndexPolicy::default(), FieldSource::Id, Ok(value.into()))
    }

    /// Declare a field with the default policy.
    pub fn field(&mut self, name: impl Into<String>, value: impl Into<Value<'a>>) -> &mut Self {
        self.push(name, IndexPolicy::default(), FieldSource::Field, Ok(value.into()))
    }

    /// Declare a field with an explicit policy.
    pub fn field_with(
        &mut self,
        name: impl Into<String>,
        policy: IndexPolicy,
        value: impl Into<Value<'a>>,
    ) -> &mut Self {
        self.push(name, policy, FieldSource::Field, Ok(value.into()))
    }

    /// Declare a field whose accessor may fail. A failure skips the field.
    pub fn try_field(
        &mut self,
        name: impl Into<String>,
        policy: IndexPolicy,
        value: anyhow::Result<Value<'a>>,
    ) -> &mut Self {
        self.push(name, policy, FieldSource::Field, value)
    }

    /// Declare a computed accessor such as `getSynonyms`.
    pub fn method(
        &mut self,
        name: impl Into<String>,
        policy: IndexPolicy,
        value: anyhow::Result<Value<'a>>,
    ) -> &mut Self {
        self.push(name, policy, FieldSource::Method, value)
    }

    fn push(
        &mut self,
        name: impl Into<String>,
        policy: IndexPolicy,
        source: FieldSource,
        value: anyhow::Result<Value<'a>>,
    ) -> &mut Self {
        self.entries.push(FieldEntry {
            name: name.into(),
            policy,
            source,
            value,
        });
        self
    }

    pub fn entries(&self) -> &[FieldEntry<'a>] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<FieldEntry<'a>> {
        self.entries
    }

    /// The declared identifier, if present and non-null.
    pub fn id_value(&self) -> Option<IdValue> {
        self.entries
            .iter()
            .filter(|e| e.source == FieldSource::Id)
            .find_map(|e| match e.value.as_ref().ok()? {
                Value::Long(v) => Some(IdValue::Long(*v)),
                Value::Int(v) => Some(IdValue::Long(*v as i64)),
                other => other.as_text().map(IdValue::Text),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Thing {
        id: Option<String>,
    }

    impl Indexable for Thing {
        fn kind(&self) -> &str {
            "ix.test.Thing"
        }

        fn describe<'a>(&'a self, fields: &mut FieldSet<'a>) {
            fields
                .id("id", self.id.as_ref())
                .try_field("broken", IndexPolicy::new(), Err(anyhow::anyhow!("lazy load failed")));
        }
    }

    #[test]
    fn test_id_value_and_downcast() {
        let thing: EntityRef = Arc::new(Thing {
            id: Some("T-1".to_string()),
        });
        assert_eq!(thing.id_value(), Some(IdValue::Text("T-1".to_string())));
        assert!(thing.downcast_ref::<Thing>().is_some());

        let anonymous = Thing { id: None };
        assert_eq!((&anonymous as &dyn Indexable).id_value(), None);
    }
}
