//! Document model: entities describe themselves, the builder flattens them.
//!
//! An entity type implements [`Indexable`], listing its fields in
//! [`Indexable::describe`] together with an [`IndexPolicy`] per field. The
//! [`DocumentBuilder`] walks that description (recursing into lists and
//! nested indexable objects) and produces an [`IndexDocument`]: a flat list of
//! [`IndexField`]s ready for the index writer.
//!
//! # Reserved names
//!
//! - [`FIELD_KIND`] holds the kind of the top-level entity
//! - [`DIM_CLASS`] is a facet dimension counting every visited object kind
//! - `<kind>._id` stores the identifier in its native type
//! - `<kind>.id` indexes the identifier as an exact keyword
//! - the default text field (`text`) receives a copy of every string value

pub mod builder;
pub mod field;
pub mod indexable;
pub mod policy;
pub mod value;

pub use builder::{BuiltDocument, DocumentBuilder, id_term, range_label, range_label_f64};
pub use field::{IdValue, IndexDocument, IndexField, Numeric, SortValue};
pub use indexable::{AsAny, EntityRef, FacetMode, FieldEntry, FieldSet, FieldSource, Indexable};
pub use policy::IndexPolicy;
pub use value::Value;

/// Field holding the kind of the indexed entity.
pub const FIELD_KIND: &str = "__kind";

/// Default catch-all text field.
pub const FIELD_TEXT: &str = "text";

/// Facet dimension recording the kind of every visited object.
pub const DIM_CLASS: &str = "ix.Class";

/// Marker prepended to every indexed text value.
pub const START_WORD: &str = "THE_START ";

/// Marker appended to every indexed text value.
pub const STOP_WORD: &str = " THE_STOP";

/// Query anchor rewritten to [`START_WORD`].
pub const GIVEN_START_WORD: &str = "^";

/// Query anchor rewritten to [`STOP_WORD`].
pub const GIVEN_STOP_WORD: &str = "$";

/// Name of the stored field carrying the native identifier of `kind`.
pub fn stored_id_field(kind: &str) -> String {
    format!("{kind}._id")
}

/// Name of the keyword field carrying the display identifier of `kind`.
pub fn id_field(kind: &str) -> String {
    format!("{kind}.id")
}

/// Wrap a text value in the start/stop sentinels.
pub fn wrap_sentinels(text: &str) -> String {
    format!("{START_WORD}{text}{STOP_WORD}")
}
