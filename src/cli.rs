//! Command line interface over JSON-lines record files.
//!
//! Each line of a record file is one object with a `kind` and an `id`; every
//! other key becomes a field of a [`JsonEntity`]. Search hits are hydrated
//! from the same file.

pub mod args;
pub mod commands;
pub mod entity;
pub mod output;

pub use args::*;
pub use commands::*;
pub use entity::{FieldSchema, JsonEntity, load_records};
pub use output::*;
