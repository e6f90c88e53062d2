//! # Taxis
//!
//! An embeddable text index for entity objects, with faceted navigation,
//! drill-down and drill-sideways, per-field suggestions and term-vector
//! analytics.
//!
//! ## Features
//!
//! - Entities describe their own indexable fields through [`document::Indexable`]
//! - Segment-based index with a JSON write-ahead log and near-real-time reads
//! - Lucene-style query strings with `^`/`$` anchoring
//! - Facet counts, drill-down and drill-sideways over a taxonomy of labels
//! - Background hydration of hits into entity objects
//! - Infix suggestions per field
//! - Term vector statistics with conditional breakdowns

pub mod analysis;
pub mod cache;
pub mod cli;
pub mod config;
pub mod document;
pub mod entity;
pub mod error;
pub mod facet;
pub mod fetch;
pub mod index;
pub mod indexer;
pub mod query;
pub mod search;
pub mod storage;
pub mod suggest;
pub mod termvec;

pub mod prelude {
    pub use crate::cache::{Cache, CacheExt, MemoryCache};
    pub use crate::config::IndexerConfig;
    pub use crate::document::{EntityRef, FacetMode, FieldSet, IdValue, IndexPolicy, Indexable, Value};
    pub use crate::entity::{EntityResolver, NoSubtypes, StaticSubtypes, SubtypeRegistry};
    pub use crate::error::{Result, TaxisError};
    pub use crate::facet::{FV, Facet};
    pub use crate::indexer::{TextIndexer, TextIndexerBuilder};
    pub use crate::search::{SearchOptions, SearchResult};
    pub use crate::suggest::SuggestResult;
    pub use crate::termvec::TermVectors;
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
