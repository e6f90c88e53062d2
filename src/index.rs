//! Segment-based inverted index with a facet taxonomy.
//!
//! The [`IndexStore`] is the entry point: it flattens entities through the
//! document builder and hands the documents to the [`IndexWriter`], which
//! keeps them in [`Segment`]s, logs every mutation to a write-ahead log and
//! exposes point-in-time [`IndexSnapshot`]s to searches.
//!
//! # Layout
//!
//! ```text
//! <root>/
//!   facet_conf.json        facet dimension configuration
//!   sorter_conf.json       sortable fields and their types
//!   index/segments.json    committed segments
//!   index/seg_000000.bin   segment blob
//!   index/seg_000000.del   live documents of the segment
//!   index/index.wal        uncommitted mutations
//!   facet/taxonomy.bin     facet label taxonomy
//!   suggest/<field>/       one suggestion lookup per field
//! ```

pub mod facets_config;
pub mod segment;
pub mod snapshot;
pub mod sorters;
pub mod store;
pub mod taxonomy;
pub mod wal;
pub mod writer;

pub use facets_config::{DimConfig, FACETS_CONFIG_FILE, FacetsConfig};
pub use segment::{FieldFlags, FieldStats, Posting, Segment, SegmentDoc, StoredValue};
pub use snapshot::{DocId, IndexSnapshot};
pub use sorters::{SORTER_CONFIG_FILE, SortRegistry, SortType};
pub use store::IndexStore;
pub use taxonomy::{Ordinal, ROOT_ORDINAL, Taxonomy};
pub use wal::{WalEntry, WalManager, WalRecord};
pub use writer::{IndexWriter, WriterConfig};
