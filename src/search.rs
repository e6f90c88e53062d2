//! Search over the index: options, the shared result handle and the
//! engine that ties query execution, faceting and hydration together.

pub mod engine;
pub mod options;
pub mod result;

pub use engine::{SearchEngine, subset_filter};
pub use options::SearchOptions;
pub use result::SearchResult;
