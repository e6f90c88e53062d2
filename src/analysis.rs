//! Text analysis: tokenization and token filtering.
//!
//! Text fields are indexed through the [`analyzer::StandardAnalyzer`]
//! (Unicode word segmentation, lowercasing, English stop words). Keyword
//! fields such as identifiers and kinds are indexed verbatim.

pub mod analyzer;
pub mod token;
pub mod token_filter;
pub mod tokenizer;

pub use analyzer::{Analyzer, PipelineAnalyzer, StandardAnalyzer};
pub use token::{Token, TokenStream};
