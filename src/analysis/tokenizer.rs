//! Tokenizers split raw text into a stream of tokens.

use crate::analysis::token::TokenStream;
use crate::error::Result;

pub mod unicode_word;

pub use unicode_word::UnicodeWordTokenizer;

/// Trait for tokenizers that convert text into tokens.
pub trait Tokenizer: Send + Sync {
    /// Tokenize the given text into a stream of tokens.
    fn tokenize(&self, text: &str) -> Result<TokenStream>;

    /// Get the name of this tokenizer (for debugging and configuration).
    fn name(&self) -> &'static str;
}
