//! Per-field infix suggestions.
//!
//! Every suggestible field has its own [`SuggestLookup`], stored under
//! `suggest/<field>/`. New values only become visible once the lookup is
//! refreshed, which happens lazily on the next [`SuggestLookup::suggest`].

pub mod lookup;
pub mod store;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use lookup::SuggestLookup;
pub use store::SuggestStore;

/// Source of the values a lookup is rebuilt from.
pub trait TermSource {
    /// Every value of `field` with the number of live documents carrying it.
    fn term_weights(&self, field: &str) -> BTreeMap<String, u64>;
}

/// One suggestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestResult {
    /// Lookup the suggestion came from.
    pub field: String,
    /// The suggested value.
    pub key: String,
    /// The value with the matched prefixes wrapped in `<b>`/`</b>`.
    pub highlight: String,
}

/// Lookup name of `field`: whitespace and slashes become underscores.
pub fn sanitize_name(field: &str) -> String {
    field
        .chars()
        .map(|c| if c.is_whitespace() || c == '/' { '_' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("Active Moiety/Name"), "Active_Moiety_Name");
        assert_eq!(sanitize_name("Name"), "Name");
    }
}
