use std::sync::Arc;

use crate::analysis::analyzer::{Analyzer, PipelineAnalyzer};
use crate::analysis::token::TokenStream;
use crate::analysis::token_filter::{LowercaseFilter, StopFilter};
use crate::analysis::tokenizer::UnicodeWordTokenizer;
use crate::error::Result;

/// Unicode word segmentation, lowercasing and English stop words.
#[derive(Clone, Debug)]
pub struct StandardAnalyzer {
    inner: PipelineAnalyzer,
}

impl StandardAnalyzer {
    /// Create a new standard analyzer.
    pub fn new() -> Self {
        let inner = PipelineAnalyzer::new(Arc::new(UnicodeWordTokenizer::new()))
            .add_filter(Arc::new(LowercaseFilter::new()))
            .add_filter(Arc::new(StopFilter::new()))
            .with_name("standard");
        StandardAnalyzer { inner }
    }

    /// Same pipeline without stop word removal.
    pub fn without_stop_words() -> Self {
        let inner = PipelineAnalyzer::new(Arc::new(UnicodeWordTokenizer::new()))
            .add_filter(Arc::new(LowercaseFilter::new()))
            .with_name("standard");
        StandardAnalyzer { inner }
    }
}

impl Default for StandardAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer for StandardAnalyzer {
    fn analyze(&self, text: &str) -> Result<TokenStream> {
        self.inner.analyze(text)
    }

    fn name(&self) -> &'static str {
        "standard"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_analyzer() {
        let analyzer = StandardAnalyzer::new();
        let terms = analyzer
            .terms("THE_START The Ibuprofen Tablets THE_STOP")
            .unwrap();
        assert_eq!(terms, vec!["the_start", "ibuprofen", "tablets", "the_stop"]);
    }

    #[test]
    fn test_without_stop_words() {
        let analyzer = StandardAnalyzer::without_stop_words();
        assert_eq!(analyzer.terms("To be").unwrap(), vec!["to", "be"]);
    }
}
