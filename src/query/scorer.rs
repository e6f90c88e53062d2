//! BM25 relevance scoring.

/// BM25 scorer for one term (or phrase) in one field.
#[derive(Debug, Clone)]
pub struct BM25Scorer {
    /// Inverse document frequency of the term.
    idf: f32,
    /// Average field length.
    avg_field_length: f64,
    /// Boost factor.
    boost: f32,
    k1: f32,
    b: f32,
}

impl BM25Scorer {
    pub fn new(doc_freq: u64, total_docs: u64, avg_field_length: f64) -> Self {
        Self::with_idf(idf(doc_freq, total_docs), avg_field_length)
    }

    /// Scorer with a precomputed IDF, e.g. the sum over the words of a phrase.
    pub fn with_idf(idf: f32, avg_field_length: f64) -> Self {
        BM25Scorer {
            idf,
            avg_field_length,
            boost: 1.0,
            k1: 1.2,
            b: 0.75,
        }
    }

    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }

    pub fn idf(&self) -> f32 {
        self.idf
    }

    /// TF = (tf * (k1 + 1)) / (tf + k1 * (1 - b + b * dl / avgdl))
    fn tf(&self, term_freq: f32, field_length: f32) -> f32 {
        if term_freq == 0.0 {
            return 0.0;
        }
        let avg_len = if self.avg_field_length > 0.0 {
            self.avg_field_length as f32
        } else {
            1.0
        };
        let norm = 1.0 - self.b + self.b * (field_length / avg_len);
        (term_freq * (self.k1 + 1.0)) / (term_freq + self.k1 * norm)
    }

    /// Score a document with the given term frequency and field length.
    pub fn score(&self, term_freq: f32, field_length: f32) -> f32 {
        self.boost * self.idf * self.tf(term_freq, field_length)
    }
}

/// IDF = ln(1 + (N - df + 0.5) / (df + 0.5)), which stays positive even
/// for terms present in most documents.
pub fn idf(doc_freq: u64, total_docs: u64) -> f32 {
    if doc_freq == 0 || total_docs == 0 {
        return 0.0;
    }
    let n = total_docs as f32;
    let df = doc_freq as f32;
    (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
}
