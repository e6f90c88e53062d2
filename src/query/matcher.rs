//! Query evaluation.

use std::collections::{BTreeMap, BTreeSet};

use crate::analysis::{Analyzer, Token};
use crate::error::Result;
use crate::index::{DocId, IndexSnapshot, Posting};
use crate::query::scorer::BM25Scorer;
use crate::query::{Occur, Query};

/// Matching documents with their scores.
pub type Scores = BTreeMap<DocId, f32>;

/// Score of queries that do not rank, such as ranges and prefixes.
const CONSTANT_SCORE: f32 = 1.0;

/// Evaluates queries against one snapshot.
#[derive(Debug, Clone, Copy)]
pub struct Matcher<'a> {
    snapshot: &'a IndexSnapshot,
    analyzer: &'a dyn Analyzer,
}

impl<'a> Matcher<'a> {
    pub fn new(snapshot: &'a IndexSnapshot, analyzer: &'a dyn Analyzer) -> Self {
        Matcher { snapshot, analyzer }
    }

    /// Ids of the live documents matching `query`.
    pub fn matching_docs(&self, query: &Query) -> Result<BTreeSet<DocId>> {
        Ok(self.execute(query)?.into_keys().collect())
    }

    /// Live documents matching `query`, with their scores.
    pub fn execute(&self, query: &Query) -> Result<Scores> {
        match query {
            Query::MatchAll => Ok(self
                .snapshot
                .live_docs()
                .map(|d| (d, CONSTANT_SCORE))
                .collect()),
            Query::MatchNone => Ok(Scores::new()),
            Query::Term { field, text } => self.term(field, text),
            Query::Prefix { field, prefix } => Ok(self.prefix(field, prefix)),
            Query::Phrase { field, text } => self.phrase(field, text),
            Query::Range {
                field,
                min,
                max,
                min_inclusive,
                max_inclusive,
            } => Ok(self
                .snapshot
                .numeric_range(field, *min, *max, *min_inclusive, *max_inclusive)
                .into_iter()
                .map(|d| (d, CONSTANT_SCORE))
                .collect()),
            Query::Boolean(clauses) => {
                let mut must = Vec::new();
                let mut should = Vec::new();
                let mut must_not = BTreeSet::new();
                for clause in clauses {
                    let scores = self.execute(&clause.query)?;
                    match clause.occur {
                        Occur::Must => must.push(scores),
                        Occur::Should => should.push(scores),
                        Occur::MustNot => must_not.extend(scores.into_keys()),
                    }
                }
                Ok(self.combine(must, should, must_not))
            }
        }
    }

    fn combine(&self, must: Vec<Scores>, should: Vec<Scores>, must_not: BTreeSet<DocId>) -> Scores {
        let mut result = if !must.is_empty() {
            let mut iter = must.into_iter();
            let mut acc = iter.next().unwrap_or_default();
            for next in iter {
                acc = acc
                    .into_iter()
                    .filter_map(|(doc, score)| next.get(&doc).map(|s| (doc, score + s)))
                    .collect();
            }
            for scores in &should {
                for (doc, score) in acc.iter_mut() {
                    if let Some(s) = scores.get(doc) {
                        *score += s;
                    }
                }
            }
            acc
        } else if !should.is_empty() {
            let mut acc = Scores::new();
            for scores in should {
                for (doc, score) in scores {
                    *acc.entry(doc).or_insert(0.0) += score;
                }
            }
            acc
        } else {
            // Only prohibited clauses: everything else matches.
            self.snapshot.live_docs().map(|d| (d, CONSTANT_SCORE)).collect()
        };
        result.retain(|doc, _| !must_not.contains(doc));
        result
    }

    fn term(&self, field: &str, text: &str) -> Result<Scores> {
        let flags = self.snapshot.field_flags(field);
        let mut result = Scores::new();

        if flags.keyword || !(flags.text || flags.numeric) {
            merge(&mut result, self.exact(field, text));
        }
        if flags.text {
            for token in self.analyzer.analyze(text)? {
                merge(&mut result, self.analyzed(field, &token.text));
            }
        }
        if flags.numeric {
            if let Ok(value) = text.parse::<f64>() {
                for doc in self
                    .snapshot
                    .numeric_range(field, Some(value), Some(value), true, true)
                {
                    *result.entry(doc).or_insert(0.0) += CONSTANT_SCORE;
                }
            }
        }
        Ok(result)
    }

    /// Unanalyzed term, scored as a single-token field.
    fn exact(&self, field: &str, term: &str) -> Scores {
        let postings = self.snapshot.postings(field, term);
        let scorer = BM25Scorer::new(postings.len() as u64, self.snapshot.total_docs(), 1.0);
        postings
            .into_iter()
            .map(|(doc, p)| (doc, scorer.score(p.freq() as f32, 1.0)))
            .collect()
    }

    fn analyzed(&self, field: &str, term: &str) -> Scores {
        let postings = self.snapshot.postings(field, term);
        let scorer = self.scorer(field, postings.len() as u64);
        postings
            .into_iter()
            .map(|(doc, p)| (doc, scorer.score(p.freq() as f32, self.field_length(doc, field))))
            .collect()
    }

    fn prefix(&self, field: &str, prefix: &str) -> Scores {
        let flags = self.snapshot.field_flags(field);
        let mut prefixes = vec![prefix.to_string()];
        if flags.text {
            let lower = prefix.to_lowercase();
            if lower != prefix {
                prefixes.push(lower);
            }
        }
        let mut result = Scores::new();
        for prefix in &prefixes {
            for term in self.snapshot.terms_with_prefix(field, prefix) {
                for (doc, _) in self.snapshot.postings(field, &term) {
                    result.insert(doc, CONSTANT_SCORE);
                }
            }
        }
        result
    }

    fn phrase(&self, field: &str, text: &str) -> Result<Scores> {
        let flags = self.snapshot.field_flags(field);
        let mut result = Scores::new();
        if flags.keyword {
            merge(&mut result, self.exact(field, text));
        }
        if flags.text {
            let tokens: Vec<Token> = self.analyzer.analyze(text)?.collect();
            match tokens.len() {
                0 => {}
                1 => merge(&mut result, self.analyzed(field, &tokens[0].text)),
                _ => merge(&mut result, self.positional(field, &tokens)),
            }
        }
        Ok(result)
    }

    /// Documents where the tokens occur at their relative positions.
    fn positional(&self, field: &str, tokens: &[Token]) -> Scores {
        let first = tokens[0].position as i64;
        let lists: Vec<(i64, BTreeMap<DocId, &Posting>)> = tokens
            .iter()
            .map(|t| {
                let postings = self.snapshot.postings(field, &t.text).into_iter().collect();
                (t.position as i64 - first, postings)
            })
            .collect();

        let idf: f32 = lists
            .iter()
            .map(|(_, postings)| self.scorer(field, postings.len() as u64).idf())
            .sum();
        let stats = self.snapshot.field_stats(field);

        let Some((_, head)) = lists.first() else {
            return Scores::new();
        };
        let scorer = BM25Scorer::with_idf(idf, average(stats.total_length, stats.doc_count));
        let mut result = Scores::new();
        for (&doc, posting) in head {
            let freq = posting
                .positions
                .iter()
                .filter(|&&start| {
                    lists.iter().skip(1).all(|(offset, postings)| {
                        let target = start as i64 + offset;
                        postings.get(&doc).is_some_and(|p| {
                            target >= 0 && p.positions.binary_search(&(target as u32)).is_ok()
                        })
                    })
                })
                .count();
            if freq > 0 {
                result.insert(doc, scorer.score(freq as f32, self.field_length(doc, field)));
            }
        }
        result
    }

    fn scorer(&self, field: &str, doc_freq: u64) -> BM25Scorer {
        let stats = self.snapshot.field_stats(field);
        BM25Scorer::new(
            doc_freq,
            self.snapshot.total_docs(),
            average(stats.total_length, stats.doc_count),
        )
    }

    fn field_length(&self, doc: DocId, field: &str) -> f32 {
        self.snapshot
            .doc(doc)
            .and_then(|d| d.field_lengths.get(field))
            .copied()
            .unwrap_or(1) as f32
    }
}

fn average(total: u64, count: u64) -> f64 {
    if count == 0 {
        1.0
    } else {
        total as f64 / count as f64
    }
}

fn merge(into: &mut Scores, scores: Scores) {
    for (doc, score) in scores {
        *into.entry(doc).or_insert(0.0) += score;
    }
}
