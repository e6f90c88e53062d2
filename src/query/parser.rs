//! Query string parser.
//!
//! Supported syntax:
//! - Simple terms: `aspirin`, matched against the default field
//! - Field-specific terms: `name:aspirin`
//! - Phrases: `"acetylsalicylic acid"`
//! - Prefixes: `acet*`
//! - Numeric ranges: `weight:[10 TO 20]`, `weight:{10 TO *}`
//! - Occur prefixes: `+required -forbidden optional`
//! - Connectives: `AND`, `OR`, `NOT` (also `&&`, `||`, `!`)
//! - Groups: `(name:aspirin OR name:ibuprofen)`, `name:(aspirin ibuprofen)`
//! - Everything: `*:*`
//!
//! Clauses without an operator are optional, as in Lucene's classic parser.

use std::iter::Peekable;
use std::str::Chars;

use crate::error::{Result, TaxisError};
use crate::query::{Clause, Occur, Query};

/// Nesting limit for groups.
const MAX_DEPTH: usize = 32;

#[derive(Debug, Clone)]
pub struct QueryParser {
    default_field: String,
}

impl QueryParser {
    pub fn new(default_field: impl Into<String>) -> Self {
        QueryParser {
            default_field: default_field.into(),
        }
    }

    pub fn default_field(&self) -> &str {
        &self.default_field
    }

    /// Parse a query string.
    pub fn parse(&self, text: &str) -> Result<Query> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(TaxisError::query("empty query"));
        }
        let mut parser = QueryStringParser {
            chars: trimmed.chars().peekable(),
            field: self.default_field.clone(),
            depth: 0,
        };
        parser.parse_query(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Conjunction {
    None,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Modifier {
    None,
    Required,
    Prohibited,
}

struct QueryStringParser<'a> {
    chars: Peekable<Chars<'a>>,
    field: String,
    depth: usize,
}

impl QueryStringParser<'_> {
    fn parse_query(&mut self, nested: bool) -> Result<Query> {
        let mut clauses: Vec<Clause> = Vec::new();

        loop {
            self.skip_whitespace();
            match self.chars.peek() {
                None if nested => return Err(TaxisError::query("missing ')'")),
                None => break,
                Some(')') if nested => {
                    self.chars.next();
                    break;
                }
                Some(')') => return Err(TaxisError::query("unexpected ')'")),
                _ => {}
            }

            let conjunction = self.parse_conjunction();
            if conjunction != Conjunction::None && clauses.is_empty() {
                return Err(TaxisError::query("query starts with a connective"));
            }
            let modifier = self.parse_modifier();
            let query = self.parse_clause()?;

            if conjunction == Conjunction::And {
                if let Some(last) = clauses.last_mut() {
                    if last.occur == Occur::Should {
                        last.occur = Occur::Must;
                    }
                }
            }
            let occur = match modifier {
                Modifier::Required => Occur::Must,
                Modifier::Prohibited => Occur::MustNot,
                Modifier::None if conjunction == Conjunction::And => Occur::Must,
                Modifier::None => Occur::Should,
            };
            clauses.push(Clause::new(occur, query));
        }

        match clauses.len() {
            0 => Err(TaxisError::query("empty group")),
            1 if clauses[0].occur != Occur::MustNot => Ok(clauses.remove(0).query),
            _ => Ok(Query::Boolean(clauses)),
        }
    }

    fn parse_conjunction(&mut self) -> Conjunction {
        if self.take_keyword("AND") || self.take_symbol("&&") {
            Conjunction::And
        } else if self.take_keyword("OR") || self.take_symbol("||") {
            Conjunction::Or
        } else {
            Conjunction::None
        }
    }

    fn parse_modifier(&mut self) -> Modifier {
        self.skip_whitespace();
        if self.take_keyword("NOT") {
            return Modifier::Prohibited;
        }
        match self.chars.peek() {
            Some('+') => {
                self.chars.next();
                Modifier::Required
            }
            Some('-') | Some('!') => {
                self.chars.next();
                Modifier::Prohibited
            }
            _ => Modifier::None,
        }
    }

    fn parse_clause(&mut self) -> Result<Query> {
        self.skip_whitespace();
        match self.chars.peek() {
            None => Err(TaxisError::query("unexpected end of query")),
            Some('(') => self.parse_group(),
            Some('"') => self.parse_phrase(self.field.clone()),
            Some('[') | Some('{') => self.parse_range(self.field.clone()),
            Some(_) => {
                let word = self.read_word()?;
                if self.chars.peek() == Some(&':') {
                    self.chars.next();
                    self.parse_field_value(word.text)
                } else {
                    Ok(self.word_query(self.field.clone(), word))
                }
            }
        }
    }

    fn parse_field_value(&mut self, field: String) -> Result<Query> {
        match self.chars.peek() {
            Some('(') => {
                let saved = std::mem::replace(&mut self.field, field);
                let result = self.parse_group();
                self.field = saved;
                result
            }
            Some('"') => self.parse_phrase(field),
            Some('[') | Some('{') => self.parse_range(field),
            Some(c) if !c.is_whitespace() => {
                let word = self.read_word()?;
                if field == "*" && word.text == "*" && word.wildcard {
                    return Ok(Query::MatchAll);
                }
                Ok(self.word_query(field, word))
            }
            _ => Err(TaxisError::query(format!("missing value for field {field}"))),
        }
    }

    fn parse_group(&mut self) -> Result<Query> {
        self.chars.next();
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(TaxisError::query("query nested too deeply"));
        }
        let query = self.parse_query(true);
        self.depth -= 1;
        query
    }

    fn parse_phrase(&mut self, field: String) -> Result<Query> {
        self.chars.next();
        let mut text = String::new();
        loop {
            match self.chars.next() {
                None => return Err(TaxisError::query("unterminated phrase")),
                Some('"') => break,
                Some('\\') => match self.chars.next() {
                    Some(c) => text.push(c),
                    None => return Err(TaxisError::query("dangling escape")),
                },
                Some(c) => text.push(c),
            }
        }
        Ok(Query::Phrase { field, text })
    }

    fn parse_range(&mut self, field: String) -> Result<Query> {
        let min_inclusive = self.chars.next() == Some('[');
        self.skip_whitespace();
        let min = self.read_bound()?;
        self.skip_whitespace();
        if !self.take_keyword("TO") {
            return Err(TaxisError::query("expected TO in range"));
        }
        self.skip_whitespace();
        let max = self.read_bound()?;
        self.skip_whitespace();
        let max_inclusive = match self.chars.next() {
            Some(']') => true,
            Some('}') => false,
            _ => return Err(TaxisError::query("unterminated range")),
        };
        Ok(Query::Range {
            field,
            min,
            max,
            min_inclusive,
            max_inclusive,
        })
    }

    fn read_bound(&mut self) -> Result<Option<f64>> {
        let mut text = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_whitespace() || c == ']' || c == '}' {
                break;
            }
            text.push(c);
            self.chars.next();
        }
        match text.as_str() {
            "" => Err(TaxisError::query("missing range bound")),
            "*" => Ok(None),
            _ => text
                .parse::<f64>()
                .map(Some)
                .map_err(|_| TaxisError::query(format!("range bound {text} is not a number"))),
        }
    }

    fn word_query(&self, field: String, word: Word) -> Query {
        if word.wildcard {
            if let Some(prefix) = word.text.strip_suffix('*') {
                return Query::Prefix {
                    field,
                    prefix: prefix.to_string(),
                };
            }
        }
        Query::Term {
            field,
            text: word.text,
        }
    }

    /// Read a bare word up to whitespace, a reserved character or an
    /// unescaped `:`. Escaped characters are taken literally.
    fn read_word(&mut self) -> Result<Word> {
        let mut text = String::new();
        let mut wildcard = false;
        while let Some(&c) = self.chars.peek() {
            match c {
                c if c.is_whitespace() => break,
                '(' | ')' | '"' | '[' | ']' | '{' | '}' | ':' => break,
                '\\' => {
                    self.chars.next();
                    match self.chars.next() {
                        Some(escaped) => text.push(escaped),
                        None => return Err(TaxisError::query("dangling escape")),
                    }
                    wildcard = false;
                    continue;
                }
                '*' => {
                    wildcard = true;
                    text.push(c);
                }
                _ => {
                    wildcard = false;
                    text.push(c);
                }
            }
            self.chars.next();
        }
        if text.is_empty() {
            return Err(TaxisError::query("expected a term"));
        }
        Ok(Word { text, wildcard })
    }

    fn take_keyword(&mut self, keyword: &str) -> bool {
        let mut lookahead = self.chars.clone();
        for expected in keyword.chars() {
            if lookahead.next() != Some(expected) {
                return false;
            }
        }
        match lookahead.peek() {
            Some(c) if c.is_whitespace() => {}
            _ => return false,
        }
        self.chars = lookahead;
        self.skip_whitespace();
        true
    }

    fn take_symbol(&mut self, symbol: &str) -> bool {
        let mut lookahead = self.chars.clone();
        for expected in symbol.chars() {
            if lookahead.next() != Some(expected) {
                return false;
            }
        }
        self.chars = lookahead;
        self.skip_whitespace();
        true
    }

    fn skip_whitespace(&mut self) {
        while self.chars.peek().is_some_and(|c| c.is_whitespace()) {
            self.chars.next();
        }
    }
}

/// A bare word; `wildcard` is set when it ends with an unescaped `*`.
struct Word {
    text: String,
    wildcard: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Query {
        QueryParser::new("text").parse(text).unwrap()
    }

    #[test]
    fn test_parse_simple_term() {
        assert_eq!(parse("aspirin"), Query::term("text", "aspirin"));
        assert_eq!(parse("name:aspirin"), Query::term("name", "aspirin"));
    }

    #[test]
    fn test_default_operator_is_should() {
        assert_eq!(
            parse("aspirin ibuprofen").to_string(),
            "(text:aspirin text:ibuprofen)"
        );
    }

    #[test]
    fn test_connectives() {
        assert_eq!(
            parse("name:a AND name:b OR name:c").to_string(),
            "(+name:a +name:b name:c)"
        );
        assert_eq!(parse("a NOT b").to_string(), "(text:a -text:b)");
        assert_eq!(parse("+a -b c").to_string(), "(+text:a -text:b text:c)");
        assert_eq!(parse("-b").to_string(), "(-text:b)");
    }

    #[test]
    fn test_groups_and_field_groups() {
        assert_eq!(
            parse("kind:x AND (name:a OR name:b)").to_string(),
            "(+kind:x +(name:a name:b))"
        );
        assert_eq!(parse("name:(a b)").to_string(), "(name:a name:b)");
    }

    #[test]
    fn test_phrase_prefix_range() {
        assert_eq!(
            parse("\"THE_START aspirin THE_STOP\""),
            Query::Phrase {
                field: "text".into(),
                text: "THE_START aspirin THE_STOP".into()
            }
        );
        assert_eq!(
            parse("name:acet*"),
            Query::Prefix {
                field: "name".into(),
                prefix: "acet".into()
            }
        );
        assert_eq!(
            parse("weight:{10 TO *]"),
            Query::Range {
                field: "weight".into(),
                min: Some(10.0),
                max: None,
                min_inclusive: false,
                max_inclusive: true,
            }
        );
        assert_eq!(parse("*:*"), Query::MatchAll);
    }

    #[test]
    fn test_escapes() {
        assert_eq!(
            parse(r"ix.test.Widget.id:NCGC\:1"),
            Query::term("ix.test.Widget.id", "NCGC:1")
        );
        assert_eq!(parse(r"a\*"), Query::term("text", "a*"));
    }

    #[test]
    fn test_malformed_queries() {
        let parser = QueryParser::new("text");
        for bad in ["(", "a)", "\"open", "name:", "AND a", "w:[1 TO", "w:[a TO b]", "()", ""] {
            assert!(parser.parse(bad).is_err(), "{bad:?} should not parse");
        }
    }
}
