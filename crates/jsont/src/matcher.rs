/*
 * matcher.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Incremental matcher over the inside of a single `{...}` tag.
//!
//! A successful match records the matched range but does not move the
//! pointer; callers [`consume`](TokenMatcher::consume) or
//! [`skip`](TokenMatcher::skip) to advance past it.

use std::sync::Arc;

use crate::patterns;
use crate::recognizers::BoxedRecognizer;
use crate::view::StringView;

pub struct TokenMatcher {
    raw: Arc<str>,
    start: usize,
    end: usize,
    pointer: usize,
    match_start: usize,
    match_end: usize,
}

impl TokenMatcher {
    pub fn new(raw: Arc<str>) -> Self {
        let end = raw.len();
        Self {
            raw,
            start: 0,
            end,
            pointer: 0,
            match_start: 0,
            match_end: 0,
        }
    }

    pub fn region(&mut self, start: usize, end: usize) {
        self.start = start;
        self.pointer = start;
        self.end = end;
        self.match_start = start;
        self.match_end = start;
    }

    /// Unconsumed part of the region, used in "expected X, found Y" errors.
    pub fn remainder(&self) -> StringView {
        StringView::new(self.raw.clone(), self.pointer, self.end)
    }

    pub fn consume(&mut self) -> StringView {
        let token = StringView::new(self.raw.clone(), self.match_start, self.match_end);
        self.pointer = self.match_end;
        token
    }

    pub fn skip(&mut self) {
        self.pointer = self.match_end;
    }

    pub fn seek(&mut self, n: usize) {
        self.pointer = (self.pointer + n).min(self.end);
    }

    pub fn finished(&self) -> bool {
        self.pointer == self.end
    }

    pub fn match_start(&self) -> usize {
        self.match_start
    }

    pub fn pointer(&self) -> usize {
        self.pointer
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn peek(&self, skip: usize, ch: u8) -> bool {
        let at = self.pointer + skip;
        at < self.end && self.raw.as_bytes()[at] == ch
    }

    pub fn arguments(&mut self) -> bool {
        self.pattern(&patterns::ARGUMENTS)
    }

    pub fn equal_sign(&mut self) -> bool {
        self.pattern(&patterns::EQUAL_SIGN)
    }

    pub fn formatter(&mut self) -> bool {
        self.pattern(&patterns::FORMATTER)
    }

    pub fn keyword(&mut self) -> bool {
        self.pattern(&patterns::KEYWORD)
    }

    pub fn local_variable(&mut self) -> bool {
        self.pattern(&patterns::LOCAL_VARIABLE)
    }

    pub fn operator(&mut self) -> bool {
        self.pattern(&patterns::BOOLEAN_OP)
    }

    pub fn path(&mut self) -> bool {
        self.pattern(&patterns::PATH)
    }

    pub fn pipe(&mut self) -> bool {
        self.single(b'|')
    }

    pub fn predicate(&mut self) -> bool {
        self.pattern(&patterns::PREDICATE)
    }

    pub fn predicate_args(&mut self) -> bool {
        self.pattern(&patterns::PREDICATE_ARGUMENTS)
    }

    pub fn space(&mut self) -> bool {
        self.single(b' ')
    }

    pub fn variable(&mut self) -> bool {
        self.pattern(&patterns::VARIABLE)
    }

    pub fn variables_delimiter(&mut self) -> bool {
        self.pattern(&patterns::VARIABLES_DELIMITER)
    }

    pub fn whitespace(&mut self) -> bool {
        self.pattern(&patterns::WHITESPACE)
    }

    pub fn word(&mut self) -> bool {
        self.pattern(&patterns::WORD)
    }

    pub fn word_section(&mut self) -> bool {
        self.pattern(&patterns::WORD_SECTION)
    }

    pub fn word_with(&mut self) -> bool {
        self.pattern(&patterns::WORD_WITH)
    }

    /// Only matches that advance past the pointer count.
    fn pattern(&mut self, pattern: &BoxedRecognizer) -> bool {
        match pattern.match_at(&self.raw, self.pointer, self.end) {
            Some(pos) if pos > self.pointer => {
                self.match_start = self.pointer;
                self.match_end = pos;
                true
            }
            _ => false,
        }
    }

    fn single(&mut self, ch: u8) -> bool {
        if self.peek(0, ch) {
            self.match_start = self.pointer;
            self.match_end = self.pointer + 1;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(text: &str) -> TokenMatcher {
        TokenMatcher::new(Arc::from(text))
    }

    #[test]
    fn test_match_then_consume() {
        let mut m = matcher("a.b|html");
        assert!(m.variable());
        assert_eq!(m.pointer(), 0);
        assert_eq!(m.consume().as_str(), "a.b");
        assert!(m.pipe());
        m.skip();
        assert!(m.formatter());
        assert_eq!(m.consume().as_str(), "html");
        assert!(m.finished());
    }

    #[test]
    fn test_region_and_remainder() {
        let mut m = matcher("{.section foo}");
        m.region(1, 13);
        assert!(m.keyword());
        assert_eq!(m.consume().as_str(), ".section");
        assert!(!m.word_with());
        assert_eq!(m.remainder().as_str(), " foo");
        assert!(m.peek(1, b'f'));
        assert!(!m.peek(10, b'o'));
    }
}
