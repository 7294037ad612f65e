/*
 * recognizers.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Hand-built pattern recognizers.
//!
//! A recognizer tries to match at a byte position inside `s[..end]` and
//! returns the position just past the match, or `None` on failure. They are
//! composed with [`sequence`], [`choice`] and the cardinality helpers to
//! build the template grammar's token patterns without a regex engine.
//!
//! Unlike most regex engines, [`choice`] returns the longest match among all
//! alternatives rather than the first one that succeeds.

use crate::chars;

pub type BoxedRecognizer = Box<dyn Recognizer>;

pub trait Recognizer: Send + Sync {
    /// Match at `pos`, never reading at or beyond `end`.
    fn match_at(&self, s: &str, pos: usize, end: usize) -> Option<usize>;
}

fn next_char(s: &str, pos: usize, end: usize) -> Option<char> {
    if pos < end {
        s.get(pos..end).and_then(|rest| rest.chars().next())
    } else {
        None
    }
}

/// Advances one character if `test` accepts it.
fn step(s: &str, pos: usize, end: usize, test: impl Fn(char) -> bool) -> Option<usize> {
    next_char(s, pos, end).filter(|ch| test(*ch)).map(|ch| pos + ch.len_utf8())
}

struct Any;

impl Recognizer for Any {
    fn match_at(&self, s: &str, pos: usize, end: usize) -> Option<usize> {
        step(s, pos, end, |_| true)
    }
}

struct Literal(String);

impl Recognizer for Literal {
    fn match_at(&self, s: &str, pos: usize, end: usize) -> Option<usize> {
        let stop = pos + self.0.len();
        if stop <= end && s.as_bytes().get(pos..stop) == Some(self.0.as_bytes()) {
            Some(stop)
        } else {
            None
        }
    }
}

struct Characters {
    chars: Vec<char>,
    invert: bool,
}

impl Recognizer for Characters {
    fn match_at(&self, s: &str, pos: usize, end: usize) -> Option<usize> {
        step(s, pos, end, |ch| self.chars.contains(&ch) != self.invert)
    }
}

struct CharClass {
    mask: u16,
    invert: bool,
}

impl Recognizer for CharClass {
    fn match_at(&self, s: &str, pos: usize, end: usize) -> Option<usize> {
        step(s, pos, end, |ch| chars::is_member(ch, self.mask) != self.invert)
    }
}

struct CharRange {
    lo: char,
    hi: char,
    invert: bool,
}

impl Recognizer for CharRange {
    fn match_at(&self, s: &str, pos: usize, end: usize) -> Option<usize> {
        step(s, pos, end, |ch| (self.lo..=self.hi).contains(&ch) != self.invert)
    }
}

struct Whitespace {
    invert: bool,
}

impl Recognizer for Whitespace {
    fn match_at(&self, s: &str, pos: usize, end: usize) -> Option<usize> {
        step(s, pos, end, |ch| chars::is_whitespace(ch) != self.invert)
    }
}

/// Digits with at most one decimal point; a lone `.` does not match.
struct Decimal;

impl Recognizer for Decimal {
    fn match_at(&self, s: &str, pos: usize, end: usize) -> Option<usize> {
        let bytes = s.as_bytes();
        let mut i = pos;
        let mut dot = false;
        while i < end {
            match bytes[i] {
                b'.' if dot => break,
                b'.' => dot = true,
                b'0'..=b'9' => {}
                _ => break,
            }
            i += 1;
        }
        if i == pos || (dot && i == pos + 1) {
            None
        } else {
            Some(i)
        }
    }
}

struct Cardinality {
    pattern: BoxedRecognizer,
    min: usize,
    max: usize,
}

impl Recognizer for Cardinality {
    fn match_at(&self, s: &str, pos: usize, end: usize) -> Option<usize> {
        let mut result = pos;
        let mut count = 0;
        while let Some(next) = self.pattern.match_at(s, result, end) {
            // zero-width child patterns would otherwise spin forever
            let progressed = next > result;
            count += 1;
            result = next;
            if !progressed || count == self.max {
                break;
            }
        }
        if count < self.min { None } else { Some(result) }
    }
}

struct Sequence(Vec<BoxedRecognizer>);

impl Recognizer for Sequence {
    fn match_at(&self, s: &str, pos: usize, end: usize) -> Option<usize> {
        self.0.iter().try_fold(pos, |at, p| p.match_at(s, at, end))
    }
}

struct Choice(Vec<BoxedRecognizer>);

impl Recognizer for Choice {
    fn match_at(&self, s: &str, pos: usize, end: usize) -> Option<usize> {
        self.0.iter().filter_map(|p| p.match_at(s, pos, end)).max()
    }
}

struct LookAhead(BoxedRecognizer);

impl Recognizer for LookAhead {
    fn match_at(&self, s: &str, pos: usize, end: usize) -> Option<usize> {
        self.0.match_at(s, pos, end).map(|_| pos)
    }
}

pub fn any() -> BoxedRecognizer {
    Box::new(Any)
}

pub fn literal(text: &str) -> BoxedRecognizer {
    Box::new(Literal(text.to_string()))
}

pub fn characters(chars: &str) -> BoxedRecognizer {
    Box::new(Characters {
        chars: chars.chars().collect(),
        invert: false,
    })
}

pub fn not_characters(chars: &str) -> BoxedRecognizer {
    Box::new(Characters {
        chars: chars.chars().collect(),
        invert: true,
    })
}

pub fn char_class(mask: u16) -> BoxedRecognizer {
    Box::new(CharClass {
        mask,
        invert: false,
    })
}

pub fn not_char_class(mask: u16) -> BoxedRecognizer {
    Box::new(CharClass { mask, invert: true })
}

pub fn char_range(lo: char, hi: char) -> BoxedRecognizer {
    Box::new(CharRange {
        lo,
        hi,
        invert: false,
    })
}

pub fn not_char_range(lo: char, hi: char) -> BoxedRecognizer {
    Box::new(CharRange {
        lo,
        hi,
        invert: true,
    })
}

pub fn digit() -> BoxedRecognizer {
    char_class(chars::DIGIT)
}

pub fn digits() -> BoxedRecognizer {
    one_or_more(digit())
}

pub fn hexdigit() -> BoxedRecognizer {
    char_class(chars::HEXDIGIT)
}

pub fn decimal() -> BoxedRecognizer {
    Box::new(Decimal)
}

pub fn whitespace() -> BoxedRecognizer {
    Box::new(Whitespace { invert: false })
}

pub fn not_whitespace() -> BoxedRecognizer {
    Box::new(Whitespace { invert: true })
}

/// A single `[a-zA-Z0-9_]` character.
pub fn word() -> BoxedRecognizer {
    char_class(chars::LOWERCASE | chars::UPPERCASE | chars::DIGIT | chars::UNDERSCORE)
}

/// A single `[a-zA-Z0-9_-]` character.
pub fn worddash() -> BoxedRecognizer {
    char_class(chars::LOWERCASE | chars::UPPERCASE | chars::DIGIT | chars::UNDERSCORE | chars::DASH)
}

/// Anything outside the ASCII and C1 control ranges.
pub fn not_ascii() -> BoxedRecognizer {
    not_char_range('\u{0}', '\u{9f}')
}

pub fn sequence(patterns: Vec<BoxedRecognizer>) -> BoxedRecognizer {
    Box::new(Sequence(patterns))
}

pub fn choice(patterns: Vec<BoxedRecognizer>) -> BoxedRecognizer {
    Box::new(Choice(patterns))
}

/// Between `min` and `max` repetitions; a `max` of zero is unbounded.
pub fn cardinality(pattern: BoxedRecognizer, min: usize, max: usize) -> BoxedRecognizer {
    Box::new(Cardinality { pattern, min, max })
}

pub fn one_or_more(pattern: BoxedRecognizer) -> BoxedRecognizer {
    cardinality(pattern, 1, 0)
}

pub fn zero_or_more(pattern: BoxedRecognizer) -> BoxedRecognizer {
    cardinality(pattern, 0, 0)
}

pub fn zero_or_one(pattern: BoxedRecognizer) -> BoxedRecognizer {
    cardinality(pattern, 0, 1)
}

pub fn look_ahead(pattern: BoxedRecognizer) -> BoxedRecognizer {
    Box::new(LookAhead(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(r: &BoxedRecognizer, s: &str) -> Option<usize> {
        r.match_at(s, 0, s.len())
    }

    #[test]
    fn test_literal_and_any() {
        let r = literal("abc");
        assert_eq!(matches(&r, "abcd"), Some(3));
        assert_eq!(matches(&r, "ab"), None);
        assert_eq!(r.match_at("abc", 0, 2), None);
        assert_eq!(matches(&any(), "\u{2603}x"), Some(3));
        assert_eq!(matches(&any(), ""), None);
    }

    #[test]
    fn test_choice_prefers_longest() {
        let r = choice(vec![literal("a"), literal("abc"), literal("ab")]);
        assert_eq!(matches(&r, "abcd"), Some(3));
        let r = choice(vec![literal("x"), literal("y")]);
        assert_eq!(matches(&r, "z"), None);
    }

    #[test]
    fn test_sequence_is_all_or_nothing() {
        let r = sequence(vec![literal("a"), digits(), literal("z")]);
        assert_eq!(matches(&r, "a123z!"), Some(5));
        assert_eq!(matches(&r, "a123"), None);
    }

    #[test]
    fn test_cardinality() {
        let r = cardinality(digit(), 2, 3);
        assert_eq!(matches(&r, "1"), None);
        assert_eq!(matches(&r, "12"), Some(2));
        assert_eq!(matches(&r, "12345"), Some(3));
        assert_eq!(matches(&zero_or_more(digit()), "x"), Some(0));
        assert_eq!(matches(&zero_or_one(digit()), "99"), Some(1));
        assert_eq!(matches(&one_or_more(worddash()), "ab-c_d!"), Some(6));
    }

    #[test]
    fn test_decimal() {
        let r = decimal();
        assert_eq!(matches(&r, "12.5x"), Some(4));
        assert_eq!(matches(&r, ".5"), Some(2));
        assert_eq!(matches(&r, "5."), Some(2));
        assert_eq!(matches(&r, "1.2.3"), Some(3));
        assert_eq!(matches(&r, "."), None);
        assert_eq!(matches(&r, "x"), None);
    }

    #[test]
    fn test_character_sets() {
        assert_eq!(matches(&characters("abc"), "b"), Some(1));
        assert_eq!(matches(&not_characters("abc"), "b"), None);
        assert_eq!(matches(&char_range('a', 'f'), "e"), Some(1));
        assert_eq!(matches(&not_char_range('a', 'f'), "e"), None);
        assert_eq!(matches(&hexdigit(), "F"), Some(1));
        assert_eq!(matches(&not_char_class(chars::DIGIT), "7"), None);
        assert_eq!(matches(&whitespace(), "\u{a0}"), Some(2));
        assert_eq!(matches(&not_whitespace(), " "), None);
        assert_eq!(matches(&not_ascii(), "\u{e9}"), Some(2));
        assert_eq!(matches(&not_ascii(), "e"), None);
    }

    #[test]
    fn test_look_ahead_does_not_consume() {
        let r = sequence(vec![literal("a"), look_ahead(literal("b"))]);
        assert_eq!(matches(&r, "ab"), Some(1));
        assert_eq!(matches(&r, "ac"), None);
    }
}
