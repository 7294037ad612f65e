/*
 * view.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Zero-copy views into compiled template source.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

/// A shared source buffer plus a byte range into it.
///
/// Equality and hashing only consider the referenced range, so two views over
/// different buffers compare equal when their text does.
#[derive(Clone)]
pub struct StringView {
    source: Arc<str>,
    start: usize,
    end: usize,
}

impl StringView {
    /// Create a view over `source[start..end]`.
    ///
    /// Ranges are clamped to the buffer, and positions must fall on character
    /// boundaries.
    pub fn new(source: Arc<str>, start: usize, end: usize) -> Self {
        let end = end.min(source.len());
        let start = start.min(end);
        Self { source, start, end }
    }

    pub fn as_str(&self) -> &str {
        &self.source[self.start..self.end]
    }

    /// A view relative to this one; no bytes are copied.
    pub fn subview(&self, start: usize, end: usize) -> StringView {
        StringView::new(self.source.clone(), self.start + start, self.start + end)
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn last_char(&self) -> Option<char> {
        self.as_str().chars().next_back()
    }
}

impl From<&str> for StringView {
    fn from(text: &str) -> Self {
        let source: Arc<str> = Arc::from(text);
        let end = source.len();
        StringView::new(source, 0, end)
    }
}

impl Deref for StringView {
    type Target = str;

    fn deref(&self) -> &str {
        self.as_str()
    }
}

impl PartialEq for StringView {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for StringView {}

impl Hash for StringView {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl fmt::Debug for StringView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl fmt::Display for StringView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_equality_over_range() {
        let a = StringView::from("xxabcxx").subview(2, 5);
        let b = StringView::from("abc");
        assert_eq!(a, b);
        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_subview_shares_buffer() {
        let whole = StringView::from("hello world");
        let word = whole.subview(6, 11);
        assert_eq!(word.as_str(), "world");
        assert_eq!(word.start(), 6);
        assert_eq!(word.subview(1, 3).as_str(), "or");
        assert_eq!(word.last_char(), Some('d'));
        assert!(Arc::ptr_eq(&whole.source, &word.source));
    }

    #[test]
    fn test_clamped_ranges() {
        let v = StringView::from("abc").subview(1, 10);
        assert_eq!(v.as_str(), "bc");
        assert_eq!(v.len(), 2);
    }
}
