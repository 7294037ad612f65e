/*
 * arguments.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Formatter and predicate arguments.
//!
//! The raw argument blob that follows a formatter or predicate name starts
//! with its own delimiter: `{a|truncate 10 ...}` splits on spaces while
//! `{a|truncate:10:...}` splits on colons. Empty pieces are dropped.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::ArgumentsError;

#[derive(Clone)]
pub struct Arguments {
    args: Vec<String>,
    delimiter: char,
    /// Value pre-computed once by `validate_args`, reused on every execution.
    opaque: Option<Arc<dyn Any + Send + Sync>>,
}

impl Default for Arguments {
    fn default() -> Self {
        Self {
            args: Vec::new(),
            delimiter: ' ',
            opaque: None,
        }
    }
}

impl Arguments {
    /// Parse a raw blob; its first character is the delimiter.
    pub fn parse(raw: &str) -> Self {
        let mut chars = raw.chars();
        let Some(delimiter) = chars.next() else {
            return Self::default();
        };
        let args = chars
            .as_str()
            .split(delimiter)
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .collect();
        Self {
            args,
            delimiter,
            opaque: None,
        }
    }

    /// First argument, or an empty string when there are none.
    pub fn first(&self) -> &str {
        self.args.first().map(String::as_str).unwrap_or("")
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }

    pub fn count(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn set_opaque<T: Any + Send + Sync>(&mut self, value: T) {
        self.opaque = Some(Arc::new(value));
    }

    pub fn opaque<T: Any>(&self) -> Option<&T> {
        self.opaque.as_ref().and_then(|o| o.downcast_ref::<T>())
    }

    pub fn exactly(&self, num: usize) -> Result<(), ArgumentsError> {
        if self.args.len() != num {
            return Err(ArgumentsError::new(format!(
                "Wrong number of args, exactly {} expected",
                num
            )));
        }
        Ok(())
    }

    pub fn at_most(&self, num: usize) -> Result<(), ArgumentsError> {
        self.between(0, num)
    }

    pub fn at_least(&self, num: usize) -> Result<(), ArgumentsError> {
        self.between(num, usize::MAX)
    }

    pub fn between(&self, min: usize, max: usize) -> Result<(), ArgumentsError> {
        let count = self.args.len();
        if count < min {
            return Err(ArgumentsError::new(format!(
                "Not enough args. At least {} expected",
                min
            )));
        }
        if count > max {
            return Err(ArgumentsError::new(format!(
                "Too many args. Takes between {} and {}",
                min, max
            )));
        }
        Ok(())
    }

    /// Source form, including the leading delimiter.
    pub fn join(&self) -> String {
        let mut buf = String::new();
        for arg in &self.args {
            buf.push(self.delimiter);
            buf.push_str(arg);
        }
        buf
    }
}

impl PartialEq for Arguments {
    fn eq(&self, other: &Self) -> bool {
        self.delimiter == other.delimiter && self.args == other.args
    }
}

impl fmt::Debug for Arguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arguments")
            .field("delimiter", &self.delimiter)
            .field("args", &self.args)
            .field("opaque", &self.opaque.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delimiter_is_first_char() {
        let args = Arguments::parse(" a b  c");
        assert_eq!(args.args(), &["a", "b", "c"]);
        assert_eq!(args.delimiter(), ' ');

        let args = Arguments::parse(":x::y");
        assert_eq!(args.args(), &["x", "y"]);
        assert_eq!(args.join(), ":x:y");
        assert_eq!(args.first(), "x");
    }

    #[test]
    fn test_empty() {
        let args = Arguments::parse("");
        assert!(args.is_empty());
        assert_eq!(args.first(), "");
        assert_eq!(args.join(), "");
    }

    #[test]
    fn test_count_assertions() {
        let args = Arguments::parse(" 1 2");
        assert!(args.exactly(2).is_ok());
        assert_eq!(
            args.exactly(1).unwrap_err().to_string(),
            "Wrong number of args, exactly 1 expected"
        );
        assert_eq!(
            args.at_least(3).unwrap_err().to_string(),
            "Not enough args. At least 3 expected"
        );
        assert_eq!(
            args.at_most(1).unwrap_err().to_string(),
            "Too many args. Takes between 0 and 1"
        );
        assert!(args.between(1, 2).is_ok());
    }

    #[test]
    fn test_opaque_slot() {
        let mut args = Arguments::parse(" 10");
        args.set_opaque(10usize);
        assert_eq!(args.opaque::<usize>(), Some(&10));
        assert_eq!(args.opaque::<String>(), None);
        let copy = args.clone();
        assert_eq!(copy.opaque::<usize>(), Some(&10));
    }
}
