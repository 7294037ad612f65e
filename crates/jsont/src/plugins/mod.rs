/*
 * mod.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Built-in formatters and predicates.
//!
//! [`CorePlugins`] registers the whole catalog; [`crate::Compiler::new`]
//! does this automatically.

pub mod escape;
pub mod formatters;
pub mod predicates;

use crate::plugin::{FormatterRegistry, FormatterTable, PredicateRegistry, PredicateTable};

/// The core formatter and predicate catalog.
#[derive(Debug, Clone, Copy, Default)]
pub struct CorePlugins;

impl FormatterRegistry for CorePlugins {
    fn register_formatters(&self, table: &mut FormatterTable) {
        formatters::register(table);
    }
}

impl PredicateRegistry for CorePlugins {
    fn register_predicates(&self, table: &mut PredicateTable) {
        predicates::register(table);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_catalog() {
        let mut formatters = FormatterTable::new();
        formatters.register(&CorePlugins);
        assert_eq!(formatters.len(), 28);
        for name in ["apply", "html", "htmltag", "json-pretty", "url-encode"] {
            assert!(formatters.contains(name), "{}", name);
        }

        let mut predicates = PredicateTable::new();
        predicates.register(&CorePlugins);
        assert_eq!(
            predicates.identifiers(),
            vec![
                "debug?",
                "equal?",
                "even?",
                "greaterThan?",
                "greaterThanOrEqual?",
                "lessThan?",
                "lessThanOrEqual?",
                "notEqual?",
                "nth?",
                "odd?",
                "plural?",
                "singular?",
            ]
        );
    }
}
