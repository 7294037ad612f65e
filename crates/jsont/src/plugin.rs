/*
 * plugin.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Formatter and predicate interfaces, and the tables that hold them.
//!
//! Plugins are stateless and shared between threads. Anything a plugin wants
//! to pre-compute from its arguments goes into the opaque slot of
//! [`Arguments`] during [`Formatter::validate_args`], which runs once when
//! the template is compiled.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::arguments::Arguments;
use crate::context::Context;
use crate::error::{ArgumentsError, ExecuteError};
use crate::variable::{VarName, Variables};

/// Transforms the value of a variable tag: `{name|formatter args}`.
pub trait Formatter: Send + Sync {
    /// Name used in templates, e.g. `html`.
    fn identifier(&self) -> &str;

    /// Whether the formatter refuses to run without arguments.
    fn requires_args(&self) -> bool {
        false
    }

    /// Check the arguments at compile time, optionally caching a parsed form
    /// in the opaque slot.
    fn validate_args(&self, _args: &mut Arguments) -> Result<(), ArgumentsError> {
        Ok(())
    }

    /// Replace the values in `vars`. Most formatters only touch the first.
    fn apply<'a>(
        &self,
        ctx: &mut Context<'a>,
        args: &Arguments,
        vars: &mut Variables<'a>,
    ) -> Result<(), ExecuteError>;
}

/// A boolean test used by `{.name? args}` blocks.
pub trait Predicate: Send + Sync {
    /// Name used in templates including the trailing `?`, e.g. `plural?`.
    fn identifier(&self) -> &str;

    fn requires_args(&self) -> bool {
        false
    }

    fn validate_args(&self, _args: &mut Arguments) -> Result<(), ArgumentsError> {
        Ok(())
    }

    fn apply(&self, ctx: &Context<'_>, args: &Arguments) -> Result<bool, ExecuteError>;

    /// Variables referenced by the arguments, for reference scanning.
    fn variable_refs(&self, _args: &Arguments) -> Vec<VarName> {
        Vec::new()
    }
}

/// Stand-in bound to unknown predicates when compiling in validate mode, so
/// the block structure can still be checked. Always false.
#[derive(Debug, Clone)]
pub struct UnknownPredicate {
    identifier: String,
}

impl UnknownPredicate {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
        }
    }
}

impl Predicate for UnknownPredicate {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn apply(&self, _ctx: &Context<'_>, _args: &Arguments) -> Result<bool, ExecuteError> {
        Ok(false)
    }
}

/// Something that contributes formatters to a table.
pub trait FormatterRegistry {
    fn register_formatters(&self, table: &mut FormatterTable);
}

/// Something that contributes predicates to a table.
pub trait PredicateRegistry {
    fn register_predicates(&self, table: &mut PredicateTable);
}

/// Formatters by identifier. Registering a name twice replaces the first.
#[derive(Clone, Default)]
pub struct FormatterTable {
    entries: HashMap<String, Arc<dyn Formatter>>,
}

impl FormatterTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, formatter: impl Formatter + 'static) -> &mut Self {
        let name = formatter.identifier().to_string();
        self.entries.insert(name, Arc::new(formatter));
        self
    }

    pub fn register(&mut self, registry: &dyn FormatterRegistry) -> &mut Self {
        registry.register_formatters(self);
        self
    }

    pub fn get(&self, identifier: &str) -> Option<Arc<dyn Formatter>> {
        self.entries.get(identifier).cloned()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.entries.contains_key(identifier)
    }

    /// Registered identifiers in sorted order.
    pub fn identifiers(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for FormatterTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.identifiers()).finish()
    }
}

/// Predicates by identifier, including the trailing `?`.
#[derive(Clone, Default)]
pub struct PredicateTable {
    entries: HashMap<String, Arc<dyn Predicate>>,
}

impl PredicateTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, predicate: impl Predicate + 'static) -> &mut Self {
        let name = predicate.identifier().to_string();
        self.entries.insert(name, Arc::new(predicate));
        self
    }

    pub fn register(&mut self, registry: &dyn PredicateRegistry) -> &mut Self {
        registry.register_predicates(self);
        self
    }

    pub fn get(&self, identifier: &str) -> Option<Arc<dyn Predicate>> {
        self.entries.get(identifier).cloned()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.entries.contains_key(identifier)
    }

    pub fn identifiers(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for PredicateTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.identifiers()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Upper;

    impl Formatter for Upper {
        fn identifier(&self) -> &str {
            "upper"
        }

        fn apply<'a>(
            &self,
            _ctx: &mut Context<'a>,
            _args: &Arguments,
            vars: &mut Variables<'a>,
        ) -> Result<(), ExecuteError> {
            let text = vars.first().as_text().to_uppercase();
            vars.set_first(crate::node::Node::text(text));
            Ok(())
        }
    }

    struct Extras;

    impl FormatterRegistry for Extras {
        fn register_formatters(&self, table: &mut FormatterTable) {
            table.add(Upper);
        }
    }

    struct Always;

    impl Predicate for Always {
        fn identifier(&self) -> &str {
            "always?"
        }

        fn apply(&self, _ctx: &Context<'_>, _args: &Arguments) -> Result<bool, ExecuteError> {
            Ok(true)
        }
    }

    #[test]
    fn test_formatter_table_register() {
        let mut table = FormatterTable::new();
        assert!(table.is_empty());
        table.register(&Extras);
        assert!(table.contains("upper"));
        assert_eq!(table.identifiers(), vec!["upper"]);
        assert!(table.get("lower").is_none());
    }

    #[test]
    fn test_predicate_table_add() {
        let mut table = PredicateTable::new();
        table.add(Always).add(UnknownPredicate::new("nope?"));
        assert_eq!(table.len(), 2);
        assert_eq!(table.identifiers(), vec!["always?", "nope?"]);
        assert!(!table.get("always?").map(|p| p.requires_args()).unwrap_or(true));
    }
}
