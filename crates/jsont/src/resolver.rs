/*
 * resolver.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Partial template resolution.
//!
//! Partials are looked up by name when a template runs `{a|apply name}` or
//! `{.include name}`. The source returned here is compiled on first use and
//! cached for the rest of the execution.

use std::collections::HashMap;

use serde_json::{Map, Value};

/// Trait for loading partial templates.
pub trait PartialResolver {
    /// Load a partial template by name.
    ///
    /// # Arguments
    /// * `name` - The partial name as written in the template
    ///
    /// # Returns
    /// The partial template source text, or `None` if not found.
    fn get_partial(&self, name: &str) -> Option<String>;
}

/// A JSON object of `name -> source`. Members that are not strings are
/// treated as missing.
impl PartialResolver for Map<String, Value> {
    fn get_partial(&self, name: &str) -> Option<String> {
        self.get(name).and_then(Value::as_str).map(str::to_string)
    }
}

/// Any JSON value; only objects hold partials.
impl PartialResolver for Value {
    fn get_partial(&self, name: &str) -> Option<String> {
        match self {
            Value::Object(map) => map.get_partial(name),
            _ => None,
        }
    }
}

/// Resolver that loads partials from an in-memory map.
#[derive(Debug, Clone, Default)]
pub struct MemoryResolver {
    partials: HashMap<String, String>,
}

impl MemoryResolver {
    /// Create a new empty memory resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a partial to the resolver.
    pub fn add(&mut self, name: impl Into<String>, content: impl Into<String>) -> &mut Self {
        self.partials.insert(name.into(), content.into());
        self
    }

    /// Create a resolver with the given partials.
    pub fn with_partials(
        partials: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> Self {
        let mut resolver = Self::new();
        for (name, content) in partials {
            resolver.add(name, content);
        }
        resolver
    }

    pub fn len(&self) -> usize {
        self.partials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partials.is_empty()
    }
}

impl PartialResolver for MemoryResolver {
    fn get_partial(&self, name: &str) -> Option<String> {
        self.partials.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_memory_resolver() {
        let mut resolver = MemoryResolver::new();
        resolver.add("header", "<h1>{title}</h1>").add("footer", "bye");
        assert_eq!(resolver.len(), 2);
        assert_eq!(
            resolver.get_partial("header"),
            Some("<h1>{title}</h1>".to_string())
        );
        assert_eq!(resolver.get_partial("missing"), None);
    }

    #[test]
    fn test_with_partials() {
        let resolver = MemoryResolver::with_partials([("a", "1"), ("b", "2")]);
        assert_eq!(resolver.get_partial("b"), Some("2".to_string()));
    }

    #[test]
    fn test_json_resolver_skips_non_text() {
        let partials = json!({"p": "{@}", "n": 12});
        assert_eq!(partials.get_partial("p"), Some("{@}".to_string()));
        assert_eq!(partials.get_partial("n"), None);
        assert_eq!(json!([1]).get_partial("p"), None);
    }
}
