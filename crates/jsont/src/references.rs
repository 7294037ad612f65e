/*
 * references.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Static analysis of a compiled template.
//!
//! [`ReferenceScanner`] walks an instruction tree and collects how often
//! each instruction, formatter and predicate is used, which variables are
//! referenced (nested under the sections that scope them) and how much
//! literal text the template holds.

use std::collections::BTreeMap;

use serde_json::{Map, Value, json};

use crate::instructions::Instruction;
use crate::repr;
use crate::variable::VarName;

/// Referenced variables, in first-seen order. A name that opens a section
/// holds the names referenced inside it.
#[derive(Debug, Default, Clone)]
struct Scope {
    entries: Vec<(String, Option<Scope>)>,
}

impl Scope {
    fn add(&mut self, name: String) {
        if !self.entries.iter().any(|(n, _)| *n == name) {
            self.entries.push((name, None));
        }
    }

    fn child(&mut self, name: &str) -> &mut Scope {
        let index = match self.entries.iter().position(|(n, _)| n == name) {
            Some(index) => index,
            None => {
                self.entries.push((name.to_string(), None));
                self.entries.len() - 1
            }
        };
        self.entries[index].1.get_or_insert_with(Scope::default)
    }

    fn to_value(&self) -> Value {
        let mut map = Map::new();
        for (name, scope) in &self.entries {
            let value = scope.as_ref().map(Scope::to_value).unwrap_or(Value::Null);
            map.insert(name.clone(), value);
        }
        Value::Object(map)
    }
}

/// Metrics collected by a [`ReferenceScanner`].
#[derive(Debug, Default, Clone)]
pub struct References {
    instructions: BTreeMap<&'static str, usize>,
    formatters: BTreeMap<String, usize>,
    predicates: BTreeMap<String, usize>,
    variables: Scope,
    sections: Vec<String>,
    if_instructions: Vec<String>,
    text_bytes: usize,
}

impl References {
    pub fn instruction_count(&self, type_name: &str) -> usize {
        self.instructions.get(type_name).copied().unwrap_or(0)
    }

    pub fn formatter_count(&self, identifier: &str) -> usize {
        self.formatters.get(identifier).copied().unwrap_or(0)
    }

    pub fn predicate_count(&self, identifier: &str) -> usize {
        self.predicates.get(identifier).copied().unwrap_or(0)
    }

    pub fn text_bytes(&self) -> usize {
        self.text_bytes
    }

    /// The collected metrics as a JSON object.
    pub fn report(&self) -> Value {
        json!({
            "instructions": self.instructions,
            "formatters": self.formatters,
            "predicates": self.predicates,
            "variables": self.variables.to_value(),
            "textBytes": self.text_bytes,
            "ifInstructions": self.if_instructions,
        })
    }

    fn scope(&mut self) -> &mut Scope {
        let mut scope = &mut self.variables;
        for name in &self.sections {
            scope = scope.child(name);
        }
        scope
    }

    fn add_variable(&mut self, name: &VarName) {
        let name = name.to_string();
        self.scope().add(name);
    }

    fn push_section(&mut self, name: &VarName) {
        let name = name.to_string();
        self.scope().child(&name);
        self.sections.push(name);
    }

    fn pop_section(&mut self) {
        self.sections.pop();
    }
}

/// Walks instruction trees, accumulating [`References`].
#[derive(Debug, Default)]
pub struct ReferenceScanner {
    refs: References,
}

impl ReferenceScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn references(&self) -> &References {
        &self.refs
    }

    pub fn into_references(self) -> References {
        self.refs
    }

    /// Scan `inst` and everything below it.
    pub fn extract(&mut self, inst: &Instruction) {
        if !matches!(inst, Instruction::Root(_)) {
            *self.refs.instructions.entry(inst.type_name()).or_default() += 1;
        }

        match inst {
            Instruction::Text(text) => {
                self.refs.text_bytes += text.view.as_str().len();
            }
            Instruction::Variable(var) => {
                for name in &var.vars {
                    self.refs.add_variable(name);
                }
                for call in &var.formatters {
                    *self.refs.formatters.entry(call.identifier().to_string()).or_default() += 1;
                }
            }
            Instruction::BindVar(bind) => {
                for name in &bind.vars {
                    self.refs.add_variable(name);
                }
                for call in &bind.formatters {
                    *self.refs.formatters.entry(call.identifier().to_string()).or_default() += 1;
                }
            }
            Instruction::Section(section) => {
                self.refs.push_section(&section.var);
                self.extract_block(inst);
                self.refs.pop_section();
            }
            Instruction::Repeated(repeated) => {
                self.refs.push_section(&repeated.var);
                self.extract_block(inst);
                if let Some(alternates) = &repeated.alternates_with {
                    *self.refs.instructions.entry("ALTERNATES_WITH").or_default() += 1;
                    for child in &alternates.block.consequent {
                        self.extract(child);
                    }
                    if let Some(alt) = &alternates.block.alternative {
                        self.extract(alt);
                    }
                }
                self.refs.pop_section();
            }
            Instruction::Predicate(pred) => {
                if let Some(call) = &pred.call {
                    *self.refs.predicates.entry(call.identifier().to_string()).or_default() += 1;
                    for name in call.predicate.variable_refs(&call.args) {
                        self.refs.add_variable(&name);
                    }
                }
                self.extract_block(inst);
            }
            Instruction::If(if_inst) => {
                self.refs.if_instructions.push(repr::repr(inst, false));
                for name in &if_inst.vars {
                    self.refs.add_variable(name);
                }
                self.extract_block(inst);
            }
            Instruction::IfPredicate(if_inst) => {
                self.refs.if_instructions.push(repr::repr(inst, false));
                let name = if_inst.call.identifier().to_string();
                *self.refs.predicates.entry(name).or_default() += 1;
                self.extract_block(inst);
            }
            Instruction::IfExpression(_) => {
                self.refs.if_instructions.push(repr::repr(inst, false));
                self.extract_block(inst);
            }
            Instruction::Root(_) | Instruction::Macro(_) | Instruction::AlternatesWith(_) => {
                self.extract_block(inst);
            }
            _ => {}
        }
    }

    fn extract_block(&mut self, inst: &Instruction) {
        for child in inst.consequent() {
            self.extract(child);
        }
        if let Some(alt) = inst.alternative() {
            self.extract(alt);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{CompileOptions, Compiler};

    fn scan(source: &str) -> References {
        let compiler = Compiler::new();
        let code = compiler
            .compile(source, &CompileOptions::new())
            .unwrap()
            .into_code();
        let mut scanner = ReferenceScanner::new();
        scanner.extract(&code);
        scanner.into_references()
    }

    #[test]
    fn test_basic_counts() {
        let refs = scan("{.section nums}{.even? @foo}#{@|json}{.end}{.even?}#{.end}{.end}");
        assert_eq!(refs.instruction_count("VARIABLE"), 1);
        assert_eq!(refs.instruction_count("SECTION"), 1);
        assert_eq!(refs.instruction_count("TEXT"), 2);
        assert_eq!(refs.instruction_count("PREDICATE"), 2);
        assert_eq!(refs.instruction_count("END"), 3);
        assert_eq!(refs.predicate_count("even?"), 2);
        assert_eq!(refs.formatter_count("json"), 1);
        assert_eq!(refs.text_bytes(), 2);

        let report = refs.report();
        assert_eq!(report["variables"]["nums"]["@foo"], Value::Null);
        assert!(report["variables"]["nums"].is_object());
    }

    #[test]
    fn test_or_predicates() {
        let refs = scan("{.even? 2}#{.or odd? foo}!{.end}");
        assert_eq!(refs.instruction_count("PREDICATE"), 1);
        assert_eq!(refs.instruction_count("OR_PREDICATE"), 1);
        assert_eq!(refs.instruction_count("TEXT"), 2);
        assert_eq!(refs.report()["variables"], json!({"foo": null}));
    }

    #[test]
    fn test_formatter_counts() {
        let refs = scan("{a|json|html|json}{b|json}{c|html}");
        assert_eq!(refs.formatter_count("json"), 3);
        assert_eq!(refs.formatter_count("html"), 2);
    }

    #[test]
    fn test_section_nesting() {
        let refs = scan("{.section a}{.section b}{.section c}{d}{.end}{.end}{.end}{.section a}{e}{.end}");
        assert_eq!(
            refs.report()["variables"],
            json!({"a": {"b": {"c": {"d": null}}, "e": null}})
        );
    }

    #[test]
    fn test_alternates_and_text() {
        let refs = scan("{.odd? a}{a}{.or}{b}{.end}{.repeated section c}{.alternates with}{d}{.end}");
        assert_eq!(
            refs.report()["variables"],
            json!({"a": null, "b": null, "c": {"d": null}})
        );
        assert_eq!(scan("{.section a}abcde{.or}fghij{.end}").text_bytes(), 10);
    }

    #[test]
    fn test_if_instructions() {
        let refs = scan("{.if a || b}x{.end}{.if even?}a{.or}b{.end}");
        let report = refs.report();
        assert_eq!(report["ifInstructions"], json!(["{.if a || b}", "{.if even?}"]));
        assert_eq!(refs.predicate_count("even?"), 1);
        assert_eq!(refs.instruction_count("IF"), 2);
    }
}
