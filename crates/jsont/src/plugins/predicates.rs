/*
 * predicates.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! The core predicate catalog.
//!
//! Comparison predicates take one or two arguments, each either a JSON
//! literal or a variable reference. With one argument the current node is
//! compared against it; with two they are compared with each other.

use std::cmp::Ordering;

use serde_json::Value;

use crate::arguments::Arguments;
use crate::context::Context;
use crate::error::{ArgumentsError, ExecuteError};
use crate::node::Node;
use crate::patterns;
use crate::plugin::{Predicate, PredicateTable};
use crate::variable::VarName;

pub(super) fn register(table: &mut PredicateTable) {
    table
        .add(DebugFlag)
        .add(Compare::new("equal?", Comparison::Equal))
        .add(Compare::new("notEqual?", Comparison::NotEqual))
        .add(Compare::new("greaterThan?", Comparison::Greater))
        .add(Compare::new("greaterThanOrEqual?", Comparison::GreaterOrEqual))
        .add(Compare::new("lessThan?", Comparison::Less))
        .add(Compare::new("lessThanOrEqual?", Comparison::LessOrEqual))
        .add(Parity::new("even?", 0))
        .add(Parity::new("odd?", 1))
        .add(Nth)
        .add(Plurality::new("plural?", |n| n > 1))
        .add(Plurality::new("singular?", |n| n == 1));
}

/// A parsed comparison argument.
#[derive(Debug, Clone)]
enum Operand {
    Literal(Value),
    Variable(VarName),
}

fn looks_like_json(raw: &str) -> bool {
    matches!(
        raw.trim_start_matches(' ').chars().next(),
        Some('"' | '-' | '0'..='9' | '[' | '{')
    )
}

fn parse_operand(raw: &str) -> Result<Operand, ArgumentsError> {
    if looks_like_json(raw)
        && let Ok(value) = serde_json::from_str::<Value>(raw)
    {
        return Ok(Operand::Literal(value));
    }
    if patterns::VARIABLE.match_at(raw, 0, raw.len()) == Some(raw.len()) {
        return Ok(Operand::Variable(VarName::parse(raw)));
    }
    Err(ArgumentsError::new(format!(
        "Argument {} must be a valid JSON value or variable reference.",
        raw
    )))
}

fn parse_operands(args: &mut Arguments) -> Result<(), ArgumentsError> {
    let operands = args
        .args()
        .iter()
        .map(|a| parse_operand(a))
        .collect::<Result<Vec<_>, _>>()?;
    args.set_opaque(operands);
    Ok(())
}

fn operand_refs(args: &Arguments) -> Vec<VarName> {
    args.opaque::<Vec<Operand>>()
        .map(|ops| {
            ops.iter()
                .filter_map(|op| match op {
                    Operand::Variable(name) => Some(name.clone()),
                    Operand::Literal(_) => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

fn operand<'a>(ctx: &Context<'a>, args: &Arguments, index: usize) -> Node<'a> {
    let parsed = args
        .opaque::<Vec<Operand>>()
        .and_then(|ops| ops.get(index).cloned())
        .or_else(|| args.get(index).and_then(|a| parse_operand(a).ok()));
    match parsed {
        Some(Operand::Literal(value)) => Node::owned(value),
        Some(Operand::Variable(name)) => ctx.resolve(&name),
        None => Node::Missing,
    }
}

/// The subject and the value it is tested against.
fn operand_pair<'a>(ctx: &Context<'a>, args: &Arguments) -> (Node<'a>, Node<'a>) {
    let first = operand(ctx, args, 0);
    if args.count() == 1 {
        (ctx.node(), first)
    } else {
        (first, operand(ctx, args, 1))
    }
}

fn same(left: &Node<'_>, right: &Node<'_>) -> bool {
    match (left, right) {
        (Node::Missing, Node::Missing) => true,
        (Node::NonFinite(a), Node::NonFinite(b)) => a.to_bits() == b.to_bits(),
        _ => match (left.value(), right.value()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
    }
}

fn is_integral(node: &Node<'_>) -> bool {
    matches!(node.value(), Some(Value::Number(n)) if n.is_i64() || n.is_u64())
}

/// Order two nodes by the type of the left one. Values that can't be
/// ordered are equal when identical and less otherwise.
fn compare(left: &Node<'_>, right: &Node<'_>) -> Ordering {
    match left.value() {
        Some(Value::Number(_)) if is_integral(left) => left.as_i64().cmp(&right.as_i64()),
        Some(Value::Number(_)) => left.as_f64().total_cmp(&right.as_f64()),
        Some(Value::String(s)) => s.as_str().cmp(right.as_text().as_str()),
        Some(Value::Bool(b)) => b.cmp(&right.is_truthy()),
        _ if left.is_number() => left.as_f64().total_cmp(&right.as_f64()),
        _ if same(left, right) => Ordering::Equal,
        _ => Ordering::Less,
    }
}

// ===================================================================
// Predicates
// ===================================================================

/// True when the `debug` variable is truthy.
pub struct DebugFlag;

impl Predicate for DebugFlag {
    fn identifier(&self) -> &str {
        "debug?"
    }

    fn apply(&self, ctx: &Context<'_>, _args: &Arguments) -> Result<bool, ExecuteError> {
        Ok(ctx.resolve(&VarName::parse("debug")).is_truthy())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    NotEqual,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
}

/// Equality and ordering comparisons.
pub struct Compare {
    identifier: &'static str,
    comparison: Comparison,
}

impl Compare {
    fn new(identifier: &'static str, comparison: Comparison) -> Self {
        Self {
            identifier,
            comparison,
        }
    }
}

impl Predicate for Compare {
    fn identifier(&self) -> &str {
        self.identifier
    }

    fn requires_args(&self) -> bool {
        true
    }

    fn validate_args(&self, args: &mut Arguments) -> Result<(), ArgumentsError> {
        args.between(1, 2)?;
        parse_operands(args)
    }

    fn variable_refs(&self, args: &Arguments) -> Vec<VarName> {
        operand_refs(args)
    }

    fn apply(&self, ctx: &Context<'_>, args: &Arguments) -> Result<bool, ExecuteError> {
        let (left, right) = operand_pair(ctx, args);
        Ok(match self.comparison {
            Comparison::Equal => same(&left, &right),
            Comparison::NotEqual => !same(&left, &right),
            Comparison::Greater => compare(&left, &right).is_gt(),
            Comparison::GreaterOrEqual => compare(&left, &right).is_ge(),
            Comparison::Less => compare(&left, &right).is_lt(),
            Comparison::LessOrEqual => compare(&left, &right).is_le(),
        })
    }
}

/// `even?` / `odd?` on the current node or an argument. Non-integers fail.
pub struct Parity {
    identifier: &'static str,
    remainder: i64,
}

impl Parity {
    fn new(identifier: &'static str, remainder: i64) -> Self {
        Self {
            identifier,
            remainder,
        }
    }
}

impl Predicate for Parity {
    fn identifier(&self) -> &str {
        self.identifier
    }

    fn validate_args(&self, args: &mut Arguments) -> Result<(), ArgumentsError> {
        args.at_most(1)?;
        parse_operands(args)
    }

    fn variable_refs(&self, args: &Arguments) -> Vec<VarName> {
        operand_refs(args)
    }

    fn apply(&self, ctx: &Context<'_>, args: &Arguments) -> Result<bool, ExecuteError> {
        let node = if args.count() == 1 {
            operand(ctx, args, 0)
        } else {
            ctx.node()
        };
        Ok(is_integral(&node) && node.as_i64().rem_euclid(2) == self.remainder)
    }
}

/// `{.nth? 3}` tests the current node, `{.nth? @index 3}` an explicit one,
/// for divisibility.
pub struct Nth;

impl Predicate for Nth {
    fn identifier(&self) -> &str {
        "nth?"
    }

    fn validate_args(&self, args: &mut Arguments) -> Result<(), ArgumentsError> {
        args.between(1, 2)?;
        parse_operands(args)
    }

    fn variable_refs(&self, args: &Arguments) -> Vec<VarName> {
        operand_refs(args)
    }

    fn apply(&self, ctx: &Context<'_>, args: &Arguments) -> Result<bool, ExecuteError> {
        let (node, modulus) = if args.count() == 2 {
            (operand(ctx, args, 0), operand(ctx, args, 1))
        } else {
            (ctx.node(), operand(ctx, args, 0))
        };
        if !is_integral(&node) || !is_integral(&modulus) {
            return Ok(false);
        }
        Ok(node.as_i64().checked_rem(modulus.as_i64()) == Some(0))
    }
}

pub struct Plurality {
    identifier: &'static str,
    test: fn(i64) -> bool,
}

impl Plurality {
    fn new(identifier: &'static str, test: fn(i64) -> bool) -> Self {
        Self { identifier, test }
    }
}

impl Predicate for Plurality {
    fn identifier(&self) -> &str {
        self.identifier
    }

    fn apply(&self, ctx: &Context<'_>, _args: &Arguments) -> Result<bool, ExecuteError> {
        Ok((self.test)(ctx.node().as_i64()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{CompileOptions, Compiler};
    use serde_json::json;

    fn run(template: &str, data: Value) -> String {
        let compiler = Compiler::new();
        compiler
            .executor()
            .template(template)
            .json(&data)
            .execute()
            .unwrap()
            .into_output()
    }

    #[test]
    fn test_operand_parsing() {
        assert!(matches!(parse_operand("12"), Ok(Operand::Literal(_))));
        assert!(matches!(parse_operand("\"a b\""), Ok(Operand::Literal(_))));
        assert!(matches!(parse_operand("a.b.0"), Ok(Operand::Variable(_))));
        assert!(matches!(parse_operand("@index"), Ok(Operand::Variable(_))));
        assert!(parse_operand("a b!").is_err());
    }

    #[test]
    fn test_invalid_operand_is_a_syntax_error() {
        let compiler = Compiler::new();
        let template = compiler
            .compile("{.equal? %%}x{.end}", &CompileOptions::new().validate(true))
            .unwrap();
        assert_eq!(template.errors()[0].code(), "PREDICATE_ARGS_INVALID");
    }

    #[test]
    fn test_equality() {
        let data = json!({"a": 1, "b": 1, "c": "x", "o": {"k": [1]}, "p": {"k": [1]}});
        assert_eq!(run("{.equal? a b}y{.or}n{.end}", data.clone()), "y");
        assert_eq!(run("{.equal? c \"x\"}y{.or}n{.end}", data.clone()), "y");
        assert_eq!(run("{.equal? o p}y{.or}n{.end}", data.clone()), "y");
        assert_eq!(run("{.notEqual? a c}y{.or}n{.end}", data.clone()), "y");
        assert_eq!(run("{.section c}{.equal? \"x\"}y{.or}n{.end}{.end}", data), "y");
    }

    #[test]
    fn test_ordering() {
        let data = json!({"n": 5, "f": 1.5, "s": "b"});
        assert_eq!(run("{.greaterThan? n 3}y{.or}n{.end}", data.clone()), "y");
        assert_eq!(run("{.lessThan? n 3}y{.or}n{.end}", data.clone()), "n");
        assert_eq!(run("{.lessThanOrEqual? n 5}y{.or}n{.end}", data.clone()), "y");
        assert_eq!(run("{.greaterThanOrEqual? f 2}y{.or}n{.end}", data.clone()), "n");
        assert_eq!(run("{.lessThan? s \"c\"}y{.or}n{.end}", data), "y");
    }

    #[test]
    fn test_parity_and_nth() {
        let data = json!({"items": [1, 2, 3, 4, 5, 6]});
        assert_eq!(
            run("{.repeated section items}{.even?}e{.or}o{.end}{.end}", data.clone()),
            "oeoeoe"
        );
        assert_eq!(
            run("{.repeated section items}{.odd? @index}x{.or}-{.end}{.end}", data.clone()),
            "x-x-x-"
        );
        assert_eq!(
            run("{.repeated section items}{@}{.nth? 3}|{.end}{.end}", data),
            "123|456|"
        );
    }

    #[test]
    fn test_plurality_and_debug() {
        let data = json!({"one": 1, "many": 4, "debug": true});
        assert_eq!(run("{.section one}{.singular?}s{.end}{.end}", data.clone()), "s");
        assert_eq!(run("{.section many}{.plural?}p{.end}{.end}", data.clone()), "p");
        assert_eq!(run("{.debug?}d{.end}", data), "d");
        assert_eq!(run("{.debug?}d{.or}-{.end}", json!({})), "-");
    }
}
