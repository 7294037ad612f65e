/*
 * reduce.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Stack evaluation of one postfix statement.

use std::cmp::Ordering;

use super::functions;
use super::tokens::{OpKind, Operator, Token};
use super::{ExprScope, ExprValue};
use crate::variable::VarName;

enum Slot {
    Value(ExprValue),
    Var(VarName),
    Args,
}

fn literal(scope: &dyn ExprScope, slot: &Slot) -> Option<ExprValue> {
    match slot {
        Slot::Value(v) => Some(v.clone()),
        Slot::Var(name) => scope.lookup(name),
        Slot::Args => None,
    }
}

/// Evaluate `statement`. Problems are reported to `scope`; the statement
/// stops at the first one and whatever sits on top of the stack is the
/// result.
pub(crate) fn reduce(
    statement: &[Token],
    scope: &mut dyn ExprScope,
    max_string_len: usize,
) -> Option<ExprValue> {
    let mut stack: Vec<Slot> = Vec::new();

    for token in statement {
        let op = match token {
            Token::Number(n) => {
                stack.push(Slot::Value(ExprValue::Number(*n)));
                continue;
            }
            Token::Str(s) => {
                stack.push(Slot::Value(ExprValue::Str(s.clone())));
                continue;
            }
            Token::Bool(b) => {
                stack.push(Slot::Value(ExprValue::Bool(*b)));
                continue;
            }
            Token::Null => {
                stack.push(Slot::Value(ExprValue::Null));
                continue;
            }
            Token::Var(name) => {
                stack.push(Slot::Var(name.clone()));
                continue;
            }
            Token::Args => {
                stack.push(Slot::Args);
                continue;
            }
            Token::Call(func) => {
                let mut args = Vec::new();
                while let Some(slot) = stack.pop() {
                    if matches!(slot, Slot::Args) {
                        break;
                    }
                    if let Some(v) = literal(scope, &slot) {
                        args.push(v);
                    }
                }
                args.reverse();
                match functions::call(*func, &args) {
                    Some(result) => stack.push(Slot::Value(result)),
                    None => {
                        scope.report(format!("Error calling function {}", func.name()));
                        break;
                    }
                }
                continue;
            }
            Token::Operator(op) => *op,
        };

        match op.kind {
            OpKind::Minus | OpKind::Plus | OpKind::LogicalNot | OpKind::BitwiseNot => {
                // An unusable operand is left in place untouched.
                if let Some(top) = stack.last_mut()
                    && let Some(v) = literal(scope, top)
                {
                    *top = Slot::Value(unary(op.kind, &v));
                }
            }
            OpKind::Assign => {
                let value = stack.pop().and_then(|slot| literal(scope, &slot));
                let target = stack.pop();
                let name = match &target {
                    Some(Slot::Var(name)) => name.local_name(),
                    _ => None,
                };
                match (name, value) {
                    (Some(name), Some(value)) => scope.assign(name, value),
                    _ => scope.report(invalid_args(op)),
                }
                break;
            }
            _ => {
                let b = stack.pop().and_then(|slot| literal(scope, &slot));
                let a = stack.pop().and_then(|slot| literal(scope, &slot));
                let (Some(a), Some(b)) = (a, b) else {
                    scope.report(invalid_args(op));
                    break;
                };
                match binary(op, &a, &b, max_string_len) {
                    Ok(v) => stack.push(Slot::Value(v)),
                    Err(message) => {
                        scope.report(message);
                        break;
                    }
                }
            }
        }
    }

    let top = stack.last()?;
    let result = literal(scope, top);
    if result.is_none() {
        scope.report("Reduce error: unexpected token on stack".to_string());
    }
    result
}

fn invalid_args(op: &Operator) -> String {
    format!("Invalid arguments to operator {}", op.desc)
}

fn unary(kind: OpKind, v: &ExprValue) -> ExprValue {
    match kind {
        OpKind::Minus => ExprValue::Number(-v.as_number()),
        OpKind::Plus => ExprValue::Number(v.as_number()),
        OpKind::LogicalNot => ExprValue::Bool(!v.as_bool()),
        _ => ExprValue::Number(f64::from(!v.as_int())),
    }
}

fn binary(op: &Operator, a: &ExprValue, b: &ExprValue, max_len: usize) -> Result<ExprValue, String> {
    let number = |n: f64| Ok(ExprValue::Number(n));
    let boolean = |b: bool| Ok(ExprValue::Bool(b));
    match op.kind {
        OpKind::Add if a.is_string() || b.is_string() => {
            let (left, right) = (a.as_text(), b.as_text());
            if max_len > 0 && left.chars().count() + right.chars().count() > max_len {
                return Err(format!(
                    "Concatenation would exceed maximum string length {}",
                    max_len
                ));
            }
            Ok(ExprValue::Str(left + &right))
        }
        OpKind::Add => number(a.as_number() + b.as_number()),
        OpKind::Sub => number(a.as_number() - b.as_number()),
        OpKind::Mul => number(a.as_number() * b.as_number()),
        OpKind::Div => number(a.as_number() / b.as_number()),
        OpKind::Mod => number(a.as_number() % b.as_number()),
        OpKind::Pow => number(a.as_number().powf(b.as_number())),
        OpKind::Shl => number(f64::from(a.as_int().wrapping_shl(b.as_int() as u32))),
        OpKind::Shr => number(f64::from(a.as_int().wrapping_shr(b.as_int() as u32))),
        OpKind::BitwiseAnd => number(f64::from(a.as_int() & b.as_int())),
        OpKind::BitwiseXor => number(f64::from(a.as_int() ^ b.as_int())),
        OpKind::BitwiseOr => number(f64::from(a.as_int() | b.as_int())),
        OpKind::Lt => boolean(compare(a, b) == Some(Ordering::Less)),
        OpKind::LtEq => boolean(matches!(compare(a, b), Some(Ordering::Less | Ordering::Equal))),
        OpKind::Gt => boolean(compare(a, b) == Some(Ordering::Greater)),
        OpKind::GtEq => boolean(matches!(
            compare(a, b),
            Some(Ordering::Greater | Ordering::Equal)
        )),
        OpKind::Eq => boolean(compare(a, b) == Some(Ordering::Equal)),
        OpKind::NotEq => boolean(compare(a, b) != Some(Ordering::Equal)),
        OpKind::StrictEq => boolean(strict_equal(a, b)),
        OpKind::StrictNotEq => boolean(!strict_equal(a, b)),
        OpKind::LogicalAnd => boolean(a.as_bool() && b.as_bool()),
        OpKind::LogicalOr => boolean(a.as_bool() || b.as_bool()),
        _ => Err(format!(
            "Unexpected operator found during evaluation: {}",
            op.desc
        )),
    }
}

/// Two strings compare by code point, anything else numerically. `None`
/// when either side is NaN.
fn compare(a: &ExprValue, b: &ExprValue) -> Option<Ordering> {
    match (a, b) {
        (ExprValue::Str(x), ExprValue::Str(y)) => Some(x.cmp(y)),
        _ => a.as_number().partial_cmp(&b.as_number()),
    }
}

fn strict_equal(a: &ExprValue, b: &ExprValue) -> bool {
    a.same_type(b) && compare(a, b) == Some(Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{Expr, ExprOptions};
    use std::collections::HashMap;

    #[derive(Default)]
    struct Scope {
        vars: HashMap<String, ExprValue>,
        errors: Vec<String>,
    }

    impl ExprScope for Scope {
        fn lookup(&self, name: &VarName) -> Option<ExprValue> {
            Some(self.vars.get(&name.to_string()).cloned().unwrap_or(ExprValue::Null))
        }

        fn assign(&mut self, name: &str, value: ExprValue) {
            self.vars.insert(name.to_string(), value);
        }

        fn report(&mut self, message: String) {
            self.errors.push(message);
        }
    }

    fn eval(src: &str) -> (Option<ExprValue>, Scope) {
        let expr = Expr::compile(src, &ExprOptions::new().with_max_string_len(10));
        assert!(expr.errors().is_empty(), "{:?}", expr.errors());
        let mut scope = Scope::default();
        let result = expr.reduce(&mut scope);
        (result, scope)
    }

    fn value(src: &str) -> ExprValue {
        let (result, scope) = eval(src);
        assert!(scope.errors.is_empty(), "{:?}", scope.errors);
        result.unwrap_or(ExprValue::Null)
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(value("1 + 2 * 3"), ExprValue::Number(7.0));
        assert_eq!(value("2 ** 3 ** 2"), ExprValue::Number(512.0));
        assert_eq!(value("7 % 4"), ExprValue::Number(3.0));
        assert_eq!(value("-(3) - -2"), ExprValue::Number(-1.0));
        assert_eq!(value("1 / 0"), ExprValue::Number(f64::INFINITY));
        assert_eq!(value("~5"), ExprValue::Number(-6.0));
        assert_eq!(value("1 << 33"), ExprValue::Number(2.0));
        assert_eq!(value("-16 >> 2"), ExprValue::Number(-4.0));
    }

    #[test]
    fn test_strings_and_comparisons() {
        assert_eq!(value("'a' + 1"), ExprValue::Str("a1".into()));
        assert_eq!(value("'abc' < 'abd'"), ExprValue::Bool(true));
        assert_eq!(value("'10' == 10"), ExprValue::Bool(true));
        assert_eq!(value("'10' === 10"), ExprValue::Bool(false));
        assert_eq!(value("NaN == NaN"), ExprValue::Bool(false));
        assert_eq!(value("NaN != NaN"), ExprValue::Bool(true));
        assert_eq!(value("null === null"), ExprValue::Bool(true));
        assert_eq!(value("1 && 'x'"), ExprValue::Bool(true));
    }

    #[test]
    fn test_concat_limit() {
        let (result, scope) = eval("'abcdef' + 'ghijkl'");
        assert_eq!(result, None);
        assert_eq!(
            scope.errors,
            vec!["Concatenation would exceed maximum string length 10".to_string()]
        );
    }

    #[test]
    fn test_assignment_and_statements() {
        let (result, scope) = eval("@a = 3; @b = @a * 2; @b + 1");
        assert_eq!(result, Some(ExprValue::Number(7.0)));
        assert_eq!(scope.vars.get("@b"), Some(&ExprValue::Number(6.0)));

        let (_, scope) = eval("a = 1");
        assert_eq!(scope.errors, vec!["Invalid arguments to operator assign".to_string()]);
    }

    #[test]
    fn test_functions() {
        assert_eq!(value("max(1, 5, 3) + min(4, -1)"), ExprValue::Number(4.0));
        assert_eq!(value("str(12) + abs(-1)"), ExprValue::Str("121".into()));
        let (_, scope) = eval("max()");
        assert_eq!(scope.errors, vec!["Error calling function max".to_string()]);
    }

    #[test]
    fn test_invalid_operands() {
        let (_, scope) = eval("1 +");
        assert_eq!(scope.errors, vec!["Invalid arguments to operator add".to_string()]);
    }
}
