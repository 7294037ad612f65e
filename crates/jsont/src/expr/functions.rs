/*
 * functions.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Built-in expression functions.

use super::ExprValue;
use super::tokens::Function;

/// Apply `func` to its arguments. `None` means the call failed, which only
/// happens when no arguments were given.
pub fn call(func: Function, args: &[ExprValue]) -> Option<ExprValue> {
    match func {
        Function::Max => select(args, |a, b| a > b),
        Function::Min => select(args, |a, b| a < b),
        Function::Abs => args
            .first()
            .map(|a| ExprValue::Number(a.as_number().abs())),
        Function::Num => args.first().map(|a| ExprValue::Number(a.as_number())),
        Function::Str => args.first().map(|a| ExprValue::Str(a.as_text())),
        Function::Bool => args.first().map(|a| ExprValue::Bool(a.as_bool())),
    }
}

/// Keep the current pick while `keep(current, next)` holds; NaN never wins a
/// comparison so it is replaced by whatever follows.
fn select(args: &[ExprValue], keep: impl Fn(f64, f64) -> bool) -> Option<ExprValue> {
    let mut numbers = args.iter().map(ExprValue::as_number);
    let first = numbers.next()?;
    let picked = numbers.fold(first, |a, b| if keep(a, b) { a } else { b });
    Some(ExprValue::Number(picked))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(v: f64) -> ExprValue {
        ExprValue::Number(v)
    }

    #[test]
    fn test_min_max() {
        let args = [n(3.0), ExprValue::Str("10".into()), n(-1.0)];
        assert_eq!(call(Function::Max, &args), Some(n(10.0)));
        assert_eq!(call(Function::Min, &args), Some(n(-1.0)));
        assert_eq!(call(Function::Max, &[]), None);
    }

    #[test]
    fn test_first_argument_functions() {
        assert_eq!(call(Function::Abs, &[n(-2.5), n(-9.0)]), Some(n(2.5)));
        assert_eq!(
            call(Function::Num, &[ExprValue::Str("0x1A".into())]),
            Some(n(26.0))
        );
        assert_eq!(
            call(Function::Str, &[n(12.0)]),
            Some(ExprValue::Str("12".into()))
        );
        assert_eq!(
            call(Function::Bool, &[ExprValue::Str(String::new())]),
            Some(ExprValue::Bool(false))
        );
        assert_eq!(call(Function::Abs, &[]), None);
    }
}
