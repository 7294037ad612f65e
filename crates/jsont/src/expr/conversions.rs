/*
 * conversions.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Loose coercions between expression values, plus the number scanners
//! shared by the lexer and string-to-number conversion.

use super::ExprValue;
use crate::numbers::format_number;

/// Why a decimal literal was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecimalError {
    ExponentDigit,
    DuplicateDot,
    DotInExponent,
}

impl DecimalError {
    pub fn message(self) -> &'static str {
        match self {
            DecimalError::ExponentDigit => "Expected a digit after exponent in decimal number",
            DecimalError::DuplicateDot => "Duplicate decimal point in number",
            DecimalError::DotInExponent => "Unexpected decimal point in exponent",
        }
    }
}

/// Scan a decimal number starting at `i`, returning where it ends.
pub fn scan_decimal(s: &[u8], i: usize, len: usize) -> Result<usize, DecimalError> {
    let mut j = i;
    let mut dot = false;
    let mut exp = false;
    let mut exp_digit_needed = false;
    let mut exp_sign = false;
    while j < len {
        match s[j] {
            b'.' => {
                if dot {
                    return Err(DecimalError::DuplicateDot);
                }
                if exp {
                    return Err(DecimalError::DotInExponent);
                }
                dot = true;
            }
            b'e' | b'E' => {
                if exp {
                    break;
                }
                exp = true;
                exp_digit_needed = true;
            }
            b'-' | b'+' => {
                if !exp_digit_needed || !exp || exp_sign {
                    break;
                }
                exp_sign = true;
            }
            b'0'..=b'9' => exp_digit_needed = false,
            _ => break,
        }
        j += 1;
    }
    if exp_digit_needed {
        return Err(DecimalError::ExponentDigit);
    }
    Ok(j)
}

/// End of a run of hex digits starting at `i`.
pub fn scan_hex(s: &[u8], i: usize, len: usize) -> usize {
    let mut j = i;
    while j < len && s[j].is_ascii_hexdigit() {
        j += 1;
    }
    j
}

/// Accumulate leading hex digits as a double; NaN when there are none.
pub fn hex_value(text: &str) -> f64 {
    let mut found = false;
    let mut r = 0.0;
    for ch in text.chars() {
        let Some(digit) = ch.to_digit(16) else {
            break;
        };
        found = true;
        r = r * 16.0 + f64::from(digit);
    }
    if found { r } else { f64::NAN }
}

/// ECMAScript ToInt32.
pub fn to_int32(n: f64) -> i32 {
    if !n.is_finite() {
        return 0;
    }
    let m = n.trunc().rem_euclid(4_294_967_296.0);
    if m >= 2_147_483_648.0 {
        (m - 4_294_967_296.0) as i32
    } else {
        m as i32
    }
}

/// String to number: optional sign, then decimal or `0x` hex. The empty
/// string is zero and anything else that does not fully parse is NaN.
pub fn string_to_number(value: &str) -> f64 {
    if value.is_empty() {
        return 0.0;
    }
    let bytes = value.as_bytes();
    let len = bytes.len();
    let negative = bytes[0] == b'-';
    let i = usize::from(negative || bytes[0] == b'+');
    if i == len {
        return f64::NAN;
    }
    let sign = if negative { -1.0 } else { 1.0 };
    if bytes[i] == b'0' && matches!(bytes.get(i + 1), Some(b'x') | Some(b'X')) {
        let j = scan_hex(bytes, i + 2, len);
        return if j == len {
            sign * hex_value(&value[i + 2..])
        } else {
            f64::NAN
        };
    }
    if !bytes[i].is_ascii_digit() {
        return f64::NAN;
    }
    match scan_decimal(bytes, i, len) {
        Ok(j) if j == len => value[i..]
            .parse::<f64>()
            .map(|n| sign * n)
            .unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

impl ExprValue {
    pub fn as_number(&self) -> f64 {
        match self {
            ExprValue::Number(n) => *n,
            ExprValue::Str(s) => string_to_number(s),
            ExprValue::Bool(b) => f64::from(u8::from(*b)),
            ExprValue::Null => 0.0,
        }
    }

    pub fn as_int(&self) -> i32 {
        to_int32(self.as_number())
    }

    pub fn as_bool(&self) -> bool {
        match self {
            ExprValue::Bool(b) => *b,
            ExprValue::Number(n) => *n != 0.0 && !n.is_nan(),
            ExprValue::Str(s) => !s.is_empty(),
            ExprValue::Null => false,
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            ExprValue::Bool(b) => b.to_string(),
            ExprValue::Number(n) => format_number(*n),
            ExprValue::Str(s) => s.clone(),
            ExprValue::Null => "null".to_string(),
        }
    }

    pub fn is_string(&self) -> bool {
        matches!(self, ExprValue::Str(_))
    }

    pub(crate) fn same_type(&self, other: &ExprValue) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}
