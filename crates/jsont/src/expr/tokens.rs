/*
 * tokens.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Expression tokens and the static operator table.

use std::fmt;

use crate::numbers::format_number;
use crate::variable::VarName;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assoc {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Plus,
    Minus,
    LogicalNot,
    BitwiseNot,
    Pow,
    Mul,
    Div,
    Mod,
    Add,
    Sub,
    Shl,
    Shr,
    Lt,
    Gt,
    LtEq,
    GtEq,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    BitwiseAnd,
    BitwiseXor,
    BitwiseOr,
    LogicalAnd,
    LogicalOr,
    Assign,
    Semicolon,
    Comma,
    LeftParen,
    RightParen,
}

#[derive(Debug, PartialEq, Eq)]
pub struct Operator {
    pub kind: OpKind,
    pub prec: u8,
    pub assoc: Assoc,
    pub desc: &'static str,
}

const fn op(kind: OpKind, prec: u8, assoc: Assoc, desc: &'static str) -> Operator {
    Operator {
        kind,
        prec,
        assoc,
        desc,
    }
}

pub static PLUS: Operator = op(OpKind::Plus, 17, Assoc::Right, "unary plus");
pub static MINUS: Operator = op(OpKind::Minus, 17, Assoc::Right, "unary minus");
pub static LNOT: Operator = op(OpKind::LogicalNot, 17, Assoc::Right, "logical not");
pub static BNOT: Operator = op(OpKind::BitwiseNot, 17, Assoc::Right, "bitwise not");
pub static POW: Operator = op(OpKind::Pow, 16, Assoc::Right, "exponent");
pub static MUL: Operator = op(OpKind::Mul, 15, Assoc::Left, "multiply");
pub static DIV: Operator = op(OpKind::Div, 15, Assoc::Left, "divide");
pub static MOD: Operator = op(OpKind::Mod, 15, Assoc::Left, "modulus");
pub static ADD: Operator = op(OpKind::Add, 14, Assoc::Left, "add");
pub static SUB: Operator = op(OpKind::Sub, 14, Assoc::Left, "subtract");
pub static SHL: Operator = op(OpKind::Shl, 13, Assoc::Left, "left shift");
pub static SHR: Operator = op(OpKind::Shr, 13, Assoc::Left, "right shift");
pub static LT: Operator = op(OpKind::Lt, 12, Assoc::Left, "less than");
pub static GT: Operator = op(OpKind::Gt, 12, Assoc::Left, "greater than");
pub static LTEQ: Operator = op(OpKind::LtEq, 12, Assoc::Left, "less than or equal");
pub static GTEQ: Operator = op(OpKind::GtEq, 12, Assoc::Left, "greater than or equal");
pub static EQ: Operator = op(OpKind::Eq, 11, Assoc::Left, "equality");
pub static NEQ: Operator = op(OpKind::NotEq, 11, Assoc::Left, "inequality");
pub static SEQ: Operator = op(OpKind::StrictEq, 11, Assoc::Left, "strict equality");
pub static SNEQ: Operator = op(OpKind::StrictNotEq, 11, Assoc::Left, "strict inequality");
pub static BAND: Operator = op(OpKind::BitwiseAnd, 10, Assoc::Left, "bitwise and");
pub static BXOR: Operator = op(OpKind::BitwiseXor, 9, Assoc::Left, "bitwise xor");
pub static BOR: Operator = op(OpKind::BitwiseOr, 8, Assoc::Left, "bitwise or");
pub static LAND: Operator = op(OpKind::LogicalAnd, 7, Assoc::Left, "logical and");
pub static LOR: Operator = op(OpKind::LogicalOr, 6, Assoc::Left, "logical or");
pub static ASN: Operator = op(OpKind::Assign, 3, Assoc::Right, "assign");
pub static SEMI: Operator = op(OpKind::Semicolon, 1, Assoc::Left, "semicolon");
pub static COMMA: Operator = op(OpKind::Comma, 1, Assoc::Right, "comma");
pub static LPRN: Operator = op(OpKind::LeftParen, 1, Assoc::Left, "left parenthesis");
pub static RPRN: Operator = op(OpKind::RightParen, 1, Assoc::Left, "right parenthesis");

/// Built-in functions callable as `name(args)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    Max,
    Min,
    Abs,
    Num,
    Str,
    Bool,
}

impl Function {
    pub fn lookup(name: &str) -> Option<Function> {
        match name {
            "max" => Some(Function::Max),
            "min" => Some(Function::Min),
            "abs" => Some(Function::Abs),
            "num" => Some(Function::Num),
            "str" => Some(Function::Str),
            "bool" => Some(Function::Bool),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Function::Max => "max",
            Function::Min => "min",
            Function::Abs => "abs",
            Function::Num => "num",
            Function::Str => "str",
            Function::Bool => "bool",
        }
    }
}

pub const PI: f64 = std::f64::consts::PI;
pub const E: f64 = std::f64::consts::E;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Str(String),
    Bool(bool),
    Null,
    Var(VarName),
    Call(Function),
    /// Marks where a call's arguments begin on the evaluation stack.
    Args,
    Operator(&'static Operator),
}

impl Token {
    /// Literal for one of the reserved single-segment names.
    pub fn constant(name: &str) -> Option<Token> {
        let token = match name {
            "null" => Token::Null,
            "true" => Token::Bool(true),
            "false" => Token::Bool(false),
            "PI" => Token::Number(PI),
            "E" => Token::Number(E),
            "Infinity" => Token::Number(f64::INFINITY),
            "NaN" => Token::Number(f64::NAN),
            _ => return None,
        };
        Some(token)
    }

    pub fn operator(&self) -> Option<&'static Operator> {
        match self {
            Token::Operator(o) => Some(o),
            _ => None,
        }
    }

    pub fn is_op(&self, kind: OpKind) -> bool {
        self.operator().is_some_and(|o| o.kind == kind)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => f.write_str(&format_number(*n)),
            Token::Str(s) => {
                let quoted = serde_json::to_string(s).map_err(|_| fmt::Error)?;
                f.write_str(&quoted)
            }
            Token::Bool(b) => write!(f, "{}", b),
            Token::Null => f.write_str("null"),
            Token::Var(name) => write!(f, "{}", name),
            Token::Call(func) => write!(f, "{}()", func.name()),
            Token::Args => f.write_str("<args>"),
            Token::Operator(o) => write!(f, "<{}>", o.desc),
        }
    }
}

/// Space-separated statements, e.g. `[[@a 2 3 <multiply> <assign>]]`.
pub fn debug_statements(statements: &[Vec<Token>]) -> String {
    let mut buf = String::from("[");
    for (i, statement) in statements.iter().enumerate() {
        if i > 0 {
            buf.push_str(", ");
        }
        buf.push('[');
        let parts: Vec<String> = statement.iter().map(Token::to_string).collect();
        buf.push_str(&parts.join(" "));
        buf.push(']');
    }
    buf.push(']');
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        assert_eq!(Token::constant("true"), Some(Token::Bool(true)));
        assert_eq!(Token::constant("PI"), Some(Token::Number(PI)));
        assert!(Token::constant("pi").is_none());
    }

    #[test]
    fn test_debug_format() {
        let statements = vec![
            vec![
                Token::Var(VarName::parse("@a")),
                Token::Number(2.0),
                Token::Str("x\"y".into()),
                Token::Operator(&MUL),
            ],
            vec![Token::Args, Token::Call(Function::Max)],
        ];
        assert_eq!(
            debug_statements(&statements),
            r#"[[@a 2 "x\"y" <multiply>], [<args> max()]]"#
        );
    }

    #[test]
    fn test_precedence_table() {
        assert!(POW.prec > MUL.prec);
        assert!(MUL.prec > ADD.prec);
        assert!(LAND.prec > LOR.prec);
        assert_eq!(ASN.assoc, Assoc::Right);
        assert!(Token::Operator(&LPRN).is_op(OpKind::LeftParen));
    }
}
