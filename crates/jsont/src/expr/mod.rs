/*
 * mod.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! The embedded expression language used by `{.eval}` and `{.if}`.
//!
//! An expression is a sequence of `;`-separated statements written in a
//! small JavaScript-like syntax:
//!
//! ```text
//! @total = price * qty; @total > 100 && !discounted
//! ```
//!
//! Compilation happens in two steps. [`Expr::new`] tokenizes the source and
//! [`Expr::build`] converts each statement to postfix form. Evaluation runs
//! against an [`ExprScope`] that resolves variables and receives
//! assignments to `@`-prefixed locals.
//!
//! Values are loosely typed: booleans, doubles, strings and null. Objects
//! and arrays cannot take part in an expression.

mod builder;
mod conversions;
mod functions;
mod lexer;
mod reduce;
mod tokens;

use crate::node::Node;
use crate::variable::VarName;

pub use conversions::{string_to_number, to_int32};
pub use tokens::{Assoc, Function, OpKind, Operator, Token};

/// A scalar produced or consumed by an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprValue {
    Bool(bool),
    Number(f64),
    Str(String),
    Null,
}

impl<'a> From<ExprValue> for Node<'a> {
    fn from(value: ExprValue) -> Self {
        match value {
            ExprValue::Bool(b) => Node::bool(b),
            ExprValue::Number(n) => Node::number(n),
            ExprValue::Str(s) => Node::text(s),
            ExprValue::Null => Node::owned(serde_json::Value::Null),
        }
    }
}

/// Where an expression reads variables from and writes assignments to.
pub trait ExprScope {
    /// Resolve a variable. Missing and null both give `Null`; containers give
    /// `None` since they cannot be used as operands.
    fn lookup(&self, name: &VarName) -> Option<ExprValue>;

    /// Bind an `@`-prefixed local.
    fn assign(&mut self, name: &str, value: ExprValue);

    /// Record a problem found while evaluating.
    fn report(&mut self, message: String);
}

/// Resource limits applied while compiling and evaluating. Zero disables a
/// limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExprOptions {
    pub max_tokens: usize,
    pub max_string_len: usize,
}

impl ExprOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_tokens(mut self, max: usize) -> Self {
        self.max_tokens = max;
        self
    }

    pub fn with_max_string_len(mut self, max: usize) -> Self {
        self.max_string_len = max;
        self
    }
}

#[derive(Debug, Clone)]
pub struct Expr {
    raw: String,
    tokens: Vec<Token>,
    statements: Vec<Vec<Token>>,
    errors: Vec<String>,
    max_string_len: usize,
}

impl Expr {
    /// Tokenize `raw`. Call [`Expr::build`] before reducing.
    pub fn new(raw: &str, options: &ExprOptions) -> Self {
        let mut lexer = lexer::Lexer::new(raw, options.max_tokens);
        lexer.tokenize();
        let (tokens, errors) = lexer.finish();
        Self {
            raw: raw.to_string(),
            tokens,
            statements: Vec::new(),
            errors,
            max_string_len: options.max_string_len,
        }
    }

    /// Tokenize and build in one go.
    pub fn compile(raw: &str, options: &ExprOptions) -> Self {
        let mut expr = Self::new(raw, options);
        expr.build();
        expr
    }

    /// Convert the tokens to postfix statements. Does nothing when
    /// tokenizing failed.
    pub fn build(&mut self) {
        if !self.errors.is_empty() {
            return;
        }
        self.statements.clear();
        if let Err(e) = builder::build(&self.tokens, &mut self.statements) {
            self.errors.push(e);
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn statements(&self) -> &[Vec<Token>] {
        &self.statements
    }

    /// Problems found while tokenizing or building.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Postfix form of every statement, e.g. `[[1 2 <add>]]`.
    pub fn debug(&self) -> String {
        tokens::debug_statements(&self.statements)
    }

    /// Evaluate every statement in order; the last one's value is the
    /// result.
    pub fn reduce(&self, scope: &mut dyn ExprScope) -> Option<ExprValue> {
        let mut result = None;
        for statement in &self.statements {
            result = reduce::reduce(statement, scope, self.max_string_len);
        }
        result
    }
}
