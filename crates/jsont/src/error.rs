/*
 * error.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Error types for template compilation and execution.
//!
//! Every problem found while compiling or running a template is described by
//! an [`ErrorInfo`], tagged with either a [`SyntaxErrorType`] or an
//! [`ExecuteErrorType`]. In validate and safe modes these are collected; in the
//! strict modes the first one is returned wrapped in a [`TemplateError`].

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Rendered in place of a message parameter that was never set.
const NULL_PLACEHOLDER: &str = "???";

/// Errors raised while tokenizing and assembling a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyntaxErrorType {
    BindvarExpectsName,
    CtxvarExpectsBindings,
    CtxvarExpectsName,
    DeadCodeBlock,
    EofInBlock,
    EofInComment,
    EvalExpectsExpression,
    ExtraChars,
    FormatterArgsInvalid,
    FormatterInvalid,
    FormatterNeedsArgs,
    FormatterUnknown,
    IfEmpty,
    IfExpectedVarop,
    IfExpressionInvalid,
    IfTooManyOperators,
    IfTooManyVars,
    IncludeExpectsName,
    InjectExpectsName,
    InjectExpectsPath,
    InvalidInstruction,
    MacroExpectsName,
    MismatchedEnd,
    MissingSectionKeyword,
    MissingVariableName,
    MissingWithKeyword,
    NotAllowedAtRoot,
    NotAllowedInBlock,
    OrExpectedPredicate,
    PredicateArgsInvalid,
    PredicateNeedsArgs,
    PredicateUnknown,
    VariableExpected,
    WhitespaceExpected,
}

impl SyntaxErrorType {
    pub fn code(self) -> &'static str {
        use SyntaxErrorType::*;
        match self {
            BindvarExpectsName => "BINDVAR_EXPECTS_NAME",
            CtxvarExpectsBindings => "CTXVAR_EXPECTS_BINDINGS",
            CtxvarExpectsName => "CTXVAR_EXPECTS_NAME",
            DeadCodeBlock => "DEAD_CODE_BLOCK",
            EofInBlock => "EOF_IN_BLOCK",
            EofInComment => "EOF_IN_COMMENT",
            EvalExpectsExpression => "EVAL_EXPECTS_EXPRESSION",
            ExtraChars => "EXTRA_CHARS",
            FormatterArgsInvalid => "FORMATTER_ARGS_INVALID",
            FormatterInvalid => "FORMATTER_INVALID",
            FormatterNeedsArgs => "FORMATTER_NEEDS_ARGS",
            FormatterUnknown => "FORMATTER_UNKNOWN",
            IfEmpty => "IF_EMPTY",
            IfExpectedVarop => "IF_EXPECTED_VAROP",
            IfExpressionInvalid => "IF_EXPRESSION_INVALID",
            IfTooManyOperators => "IF_TOO_MANY_OPERATORS",
            IfTooManyVars => "IF_TOO_MANY_VARS",
            IncludeExpectsName => "INCLUDE_EXPECTS_NAME",
            InjectExpectsName => "INJECT_EXPECTS_NAME",
            InjectExpectsPath => "INJECT_EXPECTS_PATH",
            InvalidInstruction => "INVALID_INSTRUCTION",
            MacroExpectsName => "MACRO_EXPECTS_NAME",
            MismatchedEnd => "MISMATCHED_END",
            MissingSectionKeyword => "MISSING_SECTION_KEYWORD",
            MissingVariableName => "MISSING_VARIABLE_NAME",
            MissingWithKeyword => "MISSING_WITH_KEYWORD",
            NotAllowedAtRoot => "NOT_ALLOWED_AT_ROOT",
            NotAllowedInBlock => "NOT_ALLOWED_IN_BLOCK",
            OrExpectedPredicate => "OR_EXPECTED_PREDICATE",
            PredicateArgsInvalid => "PREDICATE_ARGS_INVALID",
            PredicateNeedsArgs => "PREDICATE_NEEDS_ARGS",
            PredicateUnknown => "PREDICATE_UNKNOWN",
            VariableExpected => "VARIABLE_EXPECTED",
            WhitespaceExpected => "WHITESPACE_EXPECTED",
        }
    }

    fn template(self) -> &'static str {
        use SyntaxErrorType::*;
        match self {
            BindvarExpectsName => "Expected a variable name to bind, found '%(data)s'",
            CtxvarExpectsBindings => "Expected one or more key=variable bindings, found '%(data)s'",
            CtxvarExpectsName => "Expected a variable name for the context, found '%(data)s'",
            DeadCodeBlock => "This %(type)s block will never execute.",
            EofInBlock => "Reached EOF in the middle of %(data)s",
            EofInComment => "Reached EOF in the middle of a multi-line comment",
            EvalExpectsExpression => "EVAL instruction requires an expression.",
            ExtraChars => "Extra characters found after %(type)s instruction: '%(data)s'",
            FormatterArgsInvalid => "Formatter '%(name)s' arguments are invalid: '%(data)s'",
            FormatterInvalid => "Invalid formatter name '%(name)s' found.",
            FormatterNeedsArgs => "Formatter '%(data)s' needs arguments but none were provided.",
            FormatterUnknown => "Formatter '%(name)s' is unknown.",
            IfEmpty => "IF instruction requires at least one variable to test.",
            IfExpectedVarop => "Expected an operator or a variable, found '%(data)s'",
            IfExpressionInvalid => "IF expression is invalid: %(data)s",
            IfTooManyOperators => "Too many operators in IF instruction.",
            IfTooManyVars => "Too many variables in IF instruction. Limit is %(limit)s.",
            IncludeExpectsName => "INCLUDE instruction requires the name of a partial or macro.",
            InjectExpectsName => "Expected a variable name to inject into, found '%(data)s'",
            InjectExpectsPath => "Expected a path to inject, found '%(data)s'",
            InvalidInstruction => "Invalid instruction '%(data)s'",
            MacroExpectsName => "MACRO instruction requires a name.",
            MismatchedEnd => "Mismatched END found at ROOT.",
            MissingSectionKeyword => "Missing 'section' keyword, found '%(data)s'",
            MissingVariableName => "Missing variable name, found '%(data)s'",
            MissingWithKeyword => "Missing 'with' keyword, found '%(data)s'",
            NotAllowedAtRoot => "%(type)s instruction is not allowed at the template root.",
            NotAllowedInBlock => "%(type)s instruction is not allowed inside %(data)s block.",
            OrExpectedPredicate => "Expected a predicate to follow %(type)s, found '%(data)s'",
            PredicateArgsInvalid => "Predicate %(name)s arguments invalid: '%(data)s'",
            PredicateNeedsArgs => "Predicate '.%(data)s' requires arguments but none were provided.",
            PredicateUnknown => "Predicate '%(data)s' is unknown.",
            VariableExpected => "Variable expected, found '%(data)s'",
            WhitespaceExpected => "Whitespace expected, found '%(data)s'",
        }
    }
}

/// Errors raised while executing a compiled template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecuteErrorType {
    ApplyPartialMissing,
    ApplyPartialRecursion,
    ApplyPartialSyntax,
    CodeLimitReached,
    CompilePartialSyntax,
    ExpressionParse,
    ExpressionReduce,
    GeneralError,
    IncludePartialMissing,
    IncludePartialSyntax,
    UnexpectedError,
}

impl ExecuteErrorType {
    pub fn code(self) -> &'static str {
        use ExecuteErrorType::*;
        match self {
            ApplyPartialMissing => "APPLY_PARTIAL_MISSING",
            ApplyPartialRecursion => "APPLY_PARTIAL_RECURSION",
            ApplyPartialSyntax => "APPLY_PARTIAL_SYNTAX",
            CodeLimitReached => "CODE_LIMIT_REACHED",
            CompilePartialSyntax => "COMPILE_PARTIAL_SYNTAX",
            ExpressionParse => "EXPRESSION_PARSE",
            ExpressionReduce => "EXPRESSION_REDUCE",
            GeneralError => "GENERAL_ERROR",
            IncludePartialMissing => "INCLUDE_PARTIAL_MISSING",
            IncludePartialSyntax => "INCLUDE_PARTIAL_SYNTAX",
            UnexpectedError => "UNEXPECTED_ERROR",
        }
    }

    fn template(self) -> &'static str {
        use ExecuteErrorType::*;
        match self {
            ApplyPartialMissing => "Attempt to apply partial '%(name)s' which could not be found.",
            ApplyPartialRecursion => "Recursive application of partial '%(name)s' was refused.",
            ApplyPartialSyntax => "Applying partial '%(name)s' raised an error: %(data)s",
            CodeLimitReached => "A %(name)s code limit was reached %(data)s",
            CompilePartialSyntax => "Compiling partial '%(name)s' raised errors:",
            ExpressionParse => "Expression '%(name)s' could not be parsed: %(data)s",
            ExpressionReduce => "Expression '%(name)s' could not be evaluated: %(data)s",
            GeneralError => "Default error %(name)s: %(data)s",
            IncludePartialMissing => "Attempt to include partial '%(name)s' which could not be found.",
            IncludePartialSyntax => "Including partial '%(name)s' raised an error: %(data)s",
            UnexpectedError => "Unexpected %(name)s when executing %(repr)s: %(data)s",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Syntax(SyntaxErrorType),
    Execute(ExecuteErrorType),
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Syntax(t) => t.code(),
            ErrorKind::Execute(t) => t.code(),
        }
    }

    fn template(self) -> &'static str {
        match self {
            ErrorKind::Syntax(t) => t.template(),
            ErrorKind::Execute(t) => t.template(),
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            ErrorKind::Syntax(_) => "SyntaxError",
            ErrorKind::Execute(_) => "RuntimeError",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ErrorLevel {
    Error,
    Warning,
}

/// A single error with its location and message parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub level: ErrorLevel,
    /// 1-based line of the offending instruction.
    pub line: usize,
    /// 1-based character offset within the line.
    pub offset: usize,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repr: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ErrorInfo>,
}

impl ErrorInfo {
    pub fn new(kind: ErrorKind) -> Self {
        let level = match kind {
            ErrorKind::Syntax(SyntaxErrorType::DeadCodeBlock) => ErrorLevel::Warning,
            _ => ErrorLevel::Error,
        };
        Self {
            kind,
            level,
            line: 0,
            offset: 0,
            type_name: None,
            name: None,
            data: None,
            limit: None,
            repr: None,
            children: Vec::new(),
        }
    }

    pub fn syntax(code: SyntaxErrorType) -> Self {
        Self::new(ErrorKind::Syntax(code))
    }

    pub fn execute(code: ExecuteErrorType) -> Self {
        Self::new(ErrorKind::Execute(code))
    }

    pub fn at(mut self, line: usize, offset: usize) -> Self {
        self.line = line;
        self.offset = offset;
        self
    }

    pub fn with_type(mut self, type_name: impl fmt::Display) -> Self {
        self.type_name = Some(type_name.to_string());
        self
    }

    pub fn with_name(mut self, name: impl fmt::Display) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_data(mut self, data: impl fmt::Display) -> Self {
        self.data = Some(data.to_string());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_repr(mut self, repr: impl Into<String>) -> Self {
        self.repr = Some(repr.into());
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = ErrorInfo>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn is_syntax(&self, code: SyntaxErrorType) -> bool {
        self.kind == ErrorKind::Syntax(code)
    }

    pub fn is_execute(&self, code: ExecuteErrorType) -> bool {
        self.kind == ErrorKind::Execute(code)
    }

    /// "SyntaxError CODE at line L character C"
    pub fn prefix(&self) -> String {
        format!(
            "{} {} at line {} character {}",
            self.kind.prefix(),
            self.code(),
            self.line,
            self.offset
        )
    }

    /// The message without prefix or children.
    pub fn detail(&self) -> String {
        let template = self.kind.template();
        let mut out = String::with_capacity(template.len() + 16);
        let mut rest = template;
        while let Some(open) = rest.find("%(") {
            out.push_str(&rest[..open]);
            let after = &rest[open + 2..];
            let Some(close) = after.find(")s") else {
                rest = &rest[open..];
                break;
            };
            let value = match &after[..close] {
                "type" => self.type_name.clone(),
                "name" => self.name.clone(),
                "data" => self.data.clone(),
                "repr" => self.repr.clone(),
                "limit" => self.limit.map(|l| l.to_string()),
                _ => None,
            };
            out.push_str(value.as_deref().unwrap_or(NULL_PLACEHOLDER));
            rest = &after[close + 2..];
        }
        out.push_str(rest);
        out
    }

    pub fn message(&self) -> String {
        format!("{}: {}", self.prefix(), self.detail())
    }

    /// The message followed by each child's message.
    pub fn message_with_children(&self) -> String {
        let mut buf = self.message();
        if !self.children.is_empty() {
            buf.push_str(", causes follow: ");
            let causes: Vec<String> = self.children.iter().map(|c| c.message()).collect();
            buf.push_str(&causes.join(", "));
        }
        buf
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

/// Errors returned from the public compile and execute entry points.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TemplateError {
    /// The template source could not be compiled.
    #[error("{}", .0.message_with_children())]
    Syntax(ErrorInfo),

    /// Execution was aborted.
    #[error("{}", .0.message_with_children())]
    Execute(ErrorInfo),
}

impl TemplateError {
    pub fn info(&self) -> &ErrorInfo {
        match self {
            TemplateError::Syntax(info) | TemplateError::Execute(info) => info,
        }
    }
}

/// Result type for template operations.
pub type TemplateResult<T> = Result<T, TemplateError>;

/// Failure raised from an instruction or plugin during execution.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecuteError {
    /// A deliberate failure carrying its own error details. Propagates as-is.
    #[error("{0}")]
    Code(ErrorInfo),

    /// A plugin failed for a reason it did not anticipate. The dispatcher
    /// wraps it as an UNEXPECTED_ERROR with the failing instruction attached.
    #[error("{name}: {message}")]
    Plugin { name: String, message: String },
}

impl ExecuteError {
    pub fn plugin(name: impl Into<String>, message: impl Into<String>) -> Self {
        ExecuteError::Plugin {
            name: name.into(),
            message: message.into(),
        }
    }
}

impl From<ErrorInfo> for ExecuteError {
    fn from(info: ErrorInfo) -> Self {
        ExecuteError::Code(info)
    }
}

/// Raised by `validate_args` when a plugin rejects its arguments.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ArgumentsError(pub String);

impl ArgumentsError {
    pub fn new(message: impl Into<String>) -> Self {
        ArgumentsError(message.into())
    }
}
