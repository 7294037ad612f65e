/*
 * tokenizer.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template tokenizer.
//!
//! Scans the source for `{...}` tags and feeds a [`CodeSink`] with fully
//! formed instructions: text runs, variables with their formatter chains,
//! keywords and predicates. Assembling the instructions into a tree is the
//! sink's job.
//!
//! How far a tag got before failing decides what happens to it. Something
//! that never looked like an instruction (`{ foo}`, `{a b}`) is quietly
//! emitted as text. Something that started out as one (`{.section}` without
//! a variable) is a syntax error: fatal in compile mode, collected in
//! validate mode with the raw tag emitted as text.

use std::sync::Arc;

use crate::arguments::Arguments;
use crate::error::{ErrorInfo, SyntaxErrorType};
use crate::expr::{Expr, ExprOptions};
use crate::instructions::*;
use crate::machine::CodeSink;
use crate::matcher::TokenMatcher;
use crate::patterns::{META_LEFT, META_RIGHT, NEWLINE, POUND};
use crate::plugin::{FormatterTable, Predicate, PredicateTable, UnknownPredicate};
use crate::variable::VarName;
use crate::view::StringView;

/// Maximum number of variables in a `{.if a && b ...}` chain.
pub const IF_VARIABLE_LIMIT: usize = 30;

/// Characters that turn the body of an `.if` into an expression.
const EXPRESSION_CHARS: &[char] = &[
    '<', '>', '=', '!', '+', '*', '/', '%', '(', ')', '\'', '"', '~', '^', ';', ',',
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Keyword {
    AlternatesWith,
    BindVar,
    CtxVar,
    End,
    Eval,
    If,
    Include,
    Inject,
    Macro,
    MetaLeft,
    MetaRight,
    Newline,
    OrPredicate,
    Repeated,
    Section,
    Space,
    Tab,
}

impl Keyword {
    fn lookup(text: &str) -> Option<Keyword> {
        let keyword = match text {
            ".alternates" => Keyword::AlternatesWith,
            ".var" => Keyword::BindVar,
            ".ctx" => Keyword::CtxVar,
            ".end" => Keyword::End,
            ".eval" => Keyword::Eval,
            ".if" => Keyword::If,
            ".include" => Keyword::Include,
            ".inject" => Keyword::Inject,
            ".macro" => Keyword::Macro,
            ".meta-left" => Keyword::MetaLeft,
            ".meta-right" => Keyword::MetaRight,
            ".newline" => Keyword::Newline,
            ".or" => Keyword::OrPredicate,
            ".repeated" => Keyword::Repeated,
            ".section" => Keyword::Section,
            ".space" => Keyword::Space,
            ".tab" => Keyword::Tab,
            _ => return None,
        };
        Some(keyword)
    }

    fn type_name(self) -> &'static str {
        match self {
            Keyword::AlternatesWith => "ALTERNATES_WITH",
            Keyword::BindVar => "BINDVAR",
            Keyword::CtxVar => "CTXVAR",
            Keyword::End => "END",
            Keyword::Eval => "EVAL",
            Keyword::If => "IF",
            Keyword::Include => "INCLUDE",
            Keyword::Inject => "INJECT",
            Keyword::Macro => "MACRO",
            Keyword::MetaLeft => "META_LEFT",
            Keyword::MetaRight => "META_RIGHT",
            Keyword::Newline => "NEWLINE",
            Keyword::OrPredicate => "OR_PREDICATE",
            Keyword::Repeated => "REPEATED",
            Keyword::Section => "SECTION",
            Keyword::Space => "SPACE",
            Keyword::Tab => "TAB",
        }
    }
}

pub struct Tokenizer<'t> {
    raw: Arc<str>,
    sink: &'t mut dyn CodeSink,
    formatters: &'t FormatterTable,
    predicates: &'t PredicateTable,
    expr_options: ExprOptions,
    matcher: TokenMatcher,
    validate: bool,
    preprocess: bool,
    errors: Vec<ErrorInfo>,

    text_line: usize,
    text_offset: usize,
    inst_line: usize,
    inst_offset: usize,
    index: usize,
    save: usize,
    meta_left: Option<usize>,
    line_counter: usize,
    line_index: usize,
}

impl<'t> Tokenizer<'t> {
    pub fn new(
        raw: Arc<str>,
        sink: &'t mut dyn CodeSink,
        formatters: &'t FormatterTable,
        predicates: &'t PredicateTable,
    ) -> Self {
        let matcher = TokenMatcher::new(raw.clone());
        Self {
            raw,
            sink,
            formatters,
            predicates,
            expr_options: ExprOptions::default(),
            matcher,
            validate: false,
            preprocess: false,
            errors: Vec::new(),
            text_line: 0,
            text_offset: 0,
            inst_line: 0,
            inst_offset: 0,
            index: 0,
            save: 0,
            meta_left: None,
            line_counter: 0,
            line_index: 0,
        }
    }

    /// Collect errors instead of stopping at the first one.
    pub fn set_validate(&mut self) {
        self.validate = true;
    }

    /// Parse only `{^...}` tags; everything else becomes text.
    pub fn set_preprocess(&mut self) {
        self.preprocess = true;
    }

    /// Limits for expressions compiled from `.eval` and `.if` tags.
    pub fn set_expr_options(&mut self, options: ExprOptions) {
        self.expr_options = options;
    }

    pub fn errors(&self) -> &[ErrorInfo] {
        &self.errors
    }

    pub fn take_errors(&mut self) -> Vec<ErrorInfo> {
        std::mem::take(&mut self.errors)
    }

    /// Tokenize the whole source, finishing with an `Eof`. Returns whether
    /// no errors were collected.
    pub fn consume(&mut self) -> Result<bool, ErrorInfo> {
        let raw = self.raw.clone();
        let bytes = raw.as_bytes();
        let len = bytes.len();

        loop {
            // Only newlines and braces matter here.
            self.index = bytes
                .get(self.index..)
                .and_then(|rest| memchr::memchr3(NEWLINE, META_LEFT, META_RIGHT, rest))
                .map_or(len, |skip| self.index + skip);

            let Some(&ch) = bytes.get(self.index) else {
                if self.save < len {
                    self.emit_text(self.save, len)?;
                }
                self.inst_line = self.line_counter;
                self.inst_offset = self.column(self.index);
                self.emit(Instruction::Eof(self.inst_pos()))?;
                break;
            };

            match ch {
                NEWLINE => {
                    self.line_counter += 1;
                    self.line_index = self.index + 1;
                }
                META_LEFT => {
                    self.inst_line = self.line_counter;
                    self.inst_offset = self.column(self.index);
                    if bytes.get(self.index + 1) == Some(&POUND)
                        && bytes.get(self.index + 2) == Some(&POUND)
                    {
                        if self.save < self.index {
                            self.emit_text(self.save, self.index)?;
                        }
                        self.meta_left = None;
                        self.index += 3;
                        self.multiline_comment(bytes)?;
                        continue;
                    }
                    // The last `{` before a `}` starts the candidate tag.
                    self.meta_left = Some(self.index);
                }
                META_RIGHT => {
                    match self.meta_left.take() {
                        Some(left) => {
                            if self.save < left {
                                self.emit_text(self.save, left)?;
                            }
                            if !self.match_meta(left, self.index + 1)? {
                                self.emit_text(left, self.index + 1)?;
                            }
                        }
                        // A stray `}` ends a text run.
                        None => self.emit_text(self.save, self.index + 1)?,
                    }
                    self.save = self.index + 1;
                    self.mark_text(self.save);
                }
                _ => {}
            }
            self.index += 1;
        }
        Ok(self.errors.is_empty())
    }

    /// `{## ... ##}`. On EOF the partial comment is still emitted.
    fn multiline_comment(&mut self, bytes: &[u8]) -> Result<(), ErrorInfo> {
        let start = self.index;
        loop {
            let Some(&ch) = bytes.get(self.index) else {
                let comment = self.comment(start, self.index, true);
                self.emit(comment)?;
                self.save = self.index;
                let info = self.text_error(SyntaxErrorType::EofInComment);
                self.fail(info)?;
                return Ok(());
            };
            match ch {
                NEWLINE => {
                    self.line_counter += 1;
                    self.line_index = self.index + 1;
                }
                POUND
                    if bytes.get(self.index + 1) == Some(&POUND)
                        && bytes.get(self.index + 2) == Some(&META_RIGHT) =>
                {
                    let comment = self.comment(start, self.index, true);
                    self.emit(comment)?;
                    self.index += 3;
                    self.save = self.index;
                    self.mark_text(self.index);
                    return Ok(());
                }
                _ => {}
            }
            self.index += 1;
        }
    }

    // ===================================================================
    // Tags
    // ===================================================================

    /// Parse the tag spanning `start..end`, braces included. Returns false
    /// when the tag should be emitted as plain text.
    fn match_meta(&mut self, start: usize, end: usize) -> Result<bool, ErrorInfo> {
        self.matcher.region(start + 1, end - 1);

        if self.matcher.peek(0, b'^') {
            if !self.preprocess {
                return Ok(true);
            }
            self.matcher.seek(1);
        } else if self.preprocess {
            return Ok(false);
        }

        if self.matcher.peek(0, POUND) {
            self.matcher.seek(1);
            let comment = self.comment(self.matcher.pointer(), self.matcher.end(), false);
            self.emit(comment)?;
            return Ok(true);
        }

        if self.parse_keyword()? {
            return Ok(true);
        }
        self.parse_variable()
    }

    fn parse_keyword(&mut self) -> Result<bool, ErrorInfo> {
        if !self.matcher.keyword() {
            return Ok(false);
        }
        let keyword = self.matcher.consume();
        if keyword.last_char() == Some('?') {
            let predicate = self.resolve_predicate(&keyword[1..])?;
            let Some(args) = self.parse_predicate_args(predicate.as_ref())? else {
                return self.emit_invalid();
            };
            let inst = Instruction::Predicate(PredicateInst {
                pos: self.inst_pos(),
                call: Some(PredicateCall::new(predicate, args)),
                is_or: false,
                block: Block::default(),
            });
            self.emit(inst)?;
            return Ok(true);
        }

        match Keyword::lookup(&keyword) {
            Some(kw) => self.parse_instruction(kw),
            None => {
                let info = self.error(SyntaxErrorType::InvalidInstruction).with_data(&keyword);
                self.fail(info)?;
                self.emit_invalid()
            }
        }
    }

    fn parse_instruction(&mut self, kw: Keyword) -> Result<bool, ErrorInfo> {
        let pos = self.inst_pos();
        match kw {
            Keyword::AlternatesWith => {
                if !self.matcher.space() {
                    return self.invalid(SyntaxErrorType::WhitespaceExpected, None);
                }
                self.matcher.consume();
                if !self.matcher.word_with() {
                    return self.invalid(SyntaxErrorType::MissingWithKeyword, None);
                }
                self.matcher.consume();
                if !self.matcher.finished() {
                    return self.invalid(SyntaxErrorType::ExtraChars, Some(kw));
                }
                self.emit(Instruction::AlternatesWith(AlternatesWithInst {
                    pos,
                    block: Block::default(),
                }))?;
                Ok(true)
            }

            Keyword::BindVar => {
                let start = self.matcher.pointer();
                if !self.skip_whitespace()? {
                    return self.emit_invalid();
                }
                if !self.matcher.local_variable() {
                    return self.invalid(SyntaxErrorType::BindvarExpectsName, None);
                }
                let name = self.matcher.consume().to_string();
                if !self.skip_whitespace()? {
                    return self.emit_invalid();
                }
                let Some(vars) = self.parse_variables() else {
                    return self.invalid(SyntaxErrorType::MissingVariableName, None);
                };
                if let Some(formatters) = self.parse_formatters(start)? {
                    self.emit(Instruction::BindVar(BindVarInst {
                        pos,
                        name,
                        vars,
                        formatters,
                    }))?;
                }
                Ok(true)
            }

            Keyword::CtxVar => {
                if !self.skip_whitespace()? {
                    return self.emit_invalid();
                }
                if !self.matcher.local_variable() {
                    return self.invalid(SyntaxErrorType::CtxvarExpectsName, None);
                }
                let name = self.matcher.consume().to_string();
                if !self.skip_whitespace()? {
                    return self.emit_invalid();
                }
                let bindings = self.parse_bindings();
                if bindings.is_empty() {
                    return self.invalid(SyntaxErrorType::CtxvarExpectsBindings, None);
                }
                self.emit(Instruction::CtxVar(CtxVarInst {
                    pos,
                    name,
                    bindings,
                }))?;
                Ok(true)
            }

            Keyword::End
            | Keyword::MetaLeft
            | Keyword::MetaRight
            | Keyword::Newline
            | Keyword::Space
            | Keyword::Tab => {
                if !self.matcher.finished() {
                    return self.invalid(SyntaxErrorType::ExtraChars, Some(kw));
                }
                let inst = match kw {
                    Keyword::End => Instruction::End(pos),
                    Keyword::MetaLeft => Instruction::Meta(MetaInst { pos, left: true }),
                    Keyword::MetaRight => Instruction::Meta(MetaInst { pos, left: false }),
                    Keyword::Newline => Instruction::Literal(LiteralInst {
                        pos,
                        kind: LiteralKind::Newline,
                    }),
                    Keyword::Space => Instruction::Literal(LiteralInst {
                        pos,
                        kind: LiteralKind::Space,
                    }),
                    _ => Instruction::Literal(LiteralInst {
                        pos,
                        kind: LiteralKind::Tab,
                    }),
                };
                self.emit(inst)?;
                Ok(true)
            }

            Keyword::Eval => {
                if self.matcher.finished() {
                    return self.invalid(SyntaxErrorType::EvalExpectsExpression, None);
                }
                if !self.matcher.whitespace() {
                    return self.invalid(SyntaxErrorType::WhitespaceExpected, None);
                }
                self.matcher.consume();
                let body = self.matcher.remainder();
                let (debug, body) = match body.strip_prefix('#') {
                    Some(rest) => (true, rest),
                    None => (false, body.as_str()),
                };
                if body.trim().is_empty() {
                    return self.invalid(SyntaxErrorType::EvalExpectsExpression, None);
                }
                let expr = Expr::compile(body, &self.expr_options);
                self.emit(Instruction::Eval(EvalInst { pos, expr, debug }))?;
                Ok(true)
            }

            Keyword::If => self.parse_if(),

            Keyword::Include => {
                if !self.matcher.arguments() {
                    return self.invalid(SyntaxErrorType::IncludeExpectsName, None);
                }
                let args = Arguments::parse(&self.matcher.consume());
                if args.is_empty() {
                    return self.invalid(SyntaxErrorType::IncludeExpectsName, None);
                }
                let name = args.first().to_string();
                let output = args.args().iter().skip(1).any(|a| a == "output");
                self.emit(Instruction::Include(IncludeInst {
                    pos,
                    name,
                    args,
                    output,
                }))?;
                Ok(true)
            }

            Keyword::Inject => {
                if !self.skip_whitespace()? {
                    return self.emit_invalid();
                }
                if !self.matcher.local_variable() {
                    return self.invalid(SyntaxErrorType::InjectExpectsName, None);
                }
                let variable = self.matcher.consume().to_string();
                if !self.skip_whitespace()? {
                    return self.emit_invalid();
                }
                if !self.matcher.path() {
                    return self.invalid(SyntaxErrorType::InjectExpectsPath, None);
                }
                let path = self.matcher.consume().to_string();
                let args = if self.matcher.arguments() {
                    Arguments::parse(&self.matcher.consume())
                } else {
                    Arguments::default()
                };
                self.emit(Instruction::Inject(InjectInst {
                    pos,
                    variable,
                    path,
                    args,
                }))?;
                Ok(true)
            }

            Keyword::Macro => {
                if !self.skip_whitespace()? {
                    return self.emit_invalid();
                }
                if !self.matcher.path() {
                    let info = self.error(SyntaxErrorType::MacroExpectsName);
                    self.fail(info)?;
                    return self.emit_invalid();
                }
                let name = self.matcher.consume().to_string();
                if !self.matcher.finished() {
                    return self.invalid(SyntaxErrorType::ExtraChars, Some(kw));
                }
                self.emit(Instruction::Macro(MacroInst {
                    pos,
                    name,
                    body: Arc::new(Instruction::root()),
                    end: None,
                }))?;
                Ok(true)
            }

            Keyword::OrPredicate => {
                if self.matcher.space() {
                    self.matcher.consume();
                    if !self.matcher.predicate() {
                        return self.invalid(SyntaxErrorType::OrExpectedPredicate, Some(kw));
                    }
                    let name = self.matcher.consume();
                    let predicate = self.resolve_predicate(&name)?;
                    let Some(args) = self.parse_predicate_args(predicate.as_ref())? else {
                        return self.emit_invalid();
                    };
                    self.emit(Instruction::Predicate(PredicateInst {
                        pos,
                        call: Some(PredicateCall::new(predicate, args)),
                        is_or: true,
                        block: Block::default(),
                    }))?;
                    return Ok(true);
                }
                if !self.matcher.finished() {
                    return self.invalid(SyntaxErrorType::ExtraChars, Some(kw));
                }
                self.emit(Instruction::Predicate(PredicateInst {
                    pos,
                    call: None,
                    is_or: true,
                    block: Block::default(),
                }))?;
                Ok(true)
            }

            Keyword::Repeated | Keyword::Section => self.parse_section(kw),
        }
    }

    /// `.if predicate? args`, `.if a && b || c`, or `.if <expression>`.
    fn parse_if(&mut self) -> Result<bool, ErrorInfo> {
        let pos = self.inst_pos();
        if !self.matcher.whitespace() {
            return self.invalid(SyntaxErrorType::WhitespaceExpected, None);
        }
        self.matcher.consume();

        if self.matcher.predicate() {
            let name = self.matcher.consume();
            let predicate = self.resolve_predicate(&name)?;
            let Some(args) = self.parse_predicate_args(predicate.as_ref())? else {
                return self.emit_invalid();
            };
            self.emit(Instruction::IfPredicate(IfPredicateInst {
                pos,
                call: PredicateCall::new(predicate, args),
                block: Block::default(),
            }))?;
            return Ok(true);
        }

        let rest = self.matcher.remainder();
        if rest.contains(EXPRESSION_CHARS) {
            let expr = Expr::compile(&rest, &self.expr_options);
            if !expr.errors().is_empty() {
                let info = self
                    .error(SyntaxErrorType::IfExpressionInvalid)
                    .with_data(expr.errors().join("; "));
                self.fail(info)?;
                return self.emit_invalid();
            }
            self.emit(Instruction::IfExpression(IfExpressionInst {
                pos,
                expr,
                block: Block::default(),
            }))?;
            return Ok(true);
        }

        let mut vars = Vec::new();
        let mut ops = Vec::new();
        while self.matcher.variable() {
            vars.push(VarName::parse(&self.matcher.consume()));
            if self.matcher.whitespace() {
                self.matcher.consume();
            }
            if vars.len() > IF_VARIABLE_LIMIT {
                let info = self
                    .error(SyntaxErrorType::IfTooManyVars)
                    .with_limit(IF_VARIABLE_LIMIT);
                self.fail(info)?;
                return self.emit_invalid();
            }
            if !self.matcher.operator() {
                break;
            }
            let op = BoolOp::parse(&self.matcher.consume()).unwrap_or(BoolOp::Or);
            ops.push(op);
            if self.matcher.whitespace() {
                self.matcher.consume();
            }
        }

        if !self.matcher.finished() {
            return self.invalid(SyntaxErrorType::IfExpectedVarop, None);
        }
        if vars.is_empty() {
            let info = self.error(SyntaxErrorType::IfEmpty);
            self.fail(info)?;
            return self.emit_invalid();
        }
        if vars.len() != ops.len() + 1 {
            let info = self.error(SyntaxErrorType::IfTooManyOperators);
            self.fail(info)?;
            return self.emit_invalid();
        }
        self.emit(Instruction::If(IfInst {
            pos,
            vars,
            ops,
            block: Block::default(),
        }))?;
        Ok(true)
    }

    /// `.section VAR` or `.repeated section VAR`.
    fn parse_section(&mut self, kw: Keyword) -> Result<bool, ErrorInfo> {
        let pos = self.inst_pos();
        if !self.matcher.whitespace() {
            return self.invalid(SyntaxErrorType::WhitespaceExpected, None);
        }
        self.matcher.consume();

        if kw == Keyword::Repeated {
            if !self.matcher.word_section() {
                return self.invalid(SyntaxErrorType::MissingSectionKeyword, None);
            }
            self.matcher.consume();
            if !self.matcher.whitespace() {
                return self.invalid(SyntaxErrorType::WhitespaceExpected, None);
            }
            self.matcher.consume();
        }

        if !self.matcher.variable() {
            return self.invalid(SyntaxErrorType::VariableExpected, None);
        }
        let var = VarName::parse(&self.matcher.consume());
        if !self.matcher.finished() {
            return self.invalid(SyntaxErrorType::ExtraChars, Some(kw));
        }

        let block = Block::default();
        let inst = if kw == Keyword::Repeated {
            Instruction::Repeated(RepeatedInst {
                pos,
                var,
                block,
                alternates_with: None,
            })
        } else {
            Instruction::Section(SectionInst { pos, var, block })
        };
        self.emit(inst)?;
        Ok(true)
    }

    /// One or more variables followed by an optional formatter chain.
    fn parse_variable(&mut self) -> Result<bool, ErrorInfo> {
        let start = self.matcher.match_start();
        let Some(vars) = self.parse_variables() else {
            return Ok(false);
        };
        if let Some(formatters) = self.parse_formatters(start)? {
            self.emit(Instruction::Variable(VariableInst {
                pos: self.inst_pos(),
                vars,
                formatters,
            }))?;
        }
        Ok(true)
    }

    /// `a`, or `a, b, c` when followed by a pipe.
    fn parse_variables(&mut self) -> Option<Vec<VarName>> {
        if !self.matcher.variable() {
            return None;
        }
        let mut vars = vec![VarName::parse(&self.matcher.consume())];
        let mut require_pipe = false;

        while self.matcher.variables_delimiter() {
            self.matcher.consume();
            if self.matcher.finished() || self.matcher.peek(0, b'|') || !self.matcher.variable() {
                return None;
            }
            vars.push(VarName::parse(&self.matcher.consume()));
            require_pipe = true;
        }

        let pipe = self.matcher.peek(0, b'|');
        // `a || b` is not a variable reference.
        if pipe && self.matcher.peek(1, b'|') {
            return None;
        }
        if require_pipe && !pipe {
            return None;
        }
        Some(vars)
    }

    /// `key=path key=path ...`, stopping at the first malformed pair.
    fn parse_bindings(&mut self) -> Vec<Binding> {
        let mut bindings = Vec::new();
        while self.matcher.word() {
            let name = self.matcher.consume().to_string();
            if !self.matcher.equal_sign() {
                break;
            }
            self.matcher.skip();
            if !self.matcher.variable() {
                break;
            }
            let var = VarName::parse(&self.matcher.consume());
            bindings.push(Binding { name, var });
            if !self.matcher.whitespace() {
                break;
            }
            self.matcher.skip();
        }
        bindings
    }

    /// Parse `|name args|name args...` up to the end of the tag.
    ///
    /// Returns `None` when the chain was malformed; the tag has then already
    /// been emitted as text. `start` anchors the column nudge applied to
    /// formatter errors.
    fn parse_formatters(&mut self, start: usize) -> Result<Option<Vec<FormatterCall>>, ErrorInfo> {
        let mut calls = Vec::new();
        while self.matcher.pipe() {
            self.matcher.consume();

            if !self.matcher.formatter() {
                let nudge = self.span_chars(start, self.matcher.pointer());
                let info = self
                    .error_nudged(SyntaxErrorType::FormatterInvalid, nudge)
                    .with_name(self.matcher.remainder());
                self.fail(info)?;
                self.emit_invalid()?;
                return Ok(None);
            }

            let name = self.matcher.consume();
            let nudge = self.span_chars(start, self.matcher.match_start());
            let Some(formatter) = self.formatters.get(&name) else {
                let info = self
                    .error_nudged(SyntaxErrorType::FormatterUnknown, nudge)
                    .with_name(&name);
                self.fail(info)?;
                self.emit_invalid()?;
                return Ok(None);
            };

            let raw_args = if self.matcher.arguments() {
                Some(self.matcher.consume())
            } else {
                None
            };
            let nudge = self.span_chars(start, self.matcher.match_start());
            if formatter.requires_args() && raw_args.is_none() {
                let info = self
                    .error_nudged(SyntaxErrorType::FormatterNeedsArgs, nudge)
                    .with_data(formatter.identifier());
                self.fail(info)?;
                self.emit_invalid()?;
                return Ok(None);
            }

            let mut args = raw_args.map(|v| Arguments::parse(&v)).unwrap_or_default();
            if let Err(e) = formatter.validate_args(&mut args) {
                let info = self
                    .error_nudged(SyntaxErrorType::FormatterArgsInvalid, nudge)
                    .with_name(formatter.identifier())
                    .with_data(e);
                self.fail(info)?;
                self.emit_invalid()?;
                return Ok(None);
            }
            calls.push(FormatterCall::new(formatter, args));
        }

        if !self.matcher.finished() {
            self.emit_invalid()?;
            return Ok(None);
        }
        Ok(Some(calls))
    }

    fn resolve_predicate(&mut self, name: &str) -> Result<Arc<dyn Predicate>, ErrorInfo> {
        if let Some(predicate) = self.predicates.get(name) {
            return Ok(predicate);
        }
        let info = self.error(SyntaxErrorType::PredicateUnknown).with_data(name);
        self.fail(info)?;
        Ok(Arc::new(UnknownPredicate::new(name)))
    }

    fn parse_predicate_args(
        &mut self,
        predicate: &dyn Predicate,
    ) -> Result<Option<Arguments>, ErrorInfo> {
        let mut args = if self.matcher.predicate_args() {
            Arguments::parse(&self.matcher.consume())
        } else {
            if predicate.requires_args() {
                let info = self
                    .error(SyntaxErrorType::PredicateNeedsArgs)
                    .with_data(predicate.identifier());
                self.fail(info)?;
                return Ok(None);
            }
            Arguments::default()
        };
        if let Err(e) = predicate.validate_args(&mut args) {
            let info = self
                .error(SyntaxErrorType::PredicateArgsInvalid)
                .with_name(predicate.identifier())
                .with_data(e);
            self.fail(info)?;
            return Ok(None);
        }
        Ok(Some(args))
    }

    /// A single space is required after most keywords.
    fn skip_whitespace(&mut self) -> Result<bool, ErrorInfo> {
        let found = self.matcher.space();
        if !found {
            let info = self
                .error(SyntaxErrorType::WhitespaceExpected)
                .with_data(self.matcher.remainder());
            self.fail(info)?;
        }
        self.matcher.consume();
        Ok(found)
    }

    // ===================================================================
    // Emission and errors
    // ===================================================================

    fn emit(&mut self, inst: Instruction) -> Result<(), ErrorInfo> {
        self.sink.accept(inst)
    }

    fn emit_text(&mut self, start: usize, end: usize) -> Result<(), ErrorInfo> {
        let inst = Instruction::Text(TextInst {
            pos: Position::new(self.text_line + 1, self.text_offset + 1),
            view: StringView::new(self.raw.clone(), start, end),
        });
        self.emit(inst)
    }

    /// Emit the whole current tag as text.
    fn emit_invalid(&mut self) -> Result<bool, ErrorInfo> {
        let inst = Instruction::Text(TextInst {
            pos: self.inst_pos(),
            view: StringView::new(
                self.raw.clone(),
                self.matcher.start() - 1,
                self.matcher.end() + 1,
            ),
        });
        self.emit(inst)?;
        Ok(true)
    }

    /// Record `code` with the unparsed remainder as data, then emit the tag
    /// as text.
    fn invalid(&mut self, code: SyntaxErrorType, kw: Option<Keyword>) -> Result<bool, ErrorInfo> {
        let mut info = self.error(code).with_data(self.matcher.remainder());
        if let Some(kw) = kw {
            info = info.with_type(kw.type_name());
        }
        self.fail(info)?;
        self.emit_invalid()
    }

    fn comment(&self, start: usize, end: usize, multiline: bool) -> Instruction {
        Instruction::Comment(CommentInst {
            pos: self.inst_pos(),
            view: StringView::new(self.raw.clone(), start, end),
            multiline,
        })
    }

    fn inst_pos(&self) -> Position {
        Position::new(self.inst_line + 1, self.inst_offset + 1)
    }

    fn mark_text(&mut self, at: usize) {
        self.text_line = self.line_counter;
        self.text_offset = self.column(at);
    }

    /// Character column of byte index `at` on the current line.
    fn column(&self, at: usize) -> usize {
        self.span_chars(self.line_index, at)
    }

    fn span_chars(&self, start: usize, end: usize) -> usize {
        self.raw
            .get(start..end)
            .map(|s| s.chars().count())
            .unwrap_or(0)
    }

    fn error(&self, code: SyntaxErrorType) -> ErrorInfo {
        self.error_nudged(code, 0)
    }

    /// Errors inside a formatter chain point at the formatter.
    fn error_nudged(&self, code: SyntaxErrorType, nudge: usize) -> ErrorInfo {
        ErrorInfo::syntax(code).at(self.inst_line + 1, self.inst_offset + 1 + nudge)
    }

    fn text_error(&self, code: SyntaxErrorType) -> ErrorInfo {
        ErrorInfo::syntax(code).at(self.text_line + 1, self.text_offset + 1)
    }

    fn fail(&mut self, info: ErrorInfo) -> Result<(), ErrorInfo> {
        if !self.validate {
            return Err(info);
        }
        self.errors.push(info);
        Ok(())
    }
}
