/*
 * instructions.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! The compiled instruction tree.
//!
//! A template compiles to a single [`Instruction::Root`] whose block holds
//! the top-level instructions. Block instructions (sections, predicates,
//! `.if`, and so on) own their consequent and an optional alternative, which
//! is either another branch (`.or`) or the closing `End`.
//!
//! Trees are immutable after compilation and can be shared between threads.

use std::fmt;
use std::sync::Arc;

use crate::arguments::Arguments;
use crate::expr::Expr;
use crate::plugin::{Formatter, Predicate};
use crate::variable::VarName;
use crate::view::StringView;

/// 1-based source location of an instruction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub offset: usize,
}

impl Position {
    pub fn new(line: usize, offset: usize) -> Self {
        Self { line, offset }
    }
}

/// The body of a block instruction.
#[derive(Debug, Default)]
pub struct Block {
    pub consequent: Vec<Instruction>,
    pub alternative: Option<Box<Instruction>>,
}

/// A formatter bound at compile time together with its validated arguments.
#[derive(Clone)]
pub struct FormatterCall {
    pub formatter: Arc<dyn Formatter>,
    pub args: Arguments,
}

impl FormatterCall {
    pub fn new(formatter: Arc<dyn Formatter>, args: Arguments) -> Self {
        Self { formatter, args }
    }

    pub fn identifier(&self) -> &str {
        self.formatter.identifier()
    }
}

impl fmt::Debug for FormatterCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "|{}{}", self.identifier(), self.args.join())
    }
}

/// A predicate bound at compile time together with its validated arguments.
#[derive(Clone)]
pub struct PredicateCall {
    pub predicate: Arc<dyn Predicate>,
    pub args: Arguments,
}

impl PredicateCall {
    pub fn new(predicate: Arc<dyn Predicate>, args: Arguments) -> Self {
        Self { predicate, args }
    }

    pub fn identifier(&self) -> &str {
        self.predicate.identifier()
    }
}

impl fmt::Debug for PredicateCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.identifier(), self.args.join())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

impl BoolOp {
    pub fn parse(text: &str) -> Option<BoolOp> {
        match text {
            "&&" => Some(BoolOp::And),
            "||" => Some(BoolOp::Or),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BoolOp::And => "&&",
            BoolOp::Or => "||",
        }
    }
}

/// Fixed characters emitted by `.newline`, `.space` and `.tab`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralKind {
    Newline,
    Space,
    Tab,
}

impl LiteralKind {
    pub fn text(self) -> &'static str {
        match self {
            LiteralKind::Newline => "\n",
            LiteralKind::Space => " ",
            LiteralKind::Tab => "\t",
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            LiteralKind::Newline => "newline",
            LiteralKind::Space => "space",
            LiteralKind::Tab => "tab",
        }
    }
}

/// One `key=path` pair of a `.ctx` instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub name: String,
    pub var: VarName,
}

#[derive(Debug, Default)]
pub struct RootInst {
    pub block: Block,
}

#[derive(Debug)]
pub struct TextInst {
    pub pos: Position,
    pub view: StringView,
}

#[derive(Debug)]
pub struct VariableInst {
    pub pos: Position,
    pub vars: Vec<VarName>,
    pub formatters: Vec<FormatterCall>,
}

#[derive(Debug)]
pub struct SectionInst {
    pub pos: Position,
    pub var: VarName,
    pub block: Block,
}

#[derive(Debug)]
pub struct RepeatedInst {
    pub pos: Position,
    pub var: VarName,
    pub block: Block,
    pub alternates_with: Option<Box<AlternatesWithInst>>,
}

#[derive(Debug)]
pub struct AlternatesWithInst {
    pub pos: Position,
    pub block: Block,
}

/// A predicate block or one branch of an `.or` chain. A bare `{.or}` has no
/// predicate and always runs.
#[derive(Debug)]
pub struct PredicateInst {
    pub pos: Position,
    pub call: Option<PredicateCall>,
    pub is_or: bool,
    pub block: Block,
}

/// `{.if a && b || c}`: evaluated left to right without precedence.
#[derive(Debug)]
pub struct IfInst {
    pub pos: Position,
    pub vars: Vec<VarName>,
    pub ops: Vec<BoolOp>,
    pub block: Block,
}

#[derive(Debug)]
pub struct IfPredicateInst {
    pub pos: Position,
    pub call: PredicateCall,
    pub block: Block,
}

#[derive(Debug)]
pub struct IfExpressionInst {
    pub pos: Position,
    pub expr: Expr,
    pub block: Block,
}

#[derive(Debug)]
pub struct BindVarInst {
    pub pos: Position,
    pub name: String,
    pub vars: Vec<VarName>,
    pub formatters: Vec<FormatterCall>,
}

#[derive(Debug)]
pub struct CtxVarInst {
    pub pos: Position,
    pub name: String,
    pub bindings: Vec<Binding>,
}

#[derive(Debug)]
pub struct EvalInst {
    pub pos: Position,
    pub expr: Expr,
    /// `{.eval #...}` also prints the compiled form.
    pub debug: bool,
}

#[derive(Debug)]
pub struct IncludeInst {
    pub pos: Position,
    pub name: String,
    pub args: Arguments,
    /// Output is discarded unless the `output` argument is given.
    pub output: bool,
}

#[derive(Debug)]
pub struct InjectInst {
    pub pos: Position,
    pub variable: String,
    pub path: String,
    pub args: Arguments,
}

/// `{.macro name}...{.end}`. The body is a root shared with every frame the
/// macro is registered in.
#[derive(Debug)]
pub struct MacroInst {
    pub pos: Position,
    pub name: String,
    pub body: Arc<Instruction>,
    pub end: Option<Box<Instruction>>,
}

#[derive(Debug)]
pub struct MetaInst {
    pub pos: Position,
    pub left: bool,
}

#[derive(Debug)]
pub struct LiteralInst {
    pub pos: Position,
    pub kind: LiteralKind,
}

#[derive(Debug)]
pub struct CommentInst {
    pub pos: Position,
    pub view: StringView,
    pub multiline: bool,
}

#[derive(Debug)]
pub enum Instruction {
    Root(RootInst),
    Text(TextInst),
    Variable(VariableInst),
    Section(SectionInst),
    Repeated(RepeatedInst),
    AlternatesWith(AlternatesWithInst),
    Predicate(PredicateInst),
    If(IfInst),
    IfPredicate(IfPredicateInst),
    IfExpression(IfExpressionInst),
    BindVar(BindVarInst),
    CtxVar(CtxVarInst),
    Eval(EvalInst),
    Include(IncludeInst),
    Inject(InjectInst),
    Macro(MacroInst),
    Meta(MetaInst),
    Literal(LiteralInst),
    Comment(CommentInst),
    End(Position),
    Eof(Position),
}

impl Instruction {
    pub fn root() -> Self {
        Instruction::Root(RootInst::default())
    }

    pub fn pos(&self) -> Position {
        match self {
            Instruction::Root(_) => Position::default(),
            Instruction::Text(i) => i.pos,
            Instruction::Variable(i) => i.pos,
            Instruction::Section(i) => i.pos,
            Instruction::Repeated(i) => i.pos,
            Instruction::AlternatesWith(i) => i.pos,
            Instruction::Predicate(i) => i.pos,
            Instruction::If(i) => i.pos,
            Instruction::IfPredicate(i) => i.pos,
            Instruction::IfExpression(i) => i.pos,
            Instruction::BindVar(i) => i.pos,
            Instruction::CtxVar(i) => i.pos,
            Instruction::Eval(i) => i.pos,
            Instruction::Include(i) => i.pos,
            Instruction::Inject(i) => i.pos,
            Instruction::Macro(i) => i.pos,
            Instruction::Meta(i) => i.pos,
            Instruction::Literal(i) => i.pos,
            Instruction::Comment(i) => i.pos,
            Instruction::End(pos) | Instruction::Eof(pos) => *pos,
        }
    }

    /// Upper-case kind name used in error messages and stats.
    pub fn type_name(&self) -> &'static str {
        match self {
            Instruction::Root(_) => "ROOT",
            Instruction::Text(_) => "TEXT",
            Instruction::Variable(_) => "VARIABLE",
            Instruction::Section(_) => "SECTION",
            Instruction::Repeated(_) => "REPEATED",
            Instruction::AlternatesWith(_) => "ALTERNATES_WITH",
            Instruction::Predicate(p) if p.is_or => "OR_PREDICATE",
            Instruction::Predicate(_) => "PREDICATE",
            Instruction::If(_) | Instruction::IfPredicate(_) | Instruction::IfExpression(_) => "IF",
            Instruction::BindVar(_) => "BINDVAR",
            Instruction::CtxVar(_) => "CTXVAR",
            Instruction::Eval(_) => "EVAL",
            Instruction::Include(_) => "INCLUDE",
            Instruction::Inject(_) => "INJECT",
            Instruction::Macro(_) => "MACRO",
            Instruction::Meta(m) if m.left => "META_LEFT",
            Instruction::Meta(_) => "META_RIGHT",
            Instruction::Literal(l) => match l.kind {
                LiteralKind::Newline => "NEWLINE",
                LiteralKind::Space => "SPACE",
                LiteralKind::Tab => "TAB",
            },
            Instruction::Comment(_) => "COMMENT",
            Instruction::End(_) => "END",
            Instruction::Eof(_) => "EOF",
        }
    }

    /// The block of a block instruction. Macros keep theirs inside the body.
    pub fn block(&self) -> Option<&Block> {
        match self {
            Instruction::Root(i) => Some(&i.block),
            Instruction::Section(i) => Some(&i.block),
            Instruction::Repeated(i) => Some(&i.block),
            Instruction::AlternatesWith(i) => Some(&i.block),
            Instruction::Predicate(i) => Some(&i.block),
            Instruction::If(i) => Some(&i.block),
            Instruction::IfPredicate(i) => Some(&i.block),
            Instruction::IfExpression(i) => Some(&i.block),
            Instruction::Macro(i) => i.body.block(),
            _ => None,
        }
    }

    pub(crate) fn block_mut(&mut self) -> Option<&mut Block> {
        match self {
            Instruction::Root(i) => Some(&mut i.block),
            Instruction::Section(i) => Some(&mut i.block),
            Instruction::Repeated(i) => Some(&mut i.block),
            Instruction::AlternatesWith(i) => Some(&mut i.block),
            Instruction::Predicate(i) => Some(&mut i.block),
            Instruction::If(i) => Some(&mut i.block),
            Instruction::IfPredicate(i) => Some(&mut i.block),
            Instruction::IfExpression(i) => Some(&mut i.block),
            // The body is uniquely owned until the macro is closed.
            Instruction::Macro(i) => Arc::get_mut(&mut i.body).and_then(|b| b.block_mut()),
            _ => None,
        }
    }

    pub fn consequent(&self) -> &[Instruction] {
        self.block().map(|b| b.consequent.as_slice()).unwrap_or(&[])
    }

    /// The next branch or closing `End`. For macros this is the `End`.
    pub fn alternative(&self) -> Option<&Instruction> {
        match self {
            Instruction::Macro(m) => m.end.as_deref(),
            _ => self.block().and_then(|b| b.alternative.as_deref()),
        }
    }

    pub(crate) fn set_alternative(&mut self, inst: Instruction) {
        match self {
            Instruction::Macro(m) => m.end = Some(Box::new(inst)),
            _ => {
                if let Some(block) = self.block_mut() {
                    block.alternative = Some(Box::new(inst));
                }
            }
        }
    }

    pub fn is_block(&self) -> bool {
        self.block().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Instruction {
        Instruction::Text(TextInst {
            pos: Position::new(1, 1),
            view: StringView::from(s),
        })
    }

    #[test]
    fn test_block_access() {
        let mut section = Instruction::Section(SectionInst {
            pos: Position::new(2, 3),
            var: VarName::parse("a"),
            block: Block::default(),
        });
        if let Some(block) = section.block_mut() {
            block.consequent.push(text("x"));
        }
        section.set_alternative(Instruction::End(Position::new(2, 10)));
        assert_eq!(section.consequent().len(), 1);
        assert_eq!(section.alternative().map(|a| a.type_name()), Some("END"));
        assert_eq!(section.pos(), Position::new(2, 3));
        assert!(section.is_block());
        assert!(!text("y").is_block());
    }

    #[test]
    fn test_macro_body_is_mutable_until_shared() {
        let mut inst = Instruction::Macro(MacroInst {
            pos: Position::new(1, 1),
            name: "m".into(),
            body: Arc::new(Instruction::root()),
            end: None,
        });
        if let Some(block) = inst.block_mut() {
            block.consequent.push(text("body"));
        }
        inst.set_alternative(Instruction::End(Position::new(1, 20)));
        assert_eq!(inst.consequent().len(), 1);
        assert_eq!(inst.alternative().map(|a| a.type_name()), Some("END"));

        let shared = match &inst {
            Instruction::Macro(m) => m.body.clone(),
            _ => unreachable!(),
        };
        assert!(inst.block_mut().is_none());
        drop(shared);
        assert!(inst.block_mut().is_some());
    }

    #[test]
    fn test_type_names() {
        let or = Instruction::Predicate(PredicateInst {
            pos: Position::default(),
            call: None,
            is_or: true,
            block: Block::default(),
        });
        assert_eq!(or.type_name(), "OR_PREDICATE");
        let meta = Instruction::Meta(MetaInst {
            pos: Position::default(),
            left: false,
        });
        assert_eq!(meta.type_name(), "META_RIGHT");
        assert_eq!(BoolOp::parse("||"), Some(BoolOp::Or));
        assert_eq!(BoolOp::And.as_str(), "&&");
    }
}
