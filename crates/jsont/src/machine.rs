/*
 * machine.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Assembles the tokenizer's flat instruction stream into a tree.
//!
//! The machine keeps a stack of open blocks with the root at the bottom.
//! Each open block remembers how it hangs off the block below it, and is
//! attached there when it closes. Which instructions are legal next depends
//! on the kind of block on top of the stack.

use crate::error::{ErrorInfo, SyntaxErrorType};
use crate::instructions::Instruction;
use crate::repr;

/// Receives instructions from the tokenizer.
pub trait CodeSink {
    fn accept(&mut self, inst: Instruction) -> Result<(), ErrorInfo>;
}

/// Collects instructions as a flat list.
#[derive(Debug, Default)]
pub struct CodeList {
    instructions: Vec<Instruction>,
}

impl CodeList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn into_instructions(self) -> Vec<Instruction> {
        self.instructions
    }
}

impl CodeSink for CodeList {
    fn accept(&mut self, inst: Instruction) -> Result<(), ErrorInfo> {
        self.instructions.push(inst);
        Ok(())
    }
}

/// How an open block attaches to the block below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Link {
    Child,
    Alternative,
    AlternatesWith,
}

#[derive(Debug)]
struct Open {
    inst: Instruction,
    link: Link,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Root,
    Section,
    Repeated,
    AlternatesWith,
    Predicate,
    OrPredicate,
    If,
    Macro,
}

#[derive(Debug)]
pub struct CodeMachine {
    stack: Vec<Open>,
    validate: bool,
    errors: Vec<ErrorInfo>,
    count: usize,
    complete: bool,
}

impl Default for CodeMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeMachine {
    pub fn new() -> Self {
        Self {
            stack: vec![Open {
                inst: Instruction::root(),
                link: Link::Child,
            }],
            validate: false,
            errors: Vec::new(),
            count: 0,
            complete: false,
        }
    }

    /// Collect errors and recover instead of failing on the first one.
    pub fn set_validate(&mut self) {
        self.validate = true;
    }

    pub fn errors(&self) -> &[ErrorInfo] {
        &self.errors
    }

    /// Number of instructions accepted so far.
    pub fn instruction_count(&self) -> usize {
        self.count
    }

    /// Whether `Eof` has been processed.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// The assembled root and any errors collected along the way. Blocks
    /// still open are closed first, so a partial tree is always returned.
    pub fn finish(mut self) -> (Instruction, Vec<ErrorInfo>) {
        self.collapse();
        let root = self
            .stack
            .pop()
            .map(|open| open.inst)
            .unwrap_or_else(Instruction::root);
        (root, self.errors)
    }

    fn state(&self) -> State {
        match self.stack.last().map(|open| &open.inst) {
            Some(Instruction::Section(_)) => State::Section,
            Some(Instruction::Repeated(_)) => State::Repeated,
            Some(Instruction::AlternatesWith(_)) => State::AlternatesWith,
            Some(Instruction::Predicate(p)) if p.is_or => State::OrPredicate,
            Some(Instruction::Predicate(_)) => State::Predicate,
            Some(
                Instruction::If(_) | Instruction::IfPredicate(_) | Instruction::IfExpression(_),
            ) => State::If,
            Some(Instruction::Macro(_)) => State::Macro,
            _ => State::Root,
        }
    }

    fn top(&mut self) -> Option<&mut Instruction> {
        self.stack.last_mut().map(|open| &mut open.inst)
    }

    fn push(&mut self, inst: Instruction, link: Link) {
        self.stack.push(Open { inst, link });
    }

    fn add_consequent(&mut self, inst: Instruction) {
        if let Some(block) = self.top().and_then(Instruction::block_mut) {
            block.consequent.push(inst);
        }
    }

    fn set_alternative(&mut self, inst: Instruction) {
        if let Some(top) = self.top() {
            top.set_alternative(inst);
        }
    }

    /// Pop the top block and attach it to the one below. The root is never
    /// popped.
    fn pop_one(&mut self) -> Option<Link> {
        if self.stack.len() < 2 {
            return None;
        }
        let open = self.stack.pop()?;
        let parent = self.top()?;
        match open.link {
            Link::Child => {
                if let Some(block) = parent.block_mut() {
                    block.consequent.push(open.inst);
                }
            }
            Link::Alternative => parent.set_alternative(open.inst),
            Link::AlternatesWith => {
                if let (Instruction::Repeated(repeated), Instruction::AlternatesWith(alt)) =
                    (parent, open.inst)
                {
                    repeated.alternates_with = Some(Box::new(alt));
                }
            }
        }
        Some(open.link)
    }

    /// Close the current block. Closing an `.or` branch also closes every
    /// branch before it, up to and including the head of the chain.
    fn close_block(&mut self) {
        while let Some(link) = self.pop_one() {
            if link != Link::Alternative {
                break;
            }
        }
    }

    fn collapse(&mut self) {
        while self.pop_one().is_some() {}
    }

    fn current_info(&self) -> String {
        match self.stack.last() {
            Some(open) => {
                let pos = open.inst.pos();
                format!(
                    "{} started at line {} char {}",
                    repr::repr(&open.inst, false),
                    pos.line,
                    pos.offset
                )
            }
            None => String::new(),
        }
    }

    fn error(code: SyntaxErrorType, inst: &Instruction) -> ErrorInfo {
        let pos = inst.pos();
        ErrorInfo::syntax(code)
            .at(pos.line, pos.offset)
            .with_type(inst.type_name())
    }

    fn fail(&mut self, info: ErrorInfo) -> Result<(), ErrorInfo> {
        if !self.validate {
            return Err(info);
        }
        self.errors.push(info);
        Ok(())
    }

    fn eof(&mut self, state: State, inst: Instruction) -> Result<(), ErrorInfo> {
        if state != State::Root {
            let info =
                Self::error(SyntaxErrorType::EofInBlock, &inst).with_data(self.current_info());
            self.fail(info)?;
            self.collapse();
        }
        self.set_alternative(inst);
        self.complete = true;
        Ok(())
    }

    fn end(&mut self, state: State, inst: Instruction) -> Result<(), ErrorInfo> {
        match state {
            State::Root => {
                let info = Self::error(SyntaxErrorType::MismatchedEnd, &inst);
                self.fail(info)
            }
            State::AlternatesWith => {
                // Closes the enclosing repeated section.
                self.pop_one();
                self.set_alternative(inst);
                self.close_block();
                Ok(())
            }
            _ => {
                self.set_alternative(inst);
                self.close_block();
                Ok(())
            }
        }
    }

    fn or(&mut self, state: State, inst: Instruction) -> Result<(), ErrorInfo> {
        match state {
            State::Root => {
                let info = Self::error(SyntaxErrorType::NotAllowedAtRoot, &inst).with_data("ROOT");
                self.fail(info)
            }
            State::Macro => self.not_allowed(inst),
            State::OrPredicate => {
                let bare = matches!(
                    self.stack.last().map(|open| &open.inst),
                    Some(Instruction::Predicate(p)) if p.call.is_none()
                );
                if bare {
                    let info = Self::error(SyntaxErrorType::DeadCodeBlock, &inst);
                    return self.fail(info);
                }
                self.push(inst, Link::Alternative);
                Ok(())
            }
            State::AlternatesWith => {
                self.set_alternative(Instruction::End(inst.pos()));
                self.pop_one();
                self.push(inst, Link::Alternative);
                Ok(())
            }
            State::Section | State::Repeated | State::Predicate | State::If => {
                self.push(inst, Link::Alternative);
                Ok(())
            }
        }
    }

    fn alternates_with(&mut self, state: State, inst: Instruction) -> Result<(), ErrorInfo> {
        match state {
            State::Root => {
                let info = Self::error(SyntaxErrorType::NotAllowedAtRoot, &inst).with_data("ROOT");
                self.fail(info)
            }
            State::Repeated => {
                self.push(inst, Link::AlternatesWith);
                Ok(())
            }
            _ => self.not_allowed(inst),
        }
    }

    fn not_allowed(&mut self, inst: Instruction) -> Result<(), ErrorInfo> {
        let block = self
            .stack
            .last()
            .map(|open| open.inst.type_name())
            .unwrap_or("ROOT");
        let info = Self::error(SyntaxErrorType::NotAllowedInBlock, &inst).with_data(block);
        self.fail(info)
    }
}

impl CodeSink for CodeMachine {
    fn accept(&mut self, inst: Instruction) -> Result<(), ErrorInfo> {
        self.count += 1;
        if self.complete {
            return Ok(());
        }
        let state = self.state();
        match inst {
            Instruction::Eof(_) => self.eof(state, inst),
            Instruction::End(_) => self.end(state, inst),
            Instruction::Predicate(ref p) if p.is_or => self.or(state, inst),
            Instruction::AlternatesWith(_) => self.alternates_with(state, inst),
            Instruction::Section(_)
            | Instruction::Repeated(_)
            | Instruction::Predicate(_)
            | Instruction::If(_)
            | Instruction::IfPredicate(_)
            | Instruction::IfExpression(_)
            | Instruction::Macro(_) => {
                self.push(inst, Link::Child);
                Ok(())
            }
            _ => {
                self.add_consequent(inst);
                Ok(())
            }
        }
    }
}
