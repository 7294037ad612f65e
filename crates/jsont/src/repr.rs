/*
 * repr.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Canonical template source and debug tree rendering of instructions.
//!
//! [`repr`] turns an instruction (optionally with everything below it) back
//! into template source. Compiling the output gives an equivalent tree, so
//! it doubles as a normalizing pretty-printer. [`tree`] prints an indented
//! outline with positions, for debugging the compiler.

use crate::arguments::Arguments;
use crate::instructions::{Block, BoolOp, FormatterCall, Instruction};
use crate::variable::VarName;

/// Template source for `inst`. Without `recurse` only the opening tag of a
/// block is produced.
pub fn repr(inst: &Instruction, recurse: bool) -> String {
    let mut buf = String::new();
    emit(inst, recurse, &mut buf);
    buf
}

pub fn emit(inst: &Instruction, recurse: bool, buf: &mut String) {
    match inst {
        Instruction::Root(_) => {
            if recurse {
                emit_block_of(inst, buf);
            }
        }
        Instruction::Text(t) => buf.push_str(&t.view),
        Instruction::Variable(v) => {
            buf.push('{');
            emit_vars(&v.vars, buf);
            emit_formatters(&v.formatters, buf);
            buf.push('}');
        }
        Instruction::Section(s) => {
            buf.push_str("{.section ");
            buf.push_str(&s.var.to_string());
            buf.push('}');
            if recurse {
                emit_block_of(inst, buf);
            }
        }
        Instruction::Repeated(r) => {
            buf.push_str("{.repeated section ");
            buf.push_str(&r.var.to_string());
            buf.push('}');
            if recurse {
                emit_consequent(&r.block, buf);
                if let Some(alt) = &r.alternates_with {
                    buf.push_str("{.alternates with}");
                    emit_consequent(&alt.block, buf);
                }
                if let Some(alt) = &r.block.alternative {
                    emit(alt, recurse, buf);
                }
            }
        }
        Instruction::AlternatesWith(_) => {
            buf.push_str("{.alternates with}");
            if recurse {
                emit_block_of(inst, buf);
            }
        }
        Instruction::Predicate(p) => {
            buf.push_str("{.");
            match (&p.call, p.is_or) {
                (Some(call), false) => buf.push_str(call.identifier()),
                (Some(call), true) => {
                    buf.push_str("or ");
                    buf.push_str(call.identifier());
                }
                (None, _) => buf.push_str("or"),
            }
            if let Some(call) = &p.call {
                emit_args(&call.args, buf);
            }
            buf.push('}');
            if recurse {
                emit_block_of(inst, buf);
            }
        }
        Instruction::If(i) => {
            buf.push_str("{.if ");
            emit_if_chain(&i.vars, &i.ops, buf);
            buf.push('}');
            if recurse {
                emit_block_of(inst, buf);
            }
        }
        Instruction::IfPredicate(i) => {
            buf.push_str("{.if ");
            buf.push_str(i.call.identifier());
            emit_args(&i.call.args, buf);
            buf.push('}');
            if recurse {
                emit_block_of(inst, buf);
            }
        }
        Instruction::IfExpression(i) => {
            buf.push_str("{.if ");
            buf.push_str(i.expr.raw());
            buf.push('}');
            if recurse {
                emit_block_of(inst, buf);
            }
        }
        Instruction::BindVar(b) => {
            buf.push_str("{.var ");
            buf.push_str(&b.name);
            buf.push(' ');
            emit_vars(&b.vars, buf);
            emit_formatters(&b.formatters, buf);
            buf.push('}');
        }
        Instruction::CtxVar(c) => {
            buf.push_str("{.ctx ");
            buf.push_str(&c.name);
            for binding in &c.bindings {
                buf.push(' ');
                buf.push_str(&binding.name);
                buf.push('=');
                buf.push_str(&binding.var.to_string());
            }
            buf.push('}');
        }
        Instruction::Eval(e) => {
            buf.push_str("{.eval ");
            if e.debug {
                buf.push('#');
            }
            buf.push_str(e.expr.raw());
            buf.push('}');
        }
        Instruction::Include(i) => {
            buf.push_str("{.include");
            emit_args(&i.args, buf);
            buf.push('}');
        }
        Instruction::Inject(i) => {
            buf.push_str("{.inject ");
            buf.push_str(&i.variable);
            buf.push(' ');
            buf.push_str(&i.path);
            emit_args(&i.args, buf);
            buf.push('}');
        }
        Instruction::Macro(m) => {
            buf.push_str("{.macro ");
            buf.push_str(&m.name);
            buf.push('}');
            if recurse {
                emit_block_of(inst, buf);
            }
        }
        Instruction::Meta(m) => {
            buf.push_str(if m.left { "{.meta-left}" } else { "{.meta-right}" });
        }
        Instruction::Literal(l) => {
            buf.push_str("{.");
            buf.push_str(l.kind.keyword());
            buf.push('}');
        }
        Instruction::Comment(c) => {
            buf.push_str(if c.multiline { "{##" } else { "{#" });
            buf.push_str(&c.view);
            buf.push_str(if c.multiline { "##}" } else { "}" });
        }
        Instruction::End(_) => buf.push_str("{.end}"),
        Instruction::Eof(_) => {}
    }
}

fn emit_block_of(inst: &Instruction, buf: &mut String) {
    for child in inst.consequent() {
        emit(child, true, buf);
    }
    if let Some(alt) = inst.alternative() {
        emit(alt, true, buf);
    }
}

fn emit_consequent(block: &Block, buf: &mut String) {
    for child in &block.consequent {
        emit(child, true, buf);
    }
}

fn emit_vars(vars: &[VarName], buf: &mut String) {
    for (i, var) in vars.iter().enumerate() {
        if i > 0 {
            buf.push(',');
        }
        buf.push_str(&var.to_string());
    }
}

fn emit_formatters(formatters: &[FormatterCall], buf: &mut String) {
    for call in formatters {
        buf.push('|');
        buf.push_str(call.identifier());
        emit_args(&call.args, buf);
    }
}

fn emit_args(args: &Arguments, buf: &mut String) {
    buf.push_str(&args.join());
}

pub(crate) fn emit_if_chain(vars: &[VarName], ops: &[BoolOp], buf: &mut String) {
    for (i, var) in vars.iter().enumerate() {
        if i > 0 {
            let op = ops.get(i - 1).copied().unwrap_or(BoolOp::Or);
            buf.push(' ');
            buf.push_str(op.as_str());
            buf.push(' ');
        }
        buf.push_str(&var.to_string());
    }
}

// =======================================================================
// Debug tree
// =======================================================================

const INDENT: usize = 2;

/// Indented outline of the tree rooted at `inst`, one instruction per line.
pub fn tree(inst: &Instruction) -> String {
    let mut buf = String::new();
    emit_tree(inst, 0, &mut buf);
    buf
}

fn emit_tree(inst: &Instruction, depth: usize, buf: &mut String) {
    if let Instruction::Root(root) = inst {
        for child in &root.block.consequent {
            emit_tree(child, depth, buf);
        }
        return;
    }

    emit_header(inst, depth, buf);
    match inst {
        Instruction::Repeated(r) => {
            for child in &r.block.consequent {
                emit_tree(child, depth + INDENT, buf);
            }
            if let Some(alt) = &r.alternates_with {
                indent(depth + INDENT, buf);
                buf.push_str(&format!("ALTERNATES_WITH {{{},{}}}\n", alt.pos.line, alt.pos.offset));
                for child in &alt.block.consequent {
                    emit_tree(child, depth + 2 * INDENT, buf);
                }
            }
            if let Some(alt) = &r.block.alternative {
                emit_tree(alt, depth, buf);
            }
        }
        Instruction::Macro(m) => {
            for child in m.body.consequent() {
                emit_tree(child, depth + INDENT, buf);
            }
            if let Some(end) = &m.end {
                emit_tree(end, depth, buf);
            }
        }
        _ if inst.is_block() => {
            for child in inst.consequent() {
                emit_tree(child, depth + INDENT, buf);
            }
            if let Some(alt) = inst.alternative() {
                emit_tree(alt, depth, buf);
            }
        }
        _ => {}
    }
}

fn emit_header(inst: &Instruction, depth: usize, buf: &mut String) {
    indent(depth, buf);
    let pos = inst.pos();
    buf.push_str(&format!("{} {{{},{}}}", inst.type_name(), pos.line, pos.offset));
    match inst {
        Instruction::BindVar(b) => {
            buf.push_str(&format!(" {} = ", b.name));
            emit_vars(&b.vars, buf);
        }
        Instruction::Comment(c) => {
            buf.push(' ');
            emit_escaped(&c.view, buf);
        }
        Instruction::Text(t) => {
            buf.push(' ');
            emit_escaped(&t.view, buf);
        }
        Instruction::If(i) => {
            buf.push(' ');
            emit_if_chain(&i.vars, &i.ops, buf);
        }
        Instruction::IfExpression(i) => {
            buf.push(' ');
            buf.push_str(&i.expr.debug());
        }
        Instruction::IfPredicate(i) => {
            buf.push(' ');
            buf.push_str(i.call.identifier());
            emit_tree_args(&i.call.args, buf);
        }
        Instruction::Predicate(p) => {
            if let Some(call) = &p.call {
                buf.push(' ');
                buf.push_str(call.identifier());
                emit_tree_args(&call.args, buf);
            }
        }
        Instruction::Section(s) => buf.push_str(&format!(" {}", s.var)),
        Instruction::Repeated(r) => buf.push_str(&format!(" {}", r.var)),
        Instruction::Eval(e) => {
            buf.push(' ');
            buf.push_str(&e.expr.debug());
        }
        Instruction::Macro(m) => buf.push_str(&format!(" {}", m.name)),
        Instruction::Include(i) => buf.push_str(&format!(" {}", i.name)),
        Instruction::Variable(v) => {
            buf.push(' ');
            emit_vars(&v.vars, buf);
            for call in &v.formatters {
                buf.push('\n');
                indent(depth + INDENT, buf);
                buf.push_str("| ");
                buf.push_str(call.identifier());
                emit_tree_args(&call.args, buf);
            }
        }
        _ => {}
    }
    buf.push('\n');
}

fn emit_tree_args(args: &Arguments, buf: &mut String) {
    if args.is_empty() {
        return;
    }
    let delim: String = args.delimiter().escape_debug().collect();
    buf.push_str(&format!(
        " delim='{}' parsed=[{}]",
        delim,
        args.args().join(", ")
    ));
}

/// Length and the first 40 characters, escaped.
fn emit_escaped(text: &str, buf: &mut String) {
    let len = text.chars().count();
    let head: String = text.chars().take(40).collect();
    buf.push_str(&format!("(len={}) \"{}", len, head.escape_debug()));
    if len > 40 {
        buf.push_str(" ...");
    }
    buf.push('"');
}

fn indent(depth: usize, buf: &mut String) {
    buf.extend(std::iter::repeat_n(' ', depth));
}
