/*
 * context.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Execution state for one run of a compiled template.
//!
//! A [`Context`] owns everything that changes while a template executes:
//! the frame stack, the output buffer, collected errors and the cache of
//! compiled partials. It borrows the JSON input and the caller's
//! collaborators (partials, injectables, limiter, logging hook) for `'a`, so
//! values resolved from the input are never copied.
//!
//! The instruction dispatcher lives in `interpreter.rs`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::compiler::{CompileOptions, Compiler};
use crate::error::{ErrorInfo, ExecuteError, ExecuteErrorType, TemplateError};
use crate::expr::ExprOptions;
use crate::frame::Frame;
use crate::instructions::{Instruction, Position};
use crate::limiter::CodeLimiter;
use crate::node::Node;
use crate::resolver::PartialResolver;
use crate::variable::{Segment, VarName};

const DEFAULT_LOCALE: &str = "en-US";

/// Notified of every unexpected failure, in safe mode or not.
pub trait LoggingHook {
    fn log(&self, error: &ErrorInfo);
}

pub struct Context<'a> {
    compiler: &'a Compiler,
    frames: Vec<Frame<'a>>,
    buf: String,
    errors: Vec<ErrorInfo>,

    safe: bool,
    enable_include: bool,
    locale: String,
    expr_options: ExprOptions,
    partials: Option<&'a dyn PartialResolver>,
    injectables: Option<&'a Map<String, Value>>,
    limiter: Option<&'a dyn CodeLimiter>,
    logging_hook: Option<&'a dyn LoggingHook>,

    /// Location of the instruction being executed, for error reports.
    pub(crate) current: Position,
    compiled_partials: HashMap<String, Arc<Instruction>>,
    partial_compiles: usize,
    active_partials: HashSet<String>,
}

impl<'a> Context<'a> {
    /// A context whose root frame holds `node`. Partials are compiled with
    /// `compiler`.
    pub fn new(compiler: &'a Compiler, node: Node<'a>) -> Self {
        Self {
            compiler,
            frames: vec![Frame::new(node)],
            buf: String::new(),
            errors: Vec::new(),
            safe: false,
            enable_include: false,
            locale: DEFAULT_LOCALE.to_string(),
            expr_options: ExprOptions::default(),
            partials: None,
            injectables: None,
            limiter: None,
            logging_hook: None,
            current: Position::default(),
            compiled_partials: HashMap::new(),
            partial_compiles: 0,
            active_partials: HashSet::new(),
        }
    }

    /// Record execution errors instead of aborting on the first one.
    pub fn with_safe_execution(mut self, safe: bool) -> Self {
        self.safe = safe;
        self
    }

    /// Allow `{.include}` to run. Includes are no-ops otherwise.
    pub fn with_enable_include(mut self, enable: bool) -> Self {
        self.enable_include = enable;
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    pub fn with_expr_options(mut self, options: ExprOptions) -> Self {
        self.expr_options = options;
        self
    }

    pub fn with_partials(mut self, partials: &'a dyn PartialResolver) -> Self {
        self.partials = Some(partials);
        self
    }

    pub fn with_injectables(mut self, injectables: &'a Map<String, Value>) -> Self {
        self.injectables = Some(injectables);
        self
    }

    pub fn with_code_limiter(mut self, limiter: &'a dyn CodeLimiter) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn with_logging_hook(mut self, hook: &'a dyn LoggingHook) -> Self {
        self.logging_hook = Some(hook);
        self
    }

    // ===================================================================
    // Accessors
    // ===================================================================

    pub fn compiler(&self) -> &'a Compiler {
        self.compiler
    }

    pub fn safe_execution(&self) -> bool {
        self.safe
    }

    pub fn enable_include(&self) -> bool {
        self.enable_include
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub fn expr_options(&self) -> &ExprOptions {
        &self.expr_options
    }

    /// Output produced so far.
    pub fn buffer(&self) -> &str {
        &self.buf
    }

    pub fn buffer_mut(&mut self) -> &mut String {
        &mut self.buf
    }

    /// Replace the output buffer, returning the previous one.
    pub fn swap_buffer(&mut self, buf: String) -> String {
        std::mem::replace(&mut self.buf, buf)
    }

    pub fn into_output(self) -> String {
        self.buf
    }

    pub fn errors(&self) -> &[ErrorInfo] {
        &self.errors
    }

    pub fn add_error(&mut self, error: ErrorInfo) {
        self.errors.push(error);
    }

    /// Number of partials compiled by this context.
    pub fn partial_compiles(&self) -> usize {
        self.partial_compiles
    }

    pub fn instruction_count(&self) -> Option<usize> {
        self.limiter.map(|l| l.instruction_count())
    }

    pub(crate) fn logging_hook(&self) -> Option<&'a dyn LoggingHook> {
        self.logging_hook
    }

    // ===================================================================
    // Errors
    // ===================================================================

    /// An execution error located at the current instruction.
    pub fn error(&self, code: ExecuteErrorType) -> ErrorInfo {
        ErrorInfo::execute(code).at(self.current.line, self.current.offset)
    }

    /// In safe mode record `error` and carry on, otherwise abort with it.
    pub fn fail(&mut self, error: ErrorInfo) -> Result<(), ExecuteError> {
        if self.safe {
            self.errors.push(error);
            Ok(())
        } else {
            Err(ExecuteError::Code(error))
        }
    }

    /// Count one instruction against the limiter.
    pub(crate) fn check_limit(&self) -> Result<(), ExecuteError> {
        match self.limiter {
            Some(limiter) => limiter.check().map_err(|info| {
                ExecuteError::Code(info.at(self.current.line, self.current.offset))
            }),
            None => Ok(()),
        }
    }

    // ===================================================================
    // Frames
    // ===================================================================

    pub fn frame(&self) -> Option<&Frame<'a>> {
        self.frames.last()
    }

    pub fn frame_mut(&mut self) -> Option<&mut Frame<'a>> {
        self.frames.last_mut()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Drop frames left behind by an aborted instruction.
    pub(crate) fn restore_depth(&mut self, depth: usize) {
        self.frames.truncate(depth.max(1));
    }

    /// The current node.
    pub fn node(&self) -> Node<'a> {
        self.frames
            .last()
            .map(|frame| frame.node().clone())
            .unwrap_or_default()
    }

    pub fn push(&mut self, node: Node<'a>) {
        self.frames.push(Frame::new(node));
    }

    pub fn push_frame(&mut self, frame: Frame<'a>) {
        self.frames.push(frame);
    }

    /// Pop the top frame. The root frame is never removed.
    pub fn pop(&mut self) -> Option<Frame<'a>> {
        if self.frames.len() > 1 {
            self.frames.pop()
        } else {
            None
        }
    }

    /// Bind a local variable in the current frame.
    pub fn set_var(&mut self, name: impl Into<String>, node: Node<'a>) {
        if let Some(frame) = self.frames.last_mut() {
            frame.set_var(name, node);
        }
    }

    pub fn set_macro(&mut self, name: impl Into<String>, body: Arc<Instruction>) {
        if let Some(frame) = self.frames.last_mut() {
            frame.set_macro(name, body);
        }
    }

    fn find_macro(&self, name: &str) -> Option<Arc<Instruction>> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.get_macro(name).cloned())
    }

    pub fn injectable(&self, name: &str) -> Node<'a> {
        match self.injectables.and_then(|map| map.get(name)) {
            Some(value) => Node::Borrowed(value),
            None => Node::Missing,
        }
    }

    // ===================================================================
    // Resolution
    // ===================================================================

    /// Resolve a variable. The first segment is looked up in each frame from
    /// the top down, stopping at a frame that blocks resolution; the rest
    /// walk down from there. Walking through a null yields a placeholder.
    pub fn resolve(&self, name: &VarName) -> Node<'a> {
        let Some(segments) = name.segments() else {
            return self.node();
        };
        let Some((first, rest)) = segments.split_first() else {
            return self.node();
        };
        let mut node = self.lookup_stack(first);
        for segment in rest {
            if node.is_missing() {
                return Node::Missing;
            }
            if node.is_null() {
                return Node::text(format!("[JSONT: Can't resolve '{}'.]", name));
            }
            node = node.path(segment);
        }
        node
    }

    /// Resolve the variable of a section or repeated section. Unlike
    /// [`Context::resolve`] only the current frame is consulted.
    pub fn resolve_section(&self, name: &VarName) -> Node<'a> {
        let Some(frame) = self.frames.last() else {
            return Node::Missing;
        };
        let Some(segments) = name.segments() else {
            return frame.node().clone();
        };
        let Some((first, rest)) = segments.split_first() else {
            return frame.node().clone();
        };
        let mut node = resolve_in(first, frame);
        for segment in rest {
            if node.is_missing() {
                break;
            }
            node = node.path(segment);
        }
        node
    }

    fn lookup_stack(&self, segment: &Segment) -> Node<'a> {
        for frame in self.frames.iter().rev() {
            let node = resolve_in(segment, frame);
            if !node.is_missing() {
                return node;
            }
            if frame.stop_resolution() {
                break;
            }
        }
        Node::Missing
    }

    // ===================================================================
    // Partials
    // ===================================================================

    /// Look up a macro by name, then a partial, compiling and caching the
    /// partial on first use.
    ///
    /// # Returns
    /// `Ok(None)` when neither exists. In strict mode a partial with syntax
    /// errors is returned as `Err`; in safe mode its errors are recorded as
    /// COMPILE_PARTIAL_SYNTAX and the partially compiled tree is used.
    pub fn get_partial(&mut self, name: &str) -> Result<Option<Arc<Instruction>>, ErrorInfo> {
        if let Some(body) = self.find_macro(name) {
            return Ok(Some(body));
        }
        if let Some(code) = self.compiled_partials.get(name) {
            return Ok(Some(code.clone()));
        }
        let Some(source) = self.partials.and_then(|p| p.get_partial(name)) else {
            return Ok(None);
        };

        let options = CompileOptions::new()
            .validate(self.safe)
            .expr_options(self.expr_options);
        self.partial_compiles += 1;
        tracing::debug!(partial = name, "compiling partial");
        let template = match self.compiler.compile(&source, &options) {
            Ok(template) => template,
            Err(TemplateError::Syntax(info)) | Err(TemplateError::Execute(info)) => {
                return Err(info);
            }
        };
        let (code, errors) = template.into_parts();
        if !errors.is_empty() {
            let parent = self
                .error(ExecuteErrorType::CompilePartialSyntax)
                .with_name(name)
                .with_children(errors);
            self.errors.push(parent);
        }
        let code = Arc::new(code);
        self.compiled_partials.insert(name.to_string(), code.clone());
        Ok(Some(code))
    }

    /// Guard against a partial applying itself. Returns false when the
    /// partial is already running and safe mode recorded the error.
    pub fn enter_partial(&mut self, name: &str) -> Result<bool, ExecuteError> {
        if self.active_partials.insert(name.to_string()) {
            return Ok(true);
        }
        let error = self
            .error(ExecuteErrorType::ApplyPartialRecursion)
            .with_name(name);
        self.fail(error)?;
        Ok(false)
    }

    pub fn exit_partial(&mut self, name: &str) {
        self.active_partials.remove(name);
    }

    /// Run `code` against `node` in a fresh frame and return what it wrote.
    ///
    /// A private frame hides every frame below it from variable lookups.
    /// `args` is bound to `@args`. The frame stack and output buffer are
    /// restored whether or not execution succeeds.
    pub fn execute_template(
        &mut self,
        code: &Instruction,
        node: Node<'a>,
        private: bool,
        args: Option<Node<'a>>,
    ) -> Result<String, ExecuteError> {
        let saved = std::mem::take(&mut self.buf);
        let mut frame = Frame::new(node);
        frame.set_stop_resolution(private);
        if let Some(args) = args {
            frame.set_var("@args", args);
        }
        let depth = self.frames.len();
        self.frames.push(frame);
        let result = self.execute(code);
        self.frames.truncate(depth);
        let output = std::mem::replace(&mut self.buf, saved);
        result.map(|()| output)
    }
}

/// Resolve one segment against a single frame. `@index` is the 1-based
/// iteration position and other `@` names are local variables.
fn resolve_in<'a>(segment: &Segment, frame: &Frame<'a>) -> Node<'a> {
    if let Segment::Key(key) = segment
        && key.starts_with('@')
    {
        if key == "@index" {
            return match frame.index() {
                Some(index) => Node::number((index + 1) as f64),
                None => Node::Missing,
            };
        }
        return frame.get_var(key).cloned().unwrap_or_default();
    }
    frame.node().path(segment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::MemoryResolver;
    use serde_json::json;

    fn compiler() -> Compiler {
        Compiler::new()
    }

    #[test]
    fn test_resolve_walks_stack() {
        let compiler = compiler();
        let data = json!({"a": {"b": 1}, "top": "T"});
        let mut ctx = Context::new(&compiler, Node::Borrowed(&data));
        ctx.push(ctx.resolve(&VarName::parse("a")));
        assert_eq!(ctx.resolve(&VarName::parse("b")).as_text(), "1");
        assert_eq!(ctx.resolve(&VarName::parse("top")).as_text(), "T");
        assert!(ctx.resolve_section(&VarName::parse("top")).is_missing());
        assert_eq!(ctx.resolve(&VarName::current()).as_i64(), 0);
    }

    #[test]
    fn test_resolve_through_null() {
        let compiler = compiler();
        let data = json!({"a": null});
        let ctx = Context::new(&compiler, Node::Borrowed(&data));
        let node = ctx.resolve(&VarName::parse("a.b.c"));
        assert_eq!(node.as_text(), "[JSONT: Can't resolve 'a.b.c'.]");
        assert!(ctx.resolve(&VarName::parse("x.y")).is_missing());
    }

    #[test]
    fn test_stop_resolution() {
        let compiler = compiler();
        let data = json!({"outer": 1});
        let mut ctx = Context::new(&compiler, Node::Borrowed(&data));
        let mut frame = Frame::new(Node::owned(json!({"inner": 2})));
        frame.set_stop_resolution(true);
        ctx.push_frame(frame);
        assert!(ctx.resolve(&VarName::parse("outer")).is_missing());
        assert_eq!(ctx.resolve(&VarName::parse("inner")).as_i64(), 2);
    }

    #[test]
    fn test_locals_and_index() {
        let compiler = compiler();
        let mut ctx = Context::new(&compiler, Node::Missing);
        ctx.set_var("@x", Node::text("local"));
        let mut frame = Frame::new(Node::Missing);
        frame.set_index(Some(2));
        ctx.push_frame(frame);
        assert_eq!(ctx.resolve(&VarName::parse("@x")).as_text(), "local");
        assert_eq!(ctx.resolve(&VarName::parse("@index")).as_text(), "3");
        ctx.pop();
        assert!(ctx.resolve(&VarName::parse("@index")).is_missing());
        assert!(ctx.pop().is_none());
    }

    #[test]
    fn test_partial_cache() {
        let compiler = compiler();
        let mut partials = MemoryResolver::new();
        partials.add("p", "{@}");
        let mut ctx = Context::new(&compiler, Node::Missing).with_partials(&partials);
        assert!(ctx.get_partial("p").unwrap().is_some());
        assert!(ctx.get_partial("p").unwrap().is_some());
        assert!(ctx.get_partial("nope").unwrap().is_none());
        assert_eq!(ctx.partial_compiles(), 1);
    }

    #[test]
    fn test_partial_syntax_error() {
        let compiler = compiler();
        let mut partials = MemoryResolver::new();
        partials.add("bad", "{.section}");
        let mut ctx = Context::new(&compiler, Node::Missing).with_partials(&partials);
        assert!(ctx.get_partial("bad").is_err());

        let mut ctx = Context::new(&compiler, Node::Missing)
            .with_partials(&partials)
            .with_safe_execution(true);
        assert!(ctx.get_partial("bad").unwrap().is_some());
        assert_eq!(ctx.errors().len(), 1);
        assert!(ctx.errors()[0].is_execute(ExecuteErrorType::CompilePartialSyntax));
        assert!(!ctx.errors()[0].children.is_empty());
    }

    #[test]
    fn test_partial_recursion_guard() {
        let compiler = compiler();
        let mut ctx = Context::new(&compiler, Node::Missing);
        assert!(ctx.enter_partial("p").unwrap());
        assert!(ctx.enter_partial("p").is_err());
        ctx.exit_partial("p");

        let mut ctx = Context::new(&compiler, Node::Missing).with_safe_execution(true);
        assert!(ctx.enter_partial("p").unwrap());
        assert!(!ctx.enter_partial("p").unwrap());
        assert!(ctx.errors()[0].is_execute(ExecuteErrorType::ApplyPartialRecursion));
    }

    #[test]
    fn test_buffer_swap() {
        let compiler = compiler();
        let mut ctx = Context::new(&compiler, Node::Missing);
        ctx.buffer_mut().push_str("abc");
        let old = ctx.swap_buffer(String::new());
        assert_eq!(old, "abc");
        assert_eq!(ctx.buffer(), "");
    }
}
