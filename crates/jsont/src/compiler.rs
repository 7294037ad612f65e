/*
 * compiler.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Compiling templates and setting up executions.
//!
//! A [`Compiler`] owns the formatter and predicate tables that templates are
//! bound against. Compiled trees are immutable and can be executed any
//! number of times, from any thread, each execution getting its own
//! [`Context`].

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::context::{Context, LoggingHook};
use crate::error::{ErrorInfo, TemplateError, TemplateResult};
use crate::expr::ExprOptions;
use crate::instructions::Instruction;
use crate::limiter::CodeLimiter;
use crate::machine::CodeMachine;
use crate::node::Node;
use crate::plugin::{FormatterTable, PredicateTable};
use crate::plugins::CorePlugins;
use crate::resolver::PartialResolver;
use crate::tokenizer::Tokenizer;

/// Options for a single compilation.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompileOptions {
    validate: bool,
    preprocess: bool,
    expr_options: ExprOptions,
}

impl CompileOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect every syntax error and return a best-effort tree instead of
    /// failing on the first one.
    pub fn validate(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    /// Only parse `{^...}` tags, passing everything else through as text.
    pub fn preprocess(mut self, preprocess: bool) -> Self {
        self.preprocess = preprocess;
        self
    }

    pub fn expr_options(mut self, options: ExprOptions) -> Self {
        self.expr_options = options;
        self
    }

    pub fn is_validate(&self) -> bool {
        self.validate
    }

    pub fn is_preprocess(&self) -> bool {
        self.preprocess
    }
}

/// The result of compiling a template.
#[derive(Debug)]
pub struct CompiledTemplate {
    code: Instruction,
    errors: Vec<ErrorInfo>,
    instruction_count: usize,
}

impl CompiledTemplate {
    /// The root instruction.
    pub fn code(&self) -> &Instruction {
        &self.code
    }

    /// Syntax errors collected in validate mode, in source order.
    pub fn errors(&self) -> &[ErrorInfo] {
        &self.errors
    }

    /// Number of instructions the tokenizer produced.
    pub fn instruction_count(&self) -> usize {
        self.instruction_count
    }

    pub fn into_code(self) -> Instruction {
        self.code
    }

    pub fn into_parts(self) -> (Instruction, Vec<ErrorInfo>) {
        (self.code, self.errors)
    }
}

/// Compiles templates against a set of formatters and predicates.
#[derive(Debug, Clone)]
pub struct Compiler {
    formatters: FormatterTable,
    predicates: PredicateTable,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    /// A compiler with the core formatters and predicates registered.
    pub fn new() -> Self {
        let mut formatters = FormatterTable::new();
        let mut predicates = PredicateTable::new();
        formatters.register(&CorePlugins);
        predicates.register(&CorePlugins);
        Self::with_tables(formatters, predicates)
    }

    /// A compiler with no plugins at all.
    pub fn empty() -> Self {
        Self::with_tables(FormatterTable::new(), PredicateTable::new())
    }

    pub fn with_tables(formatters: FormatterTable, predicates: PredicateTable) -> Self {
        Self {
            formatters,
            predicates,
        }
    }

    pub fn formatters(&self) -> &FormatterTable {
        &self.formatters
    }

    pub fn predicates(&self) -> &PredicateTable {
        &self.predicates
    }

    pub fn formatters_mut(&mut self) -> &mut FormatterTable {
        &mut self.formatters
    }

    pub fn predicates_mut(&mut self) -> &mut PredicateTable {
        &mut self.predicates
    }

    /// Compile `source` into an instruction tree.
    ///
    /// # Returns
    /// In validate mode this only fails on internal errors; syntax errors are
    /// listed in the result. Otherwise the first syntax error is returned as
    /// [`TemplateError::Syntax`].
    pub fn compile(&self, source: &str, options: &CompileOptions) -> TemplateResult<CompiledTemplate> {
        let raw: Arc<str> = Arc::from(source);
        let mut machine = CodeMachine::new();
        if options.validate {
            machine.set_validate();
        }

        let token_errors = {
            let mut tokenizer =
                Tokenizer::new(raw, &mut machine, &self.formatters, &self.predicates);
            if options.validate {
                tokenizer.set_validate();
            }
            if options.preprocess {
                tokenizer.set_preprocess();
            }
            tokenizer.set_expr_options(options.expr_options);
            tokenizer.consume().map_err(TemplateError::Syntax)?;
            tokenizer.take_errors()
        };

        let instruction_count = machine.instruction_count();
        let (code, mut errors) = machine.finish();
        errors.extend(token_errors);
        errors.sort_by_key(|e| (e.line, e.offset));

        tracing::debug!(
            bytes = source.len(),
            instructions = instruction_count,
            errors = errors.len(),
            "compiled template"
        );
        Ok(CompiledTemplate {
            code,
            errors,
            instruction_count,
        })
    }

    /// Start configuring an execution.
    pub fn executor(&self) -> Executor<'_> {
        Executor::new(self)
    }
}

enum Source<'a> {
    None,
    Code(&'a Instruction),
    Template(&'a str),
}

/// Builder for a single execution.
///
/// ```ignore
/// let ctx = compiler
///     .executor()
///     .template("Hello {name}")
///     .json(&data)
///     .safe_execution(true)
///     .execute()?;
/// assert_eq!(ctx.buffer(), "Hello world");
/// ```
pub struct Executor<'a> {
    compiler: &'a Compiler,
    source: Source<'a>,
    json: Option<&'a Value>,
    partials: Option<&'a dyn PartialResolver>,
    injectables: Option<&'a Map<String, Value>>,
    locale: Option<String>,
    safe: bool,
    limiter: Option<&'a dyn CodeLimiter>,
    logging_hook: Option<&'a dyn LoggingHook>,
    enable_include: bool,
    expr_options: ExprOptions,
}

impl<'a> Executor<'a> {
    fn new(compiler: &'a Compiler) -> Self {
        Self {
            compiler,
            source: Source::None,
            json: None,
            partials: None,
            injectables: None,
            locale: None,
            safe: false,
            limiter: None,
            logging_hook: None,
            enable_include: false,
            expr_options: ExprOptions::default(),
        }
    }

    /// Execute an already compiled tree.
    pub fn code(mut self, code: &'a Instruction) -> Self {
        self.source = Source::Code(code);
        self
    }

    /// Compile and execute template source.
    pub fn template(mut self, template: &'a str) -> Self {
        self.source = Source::Template(template);
        self
    }

    pub fn json(mut self, json: &'a Value) -> Self {
        self.json = Some(json);
        self
    }

    pub fn partials(mut self, partials: &'a dyn PartialResolver) -> Self {
        self.partials = Some(partials);
        self
    }

    pub fn injectables(mut self, injectables: &'a Map<String, Value>) -> Self {
        self.injectables = Some(injectables);
        self
    }

    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    pub fn safe_execution(mut self, safe: bool) -> Self {
        self.safe = safe;
        self
    }

    pub fn code_limiter(mut self, limiter: &'a dyn CodeLimiter) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn logging_hook(mut self, hook: &'a dyn LoggingHook) -> Self {
        self.logging_hook = Some(hook);
        self
    }

    pub fn enable_include(mut self, enable: bool) -> Self {
        self.enable_include = enable;
        self
    }

    pub fn expr_options(mut self, options: ExprOptions) -> Self {
        self.expr_options = options;
        self
    }

    /// Run the template. In safe mode template source is compiled in
    /// validate mode and its syntax errors are reported alongside the
    /// execution errors.
    pub fn execute(self) -> TemplateResult<Context<'a>> {
        let node = self.json.map(Node::Borrowed).unwrap_or_default();
        let mut ctx = Context::new(self.compiler, node)
            .with_safe_execution(self.safe)
            .with_enable_include(self.enable_include)
            .with_expr_options(self.expr_options);
        if let Some(locale) = self.locale {
            ctx = ctx.with_locale(locale);
        }
        if let Some(partials) = self.partials {
            ctx = ctx.with_partials(partials);
        }
        if let Some(injectables) = self.injectables {
            ctx = ctx.with_injectables(injectables);
        }
        if let Some(limiter) = self.limiter {
            ctx = ctx.with_code_limiter(limiter);
        }
        if let Some(hook) = self.logging_hook {
            ctx = ctx.with_logging_hook(hook);
        }

        match self.source {
            Source::None => {}
            Source::Code(code) => ctx.run(code)?,
            Source::Template(source) => {
                let options = CompileOptions::new()
                    .validate(self.safe)
                    .expr_options(self.expr_options);
                let (code, errors) = self.compiler.compile(source, &options)?.into_parts();
                for error in errors {
                    ctx.add_error(error);
                }
                ctx.run(&code)?;
            }
        }
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ExecuteErrorType, SyntaxErrorType};
    use crate::repr::repr;
    use serde_json::json;

    #[test]
    fn test_compile_strict_fails_fast() {
        let compiler = Compiler::new();
        let err = compiler
            .compile("{.section a}{.end}{.end}", &CompileOptions::new())
            .unwrap_err();
        assert!(err.info().is_syntax(SyntaxErrorType::MismatchedEnd));
    }

    #[test]
    fn test_validate_collects_in_source_order() {
        let compiler = Compiler::new();
        let template = compiler
            .compile(
                "{.end}\n{.repeated sec a}\n{a|nope}",
                &CompileOptions::new().validate(true),
            )
            .unwrap();
        let codes: Vec<&str> = template.errors().iter().map(|e| e.code()).collect();
        assert_eq!(
            codes,
            vec!["MISMATCHED_END", "MISSING_SECTION_KEYWORD", "FORMATTER_UNKNOWN"]
        );
        let lines: Vec<usize> = template.errors().iter().map(|e| e.line).collect();
        assert_eq!(lines, vec![1, 2, 3]);
    }

    #[test]
    fn test_repr_round_trip() {
        let compiler = Compiler::new();
        let source = "a{.section b}{c|html}{.or}d{.end}{.repeated section e}{@}{.alternates with},{.end}";
        let code = compiler
            .compile(source, &CompileOptions::new())
            .unwrap()
            .into_code();
        assert_eq!(repr(&code, true), source);
    }

    #[test]
    fn test_executor_template() {
        let compiler = Compiler::new();
        let data = json!({"name": "world"});
        let ctx = compiler
            .executor()
            .template("Hello {name}")
            .json(&data)
            .execute()
            .unwrap();
        assert_eq!(ctx.buffer(), "Hello world");
        assert!(ctx.errors().is_empty());
    }

    #[test]
    fn test_executor_code_is_reusable() {
        let compiler = Compiler::new();
        let code = compiler
            .compile("{a}", &CompileOptions::new())
            .unwrap()
            .into_code();
        for value in ["x", "y"] {
            let data = json!({ "a": value });
            let ctx = compiler.executor().code(&code).json(&data).execute().unwrap();
            assert_eq!(ctx.buffer(), value);
        }
    }

    #[test]
    fn test_executor_safe_reports_syntax_errors() {
        let compiler = Compiler::new();
        let ctx = compiler
            .executor()
            .template("a{.end}b")
            .safe_execution(true)
            .execute()
            .unwrap();
        assert_eq!(ctx.buffer(), "ab");
        assert!(ctx.errors()[0].is_syntax(SyntaxErrorType::MismatchedEnd));
    }

    #[test]
    fn test_include_requires_enable() {
        let compiler = Compiler::new();
        let partials = json!({"p": "P"});
        let run = |enable: bool| {
            compiler
                .executor()
                .template("{.include p output}")
                .partials(&partials)
                .enable_include(enable)
                .execute()
                .map(|ctx| ctx.buffer().to_string())
        };
        assert_eq!(run(false).unwrap(), "");
        assert_eq!(run(true).unwrap(), "P");

        let err = compiler
            .executor()
            .template("{.include missing}")
            .enable_include(true)
            .execute()
            .err()
            .unwrap();
        assert!(err.info().is_execute(ExecuteErrorType::IncludePartialMissing));
    }

    #[test]
    fn test_compiler_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Compiler>();
        assert_send_sync::<Instruction>();
    }
}
