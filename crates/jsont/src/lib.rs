/*
 * lib.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! JSON-Template compiler and interpreter.
//!
//! Templates interleave literal text with instructions in braces and are
//! executed against a JSON value. Supported:
//!
//! - Variables with formatter pipelines: `{a.b}`, `{a,b|fmt arg}`
//! - Sections: `{.section a}...{.or}...{.end}`
//! - Iteration: `{.repeated section a}...{.alternates with}...{.end}`
//! - Predicates and `.if`: `{.plural?}`, `{.if a && b}`, `{.if @x > 2}`
//! - Local variables: `{.var @x a|fmt}`, `{.ctx @o k=a}`, `{.eval @x = a * 2}`
//! - Macros, partials and includes: `{.macro m}`, `{a|apply m}`, `{.include m}`
//! - Comments and literals: `{# ...}`, `{## ... ##}`, `{.space}`, `{.meta-left}`
//!
//! # Architecture
//!
//! Compilation is a two stage pipeline. The [`tokenizer`] scans source text
//! with the pattern recognizers in [`patterns`] and emits flat
//! [`Instruction`]s into a [`machine::CodeMachine`], which assembles them
//! into a tree and reports structural errors. Trees are immutable and
//! `Send + Sync`; each execution gets its own [`Context`] holding the frame
//! stack, output buffer, partial cache and error list. The embedded
//! expression language lives in [`expr`].
//!
//! # Example
//!
//! ```ignore
//! use jsont::{CompileOptions, Compiler};
//!
//! let compiler = Compiler::new();
//! let code = compiler.compile("Hi {name|html}!", &CompileOptions::new())?.into_code();
//!
//! let data = serde_json::json!({"name": "<Ann>"});
//! let ctx = compiler.executor().code(&code).json(&data).execute()?;
//! assert_eq!(ctx.buffer(), "Hi &lt;Ann&gt;!");
//! ```

pub mod arguments;
pub mod chars;
pub mod compiler;
pub mod context;
pub mod error;
pub mod expr;
pub mod frame;
pub mod instructions;
mod interpreter;
pub mod limiter;
pub mod machine;
pub mod matcher;
pub mod node;
pub mod numbers;
pub mod patterns;
pub mod plugin;
pub mod plugins;
pub mod recognizers;
pub mod references;
pub mod repr;
pub mod resolver;
pub mod tokenizer;
pub mod variable;
pub mod view;

// Re-export main types at crate root
pub use arguments::Arguments;
pub use compiler::{CompileOptions, CompiledTemplate, Compiler, Executor};
pub use context::{Context, LoggingHook};
pub use error::{
    ArgumentsError, ErrorInfo, ErrorKind, ErrorLevel, ExecuteError, ExecuteErrorType,
    SyntaxErrorType, TemplateError, TemplateResult,
};
pub use expr::{Expr, ExprOptions, ExprScope, ExprValue};
pub use instructions::Instruction;
pub use interpreter::expr_value;
pub use limiter::{CodeLimiter, HardSoftCodeLimiter, LimitKind, NoopCodeLimiter};
pub use node::Node;
pub use plugin::{
    Formatter, FormatterRegistry, FormatterTable, Predicate, PredicateRegistry, PredicateTable,
};
pub use plugins::CorePlugins;
pub use references::{ReferenceScanner, References};
pub use resolver::{MemoryResolver, PartialResolver};
pub use variable::{VarName, Variable, Variables};
