/*
 * integration_tests.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Integration tests for jsont using test fixtures.
 */

use std::cell::RefCell;
use std::fs;
use std::path::Path;

use jsont::{
    CodeLimiter, CompileOptions, Compiler, ErrorInfo, ExecuteErrorType, HardSoftCodeLimiter,
    Instruction, LoggingHook, MemoryResolver, NoopCodeLimiter, ReferenceScanner, SyntaxErrorType, TemplateError, repr,
};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

/// Helper to get the path to test fixtures
fn fixture_path(name: &str) -> std::path::PathBuf {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    Path::new(manifest_dir).join("test-fixtures").join(name)
}

fn load_source(name: &str) -> String {
    fs::read_to_string(fixture_path(name))
        .unwrap_or_else(|_| panic!("Failed to load fixture: {}", name))
}

fn load_json(name: &str) -> Value {
    serde_json::from_str(&load_source(name))
        .unwrap_or_else(|_| panic!("Invalid JSON fixture: {}", name))
}

fn load_template(compiler: &Compiler, name: &str) -> Instruction {
    compiler
        .compile(&load_source(name), &CompileOptions::new())
        .unwrap_or_else(|e| panic!("Failed to compile {}: {}", name, e))
        .into_code()
}

/// Execute a fixture template against `data`, strictly.
fn render(name: &str, data: &Value) -> String {
    let compiler = Compiler::new();
    let code = load_template(&compiler, name);
    let ctx = compiler.executor().code(&code).json(data).execute().unwrap();
    ctx.buffer().to_string()
}

// =============================================================================
// Fixtures
// =============================================================================

#[test]
fn test_greeting() {
    let out = render("greeting.jsont", &json!({"name": "<Ann & Bo>"}));
    assert_eq!(out, "Hello, &lt;Ann &amp; Bo&gt;!");
}

#[test]
fn test_missing_variable_renders_empty() {
    assert_eq!(render("greeting.jsont", &json!({})), "Hello, !");
}

#[test]
fn test_roster() {
    let out = render("roster.jsont", &load_json("roster.json"));
    assert_eq!(out, "Count: 2\n1. Ann\n2. Bo");
}

#[test]
fn test_roster_empty_takes_or_branch() {
    assert_eq!(render("roster.jsont", &json!({"people": []})), "Nobody.");
    assert_eq!(render("roster.jsont", &json!({})), "Nobody.");
}

#[test]
fn test_repeated_elements_shadow_outer_names() {
    let out = render("scoping.jsont", &load_json("scoping.json"));
    assert_eq!(out, "outer:a, b, c");
}

#[test]
fn test_repeated_element_without_name_sees_outer() {
    let data = json!({"y": "outer", "items": [{"y": "a"}, {}]});
    assert_eq!(render("scoping.jsont", &data), "outer:a, outer");
}

#[test]
fn test_alternates_with_needs_two_elements() {
    let one = json!({"y": "outer", "items": [{"y": "a"}]});
    assert_eq!(render("scoping.jsont", &one), "outer:a");
    let none = json!({"y": "outer", "items": []});
    assert_eq!(render("scoping.jsont", &none), "outer:");
}

#[test]
fn test_macros() {
    let out = render("macros.jsont", &load_json("roster.json"));
    assert_eq!(out, "<Ann><Bo>");
}

#[test]
fn test_eval_and_if_expression() {
    let template = "order.jsont";
    assert_eq!(render(template, &json!({"price": 30, "qty": 4})), "big: 120");
    assert_eq!(render(template, &json!({"price": 2.5, "qty": 4})), "small: 10");
}

// =============================================================================
// Partials
// =============================================================================

#[test]
fn test_partial_compiled_once() {
    let compiler = Compiler::new();
    let code = load_template(&compiler, "cards.jsont");
    let data = load_json("cards.json");
    let partials = load_json("partials.json");

    let ctx = compiler
        .executor()
        .code(&code)
        .json(&data)
        .partials(&partials)
        .execute()
        .unwrap();
    assert_eq!(ctx.buffer(), "[a][b][c]");
    assert_eq!(ctx.partial_compiles(), 1);
}

#[test]
fn test_partial_from_memory_resolver() {
    let compiler = Compiler::new();
    let partials = MemoryResolver::with_partials([("card", "({label|html})")]);
    let data = json!({"items": [{"label": "<x>"}]});
    let code = load_template(&compiler, "cards.jsont");
    let ctx = compiler
        .executor()
        .code(&code)
        .json(&data)
        .partials(&partials)
        .execute()
        .unwrap();
    assert_eq!(ctx.buffer(), "(&lt;x&gt;)");
}

#[test]
fn test_partial_syntax_error_strict() {
    let compiler = Compiler::new();
    let partials = load_json("partials.json");
    let data = json!({"a": 1});
    let err = compiler
        .executor()
        .template("{a|apply broken}")
        .json(&data)
        .partials(&partials)
        .execute()
        .err()
        .unwrap();
    let TemplateError::Execute(info) = err else {
        panic!("expected an execution error");
    };
    assert!(info.is_execute(ExecuteErrorType::ApplyPartialSyntax));
    assert_eq!(info.name.as_deref(), Some("broken"));
    assert!(info.children[0].is_syntax(SyntaxErrorType::EofInBlock));
}

#[test]
fn test_partial_recursion_safe() {
    let compiler = Compiler::new();
    let partials = load_json("partials.json");
    let data = json!({});
    let ctx = compiler
        .executor()
        .template("x{@|apply self}y")
        .json(&data)
        .partials(&partials)
        .safe_execution(true)
        .execute()
        .unwrap();
    assert_eq!(ctx.buffer(), "xy");
    let codes: Vec<&str> = ctx.errors().iter().map(|e| e.code()).collect();
    assert_eq!(codes, vec!["APPLY_PARTIAL_RECURSION"]);
}

// =============================================================================
// Validation
// =============================================================================

#[test]
fn test_validate_reports_errors_in_source_order() {
    let compiler = Compiler::new();
    let compiled = compiler
        .compile(
            &load_source("invalid.jsont"),
            &CompileOptions::new().validate(true),
        )
        .unwrap();
    let found: Vec<(&str, usize)> = compiled
        .errors()
        .iter()
        .map(|e| (e.code(), e.line))
        .collect();
    assert_eq!(
        found,
        vec![("FORMATTER_UNKNOWN", 2), ("MISMATCHED_END", 4)]
    );
}

#[test]
fn test_strict_compile_error_message() {
    let compiler = Compiler::new();
    let err = compiler
        .compile(&load_source("invalid.jsont"), &CompileOptions::new())
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "SyntaxError FORMATTER_UNKNOWN at line 2 character 5: Formatter 'nope' is unknown."
    );
}

#[test]
fn test_error_info_serializes() {
    let compiler = Compiler::new();
    let err = compiler
        .compile("{.end}", &CompileOptions::new())
        .unwrap_err();
    let value = serde_json::to_value(err.info()).unwrap();
    assert_eq!(value["line"], 1);
    assert_eq!(value["offset"], 1);
    assert_eq!(value["level"], "ERROR");
}

// =============================================================================
// Determinism and sharing
// =============================================================================

#[test]
fn test_recompile_and_rerun_are_identical() {
    let compiler = Compiler::new();
    let source = load_source("roster.jsont");
    let data = load_json("roster.json");
    let run = || {
        let code = compiler
            .compile(&source, &CompileOptions::new())
            .unwrap()
            .into_code();
        let ctx = compiler.executor().code(&code).json(&data).execute().unwrap();
        (ctx.buffer().to_string(), ctx.errors().to_vec())
    };
    assert_eq!(run(), run());
}

#[test]
fn test_tree_shared_across_threads() {
    let compiler = Compiler::new();
    let code = load_template(&compiler, "roster.jsont");
    let outputs: Vec<String> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let compiler = &compiler;
                let code = &code;
                scope.spawn(move || {
                    let data = json!({"people": [{"name": format!("p{}", i)}]});
                    let ctx = compiler.executor().code(code).json(&data).execute().unwrap();
                    ctx.buffer().to_string()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert_eq!(
        outputs,
        vec![
            "Count: 1\n1. p0",
            "Count: 1\n1. p1",
            "Count: 1\n1. p2",
            "Count: 1\n1. p3"
        ]
    );
}

// =============================================================================
// Code limiter
// =============================================================================

#[test]
fn test_limiter_counts_instructions_and_formatters() {
    let compiler = Compiler::new();
    let limiter = NoopCodeLimiter::new();
    let data = json!({"a": ["x", "y", "z"]});
    let ctx = compiler
        .executor()
        .template("{.repeated section a}{@|truncate 3}{.end}")
        .json(&data)
        .code_limiter(&limiter)
        .execute()
        .unwrap();
    assert_eq!(ctx.buffer(), "xyz");
    // root, repeated, then a variable and a formatter call per element
    assert_eq!(ctx.instruction_count(), Some(8));
}

#[test]
fn test_hard_limit_aborts_even_in_safe_mode() {
    let compiler = Compiler::new();
    let limiter = HardSoftCodeLimiter::builder()
        .hard_limit(5)
        .resolution(1)
        .build();
    let data = json!({"a": [1, 2, 3, 4, 5, 6, 7, 8]});
    let err = compiler
        .executor()
        .template("{.repeated section a}{@}{.end}")
        .json(&data)
        .safe_execution(true)
        .code_limiter(&limiter)
        .execute()
        .err()
        .unwrap();
    assert!(err.info().is_execute(ExecuteErrorType::CodeLimitReached));
    assert_eq!(limiter.instruction_count(), 6);
}

// =============================================================================
// Reports and emitters
// =============================================================================

#[test]
fn test_reference_report() {
    let compiler = Compiler::new();
    let code = load_template(&compiler, "roster.jsont");
    let mut scanner = ReferenceScanner::new();
    scanner.extract(&code);
    let report = scanner.references().report();
    assert_eq!(
        report["variables"],
        json!({"people": {"@": {"@index": null, "name": null}}})
    );
    assert_eq!(report["formatters"], json!({"count": 1}));
    assert_eq!(report["instructions"]["REPEATED"], 1);
    assert_eq!(report["instructions"]["ALTERNATES_WITH"], 1);
}

#[test]
fn test_repr_round_trips_fixtures() {
    let compiler = Compiler::new();
    for name in ["roster.jsont", "macros.jsont", "order.jsont", "cards.jsont"] {
        let source = load_source(name);
        let code = load_template(&compiler, name);
        assert_eq!(repr::repr(&code, true), source, "{}", name);
    }
}

#[test]
fn test_tree_output() {
    let compiler = Compiler::new();
    let code = compiler
        .compile("{.section a}{b|html}{.or}x{.end}", &CompileOptions::new())
        .unwrap()
        .into_code();
    insta::assert_snapshot!(repr::tree(&code), @r###"
    SECTION {1,1} a
      VARIABLE {1,13} b
        | html
    OR_PREDICATE {1,21}
      TEXT {1,26} (len=1) "x"
    END {1,27}
    "###);
}

// =============================================================================
// Logging hook
// =============================================================================

#[derive(Default)]
struct RecordingHook {
    seen: RefCell<Vec<ErrorInfo>>,
}

impl LoggingHook for RecordingHook {
    fn log(&self, error: &ErrorInfo) {
        self.seen.borrow_mut().push(error.clone());
    }
}

#[test]
fn test_plugin_failure_is_logged_and_recorded_in_safe_mode() {
    let compiler = Compiler::new();
    let hook = RecordingHook::default();
    let data = json!({"n": 7});
    let ctx = compiler
        .executor()
        .template("a\n {n|mod 0}b")
        .json(&data)
        .safe_execution(true)
        .logging_hook(&hook)
        .execute()
        .unwrap();
    assert_eq!(ctx.buffer(), "a\n b");
    assert_eq!(ctx.errors().len(), 1);
    assert!(ctx.errors()[0].is_execute(ExecuteErrorType::UnexpectedError));

    let seen = hook.seen.borrow();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].repr.as_deref(), Some("{n|mod 0}"));
}

#[test]
fn test_plugin_failure_aborts_in_strict_mode() {
    let compiler = Compiler::new();
    let hook = RecordingHook::default();
    let data = json!({"n": 7});
    let err = compiler
        .executor()
        .template("a\n {n|mod 0}b")
        .json(&data)
        .logging_hook(&hook)
        .execute()
        .err()
        .unwrap();
    let TemplateError::Execute(info) = err else {
        panic!("expected an execution error");
    };
    assert!(info.is_execute(ExecuteErrorType::UnexpectedError));
    assert_eq!(info.name.as_deref(), Some("mod"));
    assert_eq!(info.data.as_deref(), Some("division by zero"));
    assert_eq!(info.repr.as_deref(), Some("{n|mod 0}"));
    assert_eq!((info.line, info.offset), (2, 2));
    assert_eq!(hook.seen.borrow().len(), 1);
}
