/*
 * formatters.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! The core formatter catalog.

use serde_json::{Map, Value};

use super::escape;
use crate::arguments::Arguments;
use crate::context::Context;
use crate::error::{ArgumentsError, ExecuteError, ExecuteErrorType};
use crate::node::Node;
use crate::numbers::format_number;
use crate::plugin::{Formatter, FormatterTable};
use crate::variable::{Segment, VarName, Variables};

pub(super) fn register(table: &mut FormatterTable) {
    table
        .add(Apply)
        .add(Count)
        .add(Cycle)
        .add(EncodeSpace)
        .add(EncodeUri)
        .add(EncodeUriComponent)
        .add(Format)
        .add(Get)
        .add(Html)
        .add(HtmlAttr("htmlattr"))
        .add(HtmlAttr("htmltag"))
        .add(Iter)
        .add(Json)
        .add(JsonPretty)
        .add(KeyBy)
        .add(Lookup)
        .add(Mod)
        .add(Output)
        .add(Pluralize)
        .add(Prop)
        .add(Raw)
        .add(Round)
        .add(Safe)
        .add(Slugify)
        .add(Smartypants)
        .add(Str)
        .add(Truncate)
        .add(UrlEncode);
}

/// Text of a scalar with `null` treated as empty.
fn eat_null(node: &Node<'_>) -> String {
    if node.is_null() {
        String::new()
    } else {
        node.as_text()
    }
}

/// Compact JSON text of a node. Missing nodes render as nothing.
fn json_text(node: &Node<'_>) -> String {
    match node {
        Node::Missing => String::new(),
        Node::NonFinite(n) => format_number(*n),
        _ => node.to_value().to_string(),
    }
}

/// Walk a dotted path down from `node`.
fn node_at<'a>(node: Node<'a>, name: &VarName) -> Node<'a> {
    let Some(segments) = name.segments() else {
        return node;
    };
    let mut node = node;
    for segment in segments {
        if node.is_missing() {
            break;
        }
        node = node.path(segment);
    }
    node
}

/// Step into `node` using a resolved key: numbers index, strings name a
/// property.
fn step<'a>(node: &Node<'a>, key: &Node<'_>) -> Node<'a> {
    if key.is_number() {
        let index = key.as_i64();
        if index < 0 {
            return Node::Missing;
        }
        node.path(&Segment::Index(index as usize))
    } else if let Some(text) = key.as_str() {
        node.path(&Segment::Key(text.to_string()))
    } else {
        node.clone()
    }
}

// ===================================================================
// Partials
// ===================================================================

/// `{item|apply partial-name [private] [key=value ...]}`
///
/// Executes a partial template against the variable and replaces it with
/// the output. `private` hides the enclosing scopes from the partial;
/// `key=value` pairs are bound as strings on `@args`.
pub struct Apply;

impl Formatter for Apply {
    fn identifier(&self) -> &str {
        "apply"
    }

    fn requires_args(&self) -> bool {
        true
    }

    fn validate_args(&self, args: &mut Arguments) -> Result<(), ArgumentsError> {
        args.at_least(1)
    }

    fn apply<'a>(
        &self,
        ctx: &mut Context<'a>,
        args: &Arguments,
        vars: &mut Variables<'a>,
    ) -> Result<(), ExecuteError> {
        let name = args.first();
        let mut private = false;
        let mut bound = None;
        if args.count() > 1 {
            let mut map = Map::new();
            for arg in &args.args()[1..] {
                if arg == "private" {
                    private = true;
                } else if let Some((key, value)) = arg.split_once('=') {
                    map.insert(key.to_string(), Value::String(value.to_string()));
                }
            }
            bound = Some(Node::owned(Value::Object(map)));
        }

        let code = match ctx.get_partial(name) {
            Ok(Some(code)) => code,
            Ok(None) => {
                let error = ctx
                    .error(ExecuteErrorType::ApplyPartialMissing)
                    .with_name(name);
                ctx.fail(error)?;
                vars.set_first(Node::Missing);
                return Ok(());
            }
            Err(info) => {
                let error = ctx
                    .error(ExecuteErrorType::ApplyPartialSyntax)
                    .with_name(name)
                    .with_data(info.message())
                    .with_children([info]);
                return Err(ExecuteError::Code(error));
            }
        };

        if !ctx.enter_partial(name)? {
            vars.set_first(Node::Missing);
            return Ok(());
        }
        let result = ctx.execute_template(&code, vars.first(), private, bound);
        ctx.exit_partial(name);
        vars.set_first(Node::text(result?));
        Ok(())
    }
}

// ===================================================================
// Counting and cycling
// ===================================================================

/// Members of a container, or characters of a string.
pub struct Count;

impl Formatter for Count {
    fn identifier(&self) -> &str {
        "count"
    }

    fn apply<'a>(
        &self,
        _ctx: &mut Context<'a>,
        _args: &Arguments,
        vars: &mut Variables<'a>,
    ) -> Result<(), ExecuteError> {
        let node = vars.first();
        let count = if node.is_array() || node.is_object() {
            node.size()
        } else if let Some(text) = node.as_str() {
            text.chars().count()
        } else {
            0
        };
        vars.set_first(Node::number(count as f64));
        Ok(())
    }
}

/// Pick an argument by 1-based position, wrapping around.
pub struct Cycle;

impl Formatter for Cycle {
    fn identifier(&self) -> &str {
        "cycle"
    }

    fn requires_args(&self) -> bool {
        true
    }

    fn validate_args(&self, args: &mut Arguments) -> Result<(), ArgumentsError> {
        args.at_least(1)
    }

    fn apply<'a>(
        &self,
        _ctx: &mut Context<'a>,
        args: &Arguments,
        vars: &mut Variables<'a>,
    ) -> Result<(), ExecuteError> {
        let count = args.count() as i64;
        if count == 0 {
            vars.set_first(Node::Missing);
            return Ok(());
        }
        let index = vars.first().as_i64().saturating_sub(1).rem_euclid(count);
        vars.set_first(Node::text(args.get(index as usize).unwrap_or("")));
        Ok(())
    }
}

// ===================================================================
// Encoding and escaping
// ===================================================================

pub struct EncodeSpace;

impl Formatter for EncodeSpace {
    fn identifier(&self) -> &str {
        "encode-space"
    }

    fn apply<'a>(
        &self,
        _ctx: &mut Context<'a>,
        _args: &Arguments,
        vars: &mut Variables<'a>,
    ) -> Result<(), ExecuteError> {
        let text = escape::encode_space(&vars.first().as_text());
        vars.set_first(Node::text(text));
        Ok(())
    }
}

pub struct EncodeUri;

impl Formatter for EncodeUri {
    fn identifier(&self) -> &str {
        "encode-uri"
    }

    fn apply<'a>(
        &self,
        _ctx: &mut Context<'a>,
        _args: &Arguments,
        vars: &mut Variables<'a>,
    ) -> Result<(), ExecuteError> {
        let text = escape::encode_uri(&vars.first().as_text());
        vars.set_first(Node::text(text));
        Ok(())
    }
}

pub struct EncodeUriComponent;

impl Formatter for EncodeUriComponent {
    fn identifier(&self) -> &str {
        "encode-uri-component"
    }

    fn apply<'a>(
        &self,
        _ctx: &mut Context<'a>,
        _args: &Arguments,
        vars: &mut Variables<'a>,
    ) -> Result<(), ExecuteError> {
        let text = escape::encode_uri_component(&vars.first().as_text());
        vars.set_first(Node::text(text));
        Ok(())
    }
}

pub struct Html;

impl Formatter for Html {
    fn identifier(&self) -> &str {
        "html"
    }

    fn apply<'a>(
        &self,
        _ctx: &mut Context<'a>,
        _args: &Arguments,
        vars: &mut Variables<'a>,
    ) -> Result<(), ExecuteError> {
        let mut buf = String::new();
        escape::escape_html(&eat_null(&vars.first()), &mut buf);
        vars.set_first(Node::text(buf));
        Ok(())
    }
}

/// Attribute escaping, registered as both `htmlattr` and `htmltag`.
pub struct HtmlAttr(&'static str);

impl Formatter for HtmlAttr {
    fn identifier(&self) -> &str {
        self.0
    }

    fn apply<'a>(
        &self,
        _ctx: &mut Context<'a>,
        _args: &Arguments,
        vars: &mut Variables<'a>,
    ) -> Result<(), ExecuteError> {
        let mut buf = String::new();
        escape::escape_html_attribute(&eat_null(&vars.first()), &mut buf);
        vars.set_first(Node::text(buf));
        Ok(())
    }
}

pub struct UrlEncode;

impl Formatter for UrlEncode {
    fn identifier(&self) -> &str {
        "url-encode"
    }

    fn apply<'a>(
        &self,
        _ctx: &mut Context<'a>,
        _args: &Arguments,
        vars: &mut Variables<'a>,
    ) -> Result<(), ExecuteError> {
        let text = escape::url_encode(&vars.first().as_text());
        vars.set_first(Node::text(text));
        Ok(())
    }
}

// ===================================================================
// Text
// ===================================================================

/// `{pattern|format a b}` substitutes `{0}`, `{1}`, ... with the resolved
/// argument variables.
pub struct Format;

impl Format {
    fn substitute(pattern: &str, values: &[String], buf: &mut String) {
        // None outside a tag, Some(Some(n)) inside reading digits,
        // Some(None) inside a tag that is being skipped.
        let mut slot: Option<Option<usize>> = None;
        for ch in pattern.chars() {
            match slot {
                Some(None) => {
                    if ch == '}' {
                        slot = None;
                    }
                }
                Some(Some(index)) => match ch {
                    '0'..='9' => {
                        let digit = ch as usize - '0' as usize;
                        slot = Some(Some(index.saturating_mul(10).saturating_add(digit)));
                    }
                    '}' => {
                        if let Some(value) = values.get(index) {
                            buf.push_str(value);
                        }
                        slot = None;
                    }
                    _ => slot = Some(None),
                },
                None if ch == '{' => slot = Some(Some(0)),
                None => buf.push(ch),
            }
        }
    }
}

impl Formatter for Format {
    fn identifier(&self) -> &str {
        "format"
    }

    fn validate_args(&self, args: &mut Arguments) -> Result<(), ArgumentsError> {
        let names: Vec<VarName> = args.args().iter().map(|a| VarName::parse(a)).collect();
        args.set_opaque(names);
        Ok(())
    }

    fn apply<'a>(
        &self,
        ctx: &mut Context<'a>,
        args: &Arguments,
        vars: &mut Variables<'a>,
    ) -> Result<(), ExecuteError> {
        let values: Vec<String> = match args.opaque::<Vec<VarName>>() {
            Some(names) => names.iter().map(|n| ctx.resolve(n).as_text()).collect(),
            None => args
                .args()
                .iter()
                .map(|a| ctx.resolve(&VarName::parse(a)).as_text())
                .collect(),
        };
        let mut buf = String::new();
        Self::substitute(&vars.first().as_text(), &values, &mut buf);
        vars.set_first(Node::text(buf));
        Ok(())
    }
}

/// The fixed arguments joined by spaces, ignoring the variable.
pub struct Output;

impl Formatter for Output {
    fn identifier(&self) -> &str {
        "output"
    }

    fn apply<'a>(
        &self,
        _ctx: &mut Context<'a>,
        args: &Arguments,
        vars: &mut Variables<'a>,
    ) -> Result<(), ExecuteError> {
        vars.set_first(Node::text(args.args().join(" ")));
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct PluralizeArgs {
    singular: String,
    plural: String,
}

impl Default for PluralizeArgs {
    fn default() -> Self {
        Self {
            singular: String::new(),
            plural: "s".to_string(),
        }
    }
}

/// `{n|pluralize}` emits `s` unless n is 1; `{n|pluralize y ies}` picks
/// between the two.
pub struct Pluralize;

impl Formatter for Pluralize {
    fn identifier(&self) -> &str {
        "pluralize"
    }

    fn validate_args(&self, args: &mut Arguments) -> Result<(), ArgumentsError> {
        args.between(0, 2)?;
        let mut parsed = PluralizeArgs::default();
        match args.count() {
            1 => parsed.plural = args.first().to_string(),
            2 => {
                parsed.singular = args.first().to_string();
                parsed.plural = args.get(1).unwrap_or_default().to_string();
            }
            _ => {}
        }
        args.set_opaque(parsed);
        Ok(())
    }

    fn apply<'a>(
        &self,
        _ctx: &mut Context<'a>,
        args: &Arguments,
        vars: &mut Variables<'a>,
    ) -> Result<(), ExecuteError> {
        let fallback = PluralizeArgs::default();
        let parsed = args.opaque::<PluralizeArgs>().unwrap_or(&fallback);
        let text = if vars.first().as_i64() == 1 {
            &parsed.singular
        } else {
            &parsed.plural
        };
        vars.set_first(Node::text(text.clone()));
        Ok(())
    }
}

pub struct Safe;

impl Formatter for Safe {
    fn identifier(&self) -> &str {
        "safe"
    }

    fn apply<'a>(
        &self,
        _ctx: &mut Context<'a>,
        _args: &Arguments,
        vars: &mut Variables<'a>,
    ) -> Result<(), ExecuteError> {
        let node = vars.first();
        if node.is_truthy() {
            vars.set_first(Node::text(escape::strip_tags(&node.as_text())));
        }
        Ok(())
    }
}

pub struct Slugify;

impl Formatter for Slugify {
    fn identifier(&self) -> &str {
        "slugify"
    }

    fn apply<'a>(
        &self,
        _ctx: &mut Context<'a>,
        _args: &Arguments,
        vars: &mut Variables<'a>,
    ) -> Result<(), ExecuteError> {
        let text = escape::slugify(&eat_null(&vars.first()));
        vars.set_first(Node::text(text));
        Ok(())
    }
}

pub struct Smartypants;

impl Formatter for Smartypants {
    fn identifier(&self) -> &str {
        "smartypants"
    }

    fn apply<'a>(
        &self,
        _ctx: &mut Context<'a>,
        _args: &Arguments,
        vars: &mut Variables<'a>,
    ) -> Result<(), ExecuteError> {
        let text = escape::smartypants(&eat_null(&vars.first()));
        vars.set_first(Node::text(text));
        Ok(())
    }
}

pub struct Str;

impl Formatter for Str {
    fn identifier(&self) -> &str {
        "str"
    }

    fn apply<'a>(
        &self,
        _ctx: &mut Context<'a>,
        _args: &Arguments,
        vars: &mut Variables<'a>,
    ) -> Result<(), ExecuteError> {
        let text = eat_null(&vars.first());
        vars.set_first(Node::text(text));
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct TruncateArgs {
    max_len: usize,
    ellipses: String,
}

impl Default for TruncateArgs {
    fn default() -> Self {
        Self {
            max_len: 100,
            ellipses: "...".to_string(),
        }
    }
}

/// `{text|truncate 50 ...}` cuts at a word boundary.
pub struct Truncate;

impl Formatter for Truncate {
    fn identifier(&self) -> &str {
        "truncate"
    }

    fn validate_args(&self, args: &mut Arguments) -> Result<(), ArgumentsError> {
        let mut parsed = TruncateArgs::default();
        if let Some(raw) = args.get(0) {
            let len: i32 = raw
                .parse()
                .map_err(|_| ArgumentsError::new(format!("bad value for length '{}'", raw)))?;
            parsed.max_len = len.max(0) as usize;
        }
        if let Some(ellipses) = args.get(1) {
            parsed.ellipses = ellipses.to_string();
        }
        args.set_opaque(parsed);
        Ok(())
    }

    fn apply<'a>(
        &self,
        _ctx: &mut Context<'a>,
        args: &Arguments,
        vars: &mut Variables<'a>,
    ) -> Result<(), ExecuteError> {
        let fallback = TruncateArgs::default();
        let parsed = args.opaque::<TruncateArgs>().unwrap_or(&fallback);
        let text = escape::truncate(&vars.first().as_text(), parsed.max_len, &parsed.ellipses);
        vars.set_first(Node::text(text));
        Ok(())
    }
}

// ===================================================================
// JSON
// ===================================================================

pub struct Json;

impl Formatter for Json {
    fn identifier(&self) -> &str {
        "json"
    }

    fn apply<'a>(
        &self,
        _ctx: &mut Context<'a>,
        _args: &Arguments,
        vars: &mut Variables<'a>,
    ) -> Result<(), ExecuteError> {
        let text = escape::escape_script_tags(&json_text(&vars.first()));
        vars.set_first(Node::text(text));
        Ok(())
    }
}

pub struct JsonPretty;

impl Formatter for JsonPretty {
    fn identifier(&self) -> &str {
        "json-pretty"
    }

    fn apply<'a>(
        &self,
        ctx: &mut Context<'a>,
        _args: &Arguments,
        vars: &mut Variables<'a>,
    ) -> Result<(), ExecuteError> {
        match serde_json::to_string_pretty(&vars.first().to_value()) {
            Ok(text) => vars.set_first(Node::text(escape::escape_script_tags(&text))),
            Err(err) => {
                let error = ctx
                    .error(ExecuteErrorType::GeneralError)
                    .with_data(err);
                ctx.fail(error)?;
                vars.set_first(Node::Missing);
            }
        }
        Ok(())
    }
}

/// JSON text without script-tag escaping.
pub struct Raw;

impl Formatter for Raw {
    fn identifier(&self) -> &str {
        "raw"
    }

    fn apply<'a>(
        &self,
        _ctx: &mut Context<'a>,
        _args: &Arguments,
        vars: &mut Variables<'a>,
    ) -> Result<(), ExecuteError> {
        let text = json_text(&vars.first());
        vars.set_first(Node::text(text));
        Ok(())
    }
}

// ===================================================================
// Navigation
// ===================================================================

/// `{obj|get a b}` steps into the variable using the *values* of `a` and
/// `b`. An array value is treated as a whole path.
pub struct Get;

impl Formatter for Get {
    fn identifier(&self) -> &str {
        "get"
    }

    fn apply<'a>(
        &self,
        ctx: &mut Context<'a>,
        args: &Arguments,
        vars: &mut Variables<'a>,
    ) -> Result<(), ExecuteError> {
        let mut node = vars.first();
        for arg in args.args() {
            let key = ctx.resolve(&VarName::parse(arg));
            if key.is_missing() {
                node = Node::Missing;
                break;
            }
            if key.is_array() {
                for i in 0..key.size() {
                    let elem = key.element(i);
                    if elem.is_number() || elem.as_str().is_some() {
                        node = step(&node, &elem);
                    }
                }
            } else {
                node = step(&node, &key);
            }
            if node.is_missing() {
                break;
            }
        }
        vars.set_first(node);
        Ok(())
    }
}

/// The 1-based index of the innermost repeated section.
pub struct Iter;

impl Formatter for Iter {
    fn identifier(&self) -> &str {
        "iter"
    }

    fn apply<'a>(
        &self,
        ctx: &mut Context<'a>,
        _args: &Arguments,
        vars: &mut Variables<'a>,
    ) -> Result<(), ExecuteError> {
        let index = ctx.resolve(&VarName::parse("@index")).as_text();
        vars.set_first(Node::text(index));
        Ok(())
    }
}

/// Turn an array of objects into an object keyed by the value at a path.
pub struct KeyBy;

impl Formatter for KeyBy {
    fn identifier(&self) -> &str {
        "key-by"
    }

    fn requires_args(&self) -> bool {
        true
    }

    fn validate_args(&self, args: &mut Arguments) -> Result<(), ArgumentsError> {
        args.exactly(1)
    }

    fn apply<'a>(
        &self,
        _ctx: &mut Context<'a>,
        args: &Arguments,
        vars: &mut Variables<'a>,
    ) -> Result<(), ExecuteError> {
        let node = vars.first();
        let path = args.first();
        let mut map = Map::new();
        if node.is_array() && !path.is_empty() {
            let name = VarName::parse(path);
            for i in 0..node.size() {
                let item = node.element(i);
                let key = node_at(item.clone(), &name);
                if !key.is_missing() {
                    map.insert(key.as_text(), item.to_value());
                }
            }
        }
        vars.set_first(Node::owned(Value::Object(map)));
        Ok(())
    }
}

/// `{@|lookup field}` resolves `field`, then resolves its text as a
/// variable name.
pub struct Lookup;

impl Formatter for Lookup {
    fn identifier(&self) -> &str {
        "lookup"
    }

    fn requires_args(&self) -> bool {
        true
    }

    fn validate_args(&self, args: &mut Arguments) -> Result<(), ArgumentsError> {
        args.exactly(1)
    }

    fn apply<'a>(
        &self,
        ctx: &mut Context<'a>,
        args: &Arguments,
        vars: &mut Variables<'a>,
    ) -> Result<(), ExecuteError> {
        let field = ctx.resolve(&VarName::parse(args.first())).as_text();
        let result = ctx.resolve(&VarName::parse(&field));
        vars.set_first(result);
        Ok(())
    }
}

/// Step into the variable by literal paths.
pub struct Prop;

impl Formatter for Prop {
    fn identifier(&self) -> &str {
        "prop"
    }

    fn apply<'a>(
        &self,
        _ctx: &mut Context<'a>,
        args: &Arguments,
        vars: &mut Variables<'a>,
    ) -> Result<(), ExecuteError> {
        let mut node = vars.first();
        for arg in args.args() {
            node = node_at(node, &VarName::parse(arg));
            if node.is_missing() {
                break;
            }
        }
        vars.set_first(node);
        Ok(())
    }
}

// ===================================================================
// Numbers
// ===================================================================

/// Integer remainder, dividing by 2 unless an argument says otherwise.
pub struct Mod;

impl Formatter for Mod {
    fn identifier(&self) -> &str {
        "mod"
    }

    fn apply<'a>(
        &self,
        _ctx: &mut Context<'a>,
        args: &Arguments,
        vars: &mut Variables<'a>,
    ) -> Result<(), ExecuteError> {
        let divisor = args
            .get(0)
            .and_then(|a| a.parse::<i64>().ok())
            .unwrap_or(2);
        let value = vars.first().as_i64();
        if divisor == 0 {
            return Err(ExecuteError::plugin("mod", "division by zero"));
        }
        // i64::MIN % -1 overflows; its remainder is 0.
        let result = value.wrapping_rem(divisor);
        vars.set_first(Node::number(result as f64));
        Ok(())
    }
}

/// Round half up to an integer.
pub struct Round;

impl Formatter for Round {
    fn identifier(&self) -> &str {
        "round"
    }

    fn apply<'a>(
        &self,
        _ctx: &mut Context<'a>,
        _args: &Arguments,
        vars: &mut Variables<'a>,
    ) -> Result<(), ExecuteError> {
        let value = vars.first().as_f64();
        let rounded = if value.is_nan() {
            0.0
        } else {
            (value + 0.5).floor()
        };
        vars.set_first(Node::number(rounded));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Compiler;
    use crate::error::ExecuteErrorType;
    use serde_json::json;

    fn run(template: &str, data: Value) -> String {
        let compiler = Compiler::new();
        compiler
            .executor()
            .template(template)
            .json(&data)
            .execute()
            .unwrap()
            .into_output()
    }

    fn run_with_partials(template: &str, data: Value, partials: Value, safe: bool) -> (String, Vec<String>) {
        let compiler = Compiler::new();
        let ctx = compiler
            .executor()
            .template(template)
            .json(&data)
            .partials(&partials)
            .safe_execution(safe)
            .execute()
            .unwrap();
        let codes = ctx.errors().iter().map(|e| e.code().to_string()).collect();
        (ctx.into_output(), codes)
    }

    // ===================================================================
    // Partials
    // ===================================================================

    #[test]
    fn test_apply_partial() {
        let (out, errors) = run_with_partials(
            "{.repeated section items}{@|apply item}{.end}",
            json!({"items": [{"n": "a"}, {"n": "b"}]}),
            json!({"item": "<{n}>"}),
            false,
        );
        assert_eq!(out, "<a><b>");
        assert!(errors.is_empty());
    }

    #[test]
    fn test_apply_private_and_args() {
        let partials = json!({
            "open": "{outer}/{@args.x}",
            "closed": "{outer}/{@args.x}",
        });
        let data = json!({"outer": "O", "child": {}});
        let (out, _) = run_with_partials(
            "{child|apply open x=1} {child|apply closed private x=2}",
            data,
            partials,
            false,
        );
        assert_eq!(out, "O/1 /2");
    }

    #[test]
    fn test_apply_missing_partial() {
        let (out, errors) =
            run_with_partials("a{@|apply nope}b", json!({}), json!({}), true);
        assert_eq!(out, "ab");
        assert_eq!(errors, vec!["APPLY_PARTIAL_MISSING"]);

        let compiler = Compiler::new();
        let data = json!({});
        let partials = json!({});
        let err = compiler
            .executor()
            .template("{@|apply nope}")
            .json(&data)
            .partials(&partials)
            .execute()
            .err()
            .unwrap();
        assert!(err.info().is_execute(ExecuteErrorType::ApplyPartialMissing));
    }

    #[test]
    fn test_apply_partial_syntax_strict() {
        let compiler = Compiler::new();
        let data = json!({});
        let partials = json!({"bad": "{.end}"});
        let err = compiler
            .executor()
            .template("{@|apply bad}")
            .json(&data)
            .partials(&partials)
            .execute()
            .err()
            .unwrap();
        let info = err.info();
        assert!(info.is_execute(ExecuteErrorType::ApplyPartialSyntax));
        assert_eq!(info.children.len(), 1);
        assert_eq!(info.children[0].code(), "MISMATCHED_END");
    }

    #[test]
    fn test_apply_recursion_refused() {
        let (out, errors) = run_with_partials(
            "{@|apply self}",
            json!({}),
            json!({"self": "x{@|apply self}"}),
            true,
        );
        assert_eq!(out, "x");
        assert_eq!(errors, vec!["APPLY_PARTIAL_RECURSION"]);
    }

    #[test]
    fn test_apply_macro() {
        let out = run(
            "{.macro greet}hi {@}{.end}{name|apply greet}",
            json!({"name": "Ann"}),
        );
        assert_eq!(out, "hi Ann");
    }

    // ===================================================================
    // Text and escaping
    // ===================================================================

    #[test]
    fn test_count_and_cycle() {
        let data = json!({"a": [1, 2, 3], "o": {"x": 1}, "s": "h\u{e9}llo", "n": 5, "items": [1, 2, 3]});
        assert_eq!(run("{a|count} {o|count} {s|count} {n|count}", data.clone()), "3 1 5 0");
        assert_eq!(
            run("{.repeated section items}{@index|cycle a b}{.end}", data),
            "aba"
        );
    }

    #[test]
    fn test_escaping_formatters() {
        let data = json!({"t": "<a & \"b\">", "nil": null});
        assert_eq!(run("{t|html}", data.clone()), "&lt;a &amp; \"b\"&gt;");
        assert_eq!(run("{t|htmlattr}", data.clone()), "&lt;a &amp; &quot;b&quot;&gt;");
        assert_eq!(run("{t|htmltag}", data.clone()), "&lt;a &amp; &quot;b&quot;&gt;");
        assert_eq!(run("[{nil|html}]", data), "[]");
    }

    #[test]
    fn test_text_formatters() {
        let data = json!({
            "title": "Hello World, Again!",
            "long": "the quick brown fox",
            "tags": "<p>para</p>",
            "pat": "{0} and {1}",
            "x": "X",
            "y": 2,
        });
        assert_eq!(run("{title|slugify}", data.clone()), "hello-world-again");
        assert_eq!(run("{long|truncate 12}", data.clone()), "the quick ...");
        assert_eq!(run("{long|truncate 9 ~}", data.clone()), "the ~");
        assert_eq!(run("{tags|safe}", data.clone()), "para");
        assert_eq!(run("{pat|format x y}", data.clone()), "X and 2");
        assert_eq!(run("{x|output a b c}", data.clone()), "a b c");
        assert_eq!(run("{title|url-encode}", data), "Hello+World%2C+Again%21");
    }

    #[test]
    fn test_pluralize() {
        let data = json!({"one": 1, "two": 2});
        assert_eq!(run("{one|pluralize}|{two|pluralize}", data.clone()), "|s");
        assert_eq!(run("{one|pluralize y ies}|{two|pluralize y ies}", data.clone()), "y|ies");
        assert_eq!(run("{two|pluralize es}", data), "es");
    }

    #[test]
    fn test_format_substitution() {
        let mut buf = String::new();
        let values = vec!["a".to_string(), "b".to_string()];
        Format::substitute("{1}{0}{x}{5}!", &values, &mut buf);
        assert_eq!(buf, "ba!");
    }

    // ===================================================================
    // JSON and navigation
    // ===================================================================

    #[test]
    fn test_json_formatters() {
        let data = json!({"o": {"a": [1, "x"]}, "s": "</script>"});
        assert_eq!(run("{o|json}", data.clone()), r#"{"a":[1,"x"]}"#);
        assert_eq!(run("{s|json}", data.clone()), r#""<\/script>""#);
        assert_eq!(run("{s|raw}", data.clone()), r#""</script>""#);
        assert_eq!(run("{missing|json}", data.clone()), "");
        assert_eq!(
            run("{o|json-pretty}", data),
            "{\n  \"a\": [\n    1,\n    \"x\"\n  ]\n}"
        );
    }

    #[test]
    fn test_navigation_formatters() {
        let data = json!({
            "obj": {"a": {"b": "deep"}, "list": [10, 20]},
            "keys": ["a", "b"],
            "k": "list",
            "i": 1,
            "field": "target",
            "target": "found",
            "people": [{"id": "x", "n": 1}, {"id": "y", "n": 2}, {"n": 3}],
        });
        assert_eq!(run("{obj|prop a.b}", data.clone()), "deep");
        assert_eq!(run("{obj|get keys}", data.clone()), "deep");
        assert_eq!(run("{obj|get k i}", data.clone()), "20");
        assert_eq!(run("{obj|get nope}", data.clone()), "");
        assert_eq!(run("{@|lookup field}", data.clone()), "found");
        assert_eq!(run("{people|key-by id|prop y.n}", data), "2");
    }

    #[test]
    fn test_number_formatters() {
        let data = json!({"n": 7, "f": 2.5, "g": -2.5});
        assert_eq!(run("{n|mod} {n|mod 3}", data.clone()), "1 1");
        assert_eq!(run("{f|round} {g|round}", data.clone()), "3 -2");
        let compiler = Compiler::new();
        let ctx = compiler
            .executor()
            .template("a{n|mod 0}b")
            .json(&data)
            .safe_execution(true)
            .execute()
            .unwrap();
        assert_eq!(ctx.buffer(), "ab");
        assert!(ctx.errors()[0].is_execute(ExecuteErrorType::UnexpectedError));
        assert_eq!(ctx.errors()[0].data.as_deref(), Some("division by zero"));
    }

    #[test]
    fn test_number_formatters_at_i64_bounds() {
        let data = json!({"min": i64::MIN, "huge": -1e300});
        assert_eq!(run("{min|mod -1}", data.clone()), "0");
        assert_eq!(run("{min|cycle a b}|{huge|cycle a b}", data.clone()), "a|a");
        assert_eq!(run("{min|cycle a b c}", data), "b");
    }

    #[test]
    fn test_iter_inside_repeated() {
        let data = json!({"items": ["a", "b"]});
        assert_eq!(
            run("{.repeated section items}{@|iter}{.alternates with},{.end}", data),
            "1,2"
        );
    }
}
