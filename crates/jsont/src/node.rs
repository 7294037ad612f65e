/*
 * node.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Values as seen by the interpreter.
//!
//! A [`Node`] either borrows from the caller's JSON input, owns a value
//! produced during execution, or is missing entirely. Missing is distinct
//! from JSON `null`: a missing node emits nothing and fails every test,
//! while `null` is a real value that can be bound and passed around.

use std::rc::Rc;

use serde_json::Value;

use crate::numbers::format_number;
use crate::variable::Segment;

#[derive(Debug, Clone, Default)]
pub enum Node<'a> {
    #[default]
    Missing,
    Borrowed(&'a Value),
    Owned(Rc<Value>),
    /// A computed double that JSON cannot represent (NaN or an infinity).
    NonFinite(f64),
}

impl<'a> Node<'a> {
    pub fn owned(value: Value) -> Self {
        Node::Owned(Rc::new(value))
    }

    pub fn text(text: impl Into<String>) -> Self {
        Node::owned(Value::String(text.into()))
    }

    /// Integral doubles are stored as integers so they print and serialize
    /// without a trailing `.0`.
    pub fn number(n: f64) -> Self {
        if !n.is_finite() {
            return Node::NonFinite(n);
        }
        if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
            return Node::owned(Value::from(n as i64));
        }
        serde_json::Number::from_f64(n)
            .map(|num| Node::owned(Value::Number(num)))
            .unwrap_or(Node::NonFinite(n))
    }

    pub fn bool(b: bool) -> Self {
        Node::owned(Value::Bool(b))
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            Node::Borrowed(v) => Some(v),
            Node::Owned(v) => Some(v.as_ref()),
            Node::Missing | Node::NonFinite(_) => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Node::Missing)
    }

    pub fn is_null(&self) -> bool {
        matches!(self.value(), Some(Value::Null))
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Node::NonFinite(_)) || matches!(self.value(), Some(Value::Number(_)))
    }

    pub fn is_array(&self) -> bool {
        matches!(self.value(), Some(Value::Array(_)))
    }

    pub fn is_object(&self) -> bool {
        matches!(self.value(), Some(Value::Object(_)))
    }

    pub fn as_str(&self) -> Option<&str> {
        self.value().and_then(Value::as_str)
    }

    /// Number of members of an array or object, zero otherwise.
    pub fn size(&self) -> usize {
        match self.value() {
            Some(Value::Array(a)) => a.len(),
            Some(Value::Object(o)) => o.len(),
            _ => 0,
        }
    }

    /// Strings are true when non-empty, numbers and booleans when non-zero,
    /// containers when they have members.
    pub fn is_truthy(&self) -> bool {
        match self {
            Node::Missing => false,
            Node::NonFinite(n) => !n.is_nan(),
            _ => match self.value() {
                Some(Value::String(s)) => !s.is_empty(),
                Some(Value::Number(_)) | Some(Value::Bool(_)) => {
                    let n = self.as_f64();
                    !n.is_nan() && n != 0.0
                }
                Some(Value::Array(a)) => !a.is_empty(),
                Some(Value::Object(o)) => !o.is_empty(),
                Some(Value::Null) | None => false,
            },
        }
    }

    /// Scalar text; containers and missing nodes give an empty string.
    pub fn as_text(&self) -> String {
        match self {
            Node::Missing => String::new(),
            Node::NonFinite(n) => format_number(*n),
            _ => match self.value() {
                Some(v) => value_text(v),
                None => String::new(),
            },
        }
    }

    /// Numeric view: strings are parsed, booleans are 1 or 0, anything else
    /// is 0.
    pub fn as_f64(&self) -> f64 {
        match self {
            Node::NonFinite(n) => *n,
            _ => match self.value() {
                Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
                Some(Value::Bool(b)) => f64::from(u8::from(*b)),
                Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
                _ => 0.0,
            },
        }
    }

    pub fn as_i64(&self) -> i64 {
        match self.value() {
            Some(Value::Number(n)) => n.as_i64().unwrap_or_else(|| self.as_f64() as i64),
            _ => self.as_f64() as i64,
        }
    }

    /// Step into a child; anything that does not have the child is missing.
    pub fn path(&self, segment: &Segment) -> Node<'a> {
        match self {
            Node::Borrowed(v) => match child(v, segment) {
                Some(c) => Node::Borrowed(c),
                None => Node::Missing,
            },
            Node::Owned(v) => match child(v, segment) {
                Some(c) => Node::owned(c.clone()),
                None => Node::Missing,
            },
            Node::Missing | Node::NonFinite(_) => Node::Missing,
        }
    }

    /// Array element by position.
    pub fn element(&self, index: usize) -> Node<'a> {
        self.path(&Segment::Index(index))
    }

    /// Copy out as a JSON value; missing and non-finite become `null`.
    pub fn to_value(&self) -> Value {
        self.value().cloned().unwrap_or(Value::Null)
    }

    /// Render for output the way a variable instruction does.
    pub fn emit(&self, buf: &mut String) {
        match self {
            Node::Missing => {}
            Node::NonFinite(n) => buf.push_str(&format_number(*n)),
            _ => match self.value() {
                Some(Value::Array(items)) => {
                    for (i, item) in items.iter().enumerate() {
                        if i > 0 {
                            buf.push(',');
                        }
                        buf.push_str(&value_text(item));
                    }
                }
                Some(Value::Null) | None => {}
                Some(v) => buf.push_str(&value_text(v)),
            },
        }
    }
}

fn child<'v>(value: &'v Value, segment: &Segment) -> Option<&'v Value> {
    match (value, segment) {
        (Value::Object(map), Segment::Key(key)) => map.get(key),
        (Value::Array(items), Segment::Index(i)) => items.get(*i),
        _ => None,
    }
}

/// Scalar text of a JSON value.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Number(n) => match (n.as_i64(), n.as_u64()) {
            (Some(i), _) => i.to_string(),
            (_, Some(u)) => u.to_string(),
            _ => format_number(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::Array(_) | Value::Object(_) => String::new(),
    }
}
