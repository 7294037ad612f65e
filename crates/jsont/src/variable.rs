/*
 * variable.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Variable references and the values they resolve to at runtime.

use std::fmt;

use crate::node::Node;

/// One step of a dotted variable path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Key(String),
    Index(usize),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(k) => f.write_str(k),
            Segment::Index(i) => write!(f, "{}", i),
        }
    }
}

/// A parsed variable reference such as `a.b.0` or `@index`.
///
/// The bare `@` refers to the current node and has no segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VarName(Option<Vec<Segment>>);

impl VarName {
    /// Split on dots; all-digit segments that fit an `i32` become indices.
    pub fn parse(raw: &str) -> Self {
        if raw == "@" {
            return VarName(None);
        }
        let segments = raw
            .split('.')
            .filter(|part| !part.is_empty())
            .map(|part| {
                let digits = part.bytes().all(|b| b.is_ascii_digit());
                match part.parse::<i32>() {
                    Ok(i) if digits => Segment::Index(i as usize),
                    _ => Segment::Key(part.to_string()),
                }
            })
            .collect();
        VarName(Some(segments))
    }

    /// The current node, `@`.
    pub fn current() -> Self {
        VarName(None)
    }

    pub fn segments(&self) -> Option<&[Segment]> {
        self.0.as_deref()
    }

    /// The first segment when it names a local variable like `@foo`.
    pub fn local_name(&self) -> Option<&str> {
        match self.segments() {
            Some([Segment::Key(k)]) if k.starts_with('@') => Some(k.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for VarName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.segments() {
            None => f.write_str("@"),
            Some(segments) => {
                for (i, seg) in segments.iter().enumerate() {
                    if i > 0 {
                        f.write_str(".")?;
                    }
                    write!(f, "{}", seg)?;
                }
                Ok(())
            }
        }
    }
}

/// A resolved variable. Formatters read and replace its node.
#[derive(Debug, Clone)]
pub struct Variable<'a> {
    name: VarName,
    node: Node<'a>,
}

impl<'a> Variable<'a> {
    pub fn new(name: VarName, node: Node<'a>) -> Self {
        Self { name, node }
    }

    pub fn name(&self) -> &VarName {
        &self.name
    }

    pub fn node(&self) -> &Node<'a> {
        &self.node
    }

    pub fn set(&mut self, node: Node<'a>) {
        self.node = node;
    }

    pub fn set_missing(&mut self) {
        self.node = Node::Missing;
    }

    pub fn is_missing(&self) -> bool {
        self.node.is_missing()
    }
}

/// The variables referenced by one instruction, always at least one.
#[derive(Debug, Clone)]
pub struct Variables<'a> {
    vars: Vec<Variable<'a>>,
}

impl<'a> Variables<'a> {
    pub fn new(vars: Vec<Variable<'a>>) -> Self {
        Self { vars }
    }

    /// A single variable holding `node`, handy for invoking formatters
    /// directly.
    pub fn single(node: Node<'a>) -> Self {
        Self::new(vec![Variable::new(VarName::current(), node)])
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// The first variable. Instructions never build an empty list; an empty
    /// list built by hand yields a placeholder missing variable.
    pub fn first(&self) -> Node<'a> {
        self.vars.first().map(|v| v.node.clone()).unwrap_or_default()
    }

    pub fn first_mut(&mut self) -> Option<&mut Variable<'a>> {
        self.vars.first_mut()
    }

    /// Replace the first variable's node.
    pub fn set_first(&mut self, node: Node<'a>) {
        if let Some(var) = self.vars.first_mut() {
            var.set(node);
        }
    }

    pub fn get(&self, index: usize) -> Option<&Variable<'a>> {
        self.vars.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Variable<'a>> {
        self.vars.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names() {
        let name = VarName::parse("a.0.b");
        assert_eq!(
            name.segments(),
            Some(
                &[
                    Segment::Key("a".into()),
                    Segment::Index(0),
                    Segment::Key("b".into())
                ][..]
            )
        );
        assert_eq!(VarName::parse("@").segments(), None);
        assert_eq!(name.to_string(), "a.0.b");
        assert_eq!(VarName::current().to_string(), "@");
    }

    #[test]
    fn test_large_digits_stay_keys() {
        let name = VarName::parse("99999999999");
        assert_eq!(name.segments(), Some(&[Segment::Key("99999999999".into())][..]));
    }

    #[test]
    fn test_local_name() {
        assert_eq!(VarName::parse("@foo").local_name(), Some("@foo"));
        assert_eq!(VarName::parse("@foo.bar").local_name(), None);
        assert_eq!(VarName::parse("foo").local_name(), None);
    }

    #[test]
    fn test_variables_first() {
        let mut vars = Variables::single(Node::text("x"));
        assert_eq!(vars.first().as_text(), "x");
        vars.set_first(Node::Missing);
        assert!(vars.first().is_missing());
        assert_eq!(vars.len(), 1);
    }
}
