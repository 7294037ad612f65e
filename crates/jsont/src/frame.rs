/*
 * frame.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! One level of the context stack.

use std::collections::HashMap;
use std::sync::Arc;

use crate::instructions::Instruction;
use crate::node::Node;

/// A scope entered by a section, an iteration step, a variable's formatter
/// chain or a partial.
///
/// Local variables and macros are allocated on first use since most frames
/// never hold any.
#[derive(Debug, Clone, Default)]
pub struct Frame<'a> {
    node: Node<'a>,
    vars: Option<HashMap<String, Node<'a>>>,
    macros: Option<HashMap<String, Arc<Instruction>>>,
    /// Position within the frame's array while a repeated section iterates.
    index: Option<usize>,
    /// Lookups that walk the stack stop here. Set for private partials.
    stop_resolution: bool,
}

impl<'a> Frame<'a> {
    pub fn new(node: Node<'a>) -> Self {
        Self {
            node,
            ..Self::default()
        }
    }

    pub fn node(&self) -> &Node<'a> {
        &self.node
    }

    pub fn set_var(&mut self, name: impl Into<String>, node: Node<'a>) {
        self.vars
            .get_or_insert_with(HashMap::new)
            .insert(name.into(), node);
    }

    pub fn get_var(&self, name: &str) -> Option<&Node<'a>> {
        self.vars.as_ref().and_then(|vars| vars.get(name))
    }

    pub fn take_vars(&mut self) -> Option<HashMap<String, Node<'a>>> {
        self.vars.take()
    }

    pub fn set_macro(&mut self, name: impl Into<String>, body: Arc<Instruction>) {
        self.macros
            .get_or_insert_with(HashMap::new)
            .insert(name.into(), body);
    }

    pub fn get_macro(&self, name: &str) -> Option<&Arc<Instruction>> {
        self.macros.as_ref().and_then(|macros| macros.get(name))
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn set_index(&mut self, index: Option<usize>) {
        self.index = index;
    }

    pub fn stop_resolution(&self) -> bool {
        self.stop_resolution
    }

    pub fn set_stop_resolution(&mut self, stop: bool) {
        self.stop_resolution = stop;
    }
}
