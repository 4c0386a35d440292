//! Template definitions (spec §4.7).
//!
//! A template captures the closure scope active at `template(name) { ... }`
//! definition time plus the unevaluated body AST; invoking it later merges
//! a fresh copy of that closure under the invocation scope and executes the
//! body against it.

use std::rc::Rc;

use crate::ast::Node;
use crate::location::LocationRange;

use super::ScopeRef;

#[derive(Debug)]
pub struct Template {
    pub name: String,
    pub closure: ScopeRef,
    pub body: Rc<Node>,
    pub defined_at: LocationRange,
}

impl Template {
    pub fn new(name: impl Into<String>, closure: ScopeRef, body: Rc<Node>, defined_at: LocationRange) -> Self {
        Self { name: name.into(), closure, body, defined_at }
    }
}
