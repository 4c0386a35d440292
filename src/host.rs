//! Delegate contract (spec §6.1): the interfaces the core consumes from an
//! embedding host, plus the function-registration types built on top of
//! them.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::ast::Node;
use crate::error::Result;
use crate::import::ImportManager;
use crate::interpreter::evaluator::Evaluator;
use crate::location::LocationRange;
use crate::scope::ScopeRef;
use crate::value::Value;

/// How a builtin or host-registered function wants its call site handled
/// by the dispatcher (spec §4.6 calling-convention table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Convention {
    /// Args are left as raw AST for the handler to evaluate itself; a
    /// trailing block, if present, is left unexecuted.
    SelfEvaluatingArgsBlock,
    /// Same, but the call must not carry a trailing block.
    SelfEvaluatingArgsNoBlock,
    /// Args are evaluated by the dispatcher before the handler runs; a
    /// trailing block, if present, is left unexecuted. The handler owns
    /// whatever scope-creation and unused-variable policy its block needs.
    GenericBlock,
    /// Args are evaluated by the dispatcher; no trailing block allowed.
    GenericNoBlock,
}

/// Everything a [`Function`] handler needs about one call site.
pub struct CallContext<'a> {
    pub call_range: LocationRange,
    pub name_range: LocationRange,
    pub raw_args: &'a [Node],
    pub evaluated_args: Vec<Value>,
    pub block: Option<&'a Node>,
}

pub type Handler = Rc<dyn Fn(&mut Evaluator, &ScopeRef, CallContext) -> Result<Value>>;

#[derive(Clone)]
pub struct Function {
    pub convention: Convention,
    pub handler: Handler,
}

impl Function {
    pub fn new(convention: Convention, handler: Handler) -> Self {
        Self { convention, handler }
    }
}

/// Immutable map of builtin + host-declared callables keyed by identifier
/// token text (spec §6.1: `functions() -> FunctionMap`).
#[derive(Clone, Default)]
pub struct FunctionMap {
    entries: IndexMap<String, Function>,
}

impl FunctionMap {
    pub fn new() -> Self {
        Self { entries: IndexMap::new() }
    }

    pub fn insert(&mut self, name: impl Into<String>, function: Function) {
        self.entries.insert(name.into(), function);
    }

    pub fn get(&self, name: &str) -> Option<&Function> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }
}

/// Host-provided interface supplying file loading, function registry, and
/// print sink (spec §6.1).
pub trait Delegate {
    /// Return file contents for `name`. Paths use `//relative` notation.
    fn load_file(&mut self, name: &str) -> Result<String>;

    /// Side-effect output; the core concatenates before calling.
    fn print(&mut self, s: &str);

    /// Immutable map of builtin + host-declared callables.
    fn functions(&self) -> Rc<FunctionMap>;

    /// Must be `Some` iff `import` is present in `functions()`.
    fn import_manager(&self) -> Option<Rc<std::cell::RefCell<ImportManager>>>;

    /// Absolute prefix used to resolve `//`-absolute paths. Optional.
    fn source_root(&self) -> Option<&str> {
        None
    }
}

/// `{is_success, error_message, items}` (spec §6.2).
#[derive(Debug, Clone)]
pub struct RunResult {
    pub is_success: bool,
    pub error_message: String,
    pub items: Vec<crate::item::Item>,
}

impl RunResult {
    pub fn success(items: Vec<crate::item::Item>) -> Self {
        Self { is_success: true, error_message: String::new(), items }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self { is_success: false, error_message: message.into(), items: Vec::new() }
    }
}
