//! Embeddable configuration-script interpreter: a small, GN-flavored
//! declarative language for describing named "items" (build targets, or
//! whatever a host chooses), evaluated against a pluggable [`host::Delegate`].

pub mod ast;
pub mod error;
pub mod host;
pub mod import;
pub mod interpreter;
pub mod item;
pub mod lexer;
pub mod location;
pub mod parser;
pub mod runner;
pub mod scope;
pub mod value;

pub use error::{Err, Kind, Result};
pub use host::{CallContext, Convention, Delegate, Function, FunctionMap, RunResult};
pub use item::Item;
pub use runner::Runner;
pub use scope::{Scope, ScopeRef};
pub use value::Value;
