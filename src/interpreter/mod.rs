//! Tree-walking evaluator: node execution, builtin-function dispatch, and
//! the concrete language builtins.

pub mod builtins;
pub mod dispatch;
pub mod evaluator;

pub use evaluator::{execute_root, Evaluator};
