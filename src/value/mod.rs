//! The dynamically typed value sum and string interpolation.

pub mod interpolation;

use std::fmt;

use crate::error::{Err, Kind, Result};
use crate::location::LocationRange;
use crate::scope::ScopeRef;

pub use interpolation::expand_string;

/// A dynamically typed value (spec §3, "Value"). Exactly six variants: no
/// floats, no dictionaries (scopes play that role).
#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<Value>),
    Scope(ScopeRef),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Scope(_) => "scope",
        }
    }

    pub fn expect_bool(&self, origin: &LocationRange) -> Result<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(type_err(origin, "boolean", other)),
        }
    }

    pub fn expect_int(&self, origin: &LocationRange) -> Result<i64> {
        match self {
            Value::Int(i) => Ok(*i),
            other => Err(type_err(origin, "integer", other)),
        }
    }

    pub fn expect_string(&self, origin: &LocationRange) -> Result<&str> {
        match self {
            Value::Str(s) => Ok(s.as_str()),
            other => Err(type_err(origin, "string", other)),
        }
    }

    pub fn expect_list(&self, origin: &LocationRange) -> Result<&Vec<Value>> {
        match self {
            Value::List(l) => Ok(l),
            other => Err(type_err(origin, "list", other)),
        }
    }

    pub fn expect_scope(&self, origin: &LocationRange) -> Result<&ScopeRef> {
        match self {
            Value::Scope(s) => Ok(s),
            other => Err(type_err(origin, "scope", other)),
        }
    }

    /// The "unquoted" display form used by string interpolation and by
    /// `+` when coercing a non-string operand (spec §4.3/§4.4).
    pub fn display_unquoted(&self) -> String {
        match self {
            Value::None => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Str(s) => s.clone(),
            Value::List(items) => {
                let inner: Vec<String> = items.iter().map(Value::display_quoted).collect();
                format!("[{}]", inner.join(", "))
            }
            Value::Scope(scope) => scope.borrow().to_display_string(0),
        }
    }

    fn display_quoted(&self) -> String {
        match self {
            Value::Str(s) => format!("\"{}\"", escape_for_display(s)),
            other => other.display_unquoted(),
        }
    }

    /// Deep-copy: list/scope values are recursively cloned rather than
    /// sharing storage with their source (spec §5: "strings/lists/scopes
    /// deep-copy on assignment; list/scope copies preserve origins").
    /// Called at every point a value is bound into a new slot — assignment,
    /// list-literal construction, `foreach` loop-variable binding.
    pub fn deep_clone(&self) -> Value {
        match self {
            Value::List(items) => Value::List(items.iter().map(Value::deep_clone).collect()),
            Value::Scope(s) => Value::Scope(crate::scope::Scope::deep_clone(s)),
            other => other.clone(),
        }
    }

    /// Convert to a JSON value for hosts that want to serialize collected
    /// `Item`s (ambient stack convenience; not part of the language core).
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::None => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::json!(*i),
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Scope(scope) => {
                let scope = scope.borrow();
                let mut map = serde_json::Map::new();
                for (k, v) in scope.local_values() {
                    map.insert(k.clone(), v.to_json());
                }
                serde_json::Value::Object(map)
            }
        }
    }
}

fn escape_for_display(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '$' => out.push_str("\\$"),
            c => out.push(c),
        }
    }
    out
}

fn type_err(origin: &LocationRange, expected: &str, actual: &Value) -> Err {
    Err::at(
        Kind::Type,
        origin.clone(),
        format!("expected {}, got {} `{}`", expected, actual.type_name(), actual.display_unquoted()),
    )
}

/// Structural equality (spec §4.3: `==`/`!=`). Cross-type comparisons are
/// always unequal.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Scope(a), Value::Scope(b)) => a.borrow().structurally_eq(&b.borrow()),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{}", s),
            other => write!(f, "{}", other.display_unquoted()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cross_type_equality_is_false() {
        assert_ne!(Value::Int(1), Value::Str("1".to_string()));
        assert_ne!(Value::Bool(true), Value::Int(1));
    }

    #[test]
    fn list_equality_is_structural() {
        let a = Value::List(vec![Value::Int(1), Value::Str("x".to_string())]);
        let b = Value::List(vec![Value::Int(1), Value::Str("x".to_string())]);
        assert_eq!(a, b);
    }

    #[test]
    fn display_unquoted_for_list() {
        let v = Value::List(vec![Value::Str("a".to_string()), Value::Int(2)]);
        assert_eq!(v.display_unquoted(), "[\"a\", 2]");
    }
}
