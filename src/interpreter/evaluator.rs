//! `Execute` dispatch for every AST node (spec §4.5).

use std::rc::Rc;

use crate::ast::{AccessorKind, AssignOp, BinaryOp, BlockMode, Literal, Node, NodeKind, UnaryOp};
use crate::error::{Err, Kind, Result};
use crate::host::{Delegate, FunctionMap};
use crate::import::ImportManager;
use crate::location::LocationRange;
use crate::scope::{Scope, ScopeRef};
use crate::value::interpolation::{expand_string, Interpolator};
use crate::value::Value;

use super::dispatch::dispatch_call;

/// Execution context threaded through a single `Runner.run` (or nested
/// import). Borrows the delegate so builtins can load files and print;
/// owns the function map and import manager by reference count so nested
/// evaluators (imports) can share them.
pub struct Evaluator<'d> {
    pub delegate: &'d mut dyn Delegate,
    pub functions: Rc<FunctionMap>,
    pub import_manager: Option<Rc<std::cell::RefCell<ImportManager>>>,
    /// Scope active for the string literal currently being expanded, used
    /// by the [`Interpolator`] impl below (string expansion has no scope
    /// parameter of its own to avoid a value/scope circular dependency).
    interp_scope: Option<ScopeRef>,
}

impl<'d> Evaluator<'d> {
    pub fn new(delegate: &'d mut dyn Delegate) -> Self {
        let functions = delegate.functions();
        let import_manager = delegate.import_manager();
        Self { delegate, functions, import_manager, interp_scope: None }
    }

    /// A child evaluator borrowing the same delegate, for recursive
    /// evaluation of an imported file.
    pub fn reborrow(&mut self) -> Evaluator<'_> {
        Evaluator {
            delegate: &mut *self.delegate,
            functions: self.functions.clone(),
            import_manager: self.import_manager.clone(),
            interp_scope: None,
        }
    }

    /// Execute every statement of `block` directly against `scope` (no
    /// child scope is created here — callers create one where the spec
    /// calls for it, and deliberately omit one for `foreach`, which runs
    /// its body in the caller's own scope).
    pub fn run_block_statements(&mut self, block: &Node, scope: &ScopeRef) -> Result<()> {
        let statements = match &block.kind {
            NodeKind::Block { statements, .. } => statements,
            _ => panic!("run_block_statements called on a non-block node"),
        };
        for stmt in statements {
            self.execute(stmt, scope)?;
        }
        Ok(())
    }

    pub fn execute(&mut self, node: &Node, scope: &ScopeRef) -> Result<Value> {
        match &node.kind {
            NodeKind::Literal(Literal::Integer(i)) => Ok(Value::Int(*i)),
            NodeKind::Literal(Literal::Bool(b)) => Ok(Value::Bool(*b)),
            NodeKind::Literal(Literal::Str(raw)) => {
                let prev = self.interp_scope.replace(scope.clone());
                let result = expand_string(raw, &node.range, self);
                self.interp_scope = prev;
                Ok(Value::Str(result?))
            }
            NodeKind::Identifier(name) => Scope::get_value(scope, name, true)
                .ok_or_else(|| name_err(&node.range, name)),
            NodeKind::Accessor { base, accessor } => self.eval_accessor(base, accessor, &node.range, scope),
            NodeKind::Unary { op, operand } => self.eval_unary(*op, operand, &node.range, scope),
            NodeKind::Binary { op, left, right } => self.eval_binary(*op, left, right, &node.range, scope),
            NodeKind::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    if matches!(item.kind, NodeKind::BlockComment(_)) {
                        continue;
                    }
                    out.push(self.execute(item, scope)?.deep_clone());
                }
                Ok(Value::List(out))
            }
            NodeKind::Call { .. } => dispatch_call(self, node, scope),
            NodeKind::Condition { cond, then_branch, else_branch } => {
                let c = self.execute(cond, scope)?.expect_bool(&cond.range)?;
                if c {
                    self.run_child_discard_block(then_branch, scope)?;
                } else if let Some(else_branch) = else_branch {
                    match &else_branch.kind {
                        NodeKind::Condition { .. } => {
                            self.execute(else_branch, scope)?;
                        }
                        NodeKind::Block { .. } => {
                            self.run_child_discard_block(else_branch, scope)?;
                        }
                        _ => unreachable!("else branch is always a block or nested condition"),
                    }
                }
                Ok(Value::None)
            }
            NodeKind::Block { mode: BlockMode::ReturnsScope, .. } => {
                let child = Scope::new_mutable_child(scope);
                self.run_block_statements(node, &child)?;
                Scope::check_unused(&child)?;
                Ok(Value::Scope(child))
            }
            NodeKind::Block { mode: BlockMode::DiscardsResult, .. } => {
                self.run_child_discard_block(node, scope)?;
                Ok(Value::None)
            }
            NodeKind::Assignment { op, lhs, rhs } => self.eval_assignment(*op, lhs, rhs, &node.range, scope),
            NodeKind::BlockComment(_) | NodeKind::EndMarker => Ok(Value::None),
        }
    }

    fn run_child_discard_block(&mut self, block: &Node, parent: &ScopeRef) -> Result<()> {
        let child = Scope::new_mutable_child(parent);
        self.run_block_statements(block, &child)?;
        Scope::check_unused(&child)
    }

    fn eval_accessor(
        &mut self,
        base: &Node,
        accessor: &AccessorKind,
        range: &LocationRange,
        scope: &ScopeRef,
    ) -> Result<Value> {
        let base_val = self.execute(base, scope)?;
        match accessor {
            AccessorKind::Member(name) => {
                let inner = base_val.expect_scope(range)?;
                Scope::get_value(inner, name, true).ok_or_else(|| name_err(range, name))
            }
            AccessorKind::Index(idx_node) => {
                let list = base_val.expect_list(range)?;
                let i = self.execute(idx_node, scope)?.expect_int(&idx_node.range)?;
                let idx = bounds_check(i, list.len(), range)?;
                Ok(list[idx].clone())
            }
        }
    }

    fn eval_unary(&mut self, op: UnaryOp, operand: &Node, range: &LocationRange, scope: &ScopeRef) -> Result<Value> {
        let v = self.execute(operand, scope)?;
        match op {
            UnaryOp::Not => Ok(Value::Bool(!v.expect_bool(&operand.range)?)),
            UnaryOp::Neg => {
                let i = v.expect_int(&operand.range)?;
                i.checked_neg()
                    .map(Value::Int)
                    .ok_or_else(|| Err::at(Kind::Type, range.clone(), "integer negation overflowed"))
            }
        }
    }

    fn eval_binary(
        &mut self,
        op: BinaryOp,
        left: &Node,
        right: &Node,
        range: &LocationRange,
        scope: &ScopeRef,
    ) -> Result<Value> {
        // `&&`/`||` short-circuit and so must not evaluate the right side
        // eagerly (spec §4.3).
        if matches!(op, BinaryOp::And | BinaryOp::Or) {
            let l = self.execute(left, scope)?.expect_bool(&left.range)?;
            return match op {
                BinaryOp::And => {
                    if !l {
                        Ok(Value::Bool(false))
                    } else {
                        Ok(Value::Bool(self.execute(right, scope)?.expect_bool(&right.range)?))
                    }
                }
                BinaryOp::Or => {
                    if l {
                        Ok(Value::Bool(true))
                    } else {
                        Ok(Value::Bool(self.execute(right, scope)?.expect_bool(&right.range)?))
                    }
                }
                _ => unreachable!(),
            };
        }

        let l = self.execute(left, scope)?;
        let r = self.execute(right, scope)?;
        match op {
            BinaryOp::Add => binary_add(&l, &r, range),
            BinaryOp::Sub => binary_sub(&l, &r, range),
            BinaryOp::Eq => Ok(Value::Bool(l == r)),
            BinaryOp::Ne => Ok(Value::Bool(l != r)),
            BinaryOp::Lt => Ok(Value::Bool(l.expect_int(&left.range)? < r.expect_int(&right.range)?)),
            BinaryOp::Le => Ok(Value::Bool(l.expect_int(&left.range)? <= r.expect_int(&right.range)?)),
            BinaryOp::Gt => Ok(Value::Bool(l.expect_int(&left.range)? > r.expect_int(&right.range)?)),
            BinaryOp::Ge => Ok(Value::Bool(l.expect_int(&left.range)? >= r.expect_int(&right.range)?)),
            BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
        }
    }

    fn eval_assignment(
        &mut self,
        op: AssignOp,
        lhs: &Node,
        rhs: &Node,
        range: &LocationRange,
        scope: &ScopeRef,
    ) -> Result<Value> {
        match op {
            AssignOp::Assign => {
                let value = self.execute(rhs, scope)?.deep_clone();
                self.assign_lvalue(lhs, value.clone(), scope, range.clone())?;
                Ok(value)
            }
            AssignOp::AddAssign | AssignOp::SubAssign => {
                let current = self.execute(lhs, scope)?;
                let addend = self.execute(rhs, scope)?;
                let combined = match op {
                    AssignOp::AddAssign => binary_add(&current, &addend, range)?,
                    AssignOp::SubAssign => binary_sub(&current, &addend, range)?,
                    AssignOp::Assign => unreachable!(),
                };
                let combined = combined.deep_clone();
                self.assign_lvalue(lhs, combined.clone(), scope, range.clone())?;
                Ok(combined)
            }
        }
    }

    /// Write `value` into the lvalue denoted by `lhs` (an identifier or an
    /// accessor chain). Member writes mutate the target scope in place
    /// (scopes are shared by `Rc`); index writes read-modify-write the
    /// whole list back through the same recursion, since `Value::List`
    /// does not share storage.
    fn assign_lvalue(&mut self, lhs: &Node, value: Value, scope: &ScopeRef, origin: LocationRange) -> Result<()> {
        match &lhs.kind {
            NodeKind::Identifier(name) => Scope::assign(scope, name, value, origin),
            NodeKind::Accessor { base, accessor: AccessorKind::Member(member) } => {
                let base_val = self.execute(base, scope)?;
                let target = base_val.expect_scope(&lhs.range)?.clone();
                Scope::assign(&target, member, value, origin)
            }
            NodeKind::Accessor { base, accessor: AccessorKind::Index(idx_node) } => {
                let mut list = self.execute(base, scope)?.expect_list(&lhs.range)?.clone();
                let i = self.execute(idx_node, scope)?.expect_int(&idx_node.range)?;
                let idx = bounds_check(i, list.len(), &lhs.range)?;
                list[idx] = value;
                self.assign_lvalue(base, Value::List(list), scope, origin)
            }
            _ => panic!("parser only allows identifier/accessor lvalues"),
        }
    }
}

fn name_err(range: &LocationRange, name: &str) -> Err {
    Err::at(Kind::Name, range.clone(), format!("`{}` is not defined", name))
}

fn bounds_check(i: i64, len: usize, range: &LocationRange) -> Result<usize> {
    if i < 0 || i as usize >= len {
        return Err(Err::at(Kind::Type, range.clone(), format!("index {} out of range (length {})", i, len)));
    }
    Ok(i as usize)
}

/// `+` (spec §4.3): `int+int` (checked), `string+any` (coerced via display
/// form), `list+T` appends, `list+list` concatenates. All other mixes
/// error — in particular `int+string` is not the reverse of `string+int`.
fn binary_add(l: &Value, r: &Value, range: &LocationRange) -> Result<Value> {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => a
            .checked_add(*b)
            .map(Value::Int)
            .ok_or_else(|| Err::at(Kind::Type, range.clone(), "integer addition overflowed")),
        (Value::Str(a), other) => Ok(Value::Str(format!("{}{}", a, other.display_unquoted()))),
        (Value::List(a), Value::List(b)) => {
            let mut v = a.clone();
            v.extend(b.iter().cloned());
            Ok(Value::List(v))
        }
        (Value::List(a), other) => {
            let mut v = a.clone();
            v.push(other.clone());
            Ok(Value::List(v))
        }
        _ => Err(type_mismatch(range, "+", l, r)),
    }
}

/// `-` (spec §4.3): `int-int`; `list-T` removes the first structural match
/// (error if absent); `list-list` removes each element of the right list
/// from the left in order.
fn binary_sub(l: &Value, r: &Value, range: &LocationRange) -> Result<Value> {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => a
            .checked_sub(*b)
            .map(Value::Int)
            .ok_or_else(|| Err::at(Kind::Type, range.clone(), "integer subtraction overflowed")),
        (Value::List(a), Value::List(b)) => {
            let mut v = a.clone();
            for item in b {
                remove_first(&mut v, item, range)?;
            }
            Ok(Value::List(v))
        }
        (Value::List(a), other) => {
            let mut v = a.clone();
            remove_first(&mut v, other, range)?;
            Ok(Value::List(v))
        }
        _ => Err(type_mismatch(range, "-", l, r)),
    }
}

fn remove_first(list: &mut Vec<Value>, target: &Value, range: &LocationRange) -> Result<()> {
    match list.iter().position(|v| v == target) {
        Some(i) => {
            list.remove(i);
            Ok(())
        }
        None => Err(Err::at(Kind::Type, range.clone(), format!("value `{}` not found in list", target.display_unquoted()))),
    }
}

fn type_mismatch(range: &LocationRange, op: &str, l: &Value, r: &Value) -> Err {
    Err::at(
        Kind::Type,
        range.clone(),
        format!("can't apply `{}` to {} and {}", op, l.type_name(), r.type_name()),
    )
}

impl Interpolator for Evaluator<'_> {
    fn lookup(&mut self, name: &str, origin: &LocationRange) -> Result<Value> {
        let scope = self.interp_scope.clone().expect("interp_scope set before string expansion");
        Scope::get_value(&scope, name, true).ok_or_else(|| name_err(origin, name))
    }

    fn member(&mut self, base: &Value, name: &str, origin: &LocationRange) -> Result<Value> {
        let inner = base.expect_scope(origin)?;
        Scope::get_value(inner, name, true).ok_or_else(|| name_err(origin, name))
    }

    fn index(&mut self, base: &Value, index: i64, origin: &LocationRange) -> Result<Value> {
        let list = base.expect_list(origin)?;
        let idx = bounds_check(index, list.len(), origin)?;
        Ok(list[idx].clone())
    }
}

/// Execute a file's (or import's) root block directly against `scope`
/// (no extra child scope — the top-level/import scope itself is the
/// "caller-supplied scope"), then run the unused-variable check (spec
/// §4.5: "the top-level file block" is one of the scopes checked).
pub fn execute_root(ev: &mut Evaluator, root: &Node, scope: &ScopeRef) -> Result<()> {
    ev.run_block_statements(root, scope)?;
    Scope::check_unused(scope)
}
