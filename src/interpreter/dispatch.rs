//! Builtin-function dispatch (spec §4.6): resolves a call's name against
//! the function map, enforces the block/no-block contract for each
//! calling convention, and falls back to template invocation (§4.7).

use crate::ast::Node;
use crate::error::{Err, Kind, Result};
use crate::host::{CallContext, Convention, Function};
use crate::location::LocationRange;
use crate::scope::template::Template;
use crate::scope::{PropertyKey, PropertyValue, Scope, ScopeRef};
use crate::value::Value;

use super::evaluator::Evaluator;

struct CallParts<'a> {
    name: &'a str,
    name_range: &'a LocationRange,
    args: &'a [Node],
    block: Option<&'a Node>,
}

fn call_parts(node: &Node) -> CallParts<'_> {
    match &node.kind {
        crate::ast::NodeKind::Call { name, name_range, args, block } => {
            CallParts { name, name_range, args, block: block.as_deref() }
        }
        _ => panic!("dispatch_call called on a non-call node"),
    }
}

pub fn dispatch_call(ev: &mut Evaluator, node: &Node, scope: &ScopeRef) -> Result<Value> {
    let parts = call_parts(node);

    if let Some(function) = ev.functions.get(parts.name).cloned() {
        return call_function(ev, &function, node, &parts, scope);
    }
    if let Some(template) = Scope::lookup_template(scope, parts.name) {
        return invoke_template(ev, &template, node, &parts, scope);
    }
    Err(Err::at(Kind::Name, parts.name_range.clone(), format!("unknown function `{}`", parts.name)))
}

fn eval_args(ev: &mut Evaluator, args: &[Node], scope: &ScopeRef) -> Result<Vec<Value>> {
    args.iter().map(|a| ev.execute(a, scope)).collect()
}

fn call_function(ev: &mut Evaluator, function: &Function, node: &Node, parts: &CallParts, scope: &ScopeRef) -> Result<Value> {
    match function.convention {
        Convention::SelfEvaluatingArgsBlock => {
            let ctx = CallContext {
                call_range: node.range.clone(),
                name_range: parts.name_range.clone(),
                raw_args: parts.args,
                evaluated_args: Vec::new(),
                block: parts.block,
            };
            (function.handler)(ev, scope, ctx)
        }
        Convention::SelfEvaluatingArgsNoBlock => {
            reject_block(parts, node)?;
            let ctx = CallContext {
                call_range: node.range.clone(),
                name_range: parts.name_range.clone(),
                raw_args: parts.args,
                evaluated_args: Vec::new(),
                block: None,
            };
            (function.handler)(ev, scope, ctx)
        }
        Convention::GenericBlock => {
            let evaluated = eval_args(ev, parts.args, scope)?;
            let ctx = CallContext {
                call_range: node.range.clone(),
                name_range: parts.name_range.clone(),
                raw_args: parts.args,
                evaluated_args: evaluated,
                block: parts.block,
            };
            (function.handler)(ev, scope, ctx)
        }
        Convention::GenericNoBlock => {
            reject_block(parts, node)?;
            let evaluated = eval_args(ev, parts.args, scope)?;
            let ctx = CallContext {
                call_range: node.range.clone(),
                name_range: parts.name_range.clone(),
                raw_args: parts.args,
                evaluated_args: evaluated,
                block: None,
            };
            (function.handler)(ev, scope, ctx)
        }
    }
}

fn reject_block(parts: &CallParts, node: &Node) -> Result<()> {
    if parts.block.is_some() {
        return Err(Err::at(Kind::Arity, node.range.clone(), format!("`{}` does not take a block", parts.name)));
    }
    Ok(())
}

/// Template invocation (spec §4.7): not a `Function`, since it needs the
/// template's own captured closure as the invocation scope's parent.
fn invoke_template(ev: &mut Evaluator, template: &std::rc::Rc<Template>, node: &Node, parts: &CallParts, scope: &ScopeRef) -> Result<Value> {
    if parts.args.len() != 1 {
        return Err(Err::at(Kind::Arity, node.range.clone(), "template invocation takes exactly one argument"));
    }
    let target_name = ev.execute(&parts.args[0], scope)?.expect_string(&node.range)?.to_string();
    let block_node = parts
        .block
        .ok_or_else(|| Err::at(Kind::Arity, node.range.clone(), format!("`{}` invocation requires a block", parts.name)))?;

    // Step 3: execute the invocation's own block in the caller's scope;
    // its locals become `invoker.*`.
    let caller_child = Scope::new_mutable_child(scope);
    ev.run_block_statements(block_node, &caller_child)?;

    let invocation_scope = Scope::new_const_child(&template.closure);
    Scope::assign(&invocation_scope, "invoker", Value::Scope(caller_child.clone()), node.range.clone())?;
    Scope::assign(&invocation_scope, "target_name", Value::Str(target_name.clone()), node.range.clone())?;
    Scope::assign(&invocation_scope, "item_name", Value::Str(target_name), node.range.clone())?;
    Scope::exempt_from_unused_check(&invocation_scope, "invoker");
    Scope::exempt_from_unused_check(&invocation_scope, "target_name");
    Scope::exempt_from_unused_check(&invocation_scope, "item_name");

    ev.run_block_statements(&template.body, &invocation_scope)?;

    // Spec §4.7 step 6 names the invocation scope; `invoker.*` access
    // marks the caller-supplied locals used as a side effect of reading
    // through the `invoker` member, so both scopes need the check.
    Scope::check_unused(&invocation_scope)?;
    Scope::check_unused(&caller_child)?;
    Ok(Value::None)
}

/// Enter a non-nestable region on `scope` (spec §4.9), blaming both the
/// new and the already-active site if one exists.
pub fn enter_non_nestable(scope: &ScopeRef, call_range: LocationRange) -> Result<()> {
    if let Some(PropertyValue::NonNestable(existing)) = Scope::get_property(scope, PropertyKey::NonNestableMarker) {
        return Err(Err::at(Kind::Nesting, call_range, "can't nest these things")
            .with_sub_error(Err::at(Kind::Nesting, existing, "first definition here")));
    }
    Scope::set_property(scope, PropertyKey::NonNestableMarker, PropertyValue::NonNestable(call_range));
    Ok(())
}

pub fn exit_non_nestable(scope: &ScopeRef) {
    Scope::clear_property(scope, PropertyKey::NonNestableMarker);
}
