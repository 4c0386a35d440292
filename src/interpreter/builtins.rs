//! Concrete builtin functions (spec §4.6) plus the `item_declarator`
//! helper hosts use to register their own item-bag functions.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::ast::{AccessorKind, NodeKind};
use crate::error::{Err, Kind, Result};
use crate::host::{CallContext, Convention, Function, FunctionMap};
use crate::import::ImportManager;
use crate::item::Item;
use crate::scope::template::Template;
use crate::scope::{MergeOptions, PropertyKey, Scope, ScopeRef};
use crate::value::Value;

use super::dispatch::{enter_non_nestable, exit_non_nestable};
use super::evaluator::Evaluator;

/// The six language-level builtins, ready to seed a host's [`FunctionMap`]
/// (spec §4.6: `assert`, `defined`, `print`, `foreach`, `import`,
/// `template`). Hosts call this first, then add their own item-declarators
/// via [`item_declarator`].
pub fn register_defaults(map: &mut FunctionMap) {
    map.insert("assert", Function::new(Convention::SelfEvaluatingArgsNoBlock, Rc::new(assert_fn)));
    map.insert("defined", Function::new(Convention::SelfEvaluatingArgsNoBlock, Rc::new(defined_fn)));
    map.insert("print", Function::new(Convention::GenericNoBlock, Rc::new(print_fn)));
    map.insert("foreach", Function::new(Convention::SelfEvaluatingArgsBlock, Rc::new(foreach_fn)));
    map.insert("import", Function::new(Convention::GenericNoBlock, Rc::new(import_fn)));
    map.insert("template", Function::new(Convention::SelfEvaluatingArgsBlock, Rc::new(template_fn)));
}

fn assert_fn(ev: &mut Evaluator, scope: &ScopeRef, ctx: CallContext) -> Result<Value> {
    if ctx.raw_args.is_empty() || ctx.raw_args.len() > 2 {
        return Err(Err::at(Kind::Arity, ctx.call_range.clone(), "assert() takes one or two arguments"));
    }
    let cond_node = &ctx.raw_args[0];
    let (cond_val, blame_range) = match &cond_node.kind {
        NodeKind::Identifier(name) => {
            let (v, origin) = Scope::get_value_with_origin(scope, name, true)
                .ok_or_else(|| Err::at(Kind::Name, cond_node.range.clone(), format!("`{}` is not defined", name)))?;
            (v, origin)
        }
        _ => {
            let v = ev.execute(cond_node, scope)?;
            (v, cond_node.range.clone())
        }
    };
    let ok = cond_val.expect_bool(&cond_node.range)?;
    if ok {
        return Ok(Value::None);
    }
    let mut message = "assertion failed".to_string();
    if ctx.raw_args.len() == 2 {
        let extra = ev.execute(&ctx.raw_args[1], scope)?;
        message.push_str(": ");
        message.push_str(&extra.display_unquoted());
    }
    Err(Err::at(Kind::AssertionFailed, ctx.call_range.clone(), message)
        .with_sub_error(Err::at(Kind::AssertionFailed, blame_range, "value assigned here")))
}

/// `defined(x)` — `x` must be a bare identifier or a single dotted
/// member; never errors for a missing name, just returns `false`.
fn defined_fn(_ev: &mut Evaluator, scope: &ScopeRef, ctx: CallContext) -> Result<Value> {
    if ctx.raw_args.len() != 1 {
        return Err(Err::at(Kind::Arity, ctx.call_range.clone(), "defined() takes exactly one argument"));
    }
    let arg = &ctx.raw_args[0];
    match &arg.kind {
        NodeKind::Identifier(name) => Ok(Value::Bool(Scope::has_value(scope, name))),
        NodeKind::Accessor { base, accessor: AccessorKind::Member(member) } => match &base.kind {
            NodeKind::Identifier(base_name) => match Scope::get_value(scope, base_name, false) {
                Some(Value::Scope(s)) => Ok(Value::Bool(Scope::has_value(&s, member))),
                _ => Ok(Value::Bool(false)),
            },
            _ => Err(Err::at(Kind::Type, arg.range.clone(), "defined() only supports a single-level member access")),
        },
        _ => Err(Err::at(Kind::Type, arg.range.clone(), "defined() requires an identifier or accessor argument")),
    }
}

fn print_fn(ev: &mut Evaluator, _scope: &ScopeRef, ctx: CallContext) -> Result<Value> {
    let parts: Vec<String> = ctx.evaluated_args.iter().map(Value::display_unquoted).collect();
    let mut line = parts.join(" ");
    line.push('\n');
    ev.delegate.print(&line);
    Ok(Value::None)
}

/// `foreach(var, list) { ... }` — runs the block directly in the caller's
/// scope (spec §4.6: side effects persist), saving/restoring `var`.
fn foreach_fn(ev: &mut Evaluator, scope: &ScopeRef, ctx: CallContext) -> Result<Value> {
    let block = ctx
        .block
        .ok_or_else(|| Err::at(Kind::Arity, ctx.call_range.clone(), "foreach() requires a block"))?;
    if ctx.raw_args.len() != 2 {
        return Err(Err::at(Kind::Arity, ctx.call_range.clone(), "foreach() takes exactly two arguments"));
    }
    let var_node = &ctx.raw_args[0];
    let var_name = match &var_node.kind {
        NodeKind::Identifier(n) => n.clone(),
        _ => return Err(Err::at(Kind::Type, var_node.range.clone(), "foreach()'s first argument must be a bare identifier")),
    };
    let list_node = &ctx.raw_args[1];
    let items = ev.execute(list_node, scope)?.expect_list(&list_node.range)?.clone();

    let had_prior = Scope::has_local(scope, &var_name);
    let prior = if had_prior { Scope::get_value_with_origin(scope, &var_name, false) } else { None };

    for item in items {
        Scope::force_set_local(scope, &var_name, item.deep_clone(), var_node.range.clone());
        ev.run_block_statements(block, scope)?;
    }

    match prior {
        Some((value, origin)) => Scope::force_set_local(scope, &var_name, value, origin),
        None => Scope::remove_local(scope, &var_name),
    }
    Ok(Value::None)
}

/// `import("path")` — merges the imported file's frozen scope into the
/// caller's scope (spec §4.8). Path resolution is left entirely to the
/// Delegate's `load_file`; the core never normalizes or joins paths
/// itself (spec §1: path normalization is an external collaborator).
fn import_fn(ev: &mut Evaluator, scope: &ScopeRef, ctx: CallContext) -> Result<Value> {
    if ctx.evaluated_args.len() != 1 {
        return Err(Err::at(Kind::Arity, ctx.call_range.clone(), "import() takes exactly one argument"));
    }
    let path = ctx.evaluated_args[0].expect_string(&ctx.call_range)?.to_string();
    let import_manager = ev.import_manager.clone().ok_or_else(|| {
        Err::at(Kind::Context, ctx.call_range.clone(), "import() is not available: no import manager configured")
    })?;

    let imported_scope = ImportManager::get_or_load(&import_manager, &path, || {
        let mut sub_ev = ev.reborrow();
        crate::runner::run_imported_file(&mut sub_ev, &path)
    })?;

    let opts = MergeOptions {
        clobber_existing: false,
        skip_private_vars: true,
        mark_dest_used: true,
        excluded_values: Default::default(),
    };
    Scope::merge_into(&imported_scope, scope, &opts)?;
    Ok(Value::None)
}

/// `template("name") { ... }` — non-nestable; captures the defining
/// scope as the template's (to-be-const) closure (spec §4.7).
fn template_fn(_ev: &mut Evaluator, scope: &ScopeRef, ctx: CallContext) -> Result<Value> {
    let block = ctx
        .block
        .ok_or_else(|| Err::at(Kind::Arity, ctx.call_range.clone(), "template() requires a block"))?;
    if ctx.raw_args.len() != 1 {
        return Err(Err::at(Kind::Arity, ctx.call_range.clone(), "template() takes exactly one argument"));
    }
    let name = match &ctx.raw_args[0].kind {
        NodeKind::Literal(crate::ast::Literal::Str(s)) => s.clone(),
        _ => return Err(Err::at(Kind::Type, ctx.raw_args[0].range.clone(), "template() takes a string literal name")),
    };

    enter_non_nestable(scope, ctx.call_range.clone())?;
    let result = (|| {
        let closure = Scope::make_closure(scope);
        let template = Rc::new(Template::new(name.clone(), closure, Rc::new(block.clone()), ctx.call_range.clone()));
        Scope::define_template(scope, name, template)
    })();
    exit_non_nestable(scope);
    result?;
    Ok(Value::None)
}

/// Builds a generic-block item-declarator `Function` for item type
/// `item_type` (spec §4.6, "Host item-declarators"). A typical host
/// registers one of these per item type after [`register_defaults`].
pub fn item_declarator(item_type: impl Into<String>) -> Function {
    let item_type = item_type.into();
    Function::new(
        Convention::GenericBlock,
        Rc::new(move |ev: &mut Evaluator, scope: &ScopeRef, ctx: CallContext| -> Result<Value> {
            let block = ctx
                .block
                .ok_or_else(|| Err::at(Kind::Arity, ctx.call_range.clone(), format!("{}() requires a block", item_type)))?;
            if ctx.evaluated_args.len() != 1 {
                return Err(Err::at(Kind::Arity, ctx.call_range.clone(), format!("{}() takes exactly one argument", item_type)));
            }
            let name = ctx.evaluated_args[0].expect_string(&ctx.call_range)?.to_string();

            if Scope::get_property(scope, PropertyKey::ProcessingImport).is_some() {
                return Err(Err::at(
                    Kind::Context,
                    ctx.call_range.clone(),
                    format!("{}() can't be called while processing an import", item_type),
                ));
            }

            enter_non_nestable(scope, ctx.call_range.clone())?;
            // Item-declarator blocks are not subject to the unused-variable
            // check (spec §4.5 lists only conditional branches, executed
            // blocks, imports, and the top-level file): draining into the
            // item's key/value map is itself the "use" of each local.
            let result = (|| -> Result<()> {
                let child = Scope::new_mutable_child(scope);
                ev.run_block_statements(block, &child)?;
                let kvs: IndexMap<String, Value> =
                    child.borrow().local_values().map(|(k, v)| (k.clone(), v.clone())).collect();
                let item = Item {
                    item_type: item_type.clone(),
                    name: name.clone(),
                    key_value_map: kvs,
                    defined_from: ctx.call_range.clone(),
                };
                Scope::push_item(scope, item)
            })();
            exit_non_nestable(scope);
            result?;
            Ok(Value::None)
        }),
    )
}
