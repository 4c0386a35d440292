//! Nested variable environment (spec §3, "Scope").
//!
//! A scope owns a local name->value map, an optional const or mutable
//! parent link, per-target-type default scopes, captured templates, an
//! opaque property store, and (for the top-level and import-processing
//! scopes) a handle to the item collector the host drains after a run.

pub mod template;

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::{Err, Kind, Result};
use crate::item::Item;
use crate::location::LocationRange;
use crate::value::Value;

pub use template::Template;

/// Shared, interior-mutable handle to a [`Scope`]. Scopes form a tree via
/// parent links and are cheaply cloned by reference (spec's "owned
/// scope" is realized here as `Rc<RefCell<Scope>>` rather than a raw
/// pointer, since Rust has no implicit ownership-transferring GC).
pub type ScopeRef = Rc<RefCell<Scope>>;

#[derive(Debug, Clone)]
enum ParentLink {
    Mutable(ScopeRef),
    Const(ScopeRef),
}

#[derive(Debug, Clone)]
struct Slot {
    value: Value,
    used: bool,
    origin: LocationRange,
}

/// Opaque scratch keys used by evaluator subsystems that need to stash a
/// marker on the current scope without the core scope API knowing about
/// them (spec §4.9 non-nestable blocks, §4.8 import processing flag).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    NonNestableMarker,
    ProcessingImport,
}

#[derive(Debug, Clone)]
pub enum PropertyValue {
    NonNestable(LocationRange),
    Flag,
}

/// Options controlling [`Scope::merge_into`] (spec §3 merge invariants,
/// used by `import` and template invocation).
#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    pub clobber_existing: bool,
    pub skip_private_vars: bool,
    pub mark_dest_used: bool,
    pub excluded_values: HashSet<String>,
}

pub struct Scope {
    values: IndexMap<String, Slot>,
    parent: Option<ParentLink>,
    target_defaults: IndexMap<String, ScopeRef>,
    templates: IndexMap<String, Rc<Template>>,
    item_collector: Option<Rc<RefCell<Vec<Item>>>>,
    properties: std::collections::HashMap<PropertyKey, PropertyValue>,
    source_dir: String,
    exempt_from_unused: HashSet<String>,
}

impl Scope {
    fn empty() -> Self {
        Self {
            values: IndexMap::new(),
            parent: None,
            target_defaults: IndexMap::new(),
            templates: IndexMap::new(),
            item_collector: None,
            properties: std::collections::HashMap::new(),
            source_dir: "//".to_string(),
            exempt_from_unused: HashSet::new(),
        }
    }

    /// A fresh top-level scope with its own item collector, as `Runner`
    /// creates for the file being run (spec §2, control flow).
    pub fn new_top_level() -> ScopeRef {
        let mut s = Self::empty();
        s.item_collector = Some(Rc::new(RefCell::new(Vec::new())));
        Rc::new(RefCell::new(s))
    }

    /// A scope nested under `parent` whose writes are visible to `parent`
    /// reads only through the normal containing-scope search (i.e. an
    /// ordinary block/conditional-branch scope).
    pub fn new_mutable_child(parent: &ScopeRef) -> ScopeRef {
        let mut s = Self::empty();
        s.source_dir = parent.borrow().source_dir.clone();
        s.parent = Some(ParentLink::Mutable(parent.clone()));
        Rc::new(RefCell::new(s))
    }

    /// A scope whose parent may be read but never mutated through — used
    /// for template closures and imported scopes (spec §3: "const
    /// parent").
    pub fn new_const_child(parent: &ScopeRef) -> ScopeRef {
        let mut s = Self::empty();
        s.source_dir = parent.borrow().source_dir.clone();
        s.parent = Some(ParentLink::Const(parent.clone()));
        Rc::new(RefCell::new(s))
    }

    /// A fresh scope for evaluating an imported file: no item collector
    /// (item collection is forbidden while processing an import, spec
    /// §4.8) and flagged `ProcessingImport` so builtins can check it.
    pub fn new_for_import(source_dir: impl Into<String>) -> ScopeRef {
        let mut s = Self::empty();
        s.source_dir = source_dir.into();
        let r = Rc::new(RefCell::new(s));
        Scope::set_property(&r, PropertyKey::ProcessingImport, PropertyValue::Flag);
        r
    }

    pub fn source_dir(&self) -> &str {
        &self.source_dir
    }

    pub fn set_source_dir(&mut self, dir: impl Into<String>) {
        self.source_dir = dir.into();
    }

    // -- item collector ----------------------------------------------------

    /// Walks toward the root looking for an item collector (spec §3:
    /// "discovered by walking toward the root"). Templates and assertions
    /// never collect items because the scopes they execute in are
    /// constructed without one in their own chain segment.
    pub fn find_item_collector(self_ref: &ScopeRef) -> Option<Rc<RefCell<Vec<Item>>>> {
        let this = self_ref.borrow();
        if let Some(ic) = &this.item_collector {
            return Some(ic.clone());
        }
        match &this.parent {
            Some(ParentLink::Mutable(p)) | Some(ParentLink::Const(p)) => {
                let p = p.clone();
                drop(this);
                Scope::find_item_collector(&p)
            }
            None => None,
        }
    }

    pub fn push_item(self_ref: &ScopeRef, item: Item) -> Result<()> {
        match Scope::find_item_collector(self_ref) {
            Some(ic) => {
                ic.borrow_mut().push(item);
                Ok(())
            }
            None => Err(Err::new(
                Kind::Context,
                Some(item.defined_from.clone()),
                "item declared without an item collector in scope",
            )),
        }
    }

    // -- reads ---------------------------------------------------------

    /// Read `name`, searching local values then the parent chain. Marks
    /// the variable used in whichever scope actually owns it.
    pub fn get_value(self_ref: &ScopeRef, name: &str, mark_used: bool) -> Option<Value> {
        if let Some(slot) = self_ref.borrow_mut().values.get_mut(name) {
            if mark_used {
                slot.used = true;
            }
            return Some(slot.value.clone());
        }
        let parent = match &self_ref.borrow().parent {
            Some(ParentLink::Mutable(p)) => Some(p.clone()),
            Some(ParentLink::Const(p)) => Some(p.clone()),
            None => None,
        };
        parent.and_then(|p| Scope::get_value(&p, name, mark_used))
    }

    pub fn has_value(self_ref: &ScopeRef, name: &str) -> bool {
        Scope::get_value(self_ref, name, false).is_some()
    }

    /// Like [`Scope::get_value`] but also returns the assignment site of
    /// whichever scope actually owns `name`, for error blame that needs to
    /// point at where a value came from rather than where it's read
    /// (spec §9 worked example: `assert`'s sub-error points at `x = false`).
    pub fn get_value_with_origin(self_ref: &ScopeRef, name: &str, mark_used: bool) -> Option<(Value, LocationRange)> {
        if let Some(slot) = self_ref.borrow_mut().values.get_mut(name) {
            if mark_used {
                slot.used = true;
            }
            return Some((slot.value.clone(), slot.origin.clone()));
        }
        let parent = match &self_ref.borrow().parent {
            Some(ParentLink::Mutable(p)) => Some(p.clone()),
            Some(ParentLink::Const(p)) => Some(p.clone()),
            None => None,
        };
        parent.and_then(|p| Scope::get_value_with_origin(&p, name, mark_used))
    }

    /// Unconditionally set a name in this exact scope, bypassing the
    /// owner search and the unused-before-reassign check — used by
    /// `foreach` to bind its loop variable (spec §4.6: saved/restored
    /// around the loop, not subject to ordinary assignment rules).
    pub fn force_set_local(self_ref: &ScopeRef, name: &str, value: Value, origin: LocationRange) {
        self_ref.borrow_mut().values.insert(name.to_string(), Slot { value, used: false, origin });
    }

    /// Remove a local binding entirely — used by `foreach` to delete its
    /// loop variable when it had no prior local binding to restore.
    pub fn remove_local(self_ref: &ScopeRef, name: &str) {
        self_ref.borrow_mut().values.shift_remove(name);
    }

    /// Whether `name` is bound locally in this exact scope (not inherited).
    pub fn has_local(self_ref: &ScopeRef, name: &str) -> bool {
        self_ref.borrow().values.contains_key(name)
    }

    /// Recursively clone this scope's own values (spec §5 deep-copy).
    /// The parent link, templates, and target-defaults are shared by
    /// reference since they are inherited context, not owned content; the
    /// copy starts with no item collector of its own.
    pub fn deep_clone(self_ref: &ScopeRef) -> ScopeRef {
        let this = self_ref.borrow();
        let mut values = IndexMap::new();
        for (k, slot) in &this.values {
            values.insert(
                k.clone(),
                Slot { value: slot.value.deep_clone(), used: slot.used, origin: slot.origin.clone() },
            );
        }
        let copy = Scope {
            values,
            parent: this.parent.clone(),
            target_defaults: this.target_defaults.clone(),
            templates: this.templates.clone(),
            item_collector: None,
            properties: this.properties.clone(),
            source_dir: this.source_dir.clone(),
            exempt_from_unused: this.exempt_from_unused.clone(),
        };
        Rc::new(RefCell::new(copy))
    }

    /// Snapshot this scope for a template's captured closure (spec §4.7
    /// step 2's "template's captured (read-only) closure"). Mutable
    /// ancestors are collapsed into one copy of their values, stopping at
    /// the nearest const ancestor (or the root), which becomes the
    /// snapshot's own const parent — so later mutation of the live
    /// defining-scope chain never leaks into a template invoked later.
    pub fn make_closure(self_ref: &ScopeRef) -> ScopeRef {
        let mut values = IndexMap::new();
        let mut templates = IndexMap::new();
        let mut target_defaults = IndexMap::new();
        // Only ever set from the scope we stop the walk at: if that's the
        // run's own top-level scope (no parent at all), its item collector
        // has to come along too, or item-declarators called from inside a
        // template body would have nowhere to push (spec §3, "discovered
        // by walking toward the root").
        let mut item_collector = None;
        let mut cursor = self_ref.clone();
        let const_parent = loop {
            {
                let this = cursor.borrow();
                for (k, slot) in &this.values {
                    values.entry(k.clone()).or_insert_with(|| Slot {
                        value: slot.value.deep_clone(),
                        used: slot.used,
                        origin: slot.origin.clone(),
                    });
                }
                for (k, t) in &this.templates {
                    templates.entry(k.clone()).or_insert_with(|| t.clone());
                }
                for (k, d) in &this.target_defaults {
                    target_defaults.entry(k.clone()).or_insert_with(|| d.clone());
                }
                if item_collector.is_none() {
                    item_collector = this.item_collector.clone();
                }
            }
            let next = cursor.borrow().parent.clone();
            match next {
                Some(ParentLink::Mutable(p)) => cursor = p,
                Some(ParentLink::Const(p)) => break Some(p),
                None => break None,
            }
        };

        let source_dir = self_ref.borrow().source_dir.clone();
        let copy = Scope {
            values,
            parent: const_parent.map(ParentLink::Const),
            target_defaults,
            templates,
            item_collector,
            properties: std::collections::HashMap::new(),
            source_dir,
            exempt_from_unused: HashSet::new(),
        };
        Rc::new(RefCell::new(copy))
    }

    /// Iterator-friendly snapshot of this scope's own (non-inherited)
    /// values, used by `Value::to_json` and by item-declarator draining.
    pub fn local_values(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter().map(|(k, s)| (k, &s.value))
    }

    pub fn local_value_names(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }

    // -- writes ----------------------------------------------------------

    /// Find the scope that already owns `name`, and whether reaching it
    /// required crossing a const link (in which case the name is visible
    /// but not assignable there).
    fn find_owner(self_ref: &ScopeRef, name: &str, crossed_const: bool) -> Option<(ScopeRef, bool)> {
        if self_ref.borrow().values.contains_key(name) {
            return Some((self_ref.clone(), crossed_const));
        }
        let next = match &self_ref.borrow().parent {
            Some(ParentLink::Mutable(p)) => Some((p.clone(), crossed_const)),
            Some(ParentLink::Const(p)) => Some((p.clone(), true)),
            None => None,
        };
        next.and_then(|(p, c)| Scope::find_owner(&p, name, c))
    }

    /// `name = value` (spec §4.5 "Assignment semantics"): replaces in the
    /// innermost scope that already owns the name, otherwise creates
    /// locally. Re-assigning a local whose prior value was never read is
    /// an UnusedVariableError unless the new value is structurally equal
    /// to the old (open question (a), resolved in SPEC_FULL.md §5).
    pub fn assign(self_ref: &ScopeRef, name: &str, value: Value, origin: LocationRange) -> Result<()> {
        if let Some((owner, crossed_const)) = Scope::find_owner(self_ref, name, false) {
            if crossed_const {
                return Err(Err::at(
                    Kind::Name,
                    origin,
                    format!("can't assign to `{}`: it is defined in a read-only containing scope", name),
                ));
            }
            let mut owner_mut = owner.borrow_mut();
            let slot = owner_mut.values.get_mut(name).expect("owner reports containing name");
            let exempt = owner_mut.exempt_from_unused.contains(name);
            if !slot.used && !exempt && slot.value != value {
                return Err(Err::at(
                    Kind::UnusedVariable,
                    slot.origin.clone(),
                    format!("`{}` was assigned but never used before being overwritten", name),
                ));
            }
            slot.value = value;
            slot.used = false;
            slot.origin = origin;
            Ok(())
        } else {
            self_ref.borrow_mut().values.insert(
                name.to_string(),
                Slot { value, used: false, origin },
            );
            Ok(())
        }
    }

    /// `+=`/`-=` (spec §4.3): the name must already resolve somewhere in
    /// the chain; unlike `=` this never creates a new local.
    pub fn assign_existing(self_ref: &ScopeRef, name: &str, value: Value, origin: LocationRange) -> Result<()> {
        if Scope::find_owner(self_ref, name, false).is_none() {
            return Err(Err::at(Kind::Name, origin, format!("`{}` is not defined", name)));
        }
        Scope::assign(self_ref, name, value, origin)
    }

    pub fn mark_used(self_ref: &ScopeRef, name: &str) {
        if let Some(slot) = self_ref.borrow_mut().values.get_mut(name) {
            slot.used = true;
        }
    }

    /// Mark every local as used without reading it — templates do this to
    /// their captured closure on exit (spec §4.7 step 6).
    pub fn mark_all_used(self_ref: &ScopeRef) {
        for slot in self_ref.borrow_mut().values.values_mut() {
            slot.used = true;
        }
    }

    pub fn exempt_from_unused_check(self_ref: &ScopeRef, name: impl Into<String>) {
        self_ref.borrow_mut().exempt_from_unused.insert(name.into());
    }

    /// The unused-variable check run on block exit (spec §4.5): every
    /// local that was set but never read is an error naming the
    /// variable and its assignment site.
    pub fn check_unused(self_ref: &ScopeRef) -> Result<()> {
        let this = self_ref.borrow();
        for (name, slot) in &this.values {
            if !slot.used && !this.exempt_from_unused.contains(name) {
                return Err(Err::at(
                    Kind::UnusedVariable,
                    slot.origin.clone(),
                    format!("`{}` was assigned but never used", name),
                ));
            }
        }
        Ok(())
    }

    // -- merge -------------------------------------------------------------

    /// Merge `self`'s local values into `dest` (spec §3 merge invariants;
    /// used by `import` and template invocation).
    pub fn merge_into(self_ref: &ScopeRef, dest: &ScopeRef, opts: &MergeOptions) -> Result<()> {
        let entries: Vec<(String, Value, LocationRange)> = self_ref
            .borrow()
            .values
            .iter()
            .map(|(k, s)| (k.clone(), s.value.clone(), s.origin.clone()))
            .collect();

        for (name, value, origin) in entries {
            if opts.skip_private_vars && name.starts_with('_') {
                continue;
            }
            if opts.excluded_values.contains(&name) {
                continue;
            }
            let mut dest_mut = dest.borrow_mut();
            if let Some(existing) = dest_mut.values.get_mut(&name) {
                if existing.value == value {
                    if opts.mark_dest_used {
                        existing.used = true;
                    }
                    continue;
                }
                if opts.clobber_existing {
                    existing.value = value;
                    existing.used = opts.mark_dest_used;
                    existing.origin = origin;
                } else {
                    return Err(Err::at(
                        Kind::Name,
                        origin,
                        format!("`{}` is already defined with a different value", name),
                    ));
                }
            } else {
                dest_mut.values.insert(
                    name,
                    Slot { value, used: opts.mark_dest_used, origin },
                );
            }
        }
        Ok(())
    }

    pub fn structurally_eq(&self, other: &Scope) -> bool {
        if self.values.len() != other.values.len() {
            return false;
        }
        for (k, slot) in &self.values {
            match other.values.get(k) {
                Some(other_slot) if other_slot.value == slot.value => {}
                _ => return false,
            }
        }
        true
    }

    pub fn to_display_string(&self, indent: usize) -> String {
        let pad = "  ".repeat(indent + 1);
        let mut out = String::from("{\n");
        for (k, slot) in &self.values {
            out.push_str(&pad);
            out.push_str(k);
            out.push_str(" = ");
            out.push_str(&match &slot.value {
                Value::Str(s) => format!("\"{}\"", s),
                other => other.display_unquoted(),
            });
            out.push('\n');
        }
        out.push_str(&"  ".repeat(indent));
        out.push('}');
        out
    }

    // -- templates ---------------------------------------------------------

    pub fn define_template(self_ref: &ScopeRef, name: impl Into<String>, template: Rc<Template>) -> Result<()> {
        let name = name.into();
        let mut this = self_ref.borrow_mut();
        if this.templates.contains_key(&name) {
            return Err(Err::new(Kind::Nesting, None, format!("template `{}` already defined", name)));
        }
        this.templates.insert(name, template);
        Ok(())
    }

    pub fn lookup_template(self_ref: &ScopeRef, name: &str) -> Option<Rc<Template>> {
        if let Some(t) = self_ref.borrow().templates.get(name) {
            return Some(t.clone());
        }
        let parent = match &self_ref.borrow().parent {
            Some(ParentLink::Mutable(p)) | Some(ParentLink::Const(p)) => Some(p.clone()),
            None => None,
        };
        parent.and_then(|p| Scope::lookup_template(&p, name))
    }

    // -- target defaults -----------------------------------------------------

    pub fn set_target_defaults(self_ref: &ScopeRef, target_type: impl Into<String>, defaults: ScopeRef) {
        self_ref.borrow_mut().target_defaults.insert(target_type.into(), defaults);
    }

    pub fn get_target_defaults(self_ref: &ScopeRef, target_type: &str) -> Option<ScopeRef> {
        if let Some(s) = self_ref.borrow().target_defaults.get(target_type) {
            return Some(s.clone());
        }
        let parent = match &self_ref.borrow().parent {
            Some(ParentLink::Mutable(p)) | Some(ParentLink::Const(p)) => Some(p.clone()),
            None => None,
        };
        parent.and_then(|p| Scope::get_target_defaults(&p, target_type))
    }

    // -- opaque properties ---------------------------------------------------

    pub fn set_property(self_ref: &ScopeRef, key: PropertyKey, value: PropertyValue) {
        self_ref.borrow_mut().properties.insert(key, value);
    }

    pub fn clear_property(self_ref: &ScopeRef, key: PropertyKey) {
        self_ref.borrow_mut().properties.remove(&key);
    }

    pub fn get_property(self_ref: &ScopeRef, key: PropertyKey) -> Option<PropertyValue> {
        if let Some(v) = self_ref.borrow().properties.get(&key) {
            return Some(v.clone());
        }
        let parent = match &self_ref.borrow().parent {
            Some(ParentLink::Mutable(p)) | Some(ParentLink::Const(p)) => Some(p.clone()),
            None => None,
        };
        parent.and_then(|p| Scope::get_property(&p, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::{InputFile, LocationRange};

    fn range() -> LocationRange {
        let f = InputFile::new("//t.gn", "x\n".to_string());
        LocationRange::point(f.location_for_byte(0))
    }

    #[test]
    fn assign_then_read_roundtrips() {
        let s = Scope::new_top_level();
        Scope::assign(&s, "x", Value::Int(1), range()).unwrap();
        assert_eq!(Scope::get_value(&s, "x", true), Some(Value::Int(1)));
    }

    #[test]
    fn child_scope_sees_parent_but_not_vice_versa() {
        let parent = Scope::new_top_level();
        Scope::assign(&parent, "p", Value::Int(1), range()).unwrap();
        let child = Scope::new_mutable_child(&parent);
        assert_eq!(Scope::get_value(&child, "p", true), Some(Value::Int(1)));
        Scope::assign(&child, "c", Value::Int(2), range()).unwrap();
        assert_eq!(Scope::get_value(&parent, "c", true), None);
    }

    #[test]
    fn reassign_unused_local_is_error() {
        let s = Scope::new_top_level();
        Scope::assign(&s, "x", Value::Int(1), range()).unwrap();
        let err = Scope::assign(&s, "x", Value::Int(2), range());
        assert!(err.is_err());
    }

    #[test]
    fn reassign_equal_value_is_allowed_even_if_unused() {
        let s = Scope::new_top_level();
        Scope::assign(&s, "x", Value::Int(1), range()).unwrap();
        assert!(Scope::assign(&s, "x", Value::Int(1), range()).is_ok());
    }

    #[test]
    fn reassign_after_use_is_allowed() {
        let s = Scope::new_top_level();
        Scope::assign(&s, "x", Value::Int(1), range()).unwrap();
        Scope::get_value(&s, "x", true);
        assert!(Scope::assign(&s, "x", Value::Int(2), range()).is_ok());
    }

    #[test]
    fn check_unused_reports_unread_local() {
        let s = Scope::new_top_level();
        Scope::assign(&s, "x", Value::Int(1), range()).unwrap();
        assert!(Scope::check_unused(&s).is_err());
        Scope::get_value(&s, "x", true);
        assert!(Scope::check_unused(&s).is_ok());
    }

    #[test]
    fn assign_through_const_parent_errors() {
        let parent = Scope::new_top_level();
        Scope::assign(&parent, "p", Value::Int(1), range()).unwrap();
        Scope::get_value(&parent, "p", true);
        let child = Scope::new_const_child(&parent);
        let err = Scope::assign(&child, "p", Value::Int(2), range());
        assert!(err.is_err());
    }

    #[test]
    fn merge_without_clobber_errors_on_conflicting_value() {
        let src = Scope::new_top_level();
        Scope::assign(&src, "k", Value::Int(1), range()).unwrap();
        let dest = Scope::new_top_level();
        Scope::assign(&dest, "k", Value::Int(2), range()).unwrap();
        Scope::get_value(&dest, "k", true);
        let opts = MergeOptions::default();
        assert!(Scope::merge_into(&src, &dest, &opts).is_err());
    }

    #[test]
    fn merge_idempotent_for_equal_values() {
        let src = Scope::new_top_level();
        Scope::assign(&src, "k", Value::Int(1), range()).unwrap();
        let dest = Scope::new_top_level();
        Scope::assign(&dest, "k", Value::Int(1), range()).unwrap();
        Scope::get_value(&dest, "k", true);
        let opts = MergeOptions { mark_dest_used: true, ..Default::default() };
        assert!(Scope::merge_into(&src, &dest, &opts).is_ok());
    }

    #[test]
    fn merge_skips_private_vars() {
        let src = Scope::new_top_level();
        Scope::assign(&src, "_hidden", Value::Int(1), range()).unwrap();
        let dest = Scope::new_top_level();
        let opts = MergeOptions { skip_private_vars: true, ..Default::default() };
        Scope::merge_into(&src, &dest, &opts).unwrap();
        assert_eq!(Scope::get_value(&dest, "_hidden", true), None);
    }
}
