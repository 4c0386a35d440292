//! Import Manager (spec §4.8): a per-Delegate memoized map from source
//! path to its fully-evaluated, frozen scope. Failure is sticky.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::{Err, Result};
use crate::scope::ScopeRef;

pub struct ImportManager {
    entries: IndexMap<String, Result<ScopeRef>>,
}

impl ImportManager {
    pub fn new() -> Self {
        Self { entries: IndexMap::new() }
    }

    /// Look up `path`'s cached result, or compute it via `loader` and cache
    /// whichever it returns (success or sticky failure). `loader` is only
    /// invoked while `self` is not borrowed, so it may itself perform
    /// nested imports through the same manager.
    pub fn get_or_load(
        self_ref: &Rc<RefCell<ImportManager>>,
        path: &str,
        loader: impl FnOnce() -> Result<ScopeRef>,
    ) -> Result<ScopeRef> {
        if let Some(cached) = self_ref.borrow().entries.get(path) {
            return clone_result(cached);
        }
        let result = loader();
        self_ref.borrow_mut().entries.insert(path.to_string(), clone_result(&result));
        result
    }
}

impl Default for ImportManager {
    fn default() -> Self {
        Self::new()
    }
}

fn clone_result(r: &Result<ScopeRef>) -> Result<ScopeRef> {
    match r {
        Ok(s) => Ok(s.clone()),
        Err(e) => Err(clone_err(e)),
    }
}

fn clone_err(e: &Err) -> Err {
    e.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Kind;
    use crate::scope::Scope;
    use std::cell::Cell;

    #[test]
    fn loader_runs_once_per_path() {
        let mgr = Rc::new(RefCell::new(ImportManager::new()));
        let calls = Rc::new(Cell::new(0));
        let c = calls.clone();
        let load = || {
            c.set(c.get() + 1);
            Ok(Scope::new_top_level())
        };
        ImportManager::get_or_load(&mgr, "//a.gn", load).unwrap();
        let c2 = calls.clone();
        ImportManager::get_or_load(&mgr, "//a.gn", move || {
            c2.set(c2.get() + 1);
            Ok(Scope::new_top_level())
        })
        .unwrap();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn failure_is_sticky() {
        let mgr = Rc::new(RefCell::new(ImportManager::new()));
        let r1 = ImportManager::get_or_load(&mgr, "//bad.gn", || {
            Err(Err::new(Kind::Load, None, "missing file"))
        });
        assert!(r1.is_err());
        let r2 = ImportManager::get_or_load(&mgr, "//bad.gn", || {
            panic!("loader should not run again")
        });
        assert!(r2.is_err());
    }
}
