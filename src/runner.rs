//! Top-level pipeline (spec §6.2): load → tokenize → parse → execute,
//! draining the run's collected items into a [`RunResult`].

use crate::error::Result;
use crate::host::{Delegate, RunResult};
use crate::interpreter::evaluator::{self, Evaluator};
use crate::location::InputFile;
use crate::scope::{Scope, ScopeRef};

pub struct Runner<'d> {
    delegate: &'d mut dyn Delegate,
}

impl<'d> Runner<'d> {
    pub fn new(delegate: &'d mut dyn Delegate) -> Self {
        Self { delegate }
    }

    /// Run `source_name` as the top-level file: its own scope owns the
    /// item collector this run drains on completion.
    pub fn run(&mut self, source_name: &str) -> RunResult {
        let scope = Scope::new_top_level();
        let mut ev = Evaluator::new(self.delegate);
        match run_pipeline(&mut ev, source_name, &scope) {
            Ok(()) => {
                let items = Scope::find_item_collector(&scope)
                    .map(|ic| ic.borrow().clone())
                    .unwrap_or_default();
                RunResult::success(items)
            }
            Err(e) => RunResult::failure(e.to_string()),
        }
    }
}

fn run_pipeline(ev: &mut Evaluator, source_name: &str, scope: &ScopeRef) -> Result<()> {
    let contents = ev.delegate.load_file(source_name)?;
    let input = InputFile::new(source_name.to_string(), contents);
    let tokens = crate::lexer::tokenize(&input)?;
    let root = crate::parser::parse(tokens)?;
    evaluator::execute_root(ev, &root, scope)
}

/// Load and fully evaluate an imported file into its own frozen scope
/// (spec §4.8). Shared between the top-level runner (none, imports are
/// only reachable from within a run) and the `import` builtin, which
/// calls this recursively through a reborrowed evaluator.
pub(crate) fn run_imported_file(ev: &mut Evaluator, path: &str) -> Result<ScopeRef> {
    let contents = ev.delegate.load_file(path)?;
    let input = InputFile::new(path.to_string(), contents);
    let tokens = crate::lexer::tokenize(&input)?;
    let root = crate::parser::parse(tokens)?;
    let scope = Scope::new_for_import(dirname(path));
    evaluator::execute_root(ev, &root, &scope)?;
    Ok(scope)
}

/// `//foo/bar.gn` -> `//foo`; `//x.gn` -> `//`. Not a general path
/// resolver — the core never joins or normalizes import paths itself,
/// that's left entirely to `Delegate::load_file`.
fn dirname(path: &str) -> String {
    match path.rfind('/') {
        Some(i) => path[..i].to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{Convention, FunctionMap};
    use crate::import::ImportManager;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;

    struct TestDelegate {
        files: HashMap<String, String>,
        functions: Rc<FunctionMap>,
        import_manager: Option<Rc<RefCell<ImportManager>>>,
        output: String,
    }

    impl TestDelegate {
        fn new(files: &[(&str, &str)]) -> Self {
            let mut map = FunctionMap::new();
            crate::interpreter::builtins::register_defaults(&mut map);
            map.insert("my_bag", crate::interpreter::builtins::item_declarator("my_bag"));
            Self {
                files: files.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
                functions: Rc::new(map),
                import_manager: Some(Rc::new(RefCell::new(ImportManager::new()))),
                output: String::new(),
            }
        }
    }

    impl Delegate for TestDelegate {
        fn load_file(&mut self, name: &str) -> Result<String> {
            self.files
                .get(name)
                .cloned()
                .ok_or_else(|| crate::error::Err::new(crate::error::Kind::Load, None, format!("no such file: {}", name)))
        }

        fn print(&mut self, s: &str) {
            self.output.push_str(s);
        }

        fn functions(&self) -> Rc<FunctionMap> {
            self.functions.clone()
        }

        fn import_manager(&self) -> Option<Rc<RefCell<ImportManager>>> {
            self.import_manager.clone()
        }
    }

    #[test]
    fn hello_world_prints_and_succeeds() {
        let mut d = TestDelegate::new(&[("//hello.gn", "print(\"hello, world\")\n")]);
        let result = Runner::new(&mut d).run("//hello.gn");
        assert!(result.is_success, "{}", result.error_message);
        assert_eq!(d.output, "hello, world\n");
    }

    #[test]
    fn foreach_with_interpolation() {
        let src = "names = [\"a\", \"b\"]\nforeach(n, names) {\n  print(\"got $n\")\n}\n";
        let mut d = TestDelegate::new(&[("//f.gn", src)]);
        let result = Runner::new(&mut d).run("//f.gn");
        assert!(result.is_success, "{}", result.error_message);
        assert_eq!(d.output, "got a\ngot b\n");
    }

    #[test]
    fn bag_declaration_collects_an_item() {
        let src = "my_bag(\"widget\") {\n  x = 1\n}\n";
        let mut d = TestDelegate::new(&[("//b.gn", src)]);
        let result = Runner::new(&mut d).run("//b.gn");
        assert!(result.is_success, "{}", result.error_message);
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.items[0].name, "widget");
        assert_eq!(result.items[0].item_type, "my_bag");
    }

    #[test]
    fn assertion_failure_reports_blame() {
        let src = "x = false\nassert(x)\n";
        let mut d = TestDelegate::new(&[("//a.gn", src)]);
        let result = Runner::new(&mut d).run("//a.gn");
        assert!(!result.is_success);
    }

    #[test]
    fn import_is_idempotent_across_two_callers() {
        let sub = "shared = 1\n";
        let src = "import(\"//sub.gn\")\nimport(\"//sub.gn\")\nassert(shared == 1)\n";
        let mut d = TestDelegate::new(&[("//sub.gn", sub), ("//main.gn", src)]);
        let result = Runner::new(&mut d).run("//main.gn");
        assert!(result.is_success, "{}", result.error_message);
    }

    #[test]
    fn template_invocation_runs_its_body() {
        let src = concat!(
            "template(\"t\") {\n",
            "  my_bag(target_name) {\n",
            "    v = invoker.v\n",
            "  }\n",
            "}\n",
            "t(\"inst\") {\n",
            "  v = 42\n",
            "}\n",
        );
        let mut d = TestDelegate::new(&[("//t.gn", src)]);
        let result = Runner::new(&mut d).run("//t.gn");
        assert!(result.is_success, "{}", result.error_message);
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.items[0].name, "inst");
    }

    #[test]
    fn dirname_strips_last_segment() {
        assert_eq!(dirname("//foo/bar.gn"), "//foo");
        assert_eq!(dirname("//x.gn"), "");
    }
}
