use std::cell::RefCell;
use std::rc::Rc;

use clap::Parser;

use confscript::host::{Delegate, FunctionMap};
use confscript::import::ImportManager;
use confscript::runner::Runner;

#[derive(Parser)]
#[command(name = "confrun")]
#[command(about = "Runs a configuration script and prints the items it declared")]
#[command(version)]
struct Cli {
    /// Output the run result as JSON (is_success, error_message, items)
    #[arg(long = "json")]
    json: bool,

    /// Directory root used to resolve `//`-absolute paths
    #[arg(long = "root")]
    root: Option<String>,

    /// Script file to run
    #[arg()]
    script_file: String,
}

/// `std::fs`-backed [`Delegate`]: `//foo/bar.gn` resolves to
/// `<root>/foo/bar.gn`; registers the language builtins plus one demo
/// item-declarator, `my_bag`.
struct FsDelegate {
    root: std::path::PathBuf,
    functions: Rc<FunctionMap>,
    import_manager: Option<Rc<RefCell<ImportManager>>>,
}

impl FsDelegate {
    fn new(root: std::path::PathBuf) -> Self {
        let mut functions = FunctionMap::new();
        confscript::interpreter::builtins::register_defaults(&mut functions);
        functions.insert("my_bag", confscript::interpreter::builtins::item_declarator("my_bag"));
        Self {
            root,
            functions: Rc::new(functions),
            import_manager: Some(Rc::new(RefCell::new(ImportManager::new()))),
        }
    }

    fn resolve(&self, name: &str) -> std::path::PathBuf {
        self.root.join(name.trim_start_matches("//"))
    }
}

impl Delegate for FsDelegate {
    fn load_file(&mut self, name: &str) -> confscript::Result<String> {
        let path = self.resolve(name);
        std::fs::read_to_string(&path).map_err(|e| {
            confscript::Err::new(confscript::Kind::Load, None, format!("reading {}: {}", path.display(), e))
        })
    }

    fn print(&mut self, s: &str) {
        print!("{}", s);
    }

    fn functions(&self) -> Rc<FunctionMap> {
        self.functions.clone()
    }

    fn import_manager(&self) -> Option<Rc<RefCell<ImportManager>>> {
        self.import_manager.clone()
    }

    fn source_root(&self) -> Option<&str> {
        self.root.to_str()
    }
}

fn main() {
    let cli = Cli::parse();

    let root = cli
        .root
        .map(std::path::PathBuf::from)
        .or_else(|| std::path::Path::new(&cli.script_file).parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| std::path::PathBuf::from("."));
    let file_name = std::path::Path::new(&cli.script_file)
        .file_name()
        .map(|f| format!("//{}", f.to_string_lossy()))
        .unwrap_or_else(|| cli.script_file.clone());

    let mut delegate = FsDelegate::new(root);
    let result = Runner::new(&mut delegate).run(&file_name);

    if cli.json {
        let items: Vec<_> = result.items.iter().map(|i| i.to_json()).collect();
        println!(
            "{}",
            serde_json::json!({
                "is_success": result.is_success,
                "error_message": result.error_message,
                "items": items,
            })
        );
    } else if result.is_success {
        for item in &result.items {
            println!("{}(\"{}\")", item.item_type, item.name);
        }
    } else {
        eprintln!("{}", result.error_message);
    }

    std::process::exit(if result.is_success { 0 } else { 1 });
}
