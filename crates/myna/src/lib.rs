//! Compiler front-end for the Myna language.
//!
//! The pipeline parses a set of named sources, orders the modules by their
//! imports, then desugars and typechecks each module in dependency order,
//! producing a typed module environment per module plus a diagnostic list.

pub mod dag;
pub mod diagnostics;
pub mod hir;
pub mod label_map;
pub mod lexer;
pub mod messages;
pub mod parser;
pub mod resolver;
pub mod surface;
pub mod typecheck;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use dag::Dag;
use diagnostics::{Diagnostic, Severity};
use surface::SModule;
use typecheck::env::FullModuleEnv;
use typecheck::Typechecker;

pub use diagnostics::{has_errors, render_diagnostic, render_diagnostics};

/// After this many non-fatal errors the remaining modules are skipped.
pub const ERROR_THRESHOLD: usize = 10;

pub const SOURCE_EXTENSION: &str = "myn";

#[derive(Debug)]
pub enum MynaError {
    Io(std::io::Error),
    InvalidPath(String),
    Diagnostics,
}

impl std::fmt::Display for MynaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MynaError::Io(err) => write!(f, "IO error: {err}"),
            MynaError::InvalidPath(path) => write!(f, "Invalid path: {path}"),
            MynaError::Diagnostics => write!(f, "compilation failed"),
        }
    }
}

impl std::error::Error for MynaError {}

impl From<std::io::Error> for MynaError {
    fn from(err: std::io::Error) -> Self {
        MynaError::Io(err)
    }
}

/// A named source: either an in-memory text or a path to read lazily.
#[derive(Debug, Clone)]
pub struct Source {
    pub path: String,
    pub text: Option<String>,
}

impl Source {
    pub fn from_path(path: impl Into<String>) -> Source {
        Source {
            path: path.into(),
            text: None,
        }
    }

    pub fn from_text(path: impl Into<String>, text: impl Into<String>) -> Source {
        Source {
            path: path.into(),
            text: Some(text.into()),
        }
    }

    fn read(&self) -> Result<String, MynaError> {
        match &self.text {
            Some(text) => Ok(text.clone()),
            None => Ok(fs::read_to_string(&self.path)?),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Options {
    pub verbose: bool,
}

/// Parses every source and returns the raw modules plus parse diagnostics.
pub fn parse_sources(sources: &[Source]) -> Result<(Vec<SModule>, Vec<Diagnostic>), MynaError> {
    let mut modules = Vec::new();
    let mut diagnostics = Vec::new();
    for source in sources {
        let text = source.read()?;
        let (module, errors) = parser::parse_source(&source.path, &text);
        diagnostics.extend(errors);
        if let Some(module) = module {
            modules.push(module);
        }
    }
    Ok((modules, diagnostics))
}

/// The state of one full compilation: the accumulated typed modules and the
/// diagnostic list.
pub struct Environment {
    opts: Options,
    modules: HashMap<String, FullModuleEnv>,
    errors: Vec<Diagnostic>,
}

impl Environment {
    pub fn new(opts: Options) -> Environment {
        Environment {
            opts,
            modules: HashMap::new(),
            errors: Vec::new(),
        }
    }

    pub fn modules(&self) -> &HashMap<String, FullModuleEnv> {
        &self.modules
    }

    pub fn errors(&self) -> &[Diagnostic] {
        &self.errors
    }

    /// Parses, orders, desugars and typechecks all sources. Only I/O
    /// failures surface as `Err`; compilation problems land in `errors()`.
    pub fn parse_and_infer(&mut self, sources: &[Source]) -> Result<(), MynaError> {
        let mut mod_names: Vec<String> = Vec::new();
        let mut mod_map: HashMap<String, SModule> = HashMap::new();
        let mut seen_paths: HashSet<String> = HashSet::new();

        for source in sources {
            if !seen_paths.insert(source.path.clone()) {
                continue;
            }
            if self.opts.verbose {
                eprintln!("parsing {}", source.path);
            }
            let text = source.read()?;
            let (module, errors) = parser::parse_source(&source.path, &text);
            self.errors.extend(errors);

            let Some(module) = module else { continue };
            let name = module.name.val.clone();
            if mod_map.contains_key(&name) {
                self.errors.push(Diagnostic {
                    message: messages::duplicate_module(&name),
                    span: module.name.span,
                    path: source.path.clone(),
                    module: Some(name),
                    severity: Severity::Error,
                    typing_context: None,
                });
                continue;
            }
            mod_names.push(name.clone());
            mod_map.insert(name, module);
        }

        if should_stop(&self.errors) || mod_map.is_empty() {
            if mod_map.is_empty() && self.opts.verbose {
                eprintln!("No files to compile");
            }
            return Ok(());
        }

        let mut graph: Dag<String, ()> = Dag::new(mod_map.len());
        for name in &mod_names {
            graph.add_node(name.clone(), ());
        }
        for name in &mod_names {
            let module = &mod_map[name];
            for import in &module.imports {
                if mod_map.contains_key(&import.module.val) && import.module.val != *name {
                    graph.link(&import.module.val, name);
                }
            }
        }

        if let Some(cycle) = graph.find_cycle() {
            let names: Vec<String> = cycle.iter().map(|&id| graph.val(id).clone()).collect();
            let message = messages::cycle_found(&names);
            for name in &names {
                let module = &mod_map[name];
                self.errors.push(Diagnostic {
                    message: message.clone(),
                    span: module.span,
                    path: module.source_name.clone(),
                    module: Some(name.clone()),
                    severity: Severity::Error,
                    typing_context: None,
                });
            }
            return Ok(());
        }

        for id in graph.toposort() {
            let name = graph.val(id).clone();
            let mut module = mod_map.remove(&name).expect("module is in the map");

            let mut tc = Typechecker::new();
            tc.set_module(&name, &module.source_name);

            let import_errors = resolver::resolve_imports(&mut module, &self.modules, &mut tc);
            self.errors.extend(import_errors);
            if should_stop(&self.errors) {
                return Ok(());
            }

            if self.opts.verbose {
                eprintln!("typechecking {name}");
            }

            let lowered = hir::lower::lower_module(&module, &mut tc);
            self.errors.extend(lowered.errors);
            let Some(core) = lowered.module else {
                if should_stop(&self.errors) {
                    return Ok(());
                }
                continue;
            };
            if should_stop(&self.errors) {
                return Ok(());
            }

            let module_env = match tc.infer(&core) {
                Ok(env) => env,
                Err(fatal) => {
                    self.errors.push(fatal);
                    self.errors.extend(tc.take_errors());
                    if should_stop(&self.errors) {
                        return Ok(());
                    }
                    continue;
                }
            };
            self.errors.extend(tc.take_errors());
            if should_stop(&self.errors) {
                return Ok(());
            }

            self.modules.insert(
                name,
                FullModuleEnv {
                    env: module_env,
                    ast: core,
                    aliases: lowered.aliases,
                    type_vars: tc.type_var_map.clone(),
                    comment: module.comment.clone(),
                    is_stdlib: false,
                },
            );
        }
        Ok(())
    }
}

fn should_stop(errors: &[Diagnostic]) -> bool {
    let mut count = 0;
    for err in errors {
        match err.severity {
            Severity::Fatal => return true,
            Severity::Error => count += 1,
            Severity::Warning => {}
        }
    }
    count > ERROR_THRESHOLD
}

///////////////////////////////////////////////
// module summaries for the CLI backend
///////////////////////////////////////////////

#[derive(Debug, Serialize)]
pub struct ModuleSummary {
    pub module: String,
    pub decls: BTreeMap<String, String>,
    pub types: BTreeMap<String, String>,
}

pub fn module_summary(name: &str, env: &FullModuleEnv) -> ModuleSummary {
    let decls = env
        .env
        .decls
        .iter()
        .map(|(decl_name, decl)| (decl_name.clone(), decl.ty.show_with(&env.type_vars)))
        .collect();
    let types = env
        .env
        .types
        .iter()
        .map(|(ty_name, decl)| (ty_name.clone(), decl.ty.show_with(&env.type_vars)))
        .collect();
    ModuleSummary {
        module: name.to_string(),
        decls,
        types,
    }
}

///////////////////////////////////////////////
// source discovery
///////////////////////////////////////////////

/// Expands a file or directory argument into compilable sources.
pub fn expand_target(target: &str) -> Result<Vec<Source>, MynaError> {
    let path = Path::new(target);
    if !path.exists() {
        return Err(MynaError::InvalidPath(target.to_string()));
    }
    if path.is_file() {
        return Ok(vec![Source::from_path(target)]);
    }

    let mut paths = Vec::new();
    collect_files(path, &mut paths)?;
    paths.sort();
    if paths.is_empty() {
        return Err(MynaError::InvalidPath(target.to_string()));
    }
    Ok(paths
        .into_iter()
        .map(|p| Source::from_path(p.display().to_string()))
        .collect())
}

fn collect_files(dir: &Path, paths: &mut Vec<PathBuf>) -> Result<(), MynaError> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let entry_path = entry.path();
        if entry_path.is_dir() {
            collect_files(&entry_path, paths)?;
            continue;
        }
        if entry_path.extension().and_then(|ext| ext.to_str()) == Some(SOURCE_EXTENSION) {
            paths.push(entry_path);
        }
    }
    Ok(())
}
