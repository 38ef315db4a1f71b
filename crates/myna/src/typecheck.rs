//! The typechecker: algorithm W with levels, row polymorphism and scoped
//! generalization. One instance checks one module at a time; the variable id
//! counter and the typing context are never shared between modules.

pub mod env;
mod infer;
pub mod types;
mod unify;

use std::collections::{HashMap, HashSet};

use crate::diagnostics::{Diagnostic, Severity, Span};
use crate::hir;

use self::env::{Env, ModuleEnv};
use self::types::{Id, Level, Type, TypeVar};

pub struct Typechecker {
    pub type_var_map: HashMap<Id, String>,
    current_id: Id,
    pub env: Env,
    errors: Vec<Diagnostic>,
    pvt_types: HashSet<String>,
    mod_name: String,
    source_name: String,
    context_decl: Option<String>,
    context_types: Vec<Type>,
}

impl Default for Typechecker {
    fn default() -> Self {
        Self::new()
    }
}

impl Typechecker {
    pub fn new() -> Typechecker {
        Typechecker {
            type_var_map: HashMap::new(),
            current_id: 0,
            env: Env::with_primitives(),
            errors: Vec::new(),
            pvt_types: HashSet::new(),
            mod_name: String::new(),
            source_name: String::new(),
            context_decl: None,
            context_types: Vec::new(),
        }
    }

    pub fn set_module(&mut self, name: &str, source_name: &str) {
        self.mod_name = name.to_string();
        self.source_name = source_name.to_string();
    }

    pub fn errors(&self) -> &[Diagnostic] {
        &self.errors
    }

    pub fn take_errors(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.errors)
    }

    pub fn new_var(&mut self, level: Level) -> Type {
        self.current_id += 1;
        Type::var(TypeVar::Unbound {
            id: self.current_id,
            level,
        })
    }

    pub fn new_gen_var(&mut self) -> Type {
        self.current_id += 1;
        Type::var(TypeVar::Generic {
            id: self.current_id,
        })
    }

    /// A generic variable remembering its source-level display name.
    pub fn new_gen_var_name(&mut self, name: &str) -> Type {
        self.current_id += 1;
        self.type_var_map
            .insert(self.current_id, name.to_string());
        Type::var(TypeVar::Generic {
            id: self.current_id,
        })
    }

    pub fn show(&self, ty: &Type) -> String {
        ty.show_with(&self.type_var_map)
    }

    /// Runs inference on a whole module. A returned error is fatal for the
    /// module; per-declaration failures land in `errors()`.
    pub fn infer(&mut self, module: &hir::Module) -> Result<ModuleEnv, Diagnostic> {
        self.context_decl = None;
        self.context_types.clear();
        self.infer_module(module)
    }

    /// Replaces every `Generic` variable by a fresh `Unbound` at `level`,
    /// consistently within the type.
    pub fn instantiate(&mut self, level: Level, ty: &Type) -> Type {
        let mut id_map: HashMap<Id, Type> = HashMap::new();
        self.instantiate_inner(level, ty, &mut id_map)
    }

    fn instantiate_inner(&mut self, level: Level, ty: &Type, id_map: &mut HashMap<Id, Type>) -> Type {
        match ty {
            Type::Const { .. } | Type::RowEmpty { .. } => ty.clone(),
            Type::Var { tvar, .. } => {
                let inner = tvar.borrow().clone();
                match inner {
                    TypeVar::Link { ty } => self.instantiate_inner(level, &ty, id_map),
                    TypeVar::Generic { id } => match id_map.get(&id) {
                        Some(fresh) => fresh.clone(),
                        None => {
                            let fresh = self.new_var(level);
                            id_map.insert(id, fresh.clone());
                            fresh
                        }
                    },
                    TypeVar::Unbound { .. } => ty.clone(),
                }
            }
            Type::App { base, args, span } => Type::App {
                base: Box::new(self.instantiate_inner(level, base, id_map)),
                args: args
                    .iter()
                    .map(|t| self.instantiate_inner(level, t, id_map))
                    .collect(),
                span: *span,
            },
            Type::Arrow { args, ret, span } => Type::Arrow {
                args: args
                    .iter()
                    .map(|t| self.instantiate_inner(level, t, id_map))
                    .collect(),
                ret: Box::new(self.instantiate_inner(level, ret, id_map)),
                span: *span,
            },
            Type::Implicit { ty, span } => Type::Implicit {
                ty: Box::new(self.instantiate_inner(level, ty, id_map)),
                span: *span,
            },
            Type::Record { row, span } => Type::Record {
                row: Box::new(self.instantiate_inner(level, row, id_map)),
                span: *span,
            },
            Type::RowExtend { labels, row, span } => Type::RowExtend {
                labels: labels.map_values(|t| self.instantiate_inner(level, t, id_map)),
                row: Box::new(self.instantiate_inner(level, row, id_map)),
                span: *span,
            },
        }
    }

    /// Turns every `Unbound` variable deeper than `level` into a `Generic`.
    /// `level = -1` generalizes everything at the module top level.
    pub fn generalize(&self, level: Level, ty: &Type) -> Type {
        match ty {
            Type::Var { tvar, span } => {
                let inner = tvar.borrow().clone();
                match inner {
                    TypeVar::Link { ty } => self.generalize(level, &ty),
                    TypeVar::Unbound { id, level: l } if l > level => Type::Var {
                        tvar: std::rc::Rc::new(std::cell::RefCell::new(TypeVar::Generic { id })),
                        span: *span,
                    },
                    _ => ty.clone(),
                }
            }
            Type::App { base, args, span } => Type::App {
                base: Box::new(self.generalize(level, base)),
                args: args.iter().map(|t| self.generalize(level, t)).collect(),
                span: *span,
            },
            Type::Arrow { args, ret, span } => Type::Arrow {
                args: args.iter().map(|t| self.generalize(level, t)).collect(),
                ret: Box::new(self.generalize(level, ret)),
                span: *span,
            },
            Type::Implicit { ty, span } => Type::Implicit {
                ty: Box::new(self.generalize(level, ty)),
                span: *span,
            },
            Type::Record { row, span } => Type::Record {
                row: Box::new(self.generalize(level, row)),
                span: *span,
            },
            Type::RowExtend { labels, row, span } => Type::RowExtend {
                labels: labels.map_values(|t| self.generalize(level, t)),
                row: Box::new(self.generalize(level, row)),
                span: *span,
            },
            _ => ty.clone(),
        }
    }

    /// Post-inference validation: every constant must be declared and used
    /// with its declared kind; leftover unbound variables are reported.
    pub fn check_well_formed(&self, ty: &Type, span: Span) -> Result<(), Diagnostic> {
        match ty {
            Type::Const { name, kind, .. } => {
                let Some(env_ty) = self.env.lookup_type(name) else {
                    return Err(self.make_error(crate::messages::undefined_type(name), span));
                };
                if *kind != env_ty.kind() {
                    return Err(self.make_error(
                        crate::messages::wrong_kind(&kind.to_string(), &env_ty.kind().to_string()),
                        span,
                    ));
                }
                Ok(())
            }
            Type::App { base, args, .. } => {
                self.check_well_formed(base, span)?;
                for arg in args {
                    self.check_well_formed(arg, span)?;
                }
                Ok(())
            }
            Type::Arrow { args, ret, .. } => {
                self.check_well_formed(ret, span)?;
                for arg in args {
                    self.check_well_formed(arg, span)?;
                }
                Ok(())
            }
            Type::Var { tvar, .. } => {
                let inner = tvar.borrow().clone();
                match inner {
                    TypeVar::Link { ty } => self.check_well_formed(&ty, span),
                    TypeVar::Unbound { .. } => {
                        Err(self.make_error(crate::messages::unused_variable(&self.show(ty)), span))
                    }
                    TypeVar::Generic { .. } => Ok(()),
                }
            }
            Type::Record { row, .. } => self.check_well_formed(row, span),
            Type::RowExtend { labels, row, .. } => {
                self.check_well_formed(row, span)?;
                for ty in labels.values() {
                    self.check_well_formed(ty, span)?;
                }
                Ok(())
            }
            Type::Implicit { ty, .. } => self.check_well_formed(ty, span),
            Type::RowEmpty { .. } => Ok(()),
        }
    }

    pub fn make_error(&self, msg: String, span: Span) -> Diagnostic {
        Diagnostic {
            message: msg,
            span,
            path: self.source_name.clone(),
            module: Some(self.mod_name.clone()),
            severity: Severity::Error,
            typing_context: self.format_typing_context(),
        }
    }

    fn add_error(&mut self, err: Diagnostic) {
        self.errors.push(err);
    }

    fn format_typing_context(&self) -> Option<String> {
        let mut out = String::new();
        if let Some(ty) = self.context_types.last() {
            out.push_str(&format!("while checking type {}\n", self.show(ty)));
        }
        if let Some(decl) = &self.context_decl {
            out.push_str(&format!("in declaration {decl}"));
        }
        if out.is_empty() {
            None
        } else {
            Some(format!("{out}\n\n"))
        }
    }
}
