//! Typing environments and persisted module environments.
//!
//! Environments fork cheaply: the maps are `im` persistent maps, so nested
//! scopes get structurally-shared copies that never leak bindings outward.

use std::collections::HashMap;

use im::HashMap as Map;

use crate::diagnostics::Span;
use crate::hir;
use crate::lexer::Comment;
use crate::surface::{STypealias, Visibility};

use super::types::{Kind, Type};

#[derive(Debug, Clone)]
pub struct InstanceEnv {
    pub ty: Type,
    pub is_lambda_var: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Env {
    env: Map<String, Type>,
    types: Map<String, Type>,
    instances: Map<String, InstanceEnv>,
}

pub const PRIM_INT: &str = "Int";
pub const PRIM_INT8: &str = "Int8";
pub const PRIM_INT16: &str = "Int16";
pub const PRIM_INT32: &str = "Int32";
pub const PRIM_INT64: &str = "Int64";
pub const PRIM_UINT: &str = "Uint";
pub const PRIM_UINT8: &str = "Uint8";
pub const PRIM_UINT16: &str = "Uint16";
pub const PRIM_UINT32: &str = "Uint32";
pub const PRIM_UINT64: &str = "Uint64";
pub const PRIM_UINTPTR: &str = "Uintptr";
pub const PRIM_FLOAT32: &str = "Float32";
pub const PRIM_FLOAT64: &str = "Float64";
pub const PRIM_COMPLEX64: &str = "Complex64";
pub const PRIM_COMPLEX128: &str = "Complex128";
pub const PRIM_BYTE: &str = "Byte";
pub const PRIM_BOOL: &str = "Bool";
pub const PRIM_STRING: &str = "String";
pub const PRIM_RUNE: &str = "Rune";
pub const PRIM_UNIT: &str = "Unit";
pub const PRIM_LIST: &str = "List";
pub const PRIM_SET: &str = "Set";
pub const PRIM_TUPLE: &str = "Tuple";
pub const PRIM_OPTION: &str = "Option";

/// The module prelude values like `Tuple` live in.
pub const CORE_MODULE: &str = "myna.core";

pub const PRIM_TYPE_NAMES: &[&str] = &[
    PRIM_BYTE,
    PRIM_INT,
    PRIM_INT8,
    PRIM_INT16,
    PRIM_INT32,
    PRIM_INT64,
    PRIM_UINT,
    PRIM_UINT8,
    PRIM_UINT16,
    PRIM_UINT32,
    PRIM_UINT64,
    PRIM_UINTPTR,
    PRIM_FLOAT32,
    PRIM_FLOAT64,
    PRIM_COMPLEX64,
    PRIM_COMPLEX128,
    PRIM_BOOL,
    PRIM_RUNE,
    PRIM_STRING,
    PRIM_UNIT,
    PRIM_LIST,
    PRIM_SET,
    PRIM_TUPLE,
    PRIM_OPTION,
];

pub fn is_prim_type(name: &str) -> bool {
    PRIM_TYPE_NAMES.contains(&name)
}

impl Env {
    pub fn new() -> Env {
        Env::default()
    }

    pub fn with_primitives() -> Env {
        let mut env = Env::new();
        for name in PRIM_TYPE_NAMES {
            let kind = match *name {
                PRIM_LIST | PRIM_SET | PRIM_OPTION => Kind::Ctor(1),
                PRIM_TUPLE => Kind::Ctor(2),
                _ => Kind::Star,
            };
            env.extend_type(
                *name,
                Type::Const {
                    name: name.to_string(),
                    kind,
                    span: Span::empty(),
                },
            );
        }
        env
    }

    pub fn extend(&mut self, name: impl Into<String>, ty: Type) {
        self.env.insert(name.into(), ty);
    }

    pub fn lookup(&self, name: &str) -> Option<&Type> {
        self.env.get(name)
    }

    pub fn remove(&mut self, name: &str) {
        self.env.remove(name);
    }

    pub fn extend_type(&mut self, name: impl Into<String>, ty: Type) {
        self.types.insert(name.into(), ty);
    }

    pub fn lookup_type(&self, name: &str) -> Option<&Type> {
        self.types.get(name)
    }

    pub fn extend_instance(&mut self, name: impl Into<String>, ty: Type, is_lambda_var: bool) {
        self.instances
            .insert(name.into(), InstanceEnv { ty, is_lambda_var });
    }

    pub fn instances(&self) -> impl Iterator<Item = (&String, &InstanceEnv)> {
        self.instances.iter()
    }

    /// An independent copy; bindings added to the fork never leak back.
    pub fn fork(&self) -> Env {
        self.clone()
    }
}

///////////////////////////////////////////////
// persisted module environments
///////////////////////////////////////////////

#[derive(Debug, Clone)]
pub struct DeclRef {
    pub ty: Type,
    pub visibility: Visibility,
    pub is_instance: bool,
    pub comment: Option<Comment>,
}

#[derive(Debug, Clone)]
pub struct TypeDeclRef {
    pub ty: Type,
    pub visibility: Visibility,
    pub ctors: Vec<String>,
    pub comment: Option<Comment>,
}

#[derive(Debug, Clone, Default)]
pub struct ModuleEnv {
    pub decls: HashMap<String, DeclRef>,
    pub types: HashMap<String, TypeDeclRef>,
}

#[derive(Debug, Clone)]
pub struct FullModuleEnv {
    pub env: ModuleEnv,
    pub ast: hir::Module,
    pub aliases: Vec<STypealias>,
    pub type_vars: HashMap<super::types::Id, String>,
    pub comment: Option<Comment>,
    pub is_stdlib: bool,
}
