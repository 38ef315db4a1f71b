//! The core AST produced by lowering. Sugar is gone, lambdas are unary and
//! every expression and pattern carries a typed slot the inferencer writes
//! through.

pub mod lower;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::diagnostics::Span;
use crate::label_map::LabelMap;
use crate::lexer::Comment;
use crate::surface::{Import, Spanned, Visibility};
use crate::typecheck::types::Type;

/// Mutable slot filled in by type inference.
pub type TypeCell = Rc<RefCell<Option<Type>>>;

pub fn empty_cell() -> TypeCell {
    Rc::new(RefCell::new(None))
}

#[derive(Debug, Clone)]
pub struct Module {
    pub name: Spanned<String>,
    pub source_name: String,
    pub decls: Vec<Decl>,
    pub imports: Vec<Import>,
    pub unused_imports: HashMap<String, Span>,
    pub comment: Option<Comment>,
}

#[derive(Debug, Clone)]
pub enum Decl {
    Type(TypeDecl),
    Val(ValDecl),
}

#[derive(Debug, Clone)]
pub struct TypeDecl {
    pub name: Spanned<String>,
    pub ty_vars: Vec<String>,
    pub data_ctors: Vec<DataCtor>,
    pub span: Span,
    pub visibility: Visibility,
    pub comment: Option<Comment>,
}

#[derive(Debug, Clone)]
pub struct DataCtor {
    pub name: Spanned<String>,
    pub args: Vec<Type>,
    pub visibility: Visibility,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct ValDecl {
    pub name: Spanned<String>,
    pub exp: Expr,
    pub recursive: bool,
    pub span: Span,
    pub signature: Option<Signature>,
    pub visibility: Visibility,
    pub is_instance: bool,
    pub is_operator: bool,
    pub comment: Option<Comment>,
}

#[derive(Debug, Clone)]
pub struct Signature {
    pub ty: Type,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Binder {
    pub name: String,
    pub span: Span,
    pub is_implicit: bool,
    pub ty: Option<Type>,
}

#[derive(Debug, Clone)]
pub struct LetDef {
    pub binder: Binder,
    pub expr: Box<Expr>,
    pub recursive: bool,
    pub is_instance: bool,
}

#[derive(Debug, Clone)]
pub struct Case {
    pub patterns: Vec<Pattern>,
    pub exp: Expr,
    pub guard: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
    pub ty: TypeCell,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Int(i64),
    Float(f64),
    Complex(f64, f64),
    Char(char),
    Str(String),
    Bool(bool),
    Unit,
    Nil,
    Var {
        name: String,
        module: Option<String>,
        is_op: bool,
    },
    Ctor {
        name: String,
        module: Option<String>,
    },
    ImplicitVar {
        name: String,
        module: Option<String>,
    },
    Lambda {
        binder: Binder,
        body: Box<Expr>,
    },
    App {
        func: Box<Expr>,
        arg: Box<Expr>,
    },
    If {
        cond: Box<Expr>,
        then: Box<Expr>,
        els: Box<Expr>,
    },
    Let {
        def: LetDef,
        body: Box<Expr>,
    },
    Match {
        exps: Vec<Expr>,
        cases: Vec<Case>,
    },
    Ann {
        exp: Box<Expr>,
        ann_ty: Type,
    },
    Do {
        exps: Vec<Expr>,
    },
    RecordEmpty,
    RecordSelect {
        exp: Box<Expr>,
        label: Spanned<String>,
    },
    RecordExtend {
        labels: LabelMap<Expr>,
        exp: Box<Expr>,
    },
    RecordRestrict {
        exp: Box<Expr>,
        label: String,
    },
    RecordUpdate {
        exp: Box<Expr>,
        label: Spanned<String>,
        value: Box<Expr>,
        is_set: bool,
    },
    RecordMerge {
        exp1: Box<Expr>,
        exp2: Box<Expr>,
    },
    ListLiteral {
        exps: Vec<Expr>,
    },
    SetLiteral {
        exps: Vec<Expr>,
    },
    Index {
        exp: Box<Expr>,
        index: Box<Expr>,
    },
    While {
        cond: Box<Expr>,
        exps: Vec<Expr>,
    },
    TypeCast {
        exp: Box<Expr>,
        cast: Type,
    },
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Expr {
        Expr {
            kind,
            span,
            ty: empty_cell(),
        }
    }

    pub fn set_type(&self, ty: Type) -> Type {
        *self.ty.borrow_mut() = Some(ty.clone());
        ty
    }

    pub fn typ(&self) -> Option<Type> {
        self.ty.borrow().clone()
    }

    /// The module-qualified name of a reference, used for lookups.
    pub fn fullname(&self) -> Option<String> {
        match &self.kind {
            ExprKind::Var { name, module, .. }
            | ExprKind::Ctor { name, module }
            | ExprKind::ImplicitVar { name, module } => Some(qualified(name, module.as_deref())),
            _ => None,
        }
    }

    pub fn is_lambda(&self) -> bool {
        match &self.kind {
            ExprKind::Lambda { .. } => true,
            ExprKind::Ann { exp, .. } => exp.is_lambda(),
            _ => false,
        }
    }

    /// Walks the expression tree top-down.
    pub fn walk(&self, f: &mut impl FnMut(&Expr)) {
        f(self);
        match &self.kind {
            ExprKind::Lambda { body, .. } => body.walk(f),
            ExprKind::App { func, arg } => {
                func.walk(f);
                arg.walk(f);
            }
            ExprKind::If { cond, then, els } => {
                cond.walk(f);
                then.walk(f);
                els.walk(f);
            }
            ExprKind::Let { def, body } => {
                def.expr.walk(f);
                body.walk(f);
            }
            ExprKind::Match { exps, cases } => {
                for exp in exps {
                    exp.walk(f);
                }
                for case in cases {
                    case.exp.walk(f);
                    if let Some(guard) = &case.guard {
                        guard.walk(f);
                    }
                }
            }
            ExprKind::Ann { exp, .. }
            | ExprKind::RecordSelect { exp, .. }
            | ExprKind::RecordRestrict { exp, .. }
            | ExprKind::TypeCast { exp, .. } => exp.walk(f),
            ExprKind::Do { exps } | ExprKind::ListLiteral { exps } | ExprKind::SetLiteral { exps } => {
                for exp in exps {
                    exp.walk(f);
                }
            }
            ExprKind::RecordExtend { labels, exp } => {
                for value in labels.values() {
                    value.walk(f);
                }
                exp.walk(f);
            }
            ExprKind::RecordUpdate { exp, value, .. } => {
                value.walk(f);
                exp.walk(f);
            }
            ExprKind::RecordMerge { exp1, exp2 } => {
                exp1.walk(f);
                exp2.walk(f);
            }
            ExprKind::Index { exp, index } => {
                exp.walk(f);
                index.walk(f);
            }
            ExprKind::While { cond, exps } => {
                cond.walk(f);
                for exp in exps {
                    exp.walk(f);
                }
            }
            _ => {}
        }
    }

    /// All variable references in the tree, module-qualified.
    pub fn collect_vars(&self) -> Vec<String> {
        let mut vars = Vec::new();
        self.walk(&mut |exp| {
            if let ExprKind::Var { .. } = exp.kind {
                if let Some(name) = exp.fullname() {
                    vars.push(name);
                }
            }
        });
        vars
    }

    /// All references (values, ctors and implicits) the expression depends on.
    pub fn collect_references(&self) -> Vec<String> {
        let mut refs = Vec::new();
        self.walk(&mut |exp| {
            if let Some(name) = exp.fullname() {
                refs.push(name);
            }
        });
        refs
    }
}

pub fn qualified(name: &str, module: Option<&str>) -> String {
    match module {
        Some(module) => format!("{module}.{name}"),
        None => name.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct Pattern {
    pub kind: PatternKind,
    pub span: Span,
    pub ty: TypeCell,
}

#[derive(Debug, Clone)]
pub enum PatternKind {
    Wildcard,
    Literal(Box<Expr>),
    Var(String),
    Ctor {
        ctor: Box<Expr>,
        fields: Vec<Pattern>,
    },
    Record {
        labels: LabelMap<Pattern>,
    },
    List {
        elems: Vec<Pattern>,
        tail: Option<Box<Pattern>>,
    },
    Named {
        pat: Box<Pattern>,
        name: Spanned<String>,
    },
    Unit,
    TypeTest {
        test: Type,
        alias: Option<String>,
    },
    Regex(String),
}

impl Pattern {
    pub fn new(kind: PatternKind, span: Span) -> Pattern {
        Pattern {
            kind,
            span,
            ty: empty_cell(),
        }
    }

    pub fn set_type(&self, ty: Type) {
        *self.ty.borrow_mut() = Some(ty);
    }
}
