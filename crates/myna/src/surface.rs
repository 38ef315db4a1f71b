//! The source AST produced by the parser, before desugaring.

use std::collections::HashMap;

use crate::diagnostics::Span;
use crate::label_map::LabelMap;
use crate::lexer::Comment;

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub val: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(val: T, span: Span) -> Spanned<T> {
        Spanned { val, span }
    }

    pub fn offside(&self) -> usize {
        self.span.start.column
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private,
}

#[derive(Debug, Clone)]
pub struct SModule {
    pub name: Spanned<String>,
    pub source_name: String,
    pub imports: Vec<Import>,
    pub decls: Vec<SDecl>,
    pub span: Span,
    pub comment: Option<Comment>,
    /// name (possibly aliased) -> defining module, filled by import resolution
    pub resolved_imports: HashMap<String, String>,
    pub resolved_aliases: Vec<STypealias>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefTag {
    Var,
    Type,
}

/// A single name inside an import list. `all` means every public
/// constructor of the type is imported.
#[derive(Debug, Clone)]
pub struct DeclarationRef {
    pub tag: RefTag,
    pub name: Spanned<String>,
    pub span: Span,
    pub ctors: Vec<Spanned<String>>,
    pub all: bool,
}

#[derive(Debug, Clone)]
pub struct Import {
    pub module: Spanned<String>,
    pub span: Span,
    pub alias: Option<String>,
    pub comment: Option<Comment>,
    pub defs: Vec<DeclarationRef>,
}

#[derive(Debug, Clone)]
pub enum SDecl {
    Type(STypeDecl),
    Val(SValDecl),
    Typealias(STypealias),
}

impl SDecl {
    pub fn name(&self) -> &str {
        match self {
            SDecl::Type(d) => &d.binder.val,
            SDecl::Val(d) => &d.binder.val,
            SDecl::Typealias(d) => &d.name,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            SDecl::Type(d) => d.span,
            SDecl::Val(d) => d.span,
            SDecl::Typealias(d) => d.span,
        }
    }
}

#[derive(Debug, Clone)]
pub struct STypeDecl {
    pub binder: Spanned<String>,
    pub visibility: Visibility,
    pub ty_vars: Vec<String>,
    pub data_ctors: Vec<SDataCtor>,
    pub span: Span,
    pub comment: Option<Comment>,
}

#[derive(Debug, Clone)]
pub struct SValDecl {
    pub binder: Spanned<String>,
    pub pats: Vec<SPattern>,
    pub exp: SExpr,
    pub signature: Option<SSignature>,
    pub visibility: Visibility,
    pub is_instance: bool,
    pub is_operator: bool,
    pub span: Span,
    pub comment: Option<Comment>,
}

#[derive(Debug, Clone)]
pub struct STypealias {
    pub name: String,
    pub ty_vars: Vec<String>,
    pub ty: SType,
    pub visibility: Visibility,
    pub span: Span,
    pub comment: Option<Comment>,
    pub expanded: Option<SType>,
    pub free_vars: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SSignature {
    pub ty: SType,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct SDataCtor {
    pub name: Spanned<String>,
    pub args: Vec<SType>,
    pub visibility: Visibility,
    pub span: Span,
}

///////////////////////////////////////////////
// Expressions
///////////////////////////////////////////////

#[derive(Debug, Clone)]
pub enum SExpr {
    Int {
        v: i64,
        text: String,
        span: Span,
    },
    Float {
        v: f64,
        text: String,
        span: Span,
    },
    Complex {
        re: f64,
        im: f64,
        text: String,
        span: Span,
    },
    Str {
        v: String,
        raw: String,
        multi: bool,
        span: Span,
    },
    Char {
        v: char,
        raw: String,
        span: Span,
    },
    Bool {
        v: bool,
        span: Span,
    },
    Var {
        name: String,
        alias: Option<String>,
        span: Span,
    },
    Operator {
        name: String,
        alias: Option<String>,
        span: Span,
    },
    ImplicitVar {
        name: String,
        alias: Option<String>,
        span: Span,
    },
    Ctor {
        name: String,
        alias: Option<String>,
        span: Span,
    },
    PatternLiteral {
        regex: String,
        raw: String,
        span: Span,
    },
    Lambda {
        pats: Vec<SPattern>,
        body: Box<SExpr>,
        span: Span,
    },
    App {
        func: Box<SExpr>,
        arg: Box<SExpr>,
        span: Span,
    },
    BinApp {
        op: Box<SExpr>,
        left: Box<SExpr>,
        right: Box<SExpr>,
        span: Span,
    },
    If {
        cond: Box<SExpr>,
        then: Box<SExpr>,
        els: Option<Box<SExpr>>,
        span: Span,
    },
    Let {
        def: Box<SLetDef>,
        body: Box<SExpr>,
        span: Span,
    },
    Match {
        exprs: Vec<SExpr>,
        cases: Vec<SCase>,
        span: Span,
    },
    Ann {
        exp: Box<SExpr>,
        ty: SType,
        span: Span,
    },
    Do {
        exps: Vec<SExpr>,
        span: Span,
    },
    DoLet {
        def: Box<SLetDef>,
        span: Span,
    },
    LetBang {
        def: Box<SLetDef>,
        body: Option<Box<SExpr>>,
        span: Span,
    },
    For {
        def: Box<SLetDef>,
        body: Box<SExpr>,
        span: Span,
    },
    DoBang {
        exp: Box<SExpr>,
        span: Span,
    },
    Return {
        exp: Box<SExpr>,
        span: Span,
    },
    Yield {
        exp: Box<SExpr>,
        span: Span,
    },
    Parens {
        exp: Box<SExpr>,
        span: Span,
    },
    Unit {
        span: Span,
    },
    RecordEmpty {
        span: Span,
    },
    RecordSelect {
        exp: Box<SExpr>,
        labels: Vec<Spanned<String>>,
        span: Span,
    },
    RecordExtend {
        labels: LabelMap<SExpr>,
        exp: Box<SExpr>,
        span: Span,
    },
    RecordRestrict {
        exp: Box<SExpr>,
        labels: Vec<String>,
        span: Span,
    },
    RecordUpdate {
        exp: Box<SExpr>,
        labels: Vec<Spanned<String>>,
        val: Box<SExpr>,
        is_set: bool,
        span: Span,
    },
    RecordMerge {
        exp1: Box<SExpr>,
        exp2: Box<SExpr>,
        span: Span,
    },
    ListLiteral {
        exps: Vec<SExpr>,
        span: Span,
    },
    SetLiteral {
        exps: Vec<SExpr>,
        span: Span,
    },
    Index {
        exp: Box<SExpr>,
        index: Box<SExpr>,
        span: Span,
    },
    Underscore {
        span: Span,
    },
    While {
        cond: Box<SExpr>,
        exps: Vec<SExpr>,
        span: Span,
    },
    Computation {
        builder: Spanned<String>,
        exps: Vec<SExpr>,
        span: Span,
    },
    Nil {
        span: Span,
    },
    TypeCast {
        exp: Box<SExpr>,
        cast: SType,
        span: Span,
    },
}

impl SExpr {
    pub fn span(&self) -> Span {
        match self {
            SExpr::Int { span, .. }
            | SExpr::Float { span, .. }
            | SExpr::Complex { span, .. }
            | SExpr::Str { span, .. }
            | SExpr::Char { span, .. }
            | SExpr::Bool { span, .. }
            | SExpr::Var { span, .. }
            | SExpr::Operator { span, .. }
            | SExpr::ImplicitVar { span, .. }
            | SExpr::Ctor { span, .. }
            | SExpr::PatternLiteral { span, .. }
            | SExpr::Lambda { span, .. }
            | SExpr::App { span, .. }
            | SExpr::BinApp { span, .. }
            | SExpr::If { span, .. }
            | SExpr::Let { span, .. }
            | SExpr::Match { span, .. }
            | SExpr::Ann { span, .. }
            | SExpr::Do { span, .. }
            | SExpr::DoLet { span, .. }
            | SExpr::LetBang { span, .. }
            | SExpr::For { span, .. }
            | SExpr::DoBang { span, .. }
            | SExpr::Return { span, .. }
            | SExpr::Yield { span, .. }
            | SExpr::Parens { span, .. }
            | SExpr::Unit { span }
            | SExpr::RecordEmpty { span }
            | SExpr::RecordSelect { span, .. }
            | SExpr::RecordExtend { span, .. }
            | SExpr::RecordRestrict { span, .. }
            | SExpr::RecordUpdate { span, .. }
            | SExpr::RecordMerge { span, .. }
            | SExpr::ListLiteral { span, .. }
            | SExpr::SetLiteral { span, .. }
            | SExpr::Index { span, .. }
            | SExpr::Underscore { span }
            | SExpr::While { span, .. }
            | SExpr::Computation { span, .. }
            | SExpr::Nil { span }
            | SExpr::TypeCast { span, .. } => *span,
        }
    }

    pub fn is_operator(&self) -> bool {
        matches!(self, SExpr::Operator { .. })
    }

    /// Expressions allowed as a `while` condition.
    pub fn is_simple(&self) -> bool {
        match self {
            SExpr::If { .. }
            | SExpr::Let { .. }
            | SExpr::Match { .. }
            | SExpr::Do { .. }
            | SExpr::DoLet { .. }
            | SExpr::While { .. }
            | SExpr::Computation { .. } => false,
            SExpr::Ann { exp, .. } => exp.is_simple(),
            _ => true,
        }
    }
}

pub fn fullname(name: &str, alias: Option<&str>) -> String {
    match alias {
        Some(alias) => format!("{alias}.{name}"),
        None => name.to_string(),
    }
}

///////////////////////////////////////////////
// Cases and let definitions
///////////////////////////////////////////////

#[derive(Debug, Clone)]
pub struct SCase {
    pub pats: Vec<SPattern>,
    pub exp: SExpr,
    pub guard: Option<SExpr>,
}

impl SCase {
    pub fn pattern_span(&self) -> Span {
        Span::new(self.pats[0].span(), self.pats[self.pats.len() - 1].span())
    }
}

#[derive(Debug, Clone)]
pub enum SLetDef {
    Bind {
        expr: SExpr,
        name: SBinder,
        pats: Vec<SPattern>,
        is_instance: bool,
        ty: Option<SType>,
    },
    Pat {
        expr: SExpr,
        pat: SPattern,
    },
}

impl SLetDef {
    pub fn expr(&self) -> &SExpr {
        match self {
            SLetDef::Bind { expr, .. } => expr,
            SLetDef::Pat { expr, .. } => expr,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SBinder {
    pub name: String,
    pub span: Span,
    pub is_implicit: bool,
}

///////////////////////////////////////////////
// Patterns
///////////////////////////////////////////////

#[derive(Debug, Clone)]
pub enum SPattern {
    Wildcard {
        span: Span,
    },
    Literal {
        lit: Box<SExpr>,
        span: Span,
    },
    Var {
        name: String,
        span: Span,
    },
    Ctor {
        name: String,
        alias: Option<String>,
        fields: Vec<SPattern>,
        span: Span,
    },
    Record {
        labels: LabelMap<SPattern>,
        span: Span,
    },
    List {
        elems: Vec<SPattern>,
        tail: Option<Box<SPattern>>,
        span: Span,
    },
    Named {
        pat: Box<SPattern>,
        name: Spanned<String>,
        span: Span,
    },
    Unit {
        span: Span,
    },
    TypeTest {
        ty: SType,
        alias: Option<String>,
        span: Span,
    },
    Implicit {
        pat: Box<SPattern>,
        span: Span,
    },
    Tuple {
        p1: Box<SPattern>,
        p2: Box<SPattern>,
        span: Span,
    },
    Regex {
        regex: String,
        raw: String,
        span: Span,
    },
    // desugar-only
    Parens {
        pat: Box<SPattern>,
        span: Span,
    },
    // desugar-only
    TypeAnnotation {
        binder: Spanned<String>,
        ty: SType,
        span: Span,
    },
}

impl SPattern {
    pub fn span(&self) -> Span {
        match self {
            SPattern::Wildcard { span }
            | SPattern::Literal { span, .. }
            | SPattern::Var { span, .. }
            | SPattern::Ctor { span, .. }
            | SPattern::Record { span, .. }
            | SPattern::List { span, .. }
            | SPattern::Named { span, .. }
            | SPattern::Unit { span }
            | SPattern::TypeTest { span, .. }
            | SPattern::Implicit { span, .. }
            | SPattern::Tuple { span, .. }
            | SPattern::Regex { span, .. }
            | SPattern::Parens { span, .. }
            | SPattern::TypeAnnotation { span, .. } => *span,
        }
    }
}

///////////////////////////////////////////////
// Source types
///////////////////////////////////////////////

#[derive(Debug, Clone, PartialEq)]
pub enum SType {
    Const {
        name: String,
        alias: Option<String>,
        span: Span,
    },
    App {
        ty: Box<SType>,
        types: Vec<SType>,
        span: Span,
    },
    Fun {
        arg: Box<SType>,
        ret: Box<SType>,
        span: Span,
    },
    Parens {
        ty: Box<SType>,
        span: Span,
    },
    Record {
        row: Box<SType>,
        span: Span,
    },
    RowEmpty {
        span: Span,
    },
    RowExtend {
        labels: LabelMap<SType>,
        row: Box<SType>,
        span: Span,
    },
    Implicit {
        ty: Box<SType>,
        span: Span,
    },
}

impl SType {
    pub fn span(&self) -> Span {
        match self {
            SType::Const { span, .. }
            | SType::App { span, .. }
            | SType::Fun { span, .. }
            | SType::Parens { span, .. }
            | SType::Record { span, .. }
            | SType::RowEmpty { span }
            | SType::RowExtend { span, .. }
            | SType::Implicit { span, .. } => *span,
        }
    }

    pub fn with_span(mut self, new_span: Span) -> SType {
        match &mut self {
            SType::Const { span, .. }
            | SType::App { span, .. }
            | SType::Fun { span, .. }
            | SType::Parens { span, .. }
            | SType::Record { span, .. }
            | SType::RowEmpty { span }
            | SType::RowExtend { span, .. }
            | SType::Implicit { span, .. } => *span = new_span,
        }
        self
    }

    /// Rebuilds the type bottom-up, applying `f` to every node.
    pub fn everywhere(&self, f: &mut impl FnMut(SType) -> SType) -> SType {
        let rebuilt = match self {
            SType::Const { .. } | SType::RowEmpty { .. } => self.clone(),
            SType::App { ty, types, span } => SType::App {
                ty: Box::new(ty.everywhere(f)),
                types: types.iter().map(|t| t.everywhere(f)).collect(),
                span: *span,
            },
            SType::Fun { arg, ret, span } => SType::Fun {
                arg: Box::new(arg.everywhere(f)),
                ret: Box::new(ret.everywhere(f)),
                span: *span,
            },
            SType::Parens { ty, span } => SType::Parens {
                ty: Box::new(ty.everywhere(f)),
                span: *span,
            },
            SType::Record { row, span } => SType::Record {
                row: Box::new(row.everywhere(f)),
                span: *span,
            },
            SType::RowExtend { labels, row, span } => SType::RowExtend {
                labels: labels.map_values(|t| t.everywhere(f)),
                row: Box::new(row.everywhere(f)),
                span: *span,
            },
            SType::Implicit { ty, span } => SType::Implicit {
                ty: Box::new(ty.everywhere(f)),
                span: *span,
            },
        };
        f(rebuilt)
    }

    /// Substitutes every constant named `from` by `to`.
    pub fn subst_var(&self, from: &str, to: &SType) -> SType {
        self.everywhere(&mut |ty| match &ty {
            SType::Const { name, .. } if name == from => to.clone(),
            _ => ty,
        })
    }

    /// Collects lower-case constants not bound by `bound`, in occurrence order.
    pub fn free_vars(&self, bound: &[String]) -> Vec<String> {
        let mut res = Vec::new();
        self.collect_free_vars(bound, &mut res);
        res
    }

    fn collect_free_vars(&self, bound: &[String], acc: &mut Vec<String>) {
        match self {
            SType::Const { name, .. } => {
                let lower = name
                    .chars()
                    .next()
                    .map(|c| c.is_lowercase())
                    .unwrap_or(false);
                if lower && !bound.contains(name) && !acc.contains(name) {
                    acc.push(name.clone());
                }
            }
            SType::App { ty, types, .. } => {
                ty.collect_free_vars(bound, acc);
                for t in types {
                    t.collect_free_vars(bound, acc);
                }
            }
            SType::Fun { arg, ret, .. } => {
                arg.collect_free_vars(bound, acc);
                ret.collect_free_vars(bound, acc);
            }
            SType::Parens { ty, .. } | SType::Implicit { ty, .. } => {
                ty.collect_free_vars(bound, acc)
            }
            SType::Record { row, .. } => row.collect_free_vars(bound, acc),
            SType::RowEmpty { .. } => {}
            SType::RowExtend { labels, row, .. } => {
                for t in labels.values() {
                    t.collect_free_vars(bound, acc);
                }
                row.collect_free_vars(bound, acc);
            }
        }
    }
}

impl std::fmt::Display for SType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SType::Const { name, alias, .. } => match alias {
                Some(alias) => write!(f, "{alias}.{name}"),
                None => write!(f, "{name}"),
            },
            SType::App { ty, types, .. } => {
                write!(f, "{ty}")?;
                for t in types {
                    write!(f, " {t}")?;
                }
                Ok(())
            }
            SType::Fun { arg, ret, .. } => write!(f, "{arg} -> {ret}"),
            SType::Parens { ty, .. } => write!(f, "({ty})"),
            SType::Record { row, .. } => match row.as_ref() {
                SType::RowEmpty { .. } => write!(f, "{{}}"),
                SType::RowExtend { .. } => {
                    let rows = row.to_string();
                    write!(f, "{{{}}}", &rows[1..rows.len() - 1])
                }
                _ => write!(f, "{{ | {row} }}"),
            },
            SType::RowEmpty { .. } => write!(f, "[]"),
            SType::RowExtend { labels, .. } => {
                let shown = labels.show(|k, v| format!("{k} : {v}"));
                write!(f, "[ {shown} ]")
            }
            SType::Implicit { ty, .. } => write!(f, "{{{{ {ty} }}}}"),
        }
    }
}
