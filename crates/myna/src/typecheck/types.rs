//! Core types with mutable type-variable cells.
//!
//! Cloning a `Type::Var` shares the underlying cell, so installing a `Link`
//! during unification is visible through every copy of the variable.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::diagnostics::Span;
use crate::label_map::LabelMap;

pub type Id = u32;
pub type Level = i64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Kind {
    Star,
    Ctor(usize),
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Kind::Star => write!(f, "Type"),
            Kind::Ctor(arity) => {
                for _ in 0..*arity {
                    write!(f, "Type -> ")?;
                }
                write!(f, "Type")
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum TypeVar {
    Unbound { id: Id, level: Level },
    Link { ty: Type },
    Generic { id: Id },
}

pub type TypeVarCell = Rc<RefCell<TypeVar>>;

#[derive(Debug, Clone)]
pub enum Type {
    Const {
        name: String,
        kind: Kind,
        span: Span,
    },
    App {
        base: Box<Type>,
        args: Vec<Type>,
        span: Span,
    },
    /// Arrows are unary in practice; the vector is kept for a future
    /// multi-argument calling convention.
    Arrow {
        args: Vec<Type>,
        ret: Box<Type>,
        span: Span,
    },
    Var {
        tvar: TypeVarCell,
        span: Span,
    },
    Implicit {
        ty: Box<Type>,
        span: Span,
    },
    Record {
        row: Box<Type>,
        span: Span,
    },
    RowEmpty {
        span: Span,
    },
    RowExtend {
        labels: LabelMap<Type>,
        row: Box<Type>,
        span: Span,
    },
}

impl Type {
    pub fn tconst(name: impl Into<String>) -> Type {
        Type::Const {
            name: name.into(),
            kind: Kind::Star,
            span: Span::empty(),
        }
    }

    pub fn arrow(arg: Type, ret: Type) -> Type {
        Type::Arrow {
            args: vec![arg],
            ret: Box::new(ret),
            span: Span::empty(),
        }
    }

    pub fn var(tvar: TypeVar) -> Type {
        Type::Var {
            tvar: Rc::new(RefCell::new(tvar)),
            span: Span::empty(),
        }
    }

    pub fn record(row: Type) -> Type {
        Type::Record {
            row: Box::new(row),
            span: Span::empty(),
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Type::Const { span, .. }
            | Type::App { span, .. }
            | Type::Arrow { span, .. }
            | Type::Var { span, .. }
            | Type::Implicit { span, .. }
            | Type::Record { span, .. }
            | Type::RowEmpty { span }
            | Type::RowExtend { span, .. } => *span,
        }
    }

    pub fn with_span(mut self, new_span: Span) -> Type {
        match &mut self {
            Type::Const { span, .. }
            | Type::App { span, .. }
            | Type::Arrow { span, .. }
            | Type::Var { span, .. }
            | Type::Implicit { span, .. }
            | Type::Record { span, .. }
            | Type::RowEmpty { span }
            | Type::RowExtend { span, .. } => *span = new_span,
        }
        self
    }

    pub fn kind(&self) -> Kind {
        match self {
            Type::Const { kind, .. } => kind.clone(),
            Type::Arrow { .. } => Kind::Ctor(1),
            Type::App { base, .. } => base.kind(),
            Type::Var { tvar, .. } => match &*tvar.borrow() {
                TypeVar::Link { ty } => ty.kind(),
                _ => Kind::Star,
            },
            // row kinds are an approximation for now
            Type::RowEmpty { .. } => Kind::Star,
            Type::Record { row, .. } => row.kind(),
            Type::RowExtend { row, .. } => row.kind(),
            Type::Implicit { ty, .. } => ty.kind(),
        }
    }

    /// Follows `Link` chains to the representative type.
    pub fn real_type(&self) -> Type {
        if let Type::Var { tvar, .. } = self {
            if let TypeVar::Link { ty } = &*tvar.borrow() {
                return ty.real_type();
            }
        }
        self.clone()
    }

    pub fn equals(&self, other: &Type) -> bool {
        match (self, other) {
            (Type::Const { name: a, .. }, Type::Const { name: b, .. }) => a == b,
            (
                Type::App { base: b1, args: a1, .. },
                Type::App { base: b2, args: a2, .. },
            ) => {
                b1.equals(b2)
                    && a1.len() == a2.len()
                    && a1.iter().zip(a2.iter()).all(|(x, y)| x.equals(y))
            }
            (
                Type::Arrow { args: a1, ret: r1, .. },
                Type::Arrow { args: a2, ret: r2, .. },
            ) => {
                r1.equals(r2)
                    && a1.len() == a2.len()
                    && a1.iter().zip(a2.iter()).all(|(x, y)| x.equals(y))
            }
            (Type::Var { tvar: v1, .. }, Type::Var { tvar: v2, .. }) => {
                let v1 = v1.borrow();
                let v2 = v2.borrow();
                match (&*v1, &*v2) {
                    (TypeVar::Link { ty: t1 }, TypeVar::Link { ty: t2 }) => t1.equals(t2),
                    (
                        TypeVar::Unbound { id: i1, level: l1 },
                        TypeVar::Unbound { id: i2, level: l2 },
                    ) => i1 == i2 && l1 == l2,
                    (TypeVar::Generic { id: i1 }, TypeVar::Generic { id: i2 }) => i1 == i2,
                    _ => false,
                }
            }
            (Type::RowEmpty { .. }, Type::RowEmpty { .. }) => true,
            (Type::Record { row: r1, .. }, Type::Record { row: r2, .. }) => r1.equals(r2),
            (
                Type::RowExtend { labels: l1, row: r1, .. },
                Type::RowExtend { labels: l2, row: r2, .. },
            ) => {
                if !r1.equals(r2) || l1.len() != l2.len() {
                    return false;
                }
                l1.entries()
                    .iter()
                    .zip(l2.entries().iter())
                    .all(|(e1, e2)| e1.label == e2.label && e1.val.equals(&e2.val))
            }
            (Type::Implicit { ty: t1, .. }, Type::Implicit { ty: t2, .. }) => t1.equals(t2),
            _ => false,
        }
    }

    /// Walks the type top-down, following links.
    pub fn walk(&self, f: &mut impl FnMut(&Type)) {
        f(self);
        match self {
            Type::App { base, args, .. } => {
                base.walk(f);
                for arg in args {
                    arg.walk(f);
                }
            }
            Type::Arrow { args, ret, .. } => {
                for arg in args {
                    arg.walk(f);
                }
                ret.walk(f);
            }
            Type::Var { tvar, .. } => {
                let link = match &*tvar.borrow() {
                    TypeVar::Link { ty } => Some(ty.clone()),
                    _ => None,
                };
                if let Some(ty) = link {
                    ty.walk(f);
                }
            }
            Type::Record { row, .. } => row.walk(f),
            Type::RowExtend { labels, row, .. } => {
                for ty in labels.values() {
                    ty.walk(f);
                }
                row.walk(f);
            }
            Type::Implicit { ty, .. } => ty.walk(f),
            _ => {}
        }
    }

    /// Substitutes constants by name.
    pub fn subst_const(&self, mapping: &HashMap<String, Type>) -> Type {
        match self {
            Type::Const { name, .. } => match mapping.get(name) {
                Some(ty) => ty.clone(),
                None => self.clone(),
            },
            Type::App { base, args, span } => Type::App {
                base: Box::new(base.subst_const(mapping)),
                args: args.iter().map(|t| t.subst_const(mapping)).collect(),
                span: *span,
            },
            Type::Arrow { args, ret, span } => Type::Arrow {
                args: args.iter().map(|t| t.subst_const(mapping)).collect(),
                ret: Box::new(ret.subst_const(mapping)),
                span: *span,
            },
            Type::Var { tvar, span } => {
                let link = match &*tvar.borrow() {
                    TypeVar::Link { ty } => Some(ty.clone()),
                    _ => None,
                };
                match link {
                    Some(ty) => Type::Var {
                        tvar: Rc::new(RefCell::new(TypeVar::Link {
                            ty: ty.subst_const(mapping),
                        })),
                        span: *span,
                    },
                    None => self.clone(),
                }
            }
            Type::RowEmpty { .. } => self.clone(),
            Type::Record { row, span } => Type::Record {
                row: Box::new(row.subst_const(mapping)),
                span: *span,
            },
            Type::RowExtend { labels, row, span } => Type::RowExtend {
                labels: labels.map_values(|t| t.subst_const(mapping)),
                row: Box::new(row.subst_const(mapping)),
                span: *span,
            },
            Type::Implicit { ty, span } => Type::Implicit {
                ty: Box::new(ty.subst_const(mapping)),
                span: *span,
            },
        }
    }

    pub fn show(&self) -> String {
        self.show_with(&HashMap::new())
    }

    /// Pretty prints the type, naming generic variables from `names` when a
    /// display name was recorded for them.
    pub fn show_with(&self, names: &HashMap<Id, String>) -> String {
        show_inner(self, names, false, true)
    }
}

/// Nests a list of argument types into unary arrows ending in `ret`.
pub fn nest_arrows(args: &[Type], ret: Type) -> Type {
    match args.split_first() {
        None => ret,
        Some((first, rest)) => Type::Arrow {
            args: vec![first.clone()],
            ret: Box::new(nest_arrows(rest, ret)),
            span: Span::empty(),
        },
    }
}

fn show_id(id: Id, names: &HashMap<Id, String>) -> String {
    match names.get(&id) {
        Some(name) => name.clone(),
        None => format!("t{id}"),
    }
}

fn show_inner(ty: &Type, names: &HashMap<Id, String>, nested: bool, top_level: bool) -> String {
    match ty {
        Type::Const { name, .. } => name.clone(),
        Type::App { base, args, .. } => {
            let base_str = show_inner(base, names, nested, false);
            if args.is_empty() {
                return base_str;
            }
            let args_str = args
                .iter()
                .map(|t| show_inner(t, names, true, false))
                .collect::<Vec<_>>()
                .join(" ");
            let full = format!("{base_str} {args_str}");
            if nested {
                format!("({full})")
            } else {
                full
            }
        }
        Type::Arrow { args, ret, .. } => {
            let arg = &args[0];
            let arg_nested = matches!(arg.real_type(), Type::Arrow { .. });
            let arg_str = show_inner(arg, names, arg_nested, false);
            if nested {
                format!("({} -> {})", arg_str, show_inner(ret, names, false, false))
            } else {
                format!("{} -> {}", arg_str, show_inner(ret, names, nested, false))
            }
        }
        Type::Var { tvar, .. } => match &*tvar.borrow() {
            TypeVar::Link { ty } => show_inner(ty, names, nested, top_level),
            TypeVar::Unbound { id, .. } | TypeVar::Generic { id } => show_id(*id, names),
        },
        Type::RowEmpty { .. } => "[]".to_string(),
        Type::Record { row, .. } => match row.real_type() {
            Type::RowEmpty { .. } => "{}".to_string(),
            extend @ Type::RowExtend { .. } => {
                let rows = show_inner(&extend, names, false, true);
                format!("{{{}}}", &rows[1..rows.len() - 1])
            }
            other => format!("{{ | {} }}", show_inner(&other, names, false, true)),
        },
        Type::RowExtend { labels, row, .. } => {
            let shown = labels.show(|k, v| format!("{} : {}", k, show_inner(v, names, false, true)));
            let inner = match row.real_type() {
                Type::RowEmpty { .. } => shown,
                extend @ Type::RowExtend { .. } => {
                    let rows = show_inner(&extend, names, false, true);
                    let rows = &rows[2..rows.len() - 2];
                    if shown.is_empty() {
                        rows.to_string()
                    } else {
                        format!("{shown}, {rows}")
                    }
                }
                other => {
                    let tail = show_inner(&other, names, false, true);
                    if shown.is_empty() {
                        format!("| {tail}")
                    } else {
                        format!("{shown} | {tail}")
                    }
                }
            };
            format!("[ {inner} ]")
        }
        Type::Implicit { ty, .. } => {
            format!("{{{{ {} }}}}", show_inner(ty, names, false, false))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shows_arrows_and_applications() {
        let list_int = Type::App {
            base: Box::new(Type::Const {
                name: "List".to_string(),
                kind: Kind::Ctor(1),
                span: Span::empty(),
            }),
            args: vec![Type::tconst("Int")],
            span: Span::empty(),
        };
        let ty = Type::arrow(list_int, Type::tconst("Bool"));
        assert_eq!(ty.show(), "List Int -> Bool");
    }

    #[test]
    fn shows_nested_arrow_arguments_in_parens() {
        let inner = Type::arrow(Type::tconst("Int"), Type::tconst("Int"));
        let ty = Type::arrow(inner, Type::tconst("Bool"));
        assert_eq!(ty.show(), "(Int -> Int) -> Bool");
    }

    #[test]
    fn shows_records_and_rows() {
        let row = Type::RowExtend {
            labels: LabelMap::singleton("name", Type::tconst("String")),
            row: Box::new(Type::RowEmpty { span: Span::empty() }),
            span: Span::empty(),
        };
        assert_eq!(Type::record(row).show(), "{ name : String }");
    }

    #[test]
    fn links_are_followed_when_printing() {
        let var = Type::var(TypeVar::Link {
            ty: Type::tconst("Int"),
        });
        assert_eq!(var.show(), "Int");
    }

    #[test]
    fn kind_display_spells_out_arity() {
        assert_eq!(Kind::Star.to_string(), "Type");
        assert_eq!(Kind::Ctor(1).to_string(), "Type -> Type");
        assert_eq!(Kind::Ctor(2).to_string(), "Type -> Type -> Type");
    }
}
