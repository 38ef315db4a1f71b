//! Unification with row polymorphism. Inner failures carry just enough
//! structure for the driver to build the user-facing message.

use std::collections::VecDeque;

use crate::diagnostics::{Diagnostic, Span};
use crate::label_map::{concat_label_map, LabelMap};
use crate::messages;

use super::types::{Type, TypeVar};
use super::Typechecker;

#[derive(Debug)]
pub(super) enum UnifyErr {
    NoMatch(Type, Type),
    MissingLabels(LabelMap<Type>),
    InfiniteType(Type),
    NotRow(Type),
    RecursiveRows,
}

impl Typechecker {
    /// Unifies two types, converting inner failures into a user diagnostic
    /// at `span`.
    pub fn unify(&mut self, t1: &Type, t2: &Type, span: Span) -> Result<(), Diagnostic> {
        let Err(err) = self.unify_inner(t1, t2) else {
            return Ok(());
        };
        let reason = match &err {
            UnifyErr::NoMatch(e1, e2) => {
                if t1.real_type().equals(&e1.real_type()) && t2.real_type().equals(&e2.real_type())
                {
                    String::new()
                } else {
                    messages::incompatible_types(&self.show(e1), &self.show(e2))
                }
            }
            UnifyErr::MissingLabels(labels) => messages::record_missing_labels(
                &labels.show(|label, ty| format!("{label} : {}", self.show(ty))),
            ),
            UnifyErr::InfiniteType(ty) => messages::infinite_type(&self.show(ty)),
            UnifyErr::NotRow(ty) => messages::not_a_row(&self.show(ty)),
            UnifyErr::RecursiveRows => messages::RECURSIVE_ROWS.to_string(),
        };
        Err(self.make_error(
            messages::types_dont_match(&self.show(t1), &self.show(t2), &reason),
            span,
        ))
    }

    fn unify_inner(&mut self, t1: &Type, t2: &Type) -> Result<(), UnifyErr> {
        if let (Type::Const { name: n1, .. }, Type::Const { name: n2, .. }) = (t1, t2) {
            if n1 == n2 {
                return Ok(());
            }
        }

        if let (
            Type::App { base: b1, args: a1, .. },
            Type::App { base: b2, args: a2, .. },
        ) = (t1, t2)
        {
            self.unify_inner(b1, b2)?;
            if a1.len() != a2.len() {
                return Err(UnifyErr::NoMatch(t1.clone(), t2.clone()));
            }
            for (x, y) in a1.iter().zip(a2.iter()) {
                self.unify_inner(x, y)?;
            }
            return Ok(());
        }

        if let (
            Type::Arrow { args: a1, ret: r1, .. },
            Type::Arrow { args: a2, ret: r2, .. },
        ) = (t1, t2)
        {
            if a1.len() != a2.len() {
                return Err(UnifyErr::NoMatch(t1.clone(), t2.clone()));
            }
            for (x, y) in a1.iter().zip(a2.iter()) {
                self.unify_inner(x, y)?;
            }
            return self.unify_inner(r1, r2);
        }

        if let Some(linked) = follow_link(t1) {
            return self.unify_inner(&linked, t2);
        }
        if let Some(linked) = follow_link(t2) {
            return self.unify_inner(t1, &linked);
        }

        let unbound1 = unbound_of(t1);
        let unbound2 = unbound_of(t2);
        if let (Some((id1, _)), Some((id2, _))) = (unbound1, unbound2) {
            if id1 == id2 {
                // two distinct variables can never share an id
                panic!(
                    "error in unification: {} with {}",
                    self.show(t1),
                    self.show(t2)
                );
            }
        }
        if let Some((id, level)) = unbound1 {
            self.occurs_check_and_adjust_levels(id, level, t2)?;
            link_to(t1, t2);
            return Ok(());
        }
        if let Some((id, level)) = unbound2 {
            self.occurs_check_and_adjust_levels(id, level, t1)?;
            link_to(t2, t1);
            return Ok(());
        }

        match (t1, t2) {
            (Type::RowEmpty { .. }, Type::RowEmpty { .. }) => Ok(()),
            (Type::Record { row: r1, .. }, Type::Record { row: r2, .. }) => {
                self.unify_inner(r1, r2)
            }
            (Type::RowExtend { .. }, Type::RowExtend { .. }) => self.unify_rows(t1, t2),
            (Type::RowEmpty { .. }, Type::RowExtend { .. }) => {
                let (labels, _) = self.match_row_type(t2)?;
                Err(UnifyErr::MissingLabels(labels))
            }
            (Type::RowExtend { .. }, Type::RowEmpty { .. }) => {
                let (labels, _) = self.match_row_type(t1)?;
                Err(UnifyErr::MissingLabels(labels))
            }
            (Type::Implicit { ty: i1, .. }, Type::Implicit { ty: i2, .. }) => {
                self.unify_inner(i1, i2)
            }
            (Type::Implicit { ty: i1, .. }, _) => self.unify_inner(i1, t2),
            (_, Type::Implicit { ty: i2, .. }) => self.unify_inner(t1, i2),
            _ => Err(UnifyErr::NoMatch(t1.clone(), t2.clone())),
        }
    }

    /// Unifies two row types by walking their sorted label multimaps in
    /// lockstep, collecting the labels missing on each side.
    fn unify_rows(&mut self, row1: &Type, row2: &Type) -> Result<(), UnifyErr> {
        let (labels1, rest1) = self.match_row_type(row1)?;
        let (labels2, rest2) = self.match_row_type(row2)?;

        let mut missing1: LabelMap<Type> = LabelMap::new();
        let mut missing2: LabelMap<Type> = LabelMap::new();
        let mut left: VecDeque<(String, Vec<Type>)> = concat_label_map(&labels1).into();
        let mut right: VecDeque<(String, Vec<Type>)> = concat_label_map(&labels2).into();

        loop {
            let head1 = left.front().map(|(label, _)| label.clone());
            let head2 = right.front().map(|(label, _)| label.clone());
            match (head1, head2) {
                (None, None) => break,
                (None, Some(_)) => {
                    for (label, tys) in right.drain(..) {
                        missing1 = missing1.put(&label, tys);
                    }
                    break;
                }
                (Some(_), None) => {
                    for (label, tys) in left.drain(..) {
                        missing2 = missing2.put(&label, tys);
                    }
                    break;
                }
                (Some(l1), Some(l2)) => {
                    if l1 == l2 {
                        let (label, tys1) = left.pop_front().expect("front");
                        let (_, tys2) = right.pop_front().expect("front");
                        let shared = tys1.len().min(tys2.len());
                        for (x, y) in tys1.iter().zip(tys2.iter()).take(shared) {
                            self.unify_inner(x, y)?;
                        }
                        if tys1.len() > shared {
                            missing2 = missing2.put(&label, tys1[shared..].to_vec());
                        } else if tys2.len() > shared {
                            missing1 = missing1.put(&label, tys2[shared..].to_vec());
                        }
                    } else if l1 < l2 {
                        let (label, tys) = left.pop_front().expect("front");
                        missing2 = missing2.put(&label, tys);
                    } else {
                        let (label, tys) = right.pop_front().expect("front");
                        missing1 = missing1.put(&label, tys);
                    }
                }
            }
        }

        match (missing1.is_empty(), missing2.is_empty()) {
            (true, true) => self.unify_inner(&rest1, &rest2),
            (true, false) => self.unify_inner(
                &rest2,
                &Type::RowExtend {
                    labels: missing2,
                    row: Box::new(rest1),
                    span: Span::empty(),
                },
            ),
            (false, true) => self.unify_inner(
                &rest1,
                &Type::RowExtend {
                    labels: missing1,
                    row: Box::new(rest2),
                    span: Span::empty(),
                },
            ),
            (false, false) => {
                if matches!(rest1, Type::RowEmpty { .. }) {
                    let fresh = self.new_var(0);
                    return self.unify_inner(
                        &rest1,
                        &Type::RowExtend {
                            labels: missing1,
                            row: Box::new(fresh),
                            span: Span::empty(),
                        },
                    );
                }
                let Some((_, level)) = unbound_of(&rest1) else {
                    return Err(UnifyErr::NoMatch(row1.clone(), row2.clone()));
                };
                let rest_row = self.new_var(level);
                self.unify_inner(
                    &rest2,
                    &Type::RowExtend {
                        labels: missing2,
                        row: Box::new(rest_row.clone()),
                        span: Span::empty(),
                    },
                )?;
                // the first unification must not have touched our tail
                if unbound_of(&rest1).is_none() {
                    return Err(UnifyErr::RecursiveRows);
                }
                self.unify_inner(
                    &rest1,
                    &Type::RowExtend {
                        labels: missing1,
                        row: Box::new(rest_row),
                        span: Span::empty(),
                    },
                )
            }
        }
    }

    fn occurs_check_and_adjust_levels(
        &mut self,
        id: super::types::Id,
        level: super::types::Level,
        ty: &Type,
    ) -> Result<(), UnifyErr> {
        match ty {
            Type::Var { tvar, .. } => {
                let inner = tvar.borrow().clone();
                match inner {
                    TypeVar::Link { ty: linked } => {
                        self.occurs_check_and_adjust_levels(id, level, &linked)
                    }
                    TypeVar::Unbound { id: other, level: other_level } => {
                        if other == id {
                            return Err(UnifyErr::InfiniteType(ty.clone()));
                        }
                        if other_level > level {
                            *tvar.borrow_mut() = TypeVar::Unbound {
                                id: other,
                                level,
                            };
                        }
                        Ok(())
                    }
                    TypeVar::Generic { .. } => Ok(()),
                }
            }
            Type::App { base, args, .. } => {
                self.occurs_check_and_adjust_levels(id, level, base)?;
                for arg in args {
                    self.occurs_check_and_adjust_levels(id, level, arg)?;
                }
                Ok(())
            }
            Type::Arrow { args, ret, .. } => {
                for arg in args {
                    self.occurs_check_and_adjust_levels(id, level, arg)?;
                }
                self.occurs_check_and_adjust_levels(id, level, ret)
            }
            Type::Record { row, .. } => self.occurs_check_and_adjust_levels(id, level, row),
            Type::RowExtend { labels, row, .. } => {
                for ty in labels.values() {
                    self.occurs_check_and_adjust_levels(id, level, ty)?;
                }
                self.occurs_check_and_adjust_levels(id, level, row)
            }
            Type::Implicit { ty, .. } => self.occurs_check_and_adjust_levels(id, level, ty),
            _ => Ok(()),
        }
    }

    /// Flattens a row into its label multimap and tail.
    pub(super) fn match_row_type(&mut self, ty: &Type) -> Result<(LabelMap<Type>, Type), UnifyErr> {
        match ty {
            Type::RowEmpty { span } => Ok((LabelMap::new(), Type::RowEmpty { span: *span })),
            Type::Var { tvar, .. } => {
                let inner = tvar.borrow().clone();
                match inner {
                    TypeVar::Link { ty: linked } => self.match_row_type(&linked),
                    _ => Ok((LabelMap::new(), ty.clone())),
                }
            }
            Type::RowExtend { labels, row, .. } => {
                let (rest_labels, rest_ty) = self.match_row_type(row)?;
                if rest_labels.is_empty() {
                    Ok((labels.clone(), rest_ty))
                } else {
                    Ok((labels.clone().merge(rest_labels), rest_ty))
                }
            }
            _ => Err(UnifyErr::NotRow(ty.clone())),
        }
    }

    /// Like `match_row_type` but reports the failure as a diagnostic.
    pub(super) fn match_row_type_or_err(
        &mut self,
        ty: &Type,
        span: Span,
    ) -> Result<(LabelMap<Type>, Type), Diagnostic> {
        match self.match_row_type(ty) {
            Ok(res) => Ok(res),
            Err(UnifyErr::NotRow(ty)) => {
                Err(self.make_error(messages::not_a_row(&self.show(&ty)), span))
            }
            Err(_) => unreachable!("match_row_type only fails with NotRow"),
        }
    }
}

fn follow_link(ty: &Type) -> Option<Type> {
    if let Type::Var { tvar, .. } = ty {
        if let TypeVar::Link { ty } = &*tvar.borrow() {
            return Some(ty.clone());
        }
    }
    None
}

fn unbound_of(ty: &Type) -> Option<(super::types::Id, super::types::Level)> {
    if let Type::Var { tvar, .. } = ty {
        if let TypeVar::Unbound { id, level } = &*tvar.borrow() {
            return Some((*id, *level));
        }
    }
    None
}

fn link_to(var: &Type, target: &Type) {
    if let Type::Var { tvar, .. } = var {
        *tvar.borrow_mut() = TypeVar::Link {
            ty: target.clone(),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::label_map::LabelMap;

    fn record(entries: Vec<(&str, Type)>, tail: Type) -> Type {
        Type::record(Type::RowExtend {
            labels: LabelMap::from_entries(
                entries
                    .into_iter()
                    .map(|(label, ty)| (label.to_string(), ty))
                    .collect(),
            ),
            row: Box::new(tail),
            span: Span::empty(),
        })
    }

    fn row_empty() -> Type {
        Type::RowEmpty { span: Span::empty() }
    }

    #[test]
    #[should_panic(expected = "error in unification")]
    fn unifying_an_unbound_var_with_itself_is_an_invariant_violation() {
        let mut tc = Typechecker::new();
        let a = tc.new_var(0);
        let _ = tc.unify(&a, &a.clone(), Span::empty());
    }

    #[test]
    fn occurs_check_reports_an_infinite_type() {
        let mut tc = Typechecker::new();
        let a = tc.new_var(0);
        let list_of_a = Type::App {
            base: Box::new(Type::tconst("List")),
            args: vec![a.clone()],
            span: Span::empty(),
        };
        let err = tc.unify(&a, &list_of_a, Span::empty()).unwrap_err();
        assert!(err.message.contains("Occurs check failed: infinite type"));
    }

    #[test]
    fn unification_is_symmetric() {
        let int = Type::tconst("Int");

        let mut tc = Typechecker::new();
        let a = tc.new_var(0);
        let arrow1 = Type::arrow(a.clone(), Type::tconst("Bool"));
        let arrow2 = Type::arrow(int.clone(), Type::tconst("Bool"));
        assert!(tc.unify(&arrow1, &arrow2, Span::empty()).is_ok());
        assert!(a.real_type().equals(&int));

        let mut tc = Typechecker::new();
        let b = tc.new_var(0);
        let arrow1 = Type::arrow(b.clone(), Type::tconst("Bool"));
        let arrow2 = Type::arrow(int.clone(), Type::tconst("Bool"));
        assert!(tc.unify(&arrow2, &arrow1, Span::empty()).is_ok());
        assert!(b.real_type().equals(&int));
    }

    #[test]
    fn closed_records_with_equal_labels_unify() {
        let mut tc = Typechecker::new();
        let r1 = record(
            vec![("x", Type::tconst("Int")), ("y", Type::tconst("Bool"))],
            row_empty(),
        );
        let r2 = record(
            vec![("y", Type::tconst("Bool")), ("x", Type::tconst("Int"))],
            row_empty(),
        );
        assert!(tc.unify(&r1, &r2, Span::empty()).is_ok());
    }

    #[test]
    fn missing_labels_are_reported() {
        let mut tc = Typechecker::new();
        let r1 = record(vec![("x", Type::tconst("Int"))], row_empty());
        let r2 = record(
            vec![("x", Type::tconst("Int")), ("y", Type::tconst("Bool"))],
            row_empty(),
        );
        let err = tc.unify(&r1, &r2, Span::empty()).unwrap_err();
        assert!(err.message.contains("Record is missing labels"));
        assert!(err.message.contains("y : Bool"));
    }

    #[test]
    fn open_record_absorbs_extra_labels() {
        let mut tc = Typechecker::new();
        let tail = tc.new_var(0);
        let open = record(vec![("x", Type::tconst("Int"))], tail);
        let closed = record(
            vec![("x", Type::tconst("Int")), ("y", Type::tconst("Bool"))],
            row_empty(),
        );
        assert!(tc.unify(&open, &closed, Span::empty()).is_ok());
    }

    #[test]
    fn two_open_records_meet_in_a_fresh_row() {
        let mut tc = Typechecker::new();
        let tail1 = tc.new_var(0);
        let tail2 = tc.new_var(0);
        let r1 = record(vec![("x", Type::tconst("Int"))], tail1);
        let r2 = record(vec![("y", Type::tconst("Bool"))], tail2);
        assert!(tc.unify(&r1, &r2, Span::empty()).is_ok());
        // both sides now contain each other's label
        let shown = r1.show();
        assert!(shown.contains("x : Int"), "got {shown}");
        assert!(shown.contains("y : Bool"), "got {shown}");
    }

    #[test]
    fn incompatible_constants_do_not_match() {
        let mut tc = Typechecker::new();
        let err = tc
            .unify(&Type::tconst("Int"), &Type::tconst("Bool"), Span::empty())
            .unwrap_err();
        assert!(err.message.contains("Cannot match type"));
    }
}
