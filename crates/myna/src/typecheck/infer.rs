//! The inference engine: algorithm W with levels and a fixpoint combinator
//! for recursive bindings.

use std::collections::HashMap;

use crate::diagnostics::{Diagnostic, Span};
use crate::hir::{self, Binder, Expr, ExprKind, Pattern, PatternKind};
use crate::label_map::LabelMap;
use crate::messages;
use crate::surface::Visibility;

use super::env::{
    self, DeclRef, Env, ModuleEnv, TypeDeclRef, CORE_MODULE, PRIM_LIST, PRIM_OPTION, PRIM_SET,
    PRIM_TUPLE,
};
use super::types::{nest_arrows, Kind, Level, Type, TypeVar};
use super::Typechecker;

type InferResult<T> = Result<T, Diagnostic>;

fn t_int() -> Type {
    Type::tconst(env::PRIM_INT)
}
fn t_float32() -> Type {
    Type::tconst(env::PRIM_FLOAT32)
}
fn t_float64() -> Type {
    Type::tconst(env::PRIM_FLOAT64)
}
fn t_complex64() -> Type {
    Type::tconst(env::PRIM_COMPLEX64)
}
fn t_bool() -> Type {
    Type::tconst(env::PRIM_BOOL)
}
fn t_string() -> Type {
    Type::tconst(env::PRIM_STRING)
}
fn t_rune() -> Type {
    Type::tconst(env::PRIM_RUNE)
}
fn t_unit() -> Type {
    Type::tconst(env::PRIM_UNIT)
}

fn applied(name: &str, arity: usize, args: Vec<Type>) -> Type {
    Type::App {
        base: Box::new(Type::Const {
            name: name.to_string(),
            kind: Kind::Ctor(arity),
            span: Span::empty(),
        }),
        args,
        span: Span::empty(),
    }
}

struct PatternVar {
    name: String,
    ty: Type,
    span: Span,
}

impl Typechecker {
    pub(super) fn infer_module(&mut self, module: &hir::Module) -> InferResult<ModuleEnv> {
        let mut decls: HashMap<String, DeclRef> = HashMap::new();
        let mut types: HashMap<String, TypeDeclRef> = HashMap::new();

        self.seed_prelude_values();

        let datas: Vec<&hir::TypeDecl> = module
            .decls
            .iter()
            .filter_map(|d| match d {
                hir::Decl::Type(t) => Some(t),
                _ => None,
            })
            .collect();

        for data in &datas {
            let (data_ty, mapping) = self.get_data_type(data, &module.name.val);
            self.check_shadow_type(&data.name.val, data.span)?;
            let type_name = format!("{}.{}", module.name.val, data.name.val);
            self.env.extend_type(&type_name, data_ty.clone());

            if data.visibility == Visibility::Private {
                self.pvt_types.insert(type_name.clone());
            }

            let mut ctor_names = Vec::with_capacity(data.data_ctors.len());
            for ctor in &data.data_ctors {
                ctor_names.push(ctor.name.val.clone());
                let ctor_ty = get_ctor_type(ctor, &data_ty, &mapping);
                self.check_shadow(&self.env, &ctor.name.val, ctor.span)?;
                self.env.extend(&ctor.name.val, ctor_ty.clone());
                decls.insert(
                    ctor.name.val.clone(),
                    DeclRef {
                        ty: ctor_ty,
                        visibility: ctor.visibility,
                        is_instance: false,
                        comment: None,
                    },
                );
            }
            types.insert(
                data.name.val.clone(),
                TypeDeclRef {
                    ty: data_ty,
                    visibility: data.visibility,
                    ctors: ctor_names,
                    comment: data.comment.clone(),
                },
            );
        }
        for data in &datas {
            for ctor in &data.data_ctors {
                let ty = self
                    .env
                    .lookup(&ctor.name.val)
                    .cloned()
                    .expect("constructor was just installed");
                self.check_well_formed(&ty, ctor.span)?;
            }
        }

        let vals: Vec<&hir::ValDecl> = module
            .decls
            .iter()
            .filter_map(|d| match d {
                hir::Decl::Val(v) => Some(v),
                _ => None,
            })
            .collect();

        // pre-declare every annotated value so forward references typecheck
        for val in &vals {
            if let ExprKind::Ann { ann_ty, .. } = &val.exp.kind {
                self.check_shadow(&self.env, &val.name.val, val.span)?;
                self.env.extend(&val.name.val, ann_ty.clone());
                if val.is_instance {
                    self.env.extend_instance(&val.name.val, ann_ty.clone(), false);
                }
            }
        }

        for val in &vals {
            self.context_decl = Some(val.name.val.clone());
            let name = val.name.val.clone();
            let annotated = matches!(val.exp.kind, ExprKind::Ann { .. });
            if !annotated {
                if let Err(err) = self.check_shadow(&self.env, &name, val.span) {
                    self.add_error(err);
                    continue;
                }
            }

            let mut new_env = self.env.fork();
            let ty = if val.recursive {
                new_env.remove(&name);
                match self.infer_recursive(&name, &val.exp, &new_env, 0) {
                    Ok(ty) => ty,
                    Err(err) => {
                        self.add_error(err);
                        continue;
                    }
                }
            } else {
                match self.infer_expr(&new_env, 0, &val.exp) {
                    Ok(ty) => ty,
                    Err(err) => {
                        self.add_error(err);
                        continue;
                    }
                }
            };

            let gen_ty = self.generalize(-1, &ty);
            self.env.extend(&name, gen_ty.clone());
            if val.is_instance {
                self.env.extend_instance(&name, gen_ty.clone(), false);
            }
            decls.insert(
                name.clone(),
                DeclRef {
                    ty: gen_ty.clone(),
                    visibility: val.visibility,
                    is_instance: val.is_instance,
                    comment: val.comment.clone(),
                },
            );

            if val.visibility == Visibility::Public && !self.pvt_types.is_empty() {
                if let Err(err) = self.check_escape_pvt_type(&gen_ty, val.name.span) {
                    self.add_error(err);
                    continue;
                }
            }
        }
        self.context_decl = None;

        Ok(ModuleEnv { decls, types })
    }

    /// Values every module can rely on without imports: the fixpoint
    /// combinator behind recursive bindings, the tuple constructor behind
    /// `;`, and the option constructors behind `!!`.
    fn seed_prelude_values(&mut self) {
        let v = self.new_gen_var();
        self.env.extend(
            "__fix",
            Type::arrow(Type::arrow(v.clone(), v.clone()), v),
        );

        let a = self.new_gen_var();
        let b = self.new_gen_var();
        let tuple = nest_arrows(
            &[a.clone(), b.clone()],
            applied(PRIM_TUPLE, 2, vec![a, b]),
        );
        self.env.extend(PRIM_TUPLE, tuple.clone());
        self.env
            .extend(format!("{CORE_MODULE}.{PRIM_TUPLE}"), tuple);

        let a = self.new_gen_var();
        self.env
            .extend("None", applied(PRIM_OPTION, 1, vec![a]));
        let a = self.new_gen_var();
        self.env.extend(
            "Some",
            Type::arrow(a.clone(), applied(PRIM_OPTION, 1, vec![a])),
        );
        let a = self.new_gen_var();
        self.env.extend(
            "unwrapOption",
            Type::arrow(applied(PRIM_OPTION, 1, vec![a.clone()]), a),
        );
    }

    fn infer_expr(&mut self, env: &Env, level: Level, exp: &Expr) -> InferResult<Type> {
        match &exp.kind {
            ExprKind::Int(_) => Ok(exp.set_type(t_int())),
            ExprKind::Float(_) => Ok(exp.set_type(t_float32())),
            ExprKind::Complex(..) => Ok(exp.set_type(t_complex64())),
            ExprKind::Char(_) => Ok(exp.set_type(t_rune())),
            ExprKind::Str(_) => Ok(exp.set_type(t_string())),
            ExprKind::Bool(_) => Ok(exp.set_type(t_bool())),
            ExprKind::Unit => Ok(exp.set_type(t_unit())),
            ExprKind::Nil => Ok(exp.set_type(self.new_var(level))),
            ExprKind::Var { name, .. }
            | ExprKind::Ctor { name, .. }
            | ExprKind::ImplicitVar { name, .. } => {
                let full = exp.fullname().expect("reference has a name");
                match env.lookup(&full).cloned() {
                    Some(ty) => {
                        let inst = self.instantiate(level, &ty);
                        Ok(exp.set_type(inst))
                    }
                    None => Err(self.make_error(messages::undefined_var(name), exp.span)),
                }
            }
            ExprKind::Lambda { binder, body } => {
                self.check_shadow(env, &binder.name, binder.span)?;
                let par = match &binder.ty {
                    Some(ty) => ty.clone(),
                    None => self.new_var(level),
                };
                let param = if binder.is_implicit {
                    Type::Implicit {
                        ty: Box::new(par),
                        span: Span::empty(),
                    }
                } else {
                    par
                };
                let mut new_env = env.fork();
                new_env.extend(&binder.name, param.clone());
                if binder.is_implicit {
                    new_env.extend_instance(&binder.name, param.clone(), true);
                }
                let ret = self.infer_expr(&new_env, level, body)?;
                Ok(exp.set_type(Type::arrow(param, ret)))
            }
            ExprKind::Let { def, body } => {
                let name = &def.binder.name;
                self.check_shadow(env, name, def.binder.span)?;

                let var_ty = if def.recursive {
                    self.infer_recursive(name, &def.expr, env, level + 1)?
                } else {
                    self.infer_expr(env, level + 1, &def.expr)?
                };

                if def.recursive && !matches!(var_ty.real_type(), Type::Arrow { .. }) {
                    return Err(self.make_error(messages::RECURSIVE_LET.to_string(), def.binder.span));
                }

                let gen_ty = self.generalize(level, &var_ty);
                let mut new_env = env.fork();
                new_env.extend(name, gen_ty.clone());
                if def.is_instance {
                    new_env.extend_instance(name, gen_ty, false);
                }
                let ty = self.infer_expr(&new_env, level, body)?;
                Ok(exp.set_type(ty))
            }
            ExprKind::App { func, arg } => {
                let fn_ty = self.infer_expr(env, level, func)?;
                let (params, ret) = self.match_fun_type(1, &fn_ty, func.span)?;
                let arg_ty = self.infer_expr(env, level, arg)?;
                self.unify(&params[0], &arg_ty, arg.span)?;
                Ok(exp.set_type(ret))
            }
            ExprKind::Ann { exp: inner, ann_ty } => {
                self.context_types.push(ann_ty.clone());
                let res = self.infer_ann(env, level, inner, ann_ty);
                self.context_types.pop();
                let ty = res?;
                inner.set_type(ty.clone());
                Ok(exp.set_type(ty))
            }
            ExprKind::If { cond, then, els } => {
                let cond_ty = self.infer_expr(env, level, cond)?;
                self.unify(&t_bool(), &cond_ty, cond.span)?;
                let then_ty = self.infer_expr(env, level, then)?;
                let else_ty = self.infer_expr(env, level, els)?;
                self.unify(&then_ty, &else_ty, exp.span)?;
                Ok(exp.set_type(then_ty))
            }
            ExprKind::Do { exps } => {
                let mut ty = t_unit();
                for e in exps {
                    ty = self.infer_expr(env, level, e)?;
                }
                Ok(exp.set_type(ty))
            }
            ExprKind::Match { exps, cases } => {
                let mut exp_tys = Vec::with_capacity(exps.len());
                for scrutinee in exps {
                    exp_tys.push(self.infer_expr(env, level, scrutinee)?);
                }
                let res_ty = self.new_var(level);

                for case in cases {
                    if case.patterns.len() != exp_tys.len() {
                        return Err(self.make_error(
                            messages::wrong_arity_to_case(exp_tys.len(), case.patterns.len()),
                            case.patterns
                                .first()
                                .map(|p| p.span)
                                .unwrap_or(exp.span),
                        ));
                    }
                    let mut vars = Vec::new();
                    for (pat, scrutinee_ty) in case.patterns.iter().zip(exp_tys.iter()) {
                        vars.extend(self.infer_pattern(env, level, pat, scrutinee_ty)?);
                    }

                    let mut new_env = env.fork();
                    for var in &vars {
                        self.check_shadow(&new_env, &var.name, var.span)?;
                        new_env.extend(&var.name, var.ty.clone());
                    }

                    if let Some(guard) = &case.guard {
                        let guard_ty = self.infer_expr(&new_env, level, guard)?;
                        self.unify(&t_bool(), &guard_ty, guard.span)?;
                    }

                    let arm_ty = self.infer_expr(&new_env, level, &case.exp)?;
                    self.unify(&res_ty, &arm_ty, case.exp.span)?;
                }
                Ok(exp.set_type(res_ty))
            }
            ExprKind::RecordEmpty => Ok(exp.set_type(Type::record(Type::RowEmpty {
                span: Span::empty(),
            }))),
            ExprKind::RecordSelect { exp: rec, label } => {
                let rest = self.new_var(level);
                let field = self.new_var(level);
                let param = Type::record(Type::RowExtend {
                    labels: LabelMap::singleton(label.val.clone(), field.clone()),
                    row: Box::new(rest),
                    span: Span::empty(),
                });
                let ty = self.infer_expr(env, level, rec)?;
                self.unify(&param, &ty, exp.span)?;
                Ok(exp.set_type(field))
            }
            ExprKind::RecordRestrict { exp: rec, label } => {
                let rest = self.new_var(level);
                let field = self.new_var(level);
                let param = Type::record(Type::RowExtend {
                    labels: LabelMap::singleton(label.clone(), field),
                    row: Box::new(rest.clone()),
                    span: Span::empty(),
                });
                let ty = self.infer_expr(env, level, rec)?;
                self.unify(&param, &ty, exp.span)?;
                Ok(exp.set_type(Type::record(rest)))
            }
            ExprKind::RecordUpdate {
                exp: rec,
                label,
                value,
                is_set,
            } => {
                let field = self.infer_expr(env, level, value)?;
                let rest = self.new_var(level);
                let rec_ty = if *is_set {
                    Type::record(Type::RowExtend {
                        labels: LabelMap::singleton(label.val.clone(), field),
                        row: Box::new(rest),
                        span: Span::empty(),
                    })
                } else {
                    // update via function: the field keeps its type
                    let actual = self.new_var(level);
                    self.unify(
                        &field,
                        &Type::arrow(actual.clone(), actual.clone()),
                        value.span,
                    )?;
                    Type::record(Type::RowExtend {
                        labels: LabelMap::singleton(label.val.clone(), actual),
                        row: Box::new(rest),
                        span: Span::empty(),
                    })
                };
                let ty = self.infer_expr(env, level, rec)?;
                self.unify(&rec_ty, &ty, exp.span)?;
                Ok(exp.set_type(rec_ty))
            }
            ExprKind::RecordExtend { labels, exp: rec } => {
                let mut label_tys = Vec::with_capacity(labels.len());
                for entry in labels.entries() {
                    let ty = self.infer_expr(env, level, &entry.val)?;
                    label_tys.push((entry.label.clone(), ty));
                }

                let rest = self.new_var(level);
                let base_ty = self.infer_expr(env, level, rec)?;
                self.unify(&Type::record(rest.clone()), &base_ty, exp.span)?;
                let ty = Type::record(Type::RowExtend {
                    labels: LabelMap::from_entries(label_tys),
                    row: Box::new(rest),
                    span: Span::empty(),
                });
                Ok(exp.set_type(ty))
            }
            ExprKind::RecordMerge { exp1, exp2 } => {
                let rest1 = self.new_var(level);
                let rest2 = self.new_var(level);
                let param1 = Type::record(Type::RowExtend {
                    labels: LabelMap::new(),
                    row: Box::new(rest1.clone()),
                    span: Span::empty(),
                });
                let param2 = Type::record(Type::RowExtend {
                    labels: LabelMap::new(),
                    row: Box::new(rest2.clone()),
                    span: Span::empty(),
                });
                let ty1 = self.infer_expr(env, level, exp1)?;
                self.unify(&param1, &ty1, exp.span)?;
                let ty2 = self.infer_expr(env, level, exp2)?;
                self.unify(&param2, &ty2, exp.span)?;

                let (labels1, row1) = self.match_row_type_or_err(&rest1, exp1.span)?;
                let (labels2, row2) = self.match_row_type_or_err(&rest2, exp2.span)?;

                let row = if matches!(row1, Type::RowEmpty { .. }) {
                    row2
                } else if matches!(row2, Type::RowEmpty { .. }) {
                    row1
                } else {
                    return Err(self.make_error(messages::RECORD_MERGE.to_string(), exp.span));
                };
                let ty = Type::record(Type::RowExtend {
                    labels: labels2.merge(labels1),
                    row: Box::new(row),
                    span: Span::empty(),
                });
                Ok(exp.set_type(ty))
            }
            ExprKind::ListLiteral { exps } => {
                let elem = self.new_var(level);
                for e in exps {
                    let ty = self.infer_expr(env, level, e)?;
                    self.unify(&elem, &ty, e.span)?;
                }
                Ok(exp.set_type(applied(PRIM_LIST, 1, vec![elem])))
            }
            ExprKind::SetLiteral { exps } => {
                let elem = self.new_var(level);
                for e in exps {
                    let ty = self.infer_expr(env, level, e)?;
                    self.unify(&elem, &ty, e.span)?;
                }
                Ok(exp.set_type(applied(PRIM_SET, 1, vec![elem])))
            }
            ExprKind::Index { exp: base, index } => {
                let elem = self.new_var(level);
                let base_ty = self.infer_expr(env, level, base)?;
                self.unify(&applied(PRIM_LIST, 1, vec![elem.clone()]), &base_ty, base.span)?;
                let index_ty = self.infer_expr(env, level, index)?;
                self.unify(&t_int(), &index_ty, index.span)?;
                Ok(exp.set_type(elem))
            }
            ExprKind::While { cond, exps } => {
                let cond_ty = self.infer_expr(env, level, cond)?;
                self.unify(&t_bool(), &cond_ty, cond.span)?;
                for e in exps {
                    self.infer_expr(env, level, e)?;
                }
                // a while loop always evaluates to unit
                Ok(exp.set_type(t_unit()))
            }
            ExprKind::TypeCast { exp: inner, cast } => {
                self.infer_expr(env, level, inner)?;
                Ok(exp.set_type(cast.clone()))
            }
        }
    }

    /// A small checking mode for annotated literals, so number literals take
    /// sized primitive types without spurious unification.
    fn infer_ann(
        &mut self,
        env: &Env,
        level: Level,
        inner: &Expr,
        ann_ty: &Type,
    ) -> InferResult<Type> {
        if let ExprKind::Int(v) = &inner.kind {
            let v = *v;
            let accepted = [
                (env::PRIM_BYTE, (0..=u8::MAX as i64).contains(&v)),
                (env::PRIM_INT8, (i8::MIN as i64..=i8::MAX as i64).contains(&v)),
                (env::PRIM_INT16, (i16::MIN as i64..=i16::MAX as i64).contains(&v)),
                (env::PRIM_INT32, (i32::MIN as i64..=i32::MAX as i64).contains(&v)),
                (env::PRIM_INT64, true),
                (env::PRIM_UINT, v >= 0),
                (env::PRIM_UINT8, (0..=u8::MAX as i64).contains(&v)),
                (env::PRIM_UINT16, (0..=u16::MAX as i64).contains(&v)),
                (env::PRIM_UINT32, (0..=u32::MAX as i64).contains(&v)),
                (env::PRIM_UINT64, v >= 0),
            ];
            for (prim, valid) in accepted {
                if valid && ann_ty.equals(&Type::tconst(prim)) {
                    return Ok(Type::tconst(prim));
                }
            }
        }
        if let ExprKind::Float(v) = &inner.kind {
            let v = *v;
            if ann_ty.equals(&t_float32()) && valid_float32(v) {
                return Ok(t_float32());
            }
            if ann_ty.equals(&t_float64()) {
                return Ok(t_float64());
            }
        }

        self.validate_type(ann_ty, env, inner.span)?;
        let inferred = self.infer_expr(env, level, inner)?;
        self.unify(ann_ty, &inferred, inner.span)?;
        Ok(ann_ty.clone())
    }

    fn infer_pattern(
        &mut self,
        env: &Env,
        level: Level,
        pat: &Pattern,
        ty: &Type,
    ) -> InferResult<Vec<PatternVar>> {
        let vars = match &pat.kind {
            PatternKind::Literal(lit) => {
                let lit_ty = self.infer_expr(env, level, lit)?;
                self.unify(ty, &lit_ty, pat.span)?;
                Vec::new()
            }
            PatternKind::Wildcard => Vec::new(),
            PatternKind::Unit => {
                self.unify(ty, &t_unit(), pat.span)?;
                Vec::new()
            }
            PatternKind::Var(name) => vec![PatternVar {
                name: name.clone(),
                ty: ty.clone(),
                span: pat.span,
            }],
            PatternKind::Regex(_) => {
                self.unify(&t_string(), ty, pat.span)?;
                Vec::new()
            }
            PatternKind::Ctor { ctor, fields } => {
                let ctor_ty = self.infer_expr(env, level, ctor)?;
                let (ctor_args, ret) = peel_args(&ctor_ty);
                self.unify(&ret, ty, ctor.span)?;

                if ctor_args.len() != fields.len() {
                    let name = match &ctor.kind {
                        ExprKind::Ctor { name, .. } => name.clone(),
                        _ => String::new(),
                    };
                    return Err(self.make_error(
                        messages::wrong_arity_ctor_pattern(&name, fields.len(), ctor_args.len()),
                        pat.span,
                    ));
                }

                let mut vars = Vec::new();
                for (arg_ty, field) in ctor_args.iter().zip(fields.iter()) {
                    vars.extend(self.infer_pattern(env, level, field, arg_ty)?);
                }
                vars
            }
            PatternKind::Record { labels } => {
                if labels.is_empty() {
                    let row = self.new_var(level);
                    self.unify(&Type::record(row), ty, pat.span)?;
                    Vec::new()
                } else {
                    let mut vars = Vec::new();
                    let mut label_tys = Vec::with_capacity(labels.len());
                    for entry in labels.entries() {
                        let row_ty = self.new_var(level);
                        vars.extend(self.infer_pattern(env, level, &entry.val, &row_ty)?);
                        label_tys.push((entry.label.clone(), row_ty));
                    }
                    let rest = self.new_var(level);
                    self.unify(
                        &Type::record(Type::RowExtend {
                            labels: LabelMap::from_entries(label_tys),
                            row: Box::new(rest),
                            span: Span::empty(),
                        }),
                        ty,
                        pat.span,
                    )?;
                    vars
                }
            }
            PatternKind::List { elems, tail } => {
                if elems.is_empty() && tail.is_none() {
                    let elem = self.new_var(level);
                    self.unify(&applied(PRIM_LIST, 1, vec![elem]), ty, pat.span)?;
                    Vec::new()
                } else {
                    let elem_ty = self.new_var(level);
                    let list_ty = applied(PRIM_LIST, 1, vec![elem_ty.clone()]);
                    self.unify(&list_ty, ty, pat.span)?;

                    let mut vars = Vec::new();
                    for elem in elems {
                        vars.extend(self.infer_pattern(env, level, elem, &elem_ty)?);
                    }
                    if let Some(tail) = tail {
                        vars.extend(self.infer_pattern(env, level, tail, &list_ty)?);
                    }
                    vars
                }
            }
            PatternKind::Named { pat: inner, name } => {
                let mut vars = self.infer_pattern(env, level, inner, ty)?;
                vars.push(PatternVar {
                    name: name.val.clone(),
                    ty: ty.clone(),
                    span: pat.span,
                });
                vars
            }
            PatternKind::TypeTest { test, alias } => {
                self.validate_type(test, env, pat.span)?;
                match alias {
                    Some(alias) => vec![PatternVar {
                        name: alias.clone(),
                        ty: test.clone(),
                        span: pat.span,
                    }],
                    None => Vec::new(),
                }
            }
        };
        pat.set_type(ty.clone());
        Ok(vars)
    }

    fn match_fun_type(
        &mut self,
        num_params: usize,
        ty: &Type,
        span: Span,
    ) -> InferResult<(Vec<Type>, Type)> {
        match ty {
            Type::Arrow { args, ret, .. } => {
                if num_params != args.len() {
                    panic!("unexpected number of arguments to function: {num_params}");
                }
                Ok((args.clone(), (**ret).clone()))
            }
            Type::Var { tvar, span: var_span } => {
                let inner = tvar.borrow().clone();
                match inner {
                    TypeVar::Link { ty } => self.match_fun_type(num_params, &ty, span),
                    TypeVar::Unbound { level, .. } => {
                        let params: Vec<Type> =
                            (0..num_params).map(|_| self.new_var(level)).collect();
                        let ret = self.new_var(level);
                        *tvar.borrow_mut() = TypeVar::Link {
                            ty: Type::Arrow {
                                args: params.clone(),
                                ret: Box::new(ret.clone()),
                                span: *var_span,
                            },
                        };
                        Ok((params, ret))
                    }
                    TypeVar::Generic { .. } => {
                        Err(self.make_error(messages::NOT_A_FUNCTION.to_string(), span))
                    }
                }
            }
            _ => Err(self.make_error(messages::NOT_A_FUNCTION.to_string(), span)),
        }
    }

    /// Types a recursive binding by inferring `\name -> body` and recovering
    /// the fixpoint with the `__fix` combinator, so recursion flows through
    /// the ordinary inference path.
    fn infer_recursive(
        &mut self,
        name: &str,
        exp: &Expr,
        env: &Env,
        level: Level,
    ) -> InferResult<Type> {
        let new_name = format!("__rec{name}");
        let lambda = Expr::new(
            ExprKind::Lambda {
                binder: Binder {
                    name: name.to_string(),
                    span: exp.span,
                    is_implicit: false,
                    ty: None,
                },
                body: Box::new(exp.clone()),
            },
            exp.span,
        );
        let rec_ty = self.infer_expr(env, level, &lambda)?;

        let mut new_env = env.fork();
        new_env.extend(&new_name, rec_ty);
        let fix = Expr::new(
            ExprKind::App {
                func: Box::new(Expr::new(
                    ExprKind::Var {
                        name: "__fix".to_string(),
                        module: None,
                        is_op: false,
                    },
                    exp.span,
                )),
                arg: Box::new(Expr::new(
                    ExprKind::Var {
                        name: new_name,
                        module: None,
                        is_op: false,
                    },
                    exp.span,
                )),
            },
            exp.span,
        );
        let ty = self.infer_expr(&new_env, level, &fix)?;
        exp.set_type(ty.clone());
        Ok(ty)
    }

    fn validate_type(&mut self, ty: &Type, env: &Env, span: Span) -> InferResult<()> {
        let mut missing: Option<(String, Span)> = None;
        ty.walk(&mut |t| {
            if let Type::Const { name, span: ty_span, .. } = t {
                if env.lookup_type(name).is_none() && missing.is_none() {
                    let at = if ty_span.is_empty() { span } else { *ty_span };
                    missing = Some((name.clone(), at));
                }
            }
        });
        match missing {
            Some((name, at)) => Err(self.make_error(messages::undefined_type(&name), at)),
            None => Ok(()),
        }
    }

    /// A public value's type must not mention a private type of this module.
    fn check_escape_pvt_type(&self, ty: &Type, span: Span) -> InferResult<()> {
        let mut found: Option<(String, Span)> = None;
        ty.walk(&mut |t| {
            if let Type::Const { name, span: ty_span, .. } = t {
                if self.pvt_types.contains(name) {
                    let at = if ty_span.is_empty() { span } else { *ty_span };
                    found = Some((name.clone(), at));
                }
            }
        });
        match found {
            Some((name, at)) => Err(self.make_error(messages::escaped_type(&name), at)),
            None => Ok(()),
        }
    }

    fn check_shadow(&self, env: &Env, name: &str, span: Span) -> InferResult<()> {
        if env.lookup(name).is_some() {
            return Err(self.make_error(messages::shadowed_variable(name), span));
        }
        Ok(())
    }

    fn check_shadow_type(&self, name: &str, span: Span) -> InferResult<()> {
        if self.env.lookup_type(name).is_some() {
            return Err(self.make_error(messages::duplicated_type(name), span));
        }
        Ok(())
    }

    fn get_data_type(
        &mut self,
        decl: &hir::TypeDecl,
        module_name: &str,
    ) -> (Type, HashMap<String, Type>) {
        let kind = if decl.ty_vars.is_empty() {
            Kind::Star
        } else {
            Kind::Ctor(decl.ty_vars.len())
        };
        let raw = Type::Const {
            name: format!("{}.{}", module_name, decl.name.val),
            kind,
            span: decl.span,
        };

        if decl.ty_vars.is_empty() {
            return (raw, HashMap::new());
        }
        let mut mapping = HashMap::new();
        let mut vars = Vec::with_capacity(decl.ty_vars.len());
        for var in &decl.ty_vars {
            let gen = self.new_gen_var_name(var);
            mapping.insert(var.clone(), gen.clone());
            vars.push(gen);
        }
        (
            Type::App {
                base: Box::new(raw),
                args: vars,
                span: decl.span,
            },
            mapping,
        )
    }
}

fn get_ctor_type(ctor: &hir::DataCtor, data_type: &Type, mapping: &HashMap<String, Type>) -> Type {
    match data_type {
        Type::Const { .. } => {
            if ctor.args.is_empty() {
                data_type.clone()
            } else {
                nest_arrows(&ctor.args, data_type.clone()).with_span(ctor.span)
            }
        }
        Type::App { .. } => {
            let args: Vec<Type> = ctor.args.iter().map(|t| t.subst_const(mapping)).collect();
            nest_arrows(&args, data_type.clone()).with_span(ctor.span)
        }
        _ => panic!("got absurd type for data constructor {}", ctor.name.val),
    }
}

/// Peels all arrow arguments off a constructor type.
fn peel_args(ty: &Type) -> (Vec<Type>, Type) {
    fn go(acc: &mut Vec<Type>, ty: &Type) -> Type {
        match ty {
            Type::Arrow { args, ret, .. } => {
                acc.extend(args.iter().cloned());
                go(acc, ret)
            }
            Type::Var { tvar, .. } => {
                let inner = tvar.borrow().clone();
                match inner {
                    TypeVar::Link { ty } => go(acc, &ty),
                    _ => ty.clone(),
                }
            }
            _ => ty.clone(),
        }
    }
    let mut args = Vec::new();
    let ret = go(&mut args, ty);
    (args, ret)
}

fn valid_float32(v: f64) -> bool {
    v == 0.0 || (v.abs() >= f32::MIN_POSITIVE as f64 && v.abs() <= f32::MAX as f64)
}
