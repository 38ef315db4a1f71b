//! Lowers a source module into the core AST: resolves type aliases, expands
//! sugar into the core forms, tracks variable use and orders top-level
//! values by dependency.

use std::collections::{HashMap, HashSet};

use regex::Regex;

use crate::dag::Dag;
use crate::diagnostics::{Diagnostic, Severity, Span};
use crate::hir::{
    self, Binder, Case, Decl, Expr, ExprKind, LetDef, Pattern, PatternKind, TypeDecl, ValDecl,
};
use crate::lexer::starts_upper;
use crate::messages;
use crate::surface::{
    fullname, SCase, SDecl, SExpr, SLetDef, SModule, SPattern, SType, STypealias, Spanned,
    Visibility,
};
use crate::typecheck::env::{is_prim_type, CORE_MODULE};
use crate::typecheck::types::{Kind, Type};
use crate::typecheck::Typechecker;

pub struct Lowering<'tc> {
    tc: &'tc mut Typechecker,
    source_name: String,
    mod_name: String,
    imports: HashMap<String, String>,
    aliased_imports: HashSet<String>,
    synonyms: HashMap<String, STypealias>,
    own_aliases: Vec<String>,
    errors: Vec<Diagnostic>,
    unused_vars: HashMap<String, Span>,
    used_imports: HashSet<String>,
    decl_names: HashSet<String>,
    decl_vars: HashSet<String>,
    var_count: u32,
}

pub struct LoweredModule {
    pub module: Option<hir::Module>,
    pub aliases: Vec<STypealias>,
    pub errors: Vec<Diagnostic>,
}

pub fn lower_module(smod: &SModule, tc: &mut Typechecker) -> LoweredModule {
    let mut lowering = Lowering::new(smod, tc);
    let module = lowering.run(smod);
    LoweredModule {
        module,
        aliases: lowering.own_public_aliases(),
        errors: lowering.errors,
    }
}

type LowerResult<T> = Result<T, Diagnostic>;

struct CollectedVar {
    name: String,
    span: Span,
    implicit: bool,
    instance: bool,
}

impl<'tc> Lowering<'tc> {
    fn new(smod: &SModule, tc: &'tc mut Typechecker) -> Lowering<'tc> {
        let aliased_imports = smod
            .imports
            .iter()
            .filter_map(|imp| imp.alias.clone())
            .collect();
        let mut synonyms = HashMap::new();
        for talias in &smod.resolved_aliases {
            synonyms.insert(talias.name.clone(), talias.clone());
        }
        let mut own_aliases = Vec::new();
        for decl in &smod.decls {
            if let SDecl::Typealias(talias) = decl {
                synonyms.insert(talias.name.clone(), talias.clone());
                own_aliases.push(talias.name.clone());
            }
        }
        Lowering {
            tc,
            source_name: smod.source_name.clone(),
            mod_name: smod.name.val.clone(),
            imports: smod.resolved_imports.clone(),
            aliased_imports,
            synonyms,
            own_aliases,
            errors: Vec::new(),
            unused_vars: HashMap::new(),
            used_imports: HashSet::new(),
            decl_names: HashSet::new(),
            decl_vars: HashSet::new(),
            var_count: 0,
        }
    }

    fn own_public_aliases(&self) -> Vec<STypealias> {
        self.own_aliases
            .iter()
            .filter_map(|name| self.synonyms.get(name))
            .filter(|talias| talias.visibility == Visibility::Public)
            .cloned()
            .collect()
    }

    fn run(&mut self, smod: &SModule) -> Option<hir::Module> {
        self.decl_names = self.imports.keys().cloned().collect();
        self.expand_own_aliases();

        let mut lowered = Vec::with_capacity(smod.decls.len());
        for decl in &smod.decls {
            if let Some(decl) = self.lower_decl(decl) {
                lowered.push(decl);
            }
        }

        let mut unused_imports = HashMap::new();
        for import in &smod.imports {
            if !self.used_imports.contains(&import.module.val) {
                unused_imports.insert(import.module.val.clone(), import.span);
                let warn =
                    self.make_warn(messages::unused_import(&import.module.val), import.span);
                self.errors.push(warn);
            }
        }

        let decls = self.order_top_level_values(lowered)?;

        Some(hir::Module {
            name: smod.name.clone(),
            source_name: smod.source_name.clone(),
            decls,
            imports: smod.imports.clone(),
            unused_imports,
            comment: smod.comment.clone(),
        })
    }

    ///////////////////////////////////////////////
    // typealias expansion
    ///////////////////////////////////////////////

    fn expand_own_aliases(&mut self) {
        for name in self.own_aliases.clone() {
            let mut visiting = HashSet::new();
            if let Err(err) = self.expand_synonym(&name, &mut visiting) {
                self.errors.push(err);
            }
        }
    }

    fn expand_synonym(&mut self, name: &str, visiting: &mut HashSet<String>) -> LowerResult<()> {
        let Some(decl) = self.synonyms.get(name).cloned() else {
            return Ok(());
        };
        if decl.expanded.is_some() {
            return Ok(());
        }
        if !visiting.insert(name.to_string()) {
            return Err(self.make_error(messages::TYPEALIAS_RECURSIVE.to_string(), decl.span));
        }

        let expanded = self.expand_type(&decl.ty, visiting)?;
        visiting.remove(name);

        let free_vars = expanded.free_vars(&decl.ty_vars);
        if let Some(stored) = self.synonyms.get_mut(name) {
            stored.expanded = Some(expanded);
            stored.free_vars = free_vars;
        }
        Ok(())
    }

    fn expand_type(&mut self, ty: &SType, visiting: &mut HashSet<String>) -> LowerResult<SType> {
        match ty {
            SType::Const { name, alias, span } => {
                let key = fullname(name, alias.as_deref());
                if self.synonyms.contains_key(&key) {
                    self.expand_synonym(&key, visiting)?;
                    let decl = self.synonyms.get(&key).cloned().expect("just expanded");
                    if let Some(expanded) = decl.expanded {
                        return Ok(expanded.with_span(*span));
                    }
                }
                Ok(ty.clone())
            }
            SType::App { ty: base, types, span } => {
                if let SType::Const { name, alias, .. } = base.as_ref() {
                    let key = fullname(name, alias.as_deref());
                    if self.synonyms.contains_key(&key) {
                        self.expand_synonym(&key, visiting)?;
                        let decl = self.synonyms.get(&key).cloned().expect("just expanded");
                        if let Some(expanded) = decl.expanded {
                            let mut res = expanded.with_span(*span);
                            for (var, arg) in decl.ty_vars.iter().zip(types.iter()) {
                                let arg = self.expand_type(arg, visiting)?;
                                res = res.subst_var(var, &arg);
                            }
                            return Ok(res);
                        }
                    }
                }
                let base = self.expand_type(base, visiting)?;
                let mut args = Vec::with_capacity(types.len());
                for arg in types {
                    args.push(self.expand_type(arg, visiting)?);
                }
                Ok(SType::App {
                    ty: Box::new(base),
                    types: args,
                    span: *span,
                })
            }
            SType::Fun { arg, ret, span } => Ok(SType::Fun {
                arg: Box::new(self.expand_type(arg, visiting)?),
                ret: Box::new(self.expand_type(ret, visiting)?),
                span: *span,
            }),
            SType::Parens { ty, span } => Ok(SType::Parens {
                ty: Box::new(self.expand_type(ty, visiting)?),
                span: *span,
            }),
            SType::Record { row, span } => Ok(SType::Record {
                row: Box::new(self.expand_type(row, visiting)?),
                span: *span,
            }),
            SType::RowEmpty { .. } => Ok(ty.clone()),
            SType::RowExtend { labels, row, span } => {
                let labels = labels.map_values_result(|t| self.expand_type(t, visiting))?;
                Ok(SType::RowExtend {
                    labels,
                    row: Box::new(self.expand_type(row, visiting)?),
                    span: *span,
                })
            }
            SType::Implicit { ty, span } => Ok(SType::Implicit {
                ty: Box::new(self.expand_type(ty, visiting)?),
                span: *span,
            }),
        }
    }

    /// Replaces alias references in a type by their expanded bodies.
    fn resolve_aliases(&mut self, ty: &SType) -> SType {
        let mut visiting = HashSet::new();
        match self.expand_type(ty, &mut visiting) {
            Ok(resolved) => resolved,
            Err(err) => {
                self.errors.push(err);
                ty.clone()
            }
        }
    }

    ///////////////////////////////////////////////
    // declarations
    ///////////////////////////////////////////////

    fn lower_decl(&mut self, decl: &SDecl) -> Option<Decl> {
        match decl {
            SDecl::Type(type_decl) => {
                self.validate_data_ctor_names(type_decl);
                if self.imports.contains_key(&type_decl.binder.val)
                    || is_prim_type(&type_decl.binder.val)
                {
                    let err = self
                        .make_error(messages::duplicated_type(&type_decl.binder.val), type_decl.span);
                    self.errors.push(err);
                    return None;
                }
                let ctors = type_decl
                    .data_ctors
                    .iter()
                    .map(|ctor| hir::DataCtor {
                        name: ctor.name.clone(),
                        args: ctor
                            .args
                            .iter()
                            .map(|ty| self.lower_type(ty, true, &mut HashMap::new()))
                            .collect(),
                        visibility: ctor.visibility,
                        span: ctor.span,
                    })
                    .collect();
                Some(Decl::Type(TypeDecl {
                    name: type_decl.binder.clone(),
                    ty_vars: type_decl.ty_vars.clone(),
                    data_ctors: ctors,
                    visibility: type_decl.visibility,
                    span: type_decl.span,
                    comment: type_decl.comment.clone(),
                }))
            }
            SDecl::Val(val) => {
                let name = val.binder.val.clone();
                if self.decl_names.contains(&name) {
                    let err = self.make_error(messages::duplicated_decl(&name), val.span);
                    self.errors.push(err);
                    return None;
                }
                self.decl_names.insert(name.clone());
                self.decl_vars = HashSet::new();
                self.check_shadow(&name, val.span);

                self.unused_vars = HashMap::new();
                let vars: Vec<CollectedVar> = val
                    .pats
                    .iter()
                    .flat_map(|pat| self.collect_pattern_vars(pat, false))
                    .collect();
                let mut locals = HashSet::new();
                for var in &vars {
                    if !var.implicit && !var.instance {
                        self.unused_vars.insert(var.name.clone(), var.span);
                    }
                    self.check_shadow(&var.name, var.span);
                    locals.insert(var.name.clone());
                }

                // signature type variables stay scoped over the whole body
                let mut type_vars: HashMap<String, Type> = HashMap::new();
                let sig_ty = val
                    .signature
                    .as_ref()
                    .map(|sig| (self.lower_type(&sig.ty, false, &mut type_vars), sig.span));

                let exp = match self.lower_exp(&val.exp, &locals, &mut type_vars) {
                    Ok(exp) => exp,
                    Err(err) => {
                        self.errors.push(err);
                        return None;
                    }
                };
                let mut expr = match self.nest_lambda_pats(&val.pats, exp, &locals, &mut type_vars)
                {
                    Ok(expr) => expr,
                    Err(err) => {
                        self.errors.push(err);
                        return None;
                    }
                };

                if let Some((ty, _)) = &sig_ty {
                    let span = expr.span;
                    expr = Expr::new(
                        ExprKind::Ann {
                            exp: Box::new(expr),
                            ann_ty: ty.clone(),
                        },
                        span,
                    );
                }

                self.report_unused_vars();
                Some(Decl::Val(ValDecl {
                    name: val.binder.clone(),
                    exp: expr,
                    recursive: self.decl_vars.contains(&name),
                    span: val.span,
                    signature: sig_ty.map(|(ty, span)| hir::Signature { ty, span }),
                    visibility: val.visibility,
                    is_instance: val.is_instance,
                    is_operator: val.is_operator,
                    comment: val.comment.clone(),
                }))
            }
            SDecl::Typealias(_) => None,
        }
    }

    fn validate_data_ctor_names(&mut self, decl: &crate::surface::STypeDecl) {
        if decl.data_ctors.len() > 1 {
            let ty_name = &decl.binder.val;
            for ctor in &decl.data_ctors {
                if ctor.name.val == *ty_name {
                    let err =
                        self.make_error(messages::wrong_constructor_name(ty_name), decl.span);
                    self.errors.push(err);
                }
            }
        }
    }

    ///////////////////////////////////////////////
    // expressions
    ///////////////////////////////////////////////

    fn lower_exp(
        &mut self,
        sexp: &SExpr,
        locals: &HashSet<String>,
        tvars: &mut HashMap<String, Type>,
    ) -> LowerResult<Expr> {
        // anonymous parameters expand into a lambda around the hole's context
        if let Some((rewritten, params)) = self.rewrite_sections(sexp) {
            let mut new_locals = locals.clone();
            for (name, _) in &params {
                new_locals.insert(name.clone());
            }
            let mut expr = self.lower_exp(&rewritten, &new_locals, tvars)?;
            for (name, span) in params.into_iter().rev() {
                let lam_span = expr.span;
                expr = Expr::new(
                    ExprKind::Lambda {
                        binder: Binder {
                            name,
                            span,
                            is_implicit: false,
                            ty: None,
                        },
                        body: Box::new(expr),
                    },
                    lam_span,
                );
            }
            return Ok(expr);
        }

        match sexp {
            SExpr::Int { v, span, .. } => Ok(Expr::new(ExprKind::Int(*v), *span)),
            SExpr::Float { v, span, .. } => Ok(Expr::new(ExprKind::Float(*v), *span)),
            SExpr::Complex { re, im, span, .. } => {
                Ok(Expr::new(ExprKind::Complex(*re, *im), *span))
            }
            SExpr::Bool { v, span } => Ok(Expr::new(ExprKind::Bool(*v), *span)),
            SExpr::Char { v, span, .. } => Ok(Expr::new(ExprKind::Char(*v), *span)),
            SExpr::Str { v, span, .. } => Ok(Expr::new(ExprKind::Str(v.clone()), *span)),
            SExpr::PatternLiteral { regex, span, .. } => {
                if let Err(err) = Regex::new(regex) {
                    return Err(
                        self.make_error(messages::invalid_regex(&err.to_string()), *span)
                    );
                }
                Ok(Expr::new(ExprKind::Str(regex.clone()), *span))
            }
            SExpr::Var { name, alias, span } => {
                let full = fullname(name, alias.as_deref());
                self.decl_vars.insert(full.clone());
                if alias.is_none() {
                    self.unused_vars.remove(name);
                }
                if alias.is_none() && locals.contains(name) {
                    return Ok(Expr::new(
                        ExprKind::Var {
                            name: name.clone(),
                            module: None,
                            is_op: false,
                        },
                        *span,
                    ));
                }
                if let Some(alias) = alias {
                    self.check_alias(alias, *span);
                }
                let module = self.imports.get(&full).cloned();
                if let Some(module) = &module {
                    self.used_imports.insert(module.clone());
                }
                Ok(Expr::new(
                    ExprKind::Var {
                        name: name.clone(),
                        module,
                        is_op: false,
                    },
                    *span,
                ))
            }
            SExpr::ImplicitVar { name, alias, span } => {
                if alias.is_none() {
                    self.unused_vars.remove(name);
                }
                if let Some(alias) = alias {
                    self.check_alias(alias, *span);
                }
                let full = fullname(name, alias.as_deref());
                let module = if alias.is_none() && locals.contains(name) {
                    None
                } else {
                    self.imports.get(&full).cloned()
                };
                if let Some(module) = &module {
                    self.used_imports.insert(module.clone());
                }
                Ok(Expr::new(
                    ExprKind::ImplicitVar {
                        name: name.clone(),
                        module,
                    },
                    *span,
                ))
            }
            SExpr::Operator { name, alias, span } => {
                let mut name = name.clone();
                if name == ";" {
                    name = "Tuple".to_string();
                }
                if name == "<-" {
                    return Err(self.make_error(messages::NOT_A_FIELD.to_string(), *span));
                }
                self.decl_vars.insert(fullname(&name, alias.as_deref()));
                if alias.is_none() {
                    self.unused_vars.remove(&name);
                }
                if let Some(alias) = alias {
                    self.check_alias(alias, *span);
                }
                let module = self
                    .imports
                    .get(&fullname(&name, alias.as_deref()))
                    .cloned();
                if let Some(module) = &module {
                    self.used_imports.insert(module.clone());
                }
                if starts_upper(&name) {
                    Ok(Expr::new(ExprKind::Ctor { name, module }, *span))
                } else {
                    Ok(Expr::new(
                        ExprKind::Var {
                            name,
                            module,
                            is_op: true,
                        },
                        *span,
                    ))
                }
            }
            SExpr::Ctor { name, alias, span } => {
                if let Some(alias) = alias {
                    self.check_alias(alias, *span);
                }
                let full = fullname(name, alias.as_deref());
                let module = self.imports.get(&full).cloned();
                if let Some(module) = &module {
                    self.used_imports.insert(module.clone());
                }
                Ok(Expr::new(
                    ExprKind::Ctor {
                        name: name.clone(),
                        module,
                    },
                    *span,
                ))
            }
            SExpr::Lambda { pats, body, span: _ } => {
                let vars: Vec<CollectedVar> = pats
                    .iter()
                    .flat_map(|pat| self.collect_pattern_vars(pat, false))
                    .collect();
                let mut new_locals = locals.clone();
                for var in &vars {
                    if !var.implicit && !var.instance {
                        self.unused_vars.insert(var.name.clone(), var.span);
                    }
                    self.check_shadow(&var.name, var.span);
                    new_locals.insert(var.name.clone());
                }
                let body = self.lower_exp(body, &new_locals, tvars)?;
                self.nest_lambda_pats(pats, body, locals, tvars)
            }
            SExpr::App { func, arg, span } => {
                let func = self.lower_exp(func, locals, tvars)?;
                let arg = self.lower_exp(arg, locals, tvars)?;
                Ok(Expr::new(
                    ExprKind::App {
                        func: Box::new(func),
                        arg: Box::new(arg),
                    },
                    *span,
                ))
            }
            SExpr::BinApp {
                op, left, right, ..
            } => {
                if let SExpr::Operator { name, .. } = op.as_ref() {
                    if name == "<-" {
                        return Err(self.make_error(messages::NOT_A_FIELD.to_string(), op.span()));
                    }
                }
                let left = self.lower_exp(left, locals, tvars)?;
                let right = self.lower_exp(right, locals, tvars)?;
                let op = self.lower_exp(op, locals, tvars)?;
                let inner_span = Span::new(left.span, op.span);
                let inner = Expr::new(
                    ExprKind::App {
                        func: Box::new(op),
                        arg: Box::new(left),
                    },
                    inner_span,
                );
                let full_span = Span::new(inner_span, right.span);
                Ok(Expr::new(
                    ExprKind::App {
                        func: Box::new(inner),
                        arg: Box::new(right),
                    },
                    full_span,
                ))
            }
            SExpr::Parens { exp, .. } => self.lower_exp(exp, locals, tvars),
            SExpr::If {
                cond, then, els, span,
            } => {
                let cond = self.lower_exp(cond, locals, tvars)?;
                let then = self.lower_exp(then, locals, tvars)?;
                let els = match els {
                    Some(els) => self.lower_exp(els, locals, tvars)?,
                    None => Expr::new(ExprKind::Unit, *span),
                };
                Ok(Expr::new(
                    ExprKind::If {
                        cond: Box::new(cond),
                        then: Box::new(then),
                        els: Box::new(els),
                    },
                    *span,
                ))
            }
            SExpr::Let { def, body, span } => {
                let vars = self.collect_letdef_vars(def);
                let mut new_locals = locals.clone();
                for var in &vars {
                    if !var.implicit && !var.instance {
                        self.unused_vars.insert(var.name.clone(), var.span);
                    }
                    self.check_shadow(&var.name, var.span);
                    new_locals.insert(var.name.clone());
                }
                let body = self.lower_exp(body, &new_locals, tvars)?;
                self.nest_lets(def, body, *span, locals, tvars)
            }
            SExpr::Match { exprs, cases, span } => {
                let mut exps = Vec::with_capacity(exprs.len());
                for exp in exprs {
                    exps.push(self.lower_exp(exp, locals, tvars)?);
                }
                let mut lowered_cases = Vec::with_capacity(cases.len());
                for case in cases {
                    lowered_cases.push(self.lower_case(case, locals, tvars)?);
                }
                Ok(Expr::new(
                    ExprKind::Match {
                        exps,
                        cases: lowered_cases,
                    },
                    *span,
                ))
            }
            SExpr::Ann { exp, ty, span } => {
                let exp = self.lower_exp(exp, locals, tvars)?;
                let mut scoped = tvars.clone();
                let ann_ty = self.lower_type(ty, false, &mut scoped);
                Ok(Expr::new(
                    ExprKind::Ann {
                        exp: Box::new(exp),
                        ann_ty,
                    },
                    *span,
                ))
            }
            SExpr::Do { exps, span } => {
                if let Some(SExpr::DoLet { span: let_span, .. }) = exps.last() {
                    return Err(self.make_error(messages::LET_DO_LAST.to_string(), *let_span));
                }
                let converted = convert_do_lets(exps);
                let mut lowered = Vec::with_capacity(converted.len());
                for exp in &converted {
                    lowered.push(self.lower_exp(exp, locals, tvars)?);
                }
                Ok(Expr::new(ExprKind::Do { exps: lowered }, *span))
            }
            SExpr::DoLet { span, .. } => {
                Err(self.make_error(messages::LET_IN.to_string(), *span))
            }
            SExpr::Unit { span } => Ok(Expr::new(ExprKind::Unit, *span)),
            SExpr::Nil { span } => Ok(Expr::new(ExprKind::Nil, *span)),
            SExpr::RecordEmpty { span } => Ok(Expr::new(ExprKind::RecordEmpty, *span)),
            SExpr::RecordSelect { exp, labels, span } => {
                let exp = self.lower_exp(exp, locals, tvars)?;
                Ok(nest_record_selects(exp, labels, *span))
            }
            SExpr::RecordExtend { labels, exp, span } => {
                let exp = self.lower_exp(exp, locals, tvars)?;
                let labels = labels.map_values_result(|e| self.lower_exp(e, locals, tvars))?;
                Ok(Expr::new(
                    ExprKind::RecordExtend {
                        labels,
                        exp: Box::new(exp),
                    },
                    *span,
                ))
            }
            SExpr::RecordRestrict { exp, labels, span } => {
                let exp = self.lower_exp(exp, locals, tvars)?;
                Ok(nest_record_restrictions(exp, labels, *span))
            }
            SExpr::RecordUpdate {
                exp,
                labels,
                val,
                is_set,
                span,
            } => {
                let exp = self.lower_exp(exp, locals, tvars)?;
                let val = self.lower_exp(val, locals, tvars)?;
                Ok(nest_record_updates(&exp, labels, val, *is_set, *span))
            }
            SExpr::RecordMerge { exp1, exp2, span } => {
                let exp1 = self.lower_exp(exp1, locals, tvars)?;
                let exp2 = self.lower_exp(exp2, locals, tvars)?;
                Ok(Expr::new(
                    ExprKind::RecordMerge {
                        exp1: Box::new(exp1),
                        exp2: Box::new(exp2),
                    },
                    *span,
                ))
            }
            SExpr::ListLiteral { exps, span } => {
                let mut lowered = Vec::with_capacity(exps.len());
                for exp in exps {
                    lowered.push(self.lower_exp(exp, locals, tvars)?);
                }
                Ok(Expr::new(ExprKind::ListLiteral { exps: lowered }, *span))
            }
            SExpr::SetLiteral { exps, span } => {
                let mut lowered = Vec::with_capacity(exps.len());
                for exp in exps {
                    lowered.push(self.lower_exp(exp, locals, tvars)?);
                }
                Ok(Expr::new(ExprKind::SetLiteral { exps: lowered }, *span))
            }
            SExpr::Index { exp, index, span } => {
                let exp = self.lower_exp(exp, locals, tvars)?;
                let index = self.lower_exp(index, locals, tvars)?;
                Ok(Expr::new(
                    ExprKind::Index {
                        exp: Box::new(exp),
                        index: Box::new(index),
                    },
                    *span,
                ))
            }
            SExpr::Underscore { span } => Err(self.make_error(
                messages::ANONYMOUS_FUNCTION_ARGUMENT.to_string(),
                *span,
            )),
            SExpr::While { cond, exps, span } => {
                if let Some(SExpr::DoLet { span: let_span, .. }) = exps.last() {
                    return Err(self.make_error(messages::LET_DO_LAST.to_string(), *let_span));
                }
                let converted = convert_do_lets(exps);
                let mut lowered = Vec::with_capacity(converted.len());
                for exp in &converted {
                    lowered.push(self.lower_exp(exp, locals, tvars)?);
                }
                let cond = self.lower_exp(cond, locals, tvars)?;
                Ok(Expr::new(
                    ExprKind::While {
                        cond: Box::new(cond),
                        exps: lowered,
                    },
                    *span,
                ))
            }
            SExpr::Computation {
                builder,
                exps,
                span,
            } => self.lower_computation(builder, exps, *span, locals, tvars),
            SExpr::TypeCast { exp, cast, span } => {
                let exp = self.lower_exp(exp, locals, tvars)?;
                let mut scoped = tvars.clone();
                let cast = self.lower_type(cast, false, &mut scoped);
                Ok(Expr::new(
                    ExprKind::TypeCast {
                        exp: Box::new(exp),
                        cast,
                    },
                    *span,
                ))
            }
            SExpr::Return { span, .. } => {
                Err(self.make_error(messages::RETURN_EXPR.to_string(), *span))
            }
            SExpr::Yield { span, .. } => {
                Err(self.make_error(messages::YIELD_EXPR.to_string(), *span))
            }
            SExpr::LetBang { span, .. } => {
                Err(self.make_error(messages::LET_BANG.to_string(), *span))
            }
            SExpr::DoBang { span, .. } => Err(self.make_error(messages::DO_BANG.to_string(), *span)),
            SExpr::For { span, .. } => Err(self.make_error(messages::FOR_EXPR.to_string(), *span)),
        }
    }

    /// Rewrites the anonymous-parameter contexts (`_ + 1`, `_.name`,
    /// `{ name: _ }`, `case _ of`, ...) into a fresh variable and reports
    /// which parameters were introduced.
    fn rewrite_sections(&mut self, sexp: &SExpr) -> Option<(SExpr, Vec<(String, Span)>)> {
        let mut params: Vec<(String, Span)> = Vec::new();
        let rewritten = match sexp {
            SExpr::BinApp {
                op,
                left,
                right,
                span,
            } => SExpr::BinApp {
                op: op.clone(),
                left: Box::new(self.fill_hole(left, &mut params)),
                right: Box::new(self.fill_hole(right, &mut params)),
                span: *span,
            },
            SExpr::RecordSelect { exp, labels, span } => SExpr::RecordSelect {
                exp: Box::new(self.fill_hole(exp, &mut params)),
                labels: labels.clone(),
                span: *span,
            },
            SExpr::RecordRestrict { exp, labels, span } => SExpr::RecordRestrict {
                exp: Box::new(self.fill_hole(exp, &mut params)),
                labels: labels.clone(),
                span: *span,
            },
            SExpr::RecordExtend { labels, exp, span } => {
                let labels = labels.map_values(|e| self.fill_hole(e, &mut params));
                SExpr::RecordExtend {
                    labels,
                    exp: Box::new(self.fill_hole(exp, &mut params)),
                    span: *span,
                }
            }
            SExpr::RecordMerge { exp1, exp2, span } => SExpr::RecordMerge {
                exp1: Box::new(self.fill_hole(exp1, &mut params)),
                exp2: Box::new(self.fill_hole(exp2, &mut params)),
                span: *span,
            },
            SExpr::Index { exp, index, span } => SExpr::Index {
                exp: Box::new(self.fill_hole(exp, &mut params)),
                index: Box::new(self.fill_hole(index, &mut params)),
                span: *span,
            },
            SExpr::If {
                cond,
                then,
                els,
                span,
            } => SExpr::If {
                cond: Box::new(self.fill_hole(cond, &mut params)),
                then: Box::new(self.fill_hole(then, &mut params)),
                els: els
                    .as_ref()
                    .map(|e| Box::new(self.fill_hole(e, &mut params))),
                span: *span,
            },
            SExpr::Match { exprs, cases, span } => SExpr::Match {
                exprs: exprs
                    .iter()
                    .map(|e| self.fill_hole(e, &mut params))
                    .collect(),
                cases: cases.clone(),
                span: *span,
            },
            _ => return None,
        };
        if params.is_empty() {
            None
        } else {
            Some((rewritten, params))
        }
    }

    fn fill_hole(&mut self, exp: &SExpr, params: &mut Vec<(String, Span)>) -> SExpr {
        if let SExpr::Underscore { span } = exp {
            let name = self.fresh_var();
            params.push((name.clone(), *span));
            SExpr::Var {
                name,
                alias: None,
                span: *span,
            }
        } else {
            exp.clone()
        }
    }

    ///////////////////////////////////////////////
    // computation expressions
    ///////////////////////////////////////////////

    /// Lowers a `do.builder` block against the builder's record members:
    /// `bind` for `let!`/`do!`, `pure` for `return`, `emit` for `yield`
    /// and `each` for `for`.
    fn lower_computation(
        &mut self,
        builder: &Spanned<String>,
        exps: &[SExpr],
        span: Span,
        locals: &HashSet<String>,
        tvars: &mut HashMap<String, Type>,
    ) -> LowerResult<Expr> {
        if let Some(last) = exps.last() {
            if matches!(last, SExpr::LetBang { body: None, .. } | SExpr::DoLet { .. }) {
                return Err(self.make_error(messages::LET_DO_LAST.to_string(), last.span()));
            }
        }
        let converted = convert_do_lets(exps);
        let Some((last, init)) = converted.split_last() else {
            return Err(self.make_error(messages::MALFORMED_EXPR.to_string(), span));
        };

        let mut rest = self.lower_computation_stmt(builder, last, locals, tvars)?;
        for stmt in init.iter().rev() {
            rest = self.chain_computation_stmt(builder, stmt, rest, locals, tvars)?;
        }
        Ok(rest)
    }

    fn builder_member(
        &mut self,
        builder: &Spanned<String>,
        member: &str,
        locals: &HashSet<String>,
        tvars: &mut HashMap<String, Type>,
    ) -> LowerResult<Expr> {
        let var = SExpr::Var {
            name: builder.val.clone(),
            alias: None,
            span: builder.span,
        };
        let base = self.lower_exp(&var, locals, tvars)?;
        Ok(Expr::new(
            ExprKind::RecordSelect {
                exp: Box::new(base),
                label: Spanned::new(member.to_string(), builder.span),
            },
            builder.span,
        ))
    }

    fn lower_computation_stmt(
        &mut self,
        builder: &Spanned<String>,
        stmt: &SExpr,
        locals: &HashSet<String>,
        tvars: &mut HashMap<String, Type>,
    ) -> LowerResult<Expr> {
        match stmt {
            SExpr::Return { exp, span } => {
                let member = self.builder_member(builder, "pure", locals, tvars)?;
                let arg = self.lower_exp(exp, locals, tvars)?;
                Ok(Expr::new(
                    ExprKind::App {
                        func: Box::new(member),
                        arg: Box::new(arg),
                    },
                    *span,
                ))
            }
            SExpr::Yield { exp, span } => {
                let member = self.builder_member(builder, "emit", locals, tvars)?;
                let arg = self.lower_exp(exp, locals, tvars)?;
                Ok(Expr::new(
                    ExprKind::App {
                        func: Box::new(member),
                        arg: Box::new(arg),
                    },
                    *span,
                ))
            }
            SExpr::DoBang { exp, .. } => self.lower_exp(exp, locals, tvars),
            SExpr::LetBang {
                def,
                body: Some(body),
                span,
            } => {
                let stmts: Vec<SExpr> = match body.as_ref() {
                    SExpr::Do { exps, .. } => exps.clone(),
                    other => vec![other.clone()],
                };
                let rest = self.lower_computation(builder, &stmts, *span, locals, tvars)?;
                let bang = SExpr::LetBang {
                    def: def.clone(),
                    body: None,
                    span: *span,
                };
                self.chain_computation_stmt(builder, &bang, rest, locals, tvars)
            }
            SExpr::For { def, body, span } => {
                let SLetDef::Pat { expr, pat } = def.as_ref() else {
                    return Err(self.make_error(messages::MALFORMED_EXPR.to_string(), *span));
                };
                let member = self.builder_member(builder, "each", locals, tvars)?;
                let source = self.lower_exp(expr, locals, tvars)?;

                let vars = self.collect_pattern_vars(pat, false);
                let mut new_locals = locals.clone();
                for var in &vars {
                    new_locals.insert(var.name.clone());
                }
                let stmts: Vec<SExpr> = match body.as_ref() {
                    SExpr::Do { exps, .. } => exps.clone(),
                    other => vec![other.clone()],
                };
                let body = self.lower_computation(builder, &stmts, *span, &new_locals, tvars)?;
                let lambda = self.nest_lambda_pats(
                    std::slice::from_ref(pat),
                    body,
                    locals,
                    tvars,
                )?;

                let inner = Expr::new(
                    ExprKind::App {
                        func: Box::new(member),
                        arg: Box::new(source),
                    },
                    *span,
                );
                Ok(Expr::new(
                    ExprKind::App {
                        func: Box::new(inner),
                        arg: Box::new(lambda),
                    },
                    *span,
                ))
            }
            _ => self.lower_exp(stmt, locals, tvars),
        }
    }

    fn chain_computation_stmt(
        &mut self,
        builder: &Spanned<String>,
        stmt: &SExpr,
        rest: Expr,
        locals: &HashSet<String>,
        tvars: &mut HashMap<String, Type>,
    ) -> LowerResult<Expr> {
        match stmt {
            SExpr::LetBang { def, body: None, span } => {
                let member = self.builder_member(builder, "bind", locals, tvars)?;
                let SLetDef::Bind {
                    expr, name, pats, ..
                } = def.as_ref()
                else {
                    return Err(self.make_error(messages::MALFORMED_EXPR.to_string(), *span));
                };
                let mut bound = self.lower_exp(expr, locals, tvars)?;
                if !pats.is_empty() {
                    bound = self.nest_lambda_pats(pats, bound, locals, tvars)?;
                }

                let cont_span = rest.span;
                let cont = Expr::new(
                    ExprKind::Lambda {
                        binder: Binder {
                            name: name.name.clone(),
                            span: name.span,
                            is_implicit: name.is_implicit,
                            ty: None,
                        },
                        body: Box::new(rest),
                    },
                    cont_span,
                );
                let inner = Expr::new(
                    ExprKind::App {
                        func: Box::new(member),
                        arg: Box::new(bound),
                    },
                    *span,
                );
                Ok(Expr::new(
                    ExprKind::App {
                        func: Box::new(inner),
                        arg: Box::new(cont),
                    },
                    *span,
                ))
            }
            SExpr::DoBang { exp, span } => {
                let member = self.builder_member(builder, "bind", locals, tvars)?;
                let bound = self.lower_exp(exp, locals, tvars)?;
                let cont_span = rest.span;
                let cont = Expr::new(
                    ExprKind::Lambda {
                        binder: Binder {
                            name: self.fresh_var(),
                            span: *span,
                            is_implicit: false,
                            ty: None,
                        },
                        body: Box::new(rest),
                    },
                    cont_span,
                );
                let inner = Expr::new(
                    ExprKind::App {
                        func: Box::new(member),
                        arg: Box::new(bound),
                    },
                    *span,
                );
                Ok(Expr::new(
                    ExprKind::App {
                        func: Box::new(inner),
                        arg: Box::new(cont),
                    },
                    *span,
                ))
            }
            other => {
                let stmt = self.lower_computation_stmt(builder, other, locals, tvars)?;
                let span = Span::new(stmt.span, rest.span);
                Ok(Expr::new(
                    ExprKind::Do {
                        exps: vec![stmt, rest],
                    },
                    span,
                ))
            }
        }
    }

    ///////////////////////////////////////////////
    // let definitions, cases and patterns
    ///////////////////////////////////////////////

    fn lower_letdef_bind(
        &mut self,
        def: &SLetDef,
        locals: &HashSet<String>,
        tvars: &mut HashMap<String, Type>,
    ) -> LowerResult<LetDef> {
        let SLetDef::Bind {
            expr,
            name,
            pats,
            is_instance,
            ty,
        } = def
        else {
            panic!("got a pattern definition in lower_letdef_bind");
        };

        let mut lowered = self.lower_exp(expr, locals, tvars)?;
        let vars = lowered.collect_vars();
        let recursive = vars.contains(&name.name);
        if !pats.is_empty() {
            lowered = self.nest_lambda_pats(pats, lowered, locals, tvars)?;
        }
        if let Some(ty) = ty {
            let ann_ty = self.lower_type(ty, false, &mut HashMap::new());
            let span = expr.span();
            lowered = Expr::new(
                ExprKind::Ann {
                    exp: Box::new(lowered),
                    ann_ty,
                },
                span,
            );
        }
        Ok(LetDef {
            binder: Binder {
                name: name.name.clone(),
                span: name.span,
                is_implicit: name.is_implicit,
                ty: None,
            },
            expr: Box::new(lowered),
            recursive,
            is_instance: *is_instance,
        })
    }

    fn nest_lets(
        &mut self,
        def: &SLetDef,
        body: Expr,
        span: Span,
        locals: &HashSet<String>,
        tvars: &mut HashMap<String, Type>,
    ) -> LowerResult<Expr> {
        match def {
            SLetDef::Bind { .. } => {
                let def = self.lower_letdef_bind(def, locals, tvars)?;
                Ok(Expr::new(
                    ExprKind::Let {
                        def,
                        body: Box::new(body),
                    },
                    span,
                ))
            }
            SLetDef::Pat { expr, pat } => {
                let pat = self.lower_pattern(pat, locals, tvars)?;
                let expr = self.lower_exp(expr, locals, tvars)?;
                Ok(Expr::new(
                    ExprKind::Match {
                        exps: vec![expr],
                        cases: vec![Case {
                            patterns: vec![pat],
                            exp: body,
                            guard: None,
                        }],
                    },
                    span,
                ))
            }
        }
    }

    fn lower_case(
        &mut self,
        case: &SCase,
        locals: &HashSet<String>,
        tvars: &mut HashMap<String, Type>,
    ) -> LowerResult<Case> {
        let vars: Vec<CollectedVar> = case
            .pats
            .iter()
            .flat_map(|pat| self.collect_pattern_vars(pat, false))
            .collect();
        let mut new_locals = locals.clone();
        for var in &vars {
            if !var.implicit && !var.instance {
                self.unused_vars.insert(var.name.clone(), var.span);
            }
            self.check_shadow(&var.name, var.span);
            new_locals.insert(var.name.clone());
        }

        let mut patterns = Vec::with_capacity(case.pats.len());
        for pat in &case.pats {
            patterns.push(self.lower_pattern(pat, &new_locals, tvars)?);
        }
        let exp = self.lower_exp(&case.exp, &new_locals, tvars)?;
        let guard = match &case.guard {
            Some(guard) => Some(self.lower_exp(guard, &new_locals, tvars)?),
            None => None,
        };
        Ok(Case {
            patterns,
            exp,
            guard,
        })
    }

    fn lower_pattern(
        &mut self,
        pat: &SPattern,
        locals: &HashSet<String>,
        tvars: &mut HashMap<String, Type>,
    ) -> LowerResult<Pattern> {
        match pat {
            SPattern::Wildcard { span } => Ok(Pattern::new(PatternKind::Wildcard, *span)),
            SPattern::Literal { lit, span } => {
                let lit = self.lower_exp(lit, locals, tvars)?;
                Ok(Pattern::new(PatternKind::Literal(Box::new(lit)), *span))
            }
            SPattern::Var { name, span } => {
                Ok(Pattern::new(PatternKind::Var(name.clone()), *span))
            }
            SPattern::Ctor {
                name,
                alias,
                fields,
                span,
            } => {
                let ctor = self.lower_exp(
                    &SExpr::Ctor {
                        name: name.clone(),
                        alias: alias.clone(),
                        span: *span,
                    },
                    locals,
                    tvars,
                )?;
                let mut lowered = Vec::with_capacity(fields.len());
                for field in fields {
                    lowered.push(self.lower_pattern(field, locals, tvars)?);
                }
                Ok(Pattern::new(
                    PatternKind::Ctor {
                        ctor: Box::new(ctor),
                        fields: lowered,
                    },
                    *span,
                ))
            }
            SPattern::Parens { pat, .. } => self.lower_pattern(pat, locals, tvars),
            SPattern::Record { labels, span } => {
                let labels =
                    labels.map_values_result(|p| self.lower_pattern(p, locals, tvars))?;
                Ok(Pattern::new(PatternKind::Record { labels }, *span))
            }
            SPattern::List { elems, tail, span } => {
                let tail = match tail {
                    Some(tail) => Some(Box::new(self.lower_pattern(tail, locals, tvars)?)),
                    None => None,
                };
                let mut lowered = Vec::with_capacity(elems.len());
                for elem in elems {
                    lowered.push(self.lower_pattern(elem, locals, tvars)?);
                }
                Ok(Pattern::new(
                    PatternKind::List {
                        elems: lowered,
                        tail,
                    },
                    *span,
                ))
            }
            SPattern::Named { pat, name, span } => {
                let pat = self.lower_pattern(pat, locals, tvars)?;
                Ok(Pattern::new(
                    PatternKind::Named {
                        pat: Box::new(pat),
                        name: name.clone(),
                    },
                    *span,
                ))
            }
            SPattern::Unit { span } => Ok(Pattern::new(PatternKind::Unit, *span)),
            SPattern::TypeTest { ty, alias, span } => {
                let test = self.lower_type(ty, false, &mut HashMap::new());
                Ok(Pattern::new(
                    PatternKind::TypeTest {
                        test,
                        alias: alias.clone(),
                    },
                    *span,
                ))
            }
            SPattern::Tuple { p1, p2, span } => {
                let p1 = self.lower_pattern(p1, locals, tvars)?;
                let p2 = self.lower_pattern(p2, locals, tvars)?;
                let ctor = Expr::new(
                    ExprKind::Ctor {
                        name: "Tuple".to_string(),
                        module: Some(CORE_MODULE.to_string()),
                    },
                    *span,
                );
                Ok(Pattern::new(
                    PatternKind::Ctor {
                        ctor: Box::new(ctor),
                        fields: vec![p1, p2],
                    },
                    *span,
                ))
            }
            SPattern::Regex { regex, span, .. } => {
                if let Err(err) = Regex::new(regex) {
                    return Err(
                        self.make_error(messages::invalid_regex(&err.to_string()), *span)
                    );
                }
                Ok(Pattern::new(PatternKind::Regex(regex.clone()), *span))
            }
            SPattern::Implicit { span, .. } => {
                Err(self.make_error(messages::IMPLICIT_PATTERN.to_string(), *span))
            }
            SPattern::TypeAnnotation { span, .. } => {
                Err(self.make_error(messages::ANNOTATION_PATTERN.to_string(), *span))
            }
        }
    }

    /// Turns multi-pattern heads into nested unary lambdas, introducing a
    /// single match over fresh variables when a pattern is not a plain
    /// binder.
    fn nest_lambda_pats(
        &mut self,
        pats: &[SPattern],
        exp: Expr,
        locals: &HashSet<String>,
        tvars: &mut HashMap<String, Type>,
    ) -> LowerResult<Expr> {
        let Some((first, rest)) = pats.split_first() else {
            return Ok(exp);
        };
        match first {
            SPattern::Var { name, span } => {
                let body = self.nest_lambda_pats(rest, exp, locals, tvars)?;
                let full_span = Span::new(*span, body.span);
                Ok(Expr::new(
                    ExprKind::Lambda {
                        binder: Binder {
                            name: name.clone(),
                            span: *span,
                            is_implicit: false,
                            ty: None,
                        },
                        body: Box::new(body),
                    },
                    full_span,
                ))
            }
            SPattern::Implicit { pat, span } => {
                if let SPattern::Var { name, span: var_span } = pat.as_ref() {
                    let body = self.nest_lambda_pats(rest, exp, locals, tvars)?;
                    let full_span = Span::new(*span, body.span);
                    Ok(Expr::new(
                        ExprKind::Lambda {
                            binder: Binder {
                                name: name.clone(),
                                span: *var_span,
                                is_implicit: true,
                                ty: None,
                            },
                            body: Box::new(body),
                        },
                        full_span,
                    ))
                } else {
                    let fresh = self.fresh_var();
                    let scrutinee = Expr::new(
                        ExprKind::Var {
                            name: fresh.clone(),
                            module: None,
                            is_op: false,
                        },
                        *span,
                    );
                    let pattern = self.lower_pattern(pat, locals, tvars)?;
                    let match_span = exp.span;
                    let matched = Expr::new(
                        ExprKind::Match {
                            exps: vec![scrutinee],
                            cases: vec![Case {
                                patterns: vec![pattern],
                                exp,
                                guard: None,
                            }],
                        },
                        match_span,
                    );
                    let body = self.nest_lambda_pats(rest, matched, locals, tvars)?;
                    let full_span = Span::new(*span, body.span);
                    Ok(Expr::new(
                        ExprKind::Lambda {
                            binder: Binder {
                                name: fresh,
                                span: *span,
                                is_implicit: true,
                                ty: None,
                            },
                            body: Box::new(body),
                        },
                        full_span,
                    ))
                }
            }
            SPattern::Parens { pat, .. } => {
                let mut inner = vec![(**pat).clone()];
                inner.extend(rest.iter().cloned());
                self.nest_lambda_pats(&inner, exp, locals, tvars)
            }
            SPattern::TypeAnnotation { binder, ty, span } => {
                let mut scoped = tvars.clone();
                let ann = self.lower_type(ty, false, &mut scoped);
                let body = self.nest_lambda_pats(rest, exp, locals, tvars)?;
                let full_span = Span::new(*span, body.span);
                Ok(Expr::new(
                    ExprKind::Lambda {
                        binder: Binder {
                            name: binder.val.clone(),
                            span: binder.span,
                            is_implicit: false,
                            ty: Some(ann),
                        },
                        body: Box::new(body),
                    },
                    full_span,
                ))
            }
            _ => {
                // a single match over fresh parameters covers every
                // non-binder pattern at once
                let binders: Vec<(String, Span)> = pats
                    .iter()
                    .map(|pat| (self.fresh_var(), pat.span()))
                    .collect();
                let scrutinees: Vec<Expr> = binders
                    .iter()
                    .map(|(name, span)| {
                        Expr::new(
                            ExprKind::Var {
                                name: name.clone(),
                                module: None,
                                is_op: false,
                            },
                            *span,
                        )
                    })
                    .collect();
                let mut patterns = Vec::with_capacity(pats.len());
                for pat in pats {
                    patterns.push(self.lower_pattern(pat, locals, tvars)?);
                }
                let match_span = Span::new(first.span(), exp.span);
                let matched = Expr::new(
                    ExprKind::Match {
                        exps: scrutinees,
                        cases: vec![Case {
                            patterns,
                            exp,
                            guard: None,
                        }],
                    },
                    match_span,
                );
                Ok(nest_plain_lambdas(binders, matched))
            }
        }
    }

    ///////////////////////////////////////////////
    // types
    ///////////////////////////////////////////////

    fn lower_type(
        &mut self,
        ty: &SType,
        is_ctor: bool,
        tvars: &mut HashMap<String, Type>,
    ) -> Type {
        let resolved = self.resolve_aliases(ty);
        self.lower_type_inner(&resolved, is_ctor, tvars, 0)
    }

    fn lower_type_inner(
        &mut self,
        ty: &SType,
        is_ctor: bool,
        tvars: &mut HashMap<String, Type>,
        kind_arity: usize,
    ) -> Type {
        match ty {
            SType::Const { name, alias, span } => {
                let kind = if kind_arity > 0 {
                    Kind::Ctor(kind_arity)
                } else {
                    Kind::Star
                };
                if name
                    .chars()
                    .next()
                    .map(|c| c.is_lowercase())
                    .unwrap_or(false)
                {
                    if !is_ctor {
                        if let Some(var) = tvars.get(name) {
                            return var.clone().with_span(*span);
                        }
                        let var = self.tc.new_gen_var_name(name).with_span(*span);
                        tvars.insert(name.clone(), var.clone());
                        var
                    } else {
                        Type::Const {
                            name: name.clone(),
                            kind: Kind::Star,
                            span: *span,
                        }
                    }
                } else {
                    let full = fullname(name, alias.as_deref());
                    if alias.is_none() && is_prim_type(name) && !self.imports.contains_key(name) {
                        return Type::Const {
                            name: name.clone(),
                            kind,
                            span: *span,
                        };
                    }
                    let mod_name = match self.imports.get(&full) {
                        Some(module) => {
                            self.used_imports.insert(module.clone());
                            module.clone()
                        }
                        None => self.mod_name.clone(),
                    };
                    Type::Const {
                        name: format!("{mod_name}.{name}"),
                        kind,
                        span: *span,
                    }
                }
            }
            SType::Fun { arg, ret, span } => Type::Arrow {
                args: vec![self.lower_type_inner(arg, is_ctor, tvars, 0)],
                ret: Box::new(self.lower_type_inner(ret, is_ctor, tvars, 0)),
                span: *span,
            },
            SType::Parens { ty, .. } => self.lower_type_inner(ty, is_ctor, tvars, kind_arity),
            SType::App { ty, types, span } => Type::App {
                base: Box::new(self.lower_type_inner(ty, is_ctor, tvars, types.len())),
                args: types
                    .iter()
                    .map(|t| self.lower_type_inner(t, is_ctor, tvars, 0))
                    .collect(),
                span: *span,
            },
            SType::Record { row, span } => Type::Record {
                row: Box::new(self.lower_type_inner(row, is_ctor, tvars, 0)),
                span: *span,
            },
            SType::RowEmpty { span } => Type::RowEmpty { span: *span },
            SType::RowExtend { labels, row, span } => Type::RowExtend {
                labels: labels.map_values(|t| self.lower_type_inner(t, is_ctor, tvars, 0)),
                row: Box::new(self.lower_type_inner(row, is_ctor, tvars, 0)),
                span: *span,
            },
            SType::Implicit { ty, span } => Type::Implicit {
                ty: Box::new(self.lower_type_inner(ty, is_ctor, tvars, 0)),
                span: *span,
            },
        }
    }

    ///////////////////////////////////////////////
    // top-level ordering
    ///////////////////////////////////////////////

    /// Orders the module's values by dependency under the recursive-function
    /// discipline. Cycles through plain values are hard errors; mutually
    /// recursive functions demand explicit signatures.
    fn order_top_level_values(&mut self, lowered: Vec<Decl>) -> Option<Vec<Decl>> {
        let mut types = Vec::new();
        let mut vals = Vec::new();
        for decl in lowered {
            match decl {
                Decl::Type(t) => types.push(t),
                Decl::Val(v) => vals.push(v),
            }
        }

        let mut dag: Dag<String, usize> = Dag::new(vals.len());
        let mut deps: HashMap<String, Vec<String>> = HashMap::new();
        for (idx, val) in vals.iter().enumerate() {
            deps.insert(val.name.val.clone(), val.exp.collect_references());
            dag.add_node(val.name.val.clone(), idx);
        }

        // link dependencies, skipping the edges the recursion rules allow
        let by_name: HashMap<String, usize> = vals
            .iter()
            .enumerate()
            .map(|(idx, val)| (val.name.val.clone(), idx))
            .collect();
        for val in &vals {
            let names = deps.get(&val.name.val).cloned().unwrap_or_default();
            for dep_name in names {
                let Some(&dep_idx) = by_name.get(&dep_name) else {
                    continue;
                };
                let dep = &vals[dep_idx];
                let dep_is_value = !is_function(dep);
                let this_is_value = !is_function(val);
                if dep_is_value || this_is_value {
                    // plain values can never be cyclic
                    dag.link(&dep.name.val, &val.name.val);
                } else if dep.name.val == val.name.val {
                    // self recursion is fine for functions
                } else if dep.signature.is_none() || val.signature.is_none() {
                    // mutual recursion demands type annotations on both ends
                    dag.link(&dep.name.val, &val.name.val);
                }
            }
        }

        if let Some(cycle) = dag.find_cycle() {
            let names: Vec<String> = cycle.iter().map(|&id| dag.val(id).clone()).collect();
            let participants: Vec<&ValDecl> =
                cycle.iter().map(|&id| &vals[*dag.data(id)]).collect();
            if participants.len() == 1 {
                let err = self.make_error(
                    messages::cycle_in_values(&names),
                    participants[0].span,
                );
                self.errors.push(err);
            } else if participants.iter().any(|decl| !is_function(decl)) {
                for decl in &participants {
                    let err = self.make_error(messages::cycle_in_values(&names), decl.span);
                    self.errors.push(err);
                }
            } else {
                for decl in &participants {
                    let err =
                        self.make_error(messages::cycle_in_functions(&names), decl.span);
                    self.errors.push(err);
                }
            }
            return None;
        }

        let mut decls: Vec<Decl> = types.into_iter().map(Decl::Type).collect();
        let order = dag.toposort();
        let mut taken: Vec<Option<ValDecl>> = vals.into_iter().map(Some).collect();
        for id in order {
            let idx = *dag.data(id);
            if let Some(val) = taken[idx].take() {
                decls.push(Decl::Val(val));
            }
        }
        Some(decls)
    }

    ///////////////////////////////////////////////
    // variable collection and bookkeeping
    ///////////////////////////////////////////////

    fn collect_letdef_vars(&mut self, def: &SLetDef) -> Vec<CollectedVar> {
        match def {
            SLetDef::Bind {
                name, is_instance, ..
            } => vec![CollectedVar {
                name: name.name.clone(),
                span: name.span,
                implicit: name.is_implicit,
                instance: *is_instance,
            }],
            SLetDef::Pat { pat, .. } => self.collect_pattern_vars(pat, false),
        }
    }

    fn collect_pattern_vars(&mut self, pat: &SPattern, implicit: bool) -> Vec<CollectedVar> {
        match pat {
            SPattern::Var { name, span } => vec![CollectedVar {
                name: name.clone(),
                span: *span,
                implicit,
                instance: false,
            }],
            SPattern::Parens { pat, .. } => self.collect_pattern_vars(pat, implicit),
            SPattern::Ctor { fields, .. } => fields
                .iter()
                .flat_map(|field| self.collect_pattern_vars(field, implicit))
                .collect(),
            SPattern::Record { labels, .. } => labels
                .values()
                .flat_map(|p| self.collect_pattern_vars(p, implicit))
                .collect(),
            SPattern::List { elems, tail, .. } => {
                let mut vars: Vec<CollectedVar> = elems
                    .iter()
                    .flat_map(|elem| self.collect_pattern_vars(elem, implicit))
                    .collect();
                if let Some(tail) = tail {
                    vars.extend(self.collect_pattern_vars(tail, implicit));
                }
                vars
            }
            SPattern::Named { pat, name, .. } => {
                let mut vars = self.collect_pattern_vars(pat, implicit);
                vars.push(CollectedVar {
                    name: name.val.clone(),
                    span: name.span,
                    implicit: false,
                    instance: false,
                });
                vars
            }
            SPattern::Implicit { pat, .. } => self.collect_pattern_vars(pat, true),
            SPattern::TypeTest { alias, span, .. } => match alias {
                Some(alias) => vec![CollectedVar {
                    name: alias.clone(),
                    span: *span,
                    implicit,
                    instance: false,
                }],
                None => Vec::new(),
            },
            SPattern::TypeAnnotation { binder, .. } => vec![CollectedVar {
                name: binder.val.clone(),
                span: binder.span,
                implicit,
                instance: false,
            }],
            SPattern::Tuple { p1, p2, .. } => {
                let mut vars = self.collect_pattern_vars(p1, implicit);
                vars.extend(self.collect_pattern_vars(p2, implicit));
                vars
            }
            SPattern::Wildcard { .. }
            | SPattern::Literal { .. }
            | SPattern::Unit { .. }
            | SPattern::Regex { .. } => Vec::new(),
        }
    }

    fn fresh_var(&mut self) -> String {
        self.var_count += 1;
        format!("__var{}", self.var_count)
    }

    fn report_unused_vars(&mut self) {
        let unused = std::mem::take(&mut self.unused_vars);
        for (name, span) in unused {
            let warn = self.make_warn(messages::unused_variable(&name), span);
            self.errors.push(warn);
        }
    }

    fn check_alias(&mut self, alias: &str, span: Span) {
        if !self.aliased_imports.contains(alias) {
            let err = self.make_error(messages::no_alias_found(alias), span);
            self.errors.push(err);
        }
    }

    fn check_shadow(&mut self, name: &str, span: Span) {
        if self.imports.contains_key(name) {
            let err = self.make_error(messages::shadowed_variable(name), span);
            self.errors.push(err);
        }
    }

    fn make_error(&self, msg: String, span: Span) -> Diagnostic {
        Diagnostic {
            message: msg,
            span,
            path: self.source_name.clone(),
            module: Some(self.mod_name.clone()),
            severity: Severity::Error,
            typing_context: None,
        }
    }

    fn make_warn(&self, msg: String, span: Span) -> Diagnostic {
        Diagnostic {
            message: msg,
            span,
            path: self.source_name.clone(),
            module: Some(self.mod_name.clone()),
            severity: Severity::Warning,
            typing_context: None,
        }
    }
}

/// A declaration counts as a function when its body is a lambda or its
/// signature is an arrow type.
fn is_function(decl: &ValDecl) -> bool {
    if decl.exp.is_lambda() {
        return true;
    }
    matches!(
        decl.signature.as_ref().map(|sig| sig.ty.real_type()),
        Some(crate::typecheck::types::Type::Arrow { .. })
    )
}

fn nest_plain_lambdas(binders: Vec<(String, Span)>, exp: Expr) -> Expr {
    let mut expr = exp;
    for (name, span) in binders.into_iter().rev() {
        let body_span = expr.span;
        expr = Expr::new(
            ExprKind::Lambda {
                binder: Binder {
                    name,
                    span,
                    is_implicit: false,
                    ty: None,
                },
                body: Box::new(expr),
            },
            body_span,
        );
    }
    expr
}

fn nest_record_selects(exp: Expr, labels: &[Spanned<String>], span: Span) -> Expr {
    let mut expr = exp;
    for label in labels {
        expr = Expr::new(
            ExprKind::RecordSelect {
                exp: Box::new(expr),
                label: label.clone(),
            },
            span,
        );
    }
    expr
}

fn nest_record_restrictions(exp: Expr, labels: &[String], span: Span) -> Expr {
    let mut expr = exp;
    for label in labels {
        expr = Expr::new(
            ExprKind::RecordRestrict {
                exp: Box::new(expr),
                label: label.clone(),
            },
            span,
        );
    }
    expr
}

/// Expands a multi-label set/update into single-label nests: the outer
/// levels become updates selecting one step deeper, the innermost level
/// applies the given value or function.
fn nest_record_updates(
    exp: &Expr,
    labels: &[Spanned<String>],
    value: Expr,
    is_set: bool,
    span: Span,
) -> Expr {
    let Some((first, tail)) = labels.split_first() else {
        return exp.clone();
    };
    let should_set = is_set || !tail.is_empty();
    let inner_value = if tail.is_empty() {
        value
    } else {
        let selected = Expr::new(
            ExprKind::RecordSelect {
                exp: Box::new(exp.clone()),
                label: first.clone(),
            },
            value.span,
        );
        nest_record_updates(&selected, tail, value, is_set, span)
    };
    Expr::new(
        ExprKind::RecordUpdate {
            exp: Box::new(exp.clone()),
            label: first.clone(),
            value: Box::new(inner_value),
            is_set: should_set,
        },
        span,
    )
}

/// Rewrites `do`-level `let` statements into nested lets, so every binding
/// scopes over the remainder of the block.
fn convert_do_lets(exps: &[SExpr]) -> Vec<SExpr> {
    let has_do_let = exps
        .iter()
        .any(|exp| matches!(exp, SExpr::DoLet { .. }));
    if !has_do_let {
        return exps.to_vec();
    }
    let Some((first, rest)) = exps.split_first() else {
        return Vec::new();
    };
    if let SExpr::DoLet { def, span } = first {
        let body = convert_do_lets(rest);
        let body_exp = if body.len() > 1 {
            let body_span = Span::new(
                body.first().map(|e| e.span()).unwrap_or(*span),
                body.last().map(|e| e.span()).unwrap_or(*span),
            );
            SExpr::Do {
                exps: body,
                span: body_span,
            }
        } else {
            body.into_iter().next().expect("do-let is never last")
        };
        let full_span = Span::new(*span, body_exp.span());
        vec![SExpr::Let {
            def: def.clone(),
            body: Box::new(body_exp),
            span: full_span,
        }]
    } else {
        let mut res = vec![first.clone()];
        res.extend(convert_do_lets(rest));
        res
    }
}
