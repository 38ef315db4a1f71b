//! Injects the public symbols of a module's imports into a fresh typing
//! environment and records how source names map to defining modules.

use std::collections::HashMap;

use crate::diagnostics::{Diagnostic, Severity};
use crate::messages;
use crate::surface::{RefTag, SModule, STypealias, Visibility};
use crate::typecheck::env::FullModuleEnv;
use crate::typecheck::Typechecker;

pub fn resolve_imports(
    module: &mut SModule,
    modules: &HashMap<String, FullModuleEnv>,
    tc: &mut Typechecker,
) -> Vec<Diagnostic> {
    let mut resolved: HashMap<String, String> = HashMap::new();
    let mut resolved_aliases: Vec<STypealias> = Vec::new();
    let mut errors = Vec::new();

    for imp in &module.imports {
        let mk_error = |msg: String| Diagnostic {
            message: msg,
            span: imp.span,
            path: module.source_name.clone(),
            module: Some(module.name.val.clone()),
            severity: Severity::Error,
            typing_context: None,
        };

        let mname = &imp.module.val;
        let Some(imported) = modules.get(mname) else {
            errors.push(mk_error(messages::module_not_found(mname)));
            continue;
        };
        let menv = &imported.env;
        let typealiases: HashMap<&str, &STypealias> = imported
            .aliases
            .iter()
            .map(|alias| (alias.name.as_str(), alias))
            .collect();

        // fully qualified names are always in scope for the typechecker
        for (name, ty_ref) in &menv.types {
            if ty_ref.visibility == Visibility::Public {
                tc.env
                    .extend_type(format!("{mname}.{name}"), ty_ref.ty.clone());
            }
        }
        for (name, decl_ref) in &menv.decls {
            if decl_ref.visibility == Visibility::Public {
                tc.env.extend(format!("{mname}.{name}"), decl_ref.ty.clone());
                if decl_ref.is_instance {
                    tc.env
                        .extend_instance(format!("{mname}.{name}"), decl_ref.ty.clone(), false);
                }
            }
        }

        // an alias additionally brings `Alias.name` forms into scope
        if let Some(alias) = &imp.alias {
            for (name, ty_ref) in &menv.types {
                if ty_ref.visibility == Visibility::Public {
                    resolved.insert(format!("{alias}.{name}"), mname.clone());
                }
            }
            for (name, decl_ref) in &menv.decls {
                if decl_ref.visibility == Visibility::Public {
                    resolved.insert(format!("{alias}.{name}"), mname.clone());
                }
            }
            for talias in imported.aliases.iter() {
                if talias.visibility == Visibility::Public {
                    resolved_aliases.push(talias.clone());
                }
            }
        }

        for decl_ref in &imp.defs {
            let ref_name = &decl_ref.name.val;
            if decl_ref.tag == RefTag::Var {
                let Some(found) = menv.decls.get(ref_name) else {
                    errors.push(mk_error(messages::cannot_find_in_module(
                        &format!("declaration {ref_name}"),
                        mname,
                    )));
                    continue;
                };
                if found.visibility == Visibility::Private {
                    errors.push(mk_error(messages::cannot_import_in_module(
                        &format!("declaration {ref_name}"),
                        mname,
                    )));
                    continue;
                }
                resolved.insert(ref_name.clone(), mname.clone());
                let full = format!("{mname}.{ref_name}");
                tc.env.extend(&full, found.ty.clone());
                if found.is_instance {
                    tc.env.extend_instance(&full, found.ty.clone(), false);
                }
                continue;
            }

            // a type reference can be a typealias or a declared type
            if let Some(talias) = typealiases.get(ref_name.as_str()) {
                if talias.visibility == Visibility::Private {
                    errors.push(mk_error(messages::cannot_import_in_module(
                        &format!("type {ref_name}"),
                        mname,
                    )));
                    continue;
                }
                resolved_aliases.push((*talias).clone());
                continue;
            }
            let Some(found) = menv.types.get(ref_name) else {
                errors.push(mk_error(messages::cannot_find_in_module(
                    &format!("type {ref_name}"),
                    mname,
                )));
                continue;
            };
            if found.visibility == Visibility::Private {
                errors.push(mk_error(messages::cannot_import_in_module(
                    &format!("type {ref_name}"),
                    mname,
                )));
                continue;
            }
            tc.env
                .extend_type(format!("{mname}.{ref_name}"), found.ty.clone());
            resolved.insert(ref_name.clone(), mname.clone());

            let wanted: Vec<String> = if decl_ref.all {
                found.ctors.clone()
            } else {
                decl_ref.ctors.iter().map(|c| c.val.clone()).collect()
            };
            for ctor in wanted {
                let Some(ctor_decl) = menv.decls.get(&ctor) else {
                    errors.push(mk_error(messages::cannot_find_in_module(
                        &format!("constructor {ctor}"),
                        mname,
                    )));
                    continue;
                };
                if ctor_decl.visibility == Visibility::Private {
                    errors.push(mk_error(messages::cannot_import_in_module(
                        &format!("constructor {ctor}"),
                        mname,
                    )));
                    continue;
                }
                tc.env
                    .extend(format!("{mname}.{ctor}"), ctor_decl.ty.clone());
                resolved.insert(ctor, mname.clone());
            }
        }
    }

    module.resolved_imports = resolved;
    module.resolved_aliases = resolved_aliases;
    errors
}
