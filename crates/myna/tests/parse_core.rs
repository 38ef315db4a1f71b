use std::fs;
use std::path::Path;

use myna::diagnostics::Severity;
use myna::hir::lower::lower_module;
use myna::hir::Decl;
use myna::parser::parse_source;
use myna::surface::{SDecl, SModule, Visibility};
use myna::typecheck::Typechecker;
use myna::{expand_target, Environment, Options, Source};

fn parse_ok(code: &str) -> SModule {
    let (module, errors) = parse_source("test.myn", code);
    assert!(errors.is_empty(), "parse errors: {errors:#?}");
    module.expect("module")
}

fn lower_ok(code: &str) -> myna::hir::Module {
    let module = parse_ok(code);
    let mut tc = Typechecker::new();
    tc.set_module(&module.name.val, &module.source_name);
    let lowered = lower_module(&module, &mut tc);
    let hard: Vec<_> = lowered
        .errors
        .iter()
        .filter(|e| e.severity >= Severity::Error)
        .collect();
    assert!(hard.is_empty(), "lowering errors: {hard:#?}");
    lowered.module.expect("lowered module")
}

#[test]
fn module_header_is_mandatory() {
    let (module, errors) = parse_source("test.myn", "x = 1\n");
    assert!(module.is_none());
    assert_eq!(errors.len(), 1);
    assert!(errors[0]
        .message
        .starts_with("Expected file to begin with a module declaration."));
    assert_eq!(errors[0].severity, Severity::Fatal);
}

#[test]
fn module_names_are_validated() {
    let (module, errors) = parse_source("test.myn", "module Bad.name\n\nx = 1\n");
    assert!(module.is_none());
    assert!(errors[0]
        .message
        .starts_with("Module names should be composed of identifiers"));
}

#[test]
fn dotted_module_names_parse() {
    let module = parse_ok("module some.nested.pkg\n\nx = 1\n");
    assert_eq!(module.name.val, "some.nested.pkg");
}

#[test]
fn layout_sensitive_forms() {
    let code = r#"module indentation

rec = { func: \x -> x, notfun: 0 }

foo =
  \x ->
    x

fun () =
  let x =
    1
    2
  x

fun2 x =
  while true do
    x

fun3 x =
  case x of
    Some _ -> 1
    None -> 0
"#;
    lower_ok(code);
}

#[test]
fn offside_violations_are_reported() {
    let code = "module test\n\nf =\n  \\x ->\n x\n";
    let (_, errors) = parse_source("test.myn", code);
    assert!(
        errors
            .iter()
            .any(|e| e.message == "Mismatched indentation."),
        "{errors:#?}"
    );
}

#[test]
fn declarations_recover_at_column_one() {
    let code = r#"module test

broken = = 1

fine = 2
"#;
    let (module, errors) = parse_source("test.myn", code);
    let module = module.expect("module survives");
    assert!(!errors.is_empty());
    assert!(module.decls.iter().any(|d| d.name() == "fine"));
}

#[test]
fn multi_constructor_type_cannot_reuse_its_name() {
    let code = r#"module test

type Wrong = Wrong | NotWrong
"#;
    let module = parse_ok(code);
    let mut tc = Typechecker::new();
    tc.set_module("test", "test.myn");
    let lowered = lower_module(&module, &mut tc);
    assert_eq!(lowered.errors.len(), 1, "{:#?}", lowered.errors);
    assert_eq!(
        lowered.errors[0].message,
        "Multi constructor type cannot have the same name as their type: Wrong."
    );
}

#[test]
fn visibility_is_set() {
    let code = r#"module test

pub+
type AllVis = AllVis1 | AllVis2

pub
type NoVis = NoVis1 | NoVis2

type Hidden = Hidden1

pub
x = 3

y = true
"#;
    let module = lower_ok(code);

    let types: Vec<_> = module
        .decls
        .iter()
        .filter_map(|d| match d {
            Decl::Type(t) => Some(t),
            _ => None,
        })
        .collect();
    assert_eq!(types.len(), 3);

    let all_vis = types.iter().find(|t| t.name.val == "AllVis").unwrap();
    assert_eq!(all_vis.visibility, Visibility::Public);
    assert!(all_vis
        .data_ctors
        .iter()
        .all(|c| c.visibility == Visibility::Public));

    let no_vis = types.iter().find(|t| t.name.val == "NoVis").unwrap();
    assert_eq!(no_vis.visibility, Visibility::Public);
    assert!(no_vis
        .data_ctors
        .iter()
        .all(|c| c.visibility == Visibility::Private));

    let hidden = types.iter().find(|t| t.name.val == "Hidden").unwrap();
    assert_eq!(hidden.visibility, Visibility::Private);

    let vals: Vec<_> = module
        .decls
        .iter()
        .filter_map(|d| match d {
            Decl::Val(v) => Some(v),
            _ => None,
        })
        .collect();
    assert_eq!(
        vals.iter().find(|v| v.name.val == "x").unwrap().visibility,
        Visibility::Public
    );
    assert_eq!(
        vals.iter().find(|v| v.name.val == "y").unwrap().visibility,
        Visibility::Private
    );
}

#[test]
fn pub_plus_is_only_for_types() {
    let code = r#"module test

pub+
x = 3
"#;
    let (_, errors) = parse_source("test.myn", code);
    assert!(errors.iter().any(|e| e.message
        == "Visibility of value or typealias declaration can only be public (pub) not pub+."));
}

#[test]
fn signatures_must_be_followed_by_their_definition() {
    let code = r#"module test

f : Int -> Int

g = 1
"#;
    let (_, errors) = parse_source("test.myn", code);
    assert!(
        errors
            .iter()
            .any(|e| e.message == "Expected definition to follow its type declaration for f."),
        "{errors:#?}"
    );
}

#[test]
fn operator_declarations_use_parens() {
    let module = parse_ok(
        r#"module test

(|>) x f = f x
"#,
    );
    match &module.decls[0] {
        SDecl::Val(val) => {
            assert_eq!(val.binder.val, "|>");
            assert!(val.is_operator);
        }
        other => panic!("expected a value declaration, got {other:?}"),
    }

    let (_, errors) = parse_source("test.myn", "module test\n\n<*> x = x\n");
    assert!(errors
        .iter()
        .any(|e| e.message == "Operator declarations have to be defined between parentheses."));
}

#[test]
fn imports_parse_with_refs_and_alias() {
    let module = parse_ok(
        r#"module test

import data.pack (one, Shape(..), Color(Red, Green)) as P
import other

x = 1
"#,
    );
    assert_eq!(module.imports.len(), 2);
    let first = &module.imports[0];
    assert_eq!(first.module.val, "data.pack");
    assert_eq!(first.alias.as_deref(), Some("P"));
    assert_eq!(first.defs.len(), 3);
    assert!(first.defs[1].all);
    assert_eq!(first.defs[2].ctors.len(), 2);
}

#[test]
fn empty_import_lists_are_rejected() {
    let (_, errors) = parse_source("test.myn", "module test\n\nimport lib ()\n\nx = 1\n");
    assert!(errors
        .iter()
        .any(|e| e.message == "Import list cannot be empty."));
}

#[test]
fn while_needs_a_simple_condition() {
    let code = r#"module test

f x =
  while let y = x in y do
    x
"#;
    let (_, errors) = parse_source("test.myn", code);
    assert!(
        errors
            .iter()
            .any(|e| e.message == "Invalid expression for while condition."),
        "{errors:#?}"
    );
}

#[test]
fn foreign_access_is_a_stub() {
    let (_, errors) = parse_source("test.myn", "module test\n\nx = Math#-pi\n");
    assert!(errors
        .iter()
        .any(|e| e.message == "Foreign functions are not supported yet."));
}

#[test]
fn metadata_brackets_are_skipped() {
    let module = parse_ok(
        r#"module test

#[deprecated]
x = 1
"#,
    );
    assert_eq!(module.decls.len(), 1);
    assert_eq!(module.decls[0].name(), "x");
}

#[test]
fn setter_operator_cannot_be_partially_applied() {
    let code = r#"module test

bad = (<-)
"#;
    let module = parse_ok(code);
    let mut tc = Typechecker::new();
    tc.set_module("test", "test.myn");
    let lowered = lower_module(&module, &mut tc);
    assert!(
        lowered.errors.iter().any(|e| e.message.starts_with(
            "Operator `<-` expects a foreign field as first parameter"
        )),
        "{:#?}",
        lowered.errors
    );
}

#[test]
fn expand_target_collects_source_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let nested = dir.path().join("nested");
    fs::create_dir_all(&nested).expect("mkdir");
    fs::write(dir.path().join("a.myn"), "module a\n\nx = 1\n").expect("write");
    fs::write(nested.join("b.myn"), "module b\n\ny = 2\n").expect("write");
    fs::write(dir.path().join("ignored.txt"), "not a source").expect("write");

    let sources = expand_target(dir.path().to_str().unwrap()).expect("expand");
    assert_eq!(sources.len(), 2);

    let mut environment = Environment::new(Options::default());
    environment.parse_and_infer(&sources).expect("io");
    assert!(environment.errors().iter().all(|e| e.severity < Severity::Error));
    assert!(environment.modules().contains_key("a"));
    assert!(environment.modules().contains_key("b"));
}

#[test]
fn expand_target_rejects_missing_paths() {
    let err = expand_target(Path::new("does/not/exist").to_str().unwrap());
    assert!(err.is_err());
}
