use std::collections::HashMap;

use myna::diagnostics::{Diagnostic, Severity};
use myna::typecheck::env::FullModuleEnv;
use myna::typecheck::types::{Type, TypeVar};
use myna::{Environment, Options, Source};

fn compile_sources(sources: Vec<(&str, &str)>) -> (HashMap<String, FullModuleEnv>, Vec<Diagnostic>) {
    let sources: Vec<Source> = sources
        .into_iter()
        .map(|(path, code)| Source::from_text(path, code))
        .collect();
    let mut environment = Environment::new(Options::default());
    environment
        .parse_and_infer(&sources)
        .expect("source text never fails on IO");
    (
        environment.modules().clone(),
        environment.errors().to_vec(),
    )
}

fn compile_code(code: &str) -> FullModuleEnv {
    let (modules, errors) = compile_sources(vec![("test.myn", code)]);
    let hard: Vec<&Diagnostic> = errors.iter().filter(|d| d.is_error()).collect();
    assert!(hard.is_empty(), "unexpected errors: {hard:#?}");
    modules.get("test").expect("module test").clone()
}

fn compile_errors(code: &str) -> Vec<Diagnostic> {
    let (_, errors) = compile_sources(vec![("test.myn", code)]);
    errors.into_iter().filter(|d| d.is_error()).collect()
}

fn decl_type(env: &FullModuleEnv, name: &str) -> String {
    let decl = env
        .env
        .decls
        .get(name)
        .unwrap_or_else(|| panic!("no declaration {name}"));
    decl.ty.show_with(&env.type_vars)
}

/// Renumbers type variables in first-occurrence order so tests are stable
/// against the global id counter.
fn simple_name(env: &FullModuleEnv, name: &str) -> String {
    let decl = env
        .env
        .decls
        .get(name)
        .unwrap_or_else(|| panic!("no declaration {name}"));
    let mut names: HashMap<u32, String> = HashMap::new();
    let mut next = 0u32;
    decl.ty.walk(&mut |ty| {
        if let Type::Var { tvar, .. } = ty {
            match &*tvar.borrow() {
                TypeVar::Unbound { id, .. } | TypeVar::Generic { id } => {
                    names.entry(*id).or_insert_with(|| {
                        next += 1;
                        format!("t{next}")
                    });
                }
                TypeVar::Link { .. } => {}
            }
        }
    });
    decl.ty.show_with(&names)
}

#[test]
fn primitive_literals() {
    let env = compile_code(
        r#"module test

x = 34
y = 34.0
z = 34.0i
s = "string"
c = 'a'
b = true
"#,
    );

    assert_eq!(decl_type(&env, "x"), "Int");
    assert_eq!(decl_type(&env, "y"), "Float32");
    assert_eq!(decl_type(&env, "z"), "Complex64");
    assert_eq!(decl_type(&env, "s"), "String");
    assert_eq!(decl_type(&env, "c"), "Rune");
    assert_eq!(decl_type(&env, "b"), "Bool");
}

#[test]
fn identity_and_instantiation() {
    let env = compile_code(
        r#"module test

id x = x
z = (\y -> y) false
"#,
    );

    assert_eq!(simple_name(&env, "id"), "t1 -> t1");
    assert_eq!(decl_type(&env, "z"), "Bool");
}

#[test]
fn let_polymorphism() {
    let env = compile_code(
        r#"module test

f _ = let id x = x in id 10
"#,
    );

    assert_eq!(simple_name(&env, "f"), "t1 -> Int");
}

#[test]
fn subsumed_if() {
    let env = compile_code(
        r#"module test

id x = x

f _ = if true then 10 else id 0
f2 a = if true then 10 else id a
"#,
    );

    assert_eq!(simple_name(&env, "id"), "t1 -> t1");
    assert_eq!(simple_name(&env, "f"), "t1 -> Int");
    assert_eq!(simple_name(&env, "f2"), "Int -> Int");
}

#[test]
fn unit_function_with_if() {
    let env = compile_code(
        r#"module test

f () = if false then 0 else 1
"#,
    );

    assert_eq!(decl_type(&env, "f"), "Unit -> Int");
}

#[test]
fn mutual_recursion_with_annotations() {
    let env = compile_code(
        r#"module test

f1 : Int -> Int
f1 x = f2 x

f2 : Int -> Int
f2 x = f1 x
"#,
    );

    assert_eq!(decl_type(&env, "f1"), "Int -> Int");
    assert_eq!(decl_type(&env, "f2"), "Int -> Int");
}

#[test]
fn mutual_recursion_without_annotations_is_rejected() {
    let errors = compile_errors(
        r#"module test

f1 x = f2 x

f2 : Int -> Int
f2 x = f1 x
"#,
    );

    assert_eq!(errors.len(), 2, "one error per participant: {errors:#?}");
    for err in &errors {
        assert!(err.message.contains("need type annotations"), "{}", err.message);
        assert!(err.message.contains("f1"));
        assert!(err.message.contains("f2"));
    }
}

#[test]
fn higher_rank_use_is_rejected_once() {
    let errors = compile_errors(
        r#"module test

fun f = Tuple (f 1) (f "a")
"#,
    );

    assert_eq!(errors.len(), 1, "expected exactly one error: {errors:#?}");
    assert!(errors[0].message.contains("Cannot match type"));
}

#[test]
fn private_type_escape() {
    let errors = compile_errors(
        r#"module test

type Hidden = Hidden1

pub
x = Hidden1
"#,
    );

    assert_eq!(errors.len(), 1, "{errors:#?}");
    assert!(
        errors[0].message.contains("escaped its module"),
        "{}",
        errors[0].message
    );
}

#[test]
fn number_conversions() {
    let env = compile_code(
        r#"module test

i = 12
b = 12 : Byte
s = 12345 : Int16
l = 9999999999 : Int64
u = 42 : Uint
d = 3.25 : Float32
f = 3.25 : Float64
hex = 0xff
"#,
    );

    assert_eq!(decl_type(&env, "i"), "Int");
    assert_eq!(decl_type(&env, "b"), "Byte");
    assert_eq!(decl_type(&env, "s"), "Int16");
    assert_eq!(decl_type(&env, "l"), "Int64");
    assert_eq!(decl_type(&env, "u"), "Uint");
    assert_eq!(decl_type(&env, "d"), "Float32");
    assert_eq!(decl_type(&env, "f"), "Float64");
    assert_eq!(decl_type(&env, "hex"), "Int");
}

#[test]
fn out_of_range_literal_annotation_fails() {
    let errors = compile_errors(
        r#"module test

b = 300 : Byte
"#,
    );
    assert!(!errors.is_empty());
}

#[test]
fn records_select_extend_restrict_update() {
    let env = compile_code(
        r#"module test

r = { name: "a", age: 30 }
n = r.name
rest = { - age | r }
upd = { .age = 31 | r }
"#,
    );

    assert_eq!(decl_type(&env, "r"), "{ name : String, age : Int }");
    assert_eq!(decl_type(&env, "n"), "String");
    assert_eq!(decl_type(&env, "rest"), "{ name : String }");
    assert_eq!(decl_type(&env, "upd"), "{ age : Int, name : String }");
}

#[test]
fn record_merge_requires_a_closed_side() {
    let env = compile_code(
        r#"module test

merged = { + { x: 1 }, { y: 2 } }
"#,
    );
    assert_eq!(decl_type(&env, "merged"), "{ y : Int, x : Int }");

    let errors = compile_errors(
        r#"module test

bad r1 r2 = { + r1, r2 }
"#,
    );
    assert!(
        errors
            .iter()
            .any(|e| e.message.contains("Cannot merge records with unknown labels.")),
        "{errors:#?}"
    );
}

#[test]
fn row_polymorphic_selection() {
    let env = compile_code(
        r#"module test

getName r = r.name
"#,
    );

    assert_eq!(simple_name(&env, "getName"), "{ name : t1 | t2 } -> t1");
}

#[test]
fn lists_and_sets() {
    let env = compile_code(
        r#"module test

xs = [1, 2, 3]
ss = #{1, 2}
empty = []
"#,
    );

    assert_eq!(decl_type(&env, "xs"), "List Int");
    assert_eq!(decl_type(&env, "ss"), "Set Int");
    assert_eq!(simple_name(&env, "empty"), "List t1");

    let errors = compile_errors(
        r#"module test

mixed = [1, true]
"#,
    );
    assert!(!errors.is_empty());
}

#[test]
fn tuple_sugar_uses_the_pair_constructor() {
    let env = compile_code(
        r#"module test

pair = 1 ; true
swap (a ; b) = b ; a
"#,
    );

    assert_eq!(decl_type(&env, "pair"), "Tuple Int Bool");
    assert_eq!(simple_name(&env, "swap"), "Tuple t1 t2 -> Tuple t2 t1");
}

#[test]
fn option_prelude_and_unwrap() {
    let env = compile_code(
        r#"module test

opt = Some 1
none = None
u = (Some 1)!!
lifted = _!!
"#,
    );

    assert_eq!(decl_type(&env, "opt"), "Option Int");
    assert_eq!(simple_name(&env, "none"), "Option t1");
    assert_eq!(decl_type(&env, "u"), "Int");
    assert_eq!(simple_name(&env, "lifted"), "Option t1 -> t1");
}

#[test]
fn data_types_and_pattern_matching() {
    let env = compile_code(
        r#"module test

type Shape = Circle Int | Square

area s = case s of
  Circle r -> r
  Square -> 0
"#,
    );

    assert_eq!(decl_type(&env, "area"), "test.Shape -> Int");
}

#[test]
fn constructor_pattern_arity_is_checked() {
    let errors = compile_errors(
        r#"module test

type Shape = Circle Int | Square

bad s = case s of
  Circle -> 1
  Square -> 0
"#,
    );

    assert!(
        errors
            .iter()
            .any(|e| e.message == "Constructor pattern Circle expected 1 parameter(s) but got 0."),
        "{errors:#?}"
    );
}

#[test]
fn match_guards_must_be_boolean() {
    let errors = compile_errors(
        r#"module test

f x = case x of
  y if 1 -> y
  _ -> 0
"#,
    );
    assert!(!errors.is_empty());
}

#[test]
fn self_recursive_function_through_fixpoint() {
    let env = compile_code(
        r#"module test

loop x = loop x
"#,
    );

    assert_eq!(simple_name(&env, "loop"), "t1 -> t2");
}

#[test]
fn recursive_value_cycle_is_reported() {
    let errors = compile_errors(
        r#"module test

v = v
"#,
    );

    assert!(
        errors
            .iter()
            .any(|e| e.message == "Found cycle between values v."),
        "{errors:#?}"
    );
}

#[test]
fn recursive_let_values_are_rejected() {
    let errors = compile_errors(
        r#"module test

f () = let x = x in x
"#,
    );

    assert!(
        errors
            .iter()
            .any(|e| e.message == "Let variables cannot be recursive."),
        "{errors:#?}"
    );
}

#[test]
fn value_cycle_between_two_values() {
    let errors = compile_errors(
        r#"module test

a = b
b = a
"#,
    );

    assert!(
        errors
            .iter()
            .any(|e| e.message.contains("Found cycle between values")),
        "{errors:#?}"
    );
}

#[test]
fn shadowing_a_top_level_value_is_an_error() {
    let errors = compile_errors(
        r#"module test

id x = x
f id = id
"#,
    );

    assert!(
        errors
            .iter()
            .any(|e| e.message == "Value id is shadowing another value with the same name."),
        "{errors:#?}"
    );
}

#[test]
fn unused_variable_warns_but_compiles() {
    let (modules, errors) = compile_sources(vec![(
        "test.myn",
        r#"module test

f x = 1
"#,
    )]);

    assert!(modules.contains_key("test"));
    assert!(errors
        .iter()
        .any(|e| e.severity == Severity::Warning
            && e.message == "Variable x is unused in declaration."));
    assert!(!errors.iter().any(|e| e.is_error()));
}

#[test]
fn undefined_variable() {
    let errors = compile_errors(
        r#"module test

x = someUnknown
"#,
    );

    assert!(
        errors
            .iter()
            .any(|e| e.message == "Undefined variable someUnknown."),
        "{errors:#?}"
    );
}

#[test]
fn duplicate_declarations_do_not_block_others() {
    let (modules, errors) = compile_sources(vec![(
        "test.myn",
        r#"module test

x = 1
x = 2
y = true
"#,
    )]);

    assert!(errors
        .iter()
        .any(|e| e.message == "Declaration x is already defined or imported."));
    let env = modules.get("test").expect("module still typechecks");
    assert_eq!(decl_type(env, "y"), "Bool");
}

#[test]
fn typealias_expansion() {
    let env = compile_code(
        r#"module test

typealias Id = Int
typealias Box a = List a

x = 1 : Id
y = [1] : Box Int
"#,
    );

    assert_eq!(decl_type(&env, "x"), "Int");
    assert_eq!(decl_type(&env, "y"), "List Int");
}

#[test]
fn recursive_typealias_is_rejected() {
    let errors = compile_errors(
        r#"module test

typealias Loop = Loop

x = 1
"#,
    );

    assert!(
        errors
            .iter()
            .any(|e| e.message == "Typealiases cannot be recursive."),
        "{errors:#?}"
    );
}

#[test]
fn annotation_with_unknown_type_is_reported() {
    let errors = compile_errors(
        r#"module test

x = 1 : Missing
"#,
    );

    assert!(
        errors
            .iter()
            .any(|e| e.message.contains("Undefined type test.Missing")),
        "{errors:#?}"
    );
}

#[test]
fn while_loops_are_unit() {
    let env = compile_code(
        r#"module test

spin x =
  while true do
    x
"#,
    );

    assert_eq!(simple_name(&env, "spin"), "t1 -> Unit");
}

#[test]
fn do_let_scopes_over_the_remainder() {
    let env = compile_code(
        r#"module test

f () =
  let x = 1
  x
"#,
    );

    assert_eq!(decl_type(&env, "f"), "Unit -> Int");
}

#[test]
fn do_block_cannot_end_with_let() {
    let errors = compile_errors(
        r#"module test

f () =
  1
  let x = 2
"#,
    );

    assert!(
        errors
            .iter()
            .any(|e| e.message == "Do expression cannot end with a let statement."),
        "{errors:#?}"
    );
}

#[test]
fn type_annotations_and_casts() {
    let env = compile_code(
        r#"module test

x = 1 : Int
y = x as Float64
"#,
    );

    assert_eq!(decl_type(&env, "x"), "Int");
    assert_eq!(decl_type(&env, "y"), "Float64");
}

#[test]
fn anonymous_parameter_sections() {
    let env = compile_code(
        r#"module test

sel = _.name
pick = _.[0]
branch = if _ then 1 else 0
"#,
    );

    assert_eq!(simple_name(&env, "sel"), "{ name : t1 | t2 } -> t1");
    assert_eq!(simple_name(&env, "pick"), "List t1 -> t1");
    assert_eq!(decl_type(&env, "branch"), "Bool -> Int");
}

#[test]
fn underscore_outside_a_section_is_rejected() {
    let errors = compile_errors(
        r#"module test

x = _
"#,
    );

    assert!(
        errors
            .iter()
            .any(|e| e.message.contains("Invalid context for anonymous function argument.")),
        "{errors:#?}"
    );
}

#[test]
fn computation_blocks_lower_against_the_builder() {
    let env = compile_code(
        r#"module test

run b v =
  do.b
    let! x = v
    return x
"#,
    );

    // the builder must expose bind and pure members
    let shown = simple_name(&env, "run");
    assert!(shown.contains("bind :"), "{shown}");
    assert!(shown.contains("pure :"), "{shown}");
}

#[test]
fn computation_keywords_outside_computations() {
    let cases = [
        ("x = return 1", "return keyword can only be used inside a computation expression."),
        ("x = yield 1", "yield keyword can only be used inside a computation expression."),
        ("x = do! 1", "`do!` syntax can only be used inside a computation expression."),
    ];
    for (line, expected) in cases {
        let code = format!("module test\n\n{line}\n");
        let errors = compile_errors(&code);
        assert!(
            errors.iter().any(|e| e.message == expected),
            "{line}: {errors:#?}"
        );
    }
}

#[test]
fn imports_bring_selected_names_and_constructors() {
    let lib = r#"module lib

pub
one = 1

hidden = 2

pub+
type Color = Red | Green
"#;
    let app = r#"module app

import lib (one, Color(..))

two = one
c = Red
"#;
    let (modules, errors) = compile_sources(vec![("lib.myn", lib), ("app.myn", app)]);
    let hard: Vec<&Diagnostic> = errors.iter().filter(|d| d.is_error()).collect();
    assert!(hard.is_empty(), "{hard:#?}");

    let app_env = modules.get("app").expect("app module");
    assert_eq!(decl_type(app_env, "two"), "Int");
    assert_eq!(decl_type(app_env, "c"), "lib.Color");
}

#[test]
fn aliased_imports_bring_qualified_names() {
    let lib = r#"module lib

pub
one = 1
"#;
    let app = r#"module app

import lib as L

x = L.one
"#;
    let (modules, errors) = compile_sources(vec![("lib.myn", lib), ("app.myn", app)]);
    assert!(!errors.iter().any(|e| e.is_error()), "{errors:#?}");
    assert_eq!(decl_type(modules.get("app").unwrap(), "x"), "Int");
}

#[test]
fn import_errors() {
    let lib = r#"module lib

pub
one = 1

hidden = 2
"#;
    let app = r#"module app

import lib (hidden)
import lib (missing)
import nowhere (thing)

x = 1
"#;
    let (_, errors) = compile_sources(vec![("lib.myn", lib), ("app.myn", app)]);

    assert!(errors
        .iter()
        .any(|e| e.message == "Cannot import private declaration hidden in module lib."));
    assert!(errors
        .iter()
        .any(|e| e.message == "Cannot find declaration missing in module lib."));
    assert!(errors
        .iter()
        .any(|e| e.message == "Could not find module nowhere."));
}

#[test]
fn private_constructors_are_never_importable() {
    let lib = r#"module lib

pub
type Color = Red | Green
"#;
    let app = r#"module app

import lib (Color(..))

x = 1
"#;
    let (_, errors) = compile_sources(vec![("lib.myn", lib), ("app.myn", app)]);
    assert!(
        errors
            .iter()
            .any(|e| e.message == "Cannot import private constructor Red in module lib."),
        "{errors:#?}"
    );
}

#[test]
fn module_cycles_are_reported_on_every_participant() {
    let a = r#"module a

import b

x = 1
"#;
    let b = r#"module b

import a

y = 2
"#;
    let (_, errors) = compile_sources(vec![("a.myn", a), ("b.myn", b)]);
    let cycle_errors: Vec<&Diagnostic> = errors
        .iter()
        .filter(|e| e.message.contains("Found cycle between modules"))
        .collect();
    assert_eq!(cycle_errors.len(), 2, "{errors:#?}");
}

#[test]
fn duplicate_modules_are_reported() {
    let (_, errors) = compile_sources(vec![
        ("one.myn", "module test\n\nx = 1\n"),
        ("two.myn", "module test\n\ny = 2\n"),
    ]);
    assert!(
        errors
            .iter()
            .any(|e| e.message.contains("Found duplicate module")),
        "{errors:#?}"
    );
}

#[test]
fn multi_label_record_update() {
    let env = compile_code(
        r#"module test

deep = { .a.b = 1 | { a: { b: 0 } } }
"#,
    );

    let shown = decl_type(&env, "deep");
    assert!(shown.contains("a :"), "{shown}");
    assert!(shown.contains("b : Int"), "{shown}");
}

#[test]
fn public_values_flow_through_module_environments() {
    let lib = r#"module lib

pub
compose f g x = f (g x)
"#;
    let app = r#"module app

import lib (compose)

use2 = compose
"#;
    let (modules, errors) = compile_sources(vec![("lib.myn", lib), ("app.myn", app)]);
    assert!(!errors.iter().any(|e| e.is_error()), "{errors:#?}");
    let app_env = modules.get("app").expect("app");
    let shown = simple_name(app_env, "use2");
    assert_eq!(shown, "(t1 -> t2) -> (t3 -> t1) -> t3 -> t2");
}
