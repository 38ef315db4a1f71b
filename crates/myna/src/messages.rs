//! The catalogue of user-visible compiler messages.
//!
//! Messages are part of the compiler's stable surface: tooling and the test
//! suite match on them literally, so edits here are breaking changes.

pub const MISMATCHED_INDENTATION: &str = "Mismatched indentation.";

pub const MODULE_NAME: &str = "Module names should be composed of identifiers started with a lower case character and separated by dots.
They also cannot contain special characters like '?' or '!'.";

pub const MODULE_DEFINITION: &str = "Expected file to begin with a module declaration.
Example:

module some.package";

pub const IMPORT_REFER: &str =
    "Expected exposing definitions to be a comma-separated list of upper or lower case identifiers.";

pub const DECLARATION_REF_ALL: &str = "To import or export all constructor of a type use a (..) syntax.

ex: import package (fun1, SomeType(..), fun2)";

pub const CTOR_NAME: &str = "Expected constructor name (upper case identifier).";

pub const IMPORT_ALIAS: &str = "Expected module import alias to be capitalized:
Example: import data.package as Mod";

pub const IMPORTED_DOT: &str = "Expected identifier after imported variable reference.";

pub const TYPE_VAR: &str = "Expected type variable (lower case identifier).";

pub const TYPE_DEF: &str = "Expected a type definition.";

pub const TYPE_COLON: &str = "Expected `:` before type definition.";

pub const TYPEALIAS_DOT: &str = "Expected type identifier after dot.";

pub const TYPE_TEST_TYPE: &str = "Expected type in type test.";

pub const RECORD_LABEL: &str = "A label of a record can only be a lower case identifier or a String.";

pub const RECORD_COLON: &str = "Expected `:` after record label.";

pub const RECORD_EQUALS: &str = "Expected `=` or `->` after record labels in set/update expression.";

pub const INSTANCE_TYPE: &str = "Instance types need to be enclosed in double brackets: {{ type }}.";

pub const INSTANCE_VAR: &str = "Instance variables need to be enclosed in double brackets: {{var}}.";

pub const INSTANCE_ERROR: &str = "Type and type alias declarations cannot be instances, only values.";

pub const VARIABLE: &str = "Expected variable name.";

pub const OPERATOR: &str = "Expected operator.";

pub const LAMBDA_BACKSLASH: &str = "Expected lambda definition to start with backslash: `\\`.";

pub const LAMBDA_ARROW: &str = "Expected `->` after lambda parameter definition.";

pub const LAMBDA_VAR: &str = "Expected identifier after start of lambda definition:
Example: \\x -> x + 3";

pub const TOPLEVEL_IDENT: &str = "Expected variable definition or variable type at the top level.";

pub const PATTERN: &str = "Expected a pattern expression.
|Patterns can be one of:
|
|Wildcard pattern: _
|Literal pattern: 3, 'a', \"a string\", false, etc
|Variable pattern: x, y, myVar, etc
|Constructor pattern: Some \"ok\", Result res, None, etc
|Record pattern: { x, y: 3 }
|List pattern: [], [x, y, _], [x :: xs]
|Named pattern: 10 as number
|Type test: :? Int as i";

pub const DO_WHILE: &str = "Expected keyword `do` after while condition.";

pub const EXP_SIMPLE: &str = "Invalid expression for while condition.";

pub const THEN: &str = "Expected `then` after if condition.";

pub const ELSE: &str = "Expected `else` after then condition.";

pub const LET_DECL: &str = "Expected variable name after `let`.";

pub const LET_EQUALS: &str = "Expected `=` after let name declaration.";

pub const LET_IN: &str = "Expected `in` after let definition.";

pub const FOR_IN: &str = "Expected `in` after for pattern.";

pub const FOR_DO: &str = "Expected `do` after for definition.";

pub const CASE_ARROW: &str = "Expected `->` after case pattern.";

pub const CASE_OF: &str = "Expected `of` after a case expression.";

pub const ALIAS_DOT: &str = "Expected dot (.) after aliased variable.";

pub const MALFORMED_EXPR: &str = "Malformed expression.";

pub const APPLIED_DO_LET: &str = "Cannot apply let statement as a function.";

pub const PUB_PLUS: &str =
    "Visibility of value or typealias declaration can only be public (pub) not pub+.";

pub const TYPEALIAS_NAME: &str = "Expected name for typealias.";

pub const TYPEALIAS_EQUALS: &str = "Expected `=` after typealias declaration.";

pub const TYPEALIAS_RECURSIVE: &str = "Typealiases cannot be recursive.";

pub const DATA_NAME: &str = "Expected new data type name to be a upper case identifier.";

pub const DATA_EQUALS: &str = "Expected equals `=` after data name declaration.";

pub const INVALID_OPERATOR_DECL: &str = "Operator declarations have to be defined between parentheses.";

pub const IMPLICIT_PATTERN: &str =
    "Implicit patterns can only be used in function parameters before any destructuring happens.";

pub const ANNOTATION_PATTERN: &str = "Type annotation patterns can only be used in function variables";

pub const NOT_A_FIELD: &str =
    "Operator `<-` expects a foreign field as first parameter and cannot be partially applied.";

pub const LET_DO_LAST: &str = "Do expression cannot end with a let statement.";

pub const ANONYMOUS_FUNCTION_ARGUMENT: &str = "Invalid context for anonymous function argument.

Valid ones are:
Operator sections: (_ + 1)
Record access: _.name
Record values: { name: _ }, { age: 10 | _ }
Record restrictions: { - name | _ }
Record merges: { + _, rec }
Index access: _.[1], list.[_]
Option unwrap: _!!
Ifs: if _ then 1 else 0, if check then _ else _
Cases: case _ of ...
Foreign fields: (_ : MyClass)#-field
Foreign methods: (_ : String)#endsWith(\".\"), Math#exp(_)";

pub const RETURN_EXPR: &str = "return keyword can only be used inside a computation expression.";

pub const YIELD_EXPR: &str = "yield keyword can only be used inside a computation expression.";

pub const FOR_EXPR: &str = "for expression can only be used inside a computation expression.";

pub const LET_BANG: &str = "`let!` syntax can only be used inside a computation expression.";

pub const DO_BANG: &str = "`do!` syntax can only be used inside a computation expression.";

pub const RECURSIVE_ROWS: &str = "Recursive row types";

pub const RECURSIVE_LET: &str = "Let variables cannot be recursive.";

pub const NOT_A_FUNCTION: &str = "Expected expression to be a function.
If you are trying to pass an instance argument to a function explicitily
make sure to use the {{}} syntax.";

pub const RECORD_MERGE: &str = "Cannot merge records with unknown labels.";

pub const FOREIGN_UNSUPPORTED: &str = "Foreign functions are not supported yet.";

pub fn cannot_find_in_module(name: &str, module: &str) -> String {
    format!("Cannot find {name} in module {module}.")
}

pub fn cannot_import_in_module(name: &str, module: &str) -> String {
    format!("Cannot import private {name} in module {module}.")
}

pub fn undefined_var(name: &str) -> String {
    format!("Undefined variable {name}.")
}

pub fn undefined_type(typ: &str) -> String {
    format!(
        "Undefined type {typ}

\tMake sure the type is imported: import some.module (MyType)"
    )
}

pub fn wrong_kind(expected: &str, got: &str) -> String {
    format!(
        "Could not match kind

\t{expected}
\t
with kind

\t{got}"
    )
}

pub fn not_a_row(typ: &str) -> String {
    format!(
        "Type

\t{typ}

is a not a row type."
    )
}

pub fn record_missing_labels(labels: &str) -> String {
    format!(
        "Record is missing labels:

\t  {labels}"
    )
}

pub fn types_dont_match(a: &str, b: &str, reason: &str) -> String {
    let head = format!(
        "Cannot match type

\t  {a}

with type

\t  {b}"
    );
    if reason.is_empty() {
        head
    } else {
        format!("{head}\n\n{reason}")
    }
}

pub fn escaped_type(typ: &str) -> String {
    format!(
        "Private type {typ} escaped its module.

A public function cannot have a private type."
    )
}

pub fn incompatible_types(t1: &str, t2: &str) -> String {
    format!("Incompatible types {t1} and {t2}.")
}

pub fn infinite_type(name: &str) -> String {
    format!("Occurs check failed: infinite type {name}.")
}

pub fn duplicate_module(name: &str) -> String {
    format!(
        "Found duplicate module

\t  {name}"
    )
}

pub fn cycle_found(nodes: &[String]) -> String {
    let listed = nodes
        .iter()
        .map(|node| format!("    {node}"))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("Found cycle between modules\n\n{listed}")
}

pub fn module_not_found(name: &str) -> String {
    format!("Could not find module {name}.")
}

pub fn expected_definition(name: &str) -> String {
    format!("Expected definition to follow its type declaration for {name}.")
}

pub fn expected_let_definition(name: &str) -> String {
    format!("Expected definition to follow its type declaration for {name} in let clause.")
}

pub fn empty_import(ctx: &str) -> String {
    format!("{ctx} list cannot be empty.")
}

pub fn wrong_arity_to_case(expected: usize, got: usize) -> String {
    format!("Case expression expected {expected} patterns but got {got}.")
}

pub fn wrong_arity_ctor_pattern(name: &str, got: usize, expected: usize) -> String {
    format!("Constructor pattern {name} expected {expected} parameter(s) but got {got}.")
}

pub fn shadowed_variable(name: &str) -> String {
    format!("Value {name} is shadowing another value with the same name.")
}

pub fn no_alias_found(alias: &str) -> String {
    format!("Could not find import alias {alias}.")
}

pub fn wrong_constructor_name(type_name: &str) -> String {
    format!("Multi constructor type cannot have the same name as their type: {type_name}.")
}

pub fn duplicated_decl(name: &str) -> String {
    format!("Declaration {name} is already defined or imported.")
}

pub fn duplicated_type(name: &str) -> String {
    format!("Type {name} is already defined or imported.")
}

pub fn unused_variable(var: &str) -> String {
    format!("Variable {var} is unused in declaration.")
}

pub fn unused_import(module: &str) -> String {
    format!("Unused import {module}.")
}

pub fn cycle_in_values(nodes: &[String]) -> String {
    format!("Found cycle between values {}.", nodes.join(", "))
}

pub fn cycle_in_functions(nodes: &[String]) -> String {
    format!("Mutually recursive functions {} need type annotations.", nodes.join(", "))
}

pub fn invalid_regex(err: &str) -> String {
    format!("Invalid regex pattern:\n\n{err}")
}

pub fn literal_expected(name: &str) -> String {
    format!("Expected {name} literal.")
}

pub fn lparens_expected(ctx: &str) -> String {
    format!("Expected `(` after {ctx}")
}

pub fn rparens_expected(ctx: &str) -> String {
    format!("Expected `)` after {ctx}")
}

pub fn rsbracket_expected(ctx: &str) -> String {
    format!("Expected `]` after {ctx}")
}

pub fn rbracket_expected(ctx: &str) -> String {
    format!("Expected `}}` after {ctx}")
}

pub fn pipe_expected(ctx: &str) -> String {
    format!("Expected `|` after {ctx}.")
}

pub fn comma_expected(ctx: &str) -> String {
    format!("Expected `,` after {ctx}.")
}

pub fn equals_expected(ctx: &str) -> String {
    format!("Expected `=` after {ctx}.")
}
