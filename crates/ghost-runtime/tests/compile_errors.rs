//! Compile-error reporting and panic-mode recovery

mod common;

use common::compile_err;
use ghost_runtime::DiagnosticLevel;
use pretty_assertions::assert_eq;

fn messages(source: &str) -> Vec<String> {
    compile_err(source)
        .into_iter()
        .map(|d| d.message)
        .collect()
}

#[test]
fn test_missing_semicolon() {
    let diagnostics = compile_err("print 1");
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].message, "Expect ';' after value.");
    assert_eq!(
        diagnostics[0].to_string(),
        "[line 1] Error at end: Expect ';' after value."
    );
}

#[test]
fn test_expect_expression() {
    assert_eq!(messages("print ;"), vec!["Expect expression."]);
}

#[test]
fn test_invalid_assignment_target() {
    assert_eq!(messages("1 = 2;"), vec!["Invalid assignment target."]);
    assert_eq!(
        messages("var a; var b; a + b = 1;"),
        vec!["Invalid assignment target."]
    );
}

#[test]
fn test_duplicate_local() {
    assert_eq!(
        messages("{ var a = 1; var a = 2; }"),
        vec!["Already a variable with this name in this scope."]
    );
}

#[test]
fn test_shadowing_in_inner_scope_is_allowed() {
    assert!(common::run("{ var a = 1; { var a = 2; print a; } }").is_ok());
}

#[test]
fn test_local_in_own_initializer() {
    assert_eq!(
        messages("{ var a = a; }"),
        vec!["Can't read local variable in its own initializer."]
    );
}

#[test]
fn test_return_outside_function() {
    assert_eq!(messages("return;"), vec!["Can't return from top-level code."]);
}

#[test]
fn test_return_value_from_initializer() {
    assert_eq!(
        messages("class P { init() { return 1; } }"),
        vec!["Can't return a value from an initializer."]
    );
}

#[test]
fn test_this_outside_class() {
    assert_eq!(
        messages("print this;"),
        vec!["Can't use 'this' outside of a class."]
    );
}

#[test]
fn test_super_outside_class() {
    assert_eq!(
        messages("print super.x;"),
        vec!["Can't use 'super' outside of a class."]
    );
}

#[test]
fn test_super_without_superclass() {
    assert_eq!(
        messages("class A { m() { super.m(); } }"),
        vec!["Can't use 'super' in a class with no superclass."]
    );
}

#[test]
fn test_self_inheritance() {
    assert_eq!(
        messages("class A < A {}"),
        vec!["A class can't inherit from itself."]
    );
}

#[test]
fn test_scan_error_reaches_diagnostics() {
    let diagnostics = compile_err("var a = @;");
    assert!(diagnostics
        .iter()
        .any(|d| d.message == "Unexpected character."));
}

#[test]
fn test_unterminated_string() {
    let diagnostics = compile_err("print \"oops");
    assert!(diagnostics
        .iter()
        .any(|d| d.message == "Unterminated string."));
}

#[test]
fn test_too_many_constants_in_one_chunk() {
    let mut source = String::new();
    for i in 0..300 {
        source.push_str(&format!("print {};\n", i));
    }
    let diagnostics = compile_err(&source);
    assert!(diagnostics
        .iter()
        .any(|d| d.message == "Too many constants in one chunk."));
}

#[test]
fn test_too_many_locals() {
    let mut source = String::from("{\n");
    for i in 0..300 {
        source.push_str(&format!("var v{} = 0;\n", i));
    }
    source.push('}');
    let diagnostics = compile_err(&source);
    assert!(diagnostics
        .iter()
        .any(|d| d.message == "Too many local variables in function."));
}

#[test]
fn test_panic_mode_recovers_at_statement_boundary() {
    // Both statements report their own error; the cascade in between is
    // suppressed.
    let diagnostics = compile_err("print ;\nprint ;");
    assert_eq!(diagnostics.len(), 2);
    assert_eq!(diagnostics[0].line, 1);
    assert_eq!(diagnostics[1].line, 2);
    assert!(diagnostics
        .iter()
        .all(|d| d.level == DiagnosticLevel::Error));
}

#[test]
fn test_error_lines_point_at_offending_token() {
    let diagnostics = compile_err("var ok = 1;\nvar bad = ;\n");
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].line, 2);
}
