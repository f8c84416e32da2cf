//! Class semantics: init, methods, this, inheritance, super, bound methods

mod common;

use common::{run_err, run_ok};
use pretty_assertions::assert_eq;

#[test]
fn test_init_and_method() {
    assert_eq!(
        run_ok(
            "class Point { init(x, y) { this.x = x; this.y = y; } sum() { return this.x + this.y; } }\n\
             print Point(3, 4).sum();"
        ),
        "7\n"
    );
}

#[test]
fn test_class_display() {
    assert_eq!(run_ok("class Thing {} print Thing;"), "<class Thing>\n");
    assert_eq!(run_ok("class Thing {} print Thing();"), "Thing instance\n");
}

#[test]
fn test_fields_are_per_instance() {
    assert_eq!(
        run_ok(
            "class Box {}\n\
             var a = Box(); var b = Box();\n\
             a.value = 1; b.value = 2;\n\
             print a.value; print b.value;"
        ),
        "1\n2\n"
    );
}

#[test]
fn test_field_assignment_is_an_expression() {
    assert_eq!(
        run_ok("class Box {} var box = Box(); print box.value = 42;"),
        "42\n"
    );
}

#[test]
fn test_methods_bind_this() {
    assert_eq!(
        run_ok(
            "class Greeter {\n\
               init(name) { this.name = name; }\n\
               greet() { print \"hello \" + this.name; }\n\
             }\n\
             var method = Greeter(\"ghost\").greet;\n\
             method();"
        ),
        "hello ghost\n"
    );
}

#[test]
fn test_bound_method_display() {
    assert_eq!(
        run_ok("class A { m() {} } print A().m;"),
        "<fn m>\n"
    );
}

#[test]
fn test_inheritance_and_super() {
    assert_eq!(
        run_ok(
            "class A { greet() { print \"A\"; } }\n\
             class B < A { greet() { super.greet(); print \"B\"; } }\n\
             B().greet();"
        ),
        "A\nB\n"
    );
}

#[test]
fn test_inherited_method_without_override() {
    assert_eq!(
        run_ok(
            "class A { hello() { print \"from A\"; } }\n\
             class B < A {}\n\
             B().hello();"
        ),
        "from A\n"
    );
}

#[test]
fn test_super_resolves_statically() {
    // `super` binds to the defining class's superclass, not the runtime
    // class of `this`.
    assert_eq!(
        run_ok(
            "class A { name() { return \"A\"; } }\n\
             class B < A { name() { return \"B\"; } test() { return super.name(); } }\n\
             class C < B {}\n\
             print C().test();"
        ),
        "A\n"
    );
}

#[test]
fn test_super_as_bound_value() {
    assert_eq!(
        run_ok(
            "class A { m() { print \"A.m\"; } }\n\
             class B < A { m() { var f = super.m; f(); } }\n\
             B().m();"
        ),
        "A.m\n"
    );
}

#[test]
fn test_init_returns_this_implicitly() {
    assert_eq!(
        run_ok(
            "class Chained { init() { this.ready = true; } }\n\
             print Chained().ready;"
        ),
        "true\n"
    );
}

#[test]
fn test_explicit_bare_return_in_init() {
    assert_eq!(
        run_ok(
            "class Early { init(flag) { if (flag) { return; } this.late = true; } }\n\
             print Early(true) == null;"
        ),
        "false\n"
    );
}

#[test]
fn test_field_shadows_method_on_invoke() {
    assert_eq!(
        run_ok(
            "class Widget { action() { print \"method\"; } }\n\
             var w = Widget();\n\
             function replacement() { print \"field\"; }\n\
             w.action = replacement;\n\
             w.action();"
        ),
        "field\n"
    );
}

#[test]
fn test_methods_can_recurse_through_this() {
    assert_eq!(
        run_ok(
            "class Counter {\n\
               init() { this.n = 0; }\n\
               bump(times) {\n\
                 if (times == 0) { return this.n; }\n\
                 this.n = this.n + 1;\n\
                 return this.bump(times - 1);\n\
               }\n\
             }\n\
             print Counter().bump(4);"
        ),
        "4\n"
    );
}

// ── Errors ──────────────────────────────────────────────────────────────────

#[test]
fn test_class_init_arity() {
    let error = run_err("class P { init(x) {} } P();");
    assert_eq!(error.message, "Expected 1 arguments but got 0.");
}

#[test]
fn test_argument_to_initless_class() {
    let error = run_err("class P {} P(1);");
    assert_eq!(error.message, "Expected 0 arguments but got 1.");
}

#[test]
fn test_undefined_property() {
    let error = run_err("class P {} print P().missing;");
    assert_eq!(error.message, "Undefined property 'missing'.");
}

#[test]
fn test_undefined_method_invoke() {
    let error = run_err("class P {} P().missing();");
    assert_eq!(error.message, "Undefined property 'missing'.");
}

#[test]
fn test_property_on_non_instance() {
    let error = run_err("print (4).x;");
    assert_eq!(error.message, "Only instances have properties.");
}

#[test]
fn test_field_set_on_non_instance() {
    let error = run_err("var n = 4; n.x = 1;");
    assert_eq!(error.message, "Only instances have fields.");
}

#[test]
fn test_method_on_non_instance() {
    let error = run_err("\"text\".method();");
    assert_eq!(error.message, "Only instances have methods.");
}

#[test]
fn test_superclass_must_be_a_class() {
    let error = run_err("var NotAClass = 3; class Sub < NotAClass {}");
    assert_eq!(error.message, "Superclass must be a class.");
}
