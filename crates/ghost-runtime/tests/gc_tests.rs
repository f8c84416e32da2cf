//! Garbage collection behavior observed through script execution
//!
//! Direct mark/trace/sweep mechanics are covered by unit tests next to the
//! heap; these tests drive whole programs across the collection threshold
//! and assert the VM stays correct and bounded.

mod common;

use common::run_ok;
use ghost_runtime::Vm;

/// Doubling concatenation churns through well over the initial 1 MiB
/// collection threshold; intermediates become garbage immediately.
const CHURN: &str = "var s = \"ab\";\n\
                     for (var i = 0; i < 20; i = i + 1) { s = s + s; }\n\
                     print s == s;";

#[test]
fn test_collection_during_execution_preserves_semantics() {
    assert_eq!(run_ok(CHURN), "true\n");
}

#[test]
fn test_live_bytes_stay_bounded_after_churn() {
    let mut vm = Vm::new();
    vm.interpret(CHURN).expect("churn script runs");
    // Cumulative allocation exceeds 4 MiB; the live residue is the final
    // ~2 MiB string plus at most one uncollected predecessor, so anything
    // near the cumulative figure means sweeping never freed intermediates.
    assert!(
        vm.heap().bytes_allocated() < 4 * 1024 * 1024,
        "heap kept {} bytes of garbage",
        vm.heap().bytes_allocated()
    );
}

#[test]
fn test_object_count_bounded_across_interpret_calls() {
    let mut vm = Vm::new();
    for _ in 0..5 {
        vm.interpret(CHURN).expect("churn script runs");
    }
    // Dead script functions, closures, and strings from earlier calls must
    // not accumulate without bound.
    assert!(
        vm.heap().bytes_allocated() < 4 * 1024 * 1024,
        "heap grew without bound: {} bytes",
        vm.heap().bytes_allocated()
    );
}

#[test]
fn test_cyclic_instances_do_not_break_collection() {
    // Tracing handles cycles; a later churn forces a collection with the
    // cycle both live and, on the second run, garbage.
    let mut vm = Vm::new();
    vm.interpret(
        "class Node {}\n\
         var a = Node(); var b = Node();\n\
         a.next = b; b.next = a;",
    )
    .expect("cycle setup runs");
    vm.interpret(CHURN).expect("churn with live cycle runs");
    vm.interpret("a = null; b = null;").expect("drop cycle");
    vm.interpret(CHURN).expect("churn with dead cycle runs");
}

#[test]
fn test_closed_upvalues_survive_collection() {
    assert_eq!(
        run_ok(
            "function make() { var n = 0; function inc() { n = n + 1; return n; } return inc; }\n\
             var counter = make();\n\
             counter();\n\
             var s = \"ab\";\n\
             for (var i = 0; i < 20; i = i + 1) { s = s + s; }\n\
             print counter();"
        ),
        "2\n"
    );
}

#[cfg(feature = "gc-stress")]
mod stress {
    //! With `gc-stress` every allocation collects, so any missing root is
    //! fatal somewhere in these programs.

    use super::common::run_ok;

    #[test]
    fn test_stress_closures() {
        assert_eq!(
            run_ok(
                "function make() { var i = 0; function incr() { i = i + 1; return i; } return incr; }\n\
                 var c = make(); print c(); print c();"
            ),
            "1\n2\n"
        );
    }

    #[test]
    fn test_stress_classes() {
        assert_eq!(
            run_ok(
                "class Point { init(x, y) { this.x = x; this.y = y; } sum() { return this.x + this.y; } }\n\
                 print Point(3, 4).sum();"
            ),
            "7\n"
        );
    }

    #[test]
    fn test_stress_concatenation_and_lists() {
        assert_eq!(
            run_ok("var l = [\"a\" + \"b\", \"c\" + \"d\"]; print l[0] + l[1];"),
            "abcd\n"
        );
    }
}
