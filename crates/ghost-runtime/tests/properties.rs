//! Property-based laws over the whole pipeline

mod common;

use common::run_ok;
use ghost_runtime::value::format_number;
use proptest::prelude::*;

proptest! {
    /// Arithmetic follows IEEE-754 double semantics end to end.
    #[test]
    fn prop_addition_matches_f64(a in -100_000i64..100_000, b in -100_000i64..100_000) {
        let source = format!("print {} + {};", a, b);
        let expected = format_number(a as f64 + b as f64);
        prop_assert_eq!(run_ok(&source), format!("{}\n", expected));
    }

    #[test]
    fn prop_division_matches_f64(a in -1_000i64..1_000, b in 1i64..1_000) {
        let source = format!("print {} / {};", a, b);
        let expected = format_number(a as f64 / b as f64);
        prop_assert_eq!(run_ok(&source), format!("{}\n", expected));
    }

    /// `==` between a Number and a non-Number is false, never an error.
    #[test]
    fn prop_number_never_equals_other_kinds(n in -1_000i64..1_000) {
        prop_assert_eq!(run_ok(&format!("print {} == true;", n)), "false\n");
        prop_assert_eq!(run_ok(&format!("print {} == null;", n)), "false\n");
        prop_assert_eq!(run_ok(&format!("print {} == \"text\";", n)), "false\n");
    }

    /// Splitting a string anywhere and re-concatenating yields the interned
    /// original: equality is identity.
    #[test]
    fn prop_concatenation_reinterns(s in "[a-z]{1,12}", split in 0usize..12) {
        let split = split.min(s.len());
        let (head, tail) = s.split_at(split);
        let source = format!("print \"{}\" == \"{}\" + \"{}\";", s, head, tail);
        prop_assert_eq!(run_ok(&source), "true\n");
    }

    /// Comparison operators agree with Rust's f64 ordering.
    #[test]
    fn prop_comparisons_match_f64(a in -500i64..500, b in -500i64..500) {
        let (a, b) = (a as f64, b as f64);
        let source = format!("print {} < {}; print {} <= {}; print {} > {}; print {} >= {};",
            a, b, a, b, a, b, a, b);
        let expected = format!("{}\n{}\n{}\n{}\n", a < b, a <= b, a > b, a >= b);
        prop_assert_eq!(run_ok(&source), expected);
    }

    /// Lists read back what was stored, at every index.
    #[test]
    fn prop_list_store_load(values in proptest::collection::vec(-1_000i64..1_000, 1..8)) {
        let literal: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        let mut source = format!("var l = [{}];", literal.join(", "));
        for (i, v) in values.iter().enumerate() {
            source.push_str(&format!(" l[{}] = {};", i, v * 2));
        }
        for i in 0..values.len() {
            source.push_str(&format!(" print l[{}];", i));
        }
        let expected: String = values.iter().map(|v| format!("{}\n", v * 2)).collect();
        prop_assert_eq!(run_ok(&source), expected);
    }
}
