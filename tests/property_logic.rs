mod support;

use std::collections::BTreeSet;

use aspunit::symbol_format::format_symbols_with_width;
use aspunit::{FunctionTable, Model, Part, ReferenceSolver, Solver, parse_program};
use proptest::prelude::*;

fn count_models(src: &str) -> u64 {
    let program = parse_program(src).expect("parse");
    let mut control = ReferenceSolver::new().load(&program).expect("load");
    control
        .ground(&[Part::new("base", Vec::new())], &mut FunctionTable::new())
        .expect("ground");
    control
        .solve(&mut |_: &dyn Model| true)
        .expect("solve")
        .models
}

proptest! {
    #[test]
    fn formatted_model_keeps_every_atom(
        atoms in prop::collection::btree_set("[a-z]{1,6}", 1..30),
        width in 1usize..160,
    ) {
        let text = format_symbols_with_width(atoms.iter(), width);
        let rendered: BTreeSet<&str> = text.split_whitespace().collect();
        let expected: BTreeSet<&str> = atoms.iter().map(String::as_str).collect();
        prop_assert_eq!(rendered, expected);

        let col_width = atoms.iter().map(|a| a.len()).max().unwrap_or(0) + 2;
        let cols = (width / col_width).max(1);
        prop_assert_eq!(text.lines().count(), atoms.len().div_ceil(cols));
        for line in text.lines() {
            prop_assert!(line.len() <= width.max(col_width));
        }
    }

    #[test]
    fn choice_over_n_atoms_has_two_to_the_n_models(n in 0usize..7) {
        let elements: Vec<String> = (1..=n).map(|i| format!("p({i})")).collect();
        let src = format!("{{ {} }}.", elements.join(" ; "));
        prop_assert_eq!(count_models(&src), 1u64 << n);
    }

    #[test]
    fn at_most_one_constraint_leaves_n_plus_one_models(n in 1i64..8) {
        let src = format!("{{ p(1..{n}) }}. :- {{ p(X) }} > 1.");
        prop_assert_eq!(count_models(&src), n as u64 + 1);
    }

    #[test]
    fn facts_asserted_for_all_always_pass(values in prop::collection::btree_set(0i64..1000, 1..15)) {
        let mut src = String::from("#program test_facts.\nassert(@models(1)).\n");
        for v in &values {
            src.push_str(&format!("v({v}).\nassert(@all({v})) :- v({v}).\n"));
        }
        let reports = support::run(&src).expect("run should pass");
        prop_assert_eq!(reports[1].assertion_count, values.len() + 1);
        prop_assert_eq!(reports[1].model_count, 1);
    }

    #[test]
    fn for_all_assertion_on_an_optional_atom_fails(n in 1usize..5) {
        let elements: Vec<String> = (1..=n).map(|i| format!("p({i})")).collect();
        let src = format!(
            "#program test_opt.\n{{ {} }}.\nassert(@all(seen)) :- p(1).\n",
            elements.join(" ; ")
        );
        let err = support::run(&src).expect_err("empty model lacks the assertion");
        prop_assert_eq!(err.code(), "E-ASSERT");
    }
}
