mod support;

use aspunit::solver::{Context, Observer};
use aspunit::tester::{CompoundContext, Phase};
use aspunit::{FunctionTable, Symbol, TestError, Tester, TesterOptions};
use support::{FakeModel, sym};

fn tester(unit: &str) -> Tester {
    Tester::new(
        unit,
        "t.lp",
        TesterOptions {
            terminal_width: Some(80),
            ..TesterOptions::default()
        },
    )
}

fn s(value: &str) -> Symbol {
    Symbol::string(value)
}

#[test]
fn all_returns_its_argument_and_records_the_assertion() {
    let mut t = tester("test_a");
    assert_eq!(t.all(&[s("A")]), Ok(s("A")));
    assert_eq!(
        t.all(&[Symbol::Number(4), Symbol::Number(2)]).map(|v| v.to_string()),
        Ok("(4,2)".to_string())
    );
    assert!(t.assertions().contains(&sym("assert(\"A\")")));
    assert_eq!(t.assertions().len(), 2);
    assert!(t.all(&[]).is_err());
}

#[test]
fn model_missing_a_for_all_assertion_fails() {
    let mut t = tester("test_a");
    t.all(&[s("A")]).expect("all");
    t.all(&[s("B")]).expect("all");
    assert!(t.on_model(&FakeModel::new(1, &["assert(\"A\")", "assert(\"B\")"])));
    assert!(!t.on_model(&FakeModel::new(2, &["assert(\"A\")"])));
    assert_eq!(t.phase(), Phase::Failed);

    let err = t.report().expect_err("should fail");
    let TestError::Assertion { failures, message, .. } = &err else {
        panic!("expected assertion failure, got {err:?}");
    };
    assert_eq!(failures, &vec![sym("assert(\"B\")")]);
    assert!(message.contains("Failures in t.lp, #program test_a():\nassert(\"B\")\n"));
    assert_eq!(err.code(), "E-ASSERT");
}

#[test]
fn phase_moves_from_collecting_to_solving() {
    let mut t = tester("test_p");
    assert_eq!(t.phase(), Phase::Collecting);
    assert!(t.on_model(&FakeModel::new(1, &["a"])));
    assert_eq!(t.phase(), Phase::Solving);
    assert!(!t.on_model(&FakeModel::new(2, &["none(a)"])));
    assert_eq!(t.phase(), Phase::Failed);
    assert!(!t.on_model(&FakeModel::new(3, &["a"])));
    assert_eq!(t.models_seen(), 2);
}

#[test]
fn only_the_first_failure_is_kept() {
    let mut t = tester("test_a");
    assert!(!t.on_model(&FakeModel::new(1, &["none(x)"])));
    assert!(!t.on_model(&FakeModel::new(2, &["cannot(y)"])));
    assert_eq!(t.models_seen(), 1);
    let err = t.report().expect_err("should fail");
    assert!(err.to_string().contains("none(x)"));
}

#[test]
fn failure_message_renders_the_model_in_columns() {
    let mut t = Tester::new(
        "test_w",
        "t.lp",
        TesterOptions {
            terminal_width: Some(20),
            ..TesterOptions::default()
        },
    );
    assert!(!t.on_model(&FakeModel::new(1, &["a", "b", "c", "none(1)"])));
    let err = t.report().expect_err("should fail");
    assert_eq!(
        err.to_string(),
        "MODEL:\na        b\nc        none(1)\nFailures in t.lp, #program test_w():\nnone(1)\n"
    );
}

#[test]
fn constraint_predicates_fail_at_arity_one_and_two() {
    for atom in ["none(1)", "none(1,2)", "cannot(x)", "cannot(x,y)"] {
        let mut t = tester("test_c");
        assert!(!t.on_model(&FakeModel::new(1, &[atom])), "{atom} should fail");
    }
    let mut t = tester("test_c");
    assert!(t.on_model(&FakeModel::new(1, &["none", "cannot(1,2,3)"])));
}

#[test]
fn constraint_predicates_are_configurable() {
    let mut t = Tester::new(
        "test_c",
        "t.lp",
        TesterOptions {
            constraint_predicates: vec!["forbidden".into()],
            terminal_width: Some(80),
        },
    );
    assert!(t.on_model(&FakeModel::new(1, &["none(1)"])));
    assert!(!t.on_model(&FakeModel::new(2, &["forbidden(1)"])));
}

#[test]
fn exists_assertion_must_hold_in_some_model() {
    let mut t = tester("test_e");
    t.any(&[Symbol::constant("yes")]).expect("any");
    t.any(&[Symbol::constant("gone")]).expect("any");
    t.models(&[Symbol::Number(2)]).expect("models");
    assert!(t.on_model(&FakeModel::new(1, &["assert(models(2))"])));
    assert!(t.on_model(&FakeModel::new(
        2,
        &["assert(models(2))", "assert(yes)"]
    )));
    assert_eq!(t.pending_any().count(), 1);

    let err = t.report().expect_err("should fail");
    assert_eq!(
        err.to_string(),
        "Asserts not in any of the 2 models:\nassert(gone)"
    );
}

#[test]
fn unmatched_exists_assertion_fails_without_other_assertions() {
    let mut t = tester("test_e");
    t.any(&[Symbol::constant("gone")]).expect("any");
    assert!(t.on_model(&FakeModel::new(1, &["a"])));
    assert!(t.assertions().is_empty());

    let err = t.report().expect_err("should fail");
    let TestError::MissingAny { models, missing } = &err else {
        panic!("expected missing exists assertions, got {err:?}");
    };
    assert_eq!(*models, 1);
    assert_eq!(missing, &vec![sym("assert(gone)")]);
}

#[test]
fn duplicate_exists_assertion_is_a_warning() {
    let mut t = tester("test_e");
    t.any(&[Symbol::constant("x")]).expect("any");
    t.any(&[Symbol::constant("x")]).expect("any");
    assert_eq!(
        t.warnings(),
        &["duplicate assert: assert(x) in test_e".to_string()]
    );
    assert_eq!(t.pending_any().count(), 1);
}

#[test]
fn models_call_sets_expectation_and_asserts_it() {
    let mut t = tester("test_m");
    assert_eq!(t.models(&[Symbol::Number(3)]), Ok(sym("models(3)")));
    assert_eq!(t.models_expected(), Some(3));
    assert!(t.assertions().contains(&sym("assert(models(3))")));
    assert!(t.models(&[Symbol::Number(-1)]).is_err());
    assert!(t.models(&[Symbol::constant("x")]).is_err());
    assert!(t.models(&[]).is_err());
}

#[test]
fn model_count_mismatch_fails() {
    let mut t = tester("test_m");
    t.models(&[Symbol::Number(2)]).expect("models");
    assert!(t.on_model(&FakeModel::new(1, &["assert(models(2))"])));
    let err = t.report().expect_err("should fail");
    assert_eq!(err.to_string(), "Expected 2 models, found 1.");
}

#[test]
fn models_fact_supplies_the_expected_count() {
    let mut t = tester("test_m");
    t.all(&[s("A")]).expect("all");
    assert!(t.on_model(&FakeModel::new(1, &["assert(\"A\")", "models(1)"])));
    assert_eq!(t.models_expected(), Some(1));
    let report = t.report().expect("should pass");
    assert_eq!(report.model_count, 1);
    assert_eq!(report.assertion_count, 1);
}

#[test]
fn undeclared_model_count_fails_for_test_units() {
    let mut t = tester("test_u");
    t.all(&[s("A")]).expect("all");
    assert!(t.on_model(&FakeModel::new(1, &["assert(\"A\")"])));
    let err = t.report().expect_err("should fail");
    assert!(matches!(err, TestError::ModelCountUndeclared { found: 1, .. }));
}

#[test]
fn unit_without_models_fails() {
    let mut t = tester("test_n");
    t.all(&[s("A")]).expect("all");
    let err = t.report().expect_err("should fail");
    assert_eq!(err.to_string(), "t.lp: test_n: no models found.");
}

#[test]
fn root_unit_skips_model_count_checks() {
    let mut t = tester("base");
    t.all(&[s("A")]).expect("all");
    let report = t.report().expect("root unit passes without models");
    assert_eq!(report.model_count, 0);
    assert_eq!(report.assertion_count, 1);
}

#[test]
fn unit_without_assertions_reports_zero() {
    let mut t = tester("test_empty");
    assert!(t.on_model(&FakeModel::new(1, &["a"])));
    let report = t.report().expect("should pass");
    assert_eq!(report.summary_line(), "ASPUNIT: test_empty:  0 asserts,  1 model");
}

#[test]
fn ensure_atoms_become_for_all_assertions() {
    let mut t = tester("base");
    assert!(t.on_model(&FakeModel::new(
        1,
        &["a(2)", "assert(\"a\")", "ensure(assert(\"a\"))", "models(1)"]
    )));
    let report = t.report().expect("should pass");
    assert_eq!(report.assertion_count, 1);

    let mut t = tester("base");
    assert!(!t.on_model(&FakeModel::new(
        1,
        &["a(42)", "ensure(assert(\"a\"))"]
    )));
    let err = t.report().expect_err("should fail");
    assert!(err.to_string().contains("assert(\"a\")"));
}

#[test]
fn assertion_derived_by_two_bodies_is_ambiguous() {
    let mut t = tester("test_one");
    t.all(&[s("A")]).expect("all");
    t.output_atom(&sym("assert(\"A\")"), 3);
    t.rule(false, &[3], &[1]);
    t.rule(false, &[3], &[2]);
    assert!(!t.on_model(&FakeModel::new(1, &["assert(\"A\")"])));
    let err = t.report().expect_err("should fail");
    assert!(err.is_warning());
    assert_eq!(
        err.to_string(),
        "Duplicate: assert(\"A\") (disjunction found) in test_one."
    );
}

#[test]
fn tester_context_rejects_foreign_functions() {
    let mut t = tester("test_a");
    assert_eq!(
        t.call("nope", &[]),
        Err("unknown function @nope".to_string())
    );
}

#[test]
fn compound_context_prefers_tester_functions() {
    let mut functions = FunctionTable::new();
    functions
        .register("all", |_| Ok(Symbol::constant("shadowed")))
        .expect("register");
    functions
        .register("twice", |args| match args {
            [Symbol::Number(n)] => Ok(Symbol::Number(n * 2)),
            _ => Err("expected a number".to_string()),
        })
        .expect("register");

    let mut t = tester("test_a");
    {
        let mut context = CompoundContext::new(&mut t, functions);
        assert_eq!(context.call("all", &[s("A")]), Ok(s("A")));
        assert_eq!(
            context.call("twice", &[Symbol::Number(21)]),
            Ok(Symbol::Number(42))
        );
        assert!(context.call("missing", &[]).is_err());
        context.output_atom(&sym("assert(\"A\")"), 1);
    }
    assert!(t.assertions().contains(&sym("assert(\"A\")")));
}

#[test]
fn function_table_rejects_double_registration() {
    let mut functions = FunctionTable::new();
    functions
        .register("f", |_| Ok(Symbol::Number(1)))
        .expect("register");
    let err = functions
        .register("f", |_| Ok(Symbol::Number(2)))
        .expect_err("duplicate");
    assert_eq!(err.code(), "E-CONFIG");
}
