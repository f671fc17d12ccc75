mod support;

use std::cell::RefCell;
use std::rc::Rc;

use aspunit::solver::{GroundHandler, SolveSummary};
use aspunit::{
    Control, ErrorKind, FunctionTable, Middleware, Model, Next, Part, Pipeline, Program,
    ReferenceSolver, Report, RunOptions, Runner, StageTrace, Symbol, TestError,
};
use regex::Regex;
use support::{FILE, options, run, run_with, runner_with, summary};

fn row(unit: &str, asserts: usize, models: u64) -> (String, usize, u64) {
    (unit.to_string(), asserts, models)
}

#[test]
fn passing_unit_reports_asserts_and_models() {
    let src = r#"
        fact.
        #program test_fact(base).
        assert(@all("facts")) :- fact.
        assert(@models(1)).
    "#;
    let reports = run(src).expect("run should pass");
    assert_eq!(
        summary(&reports),
        vec![row("base", 0, 1), row("test_fact", 2, 1)]
    );
    assert_eq!(
        reports[1].assertions,
        vec!["assert(\"facts\")".to_string(), "assert(models(1))".to_string()]
    );
    assert_eq!(
        reports[1].summary_line(),
        "ASPUNIT: test_fact:  2 asserts,  1 model"
    );
}

#[test]
fn unit_without_assertions_reports_observed_models() {
    let reports = run("#program test_z. { a }.").expect("run should pass");
    assert_eq!(summary(&reports)[1], row("test_z", 0, 2));
    assert_eq!(
        reports[1].summary_line(),
        "ASPUNIT: test_z:  0 asserts,  2 models"
    );
}

#[test]
fn constraint_atom_rejects_the_model() {
    let err = run("#program test_b(base). cannot(base).").expect_err("should fail");
    assert_eq!(err.kind(), ErrorKind::Assertion);
    let text = err.to_string();
    assert!(text.contains("cannot(base)"));
    assert!(text.contains("Failures in t.lp, #program test_b():"));
    assert!(text.contains("while running 'test_b' from t.lp"));
}

#[test]
fn failure_names_the_line_of_the_failing_unit() {
    let src = "a.\n\n#program test_late.\nnone(a).\n";
    let err = run(src).expect_err("should fail");
    assert!(
        err.to_string()
            .ends_with("while running 'test_late' from t.lp:3")
    );
}

#[test]
fn declared_model_count_must_match() {
    let err = run("#program test_m. { a }. assert(@models(1)).").expect_err("should fail");
    assert!(matches!(
        err.root(),
        TestError::ModelCount { expected: 1, found: 2 }
    ));
}

#[test]
fn missing_exists_assertions_are_named() {
    let src = r#"
        #program test_e.
        { a }.
        assert(@any(yes)) :- a.
        #external z.
        assert(@any(gone)) :- z.
        assert(@models(2)).
    "#;
    let err = run(src).expect_err("should fail");
    let TestError::MissingAny { models, missing } = err.root() else {
        panic!("expected missing exists assertions, got {err:?}");
    };
    assert_eq!(*models, 2);
    assert_eq!(missing, &vec![support::sym("assert(gone)")]);
}

#[test]
fn unit_with_only_unmatched_exists_assertions_fails() {
    let src = r#"
        #program test_e.
        a.
        #external z.
        assert(@any(gone)) :- z.
    "#;
    let err = run(src).expect_err("should fail");
    let TestError::MissingAny { models, missing } = err.root() else {
        panic!("expected missing exists assertions, got {err:?}");
    };
    assert_eq!(*models, 1);
    assert_eq!(missing, &vec![support::sym("assert(gone)")]);
}

#[test]
fn same_body_twice_is_not_ambiguous() {
    let src = r#"
        #program test_same.
        { r }. :- r.
        q :- not r.
        assert(@all("A")) :- q.
        assert(@all("A")) :- q.
        assert(@models(1)).
    "#;
    let reports = run(src).expect("run should pass");
    assert_eq!(summary(&reports)[1], row("test_same", 2, 1));
}

#[test]
fn two_bodies_for_one_assertion_are_ambiguous() {
    let src = r#"
        #program test_one.
        { r }. :- r.
        q :- not r.
        s :- not r.
        assert(@all("A")) :- q.
        assert(@all("A")) :- s.
        assert(@models(1)).
    "#;
    let err = run(src).expect_err("should warn");
    assert!(err.is_warning());
    assert_eq!(err.code(), "E-WARNING");
    assert!(
        err.to_string()
            .starts_with("Duplicate: assert(\"A\") (disjunction found) in test_one.")
    );
}

#[test]
fn dependency_is_grounded_with_the_test_unit() {
    let src = r#"
        #program a.
        x.
        #program test_b(a).
        assert(@all(x)) :- x.
        assert(@models(1)).
    "#;
    let reports = run(src).expect("run should pass");
    assert_eq!(summary(&reports)[1], row("test_b", 2, 1));
}

#[test]
fn dependency_arguments_reach_the_dependency() {
    let src = r#"
        #program val(n).
        v(n).
        #program test_v(val(3)).
        assert(@all(ok)) :- v(3).
        assert(@models(1)).
    "#;
    let reports = run(src).expect("run should pass");
    assert_eq!(summary(&reports)[1], row("test_v", 2, 1));
}

#[test]
fn own_parameters_are_bound_to_their_names() {
    let src = r#"
        #program test_p(base).
        seen(base).
        assert(@all(seen)) :- seen(base).
        assert(@models(1)).
    "#;
    let reports = run(src).expect("run should pass");
    assert_eq!(summary(&reports)[1], row("test_p", 2, 1));
}

#[test]
fn argument_mismatch_stops_the_run() {
    let err = run("#program a(x). #program test_b(a).").expect_err("should fail");
    assert_eq!(err.code(), "E-DEPENDENCY");
    assert_eq!(
        err.root().to_string(),
        "Argument mismatch in 'test_b' for dependency 'a'. Required: ['x'], given: []."
    );
    assert!(err.to_string().contains("while running 'test_b' from t.lp"));
}

#[test]
fn ensure_facts_are_checked_in_the_root_unit() {
    let src = r#"a(2). models(1). assert("a") :- a(2). ensure(assert("a"))."#;
    let reports = run(src).expect("run should pass");
    assert_eq!(summary(&reports), vec![row("base", 1, 1)]);

    let src = r#"a(42). models(1). assert("a") :- a(2). ensure(assert("a"))."#;
    let err = run(src).expect_err("should fail");
    assert!(err.to_string().contains("assert(\"a\")"));
}

#[test]
fn root_unit_can_be_skipped() {
    let reports = run_with(
        "#program test_z. a.",
        RunOptions {
            run_base: false,
            ..options()
        },
    )
    .expect("run should pass");
    assert_eq!(summary(&reports), vec![row("test_z", 0, 1)]);
}

#[test]
fn test_pattern_selects_units() {
    let reports = run_with(
        "#program check_a. a. #program test_b. b.",
        RunOptions {
            run_base: false,
            test_pattern: Regex::new("^check_").expect("pattern"),
            ..options()
        },
    )
    .expect("run should pass");
    assert_eq!(summary(&reports), vec![row("check_a", 0, 1)]);
}

#[test]
fn sink_receives_reports_until_the_first_failure() {
    let src = "#program test_a. a. #program test_b. none(1). #program test_c. c.";
    let mut seen: Vec<String> = Vec::new();
    let mut sink = |report: &Report| seen.push(report.unit.clone());
    let mut runner = runner_with(options(), FunctionTable::new());
    let err = runner
        .run_source(src, FILE, &mut sink)
        .expect_err("test_b should fail");
    assert!(err.to_string().contains("while running 'test_b'"));
    assert_eq!(seen, vec!["base".to_string(), "test_a".to_string()]);
}

#[test]
fn parse_errors_are_reported_before_running() {
    let err = run("#program test_a. a :- .b").expect_err("should fail");
    assert_eq!(err.code(), "E-PARSE");
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn registered_functions_are_callable() {
    let mut functions = FunctionTable::new();
    functions
        .register("twice", |args| match args {
            [Symbol::Number(n)] => Ok(Symbol::Number(n * 2)),
            _ => Err("expected a number".to_string()),
        })
        .expect("register");
    let src = r#"
        #program test_f.
        v(@twice(21)).
        assert(@all(ok)) :- v(42).
        assert(@models(1)).
    "#;
    let mut sink = |_: &Report| {};
    let reports = runner_with(options(), functions)
        .run_source(src, FILE, &mut sink)
        .expect("run should pass");
    assert_eq!(summary(&reports)[1], row("test_f", 2, 1));
}

#[test]
fn unregistered_functions_fail_grounding() {
    let err = run("#program test_f. v(@twice(21)).").expect_err("should fail");
    assert_eq!(err.code(), "E-GROUND");
    assert!(err.to_string().contains("unknown function @twice"));
}

struct Recording {
    name: &'static str,
    log: Rc<RefCell<Vec<String>>>,
}

impl Recording {
    fn push(&self, stage: &str) {
        self.log.borrow_mut().push(format!("{}:{stage}", self.name));
    }
}

impl Middleware for Recording {
    fn name(&self) -> &str {
        self.name
    }

    fn load(&mut self, program: &Program, next: Next<'_>) -> Result<Box<dyn Control>, TestError> {
        self.push("load");
        next.load(program)
    }

    fn ground(
        &mut self,
        control: &mut dyn Control,
        parts: &[Part],
        handler: &mut dyn GroundHandler,
        next: Next<'_>,
    ) -> Result<(), TestError> {
        self.push("ground");
        next.ground(control, parts, handler)
    }

    fn solve(
        &mut self,
        control: &mut dyn Control,
        on_model: &mut dyn FnMut(&dyn Model) -> bool,
        next: Next<'_>,
    ) -> Result<SolveSummary, TestError> {
        self.push("solve");
        next.solve(control, on_model)
    }
}

/// Hands only the first model to the tester.
struct FirstModelOnly;

impl Middleware for FirstModelOnly {
    fn name(&self) -> &str {
        "first-model-only"
    }

    fn solve(
        &mut self,
        control: &mut dyn Control,
        on_model: &mut dyn FnMut(&dyn Model) -> bool,
        next: Next<'_>,
    ) -> Result<SolveSummary, TestError> {
        next.solve(control, &mut |model: &dyn Model| {
            on_model(model);
            false
        })
    }
}

#[test]
fn middlewares_run_in_insertion_order_for_every_stage() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let pipeline = Pipeline::new(ReferenceSolver::new())
        .with(Recording {
            name: "outer",
            log: Rc::clone(&log),
        })
        .and_then(|p| {
            p.with(Recording {
                name: "inner",
                log: Rc::clone(&log),
            })
        })
        .expect("pipeline");
    assert_eq!(pipeline.names(), vec!["outer", "inner"]);

    let mut sink = |_: &Report| {};
    let mut runner = Runner::new(pipeline).with_options(RunOptions {
        run_base: false,
        ..options()
    });
    runner
        .run_source("#program test_a. a.", FILE, &mut sink)
        .expect("run should pass");
    assert_eq!(
        *log.borrow(),
        vec![
            "outer:load",
            "inner:load",
            "outer:ground",
            "inner:ground",
            "outer:solve",
            "inner:solve",
        ]
    );
}

#[test]
fn middleware_can_interpose_on_models() {
    let pipeline = Pipeline::new(ReferenceSolver::new())
        .with(FirstModelOnly)
        .expect("pipeline");
    let mut sink = |_: &Report| {};
    let reports = Runner::new(pipeline)
        .with_options(options())
        .run_source("#program test_z. { a ; b }.", FILE, &mut sink)
        .expect("run should pass");
    assert_eq!(summary(&reports)[1], row("test_z", 0, 1));
}

#[test]
fn stage_trace_passes_results_through() {
    let pipeline = Pipeline::new(ReferenceSolver::new())
        .with(StageTrace::new())
        .expect("pipeline");
    let mut sink = |_: &Report| {};
    let reports = Runner::new(pipeline)
        .with_options(options())
        .run_source("#program test_z. { a }.", FILE, &mut sink)
        .expect("run should pass");
    assert_eq!(summary(&reports)[1], row("test_z", 0, 2));
}

#[test]
fn duplicate_middleware_names_are_rejected() {
    let err = Pipeline::new(ReferenceSolver::new())
        .with(StageTrace::new())
        .and_then(|p| p.with(StageTrace::new()))
        .err()
        .expect("duplicate middleware");
    assert_eq!(err.code(), "E-CONFIG");
    assert!(err.to_string().contains("stage-trace"));
}
