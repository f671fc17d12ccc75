#![allow(dead_code)]

use std::collections::BTreeSet;

use aspunit::ast::{Head, Statement, Term};
use aspunit::solver::Model;
use aspunit::{
    FunctionTable, Pipeline, ReferenceSolver, Report, RunOptions, Runner, Symbol, TestError,
    TesterOptions, parse_program,
};

pub const FILE: &str = "t.lp";

/// Parses a single ground atom written in program syntax, e.g. `assert("A")`.
pub fn sym(text: &str) -> Symbol {
    let program = parse_program(&format!("{text}.")).expect("atom should parse");
    match &program.statements[0] {
        Statement::Rule(rule) => match &rule.head {
            Head::Atom(term) => term_to_symbol(term),
            other => panic!("not a single atom: {other:?}"),
        },
        other => panic!("not a rule: {other:?}"),
    }
}

fn term_to_symbol(term: &Term) -> Symbol {
    match term {
        Term::Number(n) => Symbol::Number(*n),
        Term::String(s) => Symbol::String(s.clone()),
        Term::Function { name, args } => {
            Symbol::function(name.clone(), args.iter().map(term_to_symbol).collect())
        }
        other => panic!("not ground: {other:?}"),
    }
}

pub struct FakeModel {
    pub number: u64,
    pub atoms: BTreeSet<Symbol>,
}

impl FakeModel {
    pub fn new(number: u64, atoms: &[&str]) -> Self {
        Self {
            number,
            atoms: atoms.iter().map(|a| sym(a)).collect(),
        }
    }
}

impl Model for FakeModel {
    fn number(&self) -> u64 {
        self.number
    }

    fn contains(&self, symbol: &Symbol) -> bool {
        self.atoms.contains(symbol)
    }

    fn atoms(&self) -> Vec<Symbol> {
        self.atoms.iter().cloned().collect()
    }

    fn shown(&self) -> Vec<Symbol> {
        self.atoms()
    }
}

pub fn options() -> RunOptions {
    RunOptions {
        tester: TesterOptions {
            terminal_width: Some(80),
            ..TesterOptions::default()
        },
        ..RunOptions::default()
    }
}

pub fn runner_with(options: RunOptions, functions: FunctionTable) -> Runner {
    Runner::new(Pipeline::new(ReferenceSolver::new()))
        .with_options(options)
        .with_functions(functions)
}

pub fn run(src: &str) -> Result<Vec<Report>, TestError> {
    run_with(src, options())
}

pub fn run_with(src: &str, options: RunOptions) -> Result<Vec<Report>, TestError> {
    let mut sink = |_: &Report| {};
    runner_with(options, FunctionTable::new()).run_source(src, FILE, &mut sink)
}

pub fn summary(reports: &[Report]) -> Vec<(String, usize, u64)> {
    reports
        .iter()
        .map(|r| (r.unit.clone(), r.assertion_count, r.model_count))
        .collect()
}
