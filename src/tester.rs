//! Per-unit assertion checking.
//!
//! A [`Tester`] is created for one test unit, receives the `@all`, `@any` and `@models`
//! calls of the program while it is grounded, observes the ground rules to find
//! assertions derived by more than one body, checks every model, and is finally
//! consumed by [`Tester::report`].

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::assertions::{AssertionIndex, create_assert};
use crate::ast::ROOT_UNIT;
use crate::error::TestError;
use crate::report::Report;
use crate::solver::{AtomId, Context, FunctionTable, Lit, Model, Observer};
use crate::symbol_format::{format_symbols_with_width, terminal_width};
use crate::types::Symbol;

pub const DEFAULT_CONSTRAINT_PREDICATES: [&str; 2] = ["none", "cannot"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TesterOptions {
    /// Predicates (arity 1 and 2) whose presence in a model fails the test.
    pub constraint_predicates: Vec<String>,
    /// Width used for counter-example models; the terminal's width when unset.
    pub terminal_width: Option<usize>,
}

impl Default for TesterOptions {
    fn default() -> Self {
        Self {
            constraint_predicates: DEFAULT_CONSTRAINT_PREDICATES
                .iter()
                .map(|p| p.to_string())
                .collect(),
            terminal_width: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Collecting,
    Solving,
    Failed,
}

#[derive(Debug)]
pub struct Tester {
    unit: String,
    file: String,
    options: TesterOptions,
    index: AssertionIndex,
    anys: BTreeSet<Symbol>,
    models_seen: u64,
    models_expected: Option<u64>,
    failure: Option<TestError>,
    warnings: Vec<String>,
    phase: Phase,
}

impl Tester {
    pub fn new(unit: impl Into<String>, file: impl Into<String>, options: TesterOptions) -> Self {
        Self {
            unit: unit.into(),
            file: file.into(),
            options,
            index: AssertionIndex::new(),
            anys: BTreeSet::new(),
            models_seen: 0,
            models_expected: None,
            failure: None,
            warnings: Vec::new(),
            phase: Phase::Collecting,
        }
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn models_seen(&self) -> u64 {
        self.models_seen
    }

    pub fn models_expected(&self) -> Option<u64> {
        self.models_expected
    }

    pub fn assertions(&self) -> &AssertionIndex {
        &self.index
    }

    pub fn pending_any(&self) -> impl Iterator<Item = &Symbol> {
        self.anys.iter()
    }

    /// `@all(v...)`: `assert(v)` must hold in every model.
    pub fn all(&mut self, args: &[Symbol]) -> Result<Symbol, String> {
        let (value, assertion) = create_assert(args)?;
        self.index.insert(assertion);
        Ok(value)
    }

    /// `@any(v...)`: `assert(v)` must hold in at least one model.
    pub fn any(&mut self, args: &[Symbol]) -> Result<Symbol, String> {
        let (value, assertion) = create_assert(args)?;
        if self.anys.contains(&assertion) {
            warn!(unit = %self.unit, %assertion, "duplicate assert");
            self.warnings
                .push(format!("duplicate assert: {assertion} in {}", self.unit));
        } else {
            self.anys.insert(assertion);
        }
        Ok(value)
    }

    /// `@models(n)`: exactly `n` models are expected.
    pub fn models(&mut self, args: &[Symbol]) -> Result<Symbol, String> {
        let [Symbol::Number(n)] = args else {
            return Err("@models expects a single integer argument".to_string());
        };
        let expected = u64::try_from(*n)
            .map_err(|_| format!("@models expects a non-negative count, got {n}"))?;
        self.models_expected = Some(expected);
        self.all(&[Symbol::function("models", vec![Symbol::Number(*n)])])
    }

    /// Dispatches the functions a tester exposes; `None` for names it does not own.
    pub fn call_function(
        &mut self,
        name: &str,
        args: &[Symbol],
    ) -> Option<Result<Symbol, String>> {
        match name {
            "all" => Some(self.all(args)),
            "any" => Some(self.any(args)),
            "models" => Some(self.models(args)),
            _ => None,
        }
    }

    /// Checks one model. Returns false to stop the enumeration once a failure has been
    /// recorded; only the first failure is kept.
    pub fn on_model(&mut self, model: &dyn Model) -> bool {
        if self.phase == Phase::Failed {
            return false;
        }
        self.phase = Phase::Solving;

        if self.models_expected.is_none() {
            self.models_expected = model
                .atoms_by_signature("models", 1)
                .iter()
                .find_map(|atom| atom.args()[0].number())
                .and_then(|n| u64::try_from(n).ok());
        }
        self.models_seen += 1;

        if let Some(assertion) = self.index.ambiguous() {
            let assertion = assertion.clone();
            return self.fail(TestError::Ambiguous {
                unit: self.unit.clone(),
                assertion,
            });
        }

        for ensure in model.atoms_by_signature("ensure", 1) {
            self.index.insert(ensure.args()[0].clone());
        }

        self.anys.retain(|a| !model.contains(a));

        let mut failures = self.index.missing_from(model);
        for name in &self.options.constraint_predicates {
            for arity in 1..=2 {
                failures.extend(model.atoms_by_signature(name, arity));
            }
        }
        if failures.is_empty() {
            debug!(unit = %self.unit, model = model.number(), "model accepted");
            return true;
        }

        let width = self.options.terminal_width.unwrap_or_else(terminal_width);
        let rendered = failures
            .iter()
            .map(Symbol::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        let message = format!(
            "MODEL:\n{}\nFailures in {}, #program {}():\n{rendered}\n",
            format_symbols_with_width(model.shown(), width),
            self.file,
            self.unit
        );
        self.fail(TestError::Assertion {
            unit: self.unit.clone(),
            file: self.file.clone(),
            failures,
            message,
        })
    }

    fn missing_any(&mut self, models: u64) -> TestError {
        TestError::MissingAny {
            models,
            missing: std::mem::take(&mut self.anys).into_iter().collect(),
        }
    }

    fn fail(&mut self, error: TestError) -> bool {
        debug!(unit = %self.unit, error = %error, "model rejected");
        self.failure = Some(error);
        self.phase = Phase::Failed;
        false
    }

    /// Final verdict once solving is over.
    pub fn report(mut self) -> Result<Report, TestError> {
        if let Some(failure) = self.failure.take() {
            return Err(failure);
        }
        let models = self.models_seen;
        if self.index.is_empty() {
            // Exists assertions that never matched still fail a unit without @all.
            if !self.anys.is_empty() {
                return Err(self.missing_any(models));
            }
            return Ok(Report {
                unit: self.unit,
                file: self.file,
                assertions: Vec::new(),
                assertion_count: 0,
                model_count: models,
            });
        }
        if self.unit != ROOT_UNIT {
            if models == 0 {
                return Err(TestError::NoModels {
                    unit: self.unit,
                    file: self.file,
                });
            }
            match self.models_expected {
                None => {
                    return Err(TestError::ModelCountUndeclared {
                        unit: self.unit,
                        file: self.file,
                        found: models,
                    });
                }
                Some(expected) if expected != models => {
                    return Err(TestError::ModelCount {
                        expected,
                        found: models,
                    });
                }
                Some(_) => {}
            }
        }
        if !self.anys.is_empty() {
            return Err(self.missing_any(models));
        }
        Ok(Report {
            assertions: self.index.rendered(),
            assertion_count: self.index.len(),
            unit: self.unit,
            file: self.file,
            model_count: models,
        })
    }
}

impl Observer for Tester {
    fn rule(&mut self, _choice: bool, head: &[AtomId], body: &[Lit]) {
        self.index.record_rule(head, body);
    }

    fn output_atom(&mut self, symbol: &Symbol, atom: AtomId) {
        self.index.record_output(symbol, atom);
    }
}

impl Context for Tester {
    fn call(&mut self, name: &str, args: &[Symbol]) -> Result<Symbol, String> {
        self.call_function(name, args)
            .unwrap_or_else(|| Err(format!("unknown function @{name}")))
    }
}

/// The handler of one solve cycle: the unit's tester first, then the functions
/// registered by the application.
pub struct CompoundContext<'a> {
    tester: &'a mut Tester,
    functions: FunctionTable,
}

impl<'a> CompoundContext<'a> {
    pub fn new(tester: &'a mut Tester, functions: FunctionTable) -> Self {
        Self { tester, functions }
    }
}

impl Observer for CompoundContext<'_> {
    fn rule(&mut self, choice: bool, head: &[AtomId], body: &[Lit]) {
        self.tester.rule(choice, head, body);
    }

    fn output_atom(&mut self, symbol: &Symbol, atom: AtomId) {
        self.tester.output_atom(symbol, atom);
    }
}

impl Context for CompoundContext<'_> {
    fn call(&mut self, name: &str, args: &[Symbol]) -> Result<Symbol, String> {
        match self.tester.call_function(name, args) {
            Some(result) => result,
            None => self.functions.call(name, args),
        }
    }
}
