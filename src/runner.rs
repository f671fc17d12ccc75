use regex::Regex;
use tracing::{debug, info};

use crate::ast::{Program, ROOT_UNIT};
use crate::dependencies::resolve;
use crate::error::TestError;
use crate::middleware::Pipeline;
use crate::parser::parse_program_with_source;
use crate::report::{Report, ReportSink};
use crate::solver::{FunctionTable, Model, Part};
use crate::tester::{CompoundContext, Tester, TesterOptions};
use crate::units::{DEFAULT_TEST_PATTERN, Unit, UnitRegistry};

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Run the root unit on its own before the test units.
    pub run_base: bool,
    pub test_pattern: Regex,
    pub tester: TesterOptions,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            run_base: true,
            test_pattern: Regex::new(DEFAULT_TEST_PATTERN).expect("default test pattern is valid"),
            tester: TesterOptions::default(),
        }
    }
}

/// Runs the test units of a program, one fresh solve cycle per unit.
pub struct Runner {
    pipeline: Pipeline,
    functions: FunctionTable,
    options: RunOptions,
}

impl Runner {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            functions: FunctionTable::new(),
            options: RunOptions::default(),
        }
    }

    pub fn with_functions(mut self, functions: FunctionTable) -> Self {
        self.functions = functions;
        self
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    pub fn run_source(
        &mut self,
        source: &str,
        file: &str,
        sink: &mut dyn ReportSink,
    ) -> Result<Vec<Report>, TestError> {
        let program = parse_program_with_source(source, Some(file))?;
        self.run_program(&program, sink)
    }

    /// Stops at the first failing unit; reports already produced have been sent to
    /// `sink`.
    pub fn run_program(
        &mut self,
        program: &Program,
        sink: &mut dyn ReportSink,
    ) -> Result<Vec<Report>, TestError> {
        let registry = UnitRegistry::from_program(program, &self.options.test_pattern)?;
        let mut units: Vec<&Unit> = Vec::new();
        if self.options.run_base {
            units.push(registry.root());
        }
        units.extend(registry.test_units());
        info!(
            source = %program.source_name,
            units = units.len(),
            "running test units"
        );

        let mut reports = Vec::with_capacity(units.len());
        for unit in units {
            let location = unit.location();
            let report = self
                .run_unit(program, &registry, unit)
                .map_err(|err| err.in_unit(&unit.name, &location))?;
            sink.report(&report)
                .map_err(|err| err.in_unit(&unit.name, &location))?;
            reports.push(report);
        }
        Ok(reports)
    }

    pub fn run_unit(
        &mut self,
        program: &Program,
        registry: &UnitRegistry,
        unit: &Unit,
    ) -> Result<Report, TestError> {
        let parts = if unit.is_root() {
            vec![Part::new(ROOT_UNIT, Vec::new())]
        } else {
            resolve(registry, unit)?
        };
        let mut tester = Tester::new(&unit.name, &unit.file, self.options.tester.clone());
        let mut control = self.pipeline.load(program)?;
        {
            let mut context = CompoundContext::new(&mut tester, self.functions.clone());
            self.pipeline
                .ground(control.as_mut(), &parts, &mut context)?;
        }
        let summary = self
            .pipeline
            .solve(control.as_mut(), &mut |model: &dyn Model| tester.on_model(model))?;
        debug!(
            unit = %unit.name,
            models = summary.models,
            exhausted = summary.exhausted,
            "unit solved"
        );
        tester.report()
    }
}
