//! Interposition on the load, ground and solve stages of a solve cycle.
//!
//! A [`Pipeline`] owns the solver and an ordered list of middlewares fixed when it is
//! built. Each stage enters the first middleware with a [`Next`] handle; calling the
//! handle runs the rest of the chain and finally the solver or control itself.

use std::time::{Duration, Instant};

use tracing::{debug, debug_span, enabled, trace, Level};

use crate::ast::Program;
use crate::error::TestError;
use crate::solver::{Control, GroundHandler, Model, Part, SolveSummary, Solver};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Ground,
    Solve,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Load => "load",
            Stage::Ground => "ground",
            Stage::Solve => "solve",
        }
    }
}

pub trait Middleware {
    /// Unique within a pipeline.
    fn name(&self) -> &str;

    fn load(&mut self, program: &Program, next: Next<'_>) -> Result<Box<dyn Control>, TestError> {
        next.load(program)
    }

    fn ground(
        &mut self,
        control: &mut dyn Control,
        parts: &[Part],
        handler: &mut dyn GroundHandler,
        next: Next<'_>,
    ) -> Result<(), TestError> {
        next.ground(control, parts, handler)
    }

    fn solve(
        &mut self,
        control: &mut dyn Control,
        on_model: &mut dyn FnMut(&dyn Model) -> bool,
        next: Next<'_>,
    ) -> Result<SolveSummary, TestError> {
        next.solve(control, on_model)
    }
}

/// The remainder of the chain after the current middleware.
pub struct Next<'a> {
    rest: &'a mut [Box<dyn Middleware>],
    solver: &'a dyn Solver,
}

impl Next<'_> {
    pub fn load(self, program: &Program) -> Result<Box<dyn Control>, TestError> {
        let Next { rest, solver } = self;
        match rest.split_first_mut() {
            Some((head, tail)) => head.load(program, Next { rest: tail, solver }),
            None => solver.load(program),
        }
    }

    pub fn ground(
        self,
        control: &mut dyn Control,
        parts: &[Part],
        handler: &mut dyn GroundHandler,
    ) -> Result<(), TestError> {
        let Next { rest, solver } = self;
        match rest.split_first_mut() {
            Some((head, tail)) => {
                head.ground(control, parts, handler, Next { rest: tail, solver })
            }
            None => control.ground(parts, handler),
        }
    }

    pub fn solve(
        self,
        control: &mut dyn Control,
        on_model: &mut dyn FnMut(&dyn Model) -> bool,
    ) -> Result<SolveSummary, TestError> {
        let Next { rest, solver } = self;
        match rest.split_first_mut() {
            Some((head, tail)) => head.solve(control, on_model, Next { rest: tail, solver }),
            None => control.solve(on_model),
        }
    }
}

pub struct Pipeline {
    solver: Box<dyn Solver>,
    middlewares: Vec<Box<dyn Middleware>>,
}

impl Pipeline {
    pub fn new(solver: impl Solver + 'static) -> Self {
        Self {
            solver: Box::new(solver),
            middlewares: Vec::new(),
        }
    }

    pub fn with(mut self, middleware: impl Middleware + 'static) -> Result<Self, TestError> {
        self.push(Box::new(middleware))?;
        Ok(self)
    }

    pub fn push(&mut self, middleware: Box<dyn Middleware>) -> Result<(), TestError> {
        if self.middlewares.iter().any(|m| m.name() == middleware.name()) {
            return Err(TestError::Config {
                path: None,
                message: format!("middleware '{}' added twice", middleware.name()),
            });
        }
        self.middlewares.push(middleware);
        Ok(())
    }

    pub fn names(&self) -> Vec<&str> {
        self.middlewares.iter().map(|m| m.name()).collect()
    }

    fn entry(&mut self) -> Next<'_> {
        Next {
            rest: &mut self.middlewares,
            solver: self.solver.as_ref(),
        }
    }

    pub fn load(&mut self, program: &Program) -> Result<Box<dyn Control>, TestError> {
        self.entry().load(program)
    }

    pub fn ground(
        &mut self,
        control: &mut dyn Control,
        parts: &[Part],
        handler: &mut dyn GroundHandler,
    ) -> Result<(), TestError> {
        self.entry().ground(control, parts, handler)
    }

    pub fn solve(
        &mut self,
        control: &mut dyn Control,
        on_model: &mut dyn FnMut(&dyn Model) -> bool,
    ) -> Result<SolveSummary, TestError> {
        self.entry().solve(control, on_model)
    }
}

/// Logs every stage with its duration; dumps the ground atoms at trace level.
#[derive(Debug, Default)]
pub struct StageTrace {
    timings: Vec<(Stage, Duration)>,
}

impl StageTrace {
    pub const NAME: &'static str = "stage-trace";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn timings(&self) -> &[(Stage, Duration)] {
        &self.timings
    }

    fn record(&mut self, stage: Stage, started: Instant) {
        let elapsed = started.elapsed();
        debug!(
            stage = stage.as_str(),
            elapsed_us = elapsed.as_micros() as u64,
            "stage done"
        );
        self.timings.push((stage, elapsed));
    }
}

impl Middleware for StageTrace {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn load(&mut self, program: &Program, next: Next<'_>) -> Result<Box<dyn Control>, TestError> {
        let _span = debug_span!("load", source = %program.source_name).entered();
        let started = Instant::now();
        let control = next.load(program)?;
        self.record(Stage::Load, started);
        Ok(control)
    }

    fn ground(
        &mut self,
        control: &mut dyn Control,
        parts: &[Part],
        handler: &mut dyn GroundHandler,
        next: Next<'_>,
    ) -> Result<(), TestError> {
        let rendered: Vec<String> = parts.iter().map(Part::to_string).collect();
        let _span = debug_span!("ground", parts = %rendered.join(", ")).entered();
        let started = Instant::now();
        next.ground(control, parts, handler)?;
        self.record(Stage::Ground, started);
        if enabled!(Level::TRACE) {
            for atom in control.atoms() {
                trace!(%atom, "ground atom");
            }
        }
        Ok(())
    }

    fn solve(
        &mut self,
        control: &mut dyn Control,
        on_model: &mut dyn FnMut(&dyn Model) -> bool,
        next: Next<'_>,
    ) -> Result<SolveSummary, TestError> {
        let _span = debug_span!("solve").entered();
        let started = Instant::now();
        let summary = next.solve(control, on_model)?;
        self.record(Stage::Solve, started);
        debug!(
            models = summary.models,
            exhausted = summary.exhausted,
            "solve done"
        );
        Ok(summary)
    }
}
