//! Boundary between the test engine and the answer-set solver.
//!
//! The engine only talks to a solver through these traits. `logic_engine` provides a
//! small reference implementation; anything that can ground parts and enumerate models
//! can be plugged in instead.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::ast::Program;
use crate::error::TestError;
use crate::types::Symbol;

pub type AtomId = u32;

/// A body literal as reported to observers: positive atom ids for positive literals,
/// negated ids for default negation.
pub type Lit = i64;

/// A unit name with the values bound to its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Part {
    pub name: String,
    pub args: Vec<Symbol>,
}

impl Part {
    pub fn new(name: impl Into<String>, args: Vec<Symbol>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

impl fmt::Display for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{arg}")?;
        }
        write!(f, ")")
    }
}

/// Receives the ground rules while a control grounds its parts.
pub trait Observer {
    fn rule(&mut self, choice: bool, head: &[AtomId], body: &[Lit]);
    fn output_atom(&mut self, symbol: &Symbol, atom: AtomId);
}

/// Resolves `@name(args)` calls made by the program during grounding.
pub trait Context {
    fn call(&mut self, name: &str, args: &[Symbol]) -> Result<Symbol, String>;
}

/// Everything a control needs from the caller while grounding.
pub trait GroundHandler: Observer + Context {}

impl<T: Observer + Context> GroundHandler for T {}

/// One answer set, valid for the duration of the model callback.
pub trait Model {
    /// 1-based position of this model in the enumeration.
    fn number(&self) -> u64;
    fn contains(&self, symbol: &Symbol) -> bool;
    /// Every atom true in the model.
    fn atoms(&self) -> Vec<Symbol>;
    /// The visible atoms, honouring `#show`.
    fn shown(&self) -> Vec<Symbol>;

    fn atoms_by_signature(&self, name: &str, arity: usize) -> Vec<Symbol> {
        self.atoms()
            .into_iter()
            .filter(|s| s.has_signature(name, arity))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SolveSummary {
    pub models: u64,
    /// False when the model callback stopped the enumeration.
    pub exhausted: bool,
}

/// Creates one fresh control per solve cycle.
pub trait Solver {
    fn load(&self, program: &Program) -> Result<Box<dyn Control>, TestError>;
}

/// A single-use ground/solve session. Once solved it is spent and rejects further use.
pub trait Control {
    fn ground(&mut self, parts: &[Part], handler: &mut dyn GroundHandler)
    -> Result<(), TestError>;
    fn solve(
        &mut self,
        on_model: &mut dyn FnMut(&dyn Model) -> bool,
    ) -> Result<SolveSummary, TestError>;
    /// Atoms known after grounding.
    fn atoms(&self) -> Vec<Symbol>;
}

pub type Function = Rc<dyn Fn(&[Symbol]) -> Result<Symbol, String>>;

/// Functions callable from programs as `@name(...)`. Built by the embedding
/// application and copied into each solve cycle, so cycles never share registrations.
#[derive(Clone, Default)]
pub struct FunctionTable {
    functions: BTreeMap<String, Function>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        function: impl Fn(&[Symbol]) -> Result<Symbol, String> + 'static,
    ) -> Result<(), TestError> {
        let name = name.into();
        if self.functions.contains_key(&name) {
            return Err(TestError::Config {
                path: None,
                message: format!("function @{name} registered twice"),
            });
        }
        self.functions.insert(name, Rc::new(function));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }
}

impl fmt::Debug for FunctionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.functions.keys()).finish()
    }
}

impl Context for FunctionTable {
    fn call(&mut self, name: &str, args: &[Symbol]) -> Result<Symbol, String> {
        match self.functions.get(name) {
            Some(f) => f(args),
            None => Err(format!("unknown function @{name}")),
        }
    }
}

/// A table on its own grounds without observing anything.
impl Observer for FunctionTable {
    fn rule(&mut self, _choice: bool, _head: &[AtomId], _body: &[Lit]) {}
    fn output_atom(&mut self, _symbol: &Symbol, _atom: AtomId) {}
}
