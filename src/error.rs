use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::diagnostics::Diagnostic;
use crate::types::Symbol;

pub type TestResult<T> = Result<T, TestError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Broken test setup: unit names, dependencies, configuration, syntax.
    Configuration,
    /// A test unit ran and one of its assertions does not hold.
    Assertion,
    /// An assertion is derived ambiguously; fatal by default.
    Warning,
    /// The solver could not ground or solve.
    Engine,
    Io,
}

#[derive(Debug, Error)]
pub enum TestError {
    #[error("Duplicate program name: '{name}' found in {file}.")]
    DuplicateUnit { name: String, file: String },

    #[error("Dependency '{dependency}' of '{unit}' not found.")]
    UnknownDependency { unit: String, dependency: String },

    #[error(
        "Argument mismatch in '{unit}' for dependency '{dependency}'. Required: {}, given: {}.",
        render_names(.required),
        render_values(.given)
    )]
    ArgumentMismatch {
        unit: String,
        dependency: String,
        required: Vec<String>,
        given: Vec<Symbol>,
    },

    /// A model violated a for-all assertion or contained a constraint fact. The
    /// message embeds the rendered model.
    #[error("{message}")]
    Assertion {
        unit: String,
        file: String,
        failures: Vec<Symbol>,
        message: String,
    },

    #[error("Duplicate: {assertion} (disjunction found) in {unit}.")]
    Ambiguous { unit: String, assertion: Symbol },

    #[error("{file}: {unit}: no models found.")]
    NoModels { unit: String, file: String },

    #[error("Expected {expected} models, found {found}.")]
    ModelCount { expected: u64, found: u64 },

    #[error(
        "{file}: {unit}: model count not declared (use @models(N) or a models(N) fact), found {found}."
    )]
    ModelCountUndeclared {
        unit: String,
        file: String,
        found: u64,
    },

    #[error("Asserts not in any of the {models} models:\n{}", render_lines(.missing))]
    MissingAny { models: u64, missing: Vec<Symbol> },

    #[error("{}", render_diagnostics(.0))]
    Parse(Vec<Diagnostic>),

    #[error("{message}")]
    Ground { message: String },

    #[error("{message}")]
    Solve { message: String },

    #[error("control already used; a fresh control is required for every test unit")]
    SpentControl,

    #[error("{}", render_config(.path.as_deref(), .message))]
    Config {
        path: Option<PathBuf>,
        message: String,
    },

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{source}\n  while running '{unit}' from {location}")]
    InUnit {
        unit: String,
        location: String,
        #[source]
        source: Box<TestError>,
    },
}

impl TestError {
    /// Wraps the error with the unit that raised it; `location` is `file:line`.
    pub fn in_unit(self, unit: &str, location: &str) -> Self {
        TestError::InUnit {
            unit: unit.to_string(),
            location: location.to_string(),
            source: Box::new(self),
        }
    }

    /// The failure itself, without the unit context added by the runner.
    pub fn root(&self) -> &TestError {
        match self {
            TestError::InUnit { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self.root() {
            TestError::DuplicateUnit { .. }
            | TestError::UnknownDependency { .. }
            | TestError::ArgumentMismatch { .. }
            | TestError::Parse(_)
            | TestError::Config { .. } => ErrorKind::Configuration,
            TestError::Assertion { .. }
            | TestError::NoModels { .. }
            | TestError::ModelCount { .. }
            | TestError::ModelCountUndeclared { .. }
            | TestError::MissingAny { .. } => ErrorKind::Assertion,
            TestError::Ambiguous { .. } => ErrorKind::Warning,
            TestError::Ground { .. } | TestError::Solve { .. } | TestError::SpentControl => {
                ErrorKind::Engine
            }
            TestError::Io { .. } => ErrorKind::Io,
            TestError::InUnit { .. } => unreachable!("root() never returns InUnit"),
        }
    }

    pub fn is_warning(&self) -> bool {
        self.kind() == ErrorKind::Warning
    }

    pub fn code(&self) -> &'static str {
        match self.root() {
            TestError::DuplicateUnit { .. } => "E-UNIT",
            TestError::UnknownDependency { .. } | TestError::ArgumentMismatch { .. } => {
                "E-DEPENDENCY"
            }
            TestError::Ambiguous { .. } => "E-WARNING",
            TestError::Assertion { .. }
            | TestError::NoModels { .. }
            | TestError::ModelCount { .. }
            | TestError::ModelCountUndeclared { .. }
            | TestError::MissingAny { .. } => "E-ASSERT",
            TestError::Parse(_) => "E-PARSE",
            TestError::Ground { .. } => "E-GROUND",
            TestError::Solve { .. } | TestError::SpentControl => "E-SOLVE",
            TestError::Config { .. } => "E-CONFIG",
            TestError::Io { .. } => "E-IO",
            TestError::InUnit { .. } => unreachable!("root() never returns InUnit"),
        }
    }
}

impl From<Vec<Diagnostic>> for TestError {
    fn from(diags: Vec<Diagnostic>) -> Self {
        TestError::Parse(diags)
    }
}

fn render_names(names: &[String]) -> String {
    let quoted: Vec<String> = names.iter().map(|n| format!("'{n}'")).collect();
    format!("[{}]", quoted.join(", "))
}

fn render_values(values: &[Symbol]) -> String {
    let items: Vec<String> = values.iter().map(Symbol::to_string).collect();
    format!("[{}]", items.join(", "))
}

fn render_lines(items: &[Symbol]) -> String {
    items
        .iter()
        .map(Symbol::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_diagnostics(diags: &[Diagnostic]) -> String {
    diags
        .iter()
        .map(Diagnostic::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_config(path: Option<&Path>, message: &str) -> String {
    match path {
        Some(path) => format!("{}: {message}", path.display()),
        None => message.to_string(),
    }
}
