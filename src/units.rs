use std::collections::HashMap;

use regex::Regex;
use tracing::debug;

use crate::ast::{Program, ROOT_UNIT, Term, UnitDecl};
use crate::diagnostics::Diagnostic;
use crate::error::TestError;
use crate::types::Symbol;

pub const DEFAULT_TEST_PATTERN: &str = "^test_";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyRef {
    pub target: String,
    pub bound_args: Vec<Symbol>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    pub name: String,
    pub parameters: Vec<String>,
    pub dependencies: Vec<DependencyRef>,
    pub file: String,
    pub line: usize,
}

impl Unit {
    pub fn root(file: impl Into<String>) -> Self {
        Self {
            name: ROOT_UNIT.to_string(),
            parameters: Vec::new(),
            dependencies: Vec::new(),
            file: file.into(),
            line: 1,
        }
    }

    pub fn is_root(&self) -> bool {
        self.name == ROOT_UNIT
    }

    pub fn location(&self) -> String {
        format!("{}:{}", self.file, self.line)
    }
}

/// Units of one loaded program, in registration order, plus the test units among them.
#[derive(Debug, Clone)]
pub struct UnitRegistry {
    units: HashMap<String, Unit>,
    order: Vec<String>,
    tests: Vec<String>,
}

impl UnitRegistry {
    pub fn new(root_file: impl Into<String>) -> Self {
        let root = Unit::root(root_file);
        let mut units = HashMap::new();
        units.insert(root.name.clone(), root);
        Self {
            units,
            order: vec![ROOT_UNIT.to_string()],
            tests: Vec::new(),
        }
    }

    /// Walks the unit declarations of `program`; names matching `test_pattern` are
    /// discovered as test units.
    pub fn from_program(program: &Program, test_pattern: &Regex) -> Result<Self, TestError> {
        let mut registry = Self::new(program.source_name.clone());
        for decl in program.units() {
            let unit = unit_from_decl(decl, &program.source_name)?;
            let is_test = test_pattern.is_match(&unit.name);
            registry.register(unit, is_test)?;
        }
        debug!(
            units = registry.order.len(),
            tests = registry.tests.len(),
            "registered units"
        );
        Ok(registry)
    }

    /// Reopening the root unit is allowed and keeps its first registration.
    pub fn register(&mut self, unit: Unit, is_test: bool) -> Result<(), TestError> {
        if unit.is_root() {
            return Ok(());
        }
        if self.units.contains_key(&unit.name) {
            return Err(TestError::DuplicateUnit {
                name: unit.name,
                file: unit.file,
            });
        }
        self.order.push(unit.name.clone());
        if is_test {
            self.tests.push(unit.name.clone());
        }
        self.units.insert(unit.name.clone(), unit);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Unit> {
        self.units.get(name)
    }

    pub fn root(&self) -> &Unit {
        &self.units[ROOT_UNIT]
    }

    pub fn contains(&self, name: &str) -> bool {
        self.units.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn units(&self) -> impl Iterator<Item = &Unit> {
        self.order.iter().map(|name| &self.units[name])
    }

    /// Test units ordered by originating file, first seen first within a file.
    pub fn test_units(&self) -> Vec<&Unit> {
        let mut tests: Vec<&Unit> = self.tests.iter().map(|name| &self.units[name]).collect();
        tests.sort_by(|a, b| a.file.cmp(&b.file));
        tests
    }
}

fn unit_from_decl(decl: &UnitDecl, default_file: &str) -> Result<Unit, TestError> {
    let file = decl
        .span
        .file_id
        .clone()
        .unwrap_or_else(|| default_file.to_string());
    let mut dependencies = Vec::new();
    for param in &decl.params {
        let mut bound_args = Vec::new();
        for arg in &param.args {
            let Some(value) = constant_value(arg) else {
                return Err(TestError::Parse(vec![Diagnostic::new(
                    "E-DEPENDENCY",
                    format!(
                        "arguments of dependency '{}' in '{}' must be constant values",
                        param.name, decl.name
                    ),
                    Some(param.span.clone()),
                )]));
            };
            bound_args.push(value);
        }
        dependencies.push(DependencyRef {
            target: param.name.clone(),
            bound_args,
        });
    }
    Ok(Unit {
        name: decl.name.clone(),
        parameters: decl.param_names(),
        dependencies,
        file,
        line: decl.span.line,
    })
}

pub(crate) fn constant_value(term: &Term) -> Option<Symbol> {
    match term {
        Term::Number(n) => Some(Symbol::Number(*n)),
        Term::String(s) => Some(Symbol::String(s.clone())),
        Term::Function { name, args } => {
            let args = args.iter().map(constant_value).collect::<Option<Vec<_>>>()?;
            Some(Symbol::function(name.clone(), args))
        }
        Term::Var(_) | Term::Call { .. } | Term::Interval(..) | Term::Pool(_) => None,
    }
}
