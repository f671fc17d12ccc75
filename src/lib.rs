pub mod assertions;
pub mod ast;
pub mod config;
pub mod dependencies;
pub mod diagnostics;
pub mod error;
pub mod logic_engine;
pub mod middleware;
pub mod parser;
pub mod report;
pub mod runner;
pub mod scan;
pub mod solver;
pub mod symbol_format;
pub mod tester;
pub mod types;
pub mod units;

pub use ast::{Program, ROOT_UNIT};
pub use config::{Config, OutputFormat, load_config};
pub use diagnostics::{Diagnostic, Span};
pub use error::{ErrorKind, TestError, TestResult};
pub use logic_engine::ReferenceSolver;
pub use middleware::{Middleware, Next, Pipeline, StageTrace};
pub use parser::{parse_program, parse_program_with_source};
pub use report::{JsonSink, Report, ReportSink, TextSink};
pub use runner::{RunOptions, Runner};
pub use solver::{Control, FunctionTable, Model, Part, Solver};
pub use symbol_format::format_symbols;
pub use tester::{Tester, TesterOptions};
pub use types::Symbol;
pub use units::{Unit, UnitRegistry};
