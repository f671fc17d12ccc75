use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use aspunit::config::OutputFormat;
use aspunit::scan::{SourceFilter, collect_sources};
use aspunit::{
    Config, JsonSink, Pipeline, ReferenceSolver, ReportSink, RunOptions, Runner, StageTrace,
    TestError, TextSink, load_config,
};
use clap::{ArgAction, Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "aspunit")]
#[command(about = "Unit tests for answer set programs")]
struct Cli {
    /// Configuration file; defaults to ./aspunit.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, value_enum)]
    format: Option<FormatArg>,
    /// Terminal width for counter-example models.
    #[arg(long)]
    width: Option<usize>,
    /// Skip the standalone run of the root unit.
    #[arg(long)]
    no_base: bool,
    /// Log every load/ground/solve stage with its duration.
    #[arg(long)]
    trace_stages: bool,
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
    /// Source files or directories; none or `-` reads the program from stdin.
    paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Text,
    Json,
}

impl From<FormatArg> for OutputFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Text => OutputFormat::Text,
            FormatArg::Json => OutputFormat::Json,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let exit_code = match run_tests(&cli) {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };
    std::process::exit(exit_code);
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn report_error(err: &TestError) {
    match err {
        TestError::Parse(diags) => {
            for d in diags {
                eprintln!("{d}");
            }
        }
        other => eprintln!("{}: {other}", other.code()),
    }
}

fn run_tests(cli: &Cli) -> Result<(), TestError> {
    let cwd = env::current_dir().map_err(|source| TestError::Io {
        path: PathBuf::from("."),
        source,
    })?;
    let mut config = load_config(cli.config.as_deref(), &cwd)?;
    if let Some(format) = cli.format {
        config.output.format = format.into();
    }
    if cli.width.is_some() {
        config.output.terminal_width = cli.width;
    }
    if cli.no_base {
        config.tests.run_base = false;
    }

    let inputs = collect_inputs(&cli.paths, &config, cli.config.as_deref())?;

    let mut pipeline = Pipeline::new(ReferenceSolver::new());
    if cli.trace_stages {
        pipeline = pipeline.with(StageTrace::new())?;
    }
    let mut runner = Runner::new(pipeline).with_options(RunOptions {
        run_base: config.tests.run_base,
        test_pattern: config.test_pattern()?,
        tester: config.tester_options(),
    });

    let stdout = io::stdout();
    let mut sink: Box<dyn ReportSink> = match config.output.format {
        OutputFormat::Text => Box::new(TextSink::new(stdout.lock())),
        OutputFormat::Json => Box::new(JsonSink::new(stdout.lock())),
    };
    for input in inputs {
        let name = input.name();
        if config.output.format == OutputFormat::Text {
            println!("Reading {name}.");
        }
        let source = input.read()?;
        runner.run_source(&source, &name, sink.as_mut())?;
    }
    Ok(())
}

enum Input {
    Stdin,
    File(PathBuf),
}

impl Input {
    fn name(&self) -> String {
        match self {
            Input::Stdin => "<stdin>".to_string(),
            Input::File(path) => path.display().to_string(),
        }
    }

    fn read(&self) -> Result<String, TestError> {
        match self {
            Input::Stdin => io::read_to_string(io::stdin()).map_err(|source| TestError::Io {
                path: PathBuf::from("<stdin>"),
                source,
            }),
            Input::File(path) => fs::read_to_string(path).map_err(|source| TestError::Io {
                path: path.clone(),
                source,
            }),
        }
    }
}

fn collect_inputs(
    paths: &[PathBuf],
    config: &Config,
    config_path: Option<&Path>,
) -> Result<Vec<Input>, TestError> {
    let stdin = Path::new("-");
    let files: Vec<PathBuf> = paths
        .iter()
        .filter(|p| p.as_path() != stdin)
        .cloned()
        .collect();
    let mut inputs = Vec::new();
    if paths.is_empty() || files.len() < paths.len() {
        inputs.push(Input::Stdin);
    }
    if !files.is_empty() {
        let filter = SourceFilter::from_config(&config.scan, config_path)?;
        inputs.extend(collect_sources(&files, &filter)?.into_iter().map(Input::File));
    }
    Ok(inputs)
}
