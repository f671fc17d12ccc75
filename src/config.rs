use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Deserialize;

use crate::error::TestError;
use crate::tester::{DEFAULT_CONSTRAINT_PREDICATES, TesterOptions};
use crate::units::DEFAULT_TEST_PATTERN;

pub const DEFAULT_CONFIG_FILENAME: &str = "aspunit.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub tests: TestsConfig,
    pub output: OutputConfig,
    pub scan: ScanConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TestsConfig {
    pub pattern: String,
    pub run_base: bool,
    pub constraint_predicates: Vec<String>,
}

impl Default for TestsConfig {
    fn default() -> Self {
        Self {
            pattern: DEFAULT_TEST_PATTERN.to_string(),
            run_base: true,
            constraint_predicates: DEFAULT_CONSTRAINT_PREDICATES
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub terminal_width: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScanConfig {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub use_gitignore: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            include: vec!["**/*.lp".to_string()],
            exclude: Vec::new(),
            use_gitignore: true,
        }
    }
}

impl Config {
    pub fn from_toml(body: &str, source: Option<&Path>) -> Result<Self, TestError> {
        let config: Config = toml::from_str(body).map_err(|err| TestError::Config {
            path: source.map(Path::to_path_buf),
            message: format!("invalid TOML: {err}"),
        })?;
        config.test_pattern_at(source)?;
        Ok(config)
    }

    pub fn test_pattern(&self) -> Result<Regex, TestError> {
        self.test_pattern_at(None)
    }

    fn test_pattern_at(&self, source: Option<&Path>) -> Result<Regex, TestError> {
        Regex::new(&self.tests.pattern).map_err(|err| TestError::Config {
            path: source.map(Path::to_path_buf),
            message: format!("invalid test pattern {:?}: {err}", self.tests.pattern),
        })
    }

    pub fn tester_options(&self) -> TesterOptions {
        TesterOptions {
            constraint_predicates: self.tests.constraint_predicates.clone(),
            terminal_width: self.output.terminal_width,
        }
    }
}

pub fn default_config_path(dir: &Path) -> PathBuf {
    dir.join(DEFAULT_CONFIG_FILENAME)
}

/// An explicit path must exist; without one, `aspunit.toml` in `dir` is used when
/// present and defaults otherwise.
pub fn load_config(explicit: Option<&Path>, dir: &Path) -> Result<Config, TestError> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let path = default_config_path(dir);
            if !path.exists() {
                return Ok(Config::default());
            }
            path
        }
    };
    let body = fs::read_to_string(&path).map_err(|source| TestError::Io {
        path: path.clone(),
        source,
    })?;
    Config::from_toml(&body, Some(&path))
}
