use std::io::Write;
use std::path::PathBuf;

use serde::Serialize;

use crate::error::TestError;

/// Outcome of one passing test unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub unit: String,
    pub file: String,
    pub assertions: Vec<String>,
    pub assertion_count: usize,
    pub model_count: u64,
}

impl Report {
    pub fn summary_line(&self) -> String {
        let plural = if self.model_count > 1 { "s" } else { "" };
        format!(
            "ASPUNIT: {}:  {} asserts,  {} model{plural}",
            self.unit, self.assertion_count, self.model_count
        )
    }
}

pub trait ReportSink {
    fn report(&mut self, report: &Report) -> Result<(), TestError>;
}

impl<F> ReportSink for F
where
    F: FnMut(&Report),
{
    fn report(&mut self, report: &Report) -> Result<(), TestError> {
        self(report);
        Ok(())
    }
}

/// One `ASPUNIT:` line per report.
pub struct TextSink<W: Write> {
    out: W,
}

impl<W: Write> TextSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ReportSink for TextSink<W> {
    fn report(&mut self, report: &Report) -> Result<(), TestError> {
        writeln!(self.out, "{}", report.summary_line()).map_err(output_error)?;
        self.out.flush().map_err(output_error)
    }
}

/// One JSON object per line.
pub struct JsonSink<W: Write> {
    out: W,
}

impl<W: Write> JsonSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ReportSink for JsonSink<W> {
    fn report(&mut self, report: &Report) -> Result<(), TestError> {
        let rendered = serde_json::to_string(report).map_err(|e| TestError::Config {
            path: None,
            message: format!("failed to serialize report for '{}': {e}", report.unit),
        })?;
        writeln!(self.out, "{rendered}").map_err(output_error)?;
        self.out.flush().map_err(output_error)
    }
}

fn output_error(source: std::io::Error) -> TestError {
    TestError::Io {
        path: PathBuf::from("<output>"),
        source,
    }
}
