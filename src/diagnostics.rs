use std::fmt;

/// Byte range of a statement or token plus its 1-based position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
    pub file_id: Option<String>,
}

impl Span {
    pub fn locate(src: &str, start: usize, end: usize, file_id: Option<&str>) -> Self {
        let before = &src[..floor_char_boundary(src, start)];
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map_or(0, |nl| nl + 1);
        Self {
            start,
            end,
            line,
            column: before[line_start..].chars().count() + 1,
            file_id: file_id.map(str::to_string),
        }
    }

    pub fn file_name(&self) -> &str {
        self.file_id.as_deref().unwrap_or("<string>")
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(file) = &self.file_id {
            write!(f, "{file}:")?;
        }
        write!(f, "{}:{}", self.line, self.column)
    }
}

fn floor_char_boundary(src: &str, offset: usize) -> usize {
    let mut offset = offset.min(src.len());
    while !src.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub code: &'static str,
    pub message: String,
    pub span: Option<Span>,
}

impl Diagnostic {
    pub fn new(code: &'static str, message: impl Into<String>, span: Option<Span>) -> Self {
        Self {
            code,
            message: message.into(),
            span,
        }
    }

    pub fn hint(&self) -> Option<&'static str> {
        let hint = match self.code {
            "E-IO" => "check the input paths and read permissions",
            "E-PARSE" => "check statement terminators, brackets and directive syntax",
            "E-UNIT" => "every #program name except 'base' must be declared once",
            "E-DEPENDENCY" => {
                "dependencies must name a declared #program with matching parameter count"
            }
            "E-GROUND" => "check variable safety and the @-functions used by the program",
            "E-SOLVE" => "reduce the number of undetermined atoms in the test unit",
            "E-CONFIG" => "check aspunit.toml: TOML syntax, regex and glob patterns",
            _ => return None,
        };
        Some(hint)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        if let Some(span) = &self.span {
            write!(f, " at {span}")?;
        }
        match self.hint() {
            Some(hint) => write!(f, " (hint: {hint})"),
            None => Ok(()),
        }
    }
}
