//! Structured compiler diagnostics parsed from the toolchain's error stream.

use std::fmt;
use std::sync::LazyLock;

use miette::{LabeledSpan, SourceSpan};
use regex::Regex;
use tracing::trace;

use crate::source::{MietteSource, SourceUnit};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl Severity {
    fn parse(word: &str) -> Option<Self> {
        match word {
            "fatal error" | "error" => Some(Severity::Error),
            "warning" => Some(Severity::Warning),
            "note" => Some(Severity::Note),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Note => "note",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    /// File the toolchain attributed the message to, if any.
    pub source: Option<String>,
    pub line: Option<usize>,
    pub column: Option<usize>,
    pub message: String,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            source: None,
            line: None,
            column: None,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Whether this diagnostic points into `unit`.
    pub fn refers_to(&self, unit: &SourceUnit) -> bool {
        self.source.as_deref() == Some(unit.file_name().as_str())
    }

    /// A `miette` report with the unit's source attached when the position is known.
    pub fn to_report(&self, unit: &SourceUnit) -> miette::Report {
        let span = match self.line {
            Some(line) if self.refers_to(unit) => unit.span_of(line, self.column),
            _ => None,
        };
        let rendered = Rendered {
            severity: self.severity,
            message: self.message.clone(),
            src: unit.named_source(),
            span,
        };
        miette::Report::new(rendered)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(source) = &self.source {
            write!(f, "{}:", source)?;
            if let Some(line) = self.line {
                write!(f, "{}:", line)?;
            }
            if let Some(column) = self.column {
                write!(f, "{}:", column)?;
            }
            f.write_str(" ")?;
        }
        write!(f, "{}: {}", self.severity, self.message)
    }
}

#[derive(Debug)]
struct Rendered {
    severity: Severity,
    message: String,
    src: MietteSource,
    span: Option<SourceSpan>,
}

impl fmt::Display for Rendered {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for Rendered {}

impl miette::Diagnostic for Rendered {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(format!("memrun::compile::{}", self.severity)))
    }

    fn severity(&self) -> Option<miette::Severity> {
        Some(match self.severity {
            Severity::Error => miette::Severity::Error,
            Severity::Warning => miette::Severity::Warning,
            Severity::Note => miette::Severity::Advice,
        })
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        self.span.map(|_| &*self.src as &dyn miette::SourceCode)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let span = self.span?;
        Some(Box::new(std::iter::once(LabeledSpan::new_with_span(
            Some(self.severity.to_string()),
            span,
        ))))
    }
}

static POSITIONED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<file>[^:\s][^:]*):(?P<line>\d+):(?:(?P<column>\d+):)? (?P<severity>fatal error|error|warning|note): (?P<message>.*)$",
    )
    .expect("valid diagnostic pattern")
});

static TOOL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<tool>[^:\s]+): (?P<severity>fatal error|error|warning|note): (?P<message>.*)$")
        .expect("valid tool pattern")
});

static SECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<file>[^:\s]+):\((?P<section>[^)]*)\): (?P<message>.*)$")
        .expect("valid section pattern")
});

static LINKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<tool>\S*\bld(?:\.\w+)?): (?P<message>.*)$").expect("valid linker pattern")
});

/// Parses toolchain output into diagnostics, preserving emission order.
///
/// Lines that are not diagnostics (source excerpts, carets, "In function" headers) are skipped.
pub fn parse_diagnostics(stderr: &str) -> Vec<Diagnostic> {
    stderr.lines().filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<Diagnostic> {
    let line = line.trim_end();

    if let Some(caps) = POSITIONED.captures(line) {
        let severity = Severity::parse(&caps["severity"])?;
        return Some(Diagnostic {
            severity,
            source: Some(caps["file"].to_string()),
            line: caps["line"].parse().ok(),
            column: caps.name("column").and_then(|c| c.as_str().parse().ok()),
            message: caps["message"].to_string(),
        });
    }

    if let Some(caps) = TOOL.captures(line) {
        let severity = Severity::parse(&caps["severity"])?;
        return Some(Diagnostic {
            severity,
            source: None,
            line: None,
            column: None,
            message: format!("{}: {}", &caps["tool"], &caps["message"]),
        });
    }

    if let Some(caps) = SECTION.captures(line) {
        return Some(Diagnostic {
            source: Some(caps["file"].to_string()),
            ..Diagnostic::error(format!("{} (in {})", &caps["message"], &caps["section"]))
        });
    }

    if let Some(caps) = LINKER.captures(line) {
        return Some(Diagnostic::error(format!(
            "{}: {}",
            &caps["tool"], &caps["message"]
        )));
    }

    trace!(line, "Skipping non-diagnostic toolchain output");
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const GCC_OUTPUT: &str = "\
Main.c: In function 'Main_main':
Main.c:10:13: error: expected expression before ';' token
   10 | int c = ;
      |         ^
Main.c:8:5: warning: implicit declaration of function 'frob' [-Wimplicit-function-declaration]
Main.c:8:5: note: include '<stdio.h>' or provide a declaration of 'frob'
";

    #[test]
    fn test_parse_preserves_emission_order() {
        let diagnostics = parse_diagnostics(GCC_OUTPUT);
        let lines: Vec<_> = diagnostics.iter().map(|d| d.line).collect();
        assert_eq!(lines, vec![Some(10), Some(8), Some(8)]);

        let severities: Vec<_> = diagnostics.iter().map(|d| d.severity).collect();
        assert_eq!(
            severities,
            vec![Severity::Error, Severity::Warning, Severity::Note]
        );
        assert_eq!(diagnostics[0].column, Some(13));
        assert_eq!(diagnostics[0].source.as_deref(), Some("Main.c"));
        assert_eq!(diagnostics[0].message, "expected expression before ';' token");
    }

    #[test]
    fn test_parse_unpositioned_and_linker_lines() {
        let output = "\
/usr/bin/ld: /tmp/ccX.o: in function `Main_main':
Main.c:(.text+0x1d): undefined reference to `frob'
collect2: error: ld returned 1 exit status
clang: fatal error: no input files
";
        let diagnostics = parse_diagnostics(output);
        assert_eq!(diagnostics.len(), 4);
        assert!(diagnostics.iter().all(Diagnostic::is_error));
        assert!(diagnostics[0].message.starts_with("/usr/bin/ld: "));
        assert_eq!(
            diagnostics[1].message,
            "undefined reference to `frob' (in .text+0x1d)"
        );
        assert_eq!(diagnostics[1].source.as_deref(), Some("Main.c"));
        assert_eq!(diagnostics[2].message, "collect2: ld returned 1 exit status");
        assert_eq!(diagnostics[3].message, "clang: no input files");
        assert!(diagnostics.iter().all(|d| d.line.is_none()));
    }

    #[test]
    fn test_line_without_column() {
        let diagnostics = parse_diagnostics("Main.c:3: error: stray '@' in program\n");
        assert_eq!(diagnostics[0].line, Some(3));
        assert_eq!(diagnostics[0].column, None);
    }

    #[test]
    fn test_display() {
        let diagnostics = parse_diagnostics(GCC_OUTPUT);
        insta::assert_snapshot!(
            diagnostics[0].to_string(),
            @"Main.c:10:13: error: expected expression before ';' token"
        );
        assert_eq!(
            Diagnostic::error("toolchain exited with status 1").to_string(),
            "error: toolchain exited with status 1"
        );
    }

    #[test]
    fn test_report_attaches_source() {
        let unit = SourceUnit::new("Main", "int a;\nint b = ;\n");
        let diagnostic = parse_diagnostics("Main.c:2:9: error: expected expression\n").remove(0);
        assert!(diagnostic.refers_to(&unit));

        let report = diagnostic.to_report(&unit);
        assert_eq!(report.to_string(), "expected expression");
        assert!(report.source_code().is_some());
        assert_eq!(report.labels().unwrap().count(), 1);
    }
}
