//! Normalized diagnostics reported by external tools.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category of a reported problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Syntax,
    Type,
    Runtime,
    Import,
    Lint,
    Test,
    Build,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Syntax => "syntax",
            ErrorKind::Type => "type",
            ErrorKind::Runtime => "runtime",
            ErrorKind::Import => "import",
            ErrorKind::Lint => "lint",
            ErrorKind::Test => "test",
            ErrorKind::Build => "build",
        }
    }

    /// Kinds that make a build unusable when reported at error severity.
    pub fn breaks_build(&self) -> bool {
        matches!(self, ErrorKind::Syntax | ErrorKind::Type | ErrorKind::Build)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    /// Lenient mapping of the level names the supported tools print.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "error" | "fatal" | "critical" | "e" | "f" => Severity::Error,
            "warning" | "warn" | "w" => Severity::Warning,
            _ => Severity::Info,
        }
    }
}

/// One problem reported by a tool, in the common schema every plugin emits.
///
/// `line` and `column` are 1-based; zero means the tool did not report a
/// position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub source: String,
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub kind: ErrorKind,
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl ErrorInfo {
    pub fn new(
        source: impl Into<String>,
        kind: ErrorKind,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            file: String::new(),
            line: 0,
            column: 0,
            kind,
            severity,
            message: message.into(),
            code: None,
            timestamp: Utc::now(),
            context: None,
        }
    }

    pub fn at(mut self, file: impl Into<String>, line: u32, column: u32) -> Self {
        self.file = file.into();
        self.line = line;
        self.column = column;
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        let code = code.into();
        self.code = if code.is_empty() { None } else { Some(code) };
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    pub fn is_warning(&self) -> bool {
        self.severity == Severity::Warning
    }

    /// The same problem at the same place, whichever tool reported it.
    pub fn same_finding(&self, other: &ErrorInfo) -> bool {
        self.file == other.file
            && self.line == other.line
            && self.column == other.column
            && self.kind == other.kind
            && self.severity == other.severity
            && self.message == other.message
    }

    /// Compares everything except the observation timestamp.
    pub fn same_report(&self, other: &ErrorInfo) -> bool {
        self.source == other.source
            && self.file == other.file
            && self.line == other.line
            && self.column == other.column
            && self.kind == other.kind
            && self.severity == other.severity
            && self.message == other.message
            && self.code == other.code
            && self.context == other.context
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serializes_lowercase() {
        let json = serde_json::to_string(&ErrorKind::Syntax).unwrap();
        assert_eq!(json, "\"syntax\"");
        let json = serde_json::to_string(&Severity::Warning).unwrap();
        assert_eq!(json, "\"warning\"");
    }

    #[test]
    fn test_severity_labels() {
        assert_eq!(Severity::from_label("fatal"), Severity::Error);
        assert_eq!(Severity::from_label("Warning"), Severity::Warning);
        assert_eq!(Severity::from_label("note"), Severity::Info);
        assert_eq!(Severity::from_label("convention"), Severity::Info);
    }

    #[test]
    fn test_same_report_ignores_timestamp() {
        let a = ErrorInfo::new("eslint", ErrorKind::Lint, Severity::Warning, "unused")
            .at("src/a.js", 3, 7)
            .with_code("no-unused-vars");
        let mut b = a.clone();
        b.timestamp = a.timestamp + chrono::Duration::seconds(30);
        assert!(a.same_report(&b));

        b.line = 4;
        assert!(!a.same_report(&b));
    }

    #[test]
    fn test_empty_code_is_none() {
        let e = ErrorInfo::new("tsc", ErrorKind::Type, Severity::Error, "x").with_code("");
        assert!(e.code.is_none());
    }
}
