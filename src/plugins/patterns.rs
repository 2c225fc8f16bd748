//! Line-oriented fallback parsing of tool output.
//!
//! Each plugin carries a table of rules. A rule's pattern may use the named
//! groups `file`, `line`, `col` and `msg`; separate extractor regexes can fill
//! positions the main pattern does not capture. The first rule that matches a
//! line wins.

use regex::{Captures, Regex};

use crate::types::{ErrorInfo, ErrorKind, Severity};

/// Uncompiled rule, as written in a plugin's source.
#[derive(Debug, Clone, Copy)]
pub struct PatternSpec {
    pub pattern: &'static str,
    pub kind: ErrorKind,
    pub severity: Severity,
    pub file: Option<&'static str>,
    pub line: Option<&'static str>,
    pub column: Option<&'static str>,
}

impl PatternSpec {
    pub const fn new(pattern: &'static str, kind: ErrorKind, severity: Severity) -> Self {
        Self {
            pattern,
            kind,
            severity,
            file: None,
            line: None,
            column: None,
        }
    }

    pub const fn with_extractors(
        mut self,
        file: Option<&'static str>,
        line: Option<&'static str>,
        column: Option<&'static str>,
    ) -> Self {
        self.file = file;
        self.line = line;
        self.column = column;
        self
    }
}

#[derive(Debug, Clone)]
struct ErrorPattern {
    matcher: Regex,
    kind: ErrorKind,
    severity: Severity,
    file: Option<Regex>,
    line: Option<Regex>,
    column: Option<Regex>,
}

#[derive(Debug, Clone)]
pub struct PatternTable {
    source: &'static str,
    patterns: Vec<ErrorPattern>,
}

fn compile(source: &str, pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!("[{source}] skipping invalid error pattern '{pattern}': {e}");
            None
        }
    }
}

impl PatternTable {
    /// Compiles `specs`, dropping (and logging) any rule that fails to compile.
    pub fn compile(source: &'static str, specs: &[PatternSpec]) -> Self {
        let patterns = specs
            .iter()
            .filter_map(|spec| {
                let matcher = compile(source, spec.pattern)?;
                let extractor = |p: Option<&str>| p.and_then(|p| compile(source, p));
                Some(ErrorPattern {
                    matcher,
                    kind: spec.kind,
                    severity: spec.severity,
                    file: extractor(spec.file),
                    line: extractor(spec.line),
                    column: extractor(spec.column),
                })
            })
            .collect();
        Self { source, patterns }
    }

    pub fn source(&self) -> &'static str {
        self.source
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Normalizes one line, if any rule matches it.
    pub fn match_line(&self, line: &str) -> Option<ErrorInfo> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        self.patterns.iter().find_map(|rule| {
            let caps = rule.matcher.captures(trimmed)?;

            let file = named(&caps, "file").or_else(|| extract(&rule.file, trimmed));
            let line_no = named(&caps, "line")
                .or_else(|| extract(&rule.line, trimmed))
                .and_then(|s| s.parse().ok())
                .unwrap_or(0);
            let column = named(&caps, "col")
                .or_else(|| extract(&rule.column, trimmed))
                .and_then(|s| s.parse().ok())
                .unwrap_or(0);
            let message = named(&caps, "msg").unwrap_or_else(|| trimmed.to_string());

            let mut info = ErrorInfo::new(self.source, rule.kind, rule.severity, message)
                .at(file.unwrap_or_default(), line_no, column);
            if let Some(code) = named(&caps, "code") {
                info = info.with_code(code);
            }
            Some(info)
        })
    }

    /// Normalizes every matching line of `output`.
    pub fn parse(&self, output: &str) -> Vec<ErrorInfo> {
        output.lines().filter_map(|line| self.match_line(line)).collect()
    }
}

fn named(caps: &Captures<'_>, name: &str) -> Option<String> {
    caps.name(name)
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn extract(re: &Option<Regex>, line: &str) -> Option<String> {
    re.as_ref()?
        .captures(line)?
        .get(1)
        .map(|m| m.as_str().trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPECS: &[PatternSpec] = &[
        PatternSpec::new(
            r"^(?P<file>[^:\s]+\.go):(?P<line>\d+):(?P<col>\d+): (?P<msg>.+)$",
            ErrorKind::Build,
            Severity::Error,
        ),
        PatternSpec::new(r"(?i)^warning: (?P<msg>.+)$", ErrorKind::Lint, Severity::Warning)
            .with_extractors(None, Some(r"line (\d+)"), None),
        PatternSpec::new(r"([unclosed", ErrorKind::Syntax, Severity::Error),
    ];

    #[test]
    fn test_invalid_rule_is_skipped() {
        let table = PatternTable::compile("go", SPECS);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_named_groups() {
        let table = PatternTable::compile("go", SPECS);
        let errors = table.parse("# pkg\nmain.go:12:5: undefined: foo\n\n");
        assert_eq!(errors.len(), 1);
        let e = &errors[0];
        assert_eq!(e.file, "main.go");
        assert_eq!((e.line, e.column), (12, 5));
        assert_eq!(e.message, "undefined: foo");
        assert_eq!(e.kind, ErrorKind::Build);
        assert_eq!(e.source, "go");
    }

    #[test]
    fn test_extractor_regex_fills_position() {
        let table = PatternTable::compile("go", SPECS);
        let e = table.match_line("Warning: shadowed variable at line 40").unwrap();
        assert_eq!(e.severity, Severity::Warning);
        assert_eq!(e.line, 40);
        assert_eq!(e.file, "");
    }

    #[test]
    fn test_unmatched_lines_are_dropped() {
        let table = PatternTable::compile("go", SPECS);
        assert!(table.parse("ok  \tgithub.com/x/y\t0.01s").is_empty());
    }
}
