//! Python plugin.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::path::Path;
use std::sync::OnceLock;

use super::logs::{LOG_GLOBS, scan_logs};
use super::patterns::{PatternSpec, PatternTable};
use super::services::{DeclaredService, collect_services};
use super::{
    LanguagePlugin, PluginContext, PluginDescriptor, PluginError, PluginResult, dedupe_by_name,
    detect_with, drop_duplicate_syntax,
};
use crate::types::{
    DependencyInfo, DependencyKind, ErrorInfo, ErrorKind, ServiceInfo, Severity, TestFailure,
    TestResults,
};
use crate::walker::relative_display;

pub const EXTENSIONS: &[&str] = &["py", "pyi"];
const CONFIG_FILES: &[&str] = &[
    "requirements.txt",
    "pyproject.toml",
    "setup.py",
    "setup.cfg",
    "Pipfile",
];
pub const DEFAULT_PORTS: &[u16] = &[8000, 5000, 8080, 9000, 8888];

/// Interpreters tried in order.
const INTERPRETERS: &[&str] = &["python3", "python"];

/// Compiles one file without writing bytecode and prints
/// `line:offset:ErrorType:message` on a syntax error.
const COMPILE_CHECK: &str = "import sys
try:
    compile(open(sys.argv[1], encoding='utf-8').read(), sys.argv[1], 'exec')
except SyntaxError as e:
    print('%d:%d:%s:%s' % (e.lineno or 0, e.offset or 0, type(e).__name__, e.msg))
    sys.exit(1)
";

/// Files compiled per analysis pass.
const MAX_SYNTAX_CHECKS: usize = 200;

/// Source files scanned for framework imports.
const MAX_FRAMEWORK_SCAN: usize = 200;

const PATTERNS: &[PatternSpec] = &[
    // py_compile and pylint name the position after the message:
    // "Sorry: IndentationError: unexpected indent (app.py, line 2)"
    PatternSpec::new(
        r"^(?:Sorry: )?(?P<msg>(?:SyntaxError|IndentationError|TabError): .+)$",
        ErrorKind::Syntax,
        Severity::Error,
    )
    .with_extractors(Some(r"\(([^,()]+\.py), line \d+\)"), Some(r"\bline (\d+)\)?$"), None),
    PatternSpec::new(
        r"^(?P<msg>(?:ModuleNotFoundError|ImportError): .+)$",
        ErrorKind::Import,
        Severity::Error,
    ),
    PatternSpec::new(
        r"^(?P<msg>[A-Z]\w*(?:Error|Exception): .+)$",
        ErrorKind::Runtime,
        Severity::Error,
    ),
    PatternSpec::new(
        r"^(?P<file>[^\s:]+\.py):(?P<line>\d+):(?:(?P<col>\d+):)? (?P<msg>.+)$",
        ErrorKind::Lint,
        Severity::Warning,
    ),
];

/// Parses the one-line report [`COMPILE_CHECK`] prints.
pub fn parse_compile_check(display: &str, output: &str) -> Option<ErrorInfo> {
    static REPORT: OnceLock<Regex> = OnceLock::new();
    let re = REPORT.get_or_init(|| Regex::new(r"^(\d+):(\d+):(\w+):(.*)$").expect("valid report regex"));

    output.lines().find_map(|line| {
        let caps = re.captures(line.trim())?;
        Some(
            ErrorInfo::new("python", ErrorKind::Syntax, Severity::Error, caps[4].trim())
                .at(display, caps[1].parse().unwrap_or(0), caps[2].parse().unwrap_or(0))
                .with_code(&caps[3]),
        )
    })
}

/// Splits a PEP 508 requirement into name and version.
///
/// An exact `==` pin yields the bare version; any other specifier is kept
/// verbatim with its operator; an unpinned requirement yields `*`. Extras and
/// environment markers are dropped.
pub fn parse_requirement(line: &str) -> Option<(String, String)> {
    static REQ: OnceLock<Regex> = OnceLock::new();
    let re = REQ.get_or_init(|| {
        Regex::new(r"^([A-Za-z0-9][A-Za-z0-9._-]*)\s*(?:\[[^\]]*\])?\s*(.*)$").expect("valid requirement regex")
    });

    let line = line.split(" #").next().unwrap_or(line);
    let line = line.split(';').next().unwrap_or(line).trim();
    if line.is_empty() || line.starts_with('#') || line.starts_with('-') || line.contains("://") {
        return None;
    }

    let caps = re.captures(line)?;
    let name = caps[1].to_string();
    let spec = caps[2].trim().trim_start_matches('(').trim_end_matches(')').trim();
    let version = match spec.strip_prefix("==") {
        Some(pinned) if !pinned.contains(',') => pinned.trim().to_string(),
        _ if spec.is_empty() => "*".to_string(),
        _ => spec.to_string(),
    };
    Some((name, version))
}

fn requirements_file(root: &Path, file: &str, kind: DependencyKind) -> Vec<DependencyInfo> {
    let Ok(content) = std::fs::read_to_string(root.join(file)) else {
        return Vec::new();
    };
    let deps = content
        .lines()
        .filter_map(parse_requirement)
        .map(|(name, version)| DependencyInfo::new(name, version, kind, file))
        .collect();
    dedupe_by_name(deps)
}

/// Version string of a Poetry or Pipenv table entry.
fn toml_version(value: &toml::Value) -> String {
    let raw = match value {
        toml::Value::String(s) => s.clone(),
        toml::Value::Table(t) => {
            if let Some(v) = t.get("version").and_then(|v| v.as_str()) {
                v.to_string()
            } else if t.contains_key("git") {
                "git".to_string()
            } else if t.contains_key("path") {
                "path".to_string()
            } else {
                "*".to_string()
            }
        }
        _ => "*".to_string(),
    };
    raw.strip_prefix("==").map(str::to_string).unwrap_or(raw)
}

fn table_deps(table: Option<&toml::Value>, kind: DependencyKind, source: &str) -> Vec<DependencyInfo> {
    table
        .and_then(|t| t.as_table())
        .map(|t| {
            t.iter()
                .filter(|(name, _)| !name.eq_ignore_ascii_case("python"))
                .map(|(name, value)| DependencyInfo::new(name, toml_version(value), kind, source))
                .collect()
        })
        .unwrap_or_default()
}

fn requirement_list(list: Option<&toml::Value>, kind: DependencyKind, source: &str) -> Vec<DependencyInfo> {
    list.and_then(|l| l.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str())
                .filter_map(parse_requirement)
                .map(|(name, version)| DependencyInfo::new(name, version, kind, source))
                .collect()
        })
        .unwrap_or_default()
}

/// PEP 621 `[project]` tables, PEP 735 dependency groups and Poetry sections.
fn pyproject_deps(root: &Path) -> Vec<DependencyInfo> {
    const SOURCE: &str = "pyproject.toml";
    let Ok(content) = std::fs::read_to_string(root.join(SOURCE)) else {
        return Vec::new();
    };
    let doc: toml::Value = match toml::from_str(&content) {
        Ok(doc) => doc,
        Err(e) => {
            tracing::warn!("[python] malformed pyproject.toml: {e}");
            return Vec::new();
        }
    };

    let mut deps = Vec::new();
    if let Some(project) = doc.get("project") {
        deps.extend(requirement_list(project.get("dependencies"), DependencyKind::Direct, SOURCE));
        if let Some(optional) = project.get("optional-dependencies").and_then(|o| o.as_table()) {
            for list in optional.values() {
                deps.extend(requirement_list(Some(list), DependencyKind::Dev, SOURCE));
            }
        }
    }
    if let Some(groups) = doc.get("dependency-groups").and_then(|g| g.as_table()) {
        for list in groups.values() {
            deps.extend(requirement_list(Some(list), DependencyKind::Dev, SOURCE));
        }
    }
    if let Some(poetry) = doc.get("tool").and_then(|t| t.get("poetry")) {
        deps.extend(table_deps(poetry.get("dependencies"), DependencyKind::Direct, SOURCE));
        deps.extend(table_deps(poetry.get("dev-dependencies"), DependencyKind::Dev, SOURCE));
        if let Some(groups) = poetry.get("group").and_then(|g| g.as_table()) {
            for group in groups.values() {
                deps.extend(table_deps(group.get("dependencies"), DependencyKind::Dev, SOURCE));
            }
        }
    }
    dedupe_by_name(deps)
}

fn pipfile_deps(root: &Path) -> Vec<DependencyInfo> {
    const SOURCE: &str = "Pipfile";
    let Ok(content) = std::fs::read_to_string(root.join(SOURCE)) else {
        return Vec::new();
    };
    let Ok(doc) = toml::from_str::<toml::Value>(&content) else {
        tracing::warn!("[python] malformed Pipfile");
        return Vec::new();
    };
    let mut deps = table_deps(doc.get("packages"), DependencyKind::Direct, SOURCE);
    deps.extend(table_deps(doc.get("dev-packages"), DependencyKind::Dev, SOURCE));
    dedupe_by_name(deps)
}

#[derive(Debug, Deserialize)]
struct PylintMessage {
    #[serde(rename = "type")]
    level: String,
    path: String,
    line: u32,
    #[serde(default)]
    column: u32,
    symbol: String,
    message: String,
    #[serde(rename = "message-id")]
    message_id: String,
}

/// Parses `pylint --output-format=json`. Columns are 0-based there.
pub fn parse_pylint_json(output: &str) -> Option<Vec<ErrorInfo>> {
    let start = output.find('[')?;
    let messages: Vec<PylintMessage> = serde_json::from_str(output[start..].trim_end()).ok()?;
    Some(
        messages
            .into_iter()
            .map(|m| {
                let kind = if m.symbol == "syntax-error" {
                    ErrorKind::Syntax
                } else if m.symbol.contains("import") {
                    ErrorKind::Import
                } else {
                    ErrorKind::Lint
                };
                ErrorInfo::new("pylint", kind, Severity::from_label(&m.level), m.message)
                    .at(m.path.trim_start_matches("./").replace('\\', "/"), m.line, m.column + 1)
                    .with_code(format!("{} ({})", m.message_id, m.symbol))
            })
            .collect(),
    )
}

/// Maps a pyflakes/pycodestyle/ruff rule code to kind and severity.
fn classify_rule(code: Option<&str>) -> (ErrorKind, Severity) {
    match code {
        None => (ErrorKind::Syntax, Severity::Error),
        Some(c) if c.starts_with("E9") => (ErrorKind::Syntax, Severity::Error),
        Some(c) if c.starts_with("F82") => (ErrorKind::Lint, Severity::Error),
        Some("F401") => (ErrorKind::Import, Severity::Warning),
        Some(_) => (ErrorKind::Lint, Severity::Warning),
    }
}

/// Parses flake8's default `path:line:col: CODE message` format.
pub fn parse_flake8(output: &str) -> Vec<ErrorInfo> {
    static LINE: OnceLock<Regex> = OnceLock::new();
    let re = LINE.get_or_init(|| Regex::new(r"^(.+?):(\d+):(\d+): ([A-Z]+\d+) (.+)$").expect("valid flake8 regex"));

    output
        .lines()
        .filter_map(|line| {
            let caps = re.captures(line.trim())?;
            let (kind, severity) = classify_rule(Some(&caps[4]));
            Some(
                ErrorInfo::new("flake8", kind, severity, &caps[5])
                    .at(
                        caps[1].trim_start_matches("./").replace('\\', "/"),
                        caps[2].parse().unwrap_or(0),
                        caps[3].parse().unwrap_or(0),
                    )
                    .with_code(&caps[4]),
            )
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct RuffMessage {
    code: Option<String>,
    message: String,
    filename: String,
    location: RuffLocation,
}

#[derive(Debug, Deserialize)]
struct RuffLocation {
    row: u32,
    column: u32,
}

/// Parses `ruff check --output-format json`. A null code is a syntax error.
pub fn parse_ruff_json(root: &Path, output: &str) -> Option<Vec<ErrorInfo>> {
    let start = output.find('[')?;
    let messages: Vec<RuffMessage> = serde_json::from_str(output[start..].trim_end()).ok()?;
    Some(
        messages
            .into_iter()
            .map(|m| {
                let (kind, severity) = classify_rule(m.code.as_deref());
                let mut info = ErrorInfo::new("ruff", kind, severity, m.message).at(
                    relative_display(root, Path::new(&m.filename)),
                    m.location.row,
                    m.location.column,
                );
                if let Some(code) = m.code {
                    info = info.with_code(code);
                }
                info
            })
            .collect(),
    )
}

/// Parses mypy output (`--show-column-numbers` optional).
pub fn parse_mypy(output: &str) -> Vec<ErrorInfo> {
    static LINE: OnceLock<Regex> = OnceLock::new();
    let re = LINE.get_or_init(|| {
        Regex::new(r"^(.+?):(\d+):(?:(\d+):)? (error|warning|note): (.+?)(?:\s+\[([\w-]+)\])?$")
            .expect("valid mypy regex")
    });

    output
        .lines()
        .filter_map(|line| {
            let caps = re.captures(line.trim())?;
            let code = caps.get(6).map(|m| m.as_str());
            let kind = match code {
                Some("syntax") => ErrorKind::Syntax,
                Some(c) if c.starts_with("import") => ErrorKind::Import,
                _ => ErrorKind::Type,
            };
            let mut info = ErrorInfo::new("mypy", kind, Severity::from_label(&caps[4]), &caps[5]).at(
                caps[1].replace('\\', "/"),
                caps[2].parse().unwrap_or(0),
                caps.get(3).and_then(|m| m.as_str().parse().ok()).unwrap_or(0),
            );
            if let Some(code) = code {
                info = info.with_code(code);
            }
            Some(info)
        })
        .collect()
}

/// Parses pytest's summary line and `FAILED` short-summary lines.
pub fn parse_pytest_output(output: &str) -> TestResults {
    static COUNT: OnceLock<Regex> = OnceLock::new();
    static DURATION: OnceLock<Regex> = OnceLock::new();
    static FAILED: OnceLock<Regex> = OnceLock::new();
    let count = COUNT.get_or_init(|| {
        Regex::new(r"(\d+) (passed|failed|errors?|skipped|xfailed|xpassed|deselected)").expect("valid count regex")
    });
    let duration = DURATION.get_or_init(|| Regex::new(r" in ([\d.]+)s").expect("valid duration regex"));
    let failed = FAILED.get_or_init(|| {
        Regex::new(r"^(?:FAILED|ERROR) ([^:\s]+)::(\S+)(?: - (.+))?$").expect("valid failure regex")
    });

    let mut results = TestResults::default();
    let summary = output
        .lines()
        .rev()
        .find(|line| count.is_match(line) && duration.is_match(line));

    if let Some(summary) = summary {
        for caps in count.captures_iter(summary) {
            let n: u32 = caps[1].parse().unwrap_or(0);
            match &caps[2] {
                "passed" | "xpassed" => results.passed += n,
                "failed" | "error" | "errors" => results.failed += n,
                "skipped" | "xfailed" => results.skipped += n,
                _ => {}
            }
        }
        if let Some(caps) = duration.captures(summary) {
            results.duration_ms = caps[1].parse::<f64>().ok().map(|s| (s * 1000.0).round() as u64);
        }
    }

    for line in output.lines() {
        if let Some(caps) = failed.captures(line.trim()) {
            results.failures.push(TestFailure {
                test: caps[2].to_string(),
                file: Some(caps[1].to_string()),
                message: caps.get(3).map(|m| m.as_str().to_string()).unwrap_or_default(),
            });
        }
    }
    results.settle_total();
    results
}

/// Parses `python -m unittest` output.
pub fn parse_unittest_output(output: &str) -> TestResults {
    static RAN: OnceLock<Regex> = OnceLock::new();
    static OUTCOME: OnceLock<Regex> = OnceLock::new();
    static FAILURE: OnceLock<Regex> = OnceLock::new();
    let ran = RAN.get_or_init(|| Regex::new(r"^Ran (\d+) tests? in ([\d.]+)s").expect("valid ran regex"));
    let outcome = OUTCOME.get_or_init(|| Regex::new(r"(failures|errors|skipped)=(\d+)").expect("valid outcome regex"));
    let failure = FAILURE.get_or_init(|| Regex::new(r"^(?:FAIL|ERROR): (\S+) \((.+)\)").expect("valid failure regex"));

    let mut results = TestResults::default();
    for line in output.lines().map(str::trim) {
        if let Some(caps) = ran.captures(line) {
            results.total = caps[1].parse().unwrap_or(0);
            results.duration_ms = caps[2].parse::<f64>().ok().map(|s| (s * 1000.0).round() as u64);
        } else if line.starts_with("OK") || line.starts_with("FAILED") {
            for caps in outcome.captures_iter(line) {
                let n: u32 = caps[2].parse().unwrap_or(0);
                match &caps[1] {
                    "skipped" => results.skipped += n,
                    _ => results.failed += n,
                }
            }
        } else if let Some(caps) = failure.captures(line) {
            results.failures.push(TestFailure {
                test: caps[1].to_string(),
                file: Some(caps[2].to_string()),
                message: String::new(),
            });
        }
    }
    results.passed = results.total.saturating_sub(results.failed + results.skipped);
    results
}

pub struct PythonPlugin {
    descriptor: PluginDescriptor,
    ctx: PluginContext,
}

impl PythonPlugin {
    pub fn new(ctx: PluginContext) -> Self {
        Self {
            descriptor: PluginDescriptor {
                name: "python",
                extensions: EXTENSIONS,
                config_files: CONFIG_FILES,
                patterns: PatternTable::compile("python", PATTERNS),
            },
            ctx,
        }
    }

    fn interpreter(&self) -> Option<&'static str> {
        self.ctx.runner.first_available(INTERPRETERS)
    }

    async fn syntax_check(&self, root: &Path) -> Vec<ErrorInfo> {
        let Some(python) = self.interpreter() else {
            return Vec::new();
        };
        let files = self.ctx.source_files(root, &["py"]);
        if files.len() > MAX_SYNTAX_CHECKS {
            crate::debug_event!("python", "syntax check capped", "{} of {} files", MAX_SYNTAX_CHECKS, files.len());
        }

        let mut errors = Vec::new();
        for file in files.iter().take(MAX_SYNTAX_CHECKS) {
            let arg = file.to_string_lossy();
            let Some(output) = self
                .ctx
                .try_run(python, &["-c", COMPILE_CHECK, &*arg], root, self.ctx.timeouts.probe)
                .await
            else {
                continue;
            };
            if !output.success {
                errors.extend(parse_compile_check(&relative_display(root, file), &output.stdout));
            }
        }
        errors
    }

    async fn pylint(&self, root: &Path) -> Vec<ErrorInfo> {
        let args = ["--output-format=json", "--recursive=y", "--score=n", "."];
        let Some(output) = self.ctx.try_run("pylint", &args, root, self.ctx.timeouts.lint).await else {
            return Vec::new();
        };
        parse_pylint_json(&output.stdout).unwrap_or_else(|| self.descriptor.patterns.parse(&output.stdout))
    }

    async fn flake8(&self, root: &Path) -> Vec<ErrorInfo> {
        match self.ctx.try_run("flake8", &["."], root, self.ctx.timeouts.lint).await {
            Some(output) => parse_flake8(&output.stdout),
            None => Vec::new(),
        }
    }

    async fn ruff(&self, root: &Path) -> Vec<ErrorInfo> {
        let args = ["check", "--output-format", "json", "--exit-zero", "."];
        let Some(output) = self.ctx.try_run("ruff", &args, root, self.ctx.timeouts.lint).await else {
            return Vec::new();
        };
        parse_ruff_json(root, &output.stdout).unwrap_or_default()
    }

    async fn mypy(&self, root: &Path) -> Vec<ErrorInfo> {
        let args = [".", "--show-column-numbers", "--no-error-summary", "--no-color-output"];
        match self.ctx.try_run("mypy", &args, root, self.ctx.timeouts.typecheck).await {
            Some(output) => parse_mypy(&output.stdout),
            None => Vec::new(),
        }
    }

    /// Flags `from ..pkg import x`: climbing out of the current package fails
    /// whenever the module is run directly.
    fn relative_import_check(&self, root: &Path) -> Vec<ErrorInfo> {
        static PARENT_IMPORT: OnceLock<Regex> = OnceLock::new();
        let re = PARENT_IMPORT
            .get_or_init(|| Regex::new(r"^\s*from\s+\.\.(?:[^.]|$)").expect("valid import regex"));

        let mut errors = Vec::new();
        for file in self.ctx.source_files(root, &["py"]) {
            let Ok(content) = std::fs::read_to_string(&file) else { continue };
            let display = relative_display(root, &file);
            for (idx, line) in content.lines().enumerate() {
                if re.is_match(line) {
                    errors.push(
                        ErrorInfo::new(
                            "python",
                            ErrorKind::Import,
                            Severity::Warning,
                            "Parent-relative import fails when the module is run as a script",
                        )
                        .at(display.clone(), idx as u32 + 1, 1)
                        .with_context(line.trim()),
                    );
                }
            }
        }
        errors
    }

    fn declared_services(&self, root: &Path) -> Vec<DeclaredService> {
        let mut declared = Vec::new();
        if root.join("manage.py").is_file() {
            declared.push(DeclaredService {
                name: "django".to_string(),
                framework: "django",
                port: 8000,
                start_command: Some("python manage.py runserver".to_string()),
                config_file: Some("manage.py".to_string()),
            });
        }

        let mut flask = None;
        let mut fastapi = None;
        for file in self.ctx.source_files(root, &["py"]).into_iter().take(MAX_FRAMEWORK_SCAN) {
            if flask.is_some() && fastapi.is_some() {
                break;
            }
            let Ok(content) = std::fs::read_to_string(&file) else { continue };
            let display = relative_display(root, &file);
            if flask.is_none() && (content.contains("from flask import") || content.contains("import flask")) {
                flask = Some(display.clone());
            }
            if fastapi.is_none() && (content.contains("from fastapi import") || content.contains("import fastapi")) {
                fastapi = Some(display);
            }
        }

        if let Some(file) = flask {
            declared.push(DeclaredService {
                name: "flask".to_string(),
                framework: "flask",
                port: 5000,
                start_command: Some("flask run".to_string()),
                config_file: Some(file),
            });
        }
        if let Some(file) = fastapi {
            let module = file.trim_end_matches(".py").replace('/', ".");
            declared.push(DeclaredService {
                name: "fastapi".to_string(),
                framework: "fastapi",
                port: 8000,
                start_command: Some(format!("uvicorn {module}:app --reload")),
                config_file: Some(file),
            });
        }
        declared
    }
}

#[async_trait]
impl LanguagePlugin for PythonPlugin {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn detect(&self, root: &Path) -> bool {
        detect_with(&self.descriptor, &self.ctx, root)
    }

    async fn analyze_errors(&self, root: &Path) -> Vec<ErrorInfo> {
        let syntax = self.syntax_check(root).await;

        let mut secondary = self.pylint(root).await;
        secondary.extend(self.flake8(root).await);
        secondary.extend(self.ruff(root).await);
        secondary.extend(self.mypy(root).await);
        let secondary = drop_duplicate_syntax(&syntax, secondary);

        let mut errors = syntax;
        errors.extend(secondary);
        errors.extend(scan_logs(root, LOG_GLOBS, &self.descriptor.patterns));
        errors.extend(self.relative_import_check(root));
        errors
    }

    fn dependencies(&self, root: &Path) -> Vec<DependencyInfo> {
        let mut deps = requirements_file(root, "requirements.txt", DependencyKind::Direct);
        deps.extend(requirements_file(root, "requirements-dev.txt", DependencyKind::Dev));
        deps.extend(pyproject_deps(root));
        deps.extend(pipfile_deps(root));
        deps
    }

    async fn find_services(&self, root: &Path) -> Vec<ServiceInfo> {
        collect_services(self.name(), self.declared_services(root), DEFAULT_PORTS).await
    }

    async fn run_linter(&self, root: &Path) -> Vec<ErrorInfo> {
        let mut errors = self.pylint(root).await;
        errors.extend(self.flake8(root).await);
        errors.extend(self.ruff(root).await);
        errors
    }

    async fn run_tests(&self, root: &Path) -> PluginResult<TestResults> {
        if self.ctx.runner.available("pytest") {
            let output = self
                .ctx
                .runner
                .run("pytest", &["-q", "-rfE", "--color=no"], root, self.ctx.timeouts.test)
                .await?;
            return Ok(parse_pytest_output(&output.combined()));
        }

        let python = self.interpreter().ok_or_else(|| PluginError::NoTestRunner {
            language: self.name().to_string(),
        })?;
        let output = self
            .ctx
            .runner
            .run(python, &["-m", "unittest", "discover"], root, self.ctx.timeouts.test)
            .await?;
        Ok(parse_unittest_output(&output.combined()))
    }

    fn parse_build_output(&self, output: &str) -> Vec<ErrorInfo> {
        self.descriptor.patterns.parse(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn plugin() -> PythonPlugin {
        PythonPlugin::new(PluginContext::default())
    }

    #[test]
    fn test_requirement_lines() {
        assert_eq!(parse_requirement("requests==2.31.0"), Some(("requests".into(), "2.31.0".into())));
        assert_eq!(parse_requirement("Django>=4.2,<5"), Some(("Django".into(), ">=4.2,<5".into())));
        assert_eq!(parse_requirement("uvicorn[standard] ~= 0.29"), Some(("uvicorn".into(), "~= 0.29".into())));
        assert_eq!(parse_requirement("numpy"), Some(("numpy".into(), "*".into())));
        assert_eq!(
            parse_requirement("pywin32==306 ; sys_platform == 'win32'"),
            Some(("pywin32".into(), "306".into()))
        );
        assert_eq!(parse_requirement("flask==3.0.0  # web"), Some(("flask".into(), "3.0.0".into())));
        assert_eq!(parse_requirement("# comment"), None);
        assert_eq!(parse_requirement("-r base.txt"), None);
        assert_eq!(parse_requirement("git+https://github.com/x/y.git"), None);
    }

    #[test]
    fn test_requirements_round_trip_once() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("requirements.txt"), "requests==2.31.0\nflask\nrequests==2.31.0\n").unwrap();

        let deps = plugin().dependencies(dir.path());
        let matching: Vec<_> = deps.iter().filter(|d| d.name == "requests").collect();
        assert_eq!(matching.len(), 1);
        assert_eq!(matching[0].version, "2.31.0");
        assert_eq!(matching[0].kind, DependencyKind::Direct);
        assert_eq!(matching[0].source, "requirements.txt");
    }

    #[test]
    fn test_pyproject_pep621_and_poetry() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("pyproject.toml"),
            r#"
[project]
name = "svc"
dependencies = ["httpx>=0.27", "pydantic==2.7.1"]

[project.optional-dependencies]
test = ["pytest"]

[tool.poetry.dependencies]
python = "^3.11"
rich = "^13.0"
sqlalchemy = { version = "^2.0", extras = ["asyncio"] }

[tool.poetry.group.dev.dependencies]
black = "^24.0"
"#,
        )
        .unwrap();

        let deps = plugin().dependencies(dir.path());
        let find = |name: &str| deps.iter().find(|d| d.name == name).cloned();
        assert_eq!(find("httpx").unwrap().version, ">=0.27");
        assert_eq!(find("pydantic").unwrap().version, "2.7.1");
        assert_eq!(find("pytest").unwrap().kind, DependencyKind::Dev);
        assert_eq!(find("rich").unwrap().version, "^13.0");
        assert_eq!(find("sqlalchemy").unwrap().version, "^2.0");
        assert_eq!(find("black").unwrap().kind, DependencyKind::Dev);
        assert!(find("python").is_none());
    }

    #[test]
    fn test_pipfile() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("Pipfile"),
            "[packages]\nrequests = \"==2.32.0\"\nflask = \"*\"\n\n[dev-packages]\npytest = {version = \">=8\"}\n",
        )
        .unwrap();
        let deps = plugin().dependencies(dir.path());
        assert_eq!(deps.len(), 3);
        assert_eq!(deps[0].version, "2.32.0");
        assert_eq!(deps[2].kind, DependencyKind::Dev);
        assert_eq!(deps[2].version, ">=8");
    }

    #[test]
    fn test_compile_check_report() {
        let e = parse_compile_check("pkg/bad.py", "3:9:SyntaxError:'(' was never closed\n").unwrap();
        assert_eq!(e.file, "pkg/bad.py");
        assert_eq!((e.line, e.column), (3, 9));
        assert_eq!(e.kind, ErrorKind::Syntax);
        assert_eq!(e.severity, Severity::Error);
        assert_eq!(e.code.as_deref(), Some("SyntaxError"));
        assert!(parse_compile_check("x.py", "").is_none());
    }

    #[test]
    fn test_build_output_position_from_message() {
        let errors = plugin().parse_build_output(
            "Sorry: IndentationError: unexpected indent (app/views.py, line 2)\n\
             SyntaxError: invalid syntax\n",
        );
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].file, "app/views.py");
        assert_eq!(errors[0].line, 2);
        assert_eq!(errors[0].kind, ErrorKind::Syntax);
        assert!(errors[0].message.starts_with("IndentationError"));
        // No position in the line, none invented
        assert_eq!((errors[1].file.as_str(), errors[1].line), ("", 0));
    }

    #[test]
    fn test_pylint_json() {
        let output = r#"[{"type":"error","module":"app","obj":"","line":1,"column":0,"endLine":null,"endColumn":null,"path":"app.py","symbol":"import-error","message":"Unable to import 'foo'","message-id":"E0401"},
{"type":"convention","module":"app","obj":"","line":2,"column":4,"path":"app.py","symbol":"invalid-name","message":"bad name","message-id":"C0103"}]"#;
        let errors = parse_pylint_json(output).unwrap();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].kind, ErrorKind::Import);
        assert_eq!(errors[0].severity, Severity::Error);
        assert_eq!(errors[0].column, 1);
        assert_eq!(errors[1].severity, Severity::Info);
        assert_eq!(errors[1].code.as_deref(), Some("C0103 (invalid-name)"));
    }

    #[test]
    fn test_flake8_lines() {
        let errors = parse_flake8("./app.py:1:1: F401 'os' imported but unused\n./app.py:7:80: E501 line too long (88 > 79 characters)\nbad.py:1:7: E999 SyntaxError: invalid syntax\n");
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[0].file, "app.py");
        assert_eq!(errors[0].kind, ErrorKind::Import);
        assert_eq!(errors[1].kind, ErrorKind::Lint);
        assert_eq!(errors[1].severity, Severity::Warning);
        assert_eq!(errors[2].kind, ErrorKind::Syntax);
    }

    #[test]
    fn test_ruff_json() {
        let output = r#"[{"code":"F821","message":"Undefined name `x`","filename":"/w/a.py","location":{"row":4,"column":5},"end_location":{"row":4,"column":6},"fix":null,"noqa_row":4,"url":null},
{"code":null,"message":"SyntaxError: Expected ')'","filename":"/w/b.py","location":{"row":1,"column":7}}]"#;
        let errors = parse_ruff_json(Path::new("/w"), output).unwrap();
        assert_eq!(errors[0].file, "a.py");
        assert_eq!(errors[0].severity, Severity::Error);
        assert_eq!(errors[1].kind, ErrorKind::Syntax);
    }

    #[test]
    fn test_mypy_lines() {
        let errors = parse_mypy("app.py:10:5: error: Incompatible return value type (got \"str\", expected \"int\")  [return-value]\napp.py:2: error: Cannot find implementation or library stub for module named \"foo\"  [import-not-found]\napp.py:3: note: See docs\n");
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[0].kind, ErrorKind::Type);
        assert_eq!(errors[0].column, 5);
        assert_eq!(errors[0].code.as_deref(), Some("return-value"));
        assert_eq!(errors[1].kind, ErrorKind::Import);
        assert_eq!(errors[2].severity, Severity::Info);
    }

    #[test]
    fn test_pytest_summary() {
        let output = "\
..F.s
FAILED tests/test_math.py::test_div - ZeroDivisionError: division by zero
1 failed, 3 passed, 1 skipped in 0.12s
";
        let r = parse_pytest_output(output);
        assert_eq!((r.total, r.passed, r.failed, r.skipped), (5, 3, 1, 1));
        assert_eq!(r.duration_ms, Some(120));
        assert_eq!(r.failures.len(), 1);
        assert_eq!(r.failures[0].file.as_deref(), Some("tests/test_math.py"));
        assert_eq!(r.failures[0].test, "test_div");
    }

    #[test]
    fn test_unittest_summary() {
        let output = "\
FAIL: test_b (test_mod.T.test_b)
----------------------------------------------------------------------
Ran 6 tests in 0.004s

FAILED (failures=1, errors=1, skipped=2)
";
        let r = parse_unittest_output(output);
        assert_eq!((r.total, r.passed, r.failed, r.skipped), (6, 2, 2, 2));
        assert_eq!(r.failures[0].test, "test_b");
    }

    #[test]
    fn test_relative_import_check() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("mod.py"),
            "from ..core import x\nfrom ...deep import y\nfrom . import z\nfrom .. import w\n",
        )
        .unwrap();
        let errors = plugin().relative_import_check(dir.path());
        let lines: Vec<u32> = errors.iter().map(|e| e.line).collect();
        assert_eq!(lines, vec![1, 4]);
        assert!(errors.iter().all(|e| e.kind == ErrorKind::Import));
    }

    #[test]
    fn test_framework_services_declared() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("manage.py"), "import django\n").unwrap();
        fs::create_dir_all(dir.path().join("api")).unwrap();
        fs::write(dir.path().join("api/main.py"), "from fastapi import FastAPI\napp = FastAPI()\n").unwrap();

        let declared = plugin().declared_services(dir.path());
        let frameworks: Vec<&str> = declared.iter().map(|s| s.framework).collect();
        assert_eq!(frameworks, vec!["django", "fastapi"]);
        assert_eq!(declared[1].start_command.as_deref(), Some("uvicorn api.main:app --reload"));
    }
}
