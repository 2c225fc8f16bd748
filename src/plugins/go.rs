//! Go plugin.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::path::Path;
use std::sync::OnceLock;

use super::logs::{LOG_GLOBS, scan_logs};
use super::patterns::{PatternSpec, PatternTable};
use super::services::{DeclaredService, collect_services};
use super::{LanguagePlugin, PluginContext, PluginDescriptor, PluginError, PluginResult, dedupe_by_name, detect_with};
use crate::types::{
    DependencyInfo, DependencyKind, ErrorInfo, ErrorKind, ServiceInfo, Severity, TestFailure, TestResults,
};
use crate::walker::relative_display;

pub const EXTENSIONS: &[&str] = &["go"];
const CONFIG_FILES: &[&str] = &["go.mod", "go.sum", "go.work"];
pub const DEFAULT_PORTS: &[u16] = &[8080, 8000, 3000, 9000];

const FRAMEWORKS: &[(&str, &str, u16)] = &[
    ("github.com/gin-gonic/gin", "gin", 8080),
    ("github.com/gofiber/fiber", "fiber", 3000),
    ("github.com/labstack/echo", "echo", 1323),
    ("net/http", "net/http", 8080),
];

const MAX_FRAMEWORK_SCAN: usize = 200;

const PATTERNS: &[PatternSpec] = &[
    PatternSpec::new(
        r"^(?:\./)?(?P<file>[^\s:]+\.go):(?P<line>\d+):(?:(?P<col>\d+):)? (?P<msg>.+)$",
        ErrorKind::Build,
        Severity::Error,
    ),
    PatternSpec::new(r"^panic: (?P<msg>.+)$", ErrorKind::Runtime, Severity::Error),
    PatternSpec::new(r"^fatal error: (?P<msg>.+)$", ErrorKind::Runtime, Severity::Error),
];

/// Picks a kind from the compiler's wording.
fn classify_message(message: &str, fallback: ErrorKind) -> ErrorKind {
    if message.contains("syntax error") {
        ErrorKind::Syntax
    } else if message.contains("imported and not used")
        || message.contains("could not import")
        || message.contains("no required module provides package")
        || message.contains("cannot find package")
        || message.contains("is not in std")
    {
        ErrorKind::Import
    } else if message.starts_with("undefined:")
        || message.starts_with("cannot use")
        || message.contains("mismatched types")
        || message.contains("declared and not used")
        || message.contains("too many arguments")
        || message.contains("not enough arguments")
    {
        ErrorKind::Type
    } else {
        fallback
    }
}

/// Parses `go build` / `go vet` diagnostics.
pub fn parse_go_diagnostics(output: &str, source: &str, fallback: ErrorKind, severity: Severity) -> Vec<ErrorInfo> {
    static LINE: OnceLock<Regex> = OnceLock::new();
    let re = LINE.get_or_init(|| {
        Regex::new(r"^(?P<file>[^\s:]+\.go):(?P<line>\d+):(?:(?P<col>\d+):)? (?P<msg>.+)$").expect("valid go regex")
    });

    output
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            let line = line.strip_prefix("vet: ").unwrap_or(line);
            let line = line.strip_prefix("./").unwrap_or(line);
            let caps = re.captures(line)?;
            let message = caps["msg"].trim();
            Some(
                ErrorInfo::new(source, classify_message(message, fallback), severity, message).at(
                    &caps["file"],
                    caps["line"].parse().unwrap_or(0),
                    caps.name("col").and_then(|m| m.as_str().parse().ok()).unwrap_or(0),
                ),
            )
        })
        .collect()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GolangciReport {
    #[serde(default)]
    issues: Option<Vec<GolangciIssue>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GolangciIssue {
    from_linter: String,
    text: String,
    #[serde(default)]
    severity: String,
    pos: GolangciPos,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GolangciPos {
    filename: String,
    line: u32,
    #[serde(default)]
    column: u32,
}

/// Parses `golangci-lint run --out-format json`.
pub fn parse_golangci_json(output: &str) -> Option<Vec<ErrorInfo>> {
    let start = output.find('{')?;
    let report: GolangciReport = serde_json::from_str(output[start..].lines().next()?).ok()?;
    Some(
        report
            .issues
            .unwrap_or_default()
            .into_iter()
            .map(|issue| {
                let severity = if issue.severity.is_empty() {
                    Severity::Warning
                } else {
                    Severity::from_label(&issue.severity)
                };
                let kind = match issue.from_linter.as_str() {
                    "typecheck" => classify_message(&issue.text, ErrorKind::Type),
                    _ => ErrorKind::Lint,
                };
                ErrorInfo::new("golangci-lint", kind, severity, issue.text)
                    .at(issue.pos.filename, issue.pos.line, issue.pos.column)
                    .with_code(issue.from_linter)
            })
            .collect(),
    )
}

/// Reads `require` lines and blocks plus the `go` directive.
pub fn parse_go_mod(content: &str) -> Vec<DependencyInfo> {
    const SOURCE: &str = "go.mod";
    let mut deps = Vec::new();
    let mut in_require = false;

    for raw in content.lines() {
        let line = raw.split("//").next().unwrap_or(raw).trim();
        if line.is_empty() {
            continue;
        }
        if in_require {
            if line == ")" {
                in_require = false;
            } else if let Some(dep) = require_entry(line) {
                deps.push(dep);
            }
            continue;
        }
        if line == "require (" || line == "require(" {
            in_require = true;
        } else if let Some(rest) = line.strip_prefix("require ") {
            deps.extend(require_entry(rest.trim()));
        } else if let Some(version) = line.strip_prefix("go ") {
            deps.push(DependencyInfo::new("go", version.trim(), DependencyKind::Compiler, SOURCE));
        }
    }

    fn require_entry(line: &str) -> Option<DependencyInfo> {
        let mut parts = line.split_whitespace();
        let name = parts.next()?;
        let version = parts.next()?;
        Some(DependencyInfo::new(name, version, DependencyKind::Direct, SOURCE))
    }

    dedupe_by_name(deps)
}

/// Counts `--- PASS/FAIL/SKIP` lines of `go test -v`.
pub fn parse_go_test_output(output: &str) -> TestResults {
    static RESULT: OnceLock<Regex> = OnceLock::new();
    static PACKAGE: OnceLock<Regex> = OnceLock::new();
    let result = RESULT.get_or_init(|| {
        Regex::new(r"^\s*--- (PASS|FAIL|SKIP): (\S+) \(([\d.]+)s\)").expect("valid go test regex")
    });
    let package = PACKAGE.get_or_init(|| {
        Regex::new(r"^(?:ok|FAIL)\s+\S+\s+([\d.]+)s").expect("valid go package regex")
    });

    let mut results = TestResults::default();
    let mut total_secs = 0.0_f64;
    let mut timed = false;
    let mut last_output: Vec<&str> = Vec::new();

    for line in output.lines() {
        if let Some(caps) = result.captures(line) {
            match &caps[1] {
                "PASS" => results.passed += 1,
                "SKIP" => results.skipped += 1,
                _ => {
                    results.failed += 1;
                    results.failures.push(TestFailure {
                        test: caps[2].to_string(),
                        file: None,
                        message: last_output.join("\n"),
                    });
                }
            }
            last_output.clear();
        } else if let Some(caps) = package.captures(line) {
            total_secs += caps[1].parse::<f64>().unwrap_or(0.0);
            timed = true;
        } else if line.starts_with("=== RUN") {
            last_output.clear();
        } else if line.starts_with("    ") && !line.trim().is_empty() {
            last_output.push(line.trim());
        }
    }
    if timed {
        results.duration_ms = Some((total_secs * 1000.0).round() as u64);
    }
    results.settle_total();
    results
}

pub struct GoPlugin {
    descriptor: PluginDescriptor,
    ctx: PluginContext,
}

impl GoPlugin {
    pub fn new(ctx: PluginContext) -> Self {
        Self {
            descriptor: PluginDescriptor {
                name: "go",
                extensions: EXTENSIONS,
                config_files: CONFIG_FILES,
                patterns: PatternTable::compile("go", PATTERNS),
            },
            ctx,
        }
    }

    async fn build(&self, root: &Path) -> Vec<ErrorInfo> {
        match self.ctx.try_run("go", &["build", "./..."], root, self.ctx.timeouts.build).await {
            Some(output) if !output.success => {
                parse_go_diagnostics(&output.stderr, "go build", ErrorKind::Build, Severity::Error)
            }
            _ => Vec::new(),
        }
    }

    async fn vet(&self, root: &Path) -> Vec<ErrorInfo> {
        match self.ctx.try_run("go", &["vet", "./..."], root, self.ctx.timeouts.lint).await {
            Some(output) if !output.success => {
                parse_go_diagnostics(&output.stderr, "go vet", ErrorKind::Lint, Severity::Warning)
            }
            _ => Vec::new(),
        }
    }

    async fn golangci(&self, root: &Path) -> Vec<ErrorInfo> {
        let args = ["run", "--out-format", "json", "./..."];
        let Some(output) = self.ctx.try_run("golangci-lint", &args, root, self.ctx.timeouts.lint).await else {
            return Vec::new();
        };
        parse_golangci_json(&output.stdout).unwrap_or_default()
    }

    fn declared_services(&self, root: &Path) -> Vec<DeclaredService> {
        static PORT: OnceLock<Regex> = OnceLock::new();
        let port_re = PORT.get_or_init(|| Regex::new(r#"":(\d{2,5})""#).expect("valid port regex"));

        let mut declared: Vec<DeclaredService> = Vec::new();
        let files = self.ctx.source_files(root, EXTENSIONS);
        for file in files.into_iter().take(MAX_FRAMEWORK_SCAN) {
            let Ok(content) = std::fs::read_to_string(&file) else { continue };
            if !content.contains("package main") {
                continue;
            }
            let Some(&(_, framework, default_port)) = FRAMEWORKS
                .iter()
                .find(|(import, _, _)| content.contains(&format!("\"{import}")))
            else {
                continue;
            };
            if declared.iter().any(|s| s.framework == framework) {
                continue;
            }
            let port = port_re
                .captures(&content)
                .and_then(|caps| caps[1].parse().ok())
                .unwrap_or(default_port);
            let display = relative_display(root, &file);
            let dir = Path::new(&display)
                .parent()
                .map(|p| p.to_string_lossy().into_owned())
                .filter(|p| !p.is_empty());
            declared.push(DeclaredService {
                name: dir.clone().unwrap_or_else(|| framework.to_string()),
                framework,
                port,
                start_command: Some(match dir {
                    Some(dir) => format!("go run ./{dir}"),
                    None => "go run .".to_string(),
                }),
                config_file: Some(display),
            });
        }
        declared
    }
}

#[async_trait]
impl LanguagePlugin for GoPlugin {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn detect(&self, root: &Path) -> bool {
        detect_with(&self.descriptor, &self.ctx, root)
    }

    async fn analyze_errors(&self, root: &Path) -> Vec<ErrorInfo> {
        let mut errors = Vec::new();
        if root.join("go.mod").is_file() {
            errors.extend(self.build(root).await);
            errors.extend(self.vet(root).await);
            errors.extend(self.golangci(root).await);
        }
        errors.extend(scan_logs(root, LOG_GLOBS, &self.descriptor.patterns));
        errors
    }

    fn dependencies(&self, root: &Path) -> Vec<DependencyInfo> {
        std::fs::read_to_string(root.join("go.mod"))
            .map(|content| parse_go_mod(&content))
            .unwrap_or_default()
    }

    async fn find_services(&self, root: &Path) -> Vec<ServiceInfo> {
        collect_services(self.name(), self.declared_services(root), DEFAULT_PORTS).await
    }

    async fn run_linter(&self, root: &Path) -> Vec<ErrorInfo> {
        let mut errors = self.vet(root).await;
        errors.extend(self.golangci(root).await);
        errors
    }

    async fn run_tests(&self, root: &Path) -> PluginResult<TestResults> {
        if !root.join("go.mod").is_file() {
            return Err(PluginError::ManifestMissing {
                language: self.name().to_string(),
                manifest: "go.mod".to_string(),
            });
        }
        let output = self
            .ctx
            .runner
            .run("go", &["test", "./...", "-v"], root, self.ctx.timeouts.test)
            .await?;
        Ok(parse_go_test_output(&output.combined()))
    }

    fn parse_build_output(&self, output: &str) -> Vec<ErrorInfo> {
        let errors = parse_go_diagnostics(output, "go", ErrorKind::Build, Severity::Error);
        if errors.is_empty() {
            self.descriptor.patterns.parse(output)
        } else {
            errors
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_build_output_kinds() {
        let output = "\
# example.com/app
./main.go:5:2: \"os\" imported and not used
./main.go:9:13: undefined: Foo
./util/parse.go:3:1: syntax error: non-declaration statement outside function body
";
        let errors = parse_go_diagnostics(output, "go build", ErrorKind::Build, Severity::Error);
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[0].file, "main.go");
        assert_eq!(errors[0].kind, ErrorKind::Import);
        assert_eq!((errors[1].line, errors[1].column), (9, 13));
        assert_eq!(errors[1].kind, ErrorKind::Type);
        assert_eq!(errors[2].file, "util/parse.go");
        assert_eq!(errors[2].kind, ErrorKind::Syntax);
    }

    #[test]
    fn test_vet_prefix() {
        let errors = parse_go_diagnostics(
            "vet: ./main.go:12:2: fmt.Printf format %d has arg s of wrong type string\n",
            "go vet",
            ErrorKind::Lint,
            Severity::Warning,
        );
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].file, "main.go");
        assert_eq!(errors[0].kind, ErrorKind::Lint);
    }

    #[test]
    fn test_golangci_json() {
        let output = r#"{"Issues":[{"FromLinter":"errcheck","Text":"Error return value is not checked","Severity":"","Pos":{"Filename":"main.go","Offset":10,"Line":14,"Column":12}}],"Report":{}}"#;
        let errors = parse_golangci_json(output).unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code.as_deref(), Some("errcheck"));
        assert_eq!(errors[0].severity, Severity::Warning);
        assert_eq!(parse_golangci_json(r#"{"Issues":null}"#).unwrap().len(), 0);
    }

    #[test]
    fn test_go_mod_requires() {
        let content = "\
module example.com/app

go 1.22

require github.com/gin-gonic/gin v1.9.1

require (
\tgithub.com/stretchr/testify v1.8.4 // indirect
\tgolang.org/x/sync v0.7.0
)
";
        let deps = parse_go_mod(content);
        let names: Vec<&str> = deps.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["go", "github.com/gin-gonic/gin", "github.com/stretchr/testify", "golang.org/x/sync"]);
        assert_eq!(deps[0].kind, DependencyKind::Compiler);
        assert_eq!(deps[0].version, "1.22");
        assert_eq!(deps[2].version, "v1.8.4");
    }

    #[test]
    fn test_go_test_counts() {
        let output = "\
=== RUN   TestAdd
--- PASS: TestAdd (0.00s)
=== RUN   TestDiv
    math_test.go:14: expected 2, got 0
--- FAIL: TestDiv (0.00s)
=== RUN   TestSlow
--- SKIP: TestSlow (0.00s)
FAIL
FAIL\texample.com/app\t0.012s
";
        let r = parse_go_test_output(output);
        assert_eq!((r.total, r.passed, r.failed, r.skipped), (3, 1, 1, 1));
        assert_eq!(r.failures[0].test, "TestDiv");
        assert!(r.failures[0].message.contains("expected 2"));
        assert_eq!(r.duration_ms, Some(12));
    }

    #[test]
    fn test_gin_service_declared() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("cmd/api")).unwrap();
        fs::write(
            dir.path().join("cmd/api/main.go"),
            "package main\n\nimport \"github.com/gin-gonic/gin\"\n\nfunc main() { gin.Default().Run(\":9090\") }\n",
        )
        .unwrap();

        let plugin = GoPlugin::new(PluginContext::default());
        let declared = plugin.declared_services(dir.path());
        assert_eq!(declared.len(), 1);
        assert_eq!(declared[0].framework, "gin");
        assert_eq!(declared[0].port, 9090);
        assert_eq!(declared[0].start_command.as_deref(), Some("go run ./cmd/api"));
    }

    #[tokio::test]
    async fn test_tests_need_go_mod() {
        let dir = TempDir::new().unwrap();
        let plugin = GoPlugin::new(PluginContext::default());
        let err = plugin.run_tests(dir.path()).await.unwrap_err();
        assert!(matches!(err, PluginError::ManifestMissing { .. }));
    }
}
