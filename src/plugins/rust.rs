//! Rust plugin.
//!
//! Diagnostics come from cargo's `--message-format=json` stream; the rendered
//! text form is parsed as a fallback so pasted build logs still normalize.

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

pub const EXTENSIONS: &[&str] = &["rs"];
const CONFIG_FILES: &[&str] = &["Cargo.toml", "Cargo.lock", "rust-toolchain.toml"];
pub const DEFAULT_PORTS: &[u16] = &[8080, 3000, 8000];

const FRAMEWORKS: &[(&str, u16)] = &[("axum", 3000), ("actix-web", 8080), ("rocket", 8000), ("warp", 3030)];

const PATTERNS: &[PatternSpec] = &[
    PatternSpec::new(
        r"^thread '.+' panicked at (?P<file>[^\s:]+\.rs):(?P<line>\d+):(?P<col>\d+):?(?P<msg>.*)$",
        ErrorKind::Runtime,
        Severity::Error,
    ),
    PatternSpec::new(r"^error(?:\[(?P<code>E\d+)\])?: (?P<msg>.+)$", ErrorKind::Build, Severity::Error),
    PatternSpec::new(r"^warning: (?P<msg>.+)$", ErrorKind::Lint, Severity::Warning),
];

#[derive(Debug, Deserialize)]
struct CargoMessage {
    reason: String,
    #[serde(default)]
    message: Option<Diagnostic>,
}

#[derive(Debug, Deserialize)]
struct Diagnostic {
    message: String,
    code: Option<DiagnosticCode>,
    level: String,
    #[serde(default)]
    spans: Vec<DiagnosticSpan>,
}

#[derive(Debug, Deserialize)]
struct DiagnosticCode {
    code: String,
}

#[derive(Debug, Deserialize)]
struct DiagnosticSpan {
    file_name: String,
    line_start: u32,
    column_start: u32,
    is_primary: bool,
    #[serde(default)]
    label: Option<String>,
}

/// Kind and severity for a rustc diagnostic level and code.
fn classify(level: &str, code: Option<&str>) -> Option<(ErrorKind, Severity)> {
    match level {
        "error" => Some(match code {
            Some("E0432" | "E0433") => (ErrorKind::Import, Severity::Error),
            Some(c) if c.starts_with('E') => (ErrorKind::Type, Severity::Error),
            _ => (ErrorKind::Build, Severity::Error),
        }),
        "warning" => Some((ErrorKind::Lint, Severity::Warning)),
        _ => None,
    }
}

/// Parses cargo's JSON message stream. Returns `None` when the text carries no
/// JSON messages at all.
pub fn parse_cargo_json(output: &str, source: &str) -> Option<Vec<ErrorInfo>> {
    let mut saw_json = false;
    let mut errors = Vec::new();

    for line in output.lines().filter(|l| l.starts_with('{')) {
        let Ok(msg) = serde_json::from_str::<CargoMessage>(line) else { continue };
        saw_json = true;
        if msg.reason != "compiler-message" {
            continue;
        }
        let Some(diag) = msg.message else { continue };
        let code = diag.code.map(|c| c.code);
        let Some((kind, severity)) = classify(&diag.level, code.as_deref()) else { continue };
        let Some(span) = diag.spans.into_iter().find(|s| s.is_primary) else { continue };

        let mut info = ErrorInfo::new(source, kind, severity, diag.message).at(
            span.file_name.replace('\\', "/"),
            span.line_start,
            span.column_start,
        );
        if let Some(code) = code {
            info = info.with_code(code);
        }
        if let Some(label) = span.label.filter(|l| !l.is_empty()) {
            info = info.with_context(label);
        }
        errors.push(info);
    }

    saw_json.then_some(errors)
}

/// Parses rustc's human-readable diagnostics: a header line followed by a
/// `--> file:line:col` location line.
pub fn parse_rendered_diagnostics(output: &str, source: &str) -> Vec<ErrorInfo> {
    static HEADER: OnceLock<Regex> = OnceLock::new();
    static LOCATION: OnceLock<Regex> = OnceLock::new();
    let header = HEADER.get_or_init(|| {
        Regex::new(r"^(error|warning)(?:\[(E\d+|[a-z_:]+)\])?: (.+)$").expect("valid header regex")
    });
    let location = LOCATION.get_or_init(|| Regex::new(r"^\s*--> (.+?):(\d+):(\d+)$").expect("valid location regex"));

    let mut errors = Vec::new();
    let mut pending: Option<(String, Option<String>, String)> = None;

    for line in output.lines() {
        if let Some(caps) = header.captures(line) {
            pending = Some((caps[1].to_string(), caps.get(2).map(|m| m.as_str().to_string()), caps[3].to_string()));
        } else if let Some(caps) = location.captures(line) {
            let Some((level, code, message)) = pending.take() else { continue };
            let rustc_code = code.as_deref().filter(|c| c.starts_with('E'));
            let Some((kind, severity)) = classify(&level, rustc_code) else { continue };
            let mut info = ErrorInfo::new(source, kind, severity, message).at(
                caps[1].replace('\\', "/"),
                caps[2].parse().unwrap_or(0),
                caps[3].parse().unwrap_or(0),
            );
            if let Some(code) = code {
                info = info.with_code(code);
            }
            errors.push(info);
        }
    }
    errors
}

/// Sums cargo's per-binary `test result:` lines.
pub fn parse_cargo_test_output(output: &str) -> TestResults {
    static SUMMARY: OnceLock<Regex> = OnceLock::new();
    static FAILED: OnceLock<Regex> = OnceLock::new();
    let summary = SUMMARY.get_or_init(|| {
        Regex::new(r"test result: \w+\. (\d+) passed; (\d+) failed; (\d+) ignored;.*?finished in ([\d.]+)s")
            .expect("valid summary regex")
    });
    let failed = FAILED.get_or_init(|| Regex::new(r"^test (\S+) \.\.\. FAILED$").expect("valid failure regex"));

    let mut results = TestResults::default();
    let mut secs = 0.0_f64;
    let mut timed = false;
    for line in output.lines().map(str::trim) {
        if let Some(caps) = summary.captures(line) {
            results.passed += caps[1].parse::<u32>().unwrap_or(0);
            results.failed += caps[2].parse::<u32>().unwrap_or(0);
            results.skipped += caps[3].parse::<u32>().unwrap_or(0);
            secs += caps[4].parse::<f64>().unwrap_or(0.0);
            timed = true;
        } else if let Some(caps) = failed.captures(line) {
            results.failures.push(TestFailure {
                test: caps[1].to_string(),
                file: None,
                message: String::new(),
            });
        }
    }
    if timed {
        results.duration_ms = Some((secs * 1000.0).round() as u64);
    }
    results.settle_total();
    results
}

fn dependency_version(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        toml::Value::Table(t) => {
            if let Some(v) = t.get("version").and_then(|v| v.as_str()) {
                v.to_string()
            } else if t.get("workspace").and_then(|v| v.as_bool()) == Some(true) {
                "workspace".to_string()
            } else if t.contains_key("git") {
                "git".to_string()
            } else if t.contains_key("path") {
                "path".to_string()
            } else {
                "*".to_string()
            }
        }
        _ => "*".to_string(),
    }
}

fn dependency_table(table: Option<&toml::Value>, kind: DependencyKind) -> Vec<DependencyInfo> {
    table
        .and_then(|t| t.as_table())
        .map(|t| {
            t.iter()
                .map(|(name, value)| DependencyInfo::new(name, dependency_version(value), kind, "Cargo.toml"))
                .collect()
        })
        .unwrap_or_default()
}

/// Dependencies of a `Cargo.toml` document.
pub fn parse_cargo_manifest(doc: &toml::Value) -> Vec<DependencyInfo> {
    let mut deps = Vec::new();
    if let Some(version) = doc
        .get("package")
        .and_then(|p| p.get("rust-version"))
        .and_then(|v| v.as_str())
    {
        deps.push(DependencyInfo::new("rustc", version, DependencyKind::Compiler, "Cargo.toml"));
    }

    deps.extend(dependency_table(doc.get("dependencies"), DependencyKind::Direct));
    deps.extend(dependency_table(doc.get("dev-dependencies"), DependencyKind::Dev));
    deps.extend(dependency_table(doc.get("build-dependencies"), DependencyKind::Dev));
    if let Some(targets) = doc.get("target").and_then(|t| t.as_table()) {
        for target in targets.values() {
            deps.extend(dependency_table(target.get("dependencies"), DependencyKind::Direct));
            deps.extend(dependency_table(target.get("dev-dependencies"), DependencyKind::Dev));
        }
    }
    deps.extend(dependency_table(
        doc.get("workspace").and_then(|w| w.get("dependencies")),
        DependencyKind::Direct,
    ));
    dedupe_by_name(deps)
}

fn read_manifest(root: &Path) -> Option<toml::Value> {
    let content = std::fs::read_to_string(root.join("Cargo.toml")).ok()?;
    match toml::from_str(&content) {
        Ok(doc) => Some(doc),
        Err(e) => {
            tracing::warn!("[rust] malformed Cargo.toml: {e}");
            None
        }
    }
}

pub struct RustPlugin {
    descriptor: PluginDescriptor,
    ctx: PluginContext,
}

impl RustPlugin {
    pub fn new(ctx: PluginContext) -> Self {
        Self {
            descriptor: PluginDescriptor {
                name: "rust",
                extensions: EXTENSIONS,
                config_files: CONFIG_FILES,
                patterns: PatternTable::compile("rust", PATTERNS),
            },
            ctx,
        }
    }

    async fn cargo_json(&self, root: &Path, subcommand: &str, source: &str) -> Vec<ErrorInfo> {
        let args = [subcommand, "--message-format=json", "--quiet"];
        let Some(output) = self.ctx.try_run("cargo", &args, root, self.ctx.timeouts.build).await else {
            return Vec::new();
        };
        parse_cargo_json(&output.stdout, source)
            .unwrap_or_else(|| parse_rendered_diagnostics(&output.stderr, source))
    }

    fn declared_services(&self, root: &Path) -> Vec<DeclaredService> {
        let Some(doc) = read_manifest(root) else {
            return Vec::new();
        };
        let package = doc
            .get("package")
            .and_then(|p| p.get("name"))
            .and_then(|n| n.as_str())
            .map(str::to_string);
        let deps = parse_cargo_manifest(&doc);

        FRAMEWORKS
            .iter()
            .filter(|(framework, _)| deps.iter().any(|d| d.name == *framework && d.kind == DependencyKind::Direct))
            .map(|&(framework, port)| DeclaredService {
                name: package.clone().unwrap_or_else(|| framework.to_string()),
                framework,
                port,
                start_command: Some("cargo run".to_string()),
                config_file: Some("Cargo.toml".to_string()),
            })
            .collect()
    }
}

#[async_trait]
impl LanguagePlugin for RustPlugin {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn detect(&self, root: &Path) -> bool {
        detect_with(&self.descriptor, &self.ctx, root)
    }

    async fn analyze_errors(&self, root: &Path) -> Vec<ErrorInfo> {
        let mut errors = Vec::new();
        if root.join("Cargo.toml").is_file() {
            errors.extend(self.cargo_json(root, "check", "cargo").await);
        }
        errors.extend(scan_logs(root, LOG_GLOBS, &self.descriptor.patterns));
        errors
    }

    fn dependencies(&self, root: &Path) -> Vec<DependencyInfo> {
        read_manifest(root).map(|doc| parse_cargo_manifest(&doc)).unwrap_or_default()
    }

    async fn find_services(&self, root: &Path) -> Vec<ServiceInfo> {
        collect_services(self.name(), self.declared_services(root), DEFAULT_PORTS).await
    }

    async fn run_linter(&self, root: &Path) -> Vec<ErrorInfo> {
        if !root.join("Cargo.toml").is_file() {
            return Vec::new();
        }
        self.cargo_json(root, "clippy", "clippy").await
    }

    async fn run_tests(&self, root: &Path) -> PluginResult<TestResults> {
        if !root.join("Cargo.toml").is_file() {
            return Err(PluginError::ManifestMissing {
                language: self.name().to_string(),
                manifest: "Cargo.toml".to_string(),
            });
        }
        let output = self
            .ctx
            .runner
            .run("cargo", &["test", "--color", "never"], root, self.ctx.timeouts.test)
            .await?;
        Ok(parse_cargo_test_output(&output.combined()))
    }

    fn parse_build_output(&self, output: &str) -> Vec<ErrorInfo> {
        if let Some(errors) = parse_cargo_json(output, "cargo") {
            return errors;
        }
        let errors = parse_rendered_diagnostics(output, "cargo");
        if errors.is_empty() {
            self.descriptor.patterns.parse(output)
        } else {
            errors
        }
    }
}
