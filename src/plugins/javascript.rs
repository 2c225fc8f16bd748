//! JavaScript / Node.js plugin.

use async_trait::async_trait;
use indexmap::IndexMap;
use regex::Regex;
use serde::Deserialize;
use std::path::Path;
use std::sync::OnceLock;

use super::logs::{LOG_GLOBS, scan_logs};
use super::patterns::{PatternSpec, PatternTable};
use super::services::{DeclaredService, collect_services};
use super::{
    LanguagePlugin, PluginContext, PluginDescriptor, PluginError, PluginResult, dedupe_by_name,
    detect_with,
};
use crate::types::{
    DependencyInfo, DependencyKind, ErrorInfo, ErrorKind, ServiceInfo, Severity, TestFailure,
    TestResults,
};
use crate::walker::{has_extension, relative_display};

pub const EXTENSIONS: &[&str] = &["js", "jsx", "mjs", "cjs"];
const CONFIG_FILES: &[&str] = &["package.json", "jsconfig.json", ".eslintrc.json", ".eslintrc.js"];
pub const DEFAULT_PORTS: &[u16] = &[3000, 3001, 8080, 8000, 9000, 5000, 4200];

const ESLINT_CONFIGS: &[&str] = &[
    ".eslintrc",
    ".eslintrc.js",
    ".eslintrc.cjs",
    ".eslintrc.json",
    ".eslintrc.yml",
    ".eslintrc.yaml",
    "eslint.config.js",
    "eslint.config.mjs",
    "eslint.config.cjs",
    "eslint.config.ts",
];

/// Framework marker dependency, framework name, conventional dev port.
/// Earlier entries win: a Next.js app also depends on react.
const FRAMEWORKS: &[(&str, &str, u16)] = &[
    ("next", "next", 3000),
    ("@angular/core", "angular", 4200),
    ("vue", "vue", 8080),
    ("react", "react", 3000),
    ("express", "express", 3000),
];

/// Files checked with `node --check` per analysis pass.
const MAX_SYNTAX_CHECKS: usize = 200;

const PATTERNS: &[PatternSpec] = &[
    PatternSpec::new(r"^(?:Uncaught )?SyntaxError: (?P<msg>.+)$", ErrorKind::Syntax, Severity::Error),
    PatternSpec::new(
        r"^(?:ERROR in )?(?:Module not found|Cannot find module)(?:: )?(?P<msg>.+)$",
        ErrorKind::Import,
        Severity::Error,
    ),
    PatternSpec::new(
        r"^(?:Uncaught )?(?P<msg>(?:TypeError|ReferenceError|RangeError): .+)$",
        ErrorKind::Runtime,
        Severity::Error,
    ),
    PatternSpec::new(
        r"^(?P<file>[^\s:()]+\.[cm]?[jt]sx?)[:(](?P<line>\d+)[:,](?P<col>\d+)\)?:?\s+(?:error\s*:?\s*)?(?P<msg>.*[Ee]rror.*)$",
        ErrorKind::Build,
        Severity::Error,
    ),
    PatternSpec::new(
        r"^\s*(?P<line>\d+):(?P<col>\d+)\s+error\s+(?P<msg>.+?)(?:\s{2,}(?P<code>[\w@/-]+))?$",
        ErrorKind::Lint,
        Severity::Error,
    ),
    PatternSpec::new(
        r"^\s*(?P<line>\d+):(?P<col>\d+)\s+warning\s+(?P<msg>.+?)(?:\s{2,}(?P<code>[\w@/-]+))?$",
        ErrorKind::Lint,
        Severity::Warning,
    ),
    PatternSpec::new(r"^(?:ERROR|Error)(?: in (?P<file>\S+))?:? (?P<msg>.+)$", ErrorKind::Build, Severity::Error),
];

/// The subset of `package.json` the plugins read.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageManifest {
    pub name: Option<String>,
    #[serde(default)]
    pub scripts: IndexMap<String, String>,
    #[serde(default)]
    pub dependencies: IndexMap<String, String>,
    #[serde(default)]
    pub dev_dependencies: IndexMap<String, String>,
    pub eslint_config: Option<serde_json::Value>,
}

impl PackageManifest {
    pub fn has_dependency(&self, name: &str) -> bool {
        self.dependencies.contains_key(name) || self.dev_dependencies.contains_key(name)
    }
}

/// Reads `package.json` under `root`; absent or malformed manifests read as `None`.
pub fn read_package_json(root: &Path) -> Option<PackageManifest> {
    let content = std::fs::read_to_string(root.join("package.json")).ok()?;
    match serde_json::from_str(&content) {
        Ok(manifest) => Some(manifest),
        Err(e) => {
            tracing::warn!("[javascript] malformed package.json: {e}");
            None
        }
    }
}

/// Dependencies of a parsed manifest, `dependencies` before `devDependencies`.
pub fn manifest_dependencies(manifest: &PackageManifest) -> Vec<DependencyInfo> {
    let direct = manifest
        .dependencies
        .iter()
        .map(|(name, version)| DependencyInfo::new(name, version, DependencyKind::Direct, "package.json"));
    let dev = manifest
        .dev_dependencies
        .iter()
        .map(|(name, version)| DependencyInfo::new(name, version, DependencyKind::Dev, "package.json"));
    dedupe_by_name(direct.chain(dev).collect())
}

/// Invocation for a Node tool: the project-local copy through `npx
/// --no-install` when npx exists, else a global install.
pub(crate) fn node_tool(ctx: &PluginContext, tool: &str) -> Option<(String, Vec<String>)> {
    if ctx.runner.available("npx") {
        Some(("npx".to_string(), vec!["--no-install".to_string(), tool.to_string()]))
    } else if ctx.runner.available(tool) {
        Some((tool.to_string(), Vec::new()))
    } else {
        None
    }
}

/// Whether the project configures ESLint, optionally requiring that the
/// configuration mention `needle`.
pub(crate) fn eslint_configured(root: &Path, needle: Option<&str>) -> bool {
    let in_file = ESLINT_CONFIGS.iter().any(|name| {
        let path = root.join(name);
        path.is_file()
            && needle.is_none_or(|n| std::fs::read_to_string(&path).is_ok_and(|c| c.contains(n)))
    });
    in_file
        || read_package_json(root)
            .and_then(|m| m.eslint_config)
            .is_some_and(|cfg| needle.is_none_or(|n| cfg.to_string().contains(n)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EslintFileReport {
    file_path: String,
    #[serde(default)]
    messages: Vec<EslintMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EslintMessage {
    rule_id: Option<String>,
    severity: u8,
    message: String,
    #[serde(default)]
    line: u32,
    #[serde(default)]
    column: u32,
    #[serde(default)]
    fatal: bool,
}

/// Parses `eslint --format json` output. Severity 2 is an error, anything
/// else a warning; fatal messages are parse failures.
pub fn parse_eslint_json(root: &Path, output: &str) -> Option<Vec<ErrorInfo>> {
    let start = output.find('[')?;
    let reports: Vec<EslintFileReport> = serde_json::from_str(output[start..].trim_end()).ok()?;
    Some(
        reports
            .into_iter()
            .flat_map(|report| {
                let file = relative_display(root, Path::new(&report.file_path));
                report.messages.into_iter().map(move |m| {
                    let kind = if m.fatal { ErrorKind::Syntax } else { ErrorKind::Lint };
                    let severity = if m.severity >= 2 { Severity::Error } else { Severity::Warning };
                    let mut info = ErrorInfo::new("eslint", kind, severity, m.message)
                        .at(file.clone(), m.line, m.column);
                    if let Some(rule) = m.rule_id {
                        info = info.with_code(rule);
                    }
                    info
                })
            })
            .collect(),
    )
}

/// Parses `node --check` stderr for one file.
pub fn parse_node_check(display: &str, stderr: &str) -> Option<ErrorInfo> {
    static LOCATION: OnceLock<Regex> = OnceLock::new();
    static MESSAGE: OnceLock<Regex> = OnceLock::new();
    let location = LOCATION.get_or_init(|| Regex::new(r"^.+:(\d+)$").expect("valid location regex"));
    let message = MESSAGE.get_or_init(|| Regex::new(r"^SyntaxError: (.+)$").expect("valid message regex"));

    let lines: Vec<&str> = stderr.lines().collect();
    let msg = lines
        .iter()
        .find_map(|l| message.captures(l.trim()))
        .map(|c| c[1].to_string())?;
    let line = lines
        .first()
        .and_then(|l| location.captures(l.trim()))
        .and_then(|c| c[1].parse().ok())
        .unwrap_or(0);
    let column = lines
        .iter()
        .find(|l| l.trim() == "^" || (l.contains('^') && l.trim_start().starts_with('^')))
        .and_then(|l| l.find('^'))
        .map(|idx| idx as u32 + 1)
        .unwrap_or(0);

    Some(ErrorInfo::new("node", ErrorKind::Syntax, Severity::Error, msg).at(display, line, column))
}

/// Parses a Jest or Mocha summary.
pub fn parse_js_test_output(output: &str) -> TestResults {
    static JEST_TESTS: OnceLock<Regex> = OnceLock::new();
    static JEST_COUNT: OnceLock<Regex> = OnceLock::new();
    static JEST_TIME: OnceLock<Regex> = OnceLock::new();
    static JEST_FAIL: OnceLock<Regex> = OnceLock::new();
    static MOCHA: OnceLock<Regex> = OnceLock::new();

    let tests_line = JEST_TESTS.get_or_init(|| Regex::new(r"^Tests:\s+(.+)$").expect("valid jest regex"));
    let count = JEST_COUNT
        .get_or_init(|| Regex::new(r"(\d+) (passed|failed|skipped|todo|total)").expect("valid count regex"));
    let time = JEST_TIME.get_or_init(|| Regex::new(r"^Time:\s+([\d.]+)\s*(ms|s)").expect("valid time regex"));
    let fail = JEST_FAIL.get_or_init(|| Regex::new(r"^●\s+(.+?)\s*$").expect("valid failure regex"));
    let mocha = MOCHA
        .get_or_init(|| Regex::new(r"^(\d+) (passing|failing|pending)(?: \((\d+)(ms|s)\))?").expect("valid mocha regex"));

    let mut results = TestResults::default();
    for raw in output.lines() {
        let line = raw.trim();
        if let Some(caps) = tests_line.captures(line) {
            for c in count.captures_iter(&caps[1]) {
                let n: u32 = c[1].parse().unwrap_or(0);
                match &c[2] {
                    "passed" => results.passed = n,
                    "failed" => results.failed = n,
                    "skipped" | "todo" => results.skipped += n,
                    _ => results.total = n,
                }
            }
        } else if let Some(caps) = time.captures(line) {
            let value: f64 = caps[1].parse().unwrap_or(0.0);
            let ms = if &caps[2] == "s" { value * 1000.0 } else { value };
            results.duration_ms = Some(ms.round() as u64);
        } else if let Some(caps) = fail.captures(line) {
            if &caps[1] != "Console" {
                results.failures.push(TestFailure {
                    test: caps[1].to_string(),
                    file: None,
                    message: String::new(),
                });
            }
        } else if let Some(caps) = mocha.captures(line) {
            let n: u32 = caps[1].parse().unwrap_or(0);
            match &caps[2] {
                "passing" => {
                    results.passed = n;
                    if let (Some(v), Some(unit)) = (caps.get(3), caps.get(4)) {
                        let value: u64 = v.as_str().parse().unwrap_or(0);
                        results.duration_ms =
                            Some(if unit.as_str() == "s" { value * 1000 } else { value });
                    }
                }
                "failing" => results.failed = n,
                _ => results.skipped = n,
            }
        }
    }
    results.settle_total();
    results
}

pub struct JavaScriptPlugin {
    descriptor: PluginDescriptor,
    ctx: PluginContext,
}

impl JavaScriptPlugin {
    pub fn new(ctx: PluginContext) -> Self {
        Self {
            descriptor: PluginDescriptor {
                name: "javascript",
                extensions: EXTENSIONS,
                config_files: CONFIG_FILES,
                patterns: PatternTable::compile("javascript", PATTERNS),
            },
            ctx,
        }
    }

    async fn eslint(&self, root: &Path) -> Vec<ErrorInfo> {
        if !eslint_configured(root, None) {
            return Vec::new();
        }
        let Some((program, mut args)) = node_tool(&self.ctx, "eslint") else {
            return Vec::new();
        };
        args.extend([".".to_string(), "--format".to_string(), "json".to_string()]);

        let Some(output) = self.ctx.try_run(&program, args.as_slice(), root, self.ctx.timeouts.lint).await else {
            return Vec::new();
        };
        parse_eslint_json(root, &output.stdout)
            .unwrap_or_else(|| self.descriptor.patterns.parse(&output.combined()))
            .into_iter()
            .filter(|e| e.file.is_empty() || has_extension(Path::new(&e.file), EXTENSIONS))
            .collect()
    }

    async fn syntax_check(&self, root: &Path) -> Vec<ErrorInfo> {
        if !self.ctx.runner.available("node") {
            return Vec::new();
        }
        let files = self.ctx.source_files(root, EXTENSIONS);
        if files.len() > MAX_SYNTAX_CHECKS {
            crate::debug_event!("javascript", "syntax check capped", "{} of {} files", MAX_SYNTAX_CHECKS, files.len());
        }

        let mut errors = Vec::new();
        for file in files.iter().take(MAX_SYNTAX_CHECKS) {
            let arg = file.to_string_lossy();
            let Some(output) = self
                .ctx
                .try_run("node", &["--check", arg.as_ref()], root, self.ctx.timeouts.probe)
                .await
            else {
                continue;
            };
            if !output.success {
                let display = relative_display(root, file);
                errors.extend(parse_node_check(&display, &output.stderr));
            }
        }
        errors
    }

    async fn build_script(&self, root: &Path) -> Vec<ErrorInfo> {
        if !self.ctx.run_build_scripts {
            return Vec::new();
        }
        let has_build = read_package_json(root).is_some_and(|m| m.scripts.contains_key("build"));
        if !has_build {
            return Vec::new();
        }
        match self
            .ctx
            .try_run("npm", &["run", "build", "--silent"], root, self.ctx.timeouts.build)
            .await
        {
            Some(output) if !output.success => self.parse_build_output(&output.combined()),
            _ => Vec::new(),
        }
    }

    /// Declared and probed services, reported under `language`.
    pub async fn services_for(&self, root: &Path, language: &str) -> Vec<ServiceInfo> {
        let mut declared = Vec::new();
        if let Some(manifest) = read_package_json(root) {
            if let Some(&(_, framework, port)) = FRAMEWORKS
                .iter()
                .find(|(marker, _, _)| manifest.has_dependency(marker))
            {
                let start_command = if manifest.scripts.contains_key("dev") {
                    Some("npm run dev".to_string())
                } else if manifest.scripts.contains_key("start") {
                    Some("npm start".to_string())
                } else {
                    None
                };
                let name = manifest.name.clone().unwrap_or_else(|| {
                    root.file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| "app".to_string())
                });
                declared.push(DeclaredService {
                    name,
                    framework,
                    port,
                    start_command,
                    config_file: Some("package.json".to_string()),
                });
            }
        }
        collect_services(language, declared, DEFAULT_PORTS).await
    }
}

#[async_trait]
impl LanguagePlugin for JavaScriptPlugin {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn detect(&self, root: &Path) -> bool {
        detect_with(&self.descriptor, &self.ctx, root)
    }

    async fn analyze_errors(&self, root: &Path) -> Vec<ErrorInfo> {
        let syntax = self.syntax_check(root).await;
        let lint = super::drop_duplicate_syntax(&syntax, self.eslint(root).await);
        let build = self.build_script(root).await;
        let logs = scan_logs(root, LOG_GLOBS, &self.descriptor.patterns);

        let mut errors = syntax;
        errors.extend(lint);
        errors.extend(build);
        errors.extend(logs);
        errors
    }

    fn dependencies(&self, root: &Path) -> Vec<DependencyInfo> {
        read_package_json(root)
            .map(|m| manifest_dependencies(&m))
            .unwrap_or_default()
    }

    async fn find_services(&self, root: &Path) -> Vec<ServiceInfo> {
        self.services_for(root, self.name()).await
    }

    async fn run_linter(&self, root: &Path) -> Vec<ErrorInfo> {
        self.eslint(root).await
    }

    async fn run_tests(&self, root: &Path) -> PluginResult<TestResults> {
        let manifest = read_package_json(root).ok_or_else(|| PluginError::ManifestMissing {
            language: self.name().to_string(),
            manifest: "package.json".to_string(),
        })?;
        if !manifest.scripts.contains_key("test") {
            return Err(PluginError::NoTestScript {
                language: self.name().to_string(),
            });
        }
        let output = self
            .ctx
            .runner
            .run("npm", &["test", "--silent"], root, self.ctx.timeouts.test)
            .await?;
        Ok(parse_js_test_output(&output.combined()))
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

    #[test]
    fn test_package_dependencies() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("package.json"),
            r#"{
  "name": "web",
  "scripts": {"start": "node index.js", "test": "jest"},
  "dependencies": {"express": "^4.18.2", "lodash": "4.17.21"},
  "devDependencies": {"jest": "^29.0.0"}
}"#,
        )
        .unwrap();

        let plugin = JavaScriptPlugin::new(PluginContext::default());
        let deps = plugin.dependencies(dir.path());
        assert_eq!(deps.len(), 3);
        assert_eq!(deps[0].name, "express");
        assert_eq!(deps[0].version, "^4.18.2");
        assert_eq!(deps[0].kind, DependencyKind::Direct);
        assert_eq!(deps[2].kind, DependencyKind::Dev);
        assert!(deps.iter().all(|d| d.source == "package.json"));
    }

    #[test]
    fn test_malformed_manifest_yields_nothing() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("package.json"), "{ not json").unwrap();
        let plugin = JavaScriptPlugin::new(PluginContext::default());
        assert!(plugin.dependencies(dir.path()).is_empty());
    }

    #[test]
    fn test_detect() {
        let dir = TempDir::new().unwrap();
        let plugin = JavaScriptPlugin::new(PluginContext::default());
        assert!(!plugin.detect(dir.path()));
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/index.mjs"), "export {}").unwrap();
        assert!(plugin.detect(dir.path()));
    }

    #[test]
    fn test_eslint_json() {
        let root = Path::new("/work");
        let output = r#"[{"filePath":"/work/src/a.js","messages":[
            {"ruleId":"no-unused-vars","severity":2,"message":"'x' is assigned a value but never used.","line":1,"column":7},
            {"ruleId":"semi","severity":1,"message":"Missing semicolon.","line":2,"column":10},
            {"ruleId":null,"fatal":true,"severity":2,"message":"Parsing error: Unexpected token","line":5,"column":1}
        ],"errorCount":2,"warningCount":1}]"#;

        let errors = parse_eslint_json(root, output).unwrap();
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[0].file, "src/a.js");
        assert_eq!(errors[0].severity, Severity::Error);
        assert_eq!(errors[0].code.as_deref(), Some("no-unused-vars"));
        assert_eq!(errors[1].severity, Severity::Warning);
        assert_eq!(errors[2].kind, ErrorKind::Syntax);
        assert!(errors[2].code.is_none());
    }

    #[test]
    fn test_eslint_garbage_is_none() {
        assert!(parse_eslint_json(Path::new("/"), "Oops! Something went wrong!").is_none());
    }

    #[test]
    fn test_node_check_output() {
        let stderr = "/work/bad.js:3\n  let x = ;\n          ^\n\nSyntaxError: Unexpected token ';'\n    at wrapSafe (node:internal/modules/cjs/loader:1378:20)\n";
        let e = parse_node_check("bad.js", stderr).unwrap();
        assert_eq!(e.file, "bad.js");
        assert_eq!(e.line, 3);
        assert_eq!(e.column, 11);
        assert_eq!(e.kind, ErrorKind::Syntax);
        assert_eq!(e.message, "Unexpected token ';'");
    }

    #[test]
    fn test_jest_summary() {
        let output = "\
 FAIL  src/sum.test.js
  ● sum › adds negatives

Test Suites: 1 failed, 2 passed, 3 total
Tests:       1 failed, 1 skipped, 7 passed, 9 total
Snapshots:   0 total
Time:        1.532 s
";
        let r = parse_js_test_output(output);
        assert_eq!((r.total, r.passed, r.failed, r.skipped), (9, 7, 1, 1));
        assert_eq!(r.duration_ms, Some(1532));
        assert_eq!(r.failures.len(), 1);
        assert_eq!(r.failures[0].test, "sum › adds negatives");
    }

    #[test]
    fn test_mocha_summary() {
        let r = parse_js_test_output("  4 passing (25ms)\n  1 failing\n  2 pending\n");
        assert_eq!((r.total, r.passed, r.failed, r.skipped), (7, 4, 1, 2));
        assert_eq!(r.duration_ms, Some(25));
    }

    #[test]
    fn test_build_output_table() {
        let plugin = JavaScriptPlugin::new(PluginContext::default());
        let errors = plugin.parse_build_output(
            "Module not found: Error: Can't resolve './missing'\nSyntaxError: Unexpected end of input\nDone in 2s\n",
        );
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].kind, ErrorKind::Import);
        assert_eq!(errors[1].kind, ErrorKind::Syntax);
    }

    #[tokio::test]
    async fn test_run_tests_requires_manifest_and_script() {
        let dir = TempDir::new().unwrap();
        let plugin = JavaScriptPlugin::new(PluginContext::default());
        assert!(matches!(
            plugin.run_tests(dir.path()).await,
            Err(PluginError::ManifestMissing { .. })
        ));

        fs::write(dir.path().join("package.json"), r#"{"name":"x"}"#).unwrap();
        assert!(matches!(
            plugin.run_tests(dir.path()).await,
            Err(PluginError::NoTestScript { .. })
        ));
    }
}
