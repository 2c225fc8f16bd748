//! TypeScript plugin.
//!
//! Holds its own [`JavaScriptPlugin`] and delegates to it for everything the
//! two ecosystems share: manifest parsing, services, tests, and errors in the
//! plain-JavaScript files of a mixed project.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::path::Path;
use std::sync::OnceLock;

use super::javascript::{self, JavaScriptPlugin, eslint_configured, node_tool, read_package_json};
use super::patterns::{PatternSpec, PatternTable};
use super::{LanguagePlugin, PluginContext, PluginDescriptor, PluginResult, detect_with};
use crate::types::{
    DependencyInfo, DependencyKind, ErrorInfo, ErrorKind, ServiceInfo, Severity, TestResults,
};
use crate::walker::{has_extension, relative_display};

pub const EXTENSIONS: &[&str] = &["ts", "tsx", "mts", "cts"];
const CONFIG_FILES: &[&str] = &["tsconfig.json"];

/// Runtime packages that ship without bundled type definitions.
const NEEDS_TYPES: &[&str] = &[
    "express",
    "lodash",
    "react",
    "react-dom",
    "jest",
    "mocha",
    "cors",
    "body-parser",
    "jsonwebtoken",
    "multer",
    "morgan",
    "compression",
    "cookie-parser",
];

const PATTERNS: &[PatternSpec] = &[
    PatternSpec::new(
        r"^(?P<file>.+?)\((?P<line>\d+),(?P<col>\d+)\): error (?P<code>TS\d+): (?P<msg>.+)$",
        ErrorKind::Type,
        Severity::Error,
    ),
    PatternSpec::new(
        r"^(?P<file>.+?)\((?P<line>\d+),(?P<col>\d+)\): warning (?P<code>TS\d+): (?P<msg>.+)$",
        ErrorKind::Type,
        Severity::Warning,
    ),
    PatternSpec::new(
        r"^(?P<file>[^\s:]+\.[cm]?tsx?):(?P<line>\d+):(?P<col>\d+) - error (?P<code>TS\d+): (?P<msg>.+)$",
        ErrorKind::Type,
        Severity::Error,
    ),
    PatternSpec::new(r"^error (?P<code>TS\d+): (?P<msg>.+)$", ErrorKind::Build, Severity::Error),
];

/// Parses `tsc --pretty false` output.
///
/// TypeScript error codes in the 1000s are syntax errors and 2307 is an
/// unresolved module; everything else is a type error.
pub fn parse_tsc_output(output: &str) -> Vec<ErrorInfo> {
    static LINE: OnceLock<Regex> = OnceLock::new();
    let re = LINE.get_or_init(|| {
        Regex::new(r"^(.+)\((\d+),(\d+)\): (error|warning) (TS\d+): (.+)$").expect("valid tsc regex")
    });

    output
        .lines()
        .filter_map(|line| {
            let caps = re.captures(line.trim())?;
            let code = caps[5].to_string();
            let number: u32 = code[2..].parse().unwrap_or(0);
            let kind = match number {
                1000..=1999 => ErrorKind::Syntax,
                2307 => ErrorKind::Import,
                _ => ErrorKind::Type,
            };
            Some(
                ErrorInfo::new("tsc", kind, Severity::from_label(&caps[4]), &caps[6])
                    .at(caps[1].replace('\\', "/"), caps[2].parse().unwrap_or(0), caps[3].parse().unwrap_or(0))
                    .with_code(code),
            )
        })
        .collect()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TslintFailure {
    name: String,
    failure: String,
    rule_name: Option<String>,
    rule_severity: Option<String>,
    start_position: TslintPosition,
}

#[derive(Debug, Deserialize)]
struct TslintPosition {
    line: u32,
    character: u32,
}

/// Parses `tslint --format json`. Positions are 0-based in tslint's output.
pub fn parse_tslint_json(root: &Path, output: &str) -> Option<Vec<ErrorInfo>> {
    let start = output.find('[')?;
    let failures: Vec<TslintFailure> = serde_json::from_str(output[start..].trim_end()).ok()?;
    Some(
        failures
            .into_iter()
            .map(|f| {
                let severity = f
                    .rule_severity
                    .as_deref()
                    .map(Severity::from_label)
                    .unwrap_or(Severity::Warning);
                let mut info = ErrorInfo::new("tslint", ErrorKind::Lint, severity, f.failure).at(
                    relative_display(root, Path::new(&f.name)),
                    f.start_position.line + 1,
                    f.start_position.character + 1,
                );
                if let Some(rule) = f.rule_name {
                    info = info.with_code(rule);
                }
                info
            })
            .collect(),
    )
}

pub struct TypeScriptPlugin {
    descriptor: PluginDescriptor,
    ctx: PluginContext,
    javascript: JavaScriptPlugin,
}

impl TypeScriptPlugin {
    pub fn new(ctx: PluginContext) -> Self {
        Self {
            descriptor: PluginDescriptor {
                name: "typescript",
                extensions: EXTENSIONS,
                config_files: CONFIG_FILES,
                patterns: PatternTable::compile("typescript", PATTERNS),
            },
            javascript: JavaScriptPlugin::new(ctx.clone()),
            ctx,
        }
    }

    async fn type_check(&self, root: &Path) -> Vec<ErrorInfo> {
        if !root.join("tsconfig.json").is_file() {
            return Vec::new();
        }
        let Some((program, mut args)) = node_tool(&self.ctx, "tsc") else {
            return Vec::new();
        };
        args.extend(["--noEmit".to_string(), "--pretty".to_string(), "false".to_string()]);

        match self
            .ctx
            .try_run(&program, args.as_slice(), root, self.ctx.timeouts.typecheck)
            .await
        {
            Some(output) if !output.success => parse_tsc_output(&output.combined()),
            _ => Vec::new(),
        }
    }

    async fn tslint(&self, root: &Path) -> Vec<ErrorInfo> {
        if !root.join("tslint.json").is_file() {
            return Vec::new();
        }
        let Some((program, mut args)) = node_tool(&self.ctx, "tslint") else {
            return Vec::new();
        };
        args.extend(["--format", "json", "--project", "."].map(String::from));

        let Some(output) = self
            .ctx
            .try_run(&program, args.as_slice(), root, self.ctx.timeouts.lint)
            .await
        else {
            return Vec::new();
        };
        parse_tslint_json(root, &output.stdout).unwrap_or_default()
    }

    async fn eslint(&self, root: &Path) -> Vec<ErrorInfo> {
        if !eslint_configured(root, Some("typescript")) {
            return Vec::new();
        }
        let Some((program, mut args)) = node_tool(&self.ctx, "eslint") else {
            return Vec::new();
        };
        args.extend([".", "--format", "json"].map(String::from));

        let Some(output) = self
            .ctx
            .try_run(&program, args.as_slice(), root, self.ctx.timeouts.lint)
            .await
        else {
            return Vec::new();
        };
        javascript::parse_eslint_json(root, &output.stdout)
            .unwrap_or_default()
            .into_iter()
            .filter(|e| has_extension(Path::new(&e.file), EXTENSIONS))
            .collect()
    }

    /// Runtime dependencies with no matching `@types/` package.
    fn missing_type_definitions(&self, root: &Path) -> Vec<ErrorInfo> {
        let Some(manifest) = read_package_json(root) else {
            return Vec::new();
        };
        manifest
            .dependencies
            .keys()
            .filter(|name| NEEDS_TYPES.contains(&name.as_str()))
            .filter(|name| !manifest.has_dependency(&format!("@types/{name}")))
            .map(|name| {
                ErrorInfo::new(
                    "typescript",
                    ErrorKind::Type,
                    Severity::Warning,
                    format!("Missing type definitions for '{name}'; install @types/{name}"),
                )
                .at("package.json", 0, 0)
            })
            .collect()
    }
}

fn reclassify(mut dep: DependencyInfo) -> DependencyInfo {
    if dep.name.starts_with("@types/") {
        dep.kind = DependencyKind::Types;
    } else if dep.name == "typescript" {
        dep.kind = DependencyKind::Compiler;
    }
    dep
}

#[async_trait]
impl LanguagePlugin for TypeScriptPlugin {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn detect(&self, root: &Path) -> bool {
        detect_with(&self.descriptor, &self.ctx, root)
    }

    async fn analyze_errors(&self, root: &Path) -> Vec<ErrorInfo> {
        let mut errors = self.type_check(root).await;
        errors.extend(self.tslint(root).await);
        let eslint = super::drop_duplicate_syntax(&errors, self.eslint(root).await);
        errors.extend(eslint);
        errors.extend(self.missing_type_definitions(root));

        let js_errors = self.javascript.analyze_errors(root).await;
        errors.extend(
            js_errors
                .into_iter()
                .filter(|e| has_extension(Path::new(&e.file), javascript::EXTENSIONS)),
        );
        errors
    }

    fn dependencies(&self, root: &Path) -> Vec<DependencyInfo> {
        self.javascript
            .dependencies(root)
            .into_iter()
            .map(reclassify)
            .collect()
    }

    async fn find_services(&self, root: &Path) -> Vec<ServiceInfo> {
        self.javascript.services_for(root, self.name()).await
    }

    async fn run_linter(&self, root: &Path) -> Vec<ErrorInfo> {
        let mut errors = self.tslint(root).await;
        errors.extend(self.eslint(root).await);
        errors
    }

    async fn run_tests(&self, root: &Path) -> PluginResult<TestResults> {
        self.javascript.run_tests(root).await
    }

    fn parse_build_output(&self, output: &str) -> Vec<ErrorInfo> {
        let mut errors = self.descriptor.patterns.parse(output);
        if errors.is_empty() {
            errors = self.javascript.parse_build_output(output);
        }
        errors
    }
}
