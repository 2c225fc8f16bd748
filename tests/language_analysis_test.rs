use argus::plugins::PluginContext;
use argus::tools::ToolRunner;
use argus::{ArgusError, DependencyKind, ErrorKind, Settings, Severity, Workspace};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn settings_for(root: &Path) -> Settings {
    Settings {
        workspace_root: Some(root.to_path_buf()),
        ..Settings::default()
    }
}

/// Workspace whose tool runner only sees the binaries linked into `bin`.
fn workspace_with_tools(root: &Path, bin: &Path) -> Workspace {
    let settings = settings_for(root);
    let ctx = PluginContext::from_settings(&settings).with_runner(ToolRunner::with_search_path(bin));
    Workspace::with_context(settings, ctx).unwrap()
}

/// Links `python3` into `bin`, or returns false when it is not installed.
#[cfg(unix)]
fn link_python(bin: &Path) -> bool {
    match which::which("python3") {
        Ok(python) => {
            std::os::unix::fs::symlink(python, bin.join("python3")).unwrap();
            true
        }
        Err(_) => false,
    }
}

#[cfg(unix)]
#[tokio::test]
async fn test_syntax_error_reported_once() {
    let dir = TempDir::new().unwrap();
    let bin = TempDir::new().unwrap();
    if !link_python(bin.path()) {
        eprintln!("python3 not installed, skipping");
        return;
    }
    fs::write(dir.path().join("good.py"), "def ok():\n    return 1\n").unwrap();
    fs::write(dir.path().join("bad.py"), "def broken(:\n    pass\n").unwrap();

    let workspace = workspace_with_tools(dir.path(), bin.path());
    let errors = workspace.analyze_language_errors("python").await.unwrap();
    let syntax: Vec<_> = errors
        .iter()
        .filter(|e| e.kind == ErrorKind::Syntax && e.severity == Severity::Error)
        .collect();
    assert_eq!(syntax.len(), 1, "{errors:#?}");
    assert_eq!(syntax[0].file, "bad.py");
    assert_eq!(syntax[0].line, 1);

    let snapshot = workspace.snapshot_once().await;
    let bad_file_syntax = snapshot
        .active_errors
        .iter()
        .filter(|e| e.file == "bad.py" && e.kind == ErrorKind::Syntax && e.severity == Severity::Error)
        .count();
    assert_eq!(bad_file_syntax, 1);
    assert!(snapshot.health.score < 100);
    assert!(!snapshot.build_status.success);
    assert_eq!(snapshot.primary_language, "python");
}

#[cfg(unix)]
#[tokio::test]
async fn test_python_analysis_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let bin = TempDir::new().unwrap();
    if !link_python(bin.path()) {
        eprintln!("python3 not installed, skipping");
        return;
    }
    fs::write(dir.path().join("a.py"), "x = (\n").unwrap();
    fs::write(dir.path().join("b.py"), "from ..pkg import thing\n").unwrap();
    fs::create_dir(dir.path().join("logs")).unwrap();
    fs::write(dir.path().join("logs/app.log"), "Traceback (most recent call last):\nValueError: boom\n").unwrap();

    let workspace = workspace_with_tools(dir.path(), bin.path());
    let first = workspace.analyze_language_errors("python").await.unwrap();
    let second = workspace.analyze_language_errors("python").await.unwrap();

    assert!(!first.is_empty());
    assert_eq!(first.len(), second.len());
    for report in &first {
        assert!(
            second.iter().any(|other| other.same_report(report)),
            "missing on second run: {report:?}"
        );
    }
}

#[tokio::test]
async fn test_missing_tools_only_remove_their_checks() {
    let dir = TempDir::new().unwrap();
    let empty = TempDir::new().unwrap();
    fs::write(dir.path().join("main.py"), "from ..sibling import helper\n").unwrap();
    fs::write(dir.path().join("index.js"), "console.log('hi')\n").unwrap();
    fs::write(dir.path().join("tsconfig.json"), "{}").unwrap();
    fs::write(dir.path().join("server.log"), "ok\nFATAL: out of memory\n").unwrap();

    let workspace = workspace_with_tools(dir.path(), empty.path());

    // No interpreter or linters: only the file-based relative import check
    // and the log scan contribute.
    let python = workspace.analyze_language_errors("python").await.unwrap();
    assert!(python.iter().all(|e| e.kind != ErrorKind::Syntax));
    assert!(python.iter().any(|e| e.kind == ErrorKind::Import && e.file == "main.py"));

    // No node, eslint or tsc anywhere
    assert!(workspace.run_language_linter("javascript").await.unwrap().is_empty());

    let snapshot = workspace.snapshot_once().await;
    assert_eq!(snapshot.git_status.branch, "");
    assert!(snapshot.active_errors.iter().any(|e| e.file == "server.log"));
    assert_eq!(
        snapshot.health.error_count,
        snapshot.active_errors.iter().filter(|e| e.severity == Severity::Error).count()
    );
}

/// Writes an executable shell script named `name` into `bin`.
#[cfg(unix)]
fn fake_tool(bin: &Path, name: &str, script: &str) {
    use std::os::unix::fs::PermissionsExt;
    let path = bin.join(name);
    fs::write(&path, script).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn test_go_build_error_counted_once() {
    let dir = TempDir::new().unwrap();
    let bin = TempDir::new().unwrap();
    fake_tool(
        bin.path(),
        "go",
        "#!/bin/sh\nif [ \"$1\" = build ]; then\n  echo './main.go:4:13: syntax error: unexpected newline in argument list' >&2\n  exit 1\nfi\nexit 0\n",
    );
    fs::write(dir.path().join("go.mod"), "module example.com/app\n\ngo 1.22\n").unwrap();
    fs::write(dir.path().join("main.go"), "package main\n\nfunc main() {\n\tprintln(\"hi\"\n}\n").unwrap();

    let workspace = workspace_with_tools(dir.path(), bin.path());
    let snapshot = workspace.snapshot_once().await;

    let syntax: Vec<_> = snapshot
        .active_errors
        .iter()
        .filter(|e| e.kind == ErrorKind::Syntax && e.severity == Severity::Error)
        .collect();
    assert_eq!(syntax.len(), 1, "{:#?}", snapshot.active_errors);
    assert_eq!(syntax[0].file, "main.go");
    assert_eq!(syntax[0].line, 4);
    assert_eq!(snapshot.health.error_count, 1);
    assert_eq!(snapshot.health.score, 90);
}

#[tokio::test]
async fn test_log_lines_counted_once_across_languages() {
    let dir = TempDir::new().unwrap();
    let empty = TempDir::new().unwrap();
    fs::write(dir.path().join("index.js"), "console.log('hi')\n").unwrap();
    fs::write(dir.path().join("main.py"), "print('hi')\n").unwrap();
    fs::write(dir.path().join("tsconfig.json"), "{}").unwrap();
    fs::write(
        dir.path().join("app.log"),
        "ERROR: connection refused\nWARNING: slow query\nFATAL: out of memory\n",
    )
    .unwrap();

    let workspace = workspace_with_tools(dir.path(), empty.path());
    let snapshot = workspace.snapshot_once().await;

    let mut lines: Vec<u32> = snapshot
        .active_errors
        .iter()
        .filter(|e| e.file == "app.log")
        .map(|e| e.line)
        .collect();
    let total = lines.len();
    lines.sort_unstable();
    lines.dedup();
    assert_eq!(lines.len(), total, "{:#?}", snapshot.active_errors);
    assert!(total <= 3);
    assert!(lines.contains(&1) && lines.contains(&3));
}

#[tokio::test]
async fn test_pinned_requirement_round_trip() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("requirements.txt"),
        "# web\nrequests==2.31.0\nflask>=2.0\n-r dev.txt\n",
    )
    .unwrap();

    let workspace = Workspace::open(settings_for(dir.path())).unwrap();
    let deps = workspace.get_language_dependencies("python").unwrap();

    let requests: Vec<_> = deps.iter().filter(|d| d.name == "requests").collect();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].version, "2.31.0");
    assert_eq!(requests[0].kind, DependencyKind::Direct);
    assert_eq!(requests[0].source, "requirements.txt");
    assert!(deps.iter().any(|d| d.name == "flask"));
}

#[tokio::test]
async fn test_empty_workspace() {
    let dir = TempDir::new().unwrap();
    let empty = TempDir::new().unwrap();
    let workspace = workspace_with_tools(dir.path(), empty.path());

    assert!(workspace.detected_languages().is_empty());
    assert_eq!(workspace.primary_language(), "unknown");

    let snapshot = workspace.snapshot_once().await;
    assert!(snapshot.languages.is_empty());
    assert_eq!(snapshot.primary_language, "unknown");
    assert_eq!(snapshot.structure.total_files, 0);
    assert_eq!(snapshot.health.score, 100);
}

#[tokio::test]
async fn test_language_not_recognized() {
    let dir = TempDir::new().unwrap();
    let workspace = Workspace::open(settings_for(dir.path())).unwrap();

    for result in [
        workspace.analyze_language_errors("cobol").await.map(|_| ()),
        workspace.get_language_dependencies("cobol").map(|_| ()),
        workspace.find_language_services("cobol").await.map(|_| ()),
        workspace.run_language_linter("cobol").await.map(|_| ()),
        workspace.run_language_tests("cobol").await.map(|_| ()),
    ] {
        assert!(matches!(result, Err(ArgusError::LanguageNotFound { ref name }) if name == "cobol"));
    }
}

#[test]
fn test_invalid_workspace_is_fatal() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("gone");
    assert!(matches!(
        Workspace::open(settings_for(&missing)),
        Err(ArgusError::WorkspaceInvalid { .. })
    ));
}
