//! Polling file watcher.
//!
//! Keeps the last observed mtime of every file and diffs each walk against
//! it. The same walk produces the [`ProjectStructure`], and line counts and
//! TODO markers are cached per file and recomputed only when its mtime moves.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Duration, SystemTime};

use super::Watcher;
use crate::Settings;
use crate::types::{
    ChangeKind, DirectoryInfo, FileChange, FileInfo, ProjectStructure, TodoItem, TodoMarker,
};
use crate::walker::{ProjectWalker, relative_display};

/// Files larger than this are listed but not read.
const MAX_SCAN_BYTES: u64 = 2 * 1024 * 1024;

const LANGUAGES: &[(&str, &str)] = &[
    ("js", "javascript"),
    ("jsx", "javascript"),
    ("mjs", "javascript"),
    ("cjs", "javascript"),
    ("ts", "typescript"),
    ("tsx", "typescript"),
    ("mts", "typescript"),
    ("cts", "typescript"),
    ("py", "python"),
    ("pyi", "python"),
    ("go", "go"),
    ("rs", "rust"),
    ("java", "java"),
    ("kt", "kotlin"),
    ("swift", "swift"),
    ("c", "c"),
    ("h", "c"),
    ("cpp", "cpp"),
    ("cc", "cpp"),
    ("hpp", "cpp"),
    ("cs", "csharp"),
    ("rb", "ruby"),
    ("php", "php"),
    ("lua", "lua"),
    ("sh", "shell"),
    ("vue", "vue"),
    ("svelte", "svelte"),
];

const MAIN_FILES: &[&str] = &[
    "main.go",
    "main.py",
    "__main__.py",
    "app.py",
    "manage.py",
    "index.js",
    "index.ts",
    "app.js",
    "app.ts",
    "server.js",
    "server.ts",
    "main.rs",
    "lib.rs",
];

const CONFIG_FILES: &[&str] = &[
    "package.json",
    "tsconfig.json",
    "go.mod",
    "requirements.txt",
    "pyproject.toml",
    "setup.py",
    "pipfile",
    "cargo.toml",
    "pom.xml",
    "build.gradle",
    "composer.json",
    "gemfile",
    "dockerfile",
    "docker-compose.yml",
    "makefile",
    ".gitignore",
    ".env",
    "webpack.config.js",
    "babel.config.js",
    "vite.config.ts",
    "vite.config.js",
];

/// Root markers in priority order.
const PROJECT_TYPES: &[(&str, &str)] = &[
    ("package.json", "nodejs"),
    ("go.mod", "go"),
    ("Cargo.toml", "rust"),
    ("pyproject.toml", "python"),
    ("requirements.txt", "python"),
    ("setup.py", "python"),
    ("Pipfile", "python"),
    ("pom.xml", "java"),
    ("build.gradle", "java"),
    ("composer.json", "php"),
    ("Gemfile", "ruby"),
];

fn language_of(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    LANGUAGES.iter().find(|(e, _)| *e == ext).map(|(_, lang)| *lang)
}

fn directory_purpose(name: &str) -> Option<&'static str> {
    let purpose = match name.to_ascii_lowercase().as_str() {
        "src" | "source" => "source",
        "lib" | "pkg" | "internal" => "library",
        "cmd" | "bin" => "entrypoints",
        "test" | "tests" | "spec" | "__tests__" => "test",
        "docs" | "doc" => "documentation",
        "config" | "configs" | ".github" => "configuration",
        "scripts" => "scripts",
        "assets" | "static" | "public" => "assets",
        "components" => "components",
        "pages" | "routes" => "pages",
        "api" => "api",
        "utils" | "helpers" => "utilities",
        "migrations" => "migrations",
        _ => return None,
    };
    Some(purpose)
}

fn is_config_file(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    CONFIG_FILES.contains(&lower.as_str())
}

fn is_main_file(name: &str) -> bool {
    MAIN_FILES.contains(&name.to_ascii_lowercase().as_str())
}

fn todo_regex() -> &'static Regex {
    static TODO: OnceLock<Regex> = OnceLock::new();
    TODO.get_or_init(|| {
        Regex::new(r"\b(TODO|FIXME|HACK|XXX|NOTE)\b[:\s]*(.*)$").expect("valid todo regex")
    })
}

/// TODO-style markers in `content`. Only upper-case whole-word markers count.
pub fn find_todos(display: &str, content: &str) -> Vec<TodoItem> {
    let re = todo_regex();
    content
        .lines()
        .enumerate()
        .filter_map(|(idx, line)| {
            let caps = re.captures(line)?;
            Some(TodoItem {
                file: display.to_string(),
                line: idx as u32 + 1,
                marker: TodoMarker::parse(&caps[1])?,
                message: caps[2].trim().trim_end_matches("*/").trim().to_string(),
            })
        })
        .collect()
}

fn to_utc(time: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(time)
}

#[cfg(unix)]
fn is_executable(meta: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_meta: &std::fs::Metadata) -> bool {
    false
}

/// What a poll of the file watcher publishes.
#[derive(Debug, Clone, Default)]
pub struct FileSlice {
    pub structure: ProjectStructure,
    /// Newest first
    pub recent_changes: Vec<FileChange>,
    pub todos: Vec<TodoItem>,
}

#[derive(Debug, Clone)]
struct ScannedFile {
    modified: SystemTime,
    line_count: Option<usize>,
    todos: Vec<TodoItem>,
}

pub struct FileWatcher {
    root: PathBuf,
    walker: ProjectWalker,
    interval: Duration,
    window: Duration,
    cap: usize,
    mtimes: HashMap<PathBuf, SystemTime>,
    scanned: HashMap<PathBuf, ScannedFile>,
    changes: Vec<FileChange>,
}

impl FileWatcher {
    pub fn new(root: impl Into<PathBuf>, settings: &Settings) -> Self {
        Self {
            root: root.into(),
            walker: ProjectWalker::from_settings(settings),
            interval: settings.watch.file_interval(),
            window: settings.watch.change_window(),
            cap: settings.watch.max_recent_changes,
            mtimes: HashMap::new(),
            scanned: HashMap::new(),
            changes: Vec::new(),
        }
    }

    /// Line count and TODOs for `path`, reusing the cached result while the
    /// mtime is unchanged.
    fn scan_file(&mut self, path: &Path, display: &str, modified: SystemTime, size: u64) -> &ScannedFile {
        let stale = self.scanned.get(path).is_none_or(|cached| cached.modified != modified);
        if stale {
            let readable = size <= MAX_SCAN_BYTES && language_of(path).is_some();
            let content = if readable { std::fs::read_to_string(path).ok() } else { None };
            let scanned = ScannedFile {
                modified,
                line_count: content.as_deref().map(|c| c.lines().count()),
                todos: content.as_deref().map(|c| find_todos(display, c)).unwrap_or_default(),
            };
            self.scanned.insert(path.to_path_buf(), scanned);
        }
        &self.scanned[path]
    }

    /// One walk: diff against the previous walk and rebuild the structure.
    pub fn scan(&mut self) -> FileSlice {
        let now = SystemTime::now();
        let mut current: HashMap<PathBuf, SystemTime> = HashMap::new();
        let mut fresh_changes = Vec::new();
        let mut structure = ProjectStructure {
            root: self.root.clone(),
            ..Default::default()
        };
        let mut dir_counts: BTreeMap<String, usize> = BTreeMap::new();
        let mut todos = Vec::new();

        for entry in self.walker.entries(&self.root) {
            let path = entry.path().to_path_buf();
            let Ok(meta) = entry.metadata() else { continue };
            let display = relative_display(&self.root, &path);

            if meta.is_dir() {
                dir_counts.entry(display).or_insert(0);
                continue;
            }
            if !meta.is_file() {
                continue;
            }

            let modified = meta.modified().unwrap_or(now);
            match self.mtimes.get(&path) {
                None => fresh_changes.push(FileChange {
                    path: display.clone(),
                    kind: ChangeKind::Created,
                    timestamp: to_utc(modified),
                }),
                Some(previous) if modified > *previous => fresh_changes.push(FileChange {
                    path: display.clone(),
                    kind: ChangeKind::Modified,
                    timestamp: to_utc(modified),
                }),
                Some(_) => {}
            }
            current.insert(path.clone(), modified);

            if let Some(parent) = Path::new(&display).parent().filter(|p| !p.as_os_str().is_empty()) {
                *dir_counts.entry(parent.to_string_lossy().replace('\\', "/")).or_insert(0) += 1;
            }
            let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            if is_main_file(&name) {
                structure.main_files.push(display.clone());
            }
            if is_config_file(&name) {
                structure.config_files.push(display.clone());
            }

            let scanned = self.scan_file(&path, &display, modified, meta.len());
            let line_count = scanned.line_count;
            todos.extend(scanned.todos.iter().cloned());

            structure.total_lines += line_count.unwrap_or(0);
            structure.files.push(FileInfo {
                path: display,
                size: meta.len(),
                modified: to_utc(modified),
                language: language_of(&path).map(str::to_string),
                line_count,
                executable: is_executable(&meta),
            });
        }

        for path in self.mtimes.keys().filter(|p| !current.contains_key(*p)) {
            fresh_changes.push(FileChange {
                path: relative_display(&self.root, path),
                kind: ChangeKind::Deleted,
                timestamp: to_utc(now),
            });
        }
        self.scanned.retain(|path, _| current.contains_key(path));
        self.mtimes = current;
        self.record_changes(fresh_changes, now);

        structure.total_files = structure.files.len();
        structure.files.sort_by(|a, b| a.path.cmp(&b.path));
        structure.main_files.sort();
        structure.config_files.sort();
        structure.directories = dir_counts
            .into_iter()
            .map(|(path, file_count)| {
                let name = path.rsplit('/').next().unwrap_or(&path).to_string();
                DirectoryInfo {
                    purpose: directory_purpose(&name).map(str::to_string),
                    path,
                    file_count,
                }
            })
            .collect();
        structure.project_type = PROJECT_TYPES
            .iter()
            .find(|(marker, _)| self.root.join(marker).is_file())
            .map(|(_, kind)| kind.to_string())
            .unwrap_or_else(|| "unknown".to_string());

        todos.sort_by(|a, b| a.file.cmp(&b.file).then(a.line.cmp(&b.line)));

        FileSlice {
            structure,
            recent_changes: self.changes.clone(),
            todos,
        }
    }

    /// Merges new events and evicts the ones outside the window or cap.
    fn record_changes(&mut self, fresh: Vec<FileChange>, now: SystemTime) {
        let cutoff = to_utc(now.checked_sub(self.window).unwrap_or(SystemTime::UNIX_EPOCH));
        self.changes.extend(fresh);
        self.changes.retain(|c| c.timestamp >= cutoff);
        self.changes.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        self.changes.truncate(self.cap);
    }
}

#[async_trait]
impl Watcher for FileWatcher {
    type Slice = FileSlice;

    fn name(&self) -> &'static str {
        "files"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn poll(&mut self, _forced: bool) -> FileSlice {
        let root = self.root.clone();
        let slice = self.scan();
        crate::debug_event!(
            "files",
            "scanned",
            "{}: {} files, {} recent changes",
            root.display(),
            slice.structure.total_files,
            slice.recent_changes.len()
        );
        slice
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn watcher(root: &Path) -> FileWatcher {
        FileWatcher::new(root, &Settings::default())
    }

    fn set_mtime(path: &Path, time: SystemTime) {
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_modified(time).unwrap();
    }

    #[test]
    fn test_created_modified_deleted() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.py");
        let b = dir.path().join("b.py");
        fs::write(&a, "x = 1\n").unwrap();
        fs::write(&b, "y = 2\n").unwrap();

        let mut w = watcher(dir.path());
        let first = w.scan();
        assert_eq!(first.recent_changes.len(), 2);
        assert!(first.recent_changes.iter().all(|c| c.kind == ChangeKind::Created));

        let later = SystemTime::now() + Duration::from_secs(5);
        fs::write(&a, "x = 3\n").unwrap();
        set_mtime(&a, later);
        fs::remove_file(&b).unwrap();

        let second = w.scan();
        let kinds: Vec<(String, ChangeKind)> = second
            .recent_changes
            .iter()
            .map(|c| (c.path.clone(), c.kind))
            .collect();
        assert_eq!(kinds[0], ("a.py".to_string(), ChangeKind::Modified));
        assert!(kinds.contains(&("b.py".to_string(), ChangeKind::Deleted)));
        assert_eq!(second.structure.total_files, 1);
    }

    #[test]
    fn test_window_and_cap() {
        let dir = TempDir::new().unwrap();
        let old = dir.path().join("old.txt");
        fs::write(&old, "").unwrap();
        set_mtime(&old, SystemTime::now() - Duration::from_secs(3600));
        for i in 0..5 {
            fs::write(dir.path().join(format!("f{i}.txt")), "").unwrap();
        }

        let mut w = watcher(dir.path());
        w.cap = 3;
        let slice = w.scan();
        assert_eq!(slice.recent_changes.len(), 3);
        assert!(slice.recent_changes.iter().all(|c| c.path != "old.txt"));
        assert!(
            slice
                .recent_changes
                .windows(2)
                .all(|pair| pair[0].timestamp >= pair[1].timestamp)
        );
    }

    #[test]
    fn test_structure_and_todos() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::create_dir_all(dir.path().join("node_modules/pkg")).unwrap();
        fs::write(dir.path().join("package.json"), "{}").unwrap();
        fs::write(
            dir.path().join("src/index.js"),
            "// TODO: wire up routes\nconst notes = 1; // NOTEs are not markers\n/* FIXME broken */\n",
        )
        .unwrap();
        fs::write(dir.path().join("node_modules/pkg/index.js"), "// TODO hidden\n").unwrap();

        let slice = watcher(dir.path()).scan();
        let structure = &slice.structure;
        assert_eq!(structure.project_type, "nodejs");
        assert_eq!(structure.total_files, 2);
        assert_eq!(structure.total_lines, 3);
        assert_eq!(structure.main_files, vec!["src/index.js".to_string()]);
        assert_eq!(structure.config_files, vec!["package.json".to_string()]);
        let src = structure.directories.iter().find(|d| d.path == "src").unwrap();
        assert_eq!(src.file_count, 1);
        assert_eq!(src.purpose.as_deref(), Some("source"));

        assert_eq!(slice.todos.len(), 2);
        assert_eq!(slice.todos[0].marker, TodoMarker::Todo);
        assert_eq!(slice.todos[0].message, "wire up routes");
        assert_eq!(slice.todos[1].line, 3);
        assert_eq!(slice.todos[1].message, "broken");
    }

    #[test]
    fn test_unchanged_file_uses_cache() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.go");
        fs::write(&path, "package a\n// HACK: temporary\n").unwrap();

        let mut w = watcher(dir.path());
        assert_eq!(w.scan().todos.len(), 1);
        let second = w.scan();
        assert_eq!(second.todos.len(), 1);
        assert!(second.recent_changes.iter().all(|c| c.kind == ChangeKind::Created));
        assert_eq!(w.scanned.len(), 1);
    }
}
