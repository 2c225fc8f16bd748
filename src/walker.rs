//! Directory traversal shared by the file watcher and the language plugins.
//!
//! Skips hidden entries, the configured ignore directories (dependency and
//! build output trees), and optionally whatever `.gitignore` excludes.

use ignore::{DirEntry, WalkBuilder};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::Settings;

#[derive(Debug, Clone)]
pub struct ProjectWalker {
    ignore_dirs: Arc<Vec<String>>,
    respect_gitignore: bool,
}

impl Default for ProjectWalker {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl ProjectWalker {
    pub fn new(ignore_dirs: Vec<String>, respect_gitignore: bool) -> Self {
        Self {
            ignore_dirs: Arc::new(ignore_dirs),
            respect_gitignore,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.watch.ignore_dirs.clone(),
            settings.watch.respect_gitignore,
        )
    }

    pub fn is_ignored_dir(&self, name: &str) -> bool {
        self.ignore_dirs.iter().any(|d| d == name)
    }

    /// Every file and directory below `root`, excluding `root` itself.
    pub fn entries(&self, root: &Path) -> impl Iterator<Item = DirEntry> + use<> {
        let mut builder = WalkBuilder::new(root);
        builder
            .hidden(true)
            .git_ignore(self.respect_gitignore)
            .git_global(false)
            .git_exclude(self.respect_gitignore)
            .follow_links(false)
            .require_git(false);

        let ignore_dirs = Arc::clone(&self.ignore_dirs);
        builder.filter_entry(move |entry| {
            if entry.depth() == 0 {
                return true;
            }
            let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
            !(is_dir
                && entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| ignore_dirs.iter().any(|d| d == name)))
        });

        builder
            .build()
            .filter_map(Result::ok)
            .filter(|entry| entry.depth() > 0)
    }

    /// Regular files below `root`.
    pub fn files(&self, root: &Path) -> impl Iterator<Item = PathBuf> + use<> {
        self.entries(root)
            .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
            .map(DirEntry::into_path)
    }

    /// Files whose extension is one of `extensions` (given without the dot).
    pub fn files_with_extensions(&self, root: &Path, extensions: &[&str]) -> Vec<PathBuf> {
        self.files(root)
            .filter(|path| has_extension(path, extensions))
            .collect()
    }
}

pub fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}

/// `path` relative to `root` with forward slashes, or the path unchanged when
/// it lies outside `root`.
pub fn relative_display(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.to_string_lossy().replace('\\', "/")
}
