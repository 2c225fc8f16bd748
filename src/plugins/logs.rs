//! Scanning of log files for error lines.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use super::patterns::PatternTable;
use crate::types::{ErrorInfo, ErrorKind, Severity};
use crate::walker::relative_display;

/// Log locations probed relative to the workspace root.
pub const LOG_GLOBS: &[&str] = &["*.log", "logs/*.log", "log/*.log"];

/// Only the tail of a large log is read.
const MAX_LOG_BYTES: u64 = 512 * 1024;

/// Findings kept per log file; the most recent lines win.
const MAX_FINDINGS_PER_FILE: usize = 50;

/// Log files under `root` matching any of `globs`, in a stable order.
pub fn find_logs(root: &Path, globs: &[&str]) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for pattern in globs {
        let full = root.join(pattern);
        let Some(full) = full.to_str() else { continue };
        match glob::glob(full) {
            Ok(paths) => found.extend(paths.filter_map(Result::ok).filter(|p| p.is_file())),
            Err(e) => tracing::warn!("[logs] bad glob '{pattern}': {e}"),
        }
    }
    found.sort();
    found.dedup();
    found
}

fn read_tail(path: &Path) -> std::io::Result<(String, usize)> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    let mut skipped_lines = 0;
    let mut buf = Vec::new();

    if len > MAX_LOG_BYTES {
        // Count the lines being skipped so reported line numbers stay true.
        let mut remaining = len - MAX_LOG_BYTES;
        let mut chunk = [0u8; 64 * 1024];
        while remaining > 0 {
            let want = remaining.min(chunk.len() as u64) as usize;
            file.read_exact(&mut chunk[..want])?;
            skipped_lines += chunk[..want].iter().filter(|&&b| b == b'\n').count();
            remaining -= want as u64;
        }
    }
    file.read_to_end(&mut buf)?;
    Ok((String::from_utf8_lossy(&buf).into_owned(), skipped_lines))
}

/// Matches every line of each log against `table`, recording the log's path
/// and the line number within it.
pub fn scan_logs(root: &Path, globs: &[&str], table: &PatternTable) -> Vec<ErrorInfo> {
    let mut errors = Vec::new();
    for path in find_logs(root, globs) {
        let (content, offset) = match read_tail(&path) {
            Ok(read) => read,
            Err(e) => {
                crate::debug_event!("logs", "unreadable", "{}: {e}", path.display());
                continue;
            }
        };
        let display = relative_display(root, &path);

        let mut found: Vec<ErrorInfo> = content
            .lines()
            .enumerate()
            .filter_map(|(idx, line)| {
                table.match_line(line).map(|mut info| {
                    info.file = display.clone();
                    info.line = (offset + idx + 1) as u32;
                    info.context = Some(line.trim().to_string());
                    info
                })
            })
            .collect();
        if found.len() > MAX_FINDINGS_PER_FILE {
            found.drain(..found.len() - MAX_FINDINGS_PER_FILE);
        }
        errors.extend(found);
    }
    errors
}

/// Table for generic application logs: any line mentioning an error,
/// exception or fatal condition.
pub fn generic_log_table() -> &'static PatternTable {
    static TABLE: OnceLock<PatternTable> = OnceLock::new();
    TABLE.get_or_init(|| {
        PatternTable::compile(
            "log",
            &[super::patterns::PatternSpec::new(
                r"(?i)\b(error|exception|fatal)\b",
                ErrorKind::Runtime,
                Severity::Error,
            )],
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_scan_finds_errors_with_line_numbers() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("logs")).unwrap();
        fs::write(
            dir.path().join("logs/app.log"),
            "starting\nready\nERROR: db connection refused\nUnhandled Exception in worker\n",
        )
        .unwrap();
        fs::write(dir.path().join("server.log"), "all good\n").unwrap();

        let errors = scan_logs(dir.path(), LOG_GLOBS, generic_log_table());
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].file, "logs/app.log");
        assert_eq!(errors[0].line, 3);
        assert_eq!(errors[1].line, 4);
        assert!(errors.iter().all(|e| e.kind == ErrorKind::Runtime));
    }

    #[test]
    fn test_no_logs_no_errors() {
        let dir = TempDir::new().unwrap();
        assert!(scan_logs(dir.path(), LOG_GLOBS, generic_log_table()).is_empty());
    }

    #[test]
    fn test_findings_are_capped() {
        let dir = TempDir::new().unwrap();
        let body: String = (0..200).map(|i| format!("error {i}\n")).collect();
        fs::write(dir.path().join("big.log"), body).unwrap();

        let errors = scan_logs(dir.path(), LOG_GLOBS, generic_log_table());
        assert_eq!(errors.len(), MAX_FINDINGS_PER_FILE);
        assert_eq!(errors.last().unwrap().line, 200);
    }
}
