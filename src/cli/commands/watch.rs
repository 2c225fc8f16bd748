//! Watch command: run the daemon until Ctrl-C.

use std::time::Duration;

use super::emit;
use crate::Settings;
use crate::intelligence::ProjectIntelligence;
use crate::io::Envelope;
use crate::types::ProjectSnapshot;

fn summary(snapshot: &ProjectSnapshot) -> String {
    let git = &snapshot.git_status;
    let branch = if git.branch.is_empty() { "-" } else { git.branch.as_str() };
    format!(
        "{} health={} ({:?} debt) errors={} warnings={} files={} changes={} branch={}{} processes={} building={}",
        snapshot.timestamp.format("%H:%M:%S"),
        snapshot.health.score,
        snapshot.health.debt,
        snapshot.health.error_count,
        snapshot.health.warning_count,
        snapshot.structure.total_files,
        snapshot.recent_changes.len(),
        branch,
        if git.dirty { "*" } else { "" },
        snapshot.running_processes.len(),
        snapshot.build_status.is_building,
    )
}

pub async fn run_watch(settings: Settings, json: bool) -> anyhow::Result<i32> {
    let refresh_wait = settings.watch.refresh_wait();
    let intelligence = match ProjectIntelligence::start(settings) {
        Ok(intelligence) => intelligence,
        Err(e) => return emit(&Envelope::<()>::error(&e)),
    };
    crate::log_event!("watch", "started", "{}", intelligence.root().display());
    eprintln!("Watching {} (Ctrl-C to stop)", intelligence.root().display());

    let mut revisions = intelligence.subscribe();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            changed = revisions.changed() => {
                if changed.is_err() {
                    break;
                }
                let Ok(snapshot) = intelligence.snapshot() else { continue };
                if json {
                    emit(&Envelope::success(&*snapshot))?;
                } else {
                    println!("{}", summary(&snapshot));
                }
            }
            _ = tokio::time::sleep(refresh_wait.max(Duration::from_secs(1))),
                if intelligence.snapshot().is_err() =>
            {
                tracing::warn!("[watch] no snapshot yet after {refresh_wait:?}");
            }
        }
    }

    eprintln!("Stopping...");
    intelligence.shutdown().await;
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{Slices, assemble};
    use std::path::Path;

    #[test]
    fn test_summary_line() {
        let snapshot = assemble(Path::new("/work"), &Slices::default());
        let line = summary(&snapshot);
        assert!(line.contains("health=100 (Low debt)"));
        assert!(line.contains("branch=- "));
    }
}
