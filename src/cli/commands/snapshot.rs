//! Snapshot and Languages commands.

use serde::Serialize;

use super::emit;
use crate::Settings;
use crate::io::Envelope;
use crate::types::DetectedLanguage;
use crate::workspace::Workspace;

#[derive(Debug, Serialize)]
struct LanguageSummary {
    primary_language: String,
    languages: Vec<DetectedLanguage>,
}

pub async fn run_snapshot(settings: Settings) -> anyhow::Result<i32> {
    let workspace = match Workspace::open(settings) {
        Ok(workspace) => workspace,
        Err(e) => return emit(&Envelope::<()>::error(&e)),
    };
    let snapshot = workspace.snapshot_once().await;
    emit(&Envelope::success(snapshot))
}

pub fn run_languages(settings: Settings) -> anyhow::Result<i32> {
    let workspace = match Workspace::open(settings) {
        Ok(workspace) => workspace,
        Err(e) => return emit(&Envelope::<()>::error(&e)),
    };
    let languages = workspace.detected_languages();
    let summary = LanguageSummary {
        primary_language: crate::plugins::PluginRegistry::primary_language(&languages),
        languages,
    };
    let count = summary.languages.len();
    emit(&Envelope::list(summary, count))
}
