//! Lang command: one plugin operation against the workspace.

use serde::Serialize;

use super::emit;
use crate::Settings;
use crate::cli::args::LangAction;
use crate::error::ArgusResult;
use crate::io::Envelope;
use crate::workspace::Workspace;

fn list<T: Serialize>(result: ArgusResult<Vec<T>>) -> anyhow::Result<i32> {
    match result {
        Ok(items) => {
            let count = items.len();
            emit(&Envelope::list(items, count))
        }
        Err(e) => emit(&Envelope::<()>::error(&e)),
    }
}

pub async fn run_lang(settings: Settings, language: &str, action: LangAction) -> anyhow::Result<i32> {
    let workspace = match Workspace::open(settings) {
        Ok(workspace) => workspace,
        Err(e) => return emit(&Envelope::<()>::error(&e)),
    };

    match action {
        LangAction::Errors => list(workspace.analyze_language_errors(language).await),
        LangAction::Deps => list(workspace.get_language_dependencies(language)),
        LangAction::Services => list(workspace.find_language_services(language).await),
        LangAction::Lint => list(workspace.run_language_linter(language).await),
        LangAction::Test => match workspace.run_language_tests(language).await {
            Ok(results) => {
                let failed = results.failed;
                let envelope = Envelope::success(results);
                let envelope = if failed > 0 {
                    envelope.with_message(format!("{failed} tests failed"))
                } else {
                    envelope
                };
                emit(&envelope)
            }
            Err(e) => emit(&Envelope::<()>::error(&e)),
        },
    }
}
