//! Command-line interface of the daemon binary.

pub mod args;
pub mod commands;

pub use args::{Cli, Commands, LangAction};

use crate::Settings;

/// Dispatches a parsed command. Returns the process exit status.
pub async fn run(command: Commands, settings: Settings) -> anyhow::Result<i32> {
    match command {
        Commands::Init { force } => commands::init::run_init(&settings, force),
        Commands::Config => commands::init::run_config(&settings),
        Commands::Snapshot => commands::snapshot::run_snapshot(settings).await,
        Commands::Watch { json } => commands::watch::run_watch(settings, json).await,
        Commands::Languages => commands::snapshot::run_languages(settings),
        Commands::Lang { language, action } => {
            commands::lang::run_lang(settings, &language, action).await
        }
    }
}
