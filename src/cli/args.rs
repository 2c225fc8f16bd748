//! CLI argument parsing using clap.

use clap::{
    Parser, Subcommand, ValueEnum,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

use crate::Settings;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Development intelligence daemon
#[derive(Parser, Debug)]
#[command(
    name = "argus",
    version = env!("CARGO_PKG_VERSION"),
    about = "Continuously refreshed snapshot of a project's state",
    long_about = "Observe a project directory and report its structure, git status, \
                  compiler and linter errors, dependencies, services and health.",
    next_line_help = true,
    styles = clap_cargo_style(),
    after_help = "Examples:\n  argus init\n  argus snapshot\n  argus watch --json\n  argus languages\n  argus lang python deps"
)]
pub struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Project directory to observe (defaults to the configured root or the
    /// current directory)
    #[arg(short, long, global = true)]
    pub workspace: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// CLI flags take precedence over every configuration source.
    pub fn apply_overrides(&self, settings: &mut Settings) {
        if let Some(workspace) = &self.workspace {
            settings.workspace_root = Some(workspace.clone());
        }
        if self.debug {
            settings.debug = true;
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create .argus/settings.toml with default values
    #[command(about = "Set up .argus directory with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Show current configuration settings
    #[command(about = "Display active settings")]
    Config,

    /// Poll every watcher once and print the snapshot
    #[command(about = "Print one project snapshot as JSON")]
    Snapshot,

    /// Run the daemon until interrupted
    #[command(
        about = "Run the daemon and report each refresh",
        after_help = "Stop with Ctrl-C. With --json every refresh prints one snapshot envelope."
    )]
    Watch {
        /// Print each snapshot as a JSON envelope instead of a summary line
        #[arg(long)]
        json: bool,
    },

    /// List the languages detected in the workspace
    #[command(about = "Show detected languages and the primary language")]
    Languages,

    /// Run one language plugin operation
    #[command(
        about = "Query a single language plugin",
        after_help = "Examples:\n  argus lang python errors\n  argus lang typescript deps\n  argus lang go test"
    )]
    Lang {
        /// Language name, e.g. python, javascript, typescript, go, rust
        language: String,

        #[arg(value_enum)]
        action: LangAction,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LangAction {
    /// Full error analysis
    Errors,
    /// Manifest dependencies
    Deps,
    /// Declared and running services
    Services,
    /// Linter only
    Lint,
    /// Run the test suite
    Test,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_lang_subcommand() {
        let cli = Cli::try_parse_from(["argus", "lang", "python", "deps", "-w", "/tmp/project"]).unwrap();
        let mut settings = Settings::default();
        cli.apply_overrides(&mut settings);
        assert_eq!(settings.workspace_root, Some(PathBuf::from("/tmp/project")));

        match cli.command {
            Commands::Lang { language, action } => {
                assert_eq!(language, "python");
                assert_eq!(action, LangAction::Deps);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_unknown_action_rejected() {
        assert!(Cli::try_parse_from(["argus", "lang", "python", "explode"]).is_err());
    }
}
