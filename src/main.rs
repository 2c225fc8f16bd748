use anyhow::Context;
use argus::Settings;
use argus::cli::{self, Cli};
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => Settings::load_from(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => Settings::load().context("failed to load configuration")?,
    };
    cli.apply_overrides(&mut settings);

    argus::logging::init_with_config(&settings.logging, settings.debug);

    let code = cli::run(cli.command, settings).await?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
