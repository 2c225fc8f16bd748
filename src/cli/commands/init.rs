//! Init and Config commands.

use anyhow::anyhow;

use crate::config::Settings;

/// Writes `.argus/settings.toml` under the workspace root.
pub fn run_init(settings: &Settings, force: bool) -> anyhow::Result<i32> {
    let root = settings.resolve_workspace();
    match Settings::init_config_file(&root, force) {
        Ok(path) => {
            println!("Created configuration file at: {}", path.display());
            println!("Edit this file to customize your settings.");
            Ok(0)
        }
        Err(e) => Err(anyhow!("{e}")),
    }
}

/// Prints the merged configuration.
pub fn run_config(settings: &Settings) -> anyhow::Result<i32> {
    println!("{}", toml::to_string_pretty(settings)?);
    Ok(0)
}
