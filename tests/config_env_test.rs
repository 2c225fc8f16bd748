use argus::Settings;
use std::env;
use std::time::Duration;
use tempfile::TempDir;

// Environment variables are process-wide, so everything touching them lives in
// this one test.
#[test]
fn test_env_override_with_nested_keys() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("settings.toml");
    std::fs::write(
        &config_path,
        r#"
[watch]
git_interval_secs = 30
file_interval_secs = 2
"#,
    )
    .unwrap();

    unsafe {
        // Double underscore separates nested levels
        env::set_var("ARGUS_WATCH__GIT_INTERVAL_SECS", "5");
        env::set_var("ARGUS_TOOLS__LINT_TIMEOUT_SECS", "11");
        env::set_var("ARGUS_LANGUAGES__GO__ENABLED", "false");
        env::set_var("ARGUS_LOGGING__DEFAULT", "debug");
    }

    let settings = Settings::load_from(&config_path).unwrap();

    unsafe {
        env::remove_var("ARGUS_WATCH__GIT_INTERVAL_SECS");
        env::remove_var("ARGUS_TOOLS__LINT_TIMEOUT_SECS");
        env::remove_var("ARGUS_LANGUAGES__GO__ENABLED");
        env::remove_var("ARGUS_LOGGING__DEFAULT");
    }

    // Environment beats the file
    assert_eq!(settings.watch.git_interval(), Duration::from_secs(5));
    // The file beats defaults
    assert_eq!(settings.watch.file_interval(), Duration::from_secs(2));
    assert_eq!(settings.tools.timeouts().lint, Duration::from_secs(11));
    assert!(!settings.is_language_enabled("go"));
    assert!(settings.is_language_enabled("python"));
    assert_eq!(settings.logging.default, "debug");
}
