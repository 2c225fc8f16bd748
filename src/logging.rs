//! Daemon logging.
//!
//! Compact timestamped lines on stderr, so stdout stays free for JSON output.
//! Levels come from the `[logging]` section; `RUST_LOG` overrides it:
//!
//! ```bash
//! RUST_LOG=debug argus watch
//! RUST_LOG=argus::watcher=trace argus snapshot
//! ```

use std::sync::Once;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

/// HH:MM:SS.mmm in local time.
struct CompactTime;

impl FormatTime for CompactTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

/// Builds the filter directive string from config: the default level followed
/// by `target=level` overrides.
pub fn filter_directives(config: &LoggingConfig, debug: bool) -> String {
    let mut directives = if debug {
        "debug".to_string()
    } else {
        config.default.clone()
    };
    let mut modules: Vec<_> = config.modules.iter().collect();
    modules.sort();
    for (module, level) in modules {
        directives.push_str(&format!(",{module}={level}"));
    }
    directives
}

/// Installs the global subscriber. Only the first call has an effect.
///
/// `debug` raises the default level to `debug` without touching per-module
/// overrides.
pub fn init_with_config(config: &LoggingConfig, debug: bool) {
    INIT.call_once(|| {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(filter_directives(config, debug))
        };

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_timer(CompactTime)
            .with_level(true)
            .with_filter(filter);

        tracing_subscriber::registry().with(fmt_layer).init();
    });
}

/// Log a component event at info level.
///
/// ```ignore
/// log_event!("coordinator", "refreshed", "{} errors", n);
/// log_event!("git", "not a repository");
/// ```
#[macro_export]
macro_rules! log_event {
    ($component:expr, $event:expr) => {
        tracing::info!("[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::info!("[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}

/// Same as [`log_event!`] at debug level.
#[macro_export]
macro_rules! debug_event {
    ($component:expr, $event:expr) => {
        tracing::debug!("[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::debug!("[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directives() {
        let mut config = LoggingConfig::default();
        config.modules.insert("argus::watcher".to_string(), "trace".to_string());
        assert_eq!(filter_directives(&config, false), "warn,argus::watcher=trace");
        assert_eq!(filter_directives(&config, true), "debug,argus::watcher=trace");
    }
}
