//! Structured logging and tracing for Apollo.
//!
//! Provides structured, span-based, filterable logging via the `tracing` ecosystem.
//! Supports console output with uptime timestamps and module paths, plus JSON file
//! logging in debug builds for post-mortem analysis of frame statistics. The
//! configured `debug.log_level` is used unless `RUST_LOG` is set.

use apollo_config::Config;
use std::path::Path;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when neither the config nor `RUST_LOG` supply one.
pub const DEFAULT_FILTER: &str = "info,wgpu=warn,naga=warn";

/// Name of the JSON log file written in debug builds.
pub const LOG_FILE_NAME: &str = "apollo.log";

/// Initialize the global tracing subscriber.
///
/// Sets up:
/// - Console output with uptime, module paths, and severity levels
/// - JSON file logging into `log_dir` when `debug_build` is set
/// - Environment-based filtering (`RUST_LOG` wins over the config)
///
/// Returns an error if a global subscriber was already installed.
///
/// # Examples
///
/// ```no_run
/// use apollo_log::init_logging;
/// use apollo_config::Config;
///
/// let config = Config::default();
/// init_logging(Some(std::path::Path::new("./logs")), true, Some(&config)).ok();
/// ```
pub fn init_logging(
    log_dir: Option<&Path>,
    debug_build: bool,
    config: Option<&Config>,
) -> Result<(), TryInitError> {
    let filter_str = filter_string(config);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(true) // rayon workers run the per-face queries
        .with_level(true)
        .with_timer(fmt::time::uptime());

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    if debug_build
        && let Some(log_dir) = log_dir
        && std::fs::create_dir_all(log_dir).is_ok()
        && let Ok(log_file) = std::fs::File::create(log_dir.join(LOG_FILE_NAME))
    {
        let file_layer = fmt::layer()
            .with_writer(log_file)
            .with_ansi(false)
            .with_target(true)
            .with_timer(fmt::time::uptime())
            .json();

        return subscriber.with(file_layer).try_init();
    }

    subscriber.try_init()
}

/// The filter directive string for the given config.
///
/// An empty configured level falls back to [`DEFAULT_FILTER`].
pub fn filter_string(config: Option<&Config>) -> String {
    match config {
        Some(config) if !config.debug.log_level.is_empty() => config.debug.log_level.clone(),
        _ => DEFAULT_FILTER.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_log_level() {
        let filter_str = filter_string(None);
        assert!(filter_str.contains("wgpu=warn"));
        assert!(filter_str.contains("naga=warn"));
        assert!(filter_str.contains("info"));
    }

    #[test]
    fn test_filter_string_uses_config_level() {
        let mut config = Config::default();
        config.debug.log_level = "debug,apollo_stream=trace".to_string();
        assert_eq!(filter_string(Some(&config)), "debug,apollo_stream=trace");
    }

    #[test]
    fn test_filter_string_falls_back_on_empty_level() {
        let mut config = Config::default();
        config.debug.log_level.clear();
        assert_eq!(filter_string(Some(&config)), DEFAULT_FILTER);
        assert_eq!(filter_string(None), DEFAULT_FILTER);
    }

    #[test]
    fn test_subsystem_filter() {
        let filter = EnvFilter::new("info,apollo_quadsphere=debug");
        assert!(format!("{}", filter).contains("apollo_quadsphere=debug"));
    }

    #[test]
    fn test_env_filter_parsing() {
        let valid_filters = [
            "info",
            "debug,apollo_stream=trace",
            "warn,apollo_quadsphere=debug,apollo_stream=trace",
            "error",
        ];

        for filter_str in &valid_filters {
            let result = EnvFilter::try_from(*filter_str);
            assert!(result.is_ok(), "Failed to parse filter: {}", filter_str);
        }
    }

    #[test]
    fn test_debug_build_creates_log_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log_dir = temp_dir.path().join("logs");

        // Only one test in this binary installs the global subscriber.
        let result = init_logging(Some(&log_dir), true, Some(&Config::default()));
        assert!(result.is_ok());
        assert!(log_dir.join(LOG_FILE_NAME).exists());
        tracing::info!(frames = 1, "log file smoke test");
    }
}
