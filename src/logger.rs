//! Logging bootstrap on top of `env_logger`.

use log::LevelFilter;

use crate::configuration::{LogFormat, LoggingConfig};

/// Map a configured level name (case-insensitive) to a filter
pub fn parse_level(level: &str) -> Option<LevelFilter> {
    match level.to_ascii_uppercase().as_str() {
        "TRACE" => Some(LevelFilter::Trace),
        "DEBUG" => Some(LevelFilter::Debug),
        "INFO" => Some(LevelFilter::Info),
        "WARN" | "WARNING" => Some(LevelFilter::Warn),
        "ERROR" | "CRITICAL" => Some(LevelFilter::Error),
        "OFF" => Some(LevelFilter::Off),
        _ => None,
    }
}

/// Install the global logger. `RUST_LOG`, when set, takes precedence over the
/// configured level. Calling this twice is harmless.
pub fn init(config: &LoggingConfig) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(parse_level(&config.level).unwrap_or(LevelFilter::Info));

    if let Ok(spec) = std::env::var("RUST_LOG") {
        builder.parse_filters(&spec);
    }

    if config.format == LogFormat::Compact {
        builder
            .format_timestamp(None)
            .format_target(false)
            .format_module_path(false);
    }

    let _ = builder.try_init();
}
