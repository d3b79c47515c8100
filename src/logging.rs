//! Diagnostic logging setup.
//!
//! All diagnostics go to stderr through `tracing`; stdout is reserved for command
//! output. `LODESTAR_LOG` takes full `EnvFilter` directives
//! (e.g. `lodestar::live=debug,info`) and wins over the configured level.

use tracing_subscriber::EnvFilter;

use crate::config::LogFormat;
use crate::config::resolver::LOG_ENV;

fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init(level: &str, format: LogFormat) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter(level))
        .with_writer(std::io::stderr)
        .with_target(false);
    let _ = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };
}
