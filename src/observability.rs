//! Observability setup.
//!
//! Structured logging via `tracing`, configured from `MNEMOS_LOG`
//! (`EnvFilter` syntax) with an `info` default. Metrics are emitted through
//! the `metrics` facade; wiring an exporter is a deployment concern.

use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

static INIT: OnceLock<()> = OnceLock::new();

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable output.
    #[default]
    Pretty,
    /// Line-delimited JSON.
    Json,
}

/// Initializes the global tracing subscriber. Safe to call more than once;
/// only the first call installs a subscriber.
pub fn init_tracing(format: LogFormat, verbose: bool) {
    INIT.get_or_init(|| {
        let default_directive = if verbose { "debug" } else { "info" };
        let filter = EnvFilter::try_from_env("MNEMOS_LOG")
            .unwrap_or_else(|_| EnvFilter::new(default_directive));

        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr);

        match format {
            LogFormat::Pretty => builder.init(),
            LogFormat::Json => builder.json().init(),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_tracing(LogFormat::Pretty, false);
        init_tracing(LogFormat::Json, true);
    }
}
