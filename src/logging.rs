//! Logging setup. Diagnostics go to stderr so answers on stdout stay clean.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;

/// Build the filter: `RUST_LOG` wins, then `--verbose`, then the configured level.
fn build_filter(config: &LoggingConfig, verbose: bool) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let level = if verbose { "debug" } else { config.level.as_str() };
    EnvFilter::try_new(format!("warn,health_rag={level}"))
        .unwrap_or_else(|_| EnvFilter::new("warn,health_rag=info"))
}

/// Initialize the global subscriber. Calling it twice is a no-op.
pub fn init_logging(config: &LoggingConfig, verbose: bool) {
    let console_layer = fmt::layer()
        .with_target(verbose)
        .with_writer(std::io::stderr);

    let result = tracing_subscriber::registry()
        .with(build_filter(config, verbose))
        .with(console_layer)
        .try_init();

    if result.is_ok() {
        tracing::debug!("Logging initialized with level: {}", config.level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_does_not_panic() {
        let config = LoggingConfig::default();
        init_logging(&config, false);
        init_logging(&config, true);
    }
}
