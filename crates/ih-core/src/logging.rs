//! Diagnostic logging setup.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Build the filter: `RUST_LOG` when set and valid, else the configured
/// directive, else `warn`.
pub fn build_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new("warn"))
}

/// Install the global subscriber, writing to stderr so stdout stays clean
/// for answers. Safe to call more than once; later calls are ignored.
pub fn init_logging(config: &LoggingConfig) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(build_filter(config))
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_filter_is_used() {
        let config = LoggingConfig {
            filter: "ih_backend=debug".to_string(),
        };
        if std::env::var_os("RUST_LOG").is_none() {
            assert_eq!(build_filter(&config).to_string(), "ih_backend=debug");
        }
    }

    #[test]
    fn invalid_filter_falls_back_to_warn() {
        let config = LoggingConfig {
            filter: "ih_backend=loud".to_string(),
        };
        if std::env::var_os("RUST_LOG").is_none() {
            assert_eq!(build_filter(&config).to_string(), "warn");
        }
    }

    #[test]
    fn init_twice_is_harmless() {
        init_logging(&LoggingConfig::default());
        init_logging(&LoggingConfig::default());
    }
}
