//! Tracing subscriber setup.
//!
//! `RUST_LOG` overrides the configured `[logging] filter`. Only the first
//! call installs a subscriber; later calls are no-ops, so tests and
//! embedding applications can call [`init`] freely.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Install a stderr fmt subscriber filtered by `RUST_LOG` or `config.filter`.
///
/// Returns `false` when a global subscriber was already set.
pub fn init(config: &LoggingConfig) -> bool {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_init_is_harmless() {
        let config = LoggingConfig::default();
        let _ = init(&config);
        assert!(!init(&config));
    }

    #[test]
    fn test_bad_filter_falls_back() {
        let config = LoggingConfig {
            filter: "not a [valid filter".to_string(),
        };
        let _ = init(&config);
    }
}
