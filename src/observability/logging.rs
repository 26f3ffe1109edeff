//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber once per process
//! - Pick the default level from config, `--verbose` or `RUST_LOG`
//!
//! # Design Decisions
//! - `RUST_LOG` wins over the config file so operators can debug one run
//! - JSON lines when `json_logs` is set, the human-readable format otherwise

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

/// The filter used when `RUST_LOG` is unset.
pub fn default_directive(config: &ObservabilityConfig, verbose: bool) -> String {
    let level = if verbose { "debug" } else { config.log_level.as_str() };
    format!("edgekeeper={level},warn")
}

/// Install the global subscriber.
pub fn init_logging(config: &ObservabilityConfig, verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(config, verbose)));

    let registry = tracing_subscriber::registry().with(filter);
    if config.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        let config = ObservabilityConfig {
            log_level: "warn".into(),
            ..ObservabilityConfig::default()
        };
        assert_eq!(default_directive(&config, false), "edgekeeper=warn,warn");
        assert_eq!(default_directive(&config, true), "edgekeeper=debug,warn");
    }
}
