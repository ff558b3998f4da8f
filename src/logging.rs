//! Global `tracing` subscriber setup.
//!
//! `RUST_LOG` takes precedence over `logging.level`. Only the first call in a
//! process installs a subscriber; later calls return `false` and change
//! nothing.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

const FALLBACK_LEVEL: &str = "info";

/// Installs the global subscriber. Returns whether this call installed it.
pub fn init(config: &LoggingConfig) -> bool {
    let filter = build_filter(config);

    let result = if config.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false))
            .try_init()
    };
    result.is_ok()
}

fn build_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(&config.level).unwrap_or_else(|err| {
            eprintln!(
                "Warning: invalid logging.level '{}' ({}), using '{}'",
                config.level, err, FALLBACK_LEVEL
            );
            EnvFilter::new(FALLBACK_LEVEL)
        })
    })
}
