// src/infra/logger.rs - Structured logging with tracing

use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable that overrides the default level when `RUST_LOG` is unset.
pub const LOG_ENV: &str = "FLSURF_LOG";

/// Install the global subscriber. `RUST_LOG` wins, then `FLSURF_LOG`, then `level`.
pub fn init_logging(level: &str) {
    let fallback = std::env::var(LOG_ENV).unwrap_or_else(|_| level.to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    // Tests and embedders may have installed a subscriber already.
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}
