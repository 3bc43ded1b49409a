//! Diagnostic logging setup.
//!
//! The library only emits `tracing` events; installing a subscriber is the
//! binary's job. `POSTEDIT_LOG` (an `EnvFilter` directive) wins over the
//! configured level.

use crate::core::config::ENV_LOG;
use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber writing to stderr. Calling it twice is harmless.
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_env(ENV_LOG)
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
