//! Process-wide log subscriber for extension binaries.
//!
//! The library only emits `tracing` events; installing a subscriber is left to
//! the binary, driven by [`LoggingConfig`].

use std::sync::OnceLock;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::types::{LogFormat, LoggingConfig};

static SUBSCRIBER_INSTALLED: OnceLock<bool> = OnceLock::new();

/// `RUST_LOG` when set, otherwise the configured crate level.
fn filter_for(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.directive()))
}

/// Install the global subscriber on first call; later calls are no-ops.
/// Returns whether a subscriber from this crate is in place.
pub fn init_tracing(config: &LoggingConfig) -> bool {
    *SUBSCRIBER_INSTALLED.get_or_init(|| {
        let registry = tracing_subscriber::registry().with(filter_for(config));
        let result = match config.format {
            LogFormat::Json => registry.with(fmt::layer().json().with_target(true)).try_init(),
            LogFormat::Compact => registry.with(fmt::layer().compact()).try_init(),
        };

        match result {
            Ok(()) => {
                tracing::debug!("Logging initialized (format={:?})", config.format);
                true
            }
            Err(err) => {
                eprintln!("talkops: log subscriber already set: {err}");
                false
            }
        }
    })
}
