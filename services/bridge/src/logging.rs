//! Tracing subscriber setup for the bridge binaries

use crate::error::{BridgeError, Result};
use bridge_config::LoggingSettings;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init(settings: &LoggingSettings) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .map_err(|e| BridgeError::Logging(e.to_string()))?;

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if settings.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_thread_names(true))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_thread_names(true))
            .try_init()
    };
    installed.map_err(|e| BridgeError::Logging(e.to_string()))
}
