//! # Simbridge Centralized Configuration
//!
//! This crate provides configuration management and default values for the
//! device transport, the bounded device queues and the port registry.
//!
//! ## Sources
//!
//! Settings are layered, later sources overriding earlier ones:
//!
//! 1. Built-in defaults (see [`defaults`])
//! 2. An optional TOML file
//! 3. Environment variables prefixed `SIMBRIDGE`, sections separated by `__`
//!
//! ## Usage
//!
//! ```rust,no_run
//! use bridge_config::BridgeSettings;
//!
//! // SIMBRIDGE__TRANSPORT__PEER_ADDRESS=10.0.0.5 overrides the peer host
//! let settings = BridgeSettings::load(None).unwrap();
//! let hwm = settings.transport.send_high_water_mark;
//! ```

pub mod defaults;
pub mod error;
pub mod settings;

// Re-export commonly used types
pub use error::ConfigError;
pub use settings::{
    BridgeSettings, LoggingSettings, QueueSettings, RegistrySettings, TransportSettings,
    ENV_PREFIX,
};
