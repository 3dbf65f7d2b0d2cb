//! Bridge error types

use bridge_config::ConfigError;
use thiserror::Error;
use transport::TransportError;

/// Port lease failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Every port in the range is leased or in use
    #[error("No free port in {start}..={end} for identity '{key}'")]
    Exhausted { key: String, start: u16, end: u16 },

    #[error("Identity key is empty")]
    EmptyKey,
}

/// Anything that can stop a device or a bridge service from starting
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
