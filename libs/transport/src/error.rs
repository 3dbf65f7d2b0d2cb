//! Transport Error Types
//!
//! Error handling for socket setup, framing and the request/reply state
//! machine. Transient per-message failures (publish with no peers, queue
//! timeouts, foreign tags) are NOT errors in this crate: they surface as
//! `false` / `None` so the simulation tick never stalls on them.

use crate::socket::ExchangeState;
use std::net::SocketAddr;
use thiserror::Error;

/// Main transport error type
#[derive(Error, Debug)]
pub enum TransportError {
    /// Network connectivity errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Connection management errors
    #[error("Connection error: {message} (remote: {remote_addr:?})")]
    Connection {
        message: String,
        remote_addr: Option<SocketAddr>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Binding a listening socket failed (port already in use, bad host)
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: SocketAddr,
        source: std::io::Error,
    },

    /// Wire framing errors
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// Request/reply ordering violated; the socket instance is unusable
    #[error("{role} protocol violation: {operation} called while {state}")]
    ProtocolViolation {
        role: &'static str,
        operation: &'static str,
        state: ExchangeState,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// Role used before `initialize`/`connect`
    #[error("{role} socket is not initialized")]
    NotInitialized { role: &'static str },

    /// Role used after `close`
    #[error("{role} socket is closed")]
    Closed { role: &'static str },

    /// Transport timeout errors
    #[error("Timeout error: {operation} exceeded {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Generic I/O errors
    #[error("I/O error: {message}")]
    Io {
        message: String,
        source: std::io::Error,
    },
}

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

impl TransportError {
    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>, remote_addr: Option<SocketAddr>) -> Self {
        Self::Connection {
            message: message.into(),
            remote_addr,
            source: None,
        }
    }

    /// Create a connection error with source
    pub fn connection_with_source(
        message: impl Into<String>,
        remote_addr: Option<SocketAddr>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            message: message.into(),
            remote_addr,
            source: Some(Box::new(source)),
        }
    }

    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::Configuration {
            message: message.into(),
            field: field.map(|s| s.to_string()),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Create an I/O error with context
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// The socket instance must be discarded and rebuilt
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TransportError::ProtocolViolation { .. } | TransportError::Closed { .. }
        )
    }

    /// Check if this is a transient error
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransportError::Network { .. }
                | TransportError::Connection { .. }
                | TransportError::Timeout { .. }
                | TransportError::Io { .. }
        )
    }

    /// Get error category for metrics
    pub fn category(&self) -> &'static str {
        match self {
            TransportError::Network { .. } => "network",
            TransportError::Connection { .. } => "connection",
            TransportError::Bind { .. } => "bind",
            TransportError::Protocol { .. } => "protocol",
            TransportError::ProtocolViolation { .. } => "protocol_violation",
            TransportError::Configuration { .. } => "configuration",
            TransportError::NotInitialized { .. } => "not_initialized",
            TransportError::Closed { .. } => "closed",
            TransportError::Timeout { .. } => "timeout",
            TransportError::Io { .. } => "io",
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<codec::FrameError> for TransportError {
    fn from(err: codec::FrameError) -> Self {
        match err {
            codec::FrameError::TagTooWide { .. } | codec::FrameError::WidthMismatch { .. } => {
                Self::configuration(err.to_string(), Some("transport.tag_width"))
            }
            other => Self::protocol(other.to_string()),
        }
    }
}

impl From<bridge_config::ConfigError> for TransportError {
    fn from(err: bridge_config::ConfigError) -> Self {
        match err {
            bridge_config::ConfigError::Invalid { field, message } => Self::Configuration {
                message,
                field: Some(field),
            },
            other => Self::configuration(other.to_string(), None),
        }
    }
}
