//! Bridge Settings
//!
//! Provides configuration loading for the transport, device queues and port
//! registry. Supports an optional TOML file with environment overrides.

use crate::defaults;
use crate::error::ConfigError;
use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Environment variable prefix (`SIMBRIDGE__TRANSPORT__PEER_ADDRESS=...`)
pub const ENV_PREFIX: &str = "SIMBRIDGE";

/// Complete configuration for one simulator process
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct BridgeSettings {
    pub transport: TransportSettings,
    pub queue: QueueSettings,
    pub registry: RegistrySettings,
    pub logging: LoggingSettings,
}

/// Socket-level settings shared by every role
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct TransportSettings {
    /// Host device sockets bind to; "*" means every interface
    pub bind_address: String,
    /// Host used when connecting to a device bound elsewhere
    pub peer_address: String,
    pub send_high_water_mark: usize,
    pub receive_high_water_mark: usize,
    pub tag_width: usize,
    pub responsor_timeout_ms: u64,
    pub reconnect_interval_ms: u64,
    pub max_frame_size: usize,
    pub io_threads: usize,
}

/// Bounded device queue settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct QueueSettings {
    pub capacity: usize,
    pub timeout_ms: u64,
}

/// Port registry settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct RegistrySettings {
    pub control_port: u16,
    pub service_port: u16,
    pub port_range_start: u16,
    pub port_range_end: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            bind_address: defaults::transport::BIND_ADDRESS.to_string(),
            peer_address: defaults::transport::PEER_ADDRESS.to_string(),
            send_high_water_mark: defaults::transport::SEND_HIGH_WATER_MARK,
            receive_high_water_mark: defaults::transport::RECEIVE_HIGH_WATER_MARK,
            tag_width: defaults::transport::TAG_WIDTH,
            responsor_timeout_ms: defaults::transport::RESPONSOR_TIMEOUT_MS,
            reconnect_interval_ms: defaults::transport::RECONNECT_INTERVAL_MS,
            max_frame_size: defaults::transport::MAX_FRAME_SIZE,
            io_threads: defaults::transport::IO_THREADS,
        }
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            capacity: defaults::queue::CAPACITY,
            timeout_ms: defaults::queue::TIMEOUT_MS,
        }
    }
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            control_port: defaults::registry::CONTROL_PORT,
            service_port: defaults::registry::SERVICE_PORT,
            port_range_start: defaults::registry::EPHEMERAL_PORT_MIN,
            port_range_end: defaults::registry::EPHEMERAL_PORT_MAX,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: defaults::logging::LEVEL.to_string(),
            json: false,
        }
    }
}

impl TransportSettings {
    /// Bind host as an IP address; "*" and "0.0.0.0" mean every interface
    pub fn bind_ip(&self) -> Result<IpAddr, ConfigError> {
        parse_host("transport.bind_address", &self.bind_address)
    }

    /// Peer host as an IP address
    pub fn peer_ip(&self) -> Result<IpAddr, ConfigError> {
        parse_host("transport.peer_address", &self.peer_address)
    }

    pub fn responsor_timeout(&self) -> Duration {
        Duration::from_millis(self.responsor_timeout_ms)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }
}

impl QueueSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl BridgeSettings {
    /// Load defaults, then `path` if given, then `SIMBRIDGE__*` environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_from(path, ENV_PREFIX)
    }

    /// Same as [`BridgeSettings::load`] with a custom environment prefix
    pub fn load_from(path: Option<&Path>, env_prefix: &str) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            info!("Loading bridge config: {:?}", path);
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(env_prefix)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let settings: BridgeSettings = builder.build()?.try_deserialize()?;
        settings.validate()?;

        debug!(?settings, "Bridge configuration loaded");
        Ok(settings)
    }

    /// Parse settings from an inline TOML document
    pub fn from_toml_str(toml_str: &str) -> Result<Self, ConfigError> {
        let settings: BridgeSettings = Config::builder()
            .add_source(File::from_str(toml_str, config_crate::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Render the effective settings as TOML
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::invalid("settings", e.to_string()))
    }

    /// Reject values the transport cannot operate with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let transport = &self.transport;
        if transport.send_high_water_mark == 0 {
            return Err(ConfigError::invalid(
                "transport.send_high_water_mark",
                "must be at least 1",
            ));
        }
        if transport.receive_high_water_mark == 0 {
            return Err(ConfigError::invalid(
                "transport.receive_high_water_mark",
                "must be at least 1",
            ));
        }
        if transport.tag_width > 8 {
            return Err(ConfigError::invalid(
                "transport.tag_width",
                format!("{} exceeds the 8-byte routing hash", transport.tag_width),
            ));
        }
        if transport.max_frame_size == 0 {
            return Err(ConfigError::invalid(
                "transport.max_frame_size",
                "must be at least 1",
            ));
        }
        if transport.io_threads == 0 {
            return Err(ConfigError::invalid("transport.io_threads", "must be at least 1"));
        }
        transport.bind_ip()?;
        transport.peer_ip()?;

        if self.queue.capacity == 0 {
            return Err(ConfigError::invalid("queue.capacity", "must be at least 1"));
        }

        let registry = &self.registry;
        if registry.port_range_start < defaults::registry::EPHEMERAL_PORT_MIN {
            return Err(ConfigError::invalid(
                "registry.port_range_start",
                format!(
                    "{} is below the ephemeral range starting at {}",
                    registry.port_range_start,
                    defaults::registry::EPHEMERAL_PORT_MIN
                ),
            ));
        }
        if registry.port_range_start > registry.port_range_end {
            return Err(ConfigError::invalid(
                "registry.port_range_end",
                format!(
                    "range {}..={} is empty",
                    registry.port_range_start, registry.port_range_end
                ),
            ));
        }

        Ok(())
    }
}

fn parse_host(field: &str, host: &str) -> Result<IpAddr, ConfigError> {
    match host.trim() {
        "*" => Ok(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
        "localhost" => Ok(IpAddr::V4(Ipv4Addr::LOCALHOST)),
        other => other
            .parse()
            .map_err(|_| ConfigError::invalid(field, format!("'{}' is not an IP address", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_match_transport_contract() {
        let settings = BridgeSettings::default();
        assert_eq!(settings.transport.send_high_water_mark, 1000);
        assert_eq!(settings.transport.tag_width, 8);
        assert_eq!(settings.transport.responsor_timeout(), Duration::from_millis(500));
        assert_eq!(settings.queue.capacity, 30);
        assert_eq!(settings.queue.timeout(), Duration::from_millis(500));
        assert_eq!(settings.registry.control_port, 25554);
        assert_eq!(settings.registry.port_range_start, 49152);
        assert_eq!(settings.registry.port_range_end, 65535);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_file_with_partial_sections() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("bridge.toml");

        let config_content = r#"
[transport]
bind_address = "*"
send_high_water_mark = 50

[queue]
capacity = 10
"#;

        fs::write(&config_path, config_content).unwrap();

        let settings =
            BridgeSettings::load_from(Some(&config_path), "SIMBRIDGE_TEST_FILE").unwrap();

        assert_eq!(settings.transport.send_high_water_mark, 50);
        assert_eq!(
            settings.transport.bind_ip().unwrap(),
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        );
        assert_eq!(settings.queue.capacity, 10);
        // Untouched sections keep their defaults
        assert_eq!(settings.queue.timeout_ms, 500);
        assert_eq!(settings.registry, RegistrySettings::default());
    }

    #[test]
    fn test_environment_override() {
        std::env::set_var("SIMBRIDGE_TEST_ENV__TRANSPORT__PEER_ADDRESS", "10.0.0.5");
        std::env::set_var("SIMBRIDGE_TEST_ENV__QUEUE__CAPACITY", "12");

        let settings = BridgeSettings::load_from(None, "SIMBRIDGE_TEST_ENV").unwrap();

        std::env::remove_var("SIMBRIDGE_TEST_ENV__TRANSPORT__PEER_ADDRESS");
        std::env::remove_var("SIMBRIDGE_TEST_ENV__QUEUE__CAPACITY");

        assert_eq!(settings.transport.peer_address, "10.0.0.5");
        assert_eq!(settings.queue.capacity, 12);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut settings = BridgeSettings::default();
        settings.transport.tag_width = 9;
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::Invalid { ref field, .. }) if field == "transport.tag_width"
        ));

        let mut settings = BridgeSettings::default();
        settings.registry.port_range_start = 1024;
        assert!(settings.validate().is_err());

        let mut settings = BridgeSettings::default();
        settings.registry.port_range_start = 60000;
        settings.registry.port_range_end = 50000;
        assert!(settings.validate().is_err());

        let mut settings = BridgeSettings::default();
        settings.queue.capacity = 0;
        assert!(settings.validate().is_err());

        let mut settings = BridgeSettings::default();
        settings.transport.peer_address = "not-an-ip".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_inline_toml_and_render() {
        let settings = BridgeSettings::from_toml_str(
            r#"
[registry]
port_range_start = 50000
port_range_end = 50010
"#,
        )
        .unwrap();
        assert_eq!(settings.registry.port_range_start, 50000);

        let rendered = settings.to_toml_string().unwrap();
        assert!(rendered.contains("port_range_end = 50010"));
    }
}
