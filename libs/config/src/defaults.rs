//! Default configuration values
//!
//! Constants used across the transport, queue and registry so that every
//! component agrees on the same out-of-the-box behavior.

/// Transport defaults
pub mod transport {
    /// Bind host for device-side sockets ("*" binds every interface)
    pub const BIND_ADDRESS: &str = "127.0.0.1";

    /// Host used when connecting to a bound device
    pub const PEER_ADDRESS: &str = "127.0.0.1";

    /// Outbound frames buffered per peer before the transport drops
    pub const SEND_HIGH_WATER_MARK: usize = 1000;

    /// Inbound frames buffered per socket before the transport drops
    pub const RECEIVE_HIGH_WATER_MARK: usize = 1000;

    /// Routing tag width in bytes
    pub const TAG_WIDTH: usize = 8;

    /// Responsor bounded wait for a request (milliseconds)
    pub const RESPONSOR_TIMEOUT_MS: u64 = 500;

    /// Delay between reconnect attempts of a connecting socket (milliseconds)
    pub const RECONNECT_INTERVAL_MS: u64 = 100;

    /// Largest frame accepted from a peer
    pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024; // 16MB

    /// Worker threads of the shared I/O runtime
    pub const IO_THREADS: usize = 2;
}

/// Bounded device queue defaults
pub mod queue {
    /// Maximum buffered messages per device
    pub const CAPACITY: usize = 30;

    /// Bounded wait for push/pop (milliseconds)
    pub const TIMEOUT_MS: u64 = 500;
}

/// Port registry defaults
pub mod registry {
    /// Well-known port of the registry's lookup channel
    pub const CONTROL_PORT: u16 = 25554;

    /// Well-known port of the JSON device-list service
    pub const SERVICE_PORT: u16 = 25555;

    /// IANA dynamic/ephemeral range, first port
    pub const EPHEMERAL_PORT_MIN: u16 = 49152;

    /// IANA dynamic/ephemeral range, last port
    pub const EPHEMERAL_PORT_MAX: u16 = 65535;
}

/// Logging defaults
pub mod logging {
    pub const LEVEL: &str = "info";
}
