//! Device-plugin registration
//!
//! A simulated device owns one [`Transport`] and registers each of its I/O
//! channels here: the channel's composite identity gets a port leased from the
//! shared [`PortRegistry`], a routing tag hashed from the identity key, and a
//! socket of the matching role bound to that port.

use crate::error::{BridgeError, Result};
use crate::identity::DeviceIdentity;
use crate::registry::PortRegistry;
use std::sync::Arc;
use tracing::{info, warn};
use transport::{RoutingTag, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Channel {
    Tx,
    Rx,
    Service,
    Client,
}

impl Channel {
    fn label(self) -> &'static str {
        match self {
            Channel::Tx => "tx",
            Channel::Rx => "rx",
            Channel::Service => "service",
            Channel::Client => "client",
        }
    }
}

pub struct DevicePlugin {
    registry: Arc<PortRegistry>,
    transport: Arc<Transport>,
    identity: DeviceIdentity,
    leases: Vec<String>,
}

impl DevicePlugin {
    /// `identity` supplies device type, model and part; each registration adds its own sub-part
    pub fn new(registry: Arc<PortRegistry>, transport: Arc<Transport>, identity: DeviceIdentity) -> Self {
        Self {
            registry,
            transport,
            identity,
            leases: Vec::new(),
        }
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    pub fn registry(&self) -> &Arc<PortRegistry> {
        &self.registry
    }

    /// Keys this plugin currently holds leases for
    pub fn leases(&self) -> &[String] {
        &self.leases
    }

    /// Publisher for data the device sends
    pub fn register_tx_device(&mut self, sub_part: &str) -> Result<u16> {
        self.register(Channel::Tx, sub_part)
    }

    /// Subscriber for data the device consumes
    pub fn register_rx_device(&mut self, sub_part: &str) -> Result<u16> {
        self.register(Channel::Rx, sub_part)
    }

    /// Responsor for requests the device answers
    pub fn register_service_device(&mut self, sub_part: &str) -> Result<u16> {
        self.register(Channel::Service, sub_part)
    }

    /// Requestor for requests the device issues
    pub fn register_client_device(&mut self, sub_part: &str) -> Result<u16> {
        self.register(Channel::Client, sub_part)
    }

    fn register(&mut self, channel: Channel, sub_part: &str) -> Result<u16> {
        let identity = self.identity.clone().with_sub_part(sub_part);
        let key = identity.key();
        let (port, newly_leased) = match self.registry.allocate_device_tracked(&identity) {
            Ok(lease) => lease,
            Err(e) => {
                warn!(key = %key, channel = channel.label(), error = %e, "Device registration failed");
                return Err(e.into());
            }
        };

        if let Err(e) = self.bind(channel, port, identity.tag()) {
            warn!(key = %key, port, channel = channel.label(), error = %e, "Device registration failed");
            if newly_leased {
                self.registry.deallocate(&key);
            }
            return Err(e);
        }

        if !self.leases.contains(&key) {
            self.leases.push(key.clone());
        }
        info!(key = %key, port, channel = channel.label(), "Device registered");
        Ok(port)
    }

    fn bind(&self, channel: Channel, port: u16, tag: RoutingTag) -> Result<()> {
        let bound = match channel {
            Channel::Tx => self.transport.initialize_publisher(port, tag).map(drop),
            Channel::Rx => self.transport.initialize_subscriber(port, tag).map(drop),
            Channel::Service => self.transport.initialize_responsor(port, tag).map(drop),
            Channel::Client => self.transport.initialize_requestor(port, tag).map(drop),
        };
        bound.map_err(BridgeError::from)
    }

    /// Release every lease this plugin holds. Sockets are left to the transport's owner.
    pub fn deregister_all(&mut self) -> usize {
        let mut released = 0;
        for key in self.leases.drain(..) {
            if self.registry.deallocate(&key) {
                released += 1;
            }
        }
        released
    }
}

impl std::fmt::Debug for DevicePlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevicePlugin")
            .field("identity", &self.identity)
            .field("leases", &self.leases)
            .finish()
    }
}
