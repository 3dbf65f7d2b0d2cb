//! Port registry
//!
//! Leases one TCP port per device identity from the ephemeral range. The
//! lease table is the single source of truth; the hierarchical device map is
//! derived from it on demand. OS-level availability checks run without the
//! table lock held, and the winner is re-checked under the lock before the
//! lease is recorded, so concurrent registrations never share a port.

use crate::error::RegistryError;
use crate::identity::DeviceIdentity;
use bridge_config::{ConfigError, RegistrySettings, TransportSettings};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::{IpAddr, Ipv4Addr, TcpListener};
use std::ops::RangeInclusive;
use std::sync::Arc;
use tracing::{info, warn};

/// model -> device type -> part -> sub-part -> port
pub type DeviceMap = BTreeMap<String, BTreeMap<String, BTreeMap<String, BTreeMap<String, u16>>>>;

/// OS-level check that nothing else holds a port
pub trait PortProbe: Send + Sync {
    fn is_available(&self, port: u16) -> bool;
}

impl<F> PortProbe for F
where
    F: Fn(u16) -> bool + Send + Sync,
{
    fn is_available(&self, port: u16) -> bool {
        self(port)
    }
}

/// Treats a port as free when a listener can be bound to it.
///
/// The check binds exactly the way device sockets do, through
/// `std::net::TcpListener::bind`, which sets `SO_REUSEADDR` on Unix. A port
/// whose only remaining connections sit in `TIME_WAIT` therefore counts as
/// free, and a device socket can bind it. A port with a live listener never
/// does. The answer can go stale before the device socket binds; callers
/// release the lease when that bind fails.
#[derive(Debug, Clone, Copy)]
pub struct BindProbe {
    host: IpAddr,
}

impl BindProbe {
    pub fn new(host: IpAddr) -> Self {
        Self { host }
    }

    /// Probe on the host device sockets will bind to
    pub fn from_settings(settings: &TransportSettings) -> Result<Self, ConfigError> {
        Ok(Self::new(settings.bind_ip()?))
    }
}

impl Default for BindProbe {
    fn default() -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::LOCALHOST))
    }
}

impl PortProbe for BindProbe {
    fn is_available(&self, port: u16) -> bool {
        TcpListener::bind((self.host, port)).is_ok()
    }
}

#[derive(Debug, Clone)]
struct Lease {
    port: u16,
    identity: Option<DeviceIdentity>,
}

pub struct PortRegistry {
    leases: Mutex<HashMap<String, Lease>>,
    range: RangeInclusive<u16>,
    probe: Arc<dyn PortProbe>,
}

impl PortRegistry {
    pub fn new(settings: &RegistrySettings, probe: Arc<dyn PortProbe>) -> Self {
        Self::with_range(settings.port_range_start..=settings.port_range_end, probe)
    }

    pub fn with_range(range: RangeInclusive<u16>, probe: Arc<dyn PortProbe>) -> Self {
        Self {
            leases: Mutex::new(HashMap::new()),
            range,
            probe,
        }
    }

    /// Registry over the configured range, probing the configured bind host
    pub fn from_settings(
        registry: &RegistrySettings,
        transport: &TransportSettings,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(registry, Arc::new(BindProbe::from_settings(transport)?)))
    }

    pub fn range(&self) -> RangeInclusive<u16> {
        self.range.clone()
    }

    /// Lease a port for `key`, or return the port it already holds
    pub fn allocate(&self, key: &str) -> Result<u16, RegistryError> {
        self.lease(key, None).map(|(port, _)| port)
    }

    /// Lease a port for a structured identity so it shows up in [`PortRegistry::device_map`]
    pub fn allocate_device(&self, identity: &DeviceIdentity) -> Result<u16, RegistryError> {
        self.allocate_device_tracked(identity).map(|(port, _)| port)
    }

    /// [`PortRegistry::allocate_device`] that also reports whether this call
    /// created the lease. Decided under the registry lock, so of several
    /// concurrent callers exactly one sees `true`.
    pub fn allocate_device_tracked(
        &self,
        identity: &DeviceIdentity,
    ) -> Result<(u16, bool), RegistryError> {
        self.lease(&identity.key(), Some(identity))
    }

    /// [`PortRegistry::allocate`] with failures collapsed to the sentinel port 0
    pub fn allocate_or_zero(&self, key: &str) -> u16 {
        self.allocate(key).unwrap_or(0)
    }

    fn lease(
        &self,
        key: &str,
        identity: Option<&DeviceIdentity>,
    ) -> Result<(u16, bool), RegistryError> {
        if key.is_empty() {
            warn!("Refusing to lease a port for an empty identity key");
            return Err(RegistryError::EmptyKey);
        }

        loop {
            let leased: HashSet<u16> = {
                let mut leases = self.leases.lock();
                if let Some(existing) = leases.get_mut(key) {
                    if existing.identity.is_none() {
                        existing.identity = identity.cloned();
                    }
                    warn!(key, port = existing.port, "Identity key already holds a lease");
                    return Ok((existing.port, false));
                }
                leases.values().map(|lease| lease.port).collect()
            };

            let candidate = self
                .range
                .clone()
                .find(|port| !leased.contains(port) && self.probe.is_available(*port));

            let Some(port) = candidate else {
                warn!(
                    key,
                    start = *self.range.start(),
                    end = *self.range.end(),
                    "No free port left for identity"
                );
                return Err(RegistryError::Exhausted {
                    key: key.to_string(),
                    start: *self.range.start(),
                    end: *self.range.end(),
                });
            };

            let mut leases = self.leases.lock();
            if let Some(existing) = leases.get(key) {
                warn!(key, port = existing.port, "Identity key already holds a lease");
                return Ok((existing.port, false));
            }
            // Another identity took this port while we were probing
            if leases.values().any(|lease| lease.port == port) {
                continue;
            }

            leases.insert(
                key.to_string(),
                Lease {
                    port,
                    identity: identity.cloned(),
                },
            );
            info!(key, port, "Port leased");
            return Ok((port, true));
        }
    }

    /// Release the lease held by `key`. Returns `false` (and warns) if there was none.
    pub fn deallocate(&self, key: &str) -> bool {
        let removed = self.leases.lock().remove(key);
        match removed {
            Some(lease) => {
                info!(key, port = lease.port, "Port released");
                true
            }
            None => {
                warn!(key, "No lease to release for identity");
                false
            }
        }
    }

    pub fn lookup(&self, key: &str) -> Option<u16> {
        self.leases.lock().get(key).map(|lease| lease.port)
    }

    /// Copy of every lease whose key starts with `prefix` (all when `None` or empty)
    pub fn list_assignments(&self, prefix: Option<&str>) -> BTreeMap<String, u16> {
        let prefix = prefix.unwrap_or_default();
        self.leases
            .lock()
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, lease)| (key.clone(), lease.port))
            .collect()
    }

    /// Nested view of the leases that were made with a structured identity,
    /// limited to models starting with `model_filter`
    pub fn device_map(&self, model_filter: Option<&str>) -> DeviceMap {
        let model_filter = model_filter.unwrap_or_default();
        let mut map = DeviceMap::new();

        for lease in self.leases.lock().values() {
            let Some(identity) = &lease.identity else {
                continue;
            };
            if !identity.model.starts_with(model_filter) {
                continue;
            }
            map.entry(identity.model.clone())
                .or_default()
                .entry(identity.device_type.clone())
                .or_default()
                .entry(identity.part.clone())
                .or_default()
                .insert(identity.sub_part.clone(), lease.port);
        }
        map
    }

    pub fn len(&self) -> usize {
        self.leases.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.leases.lock().is_empty()
    }
}

impl std::fmt::Debug for PortRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortRegistry")
            .field("range", &self.range)
            .field("leases", &self.len())
            .finish()
    }
}
