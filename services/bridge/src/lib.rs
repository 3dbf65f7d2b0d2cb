//! # Simbridge Bridge Service
//!
//! Owns the port registry that every simulated device leases its ports from,
//! and exposes it to out-of-process tooling:
//!
//! - a lookup channel (untagged request/reply, default port 25554): identity
//!   key in, decimal port (or `"0"`) out
//! - a JSON device-list service (default port 25555) returning the flat
//!   assignments or the model/type/part/sub-part device map
//!
//! Devices register through [`DevicePlugin`], which leases a port, derives the
//! routing tag from the identity key and binds the matching socket role on
//! the device's own [`transport::Transport`].
//!
//! ```rust,no_run
//! use bridge::{DeviceIdentity, DevicePlugin, PortRegistry};
//! use std::sync::Arc;
//! use transport::{IoContext, Transport};
//!
//! let ctx = IoContext::with_defaults()?;
//! let registry = Arc::new(PortRegistry::from_settings(
//!     &Default::default(),
//!     ctx.settings(),
//! )?);
//! let transport = Arc::new(Transport::new(ctx));
//! let mut lidar = DevicePlugin::new(
//!     registry,
//!     transport,
//!     DeviceIdentity::new("LASER", "robot1", "front_scan"),
//! );
//! let port = lidar.register_tx_device("")?;
//! # let _ = port;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod control;
pub mod device_list;
pub mod error;
pub mod identity;
pub mod logging;
pub mod manager;
pub mod plugin;
pub mod registry;
pub mod service;

pub use control::{lookup_reply, start_control_channel};
pub use device_list::{
    handle_payload, handle_request, start_device_list_service, ServiceRequest, ServiceResponse,
};
pub use error::{BridgeError, RegistryError, Result};
pub use identity::DeviceIdentity;
pub use manager::BridgeManager;
pub use plugin::DevicePlugin;
pub use registry::{BindProbe, DeviceMap, PortProbe, PortRegistry};
pub use service::BridgeService;
