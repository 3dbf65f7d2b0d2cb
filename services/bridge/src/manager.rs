//! Bridge manager: the registry plus its two network surfaces

use crate::control::start_control_channel;
use crate::device_list::start_device_list_service;
use crate::error::Result;
use crate::registry::PortRegistry;
use crate::service::BridgeService;
use bridge_config::BridgeSettings;
use std::sync::Arc;
use tracing::info;
use transport::IoContext;

pub struct BridgeManager {
    registry: Arc<PortRegistry>,
    control: BridgeService,
    device_list: BridgeService,
}

impl BridgeManager {
    /// Build the registry from `settings` and start the lookup channel and device-list service
    pub fn start(context: Arc<IoContext>, settings: &BridgeSettings) -> Result<Self> {
        settings.validate()?;
        let registry = Arc::new(PortRegistry::from_settings(
            &settings.registry,
            &settings.transport,
        )?);
        Self::with_registry(context, registry, settings)
    }

    /// Serve an existing registry
    pub fn with_registry(
        context: Arc<IoContext>,
        registry: Arc<PortRegistry>,
        settings: &BridgeSettings,
    ) -> Result<Self> {
        let control = start_control_channel(
            context.clone(),
            registry.clone(),
            settings.registry.control_port,
        )?;
        let device_list =
            start_device_list_service(context, registry.clone(), settings.registry.service_port)?;

        info!(
            control_port = control.port(),
            service_port = device_list.port(),
            range = ?registry.range(),
            "Bridge manager started"
        );
        Ok(Self {
            registry,
            control,
            device_list,
        })
    }

    pub fn registry(&self) -> &Arc<PortRegistry> {
        &self.registry
    }

    pub fn control_port(&self) -> u16 {
        self.control.port()
    }

    pub fn service_port(&self) -> u16 {
        self.device_list.port()
    }

    /// Stop both services and wait for their threads
    pub fn shutdown(mut self) {
        self.control.stop();
        self.device_list.stop();
        info!(leases = self.registry.len(), "Bridge manager stopped");
    }
}

impl std::fmt::Debug for BridgeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeManager")
            .field("registry", &self.registry)
            .field("control", &self.control)
            .field("device_list", &self.device_list)
            .finish()
    }
}
