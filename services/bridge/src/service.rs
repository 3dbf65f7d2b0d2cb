//! Untagged request/reply services hosted by the bridge
//!
//! The bridge's own network surfaces (the lookup channel and the device-list
//! service) are ordinary devices: an untagged Responsor on a well-known port
//! driven by one service worker thread.

use crate::error::Result;
use codec::RoutingTag;
use std::sync::Arc;
use tracing::info;
use transport::{DeviceWorkers, IoContext, Transport};

pub struct BridgeService {
    name: String,
    port: u16,
    workers: DeviceWorkers,
}

impl BridgeService {
    /// Bind an untagged Responsor on `port` and answer every request with `handler`
    pub fn start<H>(name: &str, context: Arc<IoContext>, port: u16, handler: H) -> Result<Self>
    where
        H: FnMut(&[u8]) -> Vec<u8> + Send + 'static,
    {
        let transport = Arc::new(Transport::with_tag_width(context, 0)?);
        let responsor = transport.initialize_responsor(port, RoutingTag::untagged())?;
        let port = responsor.port();

        let mut workers = DeviceWorkers::new(name, transport);
        workers.spawn_service(handler)?;

        info!(service = name, port, "Bridge service listening");
        Ok(Self {
            name: name.to_string(),
            port,
            workers,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Port actually bound (differs from the requested one when 0 was asked for)
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_running(&self) -> bool {
        self.workers.is_running()
    }

    pub fn stop(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        self.workers.stop();
        self.workers.transport().destroy();
        info!(service = %self.name, port = self.port, "Bridge service stopped");
    }
}

impl Drop for BridgeService {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for BridgeService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeService")
            .field("name", &self.name)
            .field("port", &self.port)
            .field("running", &self.is_running())
            .finish()
    }
}
