//! Shared I/O context
//!
//! Every socket role drives its TCP connections on a small multi-thread tokio
//! runtime owned by an `IoContext`. The public socket API stays blocking so that
//! device worker threads never need an async executor of their own.

use crate::error::{Result, TransportError};
use bridge_config::TransportSettings;
use std::sync::Arc;
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::debug;

/// Owner of the background runtime that all sockets of a process share
pub struct IoContext {
    runtime: Option<Runtime>,
    handle: Handle,
    settings: TransportSettings,
}

impl IoContext {
    /// Create a context from validated transport settings
    pub fn new(settings: TransportSettings) -> Result<Arc<Self>> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(settings.io_threads.max(1))
            .thread_name("simbridge-io")
            .enable_io()
            .enable_time()
            .build()
            .map_err(|e| TransportError::io("Failed to start I/O runtime", e))?;

        debug!(io_threads = settings.io_threads, "I/O context started");

        Ok(Arc::new(Self {
            handle: runtime.handle().clone(),
            runtime: Some(runtime),
            settings,
        }))
    }

    /// Context with default transport settings
    pub fn with_defaults() -> Result<Arc<Self>> {
        Self::new(TransportSettings::default())
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn settings(&self) -> &TransportSettings {
        &self.settings
    }
}

impl Drop for IoContext {
    fn drop(&mut self) {
        // Safe from any thread, including a runtime worker
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for IoContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoContext")
            .field("io_threads", &self.settings.io_threads)
            .finish()
    }
}
