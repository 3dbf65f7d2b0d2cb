//! Device worker threads
//!
//! One OS thread per active I/O direction of a device, pumping data between
//! the device's [`MessageQueue`] and its [`Transport`]. Cancellation is
//! cooperative: each loop checks a shared running flag between blocking
//! calls. Stopping clears the flag, closes the sockets so blocked calls
//! return, then joins every thread before the sockets are released.

use crate::error::{Result, TransportError};
use crate::facade::Transport;
use crate::queue::MessageQueue;
use crate::socket::{Publisher, Subscriber};
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Shared "keep running" flag for one device's workers
#[derive(Clone, Debug)]
pub struct WorkerToken {
    running: Arc<AtomicBool>,
}

impl WorkerToken {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

impl Default for WorkerToken {
    fn default() -> Self {
        Self::new()
    }
}

/// The worker threads of one device
pub struct DeviceWorkers {
    device: String,
    transport: Arc<Transport>,
    token: WorkerToken,
    handles: Vec<(String, JoinHandle<()>)>,
}

impl DeviceWorkers {
    pub fn new(device: impl Into<String>, transport: Arc<Transport>) -> Self {
        Self {
            device: device.into(),
            transport,
            token: WorkerToken::new(),
            handles: Vec::new(),
        }
    }

    pub fn token(&self) -> WorkerToken {
        self.token.clone()
    }

    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Run `work` on a named thread sharing this device's running flag
    pub fn spawn<F>(&mut self, label: &str, work: F) -> Result<()>
    where
        F: FnOnce(WorkerToken) + Send + 'static,
    {
        let name = format!("{}-{}", self.device, label);
        let token = self.token.clone();
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || work(token))
            .map_err(|e| TransportError::io(format!("Failed to spawn worker {}", name), e))?;

        debug!(worker = %name, "Worker started");
        self.handles.push((name, handle));
        Ok(())
    }

    /// Drain `queue` into the transport's publisher
    pub fn spawn_sender(&mut self, queue: Arc<MessageQueue<Bytes>>) -> Result<()> {
        let publisher = self
            .transport
            .publisher()
            .ok_or(TransportError::NotInitialized { role: Publisher::ROLE })?;
        self.spawn("tx", move |token| run_sender(&token, &publisher, &queue))
    }

    /// Fill `queue` from the transport's subscriber
    pub fn spawn_receiver(&mut self, queue: Arc<MessageQueue<Bytes>>) -> Result<()> {
        let subscriber = self
            .transport
            .subscriber()
            .ok_or(TransportError::NotInitialized { role: Subscriber::ROLE })?;
        self.spawn("rx", move |token| run_receiver(&token, &subscriber, &queue))
    }

    /// Answer requests on the transport's responsor with `handler`
    pub fn spawn_service<H>(&mut self, handler: H) -> Result<()>
    where
        H: FnMut(&[u8]) -> Vec<u8> + Send + 'static,
    {
        if self.transport.responsor().is_none() {
            return Err(TransportError::NotInitialized {
                role: crate::socket::Responsor::ROLE,
            });
        }
        let transport = self.transport.clone();
        self.spawn("service", move |token| run_service(&token, &transport, handler))
    }

    pub fn is_running(&self) -> bool {
        self.token.is_running()
    }

    /// Clear the running flag, wake blocked calls and join every thread
    pub fn stop(&mut self) {
        self.token.stop();
        self.transport.close();

        for (name, handle) in self.handles.drain(..) {
            if handle.join().is_err() {
                error!(worker = %name, "Worker panicked");
            } else {
                debug!(worker = %name, "Worker joined");
            }
        }
    }
}

impl Drop for DeviceWorkers {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Sender loop: queue -> publisher, recording how long each publish takes
pub fn run_sender(token: &WorkerToken, publisher: &Publisher, queue: &MessageQueue<Bytes>) {
    let mut published = 0u64;
    let mut dropped = 0u64;

    while token.is_running() {
        let Some(payload) = queue.pop() else {
            continue;
        };

        let started = Instant::now();
        if publisher.publish(&payload) {
            publisher.stats().record_transport_time(started.elapsed());
            published += 1;
        } else {
            dropped += 1;
        }
    }

    info!(port = publisher.port(), published, dropped, "Sender stopped");
}

/// Receiver loop: subscriber -> queue
pub fn run_receiver(token: &WorkerToken, subscriber: &Subscriber, queue: &MessageQueue<Bytes>) {
    let mut received = 0u64;
    let mut dropped = 0u64;

    while token.is_running() {
        match subscriber.receive() {
            Some(payload) => {
                if queue.push(payload) {
                    received += 1;
                } else {
                    dropped += 1;
                }
            }
            None if subscriber.is_closed() => break,
            None => {}
        }
    }

    info!(port = subscriber.port(), received, dropped, "Receiver stopped");
}

/// Service loop: request -> `handler` -> reply.
///
/// A poisoned responsor is discarded and rebuilt on the same port; any other
/// error ends the loop.
pub fn run_service<H>(token: &WorkerToken, transport: &Transport, mut handler: H)
where
    H: FnMut(&[u8]) -> Vec<u8>,
{
    let mut served = 0u64;

    while token.is_running() {
        let Some(responsor) = transport.responsor() else {
            warn!("Service worker has no responsor");
            break;
        };

        let outcome = responsor.receive_request().and_then(|request| match request {
            Some(request) => {
                let reply = handler(&request);
                responsor.send_response(&reply).map(|_| true)
            }
            None => Ok(false),
        });

        match outcome {
            Ok(true) => served += 1,
            Ok(false) => {}
            Err(TransportError::ProtocolViolation { .. }) if token.is_running() => {
                warn!(port = responsor.port(), "Rebuilding responsor after protocol violation");
                drop(responsor);
                if let Err(e) = transport.reinitialize_responsor() {
                    error!(error = %e, "Failed to rebuild responsor");
                    break;
                }
            }
            Err(e) => {
                if token.is_running() {
                    warn!(error = %e, "Service worker stopping");
                }
                break;
            }
        }
    }

    info!(served, "Service stopped");
}
