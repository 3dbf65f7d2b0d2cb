//! Per-device transport facade
//!
//! A `Transport` belongs to exactly one device and holds at most one socket
//! of each role. Initializing a role that already exists closes the old
//! instance first, so the port can be bound again. Roles are handed out as
//! `Arc`s so worker threads can block on them while the owner closes the
//! sockets from another thread.

use crate::context::IoContext;
use crate::endpoint::Endpoint;
use crate::error::{Result, TransportError};
use crate::socket::{Publisher, Requestor, Responsor, SocketRole, Subscriber};
use bytes::Bytes;
use codec::{RoutingTag, MAX_TAG_WIDTH};
use parking_lot::RwLock;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info};

type Slot<R> = RwLock<Option<Arc<R>>>;

pub struct Transport {
    context: Arc<IoContext>,
    tag_width: usize,
    publisher: Slot<Publisher>,
    subscriber: Slot<Subscriber>,
    requestor: Slot<Requestor>,
    responsor: Slot<Responsor>,
}

impl Transport {
    /// Facade using the context's configured tag width
    pub fn new(context: Arc<IoContext>) -> Self {
        let tag_width = context.settings().tag_width.min(MAX_TAG_WIDTH);
        Self::build(context, tag_width)
    }

    /// Facade with an explicit tag width; 0 disables tagging
    pub fn with_tag_width(context: Arc<IoContext>, tag_width: usize) -> Result<Self> {
        if tag_width > MAX_TAG_WIDTH {
            return Err(TransportError::configuration(
                format!("tag width {} exceeds {}", tag_width, MAX_TAG_WIDTH),
                Some("transport.tag_width"),
            ));
        }
        Ok(Self::build(context, tag_width))
    }

    fn build(context: Arc<IoContext>, tag_width: usize) -> Self {
        Self {
            context,
            tag_width,
            publisher: RwLock::new(None),
            subscriber: RwLock::new(None),
            requestor: RwLock::new(None),
            responsor: RwLock::new(None),
        }
    }

    pub fn context(&self) -> &Arc<IoContext> {
        &self.context
    }

    pub fn tag_width(&self) -> usize {
        self.tag_width
    }

    pub fn initialize_publisher(&self, port: u16, tag: RoutingTag) -> Result<Arc<Publisher>> {
        self.install(&self.publisher, self.bind_endpoint(port)?, tag)
    }

    pub fn initialize_subscriber(&self, port: u16, tag: RoutingTag) -> Result<Arc<Subscriber>> {
        self.install(&self.subscriber, self.bind_endpoint(port)?, tag)
    }

    pub fn initialize_requestor(&self, port: u16, tag: RoutingTag) -> Result<Arc<Requestor>> {
        self.install(&self.requestor, self.bind_endpoint(port)?, tag)
    }

    pub fn initialize_responsor(&self, port: u16, tag: RoutingTag) -> Result<Arc<Responsor>> {
        self.install(&self.responsor, self.bind_endpoint(port)?, tag)
    }

    /// Publisher that connects out to a bound peer instead of binding
    pub fn connect_publisher(&self, host: IpAddr, port: u16, tag: RoutingTag) -> Result<Arc<Publisher>> {
        self.install(&self.publisher, Endpoint::connect(host, port), tag)
    }

    pub fn connect_subscriber(&self, host: IpAddr, port: u16, tag: RoutingTag) -> Result<Arc<Subscriber>> {
        self.install(&self.subscriber, Endpoint::connect(host, port), tag)
    }

    pub fn connect_requestor(&self, host: IpAddr, port: u16, tag: RoutingTag) -> Result<Arc<Requestor>> {
        self.install(&self.requestor, Endpoint::connect(host, port), tag)
    }

    pub fn connect_responsor(&self, host: IpAddr, port: u16, tag: RoutingTag) -> Result<Arc<Responsor>> {
        self.install(&self.responsor, Endpoint::connect(host, port), tag)
    }

    pub fn publisher(&self) -> Option<Arc<Publisher>> {
        self.publisher.read().clone()
    }

    pub fn subscriber(&self) -> Option<Arc<Subscriber>> {
        self.subscriber.read().clone()
    }

    pub fn requestor(&self) -> Option<Arc<Requestor>> {
        self.requestor.read().clone()
    }

    pub fn responsor(&self) -> Option<Arc<Responsor>> {
        self.responsor.read().clone()
    }

    /// Publish through the publisher role; `false` if there is none
    pub fn publish(&self, payload: &[u8]) -> bool {
        self.publisher()
            .map(|publisher| publisher.publish(payload))
            .unwrap_or(false)
    }

    /// Blocking receive on the subscriber role; `None` if there is none
    pub fn receive(&self) -> Option<Bytes> {
        self.subscriber()?.receive()
    }

    pub fn send_request(&self, payload: &[u8]) -> Result<bool> {
        self.required(&self.requestor)?.send_request(payload)
    }

    pub fn receive_response(&self) -> Result<Option<Bytes>> {
        self.required(&self.requestor)?.receive_response()
    }

    pub fn receive_request(&self) -> Result<Option<Bytes>> {
        self.required(&self.responsor)?.receive_request()
    }

    pub fn send_response(&self, payload: &[u8]) -> Result<bool> {
        self.required(&self.responsor)?.send_response(payload)
    }

    /// Replace the requestor with a fresh instance on the same endpoint and tag
    pub fn reinitialize_requestor(&self) -> Result<Arc<Requestor>> {
        self.rebuild(&self.requestor)
    }

    /// Replace the responsor with a fresh instance on the same endpoint and tag
    pub fn reinitialize_responsor(&self) -> Result<Arc<Responsor>> {
        self.rebuild(&self.responsor)
    }

    /// Close every socket but keep the instances, waking any blocked worker
    pub fn close(&self) {
        close_slot(&self.publisher);
        close_slot(&self.subscriber);
        close_slot(&self.requestor);
        close_slot(&self.responsor);
    }

    /// Close and release every role. Safe on a partially initialized
    /// transport and safe to call repeatedly.
    pub fn destroy(&self) {
        let released = [
            release_slot(&self.publisher),
            release_slot(&self.subscriber),
            release_slot(&self.requestor),
            release_slot(&self.responsor),
        ]
        .iter()
        .filter(|released| **released)
        .count();

        if released > 0 {
            debug!(released, "Transport destroyed");
        }
    }

    fn bind_endpoint(&self, port: u16) -> Result<Endpoint> {
        Endpoint::bind(self.context.settings(), port)
    }

    fn install<R: SocketRole>(&self, slot: &Slot<R>, endpoint: Endpoint, tag: RoutingTag) -> Result<Arc<R>> {
        // Tags wider than the configured width are cut down; narrower ones are kept
        let tag = if tag.width() > self.tag_width {
            tag.truncated(self.tag_width)?
        } else {
            tag
        };

        let mut slot = slot.write();
        if let Some(previous) = slot.take() {
            debug!(role = R::ROLE, endpoint = %previous.endpoint(), "Replacing socket");
            previous.close();
        }

        let role = Arc::new(R::open(&self.context, endpoint, tag)?);
        info!(role = R::ROLE, endpoint = %role.endpoint(), tag = %role.tag(), "Role initialized");
        *slot = Some(role.clone());
        Ok(role)
    }

    fn rebuild<R: SocketRole>(&self, slot: &Slot<R>) -> Result<Arc<R>> {
        let (endpoint, tag) = {
            let current = slot.read();
            let current = current
                .as_ref()
                .ok_or(TransportError::NotInitialized { role: R::ROLE })?;
            (current.endpoint(), *current.tag())
        };
        self.install(slot, endpoint, tag)
    }

    fn required<R: SocketRole>(&self, slot: &Slot<R>) -> Result<Arc<R>> {
        slot.read()
            .clone()
            .ok_or(TransportError::NotInitialized { role: R::ROLE })
    }
}

fn close_slot<R: SocketRole>(slot: &Slot<R>) {
    let role = slot.read().clone();
    if let Some(role) = role {
        role.close();
    }
}

fn release_slot<R: SocketRole>(slot: &Slot<R>) -> bool {
    // Take first so the lock is not held while the socket winds down
    let role = slot.write().take();
    match role {
        Some(role) => {
            role.close();
            true
        }
        None => false,
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("tag_width", &self.tag_width)
            .field("publisher", &self.publisher())
            .field("subscriber", &self.subscriber())
            .field("requestor", &self.requestor())
            .field("responsor", &self.responsor())
            .finish()
    }
}
