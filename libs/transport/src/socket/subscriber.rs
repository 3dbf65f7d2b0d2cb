use super::{SocketCore, SocketOptions};
use crate::context::IoContext;
use crate::endpoint::Endpoint;
use crate::error::{Result, TransportError};
use crate::metrics::TransportStats;
use bytes::Bytes;
use codec::{FrameCodec, RoutingTag};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Receives frames whose leading bytes match this socket's tag.
///
/// Filtering happens on arrival: frames with a foreign prefix never reach
/// the receive queue. An untagged subscriber receives everything.
pub struct Subscriber {
    core: SocketCore,
    codec: FrameCodec,
}

impl Subscriber {
    pub const ROLE: &'static str = "Subscriber";

    /// Bind `port` on the configured host
    pub fn initialize(context: &Arc<IoContext>, port: u16, tag: RoutingTag) -> Result<Self> {
        Self::open(context, Endpoint::bind(context.settings(), port)?, tag)
    }

    pub fn open(context: &Arc<IoContext>, endpoint: Endpoint, tag: RoutingTag) -> Result<Self> {
        let options = SocketOptions::new(Self::ROLE, context.settings())
            .receiving()
            .with_prefix_filter(tag.as_bytes());
        Ok(Self {
            core: SocketCore::open(context, endpoint, options)?,
            codec: FrameCodec::new(tag),
        })
    }

    /// Block until a matching frame arrives and return its payload.
    ///
    /// Returns `None` once the socket is closed.
    pub fn receive(&self) -> Option<Bytes> {
        self.receive_with(None)
    }

    /// Like [`Subscriber::receive`], giving up after `timeout`
    pub fn receive_timeout(&self, timeout: Duration) -> Option<Bytes> {
        self.receive_with(Some(timeout))
    }

    fn receive_with(&self, timeout: Option<Duration>) -> Option<Bytes> {
        match self.core.recv(timeout) {
            Ok(Some(inbound)) => self.codec.accept(&inbound.frame, true),
            Ok(None) => None,
            Err(TransportError::Closed { .. }) => None,
            Err(e) => {
                debug!(error = %e, "Subscriber receive failed");
                None
            }
        }
    }

    pub fn tag(&self) -> &RoutingTag {
        self.codec.tag()
    }

    pub fn endpoint(&self) -> Endpoint {
        self.core.endpoint()
    }

    pub fn port(&self) -> u16 {
        self.core.endpoint().port()
    }

    pub fn peer_count(&self) -> usize {
        self.core.peer_count()
    }

    /// Block until at least `count` peers are connected or `timeout` passes
    pub fn wait_for_peers(&self, count: usize, timeout: Duration) -> bool {
        self.core.wait_for_peers(count, timeout)
    }

    pub fn stats(&self) -> &TransportStats {
        self.core.stats()
    }

    pub fn close(&self) {
        self.core.close();
    }

    pub fn is_closed(&self) -> bool {
        self.core.is_closed()
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("endpoint", &self.core.endpoint())
            .field("tag", self.codec.tag())
            .finish()
    }
}
