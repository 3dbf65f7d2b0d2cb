use super::{SocketCore, SocketOptions};
use crate::context::IoContext;
use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::metrics::TransportStats;
use bytes::BytesMut;
use codec::{FrameCodec, RoutingTag};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Broadcasts tagged frames to every connected subscriber
pub struct Publisher {
    core: SocketCore,
    codec: FrameCodec,
    scratch: Mutex<BytesMut>,
}

impl Publisher {
    pub const ROLE: &'static str = "Publisher";

    /// Bind `port` on the configured host
    pub fn initialize(context: &Arc<IoContext>, port: u16, tag: RoutingTag) -> Result<Self> {
        Self::open(context, Endpoint::bind(context.settings(), port)?, tag)
    }

    pub fn open(context: &Arc<IoContext>, endpoint: Endpoint, tag: RoutingTag) -> Result<Self> {
        let options = SocketOptions::new(Self::ROLE, context.settings());
        Ok(Self {
            core: SocketCore::open(context, endpoint, options)?,
            codec: FrameCodec::new(tag),
            scratch: Mutex::new(BytesMut::with_capacity(4096)),
        })
    }

    /// Frame `payload` behind this socket's tag and queue it for every peer.
    ///
    /// Returns `false` when no peer accepted the frame: nobody is connected yet,
    /// every peer is over its send high-water mark, or the socket is closed.
    /// Never blocks.
    pub fn publish(&self, payload: &[u8]) -> bool {
        let frame = self.codec.encode_into(&mut self.scratch.lock(), payload);
        self.core.broadcast(frame) > 0
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

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("endpoint", &self.core.endpoint())
            .field("tag", self.codec.tag())
            .finish()
    }
}
