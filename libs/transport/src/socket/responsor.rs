use super::{Exchange, ExchangeState, PeerId, SocketCore, SocketOptions};
use crate::context::IoContext;
use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::metrics::TransportStats;
use bytes::Bytes;
use codec::{FrameCodec, RoutingTag};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Server side of a request/reply exchange.
///
/// `receive_request` waits a bounded time (500 ms by default) so a service
/// loop can notice shutdown. A received request must be answered with
/// `send_response` before the next receive; out-of-turn calls poison the
/// socket.
pub struct Responsor {
    core: SocketCore,
    codec: FrameCodec,
    exchange: Exchange,
    pending: Mutex<Option<PeerId>>,
    timeout: Duration,
}

impl Responsor {
    pub const ROLE: &'static str = "Responsor";

    /// Bind `port` on the configured host
    pub fn initialize(context: &Arc<IoContext>, port: u16, tag: RoutingTag) -> Result<Self> {
        Self::open(context, Endpoint::bind(context.settings(), port)?, tag)
    }

    pub fn open(context: &Arc<IoContext>, endpoint: Endpoint, tag: RoutingTag) -> Result<Self> {
        let settings = context.settings();
        let options = SocketOptions::new(Self::ROLE, settings).receiving();
        Ok(Self {
            core: SocketCore::open(context, endpoint, options)?,
            codec: FrameCodec::new(tag),
            exchange: Exchange::new(Self::ROLE),
            pending: Mutex::new(None),
            timeout: settings.responsor_timeout(),
        })
    }

    /// Wait up to the receive timeout for a request, without a tag check.
    ///
    /// `Ok(None)` on timeout; the socket stays ready to receive.
    pub fn receive_request(&self) -> Result<Option<Bytes>> {
        self.receive_request_checked(false)
    }

    /// Like [`Responsor::receive_request`]; with `check_tag` a request carrying
    /// a foreign tag is discarded and reported as `Ok(None)`.
    pub fn receive_request_checked(&self, check_tag: bool) -> Result<Option<Bytes>> {
        self.exchange.check("receive_request", ExchangeState::Idle)?;

        let Some(inbound) = self.core.recv(Some(self.timeout))? else {
            return Ok(None);
        };

        let Some(payload) = self.codec.accept(&inbound.frame, check_tag) else {
            debug!(peer = inbound.peer, "Request rejected by tag check");
            return Ok(None);
        };

        *self.pending.lock() = Some(inbound.peer);
        self.exchange.transition(
            "receive_request",
            ExchangeState::Idle,
            ExchangeState::AwaitingReply,
        )?;
        Ok(Some(payload))
    }

    /// Answer the request last received. `Ok(false)` when the requester has
    /// gone away or its queue is full; the exchange completes either way.
    pub fn send_response(&self, payload: &[u8]) -> Result<bool> {
        self.exchange.transition(
            "send_response",
            ExchangeState::AwaitingReply,
            ExchangeState::Idle,
        )?;

        let Some(peer) = self.pending.lock().take() else {
            return Ok(false);
        };
        Ok(self.core.send_to(peer, self.codec.encode(payload)))
    }

    pub fn state(&self) -> ExchangeState {
        self.exchange.state()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
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

impl std::fmt::Debug for Responsor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Responsor")
            .field("endpoint", &self.core.endpoint())
            .field("tag", self.codec.tag())
            .field("state", &self.exchange.state())
            .finish()
    }
}
