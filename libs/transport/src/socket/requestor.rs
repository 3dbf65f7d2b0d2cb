use super::{Exchange, ExchangeState, PeerId, SocketCore, SocketOptions};
use crate::context::IoContext;
use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::metrics::TransportStats;
use bytes::Bytes;
use codec::{FrameCodec, RoutingTag};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Client side of a request/reply exchange.
///
/// Calls must alternate `send_request`, `receive_response`, `send_request`, ...
/// Anything else poisons the socket and every later call fails with
/// [`TransportError::ProtocolViolation`](crate::TransportError::ProtocolViolation).
/// With several peers, requests rotate round-robin and only the peer that was
/// asked can answer.
pub struct Requestor {
    core: SocketCore,
    codec: FrameCodec,
    exchange: Exchange,
    pending: Mutex<Option<PeerId>>,
}

impl Requestor {
    pub const ROLE: &'static str = "Requestor";

    /// Bind `port` on the configured host
    pub fn initialize(context: &Arc<IoContext>, port: u16, tag: RoutingTag) -> Result<Self> {
        Self::open(context, Endpoint::bind(context.settings(), port)?, tag)
    }

    pub fn open(context: &Arc<IoContext>, endpoint: Endpoint, tag: RoutingTag) -> Result<Self> {
        let options = SocketOptions::new(Self::ROLE, context.settings()).receiving();
        Ok(Self {
            core: SocketCore::open(context, endpoint, options)?,
            codec: FrameCodec::new(tag),
            exchange: Exchange::new(Self::ROLE),
            pending: Mutex::new(None),
        })
    }

    /// Send one tagged request.
    ///
    /// `Ok(false)` when no peer is connected or the chosen peer's send queue is
    /// full; the socket stays ready for another attempt.
    pub fn send_request(&self, payload: &[u8]) -> Result<bool> {
        self.exchange.check("send_request", ExchangeState::Idle)?;

        let Some(peer) = self.core.next_peer() else {
            self.core.stats().record_send_failure();
            return Ok(false);
        };

        let stale = self.core.discard_pending();
        if stale > 0 {
            debug!(stale, "Discarded unanswered replies before new request");
        }

        if !self.core.send_to(peer, self.codec.encode(payload)) {
            return Ok(false);
        }

        *self.pending.lock() = Some(peer);
        self.exchange
            .transition("send_request", ExchangeState::Idle, ExchangeState::AwaitingReply)?;
        Ok(true)
    }

    /// Block for the reply to the outstanding request, without a tag check
    pub fn receive_response(&self) -> Result<Option<Bytes>> {
        self.await_reply(None, false)
    }

    /// Block for the reply; with `check_tag` a foreign tag yields `Ok(None)`.
    /// The exchange completes either way.
    pub fn receive_response_checked(&self, check_tag: bool) -> Result<Option<Bytes>> {
        self.await_reply(None, check_tag)
    }

    /// Wait at most `timeout` for the reply. On timeout the request stays
    /// outstanding and this may be called again.
    pub fn receive_response_timeout(
        &self,
        timeout: Duration,
        check_tag: bool,
    ) -> Result<Option<Bytes>> {
        self.await_reply(Some(timeout), check_tag)
    }

    fn await_reply(&self, timeout: Option<Duration>, check_tag: bool) -> Result<Option<Bytes>> {
        self.exchange
            .check("receive_response", ExchangeState::AwaitingReply)?;

        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let pending = *self.pending.lock();

        loop {
            let remaining = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(None);
                    }
                    Some(deadline - now)
                }
                None => None,
            };

            let Some(inbound) = self.core.recv(remaining)? else {
                return Ok(None);
            };

            if Some(inbound.peer) != pending {
                debug!(peer = inbound.peer, "Dropped reply from a peer that was not asked");
                continue;
            }

            self.exchange.transition(
                "receive_response",
                ExchangeState::AwaitingReply,
                ExchangeState::Idle,
            )?;
            self.pending.lock().take();
            return Ok(self.codec.accept(&inbound.frame, check_tag));
        }
    }

    pub fn state(&self) -> ExchangeState {
        self.exchange.state()
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

impl std::fmt::Debug for Requestor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Requestor")
            .field("endpoint", &self.core.endpoint())
            .field("tag", self.codec.tag())
            .field("state", &self.exchange.state())
            .finish()
    }
}
