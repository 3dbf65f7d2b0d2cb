//! Socket roles
//!
//! Four roles share one connection engine ([`SocketCore`]): a bound socket
//! accepts any number of peers, a connecting socket keeps one peer and
//! reconnects when the link drops. Each peer gets a reader task and a writer
//! task on the [`IoContext`](crate::IoContext) runtime. Outbound frames queue per
//! peer up to the send high-water mark; inbound frames queue per socket up to
//! the receive high-water mark. Beyond either mark frames are dropped, never
//! blocked on.

mod exchange;
mod publisher;
mod requestor;
mod responsor;
mod subscriber;

pub(crate) use exchange::Exchange;
pub use exchange::ExchangeState;
pub use publisher::Publisher;
pub use requestor::Requestor;
pub use responsor::Responsor;
pub use subscriber::Subscriber;

use crate::connection;
use crate::context::IoContext;
use crate::endpoint::Endpoint;
use crate::error::{Result, TransportError};
use crate::metrics::TransportStats;
use bridge_config::TransportSettings;
use bytes::Bytes;
use codec::RoutingTag;
use crossbeam_channel::{self as channel, Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

/// Construction and teardown shared by the four roles, used by the
/// [`Transport`](crate::Transport) facade to replace and rebuild instances
pub trait SocketRole: Sized + Send + Sync + 'static {
    const ROLE: &'static str;

    fn open(context: &Arc<IoContext>, endpoint: Endpoint, tag: RoutingTag) -> Result<Self>;
    fn endpoint(&self) -> Endpoint;
    fn tag(&self) -> &RoutingTag;
    fn close(&self);
}

macro_rules! impl_socket_role {
    ($($role:ty),+) => {
        $(
            impl SocketRole for $role {
                const ROLE: &'static str = <$role>::ROLE;

                fn open(context: &Arc<IoContext>, endpoint: Endpoint, tag: RoutingTag) -> Result<Self> {
                    <$role>::open(context, endpoint, tag)
                }

                fn endpoint(&self) -> Endpoint {
                    <$role>::endpoint(self)
                }

                fn tag(&self) -> &RoutingTag {
                    <$role>::tag(self)
                }

                fn close(&self) {
                    <$role>::close(self)
                }
            }
        )+
    };
}

impl_socket_role!(Publisher, Subscriber, Requestor, Responsor);

/// Upper bound on how long `close` waits for connection tasks to wind down
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Pause after a failed accept before trying again
const ACCEPT_BACKOFF: Duration = Duration::from_millis(10);

const PEER_POLL_INTERVAL: Duration = Duration::from_millis(5);

pub(crate) type PeerId = u64;

/// One frame as delivered by a peer
pub(crate) struct Inbound {
    pub(crate) peer: PeerId,
    pub(crate) frame: Bytes,
}

pub(crate) struct SocketOptions {
    pub(crate) role: &'static str,
    pub(crate) send_hwm: usize,
    pub(crate) receive_hwm: usize,
    pub(crate) max_frame_size: usize,
    pub(crate) reconnect_interval: Duration,
    /// Whether inbound frames are queued for the owner at all
    pub(crate) receives: bool,
    /// Frames not starting with this prefix are discarded on arrival
    pub(crate) prefix_filter: Option<Bytes>,
}

impl SocketOptions {
    pub(crate) fn new(role: &'static str, settings: &TransportSettings) -> Self {
        Self {
            role,
            send_hwm: settings.send_high_water_mark.max(1),
            receive_hwm: settings.receive_high_water_mark.max(1),
            max_frame_size: settings.max_frame_size,
            reconnect_interval: settings.reconnect_interval(),
            receives: false,
            prefix_filter: None,
        }
    }

    pub(crate) fn receiving(mut self) -> Self {
        self.receives = true;
        self
    }

    pub(crate) fn with_prefix_filter(mut self, prefix: &[u8]) -> Self {
        if !prefix.is_empty() {
            self.prefix_filter = Some(Bytes::copy_from_slice(prefix));
        }
        self
    }
}

struct PeerHandle {
    addr: SocketAddr,
    outbound: mpsc::Sender<Bytes>,
}

#[derive(Default)]
struct PeerTable {
    peers: RwLock<BTreeMap<PeerId, PeerHandle>>,
    next_id: AtomicU64,
    cursor: AtomicUsize,
}

impl PeerTable {
    fn insert(&self, addr: SocketAddr, outbound: mpsc::Sender<Bytes>) -> PeerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.peers.write().insert(id, PeerHandle { addr, outbound });
        id
    }

    fn remove(&self, id: PeerId) -> Option<SocketAddr> {
        self.peers.write().remove(&id).map(|peer| peer.addr)
    }

    /// Dropping the senders ends every writer task
    fn clear(&self) {
        self.peers.write().clear();
    }

    fn len(&self) -> usize {
        self.peers.read().len()
    }

    /// Round-robin pick among connected peers
    fn next(&self) -> Option<PeerId> {
        let peers = self.peers.read();
        if peers.is_empty() {
            return None;
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % peers.len();
        peers.keys().nth(index).copied()
    }

    fn try_send(&self, id: PeerId, frame: Bytes) -> bool {
        match self.peers.read().get(&id) {
            Some(peer) => peer.outbound.try_send(frame).is_ok(),
            None => false,
        }
    }

    /// Number of peers that accepted the frame
    fn broadcast(&self, frame: &Bytes) -> usize {
        self.peers
            .read()
            .values()
            .filter(|peer| peer.outbound.try_send(frame.clone()).is_ok())
            .count()
    }
}

/// State shared between a socket and its connection tasks
struct Shared {
    options: SocketOptions,
    peers: PeerTable,
    inbound: Option<Sender<Inbound>>,
    stats: TransportStats,
}

impl Shared {
    fn deliver(&self, peer: PeerId, frame: Bytes) {
        let Some(inbound) = &self.inbound else {
            return;
        };

        if let Some(prefix) = &self.options.prefix_filter {
            if !frame.starts_with(prefix) {
                self.stats.record_filtered();
                return;
            }
        }

        match inbound.try_send(Inbound { peer, frame }) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.stats.record_dropped();
                trace!(role = self.options.role, peer, "Receive high-water mark reached, frame dropped");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

/// Connection engine behind every socket role
pub(crate) struct SocketCore {
    endpoint: Endpoint,
    shared: Arc<Shared>,
    inbound: Option<Receiver<Inbound>>,
    shutdown: watch::Sender<bool>,
    close_signal: Mutex<Option<Sender<()>>>,
    closed_rx: Receiver<()>,
    tasks_done: Receiver<()>,
    closed: AtomicBool,
    // Keeps the runtime alive for as long as the socket's tasks may run
    _context: Arc<IoContext>,
}

impl SocketCore {
    pub(crate) fn open(
        context: &Arc<IoContext>,
        endpoint: Endpoint,
        options: SocketOptions,
    ) -> Result<Self> {
        let role = options.role;
        let (inbound_tx, inbound_rx) = if options.receives {
            let (tx, rx) = channel::bounded(options.receive_hwm);
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        let shared = Arc::new(Shared {
            options,
            peers: PeerTable::default(),
            inbound: inbound_tx,
            stats: TransportStats::new(),
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (done_tx, done_rx) = channel::bounded::<()>(0);
        let (close_tx, close_rx) = channel::bounded::<()>(0);

        let endpoint = match endpoint {
            Endpoint::Bind(addr) => {
                let listener = std::net::TcpListener::bind(addr)
                    .map_err(|source| TransportError::Bind { address: addr, source })?;
                listener.set_nonblocking(true)?;
                let local = listener.local_addr()?;

                let listener = {
                    let _guard = context.handle().enter();
                    TcpListener::from_std(listener)?
                };
                context
                    .handle()
                    .spawn(accept_loop(listener, shared.clone(), shutdown_rx, done_tx));
                endpoint.with_port(local.port())
            }
            Endpoint::Connect(addr) => {
                context
                    .handle()
                    .spawn(connect_loop(addr, shared.clone(), shutdown_rx, done_tx));
                endpoint
            }
        };

        info!(role, %endpoint, "Socket opened");

        Ok(Self {
            endpoint,
            shared,
            inbound: inbound_rx,
            shutdown: shutdown_tx,
            close_signal: Mutex::new(Some(close_tx)),
            closed_rx: close_rx,
            tasks_done: done_rx,
            closed: AtomicBool::new(false),
            _context: context.clone(),
        })
    }

    pub(crate) fn role(&self) -> &'static str {
        self.shared.options.role
    }

    pub(crate) fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    pub(crate) fn stats(&self) -> &TransportStats {
        &self.shared.stats
    }

    pub(crate) fn peer_count(&self) -> usize {
        self.shared.peers.len()
    }

    pub(crate) fn next_peer(&self) -> Option<PeerId> {
        self.shared.peers.next()
    }

    /// Block until at least `count` peers are connected
    pub(crate) fn wait_for_peers(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.peer_count() < count {
            if self.is_closed() || Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(PEER_POLL_INTERVAL);
        }
        true
    }

    /// Throw away inbound frames nobody has received yet
    pub(crate) fn discard_pending(&self) -> usize {
        self.inbound
            .as_ref()
            .map(|inbound| inbound.try_iter().count())
            .unwrap_or(0)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// False, counted as a send failure, when `frame` exceeds the size limit
    fn admit(&self, frame: &Bytes) -> bool {
        match codec::check_len(frame.len(), self.shared.options.max_frame_size) {
            Ok(()) => true,
            Err(e) => {
                debug!(role = self.role(), error = %e, "Outbound frame rejected");
                self.shared.stats.record_send_failure();
                false
            }
        }
    }

    /// Queue `frame` for every connected peer; returns how many accepted it
    pub(crate) fn broadcast(&self, frame: Bytes) -> usize {
        if !self.admit(&frame) {
            return 0;
        }
        let len = frame.len();
        let accepted = self.shared.peers.broadcast(&frame);
        if accepted > 0 {
            self.shared.stats.record_send(len);
        } else {
            self.shared.stats.record_send_failure();
        }
        accepted
    }

    /// Queue `frame` for one peer
    pub(crate) fn send_to(&self, peer: PeerId, frame: Bytes) -> bool {
        if !self.admit(&frame) {
            return false;
        }
        let len = frame.len();
        let sent = self.shared.peers.try_send(peer, frame);
        if sent {
            self.shared.stats.record_send(len);
        } else {
            self.shared.stats.record_send_failure();
        }
        sent
    }

    /// Next inbound frame. `timeout` of `None` blocks until a frame arrives
    /// or the socket is closed; a timeout yields `Ok(None)`.
    pub(crate) fn recv(&self, timeout: Option<Duration>) -> Result<Option<Inbound>> {
        let role = self.role();
        let inbound = self.inbound.as_ref().ok_or_else(|| {
            TransportError::protocol(format!("{} socket does not receive", role))
        })?;
        if self.is_closed() {
            return Err(TransportError::Closed { role });
        }

        let received = match timeout {
            Some(timeout) => channel::select! {
                recv(inbound) -> msg => Ok(msg.ok()),
                recv(self.closed_rx) -> _ => Err(TransportError::Closed { role }),
                default(timeout) => Ok(None),
            },
            None => channel::select! {
                recv(inbound) -> msg => Ok(msg.ok()),
                recv(self.closed_rx) -> _ => Err(TransportError::Closed { role }),
            },
        }?;

        if let Some(inbound) = &received {
            self.shared.stats.record_receive(inbound.frame.len());
        }
        Ok(received)
    }

    /// Stop all connection tasks and release the port. Blocked receivers wake
    /// with [`TransportError::Closed`]. Idempotent.
    pub(crate) fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.shutdown.send_replace(true);
        self.close_signal.lock().take();
        self.shared.peers.clear();

        // The listener must be gone before a replacement socket rebinds the port
        if let Err(RecvTimeoutError::Timeout) = self.tasks_done.recv_timeout(CLOSE_TIMEOUT) {
            warn!(
                role = self.role(),
                endpoint = %self.endpoint,
                "Connection tasks still running after {:?}",
                CLOSE_TIMEOUT
            );
        }

        info!(role = self.role(), endpoint = %self.endpoint, "Socket closed");
    }
}

impl Drop for SocketCore {
    fn drop(&mut self) {
        self.close();
    }
}

async fn accept_loop(
    listener: TcpListener,
    shared: Arc<Shared>,
    mut shutdown: watch::Receiver<bool>,
    done: Sender<()>,
) {
    let role = shared.options.role;
    loop {
        if *shutdown.borrow() {
            break;
        }

        let accepted = tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer_addr)) => {
                let session = run_session(stream, peer_addr, shared.clone(), shutdown.clone());
                let done = done.clone();
                tokio::spawn(async move {
                    session.await;
                    drop(done);
                });
            }
            Err(e) => {
                warn!(role, error = %e, "Accept failed");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }

    drop(listener);
    debug!(role, "Listener released");
}

async fn connect_loop(
    addr: SocketAddr,
    shared: Arc<Shared>,
    mut shutdown: watch::Receiver<bool>,
    _done: Sender<()>,
) {
    let role = shared.options.role;
    loop {
        if *shutdown.borrow() {
            break;
        }

        let attempt = tokio::select! {
            _ = shutdown.changed() => break,
            attempt = TcpStream::connect(addr) => attempt,
        };

        match attempt {
            Ok(stream) => run_session(stream, addr, shared.clone(), shutdown.clone()).await,
            Err(e) => trace!(role, %addr, error = %e, "Connect attempt failed"),
        }

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(shared.options.reconnect_interval) => {}
        }
    }
    debug!(role, %addr, "Connector stopped");
}

/// Drive one peer connection until either side closes it or the socket shuts down
async fn run_session(
    stream: TcpStream,
    peer_addr: SocketAddr,
    shared: Arc<Shared>,
    mut shutdown: watch::Receiver<bool>,
) {
    let role = shared.options.role;
    if let Err(e) = stream.set_nodelay(true) {
        trace!(role, %peer_addr, error = %e, "Failed to set TCP_NODELAY");
    }

    let (mut reader, mut writer) =
        connection::split(stream, peer_addr, shared.options.max_frame_size);
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Bytes>(shared.options.send_hwm);
    let peer = shared.peers.insert(peer_addr, outbound_tx);
    shared.stats.record_peer_connected();
    debug!(role, %peer_addr, peer, "Peer connected");

    let writing = async {
        while let Some(frame) = outbound_rx.recv().await {
            writer.write_frame(&frame).await?;
        }
        Ok::<(), TransportError>(())
    };

    let reading = async {
        while let Some(frame) = reader.read_frame().await? {
            shared.deliver(peer, frame);
        }
        Ok::<(), TransportError>(())
    };

    let outcome = tokio::select! {
        _ = shutdown.changed() => Ok(()),
        result = writing => result,
        result = reading => result,
    };
    writer.shutdown().await;

    shared.peers.remove(peer);
    shared.stats.record_peer_disconnected();
    match outcome {
        Ok(()) => debug!(role, %peer_addr, peer, "Peer disconnected"),
        Err(e) => debug!(role, %peer_addr, peer, error = %e, "Peer connection failed"),
    }
}
