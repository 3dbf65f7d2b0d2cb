//! # Simbridge Transport
//!
//! Per-device network plumbing for simulated sensors, actuators and services.
//!
//! ## Layers
//!
//! - [`IoContext`]: a small shared tokio runtime that drives every TCP
//!   connection; the API exposed to device code stays blocking.
//! - Socket roles ([`Publisher`], [`Subscriber`], [`Requestor`],
//!   [`Responsor`]): one endpoint each, framing payloads behind the device's
//!   routing tag.
//! - [`Transport`]: the per-device facade holding at most one of each role.
//! - [`MessageQueue`]: bounded FIFO between simulation code and the network,
//!   dropping the oldest half when full.
//! - [`DeviceWorkers`]: the threads that pump queues into sockets and back.
//!
//! Publish and receive failures are expected on a best-effort broadcast
//! channel and are reported as `false`/`None`, never as errors. Calling the
//! request/reply operations out of order is an error and poisons the socket.

pub mod connection;
pub mod context;
pub mod facade;
pub mod endpoint;
pub mod error;
pub mod metrics;
pub mod queue;
pub mod socket;
pub mod worker;

pub use context::IoContext;
pub use facade::Transport;
pub use endpoint::Endpoint;
pub use error::{Result, TransportError};
pub use metrics::{StatsSnapshot, TransportStats};
pub use queue::MessageQueue;
pub use socket::{ExchangeState, Publisher, Requestor, Responsor, SocketRole, Subscriber};
pub use worker::{run_receiver, run_sender, run_service, DeviceWorkers, WorkerToken};

pub use codec::{identity_hash, RoutingTag};
