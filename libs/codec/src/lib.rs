//! # Simbridge Codec - Tagged Frame Rules
//!
//! ## Purpose
//!
//! This crate is the "rules" layer of the device transport: it defines what a
//! frame looks like on the wire and how a device's routing tag is derived. It
//! does not own sockets or threads.
//!
//! ## Frame Layout
//!
//! ```text
//! [ tag: tag_width bytes ][ payload: remaining bytes ]
//! ```
//!
//! There is no length prefix inside a frame; the payload length is implied by
//! the total frame length the transport delivers. A tag width of 0 disables
//! tagging and the whole frame is payload.
//!
//! ## Routing Tags
//!
//! A device's tag is the 64-bit FNV-1a hash of its composite identity key,
//! written little-endian. Every process that knows the identity key derives the
//! same tag, so peers can filter a shared broadcast channel without exchanging
//! any registration data.
//!
//! ## What This Crate Does NOT Contain
//! - Socket management or connection handling (belongs in transport/)
//! - Payload serialization schemas (owned by higher layers)

pub mod constants;
pub mod error;
pub mod frame;
pub mod tag;

pub use constants::{DEFAULT_TAG_WIDTH, MAX_TAG_WIDTH};
pub use error::FrameError;
pub use frame::{check_len, decode, encode, FrameCodec};
pub use tag::{identity_hash, RoutingTag};
