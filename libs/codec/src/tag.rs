//! Routing tag derivation
//!
//! Tags are a fixed-width prefix stamped on every frame of a device so that
//! many devices can share the broadcast nature of publish/subscribe without
//! cross-talk.

use crate::constants::{FNV_OFFSET_BASIS, FNV_PRIME, MAX_TAG_WIDTH};
use crate::error::FrameError;
use std::fmt;

/// 64-bit FNV-1a hash of a composite identity key.
///
/// Stable across processes and platforms, which lets an out-of-process peer
/// compute the same tag from the same key.
pub fn identity_hash(key: &str) -> u64 {
    key.as_bytes().iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Fixed-width routing tag (0..=8 bytes)
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoutingTag {
    bytes: [u8; MAX_TAG_WIDTH],
    width: usize,
}

impl RoutingTag {
    /// Zero-width tag: frames carry payload only and nothing is filtered
    pub const fn untagged() -> Self {
        Self {
            bytes: [0; MAX_TAG_WIDTH],
            width: 0,
        }
    }

    /// Full-width tag from a 64-bit hash, little-endian
    pub fn from_hash(hash: u64) -> Self {
        Self {
            bytes: hash.to_le_bytes(),
            width: MAX_TAG_WIDTH,
        }
    }

    /// Tag for a device's composite identity key
    pub fn for_identity(key: &str) -> Self {
        Self::from_hash(identity_hash(key))
    }

    /// Tag from raw bytes; the width is the slice length
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() > MAX_TAG_WIDTH {
            return Err(FrameError::TagTooWide {
                width: bytes.len(),
                max: MAX_TAG_WIDTH,
            });
        }

        let mut tag = Self::untagged();
        tag.bytes[..bytes.len()].copy_from_slice(bytes);
        tag.width = bytes.len();
        Ok(tag)
    }

    /// Keep only the first `width` bytes. A width of 0 disables tagging.
    pub fn truncated(self, width: usize) -> Result<Self, FrameError> {
        if width > MAX_TAG_WIDTH {
            return Err(FrameError::TagTooWide {
                width,
                max: MAX_TAG_WIDTH,
            });
        }

        let mut tag = Self::untagged();
        let keep = width.min(self.width);
        tag.bytes[..keep].copy_from_slice(&self.bytes[..keep]);
        tag.width = width;
        Ok(tag)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.width]
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn is_untagged(&self) -> bool {
        self.width == 0
    }
}

impl Default for RoutingTag {
    fn default() -> Self {
        Self::untagged()
    }
}

impl fmt::Debug for RoutingTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RoutingTag(")?;
        for byte in self.as_bytes() {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for RoutingTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_untagged() {
            return write!(f, "<untagged>");
        }
        for byte in self.as_bytes() {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}
