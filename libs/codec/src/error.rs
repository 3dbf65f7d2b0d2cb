//! Frame-level errors
//!
//! Decode failures are expected on a shared broadcast channel: a frame meant
//! for another device is a normal occurrence. Callers map these errors to
//! "no message" rather than escalating them.

use thiserror::Error;

/// Reasons a received frame is rejected
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Frame is shorter than the tag it must carry
    #[error("Frame too short: {len} bytes cannot hold a {tag_width}-byte tag")]
    Truncated { len: usize, tag_width: usize },

    /// Leading bytes do not match the expected routing tag
    #[error("Tag mismatch: frame is addressed to another device")]
    TagMismatch,

    /// Expected tag width differs from the codec's configured width
    #[error("Tag width mismatch: codec uses {configured} bytes, expected tag has {expected}")]
    WidthMismatch { configured: usize, expected: usize },

    /// Tag wider than a routing hash
    #[error("Tag width {width} exceeds maximum {max}")]
    TagTooWide { width: usize, max: usize },

    /// Frame longer than the connection accepts or the length header can carry
    #[error("Frame of {len} bytes exceeds maximum {max}")]
    TooLarge { len: usize, max: usize },
}

impl FrameError {
    /// True when the frame was well-formed but addressed elsewhere
    pub fn is_foreign(&self) -> bool {
        matches!(self, FrameError::TagMismatch)
    }
}
