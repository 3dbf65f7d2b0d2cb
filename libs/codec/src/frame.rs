//! Tagged frame encoding and decoding
//!
//! `encode` writes the tag first and the payload immediately after it.
//! `decode` optionally checks the tag and returns the payload as a zero-copy
//! slice of the received frame.

use crate::error::FrameError;
use crate::tag::RoutingTag;
use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

/// Build a frame: `tag` followed by `payload`, no length prefix.
pub fn encode(tag: &[u8], payload: &[u8]) -> Bytes {
    let mut frame = BytesMut::with_capacity(tag.len() + payload.len());
    frame.put_slice(tag);
    frame.put_slice(payload);
    frame.freeze()
}

/// Strip a `tag_width`-byte tag from `frame` and return the payload.
///
/// When `expected` is supplied and `tag_width > 0` the leading bytes must match
/// it byte-for-byte. With `tag_width == 0` nothing is filtered and the whole
/// frame is payload.
pub fn decode(frame: &Bytes, tag_width: usize, expected: Option<&[u8]>) -> Result<Bytes, FrameError> {
    if frame.len() < tag_width {
        return Err(FrameError::Truncated {
            len: frame.len(),
            tag_width,
        });
    }

    if let Some(expected) = expected {
        if tag_width > 0 {
            if expected.len() != tag_width {
                return Err(FrameError::WidthMismatch {
                    configured: tag_width,
                    expected: expected.len(),
                });
            }
            if &frame[..tag_width] != expected {
                return Err(FrameError::TagMismatch);
            }
        }
    }

    Ok(frame.slice(tag_width..))
}

/// Reject a frame that does not fit in `max` bytes or a 4-byte length header
pub fn check_len(len: usize, max: usize) -> Result<(), FrameError> {
    let max = max.min(u32::MAX as usize);
    if len > max {
        return Err(FrameError::TooLarge { len, max });
    }
    Ok(())
}

/// Per-socket framing state: the device's tag, fixed for the socket's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameCodec {
    tag: RoutingTag,
}

impl FrameCodec {
    pub fn new(tag: RoutingTag) -> Self {
        Self { tag }
    }

    /// Codec that neither writes nor checks a tag
    pub fn untagged() -> Self {
        Self::new(RoutingTag::untagged())
    }

    pub fn tag(&self) -> &RoutingTag {
        &self.tag
    }

    pub fn width(&self) -> usize {
        self.tag.width()
    }

    /// Encode `payload` behind this codec's tag
    pub fn encode(&self, payload: &[u8]) -> Bytes {
        encode(self.tag.as_bytes(), payload)
    }

    /// Encode into a reusable buffer, returning the frame and leaving the
    /// buffer's spare capacity for the next call
    pub fn encode_into(&self, buffer: &mut BytesMut, payload: &[u8]) -> Bytes {
        buffer.clear();
        buffer.reserve(self.width() + payload.len());
        buffer.put_slice(self.tag.as_bytes());
        buffer.put_slice(payload);
        buffer.split().freeze()
    }

    /// Decode a received frame, checking the tag only when `check_tag` is set
    pub fn decode(&self, frame: &Bytes, check_tag: bool) -> Result<Bytes, FrameError> {
        let expected = check_tag.then(|| self.tag.as_bytes());
        let result = decode(frame, self.width(), expected);
        if let Err(ref e) = result {
            trace!(len = frame.len(), tag = %self.tag, "Frame rejected: {}", e);
        }
        result
    }

    /// Decode, mapping every rejection to "no data"
    pub fn accept(&self, frame: &Bytes, check_tag: bool) -> Option<Bytes> {
        self.decode(frame, check_tag).ok()
    }

    /// Transport-level prefix filter used before a frame is queued
    pub fn matches(&self, frame: &[u8]) -> bool {
        frame.starts_with(self.tag.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let frame = encode(&[0xAA, 0xBB], &[1, 2, 3]);
        assert_eq!(&frame[..], &[0xAA, 0xBB, 1, 2, 3]);
    }

    #[test]
    fn test_check_len_bounds() {
        assert_eq!(check_len(16, 16), Ok(()));
        assert_eq!(check_len(17, 16), Err(FrameError::TooLarge { len: 17, max: 16 }));
        assert_eq!(
            check_len(u32::MAX as usize + 1, usize::MAX),
            Err(FrameError::TooLarge {
                len: u32::MAX as usize + 1,
                max: u32::MAX as usize,
            })
        );
    }

    #[test]
    fn test_decode_strips_tag() {
        let frame = encode(b"12345678", b"payload");
        let payload = decode(&frame, 8, Some(b"12345678")).unwrap();
        assert_eq!(&payload[..], b"payload");
    }

    #[test]
    fn test_decode_without_expected_tag_skips_check() {
        let frame = encode(b"12345678", b"payload");
        let payload = decode(&frame, 8, None).unwrap();
        assert_eq!(&payload[..], b"payload");
    }

    #[test]
    fn test_decode_rejects_foreign_tag() {
        let frame = encode(b"AAAAAAAA", b"payload");
        assert_eq!(
            decode(&frame, 8, Some(b"BBBBBBBB")),
            Err(FrameError::TagMismatch)
        );
    }

    #[test]
    fn test_decode_rejects_short_frame() {
        let frame = Bytes::from_static(&[1, 2, 3]);
        assert_eq!(
            decode(&frame, 8, None),
            Err(FrameError::Truncated { len: 3, tag_width: 8 })
        );
    }

    #[test]
    fn test_decode_rejects_width_mismatch() {
        let frame = encode(b"12345678", b"x");
        assert!(matches!(
            decode(&frame, 8, Some(b"1234")),
            Err(FrameError::WidthMismatch { configured: 8, expected: 4 })
        ));
    }

    #[test]
    fn test_zero_width_is_all_payload() {
        let frame = Bytes::from_static(b"LASERrobot1");
        let payload = decode(&frame, 0, Some(b"ignored")).unwrap();
        assert_eq!(&payload[..], b"LASERrobot1");
    }

    #[test]
    fn test_empty_payload_round_trips() {
        let codec = FrameCodec::new(RoutingTag::for_identity("IMUrobot1base"));
        let frame = codec.encode(&[]);
        assert_eq!(frame.len(), 8);
        assert!(codec.decode(&frame, true).unwrap().is_empty());
    }

    #[test]
    fn test_encode_into_reuses_buffer() {
        let codec = FrameCodec::new(RoutingTag::from_bytes(b"ab").unwrap());
        let mut buffer = BytesMut::new();
        let first = codec.encode_into(&mut buffer, b"one");
        let second = codec.encode_into(&mut buffer, b"two");
        assert_eq!(&first[..], b"abone");
        assert_eq!(&second[..], b"abtwo");
    }

    #[test]
    fn test_matches_prefix() {
        let codec = FrameCodec::new(RoutingTag::from_bytes(b"ab").unwrap());
        assert!(codec.matches(b"abcdef"));
        assert!(!codec.matches(b"bacdef"));
        assert!(FrameCodec::untagged().matches(b"anything"));
    }
}
