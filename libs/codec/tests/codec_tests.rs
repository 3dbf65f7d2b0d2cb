//! # Codec Property Tests
//!
//! Properties that must hold for every tag and payload:
//! - decoding an encoded frame with its own tag yields the original payload
//! - decoding with a different tag of the same width is always rejected
//! - a frame shorter than the tag width is reported, never treated as empty

use bytes::Bytes;
use codec::{decode, encode, FrameCodec, FrameError, RoutingTag};
use proptest::prelude::*;

fn tag_strategy() -> impl Strategy<Value = Vec<u8>> {
    (0usize..=8).prop_flat_map(|width| prop::collection::vec(any::<u8>(), width))
}

proptest! {
    #[test]
    fn prop_round_trip(tag in tag_strategy(), payload in prop::collection::vec(any::<u8>(), 0..512)) {
        let frame = encode(&tag, &payload);
        prop_assert_eq!(frame.len(), tag.len() + payload.len());

        let decoded = decode(&frame, tag.len(), Some(&tag)).unwrap();
        prop_assert_eq!(&decoded[..], &payload[..]);
    }

    #[test]
    fn prop_foreign_tag_rejected(
        (t1, t2) in (1usize..=8).prop_flat_map(|w| (
            prop::collection::vec(any::<u8>(), w),
            prop::collection::vec(any::<u8>(), w),
        )),
        payload in prop::collection::vec(any::<u8>(), 0..128),
    ) {
        prop_assume!(t1 != t2);
        let frame = encode(&t1, &payload);
        prop_assert_eq!(decode(&frame, t1.len(), Some(&t2)), Err(FrameError::TagMismatch));
    }

    #[test]
    fn prop_short_frames_are_reported(width in 1usize..=8, len in 0usize..8) {
        prop_assume!(len < width);
        let frame = Bytes::from(vec![0u8; len]);
        let result = decode(&frame, width, None);
        prop_assert_eq!(result, Err(FrameError::Truncated { len, tag_width: width }));
    }

    #[test]
    fn prop_identity_codecs_filter_each_other(a in "[A-Z]{3,8}[a-z0-9_]{1,16}", b in "[A-Z]{3,8}[a-z0-9_]{1,16}") {
        prop_assume!(a != b);
        let codec_a = FrameCodec::new(RoutingTag::for_identity(&a));
        let codec_b = FrameCodec::new(RoutingTag::for_identity(&b));
        let frame = codec_a.encode(b"scan");

        prop_assert!(codec_a.accept(&frame, true).is_some());
        // FNV-1a collisions on short ASCII keys are not expected here
        prop_assert!(codec_b.accept(&frame, true).is_none());
    }
}

#[test]
fn test_untagged_codec_accepts_everything() {
    let codec = FrameCodec::untagged();
    let frame = codec.encode(b"LASERrobot1front_scan");
    assert_eq!(&frame[..], b"LASERrobot1front_scan");
    assert_eq!(
        codec.decode(&frame, true).unwrap(),
        Bytes::from_static(b"LASERrobot1front_scan")
    );
}

#[test]
fn test_tagged_frame_accepted_without_check() {
    let sender = FrameCodec::new(RoutingTag::for_identity("MICOMrobot1base"));
    let receiver = FrameCodec::new(RoutingTag::for_identity("GPSrobot1antenna"));
    let frame = sender.encode(&[9, 9, 9]);

    assert!(receiver.accept(&frame, true).is_none());
    assert_eq!(&receiver.accept(&frame, false).unwrap()[..], &[9, 9, 9]);
}
