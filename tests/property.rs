//! Property-based tests for framing, masking, fragmentation, UTF-8
//! handling, and permessage-deflate.

use bytes::BytesMut;
use proptest::prelude::*;

use wsc::config::Limits;
use wsc::connection::{Event, Receiver};
use wsc::extensions::deflate::{DeflateConfig, Deflater, Inflater};
use wsc::protocol::mask::apply_mask_fast;
use wsc::protocol::{apply_mask, Frame, OpCode, Utf8Validator};

fn data_opcode_strategy() -> impl Strategy<Value = OpCode> {
    prop_oneof![Just(OpCode::Text), Just(OpCode::Binary)]
}

fn encode_unmasked(frame: &Frame) -> Vec<u8> {
    let mut buf = vec![0u8; frame.wire_size(false)];
    let written = frame.write(&mut buf, None).unwrap();
    buf.truncate(written);
    buf
}

/// Split `data` into `cuts.len() + 1` chunks at the (wrapped) cut offsets.
fn split_at_points(data: &[u8], cuts: &[usize]) -> Vec<Vec<u8>> {
    let mut points: Vec<usize> = cuts
        .iter()
        .map(|c| if data.is_empty() { 0 } else { c % data.len() })
        .collect();
    points.sort_unstable();
    points.dedup();

    let mut chunks = Vec::new();
    let mut start = 0;
    for point in points {
        chunks.push(data[start..point].to_vec());
        start = point;
    }
    chunks.push(data[start..].to_vec());
    chunks
}

/// Feed a message split into `chunks` as fragments through a receiver.
fn feed_fragments(opcode: OpCode, chunks: &[Vec<u8>]) -> Vec<Event> {
    let mut rx = Receiver::new(Limits::default(), None);
    let mut wire = Vec::new();

    for (i, chunk) in chunks.iter().enumerate() {
        let first = i == 0;
        let last = i == chunks.len() - 1;
        let frame_opcode = if first { opcode } else { OpCode::Continuation };
        wire.extend(encode_unmasked(&Frame::new(last, frame_opcode, chunk.clone())));
    }

    let mut buf = BytesMut::from(&wire[..]);
    let mut events = Vec::new();
    rx.poll(&mut buf, &mut events).unwrap();
    events
}

proptest! {
    // =========================================================================
    // Framing: parse(write(frame)) == frame, masked and unmasked
    // =========================================================================
    #[test]
    fn prop_frame_roundtrip_unmasked(
        fin in any::<bool>(),
        opcode in data_opcode_strategy(),
        payload in prop::collection::vec(any::<u8>(), 0..1000)
    ) {
        let frame = Frame::new(fin, opcode, payload);
        let mut buf = vec![0u8; frame.wire_size(false)];
        let written = frame.write(&mut buf, None).unwrap();

        let (parsed, consumed) = Frame::parse(&buf[..written]).unwrap();
        prop_assert_eq!(consumed, written);
        prop_assert_eq!(parsed.fin, frame.fin);
        prop_assert_eq!(parsed.opcode, frame.opcode);
        prop_assert_eq!(parsed.payload(), frame.payload());
        prop_assert!(!parsed.masked);
    }

    #[test]
    fn prop_frame_roundtrip_masked(
        fin in any::<bool>(),
        opcode in data_opcode_strategy(),
        payload in prop::collection::vec(any::<u8>(), 0..500),
        mask in any::<[u8; 4]>()
    ) {
        let frame = Frame::new(fin, opcode, payload);
        let mut buf = vec![0u8; frame.wire_size(true)];
        let written = frame.write(&mut buf, Some(mask)).unwrap();

        // Masking is opaque to the parser: the payload comes back unmasked.
        let (parsed, consumed) = Frame::parse(&buf[..written]).unwrap();
        prop_assert_eq!(consumed, written);
        prop_assert!(parsed.masked);
        prop_assert_eq!(parsed.payload(), frame.payload());
    }

    // =========================================================================
    // Length encoding picks the minimal representation at every size
    // =========================================================================
    #[test]
    fn prop_length_encoding(len in prop_oneof![0usize..=200, 60_000usize..=70_000]) {
        let frame = Frame::binary(vec![0xAB; len]);
        let wire = encode_unmasked(&frame);

        let expected_header = if len <= 125 { 2 } else if len <= 65535 { 4 } else { 10 };
        prop_assert_eq!(wire.len(), expected_header + len);

        let (parsed, consumed) = Frame::parse(&wire).unwrap();
        prop_assert_eq!(consumed, wire.len());
        prop_assert_eq!(parsed.payload().len(), len);
    }

    // =========================================================================
    // Masking: XOR is self-inverse and the fast path matches the scalar one
    // =========================================================================
    #[test]
    fn prop_mask_reversible(
        data in prop::collection::vec(any::<u8>(), 0..2000),
        mask in any::<[u8; 4]>()
    ) {
        let mut masked = data.clone();
        apply_mask(&mut masked, mask);
        apply_mask(&mut masked, mask);
        prop_assert_eq!(masked, data);
    }

    #[test]
    fn prop_mask_fast_matches_scalar(
        data in prop::collection::vec(any::<u8>(), 0..2000),
        mask in any::<[u8; 4]>()
    ) {
        let mut scalar = data.clone();
        let mut fast = data;
        apply_mask(&mut scalar, mask);
        apply_mask_fast(&mut fast, mask);
        prop_assert_eq!(scalar, fast);
    }

    // =========================================================================
    // Fragmentation: any split of a message reassembles to the original
    // =========================================================================
    #[test]
    fn prop_binary_fragmentation_reassembles(
        payload in prop::collection::vec(any::<u8>(), 1..2000),
        cuts in prop::collection::vec(any::<usize>(), 0..8)
    ) {
        let chunks = split_at_points(&payload, &cuts);
        let events = feed_fragments(OpCode::Binary, &chunks);
        prop_assert_eq!(events, vec![Event::Binary(payload)]);
    }

    #[test]
    fn prop_text_fragmentation_reassembles(
        text in ".*",
        cuts in prop::collection::vec(any::<usize>(), 0..8)
    ) {
        // Byte-level splits routinely cut multi-byte characters in half.
        let chunks = split_at_points(text.as_bytes(), &cuts);
        let events = feed_fragments(OpCode::Text, &chunks);
        prop_assert_eq!(events, vec![Event::Text(text)]);
    }

    // =========================================================================
    // Incremental UTF-8: chunking never changes the verdict
    // =========================================================================
    #[test]
    fn prop_utf8_valid_any_chunking(
        text in ".*",
        cuts in prop::collection::vec(any::<usize>(), 0..8)
    ) {
        let chunks = split_at_points(text.as_bytes(), &cuts);
        let mut validator = Utf8Validator::new();
        let last = chunks.len() - 1;
        for (i, chunk) in chunks.iter().enumerate() {
            prop_assert!(validator.validate(chunk, i == last).is_ok());
        }
    }

    #[test]
    fn prop_utf8_invalid_rejected_any_chunking(
        prefix in ".{0,40}",
        bad_byte in 0xf8u8..=0xff,
        cuts in prop::collection::vec(any::<usize>(), 0..4)
    ) {
        let mut data = prefix.into_bytes();
        data.push(bad_byte);
        let chunks = split_at_points(&data, &cuts);

        let mut validator = Utf8Validator::new();
        let last = chunks.len() - 1;
        let mut rejected = false;
        for (i, chunk) in chunks.iter().enumerate() {
            if validator.validate(chunk, i == last).is_err() {
                rejected = true;
                break;
            }
        }
        prop_assert!(rejected);
    }

    // =========================================================================
    // permessage-deflate: inflate(deflate(m)) == m in both takeover modes
    // =========================================================================
    #[test]
    fn prop_deflate_roundtrip(
        payload in prop::collection::vec(any::<u8>(), 0..2000),
        client_no_context_takeover in any::<bool>(),
        server_no_context_takeover in any::<bool>()
    ) {
        let config = DeflateConfig {
            client_no_context_takeover,
            server_no_context_takeover,
            ..DeflateConfig::default()
        };
        let mut deflater = Deflater::new(config.clone());
        // The inflater's peer is our deflater, so its window/reset policy
        // follows the client-side parameters.
        let mut inflater = Inflater::new(
            DeflateConfig {
                server_max_window_bits: config.client_max_window_bits,
                server_no_context_takeover: config.client_no_context_takeover,
                ..config
            },
            64 * 1024 * 1024,
        );

        for _ in 0..2 {
            let compressed = deflater.compress(&payload).unwrap();
            let restored = inflater.decompress(&compressed).unwrap();
            prop_assert_eq!(&restored, &payload);
        }
    }

    // =========================================================================
    // Close-code sanitization
    // =========================================================================
    #[test]
    fn prop_close_code_sanitization(code in any::<u16>()) {
        let mut rx = Receiver::new(Limits::default(), None);
        let wire = encode_unmasked(&Frame::close(Some(code), ""));

        let mut buf = BytesMut::from(&wire[..]);
        let mut events = Vec::new();
        rx.poll(&mut buf, &mut events).unwrap();

        let expected = wsc::CloseCode::sanitize(code);
        prop_assert_eq!(
            events,
            vec![Event::Close { code: expected, reason: String::new() }]
        );
    }
}
