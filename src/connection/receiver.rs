//! Inbound frame processing: validity rules, fragment reassembly, UTF-8
//! policy, and close-frame sanitization.
//!
//! The receiver is a pure consumer of the connection's read buffer. It parses
//! as many complete frames as are buffered, emits [`Event`]s, and returns
//! without consuming anything when a frame is still partial. Any protocol
//! violation is returned as [`Error::ProtocolViolation`] carrying the close
//! code the connection must fail with.

use bytes::{Buf, BytesMut};
use tracing::{debug, error};

use crate::config::Limits;
use crate::error::{Error, Result};
use crate::extensions::deflate::{DeflateConfig, Inflater};
use crate::message::CloseCode;
use crate::protocol::{Frame, OpCode, Utf8Validator};

/// Maximum close-reason length in bytes (125-byte control payload minus the
/// 2-byte code).
const MAX_CLOSE_REASON: usize = 123;

/// An inbound event surfaced to the connection core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A complete text message.
    Text(String),
    /// A complete binary message.
    Binary(Vec<u8>),
    /// A ping frame; the core must echo the payload in a pong.
    Ping(Vec<u8>),
    /// A pong frame; accepted silently.
    Pong,
    /// A close frame with sanitized code and reason.
    Close {
        /// Sanitized close code (invalid inbound codes become 1002).
        code: u16,
        /// Close reason (empty when the code was rewritten).
        reason: String,
    },
}

/// Reassembles messages from the inbound byte stream.
pub struct Receiver {
    limits: Limits,
    compression: bool,
    inflater: Option<Inflater>,
    utf8: Utf8Validator,
    fragments: Vec<u8>,
    fragment_count: usize,
    fragment_opcode: Option<OpCode>,
    compressed_in_progress: bool,
    terminated: bool,
}

impl Receiver {
    /// Create a receiver; `deflate` carries the negotiated compression
    /// parameters, if any.
    #[must_use]
    pub fn new(limits: Limits, deflate: Option<DeflateConfig>) -> Self {
        let inflater = deflate
            .clone()
            .map(|cfg| Inflater::new(cfg, limits.max_decompressed_size));
        Self {
            limits,
            compression: deflate.is_some(),
            inflater,
            utf8: Utf8Validator::new(),
            fragments: Vec::new(),
            fragment_count: 0,
            fragment_opcode: None,
            compressed_in_progress: false,
            terminated: false,
        }
    }

    /// Stop consuming input; used after a protocol failure or inbound close.
    pub fn terminate(&mut self) {
        self.terminated = true;
    }

    /// Consume every complete frame in `buf`, appending events to `events`.
    ///
    /// Returns `Ok(())` when more bytes are needed; partial frames remain in
    /// the buffer untouched.
    ///
    /// # Errors
    ///
    /// Framing violations return their named error ([`Error::MaskedServerFrame`],
    /// [`Error::ReservedBitsSet`], [`Error::FragmentedControlFrame`],
    /// [`Error::ControlFrameTooLarge`], [`Error::ReservedOpcode`]); invalid
    /// text or undecodable compressed data returns a 1007
    /// [`Error::ProtocolViolation`], and over-limit messages a 1009 one. In
    /// every case `Error::close_code` is the code to fail the connection with.
    pub fn poll(&mut self, buf: &mut BytesMut, events: &mut Vec<Event>) -> Result<()> {
        loop {
            if self.terminated {
                return Ok(());
            }
            if buf.len() < 2 {
                return Ok(());
            }

            let byte0 = buf[0];
            let byte1 = buf[1];
            let fin = (byte0 & 0x80) != 0;
            let rsv1 = (byte0 & 0x40) != 0;
            let rsv2 = (byte0 & 0x20) != 0;
            let rsv3 = (byte0 & 0x10) != 0;
            let masked = (byte1 & 0x80) != 0;

            if rsv2 || rsv3 || (rsv1 && !self.compression) {
                return Err(Error::ReservedBitsSet);
            }
            if masked {
                return Err(Error::MaskedServerFrame);
            }

            let opcode = OpCode::from_u8(byte0 & 0x0F)?;

            if opcode.is_control() {
                if !fin {
                    return Err(Error::FragmentedControlFrame);
                }
                // Reject oversized control frames from the header alone,
                // before waiting for the payload to buffer up.
                if (byte1 & 0x7F) > 125 {
                    let claimed = claimed_payload_len(buf)
                        .unwrap_or_else(|| u64::from(byte1 & 0x7F));
                    return Err(Error::ControlFrameTooLarge(claimed as usize));
                }
            } else if let Some(claimed) = claimed_payload_len(buf) {
                // Reject over-limit data frames before buffering them.
                let pending = self.fragments.len() as u64;
                if claimed.saturating_add(pending) > self.limits.max_message_size as u64 {
                    return Err(Error::ProtocolViolation {
                        close_code: 1009,
                        message: "message too big".into(),
                    });
                }
            }

            let frame = match Frame::parse(buf) {
                Ok((frame, consumed)) => {
                    buf.advance(consumed);
                    frame
                }
                Err(Error::IncompleteFrame { .. }) => return Ok(()),
                Err(other) => return Err(other),
            };

            self.handle_frame(frame, events)?;
        }
    }

    fn handle_frame(&mut self, frame: Frame, events: &mut Vec<Event>) -> Result<()> {
        match frame.opcode {
            OpCode::Close => {
                let (code, reason) = parse_close_payload(frame.payload());
                debug!(code, "received close frame");
                self.terminated = true;
                events.push(Event::Close { code, reason });
                Ok(())
            }
            OpCode::Ping => {
                events.push(Event::Ping(frame.into_payload()));
                Ok(())
            }
            OpCode::Pong => {
                debug!("received pong frame");
                events.push(Event::Pong);
                Ok(())
            }
            OpCode::Continuation => self.handle_continuation(frame, events),
            OpCode::Text | OpCode::Binary => self.handle_data(frame, events),
        }
    }

    fn handle_data(&mut self, frame: Frame, events: &mut Vec<Event>) -> Result<()> {
        if self.fragment_opcode.is_some() {
            error!(opcode = %frame.opcode, "new data frame while expecting a continuation");
            return Err(Error::protocol(
                "new data frame while expecting continuation frame",
            ));
        }

        let compressed = frame.rsv1 && self.compression;

        if !frame.fin {
            self.fragment_opcode = Some(frame.opcode);
            self.compressed_in_progress = compressed;
            self.fragment_count = 1;
            self.limits.check_message_size(frame.payload().len()).map_err(too_big)?;

            if frame.opcode == OpCode::Text && !compressed {
                self.utf8.reset();
                if self.utf8.validate(frame.payload(), false).is_err() {
                    self.reset_fragments();
                    return Err(Error::invalid_payload("invalid UTF-8 in text message"));
                }
            }

            self.fragments = frame.into_payload();
            return Ok(());
        }

        // Single unfragmented message
        let opcode = frame.opcode;
        let payload = frame.into_payload();
        let payload = if compressed {
            self.inflate(payload)?
        } else {
            self.limits.check_message_size(payload.len()).map_err(too_big)?;
            payload
        };

        self.complete_message(opcode, payload, compressed, events)
    }

    fn handle_continuation(&mut self, frame: Frame, events: &mut Vec<Event>) -> Result<()> {
        let Some(opcode) = self.fragment_opcode else {
            error!("continuation frame without initial frame");
            return Err(Error::protocol("continuation frame without initial frame"));
        };

        self.fragment_count += 1;
        self.limits
            .check_fragment_count(self.fragment_count)
            .map_err(too_big)?;
        self.limits
            .check_message_size(self.fragments.len() + frame.payload().len())
            .map_err(too_big)?;

        if opcode == OpCode::Text && !self.compressed_in_progress {
            if self.utf8.validate(frame.payload(), frame.fin).is_err() {
                self.reset_fragments();
                return Err(Error::invalid_payload("invalid UTF-8 in text message"));
            }
        }

        self.fragments.extend_from_slice(frame.payload());

        if !frame.fin {
            return Ok(());
        }

        let compressed = self.compressed_in_progress;
        let payload = std::mem::take(&mut self.fragments);
        let payload = if compressed {
            self.inflate(payload)?
        } else {
            payload
        };

        let result = self.complete_message(opcode, payload, compressed, events);
        self.reset_fragments();
        result
    }

    fn complete_message(
        &mut self,
        opcode: OpCode,
        payload: Vec<u8>,
        compressed: bool,
        events: &mut Vec<Event>,
    ) -> Result<()> {
        match opcode {
            OpCode::Text => {
                // Compressed text could not be validated per chunk; check the
                // inflated bytes in one pass. Uncompressed text was validated
                // chunk by chunk and only needs the final completeness check,
                // which `validate(.., true)` already performed on the last
                // chunk for fragmented messages.
                if compressed {
                    self.utf8.reset();
                    if self.utf8.validate(&payload, true).is_err() {
                        self.reset_fragments();
                        return Err(Error::invalid_payload("invalid UTF-8 in text message"));
                    }
                }
                let text = match String::from_utf8(payload) {
                    Ok(text) => text,
                    Err(_) => {
                        self.reset_fragments();
                        return Err(Error::invalid_payload("invalid UTF-8 in text message"));
                    }
                };
                self.utf8.reset();
                events.push(Event::Text(text));
                Ok(())
            }
            OpCode::Binary => {
                events.push(Event::Binary(payload));
                Ok(())
            }
            _ => Err(Error::protocol("unexpected data opcode")),
        }
    }

    fn inflate(&mut self, payload: Vec<u8>) -> Result<Vec<u8>> {
        let inflater = self
            .inflater
            .as_mut()
            .ok_or_else(|| Error::invalid_payload("compressed frame without negotiation"))?;
        match inflater.decompress(&payload) {
            Ok(out) => Ok(out),
            Err(Error::MessageTooLarge { size, max }) => {
                error!(size, max, "decompressed message exceeds limit");
                Err(Error::ProtocolViolation {
                    close_code: 1009,
                    message: "message too big".into(),
                })
            }
            Err(err) => {
                error!(%err, "decompression failed");
                Err(Error::invalid_payload("decompression failed"))
            }
        }
    }

    fn reset_fragments(&mut self) {
        self.fragments = Vec::new();
        self.fragment_count = 0;
        self.fragment_opcode = None;
        self.compressed_in_progress = false;
        self.utf8.reset();
    }
}

/// Payload length claimed by the frame header at the start of `buf`, once
/// enough bytes are present to know it.
fn claimed_payload_len(buf: &[u8]) -> Option<u64> {
    match buf[1] & 0x7F {
        126 if buf.len() >= 4 => Some(u64::from(u16::from_be_bytes([buf[2], buf[3]]))),
        127 if buf.len() >= 10 => Some(u64::from_be_bytes([
            buf[2], buf[3], buf[4], buf[5], buf[6], buf[7], buf[8], buf[9],
        ])),
        126 | 127 => None,
        n => Some(u64::from(n)),
    }
}

/// Map limit violations onto close code 1009 (message too big).
fn too_big(err: Error) -> Error {
    Error::ProtocolViolation {
        close_code: 1009,
        message: err.to_string(),
    }
}

/// Parse and sanitize an inbound close payload.
///
/// - empty payload: code 1000, empty reason
/// - 1-byte payload: protocol error, 1002
/// - otherwise: big-endian code plus UTF-8 reason (max 123 bytes); invalid
///   codes or a non-UTF-8 reason are rewritten to (1002, "")
fn parse_close_payload(payload: &[u8]) -> (u16, String) {
    if payload.is_empty() {
        return (1000, String::new());
    }
    if payload.len() == 1 {
        return (1002, String::new());
    }

    let code = u16::from_be_bytes([payload[0], payload[1]]);
    if !CloseCode::is_valid(code) {
        return (1002, String::new());
    }

    let raw_reason = &payload[2..];
    let raw_reason = &raw_reason[..raw_reason.len().min(MAX_CLOSE_REASON)];
    match std::str::from_utf8(raw_reason) {
        Ok(reason) => (code, reason.to_string()),
        Err(_) => (1002, String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extensions::deflate::Deflater;

    fn receiver() -> Receiver {
        Receiver::new(Limits::default(), None)
    }

    fn receiver_with_deflate() -> Receiver {
        Receiver::new(Limits::default(), Some(DeflateConfig::default()))
    }

    fn feed(rx: &mut Receiver, bytes: &[u8]) -> Result<Vec<Event>> {
        let mut buf = BytesMut::from(bytes);
        let mut events = Vec::new();
        rx.poll(&mut buf, &mut events)?;
        Ok(events)
    }

    fn frame_bytes(frame: &Frame) -> Vec<u8> {
        let mut buf = vec![0u8; frame.wire_size(false)];
        let n = frame.write(&mut buf, None).unwrap();
        buf.truncate(n);
        buf
    }

    fn close_code(err: &Error) -> u16 {
        err.close_code()
    }

    #[test]
    fn test_single_text_frame() {
        let mut rx = receiver();
        let events = feed(&mut rx, &frame_bytes(&Frame::text(b"hello".to_vec()))).unwrap();
        assert_eq!(events, vec![Event::Text("hello".into())]);
    }

    #[test]
    fn test_single_binary_frame() {
        let mut rx = receiver();
        let events = feed(&mut rx, &frame_bytes(&Frame::binary(vec![1, 2, 3]))).unwrap();
        assert_eq!(events, vec![Event::Binary(vec![1, 2, 3])]);
    }

    #[test]
    fn test_partial_frame_waits() {
        let mut rx = receiver();
        let bytes = frame_bytes(&Frame::text(b"hello".to_vec()));

        let mut buf = BytesMut::from(&bytes[..3]);
        let mut events = Vec::new();
        rx.poll(&mut buf, &mut events).unwrap();
        assert!(events.is_empty());
        assert_eq!(buf.len(), 3); // nothing consumed

        buf.extend_from_slice(&bytes[3..]);
        rx.poll(&mut buf, &mut events).unwrap();
        assert_eq!(events, vec![Event::Text("hello".into())]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_byte_by_byte_delivery() {
        let mut rx = receiver();
        let bytes = frame_bytes(&Frame::text("héllo".as_bytes().to_vec()));

        let mut buf = BytesMut::new();
        let mut events = Vec::new();
        for byte in bytes {
            buf.extend_from_slice(&[byte]);
            rx.poll(&mut buf, &mut events).unwrap();
        }
        assert_eq!(events, vec![Event::Text("héllo".into())]);
    }

    #[test]
    fn test_fragmented_reassembly() {
        let mut rx = receiver();
        let mut bytes = frame_bytes(&Frame::new(false, OpCode::Text, b"Hel".to_vec()));
        bytes.extend(frame_bytes(&Frame::new(false, OpCode::Continuation, b"lo ".to_vec())));
        bytes.extend(frame_bytes(&Frame::new(true, OpCode::Continuation, b"World".to_vec())));

        let events = feed(&mut rx, &bytes).unwrap();
        assert_eq!(events, vec![Event::Text("Hello World".into())]);
    }

    #[test]
    fn test_four_byte_char_straddling_fragments() {
        // 🎉 = F0 9F 8E 89 split 2|1|1 across three fragments
        let mut rx = receiver();
        let mut bytes = frame_bytes(&Frame::new(false, OpCode::Text, vec![b'a', 0xf0, 0x9f]));
        bytes.extend(frame_bytes(&Frame::new(false, OpCode::Continuation, vec![0x8e])));
        bytes.extend(frame_bytes(&Frame::new(true, OpCode::Continuation, vec![0x89, b'b'])));

        let events = feed(&mut rx, &bytes).unwrap();
        assert_eq!(events, vec![Event::Text("a🎉b".into())]);
    }

    #[test]
    fn test_control_frame_interleaved_mid_fragmentation() {
        let mut rx = receiver();
        let mut bytes = frame_bytes(&Frame::new(false, OpCode::Text, b"Hel".to_vec()));
        bytes.extend(frame_bytes(&Frame::ping(b"keepalive".to_vec())));
        bytes.extend(frame_bytes(&Frame::new(true, OpCode::Continuation, b"lo".to_vec())));

        let events = feed(&mut rx, &bytes).unwrap();
        assert_eq!(
            events,
            vec![
                Event::Ping(b"keepalive".to_vec()),
                Event::Text("Hello".into())
            ]
        );
    }

    #[test]
    fn test_continuation_without_start_is_1002() {
        let mut rx = receiver();
        let err = feed(
            &mut rx,
            &frame_bytes(&Frame::new(true, OpCode::Continuation, b"x".to_vec())),
        )
        .unwrap_err();
        assert_eq!(close_code(&err), 1002);
    }

    #[test]
    fn test_new_data_frame_mid_assembly_is_1002() {
        let mut rx = receiver();
        let mut bytes = frame_bytes(&Frame::new(false, OpCode::Text, b"He".to_vec()));
        bytes.extend(frame_bytes(&Frame::text(b"again".to_vec())));

        let err = feed(&mut rx, &bytes).unwrap_err();
        assert_eq!(close_code(&err), 1002);
    }

    #[test]
    fn test_masked_server_frame_is_1002() {
        let mut rx = receiver();
        // FIN + text, MASK bit set
        let err = feed(&mut rx, &[0x81, 0x81, 0, 0, 0, 0, b'x']).unwrap_err();
        assert_eq!(err, Error::MaskedServerFrame);
        assert_eq!(close_code(&err), 1002);
    }

    #[test]
    fn test_rsv2_is_1002() {
        let mut rx = receiver();
        let err = feed(&mut rx, &[0xa1, 0x00]).unwrap_err();
        assert_eq!(err, Error::ReservedBitsSet);
        assert_eq!(close_code(&err), 1002);
    }

    #[test]
    fn test_rsv3_is_1002() {
        let mut rx = receiver();
        let err = feed(&mut rx, &[0x91, 0x00]).unwrap_err();
        assert_eq!(err, Error::ReservedBitsSet);
    }

    #[test]
    fn test_rsv1_without_negotiation_is_1002() {
        let mut rx = receiver();
        let err = feed(&mut rx, &[0xc1, 0x00]).unwrap_err();
        assert_eq!(err, Error::ReservedBitsSet);
        assert_eq!(close_code(&err), 1002);
    }

    #[test]
    fn test_fragmented_control_frame_is_1002() {
        let mut rx = receiver();
        // Ping with FIN=0
        let err = feed(&mut rx, &[0x09, 0x00]).unwrap_err();
        assert_eq!(err, Error::FragmentedControlFrame);
        assert_eq!(close_code(&err), 1002);
    }

    #[test]
    fn test_oversized_control_frame_is_1002() {
        let mut rx = receiver();
        // Ping claiming a 16-bit extended length of 128
        let err = feed(&mut rx, &[0x89, 0x7e, 0x00, 0x80]).unwrap_err();
        assert_eq!(err, Error::ControlFrameTooLarge(128));
        assert_eq!(close_code(&err), 1002);
    }

    #[test]
    fn test_unknown_opcode_is_1002() {
        let mut rx = receiver();
        let err = feed(&mut rx, &[0x83, 0x00]).unwrap_err();
        assert_eq!(err, Error::ReservedOpcode(0x03));
        assert_eq!(close_code(&err), 1002);
    }

    #[test]
    fn test_invalid_utf8_text_is_1007() {
        let mut rx = receiver();
        let err = feed(
            &mut rx,
            &frame_bytes(&Frame::text(vec![0x80, 0x81])),
        )
        .unwrap_err();
        assert_eq!(close_code(&err), 1007);
    }

    #[test]
    fn test_invalid_utf8_fails_fast_on_first_fragment() {
        let mut rx = receiver();
        let err = feed(
            &mut rx,
            &frame_bytes(&Frame::new(false, OpCode::Text, vec![0xff, 0xfe])),
        )
        .unwrap_err();
        assert_eq!(close_code(&err), 1007);
    }

    #[test]
    fn test_truncated_utf8_at_message_end_is_1007() {
        let mut rx = receiver();
        let mut bytes = frame_bytes(&Frame::new(false, OpCode::Text, vec![0xe2]));
        bytes.extend(frame_bytes(&Frame::new(true, OpCode::Continuation, vec![0x82])));
        let err = feed(&mut rx, &bytes).unwrap_err();
        assert_eq!(close_code(&err), 1007);
    }

    #[test]
    fn test_binary_skips_utf8_validation() {
        let mut rx = receiver();
        let events = feed(&mut rx, &frame_bytes(&Frame::binary(vec![0xff, 0x80]))).unwrap();
        assert_eq!(events, vec![Event::Binary(vec![0xff, 0x80])]);
    }

    #[test]
    fn test_pong_accepted_silently() {
        let mut rx = receiver();
        let events = feed(&mut rx, &frame_bytes(&Frame::pong(b"pong".to_vec()))).unwrap();
        assert_eq!(events, vec![Event::Pong]);
    }

    #[test]
    fn test_close_empty_payload() {
        let mut rx = receiver();
        let events = feed(&mut rx, &frame_bytes(&Frame::close(None, ""))).unwrap();
        assert_eq!(
            events,
            vec![Event::Close {
                code: 1000,
                reason: String::new()
            }]
        );
    }

    #[test]
    fn test_close_one_byte_payload_is_1002() {
        let mut rx = receiver();
        let events = feed(
            &mut rx,
            &frame_bytes(&Frame::new(true, OpCode::Close, vec![0x03])),
        )
        .unwrap();
        assert_eq!(
            events,
            vec![Event::Close {
                code: 1002,
                reason: String::new()
            }]
        );
    }

    #[test]
    fn test_close_with_valid_code_and_reason() {
        let mut rx = receiver();
        let events = feed(
            &mut rx,
            &frame_bytes(&Frame::close(Some(1001), "going away")),
        )
        .unwrap();
        assert_eq!(
            events,
            vec![Event::Close {
                code: 1001,
                reason: "going away".into()
            }]
        );
    }

    #[test]
    fn test_close_reserved_codes_become_1002() {
        for code in [1004u16, 1005, 1006, 999, 2999, 5000, 1015] {
            let mut rx = receiver();
            let events = feed(&mut rx, &frame_bytes(&Frame::close(Some(code), ""))).unwrap();
            assert_eq!(
                events,
                vec![Event::Close {
                    code: 1002,
                    reason: String::new()
                }],
                "code {code} must be sanitized to 1002"
            );
        }
    }

    #[test]
    fn test_close_application_code_passes() {
        let mut rx = receiver();
        let events = feed(&mut rx, &frame_bytes(&Frame::close(Some(4040), "app"))).unwrap();
        assert_eq!(
            events,
            vec![Event::Close {
                code: 4040,
                reason: "app".into()
            }]
        );
    }

    #[test]
    fn test_close_invalid_utf8_reason_becomes_1002() {
        let mut rx = receiver();
        let mut payload = 1000u16.to_be_bytes().to_vec();
        payload.extend_from_slice(&[0xff, 0xfe]);
        let events = feed(
            &mut rx,
            &frame_bytes(&Frame::new(true, OpCode::Close, payload)),
        )
        .unwrap();
        assert_eq!(
            events,
            vec![Event::Close {
                code: 1002,
                reason: String::new()
            }]
        );
    }

    #[test]
    fn test_no_frames_consumed_after_close() {
        let mut rx = receiver();
        let mut bytes = frame_bytes(&Frame::close(Some(1000), ""));
        bytes.extend(frame_bytes(&Frame::text(b"after".to_vec())));

        let mut buf = BytesMut::from(&bytes[..]);
        let mut events = Vec::new();
        rx.poll(&mut buf, &mut events).unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Event::Close { .. }));
        // The text frame stays unparsed.
        assert!(!buf.is_empty());
    }

    #[test]
    fn test_compressed_message_roundtrip() {
        let mut rx = receiver_with_deflate();
        let mut deflater = Deflater::new(DeflateConfig {
            // The receiver inflates with server_max_window_bits; mirror it.
            client_max_window_bits: 15,
            ..DeflateConfig::default()
        });

        let payload = b"compressed text payload, compressed text payload".to_vec();
        let compressed = deflater.compress(&payload).unwrap();

        let mut frame = Frame::new(true, OpCode::Text, compressed);
        frame.rsv1 = true;

        let events = feed(&mut rx, &frame_bytes(&frame)).unwrap();
        assert_eq!(
            events,
            vec![Event::Text(String::from_utf8(payload).unwrap())]
        );
    }

    #[test]
    fn test_compressed_fragmented_message() {
        let mut rx = receiver_with_deflate();
        let mut deflater = Deflater::new(DeflateConfig::default());

        let payload = b"fragmented compressed message body".to_vec();
        let compressed = deflater.compress(&payload).unwrap();
        let split = compressed.len() / 2;

        // RSV1 only on the first frame
        let mut first = Frame::new(false, OpCode::Binary, compressed[..split].to_vec());
        first.rsv1 = true;
        let rest = Frame::new(true, OpCode::Continuation, compressed[split..].to_vec());

        let mut bytes = frame_bytes(&first);
        bytes.extend(frame_bytes(&rest));

        let events = feed(&mut rx, &bytes).unwrap();
        assert_eq!(events, vec![Event::Binary(payload)]);
    }

    #[test]
    fn test_compressed_invalid_utf8_is_1007() {
        let mut rx = receiver_with_deflate();
        let mut deflater = Deflater::new(DeflateConfig::default());

        let compressed = deflater.compress(&[0xff, 0xfe, 0x80]).unwrap();
        let mut frame = Frame::new(true, OpCode::Text, compressed);
        frame.rsv1 = true;

        let err = feed(&mut rx, &frame_bytes(&frame)).unwrap_err();
        assert_eq!(close_code(&err), 1007);
    }

    #[test]
    fn test_undecodable_compressed_payload_is_1007() {
        let mut rx = receiver_with_deflate();
        let mut frame = Frame::new(true, OpCode::Binary, vec![0xde, 0xad, 0xbe, 0xef, 0x01]);
        frame.rsv1 = true;

        let err = feed(&mut rx, &frame_bytes(&frame)).unwrap_err();
        assert_eq!(close_code(&err), 1007);
    }

    #[test]
    fn test_message_size_limit_is_1009() {
        let mut rx = Receiver::new(Limits::new(16, 1024, 8192, 1024), None);
        let err = feed(&mut rx, &frame_bytes(&Frame::binary(vec![0u8; 32]))).unwrap_err();
        assert_eq!(close_code(&err), 1009);
    }

    #[test]
    fn test_fragment_count_limit_is_1009() {
        let mut rx = Receiver::new(Limits::new(1024, 2, 8192, 1024), None);
        let mut bytes = frame_bytes(&Frame::new(false, OpCode::Binary, vec![1]));
        bytes.extend(frame_bytes(&Frame::new(false, OpCode::Continuation, vec![2])));
        bytes.extend(frame_bytes(&Frame::new(true, OpCode::Continuation, vec![3])));

        let err = feed(&mut rx, &bytes).unwrap_err();
        assert_eq!(close_code(&err), 1009);
    }

    #[test]
    fn test_utf8_state_resets_between_messages() {
        let mut rx = receiver();
        let mut bytes = frame_bytes(&Frame::text("✓ first".as_bytes().to_vec()));
        bytes.extend(frame_bytes(&Frame::text("second ✓".as_bytes().to_vec())));

        let events = feed(&mut rx, &bytes).unwrap();
        assert_eq!(
            events,
            vec![
                Event::Text("✓ first".into()),
                Event::Text("second ✓".into())
            ]
        );
    }
}
