//! Permessage-deflate (RFC 7692): streaming raw deflate with SYNC_FLUSH
//! trailer elision and per-direction context-takeover policy.

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

use crate::error::{Error, Result};
use crate::extensions::ExtensionOffer;

const MIN_WINDOW_BITS: u8 = 8;
const MAX_WINDOW_BITS: u8 = 15;
const DEFAULT_WINDOW_BITS: u8 = 15;
const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// The SYNC_FLUSH trailer stripped from (and re-appended to) wire payloads.
const DEFLATE_TRAILER: [u8; 4] = [0x00, 0x00, 0xff, 0xff];

/// zlib's SYNC_FLUSH overhead is not fully covered by its own bound, so
/// compression retries with growing slack.
const COMPRESS_ATTEMPTS: usize = 4;

/// Output chunk granularity while inflating.
const INFLATE_CHUNK: usize = 4096;

/// Negotiated permessage-deflate parameters.
///
/// Immutable after negotiation; both endpoints' window sizes and
/// context-takeover flags come from the server's handshake response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeflateConfig {
    /// Server discards its compression context after each message.
    pub server_no_context_takeover: bool,
    /// Client discards its compression context after each message.
    pub client_no_context_takeover: bool,
    /// Server's LZ77 window size in bits (8-15).
    pub server_max_window_bits: u8,
    /// Client's LZ77 window size in bits (8-15).
    pub client_max_window_bits: u8,
    /// Compression level (0-9).
    pub compression_level: u32,
}

impl Default for DeflateConfig {
    fn default() -> Self {
        Self {
            server_no_context_takeover: false,
            client_no_context_takeover: false,
            server_max_window_bits: DEFAULT_WINDOW_BITS,
            client_max_window_bits: DEFAULT_WINDOW_BITS,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

impl DeflateConfig {
    fn parse_window_bits(value: Option<&str>) -> Result<u8> {
        match value {
            Some(s) => {
                let bits: u8 = s.parse().map_err(|_| {
                    Error::InvalidHandshake(format!("invalid window bits value: {s}"))
                })?;
                if !(MIN_WINDOW_BITS..=MAX_WINDOW_BITS).contains(&bits) {
                    return Err(Error::InvalidHandshake(format!(
                        "window bits must be {MIN_WINDOW_BITS}-{MAX_WINDOW_BITS}, got {bits}"
                    )));
                }
                Ok(bits)
            }
            None => Ok(DEFAULT_WINDOW_BITS),
        }
    }

    /// Build the negotiated configuration from the server's
    /// `Sec-WebSocket-Extensions` response entries.
    ///
    /// Returns `Ok(None)` when the server declined the extension.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] if the server accepted a
    /// different extension, repeated `permessage-deflate`, sent an unknown
    /// parameter, or sent window bits outside 8-15.
    pub fn from_extension_offers(offers: &[ExtensionOffer]) -> Result<Option<Self>> {
        let mut config = None;

        for offer in offers {
            if offer.name != "permessage-deflate" {
                return Err(Error::InvalidHandshake(format!(
                    "unsupported extension: {}",
                    offer.name
                )));
            }
            if config.is_some() {
                return Err(Error::InvalidHandshake(
                    "permessage-deflate accepted twice".into(),
                ));
            }

            let mut cfg = Self::default();
            for param in &offer.params {
                match param.name.as_str() {
                    "server_no_context_takeover" => cfg.server_no_context_takeover = true,
                    "client_no_context_takeover" => cfg.client_no_context_takeover = true,
                    "server_max_window_bits" => {
                        cfg.server_max_window_bits =
                            Self::parse_window_bits(param.value.as_deref())?;
                    }
                    "client_max_window_bits" => {
                        cfg.client_max_window_bits =
                            Self::parse_window_bits(param.value.as_deref())?;
                    }
                    other => {
                        return Err(Error::InvalidHandshake(format!(
                            "unknown permessage-deflate parameter: {other}"
                        )));
                    }
                }
            }
            config = Some(cfg);
        }

        Ok(config)
    }
}

/// zlib has no 256-byte raw window; a negotiated 8 is widened to 9, as
/// zlib-based peers do on their side as well.
fn effective_window_bits(bits: u8) -> u8 {
    bits.max(9)
}

/// Outbound (client-to-server) compressor.
pub struct Deflater {
    encoder: Compress,
    config: DeflateConfig,
}

impl Deflater {
    /// Create a compressor at the negotiated client window size.
    #[must_use]
    pub fn new(config: DeflateConfig) -> Self {
        let encoder = Compress::new_with_window_bits(
            Compression::new(config.compression_level),
            false, // raw deflate, no zlib header
            effective_window_bits(config.client_max_window_bits),
        );
        Self { encoder, config }
    }

    fn reinit(&mut self) {
        self.encoder = Compress::new_with_window_bits(
            Compression::new(self.config.compression_level),
            false,
            effective_window_bits(self.config.client_max_window_bits),
        );
    }

    /// Compress one full message payload.
    ///
    /// Runs a single SYNC_FLUSH step; the output must end in `00 00 FF FF`,
    /// which is stripped before framing. Insufficient output space retries
    /// with a larger buffer, with slack growing by 64 bytes per attempt.
    ///
    /// The caller falls back to sending the message uncompressed when this
    /// returns an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Compression`] when zlib reports a hard error or no
    /// attempt produced a complete SYNC_FLUSH block.
    pub fn compress(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        for attempt in 1..=COMPRESS_ATTEMPTS {
            self.encoder.reset();

            // Slack beyond the deflate bound covers the SYNC_FLUSH trailer
            // and zlib bookkeeping.
            let bound = data.len() + (data.len() >> 3) + 128 + 64 * attempt;
            let mut out = vec![0u8; bound];

            let before_in = self.encoder.total_in();
            let before_out = self.encoder.total_out();

            let status = self
                .encoder
                .compress(data, &mut out, FlushCompress::Sync)
                .map_err(|e| Error::Compression(format!("deflate failed: {e}")))?;

            let consumed = (self.encoder.total_in() - before_in) as usize;
            let produced = (self.encoder.total_out() - before_out) as usize;

            if consumed < data.len() || produced < DEFLATE_TRAILER.len() {
                // Ran out of output space before a complete flush.
                continue;
            }
            debug_assert_ne!(status, Status::StreamEnd);

            if out[produced - 4..produced] != DEFLATE_TRAILER {
                // Incomplete SYNC_FLUSH output, retry with more space.
                continue;
            }
            out.truncate(produced - 4);

            if self.config.client_no_context_takeover {
                self.reinit();
            }
            return Ok(out);
        }

        Err(Error::Compression(
            "could not produce complete SYNC_FLUSH output".into(),
        ))
    }
}

/// Inbound (server-to-client) decompressor.
pub struct Inflater {
    decoder: Decompress,
    config: DeflateConfig,
    max_decompressed_size: usize,
}

impl Inflater {
    /// Create a decompressor at the negotiated server window size.
    #[must_use]
    pub fn new(config: DeflateConfig, max_decompressed_size: usize) -> Self {
        let decoder =
            Decompress::new_with_window_bits(false, effective_window_bits(config.server_max_window_bits));
        Self {
            decoder,
            config,
            max_decompressed_size,
        }
    }

    fn reinit(&mut self) {
        self.decoder = Decompress::new_with_window_bits(
            false,
            effective_window_bits(self.config.server_max_window_bits),
        );
    }

    /// Decompress one full message payload.
    ///
    /// The wire payload omits the SYNC_FLUSH trailer, so `00 00 FF FF` is
    /// appended before inflating. A buffer-error status is benign once all
    /// input is consumed; a stall with input remaining is terminal.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Compression`] on corrupt data or a stall, and
    /// [`Error::MessageTooLarge`] when output exceeds the configured bound.
    pub fn decompress(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        let mut input = Vec::with_capacity(data.len() + DEFLATE_TRAILER.len());
        input.extend_from_slice(data);
        input.extend_from_slice(&DEFLATE_TRAILER);

        let mut out = Vec::new();
        let mut consumed_total = 0usize;

        loop {
            let old_len = out.len();
            out.resize(old_len + INFLATE_CHUNK, 0);

            let before_in = self.decoder.total_in();
            let before_out = self.decoder.total_out();

            let status = self
                .decoder
                .decompress(
                    &input[consumed_total..],
                    &mut out[old_len..],
                    FlushDecompress::Sync,
                )
                .map_err(|e| Error::Compression(format!("inflate failed: {e}")))?;

            let consumed = (self.decoder.total_in() - before_in) as usize;
            let produced = (self.decoder.total_out() - before_out) as usize;

            out.truncate(old_len + produced);
            consumed_total += consumed;

            if out.len() > self.max_decompressed_size {
                return Err(Error::MessageTooLarge {
                    size: out.len(),
                    max: self.max_decompressed_size,
                });
            }

            if status == Status::StreamEnd {
                break;
            }

            if consumed_total == input.len() && produced < INFLATE_CHUNK {
                // All input consumed without filling the output chunk.
                break;
            }

            if consumed == 0 && produced == 0 {
                if consumed_total == input.len() {
                    break;
                }
                return Err(Error::Compression(format!(
                    "inflate stalled with {} input bytes remaining",
                    input.len() - consumed_total
                )));
            }
        }

        if self.config.server_no_context_takeover {
            self.reinit();
        }
        Ok(out)
    }
}
