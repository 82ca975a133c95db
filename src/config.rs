//! Client configuration, URL parsing, and receive limits.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::tls::TlsOptions;

/// Resource limits applied to inbound traffic.
///
/// These bound memory usage during reassembly and decompression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum size of a reassembled message in bytes.
    ///
    /// Default: 64 MB
    pub max_message_size: usize,

    /// Maximum number of fragments in a single message.
    ///
    /// Default: 1024
    pub max_fragment_count: usize,

    /// Maximum size of the HTTP upgrade response in bytes.
    ///
    /// Default: 8 KB
    pub max_handshake_size: usize,

    /// Maximum decompressed message size in bytes.
    ///
    /// Bounds decompression bomb damage. Default: 64 MB
    pub max_decompressed_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_message_size: 64 * 1024 * 1024,
            max_fragment_count: 1024,
            max_handshake_size: 8192,
            max_decompressed_size: 64 * 1024 * 1024,
        }
    }
}

impl Limits {
    /// Create new limits with custom values.
    #[must_use]
    pub const fn new(
        max_message_size: usize,
        max_fragment_count: usize,
        max_handshake_size: usize,
        max_decompressed_size: usize,
    ) -> Self {
        Self {
            max_message_size,
            max_fragment_count,
            max_handshake_size,
            max_decompressed_size,
        }
    }

    /// Validate that a reassembled message size is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MessageTooLarge`] if `size` exceeds the maximum.
    pub const fn check_message_size(&self, size: usize) -> Result<()> {
        if size > self.max_message_size {
            Err(Error::MessageTooLarge {
                size,
                max: self.max_message_size,
            })
        } else {
            Ok(())
        }
    }

    /// Validate that a fragment count is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TooManyFragments`] if `count` exceeds the maximum.
    pub const fn check_fragment_count(&self, count: usize) -> Result<()> {
        if count > self.max_fragment_count {
            Err(Error::TooManyFragments {
                count,
                max: self.max_fragment_count,
            })
        } else {
            Ok(())
        }
    }
}

/// A parsed `ws://` or `wss://` endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Url {
    /// Hostname or IP address (IPv6 without brackets).
    pub host: String,
    /// TCP port (defaults: 80 for `ws`, 443 for `wss`).
    pub port: u16,
    /// Request target including path and query, always starting with `/`.
    pub resource: String,
    /// Whether the scheme was `wss`.
    pub secure: bool,
}

impl Url {
    /// Parse a WebSocket URL.
    ///
    /// Accepts `ws://host[:port]/path` and `wss://host[:port]/path`; the
    /// path and query are optional and default to `/`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] on an unknown scheme, empty host, or
    /// unparsable port.
    pub fn parse(input: &str) -> Result<Self> {
        let (scheme, rest) = input
            .split_once("://")
            .ok_or_else(|| Error::InvalidUrl(format!("missing scheme: {input}")))?;

        let secure = match scheme {
            "ws" => false,
            "wss" => true,
            other => {
                return Err(Error::InvalidUrl(format!("unsupported scheme: {other}")));
            }
        };

        let (authority, resource) = match rest.find(['/', '?']) {
            Some(idx) if rest.as_bytes()[idx] == b'/' => (&rest[..idx], rest[idx..].to_string()),
            Some(idx) => (&rest[..idx], format!("/{}", &rest[idx..])),
            None => (rest, "/".to_string()),
        };

        let (host, port) = Self::split_authority(authority, secure)?;
        if host.is_empty() {
            return Err(Error::InvalidUrl(format!("empty host: {input}")));
        }

        Ok(Self {
            host,
            port,
            resource,
            secure,
        })
    }

    fn split_authority(authority: &str, secure: bool) -> Result<(String, u16)> {
        let default_port = if secure { 443 } else { 80 };

        // Bracketed IPv6 literal
        if let Some(rest) = authority.strip_prefix('[') {
            let (host, after) = rest
                .split_once(']')
                .ok_or_else(|| Error::InvalidUrl(format!("unterminated IPv6 literal: {authority}")))?;
            let port = match after.strip_prefix(':') {
                Some(p) => p
                    .parse()
                    .map_err(|_| Error::InvalidUrl(format!("invalid port: {p}")))?,
                None if after.is_empty() => default_port,
                None => {
                    return Err(Error::InvalidUrl(format!("invalid authority: {authority}")));
                }
            };
            return Ok((host.to_string(), port));
        }

        match authority.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse()
                    .map_err(|_| Error::InvalidUrl(format!("invalid port: {port}")))?;
                Ok((host.to_string(), port))
            }
            None => Ok((authority.to_string(), default_port)),
        }
    }
}

/// WebSocket client configuration.
///
/// All fields can be adjusted through the [`WebSocketClient`] setters before
/// `connect()`; the event loop snapshots them at connect time.
///
/// [`WebSocketClient`]: crate::WebSocketClient
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Raw URL as given to `set_url`; parsed at connect time.
    pub url: Option<String>,

    /// Extra headers appended verbatim to the upgrade request.
    pub headers: Vec<(String, String)>,

    /// Offer `permessage-deflate` during the handshake.
    ///
    /// Default: true
    pub compression: bool,

    /// Interval between outbound pings; `None` disables the ping timer.
    ///
    /// Default: None
    pub ping_interval: Option<Duration>,

    /// Timeout covering TCP connect, TLS, and the HTTP upgrade.
    ///
    /// Default: 30 seconds
    pub connect_timeout: Duration,

    /// How long to wait for the peer's close frame after sending ours.
    ///
    /// Default: 2 seconds
    pub close_timeout: Duration,

    /// Capacity of the bounded send queue; overflow is rejected.
    ///
    /// Default: 1024
    pub queue_capacity: usize,

    /// Inbound resource limits.
    pub limits: Limits,

    /// TLS options, used only for `wss://` URLs.
    pub tls: TlsOptions,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: None,
            headers: Vec::new(),
            compression: true,
            ping_interval: None,
            connect_timeout: Duration::from_secs(30),
            close_timeout: Duration::from_secs(2),
            queue_capacity: 1024,
            limits: Limits::default(),
            tls: TlsOptions::default(),
        }
    }
}
