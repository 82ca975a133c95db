//! HTTP/1.1 upgrade handshake (RFC 6455 Section 4), client side.

use std::collections::HashMap;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};
use crate::extensions::ExtensionOffer;

/// The GUID appended to the key in the Sec-WebSocket-Accept calculation.
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Computes the expected `Sec-WebSocket-Accept` value from the client key.
///
/// The accept key is `base64(SHA-1(key + GUID))`.
///
/// # Example
///
/// ```
/// use wsc::protocol::handshake::compute_accept_key;
///
/// let accept = compute_accept_key("dGhlIHNhbXBsZSBub25jZQ==");
/// assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
#[must_use]
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Generate a fresh `Sec-WebSocket-Key`: 16 random bytes, base64-encoded.
///
/// # Errors
///
/// Returns [`Error::Io`] if the system RNG is unavailable.
pub fn generate_key() -> Result<String> {
    let mut nonce = [0u8; 16];
    getrandom::getrandom(&mut nonce).map_err(|e| Error::Io(format!("rng failure: {e}")))?;
    Ok(BASE64.encode(nonce))
}

fn validate_header_value(name: &str, value: &str) -> Result<()> {
    if value.contains('\r') || value.contains('\n') {
        return Err(Error::InvalidHandshake(format!(
            "header {name} contains CR or LF"
        )));
    }
    Ok(())
}

/// Parse HTTP header lines into a case-insensitive map.
fn parse_headers<'a, I>(lines: I) -> HashMap<String, String>
where
    I: Iterator<Item = &'a str>,
{
    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_lowercase(), value.trim().to_string());
        }
    }
    headers
}

/// The client's HTTP upgrade request.
#[derive(Debug, Clone)]
pub struct UpgradeRequest<'a> {
    /// Target hostname for the `Host` header.
    pub host: &'a str,
    /// Target port; elided from `Host` when it is the scheme default.
    pub port: u16,
    /// Whether the connection uses TLS (determines the default port).
    pub secure: bool,
    /// Request target (path + query).
    pub resource: &'a str,
    /// The base64-encoded 16-byte nonce.
    pub key: &'a str,
    /// Offer `permessage-deflate` in the request.
    pub offer_compression: bool,
    /// Caller-supplied headers, appended verbatim.
    pub headers: &'a [(String, String)],
}

impl UpgradeRequest<'_> {
    /// Serialize the upgrade request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] if a caller-supplied header value
    /// contains CR or LF.
    pub fn encode(&self) -> Result<String> {
        let default_port = if self.secure { 443 } else { 80 };
        let mut request = format!("GET {} HTTP/1.1\r\n", self.resource);

        if self.port == default_port {
            request.push_str(&format!("Host: {}\r\n", self.host));
        } else {
            request.push_str(&format!("Host: {}:{}\r\n", self.host, self.port));
        }

        request.push_str("Upgrade: websocket\r\n");
        request.push_str("Connection: Upgrade\r\n");
        request.push_str(&format!("Sec-WebSocket-Key: {}\r\n", self.key));
        request.push_str("Sec-WebSocket-Version: 13\r\n");

        if self.offer_compression {
            request.push_str(
                "Sec-WebSocket-Extensions: permessage-deflate; client_max_window_bits\r\n",
            );
        }

        for (name, value) in self.headers {
            validate_header_value(name, value)?;
            if name.contains('\r') || name.contains('\n') || name.contains(':') {
                return Err(Error::InvalidHandshake(format!(
                    "invalid header name: {name}"
                )));
            }
            request.push_str(&format!("{name}: {value}\r\n"));
        }

        request.push_str("\r\n");
        Ok(request)
    }
}

/// The server's parsed 101 response.
#[derive(Debug, Clone)]
pub struct UpgradeResponse {
    /// The `Sec-WebSocket-Accept` value.
    pub accept: String,
    /// Parsed `Sec-WebSocket-Extensions` entries.
    pub extensions: Vec<ExtensionOffer>,
}

impl UpgradeResponse {
    /// Parse and validate the server's handshake response.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] if:
    /// - the status is not `101`
    /// - `Upgrade: websocket` or `Connection: Upgrade` is missing
    ///   (case-insensitive token match)
    /// - `Sec-WebSocket-Accept` is missing
    /// - the extension header is malformed
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|_| Error::InvalidHandshake("response is not valid UTF-8".into()))?;

        let mut lines = text.lines();
        let status_line = lines
            .next()
            .ok_or_else(|| Error::InvalidHandshake("empty response".into()))?;

        let mut status_parts = status_line.split_whitespace();
        let version = status_parts.next().unwrap_or("");
        let status = status_parts.next().unwrap_or("");
        if !version.starts_with("HTTP/1.1") || status != "101" {
            return Err(Error::InvalidHandshake(format!(
                "expected 101 status, got: {status_line}"
            )));
        }

        let headers = parse_headers(lines);

        let upgrade = headers
            .get("upgrade")
            .ok_or_else(|| Error::InvalidHandshake("missing Upgrade header".into()))?;
        if !upgrade.eq_ignore_ascii_case("websocket") {
            return Err(Error::InvalidHandshake(format!(
                "invalid Upgrade header: {upgrade}"
            )));
        }

        let connection = headers
            .get("connection")
            .ok_or_else(|| Error::InvalidHandshake("missing Connection header".into()))?;
        let has_upgrade_token = connection
            .split(',')
            .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));
        if !has_upgrade_token {
            return Err(Error::InvalidHandshake(format!(
                "invalid Connection header: {connection}"
            )));
        }

        let accept = headers
            .get("sec-websocket-accept")
            .ok_or_else(|| Error::InvalidHandshake("missing Sec-WebSocket-Accept header".into()))?
            .clone();

        let extensions = match headers.get("sec-websocket-extensions") {
            Some(header) => ExtensionOffer::parse_header(header)?,
            None => Vec::new(),
        };

        Ok(Self { accept, extensions })
    }

    /// Check the accept value against the key we sent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] on mismatch.
    pub fn verify_accept(&self, key: &str) -> Result<()> {
        let expected = compute_accept_key(key);
        if self.accept != expected {
            return Err(Error::InvalidHandshake(format!(
                "Sec-WebSocket-Accept mismatch: expected {expected}, got {}",
                self.accept
            )));
        }
        Ok(())
    }
}
