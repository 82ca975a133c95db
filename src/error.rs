//! Error types for the WebSocket client.
//!
//! Protocol violations carry the RFC 6455 close code that must be put on
//! the wire when failing the connection; everything else maps onto the
//! error-callback code space in [`ErrorCode`].

use thiserror::Error;

/// Result type alias for WebSocket client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during WebSocket client operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The configured URL could not be parsed as `ws://` or `wss://`.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Invalid frame structure or header.
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Incomplete frame data.
    #[error("Incomplete frame: need {needed} more bytes")]
    IncompleteFrame {
        /// Number of additional bytes needed.
        needed: usize,
    },

    /// Reserved opcode used.
    #[error("Reserved opcode: {0:#x}")]
    ReservedOpcode(u8),

    /// Masked server frame (RFC 6455 Section 5.1).
    #[error("Masked frame received from server")]
    MaskedServerFrame,

    /// Reserved bits set without a negotiated extension.
    #[error("Reserved bits set without negotiated extension")]
    ReservedBitsSet,

    /// Control frame fragmented (RFC 6455 Section 5.5).
    #[error("Control frames cannot be fragmented")]
    FragmentedControlFrame,

    /// Control frame payload too large (>125 bytes).
    #[error("Control frame payload too large: {0} bytes (max: 125)")]
    ControlFrameTooLarge(usize),

    /// Protocol violation that must fail the connection.
    ///
    /// `close_code` is the RFC 6455 code to send in the close frame
    /// (1002 for framing violations, 1007 for invalid payload data).
    #[error("Protocol violation ({close_code}): {message}")]
    ProtocolViolation {
        /// Close code to put on the wire.
        close_code: u16,
        /// Human-readable description.
        message: String,
    },

    /// Invalid UTF-8 in a text message.
    #[error("Invalid UTF-8 in text message")]
    InvalidUtf8,

    /// Message size exceeds the configured maximum.
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge {
        /// Actual message size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Too many fragments in a single message.
    #[error("Too many fragments: {count} (max: {max})")]
    TooManyFragments {
        /// Actual fragment count.
        count: usize,
        /// Maximum allowed fragments.
        max: usize,
    },

    /// Invalid WebSocket handshake.
    #[error("Invalid handshake: {0}")]
    InvalidHandshake(String),

    /// Compression or decompression failure.
    #[error("Compression error: {0}")]
    Compression(String),

    /// TLS configuration or handshake failure.
    #[error("TLS error: {0}")]
    Tls(String),

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),

    /// The bounded send queue is full.
    #[error("Send queue is full")]
    QueueFull,

    /// Send attempted on a closing or closed connection.
    #[error("Connection is not open")]
    NotConnected,
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl Error {
    /// Construct a 1002 (protocol error) violation.
    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Error::ProtocolViolation {
            close_code: 1002,
            message: message.into(),
        }
    }

    /// Construct a 1007 (invalid payload data) violation.
    pub(crate) fn invalid_payload(message: impl Into<String>) -> Self {
        Error::ProtocolViolation {
            close_code: 1007,
            message: message.into(),
        }
    }

    /// The RFC 6455 close code to fail the connection with.
    pub(crate) fn close_code(&self) -> u16 {
        match self {
            Error::ProtocolViolation { close_code, .. } => *close_code,
            Error::InvalidUtf8 => 1007,
            Error::MessageTooLarge { .. } | Error::TooManyFragments { .. } => 1009,
            _ => 1002,
        }
    }
}

/// Error codes delivered to the error callback.
///
/// Protocol failures are reported with the RFC 6455 close code instead;
/// these values cover the client-local failure classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    /// The HTTP upgrade exchange failed (non-101, bad accept, bad extension).
    Handshake = 4001,
    /// DNS resolution or TCP connect failed, or the transport broke.
    Connection = 4002,
    /// TLS setup or handshake failed.
    Tls = 4003,
    /// Writing a frame to the transport failed.
    Send = 4004,
}

impl ErrorCode {
    /// Numeric value delivered to the error callback.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }
}
