//! Connection lifecycle states.

/// WebSocket connection state.
///
/// A connection starts `Disconnected`, walks through `Connecting` and
/// `Handshaking` while the transport and HTTP upgrade are established, is
/// `Open` for data transfer, enters `Closing` once a close frame has been
/// sent, and ends in `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
#[non_exhaustive]
pub enum ConnectionState {
    /// No connection attempt in progress.
    #[default]
    Disconnected = 0,
    /// TCP (and TLS) connect in progress.
    Connecting = 1,
    /// HTTP upgrade exchange in progress.
    Handshaking = 2,
    /// Connection established; messages flow.
    Open = 3,
    /// Local close sent, waiting for the peer's close frame.
    Closing = 4,
    /// Connection fully closed.
    Closed = 5,
}

impl ConnectionState {
    /// Pack for storage in an atomic cell.
    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Unpack from an atomic cell.
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Handshaking,
            3 => ConnectionState::Open,
            4 => ConnectionState::Closing,
            5 => ConnectionState::Closed,
            _ => ConnectionState::Disconnected,
        }
    }

    /// Check whether new sends may be queued in this state.
    ///
    /// Messages queued before the handshake completes are flushed once the
    /// connection opens; sends are rejected once closing has begun.
    #[inline]
    #[must_use]
    pub const fn can_enqueue(&self) -> bool {
        matches!(
            self,
            ConnectionState::Disconnected
                | ConnectionState::Connecting
                | ConnectionState::Handshaking
                | ConnectionState::Open
        )
    }

    /// Check whether the connection is open for traffic.
    #[inline]
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Handshaking => "Handshaking",
            ConnectionState::Open => "Open",
            ConnectionState::Closing => "Closing",
            ConnectionState::Closed => "Closed",
        };
        write!(f, "{name}")
    }
}
