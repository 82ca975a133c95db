//! Connection state machine, inbound receiver, and the event loop core.
//!
//! Caller threads interact with a connection only through [`Shared`]: a
//! mutex-guarded send queue, atomic flags, and a wakeup [`Notify`]. The event
//! loop task is the sole owner of the socket, parser state, and timers.

pub(crate) mod event_loop;
pub mod receiver;
mod state;

pub use receiver::{Event, Receiver};
pub use state::ConnectionState;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;

use crate::config::{ClientConfig, Limits, Url};
use crate::tls::TlsConnector;

/// A queued outbound intent.
#[derive(Debug, Clone)]
pub(crate) enum Pending {
    /// A text message.
    Text(String),
    /// A binary message.
    Binary(Vec<u8>),
    /// A graceful close with code and reason.
    Close {
        code: u16,
        reason: String,
    },
}

type OpenCallback = Arc<dyn Fn() + Send + Sync>;
type CloseCallback = Arc<dyn Fn(u16, &str) + Send + Sync>;
type ErrorCallback = Arc<dyn Fn(u16, &str) + Send + Sync>;
type MessageCallback = Arc<dyn Fn(&str) + Send + Sync>;
type BinaryCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Registered callbacks.
///
/// Each callback is cloned out of its slot before invocation so a callback
/// can re-register callbacks or call back into the client without
/// deadlocking.
#[derive(Default)]
pub(crate) struct Callbacks {
    open: Mutex<Option<OpenCallback>>,
    close: Mutex<Option<CloseCallback>>,
    error: Mutex<Option<ErrorCallback>>,
    message: Mutex<Option<MessageCallback>>,
    binary: Mutex<Option<BinaryCallback>>,
}

impl Callbacks {
    pub(crate) fn set_open(&self, cb: OpenCallback) {
        *self.open.lock().unwrap() = Some(cb);
    }

    pub(crate) fn set_close(&self, cb: CloseCallback) {
        *self.close.lock().unwrap() = Some(cb);
    }

    pub(crate) fn set_error(&self, cb: ErrorCallback) {
        *self.error.lock().unwrap() = Some(cb);
    }

    pub(crate) fn set_message(&self, cb: MessageCallback) {
        *self.message.lock().unwrap() = Some(cb);
    }

    pub(crate) fn set_binary(&self, cb: BinaryCallback) {
        *self.binary.lock().unwrap() = Some(cb);
    }

    pub(crate) fn fire_open(&self) {
        let cb = self.open.lock().unwrap().clone();
        if let Some(cb) = cb {
            cb();
        }
    }

    pub(crate) fn fire_close(&self, code: u16, reason: &str) {
        let cb = self.close.lock().unwrap().clone();
        if let Some(cb) = cb {
            cb(code, reason);
        }
    }

    pub(crate) fn fire_error(&self, code: u16, message: &str) {
        let cb = self.error.lock().unwrap().clone();
        if let Some(cb) = cb {
            cb(code, message);
        }
    }

    pub(crate) fn fire_message(&self, text: &str) {
        let cb = self.message.lock().unwrap().clone();
        if let Some(cb) = cb {
            cb(text);
        }
    }

    pub(crate) fn fire_binary(&self, data: &[u8]) {
        let cb = self.binary.lock().unwrap().clone();
        if let Some(cb) = cb {
            cb(data);
        }
    }
}

/// State shared between caller threads and the event loop.
pub(crate) struct Shared {
    /// Pre-connect configuration, snapshotted by `connect()`.
    pub(crate) config: Mutex<ClientConfig>,
    /// Registered callbacks.
    pub(crate) callbacks: Callbacks,
    /// Bounded FIFO of pending sends.
    pub(crate) queue: Mutex<VecDeque<Pending>>,
    /// Wakes the event loop after enqueueing or requesting a stop.
    pub(crate) wakeup: Notify,
    /// Packed [`ConnectionState`].
    state: AtomicU8,
    /// The loop thread is alive (set by `connect`, cleared on loop exit).
    pub(crate) running: AtomicBool,
    /// A graceful shutdown has been requested.
    pub(crate) stop_requested: AtomicBool,
    /// The close callback has fired for this connection.
    pub(crate) close_cb_fired: AtomicBool,
    /// The queue holds items awaiting a flush.
    pub(crate) flush_pending: AtomicBool,
}

impl Shared {
    pub(crate) fn new(config: ClientConfig) -> Self {
        Self {
            config: Mutex::new(config),
            callbacks: Callbacks::default(),
            queue: Mutex::new(VecDeque::new()),
            wakeup: Notify::new(),
            state: AtomicU8::new(ConnectionState::Disconnected.as_u8()),
            running: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            close_cb_fired: AtomicBool::new(false),
            flush_pending: AtomicBool::new(false),
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// Fire the close callback at most once per connection lifetime.
    pub(crate) fn fire_close_once(&self, code: u16, reason: &str) {
        if !self.close_cb_fired.swap(true, Ordering::AcqRel) {
            self.callbacks.fire_close(code, reason);
        }
    }
}

/// Everything the event loop needs, resolved synchronously at connect time.
pub(crate) struct Boot {
    pub(crate) url: Url,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) compression: bool,
    pub(crate) ping_interval: Option<Duration>,
    pub(crate) connect_timeout: Duration,
    pub(crate) close_timeout: Duration,
    pub(crate) limits: Limits,
    pub(crate) tls: Option<TlsConnector>,
}
