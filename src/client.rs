//! Thread-safe client façade.
//!
//! [`WebSocketClient`] is an opaque handle: setters record configuration,
//! `connect()` spawns one event-loop thread that owns the socket, and the
//! send/disconnect entry points only enqueue intent and wake that loop. All
//! methods can be called from any thread, including from inside callbacks.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::debug;

use crate::config::Url;
use crate::connection::{event_loop, Boot, ConnectionState, Pending, Shared};
use crate::error::{Error, Result};
use crate::tls::TlsOptions;

/// An asynchronous WebSocket client.
///
/// # Example
///
/// ```rust,no_run
/// use wsc::WebSocketClient;
///
/// let client = WebSocketClient::new();
/// client.set_url("ws://localhost:9001/echo");
/// client.set_message_callback(|text| println!("got: {text}"));
/// client.set_close_callback(|code, reason| println!("closed: {code} {reason}"));
/// client.connect().unwrap();
/// client.send_text("hello");
/// client.disconnect();
/// ```
pub struct WebSocketClient {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Default for WebSocketClient {
    fn default() -> Self {
        Self::new()
    }
}

impl WebSocketClient {
    /// Create a disconnected client with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::new(crate::config::ClientConfig::default())),
            thread: Mutex::new(None),
        }
    }

    /// Set the endpoint URL (`ws://host[:port]/path` or `wss://...`).
    ///
    /// The URL is parsed at `connect()` time; a malformed URL surfaces there.
    pub fn set_url(&self, url: impl Into<String>) {
        self.shared.config.lock().unwrap().url = Some(url.into());
    }

    /// Append one header to the upgrade request.
    pub fn add_header(&self, name: impl Into<String>, value: impl Into<String>) {
        self.shared
            .config
            .lock()
            .unwrap()
            .headers
            .push((name.into(), value.into()));
    }

    /// Replace all custom upgrade headers.
    pub fn set_headers(&self, headers: Vec<(String, String)>) {
        self.shared.config.lock().unwrap().headers = headers;
    }

    /// Offer `permessage-deflate` during the handshake. Default: enabled.
    pub fn enable_compression(&self, enabled: bool) {
        self.shared.config.lock().unwrap().compression = enabled;
    }

    /// Send an empty ping every `seconds`; 0 disables the ping timer.
    pub fn set_ping_interval(&self, seconds: u64) {
        self.shared.config.lock().unwrap().ping_interval = if seconds == 0 {
            None
        } else {
            Some(Duration::from_secs(seconds))
        };
    }

    /// Timeout covering TCP connect, TLS, and the HTTP upgrade.
    pub fn set_connection_timeout(&self, seconds: u64) {
        self.shared.config.lock().unwrap().connect_timeout = Duration::from_secs(seconds);
    }

    /// TLS options for `wss://` endpoints.
    pub fn set_tls_options(&self, options: TlsOptions) {
        self.shared.config.lock().unwrap().tls = options;
    }

    /// Called from the loop thread once the connection is open.
    pub fn set_open_callback(&self, cb: impl Fn() + Send + Sync + 'static) {
        self.shared.callbacks.set_open(Arc::new(cb));
    }

    /// Called exactly once per connection with the close code and reason.
    pub fn set_close_callback(&self, cb: impl Fn(u16, &str) + Send + Sync + 'static) {
        self.shared.callbacks.set_close(Arc::new(cb));
    }

    /// Called on failures with an error code and message.
    ///
    /// Codes 4001-4004 are client-local classes ([`crate::ErrorCode`]);
    /// protocol failures report the RFC 6455 close code.
    pub fn set_error_callback(&self, cb: impl Fn(u16, &str) + Send + Sync + 'static) {
        self.shared.callbacks.set_error(Arc::new(cb));
    }

    /// Called with each complete text message.
    pub fn set_message_callback(&self, cb: impl Fn(&str) + Send + Sync + 'static) {
        self.shared.callbacks.set_message(Arc::new(cb));
    }

    /// Called with each complete binary message.
    pub fn set_binary_callback(&self, cb: impl Fn(&[u8]) + Send + Sync + 'static) {
        self.shared.callbacks.set_binary(Arc::new(cb));
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Whether the connection is open for traffic.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.shared.state().is_open()
    }

    /// Start connecting. Idempotent: a second call while a connection is
    /// running returns `Ok(())` without doing anything.
    ///
    /// # Errors
    ///
    /// Setup errors surface synchronously: a missing or malformed URL, TLS
    /// configuration problems, or a failure to spawn the loop thread.
    /// Asynchronous failures (DNS, TCP, TLS handshake, HTTP upgrade) are
    /// delivered through the error and close callbacks.
    pub fn connect(&self) -> Result<()> {
        if self.shared.running.swap(true, Ordering::AcqRel) {
            debug!("connect called while already running");
            return Ok(());
        }

        match self.start_loop() {
            Ok(handle) => {
                *self.thread.lock().unwrap() = Some(handle);
                Ok(())
            }
            Err(err) => {
                self.shared.set_state(ConnectionState::Disconnected);
                self.shared.running.store(false, Ordering::Release);
                Err(err)
            }
        }
    }

    fn start_loop(&self) -> Result<JoinHandle<()>> {
        self.shared.stop_requested.store(false, Ordering::Release);
        self.shared.close_cb_fired.store(false, Ordering::Release);
        self.shared.set_state(ConnectionState::Connecting);

        let boot = {
            let config = self.shared.config.lock().unwrap();
            let raw = config
                .url
                .clone()
                .ok_or_else(|| Error::InvalidUrl("no URL configured".into()))?;
            let url = Url::parse(&raw)?;
            let tls = if url.secure {
                Some(crate::tls::build_connector(&config.tls)?)
            } else {
                None
            };
            Boot {
                url,
                headers: config.headers.clone(),
                compression: config.compression,
                ping_interval: config.ping_interval,
                connect_timeout: config.connect_timeout,
                close_timeout: config.close_timeout,
                limits: config.limits.clone(),
                tls,
            }
        };

        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("wsc-event-loop".into())
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_io()
                    .enable_time()
                    .build();
                match runtime {
                    Ok(runtime) => runtime.block_on(event_loop::run(Arc::clone(&shared), boot)),
                    Err(err) => {
                        shared.set_state(ConnectionState::Closed);
                        shared
                            .callbacks
                            .fire_error(crate::ErrorCode::Connection.as_u16(), &err.to_string());
                        shared.fire_close_once(1006, "");
                    }
                }
                shared.running.store(false, Ordering::Release);
            })
            .map_err(|e| Error::Io(format!("failed to spawn event loop thread: {e}")))?;

        Ok(handle)
    }

    /// Queue a text message. Returns `false` when the queue is full or the
    /// connection is closing or closed. Never blocks.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.enqueue(Pending::Text(text.into())).is_ok()
    }

    /// Queue a binary message. Returns `false` when the queue is full or the
    /// connection is closing or closed. Never blocks.
    pub fn send_binary(&self, data: impl Into<Vec<u8>>) -> bool {
        self.enqueue(Pending::Binary(data.into())).is_ok()
    }

    fn enqueue(&self, item: Pending) -> Result<()> {
        if self.shared.stop_requested.load(Ordering::Acquire)
            || !self.shared.state().can_enqueue()
        {
            return Err(Error::NotConnected);
        }

        let capacity = self.shared.config.lock().unwrap().queue_capacity;
        {
            let mut queue = self.shared.queue.lock().unwrap();
            if queue.len() >= capacity {
                return Err(Error::QueueFull);
            }
            queue.push_back(item);
        }

        self.shared.flush_pending.store(true, Ordering::Release);
        self.shared.wakeup.notify_one();
        Ok(())
    }

    /// Gracefully close and wait for the loop thread to exit. Idempotent.
    ///
    /// When invoked from inside a callback (on the loop thread) this only
    /// signals the shutdown; a later call from any other thread joins.
    pub fn disconnect(&self) {
        self.shared.stop_requested.store(true, Ordering::Release);
        if self.shared.running.load(Ordering::Acquire) {
            // The graceful close rides the queue so a flush already in
            // progress finishes first; the loop also checks the stop flag.
            self.shared.queue.lock().unwrap().push_back(Pending::Close {
                code: 1000,
                reason: "Normal closure".into(),
            });
        } else {
            self.shared.queue.lock().unwrap().clear();
        }
        self.shared.wakeup.notify_one();

        let handle = self.thread.lock().unwrap().take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                // Called from a callback; the loop cannot join itself.
                *self.thread.lock().unwrap() = Some(handle);
                return;
            }
            let _ = handle.join();
        }
    }
}

impl Drop for WebSocketClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}
