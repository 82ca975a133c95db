//! # wsc - Asynchronous WebSocket Client
//!
//! `wsc` is an RFC 6455 compliant WebSocket client for embedding in host
//! applications that need low-latency, thread-safe message streaming.
//!
//! ## Features
//!
//! - **Incremental framing** with strict RFC 6455 validation
//! - **permessage-deflate** (RFC 7692) with context-takeover negotiation
//! - **`wss://` endpoints** via rustls
//! - **One event loop per connection**: callbacks never run concurrently,
//!   and every public entry point is callable from any thread
//! - **Bounded, non-blocking send queue** with FIFO ordering
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use wsc::WebSocketClient;
//!
//! let client = WebSocketClient::new();
//! client.set_url("wss://echo.example.com/");
//! client.set_open_callback(|| println!("open"));
//! client.set_message_callback(|text| println!("message: {text}"));
//! client.set_close_callback(|code, reason| println!("close: {code} {reason}"));
//! client.connect().unwrap();
//! client.send_text("hello");
//! // ...
//! client.disconnect();
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod extensions;
pub mod message;
pub mod protocol;
pub mod tls;

pub use client::WebSocketClient;
pub use config::{ClientConfig, Limits, Url};
pub use connection::ConnectionState;
pub use error::{Error, ErrorCode, Result};
pub use extensions::deflate::DeflateConfig;
pub use message::CloseCode;
pub use protocol::{compute_accept_key, Frame, OpCode, WS_GUID};
pub use tls::{CaSource, TlsOptions};
