//! The per-connection event loop.
//!
//! One loop owns the socket, the read buffer, the receiver, the deflate
//! streams, and every timer. It selects over socket readability, the caller
//! wakeup, the ping interval, and the close timer; caller threads only ever
//! enqueue intent and signal the wakeup. All callbacks are invoked from this
//! loop, so no two callbacks for a connection ever run concurrently.

use std::pin::Pin;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio::time::{interval_at, sleep_until, Duration, Instant, Interval};
use tracing::{debug, error, info, warn};

use crate::connection::receiver::{Event, Receiver};
use crate::connection::{Boot, ConnectionState, Pending, Shared};
use crate::error::{Error, ErrorCode, Result};
use crate::extensions::deflate::{Deflater, DeflateConfig};
use crate::protocol::handshake::{generate_key, UpgradeRequest, UpgradeResponse};
use crate::protocol::{random_mask, Frame, OpCode};
use rustls::pki_types::ServerName;

/// Byte stream under the framing layer: plain TCP or TLS.
pub(crate) enum Transport {
    Plain(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl AsyncRead for Transport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(s) => Pin::new(s).poll_read(cx, buf),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            Transport::Plain(s) => Pin::new(s).poll_write(cx, buf),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(s) => Pin::new(s).poll_flush(cx),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(s) => Pin::new(s).poll_shutdown(cx),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Run one connection to completion.
///
/// Fires the error/close callbacks itself; the caller only joins the thread.
pub(crate) async fn run(shared: Arc<Shared>, boot: Boot) {
    shared.set_state(ConnectionState::Connecting);
    info!(host = %boot.url.host, port = boot.url.port, secure = boot.url.secure, "connecting");

    let established = tokio::time::timeout(boot.connect_timeout, establish(&shared, &boot)).await;
    let (transport, deflate, leftover) = match established {
        Ok(Ok(done)) => done,
        Ok(Err(err)) => {
            fail_startup(&shared, &err);
            return;
        }
        Err(_) => {
            fail_startup(&shared, &Error::Io("connection timed out".into()));
            return;
        }
    };

    shared.set_state(ConnectionState::Open);
    info!(compression = deflate.is_some(), "connection open");

    let deflater = deflate.clone().map(Deflater::new);
    let receiver = Receiver::new(boot.limits.clone(), deflate);

    let mut conn = Conn {
        shared: Arc::clone(&shared),
        transport,
        read_buf: leftover,
        receiver,
        deflater,
        scratch: Vec::new(),
        close_sent: false,
        close_received: false,
        sent_close: None,
        result_close: None,
        close_deadline: None,
        close_timeout: boot.close_timeout,
    };

    shared.callbacks.fire_open();

    conn.drive(boot.ping_interval).await;

    shared.queue.lock().unwrap().clear();
    shared.flush_pending.store(false, Ordering::Release);
    shared.set_state(ConnectionState::Closed);

    let (code, reason) = conn.result_close.unwrap_or((1006, String::new()));
    shared.fire_close_once(code, &reason);
    debug!("event loop finished");
}

/// Classify a startup failure and deliver `error` then `close(1006, "")`.
fn fail_startup(shared: &Shared, err: &Error) {
    let code = match err {
        Error::Tls(_) => ErrorCode::Tls,
        Error::InvalidHandshake(_) => ErrorCode::Handshake,
        _ => ErrorCode::Connection,
    };
    error!(code = code.as_u16(), %err, "connection failed");

    shared.queue.lock().unwrap().clear();
    shared.flush_pending.store(false, Ordering::Release);
    shared.set_state(ConnectionState::Closed);
    shared.callbacks.fire_error(code.as_u16(), &err.to_string());
    shared.fire_close_once(1006, "");
}

/// Dial, upgrade, and negotiate: everything covered by the connect timeout.
async fn establish(
    shared: &Shared,
    boot: &Boot,
) -> Result<(Transport, Option<DeflateConfig>, BytesMut)> {
    let tcp = TcpStream::connect((boot.url.host.as_str(), boot.url.port))
        .await
        .map_err(|e| Error::Io(format!("connect to {}:{} failed: {e}", boot.url.host, boot.url.port)))?;
    let _ = tcp.set_nodelay(true);

    let mut transport = match &boot.tls {
        Some(connector) => {
            let server_name = ServerName::try_from(boot.url.host.clone())
                .map_err(|_| Error::Tls(format!("invalid server name: {}", boot.url.host)))?;
            let stream = connector
                .connect(server_name, tcp)
                .await
                .map_err(|e| Error::Tls(e.to_string()))?;
            Transport::Tls(Box::new(stream))
        }
        None => Transport::Plain(tcp),
    };

    shared.set_state(ConnectionState::Handshaking);

    let key = generate_key()?;
    let request = UpgradeRequest {
        host: &boot.url.host,
        port: boot.url.port,
        secure: boot.url.secure,
        resource: &boot.url.resource,
        key: &key,
        offer_compression: boot.compression,
        headers: &boot.headers,
    }
    .encode()?;

    transport.write_all(request.as_bytes()).await?;
    transport.flush().await?;

    // Read until the end of the response headers; anything past them is
    // already frame data and stays in the buffer.
    let mut buf = BytesMut::with_capacity(4096);
    let header_end = loop {
        if let Some(pos) = find_header_end(&buf) {
            break pos;
        }
        if buf.len() > boot.limits.max_handshake_size {
            return Err(Error::InvalidHandshake(format!(
                "response exceeds {} bytes",
                boot.limits.max_handshake_size
            )));
        }
        let n = transport.read_buf(&mut buf).await?;
        if n == 0 {
            return Err(Error::InvalidHandshake(
                "connection closed during handshake".into(),
            ));
        }
    };

    let head = buf.split_to(header_end);
    let response = UpgradeResponse::parse(&head)?;
    response.verify_accept(&key)?;

    let deflate = if boot.compression {
        DeflateConfig::from_extension_offers(&response.extensions)?
    } else if response.extensions.is_empty() {
        None
    } else {
        return Err(Error::InvalidHandshake(
            "server accepted an extension that was not offered".into(),
        ));
    };

    Ok((transport, deflate, buf))
}

/// Find the end of the HTTP header block (the byte after `\r\n\r\n`).
fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
}

enum Wake {
    Io(std::io::Result<usize>),
    Notify,
    Ping,
    CloseTimer,
}

struct Conn {
    shared: Arc<Shared>,
    transport: Transport,
    read_buf: BytesMut,
    receiver: Receiver,
    deflater: Option<Deflater>,
    scratch: Vec<u8>,
    close_sent: bool,
    close_received: bool,
    sent_close: Option<(u16, String)>,
    result_close: Option<(u16, String)>,
    close_deadline: Option<Instant>,
    close_timeout: Duration,
}

impl Conn {
    async fn drive(&mut self, ping_interval: Option<Duration>) {
        let mut ping: Option<Interval> =
            ping_interval.map(|period| interval_at(Instant::now() + period, period));

        // The handshake read may have buffered frames already.
        self.step_receiver().await;
        if self.shared.state() == ConnectionState::Closed {
            return;
        }
        self.on_wakeup().await;

        loop {
            if self.shared.state() == ConnectionState::Closed {
                return;
            }

            let close_deadline = self.close_deadline;
            let wake = tokio::select! {
                res = self.transport.read_buf(&mut self.read_buf) => Wake::Io(res),
                _ = self.shared.wakeup.notified() => Wake::Notify,
                _ = async { ping.as_mut().expect("ping interval").tick().await },
                    if ping.is_some() => Wake::Ping,
                _ = sleep_until(close_deadline.unwrap_or_else(Instant::now)),
                    if close_deadline.is_some() => Wake::CloseTimer,
            };

            match wake {
                Wake::Io(Ok(0)) => {
                    self.on_eof();
                }
                Wake::Io(Ok(_)) => {
                    self.step_receiver().await;
                }
                Wake::Io(Err(err)) => {
                    self.on_read_error(&err);
                }
                Wake::Notify => {
                    self.on_wakeup().await;
                }
                Wake::Ping => {
                    if !self.close_sent {
                        if let Err(err) = self.write_frame(&Frame::ping(Vec::new())).await {
                            self.on_write_error(&err);
                        }
                    }
                }
                Wake::CloseTimer => {
                    debug!("close handshake timed out");
                    self.finish_with_sent_close();
                }
            }
        }
    }

    /// Drain buffered frames through the receiver and dispatch events.
    async fn step_receiver(&mut self) {
        let mut events = Vec::new();
        let outcome = self.receiver.poll(&mut self.read_buf, &mut events);

        self.dispatch_events(events).await;

        if let Err(err) = outcome {
            self.on_protocol_error(&err).await;
        }
    }

    async fn dispatch_events(&mut self, events: Vec<Event>) {
        for event in events {
            match event {
                Event::Text(text) => self.shared.callbacks.fire_message(&text),
                Event::Binary(data) => self.shared.callbacks.fire_binary(&data),
                Event::Ping(payload) => {
                    if !self.close_sent {
                        debug!(len = payload.len(), "ping received, answering with pong");
                        if let Err(err) = self.write_frame(&Frame::pong(payload)).await {
                            self.on_write_error(&err);
                            return;
                        }
                    }
                }
                Event::Pong => {}
                Event::Close { code, reason } => {
                    self.on_peer_close(code, reason).await;
                    return;
                }
            }
        }

        // Callbacks may have enqueued sends.
        if self.shared.flush_pending.swap(false, Ordering::AcqRel) {
            self.on_wakeup().await;
        }
    }

    async fn on_wakeup(&mut self) {
        if self.shared.stop_requested.load(Ordering::Acquire) && !self.close_sent {
            if let Err(err) = self.begin_close(1000, "Normal closure").await {
                self.on_write_error(&err);
                return;
            }
        }
        if let Err(err) = self.flush_queue().await {
            self.on_write_error(&err);
        }
    }

    /// Pop and transmit queued sends, FIFO, until empty or closing.
    async fn flush_queue(&mut self) -> Result<()> {
        self.shared.flush_pending.store(false, Ordering::Release);
        loop {
            if self.close_sent {
                return Ok(());
            }
            let item = self.shared.queue.lock().unwrap().pop_front();
            let Some(item) = item else { break };

            match item {
                Pending::Text(text) => self.send_data(OpCode::Text, text.into_bytes()).await?,
                Pending::Binary(data) => self.send_data(OpCode::Binary, data).await?,
                Pending::Close { code, reason } => self.begin_close(code, &reason).await?,
            }
        }
        self.transport.flush().await?;
        Ok(())
    }

    async fn send_data(&mut self, opcode: OpCode, payload: Vec<u8>) -> Result<()> {
        let (payload, compressed) = match self.deflater.as_mut() {
            Some(deflater) if !payload.is_empty() => match deflater.compress(&payload) {
                Ok(compressed) => (compressed, true),
                Err(err) => {
                    // Keep the message flowing; retry compression next time.
                    warn!(%err, "compression failed, sending payload uncompressed");
                    (payload, false)
                }
            },
            _ => (payload, false),
        };

        let mut frame = Frame::new(true, opcode, payload);
        frame.rsv1 = compressed;
        self.write_frame(&frame).await
    }

    async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let mask = random_mask()?;
        let size = frame.wire_size(true);
        self.scratch.clear();
        self.scratch.resize(size, 0);
        let written = frame.write(&mut self.scratch, Some(mask))?;
        self.transport.write_all(&self.scratch[..written]).await?;
        Ok(())
    }

    /// Send the local close frame and arm the reply timer.
    async fn begin_close(&mut self, code: u16, reason: &str) -> Result<()> {
        if self.close_sent {
            return Ok(());
        }
        debug!(code, reason, "sending close frame");
        self.write_frame(&Frame::close(Some(code), reason)).await?;
        self.transport.flush().await?;
        self.close_sent = true;
        self.sent_close = Some((code, reason.to_string()));
        if self.result_close.is_none() {
            self.result_close = Some((code, reason.to_string()));
        }
        self.shared.set_state(ConnectionState::Closing);
        self.close_deadline = Some(Instant::now() + self.close_timeout);
        Ok(())
    }

    async fn on_peer_close(&mut self, code: u16, reason: String) {
        self.close_received = true;
        if !self.close_sent {
            // Echo the (sanitized) code and reason back.
            debug!(code, "echoing close frame");
            if let Err(err) = self.write_frame(&Frame::close(Some(code), &reason)).await {
                debug!(%err, "failed to echo close frame");
            }
            let _ = self.transport.flush().await;
            self.close_sent = true;
            self.result_close = Some((code, reason));
        } else if self.result_close.is_none() {
            self.result_close = self.sent_close.clone();
        }
        self.shared.set_state(ConnectionState::Closed);
    }

    /// Protocol failure: error callback, close frame with the specific code,
    /// then wait for the peer's close or the timer.
    async fn on_protocol_error(&mut self, err: &Error) {
        let code = err.close_code();
        let message = match err {
            Error::ProtocolViolation { message, .. } => message.clone(),
            other => other.to_string(),
        };
        error!(code, %message, "protocol failure");

        self.receiver.terminate();
        self.shared.callbacks.fire_error(code, &message);

        if !self.close_sent {
            if self.begin_close(code, &message).await.is_err() {
                self.shared.set_state(ConnectionState::Closed);
            }
        }
        self.result_close = Some((code, message));
    }

    fn on_eof(&mut self) {
        if self.close_received {
            // Peer closed the transport after the close handshake.
            self.shared.set_state(ConnectionState::Closed);
            return;
        }
        if self.close_sent {
            debug!("transport closed before the peer's close frame");
            self.finish_with_sent_close();
            return;
        }
        warn!("connection closed by peer without a close frame");
        self.shared
            .callbacks
            .fire_error(ErrorCode::Connection.as_u16(), "connection closed by peer");
        self.result_close = Some((1006, String::new()));
        self.shared.set_state(ConnectionState::Closed);
    }

    fn on_read_error(&mut self, err: &std::io::Error) {
        error!(%err, "transport read failed");
        self.shared
            .callbacks
            .fire_error(ErrorCode::Connection.as_u16(), &err.to_string());
        self.result_close = Some((1006, String::new()));
        self.shared.set_state(ConnectionState::Closed);
    }

    fn on_write_error(&mut self, err: &Error) {
        error!(%err, "transport write failed");
        self.shared
            .callbacks
            .fire_error(ErrorCode::Send.as_u16(), &err.to_string());
        self.result_close = Some((1006, String::new()));
        self.shared.set_state(ConnectionState::Closed);
    }

    fn finish_with_sent_close(&mut self) {
        if self.result_close.is_none() {
            self.result_close = self
                .sent_close
                .clone()
                .or_else(|| Some((1006, String::new())));
        }
        self.shared.set_state(ConnectionState::Closed);
    }
}
