use std::io;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use rand::seq::SliceRandom;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, trace, warn};

use crate::codec::{encode_frame, StompItem};
use crate::error::{ConnectionError, Result, StompError};
use crate::frame::Frame;
use crate::observer::{dispatch, ConnectionObserver, ObserverEvent, ObserverSignal};
use crate::parser::Parser;
use crate::uri::{BrokerUri, Endpoint};

/// Pause between partial writes.
const PARTIAL_IO_PAUSE: Duration = Duration::from_micros(2500);
/// Pause after a zero-byte read before declaring the peer gone.
const CLOSED_READ_PAUSE: Duration = Duration::from_millis(5);

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_ALIVE_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_READ_BYTES: usize = 8 * 1024;
pub const DEFAULT_MAX_WRITE_BYTES: usize = 8 * 1024;

/// Hook invoked between readiness polls while a read waits for data.
/// Returning `false` aborts the wait and the read yields no frame.
pub type WaitCallback = Box<dyn FnMut() -> bool + Send>;

/// Parse the STOMP `heart-beat` header value (format: "cx,cy", both in
/// milliseconds). Missing or unparseable fields default to `0`.
pub fn parse_heartbeat_header(header: &str) -> (u64, u64) {
    let mut parts = header.split(',');
    let cx = parts
        .next()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(0);
    let cy = parts
        .next()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(0);
    (cx, cy)
}

/// Negotiate heartbeat intervals between client and server.
///
/// Returns `(outgoing, incoming)` where each side is `Some(interval)` when
/// heartbeats are enabled in that direction. STOMP takes the maximum of the
/// corresponding client and server values; `0` on both sides disables the
/// direction.
pub fn negotiate_heartbeats(
    client_out: u64,
    client_in: u64,
    server_out: u64,
    server_in: u64,
) -> (Option<Duration>, Option<Duration>) {
    let negotiated_out_ms = std::cmp::max(client_out, server_in);
    let negotiated_in_ms = std::cmp::max(client_in, server_out);

    let outgoing = if negotiated_out_ms == 0 {
        None
    } else {
        Some(Duration::from_millis(negotiated_out_ms))
    };
    let incoming = if negotiated_in_ms == 0 {
        None
    } else {
        Some(Duration::from_millis(negotiated_in_ms))
    };
    (outgoing, incoming)
}

/// A framed byte-stream connection to one broker out of a failover set.
///
/// The connection is a single cooperating flow of control: every operation
/// takes `&mut self`, nothing runs in the background, and callers must
/// serialize access externally. Reads and writes are non-blocking with
/// per-operation timeouts; chunked writes pause briefly between partial
/// progress, and reads drain the parser before touching the socket.
///
/// Registered [`ConnectionObserver`]s see every sent/received frame,
/// heartbeat byte and empty read, and may request an alive byte or fail the
/// connection through their polled signal.
pub struct Connection {
    uri: BrokerUri,
    stream: Option<TcpStream>,
    active: Option<Endpoint>,
    parser: Parser,
    observers: Vec<Box<dyn ConnectionObserver>>,
    connect_timeout: Duration,
    read_timeout: Duration,
    write_timeout: Duration,
    alive_timeout: Duration,
    max_read_bytes: usize,
    max_write_bytes: usize,
    wait_callback: Option<WaitCallback>,
}

impl Connection {
    pub fn new(uri: BrokerUri) -> Self {
        Self {
            uri,
            stream: None,
            active: None,
            parser: Parser::new(),
            observers: Vec::new(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            alive_timeout: DEFAULT_ALIVE_TIMEOUT,
            max_read_bytes: DEFAULT_MAX_READ_BYTES,
            max_write_bytes: DEFAULT_MAX_WRITE_BYTES,
            wait_callback: None,
        }
    }

    /// Open the transport, trying each endpoint of the broker URI in order
    /// (shuffled when `randomize` is set) and keeping the first that
    /// answers within the connect timeout.
    ///
    /// When every endpoint fails, the returned error's `source()` chain
    /// walks back through each attempt.
    pub async fn connect(&mut self) -> Result<()> {
        let mut endpoints = self.uri.endpoints.clone();
        if self.uri.randomize {
            endpoints.shuffle(&mut rand::thread_rng());
        }

        let mut last: Option<ConnectionError> = None;
        for endpoint in &endpoints {
            let attempt = tokio::time::timeout(
                self.connect_timeout,
                TcpStream::connect((endpoint.host.as_str(), endpoint.port)),
            )
            .await;
            match attempt {
                Ok(Ok(stream)) => {
                    debug!(endpoint = %endpoint, "connected to broker");
                    self.stream = Some(stream);
                    self.active = Some(endpoint.clone());
                    self.parser = Parser::new();
                    return Ok(());
                }
                Ok(Err(err)) => {
                    debug!(endpoint = %endpoint, error = %err, "broker endpoint failed");
                    let message = format!("could not connect to {endpoint}: {err}");
                    last = Some(match last.take() {
                        Some(previous) => {
                            ConnectionError::with_source(endpoint.to_string(), message, previous)
                        }
                        None => ConnectionError::with_source(endpoint.to_string(), message, err),
                    });
                }
                Err(_) => {
                    debug!(endpoint = %endpoint, "connect attempt timed out");
                    let message = format!("connect to {endpoint} timed out");
                    last = Some(match last.take() {
                        Some(previous) => {
                            ConnectionError::with_source(endpoint.to_string(), message, previous)
                        }
                        None => ConnectionError::new(endpoint.to_string(), message),
                    });
                }
            }
        }

        Err(match last {
            Some(err) => err.into(),
            None => ConnectionError::detached("broker uri has no endpoints").into(),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// The endpoint the connection is currently attached to.
    pub fn active_endpoint(&self) -> Option<&Endpoint> {
        self.active.as_ref()
    }

    pub fn uri(&self) -> &BrokerUri {
        &self.uri
    }

    pub fn add_observer(&mut self, observer: Box<dyn ConnectionObserver>) {
        self.observers.push(observer);
    }

    /// Install the hook invoked between readiness polls during reads.
    pub fn set_wait_callback(&mut self, callback: impl FnMut() -> bool + Send + 'static) {
        self.wait_callback = Some(Box::new(callback));
    }

    pub fn clear_wait_callback(&mut self) {
        self.wait_callback = None;
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn set_connect_timeout(&mut self, timeout: Duration) {
        self.connect_timeout = timeout;
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    pub fn set_read_timeout(&mut self, timeout: Duration) {
        self.read_timeout = timeout;
    }

    pub fn set_write_timeout(&mut self, timeout: Duration) {
        self.write_timeout = timeout;
    }

    pub fn set_alive_timeout(&mut self, timeout: Duration) {
        self.alive_timeout = timeout;
    }

    pub fn set_max_read_bytes(&mut self, max: usize) {
        self.max_read_bytes = max.max(1);
    }

    pub fn set_max_write_bytes(&mut self, max: usize) {
        self.max_write_bytes = max.max(1);
    }

    /// Switch the inbound parser between legacy and 1.1+ header escaping.
    pub fn set_parser_legacy(&mut self, legacy: bool) {
        self.parser.set_legacy(legacy);
    }

    /// True iff the inbound parser holds no unparsed bytes.
    pub fn parser_buffer_empty(&self) -> bool {
        self.parser.is_buffer_empty()
    }

    fn not_connected(&self) -> StompError {
        StompError::Connection(ConnectionError::detached("not connected to any broker"))
    }

    fn active_host(&self) -> String {
        self.active
            .as_ref()
            .map(|endpoint| endpoint.to_string())
            .unwrap_or_else(|| "(unknown)".to_string())
    }

    fn conn_error(&self, message: &str) -> StompError {
        StompError::Connection(ConnectionError::new(self.active_host(), message))
    }

    fn conn_error_src(&self, message: &str, err: io::Error) -> StompError {
        StompError::Connection(ConnectionError::with_source(
            self.active_host(),
            format!("{message}: {err}"),
            err,
        ))
    }

    async fn notify(&mut self, event: ObserverEvent<'_>) -> Result<()> {
        let signals = dispatch(&mut self.observers, event);
        for signal in signals {
            match signal {
                ObserverSignal::SendAlive => {
                    trace!("emitting heartbeat byte");
                    self.send_alive().await?;
                }
                ObserverSignal::ConnectionDead => {
                    warn!(endpoint = %self.active_host(), "server alive deadline exceeded");
                    return Err(StompError::HeartbeatMissed);
                }
            }
        }
        Ok(())
    }

    /// Serialize and write one frame, then dispatch the sent-frame event.
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let mut buf = BytesMut::new();
        encode_frame(frame, &mut buf);
        self.write_data(&buf, self.write_timeout).await?;
        trace!(command = %frame.command, bytes = buf.len(), "frame written");
        self.notify(ObserverEvent::Sent(frame)).await
    }

    /// Emit a single heartbeat byte with the (short) alive timeout.
    pub async fn send_alive(&mut self) -> Result<()> {
        self.write_data(b"\n", self.alive_timeout).await
    }

    /// Write raw bytes in chunks of at most `max_write_bytes`, re-attempting
    /// until everything is written or `timeout` elapses without forward
    /// progress (measured from the last byte successfully written).
    async fn write_data(&mut self, data: &[u8], timeout: Duration) -> Result<()> {
        let mut written = 0usize;
        let mut last_progress = Instant::now();
        while written < data.len() {
            let Some(stream) = self.stream.as_ref() else {
                return Err(self.not_connected());
            };
            let end = (written + self.max_write_bytes).min(data.len());
            match stream.try_write(&data[written..end]) {
                Ok(0) => return Err(self.conn_error("connection closed during write")),
                Ok(n) => {
                    written += n;
                    last_progress = Instant::now();
                    if written < data.len() {
                        tokio::time::sleep(PARTIAL_IO_PAUSE).await;
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    let stalled = last_progress.elapsed();
                    if stalled >= timeout {
                        return Err(self.conn_error("write timed out"));
                    }
                    match tokio::time::timeout(timeout - stalled, stream.writable()).await {
                        Ok(Ok(())) => {}
                        Ok(Err(err)) if err.kind() == io::ErrorKind::Interrupted => {}
                        Ok(Err(err)) => return Err(self.conn_error_src("write poll failed", err)),
                        Err(_) => return Err(self.conn_error("write timed out")),
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(self.conn_error_src("write failed", err)),
            }
        }
        Ok(())
    }

    /// Yield the next frame the parser can produce from already-received
    /// bytes, without reading from the socket.
    ///
    /// Heartbeat bytes are consumed and observed on the way; an ERROR frame
    /// from the peer is converted into [`StompError::ErrorFrame`].
    pub async fn read_parsed_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            match self.parser.next() {
                Some(StompItem::Heartbeat) => {
                    trace!("server heartbeat byte");
                    self.notify(ObserverEvent::EmptyLine).await?;
                }
                Some(StompItem::Frame(frame)) => {
                    trace!(command = %frame.command, "frame received");
                    self.notify(ObserverEvent::Received(&frame)).await?;
                    if frame.command == "ERROR" {
                        return Err(StompError::ErrorFrame(frame));
                    }
                    return Ok(Some(frame));
                }
                None => return Ok(None),
            }
        }
    }

    /// Read the next frame from the broker.
    ///
    /// Drains the parser first, then waits for socket data within the read
    /// timeout, feeding chunks of at most `max_read_bytes` to the parser.
    /// Returns `Ok(None)` when the wait times out, the wait callback aborts,
    /// or the peer half-closed the stream.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            if let Some(frame) = self.read_parsed_frame().await? {
                return Ok(Some(frame));
            }
            self.notify(ObserverEvent::EmptyBuffer).await?;
            if !self.wait_for_data().await? {
                return Ok(None);
            }
            let mut chunk = vec![0u8; self.max_read_bytes];
            let read = {
                let Some(stream) = self.stream.as_ref() else {
                    return Err(self.not_connected());
                };
                stream.try_read(&mut chunk)
            };
            match read {
                Ok(0) => {
                    debug!(endpoint = %self.active_host(), "zero-byte read; peer closed the stream");
                    self.notify(ObserverEvent::EmptyRead).await?;
                    tokio::time::sleep(CLOSED_READ_PAUSE).await;
                    return Ok(None);
                }
                Ok(n) => self.parser.add_data(&chunk[..n]),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    self.notify(ObserverEvent::EmptyRead).await?;
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(self.conn_error_src("read failed", err)),
            }
        }
    }

    /// Wait for the socket to become readable.
    ///
    /// Each poll is bounded by the read timeout; after a timed-out poll the
    /// wait callback decides whether to keep waiting. Without a callback a
    /// single timeout ends the wait. A zero poll result means "no data";
    /// interrupted polls are retried (anything else raises).
    async fn wait_for_data(&mut self) -> Result<bool> {
        loop {
            let ready = {
                let Some(stream) = self.stream.as_ref() else {
                    return Err(self.not_connected());
                };
                tokio::time::timeout(self.read_timeout, stream.readable()).await
            };
            match ready {
                Ok(Ok(())) => return Ok(true),
                Ok(Err(err)) if err.kind() == io::ErrorKind::Interrupted => {}
                Ok(Err(err)) => return Err(self.conn_error_src("read poll failed", err)),
                Err(_) => {
                    self.notify(ObserverEvent::EmptyRead).await?;
                    match self.wait_callback.as_mut() {
                        Some(callback) => {
                            if !callback() {
                                return Ok(false);
                            }
                        }
                        None => return Ok(false),
                    }
                }
            }
        }
    }

    /// Shut the socket down and clear the active-host record. Subsequent
    /// operations fail with a not-connected error.
    pub async fn disconnect(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
            debug!(endpoint = %self.active_host(), "transport closed");
        }
        self.active = None;
        self.parser = Parser::new();
    }
}
