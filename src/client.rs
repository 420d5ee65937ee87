use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, trace};

use crate::connection::{negotiate_heartbeats, parse_heartbeat_header, Connection};
use crate::error::{ConnectionError, Result, StompError};
use crate::frame::Frame;
use crate::idgen::IdGenerator;
use crate::observer::HeartbeatEmitter;
use crate::protocol::{Protocol, Version};
use crate::transform;
use crate::uri::BrokerUri;

pub const DEFAULT_RECEIPT_WAIT: Duration = Duration::from_secs(2);

/// A STOMP session over one [`Connection`].
///
/// The client brings the session up (CONNECT/CONNECTED, version and
/// heartbeat negotiation, dialect selection), sends frames synchronously by
/// receipt or asynchronously, and reads inbound frames. Frames that arrive
/// while a receipt is awaited are buffered and replayed FIFO by
/// [`Client::read_frame`].
///
/// The session exclusively owns its connection; dropping the client closes
/// the socket. One session is one logical actor: callers must serialize
/// access, as every operation takes `&mut self`.
pub struct Client {
    connection: Connection,
    protocol: Protocol,
    session_id: Option<String>,
    login: Option<(String, String)>,
    client_id: Option<String>,
    versions: Vec<Version>,
    vhost: Option<String>,
    heartbeat: (u64, u64),
    negotiated_heartbeat: (Option<Duration>, Option<Duration>),
    sync: bool,
    receipt_wait: Duration,
    unprocessed: VecDeque<Frame>,
    ids: IdGenerator,
    emitter_installed: bool,
}

impl Client {
    /// Create a client for the given broker URI
    /// (`scheme://host[:port]` or `failover://(u1,u2,…)?randomize=bool`).
    pub fn new(uri: &str) -> Result<Self> {
        let uri: BrokerUri = uri.parse()?;
        Ok(Self::with_connection(Connection::new(uri)))
    }

    pub fn with_connection(connection: Connection) -> Self {
        Self {
            connection,
            protocol: Protocol::new(Version::V1_0),
            session_id: None,
            login: None,
            client_id: None,
            versions: vec![Version::V1_0, Version::V1_1, Version::V1_2],
            vhost: None,
            heartbeat: (0, 0),
            negotiated_heartbeat: (None, None),
            sync: true,
            receipt_wait: DEFAULT_RECEIPT_WAIT,
            unprocessed: VecDeque::new(),
            ids: IdGenerator::new(),
            emitter_installed: false,
        }
    }

    pub fn set_login(&mut self, login: impl Into<String>, passcode: impl Into<String>) {
        self.login = Some((login.into(), passcode.into()));
    }

    pub fn set_client_id(&mut self, client_id: impl Into<String>) {
        self.client_id = Some(client_id.into());
    }

    /// Restrict the versions offered in `accept-version`.
    pub fn set_versions(&mut self, versions: Vec<Version>) {
        self.versions = versions;
    }

    pub fn set_vhost(&mut self, vhost: impl Into<String>) {
        self.vhost = Some(vhost.into());
    }

    /// Desired heartbeat intervals in milliseconds (outgoing, incoming),
    /// sent in the CONNECT `heart-beat` header.
    pub fn set_heartbeat(&mut self, send_ms: u64, receive_ms: u64) {
        self.heartbeat = (send_ms, receive_ms);
    }

    /// Default synchronicity of sends (receipt-confirmed when `true`).
    pub fn set_sync(&mut self, sync: bool) {
        self.sync = sync;
    }

    pub fn sync(&self) -> bool {
        self.sync
    }

    /// How long a synchronous send waits for its RECEIPT.
    pub fn set_receipt_wait(&mut self, wait: Duration) {
        self.receipt_wait = wait;
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    pub fn protocol_mut(&mut self) -> &mut Protocol {
        &mut self.protocol
    }

    /// The `(outgoing, incoming)` heartbeat intervals agreed at CONNECTED.
    pub fn negotiated_heartbeat(&self) -> (Option<Duration>, Option<Duration>) {
        self.negotiated_heartbeat
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.connection
    }

    fn connect_frame(&self) -> Frame {
        let versions = self
            .versions
            .iter()
            .map(|v| v.as_str())
            .collect::<Vec<_>>()
            .join(",");
        // CONNECT is framed with legacy escaping: the peer's version is not
        // known until CONNECTED arrives.
        let mut frame = Frame::new("CONNECT").set_legacy(true);
        if let Some((login, passcode)) = &self.login {
            if !(login.is_empty() && passcode.is_empty()) {
                frame = frame.header("login", login).header("passcode", passcode);
            }
        }
        frame = frame.opt_header("client-id", self.client_id.as_deref());
        frame = frame.header("accept-version", versions);
        frame = frame.opt_header("host", self.vhost.as_deref());
        frame.header(
            "heart-beat",
            format!("{},{}", self.heartbeat.0, self.heartbeat.1),
        )
    }

    /// Bring the session up: open the transport, send CONNECT, and await
    /// CONNECTED within the connect timeout.
    ///
    /// On CONNECTED the negotiated version fixes the parser mode, the
    /// session id is recorded, and the protocol is replaced by the dialect
    /// matching the negotiated version and `server` header.
    pub async fn connect(&mut self) -> Result<()> {
        if self.connection.is_connected() {
            return Ok(());
        }
        self.connection.connect().await?;
        self.connection.set_parser_legacy(true);
        let connect = self.connect_frame();
        self.connection.write_frame(&connect).await?;

        let deadline = Instant::now() + self.connection.connect_timeout();
        let connected = loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(StompError::Connection(ConnectionError::new(
                    self.connection
                        .active_endpoint()
                        .map(|e| e.to_string())
                        .unwrap_or_default(),
                    "broker did not acknowledge the CONNECT frame",
                )));
            }
            let saved = self.connection.read_timeout();
            self.connection.set_read_timeout(remaining.min(saved));
            let read = self.connection.read_frame().await;
            self.connection.set_read_timeout(saved);
            match read? {
                Some(frame) if frame.command == "CONNECTED" => break frame,
                Some(frame) => {
                    return Err(StompError::UnexpectedResponse {
                        expected: "CONNECTED".to_string(),
                        received: frame,
                    })
                }
                None => {}
            }
        };

        let version = match connected.get_header("version") {
            Some(v) => v.parse::<Version>()?,
            None => Version::V1_0,
        };
        if version.has(Version::V1_1) {
            self.connection.set_parser_legacy(false);
        }
        self.session_id = connected.get_header("session").map(str::to_string);
        let server = connected.get_header("server").unwrap_or("").to_string();
        self.protocol = Protocol::for_server(&server, version, self.client_id.clone());

        let (sx, sy) =
            parse_heartbeat_header(connected.get_header("heart-beat").unwrap_or("0,0"));
        let negotiated = negotiate_heartbeats(self.heartbeat.0, self.heartbeat.1, sx, sy);
        self.negotiated_heartbeat = negotiated;
        if let Some(interval) = negotiated.0 {
            if !self.emitter_installed {
                self.connection
                    .add_observer(Box::new(HeartbeatEmitter::new(interval)));
                self.emitter_installed = true;
            }
        }

        debug!(
            session = ?self.session_id,
            version = %version,
            server = %server,
            "stomp session established"
        );
        Ok(())
    }

    /// Send a message to a destination. The frame's command is coerced to
    /// SEND and its `destination` header set; everything else (headers,
    /// body, transaction) is taken as given.
    pub async fn send(&mut self, destination: &str, frame: Frame) -> Result<()> {
        let mut frame = frame;
        frame.command = "SEND".to_string();
        frame.set_header("destination", destination);
        self.send_frame(frame, None).await
    }

    /// Convenience: send a plain body to a destination.
    pub async fn send_body(&mut self, destination: &str, body: impl Into<Vec<u8>>) -> Result<()> {
        self.send(destination, Frame::new("SEND").set_body(body)).await
    }

    /// Send any value that serializes to a JSON object as a
    /// `jms-map-json` transformed message.
    pub async fn send_map<T: Serialize>(&mut self, destination: &str, value: &T) -> Result<()> {
        let frame = transform::map_send_frame(value)?;
        self.send(destination, frame).await
    }

    /// Write a frame, optionally overriding the client's sync default.
    ///
    /// A synchronous send injects a generated `receipt` header (replacing
    /// any caller-set one) and blocks until the matching RECEIPT arrives or
    /// the receipt wait elapses. Asynchronous sends return after the write.
    pub async fn send_frame(&mut self, mut frame: Frame, sync: Option<bool>) -> Result<()> {
        frame.legacy = !self.protocol.version().has(Version::V1_1);
        let sync = sync.unwrap_or(self.sync);
        if !sync {
            return self.connection.write_frame(&frame).await;
        }

        let receipt_id = self.ids.generate()?;
        let receipt = format!("message-{receipt_id}");
        frame.set_header("receipt", receipt.clone());
        let result = match self.connection.write_frame(&frame).await {
            Ok(()) => self.wait_for_receipt(&receipt).await,
            Err(err) => Err(err),
        };
        self.ids.release(receipt_id);
        result
    }

    /// Read frames until the RECEIPT with the given id arrives, buffering
    /// every other frame for later [`Client::read_frame`] calls.
    ///
    /// A RECEIPT with a different `receipt-id` is an unexpected response;
    /// running out the receipt wait raises a missing-receipt error.
    pub async fn wait_for_receipt(&mut self, receipt: &str) -> Result<()> {
        let deadline = Instant::now() + self.receipt_wait;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(StompError::MissingReceipt {
                    receipt_id: receipt.to_string(),
                });
            }
            let saved = self.connection.read_timeout();
            self.connection.set_read_timeout(remaining.min(saved));
            let read = self.connection.read_frame().await;
            self.connection.set_read_timeout(saved);
            match read? {
                Some(frame) if frame.command == "RECEIPT" => {
                    return match frame.get_header("receipt-id") {
                        Some(id) if id == receipt => {
                            trace!(receipt, "receipt confirmed");
                            Ok(())
                        }
                        _ => Err(StompError::UnexpectedResponse {
                            expected: format!("RECEIPT for '{receipt}'"),
                            received: frame,
                        }),
                    };
                }
                Some(frame) => {
                    trace!(command = %frame.command, "buffering frame while awaiting receipt");
                    self.unprocessed.push_back(frame);
                }
                None => {}
            }
        }
    }

    /// Next inbound frame: the unprocessed FIFO first, then the connection.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>> {
        if let Some(frame) = self.unprocessed.pop_front() {
            return Ok(Some(frame));
        }
        self.connection.read_frame().await
    }

    /// Buffered-only read: the unprocessed FIFO first, then whatever the
    /// parser can produce from already-received bytes. Never performs new
    /// socket reads.
    pub async fn read_buffered(&mut self) -> Result<Option<Frame>> {
        if let Some(frame) = self.unprocessed.pop_front() {
            return Ok(Some(frame));
        }
        self.connection.read_parsed_frame().await
    }

    /// Drain every buffered frame (unprocessed FIFO plus parser backlog)
    /// without reading from the socket.
    pub async fn flush_buffered_frames(&mut self) -> Result<Vec<Frame>> {
        let mut frames = Vec::new();
        while let Some(frame) = self.read_buffered().await? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// True when buffered frames (or bytes that may complete into frames)
    /// are pending.
    pub fn has_buffered_frames(&self) -> bool {
        !self.unprocessed.is_empty() || !self.connection.parser_buffer_empty()
    }

    /// Gracefully end the session: send DISCONNECT (errors suppressed) and
    /// close the transport, clearing session and buffered state.
    pub async fn disconnect(&mut self) {
        if self.connection.is_connected() {
            let disconnect = self.protocol.disconnect_frame();
            let _ = self.connection.write_frame(&disconnect).await;
            self.connection.disconnect().await;
        }
        self.session_id = None;
        self.unprocessed.clear();
        self.negotiated_heartbeat = (None, None);
    }
}
