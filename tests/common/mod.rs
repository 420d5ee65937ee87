//! Shared helpers for integration tests: a scriptable in-process broker
//! built on `tokio::net::TcpListener`, reusing the crate's own parser to
//! decode frames written by the client under test.
#![allow(dead_code)]

use osmium_stomp::{Frame, Parser, StompItem};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// CONNECTED response negotiating STOMP 1.2 without heartbeats.
pub const CONNECTED_V12: &[u8] =
    b"CONNECTED\nversion:1.2\nsession:session-1\nserver:MockBroker/1.0\nheart-beat:0,0\n\n\x00";

/// Bind a listener on an ephemeral port and return it with a `tcp://` URI.
pub async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    (listener, format!("tcp://127.0.0.1:{port}"))
}

/// Broker side of one accepted session: reads client frames through the
/// crate parser and writes scripted responses.
pub struct BrokerSession {
    stream: TcpStream,
    parser: Parser,
}

impl BrokerSession {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            parser: Parser::new(),
        }
    }

    /// Next complete frame from the client, or `None` once the client
    /// closed the stream. Heartbeat bytes are skipped.
    pub async fn next_frame(&mut self) -> Option<Frame> {
        loop {
            match self.parser.next() {
                Some(StompItem::Frame(frame)) => return Some(frame),
                Some(StompItem::Heartbeat) => {}
                None => {
                    let mut buf = [0u8; 4096];
                    let n = self.stream.read(&mut buf).await.expect("broker read");
                    if n == 0 {
                        return None;
                    }
                    self.parser.add_data(&buf[..n]);
                }
            }
        }
    }

    /// Read exactly one raw byte (used to observe heartbeat emission).
    pub async fn read_byte(&mut self) -> Option<u8> {
        let mut buf = [0u8; 1];
        match self.stream.read(&mut buf).await.expect("broker read") {
            0 => None,
            _ => Some(buf[0]),
        }
    }

    pub async fn write(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.expect("broker write");
    }

    /// Answer a client frame's `receipt` header, if present.
    pub async fn send_receipt_for(&mut self, frame: &Frame) {
        if let Some(receipt) = frame.get_header("receipt") {
            let response = format!("RECEIPT\nreceipt-id:{receipt}\n\n\x00");
            self.write(response.as_bytes()).await;
        }
    }

    pub async fn shutdown(mut self) {
        let _ = self.stream.shutdown().await;
    }
}

/// Accept one connection, consume the CONNECT frame and reply with the
/// given CONNECTED bytes.
pub async fn accept_session_with(listener: &TcpListener, connected: &[u8]) -> BrokerSession {
    let (stream, _) = listener.accept().await.expect("accept");
    let mut session = BrokerSession::new(stream);
    let connect = session.next_frame().await.expect("CONNECT frame");
    assert_eq!(connect.command, "CONNECT");
    session.write(connected).await;
    session
}

/// Accept one connection and bring it up as a STOMP 1.2 session.
pub async fn accept_session(listener: &TcpListener) -> BrokerSession {
    accept_session_with(listener, CONNECTED_V12).await
}

/// Broker loop that answers every receipt-bearing frame with its RECEIPT
/// and stops when the client disconnects. Frames are passed to `inspect`
/// before the receipt goes out.
pub async fn auto_receipt_loop(
    mut session: BrokerSession,
    mut inspect: impl FnMut(&Frame),
) {
    while let Some(frame) = session.next_frame().await {
        if frame.command == "DISCONNECT" {
            break;
        }
        inspect(&frame);
        session.send_receipt_for(&frame).await;
    }
}
