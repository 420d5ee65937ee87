use bytes::{BufMut, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

use crate::frame::Frame;
use crate::parser::Parser;

/// Items produced or consumed by the codec.
///
/// A `StompItem` is either a decoded `Frame` or a `Heartbeat` marker
/// representing a single LF received on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StompItem {
    /// A decoded STOMP frame (command + headers + body)
    Frame(Frame),
    /// A single heartbeat pulse (LF)
    Heartbeat,
}

/// Apply header escaping for wire transmission.
///
/// Modern (STOMP 1.1+) rules escape backslash, CR, LF and colon as `\\`,
/// `\r`, `\n` and `\c`. Legacy (1.0) framing only escapes LF as `\n`.
/// Names and values are escaped by the same rule.
pub fn escape_header(input: &str, legacy: bool) -> String {
    if legacy {
        return input.replace('\n', "\\n");
    }
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            ':' => out.push_str("\\c"),
            _ => out.push(ch),
        }
    }
    out
}

/// Serialize a frame into `dst`: command, headers, blank line, body, NUL.
///
/// A `content-length` header is emitted exactly when the frame demands one
/// (`expect_length_header`, a NUL byte in the body, or an explicit header
/// set by the caller); otherwise it is omitted so brokers detect the frame
/// end by the NUL terminator.
pub fn encode_frame(frame: &Frame, dst: &mut BytesMut) {
    dst.extend_from_slice(frame.command.as_bytes());
    dst.put_u8(b'\n');

    let explicit_length = frame.get_header("content-length").is_some();
    for (name, value) in &frame.headers {
        dst.extend_from_slice(escape_header(name, frame.legacy).as_bytes());
        dst.put_u8(b':');
        dst.extend_from_slice(escape_header(value, frame.legacy).as_bytes());
        dst.put_u8(b'\n');
    }
    if !explicit_length && (frame.expect_length_header || frame.body.contains(&0)) {
        dst.extend_from_slice(b"content-length:");
        dst.extend_from_slice(frame.body.len().to_string().as_bytes());
        dst.put_u8(b'\n');
    }

    dst.put_u8(b'\n');
    dst.extend_from_slice(&frame.body);
    dst.put_u8(0);
}

/// A heartbeat serializes as the single byte `\n`.
pub fn encode_heartbeat(dst: &mut BytesMut) {
    dst.put_u8(b'\n');
}

/// `StompCodec` implements `tokio_util::codec::{Decoder, Encoder}` for the
/// STOMP wire protocol, making the crate's parser usable behind `Framed`
/// transports.
///
/// Decoding delegates to an internal [`Parser`], so it is robust to
/// arbitrary chunk boundaries and yields `Heartbeat` items for lone LF
/// bytes. Encoding follows each frame's own `legacy` flag.
#[derive(Debug, Default)]
pub struct StompCodec {
    parser: Parser,
}

impl StompCodec {
    pub fn new() -> Self {
        Self {
            parser: Parser::new(),
        }
    }

    /// A codec whose decoder starts in legacy (STOMP 1.0) mode.
    pub fn legacy() -> Self {
        Self {
            parser: Parser::legacy(),
        }
    }

    /// Switch the decoder's header escaping mode.
    pub fn set_legacy(&mut self, legacy: bool) {
        self.parser.set_legacy(legacy);
    }
}

impl Decoder for StompCodec {
    type Item = StompItem;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if !src.is_empty() {
            self.parser.add_data(src);
            src.clear();
        }
        Ok(self.parser.next())
    }
}

impl Encoder<StompItem> for StompCodec {
    type Error = io::Error;

    fn encode(&mut self, item: StompItem, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            StompItem::Heartbeat => encode_heartbeat(dst),
            StompItem::Frame(frame) => encode_frame(&frame, dst),
        }
        Ok(())
    }
}
