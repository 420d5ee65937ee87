use bytes::{Buf, BytesMut};

use crate::codec::StompItem;
use crate::frame::Frame;

/// Undo header escaping applied by the peer.
///
/// Legacy (STOMP 1.0) mode only recognizes `\n`; modern (1.1+) mode
/// recognizes `\\`, `\r`, `\n` and `\c`. Unknown or trailing escape
/// sequences pass through verbatim — the parser never rejects input on
/// byte-level anomalies.
pub fn unescape_header(input: &[u8], legacy: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        let b = input[i];
        if b == b'\\' && i + 1 < input.len() {
            let replacement = if legacy {
                match input[i + 1] {
                    b'n' => Some(b'\n'),
                    _ => None,
                }
            } else {
                match input[i + 1] {
                    b'\\' => Some(b'\\'),
                    b'r' => Some(b'\r'),
                    b'n' => Some(b'\n'),
                    b'c' => Some(b':'),
                    _ => None,
                }
            };
            if let Some(r) = replacement {
                out.push(r);
                i += 2;
                continue;
            }
        }
        out.push(b);
        i += 1;
    }
    out
}

fn find_byte(input: &[u8], target: u8) -> Option<usize> {
    input.iter().position(|&b| b == target)
}

/// Parse one complete frame from the start of `input`.
///
/// Returns the decoded frame and the number of bytes it consumed, or `None`
/// when the buffer does not yet hold a complete frame. Leading heartbeat
/// bytes are the caller's concern; `input` must start at a command.
fn parse_frame(input: &[u8], legacy: bool) -> Option<(Frame, usize)> {
    let cmd_end = find_byte(input, b'\n')?;
    let mut cmd_bytes = &input[..cmd_end];
    if cmd_bytes.last() == Some(&b'\r') {
        cmd_bytes = &cmd_bytes[..cmd_bytes.len() - 1];
    }
    let command = String::from_utf8_lossy(cmd_bytes).into_owned();
    let mut pos = cmd_end + 1;

    let mut headers: Vec<(String, String)> = Vec::new();
    let mut content_length: Option<usize> = None;
    let mut expect_length_header = false;
    loop {
        let line_end_rel = find_byte(&input[pos..], b'\n')?;
        let mut line = &input[pos..pos + line_end_rel];
        pos += line_end_rel + 1;
        if line.last() == Some(&b'\r') {
            line = &line[..line.len() - 1];
        }
        if line.is_empty() {
            break;
        }
        // Escaped colons arrive as \c, so the first literal ':' separates
        // name from value. A line without one becomes a valueless header.
        let (raw_name, raw_value) = match find_byte(line, b':') {
            Some(colon) => (&line[..colon], &line[colon + 1..]),
            None => (line, &line[line.len()..]),
        };
        let name = String::from_utf8_lossy(&unescape_header(raw_name, legacy)).into_owned();
        let value = String::from_utf8_lossy(&unescape_header(raw_value, legacy)).into_owned();
        if name.eq_ignore_ascii_case("content-length") {
            // Recorded as frame policy rather than kept as a header; the
            // first parseable occurrence drives body extraction.
            expect_length_header = true;
            if content_length.is_none() {
                content_length = value.trim().parse::<usize>().ok();
            }
            continue;
        }
        headers.push((name, value));
    }

    let (body, consumed) = match content_length.filter(|_| !legacy) {
        Some(length) => {
            if input.len() < pos + length + 1 {
                return None;
            }
            if input[pos + length] == 0 {
                (input[pos..pos + length].to_vec(), pos + length + 1)
            } else {
                // Length disagrees with the wire; fall back to the NUL scan.
                let nul_rel = find_byte(&input[pos..], 0)?;
                (input[pos..pos + nul_rel].to_vec(), pos + nul_rel + 1)
            }
        }
        None => {
            let nul_rel = find_byte(&input[pos..], 0)?;
            (input[pos..pos + nul_rel].to_vec(), pos + nul_rel + 1)
        }
    };

    let frame = Frame {
        command,
        headers,
        body,
        legacy,
        expect_length_header,
    };
    Some((frame, consumed))
}

/// Incremental STOMP decoder.
///
/// Bytes go in through [`Parser::add_data`] in arbitrary chunks;
/// [`Parser::next`] yields complete frames and heartbeat markers as they
/// become available, preserving any trailing bytes for the next call. The
/// parser starts in modern (1.1+) mode; sessions flip it to legacy for the
/// 1.0 handshake and back once CONNECTED names a newer version.
#[derive(Debug)]
pub struct Parser {
    buf: BytesMut,
    legacy: bool,
}

impl Parser {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
            legacy: false,
        }
    }

    pub fn legacy() -> Self {
        Self {
            buf: BytesMut::new(),
            legacy: true,
        }
    }

    /// Switch header escaping rules; buffered bytes are kept and will be
    /// parsed under the new mode.
    pub fn set_legacy(&mut self, legacy: bool) {
        self.legacy = legacy;
    }

    pub fn is_legacy(&self) -> bool {
        self.legacy
    }

    /// Append a chunk of received bytes.
    pub fn add_data(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// True iff no unparsed bytes remain.
    pub fn is_buffer_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Decode the next item from the buffer, or `None` when no complete
    /// frame (or heartbeat byte) is available yet.
    ///
    /// A lone `\n` (or `\r\n`) before a command is consumed as a server
    /// heartbeat and reported as [`StompItem::Heartbeat`], never as a frame.
    pub fn next(&mut self) -> Option<StompItem> {
        if !self.buf.is_empty() && self.buf[0] == b'\n' {
            self.buf.advance(1);
            return Some(StompItem::Heartbeat);
        }
        if self.buf.len() >= 2 && self.buf[0] == b'\r' && self.buf[1] == b'\n' {
            self.buf.advance(2);
            return Some(StompItem::Heartbeat);
        }
        if self.buf.len() == 1 && self.buf[0] == b'\r' {
            // could be half of \r\n
            return None;
        }
        let (frame, consumed) = parse_frame(&self.buf, self.legacy)?;
        self.buf.advance(consumed);
        Some(StompItem::Frame(frame))
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}
