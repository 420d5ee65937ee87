use std::fmt;

/// A single STOMP frame: command, ordered headers and raw body bytes.
///
/// Header order is preserved as inserted; peers attach no meaning to it but
/// deterministic serialization matters for testing. Header name comparisons
/// are case-insensitive and the first occurrence of a duplicated name wins,
/// per STOMP 1.2.
///
/// Two flags control wire behavior without taking part in frame equality:
///
/// - `legacy`: the frame is serialized with STOMP 1.0 header escaping
///   (only LF is escaped) instead of the 1.1+ rules.
/// - `expect_length_header`: forces a `content-length` header on the wire
///   even when the body contains no NUL byte.
#[derive(Debug, Clone, Eq)]
pub struct Frame {
    /// STOMP command (e.g. CONNECT, SEND, SUBSCRIBE)
    pub command: String,
    /// Ordered headers as (name, value) pairs
    pub headers: Vec<(String, String)>,
    /// Raw body bytes; may contain NUL
    pub body: Vec<u8>,
    /// Serialize with legacy (1.0) header escaping
    pub legacy: bool,
    /// Always emit `content-length` when serializing
    pub expect_length_header: bool,
}

impl Frame {
    /// Create a new frame with the given command and empty headers/body.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            headers: Vec::new(),
            body: Vec::new(),
            legacy: false,
            expect_length_header: false,
        }
    }

    /// Add a header (builder style). Does not replace existing values;
    /// use [`Frame::set_header`] for that.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Add a header only when a value is present (builder style).
    pub fn opt_header(self, name: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(v) => self.header(name, v),
            None => self,
        }
    }

    /// Set the frame body (builder style).
    pub fn set_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Mark this frame for legacy (STOMP 1.0) header escaping (builder style).
    pub fn set_legacy(mut self, legacy: bool) -> Self {
        self.legacy = legacy;
        self
    }

    /// Force `content-length` emission on serialization (builder style).
    pub fn expect_length_header(mut self, expect: bool) -> Self {
        self.expect_length_header = expect;
        self
    }

    /// Request a receipt for this frame (builder style).
    ///
    /// When sent, the broker answers with a RECEIPT frame carrying the same
    /// id. Synchronous sends overwrite this header with a generated id; use
    /// async sends to keep a caller-chosen receipt.
    pub fn receipt(self, id: impl Into<String>) -> Self {
        self.header("receipt", id)
    }

    /// First value of the named header, compared case-insensitively.
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Replace the first occurrence of the named header (case-insensitive),
    /// appending it when absent.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(&name))
        {
            Some((_, v)) => *v = value,
            None => self.headers.push((name, value)),
        }
    }

    /// Remove every occurrence of the named header (case-insensitive).
    pub fn remove_header(&mut self, name: &str) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    }
}

/// Equality compares command, headers and body; the serialization flags are
/// wire-level policy, not frame identity. This is what makes
/// `parse(serialize(f)) == f` hold across escaping modes.
impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        self.command == other.command && self.headers == other.headers && self.body == other.body
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Command: {}", self.command)?;
        for (k, v) in &self.headers {
            writeln!(f, "{}: {}", k, v)?;
        }
        writeln!(f, "Body ({} bytes)", self.body.len())
    }
}
