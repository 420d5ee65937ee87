use std::io;

use thiserror::Error;

use crate::frame::Frame;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, StompError>;

/// Transport-level failure: socket open, read/write, timeouts, operations
/// on a connection that is not open.
///
/// The error records the broker host it relates to (when known) and chains
/// the underlying cause. Failover keeps chaining: when every endpoint of a
/// `failover://` URI fails, the resulting error's `source()` chain walks
/// back through each attempt.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct ConnectionError {
    message: String,
    host: Option<String>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ConnectionError {
    pub fn new(host: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            host: Some(host.into()),
            source: None,
        }
    }

    pub fn with_source(
        host: impl Into<String>,
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            message: message.into(),
            host: Some(host.into()),
            source: Some(source.into()),
        }
    }

    /// An error that is not tied to a particular broker host.
    pub fn detached(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            host: None,
            source: None,
        }
    }

    /// The broker host this failure relates to, e.g. `tcp://localhost:61613`.
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }
}

impl From<io::Error> for ConnectionError {
    fn from(err: io::Error) -> Self {
        Self {
            message: format!("io error: {err}"),
            host: None,
            source: Some(Box::new(err)),
        }
    }
}

fn error_frame_message(frame: &Frame) -> &str {
    frame.get_header("message").unwrap_or("(no message header)")
}

/// Errors surfaced by the client, connection, protocol and state machine.
#[derive(Error, Debug)]
pub enum StompError {
    /// Socket-level failure or timeout; carries the active host record.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// The broker sent an `ERROR` frame; its `message` header summarizes.
    #[error("broker error: {}", error_frame_message(.0))]
    ErrorFrame(Frame),

    /// A well-formed frame arrived where a specific one was expected.
    #[error("unexpected {} frame while waiting for {expected}", .received.command)]
    UnexpectedResponse { expected: String, received: Frame },

    /// A synchronous send ran out its receipt wait without any RECEIPT.
    #[error("no receipt received for '{receipt_id}' within the receipt wait")]
    MissingReceipt { receipt_id: String },

    /// The state machine forbids this operation in its current state.
    #[error("operation '{operation}' is not allowed in {state} state")]
    InvalidState {
        state: &'static str,
        operation: &'static str,
    },

    /// Only buffered reads and acks are allowed while draining consumer
    /// frames.
    #[error("'{operation}' is not allowed while draining buffered messages")]
    Draining { operation: &'static str },

    /// A heartbeat observer decided the server missed its alive deadline.
    #[error("server heartbeat missed; connection considered dead")]
    HeartbeatMissed,

    /// Version/dialect rule violation: illegal ack mode, NACK on 1.0,
    /// unsupported `requeue`, invalid dialect option.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The broker URI could not be parsed.
    #[error("invalid broker uri '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },

    /// The body of a transformed frame is not the JSON shape it claims.
    #[error("transformation failed: {0}")]
    Transformation(#[from] serde_json::Error),

    /// The process-wide id pool has no free ids left.
    #[error("id space exhausted")]
    IdsExhausted,
}
