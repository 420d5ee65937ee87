pub mod activemq;
pub mod rabbitmq;

pub use activemq::ActiveMqOptions;
pub use rabbitmq::RabbitMqOptions;

use std::fmt;
use std::str::FromStr;

use crate::error::{Result, StompError};
use crate::frame::Frame;

/// STOMP protocol versions, totally ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Version {
    V1_0,
    V1_1,
    V1_2,
}

impl Version {
    pub fn as_str(self) -> &'static str {
        match self {
            Version::V1_0 => "1.0",
            Version::V1_1 => "1.1",
            Version::V1_2 => "1.2",
        }
    }

    /// True when this version is at least `other`. Fixed once CONNECTED is
    /// received.
    pub fn has(self, other: Version) -> bool {
        self >= other
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Version {
    type Err = StompError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "1.0" => Ok(Version::V1_0),
            "1.1" => Ok(Version::V1_1),
            "1.2" => Ok(Version::V1_2),
            other => Err(StompError::Protocol(format!(
                "unsupported stomp version '{other}'"
            ))),
        }
    }
}

/// Subscription acknowledgement modes. `client-individual` requires STOMP
/// 1.1 or newer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckMode {
    Auto,
    Client,
    ClientIndividual,
}

impl AckMode {
    pub fn as_str(self) -> &'static str {
        match self {
            AckMode::Auto => "auto",
            AckMode::Client => "client",
            AckMode::ClientIndividual => "client-individual",
        }
    }
}

impl FromStr for AckMode {
    type Err = StompError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auto" => Ok(AckMode::Auto),
            "client" => Ok(AckMode::Client),
            "client-individual" => Ok(AckMode::ClientIndividual),
            other => Err(StompError::Protocol(format!("unknown ack mode '{other}'"))),
        }
    }
}

/// Broker flavor, carrying its tuning options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dialect {
    Generic,
    ActiveMq(ActiveMqOptions),
    RabbitMq(RabbitMqOptions),
    Apollo,
}

/// Constructs outbound verb frames conforming to version- and
/// broker-specific rules.
///
/// A generic protocol is used during bring-up; once CONNECTED names the
/// negotiated version and the broker's `server` header, the session swaps
/// in the matching dialect via [`Protocol::for_server`].
#[derive(Debug, Clone)]
pub struct Protocol {
    version: Version,
    dialect: Dialect,
    client_id: Option<String>,
}

impl Protocol {
    pub fn new(version: Version) -> Self {
        Self {
            version,
            dialect: Dialect::Generic,
            client_id: None,
        }
    }

    pub fn with_dialect(version: Version, dialect: Dialect) -> Self {
        Self {
            version,
            dialect,
            client_id: None,
        }
    }

    pub fn with_client_id(mut self, client_id: Option<String>) -> Self {
        self.client_id = client_id;
        self
    }

    /// Pick the dialect matching a CONNECTED `server` header.
    pub fn for_server(server: &str, version: Version, client_id: Option<String>) -> Self {
        let lowered = server.to_ascii_lowercase();
        let dialect = if lowered.contains("activemq") {
            Dialect::ActiveMq(ActiveMqOptions::default())
        } else if lowered.contains("rabbitmq") {
            Dialect::RabbitMq(RabbitMqOptions::default())
        } else if lowered.contains("apollo") {
            Dialect::Apollo
        } else {
            Dialect::Generic
        };
        Self {
            version,
            dialect,
            client_id,
        }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    /// Mutable access for tuning dialect options (prefetch sizes etc).
    pub fn dialect_mut(&mut self) -> &mut Dialect {
        &mut self.dialect
    }

    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    fn legacy(&self) -> bool {
        !self.version.has(Version::V1_1)
    }

    fn validate_ack(&self, ack: AckMode) -> Result<()> {
        if ack == AckMode::ClientIndividual && !self.version.has(Version::V1_1) {
            return Err(StompError::Protocol(
                "ack mode 'client-individual' requires stomp 1.1 or newer".to_string(),
            ));
        }
        Ok(())
    }

    /// SUBSCRIBE with destination, validated ack mode, id (required from
    /// 1.1 on) and optional selector, decorated with dialect headers.
    pub fn subscribe_frame(
        &self,
        destination: &str,
        id: Option<&str>,
        ack: AckMode,
        selector: Option<&str>,
        durable: bool,
    ) -> Result<Frame> {
        self.validate_ack(ack)?;
        if self.version.has(Version::V1_1) && id.is_none() {
            return Err(StompError::Protocol(
                "subscription id is required from stomp 1.1 on".to_string(),
            ));
        }
        let mut frame = Frame::new("SUBSCRIBE")
            .set_legacy(self.legacy())
            .header("destination", destination)
            .header("ack", ack.as_str())
            .opt_header("id", id)
            .opt_header("selector", selector);
        match &self.dialect {
            Dialect::ActiveMq(options) => {
                frame = options.decorate_subscribe(frame, self.client_id.as_deref(), durable)?;
            }
            Dialect::RabbitMq(options) => {
                frame = options.decorate_subscribe(frame, durable)?;
            }
            Dialect::Generic | Dialect::Apollo => {}
        }
        Ok(frame)
    }

    pub fn unsubscribe_frame(
        &self,
        destination: &str,
        id: Option<&str>,
        durable: bool,
    ) -> Result<Frame> {
        if self.version.has(Version::V1_1) && id.is_none() {
            return Err(StompError::Protocol(
                "subscription id is required from stomp 1.1 on".to_string(),
            ));
        }
        let mut frame = Frame::new("UNSUBSCRIBE")
            .set_legacy(self.legacy())
            .header("destination", destination)
            .opt_header("id", id);
        if let Dialect::ActiveMq(options) = &self.dialect {
            frame = options.decorate_unsubscribe(frame, self.client_id.as_deref(), durable)?;
        }
        Ok(frame)
    }

    pub fn begin_frame(&self, transaction: &str) -> Frame {
        Frame::new("BEGIN")
            .set_legacy(self.legacy())
            .header("transaction", transaction)
    }

    pub fn commit_frame(&self, transaction: &str) -> Frame {
        Frame::new("COMMIT")
            .set_legacy(self.legacy())
            .header("transaction", transaction)
    }

    pub fn abort_frame(&self, transaction: &str) -> Frame {
        Frame::new("ABORT")
            .set_legacy(self.legacy())
            .header("transaction", transaction)
    }

    /// ACK for a received MESSAGE frame.
    ///
    /// Composition is version-dependent: 1.2 sends `id` (the message's
    /// `ack` header when present, else its `message-id`), 1.1 sends
    /// `message-id` plus `subscription`, 1.0 sends `message-id` alone.
    pub fn ack_frame(&self, frame: &Frame, transaction: Option<&str>) -> Frame {
        let mut ack = Frame::new("ACK").set_legacy(self.legacy());
        if self.version.has(Version::V1_2) {
            let id = frame
                .get_header("ack")
                .or_else(|| frame.get_header("message-id"));
            ack = ack.opt_header("id", id);
        } else {
            ack = ack.opt_header("message-id", frame.get_header("message-id"));
            if self.version.has(Version::V1_1) {
                ack = ack.opt_header("subscription", frame.get_header("subscription"));
            }
        }
        ack.opt_header("transaction", transaction)
    }

    /// NACK for a received MESSAGE frame. Not available in STOMP 1.0;
    /// `requeue` is accepted only by the RabbitMQ dialect.
    pub fn nack_frame(
        &self,
        frame: &Frame,
        transaction: Option<&str>,
        requeue: Option<bool>,
    ) -> Result<Frame> {
        if !self.version.has(Version::V1_1) {
            return Err(StompError::Protocol(
                "nack is not available in stomp 1.0".to_string(),
            ));
        }
        if requeue.is_some() && !matches!(self.dialect, Dialect::RabbitMq(_)) {
            return Err(StompError::Protocol(
                "requeue on nack is not supported by this broker dialect".to_string(),
            ));
        }
        let mut nack = Frame::new("NACK").set_legacy(self.legacy());
        if self.version.has(Version::V1_2) {
            let id = match &self.dialect {
                // ActiveMQ prefers the ack header, mirroring its ACK rule.
                Dialect::ActiveMq(_) => frame
                    .get_header("ack")
                    .or_else(|| frame.get_header("message-id")),
                _ => frame.get_header("message-id"),
            };
            nack = nack.opt_header("id", id);
        } else {
            nack = nack
                .opt_header("message-id", frame.get_header("message-id"))
                .opt_header("subscription", frame.get_header("subscription"));
        }
        if let Some(requeue) = requeue {
            nack = nack.header("requeue", if requeue { "true" } else { "false" });
        }
        Ok(nack.opt_header("transaction", transaction))
    }

    pub fn disconnect_frame(&self) -> Frame {
        Frame::new("DISCONNECT")
            .set_legacy(self.legacy())
            .opt_header("client-id", self.client_id.as_deref())
    }
}
