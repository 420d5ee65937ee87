//! STOMP 1.0/1.1/1.2 client library.
//!
//! The crate is layered the way the wire works: [`frame::Frame`] is the
//! in-memory message unit, [`parser::Parser`] and [`codec::StompCodec`]
//! translate it to and from bytes, [`connection::Connection`] moves bytes
//! over a (failover-capable) TCP transport with timeouts, heartbeats and
//! observers, [`client::Client`] runs the session handshake and
//! receipt-confirmed sends, and [`stateful::StatefulClient`] enforces which
//! verbs are legal in the current producer/consumer/transaction state.
//!
//! Broker dialects (ActiveMQ, RabbitMQ, Apollo) are selected automatically
//! from the CONNECTED `server` header; see [`protocol`].

pub mod client;
pub mod codec;
pub mod connection;
pub mod error;
pub mod frame;
pub mod idgen;
pub mod observer;
pub mod parser;
pub mod protocol;
pub mod stateful;
pub mod subscription;
pub mod transform;
pub mod uri;

pub use client::Client;
pub use codec::{StompCodec, StompItem};
pub use connection::{negotiate_heartbeats, parse_heartbeat_header, Connection};
pub use error::{ConnectionError, Result, StompError};
pub use frame::Frame;
pub use idgen::IdGenerator;
pub use observer::{ConnectionObserver, HeartbeatEmitter, ObserverSignal, ServerAliveObserver};
pub use parser::Parser;
pub use protocol::{AckMode, Dialect, Protocol, Version};
pub use stateful::{StateKind, StatefulClient};
pub use subscription::{SubscribeOptions, Subscription, SubscriptionList};
pub use transform::MapFrame;
pub use uri::{BrokerUri, Endpoint};
