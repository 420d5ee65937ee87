use crate::frame::Frame;
use crate::protocol::AckMode;

/// Per-subscribe options beyond destination and ack mode.
#[derive(Debug, Clone, Default)]
pub struct SubscribeOptions {
    /// Broker-side message selector (SQL-92 style where supported).
    pub selector: Option<String>,
    /// Durable subscription (dialect-specific headers; ActiveMQ requires a
    /// client-id).
    pub durable: bool,
    /// Extra headers forwarded verbatim on SUBSCRIBE.
    pub headers: Vec<(String, String)>,
}

/// One active subscription of a consumer session.
#[derive(Debug, Clone)]
pub struct Subscription {
    id: u32,
    destination: String,
    ack: AckMode,
    selector: Option<String>,
    durable: bool,
    headers: Vec<(String, String)>,
}

impl Subscription {
    pub fn new(
        id: u32,
        destination: impl Into<String>,
        ack: AckMode,
        options: SubscribeOptions,
    ) -> Self {
        Self {
            id,
            destination: destination.into(),
            ack,
            selector: options.selector,
            durable: options.durable,
            headers: options.headers,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn ack(&self) -> AckMode {
        self.ack
    }

    pub fn selector(&self) -> Option<&str> {
        self.selector.as_deref()
    }

    pub fn durable(&self) -> bool {
        self.durable
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }
}

/// Insertion-ordered table of active subscriptions.
///
/// Lookup by frame matches the frame's `subscription` header against
/// subscription ids; frames matching no subscription are still surfaced to
/// the caller — dispatch is advisory, not gating.
#[derive(Debug, Default)]
pub struct SubscriptionList {
    entries: Vec<Subscription>,
}

impl SubscriptionList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, subscription: Subscription) {
        self.entries.push(subscription);
    }

    pub fn remove(&mut self, id: u32) -> Option<Subscription> {
        let pos = self.entries.iter().position(|s| s.id == id)?;
        Some(self.entries.remove(pos))
    }

    pub fn get(&self, id: u32) -> Option<&Subscription> {
        self.entries.iter().find(|s| s.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Subscription> {
        self.entries.iter()
    }

    /// First subscription whose id matches the frame's `subscription`
    /// header.
    pub fn for_frame(&self, frame: &Frame) -> Option<&Subscription> {
        let sub_id = frame.get_header("subscription")?;
        self.entries
            .iter()
            .find(|s| s.id.to_string() == sub_id)
    }
}
