use tracing::debug;

use crate::client::Client;
use crate::error::{Result, StompError};
use crate::frame::Frame;
use crate::idgen::IdGenerator;
use crate::protocol::AckMode;
use crate::subscription::{SubscribeOptions, Subscription, SubscriptionList};

/// Public view of the session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    Producer,
    Consumer,
    ProducerInTransaction,
    ConsumerInTransaction,
    DrainingConsumer,
    DrainingConsumerInTransaction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Producer,
    Consumer,
    ProducerInTransaction { transaction: u32 },
    ConsumerInTransaction { transaction: u32 },
    DrainingConsumer,
    DrainingConsumerInTransaction { transaction: u32 },
}

impl State {
    fn kind(self) -> StateKind {
        match self {
            State::Producer => StateKind::Producer,
            State::Consumer => StateKind::Consumer,
            State::ProducerInTransaction { .. } => StateKind::ProducerInTransaction,
            State::ConsumerInTransaction { .. } => StateKind::ConsumerInTransaction,
            State::DrainingConsumer => StateKind::DrainingConsumer,
            State::DrainingConsumerInTransaction { .. } => {
                StateKind::DrainingConsumerInTransaction
            }
        }
    }

    fn name(self) -> &'static str {
        match self {
            State::Producer => "producer",
            State::Consumer => "consumer",
            State::ProducerInTransaction { .. } => "producer-in-transaction",
            State::ConsumerInTransaction { .. } => "consumer-in-transaction",
            State::DrainingConsumer => "draining-consumer",
            State::DrainingConsumerInTransaction { .. } => "draining-consumer-in-transaction",
        }
    }

    fn transaction(self) -> Option<u32> {
        match self {
            State::ProducerInTransaction { transaction }
            | State::ConsumerInTransaction { transaction }
            | State::DrainingConsumerInTransaction { transaction } => Some(transaction),
            _ => None,
        }
    }

    fn is_draining(self) -> bool {
        matches!(
            self,
            State::DrainingConsumer | State::DrainingConsumerInTransaction { .. }
        )
    }
}

/// Stateful session façade enforcing which STOMP verbs are legal at each
/// moment.
///
/// A fresh session starts as a producer. Subscribing turns it into a
/// consumer; `begin` enters the matching in-transaction state (nested
/// transactions are rejected); removing the last subscription returns to
/// producer directly, or via a draining state when consumer frames are
/// still buffered. Draining states only allow acking and buffered reads
/// until the buffer runs dry.
///
/// Operations outside the legal set fail with an invalid-state error naming
/// the current state, or a draining error while buffered frames are
/// pending. Sends and acks inside a transaction carry `transaction:<id>`.
pub struct StatefulClient {
    client: Client,
    state: State,
    subscriptions: SubscriptionList,
    ids: IdGenerator,
}

impl StatefulClient {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            state: State::Producer,
            subscriptions: SubscriptionList::new(),
            ids: IdGenerator::new(),
        }
    }

    pub fn state(&self) -> StateKind {
        self.state.kind()
    }

    pub fn state_name(&self) -> &'static str {
        self.state.name()
    }

    /// Active transaction id, when inside one.
    pub fn transaction_id(&self) -> Option<u32> {
        self.state.transaction()
    }

    pub fn subscriptions(&self) -> &SubscriptionList {
        &self.subscriptions
    }

    /// Subscription matching an inbound frame's `subscription` header, if
    /// any. Frames matching none are still delivered by `read_frame`.
    pub fn subscription_for(&self, frame: &Frame) -> Option<&Subscription> {
        self.subscriptions.for_frame(frame)
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut Client {
        &mut self.client
    }

    pub fn into_client(self) -> Client {
        self.client
    }

    fn illegal(&self, operation: &'static str) -> StompError {
        if self.state.is_draining() {
            StompError::Draining { operation }
        } else {
            StompError::InvalidState {
                state: self.state.name(),
                operation,
            }
        }
    }

    /// Send a message; inside a transaction the frame carries the
    /// transaction id.
    pub async fn send(&mut self, destination: &str, frame: Frame) -> Result<()> {
        match self.state {
            State::Producer | State::Consumer | State::DrainingConsumer => {
                self.client.send(destination, frame).await
            }
            State::ProducerInTransaction { transaction }
            | State::ConsumerInTransaction { transaction } => {
                let mut frame = frame;
                frame.set_header("transaction", transaction.to_string());
                self.client.send(destination, frame).await
            }
            State::DrainingConsumerInTransaction { .. } => Err(self.illegal("send")),
        }
    }

    /// Acknowledge a received MESSAGE frame.
    pub async fn ack(&mut self, frame: &Frame) -> Result<()> {
        let transaction = match self.state {
            State::Consumer | State::DrainingConsumer => None,
            State::ConsumerInTransaction { transaction }
            | State::DrainingConsumerInTransaction { transaction } => {
                Some(transaction.to_string())
            }
            State::Producer | State::ProducerInTransaction { .. } => {
                return Err(self.illegal("ack"))
            }
        };
        let ack = self.client.protocol().ack_frame(frame, transaction.as_deref());
        self.client.send_frame(ack, Some(false)).await
    }

    /// Negatively acknowledge a received MESSAGE frame. `requeue` is only
    /// accepted by the RabbitMQ dialect.
    pub async fn nack(&mut self, frame: &Frame, requeue: Option<bool>) -> Result<()> {
        let transaction = match self.state {
            State::Consumer | State::DrainingConsumer => None,
            State::ConsumerInTransaction { transaction }
            | State::DrainingConsumerInTransaction { transaction } => {
                Some(transaction.to_string())
            }
            State::Producer | State::ProducerInTransaction { .. } => {
                return Err(self.illegal("nack"))
            }
        };
        let nack = self
            .client
            .protocol()
            .nack_frame(frame, transaction.as_deref(), requeue)?;
        self.client.send_frame(nack, Some(false)).await
    }

    pub async fn subscribe(&mut self, destination: &str, ack: AckMode) -> Result<u32> {
        self.subscribe_with_options(destination, ack, SubscribeOptions::default())
            .await
    }

    /// Subscribe to a destination, moving a producer state into the
    /// matching consumer state. Returns the subscription id.
    pub async fn subscribe_with_options(
        &mut self,
        destination: &str,
        ack: AckMode,
        options: SubscribeOptions,
    ) -> Result<u32> {
        match self.state {
            State::Producer
            | State::Consumer
            | State::ProducerInTransaction { .. }
            | State::ConsumerInTransaction { .. } => {}
            State::DrainingConsumer | State::DrainingConsumerInTransaction { .. } => {
                return Err(self.illegal("subscribe"))
            }
        }

        let id = self.ids.generate()?;
        let id_str = id.to_string();
        let frame = match self.client.protocol().subscribe_frame(
            destination,
            Some(&id_str),
            ack,
            options.selector.as_deref(),
            options.durable,
        ) {
            Ok(frame) => {
                let mut frame = frame;
                for (name, value) in &options.headers {
                    frame = frame.header(name.clone(), value.clone());
                }
                frame
            }
            Err(err) => {
                self.ids.release(id);
                return Err(err);
            }
        };
        if let Err(err) = self.client.send_frame(frame, None).await {
            self.ids.release(id);
            return Err(err);
        }

        self.subscriptions
            .add(Subscription::new(id, destination, ack, options));
        self.state = match self.state {
            State::Producer | State::Consumer => State::Consumer,
            State::ProducerInTransaction { transaction }
            | State::ConsumerInTransaction { transaction } => {
                State::ConsumerInTransaction { transaction }
            }
            other => other,
        };
        debug!(id, destination, state = self.state.name(), "subscribed");
        Ok(id)
    }

    /// Unsubscribe by id. Removing the last subscription transitions back
    /// to a producer state, going through a draining state when consumer
    /// frames are still buffered.
    pub async fn unsubscribe(&mut self, id: u32) -> Result<()> {
        match self.state {
            State::Consumer | State::ConsumerInTransaction { .. } => {}
            _ => return Err(self.illegal("unsubscribe")),
        }
        let (destination, durable) = match self.subscriptions.get(id) {
            Some(subscription) => (
                subscription.destination().to_string(),
                subscription.durable(),
            ),
            None => {
                return Err(StompError::Protocol(format!(
                    "no active subscription with id {id}"
                )))
            }
        };

        let frame = self
            .client
            .protocol()
            .unsubscribe_frame(&destination, Some(&id.to_string()), durable)?;
        self.client.send_frame(frame, None).await?;
        self.subscriptions.remove(id);
        self.ids.release(id);

        if self.subscriptions.is_empty() {
            let drained = !self.client.has_buffered_frames();
            self.state = match (self.state, drained) {
                (State::Consumer, true) => State::Producer,
                (State::Consumer, false) => State::DrainingConsumer,
                (State::ConsumerInTransaction { transaction }, true) => {
                    State::ProducerInTransaction { transaction }
                }
                (State::ConsumerInTransaction { transaction }, false) => {
                    State::DrainingConsumerInTransaction { transaction }
                }
                (other, _) => other,
            };
            debug!(state = self.state.name(), "last subscription removed");
        }
        Ok(())
    }

    /// Start a transaction. Nested transactions are rejected.
    pub async fn begin(&mut self) -> Result<()> {
        match self.state {
            State::Producer | State::Consumer => {}
            _ => return Err(self.illegal("begin")),
        }
        let transaction = self.ids.generate()?;
        let frame = self.client.protocol().begin_frame(&transaction.to_string());
        if let Err(err) = self.client.send_frame(frame, None).await {
            self.ids.release(transaction);
            return Err(err);
        }
        self.state = match self.state {
            State::Producer => State::ProducerInTransaction { transaction },
            State::Consumer => State::ConsumerInTransaction { transaction },
            other => other,
        };
        debug!(transaction, "transaction started");
        Ok(())
    }

    pub async fn commit(&mut self) -> Result<()> {
        self.finish_transaction("commit").await
    }

    pub async fn abort(&mut self) -> Result<()> {
        self.finish_transaction("abort").await
    }

    async fn finish_transaction(&mut self, operation: &'static str) -> Result<()> {
        let transaction = match self.state {
            State::ProducerInTransaction { transaction }
            | State::ConsumerInTransaction { transaction } => transaction,
            _ => return Err(self.illegal(operation)),
        };
        let tx = transaction.to_string();
        let frame = if operation == "commit" {
            self.client.protocol().commit_frame(&tx)
        } else {
            self.client.protocol().abort_frame(&tx)
        };
        self.client.send_frame(frame, None).await?;
        self.ids.release(transaction);
        self.state = match self.state {
            State::ProducerInTransaction { .. } => State::Producer,
            State::ConsumerInTransaction { .. } => State::Consumer,
            other => other,
        };
        debug!(transaction, operation, "transaction finished");
        Ok(())
    }

    /// Read the next inbound frame.
    ///
    /// Consumer states read from the session (buffered FIFO first, then the
    /// socket). Draining states only yield buffered frames; once the buffer
    /// is dry they return `None` and transition back to the producer state.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>> {
        match self.state {
            State::Consumer | State::ConsumerInTransaction { .. } => {
                self.client.read_frame().await
            }
            State::DrainingConsumer => match self.client.read_buffered().await? {
                Some(frame) => Ok(Some(frame)),
                None => {
                    self.state = State::Producer;
                    debug!("drained; back to producer");
                    Ok(None)
                }
            },
            State::DrainingConsumerInTransaction { transaction } => {
                match self.client.read_buffered().await? {
                    Some(frame) => Ok(Some(frame)),
                    None => {
                        self.state = State::ProducerInTransaction { transaction };
                        debug!("drained; back to producer-in-transaction");
                        Ok(None)
                    }
                }
            }
            State::Producer | State::ProducerInTransaction { .. } => {
                Err(self.illegal("read"))
            }
        }
    }
}
