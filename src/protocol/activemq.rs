use crate::error::{Result, StompError};
use crate::frame::Frame;

fn bool_str(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

/// Subscription tuning knobs understood by ActiveMQ.
///
/// `prefetch_size` is always emitted (`activemq.prefetchSize`); the
/// remaining knobs map to the broker's recognized `activemq.*` extension
/// headers and are emitted only when set. `priority` must stay within
/// `0..=127`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveMqOptions {
    pub prefetch_size: u32,
    pub dispatch_async: Option<bool>,
    pub exclusive: Option<bool>,
    pub maximum_pending_message_limit: Option<u32>,
    pub no_local: Option<bool>,
    pub priority: Option<u8>,
    pub retroactive: Option<bool>,
}

impl Default for ActiveMqOptions {
    fn default() -> Self {
        Self {
            prefetch_size: 1,
            dispatch_async: None,
            exclusive: None,
            maximum_pending_message_limit: None,
            no_local: None,
            priority: None,
            retroactive: None,
        }
    }
}

impl ActiveMqOptions {
    fn validate(&self) -> Result<()> {
        if self.prefetch_size < 1 {
            return Err(StompError::Protocol(
                "activemq prefetch size must be at least 1".to_string(),
            ));
        }
        if let Some(priority) = self.priority {
            if priority > 127 {
                return Err(StompError::Protocol(
                    "activemq.priority must be within 0..=127".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub(crate) fn decorate_subscribe(
        &self,
        frame: Frame,
        client_id: Option<&str>,
        durable: bool,
    ) -> Result<Frame> {
        self.validate()?;
        let mut frame = frame.header("activemq.prefetchSize", self.prefetch_size.to_string());
        if let Some(v) = self.dispatch_async {
            frame = frame.header("activemq.dispatchAsync", bool_str(v));
        }
        if let Some(v) = self.exclusive {
            frame = frame.header("activemq.exclusive", bool_str(v));
        }
        if let Some(v) = self.maximum_pending_message_limit {
            frame = frame.header("activemq.maximumPendingMessageLimit", v.to_string());
        }
        if let Some(v) = self.no_local {
            frame = frame.header("activemq.noLocal", bool_str(v));
        }
        if let Some(v) = self.priority {
            frame = frame.header("activemq.priority", v.to_string());
        }
        if let Some(v) = self.retroactive {
            frame = frame.header("activemq.retroactive", bool_str(v));
        }
        if durable {
            frame = Self::durable_headers(frame, client_id)?;
        }
        Ok(frame)
    }

    pub(crate) fn decorate_unsubscribe(
        &self,
        frame: Frame,
        client_id: Option<&str>,
        durable: bool,
    ) -> Result<Frame> {
        if durable {
            return Self::durable_headers(frame, client_id);
        }
        Ok(frame)
    }

    fn durable_headers(frame: Frame, client_id: Option<&str>) -> Result<Frame> {
        let client_id = client_id.ok_or_else(|| {
            StompError::Protocol("durable subscriptions require a client-id".to_string())
        })?;
        Ok(frame
            .header("activemq.subscriptionName", client_id)
            .header("durable-subscriber-name", client_id))
    }
}
