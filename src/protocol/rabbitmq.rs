use crate::error::{Result, StompError};
use crate::frame::Frame;

/// Subscription tuning knobs understood by RabbitMQ's STOMP plugin.
///
/// `prefetch_count` is always emitted; durable subscriptions add
/// `persistent:true`. The RabbitMQ dialect is also the only one accepting
/// a `requeue` parameter on NACK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RabbitMqOptions {
    pub prefetch_count: u32,
}

impl Default for RabbitMqOptions {
    fn default() -> Self {
        Self { prefetch_count: 1 }
    }
}

impl RabbitMqOptions {
    pub(crate) fn decorate_subscribe(&self, frame: Frame, durable: bool) -> Result<Frame> {
        if self.prefetch_count < 1 {
            return Err(StompError::Protocol(
                "rabbitmq prefetch count must be at least 1".to_string(),
            ));
        }
        let mut frame = frame.header("prefetch-count", self.prefetch_count.to_string());
        if durable {
            frame = frame.header("persistent", "true");
        }
        Ok(frame)
    }
}
