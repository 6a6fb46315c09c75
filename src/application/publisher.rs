/// Outbound event publishing
///
/// 两条出站路径：
/// - 结算结果 (`OperatorMessage`) 发往结果队列
/// - 触发的条件单作为 `NEW_ORDER` 事件重新进入订单队列

use crate::domain::entities::{Matches, Order};
use crate::infrastructure::broker::{Broker, BrokerError};
use crate::shared::metrics::METRICS;
use crate::shared::protocol::{InboundEvent, OperatorMessage, OperatorMessageType};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

#[derive(Clone)]
pub struct EventPublisher {
    broker: Arc<dyn Broker>,
    orders_queue: String,
    outcomes_queue: String,
}

impl EventPublisher {
    pub fn new(
        broker: Arc<dyn Broker>,
        orders_queue: impl Into<String>,
        outcomes_queue: impl Into<String>,
    ) -> Self {
        Self {
            broker,
            orders_queue: orders_queue.into(),
            outcomes_queue: outcomes_queue.into(),
        }
    }

    /// Publishes a settlement outcome for `matches`
    pub async fn publish_outcome(
        &self,
        message_type: OperatorMessageType,
        matches: &Matches,
        error: Option<String>,
    ) -> Result<(), PublishError> {
        let mut message = OperatorMessage::new(message_type, matches.clone());
        if let Some(error) = error {
            message = message.with_error(error);
        }
        self.broker
            .publish(&self.outcomes_queue, message.to_vec()?)
            .await?;
        METRICS
            .settlements_total
            .with_label_values(&[message_type.as_str()])
            .inc();
        Ok(())
    }

    /// Re-submits `order` through the regular order intake
    pub async fn submit_order(&self, order: &Order) -> Result<(), PublishError> {
        let envelope = InboundEvent::NewOrder(order.clone()).encode()?;
        self.broker
            .publish(&self.orders_queue, envelope.to_vec()?)
            .await?;
        Ok(())
    }
}
