/// Wire protocol
///
/// 入站事件 `{type, data}` 与出站结果消息 `OperatorMessage` 的定义。
/// 入站事件在边界处解码为封闭的 `InboundEvent` 枚举，之后不再按字符串分发。

use crate::domain::entities::{Matches, Order, PairCode, StopOrder};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const NEW_ORDER: &str = "NEW_ORDER";
pub const NEW_STOP_ORDER: &str = "NEW_STOP_ORDER";
pub const CANCEL_ORDER: &str = "CANCEL_ORDER";
pub const CANCEL_STOP_ORDER: &str = "CANCEL_STOP_ORDER";
pub const INVALIDATE_MAKER_ORDERS: &str = "INVALIDATE_MAKER_ORDERS";
pub const INVALIDATE_TAKER_ORDERS: &str = "INVALIDATE_TAKER_ORDERS";

/// 默认入站订单队列
pub const DEFAULT_ORDERS_QUEUE: &str = "ORDERS";
/// 默认出站结果队列
pub const DEFAULT_OUTCOMES_QUEUE: &str = "TRADES";
/// 钱包结算队列前缀
pub const TX_QUEUE_PREFIX: &str = "TX_QUEUES:";

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unknown event type {0:?}")]
    UnknownType(String),

    #[error("malformed {event_type} payload: {source}")]
    Payload {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed envelope: {0}")]
    Envelope(#[source] serde_json::Error),
}

/// 入站消息信封
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: serde_json::Value,
}

impl EventEnvelope {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, DecodeError> {
        serde_json::from_slice(bytes).map_err(DecodeError::Envelope)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// The six inbound event kinds, each with its typed payload
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    NewOrder(Order),
    NewStopOrder(StopOrder),
    CancelOrder(Order),
    CancelStopOrder(StopOrder),
    InvalidateMakerOrders(Matches),
    InvalidateTakerOrders(Matches),
}

impl InboundEvent {
    pub fn decode(envelope: &EventEnvelope) -> Result<Self, DecodeError> {
        fn payload<T: serde::de::DeserializeOwned>(
            envelope: &EventEnvelope,
        ) -> Result<T, DecodeError> {
            T::deserialize(&envelope.data).map_err(|source| DecodeError::Payload {
                event_type: envelope.event_type.clone(),
                source,
            })
        }

        let event = match envelope.event_type.as_str() {
            NEW_ORDER => InboundEvent::NewOrder(payload(envelope)?),
            NEW_STOP_ORDER => InboundEvent::NewStopOrder(payload(envelope)?),
            CANCEL_ORDER => InboundEvent::CancelOrder(payload(envelope)?),
            CANCEL_STOP_ORDER => InboundEvent::CancelStopOrder(payload(envelope)?),
            INVALIDATE_MAKER_ORDERS => InboundEvent::InvalidateMakerOrders(payload(envelope)?),
            INVALIDATE_TAKER_ORDERS => InboundEvent::InvalidateTakerOrders(payload(envelope)?),
            other => return Err(DecodeError::UnknownType(other.to_string())),
        };
        Ok(event)
    }

    pub fn encode(&self) -> Result<EventEnvelope, serde_json::Error> {
        let data = match self {
            InboundEvent::NewOrder(order) | InboundEvent::CancelOrder(order) => {
                serde_json::to_value(order)?
            }
            InboundEvent::NewStopOrder(stop) | InboundEvent::CancelStopOrder(stop) => {
                serde_json::to_value(stop)?
            }
            InboundEvent::InvalidateMakerOrders(matches)
            | InboundEvent::InvalidateTakerOrders(matches) => serde_json::to_value(matches)?,
        };
        Ok(EventEnvelope {
            event_type: self.event_type().to_string(),
            data,
        })
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            InboundEvent::NewOrder(_) => NEW_ORDER,
            InboundEvent::NewStopOrder(_) => NEW_STOP_ORDER,
            InboundEvent::CancelOrder(_) => CANCEL_ORDER,
            InboundEvent::CancelStopOrder(_) => CANCEL_STOP_ORDER,
            InboundEvent::InvalidateMakerOrders(_) => INVALIDATE_MAKER_ORDERS,
            InboundEvent::InvalidateTakerOrders(_) => INVALIDATE_TAKER_ORDERS,
        }
    }

    /// The order book this event is addressed to
    pub fn pair_code(&self) -> PairCode {
        match self {
            InboundEvent::NewOrder(order) | InboundEvent::CancelOrder(order) => order.pair_code(),
            InboundEvent::NewStopOrder(stop) | InboundEvent::CancelStopOrder(stop) => {
                stop.pair_code()
            }
            InboundEvent::InvalidateMakerOrders(matches)
            | InboundEvent::InvalidateTakerOrders(matches) => matches.pair_code(),
        }
    }
}

/// 结算消息类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperatorMessageType {
    NewTrade,
    TradeSuccess,
    TransactionError,
    TradeInvalid,
    ServerError,
}

impl OperatorMessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperatorMessageType::NewTrade => "NEW_TRADE",
            OperatorMessageType::TradeSuccess => "TRADE_SUCCESS",
            OperatorMessageType::TransactionError => "TRANSACTION_ERROR",
            OperatorMessageType::TradeInvalid => "TRADE_INVALID",
            OperatorMessageType::ServerError => "SERVER_ERROR",
        }
    }
}

/// Envelope around a `Matches` for settlement queues and outcome subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorMessage {
    pub message_type: OperatorMessageType,
    pub matches: Matches,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl OperatorMessage {
    pub fn new(message_type: OperatorMessageType, matches: Matches) -> Self {
        Self {
            message_type,
            matches,
            error_message: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error_message = Some(error.into());
        self
    }

    pub fn to_vec(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
