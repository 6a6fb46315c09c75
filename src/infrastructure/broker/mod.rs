/// Message broker abstraction
///
/// 结算核心对消息中间件的全部假设：
/// - 至少一次投递，手动 ack
/// - 可查询队列深度（仅统计待投递消息）
/// - 可清空队列
/// - 每个队列至多一个消费者，按 FIFO 投递

pub mod memory;

pub use memory::MemoryBroker;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    #[error("queue {0} already has a consumer")]
    ConsumerExists(String),

    #[error("broker connection closed")]
    Closed,

    #[error("unknown delivery tag {tag} on queue {queue}")]
    UnknownDelivery { queue: String, tag: u64 },
}

/// 一条已投递、待确认的消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub tag: u64,
    pub payload: Vec<u8>,
}

#[async_trait]
pub trait Consumer: Send {
    /// Waits for the next delivery, `None` once the broker is closed
    async fn next(&mut self) -> Option<Delivery>;

    async fn ack(&mut self, tag: u64) -> Result<(), BrokerError>;
}

#[async_trait]
pub trait Broker: Send + Sync {
    async fn declare(&self, queue: &str) -> Result<(), BrokerError>;

    async fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<(), BrokerError>;

    /// Drops every ready message, returning how many were removed
    async fn purge(&self, queue: &str) -> Result<usize, BrokerError>;

    /// Ready (not yet delivered) messages on `queue`
    async fn depth(&self, queue: &str) -> Result<usize, BrokerError>;

    async fn consume(&self, queue: &str) -> Result<Box<dyn Consumer>, BrokerError>;
}
