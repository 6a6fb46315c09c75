/// Stop-order persistence contract
///
/// 条件单的持久化接口。`mark_done` 必须在级联继续处理下一笔之前持久写入，
/// 否则同一批成交重放时会重复提交。

use super::entities::{Address, StopOrder};
use async_trait::async_trait;
use primitive_types::{H256, U256};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("stop order {0:?} not found")]
    NotFound(H256),

    #[error("stop order {0:?} already exists")]
    Duplicate(H256),

    #[error("stop order store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait StopOrderStore: Send + Sync {
    async fn insert(&self, stop: StopOrder) -> Result<(), StoreError>;

    /// Moves a pending stop order to `cancelled`
    async fn cancel(&self, hash: &H256) -> Result<StopOrder, StoreError>;

    /// Pending stop orders on (base, quote) that fire at `price_point`
    async fn triggered(
        &self,
        base_token: &Address,
        quote_token: &Address,
        price_point: &U256,
    ) -> Result<Vec<StopOrder>, StoreError>;

    async fn mark_done(&self, hash: &H256) -> Result<(), StoreError>;
}
