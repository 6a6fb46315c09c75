/// Stop-order persistence
///
/// 内存版条件单存储，按 hash 索引；`triggered` 只返回 pending 状态。

use crate::domain::entities::{Address, StopOrder, StopOrderStatus};
use crate::domain::stop_orders::{StopOrderStore, StoreError};
use async_trait::async_trait;
use parking_lot::RwLock;
use primitive_types::{H256, U256};
use std::collections::HashMap;

#[derive(Default)]
pub struct MemoryStopOrderStore {
    // 保留插入顺序，触发时按先来先服务
    stops: RwLock<(Vec<H256>, HashMap<H256, StopOrder>)>,
}

impl MemoryStopOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, hash: &H256) -> Option<StopOrder> {
        self.stops.read().1.get(hash).cloned()
    }

    pub fn len(&self) -> usize {
        self.stops.read().0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl StopOrderStore for MemoryStopOrderStore {
    async fn insert(&self, stop: StopOrder) -> Result<(), StoreError> {
        let mut guard = self.stops.write();
        let (order, by_hash) = &mut *guard;
        let hash = stop.hash();
        if by_hash.contains_key(&hash) {
            return Err(StoreError::Duplicate(hash));
        }
        order.push(hash);
        by_hash.insert(hash, stop);
        Ok(())
    }

    async fn cancel(&self, hash: &H256) -> Result<StopOrder, StoreError> {
        let mut guard = self.stops.write();
        let stop = guard.1.get_mut(hash).ok_or(StoreError::NotFound(*hash))?;
        if stop.status == StopOrderStatus::Pending {
            stop.status = StopOrderStatus::Cancelled;
        }
        Ok(stop.clone())
    }

    async fn triggered(
        &self,
        base_token: &Address,
        quote_token: &Address,
        price_point: &U256,
    ) -> Result<Vec<StopOrder>, StoreError> {
        let guard = self.stops.read();
        let (order, by_hash) = &*guard;
        Ok(order
            .iter()
            .filter_map(|hash| by_hash.get(hash))
            .filter(|stop| {
                stop.status == StopOrderStatus::Pending
                    && stop.order.base_token == *base_token
                    && stop.order.quote_token == *quote_token
                    && stop.is_triggered_by(price_point)
            })
            .cloned()
            .collect())
    }

    async fn mark_done(&self, hash: &H256) -> Result<(), StoreError> {
        let mut guard = self.stops.write();
        let stop = guard.1.get_mut(hash).ok_or(StoreError::NotFound(*hash))?;
        stop.status = StopOrderStatus::Done;
        Ok(())
    }
}
