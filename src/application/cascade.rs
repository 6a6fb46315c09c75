/// Stop-order cascade
///
/// 每笔成交执行后，查询被该成交价格触发的 pending 条件单：
/// 转换为普通订单 → 作为 NEW_ORDER 重新提交 → 持久化为 done。
///
/// 任何一步失败都只记录日志并跳过该条件单；未标记 done 的条件单
/// 会在下一笔满足条件的成交时再次被触发。

use super::publisher::EventPublisher;
use crate::domain::entities::Trade;
use crate::domain::stop_orders::StopOrderStore;
use crate::shared::metrics::METRICS;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Counters for one cascade pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CascadeReport {
    pub triggered: usize,
    pub submitted: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct StopOrderCascade {
    store: Arc<dyn StopOrderStore>,
    publisher: EventPublisher,
}

impl StopOrderCascade {
    pub fn new(store: Arc<dyn StopOrderStore>, publisher: EventPublisher) -> Self {
        Self { store, publisher }
    }

    pub async fn run(&self, trades: &[Trade]) -> CascadeReport {
        let mut report = CascadeReport::default();

        for trade in trades {
            let stops = match self
                .store
                .triggered(&trade.base_token, &trade.quote_token, &trade.price_point)
                .await
            {
                Ok(stops) => stops,
                Err(err) => {
                    error!(trade = ?trade.hash, error = %err, "failed to query triggered stop orders");
                    continue;
                }
            };

            for stop in stops {
                report.triggered += 1;
                let hash = stop.hash();

                let order = match stop.to_order() {
                    Ok(order) => order,
                    Err(err) => {
                        warn!(stop = ?hash, error = %err, "stop order conversion failed");
                        report.failed += 1;
                        METRICS.stop_orders_total.with_label_values(&["failed"]).inc();
                        continue;
                    }
                };

                if let Err(err) = self.publisher.submit_order(&order).await {
                    warn!(stop = ?hash, error = %err, "failed to submit triggered stop order");
                    report.failed += 1;
                    METRICS.stop_orders_total.with_label_values(&["failed"]).inc();
                    continue;
                }

                // done 必须在处理下一笔之前落盘
                if let Err(err) = self.store.mark_done(&hash).await {
                    error!(stop = ?hash, error = %err, "failed to persist stop order status");
                    report.failed += 1;
                    METRICS.stop_orders_total.with_label_values(&["failed"]).inc();
                    continue;
                }

                info!(stop = ?hash, price = %trade.price_point, "stop order triggered");
                report.submitted += 1;
                METRICS.stop_orders_total.with_label_values(&["submitted"]).inc();
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::fixtures::{ether, order};
    use crate::domain::entities::{Address, Side, StopOrder, StopOrderStatus};
    use crate::domain::stop_orders::StoreError;
    use crate::infrastructure::broker::MemoryBroker;
    use crate::infrastructure::persistence::MemoryStopOrderStore;
    use crate::shared::protocol::{EventEnvelope, InboundEvent};
    use async_trait::async_trait;
    use primitive_types::{H256, U256};

    fn trade_at(price: U256) -> Trade {
        let maker = order(1, Side::Sell, ether(1), price, 100);
        let taker = order(2, Side::Buy, ether(1), price, 100);
        Trade::between(&maker, &taker, ether(1))
    }

    fn buy_stop(stop_price: U256) -> StopOrder {
        StopOrder {
            order: order(7, Side::Buy, ether(1), ether(4), 1),
            stop_price,
            status: StopOrderStatus::Pending,
        }
    }

    fn submitted_orders(broker: &MemoryBroker) -> Vec<InboundEvent> {
        broker
            .drain("ORDERS")
            .iter()
            .map(|bytes| InboundEvent::decode(&EventEnvelope::from_slice(bytes).unwrap()).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_triggers_once_then_done() {
        let broker = Arc::new(MemoryBroker::new());
        let store = Arc::new(MemoryStopOrderStore::new());
        let stop = buy_stop(ether(3));
        store.insert(stop.clone()).await.unwrap();

        let cascade = StopOrderCascade::new(
            store.clone(),
            EventPublisher::new(broker.clone(), "ORDERS", "TRADES"),
        );

        let report = cascade.run(&[trade_at(ether(3))]).await;
        assert_eq!(report, CascadeReport { triggered: 1, submitted: 1, failed: 0 });
        assert_eq!(submitted_orders(&broker), vec![InboundEvent::NewOrder(stop.order.clone())]);
        assert_eq!(store.get(&stop.hash()).unwrap().status, StopOrderStatus::Done);

        // 再次出现满足条件的成交不会重复提交
        let report = cascade.run(&[trade_at(ether(5))]).await;
        assert_eq!(report, CascadeReport::default());
        assert!(submitted_orders(&broker).is_empty());
    }

    #[tokio::test]
    async fn test_price_below_trigger_is_ignored() {
        let broker = Arc::new(MemoryBroker::new());
        let store = Arc::new(MemoryStopOrderStore::new());
        store.insert(buy_stop(ether(3))).await.unwrap();

        let cascade =
            StopOrderCascade::new(store, EventPublisher::new(broker.clone(), "ORDERS", "TRADES"));
        assert_eq!(cascade.run(&[trade_at(ether(2))]).await.triggered, 0);
        assert!(broker.drain("ORDERS").is_empty());
    }

    /// 状态写入失败的存储
    struct FailingDoneStore {
        inner: MemoryStopOrderStore,
    }

    #[async_trait]
    impl StopOrderStore for FailingDoneStore {
        async fn insert(&self, stop: StopOrder) -> Result<(), StoreError> {
            self.inner.insert(stop).await
        }

        async fn cancel(&self, hash: &H256) -> Result<StopOrder, StoreError> {
            self.inner.cancel(hash).await
        }

        async fn triggered(
            &self,
            base_token: &Address,
            quote_token: &Address,
            price_point: &U256,
        ) -> Result<Vec<StopOrder>, StoreError> {
            self.inner.triggered(base_token, quote_token, price_point).await
        }

        async fn mark_done(&self, _hash: &H256) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("disk full".to_string()))
        }
    }

    #[tokio::test]
    async fn test_persistence_failure_leaves_stop_pending() {
        let broker = Arc::new(MemoryBroker::new());
        let store = Arc::new(FailingDoneStore {
            inner: MemoryStopOrderStore::new(),
        });
        let stop = buy_stop(ether(3));
        store.insert(stop.clone()).await.unwrap();

        let cascade = StopOrderCascade::new(
            store.clone(),
            EventPublisher::new(broker.clone(), "ORDERS", "TRADES"),
        );
        let report = cascade.run(&[trade_at(ether(3))]).await;

        assert_eq!(report, CascadeReport { triggered: 1, submitted: 0, failed: 1 });
        assert_eq!(store.inner.get(&stop.hash()).unwrap().status, StopOrderStatus::Pending);
        // 仍然可被下一笔成交触发
        assert_eq!(cascade.run(&[trade_at(ether(3))]).await.triggered, 1);
    }
}
