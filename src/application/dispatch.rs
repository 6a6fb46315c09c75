/// Dispatch engine
///
/// 入站事件 → 解码为 `InboundEvent` → 按交易对路由到订单簿。
/// `new_order` 产生的成交交给 `MatchesSink`（结算池）。
///
/// 错误只在边界处记录一次：解码失败或交易对不存在时丢弃事件，
/// 不向任何队列发布消息。

use super::operator::MatchesSink;
use super::settlement::PairRegistry;
use crate::domain::entities::PairCode;
use crate::domain::orderbook::{FifoOrderBook, OrderBook, OrderBookError};
use crate::domain::stop_orders::StopOrderStore;
use crate::infrastructure::broker::{Broker, BrokerError};
use crate::shared::metrics::METRICS;
use crate::shared::protocol::{DecodeError, EventEnvelope, InboundEvent};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("no order book for pair {0}")]
    UnknownPair(PairCode),

    #[error("order book {pair} rejected {event_type}: {source}")]
    OrderBook {
        pair: PairCode,
        event_type: &'static str,
        #[source]
        source: OrderBookError,
    },
}

impl DispatchError {
    /// Metric label
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::Decode(_) => "decode",
            DispatchError::UnknownPair(_) => "unknown_pair",
            DispatchError::OrderBook { .. } => "order_book",
        }
    }
}

pub struct DispatchEngine {
    books: HashMap<PairCode, Arc<dyn OrderBook>>,
    sink: Arc<dyn MatchesSink>,
}

impl DispatchEngine {
    pub fn new(books: HashMap<PairCode, Arc<dyn OrderBook>>, sink: Arc<dyn MatchesSink>) -> Self {
        Self { books, sink }
    }

    /// One `FifoOrderBook` per configured pair, all sharing `stops`
    pub fn from_pairs(
        pairs: &PairRegistry,
        stops: Arc<dyn StopOrderStore>,
        sink: Arc<dyn MatchesSink>,
    ) -> Self {
        let books = pairs
            .iter()
            .map(|pair| {
                let code = pair.code();
                let book: Arc<dyn OrderBook> = Arc::new(FifoOrderBook::new(code.clone(), stops.clone()));
                (code, book)
            })
            .collect();
        Self::new(books, sink)
    }

    pub fn book(&self, pair: &PairCode) -> Option<&Arc<dyn OrderBook>> {
        self.books.get(pair)
    }

    /// Routes one envelope to its order book
    pub async fn handle(&self, envelope: &EventEnvelope) -> Result<(), DispatchError> {
        let event = InboundEvent::decode(envelope)?;
        let event_type = event.event_type();
        let pair = event.pair_code();

        let book = self
            .books
            .get(&pair)
            .ok_or_else(|| DispatchError::UnknownPair(pair.clone()))?;

        let wrap = |source| DispatchError::OrderBook {
            pair: pair.clone(),
            event_type,
            source,
        };

        match event {
            InboundEvent::NewOrder(order) => {
                if let Some(matches) = book.new_order(order).await.map_err(wrap)? {
                    debug!(pair = %pair, trades = matches.trades.len(), "forwarding matches");
                    self.sink.submit(matches).await;
                }
            }
            InboundEvent::NewStopOrder(stop) => book.new_stop_order(stop).await.map_err(wrap)?,
            InboundEvent::CancelOrder(order) => book.cancel_order(&order).await.map_err(wrap)?,
            InboundEvent::CancelStopOrder(stop) => book.cancel_stop_order(&stop).await.map_err(wrap)?,
            InboundEvent::InvalidateMakerOrders(matches) => {
                book.invalidate_maker_orders(&matches).await.map_err(wrap)?
            }
            InboundEvent::InvalidateTakerOrders(matches) => {
                book.invalidate_taker_orders(&matches).await.map_err(wrap)?
            }
        }

        METRICS.events_total.with_label_values(&[event_type]).inc();
        Ok(())
    }

    /// Boundary handler: decodes raw bytes, dispatches, logs failures once
    pub async fn process(&self, payload: &[u8]) -> bool {
        let result = match EventEnvelope::from_slice(payload) {
            Ok(envelope) => self.handle(&envelope).await,
            Err(err) => Err(err.into()),
        };

        match result {
            Ok(()) => true,
            Err(err) => {
                METRICS.dispatch_errors_total.with_label_values(&[err.kind()]).inc();
                warn!(error = %err, "event dropped");
                false
            }
        }
    }

    /// Consumes `queue` sequentially until `cancel` fires or the broker closes
    pub async fn run(
        &self,
        broker: Arc<dyn Broker>,
        queue: &str,
        cancel: CancellationToken,
    ) -> Result<(), BrokerError> {
        broker.declare(queue).await?;
        let mut consumer = broker.consume(queue).await?;
        info!(queue, books = self.books.len(), "dispatch engine consuming");

        loop {
            let delivery = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                delivery = consumer.next() => match delivery {
                    Some(delivery) => delivery,
                    None => {
                        warn!(queue, "broker closed orders queue");
                        break;
                    }
                },
            };

            // 先 ack：失败的事件不会被重新投递
            if let Err(err) = consumer.ack(delivery.tag).await {
                error!(queue, tag = delivery.tag, error = %err, "ack failed");
            }
            self.process(&delivery.payload).await;
        }

        info!(queue, "dispatch engine stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::fixtures::{ether, order, pair, token};
    use crate::domain::entities::{Matches, Side, StopOrder, StopOrderStatus};
    use crate::infrastructure::broker::MemoryBroker;
    use crate::infrastructure::persistence::MemoryStopOrderStore;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingSink {
        received: Mutex<Vec<Matches>>,
    }

    #[async_trait]
    impl MatchesSink for RecordingSink {
        async fn submit(&self, matches: Matches) {
            self.received.lock().push(matches);
        }
    }

    struct Harness {
        engine: DispatchEngine,
        sink: Arc<RecordingSink>,
        stops: Arc<MemoryStopOrderStore>,
    }

    fn harness() -> Harness {
        let sink = Arc::new(RecordingSink::default());
        let stops = Arc::new(MemoryStopOrderStore::new());
        let engine = DispatchEngine::from_pairs(
            &PairRegistry::new([pair()]),
            stops.clone(),
            sink.clone(),
        );
        Harness { engine, sink, stops }
    }

    fn envelope(event: InboundEvent) -> EventEnvelope {
        event.encode().unwrap()
    }

    #[tokio::test]
    async fn test_crossing_order_forwards_matches() {
        let h = harness();
        let maker = order(1, Side::Sell, ether(1), ether(2), 1);
        let taker = order(2, Side::Buy, ether(1), ether(2), 1);

        h.engine.handle(&envelope(InboundEvent::NewOrder(maker))).await.unwrap();
        assert!(h.sink.received.lock().is_empty());

        h.engine.handle(&envelope(InboundEvent::NewOrder(taker.clone()))).await.unwrap();
        let received = h.sink.received.lock();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].taker_order, taker);
        assert_eq!(received[0].trades.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_pair_leaves_books_untouched() {
        let h = harness();
        let mut foreign = order(1, Side::Buy, ether(1), ether(2), 1);
        foreign.quote_token = token(0xCC);
        let foreign = foreign.with_computed_hash();

        let err = h
            .engine
            .handle(&envelope(InboundEvent::NewOrder(foreign)))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::UnknownPair(_)));

        let book = h.engine.book(&pair().code()).unwrap();
        // 空订单簿：撤任意单都应 NotFound
        let resting = order(1, Side::Buy, ether(1), ether(2), 1);
        assert!(book.cancel_order(&resting).await.is_err());
        assert!(h.sink.received.lock().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_pair_dropped_at_boundary() {
        use crate::application::operator::SettlementPool;
        use crate::application::publisher::EventPublisher;
        use crate::application::tx_queue::TxQueue;

        // 空结算池：任何转交过来的成交都会产生 SERVER_ERROR
        let broker = Arc::new(MemoryBroker::new());
        let pool: Arc<SettlementPool<TxQueue>> = Arc::new(SettlementPool::new(
            Vec::new(),
            10,
            EventPublisher::new(broker.clone(), "ORDERS", "TRADES"),
        ));
        let engine = DispatchEngine::from_pairs(
            &PairRegistry::new([pair()]),
            Arc::new(MemoryStopOrderStore::new()),
            pool,
        );

        let mut foreign = order(1, Side::Buy, ether(1), ether(2), 1);
        foreign.quote_token = token(0xCC);
        let payload = envelope(InboundEvent::NewOrder(foreign.with_computed_hash()))
            .to_vec()
            .unwrap();

        let counter = METRICS.dispatch_errors_total.with_label_values(&["unknown_pair"]);
        let before = counter.get();
        assert!(!engine.process(&payload).await);
        assert_eq!(counter.get() - before, 1.0);
        assert!(broker.drain("TRADES").is_empty());
        assert!(broker.drain("ORDERS").is_empty());
    }

    #[tokio::test]
    async fn test_pair_lookup_is_case_sensitive() {
        let sink = Arc::new(RecordingSink::default());
        let stops: Arc<dyn StopOrderStore> = Arc::new(MemoryStopOrderStore::new());
        let upper = PairCode::new(pair().code().as_str().to_uppercase());
        let mut books: HashMap<PairCode, Arc<dyn OrderBook>> = HashMap::new();
        books.insert(upper.clone(), Arc::new(FifoOrderBook::new(upper, stops)));
        let engine = DispatchEngine::new(books, sink);

        let err = engine
            .handle(&envelope(InboundEvent::NewOrder(order(1, Side::Buy, ether(1), ether(2), 1))))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::UnknownPair(_)));
    }

    #[tokio::test]
    async fn test_unknown_type_is_decode_error() {
        let h = harness();
        let bogus = EventEnvelope {
            event_type: "NEW_SWAP".to_string(),
            data: serde_json::json!({}),
        };
        let err = h.engine.handle(&bogus).await.unwrap_err();
        assert!(matches!(err, DispatchError::Decode(DecodeError::UnknownType(_))));
        assert_eq!(err.kind(), "decode");

        assert!(!h.engine.process(b"not json").await);
    }

    #[tokio::test]
    async fn test_stop_order_routed_to_store() {
        let h = harness();
        let stop = StopOrder {
            order: order(3, Side::Buy, ether(1), ether(3), 1),
            stop_price: ether(3),
            status: StopOrderStatus::Pending,
        };
        h.engine
            .handle(&envelope(InboundEvent::NewStopOrder(stop.clone())))
            .await
            .unwrap();
        assert_eq!(h.stops.get(&stop.hash()), Some(stop.clone()));

        h.engine
            .handle(&envelope(InboundEvent::CancelStopOrder(stop.clone())))
            .await
            .unwrap();
        assert_eq!(h.stops.get(&stop.hash()).unwrap().status, StopOrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_book_rejection_surfaces_as_order_book_error() {
        let h = harness();
        let missing = order(1, Side::Buy, ether(1), ether(2), 1);
        let err = h
            .engine
            .handle(&envelope(InboundEvent::CancelOrder(missing)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::OrderBook { event_type: "CANCEL_ORDER", source: OrderBookError::OrderNotFound(_), .. }
        ));
    }

    #[tokio::test]
    async fn test_run_consumes_orders_queue_until_cancelled() {
        let h = harness();
        let engine = Arc::new(h.engine);
        let broker = Arc::new(MemoryBroker::new());
        let cancel = CancellationToken::new();

        let maker = order(1, Side::Sell, ether(1), ether(2), 1);
        let taker = order(2, Side::Buy, ether(1), ether(2), 1);
        for event in [
            InboundEvent::NewOrder(maker),
            InboundEvent::NewOrder(taker),
        ] {
            broker
                .publish("ORDERS", envelope(event).to_vec().unwrap())
                .await
                .unwrap();
        }
        broker.publish("ORDERS", b"garbage".to_vec()).await.unwrap();

        let worker = {
            let engine = engine.clone();
            let broker: Arc<dyn Broker> = broker.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { engine.run(broker, "ORDERS", cancel).await })
        };

        tokio::time::timeout(Duration::from_secs(5), async {
            while broker.depth("ORDERS").await.unwrap() > 0 || h.sink.received.lock().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        cancel.cancel();
        worker.await.unwrap().unwrap();
        assert_eq!(h.sink.received.lock().len(), 1);
        assert_eq!(broker.unacked("ORDERS"), 0);
    }
}
