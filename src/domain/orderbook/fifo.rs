/// Price-time priority order book
///
/// 每个价格层是一个 FIFO 队列：
/// - 买单侧按价格从高到低匹配
/// - 卖单侧按价格从低到高匹配
/// - 成交价取 maker 价格，未成交部分挂单

use super::traits::{OrderBook, OrderBookError};
use crate::domain::entities::{Matches, Order, PairCode, Side, StopOrder, StopOrderStatus, Trade};
use crate::domain::stop_orders::StopOrderStore;
use async_trait::async_trait;
use parking_lot::Mutex;
use primitive_types::{H256, U256};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tracing::debug;

#[derive(Default)]
struct BookState {
    // 买单侧
    bids: BTreeMap<U256, VecDeque<Order>>,
    // 卖单侧
    asks: BTreeMap<U256, VecDeque<Order>>,
    // order hash -> (方向, 价格)，用于撤单定位
    index: HashMap<H256, (Side, U256)>,
}

impl BookState {
    fn cross(&mut self, taker: &Order) -> (Matches, U256) {
        let mut matches = Matches::new(taker.clone());
        let mut remaining = taker.amount;

        let (levels, index) = match taker.side {
            Side::Buy => (&mut self.asks, &mut self.index),
            Side::Sell => (&mut self.bids, &mut self.index),
        };

        while !remaining.is_zero() {
            let best = match taker.side {
                Side::Buy => levels.keys().next().copied(),
                Side::Sell => levels.keys().next_back().copied(),
            };
            let Some(price) = best else { break };

            let crosses = match taker.side {
                Side::Buy => price <= taker.price_point,
                Side::Sell => price >= taker.price_point,
            };
            if !crosses {
                break;
            }

            let Some(level) = levels.get_mut(&price) else { break };
            while let Some(maker) = level.front_mut() {
                if remaining.is_zero() {
                    break;
                }
                let fill = remaining.min(maker.amount);
                matches.push(maker.clone(), Trade::between(maker, taker, fill));

                maker.amount -= fill;
                remaining -= fill;
                if maker.amount.is_zero() {
                    if let Some(filled) = level.pop_front() {
                        index.remove(&filled.hash);
                    }
                }
            }
            if level.is_empty() {
                levels.remove(&price);
            }
        }

        (matches, remaining)
    }

    fn rest(&mut self, order: Order) {
        let levels = match order.side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        self.index.insert(order.hash, (order.side, order.price_point));
        levels.entry(order.price_point).or_default().push_back(order);
    }

    fn remove(&mut self, hash: &H256) -> Option<Order> {
        let (side, price) = self.index.remove(hash)?;
        let levels = match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        let level = levels.get_mut(&price)?;
        let position = level.iter().position(|o| o.hash == *hash)?;
        let removed = level.remove(position);
        if level.is_empty() {
            levels.remove(&price);
        }
        removed
    }
}

/// In-process order book for one trading pair
pub struct FifoOrderBook {
    pair: PairCode,
    state: Mutex<BookState>,
    stops: Arc<dyn StopOrderStore>,
}

impl FifoOrderBook {
    pub fn new(pair: PairCode, stops: Arc<dyn StopOrderStore>) -> Self {
        Self {
            pair,
            state: Mutex::new(BookState::default()),
            stops,
        }
    }

    pub fn pair(&self) -> &PairCode {
        &self.pair
    }

    pub fn best_bid(&self) -> Option<U256> {
        self.state.lock().bids.keys().next_back().copied()
    }

    pub fn best_ask(&self) -> Option<U256> {
        self.state.lock().asks.keys().next().copied()
    }

    /// Number of resting orders on both sides
    pub fn resting_orders(&self) -> usize {
        self.state.lock().index.len()
    }

    pub fn contains(&self, hash: &H256) -> bool {
        self.state.lock().index.contains_key(hash)
    }

    fn validate(&self, order: &Order) -> Result<(), OrderBookError> {
        let invalid = |reason: &str| OrderBookError::InvalidOrder {
            hash: order.hash,
            reason: reason.to_string(),
        };

        if order.pair_code() != self.pair {
            return Err(invalid("order belongs to a different pair"));
        }
        if order.amount.is_zero() {
            return Err(invalid("amount must be greater than zero"));
        }
        if order.price_point.is_zero() {
            return Err(invalid("price must be greater than zero"));
        }
        if order.hash != order.compute_hash() {
            return Err(invalid("hash does not match order fields"));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderBook for FifoOrderBook {
    async fn new_order(&self, order: Order) -> Result<Option<Matches>, OrderBookError> {
        self.validate(&order)?;

        let mut state = self.state.lock();
        if state.index.contains_key(&order.hash) {
            return Err(OrderBookError::InvalidOrder {
                hash: order.hash,
                reason: "order is already resting".to_string(),
            });
        }

        let (matches, remaining) = state.cross(&order);
        if !remaining.is_zero() {
            let mut resting = order;
            resting.amount = remaining;
            state.rest(resting);
        }

        debug!(pair = %self.pair, trades = matches.trades.len(), "order processed");
        Ok((!matches.is_empty()).then_some(matches))
    }

    async fn cancel_order(&self, order: &Order) -> Result<(), OrderBookError> {
        self.state
            .lock()
            .remove(&order.hash)
            .map(|_| ())
            .ok_or(OrderBookError::OrderNotFound(order.hash))
    }

    async fn new_stop_order(&self, stop: StopOrder) -> Result<(), OrderBookError> {
        self.validate(&stop.order)?;
        if stop.status != StopOrderStatus::Pending {
            return Err(OrderBookError::InvalidOrder {
                hash: stop.hash(),
                reason: format!("new stop order must be pending, got {:?}", stop.status),
            });
        }
        self.stops.insert(stop).await?;
        Ok(())
    }

    async fn cancel_stop_order(&self, stop: &StopOrder) -> Result<(), OrderBookError> {
        self.stops.cancel(&stop.hash()).await?;
        Ok(())
    }

    async fn invalidate_maker_orders(&self, matches: &Matches) -> Result<(), OrderBookError> {
        let mut state = self.state.lock();
        for maker in &matches.maker_orders {
            if state.remove(&maker.hash).is_some() {
                debug!(pair = %self.pair, order = ?maker.hash, "maker order invalidated");
            }
        }
        Ok(())
    }

    async fn invalidate_taker_orders(&self, matches: &Matches) -> Result<(), OrderBookError> {
        let hash = matches.taker_order.hash;
        if self.state.lock().remove(&hash).is_some() {
            debug!(pair = %self.pair, order = ?hash, "taker order invalidated");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::fixtures::{ether, order, pair};
    use crate::infrastructure::persistence::MemoryStopOrderStore;

    fn book() -> (FifoOrderBook, Arc<MemoryStopOrderStore>) {
        let store = Arc::new(MemoryStopOrderStore::new());
        (FifoOrderBook::new(pair().code(), store.clone()), store)
    }

    #[tokio::test]
    async fn test_resting_order_produces_no_matches() {
        let (book, _) = book();
        let result = book.new_order(order(1, Side::Buy, ether(10), ether(2), 1)).await.unwrap();
        assert!(result.is_none());
        assert_eq!(book.best_bid(), Some(ether(2)));
        assert_eq!(book.resting_orders(), 1);
    }

    #[tokio::test]
    async fn test_crossing_order_trades_at_maker_price() {
        let (book, _) = book();
        let maker = order(1, Side::Sell, ether(10), ether(2), 1);
        book.new_order(maker.clone()).await.unwrap();

        let taker = order(2, Side::Buy, ether(4), ether(3), 1);
        let matches = book.new_order(taker.clone()).await.unwrap().unwrap();

        assert_eq!(matches.taker_order, taker);
        assert_eq!(matches.maker_orders.len(), 1);
        assert_eq!(matches.maker_orders[0].hash, maker.hash);
        assert_eq!(matches.trades[0].amount, ether(4));
        assert_eq!(matches.trades[0].price_point, ether(2));
        assert_eq!(matches.trades[0].maker, maker.user_address);
        assert_eq!(matches.trades[0].taker, taker.user_address);

        // maker 剩余 6 继续挂单
        assert_eq!(book.best_ask(), Some(ether(2)));
        assert_eq!(book.resting_orders(), 1);
    }

    #[tokio::test]
    async fn test_sweep_multiple_levels_then_rest() {
        let (book, _) = book();
        book.new_order(order(1, Side::Buy, ether(1), ether(5), 1)).await.unwrap();
        book.new_order(order(2, Side::Buy, ether(1), ether(4), 1)).await.unwrap();
        book.new_order(order(3, Side::Buy, ether(1), ether(1), 1)).await.unwrap();

        let taker = order(4, Side::Sell, ether(3), ether(4), 1);
        let matches = book.new_order(taker.clone()).await.unwrap().unwrap();

        let prices: Vec<_> = matches.trades.iter().map(|t| t.price_point).collect();
        assert_eq!(prices, vec![ether(5), ether(4)]);
        assert!(book.contains(&taker.hash));
        assert_eq!(book.best_ask(), Some(ether(4)));
        assert_eq!(book.best_bid(), Some(ether(1)));
    }

    #[tokio::test]
    async fn test_fifo_within_level() {
        let (book, _) = book();
        let first = order(1, Side::Sell, ether(1), ether(2), 1);
        let second = order(2, Side::Sell, ether(1), ether(2), 1);
        book.new_order(first.clone()).await.unwrap();
        book.new_order(second.clone()).await.unwrap();

        let matches = book
            .new_order(order(3, Side::Buy, ether(1), ether(2), 1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(matches.maker_orders[0].hash, first.hash);
        assert!(book.contains(&second.hash));
    }

    #[tokio::test]
    async fn test_cancel_order() {
        let (book, _) = book();
        let resting = order(1, Side::Buy, ether(1), ether(2), 1);
        book.new_order(resting.clone()).await.unwrap();

        book.cancel_order(&resting).await.unwrap();
        assert_eq!(book.resting_orders(), 0);
        assert_eq!(
            book.cancel_order(&resting).await,
            Err(OrderBookError::OrderNotFound(resting.hash))
        );
    }

    #[tokio::test]
    async fn test_rejects_tampered_hash() {
        let (book, _) = book();
        let mut tampered = order(1, Side::Buy, ether(1), ether(2), 1);
        tampered.amount = ether(100);
        assert!(matches!(
            book.new_order(tampered).await,
            Err(OrderBookError::InvalidOrder { .. })
        ));
    }

    #[tokio::test]
    async fn test_invalidate_maker_and_taker() {
        let (book, _) = book();
        let maker = order(1, Side::Sell, ether(1), ether(2), 1);
        let taker = order(2, Side::Buy, ether(5), ether(2), 1);
        book.new_order(maker.clone()).await.unwrap();
        let matches = book.new_order(taker.clone()).await.unwrap().unwrap();
        assert!(book.contains(&taker.hash));

        book.invalidate_taker_orders(&matches).await.unwrap();
        assert!(!book.contains(&taker.hash));

        let other = order(3, Side::Sell, ether(1), ether(9), 1);
        book.new_order(other.clone()).await.unwrap();
        let mut stale = matches.clone();
        stale.maker_orders = vec![other.clone()];
        book.invalidate_maker_orders(&stale).await.unwrap();
        assert_eq!(book.resting_orders(), 0);
    }

    #[tokio::test]
    async fn test_stop_orders_go_to_store() {
        let (book, store) = book();
        let stop = StopOrder {
            order: order(1, Side::Buy, ether(1), ether(3), 1),
            stop_price: ether(2),
            status: StopOrderStatus::Pending,
        };
        book.new_stop_order(stop.clone()).await.unwrap();
        assert_eq!(store.get(&stop.hash()).unwrap().status, StopOrderStatus::Pending);

        book.cancel_stop_order(&stop).await.unwrap();
        assert_eq!(store.get(&stop.hash()).unwrap().status, StopOrderStatus::Cancelled);
        assert_eq!(book.resting_orders(), 0);
    }
}
