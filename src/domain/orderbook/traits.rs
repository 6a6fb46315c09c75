/// OrderBook Trait - Domain Layer Abstraction
///
/// The dispatch engine talks to every per-pair book through this contract only.
/// How a book stores resting orders and how it crosses them is its own business;
/// the settlement core only sees the `Matches` that come out of `new_order`.
///
/// ## Implementations
/// - `FifoOrderBook`: in-process price-time book used by the service binary
/// - test doubles that record calls
///
/// ## Example
/// ```rust,ignore
/// use dex_settlement::domain::orderbook::OrderBook;
///
/// async fn submit<OB: OrderBook + ?Sized>(book: &OB, order: Order) {
///     if let Some(matches) = book.new_order(order).await? {
///         println!("Generated {} trades", matches.trades.len());
///     }
/// }
/// ```

use crate::domain::entities::{Matches, Order, StopOrder};
use crate::domain::stop_orders::StoreError;
use async_trait::async_trait;
use primitive_types::H256;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderBookError {
    #[error("order {0:?} is not resting in the book")]
    OrderNotFound(H256),

    #[error("invalid order {hash:?}: {reason}")]
    InvalidOrder { hash: H256, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Core OrderBook trait
///
/// Implementations handle their own interior locking; every method takes `&self`
/// because books are shared between the ingest loop and any other caller.
#[async_trait]
pub trait OrderBook: Send + Sync {
    /// Matches `order` against resting liquidity
    ///
    /// # Returns
    /// * `Ok(Some(matches))` when at least one trade was produced
    /// * `Ok(None)` when the order rested without crossing
    async fn new_order(&self, order: Order) -> Result<Option<Matches>, OrderBookError>;

    /// Removes a resting order
    async fn cancel_order(&self, order: &Order) -> Result<(), OrderBookError>;

    /// Parks a stop order until a trade crosses its trigger price
    async fn new_stop_order(&self, stop: StopOrder) -> Result<(), OrderBookError>;

    async fn cancel_stop_order(&self, stop: &StopOrder) -> Result<(), OrderBookError>;

    /// Drops the maker side of a failed match from the book
    async fn invalidate_maker_orders(&self, matches: &Matches) -> Result<(), OrderBookError>;

    /// Drops the taker side of a failed match from the book
    async fn invalidate_taker_orders(&self, matches: &Matches) -> Result<(), OrderBookError>;
}
