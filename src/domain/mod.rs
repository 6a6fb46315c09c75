/// Domain Layer - Core Business Logic
///
/// Orders, trades and matches, settlement pricing, and the contracts of the
/// collaborators the settlement core consults (order books, stop-order store).
/// Nothing in here performs I/O.
///
/// ## Modules
/// - `entities`: Order, StopOrder, Trade, Matches, Pair, Wallet
/// - `pricing`: quote amount arithmetic
/// - `stop_orders`: stop-order persistence contract
/// - `orderbook`: order book contract and the FIFO implementation

pub mod entities;
pub mod pricing;
pub mod stop_orders;
pub mod orderbook;

pub use entities::{
    Address, Matches, Order, Pair, PairCode, Side, Signature, StopOrder, StopOrderError,
    StopOrderStatus, Trade, Wallet, WalletError,
};
pub use orderbook::{FifoOrderBook, OrderBook, OrderBookError};
pub use pricing::{quote_token_amount, PricingError};
pub use stop_orders::{StopOrderStore, StoreError};
