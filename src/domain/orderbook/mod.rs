/// Order Book Module
///
/// Per-pair matching contract consulted by the dispatch engine, plus the
/// in-process price-time implementation wired up by the service binary.

pub mod traits;
pub mod fifo;

pub use traits::{OrderBook, OrderBookError};
pub use fifo::FifoOrderBook;
