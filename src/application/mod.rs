/// Application Layer - Dispatch and Settlement
///
/// Orchestrates the domain: inbound events are routed to order books, the
/// resulting matches are balanced across per-wallet settlement queues, and each
/// queue's worker executes transfers and reports outcomes.
///
/// ## Modules
/// - `dispatch`: inbound event routing (`DispatchEngine`)
/// - `operator`: queue selection and backpressure (`SettlementPool`)
/// - `tx_queue`: per-wallet settlement worker (`TxQueue`)
/// - `settlement`: transfer execution (`Settler`)
/// - `cascade`: stop orders triggered by executed trades
/// - `publisher`: outbound outcome and order publishing

pub mod cascade;
pub mod dispatch;
pub mod operator;
pub mod publisher;
pub mod settlement;
pub mod tx_queue;

pub use cascade::{CascadeReport, StopOrderCascade};
pub use dispatch::{DispatchEngine, DispatchError};
pub use operator::{
    MatchesSink, OperatorError, PendingQueue, SettlementPool, DEFAULT_BACKPRESSURE_THRESHOLD,
};
pub use publisher::{EventPublisher, PublishError};
pub use settlement::{
    PairRegistry, SettlementError, SettlementFailure, SettlementMode, SettlementResult, Settler,
};
pub use tx_queue::{queue_name, QueueState, TxQueue};
