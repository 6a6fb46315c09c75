/// Infrastructure Layer - Technical Implementations
///
/// Adapters for the systems the settlement core talks to: the message broker,
/// the token transfer client, stop-order persistence and the observability
/// endpoints.
///
/// The domain and application layers only see the traits defined here
/// (`Broker`, `Consumer`, `TokenTransfer`) and in the domain layer
/// (`StopOrderStore`); the in-process implementations back the service binary
/// and the tests.
///
/// ## Modules
/// - `broker`: queue abstraction and `MemoryBroker`
/// - `chain`: token transfer abstraction and `InMemoryLedger`
/// - `persistence`: `MemoryStopOrderStore`
/// - `observability`: health checks and the metrics HTTP server

pub mod broker;
pub mod chain;
pub mod observability;
pub mod persistence;

pub use broker::{Broker, BrokerError, Consumer, Delivery, MemoryBroker};
pub use chain::{InMemoryLedger, TokenTransfer, TransferError, TransferRecord};
pub use observability::{HealthChecker, HealthProbe, ObservabilityServer};
pub use persistence::MemoryStopOrderStore;
