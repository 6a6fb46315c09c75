/// Shared utilities and types used across all layers
///
/// This module contains:
/// - Wire protocol (inbound envelopes, settlement messages, queue names)
/// - Prometheus metrics

pub mod protocol;
pub mod metrics;

// Re-export commonly used types
pub use protocol::{
    DecodeError, EventEnvelope, InboundEvent, OperatorMessage, OperatorMessageType,
};
pub use metrics::METRICS;
