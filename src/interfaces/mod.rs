/// Interfaces Layer - External Entry Points
///
/// ## Modules
/// - `cli`: Command-line interface (main.rs logic)
/// - `config`: JSON service configuration
/// - `service`: wiring of the settlement service

pub mod cli;
pub mod config;
pub mod service;

pub use config::{AppConfig, ConfigError, SeedBalance};
pub use service::{Adapters, ServiceError, SettlementService};
