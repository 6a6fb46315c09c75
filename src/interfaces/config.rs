/// Service configuration file
///
/// JSON 格式，启动时一次性加载并校验：
///
/// ```json
/// {
///   "wallets": [{ "address": "0x…", "private_key": "0x…" }],
///   "pairs": [{ "name": "WETH/DAI", "base_token": "0x…", "quote_token": "0x…",
///               "base_decimals": 18, "quote_decimals": 18 }],
///   "orders_queue": "ORDERS",
///   "outcomes_queue": "TRADES",
///   "settlement_mode": "best_effort",
///   "balances": [{ "token": "0x…", "owner": "0x…", "amount": "0xde0b6b3a7640000" }]
/// }
/// ```
///
/// `balances` 只用于内存账本的初始余额。

use crate::application::SettlementMode;
use crate::domain::entities::{Address, Pair, PairCode, Wallet, WalletError};
use crate::shared::protocol::{DEFAULT_ORDERS_QUEUE, DEFAULT_OUTCOMES_QUEUE};
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error("at least one operator wallet is required")]
    NoWallets,

    #[error("wallet {0:?} is configured twice")]
    DuplicateWallet(Address),

    #[error("at least one trading pair is required")]
    NoPairs,

    #[error("pair {0} is configured twice")]
    DuplicatePair(PairCode),

    #[error("pair {name} has unsupported base decimals {decimals}")]
    BaseDecimals { name: String, decimals: u8 },

    #[error("orders and outcomes queues must be distinct, both are {0:?}")]
    QueueClash(String),
}

/// 内存账本初始余额
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedBalance {
    pub token: Address,
    pub owner: Address,
    pub amount: U256,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub wallets: Vec<Wallet>,
    pub pairs: Vec<Pair>,

    #[serde(default = "default_orders_queue")]
    pub orders_queue: String,

    #[serde(default = "default_outcomes_queue")]
    pub outcomes_queue: String,

    #[serde(default)]
    pub settlement_mode: SettlementMode,

    #[serde(default)]
    pub balances: Vec<SeedBalance>,
}

fn default_orders_queue() -> String {
    DEFAULT_ORDERS_QUEUE.to_string()
}

fn default_outcomes_queue() -> String {
    DEFAULT_OUTCOMES_QUEUE.to_string()
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_slice(&raw)
    }

    pub fn from_slice(raw: &[u8]) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_json::from_slice(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.wallets.is_empty() {
            return Err(ConfigError::NoWallets);
        }
        let mut addresses = HashSet::new();
        for wallet in &self.wallets {
            wallet.validate()?;
            if !addresses.insert(wallet.address) {
                return Err(ConfigError::DuplicateWallet(wallet.address));
            }
        }

        if self.pairs.is_empty() {
            return Err(ConfigError::NoPairs);
        }
        let mut codes = HashSet::new();
        for pair in &self.pairs {
            // 与定价模块的上限一致
            if pair.base_decimals > 77 {
                return Err(ConfigError::BaseDecimals {
                    name: pair.name.clone(),
                    decimals: pair.base_decimals,
                });
            }
            if !codes.insert(pair.code()) {
                return Err(ConfigError::DuplicatePair(pair.code()));
            }
        }

        if self.orders_queue == self.outcomes_queue {
            return Err(ConfigError::QueueClash(self.orders_queue.clone()));
        }
        Ok(())
    }
}
