/// Blockchain transfer client
///
/// 结算只需要一个原语：以运营钱包签名，把某代币从一方转给另一方。
/// RPC 细节（nonce、gas、回执）由实现方负责。

pub mod ledger;

pub use ledger::{InMemoryLedger, TransferRecord};

use crate::domain::entities::{Address, Wallet};
use async_trait::async_trait;
use primitive_types::{H256, U256};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    #[error("insufficient {token:?} balance for {owner:?}: has {available}, needs {required}")]
    InsufficientBalance {
        token: Address,
        owner: Address,
        available: U256,
        required: U256,
    },
}

#[async_trait]
pub trait TokenTransfer: Send + Sync {
    /// Moves `amount` of `token` from `from` to `to`, signed by `wallet`
    async fn transfer_from(
        &self,
        wallet: &Wallet,
        token: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<H256, TransferError>;
}
