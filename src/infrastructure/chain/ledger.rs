/// In-memory token ledger
///
/// 以 (token, owner) 为键的余额表，转账成功后记录签名钱包与交易哈希。

use super::{TokenTransfer, TransferError};
use crate::domain::entities::{Address, Wallet};
use async_trait::async_trait;
use parking_lot::Mutex;
use primitive_types::{H256, U256};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::debug;

/// 一次成功的链上转账
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRecord {
    pub tx_hash: H256,
    pub signer: Address,
    pub token: Address,
    pub from: Address,
    pub to: Address,
    pub amount: U256,
}

#[derive(Default)]
struct LedgerState {
    balances: HashMap<(Address, Address), U256>,
    transfers: Vec<TransferRecord>,
}

#[derive(Default)]
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn credit(&self, token: Address, owner: Address, amount: U256) {
        let mut state = self.state.lock();
        let balance = state.balances.entry((token, owner)).or_default();
        *balance = balance.saturating_add(amount);
    }

    pub fn balance(&self, token: Address, owner: Address) -> U256 {
        self.state
            .lock()
            .balances
            .get(&(token, owner))
            .copied()
            .unwrap_or_default()
    }

    /// Successful transfers in execution order
    pub fn transfers(&self) -> Vec<TransferRecord> {
        self.state.lock().transfers.clone()
    }
}

#[async_trait]
impl TokenTransfer for InMemoryLedger {
    async fn transfer_from(
        &self,
        wallet: &Wallet,
        token: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<H256, TransferError> {
        let mut state = self.state.lock();

        let available = state.balances.get(&(token, from)).copied().unwrap_or_default();
        if available < amount {
            return Err(TransferError::InsufficientBalance {
                token,
                owner: from,
                available,
                required: amount,
            });
        }

        state.balances.insert((token, from), available - amount);
        let credited = state.balances.entry((token, to)).or_default();
        *credited = credited.saturating_add(amount);

        let mut hasher = Sha256::new();
        hasher.update((state.transfers.len() as u64).to_be_bytes());
        hasher.update(wallet.address.as_bytes());
        hasher.update(token.as_bytes());
        hasher.update(from.as_bytes());
        hasher.update(to.as_bytes());
        let mut amount_bytes = [0u8; 32];
        amount.to_big_endian(&mut amount_bytes);
        hasher.update(amount_bytes);
        let tx_hash = H256::from_slice(&hasher.finalize());

        state.transfers.push(TransferRecord {
            tx_hash,
            signer: wallet.address,
            token,
            from,
            to,
            amount,
        });
        debug!(?tx_hash, ?token, ?from, ?to, %amount, "transfer executed");
        Ok(tx_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    fn wallet() -> Wallet {
        Wallet::new(addr(0xEE), "22".repeat(32)).unwrap()
    }

    #[tokio::test]
    async fn test_transfer_moves_balance() {
        let ledger = InMemoryLedger::new();
        ledger.credit(addr(1), addr(10), U256::from(100u64));

        let hash = ledger
            .transfer_from(&wallet(), addr(1), addr(10), addr(11), U256::from(40u64))
            .await
            .unwrap();

        assert_eq!(ledger.balance(addr(1), addr(10)), U256::from(60u64));
        assert_eq!(ledger.balance(addr(1), addr(11)), U256::from(40u64));
        let records = ledger.transfers();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].tx_hash, hash);
        assert_eq!(records[0].signer, addr(0xEE));
    }

    #[tokio::test]
    async fn test_tx_hash_depends_on_amount() {
        let send = |amount: u64| async move {
            let ledger = InMemoryLedger::new();
            ledger.credit(addr(1), addr(10), U256::from(100u64));
            ledger
                .transfer_from(&wallet(), addr(1), addr(10), addr(11), U256::from(amount))
                .await
                .unwrap()
        };

        assert_eq!(send(40).await, send(40).await);
        assert_ne!(send(40).await, send(41).await);
    }

    #[tokio::test]
    async fn test_insufficient_balance() {
        let ledger = InMemoryLedger::new();
        ledger.credit(addr(1), addr(10), U256::from(5u64));

        let err = ledger
            .transfer_from(&wallet(), addr(1), addr(10), addr(11), U256::from(6u64))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::InsufficientBalance { .. }));
        assert_eq!(ledger.balance(addr(1), addr(10)), U256::from(5u64));
        assert!(ledger.transfers().is_empty());
    }
}
