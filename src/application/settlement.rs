/// Settlement execution
///
/// Turns one `Matches` into on-chain transfers. For every (maker order, trade)
/// pair two transfers are sent, in an order fixed by the maker side:
///
/// | maker side | first transfer          | second transfer         |
/// |------------|-------------------------|-------------------------|
/// | BUY        | quote: maker → taker    | base: taker → maker     |
/// | SELL       | base: maker → taker     | quote: taker → maker    |
///
/// There is no rollback. In `BestEffort` mode a failed transfer is logged and
/// the remaining transfers still run, and `TRADE_SUCCESS` is published
/// regardless. `SettlementResult` records what actually happened.
/// `AbortOnFirstFailure` stops at the first failure and reports
/// `TRANSACTION_ERROR` instead.

use super::cascade::StopOrderCascade;
use super::publisher::EventPublisher;
use crate::domain::entities::{Address, Matches, Order, Pair, PairCode, Side, Trade, Wallet};
use crate::domain::pricing::{quote_token_amount, PricingError};
use crate::infrastructure::chain::{TokenTransfer, TransferError};
use crate::shared::metrics::METRICS;
use crate::shared::protocol::OperatorMessageType;
use primitive_types::{H256, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementMode {
    /// 失败的转账不影响后续转账
    #[default]
    BestEffort,
    /// 第一次转账失败即停止
    AbortOnFirstFailure,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettlementError {
    #[error("no pair registered for {0}")]
    UnknownPair(PairCode),

    #[error(transparent)]
    Pricing(#[from] PricingError),

    #[error(transparent)]
    Transfer(#[from] TransferError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementFailure {
    pub trade: H256,
    pub error: SettlementError,
}

/// What one `execute_trade` call actually did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettlementResult {
    pub transfers_attempted: usize,
    pub transfers_failed: usize,
    /// 无法定价（交易对未知或金额溢出）而未发送的转账
    pub transfers_skipped: usize,
    pub failures: Vec<SettlementFailure>,
    /// 严格模式下因失败提前终止
    pub aborted: bool,
}

impl SettlementResult {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Pair metadata indexed by code
#[derive(Debug, Clone, Default)]
pub struct PairRegistry {
    pairs: HashMap<PairCode, Pair>,
}

impl PairRegistry {
    pub fn new(pairs: impl IntoIterator<Item = Pair>) -> Self {
        Self {
            pairs: pairs.into_iter().map(|p| (p.code(), p)).collect(),
        }
    }

    pub fn get(&self, code: &PairCode) -> Option<&Pair> {
        self.pairs.get(code)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pair> {
        self.pairs.values()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

const LEGS_PER_TRADE: usize = 2;

struct Leg {
    token: Address,
    from: Address,
    to: Address,
    amount: U256,
}

pub struct Settler {
    chain: Arc<dyn TokenTransfer>,
    pairs: Arc<PairRegistry>,
    publisher: EventPublisher,
    cascade: StopOrderCascade,
    mode: SettlementMode,
}

impl Settler {
    pub fn new(
        chain: Arc<dyn TokenTransfer>,
        pairs: Arc<PairRegistry>,
        publisher: EventPublisher,
        cascade: StopOrderCascade,
        mode: SettlementMode,
    ) -> Self {
        Self {
            chain,
            pairs,
            publisher,
            cascade,
            mode,
        }
    }

    /// Validates, executes, reports and cascades one `Matches`
    pub async fn settle(&self, wallet: &Wallet, matches: &Matches) -> Option<SettlementResult> {
        if !matches.is_well_formed() {
            warn!(
                taker = ?matches.taker_order.hash,
                makers = matches.maker_orders.len(),
                trades = matches.trades.len(),
                "malformed matches, not executing"
            );
            self.report(
                OperatorMessageType::TradeInvalid,
                matches,
                Some("maker orders and trades are not parallel".to_string()),
            )
            .await;
            return None;
        }

        let result = self.execute_trade(wallet, matches).await;

        if result.aborted {
            let reason = result
                .failures
                .first()
                .map(|f| f.error.to_string())
                .unwrap_or_default();
            self.report(OperatorMessageType::TransactionError, matches, Some(reason))
                .await;
            return Some(result);
        }

        // 只表示已尝试结算，不代表每笔转账都成功
        self.report(OperatorMessageType::TradeSuccess, matches, None).await;
        self.cascade.run(&matches.trades).await;
        Some(result)
    }

    pub async fn execute_trade(&self, wallet: &Wallet, matches: &Matches) -> SettlementResult {
        let mut result = SettlementResult::default();
        let taker = &matches.taker_order;

        for (maker, trade) in matches.maker_orders.iter().zip(&matches.trades) {
            let legs = match self.legs(maker, taker, trade) {
                Ok(legs) => legs,
                Err(error) => {
                    error!(trade = ?trade.hash, error = %error, "cannot price trade");
                    result.transfers_skipped += LEGS_PER_TRADE;
                    result.failures.push(SettlementFailure {
                        trade: trade.hash,
                        error,
                    });
                    if self.mode == SettlementMode::AbortOnFirstFailure {
                        result.aborted = true;
                        return result;
                    }
                    continue;
                }
            };

            for leg in legs {
                result.transfers_attempted += 1;
                match self
                    .chain
                    .transfer_from(wallet, leg.token, leg.from, leg.to, leg.amount)
                    .await
                {
                    Ok(tx_hash) => {
                        METRICS.transfers_total.with_label_values(&["success"]).inc();
                        info!(trade = ?trade.hash, ?tx_hash, token = ?leg.token, amount = %leg.amount, "transfer sent");
                    }
                    Err(err) => {
                        METRICS.transfers_total.with_label_values(&["failed"]).inc();
                        error!(trade = ?trade.hash, token = ?leg.token, error = %err, "transfer failed");
                        result.transfers_failed += 1;
                        result.failures.push(SettlementFailure {
                            trade: trade.hash,
                            error: err.into(),
                        });
                        if self.mode == SettlementMode::AbortOnFirstFailure {
                            result.aborted = true;
                            return result;
                        }
                    }
                }
            }
        }

        result
    }

    fn legs(
        &self,
        maker: &Order,
        taker: &Order,
        trade: &Trade,
    ) -> Result<[Leg; LEGS_PER_TRADE], SettlementError> {
        let code = trade.pair_code();
        let pair = self
            .pairs
            .get(&code)
            .ok_or_else(|| SettlementError::UnknownPair(code.clone()))?;

        let base_amount = trade.amount;
        let quote_amount = quote_token_amount(trade.amount, maker.price_point, pair.base_decimals)?;

        let base = |from, to| Leg {
            token: trade.base_token,
            from,
            to,
            amount: base_amount,
        };
        let quote = |from, to| Leg {
            token: trade.quote_token,
            from,
            to,
            amount: quote_amount,
        };

        let (maker_addr, taker_addr) = (maker.user_address, taker.user_address);
        Ok(match maker.side {
            Side::Buy => [quote(maker_addr, taker_addr), base(taker_addr, maker_addr)],
            Side::Sell => [base(maker_addr, taker_addr), quote(taker_addr, maker_addr)],
        })
    }

    async fn report(&self, kind: OperatorMessageType, matches: &Matches, error: Option<String>) {
        if let Err(err) = self.publisher.publish_outcome(kind, matches, error).await {
            error!(outcome = kind.as_str(), error = %err, "failed to publish settlement outcome");
        }
    }
}
