/// Domain Entities
///
/// Orders, stop orders, trades and the `Matches` unit of settlement work.
/// Everything here is plain data plus the pure rules that belong to it
/// (hashing, pair codes, stop triggers). No I/O.

use primitive_types::{H160, H256, U256};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

/// 链上地址（20字节）
pub type Address = H160;

/// 交易对标识
///
/// 精确匹配、大小写敏感；由代币地址派生时格式为 `0x<base>::0x<quote>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PairCode(String);

impl PairCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Derives the canonical code for a (base, quote) token pair
    pub fn from_tokens(base: &Address, quote: &Address) -> Self {
        Self(format!(
            "0x{}::0x{}",
            hex::encode(base.as_bytes()),
            hex::encode(quote.as_bytes())
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PairCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 买卖方向，线上编码为 0 (BUY) / 1 (SELL)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Side {
    Buy,
    Sell,
}

impl From<Side> for u8 {
    fn from(side: Side) -> u8 {
        match side {
            Side::Buy => 0,
            Side::Sell => 1,
        }
    }
}

impl TryFrom<u8> for Side {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Side::Buy),
            1 => Ok(Side::Sell),
            other => Err(format!("invalid side {}, expected 0 (BUY) or 1 (SELL)", other)),
        }
    }
}

/// ECDSA signature components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub v: u8,
    pub r: H256,
    pub s: H256,
}

/// 已签名的用户订单
///
/// 签名后不可变；`hash` 由字段确定性计算得出
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub base_token: Address,
    pub quote_token: Address,
    pub amount: U256,
    /// 价格，按 1e18 缩放
    pub price_point: U256,
    pub side: Side,
    pub nonce: U256,
    pub make_fee: U256,
    pub take_fee: U256,
    pub user_address: Address,
    #[serde(default)]
    pub signature: Option<Signature>,
    pub hash: H256,
}

impl Order {
    /// Canonical SHA-256 over the signed fields
    ///
    /// Signature and hash are excluded so the hash can be signed.
    pub fn compute_hash(&self) -> H256 {
        let mut hasher = Sha256::new();
        hasher.update(self.base_token.as_bytes());
        hasher.update(self.quote_token.as_bytes());
        for value in [&self.amount, &self.price_point] {
            hasher.update(u256_bytes(value));
        }
        hasher.update([u8::from(self.side)]);
        for value in [&self.nonce, &self.make_fee, &self.take_fee] {
            hasher.update(u256_bytes(value));
        }
        hasher.update(self.user_address.as_bytes());
        H256::from_slice(&hasher.finalize())
    }

    /// Returns the order with `hash` recomputed from its fields
    pub fn with_computed_hash(mut self) -> Self {
        self.hash = self.compute_hash();
        self
    }

    pub fn pair_code(&self) -> PairCode {
        PairCode::from_tokens(&self.base_token, &self.quote_token)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopOrderStatus {
    Pending,
    Done,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StopOrderError {
    #[error("stop order {hash:?} is {status:?}, only pending stop orders can be triggered")]
    NotPending { hash: H256, status: StopOrderStatus },

    #[error("stop order {0:?} has a zero amount or price")]
    EmptyOrder(H256),
}

/// 条件单：价格触发后才转换为普通订单
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopOrder {
    pub order: Order,
    pub stop_price: U256,
    pub status: StopOrderStatus,
}

impl StopOrder {
    pub fn hash(&self) -> H256 {
        self.order.hash
    }

    pub fn pair_code(&self) -> PairCode {
        self.order.pair_code()
    }

    /// BUY stops fire at or above the stop price, SELL stops at or below
    pub fn is_triggered_by(&self, price_point: &U256) -> bool {
        match self.order.side {
            Side::Buy => *price_point >= self.stop_price,
            Side::Sell => *price_point <= self.stop_price,
        }
    }

    /// Converts a pending stop order into the live order it guards
    pub fn to_order(&self) -> Result<Order, StopOrderError> {
        if self.status != StopOrderStatus::Pending {
            return Err(StopOrderError::NotPending {
                hash: self.hash(),
                status: self.status,
            });
        }
        if self.order.amount.is_zero() || self.order.price_point.is_zero() {
            return Err(StopOrderError::EmptyOrder(self.hash()));
        }
        Ok(self.order.clone())
    }
}

/// 一次 maker/taker 撮合的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub hash: H256,
    pub maker: Address,
    pub taker: Address,
    pub maker_order_hash: H256,
    pub taker_order_hash: H256,
    pub base_token: Address,
    pub quote_token: Address,
    pub amount: U256,
    pub price_point: U256,
}

impl Trade {
    /// Builds the trade for `amount` filled between `maker` and `taker` at the maker price
    pub fn between(maker: &Order, taker: &Order, amount: U256) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(maker.hash.as_bytes());
        hasher.update(taker.hash.as_bytes());
        hasher.update(u256_bytes(&amount));
        Self {
            hash: H256::from_slice(&hasher.finalize()),
            maker: maker.user_address,
            taker: taker.user_address,
            maker_order_hash: maker.hash,
            taker_order_hash: taker.hash,
            base_token: maker.base_token,
            quote_token: maker.quote_token,
            amount,
            price_point: maker.price_point,
        }
    }

    pub fn pair_code(&self) -> PairCode {
        PairCode::from_tokens(&self.base_token, &self.quote_token)
    }
}

/// 结算的原子工作单元：一个 taker 对若干 maker
///
/// `maker_orders[i]` 与 `trades[i]` 一一对应
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Matches {
    pub taker_order: Order,
    pub maker_orders: Vec<Order>,
    pub trades: Vec<Trade>,
}

impl Matches {
    pub fn new(taker_order: Order) -> Self {
        Self {
            taker_order,
            maker_orders: Vec::new(),
            trades: Vec::new(),
        }
    }

    pub fn push(&mut self, maker_order: Order, trade: Trade) {
        self.maker_orders.push(maker_order);
        self.trades.push(trade);
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    /// Maker and trade lists must be parallel and non-empty
    pub fn is_well_formed(&self) -> bool {
        !self.trades.is_empty() && self.maker_orders.len() == self.trades.len()
    }

    pub fn pair_code(&self) -> PairCode {
        self.taker_order.pair_code()
    }
}

/// Trading pair metadata known at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pair {
    pub name: String,
    pub base_token: Address,
    pub quote_token: Address,
    pub base_decimals: u8,
    pub quote_decimals: u8,
}

impl Pair {
    pub fn code(&self) -> PairCode {
        PairCode::from_tokens(&self.base_token, &self.quote_token)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WalletError {
    #[error("private key for wallet {0:?} must be 32 bytes of hex")]
    InvalidPrivateKey(Address),
}

/// 运营方签名钱包，每个钱包独占一个结算队列
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub address: Address,
    pub private_key: String,
}

impl Wallet {
    pub fn new(address: Address, private_key: impl Into<String>) -> Result<Self, WalletError> {
        let wallet = Self {
            address,
            private_key: private_key.into(),
        };
        wallet.validate()?;
        Ok(wallet)
    }

    pub fn validate(&self) -> Result<(), WalletError> {
        let key = self.private_key.trim_start_matches("0x");
        match hex::decode(key) {
            Ok(bytes) if bytes.len() == 32 => Ok(()),
            _ => Err(WalletError::InvalidPrivateKey(self.address)),
        }
    }
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.address)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

fn u256_bytes(value: &U256) -> [u8; 32] {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    buf
}
