/// Settlement amount arithmetic
///
/// 价格与链上数量均按 1e18 缩放；base 代币精度用于非 18 位代币的归一化。

use primitive_types::U256;
use thiserror::Error;

/// 价格缩放因子的指数（1e18）
pub const PRICE_SCALE_DECIMALS: usize = 18;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PricingError {
    #[error("overflow computing quote amount for {amount} at price {price_point}")]
    Overflow { amount: U256, price_point: U256 },

    #[error("unsupported token decimals {0}")]
    UnsupportedDecimals(u8),
}

/// `amount * price_point / 10^base_decimals / 1e18`
pub fn quote_token_amount(
    amount: U256,
    price_point: U256,
    base_decimals: u8,
) -> Result<U256, PricingError> {
    // 10^77 已接近 U256 上限
    if base_decimals as usize > 77 {
        return Err(PricingError::UnsupportedDecimals(base_decimals));
    }

    let gross = amount
        .checked_mul(price_point)
        .ok_or(PricingError::Overflow { amount, price_point })?;

    Ok(gross / U256::exp10(base_decimals as usize) / U256::exp10(PRICE_SCALE_DECIMALS))
}
