//! Liquidation math.
//!
//! How many collateral tokens a liquidator receives for repaying part of a
//! borrow, and how much of a borrow may be repaid in one liquidation.

use alloy::primitives::{Address, U256};
use moneymarket_chain::PriceOracle;

use crate::error::{Error, MathError, Result};
use crate::exp;
use crate::registry::MarketRegistry;

/// Collateral tokens seized for `repay_amount` of the borrowed asset:
///
/// `repay * incentive * price_borrowed / (price_collateral * exchange_rate)`
///
/// computed with a single truncating division.
pub fn seize_tokens(
    repay_amount: U256,
    liquidation_incentive_mantissa: U256,
    price_borrowed: U256,
    price_collateral: U256,
    exchange_rate_mantissa: U256,
) -> Result<U256> {
    if price_borrowed.is_zero() || price_collateral.is_zero() {
        return Err(Error::PriceError);
    }
    let numerator = exp::mul(
        exp::mul(repay_amount, liquidation_incentive_mantissa)?,
        price_borrowed,
    )?;
    let denominator = exp::mul(price_collateral, exchange_rate_mantissa)?;
    Ok(exp::div(numerator, denominator)?)
}

/// Seize amount using current oracle prices and the collateral market's
/// stored exchange rate.
pub fn calculate_seize_tokens(
    registry: &MarketRegistry,
    oracle: &dyn PriceOracle,
    borrowed_market: Address,
    collateral_market: Address,
    repay_amount: U256,
) -> Result<U256> {
    let price_borrowed = oracle
        .try_underlying_price(borrowed_market)
        .ok_or(Error::PriceError)?;
    let price_collateral = oracle
        .try_underlying_price(collateral_market)
        .ok_or(Error::PriceError)?;
    let exchange_rate = registry
        .market(collateral_market)
        .ok_or(Error::MarketNotListed)?
        .exchange_rate_stored()?;

    seize_tokens(
        repay_amount,
        registry.params.liquidation_incentive_mantissa,
        price_borrowed,
        price_collateral,
        exchange_rate,
    )
}

/// Largest repay allowed in one liquidation: `close_factor * borrow_balance`.
pub fn max_close(close_factor_mantissa: U256, borrow_balance: U256) -> Result<U256, MathError> {
    exp::mul_scalar_truncate(close_factor_mantissa, borrow_balance)
}

/// Reject repays beyond the close factor.
pub fn check_close_factor(
    close_factor_mantissa: U256,
    borrow_balance: U256,
    repay_amount: U256,
) -> Result<()> {
    if repay_amount > max_close(close_factor_mantissa, borrow_balance)? {
        return Err(Error::TooMuchRepay);
    }
    Ok(())
}

/// Treasury share of seized tokens, rounded down.
pub fn treasury_share(seize_tokens: U256, treasury_percent_mantissa: U256) -> Result<U256, MathError> {
    exp::mul_scalar_truncate(treasury_percent_mantissa, seize_tokens)
}
