//! Interest rate models.
//!
//! A rate model is a pure function of a market's balances. Rates are per
//! block, scaled by 1e18.

use alloy::primitives::U256;
use std::fmt::Debug;
use thiserror::Error;

/// Blocks per year assumed when converting yearly rates (~15s blocks).
pub const BLOCKS_PER_YEAR: u64 = 2_102_400;

/// 1e18
const MANTISSA_ONE: U256 = U256::from_limbs([1_000_000_000_000_000_000u64, 0, 0, 0]);

/// Rate model failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateModelError {
    /// Intermediate arithmetic overflowed or underflowed.
    #[error("rate model arithmetic out of range")]
    Arithmetic,

    /// The model refused to quote (used by test doubles and paused models).
    #[error("rate model unavailable: {0}")]
    Unavailable(String),
}

/// Interface the accrual engine uses to price borrowing.
pub trait InterestRateModel: Send + Sync + Debug {
    /// Borrow rate per block.
    fn borrow_rate(&self, cash: U256, borrows: U256, reserves: U256) -> Result<U256, RateModelError>;

    /// Supply rate per block.
    fn supply_rate(
        &self,
        cash: U256,
        borrows: U256,
        reserves: U256,
        reserve_factor_mantissa: U256,
    ) -> Result<U256, RateModelError> {
        let one_minus_reserve_factor = MANTISSA_ONE
            .checked_sub(reserve_factor_mantissa)
            .ok_or(RateModelError::Arithmetic)?;
        let borrow_rate = self.borrow_rate(cash, borrows, reserves)?;
        let rate_to_pool = mul_mantissa(borrow_rate, one_minus_reserve_factor)?;
        mul_mantissa(utilization_rate(cash, borrows, reserves)?, rate_to_pool)
    }
}

/// `borrows / (cash + borrows - reserves)`, zero when nothing is borrowed.
pub fn utilization_rate(cash: U256, borrows: U256, reserves: U256) -> Result<U256, RateModelError> {
    if borrows.is_zero() {
        return Ok(U256::ZERO);
    }
    let denominator = cash
        .checked_add(borrows)
        .and_then(|v| v.checked_sub(reserves))
        .ok_or(RateModelError::Arithmetic)?;
    borrows
        .checked_mul(MANTISSA_ONE)
        .and_then(|v| v.checked_div(denominator))
        .ok_or(RateModelError::Arithmetic)
}

fn mul_mantissa(a: U256, b: U256) -> Result<U256, RateModelError> {
    a.checked_mul(b)
        .map(|v| v / MANTISSA_ONE)
        .ok_or(RateModelError::Arithmetic)
}

fn per_block(per_year: U256) -> U256 {
    per_year / U256::from(BLOCKS_PER_YEAR)
}

/// Linear model: `base + utilization * multiplier`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WhitePaperInterestRateModel {
    pub base_rate_per_block: U256,
    pub multiplier_per_block: U256,
}

impl WhitePaperInterestRateModel {
    /// Build from yearly rates.
    pub fn new(base_rate_per_year: U256, multiplier_per_year: U256) -> Self {
        Self {
            base_rate_per_block: per_block(base_rate_per_year),
            multiplier_per_block: per_block(multiplier_per_year),
        }
    }
}

impl InterestRateModel for WhitePaperInterestRateModel {
    fn borrow_rate(&self, cash: U256, borrows: U256, reserves: U256) -> Result<U256, RateModelError> {
        let util = utilization_rate(cash, borrows, reserves)?;
        mul_mantissa(util, self.multiplier_per_block)?
            .checked_add(self.base_rate_per_block)
            .ok_or(RateModelError::Arithmetic)
    }
}

/// Kinked model: slope steepens by `jump_multiplier` above `kink` utilization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JumpRateModel {
    pub base_rate_per_block: U256,
    pub multiplier_per_block: U256,
    pub jump_multiplier_per_block: U256,
    pub kink: U256,
}

impl JumpRateModel {
    /// Build from yearly rates; `kink` is a utilization mantissa.
    pub fn new(
        base_rate_per_year: U256,
        multiplier_per_year: U256,
        jump_multiplier_per_year: U256,
        kink: U256,
    ) -> Self {
        Self {
            base_rate_per_block: per_block(base_rate_per_year),
            multiplier_per_block: per_block(multiplier_per_year),
            jump_multiplier_per_block: per_block(jump_multiplier_per_year),
            kink,
        }
    }
}

impl InterestRateModel for JumpRateModel {
    fn borrow_rate(&self, cash: U256, borrows: U256, reserves: U256) -> Result<U256, RateModelError> {
        let util = utilization_rate(cash, borrows, reserves)?;
        let below_kink = util.min(self.kink);
        let normal_rate = mul_mantissa(below_kink, self.multiplier_per_block)?
            .checked_add(self.base_rate_per_block)
            .ok_or(RateModelError::Arithmetic)?;
        if util <= self.kink {
            return Ok(normal_rate);
        }
        let excess = util - self.kink;
        mul_mantissa(excess, self.jump_multiplier_per_block)?
            .checked_add(normal_rate)
            .ok_or(RateModelError::Arithmetic)
    }
}

/// Constant borrow rate regardless of utilization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedRateModel {
    pub borrow_rate_per_block: U256,
}

impl FixedRateModel {
    pub fn new(borrow_rate_per_block: U256) -> Self {
        Self { borrow_rate_per_block }
    }
}

impl InterestRateModel for FixedRateModel {
    fn borrow_rate(&self, _cash: U256, _borrows: U256, _reserves: U256) -> Result<U256, RateModelError> {
        Ok(self.borrow_rate_per_block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exp(n: u64) -> U256 {
        U256::from(n) * MANTISSA_ONE
    }

    #[test]
    fn test_utilization_rate() {
        // 25 borrowed out of 100 total liquidity
        let util = utilization_rate(exp(75), exp(25), U256::ZERO).unwrap();
        assert_eq!(util, MANTISSA_ONE / U256::from(4u64));

        // Nothing borrowed
        assert_eq!(utilization_rate(exp(75), U256::ZERO, U256::ZERO).unwrap(), U256::ZERO);

        // Reserves larger than liquidity
        assert_eq!(
            utilization_rate(U256::ZERO, exp(1), exp(2)),
            Err(RateModelError::Arithmetic)
        );
    }

    #[test]
    fn test_white_paper_rate() {
        let model = WhitePaperInterestRateModel {
            base_rate_per_block: U256::from(10u64),
            multiplier_per_block: U256::from(1_000u64),
        };
        // 50% utilization -> 10 + 500
        let rate = model.borrow_rate(exp(50), exp(50), U256::ZERO).unwrap();
        assert_eq!(rate, U256::from(510u64));
    }

    #[test]
    fn test_jump_rate_above_kink() {
        let model = JumpRateModel {
            base_rate_per_block: U256::ZERO,
            multiplier_per_block: U256::from(1_000u64),
            jump_multiplier_per_block: U256::from(10_000u64),
            kink: MANTISSA_ONE * U256::from(8u64) / U256::from(10u64),
        };
        // 90% utilization: 0.8 * 1000 + 0.1 * 10000
        let rate = model.borrow_rate(exp(10), exp(90), U256::ZERO).unwrap();
        assert_eq!(rate, U256::from(1_800u64));

        // 40% utilization stays on the normal slope
        let rate = model.borrow_rate(exp(60), exp(40), U256::ZERO).unwrap();
        assert_eq!(rate, U256::from(400u64));
    }

    #[test]
    fn test_supply_rate_takes_reserve_cut() {
        let model = FixedRateModel::new(U256::from(1_000u64));
        // 50% utilization, 10% reserve factor -> 0.5 * 1000 * 0.9
        let rate = model
            .supply_rate(exp(50), exp(50), U256::ZERO, MANTISSA_ONE / U256::from(10u64))
            .unwrap();
        assert_eq!(rate, U256::from(450u64));
    }

    #[test]
    fn test_yearly_conversion() {
        let model = WhitePaperInterestRateModel::new(U256::from(BLOCKS_PER_YEAR * 3), U256::ZERO);
        assert_eq!(model.base_rate_per_block, U256::from(3u64));
    }
}
