//! Per-market balances and interest accrual.
//!
//! A [`Market`] owns its totals and the positions of every account that has
//! supplied to or borrowed from it. Interest compounds lazily: nothing moves
//! until [`Market::compute_accrual`] is asked to bring the market up to the
//! current block, and the result is committed in one step by
//! [`Market::apply_accrual`].

use alloy::primitives::{Address, U256};
use moneymarket_chain::InterestRateModel;
use std::collections::HashMap;

use crate::error::{Error, MathError};
use crate::events::ProtocolEvent;
use crate::exp::{self, EXP_SCALE};

/// Maximum borrow rate that can ever be applied (0.0005% per block).
pub const MAX_BORROW_RATE_MANTISSA: U256 = U256::from_limbs([5_000_000_000_000u64, 0, 0, 0]);

/// Maximum reserve factor (100%).
pub const MAX_RESERVE_FACTOR_MANTISSA: U256 = EXP_SCALE;

/// One account's balances in one market.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccountPosition {
    /// Market tokens held
    pub supply_tokens: U256,
    /// Borrow balance as of the last checkpoint
    pub principal: U256,
    /// Market borrow index at the last checkpoint
    pub interest_index: U256,
}

/// Snapshot used by the liquidity calculator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountSnapshot {
    pub supply_tokens: U256,
    pub borrow_balance: U256,
    pub exchange_rate: U256,
}

/// Result of bringing a market up to a block, not yet committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accrual {
    pub block_number: u64,
    pub cash_prior: U256,
    pub interest_accumulated: U256,
    pub borrow_index: U256,
    pub total_borrows: U256,
    pub total_reserves: U256,
}

/// A listed (or formerly listed) lending market.
#[derive(Debug, Clone)]
pub struct Market {
    pub address: Address,
    pub symbol: String,
    pub listed: bool,
    pub collateral_factor_mantissa: U256,
    pub reserve_factor_mantissa: U256,
    pub initial_exchange_rate_mantissa: U256,
    /// Zero means no cap
    pub borrow_cap: U256,
    /// Underlying held by the market, tracked on every transfer in and out
    pub cash: U256,
    pub total_supply: U256,
    pub total_borrows: U256,
    pub total_reserves: U256,
    pub borrow_index: U256,
    pub accrual_block_number: u64,
    pub mint_paused: bool,
    pub borrow_paused: bool,
    accounts: HashMap<Address, AccountPosition>,
}

impl Market {
    pub fn new(address: Address, symbol: impl Into<String>, initial_exchange_rate_mantissa: U256) -> Self {
        Self {
            address,
            symbol: symbol.into(),
            listed: false,
            collateral_factor_mantissa: U256::ZERO,
            reserve_factor_mantissa: U256::ZERO,
            initial_exchange_rate_mantissa,
            borrow_cap: U256::ZERO,
            cash: U256::ZERO,
            total_supply: U256::ZERO,
            total_borrows: U256::ZERO,
            total_reserves: U256::ZERO,
            borrow_index: EXP_SCALE,
            accrual_block_number: 0,
            mint_paused: false,
            borrow_paused: false,
            accounts: HashMap::new(),
        }
    }

    /// Set the reserve factor before listing.
    pub fn with_reserve_factor(mut self, reserve_factor_mantissa: U256) -> Self {
        self.reserve_factor_mantissa = reserve_factor_mantissa;
        self
    }

    pub fn position(&self, account: Address) -> AccountPosition {
        self.accounts.get(&account).copied().unwrap_or_default()
    }

    pub(crate) fn position_mut(&mut self, account: Address) -> &mut AccountPosition {
        self.accounts.entry(account).or_default()
    }

    pub fn supply_tokens(&self, account: Address) -> U256 {
        self.position(account).supply_tokens
    }

    /// Every account with a position, in no particular order.
    pub fn accounts(&self) -> impl Iterator<Item = (&Address, &AccountPosition)> {
        self.accounts.iter()
    }

    /// `(cash + borrows - reserves) / supply`, or the initial rate when no
    /// tokens exist.
    pub fn exchange_rate_stored(&self) -> Result<U256, MathError> {
        if self.total_supply.is_zero() {
            return Ok(self.initial_exchange_rate_mantissa);
        }
        let cash_plus_borrows = exp::add(self.cash, self.total_borrows)?;
        let underlying = exp::sub(cash_plus_borrows, self.total_reserves)?;
        exp::div(exp::mul(underlying, EXP_SCALE)?, self.total_supply)
    }

    /// Borrow balance scaled to the market's current borrow index.
    pub fn borrow_balance_stored(&self, account: Address) -> Result<U256, MathError> {
        let position = self.position(account);
        if position.principal.is_zero() {
            return Ok(U256::ZERO);
        }
        exp::div(
            exp::mul(position.principal, self.borrow_index)?,
            position.interest_index,
        )
    }

    pub fn balance_of_underlying_stored(&self, account: Address) -> Result<U256, MathError> {
        exp::mul_scalar_truncate(self.exchange_rate_stored()?, self.supply_tokens(account))
    }

    pub fn account_snapshot(&self, account: Address) -> Result<AccountSnapshot, MathError> {
        Ok(AccountSnapshot {
            supply_tokens: self.supply_tokens(account),
            borrow_balance: self.borrow_balance_stored(account)?,
            exchange_rate: self.exchange_rate_stored()?,
        })
    }

    pub fn is_fresh(&self, block_number: u64) -> bool {
        self.accrual_block_number == block_number
    }

    /// Compute the state of the market at `block_number` without touching
    /// it. `None` when the market is already accrued to that block.
    pub fn compute_accrual(
        &self,
        block_number: u64,
        model: &dyn InterestRateModel,
    ) -> Result<Option<Accrual>, Error> {
        if block_number == self.accrual_block_number {
            return Ok(None);
        }

        let borrow_rate = model.borrow_rate(self.cash, self.total_borrows, self.total_reserves)?;
        if borrow_rate > MAX_BORROW_RATE_MANTISSA {
            return Err(Error::BorrowRateAbsurdlyHigh(borrow_rate));
        }

        let block_delta = block_number
            .checked_sub(self.accrual_block_number)
            .ok_or(MathError::IntegerUnderflow)?;

        let simple_interest_factor = exp::mul(borrow_rate, U256::from(block_delta))?;
        let interest_accumulated =
            exp::mul_scalar_truncate(simple_interest_factor, self.total_borrows)?;
        let total_borrows = exp::add(interest_accumulated, self.total_borrows)?;
        let total_reserves = exp::mul_scalar_truncate_add(
            self.reserve_factor_mantissa,
            interest_accumulated,
            self.total_reserves,
        )?;
        let borrow_index = exp::mul_scalar_truncate_add(
            simple_interest_factor,
            self.borrow_index,
            self.borrow_index,
        )?;

        Ok(Some(Accrual {
            block_number,
            cash_prior: self.cash,
            interest_accumulated,
            borrow_index,
            total_borrows,
            total_reserves,
        }))
    }

    /// Commit a computed accrual.
    pub(crate) fn apply_accrual(&mut self, accrual: Accrual) -> ProtocolEvent {
        self.accrual_block_number = accrual.block_number;
        self.borrow_index = accrual.borrow_index;
        self.total_borrows = accrual.total_borrows;
        self.total_reserves = accrual.total_reserves;

        ProtocolEvent::AccrueInterest {
            market: self.address,
            cash_prior: accrual.cash_prior,
            interest_accumulated: accrual.interest_accumulated,
            borrow_index: accrual.borrow_index,
            total_borrows: accrual.total_borrows,
        }
    }

    pub fn borrow_rate_per_block(&self, model: &dyn InterestRateModel) -> Result<U256, Error> {
        Ok(model.borrow_rate(self.cash, self.total_borrows, self.total_reserves)?)
    }

    pub fn supply_rate_per_block(&self, model: &dyn InterestRateModel) -> Result<U256, Error> {
        Ok(model.supply_rate(
            self.cash,
            self.total_borrows,
            self.total_reserves,
            self.reserve_factor_mantissa,
        )?)
    }
}
