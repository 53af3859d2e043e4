//! Risk policy.
//!
//! Every state-changing market operation asks a [`RiskPolicy`] for
//! permission before touching balances. The hooks run listing, pause,
//! liquidity and cap checks, and distribute rewards to the accounts whose
//! balances are about to change, so reward snapshots always precede
//! balance updates.
//!
//! [`Comptroller`] is the default policy. The engine holds its policy behind
//! a `Box<dyn RiskPolicy>`, so the policy can be swapped without touching
//! stored state.

use alloy::primitives::{Address, U256};
use moneymarket_chain::PriceOracle;
use std::fmt::Debug;
use tracing::debug;

use crate::error::{Action, Error, Result};
use crate::events::ProtocolEvent;
use crate::flywheel::RewardSide;
use crate::liquidation::{self, check_close_factor};
use crate::liquidity::{self, AccountLiquidity, Hypothetical};
use crate::state::ProtocolState;

/// What a policy hook may read and write.
pub struct RiskContext<'a> {
    pub state: &'a mut ProtocolState,
    pub oracle: &'a dyn PriceOracle,
    pub events: &'a mut Vec<ProtocolEvent>,
}

impl RiskContext<'_> {
    /// Update one reward index and distribute to each account in order.
    pub fn distribute(&mut self, market: Address, side: RewardSide, accounts: &[Address]) -> Result<()> {
        self.state.update_reward_index(market, side)?;
        for &account in accounts {
            let event = self.state.distribute_reward(market, side, account)?;
            self.events.push(event);
        }
        Ok(())
    }
}

/// Permission hooks consulted by market operations.
pub trait RiskPolicy: Send + Sync + Debug {
    fn mint_allowed(&self, ctx: &mut RiskContext<'_>, market: Address, minter: Address, mint_amount: U256) -> Result<()>;

    fn redeem_allowed(&self, ctx: &mut RiskContext<'_>, market: Address, redeemer: Address, redeem_tokens: U256) -> Result<()>;

    fn borrow_allowed(&self, ctx: &mut RiskContext<'_>, market: Address, borrower: Address, borrow_amount: U256) -> Result<()>;

    fn repay_borrow_allowed(
        &self,
        ctx: &mut RiskContext<'_>,
        market: Address,
        payer: Address,
        borrower: Address,
        repay_amount: U256,
    ) -> Result<()>;

    fn liquidate_borrow_allowed(
        &self,
        ctx: &mut RiskContext<'_>,
        borrowed_market: Address,
        collateral_market: Address,
        liquidator: Address,
        borrower: Address,
        repay_amount: U256,
    ) -> Result<()>;

    fn seize_allowed(
        &self,
        ctx: &mut RiskContext<'_>,
        collateral_market: Address,
        borrowed_market: Address,
        liquidator: Address,
        borrower: Address,
        seize_tokens: U256,
    ) -> Result<()>;

    fn transfer_allowed(
        &self,
        ctx: &mut RiskContext<'_>,
        market: Address,
        src: Address,
        dst: Address,
        tokens: U256,
    ) -> Result<()>;

    /// Whether `account` could give up `redeem_tokens` of `market` without
    /// falling into shortfall. Used by redeem, transfer and exit.
    fn redeem_liquidity_allowed(
        &self,
        state: &ProtocolState,
        oracle: &dyn PriceOracle,
        market: Address,
        account: Address,
        redeem_tokens: U256,
    ) -> Result<()>;

    fn liquidate_calculate_seize_tokens(
        &self,
        state: &ProtocolState,
        oracle: &dyn PriceOracle,
        borrowed_market: Address,
        collateral_market: Address,
        repay_amount: U256,
    ) -> Result<U256>;

    fn hypothetical_account_liquidity(
        &self,
        state: &ProtocolState,
        oracle: &dyn PriceOracle,
        account: Address,
        hypothetical: Option<Hypothetical>,
    ) -> Result<AccountLiquidity>;
}

/// Compound-style risk policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct Comptroller;

impl Comptroller {
    fn ensure_protocol_active(state: &ProtocolState) -> Result<()> {
        if state.registry.params.protocol_paused {
            return Err(Error::ProtocolPaused(Action::Protocol));
        }
        Ok(())
    }
}

impl RiskPolicy for Comptroller {
    fn mint_allowed(&self, ctx: &mut RiskContext<'_>, market: Address, minter: Address, _mint_amount: U256) -> Result<()> {
        Self::ensure_protocol_active(ctx.state)?;
        if ctx.state.registry.listed(market)?.mint_paused {
            return Err(Error::ProtocolPaused(Action::Mint));
        }
        ctx.distribute(market, RewardSide::Supply, &[minter])
    }

    fn redeem_allowed(&self, ctx: &mut RiskContext<'_>, market: Address, redeemer: Address, redeem_tokens: U256) -> Result<()> {
        Self::ensure_protocol_active(ctx.state)?;
        self.redeem_liquidity_allowed(ctx.state, ctx.oracle, market, redeemer, redeem_tokens)?;
        ctx.distribute(market, RewardSide::Supply, &[redeemer])
    }

    fn borrow_allowed(&self, ctx: &mut RiskContext<'_>, market: Address, borrower: Address, borrow_amount: U256) -> Result<()> {
        Self::ensure_protocol_active(ctx.state)?;
        if ctx.state.registry.listed(market)?.borrow_paused {
            return Err(Error::ProtocolPaused(Action::Borrow));
        }

        if !ctx.state.registry.is_member(borrower, market) {
            if let Some(event) = ctx.state.registry.add_to_market(market, borrower)? {
                debug!(market = %market, borrower = %borrower, "Borrower auto-entered market");
                ctx.events.push(event);
            }
        }

        ctx.oracle
            .try_underlying_price(market)
            .ok_or(Error::PriceError)?;

        let entry = ctx.state.registry.listed(market)?;
        if !entry.borrow_cap.is_zero() {
            let next_total_borrows = entry
                .total_borrows
                .checked_add(borrow_amount)
                .ok_or(Error::BorrowCapExceeded)?;
            if next_total_borrows >= entry.borrow_cap {
                return Err(Error::BorrowCapExceeded);
            }
        }

        let liquidity = self.hypothetical_account_liquidity(
            ctx.state,
            ctx.oracle,
            borrower,
            Some(Hypothetical::borrow(market, borrow_amount)),
        )?;
        if liquidity.has_shortfall() {
            return Err(Error::InsufficientLiquidity);
        }

        ctx.distribute(market, RewardSide::Borrow, &[borrower])
    }

    fn repay_borrow_allowed(
        &self,
        ctx: &mut RiskContext<'_>,
        market: Address,
        _payer: Address,
        borrower: Address,
        _repay_amount: U256,
    ) -> Result<()> {
        Self::ensure_protocol_active(ctx.state)?;
        ctx.state.registry.known(market)?;
        ctx.distribute(market, RewardSide::Borrow, &[borrower])
    }

    fn liquidate_borrow_allowed(
        &self,
        ctx: &mut RiskContext<'_>,
        borrowed_market: Address,
        collateral_market: Address,
        _liquidator: Address,
        borrower: Address,
        repay_amount: U256,
    ) -> Result<()> {
        Self::ensure_protocol_active(ctx.state)?;
        let borrowed = ctx.state.registry.known(borrowed_market)?;
        ctx.state.registry.known(collateral_market)?;

        let liquidity = self.hypothetical_account_liquidity(ctx.state, ctx.oracle, borrower, None)?;
        if !liquidity.has_shortfall() {
            return Err(Error::InsufficientShortfall);
        }

        let borrow_balance = borrowed.borrow_balance_stored(borrower)?;
        check_close_factor(
            ctx.state.registry.params.close_factor_mantissa,
            borrow_balance,
            repay_amount,
        )
    }

    fn seize_allowed(
        &self,
        ctx: &mut RiskContext<'_>,
        collateral_market: Address,
        borrowed_market: Address,
        liquidator: Address,
        borrower: Address,
        _seize_tokens: U256,
    ) -> Result<()> {
        Self::ensure_protocol_active(ctx.state)?;
        if ctx.state.registry.params.seize_paused {
            return Err(Error::ProtocolPaused(Action::Seize));
        }
        ctx.state.registry.known(collateral_market)?;
        ctx.state.registry.known(borrowed_market)?;
        ctx.distribute(collateral_market, RewardSide::Supply, &[borrower, liquidator])
    }

    fn transfer_allowed(
        &self,
        ctx: &mut RiskContext<'_>,
        market: Address,
        src: Address,
        dst: Address,
        tokens: U256,
    ) -> Result<()> {
        Self::ensure_protocol_active(ctx.state)?;
        if ctx.state.registry.params.transfer_paused {
            return Err(Error::ProtocolPaused(Action::Transfer));
        }
        self.redeem_liquidity_allowed(ctx.state, ctx.oracle, market, src, tokens)?;
        ctx.distribute(market, RewardSide::Supply, &[src, dst])
    }

    fn redeem_liquidity_allowed(
        &self,
        state: &ProtocolState,
        oracle: &dyn PriceOracle,
        market: Address,
        account: Address,
        redeem_tokens: U256,
    ) -> Result<()> {
        state.registry.known(market)?;
        // Tokens outside entered markets are not collateral
        if !state.registry.is_member(account, market) {
            return Ok(());
        }
        let liquidity = self.hypothetical_account_liquidity(
            state,
            oracle,
            account,
            Some(Hypothetical::redeem(market, redeem_tokens)),
        )?;
        if liquidity.has_shortfall() {
            return Err(Error::InsufficientLiquidity);
        }
        Ok(())
    }

    fn liquidate_calculate_seize_tokens(
        &self,
        state: &ProtocolState,
        oracle: &dyn PriceOracle,
        borrowed_market: Address,
        collateral_market: Address,
        repay_amount: U256,
    ) -> Result<U256> {
        liquidation::calculate_seize_tokens(
            &state.registry,
            oracle,
            borrowed_market,
            collateral_market,
            repay_amount,
        )
    }

    fn hypothetical_account_liquidity(
        &self,
        state: &ProtocolState,
        oracle: &dyn PriceOracle,
        account: Address,
        hypothetical: Option<Hypothetical>,
    ) -> Result<AccountLiquidity> {
        liquidity::hypothetical_account_liquidity(&state.registry, oracle, account, hypothetical)
    }
}
