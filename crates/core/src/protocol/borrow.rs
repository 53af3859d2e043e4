//! Borrowing, repaying and liquidation.

use alloy::primitives::{Address, U256};
use tracing::{info, instrument, warn};

use super::Protocol;
use crate::error::{Error, Result};
use crate::events::ProtocolEvent;
use crate::exp;

/// What a liquidation repaid and seized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiquidationResult {
    pub repay_amount: U256,
    pub seize_tokens: U256,
}

impl Protocol {
    /// Borrow `borrow_amount` of underlying. Enters the market if needed.
    #[instrument(skip(self), fields(market = %market, borrower = %borrower))]
    pub fn borrow(&mut self, borrower: Address, market: Address, borrow_amount: U256) -> Result<()> {
        self.transaction(|p| {
            p.accrue(market)?;
            p.borrow_fresh(borrower, market, borrow_amount)
        })
    }

    fn borrow_fresh(&mut self, borrower: Address, market: Address, borrow_amount: U256) -> Result<()> {
        let (policy, mut ctx) = self.risk();
        policy.borrow_allowed(&mut ctx, market, borrower, borrow_amount)?;
        self.ensure_fresh(market)?;

        let entry = self.state.registry.market_mut(market)?;
        if entry.cash < borrow_amount {
            return Err(Error::TokenInsufficientCash);
        }
        let account_borrows = exp::add(entry.borrow_balance_stored(borrower)?, borrow_amount)?;
        let total_borrows = exp::add(entry.total_borrows, borrow_amount)?;
        let borrow_index = entry.borrow_index;

        let position = entry.position_mut(borrower);
        position.principal = account_borrows;
        position.interest_index = borrow_index;
        entry.total_borrows = total_borrows;
        entry.cash -= borrow_amount;

        self.queue_transfer_out(market, borrower, borrow_amount)?;
        self.emit(ProtocolEvent::Borrow {
            market,
            borrower,
            borrow_amount,
            account_borrows,
            total_borrows,
        });

        info!(market = %market, borrower = %borrower, amount = %borrow_amount, "Borrowed");
        Ok(())
    }

    /// Repay the caller's own borrow. `U256::MAX` repays everything.
    /// Returns the amount actually repaid.
    #[instrument(skip(self), fields(market = %market, payer = %payer))]
    pub fn repay_borrow(&mut self, payer: Address, market: Address, repay_amount: U256) -> Result<U256> {
        self.repay_borrow_behalf(payer, payer, market, repay_amount)
    }

    /// Repay `borrower`'s borrow with `payer`'s underlying.
    #[instrument(skip(self), fields(market = %market, payer = %payer, borrower = %borrower))]
    pub fn repay_borrow_behalf(
        &mut self,
        payer: Address,
        borrower: Address,
        market: Address,
        repay_amount: U256,
    ) -> Result<U256> {
        self.transaction(|p| {
            p.accrue(market)?;
            p.repay_borrow_fresh(payer, borrower, market, repay_amount)
        })
    }

    fn repay_borrow_fresh(
        &mut self,
        payer: Address,
        borrower: Address,
        market: Address,
        repay_amount: U256,
    ) -> Result<U256> {
        let (policy, mut ctx) = self.risk();
        policy.repay_borrow_allowed(&mut ctx, market, payer, borrower, repay_amount)?;
        self.ensure_fresh(market)?;

        let entry = self.state.registry.market_mut(market)?;
        let borrow_balance = entry.borrow_balance_stored(borrower)?;
        let repay_amount = if repay_amount == U256::MAX {
            borrow_balance
        } else {
            repay_amount
        };

        let account_borrows = exp::sub(borrow_balance, repay_amount)?;
        let total_borrows = exp::sub(entry.total_borrows, repay_amount)?;
        let cash = exp::add(entry.cash, repay_amount)?;
        let borrow_index = entry.borrow_index;

        let position = entry.position_mut(borrower);
        position.principal = account_borrows;
        position.interest_index = borrow_index;
        entry.total_borrows = total_borrows;
        entry.cash = cash;

        self.queue_transfer_in(market, payer, repay_amount)?;
        self.emit(ProtocolEvent::RepayBorrow {
            market,
            payer,
            borrower,
            repay_amount,
            account_borrows,
            total_borrows,
        });

        info!(market = %market, payer = %payer, borrower = %borrower, amount = %repay_amount, "Repaid");
        Ok(repay_amount)
    }

    /// Repay part of an underwater borrow and seize the borrower's
    /// collateral tokens in return.
    #[instrument(skip(self), fields(borrower = %borrower, liquidator = %liquidator))]
    pub fn liquidate_borrow(
        &mut self,
        liquidator: Address,
        borrower: Address,
        borrowed_market: Address,
        repay_amount: U256,
        collateral_market: Address,
    ) -> Result<LiquidationResult> {
        self.transaction(|p| {
            p.accrue(borrowed_market)?;
            p.accrue(collateral_market)?;
            p.liquidate_borrow_fresh(
                liquidator,
                liquidator,
                borrower,
                borrowed_market,
                repay_amount,
                collateral_market,
            )
        })
    }

    /// Liquidation with underlying pulled from `payer` and collateral
    /// seized to `liquidator`. Both markets must already be accrued.
    pub(crate) fn liquidate_borrow_fresh(
        &mut self,
        payer: Address,
        liquidator: Address,
        borrower: Address,
        borrowed_market: Address,
        repay_amount: U256,
        collateral_market: Address,
    ) -> Result<LiquidationResult> {
        let (policy, mut ctx) = self.risk();
        policy.liquidate_borrow_allowed(
            &mut ctx,
            borrowed_market,
            collateral_market,
            liquidator,
            borrower,
            repay_amount,
        )?;
        self.ensure_fresh(borrowed_market)?;
        self.ensure_fresh(collateral_market)?;

        if borrower == liquidator {
            return Err(Error::InvalidAccountPair);
        }
        if repay_amount.is_zero() || repay_amount == U256::MAX {
            return Err(Error::InvalidCloseAmountRequested);
        }

        let repay_amount = self.repay_borrow_fresh(payer, borrower, borrowed_market, repay_amount)?;
        let seize_tokens = self.policy.liquidate_calculate_seize_tokens(
            &self.state,
            self.oracle.as_ref(),
            borrowed_market,
            collateral_market,
            repay_amount,
        )?;
        self.seize_internal(borrowed_market, collateral_market, liquidator, borrower, seize_tokens)?;

        self.emit(ProtocolEvent::LiquidateBorrow {
            market: borrowed_market,
            liquidator,
            borrower,
            repay_amount,
            collateral_market,
            seize_tokens,
        });
        warn!(
            borrower = %borrower,
            liquidator = %liquidator,
            repay = %repay_amount,
            seized = %seize_tokens,
            "Borrow liquidated"
        );

        Ok(LiquidationResult {
            repay_amount,
            seize_tokens,
        })
    }

    /// Move `seize_tokens` of the collateral market from borrower to
    /// liquidator on behalf of `seizer_market`.
    fn seize_internal(
        &mut self,
        seizer_market: Address,
        collateral_market: Address,
        liquidator: Address,
        borrower: Address,
        seize_tokens: U256,
    ) -> Result<()> {
        let (policy, mut ctx) = self.risk();
        policy.seize_allowed(
            &mut ctx,
            collateral_market,
            seizer_market,
            liquidator,
            borrower,
            seize_tokens,
        )?;
        if borrower == liquidator {
            return Err(Error::InvalidAccountPair);
        }

        let entry = self.state.registry.market_mut(collateral_market)?;
        let borrower_tokens = exp::sub(entry.supply_tokens(borrower), seize_tokens)?;
        let liquidator_tokens = exp::add(entry.supply_tokens(liquidator), seize_tokens)?;
        entry.position_mut(borrower).supply_tokens = borrower_tokens;
        entry.position_mut(liquidator).supply_tokens = liquidator_tokens;

        self.emit(ProtocolEvent::Transfer {
            market: collateral_market,
            from: borrower,
            to: liquidator,
            amount: seize_tokens,
        });
        Ok(())
    }
}
