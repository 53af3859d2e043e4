//! Supplying, redeeming and moving market tokens, and market membership.

use alloy::primitives::{Address, U256};
use tracing::{debug, info, instrument};

use super::Protocol;
use crate::error::{Error, Result};
use crate::events::ProtocolEvent;
use crate::exp;

impl Protocol {
    /// Supply `mint_amount` of underlying and receive market tokens.
    /// Returns the tokens minted.
    #[instrument(skip(self), fields(market = %market, minter = %minter))]
    pub fn mint(&mut self, minter: Address, market: Address, mint_amount: U256) -> Result<U256> {
        self.transaction(|p| {
            p.accrue(market)?;
            p.mint_fresh(minter, minter, market, mint_amount)
        })
    }

    /// Mint to `minter` with underlying pulled from `payer`. The market must
    /// already be accrued.
    pub(crate) fn mint_fresh(
        &mut self,
        payer: Address,
        minter: Address,
        market: Address,
        mint_amount: U256,
    ) -> Result<U256> {
        let (policy, mut ctx) = self.risk();
        policy.mint_allowed(&mut ctx, market, minter, mint_amount)?;
        self.ensure_fresh(market)?;

        let exchange_rate = self.exchange_rate_stored(market)?;
        let mint_tokens = exp::div_scalar_by_exp_truncate(mint_amount, exchange_rate)?;

        let entry = self.state.registry.market_mut(market)?;
        let total_supply = exp::add(entry.total_supply, mint_tokens)?;
        let balance = exp::add(entry.supply_tokens(minter), mint_tokens)?;
        let cash = exp::add(entry.cash, mint_amount)?;
        entry.total_supply = total_supply;
        entry.cash = cash;
        entry.position_mut(minter).supply_tokens = balance;

        self.queue_transfer_in(market, payer, mint_amount)?;
        self.emit(ProtocolEvent::Mint {
            market,
            minter,
            mint_amount,
            mint_tokens,
        });
        self.emit(ProtocolEvent::Transfer {
            market,
            from: market,
            to: minter,
            amount: mint_tokens,
        });

        info!(market = %market, minter = %minter, amount = %mint_amount, tokens = %mint_tokens, "Minted");
        Ok(mint_tokens)
    }

    /// Burn `redeem_tokens` market tokens for underlying. Returns the
    /// underlying paid out.
    #[instrument(skip(self), fields(market = %market, redeemer = %redeemer))]
    pub fn redeem(&mut self, redeemer: Address, market: Address, redeem_tokens: U256) -> Result<U256> {
        self.transaction(|p| {
            p.accrue(market)?;
            p.redeem_fresh(redeemer, market, redeem_tokens, U256::ZERO)
        })
    }

    /// Burn as many market tokens as `redeem_amount` of underlying is worth.
    /// Returns the underlying paid out.
    #[instrument(skip(self), fields(market = %market, redeemer = %redeemer))]
    pub fn redeem_underlying(&mut self, redeemer: Address, market: Address, redeem_amount: U256) -> Result<U256> {
        self.transaction(|p| {
            p.accrue(market)?;
            p.redeem_fresh(redeemer, market, U256::ZERO, redeem_amount)
        })
    }

    /// Exactly one of `redeem_tokens_in` and `redeem_amount_in` is used:
    /// tokens when non-zero, otherwise the amount.
    fn redeem_fresh(
        &mut self,
        redeemer: Address,
        market: Address,
        redeem_tokens_in: U256,
        redeem_amount_in: U256,
    ) -> Result<U256> {
        let exchange_rate = self.exchange_rate_stored(market)?;
        let (redeem_tokens, redeem_amount) = if !redeem_tokens_in.is_zero() {
            (
                redeem_tokens_in,
                exp::mul_scalar_truncate(exchange_rate, redeem_tokens_in)?,
            )
        } else {
            (
                exp::div_scalar_by_exp_truncate(redeem_amount_in, exchange_rate)?,
                redeem_amount_in,
            )
        };
        // Dust amounts worth less than one token
        if redeem_tokens.is_zero() && !redeem_amount.is_zero() {
            return Err(Error::BadInput);
        }

        let (policy, mut ctx) = self.risk();
        policy.redeem_allowed(&mut ctx, market, redeemer, redeem_tokens)?;
        self.ensure_fresh(market)?;

        let entry = self.state.registry.market_mut(market)?;
        let total_supply = exp::sub(entry.total_supply, redeem_tokens)?;
        let balance = exp::sub(entry.supply_tokens(redeemer), redeem_tokens)?;
        if entry.cash < redeem_amount {
            return Err(Error::TokenInsufficientCash);
        }
        entry.total_supply = total_supply;
        entry.cash -= redeem_amount;
        entry.position_mut(redeemer).supply_tokens = balance;

        self.queue_transfer_out(market, redeemer, redeem_amount)?;
        self.emit(ProtocolEvent::Transfer {
            market,
            from: redeemer,
            to: market,
            amount: redeem_tokens,
        });
        self.emit(ProtocolEvent::Redeem {
            market,
            redeemer,
            redeem_amount,
            redeem_tokens,
        });

        info!(market = %market, redeemer = %redeemer, amount = %redeem_amount, tokens = %redeem_tokens, "Redeemed");
        Ok(redeem_amount)
    }

    /// Move market tokens from `src` to `dst`. There are no allowances, so
    /// `spender` must be `src`.
    #[instrument(skip(self), fields(market = %market, src = %src, dst = %dst))]
    pub fn transfer_tokens(
        &mut self,
        spender: Address,
        src: Address,
        dst: Address,
        market: Address,
        tokens: U256,
    ) -> Result<()> {
        self.transaction(|p| {
            if spender != src {
                return Err(Error::Unauthorized);
            }

            let (policy, mut ctx) = p.risk();
            policy.transfer_allowed(&mut ctx, market, src, dst, tokens)?;
            if src == dst {
                return Err(Error::BadInput);
            }

            let entry = p.state.registry.market_mut(market)?;
            let src_balance = exp::sub(entry.supply_tokens(src), tokens)?;
            let dst_balance = exp::add(entry.supply_tokens(dst), tokens)?;
            entry.position_mut(src).supply_tokens = src_balance;
            entry.position_mut(dst).supply_tokens = dst_balance;

            p.emit(ProtocolEvent::Transfer {
                market,
                from: src,
                to: dst,
                amount: tokens,
            });
            debug!(market = %market, src = %src, dst = %dst, tokens = %tokens, "Transferred market tokens");
            Ok(())
        })
    }

    /// Use supplied balances in `markets` as collateral. Fails as a whole on
    /// the first market that cannot be entered.
    #[instrument(skip(self, markets), fields(account = %account, count = markets.len()))]
    pub fn enter_markets(&mut self, account: Address, markets: &[Address]) -> Result<()> {
        self.transaction(|p| {
            for &market in markets {
                if let Some(event) = p.state.registry.add_to_market(market, account)? {
                    p.emit(event);
                }
            }
            Ok(())
        })
    }

    /// Stop using `market` as collateral. Refused while borrowing from it or
    /// when the supplied balance is needed to cover other borrows.
    #[instrument(skip(self), fields(market = %market, account = %account))]
    pub fn exit_market(&mut self, account: Address, market: Address) -> Result<()> {
        self.transaction(|p| {
            let snapshot = p.account_snapshot(account, market)?;
            if !snapshot.borrow_balance.is_zero() {
                return Err(Error::NonzeroBorrowBalance);
            }

            p.policy.redeem_liquidity_allowed(
                &p.state,
                p.oracle.as_ref(),
                market,
                account,
                snapshot.supply_tokens,
            )?;

            if let Some(event) = p.state.registry.remove_from_market(market, account) {
                p.emit(event);
            }
            Ok(())
        })
    }
}
