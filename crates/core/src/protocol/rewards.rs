//! Reward claims and speed refreshes.

use alloy::primitives::{Address, U256};
use tracing::{debug, info, instrument};

use super::Protocol;
use crate::error::{Error, Result};
use crate::events::ProtocolEvent;
use crate::flywheel::RewardSide;

/// Which reward sides a claim distributes before granting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimScope {
    pub borrowers: bool,
    pub suppliers: bool,
}

impl Default for ClaimScope {
    fn default() -> Self {
        Self {
            borrowers: true,
            suppliers: true,
        }
    }
}

impl Protocol {
    /// Claim everything `holder` has earned in every listed market.
    #[instrument(skip(self), fields(holder = %holder))]
    pub fn claim_rewards(&mut self, holder: Address) -> Result<()> {
        let markets = self.listed_market_addresses();
        self.transaction(|p| p.claim_internal(&[holder], &markets, ClaimScope::default(), false))
    }

    /// Claim what `holder` has earned in `markets`.
    #[instrument(skip(self, markets), fields(holder = %holder))]
    pub fn claim_rewards_in(&mut self, holder: Address, markets: &[Address]) -> Result<()> {
        self.transaction(|p| p.claim_internal(&[holder], markets, ClaimScope::default(), false))
    }

    /// Batch claim. Every market must be listed or nothing is claimed.
    #[instrument(skip(self, holders, markets), fields(holders = holders.len(), markets = markets.len()))]
    pub fn claim_rewards_for(&mut self, holders: &[Address], markets: &[Address], scope: ClaimScope) -> Result<()> {
        self.transaction(|p| p.claim_internal(holders, markets, scope, false))
    }

    /// Claim across every listed market. A holder in shortfall has the
    /// reward supplied to the reward market as collateral instead of paid
    /// out.
    #[instrument(skip(self), fields(holder = %holder))]
    pub fn claim_rewards_as_collateral(&mut self, holder: Address) -> Result<()> {
        let markets = self.listed_market_addresses();
        self.transaction(|p| p.claim_internal(&[holder], &markets, ClaimScope::default(), true))
    }

    fn listed_market_addresses(&self) -> Vec<Address> {
        self.state
            .registry
            .listed_markets()
            .map(|m| m.address)
            .collect()
    }

    fn claim_internal(
        &mut self,
        holders: &[Address],
        markets: &[Address],
        scope: ClaimScope,
        collateralize: bool,
    ) -> Result<()> {
        for &market in markets {
            self.state.registry.listed(market)?;
        }
        for &market in markets {
            let (_, mut ctx) = self.risk();
            if scope.borrowers {
                ctx.distribute(market, RewardSide::Borrow, holders)?;
            }
            if scope.suppliers {
                ctx.distribute(market, RewardSide::Supply, holders)?;
            }
        }

        for &holder in holders {
            let shortfall = self.get_account_liquidity(holder)?.shortfall;
            self.grant_accrued(holder, shortfall, collateralize)?;
        }
        Ok(())
    }

    /// Pay out `holder`'s accrued reward if it clears the threshold and the
    /// engine can cover it; otherwise it stays accrued.
    fn grant_accrued(&mut self, holder: Address, shortfall: U256, collateralize: bool) -> Result<()> {
        let amount = self.state.flywheel.accrued(holder);
        if amount.is_zero() || amount < self.state.flywheel.claim_threshold {
            return Ok(());
        }
        if amount > self.reward_balance_available() {
            debug!(holder = %holder, amount = %amount, "Reward pool too small, keeping reward accrued");
            return Ok(());
        }

        if shortfall.is_zero() {
            self.state.flywheel.set_accrued(holder, U256::ZERO);
            return self.queue_reward_payout(holder, amount, true);
        }
        if !collateralize {
            return Err(Error::RewardsCollateralOnly);
        }
        self.collateralize_reward(holder, amount)
    }

    /// Supply `amount` of reward token to the reward market on behalf of
    /// `holder` and enter it.
    fn collateralize_reward(&mut self, holder: Address, amount: U256) -> Result<()> {
        let market = self.state.reward_market.ok_or(Error::RewardMarketNotConfigured)?;
        self.accrue(market)?;

        self.state.flywheel.set_accrued(holder, U256::ZERO);
        let payer = self.address;
        self.mint_fresh(payer, holder, market, amount)?;
        if let Some(event) = self.state.registry.add_to_market(market, holder)? {
            self.emit(event);
        }
        self.emit(ProtocolEvent::RewardCollateralized {
            holder,
            market,
            amount,
        });

        info!(holder = %holder, market = %market, amount = %amount, "Reward supplied as collateral");
        Ok(())
    }

    /// Recompute reward speeds from current borrow values.
    #[instrument(skip(self))]
    pub fn refresh_reward_speeds(&mut self) -> Result<()> {
        self.transaction(|p| p.refresh_speeds())
    }

    pub(crate) fn refresh_speeds(&mut self) -> Result<()> {
        let events = self.state.flywheel.refresh_speeds(
            &self.state.registry,
            self.oracle.as_ref(),
            self.state.block_number,
        )?;
        self.events.extend(events);
        Ok(())
    }
}
