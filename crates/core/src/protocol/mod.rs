//! The money-market state machine.
//!
//! [`Protocol`] owns all engine storage ([`ProtocolState`]), the injected
//! [`RiskPolicy`] and the collaborators. Every public operation runs inside
//! [`Protocol::transaction`]:
//!
//! 1. The state is checkpointed.
//! 2. The operation runs its checks and effects, appending events and
//!    queueing token transfers instead of performing them.
//! 3. When the outermost transaction succeeds, queued transfers settle in
//!    order against the token collaborators.
//!
//! Any error, including a failed inbound or outbound transfer, restores the
//! checkpoint and discards the operation's events. Reward payouts are the
//! exception: a failed reward transfer only restores the holder's accrued
//! balance and the rest of the operation stands.
//!
//! Collaborators never receive a handle to the protocol, and `&mut self`
//! admits one writer at a time, so no call can re-enter an operation.

mod admin;
mod borrow;
mod rewards;
mod supply;

use alloy::primitives::{Address, U256};
use moneymarket_chain::{PriceOracle, Token};
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};

use crate::comptroller::{Comptroller, RiskContext, RiskPolicy};
use crate::error::{Error, Result};
use crate::events::ProtocolEvent;
use crate::exp;
use crate::flywheel::RewardFlywheel;
use crate::liquidity::{AccountLiquidity, Hypothetical};
use crate::market::{AccountSnapshot, Market};
use crate::registry::MarketRegistry;
use crate::state::ProtocolState;

pub use borrow::LiquidationResult;
pub use rewards::ClaimScope;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransferKind {
    /// Underlying pulled into a market
    In,
    /// Underlying or reward token paid out; failure aborts
    Out,
    /// Reward claim payout; failure keeps the reward accrued
    Reward { recipient: Address },
}

#[derive(Debug)]
struct PendingTransfer {
    token: Arc<dyn Token>,
    from: Address,
    to: Address,
    amount: U256,
    kind: TransferKind,
}

/// Money-market engine.
#[derive(Debug)]
pub struct Protocol {
    /// Address of the engine itself; holds the reward token
    address: Address,
    state: ProtocolState,
    policy: Box<dyn RiskPolicy>,
    oracle: Arc<dyn PriceOracle>,
    reward_token: Option<Arc<dyn Token>>,
    events: Vec<ProtocolEvent>,
    pending: Vec<PendingTransfer>,
    depth: usize,
}

impl Protocol {
    /// Create an engine with no markets at `block_number`, governed by the
    /// default [`Comptroller`] policy.
    pub fn new(address: Address, admin: Address, oracle: Arc<dyn PriceOracle>, block_number: u64) -> Self {
        Self {
            address,
            state: ProtocolState::new(admin, block_number, RewardFlywheel::default()),
            policy: Box::new(Comptroller),
            oracle,
            reward_token: None,
            events: Vec::new(),
            pending: Vec::new(),
            depth: 0,
        }
    }

    /// Replace the risk policy.
    pub fn with_policy(mut self, policy: Box<dyn RiskPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Set the token paid out by the flywheel.
    pub fn with_reward_token(mut self, token: Arc<dyn Token>, claim_threshold: U256) -> Self {
        self.reward_token = Some(token);
        self.state.flywheel.claim_threshold = claim_threshold;
        self
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn state(&self) -> &ProtocolState {
        &self.state
    }

    pub fn registry(&self) -> &MarketRegistry {
        &self.state.registry
    }

    pub fn flywheel(&self) -> &RewardFlywheel {
        &self.state.flywheel
    }

    pub fn oracle(&self) -> &dyn PriceOracle {
        self.oracle.as_ref()
    }

    pub fn reward_token(&self) -> Option<&Arc<dyn Token>> {
        self.reward_token.as_ref()
    }

    pub fn block_number(&self) -> u64 {
        self.state.block_number
    }

    pub fn market(&self, market: Address) -> Option<&Market> {
        self.state.registry.market(market)
    }

    /// Committed events, oldest first.
    pub fn events(&self) -> &[ProtocolEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<ProtocolEvent> {
        std::mem::take(&mut self.events)
    }

    // ---- Transactions ----

    /// Run `f` atomically. Nested calls join the outermost transaction;
    /// transfers settle only when the outermost one succeeds.
    pub fn transaction<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let checkpoint = self.state.clone();
        let events_len = self.events.len();
        let pending_len = self.pending.len();

        self.depth += 1;
        let mut result = f(self);
        self.depth -= 1;

        if result.is_ok() && self.depth == 0 {
            if let Err(err) = self.settle() {
                result = Err(err);
            }
        }

        if let Err(err) = &result {
            debug!(error = %err, severity = ?err.severity(), "Transaction rolled back");
            self.state = checkpoint;
            self.events.truncate(events_len);
            self.pending.truncate(pending_len);
        }
        result
    }

    fn settle(&mut self) -> Result<()> {
        let pending = std::mem::take(&mut self.pending);
        let mut settled = Vec::with_capacity(pending.len());

        for (i, transfer) in pending.iter().enumerate() {
            match transfer.token.transfer(transfer.from, transfer.to, transfer.amount) {
                Ok(()) => {
                    settled.push(i);
                    if let TransferKind::Reward { recipient } = transfer.kind {
                        self.events.push(ProtocolEvent::RewardGranted {
                            recipient,
                            amount: transfer.amount,
                        });
                    }
                }
                Err(err) => match transfer.kind {
                    TransferKind::Reward { recipient } => {
                        warn!(
                            recipient = %recipient,
                            amount = %transfer.amount,
                            error = %err,
                            "Reward transfer failed, keeping reward accrued"
                        );
                        let accrued = exp::add(self.state.flywheel.accrued(recipient), transfer.amount)?;
                        self.state.flywheel.set_accrued(recipient, accrued);
                    }
                    TransferKind::In | TransferKind::Out => {
                        Self::compensate(&pending, &settled);
                        return Err(match transfer.kind {
                            TransferKind::In => Error::TokenTransferInFailed(err),
                            _ => Error::TokenTransferOutFailed(err),
                        });
                    }
                },
            }
        }
        Ok(())
    }

    /// Undo settled transfers, newest first.
    fn compensate(pending: &[PendingTransfer], settled: &[usize]) {
        for &i in settled.iter().rev() {
            let transfer = &pending[i];
            if let Err(err) = transfer.token.transfer(transfer.to, transfer.from, transfer.amount) {
                error!(
                    token = %transfer.token.symbol(),
                    from = %transfer.to,
                    to = %transfer.from,
                    amount = %transfer.amount,
                    error = %err,
                    "Failed to compensate settled transfer"
                );
            }
        }
    }

    pub(crate) fn emit(&mut self, event: ProtocolEvent) {
        self.events.push(event);
    }

    fn queue(&mut self, token: Arc<dyn Token>, from: Address, to: Address, amount: U256, kind: TransferKind) {
        if amount.is_zero() {
            return;
        }
        self.pending.push(PendingTransfer {
            token,
            from,
            to,
            amount,
            kind,
        });
    }

    /// Pull `amount` of a market's underlying from `from` into the market.
    pub(crate) fn queue_transfer_in(&mut self, market: Address, from: Address, amount: U256) -> Result<()> {
        let token = self.state.underlying(market)?;
        self.queue(token, from, market, amount, TransferKind::In);
        Ok(())
    }

    /// Pay `amount` of a market's underlying out to `to`.
    pub(crate) fn queue_transfer_out(&mut self, market: Address, to: Address, amount: U256) -> Result<()> {
        let token = self.state.underlying(market)?;
        self.queue(token, market, to, amount, TransferKind::Out);
        Ok(())
    }

    /// Pay reward tokens held by the engine. A soft payout keeps the reward
    /// accrued on failure; a hard one aborts the transaction.
    fn queue_reward_payout(&mut self, to: Address, amount: U256, soft: bool) -> Result<()> {
        let token = self.reward_token.clone().ok_or(Error::InsufficientRewardBalance)?;
        let kind = if soft {
            TransferKind::Reward { recipient: to }
        } else {
            TransferKind::Out
        };
        self.queue(token, self.address, to, amount, kind);
        Ok(())
    }

    /// Reward tokens held by the engine that are not already promised to a
    /// queued payout.
    fn reward_balance_available(&self) -> U256 {
        let Some(token) = &self.reward_token else {
            return U256::ZERO;
        };
        let queued = self
            .pending
            .iter()
            .filter(|t| t.from == self.address)
            .fold(U256::ZERO, |acc, t| acc.saturating_add(t.amount));
        token.balance_of(self.address).saturating_sub(queued)
    }

    /// Split borrow of the policy and its mutable context.
    fn risk(&mut self) -> (&dyn RiskPolicy, RiskContext<'_>) {
        (
            self.policy.as_ref(),
            RiskContext {
                state: &mut self.state,
                oracle: self.oracle.as_ref(),
                events: &mut self.events,
            },
        )
    }

    // ---- Interest accrual ----

    /// Accrue interest on `market` up to the current block.
    #[instrument(skip(self))]
    pub fn accrue_interest(&mut self, market: Address) -> Result<()> {
        self.transaction(|p| p.accrue(market))
    }

    pub(crate) fn accrue(&mut self, market: Address) -> Result<()> {
        let block_number = self.state.block_number;
        let model = self.state.rate_model(market)?;
        let entry = self.state.registry.market(market).ok_or(Error::MarketNotListed)?;

        if let Some(accrual) = entry.compute_accrual(block_number, model.as_ref())? {
            debug!(
                market = %market,
                interest = %accrual.interest_accumulated,
                borrow_index = %accrual.borrow_index,
                "Accrued interest"
            );
            let event = self.state.registry.market_mut(market)?.apply_accrual(accrual);
            self.emit(event);
        }
        Ok(())
    }

    fn ensure_fresh(&self, market: Address) -> Result<()> {
        let entry = self.state.registry.market(market).ok_or(Error::MarketNotListed)?;
        if !entry.is_fresh(self.state.block_number) {
            return Err(Error::MarketNotFresh);
        }
        Ok(())
    }

    // ---- Host block control ----

    /// Move to `block_number`. The block never goes backwards.
    pub fn set_block_number(&mut self, block_number: u64) -> Result<()> {
        if block_number < self.state.block_number {
            return Err(Error::BlockNumberDecreased);
        }
        self.state.block_number = block_number;
        Ok(())
    }

    pub fn advance_blocks(&mut self, blocks: u64) -> Result<()> {
        let next = self
            .state
            .block_number
            .checked_add(blocks)
            .ok_or(crate::error::MathError::IntegerOverflow)?;
        self.set_block_number(next)
    }

    // ---- Views ----

    pub fn get_account_liquidity(&self, account: Address) -> Result<AccountLiquidity> {
        self.policy
            .hypothetical_account_liquidity(&self.state, self.oracle.as_ref(), account, None)
    }

    pub fn get_hypothetical_account_liquidity(
        &self,
        account: Address,
        market: Address,
        redeem_tokens: U256,
        borrow_amount: U256,
    ) -> Result<AccountLiquidity> {
        let hypothetical = Hypothetical {
            market,
            redeem_tokens,
            borrow_amount,
        };
        self.policy.hypothetical_account_liquidity(
            &self.state,
            self.oracle.as_ref(),
            account,
            Some(hypothetical),
        )
    }

    pub fn liquidate_calculate_seize_tokens(
        &self,
        borrowed_market: Address,
        collateral_market: Address,
        repay_amount: U256,
    ) -> Result<U256> {
        self.policy.liquidate_calculate_seize_tokens(
            &self.state,
            self.oracle.as_ref(),
            borrowed_market,
            collateral_market,
            repay_amount,
        )
    }

    fn known_market(&self, market: Address) -> Result<&Market> {
        self.state.registry.market(market).ok_or(Error::MarketNotListed)
    }

    pub fn exchange_rate_stored(&self, market: Address) -> Result<U256> {
        Ok(self.known_market(market)?.exchange_rate_stored()?)
    }

    pub fn exchange_rate_current(&mut self, market: Address) -> Result<U256> {
        self.transaction(|p| {
            p.accrue(market)?;
            p.exchange_rate_stored(market)
        })
    }

    pub fn borrow_balance_stored(&self, account: Address, market: Address) -> Result<U256> {
        Ok(self.known_market(market)?.borrow_balance_stored(account)?)
    }

    pub fn borrow_balance_current(&mut self, account: Address, market: Address) -> Result<U256> {
        self.transaction(|p| {
            p.accrue(market)?;
            p.borrow_balance_stored(account, market)
        })
    }

    /// Market tokens held by `account`.
    pub fn balance_of(&self, account: Address, market: Address) -> U256 {
        self.market(market)
            .map(|m| m.supply_tokens(account))
            .unwrap_or_default()
    }

    pub fn balance_of_underlying(&mut self, account: Address, market: Address) -> Result<U256> {
        self.transaction(|p| {
            p.accrue(market)?;
            Ok(p.known_market(market)?.balance_of_underlying_stored(account)?)
        })
    }

    pub fn account_snapshot(&self, account: Address, market: Address) -> Result<AccountSnapshot> {
        Ok(self.known_market(market)?.account_snapshot(account)?)
    }

    pub fn borrow_rate_per_block(&self, market: Address) -> Result<U256> {
        let model = self.state.rate_model(market)?;
        self.known_market(market)?.borrow_rate_per_block(model.as_ref())
    }

    pub fn supply_rate_per_block(&self, market: Address) -> Result<U256> {
        let model = self.state.rate_model(market)?;
        self.known_market(market)?.supply_rate_per_block(model.as_ref())
    }

    pub fn assets_in(&self, account: Address) -> &[Address] {
        self.state.registry.assets_in(account)
    }

    pub fn reward_accrued(&self, account: Address) -> U256 {
        self.state.flywheel.accrued(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::Fixture;

    #[test]
    fn test_block_never_decreases() {
        let mut f = Fixture::new();
        let start = f.protocol.block_number();
        f.protocol.advance_blocks(5).unwrap();
        assert_eq!(f.protocol.block_number(), start + 5);
        assert_eq!(
            f.protocol.set_block_number(start),
            Err(Error::BlockNumberDecreased)
        );
        f.protocol.set_block_number(start + 5).unwrap();
    }

    #[test]
    fn test_accrual_idempotent_within_block() {
        let mut f = Fixture::new();
        f.fund_and_borrow();
        f.protocol.advance_blocks(10).unwrap();

        f.protocol.accrue_interest(f.usdc_market).unwrap();
        let after_first = f.protocol.market(f.usdc_market).unwrap().clone();
        let events_after_first = f.protocol.events().len();

        f.protocol.accrue_interest(f.usdc_market).unwrap();
        let after_second = f.protocol.market(f.usdc_market).unwrap();
        assert_eq!(after_second.borrow_index, after_first.borrow_index);
        assert_eq!(after_second.total_borrows, after_first.total_borrows);
        assert_eq!(after_second.total_reserves, after_first.total_reserves);
        assert_eq!(f.protocol.events().len(), events_after_first);
    }

    #[test]
    fn test_borrow_index_and_accrual_block_monotonic() {
        let mut f = Fixture::new();
        f.fund_and_borrow();
        let mut last_index = f.protocol.market(f.usdc_market).unwrap().borrow_index;
        let mut last_block = f.protocol.market(f.usdc_market).unwrap().accrual_block_number;
        for _ in 0..5 {
            f.protocol.advance_blocks(3).unwrap();
            f.protocol.accrue_interest(f.usdc_market).unwrap();
            let market = f.protocol.market(f.usdc_market).unwrap();
            assert!(market.borrow_index > last_index);
            assert!(market.accrual_block_number > last_block);
            last_index = market.borrow_index;
            last_block = market.accrual_block_number;
        }
    }

    #[test]
    fn test_failed_transaction_leaves_no_trace() {
        let mut f = Fixture::new();
        f.fund_and_borrow();
        let events_before = f.protocol.events().len();
        let market_before = f.protocol.market(f.eth_market).unwrap().clone();
        let alice_eth = f.eth.balance_of(f.alice);
        let alice_tokens = f.protocol.balance_of(f.alice, f.eth_market);

        // Accrual runs first, then the redeem is refused
        f.protocol.advance_blocks(10).unwrap();
        let err = f
            .protocol
            .redeem(f.alice, f.eth_market, alice_tokens)
            .unwrap_err();
        assert_eq!(err, Error::InsufficientLiquidity);

        let market_after = f.protocol.market(f.eth_market).unwrap();
        assert_eq!(market_after.accrual_block_number, market_before.accrual_block_number);
        assert_eq!(market_after.total_supply, market_before.total_supply);
        assert_eq!(f.protocol.events().len(), events_before);
        assert_eq!(f.eth.balance_of(f.alice), alice_eth);
        assert_eq!(f.protocol.balance_of(f.alice, f.eth_market), alice_tokens);
    }

    #[test]
    fn test_nested_transaction_failure_rolls_back_outer() {
        let mut f = Fixture::new();
        let market = f.usdc_market;
        let alice = f.alice;
        let supply_before = f.protocol.balance_of(alice, market);

        let result: Result<()> = f.protocol.transaction(|p| {
            p.mint(alice, market, U256::from(1_000u64))?;
            Err(Error::BadInput)
        });
        assert_eq!(result, Err(Error::BadInput));
        assert_eq!(f.protocol.balance_of(alice, market), supply_before);
        assert!(f.protocol.pending.is_empty());
    }

    #[test]
    fn test_failed_inbound_transfer_aborts() {
        let mut f = Fixture::new();
        f.usdc.halt_transfers(true);
        let err = f
            .protocol
            .mint(f.alice, f.usdc_market, U256::from(1_000u64))
            .unwrap_err();
        assert!(matches!(err, Error::TokenTransferInFailed(_)));
        assert!(err.is_abort());
        assert_eq!(f.protocol.balance_of(f.alice, f.usdc_market), U256::ZERO);
        assert_eq!(f.protocol.market(f.usdc_market).unwrap().cash, U256::ZERO);
    }

    #[test]
    fn test_failed_transfer_compensates_settled_ones() {
        let mut f = Fixture::new();
        let (alice, usdc_market, eth_market) = (f.alice, f.usdc_market, f.eth_market);
        let usdc_before = f.usdc.balance_of(alice);
        f.eth.halt_transfers(true);

        let result: Result<()> = f.protocol.transaction(|p| {
            p.mint(alice, usdc_market, U256::from(1_000u64))?;
            p.mint(alice, eth_market, U256::from(1_000u64))?;
            Ok(())
        });
        assert!(matches!(result, Err(Error::TokenTransferInFailed(_))));
        assert_eq!(f.usdc.balance_of(alice), usdc_before);
        assert_eq!(f.usdc.balance_of(usdc_market), U256::ZERO);
        assert_eq!(f.protocol.balance_of(alice, usdc_market), U256::ZERO);
    }

    #[test]
    fn test_rate_views() {
        let mut f = Fixture::new();
        f.fund_and_borrow();
        let borrow_rate = f.protocol.borrow_rate_per_block(f.usdc_market).unwrap();
        assert_eq!(borrow_rate, crate::testkit::BORROW_RATE_PER_BLOCK);
        let supply_rate = f.protocol.supply_rate_per_block(f.usdc_market).unwrap();
        assert!(supply_rate < borrow_rate);
    }
}
