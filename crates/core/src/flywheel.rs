//! Reward flywheel.
//!
//! Each market carries two reward indices, one for suppliers and one for
//! borrowers. An index grows by `speed * blocks / total` (in 1e36 scale)
//! whenever the market is touched; an account earns `balance * (index -
//! snapshot)` and snapshots the index every time its balance is about to
//! change. This keeps payouts proportional to balance held over time
//! without iterating over accounts.
//!
//! Speeds are derived from each rewarded market's share of total borrow
//! value, see [`RewardFlywheel::refresh_speeds`].

use alloy::primitives::{Address, U256};
use moneymarket_chain::PriceOracle;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};

use crate::error::{MathError, Result};
use crate::events::ProtocolEvent;
use crate::exp::{self, DOUBLE_SCALE};
use crate::market::Market;
use crate::registry::MarketRegistry;

/// Starting value of every reward index.
pub const REWARD_INITIAL_INDEX: U256 = DOUBLE_SCALE;

/// Which balance a reward index follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RewardSide {
    Supply,
    Borrow,
}

impl fmt::Display for RewardSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Supply => f.write_str("supply"),
            Self::Borrow => f.write_str("borrow"),
        }
    }
}

/// Index state of one market side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewardState {
    pub index: U256,
    pub block: u64,
    /// Reward tokens per block
    pub speed: U256,
}

impl RewardState {
    fn initial(block: u64) -> Self {
        Self {
            index: REWARD_INITIAL_INDEX,
            block,
            speed: U256::ZERO,
        }
    }
}

/// Rewards owed to one account and its per-market index snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountReward {
    pub accrued: U256,
    supplier_index: HashMap<Address, U256>,
    borrower_index: HashMap<Address, U256>,
}

#[derive(Debug, Clone, Default)]
pub struct RewardFlywheel {
    supply_state: HashMap<Address, RewardState>,
    borrow_state: HashMap<Address, RewardState>,
    accounts: HashMap<Address, AccountReward>,
    /// Markets sharing `reward_rate`. Removal swaps the last entry in.
    rewarded_markets: Vec<Address>,
    /// Reward tokens per block across all rewarded markets
    pub reward_rate: U256,
    /// Accrued rewards below this stay accrued on claim
    pub claim_threshold: U256,
}

impl RewardFlywheel {
    pub fn new(reward_rate: U256, claim_threshold: U256) -> Self {
        Self {
            reward_rate,
            claim_threshold,
            ..Default::default()
        }
    }

    fn states(&self, side: RewardSide) -> &HashMap<Address, RewardState> {
        match side {
            RewardSide::Supply => &self.supply_state,
            RewardSide::Borrow => &self.borrow_state,
        }
    }

    fn states_mut(&mut self, side: RewardSide) -> &mut HashMap<Address, RewardState> {
        match side {
            RewardSide::Supply => &mut self.supply_state,
            RewardSide::Borrow => &mut self.borrow_state,
        }
    }

    /// Start both indices of a market at the initial index. Never resets an
    /// existing state.
    pub fn init_market(&mut self, market: Address, block: u64) {
        for side in [RewardSide::Supply, RewardSide::Borrow] {
            self.states_mut(side)
                .entry(market)
                .or_insert_with(|| RewardState::initial(block));
        }
    }

    pub fn state(&self, market: Address, side: RewardSide) -> Option<RewardState> {
        self.states(side).get(&market).copied()
    }

    pub fn speed(&self, market: Address, side: RewardSide) -> U256 {
        self.state(market, side).map(|s| s.speed).unwrap_or_default()
    }

    pub fn account(&self, account: Address) -> Option<&AccountReward> {
        self.accounts.get(&account)
    }

    pub fn accrued(&self, account: Address) -> U256 {
        self.accounts
            .get(&account)
            .map(|a| a.accrued)
            .unwrap_or_default()
    }

    pub(crate) fn set_accrued(&mut self, account: Address, accrued: U256) {
        self.accounts.entry(account).or_default().accrued = accrued;
    }

    pub fn account_index(&self, account: Address, market: Address, side: RewardSide) -> Option<U256> {
        let reward = self.accounts.get(&account)?;
        match side {
            RewardSide::Supply => reward.supplier_index.get(&market).copied(),
            RewardSide::Borrow => reward.borrower_index.get(&market).copied(),
        }
    }

    pub fn rewarded_markets(&self) -> &[Address] {
        &self.rewarded_markets
    }

    pub fn is_rewarded(&self, market: Address) -> bool {
        self.rewarded_markets.contains(&market)
    }

    /// Add a market to the rewarded set. Returns false if it already was.
    pub fn add_market(&mut self, market: Address, block: u64) -> bool {
        if self.is_rewarded(market) {
            return false;
        }
        self.init_market(market, block);
        self.rewarded_markets.push(market);
        true
    }

    /// Remove a market from the rewarded set. The last entry takes its slot.
    pub fn drop_market(&mut self, market: Address) -> bool {
        match self.rewarded_markets.iter().position(|m| *m == market) {
            Some(i) => {
                self.rewarded_markets.swap_remove(i);
                true
            }
            None => false,
        }
    }

    /// Amount the index of `side` follows: total supply, or total borrows
    /// in principal terms (divided by the market borrow index).
    fn side_total(market: &Market, side: RewardSide) -> Result<U256, MathError> {
        match side {
            RewardSide::Supply => Ok(market.total_supply),
            RewardSide::Borrow => exp::div_exp(market.total_borrows, market.borrow_index),
        }
    }

    fn side_balance(market: &Market, account: Address, side: RewardSide) -> Result<U256, MathError> {
        match side {
            RewardSide::Supply => Ok(market.supply_tokens(account)),
            RewardSide::Borrow => {
                exp::div_exp(market.borrow_balance_stored(account)?, market.borrow_index)
            }
        }
    }

    /// Bring the index of one market side up to `block`.
    pub fn update_index(&mut self, market: &Market, side: RewardSide, block: u64) -> Result<(), MathError> {
        let total = Self::side_total(market, side)?;
        let state = self
            .states_mut(side)
            .entry(market.address)
            .or_insert_with(|| RewardState::initial(block));

        let block_delta = block.saturating_sub(state.block);
        if block_delta == 0 {
            return Ok(());
        }

        if !state.speed.is_zero() && !total.is_zero() {
            let accrued = exp::mul(state.speed, U256::from(block_delta))?;
            let ratio = exp::fraction(accrued, total)?;
            state.index = exp::add(state.index, ratio)?;
        }
        state.block = block;
        Ok(())
    }

    /// Credit `account` for its balance on one market side since its last
    /// snapshot, and move the snapshot to the current index.
    pub fn distribute(
        &mut self,
        market: &Market,
        side: RewardSide,
        account: Address,
    ) -> Result<ProtocolEvent, MathError> {
        let index = self
            .state(market.address, side)
            .map(|s| s.index)
            .unwrap_or(REWARD_INITIAL_INDEX);
        let balance = Self::side_balance(market, account, side)?;

        let prior = self
            .account_index(account, market.address, side)
            .filter(|i| !i.is_zero())
            .unwrap_or(REWARD_INITIAL_INDEX);
        let index_delta = exp::sub(index, prior)?;
        let delta = exp::mul_double(balance, index_delta)?;

        let reward = self.accounts.entry(account).or_default();
        let accrued = exp::add(reward.accrued, delta)?;
        reward.accrued = accrued;
        match side {
            RewardSide::Supply => reward.supplier_index.insert(market.address, index),
            RewardSide::Borrow => reward.borrower_index.insert(market.address, index),
        };

        Ok(match side {
            RewardSide::Supply => ProtocolEvent::DistributedSupplierReward {
                market: market.address,
                supplier: account,
                delta,
                supply_index: index,
            },
            RewardSide::Borrow => ProtocolEvent::DistributedBorrowerReward {
                market: market.address,
                borrower: account,
                delta,
                borrow_index: index,
            },
        })
    }

    /// Set the speed of one market side. The index must already be up to
    /// date. Returns an event only if the speed changed.
    pub fn set_speed(&mut self, market: Address, side: RewardSide, new_speed: U256, block: u64) -> Option<ProtocolEvent> {
        let state = self
            .states_mut(side)
            .entry(market)
            .or_insert_with(|| RewardState::initial(block));
        if state.speed == new_speed {
            return None;
        }
        state.speed = new_speed;
        Some(ProtocolEvent::RewardSpeedUpdated {
            market,
            side,
            new_speed,
        })
    }

    /// Update every market's indices at the old speeds, then split
    /// `reward_rate` across rewarded markets by borrow value
    /// (`price * total_borrows`). Markets left at speed zero drop out of the
    /// rewarded set.
    pub fn refresh_speeds(
        &mut self,
        registry: &MarketRegistry,
        oracle: &dyn PriceOracle,
        block: u64,
    ) -> Result<Vec<ProtocolEvent>> {
        for &address in registry.all_markets() {
            if let Some(market) = registry.market(address) {
                self.update_index(market, RewardSide::Supply, block)?;
                self.update_index(market, RewardSide::Borrow, block)?;
            }
        }

        let mut utilities = Vec::with_capacity(self.rewarded_markets.len());
        let mut total_utility = U256::ZERO;
        for &address in &self.rewarded_markets {
            let utility = match registry.listed(address) {
                Ok(market) => {
                    let price = oracle.try_underlying_price(address).unwrap_or_else(|| {
                        warn!(market = %address, "No price for rewarded market, utility is zero");
                        U256::ZERO
                    });
                    exp::mul_scalar_truncate(price, market.total_borrows)?
                }
                Err(_) => U256::ZERO,
            };
            total_utility = exp::add(total_utility, utility)?;
            utilities.push(utility);
        }

        let mut events = Vec::new();
        for &address in registry.all_markets() {
            if !self.is_rewarded(address) {
                for side in [RewardSide::Supply, RewardSide::Borrow] {
                    events.extend(self.set_speed(address, side, U256::ZERO, block));
                }
            }
        }

        let rewarded = self.rewarded_markets.clone();
        for (address, utility) in rewarded.into_iter().zip(utilities) {
            let new_speed = if total_utility.is_zero() {
                U256::ZERO
            } else {
                exp::div(exp::mul(self.reward_rate, utility)?, total_utility)?
            };
            for side in [RewardSide::Supply, RewardSide::Borrow] {
                events.extend(self.set_speed(address, side, new_speed, block));
            }
        }

        let mut i = 0;
        while i < self.rewarded_markets.len() {
            let address = self.rewarded_markets[i];
            if self.speed(address, RewardSide::Supply).is_zero() {
                self.rewarded_markets.swap_remove(i);
                debug!(market = %address, "Pruned zero-speed market from rewarded set");
                events.push(ProtocolEvent::MarketRewarded {
                    market: address,
                    rewarded: false,
                });
            } else {
                i += 1;
            }
        }

        Ok(events)
    }
}
