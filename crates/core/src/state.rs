//! Engine storage.
//!
//! Everything a transaction may change lives in [`ProtocolState`], so a
//! clone of it is a complete checkpoint.

use alloy::primitives::Address;
use moneymarket_chain::{InterestRateModel, Token};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::events::ProtocolEvent;
use crate::flywheel::{RewardFlywheel, RewardSide};
use crate::registry::MarketRegistry;

#[derive(Debug, Clone)]
pub struct ProtocolState {
    pub block_number: u64,
    pub registry: MarketRegistry,
    pub flywheel: RewardFlywheel,
    /// Market the reward token is supplied to when collateralizing rewards
    pub reward_market: Option<Address>,
    rate_models: HashMap<Address, Arc<dyn InterestRateModel>>,
    underlyings: HashMap<Address, Arc<dyn Token>>,
}

impl ProtocolState {
    pub fn new(admin: Address, block_number: u64, flywheel: RewardFlywheel) -> Self {
        Self {
            block_number,
            registry: MarketRegistry::new(admin),
            flywheel,
            reward_market: None,
            rate_models: HashMap::new(),
            underlyings: HashMap::new(),
        }
    }

    pub fn rate_model(&self, market: Address) -> Result<Arc<dyn InterestRateModel>> {
        self.rate_models
            .get(&market)
            .cloned()
            .ok_or(Error::MarketNotListed)
    }

    pub(crate) fn set_rate_model(&mut self, market: Address, model: Arc<dyn InterestRateModel>) {
        self.rate_models.insert(market, model);
    }

    pub fn underlying(&self, market: Address) -> Result<Arc<dyn Token>> {
        self.underlyings
            .get(&market)
            .cloned()
            .ok_or(Error::MarketNotListed)
    }

    pub(crate) fn set_underlying(&mut self, market: Address, token: Arc<dyn Token>) {
        self.underlyings.insert(market, token);
    }

    /// Bring one reward index of `market` up to the current block.
    pub fn update_reward_index(&mut self, market: Address, side: RewardSide) -> Result<()> {
        let entry = self.registry.market(market).ok_or(Error::MarketNotListed)?;
        self.flywheel.update_index(entry, side, self.block_number)?;
        Ok(())
    }

    /// Credit `account` on one reward side of `market` at the stored index.
    pub fn distribute_reward(
        &mut self,
        market: Address,
        side: RewardSide,
        account: Address,
    ) -> Result<ProtocolEvent> {
        let entry = self.registry.market(market).ok_or(Error::MarketNotListed)?;
        Ok(self.flywheel.distribute(entry, side, account)?)
    }
}
