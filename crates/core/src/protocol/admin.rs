//! Administrative operations: listing, risk parameters, pauses, reserves
//! and reward configuration.

use alloy::primitives::{Address, U256};
use moneymarket_chain::{InterestRateModel, Token};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::Protocol;
use crate::error::{Action, Error, Result};
use crate::events::ProtocolEvent;
use crate::exp;
use crate::flywheel::RewardSide;
use crate::market::{Market, MAX_RESERVE_FACTOR_MANTISSA};

impl Protocol {
    fn ensure_admin(&self, caller: Address) -> Result<()> {
        self.state.registry.params.ensure_admin(caller)
    }

    // ---- Listing ----

    /// List `market`, backed by `underlying` and priced by `rate_model`.
    #[instrument(skip(self, market, underlying, rate_model), fields(market = %market.address, symbol = %market.symbol))]
    pub fn support_market(
        &mut self,
        caller: Address,
        market: Market,
        underlying: Arc<dyn Token>,
        rate_model: Arc<dyn InterestRateModel>,
    ) -> Result<()> {
        self.transaction(|p| {
            p.ensure_admin(caller)?;
            let address = market.address;
            let block_number = p.state.block_number;
            let event = p.state.registry.support_market(market, block_number)?;
            p.state.set_underlying(address, underlying);
            p.state.set_rate_model(address, rate_model);
            p.state.flywheel.init_market(address, block_number);
            p.emit(event);
            info!(market = %address, "Market listed");
            Ok(())
        })
    }

    /// Stop listing `market`. It leaves the rewarded set first.
    #[instrument(skip(self))]
    pub fn unlist_market(&mut self, caller: Address, market: Address) -> Result<()> {
        self.transaction(|p| {
            p.ensure_admin(caller)?;
            p.state.registry.listed(market)?;
            if p.state.flywheel.drop_market(market) {
                p.emit(ProtocolEvent::MarketRewarded {
                    market,
                    rewarded: false,
                });
                p.refresh_speeds()?;
            }
            let event = p.state.registry.unlist_market(market)?;
            p.emit(event);
            warn!(market = %market, "Market unlisted");
            Ok(())
        })
    }

    // ---- Risk parameters ----

    #[instrument(skip(self))]
    pub fn set_collateral_factor(&mut self, caller: Address, market: Address, collateral_factor: U256) -> Result<()> {
        self.transaction(|p| {
            p.ensure_admin(caller)?;
            let price = p.oracle.try_underlying_price(market);
            let event = p
                .state
                .registry
                .set_collateral_factor(market, collateral_factor, price)?;
            p.emit(event);
            Ok(())
        })
    }

    #[instrument(skip(self))]
    pub fn set_close_factor(&mut self, caller: Address, close_factor: U256) -> Result<()> {
        self.transaction(|p| {
            p.ensure_admin(caller)?;
            let event = p.state.registry.set_close_factor(close_factor)?;
            p.emit(event);
            Ok(())
        })
    }

    #[instrument(skip(self))]
    pub fn set_liquidation_incentive(&mut self, caller: Address, incentive: U256) -> Result<()> {
        self.transaction(|p| {
            p.ensure_admin(caller)?;
            let event = p.state.registry.set_liquidation_incentive(incentive)?;
            p.emit(event);
            Ok(())
        })
    }

    #[instrument(skip(self))]
    pub fn set_max_assets(&mut self, caller: Address, max_assets: usize) -> Result<()> {
        self.transaction(|p| {
            p.ensure_admin(caller)?;
            p.state.registry.set_max_assets(max_assets)
        })
    }

    /// Set borrow caps pairwise. A zero cap removes the limit.
    #[instrument(skip(self, markets, caps), fields(count = markets.len()))]
    pub fn set_market_borrow_caps(&mut self, caller: Address, markets: &[Address], caps: &[U256]) -> Result<()> {
        self.transaction(|p| {
            p.ensure_admin(caller)?;
            if markets.is_empty() || markets.len() != caps.len() {
                return Err(Error::BadInput);
            }
            for (&market, &cap) in markets.iter().zip(caps) {
                let event = p.state.registry.set_borrow_cap(market, cap)?;
                p.emit(event);
            }
            Ok(())
        })
    }

    // ---- Pausing ----

    #[instrument(skip(self))]
    pub fn set_pause_guardian(&mut self, caller: Address, guardian: Address) -> Result<()> {
        self.transaction(|p| {
            p.ensure_admin(caller)?;
            let event = p.state.registry.set_pause_guardian(guardian);
            p.emit(event);
            Ok(())
        })
    }

    fn set_market_paused(&mut self, caller: Address, market: Address, action: Action, paused: bool) -> Result<()> {
        self.transaction(|p| {
            p.state.registry.params.ensure_can_pause(caller, paused)?;
            let event = p.state.registry.set_market_paused(market, action, paused)?;
            p.emit(event);
            info!(market = %market, action = %action, paused, "Pause switch flipped");
            Ok(())
        })
    }

    fn set_global_paused(&mut self, caller: Address, action: Action, paused: bool) -> Result<()> {
        self.transaction(|p| {
            p.state.registry.params.ensure_can_pause(caller, paused)?;
            let event = p.state.registry.set_global_paused(action, paused)?;
            p.emit(event);
            info!(action = %action, paused, "Pause switch flipped");
            Ok(())
        })
    }

    pub fn set_mint_paused(&mut self, caller: Address, market: Address, paused: bool) -> Result<()> {
        self.set_market_paused(caller, market, Action::Mint, paused)
    }

    pub fn set_borrow_paused(&mut self, caller: Address, market: Address, paused: bool) -> Result<()> {
        self.set_market_paused(caller, market, Action::Borrow, paused)
    }

    pub fn set_transfer_paused(&mut self, caller: Address, paused: bool) -> Result<()> {
        self.set_global_paused(caller, Action::Transfer, paused)
    }

    pub fn set_seize_paused(&mut self, caller: Address, paused: bool) -> Result<()> {
        self.set_global_paused(caller, Action::Seize, paused)
    }

    pub fn set_protocol_paused(&mut self, caller: Address, paused: bool) -> Result<()> {
        self.set_global_paused(caller, Action::Protocol, paused)
    }

    // ---- Reserves and rate models ----

    #[instrument(skip(self))]
    pub fn set_reserve_factor(&mut self, caller: Address, market: Address, reserve_factor: U256) -> Result<()> {
        self.transaction(|p| {
            p.ensure_admin(caller)?;
            p.accrue(market)?;
            p.ensure_fresh(market)?;
            if reserve_factor > MAX_RESERVE_FACTOR_MANTISSA {
                return Err(Error::BadInput);
            }
            let entry = p.state.registry.market_mut(market)?;
            let old_reserve_factor = entry.reserve_factor_mantissa;
            entry.reserve_factor_mantissa = reserve_factor;
            p.emit(ProtocolEvent::NewReserveFactor {
                market,
                old_reserve_factor,
                new_reserve_factor: reserve_factor,
            });
            Ok(())
        })
    }

    /// Swap the rate model. Interest up to now accrues under the old one.
    #[instrument(skip(self, rate_model))]
    pub fn set_interest_rate_model(
        &mut self,
        caller: Address,
        market: Address,
        rate_model: Arc<dyn InterestRateModel>,
    ) -> Result<()> {
        self.transaction(|p| {
            p.ensure_admin(caller)?;
            p.accrue(market)?;
            p.ensure_fresh(market)?;
            p.state.set_rate_model(market, rate_model);
            info!(market = %market, "Interest rate model replaced");
            Ok(())
        })
    }

    /// Donate underlying to the market's reserves. Anyone may add.
    #[instrument(skip(self))]
    pub fn add_reserves(&mut self, benefactor: Address, market: Address, add_amount: U256) -> Result<()> {
        self.transaction(|p| {
            p.accrue(market)?;
            p.ensure_fresh(market)?;

            let entry = p.state.registry.market_mut(market)?;
            let new_total_reserves = exp::add(entry.total_reserves, add_amount)?;
            let cash = exp::add(entry.cash, add_amount)?;
            entry.total_reserves = new_total_reserves;
            entry.cash = cash;

            p.queue_transfer_in(market, benefactor, add_amount)?;
            p.emit(ProtocolEvent::ReservesAdded {
                market,
                benefactor,
                add_amount,
                new_total_reserves,
            });
            Ok(())
        })
    }

    /// Withdraw reserves to the admin.
    #[instrument(skip(self))]
    pub fn reduce_reserves(&mut self, caller: Address, market: Address, reduce_amount: U256) -> Result<()> {
        self.transaction(|p| {
            p.ensure_admin(caller)?;
            p.accrue(market)?;
            p.ensure_fresh(market)?;

            let entry = p.state.registry.market_mut(market)?;
            if entry.cash < reduce_amount {
                return Err(Error::TokenInsufficientCash);
            }
            if reduce_amount > entry.total_reserves {
                return Err(Error::BadInput);
            }
            let new_total_reserves = entry.total_reserves - reduce_amount;
            entry.total_reserves = new_total_reserves;
            entry.cash -= reduce_amount;

            p.queue_transfer_out(market, caller, reduce_amount)?;
            p.emit(ProtocolEvent::ReservesReduced {
                market,
                admin: caller,
                reduce_amount,
                new_total_reserves,
            });
            Ok(())
        })
    }

    // ---- Rewards ----

    /// Set the reward token emitted per block and redistribute it.
    #[instrument(skip(self))]
    pub fn set_reward_rate(&mut self, caller: Address, reward_rate: U256) -> Result<()> {
        self.transaction(|p| {
            p.ensure_admin(caller)?;
            let old_rate = p.state.flywheel.reward_rate;
            p.state.flywheel.reward_rate = reward_rate;
            p.emit(ProtocolEvent::NewRewardRate {
                old_rate,
                new_rate: reward_rate,
            });
            p.refresh_speeds()
        })
    }

    /// Add listed markets to the rewarded set. Markets already in it keep
    /// their indices.
    #[instrument(skip(self, markets), fields(count = markets.len()))]
    pub fn add_reward_markets(&mut self, caller: Address, markets: &[Address]) -> Result<()> {
        self.transaction(|p| {
            p.ensure_admin(caller)?;
            let block_number = p.state.block_number;
            for &market in markets {
                p.state.registry.listed(market)?;
                if p.state.flywheel.add_market(market, block_number) {
                    p.emit(ProtocolEvent::MarketRewarded {
                        market,
                        rewarded: true,
                    });
                }
            }
            p.refresh_speeds()
        })
    }

    #[instrument(skip(self))]
    pub fn drop_reward_market(&mut self, caller: Address, market: Address) -> Result<()> {
        self.transaction(|p| {
            p.ensure_admin(caller)?;
            if !p.state.flywheel.drop_market(market) {
                return Err(Error::BadInput);
            }
            p.emit(ProtocolEvent::MarketRewarded {
                market,
                rewarded: false,
            });
            p.refresh_speeds()
        })
    }

    /// Set both speeds of one market by hand. The next refresh recomputes
    /// them.
    #[instrument(skip(self))]
    pub fn set_reward_speeds(
        &mut self,
        caller: Address,
        market: Address,
        supply_speed: U256,
        borrow_speed: U256,
    ) -> Result<()> {
        self.transaction(|p| {
            p.ensure_admin(caller)?;
            p.state.registry.listed(market)?;
            let block_number = p.state.block_number;
            for (side, speed) in [(RewardSide::Supply, supply_speed), (RewardSide::Borrow, borrow_speed)] {
                p.state.update_reward_index(market, side)?;
                if let Some(event) = p.state.flywheel.set_speed(market, side, speed, block_number) {
                    p.emit(event);
                }
            }
            Ok(())
        })
    }

    /// Market that rewards are supplied to when collateralized. Its
    /// underlying must be the reward token.
    #[instrument(skip(self))]
    pub fn set_reward_market(&mut self, caller: Address, market: Address) -> Result<()> {
        self.transaction(|p| {
            p.ensure_admin(caller)?;
            p.state.registry.listed(market)?;
            let underlying = p.state.underlying(market)?;
            let reward_token = p.reward_token.as_ref().ok_or(Error::BadInput)?;
            if !Arc::ptr_eq(&underlying, reward_token) {
                return Err(Error::BadInput);
            }
            p.state.reward_market = Some(market);
            info!(market = %market, "Reward market set");
            Ok(())
        })
    }

    /// Pay reward tokens out of the engine's pool.
    #[instrument(skip(self))]
    pub fn grant_reward(&mut self, caller: Address, recipient: Address, amount: U256) -> Result<()> {
        self.transaction(|p| {
            p.ensure_admin(caller)?;
            if amount > p.reward_balance_available() {
                return Err(Error::InsufficientRewardBalance);
            }
            p.queue_reward_payout(recipient, amount, false)?;
            p.emit(ProtocolEvent::RewardGranted { recipient, amount });
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exp::EXP_SCALE;
    use crate::testkit::{mantissa, units, Fixture, BORROW_RATE_PER_BLOCK, REWARD_POOL, WALLET};
    use moneymarket_chain::{FixedRateModel, InMemoryToken};

    #[test]
    fn test_admin_only() {
        let mut f = Fixture::new();
        let alice = f.alice;
        assert_eq!(
            f.protocol.set_close_factor(alice, mantissa("0.4")),
            Err(Error::Unauthorized)
        );
        assert_eq!(
            f.protocol.set_collateral_factor(alice, f.usdc_market, mantissa("0.4")),
            Err(Error::Unauthorized)
        );
        assert_eq!(
            f.protocol.set_reward_rate(alice, units(1)),
            Err(Error::Unauthorized)
        );
        let model: Arc<dyn InterestRateModel> = Arc::new(FixedRateModel::new(U256::ZERO));
        assert_eq!(
            f.protocol
                .support_market(alice, Market::new(Address::with_last_byte(9), "vX", EXP_SCALE), Arc::new(InMemoryToken::new("X")), model),
            Err(Error::Unauthorized)
        );
    }

    #[test]
    fn test_market_listed_once() {
        let mut f = Fixture::new();
        let admin = f.admin;
        let model: Arc<dyn InterestRateModel> = Arc::new(FixedRateModel::new(BORROW_RATE_PER_BLOCK));
        let relist = Market::new(f.usdc_market, "vUSDC", EXP_SCALE);
        assert_eq!(
            f.protocol
                .support_market(admin, relist.clone(), f.usdc.clone(), model.clone()),
            Err(Error::MarketAlreadyListed)
        );

        f.protocol.unlist_market(admin, f.usdc_market).unwrap();
        assert!(!f.protocol.registry().is_listed(f.usdc_market));
        assert_eq!(
            f.protocol.support_market(admin, relist, f.usdc.clone(), model),
            Err(Error::MarketAlreadyListed)
        );
        assert_eq!(
            f.protocol.mint(f.alice, f.usdc_market, units(1)),
            Err(Error::MarketNotListed)
        );
    }

    #[test]
    fn test_unlisted_market_positions_can_unwind() {
        let mut f = Fixture::new();
        f.fund_and_borrow();
        let admin = f.admin;
        f.protocol.unlist_market(admin, f.usdc_market).unwrap();

        assert_eq!(
            f.protocol.borrow(f.alice, f.usdc_market, units(1)),
            Err(Error::MarketNotListed)
        );
        assert_eq!(
            f.protocol.repay_borrow(f.alice, f.usdc_market, units(100)).unwrap(),
            units(100)
        );
        f.protocol.redeem(f.bob, f.usdc_market, units(1_000)).unwrap();
        assert_eq!(f.protocol.balance_of(f.bob, f.usdc_market), units(99_000));

        f.push_alice_into_shortfall();
        let result = f
            .protocol
            .liquidate_borrow(f.carol, f.alice, f.usdc_market, units(1_000), f.eth_market)
            .unwrap();
        assert!(!result.seize_tokens.is_zero());
        assert_eq!(f.protocol.balance_of(f.carol, f.eth_market), result.seize_tokens);

        f.protocol.repay_borrow(f.alice, f.usdc_market, U256::MAX).unwrap();
        assert!(f.protocol.borrow_balance_stored(f.alice, f.usdc_market).unwrap().is_zero());
        f.protocol.exit_market(f.alice, f.usdc_market).unwrap();
        assert!(!f.protocol.assets_in(f.alice).contains(&f.usdc_market));
    }

    #[test]
    fn test_unlist_drops_reward_market() {
        let mut f = Fixture::new();
        f.fund_and_borrow();
        f.enable_rewards(units(1_000));
        let admin = f.admin;

        f.protocol.unlist_market(admin, f.usdc_market).unwrap();
        assert!(f.protocol.flywheel().rewarded_markets().is_empty());
        assert_eq!(
            f.protocol.flywheel().speed(f.usdc_market, RewardSide::Supply),
            U256::ZERO
        );
        let market = f.protocol.market(f.usdc_market).unwrap();
        assert!(market.mint_paused && market.borrow_paused);
    }

    #[test]
    fn test_collateral_factor_bounds_and_price() {
        let mut f = Fixture::new();
        let admin = f.admin;
        assert_eq!(
            f.protocol.set_collateral_factor(admin, f.usdc_market, mantissa("0.91")),
            Err(Error::InvalidCollateralFactor)
        );
        f.oracle.disable(f.usdc_market);
        assert_eq!(
            f.protocol.set_collateral_factor(admin, f.usdc_market, mantissa("0.6")),
            Err(Error::PriceError)
        );
        // Zero needs no price
        f.protocol
            .set_collateral_factor(admin, f.usdc_market, U256::ZERO)
            .unwrap();
        assert_eq!(
            f.protocol.market(f.usdc_market).unwrap().collateral_factor_mantissa,
            U256::ZERO
        );
    }

    #[test]
    fn test_close_factor_and_incentive_bounds() {
        let mut f = Fixture::new();
        let admin = f.admin;
        assert_eq!(
            f.protocol.set_close_factor(admin, mantissa("0.01")),
            Err(Error::InvalidCloseFactor)
        );
        assert_eq!(
            f.protocol.set_close_factor(admin, mantissa("0.95")),
            Err(Error::InvalidCloseFactor)
        );
        f.protocol.set_close_factor(admin, mantissa("0.9")).unwrap();

        assert_eq!(
            f.protocol.set_liquidation_incentive(admin, mantissa("0.99")),
            Err(Error::InvalidLiquidationIncentive)
        );
        assert_eq!(
            f.protocol.set_liquidation_incentive(admin, mantissa("1.51")),
            Err(Error::InvalidLiquidationIncentive)
        );
        f.protocol.set_liquidation_incentive(admin, mantissa("1.5")).unwrap();
        assert_eq!(
            f.protocol.registry().params.liquidation_incentive_mantissa,
            mantissa("1.5")
        );
    }

    #[test]
    fn test_borrow_caps_need_matching_lengths() {
        let mut f = Fixture::new();
        let admin = f.admin;
        assert_eq!(
            f.protocol
                .set_market_borrow_caps(admin, &[f.usdc_market, f.eth_market], &[units(1)]),
            Err(Error::BadInput)
        );
        assert_eq!(
            f.protocol.set_market_borrow_caps(admin, &[], &[]),
            Err(Error::BadInput)
        );
    }

    #[test]
    fn test_pause_guardian_can_only_pause() {
        let mut f = Fixture::new();
        let (admin, guardian) = (f.admin, f.carol);
        assert_eq!(
            f.protocol.set_protocol_paused(guardian, true),
            Err(Error::Unauthorized)
        );

        f.protocol.set_pause_guardian(admin, guardian).unwrap();
        f.protocol.set_protocol_paused(guardian, true).unwrap();
        assert_eq!(
            f.protocol.mint(f.alice, f.usdc_market, units(1)),
            Err(Error::ProtocolPaused(Action::Protocol))
        );
        assert_eq!(
            f.protocol.set_protocol_paused(guardian, false),
            Err(Error::Unauthorized)
        );
        f.protocol.set_protocol_paused(admin, false).unwrap();
        f.protocol.mint(f.alice, f.usdc_market, units(1)).unwrap();

        f.protocol.set_borrow_paused(guardian, f.usdc_market, true).unwrap();
        assert!(f.protocol.market(f.usdc_market).unwrap().borrow_paused);
    }

    #[test]
    fn test_reserve_factor_bounds() {
        let mut f = Fixture::new();
        let admin = f.admin;
        assert_eq!(
            f.protocol
                .set_reserve_factor(admin, f.usdc_market, EXP_SCALE + U256::from(1u64)),
            Err(Error::BadInput)
        );
        f.protocol
            .set_reserve_factor(admin, f.usdc_market, mantissa("0.2"))
            .unwrap();
        assert!(matches!(
            f.protocol.events().last(),
            Some(ProtocolEvent::NewReserveFactor { new_reserve_factor, .. })
                if *new_reserve_factor == mantissa("0.2")
        ));
    }

    #[test]
    fn test_reserves_accrue_and_are_reduced() {
        let mut f = Fixture::new();
        let admin = f.admin;
        f.fund_and_borrow();
        // 5_000 * 1e-6 * 100_000 blocks = 500 interest, 50 to reserves
        f.protocol.advance_blocks(100_000).unwrap();
        f.protocol.accrue_interest(f.usdc_market).unwrap();
        assert_eq!(
            f.protocol.market(f.usdc_market).unwrap().total_reserves,
            units(50)
        );

        f.protocol.add_reserves(f.carol, f.usdc_market, units(10)).unwrap();
        assert_eq!(
            f.protocol.market(f.usdc_market).unwrap().total_reserves,
            units(60)
        );

        assert_eq!(
            f.protocol.reduce_reserves(admin, f.usdc_market, units(61)),
            Err(Error::BadInput)
        );
        f.protocol.reduce_reserves(admin, f.usdc_market, units(60)).unwrap();
        let market = f.protocol.market(f.usdc_market).unwrap();
        assert_eq!(market.total_reserves, U256::ZERO);
        assert_eq!(market.cash, units(95_000 + 10 - 60));
        assert_eq!(f.usdc.balance_of(admin), units(60));
        assert_eq!(f.usdc.balance_of(f.carol), units(WALLET - 10));
    }

    #[test]
    fn test_interest_rate_model_swap_accrues_first() {
        let mut f = Fixture::new();
        let admin = f.admin;
        f.fund_and_borrow();
        f.protocol.advance_blocks(1_000).unwrap();

        let zero: Arc<dyn InterestRateModel> = Arc::new(FixedRateModel::new(U256::ZERO));
        f.protocol
            .set_interest_rate_model(admin, f.usdc_market, zero)
            .unwrap();
        assert_eq!(
            f.protocol.market(f.usdc_market).unwrap().total_borrows,
            units(5_005)
        );

        f.protocol.advance_blocks(1_000).unwrap();
        f.protocol.accrue_interest(f.usdc_market).unwrap();
        assert_eq!(
            f.protocol.market(f.usdc_market).unwrap().total_borrows,
            units(5_005)
        );
    }

    #[test]
    fn test_absurd_borrow_rate_aborts_accrual() {
        let mut f = Fixture::new();
        let admin = f.admin;
        f.fund_and_borrow();
        let absurd: Arc<dyn InterestRateModel> = Arc::new(FixedRateModel::new(U256::from(5_000_000_000_001u64)));
        f.protocol
            .set_interest_rate_model(admin, f.usdc_market, absurd)
            .unwrap();
        f.protocol.advance_blocks(1).unwrap();

        let err = f.protocol.accrue_interest(f.usdc_market).unwrap_err();
        assert!(matches!(err, Error::BorrowRateAbsurdlyHigh(_)));
        assert!(err.is_abort());
        assert_eq!(
            f.protocol.borrow(f.alice, f.usdc_market, units(1)).unwrap_err(),
            err
        );
    }

    #[test]
    fn test_reward_market_must_hold_reward_token() {
        let mut f = Fixture::new();
        let admin = f.admin;
        assert_eq!(
            f.protocol.set_reward_market(admin, f.usdc_market),
            Err(Error::BadInput)
        );
        f.protocol.set_reward_market(admin, f.xvs_market).unwrap();
        assert_eq!(f.protocol.state().reward_market, Some(f.xvs_market));
    }

    #[test]
    fn test_reward_market_set_management() {
        let mut f = Fixture::new();
        let admin = f.admin;
        f.fund_and_borrow();
        f.enable_rewards(units(1_000));

        // Adding again keeps the stored index
        f.protocol.advance_blocks(10).unwrap();
        f.protocol.refresh_reward_speeds().unwrap();
        let index = f
            .protocol
            .flywheel()
            .state(f.usdc_market, RewardSide::Supply)
            .unwrap()
            .index;
        f.protocol.add_reward_markets(admin, &[f.usdc_market]).unwrap();
        assert_eq!(
            f.protocol
                .flywheel()
                .state(f.usdc_market, RewardSide::Supply)
                .unwrap()
                .index,
            index
        );

        f.protocol.drop_reward_market(admin, f.usdc_market).unwrap();
        assert!(f.protocol.flywheel().rewarded_markets().is_empty());
        assert_eq!(
            f.protocol.drop_reward_market(admin, f.usdc_market),
            Err(Error::BadInput)
        );
    }

    #[test]
    fn test_manual_reward_speeds() {
        let mut f = Fixture::new();
        let admin = f.admin;
        f.protocol
            .set_reward_speeds(admin, f.eth_market, units(7), units(3))
            .unwrap();
        assert_eq!(f.protocol.flywheel().speed(f.eth_market, RewardSide::Supply), units(7));
        assert_eq!(f.protocol.flywheel().speed(f.eth_market, RewardSide::Borrow), units(3));
        let updates = f
            .protocol
            .events()
            .iter()
            .filter(|e| matches!(e, ProtocolEvent::RewardSpeedUpdated { .. }))
            .count();
        assert_eq!(updates, 2);
    }

    #[test]
    fn test_grant_reward() {
        let mut f = Fixture::new();
        let admin = f.admin;
        f.protocol.grant_reward(admin, f.carol, units(1_000)).unwrap();
        assert_eq!(f.xvs.balance_of(f.carol), units(WALLET + 1_000));
        assert_eq!(
            f.protocol.grant_reward(admin, f.carol, units(REWARD_POOL)),
            Err(Error::InsufficientRewardBalance)
        );
    }
}
