//! Market registry.
//!
//! Holds every market ever listed, the registry-wide risk parameters and
//! the set of markets each account has entered. Setters validate bounds and
//! return the event describing the change; authorization is checked through
//! [`RiskParameters`].

use alloy::primitives::{Address, U256};
use smallvec::SmallVec;
use std::collections::HashMap;
use tracing::debug;

use crate::error::{Action, Error, Result};
use crate::events::ProtocolEvent;
use crate::exp::EXP_SCALE;
use crate::market::Market;

/// Collateral factors above 0.9 are refused.
pub const COLLATERAL_FACTOR_MAX_MANTISSA: U256 =
    U256::from_limbs([900_000_000_000_000_000u64, 0, 0, 0]);

/// 0.05
pub const CLOSE_FACTOR_MIN_MANTISSA: U256 = U256::from_limbs([50_000_000_000_000_000u64, 0, 0, 0]);

/// 0.9
pub const CLOSE_FACTOR_MAX_MANTISSA: U256 = U256::from_limbs([900_000_000_000_000_000u64, 0, 0, 0]);

/// 1.0
pub const LIQUIDATION_INCENTIVE_MIN_MANTISSA: U256 = EXP_SCALE;

/// 1.5
pub const LIQUIDATION_INCENTIVE_MAX_MANTISSA: U256 =
    U256::from_limbs([1_500_000_000_000_000_000u64, 0, 0, 0]);

/// Markets an account may have entered at once unless configured otherwise.
pub const DEFAULT_MAX_ASSETS: usize = 20;

/// Registry-wide risk configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskParameters {
    pub admin: Address,
    pub pause_guardian: Address,
    pub close_factor_mantissa: U256,
    pub liquidation_incentive_mantissa: U256,
    pub max_assets: usize,
    pub transfer_paused: bool,
    pub seize_paused: bool,
    pub protocol_paused: bool,
}

impl RiskParameters {
    pub fn new(admin: Address) -> Self {
        Self {
            admin,
            pause_guardian: Address::ZERO,
            close_factor_mantissa: EXP_SCALE / U256::from(2u64),
            liquidation_incentive_mantissa: EXP_SCALE,
            max_assets: DEFAULT_MAX_ASSETS,
            transfer_paused: false,
            seize_paused: false,
            protocol_paused: false,
        }
    }

    pub fn ensure_admin(&self, caller: Address) -> Result<()> {
        if caller != self.admin {
            return Err(Error::Unauthorized);
        }
        Ok(())
    }

    /// Admin may flip any pause switch; the guardian may only switch on.
    pub fn ensure_can_pause(&self, caller: Address, paused: bool) -> Result<()> {
        if caller == self.admin {
            return Ok(());
        }
        if paused && caller == self.pause_guardian && !self.pause_guardian.is_zero() {
            return Ok(());
        }
        Err(Error::Unauthorized)
    }
}

/// Listing state and account membership.
#[derive(Debug, Clone)]
pub struct MarketRegistry {
    markets: HashMap<Address, Market>,
    /// Listing order
    all_markets: Vec<Address>,
    account_assets: HashMap<Address, SmallVec<[Address; 4]>>,
    pub params: RiskParameters,
}

impl MarketRegistry {
    pub fn new(admin: Address) -> Self {
        Self {
            markets: HashMap::new(),
            all_markets: Vec::new(),
            account_assets: HashMap::new(),
            params: RiskParameters::new(admin),
        }
    }

    /// Any market ever listed, including unlisted ones.
    pub fn market(&self, market: Address) -> Option<&Market> {
        self.markets.get(&market)
    }

    /// A market that was listed at some point. Positions in an unlisted
    /// market can still be repaid, redeemed and liquidated.
    pub fn known(&self, market: Address) -> Result<&Market> {
        self.markets.get(&market).ok_or(Error::MarketNotListed)
    }

    pub(crate) fn market_mut(&mut self, market: Address) -> Result<&mut Market> {
        self.markets.get_mut(&market).ok_or(Error::MarketNotListed)
    }

    /// A currently listed market.
    pub fn listed(&self, market: Address) -> Result<&Market> {
        self.markets
            .get(&market)
            .filter(|m| m.listed)
            .ok_or(Error::MarketNotListed)
    }

    pub(crate) fn listed_mut(&mut self, market: Address) -> Result<&mut Market> {
        self.markets
            .get_mut(&market)
            .filter(|m| m.listed)
            .ok_or(Error::MarketNotListed)
    }

    pub fn is_listed(&self, market: Address) -> bool {
        self.listed(market).is_ok()
    }

    /// Every market ever listed, in listing order.
    pub fn all_markets(&self) -> &[Address] {
        &self.all_markets
    }

    pub fn listed_markets(&self) -> impl Iterator<Item = &Market> {
        self.all_markets
            .iter()
            .filter_map(|addr| self.markets.get(addr))
            .filter(|m| m.listed)
    }

    /// Markets the account has entered, in entry order (modulo exits).
    pub fn assets_in(&self, account: Address) -> &[Address] {
        self.account_assets
            .get(&account)
            .map(|assets| assets.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_member(&self, account: Address, market: Address) -> bool {
        self.assets_in(account).contains(&market)
    }

    /// List a market. An address can be listed once; unlisting does not
    /// free it.
    pub fn support_market(&mut self, mut market: Market, block_number: u64) -> Result<ProtocolEvent> {
        if self.markets.contains_key(&market.address) {
            return Err(Error::MarketAlreadyListed);
        }
        let address = market.address;
        market.listed = true;
        market.accrual_block_number = block_number;
        market.borrow_index = EXP_SCALE;

        debug!(market = %address, symbol = %market.symbol, "Market listed");
        self.markets.insert(address, market);
        self.all_markets.push(address);
        Ok(ProtocolEvent::MarketListed { market: address })
    }

    /// Soft delete: the market stays in storage but stops being listed,
    /// and mint and borrow are paused.
    pub fn unlist_market(&mut self, market: Address) -> Result<ProtocolEvent> {
        let entry = self.listed_mut(market)?;
        entry.listed = false;
        entry.mint_paused = true;
        entry.borrow_paused = true;
        Ok(ProtocolEvent::MarketUnlisted { market })
    }

    /// `price` is the current oracle price; a non-zero factor needs one.
    pub fn set_collateral_factor(
        &mut self,
        market: Address,
        new_collateral_factor: U256,
        price: Option<U256>,
    ) -> Result<ProtocolEvent> {
        let entry = self.listed_mut(market)?;
        if new_collateral_factor > COLLATERAL_FACTOR_MAX_MANTISSA {
            return Err(Error::InvalidCollateralFactor);
        }
        if !new_collateral_factor.is_zero() && price.map_or(true, |p| p.is_zero()) {
            return Err(Error::PriceError);
        }
        let old_collateral_factor = entry.collateral_factor_mantissa;
        entry.collateral_factor_mantissa = new_collateral_factor;
        Ok(ProtocolEvent::NewCollateralFactor {
            market,
            old_collateral_factor,
            new_collateral_factor,
        })
    }

    pub fn set_close_factor(&mut self, new_close_factor: U256) -> Result<ProtocolEvent> {
        if new_close_factor < CLOSE_FACTOR_MIN_MANTISSA || new_close_factor > CLOSE_FACTOR_MAX_MANTISSA {
            return Err(Error::InvalidCloseFactor);
        }
        let old_close_factor = self.params.close_factor_mantissa;
        self.params.close_factor_mantissa = new_close_factor;
        Ok(ProtocolEvent::NewCloseFactor {
            old_close_factor,
            new_close_factor,
        })
    }

    pub fn set_liquidation_incentive(&mut self, new_incentive: U256) -> Result<ProtocolEvent> {
        if new_incentive < LIQUIDATION_INCENTIVE_MIN_MANTISSA
            || new_incentive > LIQUIDATION_INCENTIVE_MAX_MANTISSA
        {
            return Err(Error::InvalidLiquidationIncentive);
        }
        let old_incentive = self.params.liquidation_incentive_mantissa;
        self.params.liquidation_incentive_mantissa = new_incentive;
        Ok(ProtocolEvent::NewLiquidationIncentive {
            old_incentive,
            new_incentive,
        })
    }

    pub fn set_max_assets(&mut self, max_assets: usize) -> Result<()> {
        if max_assets == 0 {
            return Err(Error::BadInput);
        }
        self.params.max_assets = max_assets;
        Ok(())
    }

    pub fn set_borrow_cap(&mut self, market: Address, new_borrow_cap: U256) -> Result<ProtocolEvent> {
        self.listed_mut(market)?.borrow_cap = new_borrow_cap;
        Ok(ProtocolEvent::NewBorrowCap {
            market,
            new_borrow_cap,
        })
    }

    pub fn set_pause_guardian(&mut self, new_guardian: Address) -> ProtocolEvent {
        let old_guardian = self.params.pause_guardian;
        self.params.pause_guardian = new_guardian;
        ProtocolEvent::NewPauseGuardian {
            old_guardian,
            new_guardian,
        }
    }

    /// Per-market switches cover mint and borrow.
    pub fn set_market_paused(&mut self, market: Address, action: Action, paused: bool) -> Result<ProtocolEvent> {
        let entry = self.listed_mut(market)?;
        match action {
            Action::Mint => entry.mint_paused = paused,
            Action::Borrow => entry.borrow_paused = paused,
            _ => return Err(Error::BadInput),
        }
        Ok(ProtocolEvent::ActionPaused {
            market: Some(market),
            action,
            paused,
        })
    }

    /// Global switches cover transfer, seize and the whole protocol.
    pub fn set_global_paused(&mut self, action: Action, paused: bool) -> Result<ProtocolEvent> {
        match action {
            Action::Transfer => self.params.transfer_paused = paused,
            Action::Seize => self.params.seize_paused = paused,
            Action::Protocol => self.params.protocol_paused = paused,
            _ => return Err(Error::BadInput),
        }
        Ok(ProtocolEvent::ActionPaused {
            market: None,
            action,
            paused,
        })
    }

    /// Enter `market` on behalf of `account`. Entering twice is a no-op.
    pub fn add_to_market(&mut self, market: Address, account: Address) -> Result<Option<ProtocolEvent>> {
        self.listed(market)?;
        let max_assets = self.params.max_assets;
        let assets = self.account_assets.entry(account).or_default();
        if assets.contains(&market) {
            return Ok(None);
        }
        if assets.len() >= max_assets {
            return Err(Error::TooManyAssets);
        }
        assets.push(market);
        Ok(Some(ProtocolEvent::MarketEntered { market, account }))
    }

    /// Leave `market`. The last entered market takes its slot.
    pub fn remove_from_market(&mut self, market: Address, account: Address) -> Option<ProtocolEvent> {
        let assets = self.account_assets.get_mut(&account)?;
        let position = assets.iter().position(|m| *m == market)?;
        assets.swap_remove(position);
        if assets.is_empty() {
            self.account_assets.remove(&account);
        }
        Some(ProtocolEvent::MarketExited { market, account })
    }
}
