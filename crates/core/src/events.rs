//! Protocol events.
//!
//! Every committed operation appends its events to the protocol log in
//! emission order. A rolled back operation leaves no events behind.
//! Each event carries the Solidity-style signature a log consumer would
//! filter on, and the keccak256 topic derived from it.

use alloy::primitives::{keccak256, Address, B256, U256};

use crate::error::Action;
use crate::flywheel::RewardSide;

/// Event emitted by the risk engine or one of its markets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolEvent {
    AccrueInterest {
        market: Address,
        cash_prior: U256,
        interest_accumulated: U256,
        borrow_index: U256,
        total_borrows: U256,
    },
    Mint {
        market: Address,
        minter: Address,
        mint_amount: U256,
        mint_tokens: U256,
    },
    Redeem {
        market: Address,
        redeemer: Address,
        redeem_amount: U256,
        redeem_tokens: U256,
    },
    Borrow {
        market: Address,
        borrower: Address,
        borrow_amount: U256,
        account_borrows: U256,
        total_borrows: U256,
    },
    RepayBorrow {
        market: Address,
        payer: Address,
        borrower: Address,
        repay_amount: U256,
        account_borrows: U256,
        total_borrows: U256,
    },
    LiquidateBorrow {
        market: Address,
        liquidator: Address,
        borrower: Address,
        repay_amount: U256,
        collateral_market: Address,
        seize_tokens: U256,
    },
    /// Market token movement. Mints come from and redeems go to the market
    /// address itself.
    Transfer {
        market: Address,
        from: Address,
        to: Address,
        amount: U256,
    },
    MarketListed {
        market: Address,
    },
    MarketUnlisted {
        market: Address,
    },
    MarketEntered {
        market: Address,
        account: Address,
    },
    MarketExited {
        market: Address,
        account: Address,
    },
    NewCollateralFactor {
        market: Address,
        old_collateral_factor: U256,
        new_collateral_factor: U256,
    },
    NewCloseFactor {
        old_close_factor: U256,
        new_close_factor: U256,
    },
    NewLiquidationIncentive {
        old_incentive: U256,
        new_incentive: U256,
    },
    NewBorrowCap {
        market: Address,
        new_borrow_cap: U256,
    },
    /// `market` is `None` for global pause switches.
    ActionPaused {
        market: Option<Address>,
        action: Action,
        paused: bool,
    },
    NewReserveFactor {
        market: Address,
        old_reserve_factor: U256,
        new_reserve_factor: U256,
    },
    ReservesAdded {
        market: Address,
        benefactor: Address,
        add_amount: U256,
        new_total_reserves: U256,
    },
    ReservesReduced {
        market: Address,
        admin: Address,
        reduce_amount: U256,
        new_total_reserves: U256,
    },
    NewPauseGuardian {
        old_guardian: Address,
        new_guardian: Address,
    },
    DistributedSupplierReward {
        market: Address,
        supplier: Address,
        delta: U256,
        supply_index: U256,
    },
    DistributedBorrowerReward {
        market: Address,
        borrower: Address,
        delta: U256,
        borrow_index: U256,
    },
    RewardSpeedUpdated {
        market: Address,
        side: RewardSide,
        new_speed: U256,
    },
    NewRewardRate {
        old_rate: U256,
        new_rate: U256,
    },
    MarketRewarded {
        market: Address,
        rewarded: bool,
    },
    RewardGranted {
        recipient: Address,
        amount: U256,
    },
    RewardCollateralized {
        holder: Address,
        market: Address,
        amount: U256,
    },
    LiquidateBorrowedTokens {
        liquidator: Address,
        borrower: Address,
        repay_amount: U256,
        borrowed_market: Address,
        collateral_market: Address,
        seize_tokens_for_treasury: U256,
        seize_tokens_for_liquidator: U256,
    },
    NewTreasuryPercent {
        old_percent: U256,
        new_percent: U256,
    },
}

impl ProtocolEvent {
    /// Canonical event signature.
    pub fn signature(&self) -> &'static str {
        match self {
            Self::AccrueInterest { .. } => "AccrueInterest(uint256,uint256,uint256,uint256)",
            Self::Mint { .. } => "Mint(address,uint256,uint256)",
            Self::Redeem { .. } => "Redeem(address,uint256,uint256)",
            Self::Borrow { .. } => "Borrow(address,uint256,uint256,uint256)",
            Self::RepayBorrow { .. } => "RepayBorrow(address,address,uint256,uint256,uint256)",
            Self::LiquidateBorrow { .. } => {
                "LiquidateBorrow(address,address,uint256,address,uint256)"
            }
            Self::Transfer { .. } => "Transfer(address,address,uint256)",
            Self::MarketListed { .. } => "MarketListed(address)",
            Self::MarketUnlisted { .. } => "MarketUnlisted(address)",
            Self::MarketEntered { .. } => "MarketEntered(address,address)",
            Self::MarketExited { .. } => "MarketExited(address,address)",
            Self::NewCollateralFactor { .. } => "NewCollateralFactor(address,uint256,uint256)",
            Self::NewCloseFactor { .. } => "NewCloseFactor(uint256,uint256)",
            Self::NewLiquidationIncentive { .. } => "NewLiquidationIncentive(uint256,uint256)",
            Self::NewBorrowCap { .. } => "NewBorrowCap(address,uint256)",
            Self::ActionPaused { market: Some(_), .. } => "ActionPaused(address,string,bool)",
            Self::ActionPaused { market: None, .. } => "ActionPaused(string,bool)",
            Self::NewReserveFactor { .. } => "NewReserveFactor(uint256,uint256)",
            Self::ReservesAdded { .. } => "ReservesAdded(address,uint256,uint256)",
            Self::ReservesReduced { .. } => "ReservesReduced(address,uint256,uint256)",
            Self::NewPauseGuardian { .. } => "NewPauseGuardian(address,address)",
            Self::DistributedSupplierReward { .. } => {
                "DistributedSupplierReward(address,address,uint256,uint256)"
            }
            Self::DistributedBorrowerReward { .. } => {
                "DistributedBorrowerReward(address,address,uint256,uint256)"
            }
            Self::RewardSpeedUpdated { side: RewardSide::Supply, .. } => {
                "RewardSupplySpeedUpdated(address,uint256)"
            }
            Self::RewardSpeedUpdated { side: RewardSide::Borrow, .. } => {
                "RewardBorrowSpeedUpdated(address,uint256)"
            }
            Self::NewRewardRate { .. } => "NewRewardRate(uint256,uint256)",
            Self::MarketRewarded { .. } => "MarketRewarded(address,bool)",
            Self::RewardGranted { .. } => "RewardGranted(address,uint256)",
            Self::RewardCollateralized { .. } => "RewardCollateralized(address,address,uint256)",
            Self::LiquidateBorrowedTokens { .. } => {
                "LiquidateBorrowedTokens(address,address,uint256,address,address,uint256,uint256)"
            }
            Self::NewTreasuryPercent { .. } => "NewTreasuryPercent(uint256,uint256)",
        }
    }

    /// Keccak256 of the signature, as used for log filtering.
    pub fn topic(&self) -> B256 {
        keccak256(self.signature())
    }

    /// Short event name.
    pub fn name(&self) -> &'static str {
        let signature = self.signature();
        signature.split('(').next().unwrap_or(signature)
    }

    /// Market the event concerns, if any.
    pub fn market(&self) -> Option<Address> {
        match self {
            Self::AccrueInterest { market, .. }
            | Self::Mint { market, .. }
            | Self::Redeem { market, .. }
            | Self::Borrow { market, .. }
            | Self::RepayBorrow { market, .. }
            | Self::LiquidateBorrow { market, .. }
            | Self::Transfer { market, .. }
            | Self::MarketListed { market }
            | Self::MarketUnlisted { market }
            | Self::MarketEntered { market, .. }
            | Self::MarketExited { market, .. }
            | Self::NewCollateralFactor { market, .. }
            | Self::NewBorrowCap { market, .. }
            | Self::NewReserveFactor { market, .. }
            | Self::ReservesAdded { market, .. }
            | Self::ReservesReduced { market, .. }
            | Self::DistributedSupplierReward { market, .. }
            | Self::DistributedBorrowerReward { market, .. }
            | Self::RewardSpeedUpdated { market, .. }
            | Self::MarketRewarded { market, .. }
            | Self::RewardCollateralized { market, .. } => Some(*market),
            Self::LiquidateBorrowedTokens { collateral_market, .. } => Some(*collateral_market),
            Self::ActionPaused { market, .. } => *market,
            Self::NewCloseFactor { .. }
            | Self::NewLiquidationIncentive { .. }
            | Self::NewPauseGuardian { .. }
            | Self::NewRewardRate { .. }
            | Self::RewardGranted { .. }
            | Self::NewTreasuryPercent { .. } => None,
        }
    }
}
