//! Error taxonomy for the risk engine.
//!
//! Every failing operation returns exactly one [`Error`] and leaves no state
//! behind. [`Error::severity`] separates business-rule refusals from aborts
//! caused by arithmetic or collaborator failures.

use alloy::primitives::U256;
use moneymarket_chain::{RateModelError, TokenError};
use std::fmt;
use thiserror::Error;

/// Checked arithmetic failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum MathError {
    #[error("integer overflow")]
    IntegerOverflow,

    #[error("integer underflow")]
    IntegerUnderflow,

    #[error("division by zero")]
    DivisionByZero,
}

/// Pausable action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Mint,
    Borrow,
    Transfer,
    Seize,
    /// Every action at once
    Protocol,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mint => "mint",
            Self::Borrow => "borrow",
            Self::Transfer => "transfer",
            Self::Seize => "seize",
            Self::Protocol => "protocol",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an error ended the call. Both kinds roll back every state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// A business rule refused the operation.
    Rejection,
    /// Arithmetic or a collaborator failed mid-operation.
    Abort,
}

/// Engine error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("caller is not authorized")]
    Unauthorized,

    #[error("market is not listed")]
    MarketNotListed,

    #[error("market is already listed")]
    MarketAlreadyListed,

    #[error("market interest is not accrued to the current block")]
    MarketNotFresh,

    #[error("price unavailable or zero")]
    PriceError,

    #[error("math error: {0}")]
    Math(#[from] MathError),

    #[error("liquidator and borrower must differ")]
    InvalidAccountPair,

    #[error("close amount must be non-zero and bounded")]
    InvalidCloseAmountRequested,

    #[error("repay amount exceeds close factor")]
    TooMuchRepay,

    #[error("market has insufficient cash")]
    TokenInsufficientCash,

    #[error("market borrow cap reached")]
    BorrowCapExceeded,

    #[error("{0} is paused")]
    ProtocolPaused(Action),

    #[error("insufficient liquidity")]
    InsufficientLiquidity,

    #[error("account has no shortfall")]
    InsufficientShortfall,

    #[error("collateral factor out of bounds")]
    InvalidCollateralFactor,

    #[error("close factor out of bounds")]
    InvalidCloseFactor,

    #[error("liquidation incentive out of bounds")]
    InvalidLiquidationIncentive,

    #[error("bad input")]
    BadInput,

    #[error("too many assets entered")]
    TooManyAssets,

    #[error("account has a non-zero borrow balance")]
    NonzeroBorrowBalance,

    #[error("interest rate model failed: {0}")]
    InterestRateModel(RateModelError),

    #[error("borrow rate {0} per block is absurdly high")]
    BorrowRateAbsurdlyHigh(U256),

    #[error("inbound transfer failed: {0}")]
    TokenTransferInFailed(TokenError),

    #[error("outbound transfer failed: {0}")]
    TokenTransferOutFailed(TokenError),

    #[error("account in shortfall may only collateralize rewards")]
    RewardsCollateralOnly,

    #[error("no reward market configured")]
    RewardMarketNotConfigured,

    #[error("insufficient reward token balance")]
    InsufficientRewardBalance,

    #[error("block number cannot decrease")]
    BlockNumberDecreased,
}

impl Error {
    pub fn severity(&self) -> Severity {
        match self {
            Self::Math(_)
            | Self::BorrowRateAbsurdlyHigh(_)
            | Self::InterestRateModel(_)
            | Self::TokenTransferInFailed(_)
            | Self::TokenTransferOutFailed(_) => Severity::Abort,
            _ => Severity::Rejection,
        }
    }

    pub fn is_abort(&self) -> bool {
        self.severity() == Severity::Abort
    }
}

impl From<RateModelError> for Error {
    fn from(err: RateModelError) -> Self {
        Self::InterestRateModel(err)
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_split() {
        assert_eq!(Error::Unauthorized.severity(), Severity::Rejection);
        assert_eq!(Error::TokenInsufficientCash.severity(), Severity::Rejection);
        assert_eq!(
            Error::Math(MathError::IntegerOverflow).severity(),
            Severity::Abort
        );
        assert!(Error::BorrowRateAbsurdlyHigh(U256::from(1u64)).is_abort());
        assert!(Error::InterestRateModel(RateModelError::Arithmetic).is_abort());
    }

    #[test]
    fn test_math_error_converts() {
        let err: Error = MathError::DivisionByZero.into();
        assert_eq!(err, Error::Math(MathError::DivisionByZero));
        assert_eq!(err.to_string(), "math error: division by zero");
    }

    #[test]
    fn test_paused_display_names_action() {
        assert_eq!(Error::ProtocolPaused(Action::Borrow).to_string(), "borrow is paused");
    }
}
