//! Money-market risk engine.
//!
//! This crate provides the core lending protocol logic:
//! - Fixed-point mantissa arithmetic
//! - Per-market interest accrual with borrow and reserve tracking
//! - Account liquidity across entered markets, including hypothetical deltas
//! - Liquidation seize math and close-factor limits
//! - Reward flywheel with utility-weighted speeds
//! - Market registry with collateral factors, pauses and borrow caps
//! - A transactional protocol state machine and a treasury-splitting liquidator
//!
//! Every public operation either applies fully or leaves state and events
//! untouched.

pub mod comptroller;
pub mod config;
pub mod error;
pub mod events;
pub mod exp;
pub mod flywheel;
pub mod liquidation;
mod liquidator;
pub mod liquidity;
pub mod market;
mod protocol;
pub mod registry;
mod state;

#[cfg(test)]
mod testkit;

pub use comptroller::{Comptroller, RiskContext, RiskPolicy};
pub use config::{load_deployment, load_deployment_from_env, DeploymentConfig, Genesis, RiskConfig};
pub use error::{Action, Error, MathError, Result, Severity};
pub use events::ProtocolEvent;
pub use flywheel::{RewardFlywheel, RewardSide};
pub use liquidator::{LiquidationOutcome, LiquidationRequest, Liquidator};
pub use liquidity::AccountLiquidity;
pub use market::{AccountSnapshot, Market};
pub use protocol::{ClaimScope, LiquidationResult, Protocol};
pub use registry::{MarketRegistry, RiskParameters};
pub use state::ProtocolState;
