//! Host-chain collaborators for the money-market engine.
//!
//! This crate provides:
//! - Price oracle interface and an admin-posted oracle
//! - Interest rate model interface with white-paper, jump and fixed models
//! - ERC20-style token interface and an in-memory ledger
//!
//! The engine in `moneymarket-core` depends only on the traits; the concrete
//! types back the binary and the test suites.

pub mod oracle;
pub mod rate_model;
pub mod token;

pub use oracle::{OracleError, PriceEntry, PriceOracle, SimplePriceOracle};
pub use rate_model::{
    utilization_rate, FixedRateModel, InterestRateModel, JumpRateModel, RateModelError,
    WhitePaperInterestRateModel, BLOCKS_PER_YEAR,
};
pub use token::{InMemoryToken, Token, TokenError};
