//! Price oracle abstraction.
//!
//! The risk engine never fetches prices itself; it asks a [`PriceOracle`] for
//! the price of a market's underlying asset every time it needs one. Prices
//! are never cached by the engine because they can move between calls.
//!
//! # Price scale
//!
//! Prices are mantissas scaled so that `amount * price / 1e18` is the value of
//! `amount` underlying units in the common unit of account. An asset with 18
//! decimals worth one unit of account has price `1e18`; an asset with 6
//! decimals worth the same has price `1e30`.
//!
//! # Example
//!
//! ```rust,ignore
//! use moneymarket_chain::oracle::{PriceOracle, SimplePriceOracle};
//!
//! let oracle = SimplePriceOracle::new();
//! oracle.set_underlying_price(market, U256::from(10u64).pow(U256::from(18)));
//! let price = oracle.underlying_price(market)?;
//! ```

mod simple;

pub use simple::{PriceEntry, SimplePriceOracle};

use alloy::primitives::{Address, U256};
use std::fmt::Debug;
use thiserror::Error;

/// Errors surfaced by an oracle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    /// No price has been published for the market.
    #[error("price unavailable for market {0}")]
    Unavailable(Address),

    /// The feed for the market has been switched off.
    #[error("price feed disabled for market {0}")]
    Disabled(Address),
}

/// Core trait for price lookups.
///
/// A returned price of zero is a valid answer from the oracle's point of
/// view; the engine treats it as a price error.
pub trait PriceOracle: Send + Sync + Debug {
    /// Price of the underlying asset of `market` (1e18 mantissa).
    fn underlying_price(&self, market: Address) -> Result<U256, OracleError>;

    /// Price lookup collapsing every failure mode into `None`.
    fn try_underlying_price(&self, market: Address) -> Option<U256> {
        self.underlying_price(market).ok().filter(|price| !price.is_zero())
    }
}
