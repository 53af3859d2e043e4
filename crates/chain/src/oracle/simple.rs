//! Admin-posted price oracle.

use super::{OracleError, PriceOracle};
use alloy::primitives::{Address, U256};
use dashmap::DashMap;
use tracing::debug;

/// Stored price for one market.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceEntry {
    /// Price mantissa
    pub price: U256,
    /// Whether the feed currently answers
    pub enabled: bool,
}

/// Oracle whose prices are posted directly.
///
/// Prices live in a [`DashMap`] so the oracle can be shared behind an `Arc`
/// by the engine and whoever posts prices.
#[derive(Default)]
pub struct SimplePriceOracle {
    prices: DashMap<Address, PriceEntry>,
}

impl std::fmt::Debug for SimplePriceOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimplePriceOracle")
            .field("feeds", &self.prices.len())
            .finish()
    }
}

impl SimplePriceOracle {
    /// Create an oracle with no prices.
    pub fn new() -> Self {
        Self::default()
    }

    /// Post a price for a market's underlying, re-enabling its feed.
    pub fn set_underlying_price(&self, market: Address, price: U256) {
        debug!(market = %market, price = %price, "Posting underlying price");
        self.prices.insert(market, PriceEntry { price, enabled: true });
    }

    /// Switch a feed off without forgetting its last price.
    pub fn disable(&self, market: Address) {
        if let Some(mut entry) = self.prices.get_mut(&market) {
            entry.enabled = false;
        }
    }

    /// Forget a market's price entirely.
    pub fn remove(&self, market: Address) -> Option<PriceEntry> {
        self.prices.remove(&market).map(|(_, entry)| entry)
    }

    /// Raw stored entry, enabled or not.
    pub fn entry(&self, market: Address) -> Option<PriceEntry> {
        self.prices.get(&market).map(|entry| *entry)
    }
}

impl PriceOracle for SimplePriceOracle {
    fn underlying_price(&self, market: Address) -> Result<U256, OracleError> {
        let entry = self
            .prices
            .get(&market)
            .ok_or(OracleError::Unavailable(market))?;
        if !entry.enabled {
            return Err(OracleError::Disabled(market));
        }
        Ok(entry.price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_posted_price_is_returned() {
        let oracle = SimplePriceOracle::new();
        let market = Address::with_last_byte(1);
        oracle.set_underlying_price(market, U256::from(42u64));
        assert_eq!(oracle.underlying_price(market), Ok(U256::from(42u64)));
    }

    #[test]
    fn test_missing_price_is_unavailable() {
        let oracle = SimplePriceOracle::new();
        let market = Address::with_last_byte(2);
        assert_eq!(
            oracle.underlying_price(market),
            Err(OracleError::Unavailable(market))
        );
    }

    #[test]
    fn test_disable_and_repost() {
        let oracle = SimplePriceOracle::new();
        let market = Address::with_last_byte(3);
        oracle.set_underlying_price(market, U256::from(7u64));
        oracle.disable(market);
        assert_eq!(
            oracle.underlying_price(market),
            Err(OracleError::Disabled(market))
        );
        assert_eq!(oracle.entry(market).map(|e| e.price), Some(U256::from(7u64)));

        oracle.set_underlying_price(market, U256::from(8u64));
        assert_eq!(oracle.underlying_price(market), Ok(U256::from(8u64)));
    }
}
