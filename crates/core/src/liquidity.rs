//! Account liquidity.
//!
//! Sums the risk-adjusted value of an account's collateral against the value
//! of its borrows across every market it has entered, optionally with a
//! hypothetical redeem or borrow applied to one market. Prices are read
//! fresh on every call and the result is never cached.

use alloy::primitives::{Address, U256};
use moneymarket_chain::PriceOracle;
use tracing::trace;

use crate::error::{Error, Result};
use crate::exp;
use crate::registry::MarketRegistry;

/// Excess collateral or shortfall, never both.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccountLiquidity {
    pub liquidity: U256,
    pub shortfall: U256,
}

impl AccountLiquidity {
    pub fn has_shortfall(&self) -> bool {
        !self.shortfall.is_zero()
    }
}

/// A change to evaluate as if it had already happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hypothetical {
    pub market: Address,
    pub redeem_tokens: U256,
    pub borrow_amount: U256,
}

impl Hypothetical {
    pub fn redeem(market: Address, redeem_tokens: U256) -> Self {
        Self {
            market,
            redeem_tokens,
            borrow_amount: U256::ZERO,
        }
    }

    pub fn borrow(market: Address, borrow_amount: U256) -> Self {
        Self {
            market,
            redeem_tokens: U256::ZERO,
            borrow_amount,
        }
    }
}

/// Liquidity of `account` at current balances.
pub fn account_liquidity(
    registry: &MarketRegistry,
    oracle: &dyn PriceOracle,
    account: Address,
) -> Result<AccountLiquidity> {
    hypothetical_account_liquidity(registry, oracle, account, None)
}

/// Liquidity of `account` after an optional hypothetical change.
///
/// The hypothetical is only applied if its market is among the entered
/// ones. A redeem is added to the borrow side rather than subtracted from
/// collateral so the sum can never underflow.
pub fn hypothetical_account_liquidity(
    registry: &MarketRegistry,
    oracle: &dyn PriceOracle,
    account: Address,
    hypothetical: Option<Hypothetical>,
) -> Result<AccountLiquidity> {
    let mut sum_collateral = U256::ZERO;
    let mut sum_borrow_plus_effects = U256::ZERO;

    for &asset in registry.assets_in(account) {
        let market = registry.market(asset).ok_or(Error::MarketNotListed)?;
        let snapshot = market.account_snapshot(account)?;

        let price = oracle.try_underlying_price(asset).ok_or(Error::PriceError)?;

        let tokens_to_denom = exp::mul_exp3(
            market.collateral_factor_mantissa,
            snapshot.exchange_rate,
            price,
        )?;

        sum_collateral =
            exp::mul_scalar_truncate_add(tokens_to_denom, snapshot.supply_tokens, sum_collateral)?;
        sum_borrow_plus_effects =
            exp::mul_scalar_truncate_add(price, snapshot.borrow_balance, sum_borrow_plus_effects)?;

        if let Some(h) = hypothetical.filter(|h| h.market == asset) {
            sum_borrow_plus_effects =
                exp::mul_scalar_truncate_add(tokens_to_denom, h.redeem_tokens, sum_borrow_plus_effects)?;
            sum_borrow_plus_effects =
                exp::mul_scalar_truncate_add(price, h.borrow_amount, sum_borrow_plus_effects)?;
        }
    }

    trace!(
        account = %account,
        collateral = %sum_collateral,
        borrows = %sum_borrow_plus_effects,
        "Account liquidity computed"
    );

    if sum_collateral > sum_borrow_plus_effects {
        Ok(AccountLiquidity {
            liquidity: sum_collateral - sum_borrow_plus_effects,
            shortfall: U256::ZERO,
        })
    } else {
        Ok(AccountLiquidity {
            liquidity: U256::ZERO,
            shortfall: sum_borrow_plus_effects - sum_collateral,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exp::{parse_mantissa, EXP_SCALE};
    use crate::market::Market;
    use moneymarket_chain::SimplePriceOracle;

    fn exp_of(s: &str) -> U256 {
        parse_mantissa(s).unwrap()
    }

    fn setup() -> (MarketRegistry, SimplePriceOracle, Address, Address) {
        let admin = Address::with_last_byte(0xad);
        let usdc = Address::with_last_byte(1);
        let eth = Address::with_last_byte(2);

        let mut registry = MarketRegistry::new(admin);
        registry.support_market(Market::new(usdc, "vUSDC", EXP_SCALE), 1).unwrap();
        registry.support_market(Market::new(eth, "vETH", EXP_SCALE), 1).unwrap();

        let oracle = SimplePriceOracle::new();
        oracle.set_underlying_price(usdc, EXP_SCALE);
        oracle.set_underlying_price(eth, exp_of("2000"));

        registry.set_collateral_factor(usdc, exp_of("0.5"), Some(EXP_SCALE)).unwrap();
        registry.set_collateral_factor(eth, exp_of("0.75"), Some(exp_of("2000"))).unwrap();
        (registry, oracle, usdc, eth)
    }

    fn supply(registry: &mut MarketRegistry, market: Address, account: Address, tokens: u64) {
        let m = registry.market_mut(market).unwrap();
        m.position_mut(account).supply_tokens = U256::from(tokens);
        m.total_supply += U256::from(tokens);
        m.cash += U256::from(tokens);
    }

    fn borrow(registry: &mut MarketRegistry, market: Address, account: Address, amount: u64) {
        let m = registry.market_mut(market).unwrap();
        let index = m.borrow_index;
        let position = m.position_mut(account);
        position.principal = U256::from(amount);
        position.interest_index = index;
        m.total_borrows += U256::from(amount);
    }

    #[test]
    fn test_no_entered_markets_is_neutral() {
        let (registry, oracle, _, _) = setup();
        let alice = Address::with_last_byte(0xa1);
        assert_eq!(
            account_liquidity(&registry, &oracle, alice).unwrap(),
            AccountLiquidity::default()
        );
    }

    #[test]
    fn test_collateral_and_hypothetical_borrow() {
        let (mut registry, oracle, usdc, _) = setup();
        let alice = Address::with_last_byte(0xa1);
        supply(&mut registry, usdc, alice, 1_000_000);
        registry.add_to_market(usdc, alice).unwrap();

        let liquidity = account_liquidity(&registry, &oracle, alice).unwrap();
        assert_eq!(liquidity.liquidity, U256::from(500_000u64));
        assert_eq!(liquidity.shortfall, U256::ZERO);

        let after_borrow = hypothetical_account_liquidity(
            &registry,
            &oracle,
            alice,
            Some(Hypothetical::borrow(usdc, U256::from(1_000_000u64))),
        )
        .unwrap();
        assert_eq!(after_borrow.liquidity, U256::ZERO);
        assert_eq!(after_borrow.shortfall, U256::from(500_000u64));
    }

    #[test]
    fn test_hypothetical_redeem_reduces_collateral() {
        let (mut registry, oracle, usdc, _) = setup();
        let alice = Address::with_last_byte(0xa1);
        supply(&mut registry, usdc, alice, 1_000);
        registry.add_to_market(usdc, alice).unwrap();

        let result = hypothetical_account_liquidity(
            &registry,
            &oracle,
            alice,
            Some(Hypothetical::redeem(usdc, U256::from(400u64))),
        )
        .unwrap();
        // 500 collateral value, redeeming 400 tokens removes 200
        assert_eq!(result.liquidity, U256::from(300u64));
    }

    #[test]
    fn test_hypothetical_ignored_for_unentered_market() {
        let (mut registry, oracle, usdc, eth) = setup();
        let alice = Address::with_last_byte(0xa1);
        supply(&mut registry, usdc, alice, 1_000);
        registry.add_to_market(usdc, alice).unwrap();

        let result = hypothetical_account_liquidity(
            &registry,
            &oracle,
            alice,
            Some(Hypothetical::borrow(eth, U256::from(1_000_000u64))),
        )
        .unwrap();
        assert_eq!(result.liquidity, U256::from(500u64));
    }

    #[test]
    fn test_cross_market_shortfall() {
        let (mut registry, oracle, usdc, eth) = setup();
        let alice = Address::with_last_byte(0xa1);
        // 1000 units at 2000 with a 0.75 factor = 1.5m
        supply(&mut registry, eth, alice, 1_000);
        registry.add_to_market(eth, alice).unwrap();
        registry.add_to_market(usdc, alice).unwrap();
        borrow(&mut registry, usdc, alice, 1_600_000);

        let result = account_liquidity(&registry, &oracle, alice).unwrap();
        assert_eq!(result.liquidity, U256::ZERO);
        assert_eq!(result.shortfall, U256::from(100_000u64));
        assert!(result.has_shortfall());
    }

    #[test]
    fn test_exactly_one_side_nonzero() {
        let (mut registry, oracle, usdc, _) = setup();
        let alice = Address::with_last_byte(0xa1);
        supply(&mut registry, usdc, alice, 1_000);
        registry.add_to_market(usdc, alice).unwrap();
        for borrowed in [0u64, 250, 499, 500, 501, 2_000] {
            borrow(&mut registry, usdc, alice, borrowed);
            let result = account_liquidity(&registry, &oracle, alice).unwrap();
            assert!(result.liquidity.is_zero() || result.shortfall.is_zero());
        }
    }

    #[test]
    fn test_missing_or_zero_price_aborts() {
        let (mut registry, oracle, usdc, eth) = setup();
        let alice = Address::with_last_byte(0xa1);
        supply(&mut registry, usdc, alice, 1_000);
        registry.add_to_market(usdc, alice).unwrap();
        registry.add_to_market(eth, alice).unwrap();

        oracle.disable(eth);
        assert_eq!(
            account_liquidity(&registry, &oracle, alice),
            Err(Error::PriceError)
        );

        oracle.set_underlying_price(eth, U256::ZERO);
        assert_eq!(
            account_liquidity(&registry, &oracle, alice),
            Err(Error::PriceError)
        );
    }
}
