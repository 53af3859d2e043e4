//! Treasury-splitting liquidation front end.
//!
//! The [`Liquidator`] is a seizer account of its own. It repays the borrow
//! with the caller's underlying, receives the seized collateral tokens, and
//! forwards them: a treasury cut first, the rest to the caller.

use alloy::primitives::{Address, U256};
use tracing::{info, instrument};

use crate::error::{Error, Result};
use crate::events::ProtocolEvent;
use crate::exp::{self, EXP_SCALE};
use crate::liquidation::treasury_share;
use crate::protocol::Protocol;

/// A liquidation to run through the [`Liquidator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiquidationRequest {
    pub borrower: Address,
    pub borrowed_market: Address,
    pub repay_amount: U256,
    pub collateral_market: Address,
    /// Claim the borrower's rewards as collateral before liquidating
    pub collateralize_rewards: bool,
}

/// Result of a split liquidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiquidationOutcome {
    pub repay_amount: U256,
    pub seize_tokens: U256,
    pub seize_tokens_for_treasury: U256,
    pub seize_tokens_for_liquidator: U256,
}

/// Liquidation executor with a treasury cut.
#[derive(Debug, Clone)]
pub struct Liquidator {
    /// Account that receives seized tokens before they are split
    address: Address,

    /// May change the treasury percentage
    admin: Address,

    /// Receives the treasury cut
    treasury: Address,

    /// Share of seized tokens sent to the treasury (1e18 = 100%)
    treasury_percent_mantissa: U256,
}

impl Liquidator {
    pub fn new(address: Address, admin: Address, treasury: Address, treasury_percent_mantissa: U256) -> Result<Self> {
        if treasury_percent_mantissa > EXP_SCALE {
            return Err(Error::BadInput);
        }
        Ok(Self {
            address,
            admin,
            treasury,
            treasury_percent_mantissa,
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn treasury(&self) -> Address {
        self.treasury
    }

    pub fn treasury_percent_mantissa(&self) -> U256 {
        self.treasury_percent_mantissa
    }

    /// Change the treasury cut. Admin only, at most 100%.
    #[instrument(skip(self, protocol))]
    pub fn set_treasury_percent(&mut self, protocol: &mut Protocol, caller: Address, new_percent: U256) -> Result<()> {
        if caller != self.admin {
            return Err(Error::Unauthorized);
        }
        if new_percent > EXP_SCALE {
            return Err(Error::BadInput);
        }
        let old_percent = self.treasury_percent_mantissa;
        protocol.transaction(|p| {
            p.emit(ProtocolEvent::NewTreasuryPercent {
                old_percent,
                new_percent,
            });
            Ok(())
        })?;
        self.treasury_percent_mantissa = new_percent;
        Ok(())
    }

    /// Liquidate on behalf of `caller`, who pays the repay amount and
    /// receives the seized tokens less the treasury cut.
    #[instrument(skip(self, protocol, request), fields(caller = %caller, borrower = %request.borrower))]
    pub fn liquidate_borrow(
        &self,
        protocol: &mut Protocol,
        caller: Address,
        request: LiquidationRequest,
    ) -> Result<LiquidationOutcome> {
        if caller == request.borrower {
            return Err(Error::InvalidAccountPair);
        }
        protocol.transaction(|p| {
            if request.collateralize_rewards {
                p.claim_rewards_as_collateral(request.borrower)?;
            }

            p.accrue(request.borrowed_market)?;
            p.accrue(request.collateral_market)?;
            let result = p.liquidate_borrow_fresh(
                caller,
                self.address,
                request.borrower,
                request.borrowed_market,
                request.repay_amount,
                request.collateral_market,
            )?;

            let for_treasury = treasury_share(result.seize_tokens, self.treasury_percent_mantissa)?;
            let for_liquidator = exp::sub(result.seize_tokens, for_treasury)?;
            self.forward(p, self.treasury, request.collateral_market, for_treasury)?;
            self.forward(p, caller, request.collateral_market, for_liquidator)?;

            p.emit(ProtocolEvent::LiquidateBorrowedTokens {
                liquidator: caller,
                borrower: request.borrower,
                repay_amount: result.repay_amount,
                borrowed_market: request.borrowed_market,
                collateral_market: request.collateral_market,
                seize_tokens_for_treasury: for_treasury,
                seize_tokens_for_liquidator: for_liquidator,
            });

            info!(
                borrower = %request.borrower,
                repay = %result.repay_amount,
                treasury = %for_treasury,
                liquidator = %for_liquidator,
                "Liquidation split"
            );

            Ok(LiquidationOutcome {
                repay_amount: result.repay_amount,
                seize_tokens: result.seize_tokens,
                seize_tokens_for_treasury: for_treasury,
                seize_tokens_for_liquidator: for_liquidator,
            })
        })
    }

    fn forward(&self, protocol: &mut Protocol, to: Address, market: Address, tokens: U256) -> Result<()> {
        if tokens.is_zero() || to == self.address {
            return Ok(());
        }
        protocol.transfer_tokens(self.address, self.address, to, market, tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{mantissa, units, Fixture};

    fn liquidator(f: &Fixture, percent: &str) -> Liquidator {
        Liquidator::new(
            Address::with_last_byte(0x11),
            f.admin,
            Address::with_last_byte(0x7e),
            mantissa(percent),
        )
        .unwrap()
    }

    fn request(f: &Fixture, repay: u64) -> LiquidationRequest {
        LiquidationRequest {
            borrower: f.alice,
            borrowed_market: f.usdc_market,
            repay_amount: units(repay),
            collateral_market: f.eth_market,
            collateralize_rewards: false,
        }
    }

    #[test]
    fn test_treasury_percent_bounds() {
        let mut f = Fixture::new();
        assert!(Liquidator::new(Address::ZERO, f.admin, Address::ZERO, mantissa("1.01")).is_err());

        let mut l = liquidator(&f, "0.05");
        let admin = f.admin;
        assert_eq!(
            l.set_treasury_percent(&mut f.protocol, f.bob, mantissa("0.1")),
            Err(Error::Unauthorized)
        );
        assert_eq!(
            l.set_treasury_percent(&mut f.protocol, admin, mantissa("1.1")),
            Err(Error::BadInput)
        );
        l.set_treasury_percent(&mut f.protocol, admin, mantissa("0.1")).unwrap();
        assert_eq!(l.treasury_percent_mantissa(), mantissa("0.1"));
        assert!(matches!(
            f.protocol.events().last(),
            Some(ProtocolEvent::NewTreasuryPercent { new_percent, .. }) if *new_percent == mantissa("0.1")
        ));
    }

    #[test]
    fn test_split_between_treasury_and_caller() {
        let mut f = Fixture::new();
        f.fund_and_borrow();
        f.push_alice_into_shortfall();
        let l = liquidator(&f, "0.05");

        // 1_000 repaid at 1 against collateral at 0.8: 1_250 seized
        let req = request(&f, 1_000);
        let outcome = l.liquidate_borrow(&mut f.protocol, f.bob, req).unwrap();
        assert_eq!(outcome.seize_tokens, units(1_250));
        assert_eq!(outcome.seize_tokens_for_treasury, units(62));
        assert_eq!(outcome.seize_tokens_for_liquidator, units(1_188));

        assert_eq!(f.protocol.balance_of(l.treasury(), f.eth_market), units(62));
        assert_eq!(f.protocol.balance_of(f.bob, f.eth_market), units(1_188));
        assert_eq!(f.protocol.balance_of(l.address(), f.eth_market), U256::ZERO);
        assert!(matches!(
            f.protocol.events().last(),
            Some(ProtocolEvent::LiquidateBorrowedTokens { liquidator, .. }) if *liquidator == f.bob
        ));
    }

    #[test]
    fn test_failed_liquidation_moves_nothing() {
        let mut f = Fixture::new();
        f.fund_and_borrow();
        let l = liquidator(&f, "0.05");
        let req = request(&f, 1_000);
        assert_eq!(
            l.liquidate_borrow(&mut f.protocol, f.bob, req),
            Err(Error::InsufficientShortfall)
        );
        assert_eq!(f.protocol.balance_of(f.bob, f.eth_market), U256::ZERO);
    }

    #[test]
    fn test_borrower_cannot_liquidate_self() {
        let mut f = Fixture::new();
        f.fund_and_borrow();
        f.push_alice_into_shortfall();
        let l = liquidator(&f, "0.05");
        let events_before = f.protocol.events().len();

        let req = request(&f, 1_000);
        assert_eq!(
            l.liquidate_borrow(&mut f.protocol, f.alice, req),
            Err(Error::InvalidAccountPair)
        );
        assert_eq!(f.protocol.balance_of(l.treasury(), f.eth_market), U256::ZERO);
        assert_eq!(f.protocol.balance_of(f.alice, f.eth_market), units(10_000));
        assert_eq!(f.protocol.events().len(), events_before);
    }

    #[test]
    fn test_collateralized_rewards_can_cure_shortfall() {
        let mut f = Fixture::new();
        f.fund_and_borrow();
        f.enable_rewards(units(1_000));
        f.protocol.advance_blocks(10).unwrap();
        f.push_alice_into_shortfall();
        let l = liquidator(&f, "0.05");

        let mut req = request(&f, 1_000);
        req.collateralize_rewards = true;
        // 10_000 of rewards supplied as collateral outweighs the shortfall
        assert_eq!(
            l.liquidate_borrow(&mut f.protocol, f.bob, req),
            Err(Error::InsufficientShortfall)
        );
        // Rolled back with the failed liquidation
        assert_eq!(f.protocol.balance_of(f.alice, f.xvs_market), U256::ZERO);
    }
}
