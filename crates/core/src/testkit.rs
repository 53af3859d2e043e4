//! Shared protocol fixture for unit tests.

use alloy::primitives::{Address, U256};
use moneymarket_chain::{FixedRateModel, InMemoryToken, InterestRateModel, SimplePriceOracle};
use std::sync::Arc;

use crate::exp::{parse_mantissa, EXP_SCALE};
use crate::market::Market;
use crate::protocol::Protocol;

pub const START_BLOCK: u64 = 100;

/// 0.0001% per block
pub const BORROW_RATE_PER_BLOCK: U256 = U256::from_limbs([1_000_000_000_000u64, 0, 0, 0]);

pub const WALLET: u64 = 1_000_000;
pub const REWARD_POOL: u64 = 1_000_000_000;

pub fn units(n: u64) -> U256 {
    U256::from(n)
}

pub fn mantissa(s: &str) -> U256 {
    parse_mantissa(s).expect("valid mantissa")
}

/// Three listed markets (USDC at 1, ETH at 2, XVS at 1), collateral factor
/// 0.5, reserve factor 0.1, fixed borrow rate, exchange rate 1. Alice, bob
/// and carol each hold [`WALLET`] of every underlying; the engine holds
/// [`REWARD_POOL`] reward tokens. XVS is the reward market.
pub struct Fixture {
    pub protocol: Protocol,
    pub oracle: Arc<SimplePriceOracle>,
    pub usdc: Arc<InMemoryToken>,
    pub eth: Arc<InMemoryToken>,
    pub xvs: Arc<InMemoryToken>,
    pub usdc_market: Address,
    pub eth_market: Address,
    pub xvs_market: Address,
    pub admin: Address,
    pub alice: Address,
    pub bob: Address,
    pub carol: Address,
}

impl Fixture {
    pub fn new() -> Self {
        let admin = Address::with_last_byte(0xad);
        let engine = Address::with_last_byte(0xee);
        let (alice, bob, carol) = (
            Address::with_last_byte(0xa1),
            Address::with_last_byte(0xb0),
            Address::with_last_byte(0xc0),
        );
        let (usdc_market, eth_market, xvs_market) = (
            Address::with_last_byte(0x01),
            Address::with_last_byte(0x02),
            Address::with_last_byte(0x03),
        );

        let oracle = Arc::new(SimplePriceOracle::new());
        let usdc = Arc::new(InMemoryToken::new("USDC"));
        let eth = Arc::new(InMemoryToken::new("ETH"));
        let xvs = Arc::new(InMemoryToken::new("XVS"));

        let mut protocol = Protocol::new(engine, admin, oracle.clone(), START_BLOCK)
            .with_reward_token(xvs.clone(), U256::ZERO);

        let listings = [
            (usdc_market, "vUSDC", &usdc, EXP_SCALE),
            (eth_market, "vETH", &eth, mantissa("2")),
            (xvs_market, "vXVS", &xvs, EXP_SCALE),
        ];
        for (market, symbol, token, price) in listings {
            oracle.set_underlying_price(market, price);
            let model: Arc<dyn InterestRateModel> = Arc::new(FixedRateModel::new(BORROW_RATE_PER_BLOCK));
            let entry = Market::new(market, symbol, EXP_SCALE).with_reserve_factor(mantissa("0.1"));
            protocol
                .support_market(admin, entry, token.clone(), model)
                .expect("listing");
            protocol
                .set_collateral_factor(admin, market, mantissa("0.5"))
                .expect("collateral factor");
            for account in [alice, bob, carol] {
                token.mint(account, units(WALLET)).expect("mint");
            }
        }
        protocol.set_reward_market(admin, xvs_market).expect("reward market");
        xvs.mint(engine, units(REWARD_POOL)).expect("mint");
        protocol.drain_events();

        Self {
            protocol,
            oracle,
            usdc,
            eth,
            xvs,
            usdc_market,
            eth_market,
            xvs_market,
            admin,
            alice,
            bob,
            carol,
        }
    }

    /// Bob supplies 100_000 USDC; alice supplies 10_000 ETH (worth 10_000
    /// of borrowing power), enters ETH and borrows 5_000 USDC.
    pub fn fund_and_borrow(&mut self) {
        self.protocol
            .mint(self.bob, self.usdc_market, units(100_000))
            .expect("bob mint");
        self.protocol
            .mint(self.alice, self.eth_market, units(10_000))
            .expect("alice mint");
        self.protocol
            .enter_markets(self.alice, &[self.eth_market])
            .expect("enter");
        self.protocol
            .borrow(self.alice, self.usdc_market, units(5_000))
            .expect("borrow");
        self.protocol.drain_events();
    }

    /// Drop ETH to 0.8, leaving alice with 4_000 of collateral against a
    /// 5_000 borrow.
    pub fn push_alice_into_shortfall(&mut self) {
        self.oracle.set_underlying_price(self.eth_market, mantissa("0.8"));
    }

    /// Reward `rate` per block across USDC and ETH.
    pub fn enable_rewards(&mut self, rate: U256) {
        self.protocol
            .set_reward_rate(self.admin, rate)
            .expect("reward rate");
        self.protocol
            .add_reward_markets(self.admin, &[self.usdc_market, self.eth_market])
            .expect("reward markets");
        self.protocol.drain_events();
    }
}
