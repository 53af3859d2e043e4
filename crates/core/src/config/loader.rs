//! Genesis loader: turns a deployment file into a ready [`Protocol`].
//!
//! Underlying tokens are in-memory ledgers, prices come from a
//! [`SimplePriceOracle`] seeded with the configured values, and every
//! parameter goes through the same admin operations a live deployment
//! would call.

use alloy::primitives::{Address, U256};
use anyhow::{anyhow, Context, Result};
use moneymarket_chain::{InMemoryToken, SimplePriceOracle, Token};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::{DeploymentConfig, RiskConfig, RiskOverrides};
use crate::liquidator::Liquidator;
use crate::market::Market;
use crate::protocol::Protocol;

/// Protocol state at genesis plus the handles needed to drive it.
#[derive(Debug)]
pub struct Genesis {
    /// Deployment name
    pub name: String,
    pub protocol: Protocol,
    pub oracle: Arc<SimplePriceOracle>,
    /// Underlying tokens by symbol
    pub tokens: BTreeMap<String, Arc<InMemoryToken>>,
    /// Market symbols and addresses, in listing order
    pub markets: Vec<(String, Address)>,
    pub liquidator: Option<Liquidator>,
    /// Risk parameters with deployment overrides applied
    pub risk: RiskConfig,
    pub admin: Address,
}

impl Genesis {
    pub fn market_address(&self, symbol: &str) -> Option<Address> {
        self.markets
            .iter()
            .find(|(s, _)| s == symbol)
            .map(|(_, address)| *address)
    }
}

/// Deployment loader.
pub struct DeploymentLoader {
    config: DeploymentConfig,
    path: PathBuf,
}

impl DeploymentLoader {
    /// Read a deployment file.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let config = DeploymentConfig::from_file(&path)
            .with_context(|| format!("Failed to load deployment from {:?}", path))?;
        Ok(Self { config, path })
    }

    pub fn from_config(config: DeploymentConfig) -> Self {
        Self {
            config,
            path: PathBuf::new(),
        }
    }

    pub fn config(&self) -> &DeploymentConfig {
        &self.config
    }

    /// Build the genesis protocol.
    pub fn load(&self) -> Result<Genesis> {
        let config = &self.config;
        info!(
            deployment = %config.deployment.name,
            path = ?self.path,
            markets = config.markets.len(),
            "Loading deployment configuration"
        );

        let risk = self.build_risk_config(config.risk.as_ref())?;
        let engine = config.engine_address()?;
        let admin = config.admin_address()?;
        let oracle = Arc::new(SimplePriceOracle::new());

        let mut tokens: BTreeMap<String, Arc<InMemoryToken>> = BTreeMap::new();
        for market in &config.markets {
            tokens
                .entry(market.underlying.clone())
                .or_insert_with(|| Arc::new(InMemoryToken::new(market.underlying.clone())));
        }

        let mut protocol = Protocol::new(engine, admin, oracle.clone(), config.deployment.start_block);
        if let Some(rewards) = &config.rewards {
            let token = tokens
                .entry(rewards.token.clone())
                .or_insert_with(|| Arc::new(InMemoryToken::new(rewards.token.clone())))
                .clone();
            protocol = protocol.with_reward_token(token, risk.claim_threshold_amount()?);
        }

        self.apply_risk(&mut protocol, admin, &risk)?;
        let markets = self.list_markets(&mut protocol, &oracle, &tokens, admin)?;

        if let Some(rewards) = &config.rewards {
            let lookup = |symbol: &str| {
                markets
                    .iter()
                    .find(|(s, _)| s == symbol)
                    .map(|(_, address)| *address)
                    .ok_or_else(|| anyhow!("Unknown rewarded market '{}'", symbol))
            };
            if let Some(symbol) = &rewards.market {
                protocol
                    .set_reward_market(admin, lookup(symbol.as_str())?)
                    .with_context(|| format!("Reward market '{}' must hold {}", symbol, rewards.token))?;
            }
            if let Some(token) = tokens.get(&rewards.token) {
                token
                    .mint(engine, rewards.pool_amount()?)
                    .context("Failed to fund reward pool")?;
            }
            protocol
                .set_reward_rate(admin, rewards.rate_amount()?)
                .context("Failed to set reward rate")?;
            let rewarded = rewards
                .markets
                .iter()
                .map(|s| lookup(s.as_str()))
                .collect::<Result<Vec<_>>>()?;
            if !rewarded.is_empty() {
                protocol
                    .add_reward_markets(admin, &rewarded)
                    .context("Failed to add reward markets")?;
            }
            info!(
                token = %rewards.token,
                rate = %rewards.rate,
                rewarded = rewarded.len(),
                "Reward flywheel configured"
            );
        }

        for wallet in &config.wallets {
            let token = tokens
                .get(&wallet.token)
                .ok_or_else(|| anyhow!("Wallet references unknown token '{}'", wallet.token))?;
            token
                .mint(wallet.account_address()?, wallet.amount_value()?)
                .with_context(|| format!("Failed to fund wallet with {}", wallet.token))?;
        }

        let liquidator = config
            .liquidator
            .as_ref()
            .map(|l| -> Result<Liquidator> {
                let address = super::parse_address("liquidator.address", &l.address)?;
                let treasury = super::parse_address("liquidator.treasury", &l.treasury)?;
                Liquidator::new(address, admin, treasury, l.treasury_percent_mantissa()?)
                    .context("Invalid liquidator treasury percent")
            })
            .transpose()?;

        let events = protocol.drain_events();
        info!(
            deployment = %config.deployment.name,
            block = protocol.block_number(),
            genesis_events = events.len(),
            "Genesis protocol ready"
        );

        Ok(Genesis {
            name: config.deployment.name.clone(),
            protocol,
            oracle,
            tokens,
            markets,
            liquidator,
            risk,
            admin,
        })
    }

    fn build_risk_config(&self, overrides: Option<&RiskOverrides>) -> Result<RiskConfig> {
        // Start with base config from profile or environment
        let mut config = match &self.config.deployment.profile {
            Some(profile) => RiskConfig::load_profile(profile)
                .ok_or_else(|| anyhow!("Unknown risk profile '{}'", profile))?,
            None => RiskConfig::from_env(),
        };

        if let Some(ovr) = overrides {
            if let Some(v) = &ovr.close_factor {
                config.close_factor = v.clone();
            }
            if let Some(v) = &ovr.liquidation_incentive {
                config.liquidation_incentive = v.clone();
            }
            if let Some(v) = ovr.max_assets {
                config.max_assets = v;
            }
            if let Some(v) = &ovr.claim_threshold {
                config.claim_threshold = v.clone();
            }
        }

        config.log_config();
        Ok(config)
    }

    fn apply_risk(&self, protocol: &mut Protocol, admin: Address, risk: &RiskConfig) -> Result<()> {
        protocol
            .set_close_factor(admin, risk.close_factor_mantissa()?)
            .context("Close factor out of range")?;
        protocol
            .set_liquidation_incentive(admin, risk.liquidation_incentive_mantissa()?)
            .context("Liquidation incentive out of range")?;
        protocol
            .set_max_assets(admin, risk.max_assets)
            .context("Failed to set max assets")?;
        if let Some(guardian) = self.config.pause_guardian_address()? {
            protocol
                .set_pause_guardian(admin, guardian)
                .context("Failed to set pause guardian")?;
        }
        Ok(())
    }

    fn list_markets(
        &self,
        protocol: &mut Protocol,
        oracle: &SimplePriceOracle,
        tokens: &BTreeMap<String, Arc<InMemoryToken>>,
        admin: Address,
    ) -> Result<Vec<(String, Address)>> {
        let mut listed = Vec::with_capacity(self.config.markets.len());

        for market in &self.config.markets {
            let address = market.market_address()?;
            let underlying: Arc<dyn Token> = tokens
                .get(&market.underlying)
                .ok_or_else(|| anyhow!("Unknown underlying '{}'", market.underlying))?
                .clone();

            oracle.set_underlying_price(address, market.price_mantissa()?);

            let entry = Market::new(address, market.symbol.clone(), market.initial_exchange_rate_mantissa()?)
                .with_reserve_factor(market.reserve_factor_mantissa()?);
            protocol
                .support_market(admin, entry, underlying, market.rate_model.build()?)
                .with_context(|| format!("Failed to list {}", market.symbol))?;

            let collateral_factor = market.collateral_factor_mantissa()?;
            if !collateral_factor.is_zero() {
                protocol
                    .set_collateral_factor(admin, address, collateral_factor)
                    .with_context(|| format!("Invalid collateral factor for {}", market.symbol))?;
            }

            let borrow_cap = market.borrow_cap_amount()?;
            if borrow_cap != U256::ZERO {
                protocol
                    .set_market_borrow_caps(admin, &[address], &[borrow_cap])
                    .with_context(|| format!("Failed to cap {}", market.symbol))?;
            }

            debug!(
                symbol = %market.symbol,
                market = %address,
                underlying = %market.underlying,
                model = market.rate_model.kind(),
                "Market configured"
            );
            listed.push((market.symbol.clone(), address));
        }

        Ok(listed)
    }
}

/// Default deployment file path.
pub fn config_path_from_env() -> PathBuf {
    std::env::var("MM_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./config/protocol.toml"))
}

/// Load a deployment file and build its genesis protocol.
pub fn load_deployment(path: impl AsRef<Path>) -> Result<Genesis> {
    DeploymentLoader::new(path)?.load()
}

/// Load the deployment named by MM_CONFIG.
pub fn load_deployment_from_env() -> Result<Genesis> {
    load_deployment(config_path_from_env())
}
