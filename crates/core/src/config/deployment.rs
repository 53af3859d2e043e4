//! Deployment configuration: the genesis state of one protocol instance.

use alloy::primitives::{Address, U256};
use anyhow::{anyhow, bail, Context, Result};
use moneymarket_chain::{FixedRateModel, InterestRateModel, JumpRateModel, WhitePaperInterestRateModel};
use regex_lite::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::exp::parse_mantissa;

/// Full deployment configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentConfig {
    /// Deployment metadata
    pub deployment: DeploymentDetails,
    /// Risk parameter overrides applied on top of the profile
    #[serde(default)]
    pub risk: Option<RiskOverrides>,
    /// Reward flywheel setup
    #[serde(default)]
    pub rewards: Option<RewardsConfig>,
    /// Treasury-splitting liquidator
    #[serde(default)]
    pub liquidator: Option<LiquidatorConfig>,
    /// Markets, listed in order
    #[serde(default)]
    pub markets: Vec<MarketConfig>,
    /// Opening underlying balances
    #[serde(default)]
    pub wallets: Vec<WalletConfig>,
}

/// Deployment details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentDetails {
    /// Deployment name (e.g., "venus-local")
    pub name: String,
    /// Risk profile; MM_PROFILE is used when absent
    #[serde(default)]
    pub profile: Option<String>,
    /// Block number at genesis
    #[serde(default = "default_start_block")]
    pub start_block: u64,
    /// Address of the engine itself (holds the reward pool)
    pub engine: String,
    /// Protocol admin
    pub admin: String,
    #[serde(default)]
    pub pause_guardian: Option<String>,
}

fn default_start_block() -> u64 {
    1
}

/// Risk parameter overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskOverrides {
    #[serde(default)]
    pub close_factor: Option<String>,
    #[serde(default)]
    pub liquidation_incentive: Option<String>,
    #[serde(default)]
    pub max_assets: Option<usize>,
    #[serde(default)]
    pub claim_threshold: Option<String>,
}

/// Reward flywheel setup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardsConfig {
    /// Underlying symbol of the reward token
    pub token: String,
    /// Reward tokens emitted per block across all rewarded markets
    #[serde(default = "default_zero")]
    pub rate: String,
    /// Reward tokens credited to the engine at genesis
    #[serde(default = "default_zero")]
    pub pool: String,
    /// Symbol of the market rewards are collateralized into
    #[serde(default)]
    pub market: Option<String>,
    /// Symbols of the rewarded markets
    #[serde(default)]
    pub markets: Vec<String>,
}

fn default_zero() -> String {
    "0".to_string()
}

impl RewardsConfig {
    pub fn rate_amount(&self) -> Result<U256> {
        parse_amount("rewards.rate", &self.rate)
    }

    pub fn pool_amount(&self) -> Result<U256> {
        parse_amount("rewards.pool", &self.pool)
    }
}

/// Treasury-splitting liquidator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidatorConfig {
    pub address: String,
    pub treasury: String,
    /// Share of seized collateral kept by the treasury
    #[serde(default = "default_treasury_percent")]
    pub treasury_percent: String,
}

fn default_treasury_percent() -> String {
    "0.05".to_string()
}

impl LiquidatorConfig {
    pub fn treasury_percent_mantissa(&self) -> Result<U256> {
        parse_decimal_mantissa("liquidator.treasury_percent", &self.treasury_percent)
    }
}

/// One market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Market symbol (e.g., "vUSDC")
    pub symbol: String,
    /// Market address (as hex string)
    pub address: String,
    /// Underlying token symbol; markets may share one
    pub underlying: String,
    /// Underlying price in the oracle's unit of account
    pub price: String,
    #[serde(default = "default_zero")]
    pub collateral_factor: String,
    #[serde(default = "default_zero")]
    pub reserve_factor: String,
    /// Exchange rate while the market has no supply
    #[serde(default = "default_initial_exchange_rate")]
    pub initial_exchange_rate: String,
    /// Zero means no cap
    #[serde(default = "default_zero")]
    pub borrow_cap: String,
    pub rate_model: RateModelConfig,
}

fn default_initial_exchange_rate() -> String {
    "0.02".to_string()
}

impl MarketConfig {
    pub fn market_address(&self) -> Result<Address> {
        parse_address(&format!("markets.{}.address", self.symbol), &self.address)
    }

    pub fn price_mantissa(&self) -> Result<U256> {
        parse_decimal_mantissa(&format!("markets.{}.price", self.symbol), &self.price)
    }

    pub fn collateral_factor_mantissa(&self) -> Result<U256> {
        parse_decimal_mantissa(&format!("markets.{}.collateral_factor", self.symbol), &self.collateral_factor)
    }

    pub fn reserve_factor_mantissa(&self) -> Result<U256> {
        parse_decimal_mantissa(&format!("markets.{}.reserve_factor", self.symbol), &self.reserve_factor)
    }

    pub fn initial_exchange_rate_mantissa(&self) -> Result<U256> {
        let rate = parse_decimal_mantissa(
            &format!("markets.{}.initial_exchange_rate", self.symbol),
            &self.initial_exchange_rate,
        )?;
        if rate.is_zero() {
            bail!("markets.{}.initial_exchange_rate must be positive", self.symbol);
        }
        Ok(rate)
    }

    pub fn borrow_cap_amount(&self) -> Result<U256> {
        parse_amount(&format!("markets.{}.borrow_cap", self.symbol), &self.borrow_cap)
    }
}

/// Interest rate model. Yearly rates are converted to per-block rates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RateModelConfig {
    WhitePaper {
        base_rate_per_year: String,
        multiplier_per_year: String,
    },
    Jump {
        base_rate_per_year: String,
        multiplier_per_year: String,
        jump_multiplier_per_year: String,
        kink: String,
    },
    Fixed {
        borrow_rate_per_block: String,
    },
}

impl RateModelConfig {
    pub fn build(&self) -> Result<Arc<dyn InterestRateModel>> {
        let m = |field: &str, value: &str| parse_decimal_mantissa(&format!("rate_model.{}", field), value);
        let model: Arc<dyn InterestRateModel> = match self {
            Self::WhitePaper {
                base_rate_per_year,
                multiplier_per_year,
            } => Arc::new(WhitePaperInterestRateModel::new(
                m("base_rate_per_year", base_rate_per_year)?,
                m("multiplier_per_year", multiplier_per_year)?,
            )),
            Self::Jump {
                base_rate_per_year,
                multiplier_per_year,
                jump_multiplier_per_year,
                kink,
            } => Arc::new(JumpRateModel::new(
                m("base_rate_per_year", base_rate_per_year)?,
                m("multiplier_per_year", multiplier_per_year)?,
                m("jump_multiplier_per_year", jump_multiplier_per_year)?,
                m("kink", kink)?,
            )),
            Self::Fixed { borrow_rate_per_block } => Arc::new(FixedRateModel::new(m(
                "borrow_rate_per_block",
                borrow_rate_per_block,
            )?)),
        };
        Ok(model)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::WhitePaper { .. } => "white_paper",
            Self::Jump { .. } => "jump",
            Self::Fixed { .. } => "fixed",
        }
    }
}

/// Opening underlying balance of one account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    pub account: String,
    /// Underlying token symbol
    pub token: String,
    pub amount: String,
}

impl WalletConfig {
    pub fn account_address(&self) -> Result<Address> {
        parse_address("wallets.account", &self.account)
    }

    pub fn amount_value(&self) -> Result<U256> {
        parse_amount(&format!("wallets.{}.amount", self.token), &self.amount)
    }
}

impl DeploymentConfig {
    /// Load deployment config from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: DeploymentConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn engine_address(&self) -> Result<Address> {
        parse_address("deployment.engine", &self.deployment.engine)
    }

    pub fn admin_address(&self) -> Result<Address> {
        parse_address("deployment.admin", &self.deployment.admin)
    }

    pub fn pause_guardian_address(&self) -> Result<Option<Address>> {
        self.deployment
            .pause_guardian
            .as_deref()
            .map(|s| parse_address("deployment.pause_guardian", s))
            .transpose()
    }

    pub fn market_by_symbol(&self, symbol: &str) -> Option<&MarketConfig> {
        self.markets.iter().find(|m| m.symbol == symbol)
    }
}

/// Expand ${VAR_NAME} patterns with environment variable values. Unset
/// variables are left in place.
pub fn expand_env(s: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([^}]+)\}").context("Failed to compile env pattern")?;
    let expanded = re.replace_all(s, |caps: &Captures| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    });
    Ok(expanded.into_owned())
}

/// Parse an address, expanding environment references first.
pub fn parse_address(field: &str, value: &str) -> Result<Address> {
    let expanded = expand_env(value)?;
    if expanded.contains("${") {
        bail!("Missing env var for {}: {}", field, value);
    }
    expanded
        .trim()
        .parse()
        .map_err(|e| anyhow!("Invalid address for {} '{}': {}", field, expanded, e))
}

fn parse_decimal_mantissa(field: &str, value: &str) -> Result<U256> {
    parse_mantissa(value).ok_or_else(|| anyhow!("Invalid decimal for {}: '{}'", field, value))
}

fn parse_amount(field: &str, value: &str) -> Result<U256> {
    value
        .trim()
        .replace('_', "")
        .parse()
        .map_err(|e| anyhow!("Invalid amount for {} '{}': {}", field, value, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exp::EXP_SCALE;

    const SAMPLE: &str = r#"
        [deployment]
        name = "local"
        engine = "0x00000000000000000000000000000000000000ee"
        admin = "0x00000000000000000000000000000000000000ad"

        [risk]
        close_factor = "0.4"

        [rewards]
        token = "XVS"
        rate = "1_000"
        pool = "1000000"
        markets = ["vUSDC"]

        [[markets]]
        symbol = "vUSDC"
        address = "0x0000000000000000000000000000000000000001"
        underlying = "USDC"
        price = "1"
        collateral_factor = "0.8"

        [markets.rate_model]
        kind = "jump"
        base_rate_per_year = "0.02"
        multiplier_per_year = "0.1"
        jump_multiplier_per_year = "1.09"
        kink = "0.8"

        [[wallets]]
        account = "0x00000000000000000000000000000000000000a1"
        token = "USDC"
        amount = "5000"
    "#;

    #[test]
    fn test_parse_deployment() {
        let config: DeploymentConfig = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.deployment.start_block, 1);
        assert_eq!(config.engine_address().unwrap(), Address::with_last_byte(0xee));
        assert!(config.pause_guardian_address().unwrap().is_none());
        assert_eq!(
            config.risk.as_ref().and_then(|r| r.close_factor.as_deref()),
            Some("0.4")
        );

        let rewards = config.rewards.as_ref().unwrap();
        assert_eq!(rewards.rate_amount().unwrap(), U256::from(1_000u64));
        assert!(rewards.market.is_none());

        let usdc = config.market_by_symbol("vUSDC").unwrap();
        assert_eq!(usdc.market_address().unwrap(), Address::with_last_byte(0x01));
        assert_eq!(usdc.price_mantissa().unwrap(), EXP_SCALE);
        assert_eq!(usdc.reserve_factor_mantissa().unwrap(), U256::ZERO);
        assert_eq!(usdc.initial_exchange_rate_mantissa().unwrap(), parse_mantissa("0.02").unwrap());
        assert_eq!(usdc.rate_model.kind(), "jump");
        assert!(usdc.rate_model.build().is_ok());

        assert_eq!(config.wallets[0].amount_value().unwrap(), U256::from(5_000u64));
    }

    #[test]
    fn test_rate_model_kinds() {
        let fixed: RateModelConfig = toml::from_str(
            r#"
            kind = "fixed"
            borrow_rate_per_block = "0.000001"
            "#,
        )
        .unwrap();
        let model = fixed.build().unwrap();
        assert_eq!(
            model.borrow_rate(U256::ZERO, U256::ZERO, U256::ZERO).unwrap(),
            U256::from(1_000_000_000_000u64)
        );

        let unknown = toml::from_str::<RateModelConfig>("kind = \"curved\"");
        assert!(unknown.is_err());
    }

    #[test]
    fn test_invalid_values_are_reported() {
        let mut config: DeploymentConfig = toml::from_str(SAMPLE).unwrap();
        config.markets[0].price = "one".to_string();
        let err = config.markets[0].price_mantissa().unwrap_err();
        assert!(err.to_string().contains("markets.vUSDC.price"));

        config.markets[0].initial_exchange_rate = "0".to_string();
        assert!(config.markets[0].initial_exchange_rate_mantissa().is_err());

        config.deployment.admin = "0xnothex".to_string();
        assert!(config.admin_address().is_err());
    }

    #[test]
    fn test_expand_env() {
        // Use unique var name to avoid conflicts with parallel tests
        std::env::set_var("MM_DEPLOYMENT_TEST_VAR", "test_value");
        assert_eq!(expand_env("${MM_DEPLOYMENT_TEST_VAR}").unwrap(), "test_value");
        assert_eq!(
            expand_env("prefix_${MM_DEPLOYMENT_TEST_VAR}_suffix").unwrap(),
            "prefix_test_value_suffix"
        );
        assert_eq!(expand_env("no_vars").unwrap(), "no_vars");
        assert_eq!(expand_env("${MM_UNSET_TEST_VAR}").unwrap(), "${MM_UNSET_TEST_VAR}");
        std::env::remove_var("MM_DEPLOYMENT_TEST_VAR");
    }

    #[test]
    fn test_address_from_env() {
        std::env::set_var("MM_ADMIN_TEST_VAR", "0x00000000000000000000000000000000000000ad");
        assert_eq!(
            parse_address("admin", "${MM_ADMIN_TEST_VAR}").unwrap(),
            Address::with_last_byte(0xad)
        );
        std::env::remove_var("MM_ADMIN_TEST_VAR");

        let err = parse_address("admin", "${MM_MISSING_ADMIN}").unwrap_err();
        assert!(err.to_string().contains("Missing env var"));
    }

    #[test]
    fn test_serialization() {
        let config: DeploymentConfig = toml::from_str(SAMPLE).unwrap();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("kind = \"jump\""));

        let parsed: DeploymentConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.markets.len(), 1);
        assert_eq!(parsed.markets[0].rate_model, config.markets[0].rate_model);
        assert_eq!(parsed.deployment.name, "local");
    }
}
