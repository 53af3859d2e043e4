//! Risk parameter profiles.
//!
//! Profiles:
//! - `default`: Compound-style parameters (close factor 0.5, incentive 1.08)
//! - `testing`: wide close factor and a generous incentive for local runs
//! - `production`: conservative parameters and a small claim threshold

use alloy::primitives::U256;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::exp::{mantissa_to_f64, parse_mantissa};

/// Protocol-wide risk parameters. Mantissas are written as exact decimal
/// strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Profile name
    #[serde(default = "default_profile_name")]
    pub profile: String,

    /// Largest share of a borrow repayable in one liquidation
    #[serde(default = "default_close_factor")]
    pub close_factor: String,

    /// Collateral bonus paid to liquidators
    #[serde(default = "default_liquidation_incentive")]
    pub liquidation_incentive: String,

    /// Markets an account may enter
    #[serde(default = "default_max_assets")]
    pub max_assets: usize,

    /// Smallest accrued reward paid out by a claim, in reward token units
    #[serde(default = "default_claim_threshold")]
    pub claim_threshold: String,
}

fn default_profile_name() -> String {
    "default".to_string()
}
fn default_close_factor() -> String {
    "0.5".to_string()
}
fn default_liquidation_incentive() -> String {
    "1.08".to_string()
}
fn default_max_assets() -> usize {
    20
}
fn default_claim_threshold() -> String {
    "0".to_string()
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            profile: default_profile_name(),
            close_factor: default_close_factor(),
            liquidation_incentive: default_liquidation_incentive(),
            max_assets: default_max_assets(),
            claim_threshold: default_claim_threshold(),
        }
    }
}

impl RiskConfig {
    /// Load risk parameters from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Profile for local runs and tests.
    pub fn testing() -> Self {
        Self {
            profile: "testing".to_string(),
            close_factor: "0.9".to_string(),
            liquidation_incentive: "1.1".to_string(),
            max_assets: 20,
            claim_threshold: "0".to_string(),
        }
    }

    /// Conservative profile.
    pub fn production() -> Self {
        Self {
            profile: "production".to_string(),
            close_factor: "0.5".to_string(),
            liquidation_incentive: "1.05".to_string(),
            max_assets: 10,
            claim_threshold: "1000000000000000".to_string(), // 0.001 of an 18-decimal token
        }
    }

    /// Look up a profile by name.
    pub fn load_profile(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "default" => Some(Self::default()),
            "testing" | "test" => Some(Self::testing()),
            "production" | "prod" => Some(Self::production()),
            _ => None,
        }
    }

    /// Get profile from environment variable MM_PROFILE, or default.
    /// Supported values: default, testing, production
    pub fn from_env() -> Self {
        let profile = std::env::var("MM_PROFILE").unwrap_or_else(|_| "default".to_string());
        Self::load_profile(&profile).unwrap_or_default()
    }

    pub fn close_factor_mantissa(&self) -> Result<U256> {
        parse_mantissa(&self.close_factor)
            .ok_or_else(|| anyhow!("Invalid close factor '{}'", self.close_factor))
    }

    pub fn liquidation_incentive_mantissa(&self) -> Result<U256> {
        parse_mantissa(&self.liquidation_incentive)
            .ok_or_else(|| anyhow!("Invalid liquidation incentive '{}'", self.liquidation_incentive))
    }

    pub fn claim_threshold_amount(&self) -> Result<U256> {
        self.claim_threshold
            .parse()
            .map_err(|e| anyhow!("Invalid claim threshold '{}': {}", self.claim_threshold, e))
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        let as_f64 = |s: &str| parse_mantissa(s).map(mantissa_to_f64).unwrap_or(f64::NAN);
        tracing::info!(profile = %self.profile, "Risk configuration loaded");
        tracing::info!(
            close_factor = as_f64(&self.close_factor),
            liquidation_incentive = as_f64(&self.liquidation_incentive),
            max_assets = self.max_assets,
            claim_threshold = %self.claim_threshold,
            "Risk parameters"
        );
    }
}
