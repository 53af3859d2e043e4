//! Configuration for a money-market deployment.
//!
//! This module provides:
//! - Risk parameter profiles (default, testing, production)
//! - Deployment configuration (markets, rate models, rewards, liquidator)
//! - A loader that builds the genesis protocol from a deployment file

mod deployment;
mod loader;
mod risk;

pub use deployment::{
    expand_env, parse_address, DeploymentConfig, DeploymentDetails, LiquidatorConfig, MarketConfig,
    RateModelConfig, RewardsConfig, RiskOverrides, WalletConfig,
};
pub use loader::{config_path_from_env, load_deployment, load_deployment_from_env, DeploymentLoader, Genesis};
pub use risk::RiskConfig;
