//! Money-market simulator
//!
//! Builds the genesis protocol from a deployment file, advances the chain
//! by a number of blocks, accrues interest on every listed market and prints
//! a JSON market report.
//!
//! Environment:
//! - `MM_CONFIG`: deployment file (default `./config/protocol.toml`)
//! - `MM_PROFILE`: risk profile when the deployment does not name one
//! - `SIM_BLOCKS`: blocks to advance before reporting (default 100)

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use moneymarket_core::config::{config_path_from_env, load_deployment};
use moneymarket_core::exp::mantissa_to_f64;
use moneymarket_core::{Genesis, RewardSide};

/// Environment variable names.
mod env {
    pub const SIM_BLOCKS: &str = "SIM_BLOCKS";
}

const DEFAULT_SIM_BLOCKS: u64 = 100;

#[derive(Debug, Serialize)]
struct Report {
    deployment: String,
    block_number: u64,
    close_factor: f64,
    liquidation_incentive: f64,
    reward_rate: String,
    markets: Vec<MarketReport>,
}

#[derive(Debug, Serialize)]
struct MarketReport {
    symbol: String,
    address: String,
    listed: bool,
    cash: String,
    total_supply: String,
    total_borrows: String,
    total_reserves: String,
    borrow_index: String,
    exchange_rate: String,
    borrow_rate_per_block: String,
    supply_rate_per_block: String,
    collateral_factor: f64,
    reserve_factor: f64,
    reward_supply_speed: String,
    reward_borrow_speed: String,
}

fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,moneymarket_core=debug,moneymarket_chain=debug")),
        )
        .init();

    let path = config_path_from_env();
    info!(path = ?path, "Starting money-market simulator");
    let mut genesis = load_deployment(&path).with_context(|| format!("Failed to build genesis from {:?}", path))?;

    let blocks = sim_blocks()?;
    simulate(&mut genesis, blocks)?;

    let report = build_report(&genesis)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn sim_blocks() -> Result<u64> {
    match std::env::var(env::SIM_BLOCKS) {
        Ok(value) => value
            .parse()
            .with_context(|| format!("Invalid {}: '{}'", env::SIM_BLOCKS, value)),
        Err(_) => Ok(DEFAULT_SIM_BLOCKS),
    }
}

fn simulate(genesis: &mut Genesis, blocks: u64) -> Result<()> {
    let protocol = &mut genesis.protocol;
    protocol.advance_blocks(blocks).context("Failed to advance blocks")?;

    for (symbol, address) in &genesis.markets {
        if let Err(e) = protocol.accrue_interest(*address) {
            warn!(symbol = %symbol, error = %e, "Accrual failed");
        }
    }

    let events = protocol.drain_events();
    info!(
        blocks,
        block = protocol.block_number(),
        events = events.len(),
        "Simulation finished"
    );
    Ok(())
}

fn build_report(genesis: &Genesis) -> Result<Report> {
    let protocol = &genesis.protocol;
    let params = &protocol.registry().params;
    let flywheel = protocol.flywheel();

    let mut markets = Vec::with_capacity(genesis.markets.len());
    for (symbol, address) in &genesis.markets {
        let market = protocol
            .market(*address)
            .with_context(|| format!("Market {} missing from registry", symbol))?;
        markets.push(MarketReport {
            symbol: symbol.clone(),
            address: address.to_string(),
            listed: market.listed,
            cash: market.cash.to_string(),
            total_supply: market.total_supply.to_string(),
            total_borrows: market.total_borrows.to_string(),
            total_reserves: market.total_reserves.to_string(),
            borrow_index: market.borrow_index.to_string(),
            exchange_rate: protocol.exchange_rate_stored(*address)?.to_string(),
            borrow_rate_per_block: protocol.borrow_rate_per_block(*address)?.to_string(),
            supply_rate_per_block: protocol.supply_rate_per_block(*address)?.to_string(),
            collateral_factor: mantissa_to_f64(market.collateral_factor_mantissa),
            reserve_factor: mantissa_to_f64(market.reserve_factor_mantissa),
            reward_supply_speed: flywheel.speed(*address, RewardSide::Supply).to_string(),
            reward_borrow_speed: flywheel.speed(*address, RewardSide::Borrow).to_string(),
        });
    }

    Ok(Report {
        deployment: genesis.name.clone(),
        block_number: protocol.block_number(),
        close_factor: mantissa_to_f64(params.close_factor_mantissa),
        liquidation_incentive: mantissa_to_f64(params.liquidation_incentive_mantissa),
        reward_rate: flywheel.reward_rate.to_string(),
        markets,
    })
}
