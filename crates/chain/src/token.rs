//! Token transfer collaborator.
//!
//! The engine moves underlying assets and the reward token through the
//! [`Token`] trait only. Authorization of `from` is the host's concern; the
//! engine only ever moves funds it has been told to move.

use alloy::primitives::{Address, U256};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt::Debug;
use thiserror::Error;
use tracing::debug;

/// Transfer failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("{account} holds {balance}, cannot move {amount}")]
    InsufficientBalance {
        account: Address,
        balance: U256,
        amount: U256,
    },

    #[error("transfers of {0} are halted")]
    TransfersHalted(String),

    #[error("balance overflow")]
    Overflow,
}

/// ERC20-style ledger interface.
pub trait Token: Send + Sync + Debug {
    /// Ticker for logs.
    fn symbol(&self) -> &str;

    /// Balance held by `account`.
    fn balance_of(&self, account: Address) -> U256;

    /// Move `amount` from `from` to `to`.
    fn transfer(&self, from: Address, to: Address, amount: U256) -> Result<(), TokenError>;
}

/// In-process token ledger.
#[derive(Debug)]
pub struct InMemoryToken {
    symbol: String,
    balances: RwLock<HashMap<Address, U256>>,
    halted: RwLock<bool>,
}

impl InMemoryToken {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            balances: RwLock::new(HashMap::new()),
            halted: RwLock::new(false),
        }
    }

    /// Credit `amount` out of thin air.
    pub fn mint(&self, to: Address, amount: U256) -> Result<(), TokenError> {
        let mut balances = self.balances.write();
        let balance = balances.entry(to).or_default();
        *balance = balance.checked_add(amount).ok_or(TokenError::Overflow)?;
        Ok(())
    }

    /// Make every subsequent transfer fail until resumed.
    pub fn halt_transfers(&self, halted: bool) {
        *self.halted.write() = halted;
    }

    /// Sum of all balances.
    pub fn total_supply(&self) -> U256 {
        self.balances
            .read()
            .values()
            .fold(U256::ZERO, |acc, v| acc.saturating_add(*v))
    }
}

impl Token for InMemoryToken {
    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn balance_of(&self, account: Address) -> U256 {
        self.balances.read().get(&account).copied().unwrap_or_default()
    }

    fn transfer(&self, from: Address, to: Address, amount: U256) -> Result<(), TokenError> {
        if *self.halted.read() {
            return Err(TokenError::TransfersHalted(self.symbol.clone()));
        }

        let mut balances = self.balances.write();
        let balance = balances.get(&from).copied().unwrap_or_default();
        if balance < amount {
            return Err(TokenError::InsufficientBalance {
                account: from,
                balance,
                amount,
            });
        }
        if from == to {
            return Ok(());
        }

        let credited = balances
            .get(&to)
            .copied()
            .unwrap_or_default()
            .checked_add(amount)
            .ok_or(TokenError::Overflow)?;
        balances.insert(from, balance - amount);
        balances.insert(to, credited);

        debug!(token = %self.symbol, from = %from, to = %to, amount = %amount, "Token transfer");
        Ok(())
    }
}
