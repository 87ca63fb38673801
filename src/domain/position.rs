//! Per-instrument position state machine.
//!
//! One `PositionManager` owns the cash and share count for one instrument.
//! It moves between FLAT, LONG and SHORT only through `enter_long`,
//! `exit_long`, `enter_short` and `exit_short`; calling one from the wrong
//! state is a [`StateInvariantViolation`].
//!
//! Sizing: `shares = floor(invested_amount / price)`. After every exit the
//! next `invested_amount` goes back to the configured per-trade amount, or to
//! all available cash when no per-trade amount is configured.

use crate::domain::error::StateInvariantViolation;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionState {
    Flat,
    Long,
    Short,
}

impl fmt::Display for PositionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionState::Flat => f.write_str("FLAT"),
            PositionState::Long => f.write_str("LONG"),
            PositionState::Short => f.write_str("SHORT"),
        }
    }
}

/// Result of `enter_long` / `enter_short`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntryFill {
    pub shares: u64,
    /// Money spent (long) or proceeds received (short).
    pub money: f64,
    pub remaining: f64,
}

/// Result of `exit_long` / `exit_short`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitFill {
    pub shares: u64,
    /// Sale value (long) or cost to cover (short).
    pub money: f64,
    pub profit_loss: f64,
    pub final_cash: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PositionManager {
    initial_cash: f64,
    per_trade: Option<f64>,
    invested_amount: f64,
    shares_owned: i64,
    entry_basis: f64,
    remaining: f64,
    final_cash: Option<f64>,
}

impl PositionManager {
    /// `per_trade` is the fixed amount committed to each position; `None`
    /// invests all available cash.
    pub fn new(initial_cash: f64, per_trade: Option<f64>) -> Self {
        Self {
            initial_cash,
            per_trade,
            invested_amount: per_trade.unwrap_or(initial_cash),
            shares_owned: 0,
            entry_basis: 0.0,
            remaining: initial_cash,
            final_cash: None,
        }
    }

    pub fn state(&self) -> PositionState {
        match self.shares_owned {
            0 => PositionState::Flat,
            s if s > 0 => PositionState::Long,
            _ => PositionState::Short,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.shares_owned == 0
    }

    pub fn is_long(&self) -> bool {
        self.shares_owned > 0
    }

    pub fn is_short(&self) -> bool {
        self.shares_owned < 0
    }

    /// Signed: positive long, negative short, zero flat.
    pub fn shares_owned(&self) -> i64 {
        self.shares_owned
    }

    /// Money committed (long) or received (short) when the open position was entered.
    pub fn entry_basis(&self) -> f64 {
        self.entry_basis
    }

    pub fn remaining(&self) -> f64 {
        self.remaining
    }

    pub fn initial_cash(&self) -> f64 {
        self.initial_cash
    }

    pub fn final_cash(&self) -> Option<f64> {
        self.final_cash
    }

    pub fn invested_amount(&self) -> f64 {
        self.invested_amount
    }

    /// Whole shares the next entry at `price` would buy or sell short.
    pub fn affordable_shares(&self, price: f64) -> u64 {
        if !(price > 0.0) || !(self.invested_amount > 0.0) {
            return 0;
        }
        (self.invested_amount / price).floor() as u64
    }

    pub fn enter_long(&mut self, price: f64) -> Result<EntryFill, StateInvariantViolation> {
        self.require(PositionState::Flat, "enter_long")?;
        check_price("enter_long", price)?;
        let fill = self.open(price);
        self.shares_owned = fill.shares as i64;
        Ok(fill)
    }

    pub fn enter_short(&mut self, price: f64) -> Result<EntryFill, StateInvariantViolation> {
        self.require(PositionState::Flat, "enter_short")?;
        check_price("enter_short", price)?;
        let fill = self.open(price);
        self.shares_owned = -(fill.shares as i64);
        Ok(fill)
    }

    pub fn exit_long(&mut self, price: f64) -> Result<ExitFill, StateInvariantViolation> {
        self.require(PositionState::Long, "exit_long")?;
        check_price("exit_long", price)?;
        let shares = self.shares_owned.unsigned_abs();
        let selling_price = shares as f64 * price;
        let profit_loss = selling_price - self.entry_basis;
        Ok(self.close(shares, selling_price, profit_loss))
    }

    pub fn exit_short(&mut self, price: f64) -> Result<ExitFill, StateInvariantViolation> {
        self.require(PositionState::Short, "exit_short")?;
        check_price("exit_short", price)?;
        let shares = self.shares_owned.unsigned_abs();
        let cost_to_cover = shares as f64 * price;
        let profit_loss = self.entry_basis - cost_to_cover;
        Ok(self.close(shares, cost_to_cover, profit_loss))
    }

    /// `remaining + |shares| * price` while a position is open, otherwise the
    /// cash left by the last exit (or the starting cash before any trade).
    pub fn get_portfolio_value(&self, price: f64) -> f64 {
        if self.is_flat() {
            self.final_cash.unwrap_or(self.initial_cash)
        } else {
            self.remaining + self.shares_owned.unsigned_abs() as f64 * price
        }
    }

    fn require(
        &self,
        expected: PositionState,
        operation: &'static str,
    ) -> Result<(), StateInvariantViolation> {
        let state = self.state();
        if state == expected {
            Ok(())
        } else {
            Err(StateInvariantViolation::InvalidStateTransition { operation, state })
        }
    }

    fn open(&mut self, price: f64) -> EntryFill {
        let shares = self.affordable_shares(price);
        let money = shares as f64 * price;
        self.entry_basis = money;
        self.remaining = self.initial_cash - money;
        EntryFill {
            shares,
            money,
            remaining: self.remaining,
        }
    }

    fn close(&mut self, shares: u64, money: f64, profit_loss: f64) -> ExitFill {
        let final_cash = self.remaining + self.entry_basis + profit_loss;
        self.shares_owned = 0;
        self.entry_basis = 0.0;
        self.remaining = final_cash;
        self.initial_cash = final_cash;
        self.final_cash = Some(final_cash);
        self.invested_amount = self.per_trade.unwrap_or(final_cash);
        ExitFill {
            shares,
            money,
            profit_loss,
            final_cash,
        }
    }
}

fn check_price(operation: &'static str, price: f64) -> Result<(), StateInvariantViolation> {
    if price.is_finite() && price > 0.0 {
        Ok(())
    } else {
        Err(StateInvariantViolation::InvalidPrice { operation, price })
    }
}
