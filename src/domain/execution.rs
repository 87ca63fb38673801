//! Per-instrument trade execution.
//!
//! Each bar: an open position is first checked by the [`RiskController`]; a
//! risk exit closes it and ends the bar. Otherwise entry/exit signals are
//! mapped to position transitions according to the [`TradeMode`]. Every
//! executed transition appends one [`Trade`].

use crate::domain::error::{ConfigurationError, StateInvariantViolation};
use crate::domain::position::{EntryFill, ExitFill, PositionManager, PositionState};
use crate::domain::risk::{RiskAction, RiskController};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeMode {
    #[default]
    Long,
    Short,
    Reversal,
}

impl FromStr for TradeMode {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "long" => Ok(TradeMode::Long),
            "short" => Ok(TradeMode::Short),
            "reversal" => Ok(TradeMode::Reversal),
            _ => Err(ConfigurationError::UnknownMode(s.trim().to_string())),
        }
    }
}

impl fmt::Display for TradeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeMode::Long => f.write_str("long"),
            TradeMode::Short => f.write_str("short"),
            TradeMode::Reversal => f.write_str("reversal"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeAction {
    Buy,
    Sell,
    Short,
    Cover,
    Liquidate,
    StopLossSell,
    StopLossCover,
    TakeProfitSell,
    TakeProfitCover,
}

impl TradeAction {
    pub fn as_str(self) -> &'static str {
        match self {
            TradeAction::Buy => "BUY",
            TradeAction::Sell => "SELL",
            TradeAction::Short => "SHORT",
            TradeAction::Cover => "COVER",
            TradeAction::Liquidate => "LIQUIDATE",
            TradeAction::StopLossSell => "STOP_LOSS_SELL",
            TradeAction::StopLossCover => "STOP_LOSS_COVER",
            TradeAction::TakeProfitSell => "TAKE_PROFIT_SELL",
            TradeAction::TakeProfitCover => "TAKE_PROFIT_COVER",
        }
    }

    pub fn is_entry(self) -> bool {
        matches!(self, TradeAction::Buy | TradeAction::Short)
    }
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeTag {
    Entry,
    Exit,
    Liquidation,
    #[serde(rename = "Reversal-Entry")]
    ReversalEntry,
    #[serde(rename = "Reversal-Exit")]
    ReversalExit,
}

impl fmt::Display for TradeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TradeTag::Entry => "Entry",
            TradeTag::Exit => "Exit",
            TradeTag::Liquidation => "Liquidation",
            TradeTag::ReversalEntry => "Reversal-Entry",
            TradeTag::ReversalExit => "Reversal-Exit",
        })
    }
}

/// One executed trade event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub ticker: String,
    pub bar_index: usize,
    pub date: NaiveDate,
    pub action: TradeAction,
    pub price: f64,
    pub shares: u64,
    /// Money spent or received by this trade.
    pub amount: f64,
    /// Present on closing trades only.
    pub profit_loss: Option<f64>,
    pub tag: TradeTag,
}

/// Where and at what price a bar is executed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarContext {
    pub bar_index: usize,
    pub date: NaiveDate,
    pub price: f64,
}

#[derive(Debug, Clone)]
pub struct TradeExecutor {
    ticker: String,
    mode: TradeMode,
    position: PositionManager,
    risk: RiskController,
    trades: Vec<Trade>,
}

impl TradeExecutor {
    pub fn new(ticker: &str, mode: TradeMode, position: PositionManager, risk: RiskController) -> Self {
        Self {
            ticker: ticker.to_string(),
            mode,
            position,
            risk,
            trades: Vec::new(),
        }
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn mode(&self) -> TradeMode {
        self.mode
    }

    pub fn position(&self) -> &PositionManager {
        &self.position
    }

    pub fn risk(&self) -> &RiskController {
        &self.risk
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn into_trades(self) -> Vec<Trade> {
        self.trades
    }

    pub fn portfolio_value(&self, price: f64) -> f64 {
        self.position.get_portfolio_value(price)
    }

    /// Process one bar. Returns the number of trades it produced.
    pub fn on_bar(
        &mut self,
        bar: BarContext,
        entry_signal: bool,
        exit_signal: bool,
    ) -> Result<usize, StateInvariantViolation> {
        let before = self.trades.len();

        if !self.position.is_flat() {
            let action = self.risk.check(bar.price, &self.position);
            if action != RiskAction::None {
                self.risk_exit(bar, action)?;
                return Ok(self.trades.len() - before);
            }
        }

        match self.mode {
            TradeMode::Long => {
                if self.position.is_flat() && entry_signal {
                    self.open(bar, PositionState::Long, TradeTag::Entry)?;
                } else if self.position.is_long() && exit_signal {
                    self.close(bar, TradeAction::Sell, TradeTag::Exit)?;
                }
            }
            TradeMode::Short => {
                if self.position.is_flat() && entry_signal {
                    self.open(bar, PositionState::Short, TradeTag::Entry)?;
                } else if self.position.is_short() && exit_signal {
                    self.close(bar, TradeAction::Cover, TradeTag::Exit)?;
                }
            }
            TradeMode::Reversal => {
                if entry_signal && !self.position.is_long() {
                    let tag = if self.position.is_short() {
                        self.close(bar, TradeAction::Cover, TradeTag::ReversalExit)?;
                        TradeTag::ReversalEntry
                    } else {
                        TradeTag::Entry
                    };
                    self.open(bar, PositionState::Long, tag)?;
                } else if exit_signal && !self.position.is_short() {
                    let tag = if self.position.is_long() {
                        self.close(bar, TradeAction::Sell, TradeTag::ReversalExit)?;
                        TradeTag::ReversalEntry
                    } else {
                        TradeTag::Entry
                    };
                    self.open(bar, PositionState::Short, tag)?;
                }
            }
        }

        debug_assert_eq!(self.position.is_flat(), !self.risk.state().is_open());
        Ok(self.trades.len() - before)
    }

    fn risk_exit(&mut self, bar: BarContext, action: RiskAction) -> Result<(), StateInvariantViolation> {
        let long = self.position.is_long();
        let (trade_action, tag) = match (action, long) {
            (RiskAction::Liquidation, _) => (TradeAction::Liquidate, TradeTag::Liquidation),
            (RiskAction::StopLoss, true) => (TradeAction::StopLossSell, TradeTag::Exit),
            (RiskAction::StopLoss, false) => (TradeAction::StopLossCover, TradeTag::Exit),
            (RiskAction::TakeProfit, true) => (TradeAction::TakeProfitSell, TradeTag::Exit),
            (RiskAction::TakeProfit, false) => (TradeAction::TakeProfitCover, TradeTag::Exit),
            (RiskAction::None, _) => return Ok(()),
        };
        if action == RiskAction::Liquidation {
            tracing::info!(
                ticker = %self.ticker,
                bar = bar.bar_index,
                price = bar.price,
                "short position liquidated"
            );
        }
        self.close(bar, trade_action, tag)
    }

    fn open(&mut self, bar: BarContext, direction: PositionState, tag: TradeTag) -> Result<(), StateInvariantViolation> {
        if self.position.affordable_shares(bar.price) == 0 {
            tracing::debug!(
                ticker = %self.ticker,
                bar = bar.bar_index,
                price = bar.price,
                "entry skipped: capital below one share"
            );
            return Ok(());
        }
        let (fill, action): (EntryFill, TradeAction) = match direction {
            PositionState::Long => (self.position.enter_long(bar.price)?, TradeAction::Buy),
            PositionState::Short => (self.position.enter_short(bar.price)?, TradeAction::Short),
            PositionState::Flat => return Ok(()),
        };
        self.risk.on_open(direction, bar.price, fill.shares);
        self.record(bar, action, fill.shares, fill.money, None, tag);
        Ok(())
    }

    fn close(&mut self, bar: BarContext, action: TradeAction, tag: TradeTag) -> Result<(), StateInvariantViolation> {
        let fill: ExitFill = if self.position.is_long() {
            self.position.exit_long(bar.price)?
        } else {
            self.position.exit_short(bar.price)?
        };
        self.risk.on_close();
        self.record(bar, action, fill.shares, fill.money, Some(fill.profit_loss), tag);
        Ok(())
    }

    fn record(
        &mut self,
        bar: BarContext,
        action: TradeAction,
        shares: u64,
        amount: f64,
        profit_loss: Option<f64>,
        tag: TradeTag,
    ) {
        tracing::debug!(
            ticker = %self.ticker,
            bar = bar.bar_index,
            %action,
            price = bar.price,
            shares,
            ?profit_loss,
            "trade"
        );
        self.trades.push(Trade {
            ticker: self.ticker.clone(),
            bar_index: bar.bar_index,
            date: bar.date,
            action,
            price: bar.price,
            shares,
            amount,
            profit_loss,
            tag,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::risk::{RiskPolicy, StopRule};
    use approx::assert_relative_eq;

    fn bar(i: usize, price: f64) -> BarContext {
        BarContext {
            bar_index: i,
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(i as i64),
            price,
        }
    }

    fn executor(mode: TradeMode, cash: f64, policy: RiskPolicy) -> TradeExecutor {
        TradeExecutor::new(
            "TEST",
            mode,
            PositionManager::new(cash, None),
            RiskController::new(policy),
        )
    }

    fn actions(ex: &TradeExecutor) -> Vec<TradeAction> {
        ex.trades().iter().map(|t| t.action).collect()
    }

    #[test]
    fn long_mode_entry_and_exit() {
        let mut ex = executor(TradeMode::Long, 1_000.0, RiskPolicy::disabled());
        assert_eq!(ex.on_bar(bar(0, 10.0), true, false).unwrap(), 1);
        assert_eq!(ex.on_bar(bar(1, 11.0), true, false).unwrap(), 0);
        assert_eq!(ex.on_bar(bar(2, 12.0), false, true).unwrap(), 1);
        assert_eq!(actions(&ex), vec![TradeAction::Buy, TradeAction::Sell]);
        let sell = &ex.trades()[1];
        assert_relative_eq!(sell.profit_loss.unwrap(), 200.0);
        assert_eq!(sell.tag, TradeTag::Exit);
    }

    #[test]
    fn long_mode_ignores_exit_while_flat() {
        let mut ex = executor(TradeMode::Long, 1_000.0, RiskPolicy::disabled());
        ex.on_bar(bar(0, 10.0), false, true).unwrap();
        assert!(ex.trades().is_empty());
    }

    #[test]
    fn short_mode_entry_and_cover() {
        let mut ex = executor(TradeMode::Short, 1_000.0, RiskPolicy::disabled());
        ex.on_bar(bar(0, 10.0), true, false).unwrap();
        assert!(ex.position().is_short());
        ex.on_bar(bar(1, 8.0), false, true).unwrap();
        assert_eq!(actions(&ex), vec![TradeAction::Short, TradeAction::Cover]);
        assert_relative_eq!(ex.trades()[1].profit_loss.unwrap(), 200.0);
    }

    #[test]
    fn reversal_flip_is_two_trades_same_price() {
        let mut ex = executor(TradeMode::Reversal, 1_000.0, RiskPolicy::disabled());
        ex.on_bar(bar(0, 10.0), true, false).unwrap();
        assert_eq!(ex.trades()[0].tag, TradeTag::Entry);

        let produced = ex.on_bar(bar(1, 12.5), false, true).unwrap();
        assert_eq!(produced, 2);
        let flip = &ex.trades()[1..];
        assert_eq!(flip[0].action, TradeAction::Sell);
        assert_eq!(flip[0].tag, TradeTag::ReversalExit);
        assert_eq!(flip[1].action, TradeAction::Short);
        assert_eq!(flip[1].tag, TradeTag::ReversalEntry);
        assert_relative_eq!(flip[0].price, flip[1].price);
        assert_eq!(flip[0].bar_index, flip[1].bar_index);
        assert!(ex.position().is_short());
    }

    #[test]
    fn reversal_short_to_long() {
        let mut ex = executor(TradeMode::Reversal, 1_000.0, RiskPolicy::disabled());
        ex.on_bar(bar(0, 10.0), false, true).unwrap();
        assert!(ex.position().is_short());
        ex.on_bar(bar(1, 9.0), true, false).unwrap();
        assert_eq!(
            actions(&ex),
            vec![TradeAction::Short, TradeAction::Cover, TradeAction::Buy]
        );
        assert!(ex.position().is_long());
    }

    #[test]
    fn reversal_repeat_signal_is_idempotent() {
        let mut ex = executor(TradeMode::Reversal, 1_000.0, RiskPolicy::disabled());
        ex.on_bar(bar(0, 10.0), true, false).unwrap();
        ex.on_bar(bar(0, 10.0), true, false).unwrap();
        assert_eq!(ex.trades().len(), 1);
    }

    #[test]
    fn risk_exit_skips_signals() {
        let policy = RiskPolicy::new(Some(StopRule::percentage(0.05)), None);
        let mut ex = executor(TradeMode::Reversal, 1_000.0, policy);
        ex.on_bar(bar(0, 100.0), true, false).unwrap();
        // exit signal would flip short, but the stop fires first
        let produced = ex.on_bar(bar(1, 94.0), false, true).unwrap();
        assert_eq!(produced, 1);
        assert_eq!(ex.trades()[1].action, TradeAction::StopLossSell);
        assert!(ex.position().is_flat());
        assert!(!ex.risk().state().is_open());
    }

    #[test]
    fn take_profit_cover() {
        let policy = RiskPolicy::new(None, Some(StopRule::percentage(0.10)));
        let mut ex = executor(TradeMode::Short, 1_000.0, policy);
        ex.on_bar(bar(0, 100.0), true, false).unwrap();
        ex.on_bar(bar(1, 95.0), false, false).unwrap();
        ex.on_bar(bar(2, 90.0), false, false).unwrap();
        assert_eq!(actions(&ex), vec![TradeAction::Short, TradeAction::TakeProfitCover]);
    }

    #[test]
    fn liquidation_trade() {
        let mut ex = executor(TradeMode::Short, 1_000.0, RiskPolicy::disabled());
        ex.on_bar(bar(0, 100.0), true, false).unwrap();
        ex.on_bar(bar(1, 150.0), false, false).unwrap();
        ex.on_bar(bar(2, 200.0), false, false).unwrap();
        let last = ex.trades().last().unwrap();
        assert_eq!(last.action, TradeAction::Liquidate);
        assert_eq!(last.tag, TradeTag::Liquidation);
        assert_eq!(last.bar_index, 2);
        assert_relative_eq!(last.profit_loss.unwrap(), -1_000.0);
    }

    #[test]
    fn entry_skipped_when_price_exceeds_capital() {
        let mut ex = executor(TradeMode::Long, 50.0, RiskPolicy::disabled());
        assert_eq!(ex.on_bar(bar(0, 100.0), true, false).unwrap(), 0);
        assert!(ex.position().is_flat());
        assert!(!ex.risk().state().is_open());
    }

    #[test]
    fn risk_levels_set_on_open() {
        let policy = RiskPolicy::new(Some(StopRule::percentage(0.05)), Some(StopRule::percentage(0.1)));
        let mut ex = executor(TradeMode::Long, 1_000.0, policy);
        ex.on_bar(bar(0, 100.0), true, false).unwrap();
        assert_relative_eq!(ex.risk().state().stop_loss_price.unwrap(), 95.0);
        assert_eq!(ex.risk().state().direction, PositionState::Long);
    }

    #[test]
    fn mode_parse() {
        assert_eq!("Reversal".parse::<TradeMode>().unwrap(), TradeMode::Reversal);
        assert!(matches!(
            "both".parse::<TradeMode>(),
            Err(ConfigurationError::UnknownMode(_))
        ));
    }

    #[test]
    fn trade_serializes_with_tags() {
        let mut ex = executor(TradeMode::Reversal, 1_000.0, RiskPolicy::disabled());
        ex.on_bar(bar(0, 10.0), true, false).unwrap();
        ex.on_bar(bar(1, 10.0), false, true).unwrap();
        let json = serde_json::to_value(ex.trades()).unwrap();
        assert_eq!(json[1]["tag"], "Reversal-Exit");
        assert_eq!(json[2]["action"], "SHORT");
        assert_eq!(json[0]["profit_loss"], serde_json::Value::Null);
    }
}
