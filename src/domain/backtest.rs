//! Single-instrument backtest loop.
//!
//! Signals are computed for the whole table first, then every bar is fed to
//! a [`TradeExecutor`] at its Close price and the portfolio value is recorded.

use crate::domain::bar_table::BarTable;
use crate::domain::condition_eval::ConditionEvaluator;
use crate::domain::error::{ConfigurationError, SignalTraderError};
use crate::domain::execution::{BarContext, Trade, TradeExecutor};
use crate::domain::indicator::IndicatorRegistry;
use crate::domain::position::PositionManager;
use crate::domain::risk::RiskController;
use crate::domain::signal::{SignalAggregator, Signals};
use crate::domain::strategy::StrategyConfig;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub bar_index: usize,
    pub date: NaiveDate,
    pub equity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub ticker: String,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub initial_capital: f64,
    pub final_value: f64,
}

impl BacktestResult {
    pub fn profit(&self) -> f64 {
        self.final_value - self.initial_capital
    }

    pub fn return_pct(&self) -> f64 {
        if self.initial_capital == 0.0 {
            0.0
        } else {
            self.profit() / self.initial_capital * 100.0
        }
    }
}

/// Evaluate a strategy's entry and exit groups over `table`.
pub fn generate_signals(
    table: &BarTable,
    config: &StrategyConfig,
    registry: &IndicatorRegistry,
) -> Result<Signals, ConfigurationError> {
    let mut evaluator = ConditionEvaluator::new(registry, table);
    SignalAggregator::new(&mut evaluator).signals(&config.entry, &config.exit)
}

/// Build the executor for one instrument starting with `capital`.
pub fn build_executor(ticker: &str, capital: f64, config: &StrategyConfig) -> TradeExecutor {
    let per_trade = config.capital.per_trade.per_trade_amount(capital);
    TradeExecutor::new(
        ticker,
        config.mode,
        PositionManager::new(capital, per_trade),
        RiskController::new(config.risk.clone()),
    )
}

/// Usable execution price, or `None` for gaps and non-positive values.
pub(crate) fn tradable_price(price: f64) -> Option<f64> {
    (price.is_finite() && price > 0.0).then_some(price)
}

/// Run `config` over a single-instrument table (plain column names).
/// The first configured ticker names the result; it starts with that
/// ticker's share of the total capital.
pub fn run_backtest(
    table: &BarTable,
    config: &StrategyConfig,
    registry: &IndicatorRegistry,
) -> Result<BacktestResult, SignalTraderError> {
    config.validate(registry)?;
    let ticker = config
        .tickers
        .first()
        .cloned()
        .ok_or(ConfigurationError::NoTickers)?;
    if table.is_empty() {
        return Err(SignalTraderError::NoData { ticker });
    }
    let close = table
        .close()
        .ok_or_else(|| ConfigurationError::UnknownColumn("Close".to_string()))?;

    let signals = generate_signals(table, config, registry)?;
    let initial_capital = config.capital_for(&ticker)?;
    let mut executor = build_executor(&ticker, initial_capital, config);

    tracing::info!(
        ticker = %ticker,
        bars = table.len(),
        mode = %config.mode,
        "backtest started"
    );

    let mut equity_curve = Vec::with_capacity(table.len());
    let mut last_value = initial_capital;
    for (bar_index, &date) in table.dates().iter().enumerate() {
        if let Some(price) = tradable_price(close[bar_index]) {
            let (entry, exit) = signals.at(bar_index);
            executor.on_bar(BarContext { bar_index, date, price }, entry, exit)?;
            last_value = executor.portfolio_value(price);
        } else {
            tracing::warn!(ticker = %ticker, bar = bar_index, "no usable close price, bar skipped");
        }
        equity_curve.push(EquityPoint {
            bar_index,
            date,
            equity: last_value,
        });
    }

    let trades = executor.into_trades();
    tracing::info!(
        ticker = %ticker,
        trades = trades.len(),
        final_value = last_value,
        "backtest finished"
    );

    Ok(BacktestResult {
        ticker,
        trades,
        equity_curve,
        initial_capital,
        final_value: last_value,
    })
}
