//! Multi-instrument coordination.
//!
//! One executor per ticker, each capitalized with its share of the total
//! capital. Instruments never share position state; only the per-bar
//! snapshot and the final totals are aggregated.

use crate::domain::backtest::{EquityPoint, build_executor, generate_signals, tradable_price};
use crate::domain::bar_table::{BarTable, CLOSE, Series};
use crate::domain::error::{ConfigurationError, SignalTraderError};
use crate::domain::execution::{BarContext, Trade, TradeExecutor};
use crate::domain::indicator::IndicatorRegistry;
use crate::domain::signal::Signals;
use crate::domain::strategy::StrategyConfig;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub bar_index: usize,
    pub date: NaiveDate,
    pub total_value: f64,
    pub prices: BTreeMap<String, f64>,
    pub values: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentResult {
    pub ticker: String,
    pub initial_capital: f64,
    pub final_value: f64,
    pub profit: f64,
    pub return_pct: f64,
    pub trade_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioTotals {
    pub initial_capital: f64,
    pub final_value: f64,
    pub profit: f64,
    pub return_pct: f64,
    pub trade_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiInstrumentResult {
    pub snapshots: Vec<PortfolioSnapshot>,
    /// Combined value after each bar's trades.
    pub equity_curve: Vec<EquityPoint>,
    pub instruments: Vec<InstrumentResult>,
    pub totals: PortfolioTotals,
    /// All trades, ordered by bar and then ticker.
    pub trades: Vec<Trade>,
}

struct Instrument {
    executor: TradeExecutor,
    signals: Signals,
    close: Series,
    initial_capital: f64,
    last_price: Option<f64>,
}

impl Instrument {
    fn value(&self) -> f64 {
        match self.last_price {
            Some(price) => self.executor.portfolio_value(price),
            None => self.initial_capital,
        }
    }
}

pub struct MultiInstrumentCoordinator {
    instruments: BTreeMap<String, Instrument>,
    dates: Vec<NaiveDate>,
    snapshots: Vec<PortfolioSnapshot>,
    equity_curve: Vec<EquityPoint>,
}

impl MultiInstrumentCoordinator {
    /// Prepare executors and signals from an aligned, ticker-prefixed table.
    pub fn new(
        table: &BarTable,
        config: &StrategyConfig,
        registry: &IndicatorRegistry,
    ) -> Result<Self, SignalTraderError> {
        config.validate(registry)?;
        if table.is_empty() {
            return Err(SignalTraderError::NoData {
                ticker: config.tickers.join(","),
            });
        }
        let allocations = config.capital.allocations(&config.tickers)?;

        let mut instruments = BTreeMap::new();
        for (ticker, fraction) in allocations {
            let view = table
                .instrument(&ticker)
                .ok_or_else(|| SignalTraderError::NoData {
                    ticker: ticker.clone(),
                })?;
            let close = view
                .column(CLOSE)
                .map(<[f64]>::to_vec)
                .ok_or_else(|| ConfigurationError::UnknownColumn(format!("{ticker}_{CLOSE}")))?;
            let signals = generate_signals(&view, config, registry)?;
            let capital = config.capital.total_capital * fraction;
            tracing::debug!(ticker = %ticker, capital, "instrument prepared");
            instruments.insert(
                ticker.clone(),
                Instrument {
                    executor: build_executor(&ticker, capital, config),
                    signals,
                    close,
                    initial_capital: capital,
                    last_price: None,
                },
            );
        }

        Ok(Self {
            instruments,
            dates: table.dates().to_vec(),
            snapshots: Vec::with_capacity(table.len()),
            equity_curve: Vec::with_capacity(table.len()),
        })
    }

    /// Run `config` across every configured ticker in `table`.
    pub fn run(
        table: &BarTable,
        config: &StrategyConfig,
        registry: &IndicatorRegistry,
    ) -> Result<MultiInstrumentResult, SignalTraderError> {
        let mut coordinator = Self::new(table, config, registry)?;
        tracing::info!(
            instruments = coordinator.instruments.len(),
            bars = coordinator.dates.len(),
            "multi-instrument backtest started"
        );
        for bar_index in 0..coordinator.dates.len() {
            coordinator.step(bar_index)?;
        }
        let result = coordinator.finish();
        tracing::info!(
            trades = result.trades.len(),
            final_value = result.totals.final_value,
            "multi-instrument backtest finished"
        );
        Ok(result)
    }

    /// Snapshot the portfolio, then drive every instrument through one bar.
    pub fn step(&mut self, bar_index: usize) -> Result<(), SignalTraderError> {
        let Some(&date) = self.dates.get(bar_index) else {
            return Ok(());
        };

        let mut prices = BTreeMap::new();
        let mut values = BTreeMap::new();
        for (ticker, instrument) in &mut self.instruments {
            if let Some(price) = instrument.close.get(bar_index).copied().and_then(tradable_price) {
                instrument.last_price = Some(price);
                prices.insert(ticker.clone(), price);
            }
            values.insert(ticker.clone(), instrument.value());
        }
        let total_value = values.values().sum();

        for instrument in self.instruments.values_mut() {
            let Some(price) = instrument.close.get(bar_index).copied().and_then(tradable_price) else {
                continue;
            };
            let (entry, exit) = instrument.signals.at(bar_index);
            instrument
                .executor
                .on_bar(BarContext { bar_index, date, price }, entry, exit)?;
        }

        self.snapshots.push(PortfolioSnapshot {
            bar_index,
            date,
            total_value,
            prices,
            values,
        });
        self.equity_curve.push(EquityPoint {
            bar_index,
            date,
            equity: self.instruments.values().map(Instrument::value).sum(),
        });
        Ok(())
    }

    pub fn snapshots(&self) -> &[PortfolioSnapshot] {
        &self.snapshots
    }

    pub fn finish(self) -> MultiInstrumentResult {
        let mut instruments = Vec::with_capacity(self.instruments.len());
        let mut trades = Vec::new();
        for (ticker, instrument) in self.instruments {
            let final_value = instrument.value();
            let profit = final_value - instrument.initial_capital;
            instruments.push(InstrumentResult {
                ticker,
                initial_capital: instrument.initial_capital,
                final_value,
                profit,
                return_pct: pct(profit, instrument.initial_capital),
                trade_count: instrument.executor.trades().len(),
            });
            trades.extend(instrument.executor.into_trades());
        }
        // stable: ticker order is kept within a bar
        trades.sort_by_key(|t| t.bar_index);

        let initial_capital: f64 = instruments.iter().map(|i| i.initial_capital).sum();
        let final_value: f64 = instruments.iter().map(|i| i.final_value).sum();
        let profit = final_value - initial_capital;
        let totals = PortfolioTotals {
            initial_capital,
            final_value,
            profit,
            return_pct: pct(profit, initial_capital),
            trade_count: trades.len(),
        };

        MultiInstrumentResult {
            snapshots: self.snapshots,
            equity_curve: self.equity_curve,
            instruments,
            totals,
            trades,
        }
    }
}

fn pct(profit: f64, base: f64) -> f64 {
    if base == 0.0 { 0.0 } else { profit / base * 100.0 }
}
