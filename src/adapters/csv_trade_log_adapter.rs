//! Trade log as CSV, one row per executed trade.

use crate::domain::backtest::BacktestResult;
use crate::domain::error::SignalTraderError;
use crate::domain::execution::Trade;
use crate::domain::metrics::Metrics;
use crate::domain::portfolio::MultiInstrumentResult;
use crate::domain::strategy::StrategyConfig;
use crate::ports::report_port::ReportPort;
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct TradeRow<'a> {
    bar: usize,
    date: String,
    ticker: &'a str,
    action: &'static str,
    tag: String,
    price: f64,
    shares: u64,
    amount: f64,
    profit_loss: Option<f64>,
}

impl<'a> From<&'a Trade> for TradeRow<'a> {
    fn from(trade: &'a Trade) -> Self {
        Self {
            bar: trade.bar_index,
            date: trade.date.format("%Y-%m-%d").to_string(),
            ticker: &trade.ticker,
            action: trade.action.as_str(),
            tag: trade.tag.to_string(),
            price: trade.price,
            shares: trade.shares,
            amount: trade.amount,
            profit_loss: trade.profit_loss,
        }
    }
}

pub struct CsvTradeLogAdapter;

impl CsvTradeLogAdapter {
    pub fn write_trades(trades: &[Trade], output_path: &Path) -> Result<(), SignalTraderError> {
        let csv_err = |e: csv::Error| SignalTraderError::Data {
            reason: format!("failed to write {}: {e}", output_path.display()),
        };
        let mut writer = csv::Writer::from_path(output_path).map_err(csv_err)?;
        for trade in trades {
            writer.serialize(TradeRow::from(trade)).map_err(csv_err)?;
        }
        writer.flush()?;
        tracing::info!(file = %output_path.display(), trades = trades.len(), "trade log written");
        Ok(())
    }
}

impl ReportPort for CsvTradeLogAdapter {
    fn write(
        &self,
        result: &BacktestResult,
        _metrics: &Metrics,
        _strategy: &StrategyConfig,
        output_path: &Path,
    ) -> Result<(), SignalTraderError> {
        Self::write_trades(&result.trades, output_path)
    }

    fn write_multi(
        &self,
        result: &MultiInstrumentResult,
        _metrics: &Metrics,
        _strategy: &StrategyConfig,
        output_path: &Path,
    ) -> Result<(), SignalTraderError> {
        Self::write_trades(&result.trades, output_path)
    }
}
