#![allow(dead_code)]

use chrono::NaiveDate;
use signaltrader::domain::bar_table::BarTable;
use signaltrader::domain::condition::{Condition, ConditionGroup, Operand, Operator};
use signaltrader::domain::error::SignalTraderError;
pub use signaltrader::domain::ohlcv::OhlcvBar;
use signaltrader::domain::strategy::{CapitalConfig, StrategyConfig};
use signaltrader::ports::data_port::DataPort;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<OhlcvBar>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, ticker: &str, bars: Vec<OhlcvBar>) -> Self {
        self.data.insert(ticker.to_string(), bars);
        self
    }

    pub fn with_error(mut self, ticker: &str, reason: &str) -> Self {
        self.errors.insert(ticker.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_ohlcv(
        &self,
        ticker: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<OhlcvBar>, SignalTraderError> {
        if let Some(reason) = self.errors.get(ticker) {
            return Err(SignalTraderError::Data {
                reason: reason.clone(),
            });
        }
        Ok(self
            .data
            .get(ticker)
            .map(|bars| {
                bars.iter()
                    .filter(|b| start_date.is_none_or(|s| b.date >= s) && end_date.is_none_or(|e| b.date <= e))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn make_bar(ticker: &str, date: &str, close: f64) -> OhlcvBar {
    OhlcvBar::new(
        ticker,
        NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
        close - 1.0,
        close + 1.0,
        close - 2.0,
        close,
        1000.0,
    )
}

/// Daily bars from 2024-01-01, one per close.
pub fn bars_from_closes(ticker: &str, closes: &[f64]) -> Vec<OhlcvBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| OhlcvBar::new(ticker, date(2024, 1, 1) + chrono::Duration::days(i as i64), c, c, c, c, 1000.0))
        .collect()
}

pub fn generate_bars(ticker: &str, start_date: &str, count: usize, start_price: f64) -> Vec<OhlcvBar> {
    let start = NaiveDate::parse_from_str(start_date, "%Y-%m-%d").unwrap();
    (0..count)
        .map(|i| {
            let price = start_price + i as f64;
            OhlcvBar::new(ticker, start + chrono::Duration::days(i as i64), price, price + 1.0, price - 1.0, price, 1000.0)
        })
        .collect()
}

pub fn table_from_closes(closes: &[f64]) -> BarTable {
    BarTable::from_bars(&bars_from_closes("TEST", closes))
}

/// Flat at 100 for 20 bars, up to 110, flat, then down. SMA(5) crosses
/// above SMA(20) at bar 20 and back below at bar 40.
pub fn crossover_closes() -> Vec<f64> {
    let mut closes = vec![100.0; 20];
    closes.extend((1..=10).map(|k| 100.0 + k as f64));
    closes.extend([110.0; 7]);
    closes.extend([108.0, 106.0, 104.0, 102.0, 100.0, 98.0, 96.0, 94.0, 92.0, 90.0]);
    closes
}

pub fn sma_crossover_strategy(tickers: &[&str], capital: f64) -> StrategyConfig {
    let mut config = StrategyConfig::new("SMA Crossover", tickers, CapitalConfig::new(capital));
    config.entry = ConditionGroup::all(vec![Condition::new(
        Operand::indicator("SMA", &[5.0]),
        Operator::CrossedUp,
        Operand::indicator("SMA", &[20.0]),
    )]);
    config.exit = ConditionGroup::all(vec![Condition::new(
        Operand::indicator("SMA", &[5.0]),
        Operator::CrossedDown,
        Operand::indicator("SMA", &[20.0]),
    )]);
    config
}

/// Entry above `level`, exit below it.
pub fn threshold_strategy(tickers: &[&str], capital: f64, level: f64) -> StrategyConfig {
    let mut config = StrategyConfig::new("Threshold", tickers, CapitalConfig::new(capital));
    config.entry = ConditionGroup::all(vec![Condition::new(
        Operand::price("Close"),
        Operator::GreaterThan,
        Operand::constant(level),
    )]);
    config.exit = ConditionGroup::all(vec![Condition::new(
        Operand::price("Close"),
        Operator::LessThan,
        Operand::constant(level),
    )]);
    config
}

/// Write bars as `<dir>/<TICKER>.csv` in the layout the CSV adapter reads.
pub fn write_csv(dir: &Path, ticker: &str, bars: &[OhlcvBar]) {
    let mut text = String::from("Date,Open,High,Low,Close,Volume\n");
    for b in bars {
        writeln!(text, "{},{},{},{},{},{}", b.date, b.open, b.high, b.low, b.close, b.volume).unwrap();
    }
    std::fs::write(dir.join(format!("{ticker}.csv")), text).unwrap();
}
