//! Ticker universe for multi-instrument runs.
//!
//! Parses ticker and allocation lists from configuration and checks that
//! each ticker has enough data before anything is simulated.

use crate::domain::error::SignalTraderError;
use crate::domain::ohlcv::OhlcvBar;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashSet};

pub const MIN_OHLCV_BARS: usize = 30;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in ticker list")]
    EmptyToken,

    #[error("duplicate ticker: {0}")]
    DuplicateTicker(String),

    #[error("malformed allocation entry '{0}', expected TICKER:FRACTION")]
    MalformedAllocation(String),
}

/// Split a comma-separated ticker list, uppercased, rejecting blanks and
/// duplicates.
pub fn parse_tickers(input: &str) -> Result<Vec<String>, UniverseError> {
    let mut tickers = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let ticker = trimmed.to_uppercase();
        if !seen.insert(ticker.clone()) {
            return Err(UniverseError::DuplicateTicker(ticker));
        }
        tickers.push(ticker);
    }

    Ok(tickers)
}

/// Parse `AAPL:0.6, MSFT:0.4` into ticker fractions. Range and sum checks
/// happen later in `CapitalConfig::allocations`.
pub fn parse_allocation(input: &str) -> Result<BTreeMap<String, f64>, UniverseError> {
    let mut allocation = BTreeMap::new();
    if input.trim().is_empty() {
        return Ok(allocation);
    }
    for token in input.split(',') {
        let trimmed = token.trim();
        let (ticker, fraction) = trimmed
            .split_once(':')
            .ok_or_else(|| UniverseError::MalformedAllocation(trimmed.to_string()))?;
        let ticker = ticker.trim().to_uppercase();
        if ticker.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let fraction: f64 = fraction
            .trim()
            .parse()
            .map_err(|_| UniverseError::MalformedAllocation(trimmed.to_string()))?;
        if allocation.insert(ticker.clone(), fraction).is_some() {
            return Err(UniverseError::DuplicateTicker(ticker));
        }
    }
    Ok(allocation)
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    NoData,
    InsufficientBars { bars: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedTicker {
    pub ticker: String,
    pub reason: SkipReason,
}

/// Tickers that passed the coverage check, with their bars already loaded.
#[derive(Debug, Clone)]
pub struct LoadedUniverse {
    pub instruments: Vec<(String, Vec<OhlcvBar>)>,
    pub skipped: Vec<SkippedTicker>,
}

impl LoadedUniverse {
    pub fn tickers(&self) -> Vec<String> {
        self.instruments.iter().map(|(t, _)| t.clone()).collect()
    }
}

/// Fetch every ticker and keep those with at least `min_bars` bars.
/// Fails only when nothing is left.
pub fn load_universe(
    data_port: &dyn DataPort,
    tickers: &[String],
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    min_bars: usize,
) -> Result<LoadedUniverse, SignalTraderError> {
    let mut instruments = Vec::new();
    let mut skipped = Vec::new();

    for ticker in tickers {
        let bars = match data_port.fetch_ohlcv(ticker, start_date, end_date) {
            Ok(bars) if !bars.is_empty() => bars,
            Ok(_) => {
                tracing::warn!(ticker = %ticker, "skipping ticker: no data in range");
                skipped.push(SkippedTicker {
                    ticker: ticker.clone(),
                    reason: SkipReason::NoData,
                });
                continue;
            }
            Err(e) => {
                tracing::warn!(ticker = %ticker, error = %e, "skipping ticker");
                skipped.push(SkippedTicker {
                    ticker: ticker.clone(),
                    reason: SkipReason::NoData,
                });
                continue;
            }
        };

        if bars.len() < min_bars {
            tracing::warn!(
                ticker = %ticker,
                bars = bars.len(),
                minimum = min_bars,
                "skipping ticker: insufficient bars"
            );
            skipped.push(SkippedTicker {
                ticker: ticker.clone(),
                reason: SkipReason::InsufficientBars { bars: bars.len() },
            });
            continue;
        }

        tracing::debug!(ticker = %ticker, bars = bars.len(), "ticker loaded");
        instruments.push((ticker.clone(), bars));
    }

    if instruments.is_empty() {
        let ticker = tickers.join(",");
        return Err(match skipped.first().map(|s| &s.reason) {
            Some(SkipReason::InsufficientBars { bars }) if skipped.len() == 1 => {
                SignalTraderError::InsufficientData {
                    ticker,
                    bars: *bars,
                    minimum: min_bars,
                }
            }
            _ => SignalTraderError::NoData { ticker },
        });
    }

    Ok(LoadedUniverse {
        instruments,
        skipped,
    })
}
