//! MACD.
//!
//! Line = EMA(fast) - EMA(slow), Signal = EMA(signal) of the line,
//! Histogram = Line - Signal. Each output is exposed as its own indicator.

use crate::domain::bar_table::{BarTable, Series};
use crate::domain::indicator::ema::ema_of;
use crate::domain::indicator::{close_of, nan_series, period_arg};

struct MacdParts {
    line: Series,
    signal: Series,
}

fn macd_parts(table: &BarTable, params: &[f64]) -> Option<MacdParts> {
    let fast = params.first().copied().and_then(period_arg)?;
    let slow = params.get(1).copied().and_then(period_arg)?;
    let signal_period = params.get(2).copied().and_then(period_arg)?;

    let close = close_of(table);
    let ema_fast = ema_of(&close, fast);
    let ema_slow = ema_of(&close, slow);
    // NaN propagates through the subtraction during warm-up
    let line: Series = ema_fast
        .iter()
        .zip(&ema_slow)
        .map(|(f, s)| f - s)
        .collect();
    let signal = ema_of(&line, signal_period);
    Some(MacdParts { line, signal })
}

pub fn compute_line(table: &BarTable, params: &[f64]) -> Series {
    macd_parts(table, params)
        .map(|p| p.line)
        .unwrap_or_else(|| nan_series(table.len()))
}

pub fn compute_signal(table: &BarTable, params: &[f64]) -> Series {
    macd_parts(table, params)
        .map(|p| p.signal)
        .unwrap_or_else(|| nan_series(table.len()))
}

pub fn compute_histogram(table: &BarTable, params: &[f64]) -> Series {
    macd_parts(table, params)
        .map(|p| p.line.iter().zip(&p.signal).map(|(l, s)| l - s).collect())
        .unwrap_or_else(|| nan_series(table.len()))
}
