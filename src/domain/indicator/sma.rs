//! Simple Moving Average.
//!
//! SMA[i] = mean(C[i-n+1..=i]). The first n-1 rows are NaN, as is any row
//! whose window contains a NaN input.

use crate::domain::bar_table::{BarTable, Series};
use crate::domain::indicator::{close_of, nan_series, period_arg};

pub fn compute(table: &BarTable, params: &[f64]) -> Series {
    let close = close_of(table);
    match params.first().copied().and_then(period_arg) {
        Some(period) => sma_of(&close, period),
        None => nan_series(close.len()),
    }
}

/// Rolling mean over an arbitrary series.
pub fn sma_of(values: &[f64], period: usize) -> Series {
    let mut out = nan_series(values.len());
    if period == 0 {
        return out;
    }
    for i in (period - 1)..values.len() {
        let window = &values[i + 1 - period..=i];
        if window.iter().all(|v| v.is_finite()) {
            out[i] = window.iter().sum::<f64>() / period as f64;
        }
    }
    out
}
