//! Population standard deviation over n closing prices.
//!
//! STDDEV(n)[i] = sqrt(sum((C[i-j] - SMA(n)[i])^2 for j in 0..n) / n)

use crate::domain::bar_table::{BarTable, Series};
use crate::domain::indicator::{close_of, nan_series, period_arg};

pub fn compute(table: &BarTable, params: &[f64]) -> Series {
    let close = close_of(table);
    match params.first().copied().and_then(period_arg) {
        Some(period) => stddev_of(&close, period),
        None => nan_series(close.len()),
    }
}

pub fn stddev_of(values: &[f64], period: usize) -> Series {
    let mut out = nan_series(values.len());
    if period == 0 {
        return out;
    }
    for i in (period - 1)..values.len() {
        let window = &values[i + 1 - period..=i];
        if !window.iter().all(|v| v.is_finite()) {
            continue;
        }
        let mean = window.iter().sum::<f64>() / period as f64;
        let variance = window
            .iter()
            .map(|v| {
                let diff = v - mean;
                diff * diff
            })
            .sum::<f64>()
            / period as f64;
        out[i] = variance.sqrt();
    }
    out
}
