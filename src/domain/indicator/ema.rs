//! Exponential Moving Average.
//!
//! k = 2/(n+1), seeded with the SMA of the first n defined values, then
//! EMA[i] = C[i]*k + EMA[i-1]*(1-k). Leading NaNs are skipped before seeding,
//! which lets the MACD signal line run an EMA over the MACD line itself.

use crate::domain::bar_table::{BarTable, Series};
use crate::domain::indicator::{close_of, nan_series, period_arg};

pub fn compute(table: &BarTable, params: &[f64]) -> Series {
    let close = close_of(table);
    match params.first().copied().and_then(period_arg) {
        Some(period) => ema_of(&close, period),
        None => nan_series(close.len()),
    }
}

pub fn ema_of(values: &[f64], period: usize) -> Series {
    let mut out = nan_series(values.len());
    if period == 0 {
        return out;
    }
    let Some(start) = values.iter().position(|v| v.is_finite()) else {
        return out;
    };
    let Some(seed_end) = start.checked_add(period - 1).filter(|end| *end < values.len()) else {
        return out;
    };
    let seed = &values[start..=seed_end];
    if !seed.iter().all(|v| v.is_finite()) {
        return out;
    }

    let k = 2.0 / (period as f64 + 1.0);
    let mut ema = seed.iter().sum::<f64>() / period as f64;
    out[seed_end] = ema;
    for i in (seed_end + 1)..values.len() {
        if !values[i].is_finite() {
            // a gap poisons the recursion from here on
            break;
        }
        ema = values[i] * k + ema * (1.0 - k);
        out[i] = ema;
    }
    out
}
