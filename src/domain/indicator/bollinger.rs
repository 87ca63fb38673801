//! Bollinger Bands: SMA(n) middle with bands at +/- k population standard
//! deviations.

use crate::domain::bar_table::{BarTable, Series};
use crate::domain::indicator::sma::sma_of;
use crate::domain::indicator::stddev::stddev_of;
use crate::domain::indicator::{close_of, nan_series, period_arg};

fn band(table: &BarTable, params: &[f64], side: f64) -> Series {
    let period = params.first().copied().and_then(period_arg);
    let k = params.get(1).copied().filter(|k| k.is_finite());
    let (Some(period), Some(k)) = (period, k) else {
        return nan_series(table.len());
    };

    let close = close_of(table);
    let middle = sma_of(&close, period);
    if side == 0.0 {
        return middle;
    }
    let sd = stddev_of(&close, period);
    middle
        .iter()
        .zip(&sd)
        .map(|(m, s)| m + side * k * s)
        .collect()
}

pub fn compute_upper(table: &BarTable, params: &[f64]) -> Series {
    band(table, params, 1.0)
}

pub fn compute_middle(table: &BarTable, params: &[f64]) -> Series {
    band(table, params, 0.0)
}

pub fn compute_lower(table: &BarTable, params: &[f64]) -> Series {
    band(table, params, -1.0)
}
