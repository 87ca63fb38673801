//! Rate of Change in percent.
//!
//! ROC(n)[i] = ((C[i] - C[i-n]) / C[i-n]) * 100, and 0 when C[i-n] == 0.
//! The first n rows are NaN.

use crate::domain::bar_table::{BarTable, Series};
use crate::domain::indicator::{close_of, nan_series, period_arg};

pub fn compute(table: &BarTable, params: &[f64]) -> Series {
    let close = close_of(table);
    let mut out = nan_series(close.len());
    let Some(period) = params.first().copied().and_then(period_arg) else {
        return out;
    };

    for i in period..close.len() {
        let prev = close[i - period];
        let curr = close[i];
        out[i] = if prev == 0.0 {
            0.0
        } else {
            ((curr - prev) / prev) * 100.0
        };
    }
    out
}
