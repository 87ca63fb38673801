//! On-Balance Volume.
//!
//! OBV[0] = volume[0]; afterwards volume is added on an up close, subtracted
//! on a down close and ignored on an unchanged close. No warm-up.

use crate::domain::bar_table::{BarTable, Series, VOLUME};
use crate::domain::indicator::{close_of, nan_series};

pub fn compute(table: &BarTable, _params: &[f64]) -> Series {
    let close = close_of(table);
    let Some(volume) = table.column(VOLUME) else {
        return nan_series(close.len());
    };

    let mut out = Vec::with_capacity(close.len());
    let mut obv = 0.0;
    for i in 0..close.len() {
        if i == 0 {
            obv = volume[0];
        } else if close[i] > close[i - 1] {
            obv += volume[i];
        } else if close[i] < close[i - 1] {
            obv -= volume[i];
        }
        out.push(obv);
    }
    out
}
