//! Average True Range with Wilder smoothing.
//!
//! TR[0] = high - low, TR[i] = true range against the previous close.
//! ATR[n-1] is the mean of the first n TRs, then
//! ATR[i] = (ATR[i-1] * (n-1) + TR[i]) / n.

use crate::domain::bar_table::{BarTable, CLOSE, HIGH, LOW, Series};
use crate::domain::indicator::{nan_series, period_arg};

pub fn compute(table: &BarTable, params: &[f64]) -> Series {
    let mut out = nan_series(table.len());
    let Some(period) = params.first().copied().and_then(period_arg) else {
        return out;
    };
    let (Some(high), Some(low), Some(close)) =
        (table.column(HIGH), table.column(LOW), table.column(CLOSE))
    else {
        return out;
    };
    if table.len() < period {
        return out;
    }

    let tr: Vec<f64> = (0..table.len())
        .map(|i| {
            let hl = high[i] - low[i];
            if i == 0 {
                hl
            } else {
                let prev = close[i - 1];
                hl.max((high[i] - prev).abs()).max((low[i] - prev).abs())
            }
        })
        .collect();

    let mut atr = tr[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = atr;
    for i in period..tr.len() {
        atr = (atr * (period - 1) as f64 + tr[i]) / period as f64;
        out[i] = atr;
    }
    out
}
