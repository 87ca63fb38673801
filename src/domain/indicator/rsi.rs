//! Relative Strength Index with Wilder smoothing.
//!
//! First average gain/loss is the simple mean of the first n changes, then
//! avg = (prev_avg * (n-1) + current) / n. RSI = 100 - 100 / (1 + gain/loss),
//! and 100 when the average loss is zero. The first n rows are NaN.

use crate::domain::bar_table::{BarTable, Series};
use crate::domain::indicator::{close_of, nan_series, period_arg};

pub fn compute(table: &BarTable, params: &[f64]) -> Series {
    let close = close_of(table);
    let mut out = nan_series(close.len());
    let Some(period) = params.first().copied().and_then(period_arg) else {
        return out;
    };
    if close.len() <= period {
        return out;
    }

    let mut gains = Vec::with_capacity(close.len() - 1);
    let mut losses = Vec::with_capacity(close.len() - 1);
    for pair in close.windows(2) {
        let change = pair[1] - pair[0];
        gains.push(if change > 0.0 { change } else { 0.0 });
        losses.push(if change < 0.0 { -change } else { 0.0 });
    }

    let mut avg_gain = gains[..period].iter().sum::<f64>() / period as f64;
    let mut avg_loss = losses[..period].iter().sum::<f64>() / period as f64;
    out[period] = rsi_value(avg_gain, avg_loss);

    for i in (period + 1)..close.len() {
        let change_idx = i - 1;
        avg_gain = (avg_gain * (period - 1) as f64 + gains[change_idx]) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + losses[change_idx]) / period as f64;
        out[i] = rsi_value(avg_gain, avg_loss);
    }
    out
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - (100.0 / (1.0 + avg_gain / avg_loss))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_support::table_from_closes;
    use approx::assert_relative_eq;

    #[test]
    fn rsi_warmup() {
        let table = table_from_closes(&[1.0, 2.0, 3.0, 4.0]);
        let series = compute(&table, &[3.0]);
        assert!(series[..3].iter().all(|v| v.is_nan()));
        assert!(series[3].is_finite());
    }

    #[test]
    fn rsi_all_gains_is_100() {
        let table = table_from_closes(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let series = compute(&table, &[3.0]);
        assert_relative_eq!(series[4], 100.0);
    }

    #[test]
    fn rsi_all_losses_is_0() {
        let table = table_from_closes(&[5.0, 4.0, 3.0, 2.0]);
        let series = compute(&table, &[3.0]);
        assert!(series[3].abs() < 1e-12);
    }

    #[test]
    fn rsi_wilder_smoothing() {
        // changes: +2, -1, +1, -2
        let table = table_from_closes(&[10.0, 12.0, 11.0, 12.0, 10.0]);
        let series = compute(&table, &[2.0]);
        // first avg over (+2, -1): gain 1.0, loss 0.5
        assert_relative_eq!(series[2], 100.0 - 100.0 / 3.0, epsilon = 1e-9);
        // gain (1*1+1)/2 = 1, loss (0.5*1+0)/2 = 0.25
        assert_relative_eq!(series[3], 100.0 - 100.0 / 5.0, epsilon = 1e-9);
        // gain (1+0)/2 = 0.5, loss (0.25+2)/2 = 1.125
        let rs: f64 = 0.5 / 1.125;
        assert_relative_eq!(series[4], 100.0 - 100.0 / (1.0 + rs), epsilon = 1e-9);
    }

    #[test]
    fn rsi_too_short() {
        let table = table_from_closes(&[1.0, 2.0]);
        assert!(compute(&table, &[14.0]).iter().all(|v| v.is_nan()));
    }
}
