//! Weighted Moving Average: weights 1..=n, most recent bar heaviest.

use crate::domain::bar_table::{BarTable, Series};
use crate::domain::indicator::{close_of, nan_series, period_arg};

pub fn compute(table: &BarTable, params: &[f64]) -> Series {
    let close = close_of(table);
    let mut out = nan_series(close.len());
    let Some(period) = params.first().copied().and_then(period_arg) else {
        return out;
    };

    let Some(weights) = period.checked_add(1).and_then(|n| n.checked_mul(period)) else {
        return out;
    };
    let denom = weights as f64 / 2.0;
    for i in (period - 1)..close.len() {
        let window = &close[i + 1 - period..=i];
        if !window.iter().all(|v| v.is_finite()) {
            continue;
        }
        let weighted: f64 = window
            .iter()
            .enumerate()
            .map(|(j, c)| c * (j + 1) as f64)
            .sum();
        out[i] = weighted / denom;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_support::table_from_closes;
    use approx::assert_relative_eq;

    #[test]
    fn wma_known_values() {
        let table = table_from_closes(&[10.0, 20.0, 30.0, 40.0]);
        let series = compute(&table, &[3.0]);
        assert!(series[1].is_nan());
        // (10*1 + 20*2 + 30*3) / 6
        assert_relative_eq!(series[2], 140.0 / 6.0);
        assert_relative_eq!(series[3], 200.0 / 6.0);
    }

    #[test]
    fn wma_flat_prices() {
        let table = table_from_closes(&[50.0; 5]);
        let series = compute(&table, &[4.0]);
        assert_relative_eq!(series[4], 50.0);
    }

    #[test]
    fn wma_huge_period_is_all_nan() {
        let table = table_from_closes(&[1.0, 2.0, 3.0]);
        assert!(compute(&table, &[1e20]).iter().all(|v| v.is_nan()));
    }

    #[test]
    fn wma_invalid_period() {
        let table = table_from_closes(&[1.0, 2.0]);
        assert!(compute(&table, &[-1.0]).iter().all(|v| v.is_nan()));
    }
}
